//! Growable instruction buffer with typed immediates and back-patched labels.
//!
//! Each function's body is built into one `Bytecode`. Branch targets are
//! expressed as [`Label`] handles: a label starts *unbound*, accumulating
//! the offsets of branch immediates that await it, and is later *bound* to
//! an absolute offset, at which point the pending sites are patched.
//! Displacements are `i16`, relative to the byte immediately following the
//! opcode. [`Bytecode::finalize`] fails while any label remains unbound.

use crate::error::EmitError;
use crate::opcode::Opcode;

/// Handle to a label owned by a [`Bytecode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Clone)]
enum LabelState {
    /// Offsets of `i16` immediates waiting for this label's address.
    Unbound(Vec<usize>),
    /// Absolute offset of the labeled instruction.
    Bound(usize),
}

/// A function's instruction bytes, under construction or finalized.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    code: Vec<u8>,
    labels: Vec<LabelState>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes emitted so far.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// The offset the next emitted byte will occupy.
    pub fn current(&self) -> usize {
        self.code.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    /// Append an opcode byte.
    pub fn add_insn(&mut self, opcode: Opcode) {
        self.code.push(opcode as u8);
    }

    /// Append a `u16` immediate, little-endian.
    pub fn add_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Append an `i16` immediate, little-endian.
    pub fn add_i16(&mut self, value: i16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Append an `i64` immediate, little-endian.
    pub fn add_i64(&mut self, value: i64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Append an `f64` immediate as its little-endian bit pattern.
    pub fn add_f64(&mut self, value: f64) {
        self.code.extend_from_slice(&value.to_bits().to_le_bytes());
    }

    /// Read the raw byte at `at`.
    pub fn get_u8(&self, at: usize) -> Option<u8> {
        self.code.get(at).copied()
    }

    /// Read a `u16` immediate at `at`.
    pub fn get_u16(&self, at: usize) -> Option<u16> {
        let bytes = self.code.get(at..at + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read an `i16` immediate at `at`.
    pub fn get_i16(&self, at: usize) -> Option<i16> {
        let bytes = self.code.get(at..at + 2)?;
        Some(i16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read an `i64` immediate at `at`.
    pub fn get_i64(&self, at: usize) -> Option<i64> {
        let bytes: [u8; 8] = self.code.get(at..at + 8)?.try_into().ok()?;
        Some(i64::from_le_bytes(bytes))
    }

    /// Read an `f64` immediate at `at`.
    pub fn get_f64(&self, at: usize) -> Option<f64> {
        let bytes: [u8; 8] = self.code.get(at..at + 8)?.try_into().ok()?;
        Some(f64::from_bits(u64::from_le_bytes(bytes)))
    }

    /// Create a fresh, unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(LabelState::Unbound(Vec::new()));
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current offset, patching every pending site.
    pub fn bind(&mut self, label: Label) -> Result<(), EmitError> {
        let target = self.current();
        let sites = match &mut self.labels[label.0] {
            LabelState::Bound(_) => return Err(EmitError::LabelRebound { label: label.0 }),
            LabelState::Unbound(sites) => std::mem::take(sites),
        };
        for site in sites {
            let displacement = target as i64 - site as i64;
            let packed = i16::try_from(displacement).map_err(|_| EmitError::BranchOutOfRange {
                at: site - 1,
                displacement,
            })?;
            self.code[site..site + 2].copy_from_slice(&packed.to_le_bytes());
        }
        self.labels[label.0] = LabelState::Bound(target);
        Ok(())
    }

    /// Append a branch opcode targeting `label`.
    ///
    /// If the label is already bound the displacement is written directly;
    /// otherwise two placeholder bytes are reserved and recorded as a patch
    /// site for [`Bytecode::bind`].
    pub fn add_branch(&mut self, opcode: Opcode, label: Label) -> Result<(), EmitError> {
        let at = self.current();
        self.add_insn(opcode);
        let site = self.current();
        let bound = match &mut self.labels[label.0] {
            LabelState::Bound(target) => Some(*target),
            LabelState::Unbound(sites) => {
                sites.push(site);
                None
            }
        };
        match bound {
            Some(target) => {
                let displacement = target as i64 - site as i64;
                let packed = i16::try_from(displacement)
                    .map_err(|_| EmitError::BranchOutOfRange { at, displacement })?;
                self.add_i16(packed);
            }
            None => self.add_i16(0),
        }
        Ok(())
    }

    /// Number of labels still awaiting [`Bytecode::bind`].
    pub fn unbound_labels(&self) -> usize {
        self.labels
            .iter()
            .filter(|l| matches!(l, LabelState::Unbound(_)))
            .count()
    }

    /// Check that every label has been bound.
    pub fn finalize(&self) -> Result<(), EmitError> {
        match self.unbound_labels() {
            0 => Ok(()),
            count => Err(EmitError::UnboundLabels { count }),
        }
    }
}

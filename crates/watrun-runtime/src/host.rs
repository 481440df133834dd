//! Host-side state owned by a single execution attempt.

use std::sync::Arc;

use crate::memory::SparseMemory;

/// Mutable state behind the four host imports.
///
/// One `HostState` lives exactly as long as one instantiation attempt. When
/// an attempt is rejected the whole state is discarded and the retry builds
/// a fresh one, reusing only the immutable input buffer; the read cursor
/// starts over at zero and no output has been produced yet because the
/// module never ran. Both word-width memories are carried, but only the one
/// matching the active ABI variant is ever reachable from the guest.
pub struct HostState {
    input: Arc<[u8]>,
    cursor: usize,
    output: Vec<u8>,
    pub(crate) mem32: SparseMemory<i32>,
    pub(crate) mem64: SparseMemory<i64>,
}

impl HostState {
    /// Create fresh state over a shared input buffer.
    pub fn new(input: Arc<[u8]>) -> Self {
        Self {
            input,
            cursor: 0,
            output: Vec::new(),
            mem32: SparseMemory::new(),
            mem64: SparseMemory::new(),
        }
    }

    /// Next unread input byte as 0..=255, or -1 once the buffer is
    /// exhausted. Every call past the end keeps returning -1.
    pub fn read_byte(&mut self) -> i32 {
        match self.input.get(self.cursor) {
            Some(&b) => {
                self.cursor += 1;
                i32::from(b)
            }
            None => -1,
        }
    }

    /// Append the low 8 bits of `value` to the captured output.
    pub fn write_byte(&mut self, value: i32) {
        self.output.push(value as u8);
    }

    /// Output captured so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Consume the state, yielding the output accumulator.
    pub fn into_output(self) -> Vec<u8> {
        self.output
    }
}

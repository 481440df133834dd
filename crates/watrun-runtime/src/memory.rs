//! Sparse word-addressed memory exposed to guest modules.

use std::collections::HashMap;
use std::hash::Hash;

/// Address-to-word mapping that stores only nonzero values.
///
/// Reading an absent address yields zero, and writing zero to an address
/// erases any entry there, so the map never holds a zero-valued cell.
/// Storage grows with the number of live nonzero cells rather than with the
/// address range the guest touches; addresses may be negative.
#[derive(Debug, Default)]
pub struct SparseMemory<W> {
    cells: HashMap<W, W>,
}

impl<W: Copy + Eq + Hash + Default> SparseMemory<W> {
    /// Create an empty memory.
    pub fn new() -> Self {
        Self {
            cells: HashMap::new(),
        }
    }

    /// Read the word at `addr`, zero if the cell was never written.
    pub fn get(&self, addr: W) -> W {
        self.cells.get(&addr).copied().unwrap_or_default()
    }

    /// Write `value` at `addr`. Writing zero erases the cell.
    pub fn set(&mut self, addr: W, value: W) {
        if value == W::default() {
            self.cells.remove(&addr);
        } else {
            self.cells.insert(addr, value);
        }
    }

    /// Number of live nonzero cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no cell holds a nonzero value.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

//! Reusable full-extent cell buffers.

use crate::fusion::FusionMode;
use parking_lot::Mutex;

/// One (value, count) raster pair sized to the output grid.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellBuffer {
    /// Per-cell accumulator, identity of the mode when untouched.
    pub values: Vec<f64>,
    /// Per-cell number of accepted samples.
    pub counts: Vec<u32>,
}

impl CellBuffer {
    /// Number of cells.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether the buffer has no cells.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Reset every cell to "untouched" for `mode`.
    pub fn reset(&mut self, len: usize, mode: FusionMode) {
        self.values.clear();
        self.values.resize(len, mode.identity());
        self.counts.clear();
        self.counts.resize(len, 0);
    }

    /// Number of touched cells.
    pub fn touched(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }
}

/// Free list of cell buffers shared by the workers of an engine.
///
/// Buffers keep their capacity between runs; `acquire` only reallocates when
/// the grid grew.
#[derive(Debug, Default)]
pub struct BufferPool {
    free: Mutex<Vec<CellBuffer>>,
}

impl BufferPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a buffer reset to `len` untouched cells.
    pub fn acquire(&self, len: usize, mode: FusionMode) -> CellBuffer {
        let mut buffer = self.free.lock().pop().unwrap_or_default();
        buffer.reset(len, mode);
        buffer
    }

    /// Return a buffer for reuse.
    pub fn release(&self, buffer: CellBuffer) {
        self.free.lock().push(buffer);
    }

    /// Number of buffers waiting for reuse.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Drop every pooled buffer.
    pub fn clear(&self) {
        self.free.lock().clear();
    }
}

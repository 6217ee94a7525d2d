/// Data loading modules for re-id training
pub mod numpy_dataset;

pub use numpy_dataset::{DatasetMetadata, NumpyReidDataset, NumpyReidLoader};

use candle_core::{Result, Tensor};

/// One batch as produced by a loader
///
/// Tensors live on the CPU; the trainer moves what it needs to its device.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[batch, channels, height, width]`
    pub images: Tensor,
    /// Source file names, not used for training
    pub fnames: Vec<String>,
    /// Person identity labels `[batch]`
    pub pids: Tensor,
    /// Camera ids `[batch]`, not used for training
    pub camids: Tensor,
    /// Per-sample loss weights `[batch]`
    pub weights: Tensor,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.fnames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fnames.is_empty()
    }
}

/// Generic data loader trait
pub trait BatchDataLoader {
    /// Get next batch, `None` once the epoch is exhausted
    fn next_batch(&mut self) -> Result<Option<Batch>>;

    /// Reset loader for new epoch
    fn reset(&mut self);

    /// Get total number of batches
    fn num_batches(&self) -> usize;
}

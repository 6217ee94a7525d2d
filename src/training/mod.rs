/// Training infrastructure for re-id models
pub mod progress;
pub mod trainer;

pub use progress::{EpochStats, ProgressReporter};
pub use trainer::{ParsedInputs, Trainer};

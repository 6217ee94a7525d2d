//! Person re-identification training loop - Rust implementation
//!
//! Drives one epoch at a time over a batch loader, scoring a re-id model with
//! one of four loss strategies and applying a candle optimizer step per batch.
//!
//! # Loss strategies
//!
//! - **xentropy**: plain categorical cross-entropy over identity logits
//! - **oim**: Online Instance Matching against a per-identity lookup table
//! - **triplet**: batch-hard triplet loss on embedding features
//! - **soft_xentropy**: label-smoothed cross-entropy with per-sample weights
//!
//! # Example
//!
//! ```ignore
//! use reid_trainer::{Trainer, TrainerConfig, loss::Criterion};
//!
//! let config = TrainerConfig::default();
//! let criterion = Criterion::from_config(&config.loss, &device)?;
//! let mut trainer = Trainer::new(model, criterion, device);
//! let stats = trainer.train(0, &mut loader, &mut optimizer, config.print_freq)?;
//! ```

pub mod config;
pub mod data;
pub mod loss;
pub mod meters;
pub mod metrics;
pub mod models;
pub mod training;

// Re-export commonly used items
pub use config::{LossConfig, TrainerConfig};
pub use models::{ReidModel, ReidNet, ReidNetConfig};
pub use training::{EpochStats, Trainer};

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum ReidError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReidError>;

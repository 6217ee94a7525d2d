/// Configuration for a re-id training run
///
/// Loaded from JSON; every field has a default so partial files work.
use std::path::Path;

use candle_core::Device;
use serde::{Deserialize, Serialize};

use crate::loss::LossKind;
use crate::models::ReidNetConfig;

/// Loss strategy selection and its hyper-parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    /// Loss name: "xentropy", "oim", "triplet" or "soft_xentropy"
    pub name: String,

    /// Triplet margin
    pub margin: f64,

    /// OIM logit scale
    pub scalar: f64,

    /// OIM lookup table momentum
    pub momentum: f64,

    /// Label smoothing for soft cross-entropy
    pub epsilon: f64,

    /// Embedding width seen by OIM (must match the model output)
    pub num_features: usize,

    /// Number of identities in the training split
    pub num_classes: usize,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            name: "xentropy".to_string(),
            margin: 0.5,
            scalar: 1.0,
            momentum: 0.5,
            epsilon: 0.1,
            num_features: 256,
            num_classes: 751, // Market-1501 training identities
        }
    }
}

/// Full trainer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub loss: LossConfig,
    pub model: ReidNetConfig,

    /// Number of training epochs
    pub epochs: usize,

    /// Batch size
    pub batch_size: usize,

    /// Reshuffle the dataset every epoch
    pub shuffle: bool,

    /// AdamW learning rate
    pub learning_rate: f64,

    /// AdamW weight decay
    pub weight_decay: f64,

    /// Emit a progress line every N iterations
    pub print_freq: usize,

    /// "cpu", "cuda" or "cuda:N"
    pub device: String,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            loss: LossConfig::default(),
            model: ReidNetConfig::default(),
            epochs: 50,
            batch_size: 64,
            shuffle: true,
            learning_rate: 3e-4,
            weight_decay: 5e-4,
            print_freq: 1,
            device: "cpu".to_string(),
        }
    }
}

impl TrainerConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.batch_size == 0 {
            return Err(crate::ReidError::Config(
                "batch_size must be > 0".to_string(),
            ));
        }

        if self.print_freq == 0 {
            return Err(crate::ReidError::Config(
                "print_freq must be > 0".to_string(),
            ));
        }

        if self.epochs == 0 {
            return Err(crate::ReidError::Config("epochs must be > 0".to_string()));
        }

        if self.model.num_features == 0 {
            return Err(crate::ReidError::Config(
                "model.num_features must be > 0".to_string(),
            ));
        }

        let kind: LossKind = self.loss.name.parse()?;
        match kind {
            LossKind::CrossEntropy | LossKind::SoftCrossEntropy => {
                if self.model.num_classes == 0 {
                    return Err(crate::ReidError::Config(format!(
                        "loss '{}' needs a classifier: model.num_classes must be > 0",
                        self.loss.name
                    )));
                }
            }
            LossKind::Oim => {
                if self.loss.num_classes == 0 {
                    return Err(crate::ReidError::Config(
                        "loss.num_classes must be > 0 for oim".to_string(),
                    ));
                }
                if self.model.num_classes != 0 {
                    return Err(crate::ReidError::Config(
                        "oim scores embeddings: model.num_classes must be 0".to_string(),
                    ));
                }
                if self.loss.num_features != self.model.num_features {
                    return Err(crate::ReidError::Config(format!(
                        "loss.num_features ({}) != model.num_features ({})",
                        self.loss.num_features, self.model.num_features
                    )));
                }
            }
            LossKind::Triplet => {}
        }

        Ok(())
    }

    /// Resolve the compute device
    pub fn device(&self) -> crate::Result<Device> {
        parse_device(&self.device)
    }
}

fn parse_device(spec: &str) -> crate::Result<Device> {
    match spec {
        "cpu" => Ok(Device::Cpu),
        "cuda" => Ok(Device::new_cuda(0)?),
        other => match other.strip_prefix("cuda:") {
            Some(ordinal) => {
                let ordinal: usize = ordinal.parse().map_err(|_| {
                    crate::ReidError::Config(format!("Invalid device ordinal: {}", other))
                })?;
                Ok(Device::new_cuda(ordinal)?)
            }
            None => Err(crate::ReidError::Config(format!(
                "Invalid device: {}. Must be 'cpu', 'cuda' or 'cuda:N'",
                other
            ))),
        },
    }
}

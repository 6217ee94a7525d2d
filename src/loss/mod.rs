//! Loss strategies for re-id training
//!
//! A [`Criterion`] holds exactly one of four loss shapes. Each shape is a
//! trait so callers can plug their own implementation into a variant:
//! - [`ClassificationLoss`]: `(outputs, targets) -> loss`
//! - [`IdentityLoss`]: `(outputs, targets) -> (loss, logits)`, may update state
//! - [`MetricLoss`]: `(outputs, targets) -> (loss, precision)`
//! - [`WeightedLoss`]: `(outputs, targets, weights) -> loss`

pub mod cross_entropy;
pub mod oim;
pub mod soft_cross_entropy;
pub mod triplet;

pub use cross_entropy::CrossEntropyLoss;
pub use oim::OimLoss;
pub use soft_cross_entropy::SoftCrossEntropyLoss;
pub use triplet::TripletLoss;

use std::fmt;
use std::str::FromStr;

use candle_core::{Device, Result, Tensor};

use crate::config::LossConfig;
use crate::metrics::accuracy;

/// Loss over class logits
pub trait ClassificationLoss {
    fn forward(&self, outputs: &Tensor, targets: &Tensor) -> Result<Tensor>;
}

/// Loss that maps features to identity logits while scoring them
pub trait IdentityLoss {
    fn forward(&mut self, outputs: &Tensor, targets: &Tensor) -> Result<(Tensor, Tensor)>;
}

/// Loss that scores embeddings and reports its own precision
pub trait MetricLoss {
    fn forward(&self, outputs: &Tensor, targets: &Tensor) -> Result<(Tensor, f32)>;
}

/// Loss over class logits with a weight per sample
pub trait WeightedLoss {
    fn forward(&self, outputs: &Tensor, targets: &Tensor, weights: &Tensor) -> Result<Tensor>;
}

/// Names accepted in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    CrossEntropy,
    Oim,
    Triplet,
    SoftCrossEntropy,
}

impl LossKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LossKind::CrossEntropy => "xentropy",
            LossKind::Oim => "oim",
            LossKind::Triplet => "triplet",
            LossKind::SoftCrossEntropy => "soft_xentropy",
        }
    }
}

impl FromStr for LossKind {
    type Err = crate::ReidError;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name {
            "xentropy" | "cross_entropy" => Ok(LossKind::CrossEntropy),
            "oim" => Ok(LossKind::Oim),
            "triplet" => Ok(LossKind::Triplet),
            "soft_xentropy" | "soft_cross_entropy" => Ok(LossKind::SoftCrossEntropy),
            other => Err(crate::ReidError::Config(format!(
                "Unsupported loss: {}. Must be 'xentropy', 'oim', 'triplet' or 'soft_xentropy'",
                other
            ))),
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The active loss strategy of a trainer
pub enum Criterion {
    CrossEntropy(Box<dyn ClassificationLoss>),
    Oim(Box<dyn IdentityLoss>),
    Triplet(Box<dyn MetricLoss>),
    SoftCrossEntropy(Box<dyn WeightedLoss>),
}

impl Criterion {
    /// Build the default implementation of the configured loss
    pub fn from_config(config: &LossConfig, device: &Device) -> crate::Result<Self> {
        let kind: LossKind = config.name.parse()?;
        let criterion = match kind {
            LossKind::CrossEntropy => Criterion::CrossEntropy(Box::new(CrossEntropyLoss)),
            LossKind::Oim => Criterion::Oim(Box::new(OimLoss::new(
                config.num_features,
                config.num_classes,
                config.scalar,
                config.momentum,
                device,
            ))),
            LossKind::Triplet => Criterion::Triplet(Box::new(TripletLoss::new(config.margin))),
            LossKind::SoftCrossEntropy => {
                Criterion::SoftCrossEntropy(Box::new(SoftCrossEntropyLoss::new(config.epsilon)))
            }
        };
        log::debug!("Built criterion: {}", kind);
        Ok(criterion)
    }

    pub fn kind(&self) -> LossKind {
        match self {
            Criterion::CrossEntropy(_) => LossKind::CrossEntropy,
            Criterion::Oim(_) => LossKind::Oim,
            Criterion::Triplet(_) => LossKind::Triplet,
            Criterion::SoftCrossEntropy(_) => LossKind::SoftCrossEntropy,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Score model outputs, returning `(loss, top-1 precision)`
    pub fn compute(
        &mut self,
        outputs: &Tensor,
        targets: &Tensor,
        weights: &Tensor,
    ) -> Result<(Tensor, f32)> {
        match self {
            Criterion::CrossEntropy(loss_fn) => {
                let loss = loss_fn.forward(outputs, targets)?;
                let prec = top1(outputs, targets)?;
                Ok((loss, prec))
            }
            Criterion::Oim(loss_fn) => {
                let (loss, logits) = loss_fn.forward(outputs, targets)?;
                let prec = top1(&logits, targets)?;
                Ok((loss, prec))
            }
            Criterion::Triplet(loss_fn) => loss_fn.forward(outputs, targets),
            Criterion::SoftCrossEntropy(loss_fn) => {
                let loss = loss_fn.forward(outputs, targets, weights)?;
                let prec = top1(outputs, targets)?;
                Ok((loss, prec))
            }
        }
    }
}

impl fmt::Debug for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Criterion").field(&self.kind()).finish()
    }
}

fn top1(outputs: &Tensor, targets: &Tensor) -> Result<f32> {
    let precs = accuracy(outputs, targets, &[1])?;
    Ok(precs.first().copied().unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use std::cell::Cell;
    use std::rc::Rc;

    struct FixedLoss(f64);

    impl ClassificationLoss for FixedLoss {
        fn forward(&self, outputs: &Tensor, _targets: &Tensor) -> Result<Tensor> {
            outputs.sum_all()?.affine(0.0, self.0)
        }
    }

    impl WeightedLoss for FixedLoss {
        fn forward(&self, outputs: &Tensor, _targets: &Tensor, weights: &Tensor) -> Result<Tensor> {
            // loss = fixed * sum(weights)
            let w = weights.sum_all()?;
            (outputs.sum_all()?.affine(0.0, 1.0)? * w)?.affine(self.0, 0.0)
        }
    }

    /// Replaces outputs with logits that always rank class 1 first
    struct SwapLogits;

    impl IdentityLoss for SwapLogits {
        fn forward(&mut self, outputs: &Tensor, _targets: &Tensor) -> Result<(Tensor, Tensor)> {
            let n = outputs.dim(0)?;
            let logits = Tensor::from_vec(
                (0..n).flat_map(|_| [0.0f32, 1.0]).collect::<Vec<_>>(),
                (n, 2),
                outputs.device(),
            )?;
            Ok((outputs.sum_all()?.affine(0.0, 2.0)?, logits))
        }
    }

    struct SelfScoring(Rc<Cell<usize>>);

    impl MetricLoss for SelfScoring {
        fn forward(&self, outputs: &Tensor, _targets: &Tensor) -> Result<(Tensor, f32)> {
            self.0.set(self.0.get() + 1);
            Ok((outputs.sum_all()?.affine(0.0, 0.25)?, 0.875))
        }
    }

    fn fixture() -> Result<(Tensor, Tensor, Tensor)> {
        let device = Device::Cpu;
        // Both rows rank class 0 first
        let outputs = Tensor::new(&[[2.0f32, 1.0], [2.0, 1.0]], &device)?;
        let targets = Tensor::new(&[0u32, 1], &device)?;
        let weights = Tensor::new(&[1.0f32, 1.0], &device)?;
        Ok((outputs, targets, weights))
    }

    fn scalar(t: &Tensor) -> Result<f32> {
        t.to_dtype(DType::F32)?.to_scalar::<f32>()
    }

    #[test]
    fn test_cross_entropy_dispatch() -> Result<()> {
        let (outputs, targets, weights) = fixture()?;
        let mut criterion = Criterion::CrossEntropy(Box::new(FixedLoss(0.5)));

        let (loss, prec) = criterion.compute(&outputs, &targets, &weights)?;
        assert!((scalar(&loss)? - 0.5).abs() < 1e-6);
        assert_eq!(prec, 0.5);
        Ok(())
    }

    #[test]
    fn test_identity_dispatch_scores_transformed_logits() -> Result<()> {
        let (outputs, targets, weights) = fixture()?;
        let mut criterion = Criterion::Oim(Box::new(SwapLogits));

        let (loss, prec) = criterion.compute(&outputs, &targets, &weights)?;
        assert!((scalar(&loss)? - 2.0).abs() < 1e-6);
        // Transformed logits rank class 1 first: only the second row is right
        assert_eq!(prec, 0.5);

        let targets = Tensor::new(&[1u32, 1], &Device::Cpu)?;
        let (_, prec) = criterion.compute(&outputs, &targets, &weights)?;
        assert_eq!(prec, 1.0);
        Ok(())
    }

    #[test]
    fn test_triplet_dispatch_uses_returned_precision() -> Result<()> {
        let (outputs, targets, weights) = fixture()?;
        let calls = Rc::new(Cell::new(0));
        let mut criterion = Criterion::Triplet(Box::new(SelfScoring(calls.clone())));

        let (loss, prec) = criterion.compute(&outputs, &targets, &weights)?;
        assert!((scalar(&loss)? - 0.25).abs() < 1e-6);
        // accuracy() on these outputs would give 0.5
        assert_eq!(prec, 0.875);
        assert_eq!(calls.get(), 1);
        Ok(())
    }

    #[test]
    fn test_soft_cross_entropy_dispatch_passes_weights() -> Result<()> {
        let (outputs, targets, _) = fixture()?;
        let weights = Tensor::new(&[2.0f32, 1.0], &Device::Cpu)?;
        let mut criterion = Criterion::SoftCrossEntropy(Box::new(FixedLoss(0.5)));

        let (loss, prec) = criterion.compute(&outputs, &targets, &weights)?;
        assert!((scalar(&loss)? - 1.5).abs() < 1e-6);
        assert_eq!(prec, 0.5);
        Ok(())
    }

    #[test]
    fn test_loss_kind_parsing() {
        assert_eq!("xentropy".parse::<LossKind>().unwrap(), LossKind::CrossEntropy);
        assert_eq!("oim".parse::<LossKind>().unwrap(), LossKind::Oim);
        assert_eq!("triplet".parse::<LossKind>().unwrap(), LossKind::Triplet);
        assert_eq!(
            "soft_xentropy".parse::<LossKind>().unwrap(),
            LossKind::SoftCrossEntropy
        );

        let err = "center".parse::<LossKind>().unwrap_err();
        assert!(matches!(err, crate::ReidError::Config(ref msg) if msg.contains("center")));
    }

    #[test]
    fn test_from_config_builds_each_kind() -> crate::Result<()> {
        let device = Device::Cpu;
        for name in ["xentropy", "oim", "triplet", "soft_xentropy"] {
            let config = LossConfig {
                name: name.to_string(),
                ..LossConfig::default()
            };
            let criterion = Criterion::from_config(&config, &device)?;
            assert_eq!(criterion.name(), name);
        }

        let config = LossConfig {
            name: "arcface".to_string(),
            ..LossConfig::default()
        };
        let err = Criterion::from_config(&config, &device).unwrap_err();
        assert!(err.to_string().contains("Unsupported loss: arcface"));
        Ok(())
    }
}

/// Label-smoothed cross-entropy with per-sample weights
use candle_core::{DType, Result, Tensor, D};
use candle_nn::ops;

use super::WeightedLoss;

/// `mean_i(w_i * -sum_c q_ic * log_softmax(x_i)_c)` with
/// `q = (1 - epsilon) * onehot(y) + epsilon / num_classes`
#[derive(Debug, Clone)]
pub struct SoftCrossEntropyLoss {
    epsilon: f64,
}

impl SoftCrossEntropyLoss {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn smoothed_targets(&self, targets: &Tensor, num_classes: usize, dtype: DType) -> Result<Tensor> {
        let labels = targets.to_dtype(DType::U32)?.to_vec1::<u32>()?;
        let off = self.epsilon / num_classes as f64;
        let on = 1.0 - self.epsilon + off;

        let mut data = vec![off as f32; labels.len() * num_classes];
        for (row, &label) in labels.iter().enumerate() {
            let label = label as usize;
            if label >= num_classes {
                return Err(candle_core::Error::Msg(format!(
                    "soft cross-entropy: label {} out of range for {} classes",
                    label, num_classes
                )));
            }
            data[row * num_classes + label] = on as f32;
        }

        Tensor::from_vec(data, (labels.len(), num_classes), targets.device())?.to_dtype(dtype)
    }
}

impl Default for SoftCrossEntropyLoss {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl WeightedLoss for SoftCrossEntropyLoss {
    fn forward(&self, outputs: &Tensor, targets: &Tensor, weights: &Tensor) -> Result<Tensor> {
        let (_batch_size, num_classes) = outputs.dims2()?;
        let soft = self.smoothed_targets(targets, num_classes, outputs.dtype())?;

        let log_probs = ops::log_softmax(outputs, D::Minus1)?;
        let per_sample = (log_probs * soft)?.sum(D::Minus1)?.neg()?;

        let weights = weights.to_dtype(outputs.dtype())?;
        (per_sample * weights)?.mean_all()
    }
}

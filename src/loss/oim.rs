/// Online Instance Matching (OIM) loss
///
/// Scores features against a lookup table holding one running feature per
/// identity, then moves each labelled row towards the feature that hit it.
use candle_core::{DType, Device, Result, Tensor};

use super::IdentityLoss;

pub struct OimLoss {
    num_features: usize,
    num_classes: usize,
    scalar: f64,
    momentum: f64,
    /// Row-major `[num_classes, num_features]`
    lut: Vec<f32>,
    device: Device,
}

impl OimLoss {
    pub fn new(
        num_features: usize,
        num_classes: usize,
        scalar: f64,
        momentum: f64,
        device: &Device,
    ) -> Self {
        Self {
            num_features,
            num_classes,
            scalar,
            momentum,
            lut: vec![0.0; num_classes * num_features],
            device: device.clone(),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Lookup table row for identity `pid`
    pub fn lut_row(&self, pid: usize) -> Option<&[f32]> {
        if pid < self.num_classes {
            let start = pid * self.num_features;
            Some(&self.lut[start..start + self.num_features])
        } else {
            None
        }
    }

    fn lut_tensor(&self, dtype: DType) -> Result<Tensor> {
        Tensor::from_slice(&self.lut, (self.num_classes, self.num_features), &self.device)?
            .to_dtype(dtype)
    }

    fn update_lut(&mut self, features: &Tensor, labels: &[u32]) -> Result<()> {
        let rows = features.to_dtype(DType::F32)?.to_vec2::<f32>()?;
        let m = self.momentum as f32;

        for (feature, &pid) in rows.iter().zip(labels.iter()) {
            let start = pid as usize * self.num_features;
            let row = &mut self.lut[start..start + self.num_features];

            for (slot, &x) in row.iter_mut().zip(feature.iter()) {
                *slot = m * *slot + (1.0 - m) * x;
            }

            let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                row.iter_mut().for_each(|v| *v /= norm);
            }
        }

        Ok(())
    }
}

impl IdentityLoss for OimLoss {
    fn forward(&mut self, outputs: &Tensor, targets: &Tensor) -> Result<(Tensor, Tensor)> {
        let (_batch_size, dim) = outputs.dims2()?;
        if dim != self.num_features {
            return Err(candle_core::Error::Msg(format!(
                "OIM: expected {} features, got {}",
                self.num_features, dim
            )));
        }

        let labels = targets.to_dtype(DType::U32)?.to_vec1::<u32>()?;
        if let Some(&bad) = labels.iter().find(|&&pid| pid as usize >= self.num_classes) {
            return Err(candle_core::Error::Msg(format!(
                "OIM: label {} out of range for {} identities",
                bad, self.num_classes
            )));
        }

        // The table is a constant for autodiff; only `outputs` receives a gradient
        let lut = self.lut_tensor(outputs.dtype())?;
        let logits = (outputs.matmul(&lut.t()?)? * self.scalar)?;
        let loss = candle_nn::loss::cross_entropy(&logits, targets)?;

        self.update_lut(outputs, &labels)?;

        Ok((loss, logits))
    }
}

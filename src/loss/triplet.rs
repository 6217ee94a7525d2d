/// Batch-hard triplet loss
///
/// For every anchor in the batch the farthest same-identity sample and the
/// nearest other-identity sample are mined, then
/// `loss = mean(relu(d_ap - d_an + margin))`. Precision is the fraction of
/// anchors whose hardest negative is farther than their hardest positive.
use candle_core::{DType, Result, Tensor, D};

use super::MetricLoss;

/// Added to same-identity distances so they never win the negative search
const POSITIVE_MASK_OFFSET: f64 = 1e6;

#[derive(Debug, Clone)]
pub struct TripletLoss {
    margin: f64,
}

impl TripletLoss {
    pub fn new(margin: f64) -> Self {
        Self { margin }
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }
}

impl Default for TripletLoss {
    fn default() -> Self {
        Self::new(0.5)
    }
}

/// Euclidean distance matrix `[n, n]`, kept off zero before the sqrt
pub fn pairwise_distances(features: &Tensor) -> Result<Tensor> {
    let sq = features.sqr()?.sum_keepdim(D::Minus1)?; // [n, 1]
    let gram = features.matmul(&features.t()?)?; // [n, n]
    let dist = sq.broadcast_add(&sq.t()?)?.broadcast_sub(&(gram * 2.0)?)?;
    (dist.relu()? + 1e-12)?.sqrt()
}

fn same_identity_mask(targets: &Tensor, dtype: DType) -> Result<Tensor> {
    let labels = targets.to_dtype(DType::U32)?.to_vec1::<u32>()?;
    let n = labels.len();
    let mask: Vec<f32> = labels
        .iter()
        .flat_map(|a| labels.iter().map(move |b| if a == b { 1.0 } else { 0.0 }))
        .collect();
    Tensor::from_vec(mask, (n, n), targets.device())?.to_dtype(dtype)
}

impl MetricLoss for TripletLoss {
    fn forward(&self, outputs: &Tensor, targets: &Tensor) -> Result<(Tensor, f32)> {
        let dist = pairwise_distances(outputs)?;
        let positives = same_identity_mask(targets, dist.dtype())?;

        let dist_ap = (&dist * &positives)?.max(D::Minus1)?;
        let dist_an = (&dist + (&positives * POSITIVE_MASK_OFFSET)?)?.min(D::Minus1)?;

        let loss = ((&dist_ap - &dist_an)? + self.margin)?.relu()?.mean_all()?;
        let prec = dist_an
            .gt(&dist_ap)?
            .to_dtype(DType::F32)?
            .mean_all()?
            .to_scalar::<f32>()?;

        Ok((loss, prec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn two_clusters(device: &Device) -> Result<(Tensor, Tensor)> {
        let features = Tensor::new(
            &[[0.0f32, 0.0], [0.0, 1.0], [10.0, 0.0], [10.0, 1.0]],
            device,
        )?;
        let targets = Tensor::new(&[0u32, 0, 1, 1], device)?;
        Ok((features, targets))
    }

    #[test]
    fn test_pairwise_distances() -> Result<()> {
        let device = Device::Cpu;
        let features = Tensor::new(&[[0.0f32, 0.0], [3.0, 4.0]], &device)?;

        let dist = pairwise_distances(&features)?.to_vec2::<f32>()?;
        assert!((dist[0][1] - 5.0).abs() < 1e-4);
        assert!((dist[1][0] - 5.0).abs() < 1e-4);
        assert!(dist[0][0] < 1e-4);
        Ok(())
    }

    #[test]
    fn test_separated_clusters() -> Result<()> {
        let device = Device::Cpu;
        let (features, targets) = two_clusters(&device)?;

        let (loss, prec) = TripletLoss::new(0.5).forward(&features, &targets)?;
        assert!(loss.to_scalar::<f32>()? < 1e-6);
        assert_eq!(prec, 1.0);
        Ok(())
    }

    #[test]
    fn test_margin_larger_than_gap() -> Result<()> {
        let device = Device::Cpu;
        let (features, targets) = two_clusters(&device)?;

        // d_ap = 1 and d_an = 10 for every anchor
        let (loss, prec) = TripletLoss::new(20.0).forward(&features, &targets)?;
        assert!((loss.to_scalar::<f32>()? - 11.0).abs() < 1e-3);
        assert_eq!(prec, 1.0);
        Ok(())
    }

    #[test]
    fn test_swapped_labels_fail() -> Result<()> {
        let device = Device::Cpu;
        let (features, _) = two_clusters(&device)?;
        let targets = Tensor::new(&[0u32, 1, 0, 1], &device)?;

        let (loss, prec) = TripletLoss::new(0.0).forward(&features, &targets)?;
        assert!(loss.to_scalar::<f32>()? > 8.0);
        assert_eq!(prec, 0.0);
        Ok(())
    }

    #[test]
    fn test_gradients_flow_to_features() -> Result<()> {
        let device = Device::Cpu;
        let (features, targets) = two_clusters(&device)?;
        let var = candle_core::Var::from_tensor(&features)?;

        let (loss, _) = TripletLoss::new(20.0).forward(var.as_tensor(), &targets)?;
        let grads = loss.backward()?;
        assert!(grads.get(var.as_tensor()).is_some());
        Ok(())
    }
}

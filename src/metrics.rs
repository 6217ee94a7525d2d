/// Classification metrics used for training-time monitoring
use candle_core::{DType, Result, Tensor};

/// Top-k accuracy
///
/// For each `k` in `topk`, returns the fraction of rows of `outputs`
/// (`[batch, num_classes]`) whose target class is among the `k` highest
/// scores. Equal scores are ranked by class index, lowest first.
pub fn accuracy(outputs: &Tensor, targets: &Tensor, topk: &[usize]) -> Result<Vec<f32>> {
    let scores = outputs.to_dtype(DType::F32)?.to_vec2::<f32>()?;
    let labels = targets.to_dtype(DType::U32)?.to_vec1::<u32>()?;

    if scores.len() != labels.len() {
        return Err(candle_core::Error::Msg(format!(
            "accuracy: {} rows of outputs but {} targets",
            scores.len(),
            labels.len()
        )));
    }

    let batch_size = labels.len();
    if batch_size == 0 {
        return Ok(vec![0.0; topk.len()]);
    }

    // Rank of the target within its row (0 = best)
    let ranks: Vec<usize> = scores
        .iter()
        .zip(labels.iter())
        .map(|(row, &label)| {
            let label = label as usize;
            let Some(&target_score) = row.get(label) else {
                return usize::MAX;
            };
            row.iter()
                .enumerate()
                .filter(|&(idx, &score)| {
                    score > target_score || (score == target_score && idx < label)
                })
                .count()
        })
        .collect();

    Ok(topk
        .iter()
        .map(|&k| {
            let correct = ranks.iter().filter(|&&rank| rank < k).count();
            correct as f32 / batch_size as f32
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_top1_half_correct() -> Result<()> {
        let device = Device::Cpu;
        let outputs = Tensor::new(&[[2.0f32, 1.0], [2.0, 1.0]], &device)?;
        let targets = Tensor::new(&[0u32, 1], &device)?;

        let prec = accuracy(&outputs, &targets, &[1])?;
        assert_eq!(prec, vec![0.5]);
        Ok(())
    }

    #[test]
    fn test_topk_multiple() -> Result<()> {
        let device = Device::Cpu;
        let outputs = Tensor::new(
            &[
                [0.1f32, 0.7, 0.2],
                [0.5, 0.3, 0.2],
                [0.2, 0.3, 0.5],
                [0.6, 0.3, 0.1],
            ],
            &device,
        )?;
        let targets = Tensor::new(&[1u32, 1, 2, 2], &device)?;

        let prec = accuracy(&outputs, &targets, &[1, 2, 3])?;
        assert_eq!(prec, vec![0.5, 0.75, 1.0]);
        Ok(())
    }

    #[test]
    fn test_ties_favour_lower_index() -> Result<()> {
        let device = Device::Cpu;
        let outputs = Tensor::new(&[[1.0f32, 1.0], [1.0, 1.0]], &device)?;
        let targets = Tensor::new(&[0u32, 1], &device)?;

        assert_eq!(accuracy(&outputs, &targets, &[1])?, vec![0.5]);
        Ok(())
    }

    #[test]
    fn test_out_of_range_label_never_correct() -> Result<()> {
        let device = Device::Cpu;
        let outputs = Tensor::new(&[[1.0f32, 0.0]], &device)?;
        let targets = Tensor::new(&[5u32], &device)?;

        assert_eq!(accuracy(&outputs, &targets, &[1, 2])?, vec![0.0, 0.0]);
        Ok(())
    }
}

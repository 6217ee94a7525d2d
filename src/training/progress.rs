/// Per-epoch progress tracking
use crate::meters::AverageMeter;

/// Averages over one call to `Trainer::train`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochStats {
    pub iterations: usize,
    pub batch_time: f64,
    pub data_time: f64,
    pub loss: f64,
    pub precision: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    batch_time: AverageMeter,
    data_time: AverageMeter,
    losses: AverageMeter,
    precisions: AverageMeter,
    iterations: usize,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one iteration; `n` is the batch size
    pub fn update(&mut self, batch_time: f64, data_time: f64, loss: f64, precision: f64, n: usize) {
        self.batch_time.update(batch_time, n);
        self.data_time.update(data_time, n);
        self.losses.update(loss, n);
        self.precisions.update(precision, n);
        self.iterations += 1;
    }

    pub fn losses(&self) -> &AverageMeter {
        &self.losses
    }

    pub fn precisions(&self) -> &AverageMeter {
        &self.precisions
    }

    /// `iter` is 1-based
    pub fn format_line(&self, epoch: usize, iter: usize, total: usize) -> String {
        format!(
            "Epoch: [{}][{}/{}]\tTime {:.3} ({:.3})\tData {:.3} ({:.3})\tLoss {:.3} ({:.3})\tPrec {:.2}% ({:.2}%)\t",
            epoch,
            iter,
            total,
            self.batch_time.val,
            self.batch_time.avg,
            self.data_time.val,
            self.data_time.avg,
            self.losses.val,
            self.losses.avg,
            self.precisions.val * 100.0,
            self.precisions.avg * 100.0,
        )
    }

    pub fn summary(&self) -> EpochStats {
        EpochStats {
            iterations: self.iterations,
            batch_time: self.batch_time.avg,
            data_time: self.data_time.avg,
            loss: self.losses.avg,
            precision: self.precisions.avg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_layout() {
        let mut reporter = ProgressReporter::new();
        reporter.update(0.5, 0.2, 2.0, 0.5, 2);
        reporter.update(0.25, 0.1, 1.0, 1.0, 2);

        assert_eq!(
            reporter.format_line(5, 2, 10),
            "Epoch: [5][2/10]\tTime 0.250 (0.375)\tData 0.100 (0.150)\tLoss 1.000 (1.500)\tPrec 100.00% (75.00%)\t"
        );
    }

    #[test]
    fn test_summary_weights_by_batch_size() {
        let mut reporter = ProgressReporter::new();
        reporter.update(1.0, 0.0, 3.0, 0.0, 1);
        reporter.update(1.0, 0.0, 1.0, 1.0, 3);

        let stats = reporter.summary();
        assert_eq!(stats.iterations, 2);
        assert!((stats.loss - 1.5).abs() < 1e-12);
        assert!((stats.precision - 0.75).abs() < 1e-12);
        assert!((stats.batch_time - 1.0).abs() < 1e-12);
    }
}

//! Running average meter for training statistics

/// Tracks the latest value and the weighted running average of a metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AverageMeter {
    /// Most recent value
    pub val: f64,
    /// Weighted sum of all values
    pub sum: f64,
    /// Total weight seen so far
    pub count: usize,
    /// `sum / count`
    pub avg: f64,
}

impl AverageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record `val` observed `n` times
    pub fn update(&mut self, val: f64, n: usize) {
        self.val = val;
        self.sum += val * n as f64;
        self.count += n;
        if self.count > 0 {
            self.avg = self.sum / self.count as f64;
        }
    }
}

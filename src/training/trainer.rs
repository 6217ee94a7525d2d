/// Training loop for re-id models
use std::io::Write;
use std::time::Instant;

use candle_core::{DType, Device, Result, Tensor};
use candle_nn::Optimizer;

use super::progress::{EpochStats, ProgressReporter};
use crate::data::{Batch, BatchDataLoader};
use crate::loss::Criterion;
use crate::models::ReidModel;

/// Progress lines are only printed for epochs divisible by this
const PRINT_EPOCH_STRIDE: usize = 5;

/// Device-bound view of a batch for one step
#[derive(Debug, Clone)]
pub struct ParsedInputs {
    pub inputs: Vec<Tensor>,
    pub targets: Tensor,
    pub weights: Tensor,
}

/// Trainer for re-id models
pub struct Trainer<M: ReidModel> {
    model: M,
    criterion: Criterion,
    device: Device,
}

impl<M: ReidModel> Trainer<M> {
    pub fn new(model: M, criterion: Criterion, device: Device) -> Self {
        Self {
            model,
            criterion,
            device,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn criterion(&self) -> &Criterion {
        &self.criterion
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Swap the loss strategy used by subsequent steps
    pub fn update_criterion(&mut self, criterion: Criterion) {
        log::info!(
            "Switching criterion: {} -> {}",
            self.criterion.name(),
            criterion.name()
        );
        self.criterion = criterion;
    }

    /// Move a batch onto the trainer device
    pub fn parse_data(&self, batch: Batch) -> Result<ParsedInputs> {
        let Batch {
            images,
            pids,
            weights,
            ..
        } = batch;

        Ok(ParsedInputs {
            inputs: vec![images.to_device(&self.device)?],
            targets: pids.to_dtype(DType::U32)?.to_device(&self.device)?,
            weights: weights.to_dtype(DType::F32)?.to_device(&self.device)?,
        })
    }

    /// Run the model and score it, returning `(loss, precision)`
    pub fn forward(&mut self, inputs: &ParsedInputs) -> Result<(Tensor, f32)> {
        let outputs = self.model.forward(&inputs.inputs)?;
        self.criterion
            .compute(&outputs, &inputs.targets, &inputs.weights)
    }

    /// Train for one epoch, printing progress to stdout
    pub fn train<L, O>(
        &mut self,
        epoch: usize,
        loader: &mut L,
        optimizer: &mut O,
        print_freq: usize,
    ) -> crate::Result<EpochStats>
    where
        L: BatchDataLoader,
        O: Optimizer,
    {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.train_with_output(epoch, loader, optimizer, print_freq, &mut out)
    }

    /// Train for one epoch, writing progress lines to `out`
    pub fn train_with_output<L, O, W>(
        &mut self,
        epoch: usize,
        loader: &mut L,
        optimizer: &mut O,
        print_freq: usize,
        out: &mut W,
    ) -> crate::Result<EpochStats>
    where
        L: BatchDataLoader,
        O: Optimizer,
        W: Write,
    {
        if print_freq == 0 {
            return Err(crate::ReidError::Config(
                "print_freq must be > 0".to_string(),
            ));
        }

        self.model.set_training(true);
        loader.reset();

        let total = loader.num_batches();
        let mut reporter = ProgressReporter::new();

        log::debug!(
            "Epoch {}: {} batches, criterion={}",
            epoch,
            total,
            self.criterion.name()
        );

        let mut end = Instant::now();
        let mut i = 0;
        while let Some(batch) = loader.next_batch()? {
            let data_time = end.elapsed().as_secs_f64();

            let inputs = self.parse_data(batch)?;
            let batch_size = inputs.targets.dim(0)?;
            let (loss, prec) = self.forward(&inputs)?;
            let loss_val = loss.to_dtype(DType::F64)?.to_scalar::<f64>()?;

            // candle hands back a fresh GradStore per backward pass, so there
            // is nothing left over from the previous step to clear
            let grads = loss.backward()?;
            optimizer.step(&grads)?;

            let batch_time = end.elapsed().as_secs_f64();
            end = Instant::now();

            reporter.update(batch_time, data_time, loss_val, prec as f64, batch_size);

            if (i + 1) % print_freq == 0 && epoch % PRINT_EPOCH_STRIDE == 0 {
                writeln!(out, "{}", reporter.format_line(epoch, i + 1, total))?;
            }
            i += 1;
        }

        let stats = reporter.summary();
        log::debug!(
            "Epoch {} done: {} iterations, loss={:.4}, prec={:.2}%",
            epoch,
            stats.iterations,
            stats.loss,
            stats.precision * 100.0
        );
        Ok(stats)
    }
}

/// Train a ReidNet on a NumPy re-id dataset
use std::path::PathBuf;

use candle_core::DType;
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use clap::Parser;

use reid_trainer::data::{NumpyReidDataset, NumpyReidLoader};
use reid_trainer::loss::Criterion;
use reid_trainer::{ReidNet, Trainer, TrainerConfig};

#[derive(Parser, Debug)]
#[command(name = "train_reid", about = "Train a person re-identification model")]
struct Cli {
    /// JSON trainer configuration (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding dataset.json, images.npy and pids.npy
    #[arg(long)]
    data: PathBuf,

    /// Where to write the trained weights
    #[arg(long, default_value = "reid_model.safetensors")]
    output: PathBuf,

    /// Override the loss named in the configuration
    #[arg(long)]
    loss: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TrainerConfig::from_file(path)?,
        None => TrainerConfig::default(),
    };
    if let Some(loss) = cli.loss {
        config.loss.name = loss;
    }

    let dataset = NumpyReidDataset::from_directory(&cli.data)?;
    let (channels, _, _) = dataset.image_shape();
    config.model.in_channels = channels;
    if config.model.num_classes > 0 {
        config.model.num_classes = dataset.num_classes();
    }
    config.loss.num_classes = dataset.num_classes();
    config.validate()?;

    let device = config.device()?;
    log::info!("Using device: {:?}", device);
    log::info!("Configuration: {:#?}", config);

    let mut loader = NumpyReidLoader::new(dataset, config.batch_size, config.shuffle);

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = ReidNet::new(config.model.clone(), vb)?;

    let criterion = Criterion::from_config(&config.loss, &device)?;
    log::info!("Criterion: {}", criterion.name());

    let mut optimizer = AdamW::new(
        varmap.all_vars(),
        ParamsAdamW {
            lr: config.learning_rate,
            weight_decay: config.weight_decay,
            ..Default::default()
        },
    )?;

    let mut trainer = Trainer::new(model, criterion, device);

    log::info!("Starting training for {} epochs", config.epochs);
    for epoch in 0..config.epochs {
        let stats = trainer.train(epoch, &mut loader, &mut optimizer, config.print_freq)?;
        log::info!(
            "Epoch {} complete: loss={:.4}, prec={:.2}%, {:.3}s/batch",
            epoch,
            stats.loss,
            stats.precision * 100.0,
            stats.batch_time
        );
    }

    log::info!("Saving model to {}", cli.output.display());
    varmap.save(&cli.output)?;

    Ok(())
}

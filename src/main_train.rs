// projeto: lstmcotacao
// file: src/main_train.rs

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use log::{error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;

use lstmcotacao::rna::sweep::{self, SweepGrid};
use lstmcotacao::{
    LstmError, ModelConfig, MultiLayerLstm, PriceSeries, QualityTier, RunConfig,
    SequenceModelArtifact, TrainingOptions, prepare_dataset,
};
use lstmcotacao::rna::{metrics, storage, train};

#[derive(Parser)]
#[command(
    name = "lstm_train",
    about = "Trains an LSTM closing-price model from a stock records file",
    version
)]
struct Cli {
    /// TOML stock records file (asset + daily records)
    #[arg(long)]
    data: PathBuf,
    /// Directory that receives the artifact files
    #[arg(long, default_value = "model")]
    model_dir: PathBuf,
    #[arg(long, default_value_t = 60, help = "Sequence length")]
    seq_length: usize,
    #[arg(long, default_value_t = 0.001, help = "Learning rate")]
    learning_rate: f64,
    #[arg(long, default_value_t = 100, help = "Training epochs")]
    epochs: usize,
    #[arg(long, default_value_t = 100, help = "Hidden layer size")]
    hidden_size: usize,
    #[arg(long, default_value_t = 2, help = "Number of LSTM layers")]
    num_layers: usize,
    #[arg(long, default_value_t = 0.2, help = "Dropout rate")]
    dropout_rate: f64,
    #[arg(long, default_value_t = 0.8, help = "Train/validation split")]
    train_split: f64,
    /// Fit the scaler on the training prefix only instead of the full series
    #[arg(long, default_value_t = false)]
    fit_on_train_only: bool,
    #[arg(long, default_value_t = 42, help = "Seed for weight init and dropout")]
    seed: u64,
    /// Run the hyperparameter sweep instead of a single training run
    #[arg(long, default_value_t = false)]
    sweep: bool,
    /// Epoch budget per sweep combination
    #[arg(long, default_value_t = 20)]
    sweep_epochs: usize,
}

fn run_training(cli: &Cli) -> Result<(), LstmError> {
    let series = PriceSeries::load(&cli.data)?;
    println!(
        "Training {} on {} closing prices (seq_length {}, {} epochs)",
        series.asset(),
        series.len(),
        cli.seq_length,
        cli.epochs
    );

    let dataset = prepare_dataset(&series, cli.seq_length, cli.train_split, cli.fit_on_train_only)?;
    println!(
        "Training: {} samples, Validation: {} samples",
        dataset.train_x.len(),
        dataset.val_x.len()
    );

    let config = ModelConfig {
        input_size: 1,
        hidden_size: cli.hidden_size,
        num_layers: cli.num_layers,
        dropout_rate: cli.dropout_rate,
        seq_length: cli.seq_length,
    };
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let mut model = MultiLayerLstm::new(config, &mut rng)?;
    println!(
        "Model: {} layers, {} hidden units, {:.1}% dropout, {} parameters",
        cli.num_layers,
        cli.hidden_size,
        cli.dropout_rate * 100.0,
        model.num_parameters()
    );

    let options = TrainingOptions {
        epochs: cli.epochs,
        learning_rate: cli.learning_rate,
        log_every: 10,
        seed: cli.seed,
    };
    let report = train::train(
        &mut model,
        &dataset.train_x,
        &dataset.train_y,
        &dataset.val_x,
        &dataset.val_y,
        &options,
    )?;

    let eval = metrics::evaluate(&model, &dataset.scaler, &dataset.val_x, &dataset.val_y)?;
    let tier = QualityTier::from_mape(eval.mape);
    println!("\nValidation metrics ({}):", series.asset());
    println!("   MSE:  {:.4}", eval.mse);
    println!("   RMSE: {:.4}", eval.rmse);
    println!("   MAE:  {:.4}", eval.mae);
    println!("   MAPE: {:.2}% ({tier})", eval.mape);
    println!("   Training time: {:.1}s", report.training_secs);

    let run_config = RunConfig {
        version: storage::RUN_CONFIG_VERSION,
        seq_length: cli.seq_length,
        asset: series.asset().to_string(),
        train_split: cli.train_split,
        input_size: 1,
        n_train_samples: dataset.train_x.len(),
        n_val_samples: dataset.val_x.len(),
    };
    let artifact = SequenceModelArtifact {
        model,
        train_losses: report.train_losses,
        val_losses: report.val_losses,
        final_train_loss: report.final_train_loss,
        final_val_loss: report.final_val_loss,
        best_val_loss: report.best_val_loss,
        best_epoch: report.best_epoch,
        timestamp: Utc::now().to_rfc3339(),
    };
    storage::save_artifacts(&cli.model_dir, &artifact, &dataset.scaler, &run_config)?;
    println!("Artifacts written to {}", cli.model_dir.display());
    Ok(())
}

fn run_sweep(cli: &Cli) -> Result<(), LstmError> {
    let series = PriceSeries::load(&cli.data)?;
    let grid = SweepGrid::default();
    let outcomes = sweep::run_sweep(
        &series,
        &grid,
        cli.sweep_epochs,
        cli.train_split,
        cli.dropout_rate,
        cli.seed,
    )?;

    println!("\nSweep results for {} (best first):", series.asset());
    for o in &outcomes {
        println!(
            "   hidden {:4} | layers {} | lr {:6} | seq {:3} | val MAPE {:6.2}% | val loss {:.6}",
            o.hidden_size, o.num_layers, o.learning_rate, o.seq_length, o.val_mape, o.final_val_loss
        );
    }
    let best = &outcomes[0];
    println!(
        "\nRetrain the winner with:\n   lstm_train --data {} --hidden-size {} --num-layers {} --learning-rate {} --seq-length {}",
        cli.data.display(),
        best.hidden_size,
        best.num_layers,
        best.learning_rate,
        best.seq_length
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    info!("Starting LSTM training with parameters:");
    info!("  Sequence Length: {}", cli.seq_length);
    info!("  Hidden Size: {}", cli.hidden_size);
    info!("  Number of Layers: {}", cli.num_layers);
    info!("  Learning Rate: {}", cli.learning_rate);
    info!("  Epochs: {}", cli.epochs);

    let result = if cli.sweep { run_sweep(&cli) } else { run_training(&cli) };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

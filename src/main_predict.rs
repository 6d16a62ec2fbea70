// projeto: lstmcotacao
// file: src/main_predict.rs

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use lstmcotacao::{LstmError, PredictionRequest, PriceSeries, ServingState};

#[derive(Parser)]
#[command(
    name = "lstm_predict",
    about = "Predicts the next closing price from a trained model",
    version
)]
struct Cli {
    /// Directory holding the artifact files written by lstm_train
    #[arg(long, default_value = "model")]
    model_dir: PathBuf,
    /// Comma-separated closing prices, oldest first
    #[arg(long, value_delimiter = ',')]
    prices: Vec<f64>,
    /// TOML stock records file to take the prices from instead
    #[arg(long)]
    data: Option<PathBuf>,
    /// Print the health report and exit
    #[arg(long, default_value_t = false)]
    health: bool,
}

fn run(cli: &Cli) -> Result<(), LstmError> {
    let state = ServingState::load(&cli.model_dir);

    if cli.health {
        println!("{}", serde_json::to_string_pretty(&state.health())?);
        return Ok(());
    }

    let prices = match &cli.data {
        Some(path) => {
            let series = PriceSeries::load(path)?;
            info!("Using {} prices from {}", series.len(), path.display());
            series.closes().to_vec()
        }
        None => cli.prices.clone(),
    };

    let response = state.predict(&PredictionRequest { prices })?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    println!(
        "Predicted next closing price for {}: {:.2} {}",
        response.asset, response.predicted_price, response.currency
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

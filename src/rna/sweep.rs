// projeto: lstmcotacao
// file: src/rna/sweep.rs

use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::LstmError;
use crate::rna::data::{self, PriceSeries};
use crate::rna::metrics;
use crate::rna::model::{ModelConfig, MultiLayerLstm};
use crate::rna::train::{self, TrainingOptions};

/// Grid of hyperparameter candidates. The sweep trains the full cartesian
/// product, so keep the axes short.
#[derive(Debug, Clone)]
pub struct SweepGrid {
    pub hidden_sizes: Vec<usize>,
    pub num_layers: Vec<usize>,
    pub learning_rates: Vec<f64>,
    pub seq_lengths: Vec<usize>,
}

impl Default for SweepGrid {
    fn default() -> Self {
        SweepGrid {
            hidden_sizes: vec![50, 100],
            num_layers: vec![1, 2],
            learning_rates: vec![0.001, 0.01],
            seq_lengths: vec![30, 60],
        }
    }
}

impl SweepGrid {
    pub fn combinations(&self) -> usize {
        self.hidden_sizes.len()
            * self.num_layers.len()
            * self.learning_rates.len()
            * self.seq_lengths.len()
    }
}

/// One evaluated combination. Ranking key is validation MAPE.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub hidden_size: usize,
    pub num_layers: usize,
    pub learning_rate: f64,
    pub seq_length: usize,
    pub val_mape: f64,
    pub final_val_loss: f64,
}

/// Trains every grid combination with a reduced epoch budget and ranks the
/// outcomes by validation MAPE, best first. No intermediate model is
/// persisted; the caller retrains the winner with the full budget.
///
/// Combinations the series cannot support (window longer than the data) are
/// skipped with a warning rather than failing the whole sweep.
pub fn run_sweep(
    series: &PriceSeries,
    grid: &SweepGrid,
    epochs: usize,
    train_ratio: f64,
    dropout_rate: f64,
    seed: u64,
) -> Result<Vec<SweepOutcome>, LstmError> {
    if grid.combinations() == 0 {
        return Err(LstmError::InvalidInput("sweep grid has an empty axis".to_string()));
    }
    info!(
        "Sweeping {} combinations over {} prices ({} epochs each)",
        grid.combinations(),
        series.len(),
        epochs
    );

    let mut outcomes = Vec::new();
    let mut index = 0usize;
    for &seq_length in &grid.seq_lengths {
        let dataset = match data::prepare_dataset(series, seq_length, train_ratio, false) {
            Ok(d) => d,
            Err(e) => {
                warn!("Skipping seq_length {seq_length}: {e}");
                continue;
            }
        };
        for &hidden_size in &grid.hidden_sizes {
            for &num_layers in &grid.num_layers {
                for &learning_rate in &grid.learning_rates {
                    index += 1;
                    let config = ModelConfig {
                        input_size: 1,
                        hidden_size,
                        num_layers,
                        dropout_rate,
                        seq_length,
                    };
                    let mut rng = StdRng::seed_from_u64(seed);
                    let mut model = MultiLayerLstm::new(config, &mut rng)?;
                    let options = TrainingOptions {
                        epochs,
                        learning_rate,
                        log_every: 0,
                        seed,
                    };
                    let report = train::train(
                        &mut model,
                        &dataset.train_x,
                        &dataset.train_y,
                        &dataset.val_x,
                        &dataset.val_y,
                        &options,
                    )?;
                    let eval = metrics::evaluate(
                        &model,
                        &dataset.scaler,
                        &dataset.val_x,
                        &dataset.val_y,
                    )?;
                    info!(
                        "[{index}/{}] hidden {hidden_size}, layers {num_layers}, lr {learning_rate}, seq {seq_length} -> val MAPE {:.2}%",
                        grid.combinations(),
                        eval.mape
                    );
                    outcomes.push(SweepOutcome {
                        hidden_size,
                        num_layers,
                        learning_rate,
                        seq_length,
                        val_mape: eval.mape,
                        final_val_loss: report.final_val_loss,
                    });
                }
            }
        }
    }

    if outcomes.is_empty() {
        return Err(LstmError::InvalidInput(
            "no sweep combination fits the series length".to_string(),
        ));
    }
    outcomes.sort_by(|a, b| a.val_mape.total_cmp(&b.val_mape));
    let best = &outcomes[0];
    info!(
        "Best combination: hidden {}, layers {}, lr {}, seq {} (val MAPE {:.2}%)",
        best.hidden_size, best.num_layers, best.learning_rate, best.seq_length, best.val_mape
    );
    Ok(outcomes)
}

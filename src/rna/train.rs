// projeto: lstmcotacao
// file: src/rna/train.rs

use std::time::Instant;

use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::LstmError;
use crate::rna::model::{Gradients, MultiLayerLstm, dropout_mask};

/// Adam with bias correction over the flattened weight vector, the same
/// state layout for every parameter regardless of which gate it belongs to.
pub struct AdamOptimizer {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    m: Vec<f64>,
    v: Vec<f64>,
    t: usize,
}

impl AdamOptimizer {
    pub fn new(learning_rate: f64) -> Self {
        AdamOptimizer {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }

    pub fn update(&mut self, weights: &mut [f64], grads: &[f64]) {
        if self.m.len() != weights.len() {
            self.m = vec![0.0; weights.len()];
            self.v = vec![0.0; weights.len()];
        }
        self.t += 1;
        let bc1 = 1.0 - self.beta1.powi(self.t as i32);
        let bc2 = 1.0 - self.beta2.powi(self.t as i32);
        for i in 0..weights.len() {
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * grads[i];
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * grads[i] * grads[i];
            let m_hat = self.m[i] / bc1;
            let v_hat = self.v[i] / bc2;
            weights[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub epochs: usize,
    pub learning_rate: f64,
    /// Progress line cadence; 0 disables progress output.
    pub log_every: usize,
    /// Seed for dropout masks; fixed seed gives reproducible runs.
    pub seed: u64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        TrainingOptions { epochs: 100, learning_rate: 0.001, log_every: 10, seed: 42 }
    }
}

/// Outcome of one completed run. Both histories hold exactly one entry per
/// epoch. The best validation epoch is reported but its weights are NOT
/// restored: the trained model is whatever the final epoch produced.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
    pub final_train_loss: f64,
    pub final_val_loss: f64,
    pub best_val_loss: f64,
    pub best_epoch: usize,
    pub training_secs: f64,
}

/// Full-batch training: each epoch runs one forward+backward+Adam step over
/// the whole training partition (MSE objective) followed by one forward-only
/// validation pass. Runs to the epoch budget; the only early exit is a fatal
/// error on a non-finite loss.
pub fn train(
    model: &mut MultiLayerLstm,
    train_x: &[Vec<f64>],
    train_y: &[f64],
    val_x: &[Vec<f64>],
    val_y: &[f64],
    options: &TrainingOptions,
) -> Result<TrainingReport, LstmError> {
    if train_x.is_empty() || train_x.len() != train_y.len() {
        return Err(LstmError::Training(format!(
            "invalid training partition: {} sequences, {} targets",
            train_x.len(),
            train_y.len()
        )));
    }
    if val_x.is_empty() || val_x.len() != val_y.len() {
        return Err(LstmError::Training(format!(
            "invalid validation partition: {} sequences, {} targets",
            val_x.len(),
            val_y.len()
        )));
    }
    if options.epochs == 0 {
        return Err(LstmError::Training("epoch budget must be >= 1".to_string()));
    }

    let config = model.config().clone();
    info!(
        "Training {} parameters: {} layers x {} hidden, seq_length {}, {} epochs, lr {}",
        model.num_parameters(),
        config.num_layers,
        config.hidden_size,
        config.seq_length,
        options.epochs,
        options.learning_rate
    );

    let mut optimizer = AdamOptimizer::new(options.learning_rate);
    let mut rng = StdRng::seed_from_u64(options.seed);
    let n_train = train_x.len() as f64;

    let mut train_losses = Vec::with_capacity(options.epochs);
    let mut val_losses = Vec::with_capacity(options.epochs);
    let mut best_val_loss = f64::INFINITY;
    let mut best_epoch = 0usize;
    let start = Instant::now();

    for epoch in 0..options.epochs {
        // Train step: accumulate gradients over the whole partition, then
        // one optimizer update.
        let mut grads = Gradients::zeros(&config);
        let mut epoch_loss = 0.0;
        for (window, &target) in train_x.iter().zip(train_y.iter()) {
            let mask = dropout_mask(config.hidden_size, config.dropout_rate, &mut rng);
            let cache = model.forward_train(window, &mask)?;
            let err = cache.prediction - target;
            epoch_loss += err * err;
            // d(mean squared error)/d(prediction) for this sample.
            let d_pred = 2.0 * err / n_train;
            model.backward(&cache, d_pred, &mut grads);
        }
        epoch_loss /= n_train;

        let mut flat = model.flatten_weights();
        optimizer.update(&mut flat, &grads.flatten());
        model.unflatten_weights(&flat)?;

        // Validation step: forward only, dropout inactive, no update.
        let val_loss = validation_loss(model, val_x, val_y)?;

        if !epoch_loss.is_finite() || !val_loss.is_finite() {
            return Err(LstmError::Training(format!(
                "non-finite loss at epoch {} (train {epoch_loss}, val {val_loss})",
                epoch + 1
            )));
        }

        train_losses.push(epoch_loss);
        val_losses.push(val_loss);

        if val_loss < best_val_loss {
            best_val_loss = val_loss;
            best_epoch = epoch + 1;
        }

        if options.log_every > 0 && (epoch + 1) % options.log_every == 0 {
            println!(
                "Epoch [{:3}/{}] | Train Loss: {:.6} | Val Loss: {:.6} | Time: {:.1}s",
                epoch + 1,
                options.epochs,
                epoch_loss,
                val_loss,
                start.elapsed().as_secs_f64()
            );
        }
    }

    let training_secs = start.elapsed().as_secs_f64();
    let final_train_loss = train_losses[options.epochs - 1];
    let final_val_loss = val_losses[options.epochs - 1];
    info!(
        "Training finished in {:.1}s: final train loss {:.6}, final val loss {:.6}, best val loss {:.6} at epoch {}",
        training_secs, final_train_loss, final_val_loss, best_val_loss, best_epoch
    );
    if best_epoch != options.epochs {
        warn!(
            "Best validation loss was at epoch {} of {}; final weights are kept anyway",
            best_epoch, options.epochs
        );
    }

    Ok(TrainingReport {
        train_losses,
        val_losses,
        final_train_loss,
        final_val_loss,
        best_val_loss,
        best_epoch,
        training_secs,
    })
}

fn validation_loss(
    model: &MultiLayerLstm,
    val_x: &[Vec<f64>],
    val_y: &[f64],
) -> Result<f64, LstmError> {
    let mut loss = 0.0;
    for (window, &target) in val_x.iter().zip(val_y.iter()) {
        let pred = model.forward(window)?;
        loss += (pred - target) * (pred - target);
    }
    Ok(loss / val_x.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rna::model::ModelConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn tiny_model(seq_length: usize) -> MultiLayerLstm {
        let config = ModelConfig {
            input_size: 1,
            hidden_size: 6,
            num_layers: 1,
            dropout_rate: 0.0,
            seq_length,
        };
        let mut rng = StdRng::seed_from_u64(99);
        MultiLayerLstm::new(config, &mut rng).unwrap()
    }

    fn ramp_dataset() -> (Vec<Vec<f64>>, Vec<f64>, Vec<Vec<f64>>, Vec<f64>) {
        // Noiseless normalized ramp; an easy target for a few epochs.
        let data: Vec<f64> = (0..40).map(|i| i as f64 / 40.0).collect();
        let (x, y) = crate::rna::data::create_sequences(&data, 4);
        crate::rna::data::train_test_split(x, y, 0.8)
    }

    #[test]
    fn history_length_equals_epoch_count() {
        let (tx, ty, vx, vy) = ramp_dataset();
        let mut model = tiny_model(4);
        let options = TrainingOptions { epochs: 12, log_every: 0, ..Default::default() };
        let report = train(&mut model, &tx, &ty, &vx, &vy, &options).unwrap();
        assert_eq!(report.train_losses.len(), 12);
        assert_eq!(report.val_losses.len(), 12);
        assert!(report.train_losses.iter().all(|l| l.is_finite()));
        assert!(report.val_losses.iter().all(|l| l.is_finite()));
    }

    #[test]
    fn best_epoch_tracks_minimum_validation_loss() {
        let (tx, ty, vx, vy) = ramp_dataset();
        let mut model = tiny_model(4);
        let options = TrainingOptions { epochs: 15, log_every: 0, ..Default::default() };
        let report = train(&mut model, &tx, &ty, &vx, &vy, &options).unwrap();
        let min = report.val_losses.iter().cloned().fold(f64::INFINITY, f64::min);
        assert_eq!(report.best_val_loss, min);
        assert_eq!(report.val_losses[report.best_epoch - 1], min);
    }

    #[test]
    fn loss_decreases_on_noiseless_ramp() {
        let (tx, ty, vx, vy) = ramp_dataset();
        let mut model = tiny_model(4);
        let options = TrainingOptions {
            epochs: 60,
            learning_rate: 0.01,
            log_every: 0,
            seed: 1,
        };
        let report = train(&mut model, &tx, &ty, &vx, &vy, &options).unwrap();
        assert!(
            report.final_train_loss < report.train_losses[0],
            "loss did not decrease: first {} last {}",
            report.train_losses[0],
            report.final_train_loss
        );
    }

    #[test]
    fn rejects_empty_partitions() {
        let mut model = tiny_model(4);
        let options = TrainingOptions::default();
        assert!(matches!(
            train(&mut model, &[], &[], &[], &[], &options),
            Err(LstmError::Training(_))
        ));
    }
}

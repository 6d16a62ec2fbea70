// projeto: lstmcotacao
// file: src/rna/serving.rs

use std::path::Path;
use std::time::Instant;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::LstmError;
use crate::rna::model::MultiLayerLstm;
use crate::rna::scaler::MinMaxScaler;
use crate::rna::storage::{self, RunConfig};

/// Compute target label, kept for observability. Forward passes run on the
/// host CPU; there is no accelerator path in this crate.
pub const COMPUTE_TARGET: &str = "cpu";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub prices: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub compute_target: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub predicted_price: f64,
    pub currency: String,
    pub asset: String,
    pub input_window_length: usize,
    pub processing_time_ms: f64,
    pub model_info: ModelInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub compute_target: String,
    pub asset: Option<String>,
    pub seq_length: Option<usize>,
}

/// The artifact triple as held in memory once loaded. Immutable for the
/// life of the process.
#[derive(Debug)]
struct LoadedModel {
    model: MultiLayerLstm,
    scaler: MinMaxScaler,
    run_config: RunConfig,
}

/// Process-wide serving state. Populated exactly once by `load`; afterwards
/// every access is read-only, so any number of threads may call `predict`
/// concurrently on a shared reference without locking. Replacing the served
/// model means restarting the process and loading again.
#[derive(Debug)]
pub struct ServingState {
    loaded: Option<LoadedModel>,
    load_error: Option<String>,
}

impl ServingState {
    /// Attempts the startup load of the artifact triple. Failure is recorded
    /// but never propagated: the host process must still come up and answer
    /// health queries, refusing only inference.
    pub fn load(dir: &Path) -> Self {
        match storage::load_artifacts(dir) {
            Ok((artifact, scaler, run_config)) => {
                info!(
                    "Serving model for {} (hidden_size {}, {} layers) on {}",
                    run_config.asset,
                    artifact.model.config().hidden_size,
                    artifact.model.config().num_layers,
                    COMPUTE_TARGET
                );
                ServingState {
                    loaded: Some(LoadedModel { model: artifact.model, scaler, run_config }),
                    load_error: None,
                }
            }
            Err(e) => {
                error!("Model load failed, serving degraded: {e}");
                ServingState { loaded: None, load_error: Some(e.to_string()) }
            }
        }
    }

    /// An empty state for a process started without artifacts.
    pub fn unloaded(reason: impl Into<String>) -> Self {
        ServingState { loaded: None, load_error: Some(reason.into()) }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// The recorded startup failure, when unloaded.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn health(&self) -> HealthResponse {
        match &self.loaded {
            Some(loaded) => HealthResponse {
                status: "healthy".to_string(),
                model_loaded: true,
                compute_target: COMPUTE_TARGET.to_string(),
                asset: Some(loaded.run_config.asset.clone()),
                seq_length: Some(loaded.run_config.seq_length),
            },
            None => HealthResponse {
                status: "unhealthy".to_string(),
                model_loaded: false,
                compute_target: COMPUTE_TARGET.to_string(),
                asset: None,
                seq_length: None,
            },
        }
    }

    /// Answers one prediction request. Read-only: no field of the state is
    /// touched mutably on this path.
    ///
    /// Precondition order: loaded state first (an unloaded registry refuses
    /// every request as service-unavailable), then input validation, then
    /// the history-length check. Only the last `seq_length` prices are used;
    /// older entries are silently discarded.
    pub fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse, LstmError> {
        let start = Instant::now();

        let loaded = self.loaded.as_ref().ok_or_else(|| {
            LstmError::ServiceUnavailable(match &self.load_error {
                Some(reason) => format!("model is not loaded: {reason}"),
                None => "model is not loaded".to_string(),
            })
        })?;

        if request.prices.is_empty() {
            return Err(LstmError::InvalidInput("price list must not be empty".to_string()));
        }
        if let Some(bad) = request.prices.iter().find(|p| !p.is_finite() || **p <= 0.0) {
            return Err(LstmError::InvalidInput(format!(
                "all prices must be positive finite values, got {bad}"
            )));
        }

        let seq_length = loaded.run_config.seq_length;
        if request.prices.len() < seq_length {
            return Err(LstmError::InsufficientHistory {
                required: seq_length,
                actual: request.prices.len(),
            });
        }

        let window: Vec<f64> = request.prices[request.prices.len() - seq_length..]
            .iter()
            .map(|&p| loaded.scaler.transform(p))
            .collect();
        let normalized_prediction = loaded.model.forward(&window)?;
        let predicted_price = loaded.scaler.inverse_transform(normalized_prediction);
        if !predicted_price.is_finite() {
            return Err(LstmError::Computation {
                stage: "denormalization",
                reason: format!("non-finite price {predicted_price}"),
            });
        }

        let config = loaded.model.config();
        Ok(PredictionResponse {
            predicted_price: round2(predicted_price),
            currency: "BRL".to_string(),
            asset: loaded.run_config.asset.clone(),
            input_window_length: seq_length,
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            model_info: ModelInfo {
                model_type: "LSTM".to_string(),
                hidden_size: config.hidden_size,
                num_layers: config.num_layers,
                compute_target: COMPUTE_TARGET.to_string(),
            },
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

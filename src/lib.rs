// projeto: lstmcotacao
// file: src/lib.rs

pub mod rna;

use thiserror::Error;

/// Error taxonomy for the whole pipeline. Every failure is translated into
/// one of these variants at the component boundary where it originates;
/// nothing crosses the crate API as a raw panic or an untyped error.
#[derive(Error, Debug)]
pub enum LstmError {
    /// Client sent fewer prices than the model's window length.
    #[error("insufficient history: need at least {required} prices, got {actual}")]
    InsufficientHistory { required: usize, actual: usize },
    /// Client input rejected before any computation (empty list, non-positive price, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Inference requested while no model is loaded. The request may be valid;
    /// the service just cannot answer it right now.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// One part of the artifact triple is missing or unparsable. Non-fatal to
    /// the host process: the registry stays unloaded and records this.
    #[error("failed to load artifact part '{part}': {reason}")]
    ArtifactLoad { part: &'static str, reason: String },
    /// Persisted weights do not match the architecture described by the
    /// persisted config. Hard load-time error, never silently reshaped.
    #[error("weight shape mismatch: {0}")]
    ShapeMismatch(String),
    /// Normalization is undefined for this series (empty or constant).
    #[error("degenerate series: {0}")]
    DegenerateSeries(String),
    /// Fatal training error; the run halts before any artifact is written.
    #[error("training failed: {0}")]
    Training(String),
    /// Unexpected failure inside normalization or a forward pass.
    #[error("computation failed during {stage}: {reason}")]
    Computation { stage: &'static str, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub use rna::data::{PriceSeries, create_sequences, prepare_dataset, train_test_split};
pub use rna::metrics::{EvaluationMetrics, QualityTier};
pub use rna::model::{ModelConfig, MultiLayerLstm};
pub use rna::scaler::MinMaxScaler;
pub use rna::serving::{HealthResponse, PredictionRequest, PredictionResponse, ServingState};
pub use rna::storage::{RunConfig, SequenceModelArtifact, load_artifacts, save_artifacts};
pub use rna::train::{TrainingOptions, TrainingReport, train};

// projeto: lstmcotacao
// file: src/rna/metrics.rs

use serde::Serialize;

use crate::LstmError;
use crate::rna::model::MultiLayerLstm;
use crate::rna::scaler::MinMaxScaler;

/// Error metrics computed on denormalized (price-unit) values.
/// `mape` is a percentage.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub mape: f64,
}

/// Advisory quality classification by MAPE. Reporting only; never gates a
/// deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl QualityTier {
    pub fn from_mape(mape: f64) -> Self {
        if mape < 5.0 {
            QualityTier::Excellent
        } else if mape < 10.0 {
            QualityTier::Good
        } else if mape < 20.0 {
            QualityTier::Acceptable
        } else {
            QualityTier::Poor
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            QualityTier::Excellent => "excellent",
            QualityTier::Good => "good",
            QualityTier::Acceptable => "acceptable",
            QualityTier::Poor => "poor",
        };
        write!(f, "{label}")
    }
}

/// Runs the model forward-only over held-out normalized pairs, inverts the
/// normalization on both predictions and targets, and computes the metrics
/// in original price units.
pub fn evaluate(
    model: &MultiLayerLstm,
    scaler: &MinMaxScaler,
    sequences: &[Vec<f64>],
    targets: &[f64],
) -> Result<EvaluationMetrics, LstmError> {
    if sequences.is_empty() || sequences.len() != targets.len() {
        return Err(LstmError::InvalidInput(format!(
            "evaluation needs matching non-empty partitions, got {} sequences and {} targets",
            sequences.len(),
            targets.len()
        )));
    }
    let mut predictions = Vec::with_capacity(sequences.len());
    for window in sequences {
        predictions.push(scaler.inverse_transform(model.forward(window)?));
    }
    let actuals: Vec<f64> = targets.iter().map(|&t| scaler.inverse_transform(t)).collect();
    compute_metrics(&predictions, &actuals)
}

/// Metric math on already-denormalized values. MAPE divides by the true
/// value; prices are positive in this domain, so a zero actual is a loud
/// computation error, never a silent NaN.
pub fn compute_metrics(predictions: &[f64], actuals: &[f64]) -> Result<EvaluationMetrics, LstmError> {
    let n = predictions.len() as f64;
    let mut mse = 0.0;
    let mut mae = 0.0;
    let mut mape = 0.0;
    for (&pred, &actual) in predictions.iter().zip(actuals.iter()) {
        if actual == 0.0 {
            return Err(LstmError::Computation {
                stage: "evaluation",
                reason: "true value is zero, MAPE undefined".to_string(),
            });
        }
        let err = actual - pred;
        mse += err * err;
        mae += err.abs();
        mape += (err / actual).abs();
    }
    mse /= n;
    mae /= n;
    mape = mape / n * 100.0;
    Ok(EvaluationMetrics { mse, rmse: mse.sqrt(), mae, mape })
}

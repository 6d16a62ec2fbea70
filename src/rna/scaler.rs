// projeto: lstmcotacao
// file: src/rna/scaler.rs

use serde::{Deserialize, Serialize};

use crate::LstmError;

/// Reversible min-max mapping into [0, 1], fitted once over one feature
/// column and persisted next to the model it trained. The pair is a single
/// indivisible artifact: a model without its scaler is unusable.
///
/// `inverse_transform(transform(x)) == x` to floating-point precision for
/// every finite x; every served price depends on that identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MinMaxScaler {
    min: f64,
    max: f64,
}

impl MinMaxScaler {
    /// Computes min and max over the given column. A fit over an empty or
    /// constant series leaves the affine map undefined, which is a fatal
    /// configuration error rather than a silent pass-through.
    pub fn fit(data: &[f64]) -> Result<Self, LstmError> {
        if data.is_empty() {
            return Err(LstmError::DegenerateSeries(
                "cannot fit scaler on an empty series".to_string(),
            ));
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in data {
            if !v.is_finite() {
                return Err(LstmError::DegenerateSeries(format!(
                    "series contains a non-finite value: {v}"
                )));
            }
            min = min.min(v);
            max = max.max(v);
        }
        if min == max {
            return Err(LstmError::DegenerateSeries(format!(
                "constant series (min == max == {min}), normalization undefined"
            )));
        }
        Ok(MinMaxScaler { min, max })
    }

    /// Affine map into [0, 1]. Values outside the fitted range extrapolate
    /// outside [0, 1] by the same formula; no clamping.
    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }

    /// Exact algebraic inverse of `transform`.
    pub fn inverse_transform(&self, normalized: f64) -> f64 {
        normalized * (self.max - self.min) + self.min
    }

    pub fn transform_slice(&self, data: &[f64]) -> Vec<f64> {
        data.iter().map(|&v| self.transform(v)).collect()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

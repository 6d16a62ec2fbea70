// projeto: lstmcotacao
// file: src/rna/data.rs

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::LstmError;
use crate::rna::scaler::MinMaxScaler;

/// One daily bar as produced by the acquisition collaborator. Only the
/// closing price feeds the model; the other columns travel along in the
/// file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRecord {
    pub date: String,
    pub closing: f64,
    #[serde(default)]
    pub opening: f64,
    #[serde(default)]
    pub high: f64,
    #[serde(default)]
    pub low: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub variation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockData {
    pub asset: String,
    pub records: Vec<StockRecord>,
}

/// Ordered closing prices for a single instrument, one per trading day.
/// Immutable once loaded; the order of the source records is preserved.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    asset: String,
    closes: Vec<f64>,
}

impl PriceSeries {
    /// Builds a series from already-validated parts. Fails on an empty or
    /// non-positive series, the same constraints the loader enforces.
    pub fn new(asset: impl Into<String>, closes: Vec<f64>) -> Result<Self, LstmError> {
        if closes.is_empty() {
            return Err(LstmError::InvalidInput("price series is empty".to_string()));
        }
        if let Some(bad) = closes.iter().find(|p| !p.is_finite() || **p <= 0.0) {
            return Err(LstmError::InvalidInput(format!(
                "price series contains a non-positive or non-finite value: {bad}"
            )));
        }
        Ok(PriceSeries { asset: asset.into(), closes })
    }

    /// Loads a TOML records file (the collaborator's output format).
    pub fn load(path: &Path) -> Result<Self, LstmError> {
        let contents = fs::read_to_string(path)?;
        let data: StockData = toml::from_str(&contents)?;
        let closes: Vec<f64> = data.records.iter().map(|r| r.closing).collect();
        let series = Self::new(data.asset, closes)?;
        info!("Loaded {} records for asset {}", series.len(), series.asset());
        Ok(series)
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}

/// Sliding-window transform: for a series of length N and window length L,
/// produces exactly N - L (window, target) pairs, start indices 0..N-L,
/// step 1, in series order. Every target index is strictly greater than
/// every index of its window, so no future value leaks into an input.
/// Returns empty vectors when N <= L.
pub fn create_sequences(data: &[f64], seq_length: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    if seq_length == 0 || data.len() <= seq_length {
        return (Vec::new(), Vec::new());
    }
    let num_sequences = data.len() - seq_length;
    let mut sequences = Vec::with_capacity(num_sequences);
    let mut targets = Vec::with_capacity(num_sequences);
    for i in 0..num_sequences {
        sequences.push(data[i..i + seq_length].to_vec());
        targets.push(data[i + seq_length]);
    }
    (sequences, targets)
}

/// Chronological split: the first `train_ratio` share of the pairs trains,
/// the rest validates. No shuffling.
pub fn train_test_split(
    sequences: Vec<Vec<f64>>,
    targets: Vec<f64>,
    train_ratio: f64,
) -> (Vec<Vec<f64>>, Vec<f64>, Vec<Vec<f64>>, Vec<f64>) {
    let split_idx = (sequences.len() as f64 * train_ratio) as usize;
    let mut sequences = sequences;
    let mut targets = targets;
    let val_x = sequences.split_off(split_idx);
    let val_y = targets.split_off(split_idx);
    (sequences, targets, val_x, val_y)
}

/// Normalized, windowed and split data ready for the training loop, plus the
/// scaler that produced it. The scaler is part of the eventual artifact.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub scaler: MinMaxScaler,
    pub train_x: Vec<Vec<f64>>,
    pub train_y: Vec<f64>,
    pub val_x: Vec<Vec<f64>>,
    pub val_y: Vec<f64>,
}

/// Full preprocessing pipeline: fit the scaler, normalize, window, split.
///
/// With `fit_on_train_only` the scaler sees only the raw prefix that feeds
/// training pairs (`data[..split_idx + seq_length]`); the training windows
/// and targets never reach beyond that index. The default full-series fit
/// reproduces the original flow.
pub fn prepare_dataset(
    series: &PriceSeries,
    seq_length: usize,
    train_ratio: f64,
    fit_on_train_only: bool,
) -> Result<Dataset, LstmError> {
    if seq_length == 0 {
        return Err(LstmError::InvalidInput("seq_length must be >= 1".to_string()));
    }
    let data = series.closes();
    if data.len() <= seq_length {
        return Err(LstmError::InsufficientHistory {
            required: seq_length + 1,
            actual: data.len(),
        });
    }

    let num_sequences = data.len() - seq_length;
    let split_idx = (num_sequences as f64 * train_ratio) as usize;

    let fit_slice = if fit_on_train_only {
        // Training pairs reference raw indices 0 .. split_idx + seq_length - 1.
        &data[..split_idx + seq_length]
    } else {
        data
    };
    let scaler = MinMaxScaler::fit(fit_slice)?;
    let normalized = scaler.transform_slice(data);

    let (sequences, targets) = create_sequences(&normalized, seq_length);
    let (train_x, train_y, val_x, val_y) = train_test_split(sequences, targets, train_ratio);
    info!(
        "Prepared dataset for {}: {} train, {} validation sequences (seq_length {})",
        series.asset(),
        train_x.len(),
        val_x.len(),
        seq_length
    );

    Ok(Dataset { scaler, train_x, train_y, val_x, val_y })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windowing_produces_n_minus_l_pairs() {
        let data: Vec<f64> = (1..=100).map(f64::from).collect();
        let (x, y) = create_sequences(&data, 60);
        assert_eq!(x.len(), 40);
        assert_eq!(y.len(), 40);
    }

    #[test]
    fn windowing_is_empty_when_series_too_short() {
        let data = vec![1.0, 2.0, 3.0];
        let (x, y) = create_sequences(&data, 3);
        assert!(x.is_empty());
        assert!(y.is_empty());
        let (x, y) = create_sequences(&data, 10);
        assert!(x.is_empty());
        assert!(y.is_empty());
    }

    #[test]
    fn windowing_matches_reference_example() {
        // seq_length = 3 over [10..15] is the documented sliding convention.
        let data = vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        let (x, y) = create_sequences(&data, 3);
        assert_eq!(
            x,
            vec![
                vec![10.0, 11.0, 12.0],
                vec![11.0, 12.0, 13.0],
                vec![12.0, 13.0, 14.0],
            ]
        );
        assert_eq!(y, vec![13.0, 14.0, 15.0]);
    }

    #[test]
    fn targets_never_overlap_their_window() {
        let data: Vec<f64> = (0..50).map(f64::from).collect();
        let (x, y) = create_sequences(&data, 7);
        for (window, target) in x.iter().zip(y.iter()) {
            // Values encode their own index, so ordering is checkable directly.
            let max_in_window = window.iter().cloned().fold(f64::MIN, f64::max);
            assert!(*target > max_in_window);
        }
    }

    #[test]
    fn split_is_chronological() {
        let data: Vec<f64> = (0..30).map(f64::from).collect();
        let (x, y) = create_sequences(&data, 5);
        let total = x.len();
        let (tx, ty, vx, vy) = train_test_split(x, y, 0.8);
        assert_eq!(tx.len() + vx.len(), total);
        assert_eq!(tx.len(), (total as f64 * 0.8) as usize);
        // Last train target precedes first validation target.
        assert!(ty.last().unwrap() < vy.first().unwrap());
    }

    #[test]
    fn series_rejects_non_positive_values() {
        assert!(matches!(
            PriceSeries::new("TEST", vec![25.5, -1.0, 26.3]),
            Err(LstmError::InvalidInput(_))
        ));
        assert!(matches!(
            PriceSeries::new("TEST", vec![]),
            Err(LstmError::InvalidInput(_))
        ));
    }

    #[test]
    fn train_only_fit_ignores_validation_extremes() {
        // Maximum sits at the very end: a train-only fit must not see it.
        let mut closes: Vec<f64> = (1..=40).map(f64::from).collect();
        closes.push(1000.0);
        let series = PriceSeries::new("TEST", closes.clone()).unwrap();

        let full = prepare_dataset(&series, 5, 0.8, false).unwrap();
        assert_eq!(full.scaler.max(), 1000.0);

        let train_only = prepare_dataset(&series, 5, 0.8, true).unwrap();
        let num_sequences = closes.len() - 5;
        let split_idx = (num_sequences as f64 * 0.8) as usize;
        assert_eq!(train_only.scaler.max(), closes[split_idx + 5 - 1]);
        assert_eq!(train_only.scaler.min(), 1.0);
    }

    #[test]
    fn prepare_dataset_requires_enough_history() {
        let series = PriceSeries::new("TEST", vec![1.0, 2.0, 3.0]).unwrap();
        match prepare_dataset(&series, 3, 0.8, false) {
            Err(LstmError::InsufficientHistory { required, actual }) => {
                assert_eq!(required, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("expected InsufficientHistory, got {other:?}"),
        }
    }
}

// projeto: lstmcotacao
// file: src/rna/storage.rs

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::LstmError;
use crate::rna::model::MultiLayerLstm;
use crate::rna::scaler::MinMaxScaler;

pub const MODEL_FILE: &str = "lstm_model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const RUN_CONFIG_FILE: &str = "run_config.toml";

pub const RUN_CONFIG_VERSION: u32 = 1;

/// Weights-and-metadata blob: the trained network (which carries its own
/// ModelConfig), the loss histories, and the headline losses. Written once
/// per completed run; a retrain produces a new artifact, never an in-place
/// update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceModelArtifact {
    pub model: MultiLayerLstm,
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
    pub final_train_loss: f64,
    pub final_val_loss: f64,
    pub best_val_loss: f64,
    pub best_epoch: usize,
    pub timestamp: String,
}

/// Versioned run description. Unknown or missing fields fail the load;
/// nothing defaults silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub version: u32,
    pub seq_length: usize,
    pub asset: String,
    pub train_split: f64,
    pub input_size: usize,
    pub n_train_samples: usize,
    pub n_val_samples: usize,
}

/// Writes the three artifact files into `dir`. They form one logical unit;
/// the loader refuses anything less than all three.
pub fn save_artifacts(
    dir: &Path,
    artifact: &SequenceModelArtifact,
    scaler: &MinMaxScaler,
    run_config: &RunConfig,
) -> Result<(), LstmError> {
    fs::create_dir_all(dir)?;

    let model_path = dir.join(MODEL_FILE);
    fs::write(&model_path, serde_json::to_string_pretty(artifact)?)?;
    info!("Model saved to {}", model_path.display());

    let scaler_path = dir.join(SCALER_FILE);
    fs::write(&scaler_path, serde_json::to_string_pretty(scaler)?)?;
    info!("Scaler saved to {}", scaler_path.display());

    let config_path = dir.join(RUN_CONFIG_FILE);
    fs::write(&config_path, toml::to_string_pretty(run_config)?)?;
    info!("Run config saved to {}", config_path.display());

    Ok(())
}

fn read_part(dir: &Path, file: &'static str) -> Result<String, LstmError> {
    fs::read_to_string(dir.join(file)).map_err(|e| LstmError::ArtifactLoad {
        part: file,
        reason: e.to_string(),
    })
}

/// Loads the triple as one unit. Any missing file, parse failure, weight
/// shape mismatch or cross-file disagreement rejects the whole load; there
/// is no partial success.
pub fn load_artifacts(
    dir: &Path,
) -> Result<(SequenceModelArtifact, MinMaxScaler, RunConfig), LstmError> {
    let artifact: SequenceModelArtifact = serde_json::from_str(&read_part(dir, MODEL_FILE)?)
        .map_err(|e| LstmError::ArtifactLoad { part: MODEL_FILE, reason: e.to_string() })?;
    let scaler: MinMaxScaler = serde_json::from_str(&read_part(dir, SCALER_FILE)?)
        .map_err(|e| LstmError::ArtifactLoad { part: SCALER_FILE, reason: e.to_string() })?;
    let run_config: RunConfig = toml::from_str(&read_part(dir, RUN_CONFIG_FILE)?)
        .map_err(|e| LstmError::ArtifactLoad { part: RUN_CONFIG_FILE, reason: e.to_string() })?;

    // The persisted weights must rebuild the exact architecture the config
    // describes; anything else is rejected as a unit.
    artifact.model.validate_shapes()?;

    if run_config.version != RUN_CONFIG_VERSION {
        return Err(LstmError::ArtifactLoad {
            part: RUN_CONFIG_FILE,
            reason: format!(
                "unsupported run config version {} (expected {})",
                run_config.version, RUN_CONFIG_VERSION
            ),
        });
    }
    let model_config = artifact.model.config();
    if run_config.seq_length != model_config.seq_length {
        return Err(LstmError::ArtifactLoad {
            part: RUN_CONFIG_FILE,
            reason: format!(
                "seq_length {} disagrees with model config seq_length {}",
                run_config.seq_length, model_config.seq_length
            ),
        });
    }
    if run_config.input_size != model_config.input_size {
        return Err(LstmError::ArtifactLoad {
            part: RUN_CONFIG_FILE,
            reason: format!(
                "input_size {} disagrees with model config input_size {}",
                run_config.input_size, model_config.input_size
            ),
        });
    }

    info!(
        "Artifact triple loaded from {}: asset {}, seq_length {}, {} parameters",
        dir.display(),
        run_config.asset,
        run_config.seq_length,
        artifact.model.num_parameters()
    );
    Ok((artifact, scaler, run_config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rna::model::ModelConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample_triple() -> (SequenceModelArtifact, MinMaxScaler, RunConfig) {
        let config = ModelConfig {
            input_size: 1,
            hidden_size: 4,
            num_layers: 2,
            dropout_rate: 0.2,
            seq_length: 6,
        };
        let mut rng = StdRng::seed_from_u64(13);
        let model = MultiLayerLstm::new(config, &mut rng).unwrap();
        let artifact = SequenceModelArtifact {
            model,
            train_losses: vec![0.5, 0.3, 0.2],
            val_losses: vec![0.6, 0.4, 0.35],
            final_train_loss: 0.2,
            final_val_loss: 0.35,
            best_val_loss: 0.35,
            best_epoch: 3,
            timestamp: "2024-01-01T00:00:00+00:00".to_string(),
        };
        let scaler = MinMaxScaler::fit(&[10.0, 50.0]).unwrap();
        let run_config = RunConfig {
            version: RUN_CONFIG_VERSION,
            seq_length: 6,
            asset: "PETR4".to_string(),
            train_split: 0.8,
            input_size: 1,
            n_train_samples: 100,
            n_val_samples: 25,
        };
        (artifact, scaler, run_config)
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join("lstmcotacao_storage_roundtrip");
        let _ = fs::remove_dir_all(&dir);
        let (artifact, scaler, run_config) = sample_triple();
        save_artifacts(&dir, &artifact, &scaler, &run_config).unwrap();

        let (loaded, loaded_scaler, loaded_config) = load_artifacts(&dir).unwrap();
        assert_eq!(loaded_scaler, scaler);
        assert_eq!(loaded_config, run_config);
        assert_eq!(loaded.best_epoch, artifact.best_epoch);

        // Idempotent load: identical forward outputs, bit for bit.
        let (loaded_again, _, _) = load_artifacts(&dir).unwrap();
        let window = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let a = loaded.model.forward(&window).unwrap();
        let b = loaded_again.model.forward(&window).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_part_rejects_the_whole_load() {
        let dir = std::env::temp_dir().join("lstmcotacao_storage_missing");
        let _ = fs::remove_dir_all(&dir);
        let (artifact, scaler, run_config) = sample_triple();
        save_artifacts(&dir, &artifact, &scaler, &run_config).unwrap();
        fs::remove_file(dir.join(SCALER_FILE)).unwrap();

        match load_artifacts(&dir) {
            Err(LstmError::ArtifactLoad { part, .. }) => assert_eq!(part, SCALER_FILE),
            other => panic!("expected ArtifactLoad, got {other:?}"),
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unparsable_run_config_is_rejected() {
        let dir = std::env::temp_dir().join("lstmcotacao_storage_corrupt");
        let _ = fs::remove_dir_all(&dir);
        let (artifact, scaler, run_config) = sample_triple();
        save_artifacts(&dir, &artifact, &scaler, &run_config).unwrap();
        fs::write(dir.join(RUN_CONFIG_FILE), "not = valid = toml").unwrap();

        assert!(matches!(
            load_artifacts(&dir),
            Err(LstmError::ArtifactLoad { part: RUN_CONFIG_FILE, .. })
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn seq_length_disagreement_is_rejected() {
        let dir = std::env::temp_dir().join("lstmcotacao_storage_mismatch");
        let _ = fs::remove_dir_all(&dir);
        let (artifact, scaler, mut run_config) = sample_triple();
        run_config.seq_length = 99;
        save_artifacts(&dir, &artifact, &scaler, &run_config).unwrap();

        assert!(matches!(
            load_artifacts(&dir),
            Err(LstmError::ArtifactLoad { part: RUN_CONFIG_FILE, .. })
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn extra_run_config_fields_are_rejected() {
        let dir = std::env::temp_dir().join("lstmcotacao_storage_extra");
        let _ = fs::remove_dir_all(&dir);
        let (artifact, scaler, run_config) = sample_triple();
        save_artifacts(&dir, &artifact, &scaler, &run_config).unwrap();
        let mut text = fs::read_to_string(dir.join(RUN_CONFIG_FILE)).unwrap();
        text.push_str("\nmystery_field = 42\n");
        fs::write(dir.join(RUN_CONFIG_FILE), text).unwrap();

        assert!(matches!(
            load_artifacts(&dir),
            Err(LstmError::ArtifactLoad { part: RUN_CONFIG_FILE, .. })
        ));
        let _ = fs::remove_dir_all(&dir);
    }
}

/*!
Persisting trained generators, together with the scalers fit alongside them
*/
use super::{GanDesc, Generator, RunId};
use crate::data::scale::MinMaxScaler;
use crate::ForecastError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tch::{Device, Tensor};
use tracing::{debug, info};

/// The name of the extra tensor holding a generator's run id in its weights file
pub const RUN_ID_TENSOR: &str = "__run_id";

/// A trained generator and the scaler fit during the same training run
#[derive(Debug)]
pub struct TrainedModel {
    /// The generator
    pub generator: Generator,
    /// The scaler mapping real rows into the generator's input range
    pub scaler: MinMaxScaler,
    /// The run which fit `scaler`
    pub scaler_run: RunId,
    /// When the model was trained
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    /// Pair a freshly trained generator with its scaler, tagging both with a new run id
    pub fn fresh(mut generator: Generator, scaler: MinMaxScaler) -> TrainedModel {
        let run = RunId::fresh();
        generator.set_run_id(Some(run));
        TrainedModel {
            generator,
            scaler,
            scaler_run: run,
            trained_at: Utc::now(),
        }
    }
    /// The shared run id of the generator and scaler, or a `StaleScaler` error if they differ
    pub fn check_pairing(&self, symbol: &str) -> Result<RunId, ForecastError> {
        match self.generator.run_id() {
            Some(run) if run == self.scaler_run => Ok(run),
            weights => Err(ForecastError::StaleScaler {
                symbol: symbol.to_string(),
                weights,
                scaler: Some(self.scaler_run),
            }),
        }
    }
}

/// The scaler file written next to a generator's weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerRecord {
    /// The symbol the model was trained for
    pub symbol: String,
    /// The training run which fit the scaler
    pub run_id: RunId,
    /// When the model was trained
    pub trained_at: DateTime<Utc>,
    /// The fitted scaler
    pub scaler: MinMaxScaler,
}

/// The result of looking for a persisted model
#[derive(Debug)]
pub enum LoadOutcome {
    /// Weights and a matching scaler were found
    Loaded(TrainedModel),
    /// No weights exist for the symbol
    NotFound,
}

/// A directory of per-symbol model files. Each symbol has exactly one model on disk; saving overwrites it
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
    desc: GanDesc,
    device: Device,
}

impl ModelStore {
    /// A store in a directory, loading generators with the given architecture onto a device
    pub fn new(dir: impl Into<PathBuf>, desc: GanDesc, device: Device) -> ModelStore {
        ModelStore {
            dir: dir.into(),
            desc,
            device,
        }
    }
    /// The directory holding the models
    pub fn dir(&self) -> &Path {
        &self.dir
    }
    /// The generator weights file for a symbol
    pub fn weights_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("generator_{}.ot", symbol))
    }
    /// The scaler record file for a symbol
    pub fn scaler_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("generator_{}.scaler.json", symbol))
    }
    /// Persist a trained model's generator parameters and scaler, overwriting any previous model for the symbol
    pub fn save(&self, symbol: &str, model: &TrainedModel) -> Result<(), ForecastError> {
        let run = model.check_pairing(symbol)?;
        fs::create_dir_all(&self.dir)?;

        let mut named: Vec<(String, Tensor)> = model
            .generator
            .var_store()
            .variables()
            .into_iter()
            .collect();
        named.push((
            RUN_ID_TENSOR.to_string(),
            Tensor::from_slice(&[run.0 as i64]),
        ));
        let weights = self.weights_path(symbol);
        Tensor::save_multi(&named, &weights)?;

        let record = ScalerRecord {
            symbol: symbol.to_string(),
            run_id: run,
            trained_at: model.trained_at,
            scaler: model.scaler.clone(),
        };
        fs::write(self.scaler_path(symbol), serde_json::to_string_pretty(&record)?)?;
        info!("Saved model for {} (run {}) to {}", symbol, run, weights.display());
        Ok(())
    }
    /// Load a symbol's model. Missing weights are `NotFound`; weights without a matching scaler are an error
    pub fn load(&self, symbol: &str) -> Result<LoadOutcome, ForecastError> {
        let weights = self.weights_path(symbol);
        if !weights.exists() {
            debug!("No weights for {} at {}", symbol, weights.display());
            return Ok(LoadOutcome::NotFound);
        }
        let weights_run = Tensor::load_multi(&weights)?
            .into_iter()
            .find(|(name, _)| name == RUN_ID_TENSOR)
            .map(|(_, tag)| RunId(tag.int64_value(&[0]) as u64));

        let mut generator = Generator::new(&self.desc, self.device);
        generator.var_store_mut().load(&weights)?;
        generator.set_run_id(weights_run);

        let scaler_path = self.scaler_path(symbol);
        let record: Option<ScalerRecord> = if scaler_path.exists() {
            Some(serde_json::from_str(&fs::read_to_string(&scaler_path)?)?)
        } else {
            None
        };
        let record = match (weights_run, record) {
            (Some(run), Some(record)) if record.run_id == run => record,
            (weights, record) => {
                return Err(ForecastError::StaleScaler {
                    symbol: symbol.to_string(),
                    weights,
                    scaler: record.map(|record| record.run_id),
                })
            }
        };
        if !record.scaler.is_valid() {
            return Err(ForecastError::CorruptModel {
                symbol: symbol.to_string(),
                reason: format!("scaler has {} features", record.scaler.min.len()),
            });
        }
        info!("Loaded model for {} (run {})", symbol, record.run_id);
        Ok(LoadOutcome::Loaded(TrainedModel {
            generator,
            scaler: record.scaler,
            scaler_run: record.run_id,
            trained_at: record.trained_at,
        }))
    }
}

/*!
Configuration, read from a TOML file in which every field is optional
*/
use crate::data::{csv::CsvDirectory, fake::FakeMarket, polygon::PolygonClient, MarketData};
use crate::gan::{train::TrainingConfig, GanDesc};
use crate::predictor::PredictorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tch::Device;
use thiserror::Error;

/// Errors reading or applying a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("could not read {}: {source}", path.display())]
    Io {
        /// The file being read
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for a `Config`
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// A device name could not be parsed
    #[error("unknown device {0:?}, expected cpu, cuda, cuda:N or auto")]
    Device(String),
    /// An environment variable required by the configuration is not set
    #[error("missing environment variable: {0}")]
    MissingEnvVar(String),
    /// A field holds a value which can never work
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// The offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Where daily bars come from
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// The Polygon REST API
    Polygon,
    /// A directory of `<SYMBOL>.csv` files
    Csv,
    /// A deterministic random walk per symbol
    Fake,
}

/// The `[data]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// The market data provider
    pub source: DataSource,
    /// The directory read by the `csv` source
    pub csv_dir: PathBuf,
    /// The environment variable holding the Polygon API key
    pub api_key_env: String,
    /// Years of history fetched for training
    pub history_years: u32,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: DataSource::Polygon,
            csv_dir: PathBuf::from("data"),
            api_key_env: "POLYGON_API_KEY".to_string(),
            history_years: 14,
        }
    }
}

/// The `[model]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Rows per input window
    pub seq_length: usize,
    /// LSTM layer sizes, bottom first
    pub hidden: Vec<usize>,
    /// Where models are persisted
    pub model_dir: PathBuf,
    /// `cpu`, `cuda`, `cuda:N` or `auto`
    pub device: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let desc = GanDesc::default();
        Self {
            seq_length: desc.seq_length,
            hidden: desc.hidden,
            model_dir: PathBuf::from("models"),
            device: "cpu".to_string(),
        }
    }
}

/// The `[forecast]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Calendar days of history fetched to seed a forecast
    pub lookback_days: u32,
    /// Default number of days forecast
    pub horizon: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            lookback_days: 100,
            horizon: 15,
        }
    }
}

const SECONDS_PER_HOUR: u64 = 60 * 60;

/// The `[schedule]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Hours between retraining runs
    pub interval_hours: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { interval_hours: 24 }
    }
}

impl ScheduleConfig {
    /// The retraining interval, or `None` if it does not fit in a `Duration`
    pub fn checked_interval(&self) -> Option<Duration> {
        self.interval_hours.checked_mul(SECONDS_PER_HOUR).map(Duration::from_secs)
    }
    /// The retraining interval, saturating at the longest representable one
    pub fn interval(&self) -> Duration {
        self.checked_interval()
            .unwrap_or(Duration::from_secs(u64::MAX))
    }
}

/// The whole configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The tracked symbols
    pub symbols: Vec<String>,
    /// Data source settings
    pub data: DataConfig,
    /// Model architecture and storage
    pub model: ModelConfig,
    /// Training hyperparameters
    pub training: TrainingConfig,
    /// Forecast settings
    pub forecast: ForecastConfig,
    /// Retraining schedule
    pub schedule: ScheduleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: ["AAPL", "GOOGL", "MSFT", "AMZN"]
                .iter()
                .map(|symbol| symbol.to_string())
                .collect(),
            data: DataConfig::default(),
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
            forecast: ForecastConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

/// Parse a device name
pub fn parse_device(name: &str) -> Result<Device, ConfigError> {
    let name = name.trim().to_lowercase();
    match name.as_str() {
        "cpu" => Ok(Device::Cpu),
        "cuda" => Ok(Device::Cuda(0)),
        "auto" => Ok(Device::cuda_if_available()),
        _ => name
            .strip_prefix("cuda:")
            .and_then(|index| index.parse().ok())
            .map(Device::Cuda)
            .ok_or_else(|| ConfigError::Device(name.clone())),
    }
}

impl Config {
    /// Parse a configuration from TOML
    pub fn from_toml_str(content: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
    /// Read a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_toml_str(&content)
    }
    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
    /// Reject values no run could succeed with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };
        if self.model.seq_length == 0 {
            return invalid("model.seq_length", "must be positive");
        }
        if self.model.hidden.is_empty() || self.model.hidden.contains(&0) {
            return invalid("model.hidden", "needs at least one layer, all of positive size");
        }
        if self.training.batch_size == 0 {
            return invalid("training.batch_size", "must be positive");
        }
        if !(self.training.learning_rate > 0.0) {
            return invalid("training.learning_rate", "must be positive");
        }
        if self.schedule.interval_hours == 0 {
            return invalid("schedule.interval_hours", "must be positive");
        }
        if self.schedule.checked_interval().is_none() {
            return invalid("schedule.interval_hours", "is too large");
        }
        parse_device(&self.model.device)?;
        Ok(())
    }
    /// The device models live on
    pub fn device(&self) -> Result<Device, ConfigError> {
        parse_device(&self.model.device)
    }
    /// The model architecture
    pub fn gan_desc(&self) -> GanDesc {
        GanDesc {
            seq_length: self.model.seq_length,
            hidden: self.model.hidden.clone(),
            ..GanDesc::default()
        }
    }
    /// Settings for a `Predictor`
    pub fn predictor(&self) -> Result<PredictorConfig, ConfigError> {
        Ok(PredictorConfig {
            symbols: self.symbols.clone(),
            desc: self.gan_desc(),
            training: self.training.clone(),
            history_years: self.data.history_years,
            lookback_days: self.forecast.lookback_days,
            model_dir: self.model.model_dir.clone(),
            device: self.device()?,
        })
    }
    /// Connect to the configured market data provider
    pub fn market(&self) -> Result<Box<dyn MarketData>, ConfigError> {
        Ok(match self.data.source {
            DataSource::Polygon => {
                let key = std::env::var(&self.data.api_key_env)
                    .map_err(|_| ConfigError::MissingEnvVar(self.data.api_key_env.clone()))?;
                Box::new(PolygonClient::new(key))
            }
            DataSource::Csv => Box::new(CsvDirectory::new(self.data.csv_dir.clone())),
            DataSource::Fake => Box::new(FakeMarket::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.symbols, vec!["AAPL", "GOOGL", "MSFT", "AMZN"]);
        assert_eq!(config.data.source, DataSource::Polygon);
        assert_eq!(config.data.api_key_env, "POLYGON_API_KEY");
        assert_eq!(config.data.history_years, 14);
        assert_eq!(config.model.seq_length, 60);
        assert_eq!(config.forecast.lookback_days, 100);
        assert_eq!(config.forecast.horizon, 15);
        assert_eq!(config.schedule.interval(), Duration::from_secs(24 * 3600));
        assert_eq!(config.gan_desc(), GanDesc::default());
    }

    #[test]
    fn partial_tables_keep_defaults() {
        let config = Config::from_toml_str(
            r#"
            symbols = ["TSLA"]

            [data]
            source = "fake"

            [training]
            epochs = 5
            seed = 42
            "#,
        )
        .unwrap();
        assert_eq!(config.symbols, vec!["TSLA"]);
        assert_eq!(config.data.source, DataSource::Fake);
        assert_eq!(config.data.history_years, 14);
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.training.seed, Some(42));
        assert_eq!(config.training.batch_size, 32);
        assert!(config.market().is_ok());
    }

    #[test]
    fn toml_round_trip() {
        let config = Config::default();
        let parsed = Config::from_toml_str(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_toml_str("[model]\nseq_length = 0"),
            Err(ConfigError::Invalid { field: "model.seq_length", .. })
        ));
        assert!(matches!(
            Config::from_toml_str("[model]\ndevice = \"tpu\""),
            Err(ConfigError::Device(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[schedule]\ninterval_hours = 0"),
            Err(ConfigError::Invalid { field: "schedule.interval_hours", .. })
        ));
        assert!(matches!(
            Config::from_toml_str(&format!("[schedule]\ninterval_hours = {}", u64::MAX / 60)),
            Err(ConfigError::Invalid { field: "schedule.interval_hours", .. })
        ));
        assert!(matches!(
            Config::from_toml_str("[data]\nsource = \"bloomberg\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn devices() {
        assert_eq!(parse_device("cpu").unwrap(), Device::Cpu);
        assert_eq!(parse_device("CUDA").unwrap(), Device::Cuda(0));
        assert_eq!(parse_device("cuda:2").unwrap(), Device::Cuda(2));
        assert!(parse_device("cuda:x").is_err());
    }

    #[test]
    fn missing_api_key() {
        let mut config = Config::default();
        config.data.api_key_env = "STOCKGAN_TEST_UNSET_KEY".to_string();
        assert!(matches!(
            config.market(),
            Err(ConfigError::MissingEnvVar(var)) if var == "STOCKGAN_TEST_UNSET_KEY"
        ));
    }
}

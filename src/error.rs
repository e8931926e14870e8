/*!
Error types for the forecasting core
*/
use crate::data::DataError;
use crate::gan::RunId;
use thiserror::Error;

/// Errors raised while preprocessing, training, persisting or forecasting
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Not enough rows to build a window (or a feature table) of the required length
    #[error("insufficient data: needed {needed} rows, got {available}")]
    InsufficientData {
        /// The number of rows required
        needed: usize,
        /// The number of rows actually available
        available: usize,
    },
    /// The market data provider could not deliver bars for a symbol
    #[error("data unavailable for {symbol}")]
    DataUnavailable {
        /// The symbol being fetched
        symbol: String,
        /// The underlying provider error
        #[source]
        source: DataError,
    },
    /// The scaler paired with a model was fit during a different training run than its weights
    #[error(
        "stale scaler for {symbol}: weights from run {}, scaler from run {}",
        display_run(.weights),
        display_run(.scaler)
    )]
    StaleScaler {
        /// The symbol whose model is mismatched
        symbol: String,
        /// The run which produced the weights, if the weights are tagged at all
        weights: Option<RunId>,
        /// The run which produced the scaler, if any scaler was found
        scaler: Option<RunId>,
    },
    /// A persisted model exists but cannot be used
    #[error("corrupt model for {symbol}: {reason}")]
    CorruptModel {
        /// The symbol whose model is corrupt
        symbol: String,
        /// What is wrong with it
        reason: String,
    },
    /// The symbol is not tracked by the predictor
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
    /// No trained model is available for the symbol, even after attempting to train one
    #[error("no trained model available for {0}")]
    ModelUnavailable(String),
    /// An error from the tensor library
    #[error("model error: {0}")]
    Model(#[from] tch::TchError),
    /// A filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A scaler record could not be (de)serialized
    #[error("scaler record error: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_run(run: &Option<RunId>) -> String {
    match run {
        Some(run) => run.to_string(),
        None => "<missing>".to_string(),
    }
}

impl ForecastError {
    /// Shorthand for an `InsufficientData` error
    pub fn insufficient(needed: usize, available: usize) -> ForecastError {
        ForecastError::InsufficientData { needed, available }
    }
}

/*!
The predictor: owns a trained model per tracked symbol, trains and persists them, and rolls forecasts out of them
*/
use crate::data::{scale::MinMaxScaler, Bar, FeatureRow, MarketData};
use crate::gan::store::{LoadOutcome, ModelStore, TrainedModel};
use crate::gan::train::{Trainer, TrainingConfig, TrainingSummary};
use crate::gan::{GanDesc, Generator, RunId};
use crate::preprocess::{features, last_window, preprocess, training_windows};
use crate::util::{days_before, is_weekday, years_before};
use crate::ForecastError;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use tch::Device;
use tracing::{info, warn};

/// Anything which can predict the next scaled row of a window of scaled rows
pub trait StepModel {
    /// Predict the row following `window`
    fn predict_next(&self, window: &[FeatureRow]) -> Result<FeatureRow, ForecastError>;
}

impl StepModel for Generator {
    #[inline]
    fn predict_next(&self, window: &[FeatureRow]) -> Result<FeatureRow, ForecastError> {
        self.predict(window)
    }
}

/// Roll a model forward `horizon` steps from a window of scaled rows.
///
/// Each predicted row is pushed onto the end of a fixed-size buffer, evicting the oldest row, so every step sees a
/// window of the same length. Returned rows are inverse-scaled into real units.
pub fn rollout<S: StepModel + ?Sized>(
    model: &S,
    scaler: &MinMaxScaler,
    window: &[FeatureRow],
    horizon: usize,
) -> Result<Vec<FeatureRow>, ForecastError> {
    if window.is_empty() {
        return Err(ForecastError::insufficient(1, 0));
    }
    let mut buffer: VecDeque<FeatureRow> = window.iter().copied().collect();
    let mut rows = Vec::with_capacity(horizon);
    for _ in 0..horizon {
        let next = model.predict_next(buffer.make_contiguous())?;
        rows.push(scaler.inverse_transform(&next));
        buffer.pop_front();
        buffer.push_back(next);
    }
    Ok(rows)
}

/// Settings for a `Predictor`
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorConfig {
    /// The tracked symbols, in training order
    pub symbols: Vec<String>,
    /// The architecture of every model
    pub desc: GanDesc,
    /// Training hyperparameters
    pub training: TrainingConfig,
    /// Years of history fetched for training
    pub history_years: u32,
    /// Calendar days of history fetched to seed a forecast
    pub lookback_days: u32,
    /// Where models are persisted
    pub model_dir: PathBuf,
    /// The device models live on
    pub device: Device,
}

impl Default for PredictorConfig {
    fn default() -> PredictorConfig {
        PredictorConfig {
            symbols: ["AAPL", "GOOGL", "MSFT", "AMZN"]
                .iter()
                .map(|symbol| symbol.to_string())
                .collect(),
            desc: GanDesc::default(),
            training: TrainingConfig::default(),
            history_years: 14,
            lookback_days: 100,
            model_dir: PathBuf::from("models"),
            device: Device::Cpu,
        }
    }
}

/// The trained models currently available, by symbol
pub type Registry = BTreeMap<String, TrainedModel>;

/// The result of `Predictor::load_all`
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Symbols whose models were loaded
    pub loaded: Vec<String>,
    /// Symbols with no persisted model
    pub not_found: Vec<String>,
    /// Symbols whose persisted model could not be used
    pub failed: Vec<(String, ForecastError)>,
}

/// The result of `Predictor::train_all`
#[derive(Debug, Default)]
pub struct TrainReport {
    /// Symbols trained, with their final losses
    pub trained: Vec<(String, TrainingSummary)>,
    /// Symbols which failed to train
    pub failed: Vec<(String, ForecastError)>,
}

impl TrainReport {
    /// Whether every symbol trained
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A forecast of the rows following a symbol's recent history
#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    /// The symbol forecast
    pub symbol: String,
    /// The training run of the model used
    pub run_id: RunId,
    /// The predicted rows, in real units, one per future trading day
    pub rows: Vec<FeatureRow>,
    /// The bars the forecast was seeded from
    pub history: Vec<Bar>,
}

impl Forecast {
    /// The trading days the forecast rows fall on, assuming they follow the last bar of history
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut date = match self.history.last() {
            Some(bar) => bar.date,
            None => return Vec::new(),
        };
        let mut dates = Vec::with_capacity(self.rows.len());
        while dates.len() < self.rows.len() {
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
            if is_weekday(date) {
                dates.push(date)
            }
        }
        dates
    }
    /// The predicted closing prices
    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(|row| row.close)
    }
}

/// Trains, persists, loads and forecasts from one model per tracked symbol
pub struct Predictor<M> {
    config: PredictorConfig,
    market: M,
    store: ModelStore,
    registry: Registry,
    as_of: Option<NaiveDate>,
}

impl<M: MarketData> Predictor<M> {
    /// A predictor with an empty registry
    pub fn new(config: PredictorConfig, market: M) -> Predictor<M> {
        let store = ModelStore::new(config.model_dir.clone(), config.desc.clone(), config.device);
        Predictor {
            config,
            market,
            store,
            registry: Registry::new(),
            as_of: None,
        }
    }
    /// Pin the date data is fetched up to (exclusive), instead of using today's date
    pub fn as_of(mut self, date: NaiveDate) -> Predictor<M> {
        self.as_of = Some(date);
        self
    }
    /// The date data is fetched up to (exclusive)
    pub fn today(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }
    /// The configuration in use
    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }
    /// The tracked symbols
    pub fn symbols(&self) -> &[String] {
        &self.config.symbols
    }
    /// The models currently available
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
    /// The model store
    pub fn store(&self) -> &ModelStore {
        &self.store
    }
    /// The market data provider
    pub fn market(&self) -> &M {
        &self.market
    }
    fn tracks(&self, symbol: &str) -> bool {
        self.config.symbols.iter().any(|tracked| tracked == symbol)
    }
    fn fetch(&self, symbol: &str, start: NaiveDate) -> Result<Vec<Bar>, ForecastError> {
        self.market
            .fetch(symbol, start, self.today())
            .map_err(|source| ForecastError::DataUnavailable {
                symbol: symbol.to_string(),
                source,
            })
    }
    /// Load every tracked symbol's persisted model into the registry
    pub fn load_all(&mut self) -> LoadReport {
        let mut report = LoadReport::default();
        for symbol in self.config.symbols.clone() {
            match self.store.load(&symbol) {
                Ok(LoadOutcome::Loaded(model)) => {
                    self.registry.insert(symbol.clone(), model);
                    report.loaded.push(symbol);
                }
                Ok(LoadOutcome::NotFound) => {
                    info!("No saved model for {}", symbol);
                    report.not_found.push(symbol);
                }
                Err(err) => {
                    warn!("Could not load model for {}: {}", symbol, err);
                    report.failed.push((symbol, err));
                }
            }
        }
        report
    }
    /// Train every tracked symbol. A failure for one symbol does not stop the others
    pub fn train_all(&mut self) -> TrainReport {
        let mut report = TrainReport::default();
        for symbol in self.config.symbols.clone() {
            match self.train_symbol(&symbol) {
                Ok(summary) => report.trained.push((symbol, summary)),
                Err(err) => {
                    warn!("Training failed for {}: {}", symbol, err);
                    report.failed.push((symbol, err));
                }
            }
        }
        info!(
            "Trained {} of {} symbols",
            report.trained.len(),
            self.config.symbols.len()
        );
        report
    }
    /// Fetch a symbol's history, train a fresh model on it, persist it, and install it in the registry
    pub fn train_symbol(&mut self, symbol: &str) -> Result<TrainingSummary, ForecastError> {
        let start = years_before(self.today(), self.config.history_years);
        let bars = self.fetch(symbol, start)?;
        info!("Training {} on {} bars from {}", symbol, bars.len(), start);
        let (rows, scaler) = preprocess(&bars)?;
        let windows = training_windows(&rows, self.config.desc.seq_length)?;

        if let Some(seed) = self.config.training.seed {
            tch::manual_seed(seed as i64);
        }
        let mut gan = self.config.desc.build(self.config.device);
        let summary = Trainer::new(self.config.training.clone()).train(&mut gan, &windows)?;

        let model = TrainedModel::fresh(gan.generator, scaler);
        self.store.save(symbol, &model)?;
        self.registry.insert(symbol.to_string(), model);
        Ok(summary)
    }
    /// Forecast the next `horizon` rows of a tracked symbol.
    ///
    /// If `symbol` has no model, every tracked symbol is trained first, and if
    /// `symbol` then fails to train its training error is returned.
    pub fn forecast(&mut self, symbol: &str, horizon: usize) -> Result<Forecast, ForecastError> {
        if !self.tracks(symbol) {
            return Err(ForecastError::UnknownSymbol(symbol.to_string()));
        }
        if !self.registry.contains_key(symbol) {
            warn!("No model for {}, training all symbols", symbol);
            let mut report = self.train_all();
            if let Some(i) = report.failed.iter().position(|(failed, _)| failed == symbol) {
                return Err(report.failed.swap_remove(i).1);
            }
        }
        let model = self
            .registry
            .get(symbol)
            .ok_or_else(|| ForecastError::ModelUnavailable(symbol.to_string()))?;
        let run_id = model.check_pairing(symbol)?;

        let start = days_before(self.today(), self.config.lookback_days);
        let history = self.fetch(symbol, start)?;
        let rows = model.scaler.transform_all(&features(&history));
        let window = last_window(&rows, self.config.desc.seq_length)?;
        let rows = rollout(&model.generator, &model.scaler, window, horizon)?;
        info!("Forecast {} rows for {} with run {}", rows.len(), symbol, run_id);
        Ok(Forecast {
            symbol: symbol.to_string(),
            run_id,
            rows,
            history,
        })
    }
}

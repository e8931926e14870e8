/*!
Train, load, and forecast from per-symbol stock GANs
*/
use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use stockgan::analysis::{moving_average, rsi, StockSummary, MOVING_AVERAGE_PERIODS, RSI_PERIOD};
use stockgan::config::Config;
use stockgan::data::MarketData;
use stockgan::gan::RunId;
use stockgan::predictor::{Forecast, Predictor, TrainReport};
use stockgan::scheduler::Scheduler;
use stockgan::util::years_before;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// The configuration file read when `--config` is not given, if it exists
const DEFAULT_CONFIG: &str = "stockgan.toml";

/// Years of history summarized; enough to warm up the longest moving average
const SUMMARY_YEARS: u32 = 1;

/// Calendar days covered by the summary's high, low and averages
const SUMMARY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Parser)]
#[command(name = "stockgan", version, about = "Recurrent GAN stock forecasting")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory models are saved to and loaded from
    #[arg(long)]
    model_dir: Option<PathBuf>,
    /// Device to run models on: cpu, cuda, cuda:N or auto
    #[arg(long)]
    device: Option<String>,
    /// Log more; repeat for even more
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Train and save models for the given symbols, or every configured symbol
    Train { symbols: Vec<String> },
    /// Load every configured symbol's saved model and report what was found
    Load,
    /// Forecast a symbol, training models first if none are saved
    Forecast {
        symbol: String,
        /// Trading days to forecast
        #[arg(short, long)]
        days: Option<usize>,
        /// Print the forecast as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print technical-analysis figures for a symbol
    Summary { symbol: String },
    /// Retrain every configured symbol on the configured schedule, forever
    Schedule,
}

#[derive(Debug, Serialize)]
struct ForecastDay {
    date: NaiveDate,
    close: f64,
    ret: f64,
}

#[derive(Debug, Serialize)]
struct ForecastOutput {
    symbol: String,
    run_id: RunId,
    last_close: Option<f64>,
    days: Vec<ForecastDay>,
}

impl From<&Forecast> for ForecastOutput {
    fn from(forecast: &Forecast) -> ForecastOutput {
        ForecastOutput {
            symbol: forecast.symbol.clone(),
            run_id: forecast.run_id,
            last_close: forecast.history.last().map(|bar| bar.close),
            days: forecast
                .dates()
                .into_iter()
                .zip(forecast.rows.iter())
                .map(|(date, row)| ForecastDay {
                    date,
                    close: row.close,
                    ret: row.ret,
                })
                .collect(),
        }
    }
}

fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None if std::path::Path::new(DEFAULT_CONFIG).exists() => Config::from_file(DEFAULT_CONFIG)?,
        None => Config::default(),
    };
    if let Some(model_dir) = &cli.model_dir {
        config.model.model_dir = model_dir.clone();
    }
    if let Some(device) = &cli.device {
        config.model.device = device.clone();
    }
    config.validate()?;
    Ok(config)
}

/// An error followed by each of its sources
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        chain.push_str(": ");
        chain.push_str(&err.to_string());
        source = err.source();
    }
    chain
}

fn report_training(report: &TrainReport) -> anyhow::Result<()> {
    for (symbol, summary) in &report.trained {
        println!(
            "{:<6} trained: {} epochs, D loss {:.5}, G loss {:.5}",
            symbol, summary.epochs, summary.d_loss, summary.g_loss
        );
    }
    for (symbol, err) in &report.failed {
        println!("{:<6} failed: {}", symbol, error_chain(err));
    }
    if report.trained.is_empty() && !report.failed.is_empty() {
        bail!("no symbol could be trained");
    }
    Ok(())
}

fn print_forecast(forecast: &Forecast, json: bool) -> anyhow::Result<()> {
    let output = ForecastOutput::from(forecast);
    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }
    println!("{} forecast (model run {})", output.symbol, output.run_id);
    if let Some(close) = output.last_close {
        println!("{:<10}  {:>10.2}  (last close)", "", close);
    }
    for day in &output.days {
        println!("{}  {:>10.2}  {:>+8.3}%", day.date, day.close, day.ret * 100.0);
    }
    Ok(())
}

fn print_summary(config: &Config, symbol: &str) -> anyhow::Result<()> {
    let market = config.market()?;
    let today = Utc::now().date_naive();
    let bars = market
        .fetch(symbol, years_before(today, SUMMARY_YEARS), today)
        .with_context(|| format!("fetching {}", symbol))?;
    let summary = match StockSummary::from_bars(&bars, SUMMARY_WINDOW_DAYS) {
        Some(summary) => summary,
        None => bail!("no bars for {}", symbol),
    };
    println!("{} as of {}", symbol, summary.latest.date);
    println!("  close    {:>12.2}", summary.latest.close);
    if let Some(change) = summary.change {
        println!("  change   {:>+11.2}%", change * 100.0);
    }
    println!("  high     {:>12.2}", summary.latest.high);
    println!("  low      {:>12.2}", summary.latest.low);
    println!("  volume   {:>12.0}", summary.latest.volume);
    println!(
        "  {}d high/low {:.2} / {:.2}, avg close {:.2}, avg volume {:.0}",
        SUMMARY_WINDOW_DAYS,
        summary.window_high,
        summary.window_low,
        summary.average_close,
        summary.average_volume
    );
    if let Some(Some(value)) = rsi(&bars, RSI_PERIOD)?.last() {
        println!("  RSI({})  {:>12.2}", RSI_PERIOD, value);
    }
    for period in MOVING_AVERAGE_PERIODS {
        if let Some(Some(value)) = moving_average(&bars, period)?.last() {
            println!("  MA({})   {:>12.2}", period, value);
        }
    }
    Ok(())
}

fn build_predictor(config: &Config) -> anyhow::Result<Predictor<Box<dyn MarketData>>> {
    let predictor = Predictor::new(config.predictor()?, config.market()?);
    info!(
        "Tracking {} symbols, models in {}",
        predictor.symbols().len(),
        predictor.store().dir().display()
    );
    Ok(predictor)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut config = load_config(&cli)?;
    if matches!(cli.command, Command::Train { .. } | Command::Schedule) {
        config.training.progress = true;
    }

    match cli.command {
        Command::Train { symbols } => {
            let mut predictor = build_predictor(&config)?;
            let report = if symbols.is_empty() {
                predictor.train_all()
            } else {
                let mut report = TrainReport::default();
                for symbol in symbols {
                    match predictor.train_symbol(&symbol) {
                        Ok(summary) => report.trained.push((symbol, summary)),
                        Err(err) => {
                            warn!("Training failed for {}: {}", symbol, err);
                            report.failed.push((symbol, err))
                        }
                    }
                }
                report
            };
            report_training(&report)?;
        }
        Command::Load => {
            let report = build_predictor(&config)?.load_all();
            for symbol in &report.loaded {
                println!("{:<6} loaded", symbol);
            }
            for symbol in &report.not_found {
                println!("{:<6} not found", symbol);
            }
            for (symbol, err) in &report.failed {
                println!("{:<6} failed: {}", symbol, error_chain(err));
            }
        }
        Command::Forecast { symbol, days, json } => {
            let mut predictor = build_predictor(&config)?;
            predictor.load_all();
            let horizon = days.unwrap_or(config.forecast.horizon);
            let forecast = predictor
                .forecast(&symbol, horizon)
                .with_context(|| format!("forecasting {}", symbol))?;
            print_forecast(&forecast, json)?;
        }
        Command::Summary { symbol } => print_summary(&config, &symbol)?,
        Command::Schedule => {
            let mut predictor = build_predictor(&config)?;
            predictor.load_all();
            Scheduler::new(config.schedule.interval()).run(&mut predictor)
        }
    }
    Ok(())
}

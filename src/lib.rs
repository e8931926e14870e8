/*!
A recurrent GAN for forecasting daily stock prices, written in Rust using PyTorch bindings.

Daily bars are pulled from a market data provider ([Polygon](https://polygon.io/), a directory of CSV files, or a
deterministic fake market), turned into a scaled `{close, return}` feature table, and cut into overlapping windows.
A pair of stacked-LSTM networks is trained adversarially on those windows: the generator predicts the next row of a
window, the discriminator judges whether a window ending in that row looks real. Forecasts are produced by feeding each
prediction back into the window.
*/
#![warn(missing_docs)]

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod gan;
pub mod predictor;
pub mod preprocess;
pub mod scheduler;
pub mod util;

pub use error::ForecastError;

/// The floating point type to be used for CPU calculations
pub type CpuFloat = f64;

/// The floating point type to be used for GPU calculations
pub type GpuFloat = f32;

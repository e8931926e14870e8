/*!
Data processing and IO functions
*/
use crate::*;
use chrono::NaiveDate;
use num::NumCast;
use serde::{Deserialize, Serialize};
use ta::{Close, High, Low, Open, Volume};
use thiserror::Error;

pub mod csv;
pub mod fake;
pub mod polygon;
pub mod scale;

/// One trading day of data for a stock
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Bar<F = CpuFloat> {
    /// The trading day
    pub date: NaiveDate,
    /// The opening price
    pub open: F,
    /// The high price
    pub high: F,
    /// The low price
    pub low: F,
    /// The closing price
    pub close: F,
    /// The volume traded
    pub volume: F,
}

impl<F> Open for Bar<F>
where
    F: Copy + Into<f64>,
{
    #[inline]
    fn open(&self) -> f64 {
        self.open.into()
    }
}

impl<F> High for Bar<F>
where
    F: Copy + Into<f64>,
{
    #[inline]
    fn high(&self) -> f64 {
        self.high.into()
    }
}

impl<F> Low for Bar<F>
where
    F: Copy + Into<f64>,
{
    #[inline]
    fn low(&self) -> f64 {
        self.low.into()
    }
}

impl<F> Close for Bar<F>
where
    F: Copy + Into<f64>,
{
    #[inline]
    fn close(&self) -> f64 {
        self.close.into()
    }
}

impl<F> Volume for Bar<F>
where
    F: Copy + Into<f64>,
{
    #[inline]
    fn volume(&self) -> f64 {
        self.volume.into()
    }
}

/// A row of model features: the closing price and the daily return.
///
/// The same type carries both scaled rows (what the networks see) and rows in real units (what a forecast reports).
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureRow<F = CpuFloat> {
    /// Closing price
    pub close: F,
    /// Fractional change of the closing price since the previous trading day
    pub ret: F,
}

impl FeatureRow {
    /// The number of fields a feature row feeds into (and is predicted by) a neural network
    pub const NN_FIELDS: usize = 2; // (close, ret)

    /// Build a row from a slice of `NN_FIELDS` values, in `push_row` order
    pub fn from_slice(values: &[CpuFloat]) -> Option<FeatureRow> {
        match values {
            [close, ret] => Some(FeatureRow {
                close: *close,
                ret: *ret,
            }),
            _ => None,
        }
    }

    /// This row's values, in `push_row` order
    #[inline]
    pub fn values(&self) -> [CpuFloat; FeatureRow::NN_FIELDS] {
        [self.close, self.ret]
    }
}

impl<F> FeatureRow<F>
where
    F: Copy + NumCast,
{
    /// Push a row's data points to an input vector. Guaranteed to write `NN_FIELDS` data points
    pub fn push_row(&self, input: &mut Vec<GpuFloat>) {
        input.push(NumCast::from(self.close).unwrap_or(0.0));
        input.push(NumCast::from(self.ret).unwrap_or(0.0));
    }
}

/// Errors raised by market data providers
#[derive(Debug, Error)]
pub enum DataError {
    /// The HTTP request failed
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The provider answered with an error
    #[error("provider error: {0}")]
    Api(String),
    /// A CSV file could not be read or written
    #[error("csv error: {0}")]
    Csv(#[from] ::csv::Error),
    /// A filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The provider's data could not be interpreted
    #[error("malformed data: {0}")]
    Parse(String),
    /// The provider returned no bars for the requested range
    #[error("no bars returned for {symbol}")]
    NoData {
        /// The requested symbol
        symbol: String,
    },
    /// The provider is configured to refuse this symbol
    #[error("{symbol} is unavailable")]
    Unavailable {
        /// The requested symbol
        symbol: String,
    },
}

/// A source of daily bars
pub trait MarketData {
    /// Fetch the daily bars of `symbol` with `start <= date < end`, in increasing date order.
    ///
    /// An empty range is reported as `DataError::NoData`.
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>, DataError>;
}

impl<M: MarketData + ?Sized> MarketData for Box<M> {
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>, DataError> {
        (**self).fetch(symbol, start, end)
    }
}

impl<M: MarketData + ?Sized> MarketData for &M {
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>, DataError> {
        (**self).fetch(symbol, start, end)
    }
}

/// Sort bars by date, drop duplicate dates, and keep only those within `[start, end)`
pub fn clean_bars(mut bars: Vec<Bar>, start: NaiveDate, end: NaiveDate) -> Vec<Bar> {
    bars.retain(|bar| bar.date >= start && bar.date < end);
    bars.sort_by_key(|bar| bar.date);
    bars.dedup_by_key(|bar| bar.date);
    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn bars_are_cleaned() {
        let bars = vec![bar(5, 3.0), bar(2, 1.0), bar(3, 2.0), bar(3, 2.5), bar(9, 4.0)];
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        let cleaned = clean_bars(bars, start, end);
        let dates: Vec<u32> = cleaned.iter().map(|bar| chrono::Datelike::day(&bar.date)).collect();
        assert_eq!(dates, vec![2, 3, 5]);
    }

    #[test]
    fn feature_rows_push_in_order() {
        let row = FeatureRow {
            close: 1.5,
            ret: -0.25,
        };
        let mut input = Vec::new();
        row.push_row(&mut input);
        assert_eq!(input, vec![1.5, -0.25]);
        assert_eq!(FeatureRow::from_slice(&row.values()), Some(row));
        assert_eq!(FeatureRow::from_slice(&[1.0]), None);
    }

    #[test]
    fn bars_feed_ta() {
        let b = bar(2, 10.0);
        assert_eq!(b.close(), 10.0);
        assert_eq!(b.high(), 11.0);
        assert_eq!(b.low(), 9.0);
        assert_eq!(b.volume(), 100.0);
    }
}

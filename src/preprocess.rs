/*!
Turning bars into scaled feature rows, and feature rows into training windows
*/
use crate::data::{scale::MinMaxScaler, Bar, FeatureRow};
use crate::ForecastError;
use itertools::Itertools;
use tracing::warn;

/// Derive `{close, return}` rows from a bar history.
///
/// The first bar has no previous close, so it produces no row: `n` bars yield `n - 1` rows.
/// Rows with a non-finite close or return (a missing close, or a zero previous close) are dropped.
pub fn features(bars: &[Bar]) -> Vec<FeatureRow> {
    let rows: Vec<FeatureRow> = bars
        .iter()
        .tuple_windows()
        .map(|(prev, curr)| FeatureRow {
            close: curr.close,
            ret: curr.close / prev.close - 1.0,
        })
        .filter(|row| row.close.is_finite() && row.ret.is_finite())
        .collect();
    let dropped = bars.len().saturating_sub(1) - rows.len();
    if dropped > 0 {
        warn!(
            "Dropped {} of {} feature rows with non-finite values",
            dropped,
            rows.len() + dropped
        );
    }
    rows
}

/// Derive feature rows from a bar history, then fit a scaler to them and scale them
pub fn preprocess(bars: &[Bar]) -> Result<(Vec<FeatureRow>, MinMaxScaler), ForecastError> {
    let rows = features(bars);
    let scaler =
        MinMaxScaler::fit(&rows).ok_or_else(|| ForecastError::insufficient(1, rows.len()))?;
    Ok((scaler.transform_all(&rows), scaler))
}

/// Overlapping windows of consecutive rows, each paired with the row which follows it.
///
/// Windows borrow the underlying row buffer rather than copying it.
#[derive(Debug, Copy, Clone)]
pub struct Windows<'a> {
    rows: &'a [FeatureRow],
    seq_length: usize,
}

impl<'a> Windows<'a> {
    /// The number of windows
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len().saturating_sub(self.seq_length)
    }
    /// Whether there are no windows at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// The length of each window
    #[inline]
    pub fn seq_length(&self) -> usize {
        self.seq_length
    }
    /// The `i`th window
    #[inline]
    pub fn window(&self, i: usize) -> &'a [FeatureRow] {
        &self.rows[i..i + self.seq_length]
    }
    /// The row following the `i`th window
    #[inline]
    pub fn target(&self, i: usize) -> &'a FeatureRow {
        &self.rows[i + self.seq_length]
    }
    /// Iterate over `(window, target)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&'a [FeatureRow], &'a FeatureRow)> + 'a {
        let windows = *self;
        (0..windows.len()).map(move |i| (windows.window(i), windows.target(i)))
    }
}

/// Slide a window of `seq_length` rows over a table, one row at a time.
///
/// Produces `rows.len() - seq_length` windows, or none at all if the table is not longer than a window.
pub fn windowize(rows: &[FeatureRow], seq_length: usize) -> Windows<'_> {
    Windows { rows, seq_length }
}

/// `windowize`, failing if not a single window can be built
pub fn training_windows(
    rows: &[FeatureRow],
    seq_length: usize,
) -> Result<Windows<'_>, ForecastError> {
    let windows = windowize(rows, seq_length);
    if windows.is_empty() || seq_length == 0 {
        return Err(ForecastError::insufficient(seq_length + 1, rows.len()));
    }
    Ok(windows)
}

/// The last `seq_length` rows of a table, to seed a forecast
pub fn last_window(rows: &[FeatureRow], seq_length: usize) -> Result<&[FeatureRow], ForecastError> {
    if rows.len() < seq_length || seq_length == 0 {
        return Err(ForecastError::insufficient(seq_length, rows.len()));
    }
    Ok(&rows[rows.len() - seq_length..])
}

/*!
Technical-analysis figures over a bar history
*/
use crate::data::Bar;
use chrono::Duration;
use serde::Serialize;
use ta::indicators::{RelativeStrengthIndex, SimpleMovingAverage};
use ta::{Close, High, Low, Next, Volume};
use thiserror::Error;

/// The default RSI period
pub const RSI_PERIOD: usize = 14;

/// The moving average periods usually charted alongside a forecast
pub const MOVING_AVERAGE_PERIODS: [usize; 2] = [20, 50];

/// Errors computing indicators
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum AnalysisError {
    /// An indicator was asked for with an unusable period
    #[error("invalid indicator period {0}")]
    InvalidPeriod(usize),
}

/// Headline figures for a stock
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct StockSummary {
    /// The most recent bar
    pub latest: Bar,
    /// Change in close from the previous bar, as a fraction
    pub change: Option<f64>,
    /// Highest high over the window
    pub window_high: f64,
    /// Lowest low over the window
    pub window_low: f64,
    /// Mean close over the window
    pub average_close: f64,
    /// Mean volume over the window
    pub average_volume: f64,
    /// The number of bars in the window
    pub window_bars: usize,
}

impl StockSummary {
    /// Summarize the bars within `window_days` calendar days of the latest one. `None` if there are no bars
    pub fn from_bars(bars: &[Bar], window_days: i64) -> Option<StockSummary> {
        let latest = *bars.last()?;
        let change = bars
            .len()
            .checked_sub(2)
            .map(|i| latest.close() / bars[i].close() - 1.0);
        let since = latest.date - Duration::days(window_days);
        let window: Vec<&Bar> = bars.iter().filter(|bar| bar.date > since).collect();
        let n = window.len() as f64;
        Some(StockSummary {
            latest,
            change,
            window_high: window.iter().map(|bar| bar.high()).fold(f64::MIN, f64::max),
            window_low: window.iter().map(|bar| bar.low()).fold(f64::MAX, f64::min),
            average_close: window.iter().map(|bar| bar.close()).sum::<f64>() / n,
            average_volume: window.iter().map(|bar| bar.volume()).sum::<f64>() / n,
            window_bars: window.len(),
        })
    }
}

/// The relative strength index of each bar's close, with Wilder smoothing (`alpha = 1 / period`).
///
/// `None` until `period` close-to-close changes have been seen, i.e. for the first `period` bars.
pub fn rsi(bars: &[Bar], period: usize) -> Result<Vec<Option<f64>>, AnalysisError> {
    if period == 0 {
        return Err(AnalysisError::InvalidPeriod(period));
    }
    // An EMA over 2n - 1 samples has alpha 2 / 2n, Wilder's 1 / n
    let mut indicator = RelativeStrengthIndex::new(2 * period - 1)
        .map_err(|_| AnalysisError::InvalidPeriod(period))?;
    Ok(warm_up(bars, period, |bar| indicator.next(bar.close())))
}

/// The simple moving average of each bar's close; `None` until `period` bars have been seen
pub fn moving_average(bars: &[Bar], period: usize) -> Result<Vec<Option<f64>>, AnalysisError> {
    let mut indicator =
        SimpleMovingAverage::new(period).map_err(|_| AnalysisError::InvalidPeriod(period))?;
    Ok(warm_up(bars, period.saturating_sub(1), |bar| {
        indicator.next(bar.close())
    }))
}

/// Feed every bar to an indicator, hiding its output before index `first`
fn warm_up<F: FnMut(&Bar) -> f64>(bars: &[Bar], first: usize, mut next: F) -> Vec<Option<f64>> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let value = next(bar);
            if i >= first {
                Some(value)
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: start + Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 100.0 * (i + 1) as f64,
            })
            .collect()
    }

    #[test]
    fn summary_of_nothing() {
        assert_eq!(StockSummary::from_bars(&[], 30), None);
    }

    #[test]
    fn summary_window() {
        let closes: Vec<f64> = (1..=40).map(|i| i as f64).collect();
        let summary = StockSummary::from_bars(&bars(&closes), 30).unwrap();
        assert_eq!(summary.latest.close, 40.0);
        assert_eq!(summary.window_bars, 30);
        assert_eq!(summary.window_high, 41.0);
        assert_eq!(summary.window_low, 10.0);
        assert_eq!(summary.average_close, 25.5);
        assert_eq!(summary.average_volume, 2550.0);
        assert!((summary.change.unwrap() - (40.0 / 39.0 - 1.0)).abs() < 1e-12);

        let single = StockSummary::from_bars(&bars(&[5.0]), 30).unwrap();
        assert_eq!(single.change, None);
        assert_eq!(single.window_bars, 1);
    }

    #[test]
    fn moving_average_warm_up() {
        let averages = moving_average(&bars(&[1.0, 2.0, 3.0, 4.0, 5.0]), 3).unwrap();
        assert_eq!(averages, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
    }

    /// Wilder's RSI as an adjusted exponential mean of gains and losses, computed directly
    fn wilder_rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
        let decay = 1.0 - 1.0 / period as f64;
        (0..closes.len())
            .map(|t| {
                if t < period {
                    return None;
                }
                let (mut gain, mut loss, mut weight) = (0.0, 0.0, 0.0);
                for i in 1..=t {
                    let w = decay.powi((t - i) as i32);
                    let change = closes[i] - closes[i - 1];
                    gain += w * change.max(0.0);
                    loss += w * (-change).max(0.0);
                    weight += w;
                }
                Some(100.0 - 100.0 / (1.0 + (gain / weight) / (loss / weight)))
            })
            .collect()
    }

    fn wavy(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn rsi_bounds() {
        let closes = wavy(60);
        let values = rsi(&bars(&closes), RSI_PERIOD).unwrap();
        assert_eq!(values.len(), 60);
        assert!(values[..RSI_PERIOD].iter().all(Option::is_none));
        for value in values[RSI_PERIOD..].iter() {
            let value = value.unwrap();
            assert!((0.0..=100.0).contains(&value));
        }

        let rising: Vec<f64> = (0..60).map(|i| i as f64).collect();
        let last = rsi(&bars(&rising), RSI_PERIOD).unwrap()[59].unwrap();
        assert!(last > 99.0);
    }

    #[test]
    fn rsi_uses_wilder_smoothing() {
        let closes = wavy(90);
        let values = rsi(&bars(&closes), RSI_PERIOD).unwrap();
        let expected = wilder_rsi(&closes, RSI_PERIOD);
        assert_eq!(
            values.iter().position(Option::is_some),
            expected.iter().position(Option::is_some)
        );
        // The indicator's seed has decayed away by then
        for (value, expected) in values.iter().zip(expected.iter()).skip(60) {
            let (value, expected) = (value.unwrap(), expected.unwrap());
            assert!(
                (value - expected).abs() < 0.05,
                "rsi {} differs from {}",
                value,
                expected
            );
        }
    }

    #[test]
    fn zero_periods_are_invalid() {
        assert_eq!(rsi(&bars(&[1.0]), 0), Err(AnalysisError::InvalidPeriod(0)));
        assert_eq!(
            moving_average(&bars(&[1.0]), 0),
            Err(AnalysisError::InvalidPeriod(0))
        );
    }
}

/*!
Generate fake daily bars, for testing purposes
*/
use super::{clean_bars, Bar, DataError, MarketData};
use crate::util::is_weekday;
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::collections::HashSet;

/// Generate bars using a price generator and a date generator
#[derive(Debug, Clone)]
pub struct BarGen<D: Iterator<Item = NaiveDate>, P: PriceGen, R> {
    /// The date generator in use
    pub date_generator: D,
    /// The price generator in use
    pub price_generator: P,
    /// The RNG used for intraday ranges and volumes
    pub rng: R,
    /// The average daily volume
    pub volume: f64,
    /// The previous bar's date and close, if any
    pub last: Option<(NaiveDate, f64)>,
}

/// A trait implemented by price generators
pub trait PriceGen {
    /// The current price
    fn price(&self) -> f64;
    /// Generate a price, jumping forward a given amount of time
    fn price_after(&mut self, after: Duration) -> f64;
}

/// Generate fake prices using a time-weighted geometric random walk
#[derive(Debug, Copy, Clone)]
pub struct PriceRandomWalk<R> {
    /// The RNG used by this random walk
    pub rng: R,
    /// The current price
    pub price: f64,
    /// The expected log-return per day
    pub drift: f64,
    /// The standard deviation of the log-return per day
    pub volatility: f64,
}

impl<R: Rng> PriceGen for PriceRandomWalk<R> {
    fn price(&self) -> f64 {
        self.price
    }

    fn price_after(&mut self, after: Duration) -> f64 {
        let days = after.num_days().max(1) as f64;
        let shock: f64 = self.rng.sample(StandardNormal);
        self.price *= (self.drift * days + self.volatility * days.sqrt() * shock).exp();
        self.price
    }
}

/// Iterate over the weekdays starting at a given date
#[derive(Debug, Copy, Clone)]
pub struct TradingDays(pub NaiveDate);

impl Iterator for TradingDays {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        while !is_weekday(self.0) {
            self.0 = self.0.succ_opt()?;
        }
        let date = self.0;
        self.0 = self.0.succ_opt()?;
        Some(date)
    }
}

impl<D, P, R> Iterator for BarGen<D, P, R>
where
    D: Iterator<Item = NaiveDate>,
    P: PriceGen,
    R: Rng,
{
    type Item = Bar;

    fn next(&mut self) -> Option<Bar> {
        let date = self.date_generator.next()?;
        let (open, close) = match self.last {
            Some((last_date, last_close)) => {
                let close = self.price_generator.price_after(date - last_date);
                let gap: f64 = self.rng.sample::<f64, _>(StandardNormal) * 0.002;
                (last_close * (1.0 + gap), close)
            }
            None => {
                let price = self.price_generator.price();
                (price, price)
            }
        };
        let wick = |rng: &mut R| 1.0 + rng.sample::<f64, _>(StandardNormal).abs() * 0.005;
        let high = open.max(close) * wick(&mut self.rng);
        let low = open.min(close) / wick(&mut self.rng);
        let volume = (self.volume * self.rng.gen_range(0.5..1.5)).round();
        self.last = Some((date, close));
        Some(Bar {
            date,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// A deterministic fake market: every symbol gets its own seeded random walk, starting at a fixed origin date
#[derive(Debug, Clone)]
pub struct FakeMarket {
    /// The first date any symbol has data for
    pub origin: NaiveDate,
    /// The base seed, mixed with each symbol
    pub seed: u64,
    /// Symbols which fail to fetch, to simulate provider outages
    pub failing: HashSet<String>,
}

impl Default for FakeMarket {
    fn default() -> FakeMarket {
        FakeMarket {
            origin: NaiveDate::from_ymd_opt(2000, 1, 3).unwrap_or(NaiveDate::MIN),
            seed: 0x5eed,
            failing: HashSet::new(),
        }
    }
}

impl FakeMarket {
    /// A fake market with a given seed
    pub fn with_seed(seed: u64) -> FakeMarket {
        FakeMarket {
            seed,
            ..FakeMarket::default()
        }
    }
    /// Make fetches for a symbol fail
    pub fn fail(mut self, symbol: &str) -> FakeMarket {
        self.failing.insert(symbol.to_string());
        self
    }
    /// The bar generator for a symbol, starting at the origin
    pub fn bars(&self, symbol: &str) -> BarGen<TradingDays, PriceRandomWalk<StdRng>, StdRng> {
        let seed = symbol
            .bytes()
            .fold(self.seed ^ 0xcbf2_9ce4_8422_2325, |hash, byte| {
                (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
            });
        let mut rng = StdRng::seed_from_u64(seed);
        let price = rng.gen_range(20.0..200.0);
        BarGen {
            date_generator: TradingDays(self.origin),
            price_generator: PriceRandomWalk {
                rng: StdRng::seed_from_u64(seed.rotate_left(17)),
                price,
                drift: 0.0003,
                volatility: 0.015,
            },
            rng,
            volume: 1_000_000.0,
            last: None,
        }
    }
}

impl MarketData for FakeMarket {
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>, DataError> {
        if self.failing.contains(symbol) {
            return Err(DataError::Unavailable {
                symbol: symbol.to_string(),
            });
        }
        let bars: Vec<Bar> = self.bars(symbol).take_while(|bar| bar.date < end).collect();
        let bars = clean_bars(bars, start, end);
        if bars.is_empty() {
            return Err(DataError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trading_days_skip_weekends() {
        // 2024-06-07 was a Friday
        let friday = NaiveDate::from_ymd_opt(2024, 6, 7).unwrap();
        let days: Vec<NaiveDate> = TradingDays(friday).take(3).collect();
        assert_eq!(days[0], friday);
        assert_eq!(days[1], NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        assert_eq!(days[2], NaiveDate::from_ymd_opt(2024, 6, 11).unwrap());
    }

    #[test]
    fn bars_are_consistent() {
        let market = FakeMarket::default();
        for bar in market.bars("AAPL").take(500) {
            assert!(bar.close > 0.0);
            assert!(bar.high >= bar.open.max(bar.close));
            assert!(bar.low <= bar.open.min(bar.close));
            assert!(bar.volume >= 0.0);
        }
    }

    #[test]
    fn fetch_is_deterministic() {
        let market = FakeMarket::default();
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
        let first = market.fetch("MSFT", start, end).unwrap();
        let second = market.fetch("MSFT", start, end).unwrap();
        assert_eq!(first, second);
        assert!(first.windows(2).all(|pair| pair[0].date < pair[1].date));
        assert!(first.iter().all(|bar| bar.date >= start && bar.date < end));
        assert_ne!(first, market.fetch("GOOGL", start, end).unwrap());
    }

    #[test]
    fn failing_symbols_are_unavailable() {
        let market = FakeMarket::default().fail("BAD");
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 2, 1).unwrap();
        assert!(matches!(
            market.fetch("BAD", start, end),
            Err(DataError::Unavailable { .. })
        ));
        assert!(market.fetch("GOOD", start, end).is_ok());
    }
}

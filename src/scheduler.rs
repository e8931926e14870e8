/*!
Periodic retraining
*/
use crate::data::MarketData;
use crate::predictor::{Predictor, TrainReport};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// How often `run` checks whether a retraining is due
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Retrains every symbol of a predictor at a fixed interval.
///
/// Training runs inline on the caller's thread while the predictor is mutably borrowed, so runs never overlap.
#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    last_run: Option<Instant>,
}

impl Default for Scheduler {
    fn default() -> Scheduler {
        Scheduler::every_hours(24)
    }
}

impl Scheduler {
    /// A scheduler which has never run
    pub fn new(interval: Duration) -> Scheduler {
        Scheduler {
            interval,
            last_run: None,
        }
    }
    /// A scheduler running every `hours` hours, saturating at the longest representable interval
    pub fn every_hours(hours: u64) -> Scheduler {
        Scheduler::new(Duration::from_secs(hours.saturating_mul(60 * 60)))
    }
    /// The retraining interval
    pub fn interval(&self) -> Duration {
        self.interval
    }
    /// When the last run started, if there has been one
    pub fn last_run(&self) -> Option<Instant> {
        self.last_run
    }
    /// Whether a run is due at `now`. The first run is always due
    pub fn due(&self, now: Instant) -> bool {
        match self.last_run {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }
    /// Retrain if a run is due at `now`
    pub fn tick<M: MarketData>(
        &mut self,
        now: Instant,
        predictor: &mut Predictor<M>,
    ) -> Option<TrainReport> {
        if !self.due(now) {
            return None;
        }
        self.last_run = Some(now);
        info!("Scheduled retraining of {} symbols", predictor.symbols().len());
        Some(predictor.train_all())
    }
    /// Retrain immediately, then again every interval, forever
    pub fn run<M: MarketData>(&mut self, predictor: &mut Predictor<M>) -> ! {
        loop {
            if let Some(report) = self.tick(Instant::now(), predictor) {
                info!(
                    "Retrained {} symbols, {} failed; next run in {:?}",
                    report.trained.len(),
                    report.failed.len(),
                    self.interval
                );
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fake::FakeMarket;
    use crate::predictor::PredictorConfig;

    #[test]
    fn due_after_interval() {
        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        let start = Instant::now();
        assert!(scheduler.due(start));
        scheduler.last_run = Some(start);
        assert!(!scheduler.due(start));
        assert!(!scheduler.due(start + Duration::from_secs(59)));
        assert!(scheduler.due(start + Duration::from_secs(60)));
    }

    #[test]
    fn huge_intervals_saturate() {
        let mut scheduler = Scheduler::every_hours(u64::MAX);
        assert_eq!(scheduler.interval(), Duration::from_secs(u64::MAX));
        let start = Instant::now();
        scheduler.last_run = Some(start);
        assert!(!scheduler.due(start + Duration::from_secs(365 * 24 * 3600)));
    }

    #[test]
    fn ticks_only_when_due() {
        let dir = tempfile::tempdir().unwrap();
        let config = PredictorConfig {
            symbols: Vec::new(),
            model_dir: dir.path().into(),
            ..Default::default()
        };
        let mut predictor = Predictor::new(config, FakeMarket::default());
        let mut scheduler = Scheduler::default();
        assert_eq!(scheduler.interval(), Duration::from_secs(24 * 3600));

        let start = Instant::now();
        let report = scheduler.tick(start, &mut predictor).unwrap();
        assert!(report.trained.is_empty() && report.is_complete());
        assert_eq!(scheduler.last_run(), Some(start));
        assert!(scheduler
            .tick(start + Duration::from_secs(3600), &mut predictor)
            .is_none());
        assert!(scheduler
            .tick(start + Duration::from_secs(24 * 3600), &mut predictor)
            .is_some());
    }
}

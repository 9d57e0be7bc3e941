//! Clock sources and the periodic ticker that drives the scheduler.

use crate::config::TickResolution;
use chrono::{Duration, Local, NaiveDateTime};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Supplies the current wall-clock time. Need not be strictly monotonic.
pub trait ClockSource: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall time, timezone information dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<NaiveDateTime>>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    pub fn set(&self, to: NaiveDateTime) {
        *self.now.write().unwrap_or_else(PoisonError::into_inner) = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One beat of the `Ticker`.
#[derive(Debug, Clone)]
pub struct TickEvent {
    pub tick_count: u64,
    pub timestamp: Instant,
}

/// Emits a `TickEvent` at a fixed interval until shut down.
///
/// Missed beats (e.g. after the host was suspended) are skipped rather than
/// replayed; the scheduler re-evaluates "now" on the next beat anyway.
pub struct Ticker {
    resolution: TickResolution,
    sender: broadcast::Sender<Arc<TickEvent>>,
}

impl Ticker {
    pub fn new(resolution: TickResolution, sender: broadcast::Sender<Arc<TickEvent>>) -> Self {
        Self { resolution, sender }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let period = self.resolution.interval();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Ticker running every {:?}.", period);

        let mut tick_count: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                timestamp = interval.tick() => {
                    tick_count += 1;
                    self.sender.send(Arc::new(TickEvent { tick_count, timestamp })).ok();
                }
            }
        }
        debug!("Ticker stopped after {} ticks.", tick_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn manual_clock_clones_share_time() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let clock = ManualClock::new(start);
        let handle = clock.clone();

        handle.advance(Duration::seconds(90));
        assert_eq!(clock.now(), start + Duration::seconds(90));

        clock.set(start);
        assert_eq!(handle.now(), start);
    }

    #[tokio::test]
    async fn ticker_counts_up_and_stops_on_shutdown() {
        let (tick_tx, mut tick_rx) = broadcast::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let ticker = Ticker::new(TickResolution::Custom { ticks_per_second: 100 }, tick_tx);
        let handle = tokio::spawn(ticker.run(shutdown_rx));

        let first = tick_rx.recv().await.unwrap();
        let second = tick_rx.recv().await.unwrap();
        assert_eq!(first.tick_count, 1);
        assert_eq!(second.tick_count, 2);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}

//! The core engine that drives the schedule.

use crate::bus::NotificationBus;
use crate::common::EventId;
use crate::components::evaluator::{latest_due, next_state};
use crate::config::CuecastConfig;
use crate::error::StoreError;
use crate::notification::{Notification, SystemEvent};
use crate::state::{Phase, PlaybackOutcome, SchedulerState};
use crate::store::EventStore;
use crate::time::{ClockSource, TickEvent, Ticker};
use chrono::NaiveDateTime;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, trace};

/// The scheduler engine.
///
/// Holds the configuration, the event store, the clock and the scheduler
/// state, and drives the tick loop. The engine is cheap to clone; every clone
/// is a handle to the same running instance.
#[derive(Clone)]
pub struct SchedulerEngine {
    config: Arc<CuecastConfig>,
    store: EventStore,
    bus: NotificationBus,
    clock: Arc<dyn ClockSource>,
    state: Arc<Mutex<SchedulerState>>,
    /// Held from computing a transition until it is published, so observers
    /// see phase changes in the order they were applied.
    transition: Arc<Mutex<()>>,
    tick_sender: broadcast::Sender<Arc<TickEvent>>,
}

// Core implementation block for internal logic.
impl SchedulerEngine {
    /// Creates an engine with a fresh bus and an empty store wired to it.
    pub fn new(config: CuecastConfig, clock: impl ClockSource + 'static) -> Self {
        let bus = NotificationBus::new(&config.bus);
        let store = EventStore::with_bus(bus.clone());
        Self::with_parts(config, store, bus, Arc::new(clock))
    }

    /// Creates an engine around an existing store and bus.
    pub fn with_parts(
        config: CuecastConfig,
        store: EventStore,
        bus: NotificationBus,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        let (tick_sender, _) = broadcast::channel(64);
        Self {
            config: Arc::new(config),
            store,
            bus,
            clock,
            state: Arc::new(Mutex::new(SchedulerState::default())),
            transition: Arc::new(Mutex::new(())),
            tick_sender,
        }
    }

    /// Runs the tick loop until Ctrl+C is received.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await
    }

    /// Runs the tick loop until `shutdown` resolves.
    ///
    /// This method will:
    /// 1. Spawn the `Ticker` task.
    /// 2. Spawn the dispatcher task that evaluates the schedule on every tick.
    /// 3. On shutdown, let the tick in progress finish, then stop both tasks.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        info!("SchedulerEngine starting up...");
        let (shutdown_tx, _) = broadcast::channel(1);

        let tick_rx = self.tick_sender.subscribe();
        let ticker = Ticker::new(self.config.resolution.clone(), self.tick_sender.clone());
        let ticker_task = tokio::spawn(ticker.run(shutdown_tx.subscribe()));

        let dispatcher = self.clone();
        let dispatcher_shutdown_rx = shutdown_tx.subscribe();
        let dispatcher_task =
            tokio::spawn(async move { dispatcher.dispatcher_loop(tick_rx, dispatcher_shutdown_rx).await });

        let event_count = self.store.len().await;
        info!(
            "Engine running at {:?} with {} events.",
            self.config.resolution, event_count
        );
        shutdown.await;

        info!("Shutdown signal received. Broadcasting to all tasks...");
        if shutdown_tx.send(()).is_err() {
            error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
        }
        ticker_task.await?;
        dispatcher_task.await?;
        self.bus
            .publish(Notification::System(SystemEvent::EngineShutdown))
            .await;
        info!("SchedulerEngine has shut down.");
        Ok(())
    }

    #[doc(hidden)]
    async fn dispatcher_loop(
        self,
        mut tick_rx: broadcast::Receiver<Arc<TickEvent>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        self.bus
            .publish(Notification::System(SystemEvent::EngineStarted {
                timestamp: Instant::now(),
            }))
            .await;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                tick = tick_rx.recv() => match tick {
                    Ok(tick) => {
                        trace!("Tick #{} received.", tick.tick_count);
                        self.tick().await;
                    }
                    Err(RecvError::Lagged(skipped)) => debug!("Dispatcher skipped {} ticks.", skipped),
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    /// Publishes what changed between `previous` and `next`. `force` announces
    /// the phase even when it looks unchanged.
    #[doc(hidden)]
    async fn announce(&self, previous: &Phase, next: &Phase, now: NaiveDateTime, force: bool) {
        let changed = force || !previous.same_state(next);
        if changed {
            info!("Scheduler is now {}.", next);
            self.bus
                .publish(Notification::PhaseChanged {
                    phase: next.clone(),
                    at: now,
                })
                .await;
        }
        if let Phase::CountingDown { event, remaining } = next {
            if changed || previous.remaining_secs() != next.remaining_secs() {
                self.bus
                    .publish(Notification::Countdown {
                        event_id: event.id,
                        remaining: *remaining,
                    })
                    .await;
            }
        }
    }

    #[doc(hidden)]
    async fn report_playback(&self, id: EventId, outcome: PlaybackOutcome) -> bool {
        let _transition = self.transition.lock().await;
        let accepted = {
            let mut state = self.state.lock().await;
            let current = state.phase.playing().map(|event| event.id);
            if current == Some(id) && state.playback_ended.is_none() {
                state.playback_ended = Some(outcome);
                true
            } else {
                false
            }
        };
        if accepted {
            info!("Playback of {} ended: {:?}.", id, outcome);
            self.bus
                .publish(Notification::PlaybackEnded { id, outcome })
                .await;
        } else {
            debug!("Ignoring {:?} report for {}; it is not on air.", outcome, id);
        }
        accepted
    }
}

// Public API implementation block.
impl SchedulerEngine {
    /// Runs one polling cycle: reads the clock, takes one snapshot of the
    /// store, and moves to whatever phase should hold right now.
    ///
    /// # Returns
    /// The phase the scheduler is in after the tick.
    pub async fn tick(&self) -> Phase {
        let _transition = self.transition.lock().await;
        let now = self.clock.now();
        let snapshot = self.store.ordered_view().await;
        let (previous, next) = {
            let mut state = self.state.lock().await;
            let next = next_state(&state, &snapshot, now);
            let previous = std::mem::replace(&mut *state, next);
            (previous.phase, state.phase.clone())
        };
        self.announce(&previous, &next, now, false).await;
        next
    }

    /// Puts the event with `id` on air immediately, whatever its schedule.
    ///
    /// Everything already due counts as consumed, so the next tick does not
    /// replace the triggered event with an older scheduled one.
    ///
    /// # Returns
    /// The resulting `Playing` phase, or `NotFound` if no such event exists.
    pub async fn trigger_now(&self, id: EventId) -> Result<Phase, StoreError> {
        let event = self.store.get(id).await.ok_or(StoreError::NotFound(id))?;
        let _transition = self.transition.lock().await;
        let now = self.clock.now();
        let consumed = latest_due(&self.store.ordered_view().await, now).and_then(|e| e.scheduled_at());
        let (previous, next) = {
            let mut state = self.state.lock().await;
            let previous = state.phase.clone();
            if let Some(at) = consumed {
                state.watermark = Some(state.watermark.map_or(at, |mark| mark.max(at)));
            }
            state.fire(event, now);
            (previous, state.phase.clone())
        };
        info!("Manually triggered {}.", id);
        self.announce(&previous, &next, now, true).await;
        Ok(next)
    }

    /// Reports that the presentation surface finished playing `id`.
    ///
    /// Returns `false` (and changes nothing) if `id` is not on air.
    pub async fn playback_completed(&self, id: EventId) -> bool {
        self.report_playback(id, PlaybackOutcome::Completed).await
    }

    /// Reports that the presentation surface could not play `id`. Handled
    /// exactly like a completion.
    pub async fn playback_failed(&self, id: EventId) -> bool {
        self.report_playback(id, PlaybackOutcome::Failed).await
    }

    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase.clone()
    }

    /// A copy of the full scheduler state.
    pub async fn state(&self) -> SchedulerState {
        self.state.lock().await.clone()
    }

    pub async fn last_fired(&self) -> Option<EventId> {
        self.state.lock().await.last_fired
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn config(&self) -> &CuecastConfig {
        &self.config
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Subscribes to every notification the engine and its store publish.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.bus.subscribe()
    }

    /// Subscribes to the raw `TickEvent` stream.
    pub fn subscribe_tick_events(&self) -> broadcast::Receiver<Arc<TickEvent>> {
        self.tick_sender.subscribe()
    }
}

use chrono::{Duration, NaiveDate, NaiveDateTime};
use cuecast::prelude::*;
use std::time::Duration as StdDuration;
use tokio::sync::broadcast;

fn t(secs: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 9, 1)
        .unwrap()
        .and_hms_opt(18, 0, 0)
        .unwrap()
        + Duration::seconds(secs)
}

fn fields(secs: Option<i64>, title: &str) -> EventFields {
    EventFields::new(secs.map(t), format!("{title}.mp4"), title, "scheduled clip")
}

fn engine_at(secs: i64) -> (SchedulerEngine, ManualClock) {
    let clock = ManualClock::new(t(secs));
    let engine = SchedulerEngine::new(CuecastConfig::default(), clock.clone());
    (engine, clock)
}

fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut seen = Vec::new();
    while let Ok(n) = rx.try_recv() {
        seen.push(n);
    }
    seen
}

#[tokio::test]
async fn counts_down_to_the_next_event_after_the_current_one_finishes() {
    let (engine, clock) = engine_at(10);
    let first = engine.store().create(fields(Some(10), "ten")).await;
    let second = engine.store().create(fields(Some(20), "twenty")).await;

    assert_eq!(engine.tick().await.playing().map(|e| e.id), Some(first));
    assert!(engine.playback_completed(first).await);

    clock.set(t(15));
    match engine.tick().await {
        Phase::CountingDown { event, remaining } => {
            assert_eq!(event.id, second);
            assert_eq!(remaining, Duration::seconds(5));
        }
        other => panic!("expected a countdown, got {other:?}"),
    }
}

#[tokio::test]
async fn latest_due_event_wins_when_nothing_has_fired() {
    let (engine, _clock) = engine_at(25);
    engine.store().create(fields(Some(10), "ten")).await;
    let twenty = engine.store().create(fields(Some(20), "twenty")).await;
    assert_eq!(engine.last_fired().await, None);

    let phase = engine.tick().await;
    assert_eq!(phase.playing().map(|e| e.id), Some(twenty));
    assert_eq!(engine.last_fired().await, Some(twenty));
}

#[tokio::test]
async fn newer_event_preempts_the_one_on_air() {
    let (engine, clock) = engine_at(10);
    let ten = engine.store().create(fields(Some(10), "ten")).await;
    assert_eq!(engine.tick().await.playing().map(|e| e.id), Some(ten));

    clock.set(t(12));
    let twelve = engine.store().create(fields(Some(12), "twelve")).await;
    assert_eq!(engine.tick().await.playing().map(|e| e.id), Some(twelve));
}

#[tokio::test]
async fn trigger_now_bypasses_the_countdown() {
    let (engine, _clock) = engine_at(0);
    let later = engine.store().create(fields(Some(300), "later")).await;
    assert_eq!(engine.tick().await.kind(), PhaseKind::CountingDown);

    let phase = engine.trigger_now(later).await.unwrap();
    assert_eq!(phase.playing().map(|e| e.id), Some(later));
    assert_eq!(engine.last_fired().await, Some(later));
    assert_eq!(engine.state().await.started_at, Some(t(0)));

    // Still playing on the next tick; it is not sent back to a countdown.
    assert_eq!(engine.tick().await.playing().map(|e| e.id), Some(later));
}

#[tokio::test]
async fn trigger_now_plays_unscheduled_events_and_rejects_unknown_ids() {
    let (engine, _clock) = engine_at(0);
    let standby = engine.store().create(fields(None, "standby")).await;
    assert_eq!(engine.tick().await, Phase::Idle);

    let phase = engine.trigger_now(standby).await.unwrap();
    assert_eq!(phase.playing().map(|e| e.id), Some(standby));
    assert_eq!(
        engine.trigger_now(EventId(999)).await,
        Err(StoreError::NotFound(EventId(999)))
    );
}

#[tokio::test]
async fn manual_trigger_is_not_replaced_by_a_stale_due_event() {
    let (engine, _clock) = engine_at(50);
    engine.store().create(fields(Some(10), "old")).await;
    let standby = engine.store().create(fields(None, "standby")).await;

    engine.trigger_now(standby).await.unwrap();
    engine.playback_completed(standby).await;

    assert_eq!(engine.tick().await, Phase::Idle);
}

#[tokio::test]
async fn playback_failure_falls_through_like_completion() {
    let (engine, clock) = engine_at(10);
    let broken = engine.store().create(fields(Some(10), "broken")).await;
    engine.tick().await;

    assert!(engine.playback_failed(broken).await);
    assert!(!engine.playback_failed(broken).await);
    clock.set(t(11));
    assert_eq!(engine.tick().await, Phase::Idle);
}

#[tokio::test]
async fn stale_playback_reports_are_ignored() {
    let (engine, _clock) = engine_at(10);
    let on_air = engine.store().create(fields(Some(10), "on air")).await;
    let other = engine.store().create(fields(Some(99), "other")).await;
    engine.tick().await;

    assert!(!engine.playback_completed(other).await);
    assert_eq!(engine.tick().await.playing().map(|e| e.id), Some(on_air));
}

#[tokio::test]
async fn removing_the_event_on_air_rederives_state() {
    let (engine, _clock) = engine_at(10);
    let on_air = engine.store().create(fields(Some(10), "on air")).await;
    let next = engine.store().create(fields(Some(60), "next")).await;
    engine.tick().await;

    engine.store().remove(on_air).await.unwrap();
    let phase = engine.tick().await;
    assert_eq!(phase.kind(), PhaseKind::CountingDown);
    assert_eq!(phase.event().map(|e| e.id), Some(next));
}

#[tokio::test]
async fn add_then_remove_restores_the_ordered_view() {
    let store = EventStore::new();
    store.create(fields(Some(5), "a")).await;
    store.create(fields(None, "b")).await;
    let before = store.ordered_view().await;

    let id = store.create(fields(Some(1), "c")).await;
    store.remove(id).await.unwrap();
    assert_eq!(store.ordered_view().await, before);
}

#[tokio::test]
async fn transitions_are_published_once_with_countdown_ticks() {
    let (engine, clock) = engine_at(0);
    let mut rx = engine.subscribe();
    let id = engine.store().create(fields(Some(3), "soon")).await;

    engine.tick().await;
    clock.set(t(0) + Duration::milliseconds(400));
    engine.tick().await;
    clock.set(t(1));
    engine.tick().await;
    clock.set(t(3));
    engine.tick().await;
    engine.tick().await;

    let seen = drain(&mut rx);
    let phases: Vec<PhaseKind> = seen
        .iter()
        .filter_map(|n| match n {
            Notification::PhaseChanged { phase, .. } => Some(phase.kind()),
            _ => None,
        })
        .collect();
    assert_eq!(phases, vec![PhaseKind::CountingDown, PhaseKind::Playing]);

    let countdown: Vec<i64> = seen
        .iter()
        .filter_map(|n| match n {
            Notification::Countdown { event_id, remaining } if *event_id == id => {
                Some(remaining.num_seconds())
            }
            _ => None,
        })
        .collect();
    assert_eq!(countdown, vec![3, 2]);
}

#[tokio::test]
async fn observer_can_reenter_the_store() {
    let (engine, _clock) = engine_at(10);
    let store = engine.store().clone();
    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    engine
        .bus()
        .on_notification_where(
            |n| matches!(n, Notification::PhaseChanged { .. }),
            move |n| {
                if let Notification::PhaseChanged { phase: Phase::Playing { event }, .. } = n {
                    let store = store.clone();
                    let done_tx = done_tx.clone();
                    tokio::spawn(async move {
                        let patch = EventPatch {
                            title: Some("seen".into()),
                            ..Default::default()
                        };
                        done_tx.send(store.update(event.id, patch).await).ok();
                    });
                }
            },
        )
        .await;

    let id = engine.store().create(fields(Some(10), "edit me")).await;
    engine.tick().await;

    let updated = tokio::time::timeout(StdDuration::from_secs(1), done_rx.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(updated.id, id);
    assert_eq!(engine.tick().await.playing().map(|e| e.title().to_string()), Some("seen".into()));
}

#[tokio::test]
async fn run_until_ticks_and_shuts_down_cleanly() {
    let clock = ManualClock::new(t(10));
    let config = CuecastConfig {
        resolution: TickResolution::Custom { ticks_per_second: 50 },
        ..Default::default()
    };
    let engine = SchedulerEngine::new(config, clock);
    let id = engine.store().create(fields(Some(10), "live")).await;
    let mut rx = engine.subscribe();
    let mut ticks = engine.subscribe_tick_events();

    engine
        .run_until(tokio::time::sleep(StdDuration::from_millis(100)))
        .await
        .unwrap();

    assert_eq!(engine.phase().await.playing().map(|e| e.id), Some(id));
    assert_eq!(ticks.try_recv().unwrap().tick_count, 1);
    let seen = drain(&mut rx);
    assert!(matches!(
        seen.first(),
        Some(Notification::System(SystemEvent::EngineStarted { .. }))
    ));
    assert!(matches!(
        seen.last(),
        Some(Notification::System(SystemEvent::EngineShutdown))
    ));
}

#[tokio::test]
async fn resolutions_beyond_the_tick_limit_still_run() {
    let clock = ManualClock::new(t(10));
    let config = CuecastConfig {
        resolution: TickResolution::Custom { ticks_per_second: 2000 },
        ..Default::default()
    };
    let engine = SchedulerEngine::new(config, clock);
    let id = engine.store().create(fields(Some(10), "due")).await;

    engine
        .run_until(tokio::time::sleep(StdDuration::from_millis(100)))
        .await
        .unwrap();

    assert_eq!(engine.phase().await.playing().map(|e| e.id), Some(id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_published_phase_matches_the_engine_under_concurrent_ticks() {
    for _ in 0..20 {
        let (engine, _clock) = engine_at(0);
        engine.store().create(fields(Some(300), "later")).await;
        let standby = engine.store().create(fields(None, "standby")).await;
        let mut rx = engine.subscribe();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                if i == 8 {
                    engine.trigger_now(standby).await.unwrap();
                } else {
                    engine.tick().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let last_phase = drain(&mut rx)
            .into_iter()
            .filter_map(|n| match n {
                Notification::PhaseChanged { phase, .. } => Some(phase),
                _ => None,
            })
            .last();
        let current = engine.phase().await;
        assert_eq!(current.playing().map(|e| e.id), Some(standby));
        assert!(last_phase.is_some_and(|phase| phase.same_state(&current)));
    }
}

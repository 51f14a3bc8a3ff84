mod common;

use common::*;
use signal_trader::adapter::MonitorCoordinator;
use signal_trader::application::dto::MonitorEvent;
use signal_trader::application::service::{
    spawn_monitor, MonitorSettings, MonitorState, RecomputeMode,
};
use signal_trader::domain::model::{Position, Side};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn status_states(events: &[MonitorEvent]) -> Vec<MonitorState> {
    events
        .iter()
        .filter_map(|e| match e {
            MonitorEvent::Status { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

fn update_list(events: &[MonitorEvent]) -> Vec<&signal_trader::application::dto::MonitorUpdate> {
    events
        .iter()
        .filter_map(|e| match e {
            MonitorEvent::Update(update) => Some(update),
            _ => None,
        })
        .collect()
}

// ── Lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn lifecycle_events_arrive_in_order() {
    let provider = Arc::new(
        MockMarketData::new()
            .with_history(make_bars(&[50.0, 50.0, 50.0]))
            .with_live_bars(vec![make_bar(3, 5.0)]),
    );
    let (mut stream, handle) = spawn_monitor(provider, fast_settings(), session(threshold_strategy(10, 40)));

    let events = collect_events(&mut stream, |events| updates(events) == 1).await;
    handle.await.unwrap();

    assert!(matches!(
        events[0],
        MonitorEvent::Status { state: MonitorState::Starting, .. }
    ));
    assert!(matches!(
        events[1],
        MonitorEvent::Status { state: MonitorState::Initializing, .. }
    ));
    assert!(matches!(
        events[2],
        MonitorEvent::Status { state: MonitorState::Ready, .. }
    ));
    assert!(matches!(events[3], MonitorEvent::Snapshot(_)));
    assert!(matches!(
        events[4],
        MonitorEvent::Status { state: MonitorState::Processing, .. }
    ));
    assert!(matches!(events[5], MonitorEvent::Update(_)));

    assert!(events.last().unwrap().is_terminal());
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    let json = serde_json::to_value(&events[5]).unwrap();
    assert_eq!(json["type"], "update");
    assert_eq!(json["executions"][0]["side"], "buy");
}

#[tokio::test]
async fn initial_snapshot_has_signal_values_but_no_events() {
    let provider = Arc::new(MockMarketData::new().with_history(make_bars(&[5.0, 50.0, 5.0])));
    let (mut stream, handle) = spawn_monitor(provider, fast_settings(), session(threshold_strategy(10, 40)));

    let events = collect_events(&mut stream, |events| {
        events.iter().any(|e| matches!(e, MonitorEvent::Snapshot(_)))
    })
    .await;
    handle.await.unwrap();

    let snapshot = events
        .iter()
        .find_map(|e| match e {
            MonitorEvent::Snapshot(s) => Some(s),
            _ => None,
        })
        .unwrap();
    assert_eq!(snapshot.stats.total_trades, 0);
    assert_eq!(snapshot.position, Position::Flat);
    assert!(snapshot.chart.buy_markers.is_empty());
    assert!(snapshot.chart.sell_markers.is_empty());
    assert_eq!(snapshot.chart.overlays[0].name, "price");
    assert_eq!(snapshot.chart.overlays[0].values[1], Some(50.0));
    assert_eq!(snapshot.latest_price, Some(5.0));
}

// ── Initialisation failures are fatal ────────────────────────────────

#[tokio::test]
async fn history_failure_stops_the_session() {
    let provider = Arc::new(MockMarketData::new().with_history_error("provider unavailable"));
    let (mut stream, handle) =
        spawn_monitor(provider.clone(), fast_settings(), session(threshold_strategy(10, 40)));

    // No cancel needed: the session ends on its own
    let events = collect_events(&mut stream, |_| false).await;
    handle.await.unwrap();

    assert!(events.iter().any(|e| matches!(
        e,
        MonitorEvent::Error { stage: MonitorState::Initializing, fatal: true, .. }
    )));
    assert!(!events.iter().any(|e| matches!(e, MonitorEvent::Snapshot(_) | MonitorEvent::Update(_))));
    match events.last().unwrap() {
        MonitorEvent::Stopped { reason, snapshot } => {
            assert!(reason.contains("initialization failed"));
            assert!(snapshot.is_none());
        }
        other => panic!("expected Stopped, got {other:?}"),
    }
    assert_eq!(provider.latest_calls(), 0);
}

#[tokio::test]
async fn signal_failure_during_initialisation_is_fatal() {
    let provider = Arc::new(MockMarketData::new().with_history(make_bars(&[1.0, 2.0])));
    let mut strategy = threshold_strategy(10, 40);
    strategy.sell.spec = failing_signal("broken");
    let (mut stream, handle) = spawn_monitor(provider, fast_settings(), session(strategy));

    let events = collect_events(&mut stream, |_| false).await;
    handle.await.unwrap();

    let message = events
        .iter()
        .find_map(|e| match e {
            MonitorEvent::Error { message, fatal: true, .. } => Some(message.clone()),
            _ => None,
        })
        .unwrap();
    assert!(message.contains("broken"));
    assert!(events.last().unwrap().is_terminal());
}

// ── Main loop ────────────────────────────────────────────────────────

#[tokio::test]
async fn loop_errors_are_reported_and_recovered() {
    let provider = Arc::new(
        MockMarketData::new()
            .with_history(make_bars(&[50.0]))
            .with_live(vec![
                LiveStep::Error("connection reset".to_string()),
                LiveStep::Bar(make_bar(1, 50.0)),
            ]),
    );
    let (mut stream, handle) = spawn_monitor(provider, fast_settings(), session(threshold_strategy(10, 40)));

    let events = collect_events(&mut stream, |events| updates(events) == 1).await;
    handle.await.unwrap();

    let error_at = events
        .iter()
        .position(|e| matches!(e, MonitorEvent::Error { stage: MonitorState::Processing, fatal: false, .. }))
        .unwrap();
    let update_at = events
        .iter()
        .position(|e| matches!(e, MonitorEvent::Update(_)))
        .unwrap();
    assert!(error_at < update_at);
    assert!(status_states(&events[error_at..update_at]).contains(&MonitorState::Error));
}

#[tokio::test]
async fn empty_and_stale_fetches_emit_no_update() {
    let provider = Arc::new(
        MockMarketData::new()
            .with_history(make_bars(&[50.0, 50.0, 50.0]))
            .with_live(vec![
                LiveStep::Empty,
                LiveStep::Bar(make_bar(1, 5.0)),
                LiveStep::Bar(make_bar(3, 5.0)),
            ]),
    );
    let (mut stream, handle) = spawn_monitor(provider, fast_settings(), session(threshold_strategy(10, 40)));

    let events = collect_events(&mut stream, |events| updates(events) == 1).await;
    handle.await.unwrap();

    let first = update_list(&events)[0];
    assert_eq!(first.timestamp, Some(t(3)));
    assert_eq!(first.executions.len(), 1);
    assert_eq!(first.chart.candles.len(), 4);

    // two idle cycles without data precede the update
    let before_update = events
        .iter()
        .position(|e| matches!(e, MonitorEvent::Update(_)))
        .unwrap();
    let idle = status_states(&events[..before_update])
        .into_iter()
        .filter(|s| *s == MonitorState::Idle)
        .count();
    assert_eq!(idle, 2);
}

#[tokio::test]
async fn revised_bar_does_not_trade_twice() {
    for mode in [RecomputeMode::Tail, RecomputeMode::Full] {
        let provider = Arc::new(
            MockMarketData::new()
                .with_history(make_bars(&[50.0, 50.0, 50.0]))
                .with_live_bars(vec![make_bar(3, 5.0), make_bar(3, 6.0), make_bar(4, 45.0)]),
        );
        let settings = MonitorSettings {
            recompute: mode,
            ..fast_settings()
        };
        let (mut stream, handle) = spawn_monitor(provider, settings, session(threshold_strategy(10, 40)));

        let events = collect_events(&mut stream, |events| updates(events) == 3).await;
        handle.await.unwrap();
        let updates = update_list(&events);

        assert_eq!(updates[0].executions[0].side, Side::Buy);
        assert!(updates[0].position.is_long());
        assert!(updates[1].executions.is_empty(), "{mode:?}");
        assert_eq!(updates[1].latest_price, Some(6.0));
        assert_eq!(updates[1].chart.candles.len(), 4);

        let last = updates[2];
        assert_eq!(last.executions.len(), 1);
        assert_eq!(last.executions[0].side, Side::Sell);
        assert_eq!(last.stats.total_trades, 1);
        assert_eq!(last.stats.trades[0].buy_price, 5.0);
        assert!((last.cumulative_pnl_pct - 800.0).abs() < 1e-9);
        assert_eq!(last.position, Position::Flat);
    }
}

#[tokio::test]
async fn window_is_bounded_by_retention() {
    let provider = Arc::new(
        MockMarketData::new()
            .with_history(make_bars(&[50.0; 5]))
            .with_live_bars((5..10).map(|i| make_bar(i, 50.0)).collect()),
    );
    let settings = MonitorSettings {
        retention: 4,
        ..fast_settings()
    };
    let (mut stream, handle) = spawn_monitor(provider, settings, session(threshold_strategy(10, 40)));

    let events = collect_events(&mut stream, |events| updates(events) == 5).await;
    handle.await.unwrap();

    for update in update_list(&events) {
        assert_eq!(update.chart.candles.len(), 4);
    }
    let last = update_list(&events)[4];
    assert_eq!(last.chart.candles[0].timestamp, t(6));
}

#[tokio::test]
async fn equity_agrees_with_stats_after_entry_bar_is_dropped() {
    let provider = Arc::new(
        MockMarketData::new()
            .with_history(make_bars(&[20.0, 20.0, 20.0]))
            .with_live_bars(vec![
                make_bar(3, 5.0),
                make_bar(4, 20.0),
                make_bar(5, 20.0),
                make_bar(6, 20.0),
                make_bar(7, 50.0),
            ]),
    );
    let settings = MonitorSettings {
        retention: 3,
        ..fast_settings()
    };
    let (mut stream, handle) = spawn_monitor(provider, settings, session(threshold_strategy(10, 40)));

    let events = collect_events(&mut stream, |events| updates(events) == 5).await;
    handle.await.unwrap();
    let last = update_list(&events)[4];

    assert_eq!(last.stats.total_trades, 1);
    assert!((last.cumulative_pnl_pct - 900.0).abs() < 1e-9);
    assert_eq!(last.position, Position::Flat);

    // the buy at minute 3 is no longer in the window
    let equity = &last.chart.equity;
    assert_eq!(equity.len(), 3);
    assert_eq!(equity[0].timestamp, t(5));
    assert_eq!(equity[0].cumulative_value, 1000.0);
    assert!((equity[2].cumulative_value - 10_000.0).abs() < 1e-6);
    assert!((equity[2].pnl_pct - last.cumulative_pnl_pct).abs() < 1e-9);

    // the final snapshot reports the same picture
    match events.last().unwrap() {
        MonitorEvent::Stopped { snapshot: Some(snapshot), .. } => {
            assert_eq!(snapshot.stats.total_trades, 1);
            let final_value = snapshot.chart.equity.last().unwrap().cumulative_value;
            assert!((final_value - 10_000.0).abs() < 1e-6);
        }
        other => panic!("expected Stopped with a snapshot, got {other:?}"),
    }
}

#[tokio::test]
async fn equity_carries_in_trades_closed_before_the_window() {
    let provider = Arc::new(
        MockMarketData::new()
            .with_history(make_bars(&[20.0, 20.0]))
            .with_live_bars(vec![
                make_bar(2, 5.0),
                make_bar(3, 50.0),
                make_bar(4, 20.0),
                make_bar(5, 20.0),
            ]),
    );
    let settings = MonitorSettings {
        retention: 2,
        ..fast_settings()
    };
    let (mut stream, handle) = spawn_monitor(provider, settings, session(threshold_strategy(10, 40)));

    let events = collect_events(&mut stream, |events| updates(events) == 4).await;
    handle.await.unwrap();
    let last = update_list(&events)[3];

    assert_eq!(last.stats.total_trades, 1);
    assert!(last.chart.sell_markers.is_empty());
    assert!(last
        .chart
        .equity
        .iter()
        .all(|p| (p.cumulative_value - 10_000.0).abs() < 1e-6));
}

// ── Cancellation ─────────────────────────────────────────────────────

#[tokio::test]
async fn stop_during_sleep_is_prompt() {
    let provider = Arc::new(
        MockMarketData::new()
            .with_history(make_bars(&[50.0]))
            .with_live_bars(vec![make_bar(1, 50.0)]),
    );
    let settings = MonitorSettings {
        poll_interval: Duration::from_secs(30),
        stop_check: Duration::from_millis(10),
        ..fast_settings()
    };
    let (mut stream, handle) = spawn_monitor(provider.clone(), settings, session(threshold_strategy(10, 40)));

    let mut cancelled_at = None;
    let mut stopped = None;
    while let Some(event) = stream.next_event().await {
        if let MonitorEvent::Status { state: MonitorState::Idle, .. } = event {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancelled_at = Some(Instant::now());
            stream.cancel();
        }
        if let MonitorEvent::Stopped { snapshot, .. } = event {
            stopped = Some(snapshot);
        }
    }
    handle.await.unwrap();

    let elapsed = cancelled_at.unwrap().elapsed();
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");

    let snapshot = stopped.unwrap().unwrap();
    assert_eq!(snapshot.timestamp, Some(t(1)));

    let calls = provider.latest_calls();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(provider.latest_calls(), calls);
}

#[tokio::test]
async fn stop_during_hanging_fetch_is_prompt() {
    let provider = Arc::new(
        MockMarketData::new()
            .with_history(make_bars(&[50.0]))
            .with_live(vec![LiveStep::Hang]),
    );
    let settings = MonitorSettings {
        fetch_timeout: Duration::from_secs(60),
        stop_check: Duration::from_millis(10),
        ..fast_settings()
    };
    let (mut stream, handle) = spawn_monitor(provider, settings, session(threshold_strategy(10, 40)));

    let started = Instant::now();
    let events = collect_events(&mut stream, |events| {
        matches!(
            events.last(),
            Some(MonitorEvent::Status { state: MonitorState::Processing, .. })
        )
    })
    .await;
    handle.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(events.last().unwrap().is_terminal());
    assert_eq!(updates(&events), 0);
}

#[tokio::test]
async fn fetch_timeout_is_a_recoverable_error() {
    let provider = Arc::new(
        MockMarketData::new()
            .with_history(make_bars(&[50.0]))
            .with_live(vec![LiveStep::Hang, LiveStep::Bar(make_bar(1, 50.0))]),
    );
    let settings = MonitorSettings {
        fetch_timeout: Duration::from_millis(20),
        ..fast_settings()
    };
    let (mut stream, handle) = spawn_monitor(provider, settings, session(threshold_strategy(10, 40)));

    let events = collect_events(&mut stream, |events| updates(events) == 1).await;
    handle.await.unwrap();

    assert!(events.iter().any(|e| matches!(
        e,
        MonitorEvent::Error { fatal: false, message, .. } if message.contains("did not answer")
    )));
    assert_eq!(updates(&events), 1);
}

// ── Coordinator ──────────────────────────────────────────────────────

#[tokio::test]
async fn coordinator_tracks_and_stops_sessions() {
    let provider = Arc::new(MockMarketData::new().with_history(make_bars(&[50.0])));
    let coordinator = MonitorCoordinator::new(provider, fast_settings());

    let (first, mut first_events) = coordinator.start(session(threshold_strategy(10, 40))).await;
    let (second, mut second_events) = coordinator.start(session(threshold_strategy(10, 40))).await;
    assert_ne!(first, second);
    assert_eq!(coordinator.active_sessions().await.len(), 2);

    assert!(coordinator.stop(first).await);
    assert!(!coordinator.stop(first).await);
    assert!(!coordinator.stop(9_999).await);

    let events = collect_events(&mut first_events, |_| false).await;
    assert!(events.last().unwrap().is_terminal());

    assert_eq!(coordinator.stop_all().await, 1);
    let events = collect_events(&mut second_events, |_| false).await;
    assert!(events.last().unwrap().is_terminal());
    assert!(coordinator.active_sessions().await.is_empty());
}

#[tokio::test]
async fn finished_and_abandoned_sessions_deregister() {
    let failing = Arc::new(MockMarketData::new().with_history_error("down"));
    let coordinator = MonitorCoordinator::new(failing, fast_settings());
    let (_, mut events) = coordinator.start(session(threshold_strategy(10, 40))).await;
    collect_events(&mut events, |_| false).await;
    wait_until_empty(&coordinator).await;

    let healthy = Arc::new(MockMarketData::new().with_history(make_bars(&[50.0])));
    let coordinator = MonitorCoordinator::new(healthy, fast_settings());
    let (_, events) = coordinator.start(session(threshold_strategy(10, 40))).await;
    assert_eq!(coordinator.active_sessions().await.len(), 1);
    drop(events);
    wait_until_empty(&coordinator).await;
}

async fn wait_until_empty(coordinator: &MonitorCoordinator) {
    for _ in 0..200 {
        if coordinator.active_sessions().await.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("sessions still registered: {:?}", coordinator.active_sessions().await);
}

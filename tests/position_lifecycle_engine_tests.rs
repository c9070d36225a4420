use sandbox_signal::lifecycle::{Direction, LifecycleEvent, PositionLifecycleEngine, PositionState};
use sandbox_signal::model::Signal;

#[test]
fn long_then_short_round_trips_walk_the_full_cycle() {
    let mut engine = PositionLifecycleEngine::default();
    assert_eq!(engine.state(), PositionState::Started);

    let script = [
        (Signal::Long, 100.0, PositionState::Long),
        (Signal::Short, 110.0, PositionState::CloseLong),
        (Signal::Short, 105.0, PositionState::Short),
        (Signal::Long, 100.0, PositionState::CloseShort),
    ];
    let mut events = Vec::new();
    for (i, (signal, price, expected)) in script.iter().enumerate() {
        let event = engine.on_signal(*signal, *price, 1_000 * i as u64);
        assert_eq!(engine.state(), *expected, "step {}", i);
        events.extend(event);
    }

    assert_eq!(events.len(), 4);
    let closed: Vec<_> = engine.transactions().iter().filter(|t| t.is_closed()).collect();
    assert_eq!(closed.len(), 2);
    assert_eq!(closed[0].direction, Direction::Long);
    assert!((closed[0].gain().expect("gain") - 0.10).abs() < 1e-12);
    assert_eq!(closed[1].direction, Direction::Short);
    assert!((closed[1].open_price - 105.0).abs() < f64::EPSILON);
}

#[test]
fn repeated_signals_emit_nothing() {
    let mut engine = PositionLifecycleEngine::default();
    assert!(engine.on_signal(Signal::Flat, 100.0, 1).is_none());
    assert!(engine.on_signal(Signal::Long, 100.0, 2).is_some());
    assert!(engine.on_signal(Signal::Long, 101.0, 3).is_none());
    assert!(engine.on_signal(Signal::Flat, 102.0, 4).is_none());
    assert_eq!(engine.state(), PositionState::Long);
    assert_eq!(engine.transactions().len(), 1);
    assert_eq!(engine.last_observation(), Some((4, 102.0)));
}

#[test]
fn close_event_reports_gain_and_message() {
    let mut engine = PositionLifecycleEngine::default();
    let opened = engine
        .on_signal(Signal::Short, 200.0, 10)
        .expect("open short");
    assert_eq!(
        opened.message("ETHUSDT"),
        "Entered Short position for ETHUSDT at 200"
    );

    let closed = engine.on_signal(Signal::Long, 190.0, 20).expect("close short");
    assert_eq!(closed.position_id(), opened.position_id());
    match &closed {
        LifecycleEvent::Closed { gain, .. } => assert!((gain - 0.05).abs() < 1e-12),
        other => panic!("expected close, got {:?}", other),
    }
    assert_eq!(
        closed.message("ETHUSDT"),
        "Closed Short position for ETHUSDT at 190 - gain +5.00%"
    );
    assert_eq!(engine.state(), PositionState::CloseShort);
    assert_eq!(engine.state().to_string(), "Close Short");
}

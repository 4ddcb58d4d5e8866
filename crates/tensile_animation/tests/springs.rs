//! End-to-end behavior through the public API

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tensile_animation::{
    frameloop, set_frameloop, with_frameloop, AnimValue, ConfigFile, Controller, DriverSignal,
    FrameLoop, Goals, ManualClock, PartialConfig, Phase, SpringConfig, SpringRef, SpringValue,
};

const FRAME: Duration = Duration::from_micros(16_667);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn number(spring: &SpringValue) -> f32 {
    spring.get().as_number().unwrap()
}

/// Frames until rest, or `None` after `limit` frames
fn frames_to_rest(frameloop: &FrameLoop, limit: u32) -> Option<u32> {
    for frame in 1..=limit {
        if !frameloop.advance(FRAME) {
            return Some(frame);
        }
    }
    None
}

#[test]
fn default_spring_reaches_goal_without_overshoot() {
    init_tracing();
    let frameloop = FrameLoop::new();
    let spring = SpringValue::with_default(frameloop.handle(), 0.0);
    let mut completion = spring.start(100.0).unwrap();

    let mut frames = 0;
    loop {
        frames += 1;
        let running = frameloop.advance(FRAME);
        assert!(number(&spring) <= 100.01, "overshot to {}", number(&spring));
        if !running {
            break;
        }
        assert!(frames < 600);
    }
    // Regression baseline for 0 -> 100 at 60fps
    assert_eq!(frames, 68);

    assert!((99.99..=100.01).contains(&number(&spring)));
    assert_eq!(spring.phase(), Phase::Resting);
    let result = completion.try_result().unwrap();
    assert!(result.finished);
    assert_eq!(result.value, AnimValue::Number(100.0));
}

#[test]
fn finer_precision_never_settles_sooner() {
    let mut previous = 0;
    for precision in [1.0, 0.1, 0.01, 0.001] {
        let frameloop = FrameLoop::new();
        let config = SpringConfig::wobbly().with_precision(precision);
        let spring = SpringValue::new(frameloop.handle(), 0.0, config);
        spring.start(100.0).unwrap();

        let frames = frames_to_rest(&frameloop, 5_000).unwrap();
        assert!(
            frames >= previous,
            "precision {precision} settled in {frames} frames, coarser took {previous}"
        );
        previous = frames;
    }
}

#[test]
fn clamped_spring_never_passes_its_goal() {
    let frameloop = FrameLoop::new();
    let spring = SpringValue::new(frameloop.handle(), 0.0, SpringConfig::wobbly().with_clamp(true));
    spring.start(50.0).unwrap();

    while frameloop.advance(FRAME) {
        assert!(number(&spring) <= 50.0);
    }
    assert_eq!(number(&spring), 50.0);
}

#[test]
fn reversing_mid_flight_rests_once_at_the_final_goal() {
    let frameloop = FrameLoop::new();
    let spring = SpringValue::with_default(frameloop.handle(), 0.0);
    let rests = Rc::new(RefCell::new(Vec::new()));
    let seen = rests.clone();
    spring.on_rest(move |event| seen.borrow_mut().push(event.value.clone()));

    let first = spring.start(50.0).unwrap();
    for _ in 0..5 {
        frameloop.advance(FRAME);
    }
    let velocity = spring.velocity().as_number().unwrap();
    let value = number(&spring);

    let second = spring.start(-50.0).unwrap();
    assert_eq!(number(&spring), value);
    assert_eq!(spring.velocity().as_number(), Some(velocity));

    while frameloop.advance(FRAME) {}
    assert_eq!(*rests.borrow(), [AnimValue::Number(-50.0)]);

    let first = pollster::block_on(first);
    let second = pollster::block_on(second);
    assert!(first.finished && second.finished);
    assert_eq!(second.value, AnimValue::Number(-50.0));
}

#[test]
fn stop_holds_the_current_value() {
    let frameloop = FrameLoop::new();
    let spring = SpringValue::with_default(frameloop.handle(), 0.0);
    let changes = Rc::new(Cell::new(0));
    let counter = changes.clone();
    spring.on_change(move |_| counter.set(counter.get() + 1));

    let completion = spring.start(100.0).unwrap();
    for _ in 0..3 {
        frameloop.advance(FRAME);
    }
    spring.stop();
    let held = spring.get();
    let before = changes.get();

    for _ in 0..10 {
        frameloop.advance(FRAME);
    }
    assert_eq!(spring.get(), held);
    assert_eq!(changes.get(), before);

    let result = pollster::block_on(completion);
    assert!(result.cancelled);
    assert_eq!(result.value, held);
}

#[test]
fn global_frameloop_can_be_injected_and_driven() {
    init_tracing();
    let clock = ManualClock::new();
    let signals = Rc::new(RefCell::new(Vec::new()));
    let log = signals.clone();

    let injected = FrameLoop::with_clock(clock.clone());
    injected.set_driver(move |signal: DriverSignal| log.borrow_mut().push(signal));
    assert!(set_frameloop(injected).is_none());

    let spring = SpringValue::with_default(frameloop(), [0.0, 0.0]);
    spring.start([30.0, -30.0]).unwrap();
    assert_eq!(*signals.borrow(), [DriverSignal::Start]);

    while with_frameloop(|fl| {
        clock.advance(FRAME);
        fl.tick()
    }) {}

    assert_eq!(spring.get(), AnimValue::from([30.0, -30.0]));
    assert_eq!(*signals.borrow(), [DriverSignal::Start, DriverSignal::Stop]);
}

#[test]
fn controller_uses_per_key_config_file() {
    let file = ConfigFile::from_toml_str(
        r#"
        [default]
        preset = "stiff"

        [keys.opacity]
        immediate = true

        [keys.broken]
        mass = -1.0
        "#,
    )
    .unwrap();

    let frameloop = FrameLoop::new();
    let controller = Controller::new(
        frameloop.handle(),
        [("x", 0.0), ("opacity", 0.0), ("broken", 0.0)],
    )
    .with_config(file.into_source());

    let batch = controller.update([("x", 10.0), ("opacity", 1.0), ("broken", 5.0)]);
    assert!(batch.is_rejected("broken"));
    assert!(!batch.is_rejected("x"));
    assert_eq!(controller.spring("x").unwrap().config().tension, SpringConfig::stiff().tension);

    frameloop.advance(FRAME);
    assert_eq!(controller.get("opacity"), Some(AnimValue::Number(1.0)));
    assert_eq!(controller.get("broken"), Some(AnimValue::Number(0.0)));

    while frameloop.advance(FRAME) {}
    let snapshot = pollster::block_on(batch.completion);
    assert!(snapshot.finished);
    assert_eq!(snapshot.value.number("x"), Some(10.0));
}

#[test]
fn json_and_toml_configs_resolve_alike() {
    let from_json: PartialConfig =
        serde_json::from_str(r#"{"tension": 300.0, "damping_ratio": 1.0}"#).unwrap();
    let from_toml = PartialConfig::from_toml_str("tension = 300.0\ndamping_ratio = 1.0").unwrap();
    assert_eq!(from_json, from_toml);

    let config = from_json.resolve().unwrap();
    assert!(config.is_critically_damped());

    let encoded = serde_json::to_string(&config).unwrap();
    let decoded: SpringConfig = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, config);
}

#[test]
fn spring_ref_drives_controllers_from_outside() {
    let frameloop = FrameLoop::new();
    let card = Controller::new(frameloop.handle(), Goals::new().with("y", 0.0));
    let api = SpringRef::new();
    api.attach(&card);

    let rests = Rc::new(Cell::new(0));
    let counter = rests.clone();
    card.on_rest(move |_| counter.set(counter.get() + 1));

    api.start([("y", -20.0)]);
    while frameloop.advance(FRAME) {}
    assert_eq!(api.get("y"), Some(AnimValue::Number(-20.0)));
    assert_eq!(rests.get(), 1);
}

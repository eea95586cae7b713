use std::time::{Duration, Instant};

use crate::channel::{Channel, KeyBinding, MidiTarget, Modifier};
use crate::config::AppConfig;
use crate::dispatch::{DispatchEvent, NoteTarget};
use crate::tracker::ReleasePolicy;

use super::Engine;

fn tick() -> Duration {
    Duration::from_millis(100)
}

fn pedal_binding() -> KeyBinding {
    KeyBinding {
        key: "space".into(),
        modifier: Modifier::None,
        send_as_key: true,
        send_as_midi: false,
        hold_mode: false,
        threshold: 64,
    }
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.channels.push(Channel::new("a0"));
    let mut pedal = Channel::new("d3");
    pedal.key_binding = Some(pedal_binding());
    config.channels.push(pedal);
    config
}

fn engine() -> Engine {
    Engine::new(&config())
}

fn press_key(event: &DispatchEvent) -> Option<&str> {
    match event {
        DispatchEvent::Press(action) => Some(&action.key),
        _ => None,
    }
}

fn release_key(event: &DispatchEvent) -> Option<&str> {
    match event {
        DispatchEvent::Release(action) => Some(&action.key),
        _ => None,
    }
}

#[test]
fn repeated_assertions_yield_one_press_one_release() {
    let mut engine = engine();
    let t0 = Instant::now();

    let first = engine.handle_line("$a", t0);
    assert_eq!(first.len(), 1);
    assert_eq!(press_key(&first[0]), Some("a"));

    assert!(engine.handle_line("$a", t0 + tick() / 2).is_empty());
    assert!(engine.handle_line("$a", t0 + tick()).is_empty());

    // Silence shorter than a window keeps the key down
    assert!(engine.tick(t0 + tick() + tick() / 2).is_empty());

    let released = engine.tick(t0 + tick() * 2);
    assert_eq!(released.len(), 1);
    assert_eq!(release_key(&released[0]), Some("a"));
    assert_eq!(engine.pressed_count(), 0);
}

#[test]
fn wire_key_press_carries_vocabulary_note() {
    let config = config();
    let expected = config.keys.iter().position(|k| k == "a").unwrap() as u8;
    let mut engine = Engine::new(&config);

    let events = engine.handle_line("$a", Instant::now());
    match &events[0] {
        DispatchEvent::Press(action) => {
            assert!(action.hold);
            assert_eq!(
                action.note,
                Some(NoteTarget {
                    channel: 0,
                    note: expected
                })
            );
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn explicit_release_marker_releases_once() {
    let mut engine = engine();
    let t0 = Instant::now();

    engine.handle_line("$a", t0);
    let released = engine.handle_line("!a", t0);
    assert_eq!(released.len(), 1);
    assert_eq!(release_key(&released[0]), Some("a"));

    assert!(engine.handle_line("!a", t0).is_empty());
}

#[test]
fn liveness_policy_ignores_explicit_release() {
    let mut cfg = config();
    cfg.release_policy = ReleasePolicy::Liveness;
    let mut engine = Engine::new(&cfg);
    let t0 = Instant::now();

    engine.handle_line("$a", t0);
    assert!(engine.handle_line("!a", t0).is_empty());
    assert_eq!(engine.pressed_count(), 1);
}

#[test]
fn sample_maps_through_channel() {
    let mut engine = engine();
    let events = engine.handle_line("a0512", Instant::now());
    assert_eq!(
        events,
        vec![DispatchEvent::SampleMapped {
            wire_id: "a0".into(),
            output: 64,
            midi: None,
        }]
    );
}

#[test]
fn decode_is_deterministic_across_instances() {
    let a = engine().handle_line("a0512", Instant::now());
    let b = engine().handle_line("a0512", Instant::now());
    assert_eq!(a, b);
}

#[test]
fn unregistered_sample_is_inert() {
    let mut engine = engine();
    assert!(engine.handle_line("z9123", Instant::now()).is_empty());
    assert_eq!(engine.pressed_count(), 0);
}

#[test]
fn noise_lines_are_inert() {
    let mut engine = engine();
    let now = Instant::now();
    assert!(engine.handle_line("", now).is_empty());
    assert!(engine.handle_line("##", now).is_empty());
    assert!(engine.handle_line("hello world", now).is_empty());
}

#[test]
fn mouse_edge_holds_and_releases_the_button() {
    let mut engine = engine();
    let t0 = Instant::now();

    let events = engine.handle_line("$mouse", t0);
    assert_eq!(events.len(), 1);
    match &events[0] {
        DispatchEvent::Press(action) => {
            assert_eq!(action.key, "mouse");
            assert!(action.hold);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let released = engine.tick(t0 + tick() * 2);
    assert_eq!(released.len(), 1);
    assert_eq!(release_key(&released[0]), Some("mouse"));
}

#[test]
fn coordinates_move_the_pointer() {
    let mut engine = engine();
    assert_eq!(
        engine.handle_line("10,20", Instant::now()),
        vec![DispatchEvent::PointerMove { x: 10, y: 20 }]
    );
}

#[test]
fn threshold_crossing_presses_and_releases() {
    let mut engine = engine();
    let t0 = Instant::now();

    // 900/1023 * 127 = 111.7 -> 112, above the threshold of 64
    let events = engine.handle_line("d3900", t0);
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        DispatchEvent::SampleMapped { wire_id, output: 112, .. } if wire_id == "d3"
    ));
    match &events[1] {
        DispatchEvent::Press(action) => {
            assert_eq!(action.key, "space");
            assert!(!action.hold);
            assert_eq!(action.note, None);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Staying above the threshold does not re-press
    let events = engine.handle_line("d3900", t0 + tick() / 4);
    assert_eq!(events.len(), 1);

    // Falling below releases exactly once
    let events = engine.handle_line("d3100", t0 + tick() / 2);
    assert_eq!(events.len(), 2);
    assert_eq!(release_key(&events[1]), Some("space"));

    let events = engine.handle_line("d3100", t0 + tick() / 2);
    assert_eq!(events.len(), 1);
}

#[test]
fn synthetic_edge_with_midi_target_uses_it_as_note() {
    let mut cfg = AppConfig::default();
    let mut pedal = Channel::new("d3");
    let mut binding = pedal_binding();
    binding.send_as_midi = true;
    pedal.key_binding = Some(binding);
    pedal.midi_target = Some(MidiTarget {
        controller: 44,
        channel: 2,
    });
    cfg.channels.push(pedal);
    let mut engine = Engine::new(&cfg);

    let events = engine.handle_line("d3900", Instant::now());
    match &events[1] {
        DispatchEvent::Press(action) => assert_eq!(
            action.note,
            Some(NoteTarget {
                channel: 2,
                note: 44
            })
        ),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn sample_with_midi_target_requests_control_change() {
    let mut cfg = AppConfig::default();
    let mut fader = Channel::new("a0");
    fader.midi_target = Some(MidiTarget {
        controller: 7,
        channel: 0,
    });
    cfg.channels.push(fader);
    let mut engine = Engine::new(&cfg);

    let events = engine.handle_line("a01023", Instant::now());
    assert_eq!(
        events,
        vec![DispatchEvent::SampleMapped {
            wire_id: "a0".into(),
            output: 127,
            midi: Some(MidiTarget {
                controller: 7,
                channel: 0
            }),
        }]
    );
}

#[test]
fn disconnect_releases_everything() {
    let mut engine = engine();
    let t0 = Instant::now();

    engine.handle_line("$a", t0);
    engine.handle_line("$b", t0);
    engine.handle_line("d3900", t0);
    assert_eq!(engine.pressed_count(), 3);

    let events = engine.disconnect();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| release_key(e).is_some()));
    assert_eq!(engine.pressed_count(), 0);
}

#[test]
fn liveness_sweep_releases_stale_synthetic_edges() {
    let mut engine = engine();
    let t0 = Instant::now();

    engine.handle_line("d3900", t0);
    assert_eq!(engine.pressed_count(), 1);

    let released = engine.tick(t0 + tick() * 2);
    assert_eq!(released.len(), 1);
    assert_eq!(release_key(&released[0]), Some("space"));
}

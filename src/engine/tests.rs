use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{BackendOp, InputBackend, RecordingBackend};
use crate::gate::{FakeProbe, ForegroundProbe, GateStatus, WindowGate, WindowHandle, WindowTarget};
use crate::keys::{self, Modifiers};

use super::*;

fn make_engine() -> (Arc<Engine>, Arc<RecordingBackend>, Arc<FakeProbe>) {
    let backend = Arc::new(RecordingBackend::new());
    let probe = Arc::new(FakeProbe::new());
    let gate = Arc::new(WindowGate::new(probe.clone() as Arc<dyn ForegroundProbe>));
    let engine = Arc::new(Engine::new(backend.clone() as Arc<dyn InputBackend>, gate));
    engine.register_hotkey("F6").unwrap();
    (engine, backend, probe)
}

fn raw(code: u32, is_down: bool) -> RawInput {
    RawInput {
        code,
        is_down,
        modifiers: Modifiers::NONE,
        timestamp: Instant::now(),
    }
}

fn tap(engine: &Arc<Engine>, code: u32) {
    engine.handle_raw_input(raw(code, true));
    engine.handle_raw_input(raw(code, false));
}

const F6: u32 = 0x75;

#[test]
fn test_toggle_starts_and_stops_session() {
    let (engine, backend, _) = make_engine();
    engine.set_toggle_debounce(0);
    engine
        .set_action_list(vec![Action::Key {
            code: 0x41,
            interval_ms: 5,
        }])
        .unwrap();

    tap(&engine, F6);
    assert_eq!(engine.session_state(), SessionState::Running);

    std::thread::sleep(Duration::from_millis(50));
    tap(&engine, F6);
    assert_eq!(engine.session_state(), SessionState::Idle);

    let ops = backend.ops();
    assert!(ops.contains(&BackendOp::KeyDown(0x41)));
    assert!(ops.contains(&BackendOp::KeyUp(0x41)));
    // The trailing event must be a release.
    assert!(matches!(
        ops.last(),
        Some(BackendOp::KeyUp(_)) | Some(BackendOp::Button(_, false))
    ));
}

#[test]
fn test_toggle_debounce_swallows_rapid_presses() {
    let (engine, _, _) = make_engine();
    engine
        .set_action_list(vec![Action::Key {
            code: 0x41,
            interval_ms: 5,
        }])
        .unwrap();

    tap(&engine, F6);
    assert_eq!(engine.session_state(), SessionState::Running);

    // Within the default 300ms window, so it must not stop the session.
    tap(&engine, F6);
    assert_eq!(engine.session_state(), SessionState::Running);

    engine.stop_session().unwrap();
}

#[test]
fn test_unbound_key_is_ignored() {
    let (engine, _, _) = make_engine();
    engine
        .set_action_list(vec![Action::Key {
            code: 0x41,
            interval_ms: 5,
        }])
        .unwrap();

    assert!(!engine.handle_raw_input(raw(0x42, true)));
    assert_eq!(engine.session_state(), SessionState::Idle);
}

#[test]
fn test_modifier_binding_requires_modifiers() {
    let (engine, _, _) = make_engine();
    engine.register_hotkey("CTRL+F6").unwrap();
    engine.set_toggle_debounce(0);
    engine
        .set_action_list(vec![Action::Key {
            code: 0x41,
            interval_ms: 5,
        }])
        .unwrap();

    // Bare press does not match.
    assert!(!engine.handle_raw_input(raw(F6, true)));
    assert_eq!(engine.session_state(), SessionState::Idle);

    let with_ctrl = RawInput {
        code: F6,
        is_down: true,
        modifiers: Modifiers::CTRL,
        timestamp: Instant::now(),
    };
    assert!(engine.handle_raw_input(with_ctrl));
    assert_eq!(engine.session_state(), SessionState::Running);
    engine.stop_session().unwrap();
}

#[test]
fn test_hold_mode_runs_only_while_held() {
    let (engine, backend, _) = make_engine();
    engine.set_mode(Mode::Hold).unwrap();
    engine
        .set_action_list(vec![Action::Key {
            code: 0x41,
            interval_ms: 5,
        }])
        .unwrap();

    engine.handle_raw_input(raw(F6, true));
    assert_eq!(engine.session_state(), SessionState::Running);

    std::thread::sleep(Duration::from_millis(40));
    engine.handle_raw_input(raw(F6, false));
    assert_eq!(engine.session_state(), SessionState::Idle);

    assert!(backend.ops().contains(&BackendOp::KeyDown(0x41)));
}

#[test]
fn test_auto_repeat_does_not_restart_hold_session() {
    let (engine, _, _) = make_engine();
    engine.set_mode(Mode::Hold).unwrap();
    engine
        .set_action_list(vec![Action::Key {
            code: 0x41,
            interval_ms: 5,
        }])
        .unwrap();

    engine.handle_raw_input(raw(F6, true));
    // OS auto-repeat arrives while the key is physically held.
    engine.handle_raw_input(raw(F6, true));
    engine.handle_raw_input(raw(F6, true));
    assert_eq!(engine.session_state(), SessionState::Running);

    engine.handle_raw_input(raw(F6, false));
    assert_eq!(engine.session_state(), SessionState::Idle);
}

#[test]
fn test_snapshot_is_immutable_during_session() {
    let (engine, _, _) = make_engine();
    engine.set_toggle_debounce(0);
    engine
        .set_action_list(vec![Action::Key {
            code: 0x41,
            interval_ms: 5,
        }])
        .unwrap();

    tap(&engine, F6);
    engine
        .set_action_list(vec![Action::Key {
            code: 0x5A,
            interval_ms: 5,
        }])
        .unwrap();

    // The running session still replays the list captured at start.
    assert_eq!(engine.pressed_codes_in_snapshot(), vec![0x41]);
    engine.stop_session().unwrap();
}

#[test]
fn test_rapid_fire_keys_excluded_from_snapshot() {
    let (engine, _, _) = make_engine();
    engine.set_toggle_debounce(0);
    engine
        .set_action_list(vec![
            Action::Key {
                code: 0x41,
                interval_ms: 5,
            },
            Action::Key {
                code: 0x42,
                interval_ms: 5,
            },
        ])
        .unwrap();
    engine.rapid_fire().set_config(
        0x41,
        RapidFireConfig {
            press_ms: 10,
            burst_delay_ms: 10,
        },
    );
    engine.rapid_fire().set_enabled(true);

    tap(&engine, F6);
    assert_eq!(engine.pressed_codes_in_snapshot(), vec![0x42]);

    engine.rapid_fire().set_enabled(false);
    engine.stop_session().unwrap();
}

#[test]
fn test_empty_action_list_does_not_start() {
    let (engine, _, _) = make_engine();
    engine.start_session().unwrap();
    assert_eq!(engine.session_state(), SessionState::Idle);
}

#[test]
fn test_double_start_is_rejected() {
    let (engine, _, _) = make_engine();
    engine
        .set_action_list(vec![Action::Key {
            code: 0x41,
            interval_ms: 5,
        }])
        .unwrap();

    engine.start_session().unwrap();
    assert!(matches!(
        engine.start_session(),
        Err(crate::error::EngineError::AlreadyRunning)
    ));
    engine.stop_session().unwrap();
}

#[test]
fn test_inactive_target_blocks_start() {
    let (engine, _, probe) = make_engine();
    probe.set_foreground(Some(WindowHandle(99)));
    engine.set_target_window(Some(WindowTarget {
        handle: WindowHandle(42),
        title: "Game".to_string(),
        process_name: "game.exe".to_string(),
    }));
    engine
        .set_action_list(vec![Action::Key {
            code: 0x41,
            interval_ms: 5,
        }])
        .unwrap();

    assert!(matches!(
        engine.start_session(),
        Err(crate::error::EngineError::GateBlocked(_))
    ));
    assert_eq!(engine.session_state(), SessionState::Idle);
}

#[test]
fn test_gate_loss_stops_running_session() {
    let (engine, backend, probe) = make_engine();
    probe.set_foreground(Some(WindowHandle(42)));
    engine.set_target_window(Some(WindowTarget {
        handle: WindowHandle(42),
        title: "Game".to_string(),
        process_name: "game.exe".to_string(),
    }));
    engine
        .set_action_list(vec![Action::Key {
            code: 0x41,
            interval_ms: 5,
        }])
        .unwrap();

    engine.start_session().unwrap();
    assert_eq!(engine.session_state(), SessionState::Running);

    engine.on_gate_change(GateStatus::Inactive);
    assert_eq!(engine.session_state(), SessionState::Idle);
    assert!(matches!(
        backend.ops().last(),
        Some(BackendOp::KeyUp(_)) | Some(BackendOp::Button(_, false))
    ));
}

#[test]
fn test_mode_switch_restarts_running_session() {
    let (engine, _, _) = make_engine();
    engine.set_toggle_debounce(0);
    engine
        .set_action_list(vec![Action::Key {
            code: 0x41,
            interval_ms: 5,
        }])
        .unwrap();

    let events = engine.subscribe();
    engine.start_session().unwrap();
    engine.set_mode(Mode::Hold).unwrap();
    assert_eq!(engine.session_state(), SessionState::Running);
    assert_eq!(engine.mode(), Mode::Hold);

    let seen: Vec<EngineEvent> = events.try_iter().collect();
    assert!(seen.contains(&EngineEvent::SessionStarted(Mode::Sequence)));
    assert!(seen.contains(&EngineEvent::SessionStopped));
    assert!(seen.contains(&EngineEvent::ModeSwitched(Mode::Hold)));
    assert!(seen.contains(&EngineEvent::SessionStarted(Mode::Hold)));

    engine.stop_session().unwrap();
}

#[test]
fn test_wheel_binding_toggles_in_hold_mode() {
    let (engine, _, _) = make_engine();
    engine.register_hotkey("WHEELUP").unwrap();
    engine.set_mode(Mode::Hold).unwrap();
    engine.set_toggle_debounce(0);
    engine
        .set_action_list(vec![Action::Key {
            code: 0x41,
            interval_ms: 5,
        }])
        .unwrap();

    // A wheel gesture has no release; down alone must toggle.
    engine.handle_raw_input(raw(keys::VK_WHEEL_UP, true));
    assert_eq!(engine.session_state(), SessionState::Running);

    engine.handle_raw_input(raw(keys::VK_WHEEL_UP, true));
    assert_eq!(engine.session_state(), SessionState::Idle);
}

#[test]
fn test_action_validation_rejects_origin_coordinate() {
    let (engine, _, _) = make_engine();
    let result = engine.set_action_list(vec![Action::Coord {
        x: 0,
        y: 0,
        interval_ms: 5,
    }]);
    assert!(matches!(
        result,
        Err(crate::error::EngineError::InvalidAction(_))
    ));
}

#[test]
fn test_hold_stop_waits_for_in_flight_transition() {
    let (engine, backend, _) = make_engine();
    engine.set_mode(Mode::Hold).unwrap();
    engine
        .set_action_list(vec![Action::Key {
            code: 0x41,
            interval_ms: 5,
        }])
        .unwrap();

    engine.handle_raw_input(raw(F6, true));
    assert_eq!(engine.session_state(), SessionState::Running);

    // Occupy the transition lock the way a racing start does.
    let blocker = Arc::clone(&engine);
    let guard = std::thread::spawn(move || {
        let _ = blocker
            .hold
            .with_transition(|| std::thread::sleep(Duration::from_millis(80)));
    });
    std::thread::sleep(Duration::from_millis(20));

    // The stop must wait out the contention and still cancel the worker,
    // never report success with the worker left running.
    engine.stop_session().unwrap();
    guard.join().unwrap();

    assert_eq!(engine.session_state(), SessionState::Idle);
    assert!(!engine.throttle.is_running(SESSION_WORKER));
    assert!(matches!(backend.ops().last(), Some(BackendOp::KeyUp(_))));
}

#[test]
fn test_should_consume_only_swallows_binding_events() {
    let (engine, _, _) = make_engine();

    assert!(engine.should_consume(&raw(F6, true)));
    assert!(!engine.should_consume(&raw(0x42, true)));
    // A release with no tracked press passes through.
    assert!(!engine.should_consume(&raw(F6, false)));

    engine.handle_raw_input(raw(F6, true));
    assert!(engine.should_consume(&raw(F6, false)));
    engine.handle_raw_input(raw(F6, false));

    engine.register_hotkey("CTRL+F6").unwrap();
    assert!(!engine.should_consume(&raw(F6, true)));
    let with_ctrl = RawInput {
        code: F6,
        is_down: true,
        modifiers: Modifiers::CTRL,
        timestamp: Instant::now(),
    };
    assert!(engine.should_consume(&with_ctrl));

    engine.register_hotkey("WHEELUP").unwrap();
    assert!(engine.should_consume(&raw(keys::VK_WHEEL_UP, true)));
    assert!(engine.should_consume(&raw(keys::VK_WHEEL_UP, false)));
}

#[test]
fn test_press_duration_floor() {
    let (engine, _, _) = make_engine();
    engine.set_press_duration(0);
    assert_eq!(engine.press_duration(), 1);
}

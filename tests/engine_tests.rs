//! End-to-end engine behavior through the public API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use keyrelay::backend::{BackendOp, InputBackend, RecordingBackend};
use keyrelay::engine::{Action, Engine, EngineEvent, Mode, RawInput, SessionState};
use keyrelay::gate::{FakeProbe, ForegroundProbe, GateStatus, WindowGate, WindowHandle, WindowTarget};
use keyrelay::keys::Modifiers;

const F6: u32 = 0x75;
const KEY_A: u32 = 0x41;

fn setup() -> (Arc<Engine>, Arc<RecordingBackend>, Arc<FakeProbe>) {
    let backend = Arc::new(RecordingBackend::new());
    let probe = Arc::new(FakeProbe::new());
    let gate = Arc::new(WindowGate::new(probe.clone() as Arc<dyn ForegroundProbe>));
    let engine = Arc::new(Engine::new(backend.clone() as Arc<dyn InputBackend>, gate));
    engine.register_hotkey("F6").unwrap();
    engine.set_toggle_debounce(0);
    engine
        .set_action_list(vec![Action::Key {
            code: KEY_A,
            interval_ms: 5,
        }])
        .unwrap();
    (engine, backend, probe)
}

fn tap(engine: &Arc<Engine>, code: u32) {
    engine.handle_raw_input(RawInput {
        code,
        is_down: true,
        modifiers: Modifiers::NONE,
        timestamp: Instant::now(),
    });
    engine.handle_raw_input(RawInput {
        code,
        is_down: false,
        modifiers: Modifiers::NONE,
        timestamp: Instant::now(),
    });
}

/// Every press in the log must have a matching release once idle.
fn assert_keys_released(ops: &[BackendOp]) {
    let mut down = std::collections::HashMap::new();
    for op in ops {
        match op {
            BackendOp::KeyDown(code) => *down.entry(*code).or_insert(0i32) += 1,
            BackendOp::KeyUp(code) => *down.entry(*code).or_insert(0i32) -= 1,
            _ => {}
        }
    }
    for (code, balance) in down {
        assert!(balance <= 0, "key {code:#x} left pressed");
    }
}

#[test]
fn test_full_toggle_lifecycle() {
    let (engine, backend, _) = setup();
    let events = engine.subscribe();

    tap(&engine, F6);
    assert_eq!(engine.session_state(), SessionState::Running);
    std::thread::sleep(Duration::from_millis(80));
    tap(&engine, F6);
    assert_eq!(engine.session_state(), SessionState::Idle);

    let ops = backend.ops();
    let presses = ops
        .iter()
        .filter(|op| matches!(op, BackendOp::KeyDown(code) if *code == KEY_A))
        .count();
    assert!(presses >= 3, "only {presses} presses in 80ms");
    assert_keys_released(&ops);

    let seen: Vec<EngineEvent> = events.try_iter().collect();
    assert!(seen.contains(&EngineEvent::SessionStarted(Mode::Sequence)));
    assert!(seen.contains(&EngineEvent::SessionStopped));
}

#[test]
fn test_hold_session_ends_on_release() {
    let (engine, backend, _) = setup();
    engine.set_mode(Mode::Hold).unwrap();

    engine.handle_raw_input(RawInput {
        code: F6,
        is_down: true,
        modifiers: Modifiers::NONE,
        timestamp: Instant::now(),
    });
    assert_eq!(engine.session_state(), SessionState::Running);
    std::thread::sleep(Duration::from_millis(60));

    engine.handle_raw_input(RawInput {
        code: F6,
        is_down: false,
        modifiers: Modifiers::NONE,
        timestamp: Instant::now(),
    });
    assert_eq!(engine.session_state(), SessionState::Idle);
    assert_keys_released(&backend.ops());
}

#[test]
fn test_losing_focus_kills_running_session() {
    let (engine, backend, probe) = setup();
    probe.set_foreground(Some(WindowHandle(7)));
    engine.set_target_window(Some(WindowTarget {
        handle: WindowHandle(7),
        title: "Game".to_string(),
        process_name: "game.exe".to_string(),
    }));

    tap(&engine, F6);
    assert_eq!(engine.session_state(), SessionState::Running);
    std::thread::sleep(Duration::from_millis(30));

    // Simulate the poller noticing another window took focus.
    probe.set_foreground(Some(WindowHandle(8)));
    engine.on_gate_change(GateStatus::Inactive);

    assert_eq!(engine.session_state(), SessionState::Idle);
    assert_keys_released(&backend.ops());
}

#[test]
fn test_killed_process_kills_running_session() {
    let (engine, backend, probe) = setup();
    probe.set_foreground(Some(WindowHandle(7)));
    engine.set_target_window(Some(WindowTarget {
        handle: WindowHandle(7),
        title: "Game".to_string(),
        process_name: "game.exe".to_string(),
    }));

    tap(&engine, F6);
    assert_eq!(engine.session_state(), SessionState::Running);

    probe
        .process_alive
        .store(false, std::sync::atomic::Ordering::Relaxed);
    engine.on_gate_change(GateStatus::ProcessNotRunning);

    assert_eq!(engine.session_state(), SessionState::Idle);
    assert_keys_released(&backend.ops());
}

#[test]
fn test_edits_during_session_apply_next_session() {
    let (engine, backend, _) = setup();

    tap(&engine, F6);
    engine
        .set_action_list(vec![Action::Key {
            code: 0x42,
            interval_ms: 5,
        }])
        .unwrap();
    std::thread::sleep(Duration::from_millis(40));
    tap(&engine, F6);

    // First session only ever touched the original key.
    assert!(!backend.ops().contains(&BackendOp::KeyDown(0x42)));

    backend.clear();
    tap(&engine, F6);
    std::thread::sleep(Duration::from_millis(40));
    tap(&engine, F6);
    assert!(backend.ops().contains(&BackendOp::KeyDown(0x42)));
}

#[test]
fn test_coordinate_actions_move_then_click() {
    let (engine, backend, _) = setup();
    engine
        .set_action_list(vec![Action::Coord {
            x: 640,
            y: 480,
            interval_ms: 5,
        }])
        .unwrap();

    tap(&engine, F6);
    std::thread::sleep(Duration::from_millis(40));
    tap(&engine, F6);

    let ops = backend.ops();
    let move_idx = ops
        .iter()
        .position(|op| matches!(op, BackendOp::MoveAbs(640, 480)))
        .expect("no absolute move recorded");
    assert!(
        matches!(ops[move_idx + 1], BackendOp::Button(_, true)),
        "move not followed by a click"
    );
}

#[test]
fn test_shutdown_is_idempotent() {
    let (engine, _, _) = setup();
    tap(&engine, F6);
    engine.shutdown();
    engine.shutdown();
    assert_eq!(engine.session_state(), SessionState::Idle);
}

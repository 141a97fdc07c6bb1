//! Config loading, saving and validation.

use keyrelay::config::{ActionEntry, AppConfig, RapidFireEntry};
use keyrelay::engine::{Action, Mode};

#[test]
fn test_load_or_create_writes_default_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Config.toml");

    let config = AppConfig::load_or_create(&path).unwrap();
    assert!(path.exists());
    assert_eq!(config.hotkey, "F6");
    assert_eq!(config.mode(), Mode::Sequence);

    // A second load parses the file written above.
    let reloaded = AppConfig::load_or_create(&path).unwrap();
    assert_eq!(reloaded.hotkey, config.hotkey);
    assert_eq!(reloaded.press_duration, config.press_duration);
}

#[test]
fn test_save_and_reload_preserves_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Config.toml");

    let config = AppConfig {
        hotkey: "CTRL+F8".to_string(),
        hold_mode: true,
        press_duration: 8,
        toggle_debounce: 250,
        release_timeout: 40,
        focus_poll: 100,
        process_poll: 2000,
        target_window: "Game".to_string(),
        actions: vec![
            ActionEntry {
                key: "A".to_string(),
                x: 0,
                y: 0,
                interval: 15,
            },
            ActionEntry {
                key: String::new(),
                x: 640,
                y: 480,
                interval: 30,
            },
        ],
        rapid_fire_enabled: true,
        rapid_fire: vec![RapidFireEntry {
            key: "SPACE".to_string(),
            press_time: 10,
            delay: 25,
        }],
    };

    config.save_to_file(&path).unwrap();
    let reloaded = AppConfig::load_from_file(&path).unwrap();

    assert_eq!(reloaded.hotkey, "CTRL+F8");
    assert!(reloaded.hold_mode);
    assert_eq!(reloaded.mode(), Mode::Hold);
    assert_eq!(reloaded.press_duration, 8);
    assert_eq!(reloaded.target_window, "Game");
    assert_eq!(reloaded.actions.len(), 2);
    assert_eq!(reloaded.actions[1].x, 640);
    assert_eq!(reloaded.rapid_fire.len(), 1);
    assert_eq!(reloaded.rapid_fire[0].delay, 25);
}

#[test]
fn test_out_of_range_values_are_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Config.toml");
    std::fs::write(
        &path,
        "press_duration = 0\nfocus_poll = 1\nprocess_poll = 10\n",
    )
    .unwrap();

    let config = AppConfig::load_from_file(&path).unwrap();
    assert_eq!(config.press_duration, 1);
    assert_eq!(config.focus_poll, 10);
    assert_eq!(config.process_poll, 500);
}

#[test]
fn test_malformed_toml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Config.toml");
    std::fs::write(&path, "hotkey = [not toml").unwrap();
    assert!(AppConfig::load_from_file(&path).is_err());
}

#[test]
fn test_action_entries_convert() {
    let key_entry = ActionEntry {
        key: "SPACE".to_string(),
        x: 0,
        y: 0,
        interval: 20,
    };
    assert!(matches!(
        key_entry.to_action().unwrap(),
        Action::Key {
            code: 0x20,
            interval_ms: 20
        }
    ));

    let coord_entry = ActionEntry {
        key: String::new(),
        x: 10,
        y: 20,
        interval: 20,
    };
    assert!(matches!(
        coord_entry.to_action().unwrap(),
        Action::Coord {
            x: 10,
            y: 20,
            interval_ms: 20
        }
    ));
}

#[test]
fn test_unknown_key_names_are_rejected() {
    let entry = ActionEntry {
        key: "NOSUCHKEY".to_string(),
        x: 0,
        y: 0,
        interval: 20,
    };
    assert!(entry.to_action().is_err());

    let rf = RapidFireEntry {
        key: "ALSONOTAKEY".to_string(),
        press_time: 10,
        delay: 10,
    };
    assert!(rf.to_config().is_err());
}

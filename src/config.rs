use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::engine::{Action, Mode, RapidFireConfig};
use crate::error::EngineError;
use crate::keys;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_hotkey")]
    pub hotkey: String,
    #[serde(default)]
    pub hold_mode: bool,
    #[serde(default = "default_press_duration")]
    pub press_duration: u64,
    #[serde(default = "default_toggle_debounce")]
    pub toggle_debounce: u64,
    #[serde(default = "default_release_timeout")]
    pub release_timeout: u64,
    #[serde(default = "default_focus_poll")]
    pub focus_poll: u64,
    #[serde(default = "default_process_poll")]
    pub process_poll: u64,
    /// Window title substring to bind sessions to. Empty means no target.
    #[serde(default)]
    pub target_window: String,
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
    #[serde(default)]
    pub rapid_fire_enabled: bool,
    #[serde(default)]
    pub rapid_fire: Vec<RapidFireEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionEntry {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

impl ActionEntry {
    /// A populated `key` makes this a key step, otherwise it is a
    /// coordinate click at (x, y).
    pub fn to_action(&self) -> anyhow::Result<Action> {
        if !self.key.is_empty() {
            let code = keys::key_name_to_code(&self.key)
                .ok_or_else(|| EngineError::UnknownKey(self.key.clone()))?;
            return Ok(Action::Key {
                code,
                interval_ms: self.interval,
            });
        }
        let action = Action::Coord {
            x: self.x,
            y: self.y,
            interval_ms: self.interval,
        };
        action.validate()?;
        Ok(action)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RapidFireEntry {
    pub key: String,
    #[serde(default = "default_press_duration")]
    pub press_time: u64,
    #[serde(default = "default_burst_delay")]
    pub delay: u64,
}

impl RapidFireEntry {
    pub fn to_config(&self) -> anyhow::Result<(u32, RapidFireConfig)> {
        let code = keys::key_name_to_code(&self.key)
            .ok_or_else(|| EngineError::UnknownKey(self.key.clone()))?;
        Ok((
            code,
            RapidFireConfig {
                press_ms: self.press_time,
                burst_delay_ms: self.delay,
            },
        ))
    }
}

fn default_hotkey() -> String {
    "F6".to_string()
}
fn default_press_duration() -> u64 {
    5
}
fn default_toggle_debounce() -> u64 {
    300
}
fn default_release_timeout() -> u64 {
    50
}
fn default_focus_poll() -> u64 {
    50
}
fn default_process_poll() -> u64 {
    5000
}
fn default_interval() -> u64 {
    50
}
fn default_burst_delay() -> u64 {
    20
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hotkey: default_hotkey(),
            hold_mode: false,
            press_duration: default_press_duration(),
            toggle_debounce: default_toggle_debounce(),
            release_timeout: default_release_timeout(),
            focus_poll: default_focus_poll(),
            process_poll: default_process_poll(),
            target_window: String::new(),
            actions: vec![ActionEntry {
                key: "1".to_string(),
                x: 0,
                y: 0,
                interval: default_interval(),
            }],
            rapid_fire_enabled: false,
            rapid_fire: vec![],
        }
    }
}

impl AppConfig {
    pub fn mode(&self) -> Mode {
        if self.hold_mode {
            Mode::Hold
        } else {
            Mode::Sequence
        }
    }

    /// Load config from file, or create default if not exists
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if !path.as_ref().exists() {
            let default_config = Self::default();
            default_config.save_to_file(&path)?;
            return Ok(default_config);
        }
        Self::load_from_file(path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;

        // Validate configuration
        if config.press_duration < 1 {
            config.press_duration = 1;
        }
        if config.focus_poll < 10 {
            config.focus_poll = 10;
        }
        if config.process_poll < 500 {
            config.process_poll = 500;
        }

        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        // Add comments to make the config file more readable
        let mut result = format!(
            "hotkey = \"{}\"            # Trigger key, same key starts and stops (e.g. \"F6\", \"CTRL+F6\")\n\
             hold_mode = {}           # false = toggle mode, true = run only while the trigger is held\n\
             press_duration = {}       # How long each synthesized press is held (ms)\n\
             toggle_debounce = {}     # Ignore trigger presses closer together than this (ms)\n\
             release_timeout = {}      # Treat a repeated press after this gap as a missed release (ms)\n\
             focus_poll = {}           # Target window focus poll interval (ms)\n\
             process_poll = {}       # Target process liveness poll interval (ms)\n\
             target_window = \"{}\"      # Window title to bind to (empty = any window)\n\
             rapid_fire_enabled = {}  # Enable per-key rapid fire loops\n\n\
             # Action list, replayed in order while a session runs.\n\
             # A step is either key = \"...\" or a coordinate click via x/y.\n",
            self.hotkey,
            self.hold_mode,
            self.press_duration,
            self.toggle_debounce,
            self.release_timeout,
            self.focus_poll,
            self.process_poll,
            self.target_window,
            self.rapid_fire_enabled,
        );

        for action in &self.actions {
            result.push_str("[[actions]]\n");
            if !action.key.is_empty() {
                result.push_str(&format!("key = \"{}\"\n", action.key));
            } else {
                result.push_str(&format!("x = {}\ny = {}\n", action.x, action.y));
            }
            result.push_str(&format!(
                "interval = {}              # Wait after this step (ms)\n\n",
                action.interval
            ));
        }

        if !self.rapid_fire.is_empty() {
            result.push_str("# Per-key rapid fire timings\n");
            for entry in &self.rapid_fire {
                result.push_str("[[rapid_fire]]\n");
                result.push_str(&format!("key = \"{}\"\n", entry.key));
                result.push_str(&format!("press_time = {}\n", entry.press_time));
                result.push_str(&format!("delay = {}\n\n", entry.delay));
            }
        }

        fs::write(path, result)?;
        Ok(())
    }
}

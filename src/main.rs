use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use keyrelay::config::AppConfig;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load_or_create("Config.toml")?;
    run(config)
}

#[cfg(windows)]
fn run(config: AppConfig) -> Result<()> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tracing::{info, warn};
    use windows::Win32::Media::timeBeginPeriod;

    use keyrelay::backend::InputBackend;
    use keyrelay::backend::sendinput::SendInputBackend;
    use keyrelay::engine::{Engine, EngineEvent, Mode};
    use keyrelay::gate::{self, ForegroundProbe, WindowGate, WindowTarget};
    use keyrelay::hook::InputHook;

    // Request 1ms timer resolution for precise replay pacing
    unsafe { timeBeginPeriod(1) };

    let backend = Arc::new(SendInputBackend::new());
    let probe = Arc::new(gate::win::WinProbe);
    let gate = Arc::new(WindowGate::new(probe as Arc<dyn ForegroundProbe>));
    let engine = Arc::new(Engine::new(
        backend as Arc<dyn InputBackend>,
        Arc::clone(&gate),
    ));

    engine.register_hotkey(&config.hotkey)?;
    engine.set_press_duration(config.press_duration);
    engine.set_toggle_debounce(config.toggle_debounce);
    engine.set_release_timeout(config.release_timeout);
    if config.hold_mode {
        engine.set_mode(Mode::Hold)?;
    }

    let mut actions = Vec::with_capacity(config.actions.len());
    for entry in &config.actions {
        actions.push(entry.to_action()?);
    }
    engine.set_action_list(actions)?;

    for entry in &config.rapid_fire {
        let (code, rf_config) = entry.to_config()?;
        engine.rapid_fire().set_config(code, rf_config);
    }
    engine.rapid_fire().set_enabled(config.rapid_fire_enabled);

    if !config.target_window.is_empty() {
        match find_window(&config.target_window) {
            Some(handle) => {
                info!(title = %config.target_window, "bound to target window");
                engine.set_target_window(Some(WindowTarget {
                    handle,
                    title: config.target_window.clone(),
                    process_name: String::new(),
                }));
            }
            None => {
                warn!(title = %config.target_window, "target window not found, running untargeted");
            }
        }
    }

    let events = engine.subscribe();
    std::thread::Builder::new()
        .name("event-log".to_string())
        .spawn(move || {
            for event in events.iter() {
                match event {
                    EngineEvent::Status {
                        text,
                        is_error: true,
                    } => warn!("{text}"),
                    EngineEvent::Status { text, .. } => info!("{text}"),
                    other => info!(?other, "engine event"),
                }
            }
        })?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let poll_engine = Arc::clone(&engine);
    let _poller = gate::spawn_poller(
        Arc::clone(&gate),
        Duration::from_millis(config.focus_poll),
        Duration::from_millis(config.process_poll),
        Arc::clone(&shutdown),
        move |status| poll_engine.on_gate_change(status),
    )?;

    info!(hotkey = %config.hotkey, "keyrelay ready");
    let hook = InputHook::install(Arc::clone(&engine))?;
    let result = hook.run_message_loop();
    shutdown.store(true, Ordering::Release);
    result
}

#[cfg(windows)]
fn find_window(title: &str) -> Option<keyrelay::gate::WindowHandle> {
    use windows::Win32::UI::WindowsAndMessaging::FindWindowA;
    use windows::core::PCSTR;

    let mut name = title.as_bytes().to_vec();
    name.push(0);
    unsafe {
        FindWindowA(PCSTR::null(), PCSTR(name.as_ptr()))
            .ok()
            .map(|hwnd| keyrelay::gate::WindowHandle(hwnd.0 as isize))
    }
}

#[cfg(not(windows))]
fn run(_config: AppConfig) -> Result<()> {
    anyhow::bail!("input capture and injection are only supported on Windows")
}

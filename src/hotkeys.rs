//! Global hotkeys: F9 pause/resume, Esc stop, Ctrl+= / Ctrl+- speed.
//!
//! The listener polls the keyboard state and reacts on key-down edges, so a
//! held key fires once.

use crate::control::Control;
use crate::keyboard::{
    KEY_EQUAL, KEY_ESC, KEY_F9, KEY_KPMINUS, KEY_KPPLUS, KEY_LEFTCTRL, KEY_MINUS, KEY_RIGHTCTRL,
};

pub const SPEED_STEP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hotkey {
    TogglePause,
    Stop,
    SpeedUp,
    SlowDown,
}

/// Edge detector over polled key state, in evdev keycodes.
#[derive(Debug, Default, Clone)]
pub struct HotkeyDecoder {
    f9: bool,
    esc: bool,
    faster: bool,
    slower: bool,
}

impl HotkeyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, is_down: impl Fn(u32) -> bool) -> Vec<Hotkey> {
        let ctrl = is_down(KEY_LEFTCTRL) || is_down(KEY_RIGHTCTRL);
        let f9 = is_down(KEY_F9);
        let esc = is_down(KEY_ESC);
        let faster = ctrl && (is_down(KEY_EQUAL) || is_down(KEY_KPPLUS));
        let slower = ctrl && (is_down(KEY_MINUS) || is_down(KEY_KPMINUS));

        let mut fired = Vec::new();
        for (now, was, hotkey) in [
            (f9, &mut self.f9, Hotkey::TogglePause),
            (esc, &mut self.esc, Hotkey::Stop),
            (faster, &mut self.faster, Hotkey::SpeedUp),
            (slower, &mut self.slower, Hotkey::SlowDown),
        ] {
            if now && !*was {
                fired.push(hotkey);
            }
            *was = now;
        }
        fired
    }
}

pub fn apply_hotkey(control: &Control, hotkey: Hotkey) {
    match hotkey {
        Hotkey::TogglePause => {
            if control.toggle_pause() {
                eprintln!("Paused (F9 to resume)");
            } else {
                eprintln!("Resumed");
            }
        }
        Hotkey::Stop => {
            eprintln!("Stopping...");
            control.request_stop();
        }
        Hotkey::SpeedUp => {
            let speed = control.increase_speed(SPEED_STEP);
            eprintln!("Speed: {speed:.1}x");
        }
        Hotkey::SlowDown => {
            let speed = control.decrease_speed(SPEED_STEP);
            eprintln!("Speed: {speed:.1}x");
        }
    }
}

#[cfg(feature = "x11")]
pub use listener::HotkeyListener;

#[cfg(feature = "x11")]
mod listener {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread::JoinHandle;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use x11rb::connection::Connection;
    use x11rb::protocol::xproto::ConnectionExt as _;

    use super::{apply_hotkey, HotkeyDecoder};
    use crate::control::Control;

    const POLL_INTERVAL: Duration = Duration::from_millis(30);

    /// Background thread polling the X server keymap. Stops when dropped.
    pub struct HotkeyListener {
        shutdown: Arc<AtomicBool>,
        handle: Option<JoinHandle<()>>,
    }

    fn is_down(keys: &[u8], evdev_keycode: u32) -> bool {
        let code = (evdev_keycode + 8) as usize;
        keys.get(code / 8)
            .is_some_and(|byte| byte & (1 << (code % 8)) != 0)
    }

    impl HotkeyListener {
        pub fn spawn(control: Control) -> Result<Self> {
            let (conn, _screen) =
                x11rb::connect(None).context("failed to connect to X11 for hotkeys")?;
            let shutdown = Arc::new(AtomicBool::new(false));

            let handle = {
                let shutdown = shutdown.clone();
                std::thread::Builder::new()
                    .name("hotkeys".to_string())
                    .spawn(move || {
                        let mut decoder = HotkeyDecoder::new();
                        while !shutdown.load(Ordering::SeqCst) {
                            let reply = conn
                                .query_keymap()
                                .ok()
                                .and_then(|cookie| cookie.reply().ok());
                            let Some(reply) = reply else {
                                log::warn!("hotkey listener lost its X11 connection");
                                break;
                            };
                            for hotkey in decoder.decode(|k| is_down(&reply.keys, k)) {
                                log::debug!("hotkey {hotkey:?}");
                                apply_hotkey(&control, hotkey);
                            }
                            std::thread::sleep(POLL_INTERVAL);
                        }
                    })
                    .context("failed to spawn hotkey thread")?
            };

            Ok(Self {
                shutdown,
                handle: Some(handle),
            })
        }
    }

    impl Drop for HotkeyListener {
        fn drop(&mut self) {
            self.shutdown.store(true, Ordering::SeqCst);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

}

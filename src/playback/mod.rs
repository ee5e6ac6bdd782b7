pub mod backends;
mod util;

use anyhow::{anyhow, Result};

use crate::control::Control;

pub use util::countdown;

/// Something that turns typed characters and backspaces into visible edits in
/// the focused application.
pub trait Actuator {
    fn type_char(&mut self, c: char) -> Result<()>;

    /// Press backspace up to `count` times as discrete key presses. Returns
    /// how many were pressed, which is fewer than `count` only when a stop cut
    /// the burst short.
    fn backspace(&mut self, count: usize) -> Result<usize>;

    /// Best-effort release of any held modifiers after an abort.
    fn release_all(&mut self) {}
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn type_char(&mut self, c: char) -> Result<()> {
        (**self).type_char(c)
    }

    fn backspace(&mut self, count: usize) -> Result<usize> {
        (**self).backspace(count)
    }

    fn release_all(&mut self) {
        (**self).release_all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PlaybackBackend {
    /// Choose a backend based on the runtime environment.
    Auto,
    /// Force Wayland (zwp_virtual_keyboard_v1).
    Wayland,
    /// Force X11 (XTEST).
    X11,
}

impl PlaybackBackend {
    fn compiled_in(self) -> bool {
        match self {
            PlaybackBackend::Auto => false,
            PlaybackBackend::Wayland => cfg!(feature = "wayland"),
            PlaybackBackend::X11 => cfg!(feature = "x11"),
        }
    }

    fn feature(self) -> &'static str {
        match self {
            PlaybackBackend::Auto => "",
            PlaybackBackend::Wayland => "wayland",
            PlaybackBackend::X11 => "x11",
        }
    }
}

const SESSION_VARS: [&str; 3] = ["WAYLAND_DISPLAY", "WAYLAND_SOCKET", "DISPLAY"];

fn env_is_set(name: &str) -> bool {
    std::env::var_os(name).is_some_and(|v| !v.is_empty())
}

/// Pick a backend from the session environment. Wayland wins in Xwayland
/// sessions unless it was compiled out.
fn detect_backend() -> PlaybackBackend {
    let wayland = env_is_set("WAYLAND_DISPLAY") || env_is_set("WAYLAND_SOCKET");
    let x11 = env_is_set("DISPLAY");

    match (wayland, x11) {
        (true, true) if !PlaybackBackend::Wayland.compiled_in()
            && PlaybackBackend::X11.compiled_in() =>
        {
            PlaybackBackend::X11
        }
        (true, _) => PlaybackBackend::Wayland,
        (false, true) => PlaybackBackend::X11,
        (false, false) => PlaybackBackend::Auto,
    }
}

fn describe_session() -> String {
    let mut parts: Vec<String> = SESSION_VARS
        .into_iter()
        .filter(|name| env_is_set(name))
        .map(|name| format!("{name} is set"))
        .collect();
    match std::env::var("XDG_SESSION_TYPE") {
        Ok(kind) if !kind.is_empty() => parts.push(format!("XDG_SESSION_TYPE={kind}")),
        _ => {}
    }

    if parts.is_empty() {
        "No display session detected (expected Wayland or X11 environment variables).".to_string()
    } else {
        format!("Detected environment: {}", parts.join(", "))
    }
}

pub fn resolve_backend(requested: PlaybackBackend) -> Result<PlaybackBackend> {
    let resolved = match requested {
        PlaybackBackend::Auto => detect_backend(),
        other => other,
    };

    if resolved.compiled_in() {
        return Ok(resolved);
    }

    if resolved == PlaybackBackend::Auto {
        let flags: Vec<String> = [PlaybackBackend::Wayland, PlaybackBackend::X11]
            .into_iter()
            .filter(|b| b.compiled_in())
            .map(|b| format!("--backend {}", b.feature()))
            .collect();
        let hint = if flags.is_empty() {
            "This build has no keystroke backends enabled.".to_string()
        } else {
            format!("Try forcing one: {}", flags.join(" or "))
        };
        return Err(anyhow!(
            "No supported keystroke backend detected. {}\n{hint}",
            describe_session()
        ));
    }

    let how = if requested == PlaybackBackend::Auto {
        "detected"
    } else {
        "requested"
    };
    Err(anyhow!(
        "{resolved:?} backend {how} but is disabled in this build (rebuild with `--features {}`). {}",
        resolved.feature(),
        describe_session()
    ))
}

/// Validate the backend and seat arguments before anything is typed.
pub fn preflight_backend(
    requested: PlaybackBackend,
    seat_name: Option<&str>,
) -> Result<PlaybackBackend> {
    if seat_name.is_some_and(|name| name.trim().is_empty()) {
        return Err(anyhow!("--seat must not be empty"));
    }

    let resolved = resolve_backend(requested)?;
    if seat_name.is_some() && resolved == PlaybackBackend::X11 {
        return Err(anyhow!("--seat is Wayland-only and is not supported on X11"));
    }
    Ok(resolved)
}

/// Connect to the display server and return a ready actuator.
///
/// `control` lets long backspace bursts stop early once a stop is requested.
pub fn open_actuator(
    backend: PlaybackBackend,
    seat_name: Option<&str>,
    control: &Control,
) -> Result<Box<dyn Actuator>> {
    #[cfg(all(not(feature = "wayland"), not(feature = "x11")))]
    let _ = control;

    let backend = preflight_backend(backend, seat_name)?;
    log::info!("using {backend:?} keystroke backend");

    match backend {
        PlaybackBackend::Wayland => {
            #[cfg(feature = "wayland")]
            {
                let actuator = backends::wayland::WaylandActuator::connect(seat_name, control.clone())?;
                Ok(Box::new(actuator))
            }

            #[cfg(not(feature = "wayland"))]
            {
                Err(anyhow!(
                    "Wayland backend is disabled in this build (rebuild with `--features wayland`)."
                ))
            }
        }
        PlaybackBackend::X11 => {
            #[cfg(feature = "x11")]
            {
                Ok(Box::new(backends::x11::X11Actuator::connect(control.clone())?))
            }

            #[cfg(not(feature = "x11"))]
            {
                Err(anyhow!(
                    "X11 backend is disabled in this build (rebuild with `--features x11`)."
                ))
            }
        }
        PlaybackBackend::Auto => Err(anyhow!("no backend resolved")),
    }
}

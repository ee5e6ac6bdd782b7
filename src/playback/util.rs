use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::control::Control;

/// Gap between discrete backspace presses.
#[cfg_attr(not(any(feature = "wayland", feature = "x11")), allow(dead_code))]
pub(crate) const BACKSPACE_GAP_MS: u64 = 10;

const HOLD_MEAN_MS: f64 = 35.0;
const HOLD_STD_DEV_MS: f64 = 10.0;
const HOLD_MIN_MS: f64 = 18.0;
const HOLD_MAX_MS: f64 = 70.0;

pub(crate) fn sleep_interruptible(control: &Control, ms: u64) {
    let mut remaining = ms;
    while remaining > 0 {
        if control.is_stopped() {
            return;
        }
        let step = remaining.min(50);
        std::thread::sleep(Duration::from_millis(step));
        remaining -= step;
    }
}

/// Print a countdown to stderr. Returns `false` if a stop was requested
/// before it finished.
pub fn countdown(secs: u64, control: &Control) -> bool {
    if secs == 0 {
        return !control.is_stopped();
    }

    eprintln!("Focus the target window. Starting in {secs}s...");
    for remaining in (1..=secs).rev() {
        if control.is_stopped() {
            return false;
        }
        eprintln!("{remaining}...");
        sleep_interruptible(control, 1000);
    }
    !control.is_stopped()
}

/// How long a key stays down between press and release.
#[cfg_attr(not(any(feature = "wayland", feature = "x11")), allow(dead_code))]
pub(crate) struct KeyHold {
    rng: StdRng,
    dist: Option<Normal<f64>>,
}

#[cfg_attr(not(any(feature = "wayland", feature = "x11")), allow(dead_code))]
impl KeyHold {
    pub(crate) fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            dist: Normal::new(HOLD_MEAN_MS, HOLD_STD_DEV_MS).ok(),
        }
    }

    pub(crate) fn next(&mut self) -> Duration {
        let ms = match &self.dist {
            Some(dist) => dist.sample(&mut self.rng),
            None => HOLD_MEAN_MS,
        };
        Duration::from_secs_f64(ms.clamp(HOLD_MIN_MS, HOLD_MAX_MS) / 1000.0)
    }
}

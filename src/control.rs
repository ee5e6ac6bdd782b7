//! Shared session state mutated by out-of-band listeners (hotkeys, Ctrl+C) and
//! polled by the typing engine.
//!
//! Fields are independent atomics. Readers may observe one field slightly stale
//! relative to another; the engine only ever needs each value on its own.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 5.0;
pub const DEFAULT_SPEED: f64 = 1.0;

#[derive(Debug)]
struct ControlState {
    paused: AtomicBool,
    stop: AtomicBool,
    speed_bits: AtomicU64,
}

/// Cloneable handle to one session's pause/stop/speed state.
#[derive(Debug, Clone)]
pub struct Control {
    state: Arc<ControlState>,
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_speed(value: f64) -> f64 {
    value.clamp(MIN_SPEED, MAX_SPEED)
}

impl Control {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ControlState {
                paused: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                speed_bits: AtomicU64::new(DEFAULT_SPEED.to_bits()),
            }),
        }
    }

    /// Clear pause and stop and restore the default speed.
    pub fn reset(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
        self.state.stop.store(false, Ordering::SeqCst);
        self.state
            .speed_bits
            .store(DEFAULT_SPEED.to_bits(), Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.paused.store(paused, Ordering::SeqCst);
    }

    /// Flip the pause flag and return the new value.
    pub fn toggle_pause(&self) -> bool {
        !self.state.paused.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn speed_multiplier(&self) -> f64 {
        f64::from_bits(self.state.speed_bits.load(Ordering::SeqCst))
    }

    /// Set the speed multiplier, clamped to `[MIN_SPEED, MAX_SPEED]`.
    /// Non-finite values are ignored.
    pub fn set_speed_multiplier(&self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.state
            .speed_bits
            .store(clamp_speed(value).to_bits(), Ordering::SeqCst);
    }

    pub fn increase_speed(&self, delta: f64) -> f64 {
        self.adjust_speed(delta)
    }

    pub fn decrease_speed(&self, delta: f64) -> f64 {
        self.adjust_speed(-delta)
    }

    fn adjust_speed(&self, delta: f64) -> f64 {
        if !delta.is_finite() {
            return self.speed_multiplier();
        }
        let update = |bits: u64| Some(clamp_speed(f64::from_bits(bits) + delta).to_bits());
        match self
            .state
            .speed_bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, update)
        {
            Ok(prev) | Err(prev) => update(prev).map(f64::from_bits).unwrap_or(DEFAULT_SPEED),
        }
    }

    pub fn request_stop(&self) {
        self.state.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stop.load(Ordering::SeqCst)
    }
}

#[cfg(feature = "wayland")]
pub mod wayland;

#[cfg(feature = "x11")]
pub mod x11;

use anyhow::{anyhow, Result};

use crate::control::Control;
use crate::keyboard::{keystroke_for_output_char, KEY_BACKSPACE};
use crate::playback::util::{sleep_interruptible, KeyHold, BACKSPACE_GAP_MS};

// Modifiers released on abort so none is left stuck. If the user is physically
// holding one, the target's view of it may desync until it is tapped again.
#[cfg_attr(not(any(feature = "wayland", feature = "x11")), allow(dead_code))]
pub(crate) const COMMON_MODIFIER_KEYCODES: [u32; 6] = [
    crate::keyboard::KEY_LEFTSHIFT,
    crate::keyboard::KEY_RIGHTSHIFT,
    crate::keyboard::KEY_LEFTCTRL,
    crate::keyboard::KEY_RIGHTCTRL,
    crate::keyboard::KEY_LEFTALT,
    crate::keyboard::KEY_RIGHTALT,
];

/// Raw key events, in evdev keycodes.
#[cfg_attr(not(any(feature = "wayland", feature = "x11")), allow(dead_code))]
pub(crate) trait KeySink {
    fn key(&mut self, keycode: u32, pressed: bool) -> Result<()>;
    fn shift(&mut self, down: bool) -> Result<()>;
}

#[cfg_attr(not(any(feature = "wayland", feature = "x11")), allow(dead_code))]
pub(crate) fn tap_char(sink: &mut impl KeySink, hold: &mut KeyHold, c: char) -> Result<()> {
    let stroke = keystroke_for_output_char(c)
        .ok_or_else(|| anyhow!("unsupported character {c:?} for US keyboard"))?;

    if stroke.shift {
        sink.shift(true)?;
    }
    sink.key(stroke.keycode, true)?;
    std::thread::sleep(hold.next());
    let released = sink.key(stroke.keycode, false);
    if stroke.shift {
        sink.shift(false)?;
    }
    released
}

/// Discrete backspace presses. Stops early, without error, once a stop is
/// requested, and returns the number actually pressed.
#[cfg_attr(not(any(feature = "wayland", feature = "x11")), allow(dead_code))]
pub(crate) fn tap_backspaces(
    sink: &mut impl KeySink,
    hold: &mut KeyHold,
    control: &Control,
    count: usize,
) -> Result<usize> {
    for pressed in 0..count {
        if control.is_stopped() {
            log::debug!("backspace burst interrupted after {pressed}/{count}");
            return Ok(pressed);
        }
        sink.key(KEY_BACKSPACE, true)?;
        std::thread::sleep(hold.next());
        sink.key(KEY_BACKSPACE, false)?;
        if pressed + 1 < count {
            sleep_interruptible(control, BACKSPACE_GAP_MS);
        }
    }
    Ok(count)
}

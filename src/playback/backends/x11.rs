use anyhow::{anyhow, Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, GetInputFocusReply};
use x11rb::protocol::xtest::ConnectionExt as _;
use x11rb::protocol::{xproto, xtest};
use x11rb::rust_connection::RustConnection;

use super::{tap_backspaces, tap_char, KeySink, COMMON_MODIFIER_KEYCODES};
use crate::control::Control;
use crate::keyboard::{char_to_keystroke, KEY_LEFTSHIFT};
use crate::playback::util::KeyHold;
use crate::playback::Actuator;

/// X11 keycodes are evdev + 8 on Xorg with the evdev/libinput drivers.
pub(crate) fn evdev_to_x11_keycode(evdev_keycode: u32) -> Result<u8> {
    let x11 = evdev_keycode
        .checked_add(8)
        .ok_or_else(|| anyhow!("evdev keycode overflow"))?;
    u8::try_from(x11).map_err(|_| anyhow!("evdev keycode {evdev_keycode} out of range for X11"))
}

fn query_xtest(conn: &impl Connection) -> Result<()> {
    let ext = conn
        .extension_information(xtest::X11_EXTENSION_NAME)
        .context("failed to query X11 extension info")?;

    if ext.is_none() {
        return Err(anyhow!(
            "X11 backend requires the XTEST extension (not present on this X server)"
        ));
    }

    let _ = conn
        .xtest_get_version(2, 2)
        .ok()
        .and_then(|cookie| cookie.reply().ok());

    Ok(())
}

fn get_focus(conn: &impl Connection) -> Result<GetInputFocusReply> {
    conn.get_input_focus()
        .context("failed to request input focus")?
        .reply()
        .context("failed to read input focus reply")
}

/// Require explicit input focus, so keystrokes land in a window the user
/// picked.
fn check_focus(conn: &impl Connection) -> Result<()> {
    // PointerRoot: focus follows the pointer.
    const POINTER_ROOT: xproto::Window = 1;

    let focus = get_focus(conn)?;
    if focus.focus == x11rb::NONE {
        return Err(anyhow!(
            "no X11 input focus detected; click into the target window before starting"
        ));
    }
    if focus.focus == POINTER_ROOT {
        return Err(anyhow!(
            "X11 input focus is set to PointerRoot; click into the target window to give it explicit focus"
        ));
    }
    Ok(())
}

fn keysyms_for_keycode(
    conn: &impl Connection,
    keycode: u8,
) -> Result<(xproto::Keysym, xproto::Keysym)> {
    let reply = conn
        .get_keyboard_mapping(keycode, 1)
        .context("failed to request keyboard mapping")?
        .reply()
        .context("failed to read keyboard mapping")?;

    if reply.keysyms_per_keycode == 0 {
        return Err(anyhow!("X server returned 0 keysyms per keycode"));
    }

    let at = |index: usize| {
        reply
            .keysyms
            .get(index)
            .copied()
            .unwrap_or(x11rb::NO_SYMBOL)
    };
    Ok((at(0), at(1)))
}

/// Check a few representative keys against US QWERTY. For Latin-1 the keysym
/// is the character code.
fn validate_us_keymap(conn: &impl Connection) -> Result<()> {
    let checks = [('a', 'A'), ('q', 'Q'), ('1', '!'), ('-', '_'), ('\'', '"'), ('[', '{')];

    for (unshifted, shifted) in checks {
        let stroke = char_to_keystroke(unshifted)
            .ok_or_else(|| anyhow!("no keystroke for {unshifted:?}"))?;
        let keycode = evdev_to_x11_keycode(stroke.keycode)?;
        let (got0, got1) = keysyms_for_keycode(conn, keycode)?;

        if got0 == x11rb::NO_SYMBOL || got1 == x11rb::NO_SYMBOL {
            return Err(anyhow!(
                "X11 backend could not validate the X server keymap: keycode {keycode} returned NoSymbol ({got0:#x}/{got1:#x}). This backend assumes X11 keycodes are evdev+8 and requires a US keymap."
            ));
        }
        if got0 != unshifted as u32 || got1 != shifted as u32 {
            return Err(anyhow!(
                "X11 backend requires a US keyboard layout, but the X server keymap does not match (keycode {keycode}: got {got0:#x}/{got1:#x}). Try `setxkbmap us`."
            ));
        }
    }

    Ok(())
}

fn xtest_key(
    conn: &impl Connection,
    root: xproto::Window,
    keycode: u8,
    pressed: bool,
) -> Result<()> {
    let type_ = if pressed {
        xproto::KEY_PRESS_EVENT
    } else {
        xproto::KEY_RELEASE_EVENT
    };
    conn.xtest_fake_input(type_, keycode, x11rb::CURRENT_TIME, root, 0, 0, 0)
        .context("failed to send XTEST fake input")?;
    Ok(())
}

struct XtestKeys {
    conn: RustConnection,
    root: xproto::Window,
}

impl KeySink for XtestKeys {
    fn key(&mut self, keycode: u32, pressed: bool) -> Result<()> {
        let x11_keycode = evdev_to_x11_keycode(keycode)?;
        xtest_key(&self.conn, self.root, x11_keycode, pressed)?;
        self.conn.flush().context("failed to flush X11 connection")?;
        Ok(())
    }

    fn shift(&mut self, down: bool) -> Result<()> {
        self.key(KEY_LEFTSHIFT, down)
    }
}

pub struct X11Actuator {
    keys: XtestKeys,
    hold: KeyHold,
    control: Control,
}

impl X11Actuator {
    pub fn connect(control: Control) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("failed to connect to X11")?;
        query_xtest(&conn)?;
        validate_us_keymap(&conn)?;
        check_focus(&conn)?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| anyhow!("invalid X11 screen index"))?
            .root;

        // X11 has no per-client modifier state; start from released modifiers.
        let mut actuator = Self {
            keys: XtestKeys { conn, root },
            hold: KeyHold::new(),
            control,
        };
        actuator.release_all();
        Ok(actuator)
    }
}

impl Actuator for X11Actuator {
    fn type_char(&mut self, c: char) -> Result<()> {
        tap_char(&mut self.keys, &mut self.hold, c)
    }

    fn backspace(&mut self, count: usize) -> Result<usize> {
        tap_backspaces(&mut self.keys, &mut self.hold, &self.control, count)
    }

    fn release_all(&mut self) {
        for keycode in COMMON_MODIFIER_KEYCODES {
            if let Ok(code) = evdev_to_x11_keycode(keycode) {
                let _ = xtest_key(&self.keys.conn, self.keys.root, code, false);
            }
        }
        let _ = self.keys.conn.flush();
    }
}

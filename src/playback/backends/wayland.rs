use std::collections::HashMap;
use std::io::Write;
use std::os::fd::{AsFd, FromRawFd, IntoRawFd, OwnedFd};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use memfd::MemfdOptions;
use wayland_client::globals::{registry_queue_init, GlobalListContents};
use wayland_client::protocol::{wl_registry, wl_seat};
use wayland_client::{Connection, Dispatch, EventQueue, Proxy, QueueHandle};

use super::{tap_backspaces, tap_char, KeySink, COMMON_MODIFIER_KEYCODES};
use crate::control::Control;
use crate::keyboard::KEY_LEFTSHIFT;
use crate::keymap::us_qwerty_keymap;
use crate::playback::util::KeyHold;
use crate::playback::Actuator;
use self::virtual_keyboard::zwp_virtual_keyboard_manager_v1::ZwpVirtualKeyboardManagerV1;
use self::virtual_keyboard::zwp_virtual_keyboard_v1::ZwpVirtualKeyboardV1;

/// Client bindings for `zwp_virtual_keyboard_unstable_v1`.
mod virtual_keyboard {
    #![allow(dead_code, non_upper_case_globals, unused_imports)]

    use wayland_client;
    use wayland_client::protocol::*;

    pub mod __interfaces {
        use wayland_client::protocol::__interfaces::*;
        wayland_scanner::generate_interfaces!("protocol/virtual-keyboard-unstable-v1.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_client_code!("protocol/virtual-keyboard-unstable-v1.xml");
}

const KEY_STATE_RELEASED: u32 = 0;
const KEY_STATE_PRESSED: u32 = 1;

#[derive(Debug, Clone)]
struct SeatData {
    global_name: u32,
}

#[derive(Debug, Default)]
struct State {
    seat_names_by_global: HashMap<u32, String>,
}

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for State {
    fn event(
        _state: &mut Self,
        _proxy: &wl_registry::WlRegistry,
        _event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<wl_seat::WlSeat, SeatData> for State {
    fn event(
        state: &mut Self,
        _proxy: &wl_seat::WlSeat,
        event: wl_seat::Event,
        data: &SeatData,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_seat::Event::Name { name } = event {
            state.seat_names_by_global.insert(data.global_name, name);
        }
    }
}

impl Dispatch<ZwpVirtualKeyboardManagerV1, ()> for State {
    fn event(
        _state: &mut Self,
        _proxy: &ZwpVirtualKeyboardManagerV1,
        _event: <ZwpVirtualKeyboardManagerV1 as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<ZwpVirtualKeyboardV1, ()> for State {
    fn event(
        _state: &mut Self,
        _proxy: &ZwpVirtualKeyboardV1,
        _event: <ZwpVirtualKeyboardV1 as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

fn make_keymap_fd(keymap: &str) -> Result<(OwnedFd, u32)> {
    let memfd = MemfdOptions::default()
        .allow_sealing(true)
        .create("typesim-xkb-keymap")
        .context("failed to create memfd for keymap")?;

    let mut file = memfd.as_file();
    file.write_all(keymap.as_bytes())?;
    file.write_all(&[0])?;

    let size = (keymap.len() + 1)
        .try_into()
        .map_err(|_| anyhow!("keymap too large"))?;

    let raw_fd = memfd.into_file().into_raw_fd();
    // SAFETY: `raw_fd` was just released by `into_raw_fd` and has no other owner.
    let owned_fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

    Ok((owned_fd, size))
}

fn select_seat(
    globals: &wayland_client::globals::GlobalList,
    event_queue: &mut EventQueue<State>,
    state: &mut State,
    seat_name: Option<&str>,
) -> Result<wl_seat::WlSeat> {
    let qh = event_queue.handle();
    let seat_globals: Vec<_> = globals
        .contents()
        .clone_list()
        .into_iter()
        .filter(|g| g.interface == wl_seat::WlSeat::interface().name)
        .collect();

    let Some(first) = seat_globals.first() else {
        return Err(anyhow!("wl_seat not available (no seats advertised)"));
    };

    let Some(requested) = seat_name else {
        return Ok(globals.registry().bind(
            first.name,
            first.version.min(7),
            &qh,
            SeatData {
                global_name: first.name,
            },
        ));
    };

    let seats: Vec<(u32, wl_seat::WlSeat)> = seat_globals
        .iter()
        .map(|g| {
            let seat = globals.registry().bind(
                g.name,
                g.version.min(7),
                &qh,
                SeatData {
                    global_name: g.name,
                },
            );
            (g.name, seat)
        })
        .collect();

    event_queue
        .roundtrip(state)
        .context("Wayland roundtrip (seat discovery) failed")?;

    let found = seats.iter().find_map(|(global_name, seat)| {
        state
            .seat_names_by_global
            .get(global_name)
            .filter(|n| n.as_str() == requested)
            .map(|_| seat.clone())
    });
    if let Some(seat) = found {
        return Ok(seat);
    }

    let mut names: Vec<_> = state.seat_names_by_global.values().cloned().collect();
    names.sort();
    names.dedup();

    if names.is_empty() {
        return Err(anyhow!(
            "requested seat {requested:?}, but compositor did not advertise any wl_seat.name values (requires wl_seat v2+)"
        ));
    }
    Err(anyhow!(
        "requested seat {requested:?} not found; available seats: {}",
        names.join(", ")
    ))
}

struct VirtualKeys {
    conn: Connection,
    keyboard: ZwpVirtualKeyboardV1,
    shift_mask: u32,
    start: Instant,
    // Kept alive for the lifetime of the virtual keyboard.
    _event_queue: EventQueue<State>,
}

impl VirtualKeys {
    fn time_ms(&self) -> u32 {
        self.start.elapsed().as_millis().try_into().unwrap_or(u32::MAX)
    }

    fn flush(&self, what: &str) -> Result<()> {
        self.conn
            .flush()
            .with_context(|| format!("Wayland flush failed ({what})"))
    }
}

impl KeySink for VirtualKeys {
    fn key(&mut self, keycode: u32, pressed: bool) -> Result<()> {
        let state = if pressed {
            KEY_STATE_PRESSED
        } else {
            KEY_STATE_RELEASED
        };
        self.keyboard.key(self.time_ms(), keycode, state);
        self.flush(&format!("key {keycode} pressed={pressed}"))
    }

    fn shift(&mut self, down: bool) -> Result<()> {
        // The virtual keyboard carries its own modifier state; the key event
        // alone does not change it.
        self.key(KEY_LEFTSHIFT, down)?;
        let mods = if down { self.shift_mask } else { 0 };
        self.keyboard.modifiers(mods, 0, 0, 0);
        self.flush("modifiers")
    }
}

pub struct WaylandActuator {
    keys: VirtualKeys,
    hold: KeyHold,
    control: Control,
}

impl WaylandActuator {
    pub fn connect(seat_name: Option<&str>, control: Control) -> Result<Self> {
        let conn = Connection::connect_to_env().context("failed to connect to Wayland")?;
        let (globals, mut event_queue) =
            registry_queue_init(&conn).context("failed to init Wayland registry")?;
        let qh = event_queue.handle();
        let mut state = State::default();

        let manager: ZwpVirtualKeyboardManagerV1 = globals
            .bind(&qh, 1..=1, ())
            .context("zwp_virtual_keyboard_manager_v1 not available (is sway/wlroots exposing it?)")?;

        let seat = select_seat(&globals, &mut event_queue, &mut state, seat_name)?;
        let keyboard: ZwpVirtualKeyboardV1 = manager.create_virtual_keyboard(&seat, &qh, ());

        event_queue
            .roundtrip(&mut state)
            .context("Wayland roundtrip failed")?;

        let keymap = us_qwerty_keymap()?;
        let (keymap_fd, keymap_size) = make_keymap_fd(&keymap.text)?;
        keyboard.keymap(keymap.format, keymap_fd.as_fd(), keymap_size);
        conn.flush().context("Wayland flush failed")?;

        Ok(Self {
            keys: VirtualKeys {
                conn,
                keyboard,
                shift_mask: keymap.shift_mask,
                start: Instant::now(),
                _event_queue: event_queue,
            },
            hold: KeyHold::new(),
            control,
        })
    }
}

impl Actuator for WaylandActuator {
    fn type_char(&mut self, c: char) -> Result<()> {
        tap_char(&mut self.keys, &mut self.hold, c)
    }

    fn backspace(&mut self, count: usize) -> Result<usize> {
        tap_backspaces(&mut self.keys, &mut self.hold, &self.control, count)
    }

    fn release_all(&mut self) {
        self.keys.keyboard.modifiers(0, 0, 0, 0);
        let time_ms = self.keys.time_ms();
        for keycode in COMMON_MODIFIER_KEYCODES {
            self.keys.keyboard.key(time_ms, keycode, KEY_STATE_RELEASED);
        }
        let _ = self.keys.conn.flush();
    }
}

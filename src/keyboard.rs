#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    pub keycode: u32,
    pub shift: bool,
}

// Linux evdev keycodes (see linux/input-event-codes.h)
pub const KEY_ESC: u32 = 1;
pub const KEY_MINUS: u32 = 12;
pub const KEY_EQUAL: u32 = 13;
pub const KEY_BACKSPACE: u32 = 14;
pub const KEY_TAB: u32 = 15;
pub const KEY_LEFTBRACE: u32 = 26;
pub const KEY_RIGHTBRACE: u32 = 27;
pub const KEY_ENTER: u32 = 28;
pub const KEY_LEFTCTRL: u32 = 29;
pub const KEY_SEMICOLON: u32 = 39;
pub const KEY_APOSTROPHE: u32 = 40;
pub const KEY_GRAVE: u32 = 41;
pub const KEY_LEFTSHIFT: u32 = 42;
pub const KEY_BACKSLASH: u32 = 43;
pub const KEY_COMMA: u32 = 51;
pub const KEY_DOT: u32 = 52;
pub const KEY_SLASH: u32 = 53;
pub const KEY_RIGHTSHIFT: u32 = 54;
pub const KEY_LEFTALT: u32 = 56;
pub const KEY_SPACE: u32 = 57;
pub const KEY_F9: u32 = 67;
pub const KEY_KPMINUS: u32 = 74;
pub const KEY_KPPLUS: u32 = 78;
pub const KEY_RIGHTCTRL: u32 = 97;
pub const KEY_RIGHTALT: u32 = 100;

// Letter rows in keycode order: KEY_Q = 16, KEY_A = 30, KEY_Z = 44.
const TOP_ROW: &str = "qwertyuiop";
const HOME_ROW: &str = "asdfghjkl";
const BOTTOM_ROW: &str = "zxcvbnm";
const TOP_ROW_START: u32 = 16;
const HOME_ROW_START: u32 = 30;
const BOTTOM_ROW_START: u32 = 44;

// KEY_1 = 2 .. KEY_0 = 11, with their shifted symbols.
const DIGITS: &str = "1234567890";
const DIGIT_SYMBOLS: &str = "!@#$%^&*()";
const DIGIT_ROW_START: u32 = 2;

/// Map an output character to the character actually typed.
///
/// Smart quotes are typed as their ASCII counterparts and left to the editor's
/// auto-substitution. Carriage returns are not supported.
pub fn typed_char_for_output_char(c: char) -> Option<char> {
    match c {
        '\n' | '\t' => Some(c),
        '\r' => None,
        '’' | '‘' => Some('\''),
        '”' | '“' => Some('"'),
        c if c.is_ascii_graphic() || c == ' ' => Some(c),
        _ => None,
    }
}

pub fn keystroke_for_output_char(c: char) -> Option<KeyStroke> {
    typed_char_for_output_char(c).and_then(char_to_keystroke)
}

pub fn is_typeable(text: &str) -> bool {
    text.chars().all(|c| keystroke_for_output_char(c).is_some())
}

pub fn find_first_unsupported_char(text: &str) -> Option<(usize, char)> {
    text.char_indices()
        .find(|&(_idx, c)| keystroke_for_output_char(c).is_none())
}

fn row_position(row: &str, c: char) -> Option<u32> {
    row.chars().position(|r| r == c).map(|p| p as u32)
}

fn letter_keycode(lower: char) -> Option<u32> {
    row_position(TOP_ROW, lower)
        .map(|p| TOP_ROW_START + p)
        .or_else(|| row_position(HOME_ROW, lower).map(|p| HOME_ROW_START + p))
        .or_else(|| row_position(BOTTOM_ROW, lower).map(|p| BOTTOM_ROW_START + p))
}

fn punctuation_keystroke(c: char) -> Option<(u32, bool)> {
    let stroke = match c {
        ' ' => (KEY_SPACE, false),
        '\n' => (KEY_ENTER, false),
        '\t' => (KEY_TAB, false),
        '-' => (KEY_MINUS, false),
        '_' => (KEY_MINUS, true),
        '=' => (KEY_EQUAL, false),
        '+' => (KEY_EQUAL, true),
        '[' => (KEY_LEFTBRACE, false),
        '{' => (KEY_LEFTBRACE, true),
        ']' => (KEY_RIGHTBRACE, false),
        '}' => (KEY_RIGHTBRACE, true),
        ';' => (KEY_SEMICOLON, false),
        ':' => (KEY_SEMICOLON, true),
        '\'' => (KEY_APOSTROPHE, false),
        '"' => (KEY_APOSTROPHE, true),
        '`' => (KEY_GRAVE, false),
        '~' => (KEY_GRAVE, true),
        '\\' => (KEY_BACKSLASH, false),
        '|' => (KEY_BACKSLASH, true),
        ',' => (KEY_COMMA, false),
        '<' => (KEY_COMMA, true),
        '.' => (KEY_DOT, false),
        '>' => (KEY_DOT, true),
        '/' => (KEY_SLASH, false),
        '?' => (KEY_SLASH, true),
        _ => return None,
    };
    Some(stroke)
}

/// US-QWERTY keystroke for a typed character.
pub fn char_to_keystroke(c: char) -> Option<KeyStroke> {
    if c.is_ascii_alphabetic() {
        let keycode = letter_keycode(c.to_ascii_lowercase())?;
        return Some(KeyStroke {
            keycode,
            shift: c.is_ascii_uppercase(),
        });
    }

    if let Some(p) = row_position(DIGITS, c) {
        return Some(KeyStroke {
            keycode: DIGIT_ROW_START + p,
            shift: false,
        });
    }
    if let Some(p) = row_position(DIGIT_SYMBOLS, c) {
        return Some(KeyStroke {
            keycode: DIGIT_ROW_START + p,
            shift: true,
        });
    }

    punctuation_keystroke(c).map(|(keycode, shift)| KeyStroke { keycode, shift })
}

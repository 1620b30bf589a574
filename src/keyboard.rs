use crate::error::{ExpandoError, Result};
use enigo::{Direction, Enigo, Keyboard, Settings};
use rdev::{self, Key as RdevKey};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Meta,
    CapsLock,
}

/// A key event as the state machine sees it: either one printable character
/// or a named key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Space,
    Enter,
    Tab,
    Backspace,
    Escape,
    Up,
    Down,
    Modifier(Modifier),
    Other(String),
}

impl Key {
    /// Space, enter and tab finalize a trigger or a list selection.
    pub fn is_commit(&self) -> bool {
        matches!(self, Key::Space | Key::Enter | Key::Tab)
    }

    pub fn is_modifier(&self) -> bool {
        matches!(self, Key::Modifier(_))
    }

    /// Parse a key name such as `a`, `space`, `left ctrl` or `esc`.
    pub fn parse(name: &str) -> Option<Key> {
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c == ' ' {
                return Some(Key::Space);
            }
            return Some(Key::Char(c));
        }

        let lowered = name.trim().to_ascii_lowercase();
        let bare = lowered
            .strip_prefix("left ")
            .or_else(|| lowered.strip_prefix("right "))
            .unwrap_or(&lowered);

        let key = match bare {
            "" => return None,
            "space" => Key::Space,
            "enter" | "return" => Key::Enter,
            "tab" => Key::Tab,
            "backspace" => Key::Backspace,
            "esc" | "escape" => Key::Escape,
            "up" => Key::Up,
            "down" => Key::Down,
            "ctrl" | "control" => Key::Modifier(Modifier::Ctrl),
            "alt" | "option" | "altgr" => Key::Modifier(Modifier::Alt),
            "shift" => Key::Modifier(Modifier::Shift),
            "cmd" | "command" | "meta" | "super" | "windows" | "win" => {
                Key::Modifier(Modifier::Meta)
            }
            "caps lock" | "capslock" => Key::Modifier(Modifier::CapsLock),
            other => Key::Other(other.to_string()),
        };
        Some(key)
    }

    /// Convert an rdev key press into a [`Key`], preferring the text the
    /// press produced.
    pub fn from_rdev(key: &RdevKey, event: &rdev::Event) -> Option<Key> {
        if let Some(named) = Self::named(key) {
            return Some(named);
        }
        // Regular single character keys carry the produced text
        if let Some(name) = &event.name {
            let mut chars = name.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                if !c.is_control() {
                    return Some(Key::Char(c));
                }
            }
        }
        Some(Key::Other(format!("{:?}", key).to_ascii_lowercase()))
    }

    /// The key at a physical position, ignoring held modifiers and layout
    /// text. Letters map to their lowercase character, so `ctrl+e` matches
    /// even though the press produces a control character.
    pub fn physical(key: &RdevKey) -> Option<Key> {
        if let Some(named) = Self::named(key) {
            return Some(named);
        }
        let c = match key {
            RdevKey::KeyA => 'a',
            RdevKey::KeyB => 'b',
            RdevKey::KeyC => 'c',
            RdevKey::KeyD => 'd',
            RdevKey::KeyE => 'e',
            RdevKey::KeyF => 'f',
            RdevKey::KeyG => 'g',
            RdevKey::KeyH => 'h',
            RdevKey::KeyI => 'i',
            RdevKey::KeyJ => 'j',
            RdevKey::KeyK => 'k',
            RdevKey::KeyL => 'l',
            RdevKey::KeyM => 'm',
            RdevKey::KeyN => 'n',
            RdevKey::KeyO => 'o',
            RdevKey::KeyP => 'p',
            RdevKey::KeyQ => 'q',
            RdevKey::KeyR => 'r',
            RdevKey::KeyS => 's',
            RdevKey::KeyT => 't',
            RdevKey::KeyU => 'u',
            RdevKey::KeyV => 'v',
            RdevKey::KeyW => 'w',
            RdevKey::KeyX => 'x',
            RdevKey::KeyY => 'y',
            RdevKey::KeyZ => 'z',
            RdevKey::Num0 => '0',
            RdevKey::Num1 => '1',
            RdevKey::Num2 => '2',
            RdevKey::Num3 => '3',
            RdevKey::Num4 => '4',
            RdevKey::Num5 => '5',
            RdevKey::Num6 => '6',
            RdevKey::Num7 => '7',
            RdevKey::Num8 => '8',
            RdevKey::Num9 => '9',
            RdevKey::Minus => '-',
            RdevKey::Equal => '=',
            RdevKey::LeftBracket => '[',
            RdevKey::RightBracket => ']',
            RdevKey::SemiColon => ';',
            RdevKey::Quote => '\'',
            RdevKey::BackQuote => '`',
            RdevKey::BackSlash => '\\',
            RdevKey::Comma => ',',
            RdevKey::Dot => '.',
            RdevKey::Slash => '/',
            _ => return None,
        };
        Some(Key::Char(c))
    }

    fn named(key: &RdevKey) -> Option<Key> {
        let named = match key {
            RdevKey::Space => Key::Space,
            RdevKey::Return | RdevKey::KpReturn => Key::Enter,
            RdevKey::Tab => Key::Tab,
            RdevKey::Backspace => Key::Backspace,
            RdevKey::Escape => Key::Escape,
            RdevKey::UpArrow => Key::Up,
            RdevKey::DownArrow => Key::Down,
            RdevKey::ControlLeft | RdevKey::ControlRight => Key::Modifier(Modifier::Ctrl),
            RdevKey::Alt | RdevKey::AltGr => Key::Modifier(Modifier::Alt),
            RdevKey::ShiftLeft | RdevKey::ShiftRight => Key::Modifier(Modifier::Shift),
            RdevKey::MetaLeft | RdevKey::MetaRight => Key::Modifier(Modifier::Meta),
            RdevKey::CapsLock => Key::Modifier(Modifier::CapsLock),
            _ => return None,
        };
        Some(named)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c),
            Key::Space => write!(f, "space"),
            Key::Enter => write!(f, "enter"),
            Key::Tab => write!(f, "tab"),
            Key::Backspace => write!(f, "backspace"),
            Key::Escape => write!(f, "esc"),
            Key::Up => write!(f, "up"),
            Key::Down => write!(f, "down"),
            Key::Modifier(Modifier::Ctrl) => write!(f, "ctrl"),
            Key::Modifier(Modifier::Alt) => write!(f, "alt"),
            Key::Modifier(Modifier::Shift) => write!(f, "shift"),
            Key::Modifier(Modifier::Meta) => write!(f, "meta"),
            Key::Modifier(Modifier::CapsLock) => write!(f, "caps lock"),
            Key::Other(name) => write!(f, "{}", name),
        }
    }
}

/// A global hotkey such as `ctrl+space`: held modifiers plus one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chord {
    pub modifiers: Vec<Modifier>,
    pub key: Key,
}

impl Chord {
    /// Whether `key` is one of the physical keys of this chord.
    pub fn involves(&self, key: &Key) -> bool {
        match key {
            Key::Modifier(m) => self.modifiers.contains(m),
            other => *other == self.key,
        }
    }
}

impl FromStr for Chord {
    type Err = ExpandoError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ExpandoError::InvalidHotkey(s.to_string());
        let parts: Vec<&str> = s.split('+').map(str::trim).collect();
        let (last, rest) = parts.split_last().ok_or_else(invalid)?;

        let mut modifiers = Vec::new();
        for part in rest {
            match Key::parse(part) {
                Some(Key::Modifier(m)) if m != Modifier::CapsLock && !modifiers.contains(&m) => {
                    modifiers.push(m)
                }
                _ => return Err(invalid()),
            }
        }

        // Matched against physical keys, which report letters in lowercase
        let key = match Key::parse(last) {
            Some(Key::Modifier(_)) | None => return Err(invalid()),
            Some(Key::Char(c)) => Key::Char(c.to_ascii_lowercase()),
            Some(key) => key,
        };
        if modifiers.is_empty() {
            return Err(invalid());
        }
        Ok(Chord { modifiers, key })
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.modifiers {
            write!(f, "{}+", Key::Modifier(*m))?;
        }
        write!(f, "{}", self.key)
    }
}

/// Tracks held modifiers across press/release events and reports when the
/// chord completes.
#[derive(Debug, Clone)]
pub struct HotkeyDetector {
    chord: Chord,
    held: HashSet<Modifier>,
}

impl HotkeyDetector {
    pub fn new(chord: Chord) -> Self {
        Self {
            chord,
            held: HashSet::new(),
        }
    }

    pub fn chord(&self) -> &Chord {
        &self.chord
    }

    /// Record a press. Returns true when it completes the chord.
    pub fn press(&mut self, key: &Key) -> bool {
        if let Key::Modifier(m) = key {
            self.held.insert(*m);
            return false;
        }
        *key == self.chord.key && self.chord.modifiers.iter().all(|m| self.held.contains(m))
    }

    pub fn release(&mut self, key: &Key) {
        if let Key::Modifier(m) = key {
            self.held.remove(m);
        }
    }
}

/// Synthetic keystrokes sent to whatever window has focus.
pub trait SyntheticInput {
    fn backspace(&mut self, count: usize) -> Result<()>;

    /// Send the platform paste chord.
    fn paste(&mut self) -> Result<()>;
}

/// [`SyntheticInput`] backed by enigo. A controller is created per
/// operation.
#[derive(Debug, Clone)]
pub struct EnigoInput {
    backspace_delay: Duration,
}

impl EnigoInput {
    pub fn new(backspace_delay: Duration) -> Self {
        Self { backspace_delay }
    }
}

impl SyntheticInput for EnigoInput {
    fn backspace(&mut self, count: usize) -> Result<()> {
        let mut keyboard = create_keyboard_controller()?;
        send_backspace(&mut keyboard, count, self.backspace_delay)
    }

    fn paste(&mut self) -> Result<()> {
        let mut keyboard = create_keyboard_controller()?;
        send_paste(&mut keyboard)
    }
}

/// Create a keyboard controller
pub fn create_keyboard_controller() -> Result<Enigo> {
    Enigo::new(&Settings::default()).map_err(|err| {
        ExpandoError::Enigo(format!("Failed to create keyboard controller: {}", err))
    })
}

/// Send backspace key presses
pub fn send_backspace(keyboard: &mut impl Keyboard, count: usize, delay: Duration) -> Result<()> {
    for _ in 0..count {
        thread::sleep(delay);
        keyboard
            .key(enigo::Key::Backspace, Direction::Click)
            .map_err(|err| ExpandoError::Enigo(format!("Failed to send backspace: {}", err)))?;
    }
    Ok(())
}

#[cfg(target_os = "macos")]
const PASTE_MODIFIER: enigo::Key = enigo::Key::Meta;
#[cfg(not(target_os = "macos"))]
const PASTE_MODIFIER: enigo::Key = enigo::Key::Control;

/// Send ctrl+v (cmd+v on macOS). The modifier is released even when the
/// `v` click fails.
pub fn send_paste(keyboard: &mut impl Keyboard) -> Result<()> {
    keyboard
        .key(PASTE_MODIFIER, Direction::Press)
        .map_err(|err| ExpandoError::Enigo(format!("Failed to press paste modifier: {}", err)))?;
    let clicked = keyboard.key(enigo::Key::Unicode('v'), Direction::Click);
    let released = keyboard.key(PASTE_MODIFIER, Direction::Release);

    clicked.map_err(|err| ExpandoError::Enigo(format!("Failed to send paste: {}", err)))?;
    released
        .map_err(|err| ExpandoError::Enigo(format!("Failed to release paste modifier: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names() {
        assert_eq!(Key::parse("a"), Some(Key::Char('a')));
        assert_eq!(Key::parse("/"), Some(Key::Char('/')));
        assert_eq!(Key::parse(" "), Some(Key::Space));
        assert_eq!(Key::parse("space"), Some(Key::Space));
        assert_eq!(Key::parse("esc"), Some(Key::Escape));
        assert_eq!(Key::parse("left ctrl"), Some(Key::Modifier(Modifier::Ctrl)));
        assert_eq!(Key::parse("right shift"), Some(Key::Modifier(Modifier::Shift)));
        assert_eq!(Key::parse("f5"), Some(Key::Other("f5".to_string())));
        assert_eq!(Key::parse(""), None);
    }

    #[test]
    fn commit_keys() {
        assert!(Key::Space.is_commit());
        assert!(Key::Enter.is_commit());
        assert!(Key::Tab.is_commit());
        assert!(!Key::Char(' ').is_commit());
        assert!(!Key::Escape.is_commit());
    }

    #[test]
    fn chord_parsing() {
        let chord: Chord = "ctrl+space".parse().unwrap();
        assert_eq!(chord.modifiers, vec![Modifier::Ctrl]);
        assert_eq!(chord.key, Key::Space);
        assert_eq!(chord.to_string(), "ctrl+space");

        let chord: Chord = "Alt + Shift + e".parse().unwrap();
        assert_eq!(chord.modifiers, vec![Modifier::Alt, Modifier::Shift]);
        assert_eq!(chord.key, Key::Char('e'));

        assert!("space".parse::<Chord>().is_err());
        assert!("ctrl+".parse::<Chord>().is_err());
        assert!("ctrl+shift".parse::<Chord>().is_err());
        assert!("a+b".parse::<Chord>().is_err());
    }

    #[test]
    fn chord_letters_are_case_insensitive() {
        let chord: Chord = "ctrl+E".parse().unwrap();
        assert_eq!(chord.key, Key::Char('e'));
        assert_eq!(chord, "Ctrl+e".parse().unwrap());
    }

    #[test]
    fn physical_keys_ignore_produced_text() {
        assert_eq!(Key::physical(&RdevKey::KeyE), Some(Key::Char('e')));
        assert_eq!(Key::physical(&RdevKey::Num7), Some(Key::Char('7')));
        assert_eq!(Key::physical(&RdevKey::Slash), Some(Key::Char('/')));
        assert_eq!(Key::physical(&RdevKey::Space), Some(Key::Space));
        assert_eq!(
            Key::physical(&RdevKey::ControlLeft),
            Some(Key::Modifier(Modifier::Ctrl))
        );
        assert_eq!(Key::physical(&RdevKey::F5), None);

        // With ctrl held the press reports a control character as its text.
        let event = rdev::Event {
            time: std::time::SystemTime::now(),
            name: Some("\u{5}".to_string()),
            event_type: rdev::EventType::KeyPress(RdevKey::KeyE),
        };
        assert_eq!(
            Key::from_rdev(&RdevKey::KeyE, &event),
            Some(Key::Other("keye".to_string()))
        );
    }

    #[test]
    fn letter_chord_fires_from_physical_keys() {
        let mut detector = HotkeyDetector::new("ctrl+shift+E".parse().unwrap());
        for key in [RdevKey::ControlLeft, RdevKey::ShiftRight] {
            assert!(!detector.press(&Key::physical(&key).unwrap()));
        }
        assert!(detector.press(&Key::physical(&RdevKey::KeyE).unwrap()));
    }

    #[test]
    fn chord_membership() {
        let chord: Chord = "ctrl+space".parse().unwrap();
        assert!(chord.involves(&Key::Modifier(Modifier::Ctrl)));
        assert!(chord.involves(&Key::Space));
        assert!(!chord.involves(&Key::Modifier(Modifier::Alt)));
        assert!(!chord.involves(&Key::Char('a')));
    }

    #[test]
    fn detector_fires_only_with_modifiers_held() {
        let mut detector = HotkeyDetector::new("ctrl+space".parse().unwrap());
        let ctrl = Key::Modifier(Modifier::Ctrl);

        assert!(!detector.press(&Key::Space));
        assert!(!detector.press(&ctrl));
        assert!(detector.press(&Key::Space));
        detector.release(&ctrl);
        assert!(!detector.press(&Key::Space));
    }
}

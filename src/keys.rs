//! Key chords swallowed while the prompt is up, e.g. `"Alt+Tab"` or `"Win"`.
//! Keys are stored as Windows virtual-key codes so the hook can match them directly.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub win: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyChord {
    pub modifiers: Modifiers,
    /// Virtual-key code of the non-modifier key. `None` means the chord is a
    /// bare modifier such as `"Win"`.
    pub key: Option<u32>,
}

// Virtual-key codes.
pub const VK_TAB: u32 = 0x09;
pub const VK_RETURN: u32 = 0x0D;
pub const VK_ESCAPE: u32 = 0x1B;
pub const VK_SPACE: u32 = 0x20;
pub const VK_DELETE: u32 = 0x2E;
pub const VK_LWIN: u32 = 0x5B;
pub const VK_RWIN: u32 = 0x5C;
pub const VK_F1: u32 = 0x70;
pub const VK_LSHIFT: u32 = 0xA0;
pub const VK_RSHIFT: u32 = 0xA1;
pub const VK_LCONTROL: u32 = 0xA2;
pub const VK_RCONTROL: u32 = 0xA3;
pub const VK_LMENU: u32 = 0xA4;
pub const VK_RMENU: u32 = 0xA5;

impl KeyChord {
    pub fn parse(config_str: &str) -> Option<Self> {
        let mut modifiers = Modifiers::default();
        let mut key = None;

        for part in config_str.split('+') {
            let trimmed = part.trim().to_lowercase();
            match trimmed.as_str() {
                // Modifiers
                "ctrl" | "control" => modifiers.ctrl = true,
                "shift" => modifiers.shift = true,
                "alt" => modifiers.alt = true,
                "meta" | "win" | "super" => modifiers.win = true,
                "" => return None,
                other => {
                    if key.is_some() {
                        return None;
                    }
                    key = Some(named_key(other)?);
                }
            }
        }

        let chord = Self { modifiers, key };
        if chord.key.is_none() && chord.modifiers == Modifiers::default() {
            return None;
        }
        Some(chord)
    }

    /// Whether a key-down of `vk` with `held` modifiers should be swallowed.
    pub fn matches(&self, vk: u32, held: Modifiers) -> bool {
        match self.key {
            Some(key) => {
                key == vk
                    && (!self.modifiers.ctrl || held.ctrl)
                    && (!self.modifiers.alt || held.alt)
                    && (!self.modifiers.shift || held.shift)
                    && (!self.modifiers.win || held.win)
            }
            // Bare modifier chord: block the modifier key itself.
            None => {
                (self.modifiers.win && (vk == VK_LWIN || vk == VK_RWIN))
                    || (self.modifiers.ctrl && (vk == VK_LCONTROL || vk == VK_RCONTROL))
                    || (self.modifiers.alt && (vk == VK_LMENU || vk == VK_RMENU))
                    || (self.modifiers.shift && (vk == VK_LSHIFT || vk == VK_RSHIFT))
            }
        }
    }
}

fn named_key(name: &str) -> Option<u32> {
    let vk = match name {
        // Functional
        "tab" => VK_TAB,
        "enter" | "return" => VK_RETURN,
        "esc" | "escape" => VK_ESCAPE,
        "space" => VK_SPACE,
        "del" | "delete" => VK_DELETE,

        // F-Keys
        f if f.len() >= 2 && f.starts_with('f') => {
            let n: u32 = f[1..].parse().ok()?;
            if !(1..=24).contains(&n) {
                return None;
            }
            VK_F1 + n - 1
        }

        // Letters and digits share their ASCII codes.
        single if single.len() == 1 => {
            let c = single.chars().next()?;
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase() as u32
            } else {
                return None;
            }
        }

        _ => return None,
    };
    Some(vk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chord_parsing() {
        // Bare modifier
        let chord = KeyChord::parse("Win").unwrap();
        assert!(chord.modifiers.win);
        assert_eq!(chord.key, None);

        // Modifier + Key
        let chord = KeyChord::parse("Alt+Tab").unwrap();
        assert!(chord.modifiers.alt);
        assert_eq!(chord.key, Some(VK_TAB));

        // Multiple Modifiers
        let chord = KeyChord::parse("Ctrl+Shift+Esc").unwrap();
        assert!(chord.modifiers.ctrl && chord.modifiers.shift);
        assert_eq!(chord.key, Some(VK_ESCAPE));

        // F-Keys and letters
        assert_eq!(KeyChord::parse("Alt+F4").unwrap().key, Some(0x73));
        assert_eq!(KeyChord::parse("Win+d").unwrap().key, Some('D' as u32));

        // Whitespace handling
        let chord = KeyChord::parse("  Alt +  Tab ").unwrap();
        assert_eq!(chord.key, Some(VK_TAB));
    }

    #[test]
    fn test_invalid_chords() {
        assert_eq!(KeyChord::parse(""), None);
        assert_eq!(KeyChord::parse("Alt+"), None);
        assert_eq!(KeyChord::parse("Alt+Banana"), None);
        assert_eq!(KeyChord::parse("A+B"), None);
        assert_eq!(KeyChord::parse("F25"), None);
    }

    #[test]
    fn test_chord_matching() {
        let alt_tab = KeyChord::parse("Alt+Tab").unwrap();
        let alt = Modifiers {
            alt: true,
            ..Default::default()
        };
        assert!(alt_tab.matches(VK_TAB, alt));
        assert!(!alt_tab.matches(VK_TAB, Modifiers::default()));
        assert!(!alt_tab.matches(VK_ESCAPE, alt));

        let win = KeyChord::parse("Win").unwrap();
        assert!(win.matches(VK_LWIN, Modifiers::default()));
        assert!(win.matches(VK_RWIN, Modifiers::default()));
        assert!(!win.matches(VK_TAB, Modifiers::default()));
    }
}

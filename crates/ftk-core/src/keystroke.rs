#![forbid(unsafe_code)]

//! Key codes, modifier flags, and key strokes.
//!
//! A [`KeyStroke`] identifies a key action independent of timing: the key,
//! the modifier set, and whether it fires on press or on release. Traversal
//! key sets are stored as strokes so a key event can be tested for membership
//! by converting it with [`KeyStroke::for_key`].

use bitflags::bitflags;

bitflags! {
    /// Modifier keys held during a key or mouse event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0000_0001;
        const CTRL  = 0b0000_0010;
        const ALT   = 0b0000_0100;
        const META  = 0b0000_1000;
    }
}

/// Virtual key identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Tab,
    Enter,
    Escape,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
    /// Key typed events carry no virtual key.
    Undefined,
}

/// A key action, comparable by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyStroke {
    pub code: KeyCode,
    pub modifiers: Modifiers,
    pub on_release: bool,
}

impl KeyStroke {
    /// Stroke fired when the key goes down.
    #[must_use]
    pub const fn pressed(code: KeyCode, modifiers: Modifiers) -> Self {
        Self {
            code,
            modifiers,
            on_release: false,
        }
    }

    /// Stroke fired when the key comes up.
    #[must_use]
    pub const fn released(code: KeyCode, modifiers: Modifiers) -> Self {
        Self {
            code,
            modifiers,
            on_release: true,
        }
    }

    /// The same key and modifiers on the other edge (press <-> release).
    #[must_use]
    pub const fn opposite(&self) -> Self {
        Self {
            code: self.code,
            modifiers: self.modifiers,
            on_release: !self.on_release,
        }
    }

    /// Build the stroke a key event represents.
    ///
    /// Typed events are keyed by character rather than virtual key.
    #[must_use]
    pub fn for_key(data: &crate::event::KeyData, released: bool, typed: bool) -> Self {
        if typed {
            let code = data.key_char.map_or(KeyCode::Undefined, KeyCode::Char);
            return Self::pressed(code, data.modifiers);
        }
        Self {
            code: data.key_code,
            modifiers: data.modifiers,
            on_release: released,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyData;

    #[test]
    fn opposite_flips_edge_only() {
        let s = KeyStroke::pressed(KeyCode::Tab, Modifiers::SHIFT);
        let o = s.opposite();
        assert!(o.on_release);
        assert_eq!(o.code, KeyCode::Tab);
        assert_eq!(o.modifiers, Modifiers::SHIFT);
        assert_eq!(o.opposite(), s);
    }

    #[test]
    fn typed_stroke_uses_char() {
        let data = KeyData::new(KeyCode::Undefined, Some('a'), Modifiers::empty());
        let s = KeyStroke::for_key(&data, false, true);
        assert_eq!(s.code, KeyCode::Char('a'));
        assert!(!s.on_release);
    }
}

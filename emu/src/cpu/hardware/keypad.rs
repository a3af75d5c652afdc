use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

/// A button of the pad. The value is the bit index in KEYINPUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    A = 0,
    B = 1,
    Select = 2,
    Start = 3,
    Right = 4,
    Left = 5,
    Up = 6,
    Down = 7,
    R = 8,
    L = 9,
}

/// Keypad input registers. KEYINPUT is inverted: a bit reads 0 while the
/// button is held.
#[derive(Serialize, Deserialize)]
pub struct Keypad {
    pub key_input: u16,
    pub key_interrupt_control: u16,
}

impl Default for Keypad {
    fn default() -> Self {
        Self {
            // All buttons released.
            key_input: 0xFFFF,
            key_interrupt_control: 0,
        }
    }
}

impl Keypad {
    /// Updates the inverted input word from a host key event.
    pub fn set_key(&mut self, key: Key, pressed: bool) {
        self.key_input.set_bit(key as u8, !pressed);
    }

    #[must_use]
    pub fn is_pressed(&self, key: Key) -> bool {
        self.key_input.is_bit_off(key as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn released_pad_reads_all_ones() {
        assert_eq!(Keypad::default().key_input, 0xFFFF);
    }

    #[test]
    fn pressed_key_clears_its_bit() {
        let mut keypad = Keypad::default();
        keypad.set_key(Key::Start, true);
        keypad.set_key(Key::L, true);

        assert_eq!(keypad.key_input, 0xFFFF & !(1 << 3) & !(1 << 9));
        assert!(keypad.is_pressed(Key::Start));

        keypad.set_key(Key::Start, false);
        assert!(!keypad.is_pressed(Key::Start));
    }
}

//! Logical button identities and their bitmask positions.
//!
//! The bit layout and symbolic key names match what the recorder writes:
//! one button per bit, resolved to X11-style key names at playback time.

/// One logical button on the device under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    X,
    Y,
    L1,
    R1,
    L2,
    R2,
    L3,
    R3,
    Select,
    Start,
    Menu,
    Power,
    Plus,
    Minus,
}

impl Button {
    /// All buttons in bit order. Diffing iterates this to keep event order
    /// deterministic.
    pub const ALL: [Button; 20] = [
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::L1,
        Button::R1,
        Button::L2,
        Button::R2,
        Button::L3,
        Button::R3,
        Button::Select,
        Button::Start,
        Button::Menu,
        Button::Power,
        Button::Plus,
        Button::Minus,
    ];

    /// Bitmask position of this button in a recorded sample.
    pub const fn bit(self) -> u32 {
        match self {
            Button::Up => 0x0001,
            Button::Down => 0x0002,
            Button::Left => 0x0004,
            Button::Right => 0x0008,
            Button::A => 0x0010,
            Button::B => 0x0020,
            Button::X => 0x0040,
            Button::Y => 0x0080,
            Button::L1 => 0x0100,
            Button::R1 => 0x0200,
            Button::L2 => 0x0400,
            Button::R2 => 0x0800,
            Button::L3 => 0x1000,
            Button::R3 => 0x2000,
            Button::Select => 0x4000,
            Button::Start => 0x8000,
            Button::Menu => 0x1_0000,
            Button::Power => 0x2_0000,
            Button::Plus => 0x4_0000,
            Button::Minus => 0x8_0000,
        }
    }

    /// Symbolic key name injected for this button.
    pub const fn key_name(self) -> &'static str {
        match self {
            Button::Up => "Up",
            Button::Down => "Down",
            Button::Left => "Left",
            Button::Right => "Right",
            Button::A => "x",
            Button::B => "z",
            Button::X => "s",
            Button::Y => "a",
            Button::L1 => "q",
            Button::R1 => "w",
            Button::L2 => "e",
            Button::R2 => "r",
            Button::L3 => "t",
            Button::R3 => "y",
            Button::Select => "Shift_R",
            Button::Start => "Return",
            Button::Menu => "Escape",
            Button::Power => "p",
            Button::Plus => "equal",
            Button::Minus => "minus",
        }
    }

    /// Whether this button's bit is set in `mask`.
    pub const fn is_set(self, mask: u32) -> bool {
        mask & self.bit() != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_unique_single_bits() {
        let mut seen = 0u32;
        for button in Button::ALL {
            let bit = button.bit();
            assert_eq!(bit.count_ones(), 1, "{button:?} is not a single bit");
            assert_eq!(seen & bit, 0, "{button:?} reuses a bit");
            seen |= bit;
        }
    }

    #[test]
    fn key_names_are_unique() {
        for (i, a) in Button::ALL.iter().enumerate() {
            for b in &Button::ALL[i + 1..] {
                assert_ne!(a.key_name(), b.key_name());
            }
        }
    }

    #[test]
    fn mask_membership() {
        let mask = Button::Up.bit() | Button::Start.bit();
        assert!(Button::Up.is_set(mask));
        assert!(Button::Start.is_set(mask));
        assert!(!Button::Down.is_set(mask));
        // bits outside the table don't affect known buttons
        assert!(!Button::Menu.is_set(0xF0_0000));
    }
}

use serde::{Deserialize, Serialize};

/// The seven operating modes of the processor.
///
/// The numeric values are the CPSR mode-field encodings. User and System
/// share the same register bank; every other mode banks at least SP and LR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// The normal program execution state.
    User = 0x10,

    /// Designed to support a data transfer or channel process.
    Fiq = 0x11,

    /// Used for general-purpose interrupt handling.
    Irq = 0x12,

    /// Protected mode for the operating system.
    Supervisor = 0x13,

    /// Entered after a data or instruction prefetch abort.
    Abort = 0x17,

    /// Entered when an undefined instruction is executed.
    Undefined = 0x1B,

    /// A privileged user mode for the operating system.
    System = 0x1F,
}

impl Mode {
    /// Index into the six-slot SP/LR banks. User and System share slot 0.
    #[must_use]
    pub const fn bank_index(self) -> usize {
        match self {
            Self::User | Self::System => 0,
            Self::Fiq => 1,
            Self::Irq => 2,
            Self::Supervisor => 3,
            Self::Abort => 4,
            Self::Undefined => 5,
        }
    }

    /// Index into the five-slot SPSR bank; User and System have no SPSR.
    #[must_use]
    pub const fn spsr_index(self) -> Option<usize> {
        match self {
            Self::User | Self::System => None,
            _ => Some(self.bank_index() - 1),
        }
    }
}

impl From<Mode> for u32 {
    fn from(m: Mode) -> Self {
        m as Self
    }
}

impl TryFrom<u32> for Mode {
    type Error = String;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            0x10 => Ok(Self::User),
            0x11 => Ok(Self::Fiq),
            0x12 => Ok(Self::Irq),
            0x13 => Ok(Self::Supervisor),
            0x17 => Ok(Self::Abort),
            0x1B => Ok(Self::Undefined),
            0x1F => Ok(Self::System),
            _ => Err(format!("unexpected value for Mode: {n:#07b}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mode_roundtrip() {
        for mode in [
            Mode::User,
            Mode::Fiq,
            Mode::Irq,
            Mode::Supervisor,
            Mode::Abort,
            Mode::Undefined,
            Mode::System,
        ] {
            assert_eq!(Mode::try_from(mode as u32), Ok(mode));
        }
    }

    #[test]
    fn illegal_values_are_rejected() {
        for value in [0, 0x14, 0x16, 0x1C, 0x20] {
            assert!(Mode::try_from(value).is_err());
        }
    }

    #[test]
    fn user_and_system_share_a_bank() {
        assert_eq!(Mode::User.bank_index(), Mode::System.bank_index());
        assert_eq!(Mode::User.spsr_index(), None);
        assert_eq!(Mode::System.spsr_index(), None);
        assert_eq!(Mode::Undefined.spsr_index(), Some(4));
    }
}

//! Error type shared by the whole emulation core.
//!
//! Guest-visible faults (an undefined opcode, a SWI) are not errors: they
//! vector through the CPU's exception handling like on hardware. The
//! variants here are the conditions that abort emulation instead.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmuError {
    /// The BIOS image must be exactly 16 KiB (a two-byte stream artefact is
    /// tolerated).
    #[error("BIOS image is {0} bytes, expected 16384")]
    BiosSizeMismatch(usize),

    /// The cartridge image does not fit the 32 MiB bus window.
    #[error("cartridge image is {0} bytes, larger than the 32 MiB window")]
    CartridgeTooLarge(usize),

    /// A 8/32-bit cartridge read past the loaded ROM. 16-bit reads return
    /// the open-bus pattern 0xFFFF instead.
    #[error("cartridge read out of bounds at {address:#010X} (bounds {bounds:#X})")]
    OutOfBoundsRead { address: u32, bounds: usize },

    /// The reserved condition field 0b1111 in an ARM opcode.
    #[error("reserved condition field in opcode {0:#010X}")]
    UndefinedInstruction(u32),

    /// SPSR access from a mode that has none (User/System).
    #[error("SPSR is not accessible from the current mode")]
    SpsrUnavailable,

    /// DISPCNT selects a background mode the renderer does not model.
    #[error("unknown background mode {0}")]
    UnknownBgMode(u8),

    /// A DMA channel was enabled with a start timing other than immediate.
    #[error("DMA start timing {0} is not implemented")]
    UnimplementedDmaTiming(u8),
}

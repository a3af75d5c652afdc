//! Raw memory regions owned by the bus.
//!
//! | Region       | Address range           | Size   | Mirror    |
//! |--------------|-------------------------|--------|-----------|
//! | BIOS         | `0x0000_0000-0000_3FFF` | 16 KiB | none      |
//! | WRAM (board) | `0x0200_0000-02FF_FFFF` | 256 KiB| `0x40000` |
//! | WRAM (chip)  | `0x0300_0000-03FF_FFFF` | 32 KiB | `0x8000`  |
//! | Palette RAM  | `0x0500_0000-05FF_FFFF` | 1 KiB  | `0x400`   |
//! | VRAM         | `0x0600_0000-06FF_FFFF` | 96 KiB | `0x18000` |
//! | OAM          | `0x0700_0000-07FF_FFFF` | 1 KiB  | `0x400`   |
//! | Cartridge    | `0x0800_0000-0DFF_FFFF` | ≤32 MiB| bounds-checked |
//!
//! The `0x0E00_0000` window answers a flash-chip probe with fixed ID bytes
//! so games looking for 128 KiB flash move on quietly; writes there are
//! logged and discarded.

use serde::{Deserialize, Serialize};

use crate::cartridge::Cartridge;
use crate::error::EmuError;

pub const BIOS_SIZE: usize = 0x4000;
pub const WRAM_BOARD_SIZE: usize = 0x40000;
pub const WRAM_CHIP_SIZE: usize = 0x8000;
pub const PALETTE_RAM_SIZE: usize = 0x400;
pub const VRAM_SIZE: usize = 0x18000;
pub const OAM_SIZE: usize = 0x400;

/// Flash-chip identification bytes returned by the save window
/// (Sanyo 128 KiB).
pub const FLASH_ID: [u8; 2] = [0x62, 0x13];

#[derive(Serialize, Deserialize)]
pub struct InternalMemory {
    bios: Vec<u8>,
    pub wram_board: Vec<u8>,
    pub wram_chip: Vec<u8>,
    pub palette_ram: Vec<u8>,
    pub vram: Vec<u8>,
    pub oam: Vec<u8>,
    pub cartridge: Cartridge,
}

impl InternalMemory {
    /// # Errors
    ///
    /// Returns [`EmuError::BiosSizeMismatch`] unless the BIOS image is
    /// exactly 16 KiB; a trailing two-byte stream artefact is tolerated
    /// and trimmed.
    pub fn new(mut bios: Vec<u8>, cartridge: Cartridge) -> Result<Self, EmuError> {
        match bios.len() {
            BIOS_SIZE => {}
            len if len == BIOS_SIZE + 2 => bios.truncate(BIOS_SIZE),
            len => return Err(EmuError::BiosSizeMismatch(len)),
        }

        Ok(Self {
            bios,
            wram_board: vec![0; WRAM_BOARD_SIZE],
            wram_chip: vec![0; WRAM_CHIP_SIZE],
            palette_ram: vec![0; PALETTE_RAM_SIZE],
            vram: vec![0; VRAM_SIZE],
            oam: vec![0; OAM_SIZE],
            cartridge,
        })
    }

    #[must_use]
    pub fn bios(&self) -> &[u8] {
        &self.bios
    }
}

impl Default for InternalMemory {
    /// Zeroed regions with an empty cartridge, used by tests.
    fn default() -> Self {
        Self::new(vec![0; BIOS_SIZE], Cartridge::default()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bios_must_be_16_kib() {
        assert_eq!(
            InternalMemory::new(vec![0; 0x2000], Cartridge::default()).err(),
            Some(EmuError::BiosSizeMismatch(0x2000))
        );
    }

    #[test]
    fn bios_stream_artefact_is_trimmed() {
        let memory = InternalMemory::new(vec![0xAB; BIOS_SIZE + 2], Cartridge::default()).unwrap();
        assert_eq!(memory.bios().len(), BIOS_SIZE);
    }
}

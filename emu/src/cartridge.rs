//! Game Pak ROM image and its parsed header.
//!
//! The cartridge occupies `0x0800_0000-0x0DFF_FFFF` on the bus. Reads are
//! bounds-checked against `len - 2`: the tolerance lets the CPU prefetch one
//! word past the last valid instruction without tripping the check.

use serde::{Deserialize, Serialize};

use crate::error::EmuError;

/// Largest image the 32 MiB bus window can map.
pub const MAX_ROM_SIZE: usize = 0x0200_0000;

#[derive(Serialize, Deserialize)]
pub struct Cartridge {
    data: Vec<u8>,
    /// `data.len() - 2`; reads at or past this offset are out of bounds.
    bounds: usize,
    header: CartridgeHeader,
}

impl Cartridge {
    /// Wraps a raw ROM image, parsing its header.
    ///
    /// # Errors
    ///
    /// Returns [`EmuError::CartridgeTooLarge`] if the image exceeds 32 MiB.
    pub fn new(data: Vec<u8>) -> Result<Self, EmuError> {
        if data.len() > MAX_ROM_SIZE {
            return Err(EmuError::CartridgeTooLarge(data.len()));
        }

        let header = CartridgeHeader::new(&data);
        let bounds = data.len().saturating_sub(2);

        Ok(Self {
            data,
            bounds,
            header,
        })
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub const fn bounds(&self) -> usize {
        self.bounds
    }

    #[must_use]
    pub const fn header(&self) -> &CartridgeHeader {
        &self.header
    }
}

impl Default for Cartridge {
    /// An empty 16 KiB image, used by tests.
    fn default() -> Self {
        Self::new(vec![0; 0x4000]).unwrap()
    }
}

/// The fields of the 192-byte cartridge header worth surfacing to a host.
///
/// A short image yields empty strings rather than an error: homebrew test
/// ROMs are frequently smaller than the header.
#[derive(Default, Serialize, Deserialize)]
pub struct CartridgeHeader {
    /// Uppercase ascii, max 12 characters.
    pub game_title: String,
    /// Uppercase ascii, 4 characters.
    pub game_code: String,
    /// Uppercase ascii, 2 characters.
    pub maker_code: String,
    /// Usually 0x00.
    pub software_version: u8,
    /// Whether the header checksum at 0xBD matched.
    pub checksum_ok: bool,
}

impl CartridgeHeader {
    #[must_use]
    pub fn new(data: &[u8]) -> Self {
        if data.len() < 0xC0 {
            tracing::warn!("cartridge image too short for a header ({} bytes)", data.len());
            return Self::default();
        }

        let checksum_expected = data[0xBD];
        let checksum = data[0xA0..0xBD]
            .iter()
            .fold(0_u8, |acc, &item| acc.wrapping_sub(item))
            .wrapping_sub(0x19);

        let checksum_ok = checksum == checksum_expected;
        if !checksum_ok {
            tracing::warn!(
                "cartridge header checksum mismatch: expected {checksum_expected:#04X}, computed {checksum:#04X}"
            );
        }

        Self {
            game_title: Self::extract_ascii(&data[0xA0..=0xAB]),
            game_code: Self::extract_ascii(&data[0xAC..=0xAF]),
            maker_code: Self::extract_ascii(&data[0xB0..=0xB1]),
            software_version: data[0xBC],
            checksum_ok,
        }
    }

    fn extract_ascii(bytes: &[u8]) -> String {
        bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| char::from(b))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rom_with_header(title: &[u8]) -> Vec<u8> {
        let mut data = vec![0_u8; 0x4000];
        data[0xA0..0xA0 + title.len()].copy_from_slice(title);

        let checksum = data[0xA0..0xBD]
            .iter()
            .fold(0_u8, |acc, &item| acc.wrapping_sub(item))
            .wrapping_sub(0x19);
        data[0xBD] = checksum;

        data
    }

    #[test]
    fn parses_game_title() {
        let cartridge = Cartridge::new(rom_with_header(b"DOLPHIN")).unwrap();

        assert_eq!(cartridge.header().game_title, "DOLPHIN");
        assert!(cartridge.header().checksum_ok);
    }

    #[test]
    fn bad_checksum_is_not_fatal() {
        let mut data = rom_with_header(b"DOLPHIN");
        data[0xBD] ^= 0xFF;

        let cartridge = Cartridge::new(data).unwrap();
        assert!(!cartridge.header().checksum_ok);
    }

    #[test]
    fn bounds_leave_prefetch_tolerance() {
        let cartridge = Cartridge::new(vec![0; 0x100]).unwrap();
        assert_eq!(cartridge.bounds(), 0xFE);
    }

    #[test]
    fn oversized_image_is_rejected() {
        let result = Cartridge::new(vec![0; MAX_ROM_SIZE + 1]);
        assert_eq!(result.err(), Some(EmuError::CartridgeTooLarge(MAX_ROM_SIZE + 1)));
    }

    #[test]
    fn short_image_has_empty_header() {
        let cartridge = Cartridge::new(vec![0; 0x10]).unwrap();
        assert_eq!(cartridge.header().game_title, "");
    }
}

//! Memory bus connecting the CPU to memory and every peripheral.
//!
//! The [`Bus`] owns the raw memory regions and all hardware components and
//! routes every access by address:
//!
//! | Address range         | Target                                  |
//! |-----------------------|-----------------------------------------|
//! | `0x0000_0000-3FFF`    | BIOS (read-only)                        |
//! | `0x0200_0000-02FF...` | board WRAM (256 KiB, mirrored)          |
//! | `0x0300_0000-03FF...` | chip WRAM (32 KiB, mirrored)            |
//! | `0x0400_0000-07FF`    | I/O registers, dispatched per address   |
//! | `0x0500_0000-05FF...` | palette RAM (1 KiB, mirrored)           |
//! | `0x0600_0000-06FF...` | VRAM (96 KiB, mirrored)                 |
//! | `0x0700_0000-07FF...` | OAM (1 KiB, mirrored)                   |
//! | `0x0800_0000-0DFF...` | cartridge (read-only, bounds-checked)   |
//! | `0x0E00_0000-0E00FFFF`| flash probe window (fixed ID bytes)     |
//!
//! The top nibble of every address is ignored; 16-bit accesses drop bit 0
//! and 32-bit accesses drop bits 0-1 before decoding. Accesses outside
//! every region read 0 and are logged; stray writes are dropped.
//!
//! A 32-bit write to adjacent 16-bit I/O registers is performed as two
//! 16-bit writes in increasing-address order; the inherently 32-bit DMA3
//! address registers are written whole. 32-bit I/O reads compose the two
//! 16-bit halves little-endian.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::dma::{AddressControl, Dma};
use crate::cpu::hardware::internal_memory::{
    FLASH_ID, InternalMemory, OAM_SIZE, PALETTE_RAM_SIZE, VRAM_SIZE, WRAM_BOARD_SIZE,
    WRAM_CHIP_SIZE,
};
use crate::cpu::hardware::interrupt_control::{Interrupt, InterruptControl};
use crate::cpu::hardware::keypad::Keypad;
use crate::cpu::hardware::lcd::Lcd;
use crate::cpu::hardware::timers::Timers;
use crate::error::EmuError;

/// The effective address space is 28 bits; the top nibble is ignored.
const ADDRESS_MASK: u32 = 0x0FFF_FFFF;

/// The cartridge window repeats every 32 MiB across its three wait-state
/// images.
const CARTRIDGE_MIRROR: usize = 0x0200_0000;

#[derive(Default, Serialize, Deserialize)]
pub struct Bus {
    pub memory: InternalMemory,
    pub lcd: Lcd,
    pub dma: Dma,
    pub timers: Timers,
    pub keypad: Keypad,
    pub interrupt_control: InterruptControl,
    /// SOUNDBIAS; stored so the BIOS round-trips it, otherwise inert.
    sound_bias: u16,
}

impl Bus {
    #[must_use]
    pub fn with_memory(memory: InternalMemory) -> Self {
        Self {
            memory,
            ..Default::default()
        }
    }

    /// True when an enabled interrupt is pending and IME allows it.
    #[must_use]
    pub const fn irq_pending(&self) -> bool {
        self.interrupt_control.pending()
    }

    pub fn request_interrupt(&mut self, interrupt: Interrupt) {
        self.interrupt_control.request(interrupt);
    }

    // --- reads ---------------------------------------------------------

    /// # Errors
    ///
    /// [`EmuError::OutOfBoundsRead`] for cartridge reads past the image.
    pub fn read_byte(&self, address: u32) -> Result<u8, EmuError> {
        let address = address & ADDRESS_MASK;

        match address {
            0x0000_0000..=0x0000_3FFF => Ok(self.memory.bios()[address as usize]),
            0x0200_0000..=0x02FF_FFFF => {
                Ok(self.memory.wram_board[address as usize % WRAM_BOARD_SIZE])
            }
            0x0300_0000..=0x03FF_FFFF => {
                Ok(self.memory.wram_chip[address as usize % WRAM_CHIP_SIZE])
            }
            0x0400_0000..=0x0400_07FF => Ok(self.read_io_byte(address)),
            0x0500_0000..=0x05FF_FFFF => {
                Ok(self.memory.palette_ram[address as usize % PALETTE_RAM_SIZE])
            }
            0x0600_0000..=0x06FF_FFFF => Ok(self.memory.vram[address as usize % VRAM_SIZE]),
            0x0700_0000..=0x07FF_FFFF => Ok(self.memory.oam[address as usize % OAM_SIZE]),
            0x0800_0000..=0x0DFF_FFFF => self.read_cartridge_byte(address),
            0x0E00_0000..=0x0E00_FFFF => Ok(match address & 0xFFFF {
                0 => FLASH_ID[0],
                1 => FLASH_ID[1],
                _ => 0,
            }),
            _ => {
                tracing::warn!("read byte from unmapped address {address:#010X}");
                Ok(0)
            }
        }
    }

    /// # Errors
    ///
    /// Never fails: out-of-bounds cartridge reads return the open-bus
    /// pattern 0xFFFF. The `Result` keeps the six access operations
    /// uniform.
    pub fn read_half_word(&self, address: u32) -> Result<u16, EmuError> {
        let address = address & ADDRESS_MASK & !1;

        match address {
            0x0000_0000..=0x0000_3FFF => Ok(read_le_half(self.memory.bios(), address as usize)),
            0x0200_0000..=0x02FF_FFFF => Ok(read_le_half(
                &self.memory.wram_board,
                address as usize % WRAM_BOARD_SIZE,
            )),
            0x0300_0000..=0x03FF_FFFF => Ok(read_le_half(
                &self.memory.wram_chip,
                address as usize % WRAM_CHIP_SIZE,
            )),
            0x0400_0000..=0x0400_07FF => Ok(self.read_io_half_word(address)),
            0x0500_0000..=0x05FF_FFFF => Ok(read_le_half(
                &self.memory.palette_ram,
                address as usize % PALETTE_RAM_SIZE,
            )),
            0x0600_0000..=0x06FF_FFFF => {
                Ok(read_le_half(&self.memory.vram, address as usize % VRAM_SIZE))
            }
            0x0700_0000..=0x07FF_FFFF => {
                Ok(read_le_half(&self.memory.oam, address as usize % OAM_SIZE))
            }
            0x0800_0000..=0x0DFF_FFFF => {
                let offset = address as usize % CARTRIDGE_MIRROR;
                let bounds = self.memory.cartridge.bounds();

                if offset >= bounds || offset + 2 > self.memory.cartridge.data().len() {
                    tracing::warn!(
                        "cartridge half-word read out of bounds at {address:#010X}, returning open bus"
                    );
                    return Ok(0xFFFF);
                }

                Ok(read_le_half(self.memory.cartridge.data(), offset))
            }
            _ => {
                tracing::warn!("read half-word from unmapped address {address:#010X}");
                Ok(0)
            }
        }
    }

    /// # Errors
    ///
    /// [`EmuError::OutOfBoundsRead`] for cartridge reads past the image.
    pub fn read_word(&self, address: u32) -> Result<u32, EmuError> {
        let address = address & ADDRESS_MASK & !0b11;

        match address {
            0x0000_0000..=0x0000_3FFF => Ok(read_le_word(self.memory.bios(), address as usize)),
            0x0200_0000..=0x02FF_FFFF => Ok(read_le_word(
                &self.memory.wram_board,
                address as usize % WRAM_BOARD_SIZE,
            )),
            0x0300_0000..=0x03FF_FFFF => Ok(read_le_word(
                &self.memory.wram_chip,
                address as usize % WRAM_CHIP_SIZE,
            )),
            0x0400_0000..=0x0400_07FF => {
                let low = u32::from(self.read_io_half_word(address));
                let high = u32::from(self.read_io_half_word(address + 2));
                Ok(low | (high << 16))
            }
            0x0500_0000..=0x05FF_FFFF => Ok(read_le_word(
                &self.memory.palette_ram,
                address as usize % PALETTE_RAM_SIZE,
            )),
            0x0600_0000..=0x06FF_FFFF => {
                Ok(read_le_word(&self.memory.vram, address as usize % VRAM_SIZE))
            }
            0x0700_0000..=0x07FF_FFFF => {
                Ok(read_le_word(&self.memory.oam, address as usize % OAM_SIZE))
            }
            0x0800_0000..=0x0DFF_FFFF => {
                let offset = address as usize % CARTRIDGE_MIRROR;
                let bounds = self.memory.cartridge.bounds();

                if offset >= bounds || offset + 4 > self.memory.cartridge.data().len() {
                    tracing::error!(
                        "cartridge word read out of bounds at {address:#010X} (bounds {bounds:#X})"
                    );
                    return Err(EmuError::OutOfBoundsRead { address, bounds });
                }

                Ok(read_le_word(self.memory.cartridge.data(), offset))
            }
            _ => {
                tracing::warn!("read word from unmapped address {address:#010X}");
                Ok(0)
            }
        }
    }

    fn read_cartridge_byte(&self, address: u32) -> Result<u8, EmuError> {
        let offset = address as usize % CARTRIDGE_MIRROR;
        let bounds = self.memory.cartridge.bounds();

        if offset >= bounds {
            tracing::error!(
                "cartridge byte read out of bounds at {address:#010X} (bounds {bounds:#X})"
            );
            return Err(EmuError::OutOfBoundsRead { address, bounds });
        }

        Ok(self.memory.cartridge.data()[offset])
    }

    fn read_io_byte(&self, address: u32) -> u8 {
        match address {
            0x0400_0006 => self.lcd.vcount.get_byte(0),
            _ => {
                tracing::warn!("unhandled byte read from I/O port {address:#010X}");
                0
            }
        }
    }

    fn read_io_half_word(&self, address: u32) -> u16 {
        match address {
            0x0400_0000 => self.lcd.dispcnt,
            0x0400_0004 => self.lcd.dispstat,
            0x0400_0006 => self.lcd.vcount,
            0x0400_0008 => self.lcd.backgrounds[0].control,
            0x0400_000A => self.lcd.backgrounds[1].control,
            0x0400_000C => self.lcd.backgrounds[2].control,
            0x0400_000E => self.lcd.backgrounds[3].control,
            0x0400_0010..=0x0400_001E => {
                // The scroll registers are write-only.
                tracing::warn!("read from write-only I/O port {address:#010X}");
                0
            }
            0x0400_0088 => self.sound_bias,
            // DMA3CNT_L is write-only, the count reads back as zero.
            0x0400_00DC => 0,
            0x0400_00DE => self.dma.channels[3].control,
            0x0400_0100 => self.timers.counter(0),
            0x0400_0102 => self.timers.channels[0].control,
            0x0400_0104 => self.timers.counter(1),
            0x0400_0106 => self.timers.channels[1].control,
            0x0400_0108 => self.timers.counter(2),
            0x0400_010A => self.timers.channels[2].control,
            0x0400_010C => self.timers.counter(3),
            0x0400_010E => self.timers.channels[3].control,
            // Serial control stub: report the transfer as already done.
            0x0400_0128 => 0x80,
            0x0400_0130 => self.keypad.key_input,
            0x0400_0132 => self.keypad.key_interrupt_control,
            0x0400_0200 => self.interrupt_control.interrupt_enable,
            0x0400_0202 => self.interrupt_control.interrupt_request,
            0x0400_0208 => self.interrupt_control.interrupt_master_enable,
            _ => {
                tracing::warn!("unhandled half-word read from I/O port {address:#010X}");
                0
            }
        }
    }

    // --- writes --------------------------------------------------------

    pub fn write_byte(&mut self, address: u32, value: u8) {
        let address = address & ADDRESS_MASK;

        match address {
            // BIOS and cartridge byte writes are silently dropped.
            0x0000_0000..=0x0000_3FFF | 0x0800_0000..=0x0DFF_FFFF => {}
            0x0200_0000..=0x02FF_FFFF => {
                self.memory.wram_board[address as usize % WRAM_BOARD_SIZE] = value;
            }
            0x0300_0000..=0x03FF_FFFF => {
                self.memory.wram_chip[address as usize % WRAM_CHIP_SIZE] = value;
            }
            0x0400_0000..=0x0400_07FF => self.write_io_byte(address, value),
            0x0500_0000..=0x05FF_FFFF => {
                self.memory.palette_ram[address as usize % PALETTE_RAM_SIZE] = value;
            }
            0x0600_0000..=0x06FF_FFFF => {
                self.memory.vram[address as usize % VRAM_SIZE] = value;
            }
            0x0700_0000..=0x07FF_FFFF => {
                self.memory.oam[address as usize % OAM_SIZE] = value;
            }
            0x0E00_0000..=0x0E00_FFFF => {
                tracing::info!("write to flash, address {address:#010X}, value {value:#04X}");
            }
            _ => {
                tracing::warn!("write byte to unmapped address {address:#010X}");
            }
        }
    }

    pub fn write_half_word(&mut self, address: u32, value: u16) {
        let address = address & ADDRESS_MASK & !1;

        match address {
            0x0000_0000..=0x0000_3FFF => {}
            0x0200_0000..=0x02FF_FFFF => {
                write_le_half(
                    &mut self.memory.wram_board,
                    address as usize % WRAM_BOARD_SIZE,
                    value,
                );
            }
            0x0300_0000..=0x03FF_FFFF => {
                write_le_half(
                    &mut self.memory.wram_chip,
                    address as usize % WRAM_CHIP_SIZE,
                    value,
                );
            }
            0x0400_0000..=0x0400_07FF => self.write_io_half_word(address, value),
            0x0500_0000..=0x05FF_FFFF => {
                write_le_half(
                    &mut self.memory.palette_ram,
                    address as usize % PALETTE_RAM_SIZE,
                    value,
                );
            }
            0x0600_0000..=0x06FF_FFFF => {
                write_le_half(&mut self.memory.vram, address as usize % VRAM_SIZE, value);
            }
            0x0700_0000..=0x07FF_FFFF => {
                write_le_half(&mut self.memory.oam, address as usize % OAM_SIZE, value);
            }
            0x0800_0000..=0x0DFF_FFFF => {
                tracing::warn!(
                    "half-word write to cartridge area dropped, address {address:#010X}, value {value:#06X}"
                );
            }
            0x0E00_0000..=0x0E00_FFFF => {
                tracing::info!("write to flash, address {address:#010X}, value {value:#06X}");
            }
            _ => {
                tracing::warn!("write half-word to unmapped address {address:#010X}");
            }
        }
    }

    pub fn write_word(&mut self, address: u32, value: u32) {
        let address = address & ADDRESS_MASK & !0b11;

        match address {
            0x0000_0000..=0x0000_3FFF => {}
            0x0200_0000..=0x02FF_FFFF => {
                write_le_word(
                    &mut self.memory.wram_board,
                    address as usize % WRAM_BOARD_SIZE,
                    value,
                );
            }
            0x0300_0000..=0x03FF_FFFF => {
                write_le_word(
                    &mut self.memory.wram_chip,
                    address as usize % WRAM_CHIP_SIZE,
                    value,
                );
            }
            0x0400_0000..=0x0400_07FF => self.write_io_word(address, value),
            0x0500_0000..=0x05FF_FFFF => {
                write_le_word(
                    &mut self.memory.palette_ram,
                    address as usize % PALETTE_RAM_SIZE,
                    value,
                );
            }
            0x0600_0000..=0x06FF_FFFF => {
                write_le_word(&mut self.memory.vram, address as usize % VRAM_SIZE, value);
            }
            0x0700_0000..=0x07FF_FFFF => {
                write_le_word(&mut self.memory.oam, address as usize % OAM_SIZE, value);
            }
            0x0800_0000..=0x0DFF_FFFF => {
                tracing::warn!(
                    "word write to cartridge area dropped, address {address:#010X}, value {value:#010X}"
                );
            }
            0x0E00_0000..=0x0E00_FFFF => {
                tracing::info!("write to flash, address {address:#010X}, value {value:#010X}");
            }
            _ => {
                tracing::warn!("write word to unmapped address {address:#010X}");
            }
        }
    }

    fn write_io_byte(&mut self, address: u32, value: u8) {
        match address {
            0x0400_0208 => {
                self.interrupt_control.interrupt_master_enable = u16::from(value);
            }
            _ => {
                tracing::debug!(
                    "unhandled byte write to I/O port {address:#010X}, value {value:#04X}"
                );
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    fn write_io_half_word(&mut self, address: u32, value: u16) {
        match address {
            0x0400_0000 => {
                tracing::info!("write to DISPCNT, value {value:#06X}");
                self.lcd.dispcnt = value;
            }
            0x0400_0004 => {
                // The bottom three bits are hardware status.
                self.lcd.dispstat = (self.lcd.dispstat & 0x0007) | (value & 0xFFF8);
            }
            0x0400_0008 => self.lcd.backgrounds[0].control = value,
            0x0400_000A => self.lcd.backgrounds[1].control = value,
            0x0400_000C => self.lcd.backgrounds[2].control = value,
            0x0400_000E => self.lcd.backgrounds[3].control = value,
            0x0400_0010 => self.lcd.backgrounds[0].horizontal_offset = value,
            0x0400_0012 => self.lcd.backgrounds[0].vertical_offset = value,
            0x0400_0014 => self.lcd.backgrounds[1].horizontal_offset = value,
            0x0400_0016 => self.lcd.backgrounds[1].vertical_offset = value,
            0x0400_0018 => self.lcd.backgrounds[2].horizontal_offset = value,
            0x0400_001A => self.lcd.backgrounds[2].vertical_offset = value,
            0x0400_001C => self.lcd.backgrounds[3].horizontal_offset = value,
            0x0400_001E => self.lcd.backgrounds[3].vertical_offset = value,
            0x0400_0088 => self.sound_bias = value,
            0x0400_00D4 => {
                let mut source = self.dma.channels[3].source_address;
                source.set_byte(0, value.get_byte(0));
                source.set_byte(1, value.get_byte(1));
                self.dma.set_source_address(3, source);
            }
            0x0400_00D6 => {
                let mut source = self.dma.channels[3].source_address;
                source.set_byte(2, value.get_byte(0));
                source.set_byte(3, value.get_byte(1));
                self.dma.set_source_address(3, source);
            }
            0x0400_00D8 => {
                let mut destination = self.dma.channels[3].destination_address;
                destination.set_byte(0, value.get_byte(0));
                destination.set_byte(1, value.get_byte(1));
                self.dma.set_destination_address(3, destination);
            }
            0x0400_00DA => {
                let mut destination = self.dma.channels[3].destination_address;
                destination.set_byte(2, value.get_byte(0));
                destination.set_byte(3, value.get_byte(1));
                self.dma.set_destination_address(3, destination);
            }
            0x0400_00DC => self.dma.set_word_count(3, value),
            0x0400_00DE => self.dma.set_control(3, value),
            0x0400_0100 => self.timers.set_reload(0, value),
            0x0400_0102 => self.timers.set_control(0, value),
            0x0400_0104 => self.timers.set_reload(1, value),
            0x0400_0106 => self.timers.set_control(1, value),
            0x0400_0108 => self.timers.set_reload(2, value),
            0x0400_010A => self.timers.set_control(2, value),
            0x0400_010C => self.timers.set_reload(3, value),
            0x0400_010E => self.timers.set_control(3, value),
            // Read-only in theory, but the BIOS writes it during boot.
            0x0400_0130 => self.keypad.key_input = value,
            0x0400_0132 => self.keypad.key_interrupt_control = value,
            0x0400_0200 => {
                tracing::info!("write to Interrupt Enable, value {value:#06X}");
                self.interrupt_control.interrupt_enable = value;
            }
            0x0400_0202 => {
                tracing::info!("acknowledge of Interrupt Flags, value {value:#06X}");
                self.interrupt_control.acknowledge(value);
            }
            0x0400_0208 => {
                tracing::info!("write to Interrupt Master Enable, value {value:#06X}");
                self.interrupt_control.interrupt_master_enable = value;
            }
            _ => {
                tracing::warn!(
                    "unhandled half-word write to I/O port {address:#010X}, value {value:#06X}"
                );
            }
        }
    }

    fn write_io_word(&mut self, address: u32, value: u32) {
        match address {
            // The DMA3 address registers are true 32-bit registers.
            0x0400_00D4 => self.dma.set_source_address(3, value),
            0x0400_00D8 => self.dma.set_destination_address(3, value),
            // Everything else is a pair of 16-bit registers, written in
            // increasing-address order.
            _ => {
                self.write_io_half_word(address, (value & 0xFFFF) as u16);
                self.write_io_half_word(address + 2, (value >> 16) as u16);
            }
        }
    }

    // --- component stepping -------------------------------------------

    /// Promotes enabled DMA channels per their start timing.
    ///
    /// # Errors
    ///
    /// [`EmuError::UnimplementedDmaTiming`] for non-immediate timings.
    pub fn check_dma_start(&mut self) -> Result<(), EmuError> {
        if self.dma.any_enabled() {
            self.dma.check_start_conditions()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn dma_running(&self) -> bool {
        self.dma.any_running()
    }

    /// Performs one DMA unit transfer on the lowest-index running channel.
    ///
    /// # Errors
    ///
    /// Propagates bus read failures from the source address.
    pub fn step_dma(&mut self) -> Result<(), EmuError> {
        for i in 0..4 {
            if !self.dma.channels[i].running {
                continue;
            }

            let word_transfer = self.dma.channels[i].word_transfer();
            let source = self.dma.channels[i].current_source;
            let destination = self.dma.channels[i].current_destination;
            let unit: u32 = if word_transfer { 4 } else { 2 };

            if word_transfer {
                let value = self.read_word(source)?;
                self.write_word(destination, value);
            } else {
                let value = self.read_half_word(source)?;
                self.write_half_word(destination, value);
            }

            let length = self.dma.configured_length(i);
            let mut completion_irq = false;

            let channel = &mut self.dma.channels[i];
            match channel.destination_control() {
                AddressControl::Increment | AddressControl::IncrementReload => {
                    channel.current_destination = destination.wrapping_add(unit);
                }
                AddressControl::Decrement => {
                    channel.current_destination = destination.wrapping_sub(unit);
                }
                AddressControl::Fixed => {}
            }
            match channel.source_control() {
                AddressControl::Increment => {
                    channel.current_source = source.wrapping_add(unit);
                }
                AddressControl::Decrement => {
                    channel.current_source = source.wrapping_sub(unit);
                }
                AddressControl::Fixed | AddressControl::IncrementReload => {}
            }

            channel.remaining -= 1;

            if channel.remaining == 0 {
                if channel.repeat() {
                    channel.remaining = length;

                    if channel.destination_control() == AddressControl::IncrementReload {
                        channel.current_destination = channel.destination_address;
                    }
                } else {
                    channel.control.set_bit_off(15);
                }

                completion_irq = channel.irq_enabled();
                channel.running = false;
            }

            if completion_irq {
                self.request_interrupt(Interrupt::dma(i));
            }

            // Only one channel moves per tick; lower index wins.
            return Ok(());
        }

        Ok(())
    }

    /// Ticks the timer unit once, forwarding overflow interrupts.
    pub fn step_timers(&mut self) {
        let output = self.timers.step();

        for (i, requested) in output.overflow_irqs.iter().enumerate() {
            if *requested {
                self.request_interrupt(Interrupt::timer(i));
            }
        }
    }

    /// Advances the video controller one dot, forwarding its interrupts.
    /// Returns `true` on the tick that completes a frame.
    ///
    /// # Errors
    ///
    /// [`EmuError::UnknownBgMode`] from the renderer.
    pub fn step_lcd(&mut self) -> Result<bool, EmuError> {
        let output = self.lcd.step(&self.memory)?;

        if output.request_hblank_irq {
            self.request_interrupt(Interrupt::HBlank);
        }
        if output.request_vblank_irq {
            self.request_interrupt(Interrupt::VBlank);
        }
        if output.request_vcount_irq {
            self.request_interrupt(Interrupt::VCount);
        }

        Ok(output.frame_complete)
    }
}

fn read_le_half(region: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([region[offset], region[offset + 1]])
}

fn read_le_word(region: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        region[offset],
        region[offset + 1],
        region[offset + 2],
        region[offset + 3],
    ])
}

fn write_le_half(region: &mut [u8], offset: usize, value: u16) {
    region[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_le_word(region: &mut [u8], offset: usize, value: u32) {
    region[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

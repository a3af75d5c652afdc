//! The assembled system and its scheduler.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                    Gba                      │
//! │  ┌───────────┐                              │
//! │  │ ARM7TDMI  │                              │
//! │  └─────┬─────┘                              │
//! │        │ owns                               │
//! │  ┌─────▼─────┐   ┌─────┐ ┌────────┐         │
//! │  │    Bus    ├──▶│ DMA │ │ Timers │  ...    │
//! │  └─────┬─────┘   └─────┘ └────────┘         │
//! │        │ owns                               │
//! │  ┌─────▼──────────────────────────┐         │
//! │  │ BIOS · WRAM · VRAM · cartridge │         │
//! │  └────────────────────────────────┘         │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! One [`step`](Gba::step) is the core's unit of time, a fixed sequence:
//!
//! 1. check DMA start conditions;
//! 2. if any DMA channel is running it steals the slot: two DMA ticks;
//!    otherwise the CPU executes two instructions;
//! 3. four timer ticks;
//! 4. one video dot.
//!
//! Components never observe each other mid-iteration; interrupts raised by
//! one step become visible to the CPU on the next.

use crate::bus::Bus;
use crate::cartridge::{Cartridge, CartridgeHeader};
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::hardware::internal_memory::InternalMemory;
use crate::cpu::hardware::keypad::Keypad;
use crate::error::EmuError;

/// The complete system: CPU, bus, peripherals and loaded images.
pub struct Gba {
    pub cpu: Arm7tdmi,
}

impl Gba {
    /// Builds a system from a BIOS image and a cartridge image. After this
    /// the CPU is in its post-reset state, ready to execute from the
    /// cartridge entry point.
    ///
    /// # Errors
    ///
    /// [`EmuError::BiosSizeMismatch`] and [`EmuError::CartridgeTooLarge`]
    /// from the image checks.
    pub fn new(bios: Vec<u8>, rom: Vec<u8>) -> Result<Self, EmuError> {
        let cartridge = Cartridge::new(rom)?;

        let header = cartridge.header();
        tracing::info!(
            "cartridge: title '{}', code '{}', maker '{}', version {}",
            header.game_title,
            header.game_code,
            header.maker_code,
            header.software_version,
        );

        let memory = InternalMemory::new(bios, cartridge)?;
        let bus = Bus::with_memory(memory);

        Ok(Self {
            cpu: Arm7tdmi::new(bus),
        })
    }

    /// Runs one scheduler iteration. Returns `true` on the iteration that
    /// completes a frame: the framebuffer is then stable until the next
    /// visible dot.
    ///
    /// # Errors
    ///
    /// The first hard fault from any component aborts the iteration and
    /// propagates.
    pub fn step(&mut self) -> Result<bool, EmuError> {
        self.cpu.bus.check_dma_start()?;

        if self.cpu.bus.dma_running() {
            self.cpu.bus.step_dma()?;
            self.cpu.bus.step_dma()?;
        } else {
            self.cpu.step()?;
            self.cpu.step()?;
        }

        for _ in 0..4 {
            self.cpu.bus.step_timers();
        }

        self.cpu.bus.step_lcd()
    }

    /// The 240x160x2-byte RGB555 framebuffer, row-major.
    #[must_use]
    pub fn framebuffer(&self) -> &[u8] {
        &self.cpu.bus.lcd.framebuffer
    }

    /// Host access to the keypad for feeding key events.
    pub fn keypad_mut(&mut self) -> &mut Keypad {
        &mut self.cpu.bus.keypad
    }

    #[must_use]
    pub fn cartridge_header(&self) -> &CartridgeHeader {
        self.cpu.bus.memory.cartridge.header()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::cpu_modes::Mode;
    use crate::cpu::hardware::lcd::DOTS_PER_LINE;
    use pretty_assertions::assert_eq;

    fn gba_with_program(words: &[u32]) -> Gba {
        // An idle loop at the cartridge entry point unless overridden.
        let mut rom = vec![0_u8; 0x4000];
        for (i, word) in words.iter().enumerate() {
            rom[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        Gba::new(vec![0; 0x4000], rom).unwrap()
    }

    /// B . (branch to self): keeps the CPU busy without side effects.
    const IDLE_LOOP: u32 = 0xEAFF_FFFE;

    #[test]
    fn rejects_a_bad_bios() {
        let result = Gba::new(vec![0; 0x100], vec![0; 0x4000]);
        assert_eq!(result.err(), Some(EmuError::BiosSizeMismatch(0x100)));
    }

    #[test]
    fn cpu_executes_two_instructions_per_iteration() {
        // MOV r0, #1; MOV r1, #2; idle
        let mut gba = gba_with_program(&[0xE3A0_0001, 0xE3A0_1002, IDLE_LOOP]);

        gba.step().unwrap();

        assert_eq!(gba.cpu.register(0), 1);
        assert_eq!(gba.cpu.register(1), 2);
    }

    #[test]
    fn running_dma_steals_the_cpu_slot() {
        let mut gba = gba_with_program(&[0xE3A0_0001, IDLE_LOOP]);
        gba.cpu.bus.write_word(0x0200_0000, 0x1234_5678);

        // DMA3: one 32-bit word, immediate.
        gba.cpu.bus.write_word(0x0400_00D4, 0x0200_0000);
        gba.cpu.bus.write_word(0x0400_00D8, 0x0300_0000);
        gba.cpu.bus.write_word(0x0400_00DC, ((1_u32 << 15 | 1 << 10) << 16) | 1);

        gba.step().unwrap();

        // The transfer happened and the CPU did not run.
        assert_eq!(gba.cpu.bus.read_word(0x0300_0000).unwrap(), 0x1234_5678);
        assert_eq!(gba.cpu.register(0), 0);

        gba.step().unwrap();
        assert_eq!(gba.cpu.register(0), 1);
    }

    #[test]
    fn timers_tick_four_times_per_iteration() {
        let mut gba = gba_with_program(&[IDLE_LOOP]);
        gba.cpu.bus.write_half_word(0x0400_0102, 1 << 7); // start, prescaler 1

        gba.step().unwrap();
        assert_eq!(gba.cpu.bus.read_half_word(0x0400_0100).unwrap(), 4);
    }

    #[test]
    fn a_frame_completes_every_228_lines() {
        let mut gba = gba_with_program(&[IDLE_LOOP]);

        let mut frames = 0;
        for _ in 0..usize::from(DOTS_PER_LINE) * 228 {
            if gba.step().unwrap() {
                frames += 1;
            }
        }

        assert_eq!(frames, 1);
    }

    #[test]
    fn vcount_interrupt_enters_the_irq_handler() {
        let mut gba = gba_with_program(&[IDLE_LOOP]);

        // DISPSTAT: target VCOUNT = 80, coincidence IRQ enabled.
        gba.cpu.bus.write_half_word(0x0400_0004, (80 << 8) | (1 << 5));
        // IME on, IE bit 2 (V-count).
        gba.cpu.bus.write_half_word(0x0400_0208, 1);
        gba.cpu.bus.write_half_word(0x0400_0200, 1 << 2);
        gba.cpu.cpsr.set_irq_disable(false);

        // Run until scanline 80 begins, plus one iteration for the CPU to
        // observe the request.
        let mut entered = false;
        for _ in 0..usize::from(DOTS_PER_LINE) * 81 {
            gba.step().unwrap();

            if gba.cpu.cpsr.mode() == Mode::Irq {
                entered = true;
                break;
            }
        }

        assert!(entered);
        assert_eq!(gba.cpu.pc(), 0x18);
        assert_eq!(gba.cpu.bus.lcd.vcount, 80);
    }
}

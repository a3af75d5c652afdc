//! Banked register file.
//!
//! Sixteen registers are visible at any time:
//! - **r0-r7**: unbanked, shared by every mode
//! - **r8-r12**: two copies each, selected by FIQ vs non-FIQ
//! - **r13 (SP) / r14 (LR)**: six slots each, indexed by mode
//!   (User and System share one)
//! - **r15 (PC)**: the program counter
//!
//! The file stores only the fetched-instruction address for PC; the
//! pipeline's prefetch offset is added by the CPU when software reads r15.
//! The five SPSR slots live here too, next to the banks they belong to.

use serde::{Deserialize, Serialize};

use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::Psr;

/// Stack Pointer register index.
pub const REG_SP: u32 = 0xD;

/// Link Register index (return address for subroutines).
pub const REG_LR: u32 = 0xE;

/// Program Counter register index.
pub const REG_PC: u32 = 0xF;

#[derive(Default, Serialize, Deserialize)]
pub struct RegisterFile {
    unbanked: [u32; 8],
    /// r8-r12: `[register][0]` outside FIQ, `[register][1]` in FIQ.
    banked_fiq: [[u32; 2]; 5],
    sp_banked: [u32; 6],
    lr_banked: [u32; 6],
    pc: u32,
    spsr_banked: [Psr; 5],
}

impl RegisterFile {
    /// Reads r0-r14 as visible from `mode`. r15 is handled by the CPU,
    /// which adds the prefetch offset.
    #[must_use]
    pub fn register_at(&self, index: u32, mode: Mode) -> u32 {
        debug_assert!(index < 15, "r15 must go through the CPU accessors");
        match index {
            0..=7 => self.unbanked[index as usize],
            8..=12 => self.banked_fiq[index as usize - 8][usize::from(mode == Mode::Fiq)],
            13 => self.sp_banked[mode.bank_index()],
            _ => self.lr_banked[mode.bank_index()],
        }
    }

    pub fn set_register_at(&mut self, index: u32, mode: Mode, value: u32) {
        debug_assert!(index < 15, "r15 must go through the CPU accessors");
        match index {
            0..=7 => self.unbanked[index as usize] = value,
            8..=12 => {
                self.banked_fiq[index as usize - 8][usize::from(mode == Mode::Fiq)] = value;
            }
            13 => self.sp_banked[mode.bank_index()] = value,
            _ => self.lr_banked[mode.bank_index()] = value,
        }
    }

    #[must_use]
    pub const fn program_counter(&self) -> u32 {
        self.pc
    }

    pub const fn set_program_counter(&mut self, new_value: u32) {
        self.pc = new_value;
    }

    pub const fn advance_program_counter(&mut self, bytes: u32) {
        self.pc = self.pc.wrapping_add(bytes);
    }

    /// Writes a specific mode's banked LR, used on exception entry.
    pub fn set_banked_lr(&mut self, mode: Mode, value: u32) {
        self.lr_banked[mode.bank_index()] = value;
    }

    /// Writes a specific mode's banked SP, used to preload stacks at reset.
    pub fn set_banked_sp(&mut self, mode: Mode, value: u32) {
        self.sp_banked[mode.bank_index()] = value;
    }

    /// The SPSR visible from `mode`, or `None` in User/System.
    #[must_use]
    pub fn spsr(&self, mode: Mode) -> Option<Psr> {
        mode.spsr_index().map(|idx| self.spsr_banked[idx])
    }

    /// Stores into `mode`'s SPSR slot; `false` if the mode has none.
    pub fn set_spsr(&mut self, mode: Mode, value: Psr) -> bool {
        match mode.spsr_index() {
            Some(idx) => {
                self.spsr_banked[idx] = value;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unbanked_registers_are_shared() {
        let mut file = RegisterFile::default();
        file.set_register_at(3, Mode::System, 0xCAFE);
        assert_eq!(file.register_at(3, Mode::Irq), 0xCAFE);
        assert_eq!(file.register_at(3, Mode::Fiq), 0xCAFE);
    }

    #[test]
    fn fiq_banks_r8_to_r12() {
        let mut file = RegisterFile::default();
        file.set_register_at(10, Mode::System, 1);
        file.set_register_at(10, Mode::Fiq, 2);

        assert_eq!(file.register_at(10, Mode::System), 1);
        assert_eq!(file.register_at(10, Mode::Supervisor), 1);
        assert_eq!(file.register_at(10, Mode::Fiq), 2);
    }

    #[test]
    fn sp_and_lr_bank_per_mode() {
        let mut file = RegisterFile::default();
        file.set_register_at(13, Mode::System, 0x3007F00);
        file.set_register_at(13, Mode::Irq, 0x3007FA0);
        file.set_register_at(14, Mode::Supervisor, 0x8000123);

        assert_eq!(file.register_at(13, Mode::User), 0x3007F00);
        assert_eq!(file.register_at(13, Mode::Irq), 0x3007FA0);
        assert_eq!(file.register_at(14, Mode::Supervisor), 0x8000123);
        assert_eq!(file.register_at(14, Mode::System), 0);
    }

    #[test]
    fn spsr_is_absent_in_user_and_system() {
        let mut file = RegisterFile::default();
        assert!(file.spsr(Mode::User).is_none());
        assert!(!file.set_spsr(Mode::System, Psr::from(Mode::Irq)));

        assert!(file.set_spsr(Mode::Irq, Psr::from(Mode::System)));
        assert_eq!(file.spsr(Mode::Irq).map(u32::from), Some(0x1F));
    }
}

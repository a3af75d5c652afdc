//! Program status registers (CPSR and SPSR).
//!
//! ```text
//! 31 30 29 28         8 7 6 5 4   0
//! ┌──┬──┬──┬──┬────────┬─┬─┬─┬─────┐
//! │N │Z │C │V │Reserved│I│F│T│Mode │
//! └──┴──┴──┴──┴────────┴─┴─┴─┴─────┘
//! ```
//!
//! Each exception mode has an SPSR that receives a copy of CPSR on entry;
//! the slots live in the register file.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::{condition::Condition, cpu_modes::Mode};

/// A program status register wrapping the raw 32-bit word.
#[derive(Default, Clone, Copy, Serialize, Deserialize)]
pub struct Psr(u32);

impl Psr {
    pub(crate) fn can_execute(self, cond: Condition) -> bool {
        use Condition::{AL, CC, CS, EQ, GE, GT, HI, LE, LS, LT, MI, NE, NV, PL, VC, VS};
        match cond {
            EQ => self.zero_flag(),
            NE => !self.zero_flag(),
            CS => self.carry_flag(),
            CC => !self.carry_flag(),
            MI => self.sign_flag(),
            PL => !self.sign_flag(),
            VS => self.overflow_flag(),
            VC => !self.overflow_flag(),
            HI => self.carry_flag() && !self.zero_flag(),
            LS => !self.carry_flag() || self.zero_flag(),
            GE => self.sign_flag() == self.overflow_flag(),
            LT => self.sign_flag() != self.overflow_flag(),
            GT => !self.zero_flag() && (self.sign_flag() == self.overflow_flag()),
            LE => self.zero_flag() || (self.sign_flag() != self.overflow_flag()),
            AL => true,
            NV => false,
        }
    }

    /// N => Bit 31
    #[must_use]
    pub fn sign_flag(self) -> bool {
        self.0.get_bit(31)
    }

    /// Z => Bit 30
    #[must_use]
    pub fn zero_flag(self) -> bool {
        self.0.get_bit(30)
    }

    /// C => Bit 29
    #[must_use]
    pub fn carry_flag(self) -> bool {
        self.0.get_bit(29)
    }

    /// V => Bit 28
    #[must_use]
    pub fn overflow_flag(self) -> bool {
        self.0.get_bit(28)
    }

    /// I => Bit 7, (0=Enable, 1=Disable)
    #[must_use]
    pub fn irq_disable(self) -> bool {
        self.0.get_bit(7)
    }

    /// F => Bit 6, (0=Enable, 1=Disable)
    #[must_use]
    pub fn fiq_disable(self) -> bool {
        self.0.get_bit(6)
    }

    /// T => Bit 5, (0=ARM, 1=Thumb)
    #[must_use]
    pub fn state_bit(self) -> bool {
        self.0.get_bit(5)
    }

    /// M4-M0 => Bits 4-0.
    ///
    /// The BIOS sometimes leaves invalid mode values (like 0) in an SPSR
    /// image; fall back to Supervisor with a log line rather than aborting.
    #[must_use]
    pub fn mode(self) -> Mode {
        let mode_bits = self.0 & 0b11111;
        Mode::try_from(mode_bits).unwrap_or_else(|_| {
            tracing::warn!(
                "invalid mode bits 0b{mode_bits:05b} in PSR {:#010X}, defaulting to Supervisor",
                self.0
            );
            Mode::Supervisor
        })
    }

    pub fn set_sign_flag(&mut self, value: bool) {
        self.0.set_bit(31, value);
    }

    pub fn set_zero_flag(&mut self, value: bool) {
        self.0.set_bit(30, value);
    }

    pub fn set_carry_flag(&mut self, value: bool) {
        self.0.set_bit(29, value);
    }

    pub fn set_overflow_flag(&mut self, value: bool) {
        self.0.set_bit(28, value);
    }

    /// Sets N and Z from a 32-bit result, the common tail of logical ops.
    pub fn set_nz(&mut self, result: u32) {
        self.set_sign_flag(result & 0x8000_0000 != 0);
        self.set_zero_flag(result == 0);
    }

    /// Sets N and Z from a 64-bit result (long multiplies).
    pub fn set_nz_long(&mut self, result: u64) {
        self.set_sign_flag(result & 0x8000_0000_0000_0000 != 0);
        self.set_zero_flag(result == 0);
    }

    /// Sets all four flags after an addition `a + b = result`.
    pub fn set_nzcv_add(&mut self, a: u32, b: u32, result: u32) {
        self.set_nz(result);
        self.set_carry_flag((0xFFFF_FFFF - a) < b);
        self.set_overflow_flag((a ^ b) & 0x8000_0000 == 0 && (a ^ result) & 0x8000_0000 != 0);
    }

    /// Sets all four flags after a subtraction `a - b = result`.
    pub fn set_nzcv_sub(&mut self, a: u32, b: u32, result: u32) {
        self.set_nz(result);
        self.set_carry_flag(a >= b);
        self.set_overflow_flag((a ^ b) & 0x8000_0000 != 0 && (a ^ result) & 0x8000_0000 != 0);
    }

    pub fn set_irq_disable(&mut self, value: bool) {
        self.0.set_bit(7, value);
    }

    pub fn set_fiq_disable(&mut self, value: bool) {
        self.0.set_bit(6, value);
    }

    pub fn set_state_bit(&mut self, value: bool) {
        self.0.set_bit(5, value);
    }

    /// The mode bits M4-M0 contain the current operating mode.
    pub const fn set_mode(&mut self, m: Mode) {
        self.0 &= !0b11111;
        self.0 |= m as u32;
    }

    #[must_use]
    pub fn cpu_state(self) -> CpuState {
        self.state_bit().into()
    }

    pub fn set_cpu_state(&mut self, state: CpuState) {
        self.set_state_bit(state.into());
    }
}

impl From<Mode> for Psr {
    fn from(m: Mode) -> Self {
        let mut s = Self(0);
        s.set_mode(m);
        s
    }
}

impl From<u32> for Psr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Psr> for u32 {
    fn from(p: Psr) -> Self {
        p.0
    }
}

/// The CPU execution state (ARM or Thumb), controlled by the T bit.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CpuState {
    /// Thumb: 16-bit instructions.
    Thumb,
    /// ARM: 32-bit instructions.
    Arm,
}

impl From<CpuState> for bool {
    fn from(state: CpuState) -> Self {
        match state {
            CpuState::Arm => false,
            CpuState::Thumb => true,
        }
    }
}

impl From<bool> for CpuState {
    fn from(state: bool) -> Self {
        if state { Self::Thumb } else { Self::Arm }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_flags() {
        let mut cpsr = Psr::default();
        cpsr.set_sign_flag(true);
        assert!(cpsr.sign_flag());
        cpsr.set_zero_flag(true);
        assert!(cpsr.zero_flag());
        cpsr.set_carry_flag(true);
        assert!(cpsr.carry_flag());
        cpsr.set_overflow_flag(true);
        assert!(cpsr.overflow_flag());
        assert_eq!(u32::from(cpsr) >> 28, 0b1111);
    }

    #[test]
    fn check_control_bits() {
        let mut cpsr = Psr::default();
        cpsr.set_irq_disable(true);
        cpsr.set_fiq_disable(true);
        cpsr.set_state_bit(true);
        assert!(cpsr.irq_disable());
        assert!(cpsr.fiq_disable());
        assert_eq!(cpsr.cpu_state(), CpuState::Thumb);
        assert_eq!(u32::from(cpsr) & 0xE0, 0xE0);
    }

    #[test]
    fn check_mode_field() {
        let mut cpsr = Psr::default();
        cpsr.set_mode(Mode::Irq);
        assert_eq!(u32::from(cpsr) & 0b11111, 0b10010);
        assert_eq!(cpsr.mode(), Mode::Irq);

        cpsr.set_mode(Mode::System);
        assert_eq!(cpsr.mode(), Mode::System);
    }

    #[test]
    fn invalid_mode_falls_back_to_supervisor() {
        let cpsr = Psr::from(0_u32);
        assert_eq!(cpsr.mode(), Mode::Supervisor);
    }

    #[test]
    fn add_flags_match_textbook_definitions() {
        let mut cpsr = Psr::default();

        // 0x7FFFFFFF + 1 overflows into the sign bit.
        cpsr.set_nzcv_add(0x7FFF_FFFF, 1, 0x8000_0000);
        assert!(cpsr.sign_flag());
        assert!(!cpsr.zero_flag());
        assert!(!cpsr.carry_flag());
        assert!(cpsr.overflow_flag());

        // 0xFFFFFFFF + 1 wraps to zero with carry out.
        cpsr.set_nzcv_add(0xFFFF_FFFF, 1, 0);
        assert!(!cpsr.sign_flag());
        assert!(cpsr.zero_flag());
        assert!(cpsr.carry_flag());
        assert!(!cpsr.overflow_flag());
    }

    #[test]
    fn sub_flags_match_textbook_definitions() {
        let mut cpsr = Psr::default();

        // 5 - 3: no borrow.
        cpsr.set_nzcv_sub(5, 3, 2);
        assert!(cpsr.carry_flag());
        assert!(!cpsr.overflow_flag());

        // 3 - 5: borrow.
        cpsr.set_nzcv_sub(3, 5, 3_u32.wrapping_sub(5));
        assert!(!cpsr.carry_flag());
        assert!(cpsr.sign_flag());

        // 0x80000000 - 1: signed overflow.
        cpsr.set_nzcv_sub(0x8000_0000, 1, 0x7FFF_FFFF);
        assert!(cpsr.carry_flag());
        assert!(cpsr.overflow_flag());
    }

    #[test]
    fn condition_checks() {
        let mut cpsr = Psr::default();
        cpsr.set_zero_flag(true);
        assert!(cpsr.can_execute(Condition::EQ));
        assert!(!cpsr.can_execute(Condition::NE));
        assert!(cpsr.can_execute(Condition::AL));
        assert!(!cpsr.can_execute(Condition::NV));

        cpsr.set_zero_flag(false);
        cpsr.set_sign_flag(true);
        cpsr.set_overflow_flag(true);
        assert!(cpsr.can_execute(Condition::GE));
        assert!(cpsr.can_execute(Condition::GT));
        assert!(!cpsr.can_execute(Condition::LT));
    }
}

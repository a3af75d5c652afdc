//! The ARM7TDMI processor core.
//!
//! The processor presents a 3-stage pipeline to software: a read of r15
//! yields the current instruction's address + 8 in ARM state or + 4 in
//! Thumb state. Internally only the fetch address is tracked; the prefetch
//! offset is added whenever r15 is read, and the fetch itself advances PC
//! by one instruction before the handler runs.
//!
//! Each [`step`](Arm7tdmi::step) polls for a pending interrupt, then
//! fetches, classifies and executes one instruction. Classification uses
//! two dispatch tables owned by the core: 4096 entries keyed on ARM
//! instruction bits 27-20/7-4, 256 entries keyed on the top Thumb byte
//! (see [`arm`](super::arm) and [`thumb`](super::thumb)).
//!
//! Exception entry saves the post-fetch PC into the target mode's LR,
//! copies CPSR into the target SPSR, forces the vector's mode and
//! interrupt-disable bits, clears the T bit and jumps to the vector:
//!
//! | Vector    | Mode       | CPSR bits 0-7 | PC   |
//! |-----------|------------|---------------|------|
//! | Undefined | Undefined  | `0b10011011`  | 0x04 |
//! | SWI       | Supervisor | `0b11010011`  | 0x08 |
//! | IRQ       | IRQ        | `0b10010010`  | 0x18 |

use serde::{Deserialize, Serialize};

use crate::bus::Bus;
use crate::cpu::arm::{self, ArmInstructionKind};
use crate::cpu::condition::Condition;
use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::{CpuState, Psr};
use crate::cpu::registers::{REG_PC, RegisterFile};
use crate::cpu::thumb::{self, ThumbInstructionKind};
use crate::error::EmuError;

#[derive(Serialize, Deserialize)]
pub struct Arm7tdmi {
    pub bus: Bus,

    pub cpsr: Psr,
    pub registers: RegisterFile,

    #[serde(skip, default = "arm::build_dispatch_table")]
    arm_dispatch: Box<[ArmInstructionKind; arm::DISPATCH_SIZE]>,
    #[serde(skip, default = "thumb::build_dispatch_table")]
    thumb_dispatch: Box<[ThumbInstructionKind; thumb::DISPATCH_SIZE]>,
}

#[derive(Copy, Clone, Debug)]
enum Exception {
    UndefinedInstruction,
    SoftwareInterrupt,
    Irq,
}

impl Exception {
    const fn vector(self) -> u32 {
        match self {
            Self::UndefinedInstruction => 0x04,
            Self::SoftwareInterrupt => 0x08,
            Self::Irq => 0x18,
        }
    }

    const fn mode(self) -> Mode {
        match self {
            Self::UndefinedInstruction => Mode::Undefined,
            Self::SoftwareInterrupt => Mode::Supervisor,
            Self::Irq => Mode::Irq,
        }
    }

    /// The value forced into CPSR bits 0-7: mode, T cleared, I set, and F
    /// set for the SWI/reset family.
    const fn control_byte(self) -> u32 {
        match self {
            Self::UndefinedInstruction => 0b1001_1011,
            Self::SoftwareInterrupt => 0b1101_0011,
            Self::Irq => 0b1001_0010,
        }
    }
}

impl Default for Arm7tdmi {
    /// The post-reset state: System mode, ARM state, stacks preloaded and
    /// PC at the cartridge entry point.
    fn default() -> Self {
        let mut registers = RegisterFile::default();
        registers.set_program_counter(0x0800_0000);
        registers.set_banked_sp(Mode::System, 0x0300_7F00);
        registers.set_banked_sp(Mode::Irq, 0x0300_7FA0);
        registers.set_banked_sp(Mode::Supervisor, 0x0300_7FE0);

        Self {
            bus: Bus::default(),
            cpsr: Psr::from(Mode::System),
            registers,
            arm_dispatch: arm::build_dispatch_table(),
            thumb_dispatch: thumb::build_dispatch_table(),
        }
    }
}

impl Arm7tdmi {
    #[must_use]
    pub fn new(bus: Bus) -> Self {
        Self {
            bus,
            ..Default::default()
        }
    }

    /// Executes one instruction, or vectors into the IRQ handler when an
    /// enabled interrupt is pending.
    ///
    /// # Errors
    ///
    /// Hard faults only: a reserved condition field, a cartridge fetch out
    /// of bounds, SPSR access from User/System.
    pub fn step(&mut self) -> Result<(), EmuError> {
        if self.bus.irq_pending() && !self.cpsr.irq_disable() {
            self.hardware_interrupt();
            return Ok(());
        }

        match self.cpsr.cpu_state() {
            CpuState::Arm => self.step_arm(),
            CpuState::Thumb => self.step_thumb(),
        }
    }

    fn step_arm(&mut self) -> Result<(), EmuError> {
        let instruction = self.bus.read_word(self.pc())?;
        self.registers.advance_program_counter(4);

        let condition_bits = (instruction >> 28) as u8;
        if condition_bits == 0xF {
            tracing::error!("reserved condition field in opcode {instruction:#010X}");
            return Err(EmuError::UndefinedInstruction(instruction));
        }

        if !self.cpsr.can_execute(Condition::from(condition_bits)) {
            return Ok(());
        }

        match self.arm_dispatch[arm::dispatch_index(instruction)] {
            ArmInstructionKind::DataProcessing => self.data_processing(instruction),
            ArmInstructionKind::BranchAndExchange => {
                self.branch_and_exchange(instruction);
                Ok(())
            }
            ArmInstructionKind::HalfwordDataTransfer => self.halfword_data_transfer(instruction),
            ArmInstructionKind::Multiply => {
                self.multiply(instruction);
                Ok(())
            }
            ArmInstructionKind::MultiplyLong => {
                self.multiply_long(instruction);
                Ok(())
            }
            ArmInstructionKind::SingleDataSwap => self.single_data_swap(instruction),
            ArmInstructionKind::SingleDataTransfer => self.single_data_transfer(instruction),
            ArmInstructionKind::BlockDataTransfer => self.block_data_transfer(instruction),
            ArmInstructionKind::Branch => {
                self.branch(instruction);
                Ok(())
            }
            ArmInstructionKind::SoftwareInterrupt => {
                self.software_interrupt();
                Ok(())
            }
            ArmInstructionKind::Undefined => {
                self.undefined_instruction(u64::from(instruction));
                Ok(())
            }
        }
    }

    fn step_thumb(&mut self) -> Result<(), EmuError> {
        let instruction = self.bus.read_half_word(self.pc())?;
        self.registers.advance_program_counter(2);

        match self.thumb_dispatch[(instruction >> 8) as usize] {
            ThumbInstructionKind::MoveShiftedRegister => self.thumb_move_shifted_register(instruction),
            ThumbInstructionKind::AddSubtract => {
                self.thumb_add_subtract(instruction);
                Ok(())
            }
            ThumbInstructionKind::MoveCompareAddSubtractImmediate => {
                self.thumb_move_compare_immediate(instruction);
                Ok(())
            }
            ThumbInstructionKind::AluOperations => {
                self.thumb_alu(instruction);
                Ok(())
            }
            ThumbInstructionKind::HiRegisterOperations => {
                self.thumb_hi_register(instruction);
                Ok(())
            }
            ThumbInstructionKind::PcRelativeLoad => self.thumb_pc_relative_load(instruction),
            ThumbInstructionKind::LoadStoreRegisterOffset => {
                self.thumb_load_store_register_offset(instruction)
            }
            ThumbInstructionKind::LoadStoreSignExtended => {
                self.thumb_load_store_sign_extended(instruction)
            }
            ThumbInstructionKind::LoadStoreImmediateOffset => {
                self.thumb_load_store_immediate_offset(instruction)
            }
            ThumbInstructionKind::LoadStoreHalfword => self.thumb_load_store_halfword(instruction),
            ThumbInstructionKind::SpRelativeLoadStore => {
                self.thumb_sp_relative_load_store(instruction)
            }
            ThumbInstructionKind::LoadAddress => {
                self.thumb_load_address(instruction);
                Ok(())
            }
            ThumbInstructionKind::AddOffsetToStackPointer => {
                self.thumb_add_offset_to_sp(instruction);
                Ok(())
            }
            ThumbInstructionKind::PushPopRegisters => self.thumb_push_pop(instruction),
            ThumbInstructionKind::MultipleLoadStore => self.thumb_multiple_load_store(instruction),
            ThumbInstructionKind::ConditionalBranch => {
                self.thumb_conditional_branch(instruction);
                Ok(())
            }
            ThumbInstructionKind::SoftwareInterrupt => {
                self.software_interrupt();
                Ok(())
            }
            ThumbInstructionKind::UnconditionalBranch => {
                self.thumb_unconditional_branch(instruction);
                Ok(())
            }
            ThumbInstructionKind::LongBranchWithLink => {
                self.thumb_long_branch_with_link(instruction);
                Ok(())
            }
            ThumbInstructionKind::Undefined => {
                self.undefined_instruction(u64::from(instruction));
                Ok(())
            }
        }
    }

    // --- register and PSR access --------------------------------------

    /// The current fetch address, aligned for the current state.
    #[must_use]
    pub fn pc(&self) -> u32 {
        match self.cpsr.cpu_state() {
            CpuState::Arm => self.registers.program_counter() & !0b11,
            CpuState::Thumb => self.registers.program_counter() & !0b1,
        }
    }

    /// What a read of r15 returns: the fetch address plus one more
    /// instruction of prefetch.
    #[must_use]
    pub fn pc_prefetch(&self) -> u32 {
        match self.cpsr.cpu_state() {
            CpuState::Arm => self.registers.program_counter().wrapping_add(4) & !0b11,
            CpuState::Thumb => self.registers.program_counter().wrapping_add(2) & !0b1,
        }
    }

    #[must_use]
    pub fn register(&self, index: u32) -> u32 {
        if index == REG_PC {
            self.pc_prefetch()
        } else {
            self.registers.register_at(index, self.cpsr.mode())
        }
    }

    pub fn set_register(&mut self, index: u32, value: u32) {
        if index == REG_PC {
            self.registers.set_program_counter(value);
        } else {
            self.registers.set_register_at(index, self.cpsr.mode(), value);
        }
    }

    /// The SPSR of the current mode.
    ///
    /// # Errors
    ///
    /// [`EmuError::SpsrUnavailable`] in User and System mode.
    pub fn spsr(&self) -> Result<Psr, EmuError> {
        self.registers
            .spsr(self.cpsr.mode())
            .ok_or(EmuError::SpsrUnavailable)
    }

    /// Stores into the current mode's SPSR; a no-op with a log line in
    /// User and System mode.
    pub fn set_spsr(&mut self, value: u32) {
        let mode = self.cpsr.mode();
        if !self.registers.set_spsr(mode, Psr::from(value)) {
            tracing::warn!("SPSR write ignored, {mode:?} mode has no SPSR");
        }
    }

    /// Replaces CPSR. Unprivileged writes only reach the condition flags;
    /// privileged writes that carry an illegal mode field are rejected
    /// whole, keeping the mode invariant intact.
    pub fn set_cpsr(&mut self, value: u32, privileged: bool) {
        if privileged {
            if Mode::try_from(value & 0b11111).is_err() {
                tracing::warn!(
                    "rejecting CPSR write with illegal mode bits 0b{:05b}",
                    value & 0b11111
                );
                return;
            }
            self.cpsr = Psr::from(value);
        } else {
            self.cpsr = Psr::from((u32::from(self.cpsr) & 0x0FFF_FFFF) | (value & 0xF000_0000));
        }
    }

    pub fn set_cpu_state(&mut self, thumb: bool) {
        if self.cpsr.state_bit() != thumb {
            self.cpsr.set_state_bit(thumb);
        }
    }

    /// LDR-style rotated word read: the aligned word rotated right by the
    /// byte offset of the unaligned address.
    ///
    /// # Errors
    ///
    /// Propagates bus faults.
    pub fn read_word_rotated(&self, address: u32) -> Result<u32, EmuError> {
        let rotation = (address % 4) * 8;
        let word = self.bus.read_word(address & !0b11)?;
        Ok(word.rotate_right(rotation))
    }

    // --- exceptions ----------------------------------------------------

    fn enter_exception(&mut self, exception: Exception) {
        let return_address = self.pc();
        let target = exception.mode();

        self.registers.set_banked_lr(target, return_address);
        self.registers.set_spsr(target, self.cpsr);
        self.set_cpsr(
            (u32::from(self.cpsr) & 0xFFFF_FF00) | exception.control_byte(),
            true,
        );
        self.registers.set_program_counter(exception.vector());
    }

    pub(crate) fn hardware_interrupt(&mut self) {
        tracing::debug!("hardware interrupt taken at {:#010X}", self.pc());
        self.enter_exception(Exception::Irq);
    }

    pub(crate) fn software_interrupt(&mut self) {
        tracing::debug!("software interrupt at {:#010X}", self.pc());
        self.enter_exception(Exception::SoftwareInterrupt);
    }

    pub(crate) fn undefined_instruction(&mut self, instruction: u64) {
        tracing::warn!("undefined instruction {instruction:#X}, taking the undefined vector");
        self.enter_exception(Exception::UndefinedInstruction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reset_state_matches_the_boot_contract() {
        let cpu = Arm7tdmi::default();

        assert_eq!(cpu.cpsr.mode(), Mode::System);
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Arm);
        assert_eq!(cpu.pc(), 0x0800_0000);
        assert_eq!(cpu.register(13), 0x0300_7F00);
        assert_eq!(cpu.registers.register_at(13, Mode::Irq), 0x0300_7FA0);
        assert_eq!(cpu.registers.register_at(13, Mode::Supervisor), 0x0300_7FE0);
    }

    #[test]
    fn r15_reads_with_prefetch_offset() {
        let mut cpu = Arm7tdmi::default();
        cpu.registers.set_program_counter(0x0800_0004);

        // ARM: one fetched instruction ahead plus one word of prefetch.
        assert_eq!(cpu.register(15), 0x0800_0008);

        cpu.cpsr.set_cpu_state(CpuState::Thumb);
        assert_eq!(cpu.register(15), 0x0800_0006);
    }

    #[test]
    fn reserved_condition_field_is_a_hard_fault() {
        let mut cpu = Arm7tdmi::default();
        cpu.bus.memory.wram_board[0..4].copy_from_slice(&0xF000_0000_u32.to_le_bytes());
        cpu.registers.set_program_counter(0x0200_0000);

        assert_eq!(
            cpu.step(),
            Err(EmuError::UndefinedInstruction(0xF000_0000))
        );
    }

    #[test]
    fn failed_condition_skips_the_instruction() {
        let mut cpu = Arm7tdmi::default();
        // MOVEQ r0, #1 with Z clear.
        cpu.bus.memory.wram_board[0..4].copy_from_slice(&0x03A0_0001_u32.to_le_bytes());
        cpu.registers.set_program_counter(0x0200_0000);
        cpu.cpsr.set_zero_flag(false);

        cpu.step().unwrap();
        assert_eq!(cpu.register(0), 0);
        assert_eq!(cpu.pc(), 0x0200_0004);
    }

    #[test]
    fn undefined_opcode_vectors_to_0x04() {
        let mut cpu = Arm7tdmi::default();
        // A coprocessor instruction, unclaimed by the dispatch table.
        cpu.bus.memory.wram_board[0..4].copy_from_slice(&0xEE00_0000_u32.to_le_bytes());
        cpu.registers.set_program_counter(0x0200_0000);

        cpu.step().unwrap();

        assert_eq!(cpu.pc(), 0x04);
        assert_eq!(cpu.cpsr.mode(), Mode::Undefined);
        // LR holds the post-fetch address.
        assert_eq!(cpu.registers.register_at(14, Mode::Undefined), 0x0200_0004);
    }

    #[test]
    fn swi_vectors_to_0x08_in_supervisor_mode() {
        let mut cpu = Arm7tdmi::default();
        cpu.bus.memory.wram_board[0..4].copy_from_slice(&0xEF00_0042_u32.to_le_bytes());
        cpu.registers.set_program_counter(0x0200_0000);
        let old_cpsr = u32::from(cpu.cpsr);

        cpu.step().unwrap();

        assert_eq!(cpu.pc(), 0x08);
        assert_eq!(cpu.cpsr.mode(), Mode::Supervisor);
        assert!(cpu.cpsr.irq_disable());
        assert!(cpu.cpsr.fiq_disable());
        assert_eq!(
            cpu.registers.spsr(Mode::Supervisor).map(u32::from),
            Some(old_cpsr)
        );
    }

    #[test]
    fn pending_interrupt_takes_the_irq_vector() {
        let mut cpu = Arm7tdmi::default();
        cpu.registers.set_program_counter(0x0200_0100);
        cpu.cpsr.set_irq_disable(false);

        cpu.bus.interrupt_control.interrupt_master_enable = 1;
        cpu.bus.interrupt_control.interrupt_enable = 1;
        cpu.bus.interrupt_control.interrupt_request = 1;

        cpu.step().unwrap();

        assert_eq!(cpu.pc(), 0x18);
        assert_eq!(cpu.cpsr.mode(), Mode::Irq);
        assert!(cpu.cpsr.irq_disable());
        assert_eq!(cpu.registers.register_at(14, Mode::Irq), 0x0200_0100);
    }

    #[test]
    fn masked_interrupt_is_not_taken() {
        let mut cpu = Arm7tdmi::default();
        // MOV r0, #1 at the start of board WRAM.
        cpu.bus.memory.wram_board[0..4].copy_from_slice(&0xE3A0_0001_u32.to_le_bytes());
        cpu.registers.set_program_counter(0x0200_0000);
        cpu.cpsr.set_irq_disable(true);

        cpu.bus.interrupt_control.interrupt_master_enable = 1;
        cpu.bus.interrupt_control.interrupt_enable = 1;
        cpu.bus.interrupt_control.interrupt_request = 1;

        cpu.step().unwrap();
        assert_eq!(cpu.register(0), 1);
        assert_eq!(cpu.cpsr.mode(), Mode::System);
    }

    #[test]
    fn user_mode_cpsr_writes_only_touch_the_flags() {
        let mut cpu = Arm7tdmi::default();
        cpu.cpsr = Psr::from(Mode::User);

        cpu.set_cpsr(0xF000_001F, false);
        assert_eq!(cpu.cpsr.mode(), Mode::User);
        assert!(cpu.cpsr.sign_flag());
        assert!(cpu.cpsr.zero_flag());
    }

    #[test]
    fn illegal_mode_writes_are_rejected() {
        let mut cpu = Arm7tdmi::default();
        cpu.set_cpsr(0x0000_0000, true); // mode bits 0b00000
        assert_eq!(cpu.cpsr.mode(), Mode::System);
    }

    #[test]
    fn rotated_read_matches_the_bus_rotation_rule() {
        let mut cpu = Arm7tdmi::default();
        cpu.bus.write_word(0x0200_0000, 0x1122_3344);

        assert_eq!(cpu.read_word_rotated(0x0200_0000).unwrap(), 0x1122_3344);
        assert_eq!(cpu.read_word_rotated(0x0200_0001).unwrap(), 0x4411_2233);
        assert_eq!(cpu.read_word_rotated(0x0200_0002).unwrap(), 0x3344_1122);
    }
}

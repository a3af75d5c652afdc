//! Interrupt control registers.
//!
//! | Register | Address       | Description                                  |
//! |----------|---------------|----------------------------------------------|
//! | IE       | `0x0400_0200` | Interrupt Enable - which sources may fire    |
//! | IF       | `0x0400_0202` | Request flags - pending sources, write-1-clear |
//! | IME      | `0x0400_0208` | Master enable - global on/off                |
//!
//! Hardware sets an IF bit when its event occurs; the CPU takes the IRQ
//! vector when IME bit 0 is set, the CPSR I bit is clear, and `IE & IF` is
//! non-zero. Handlers acknowledge by writing 1 to the IF bits they served.

use serde::{Deserialize, Serialize};

/// An interrupt source. The value is the bit index in IE and IF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank = 0,
    HBlank = 1,
    VCount = 2,
    Timer0 = 3,
    Timer1 = 4,
    Timer2 = 5,
    Timer3 = 6,
    Dma0 = 8,
    Dma1 = 9,
    Dma2 = 10,
    Dma3 = 11,
}

impl Interrupt {
    #[must_use]
    pub const fn timer(index: usize) -> Self {
        match index {
            0 => Self::Timer0,
            1 => Self::Timer1,
            2 => Self::Timer2,
            _ => Self::Timer3,
        }
    }

    #[must_use]
    pub const fn dma(channel: usize) -> Self {
        match channel {
            0 => Self::Dma0,
            1 => Self::Dma1,
            2 => Self::Dma2,
            _ => Self::Dma3,
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct InterruptControl {
    pub interrupt_enable: u16,
    /// Bits are set when interrupts are requested, cleared by writing 1 to
    /// the corresponding bit.
    pub interrupt_request: u16,
    pub interrupt_master_enable: u16,
}

impl InterruptControl {
    pub fn request(&mut self, interrupt: Interrupt) {
        self.interrupt_request |= 1 << (interrupt as u16);
    }

    /// Write-1-to-clear acknowledge of IF.
    pub fn acknowledge(&mut self, value: u16) {
        self.interrupt_request &= !value;
    }

    /// True when an enabled interrupt is pending and IME allows it. The
    /// CPSR I bit is the CPU's concern, not ours.
    #[must_use]
    pub const fn pending(&self) -> bool {
        (self.interrupt_master_enable & 1) == 1
            && (self.interrupt_enable & self.interrupt_request) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_sets_the_documented_bit() {
        let mut control = InterruptControl::default();
        control.request(Interrupt::Timer2);
        control.request(Interrupt::Dma3);

        assert_eq!(control.interrupt_request, (1 << 5) | (1 << 11));
    }

    #[test]
    fn acknowledge_clears_only_written_bits() {
        let mut control = InterruptControl::default();
        control.request(Interrupt::VBlank);
        control.request(Interrupt::HBlank);

        control.acknowledge(0x0001);
        assert_eq!(control.interrupt_request, 0x0002);
    }

    #[test]
    fn pending_needs_ime_and_matching_enable() {
        let mut control = InterruptControl::default();
        control.request(Interrupt::VCount);
        assert!(!control.pending());

        control.interrupt_enable = 1 << 2;
        assert!(!control.pending());

        control.interrupt_master_enable = 1;
        assert!(control.pending());
    }
}

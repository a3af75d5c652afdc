//! The four-channel DMA controller.
//!
//! Each channel exposes source/destination address registers, a word count
//! and a control word. Writing the control word with a rising enable bit
//! latches the registers into the channel's working copies; from then on
//! the bus moves one unit (16 or 32 bits) per DMA tick until the count runs
//! out. The unit transfers themselves live in the bus, which owns memory;
//! this module is the register file and sequencing state.
//!
//! DMA3CNT_H layout (the part this core models):
//!
//! | Bits  | Field                                              |
//! |-------|----------------------------------------------------|
//! | 5-6   | destination control (inc/dec/fixed/inc-and-reload) |
//! | 7-8   | source control (inc/dec/fixed)                     |
//! | 9     | repeat                                             |
//! | 10    | transfer type (0 = 16-bit, 1 = 32-bit)             |
//! | 12-13 | start timing (only immediate is modelled)          |
//! | 14    | IRQ on completion                                  |
//! | 15    | enable                                             |

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::error::EmuError;

/// Address adjustment applied after every unit transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressControl {
    Increment,
    Decrement,
    Fixed,
    /// Increment while running, reload the latched address on repeat.
    /// Valid for the destination only.
    IncrementReload,
}

impl From<u16> for AddressControl {
    fn from(bits: u16) -> Self {
        match bits & 0b11 {
            0 => Self::Increment,
            1 => Self::Decrement,
            2 => Self::Fixed,
            _ => Self::IncrementReload,
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct DmaChannel {
    /// DMAxSAD as written by software.
    pub source_address: u32,
    /// DMAxDAD as written by software.
    pub destination_address: u32,
    /// DMAxCNT_L as written by software; 0 means the channel default.
    pub word_count: u16,
    /// DMAxCNT_H.
    pub control: u16,

    /// Working copies, latched on the enable rising edge.
    pub current_source: u32,
    pub current_destination: u32,
    pub remaining: u32,
    pub running: bool,
}

impl DmaChannel {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.control.get_bit(15)
    }

    #[must_use]
    pub fn irq_enabled(&self) -> bool {
        self.control.get_bit(14)
    }

    #[must_use]
    pub fn start_timing(&self) -> u8 {
        self.control.get_bits(12..=13) as u8
    }

    /// True for 32-bit units, false for 16-bit.
    #[must_use]
    pub fn word_transfer(&self) -> bool {
        self.control.get_bit(10)
    }

    #[must_use]
    pub fn repeat(&self) -> bool {
        self.control.get_bit(9)
    }

    #[must_use]
    pub fn source_control(&self) -> AddressControl {
        AddressControl::from(self.control.get_bits(7..=8))
    }

    #[must_use]
    pub fn destination_control(&self) -> AddressControl {
        AddressControl::from(self.control.get_bits(5..=6))
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct Dma {
    pub channels: [DmaChannel; 4],
}

impl Dma {
    /// A zero word count means the channel's full length: 0x10000 on
    /// channel 3, 0x4000 elsewhere.
    #[must_use]
    pub const fn configured_length(&self, channel: usize) -> u32 {
        let count = self.channels[channel].word_count;
        if count != 0 {
            count as u32
        } else if channel == 3 {
            0x10000
        } else {
            0x4000
        }
    }

    pub fn set_source_address(&mut self, channel: usize, value: u32) {
        tracing::info!("write to DMA{channel}SAD, value: {value:#010X}");
        self.channels[channel].source_address = value;
    }

    pub fn set_destination_address(&mut self, channel: usize, value: u32) {
        tracing::info!("write to DMA{channel}DAD, value: {value:#010X}");
        self.channels[channel].destination_address = value;
    }

    pub fn set_word_count(&mut self, channel: usize, value: u16) {
        tracing::info!("write to DMA{channel}CNT_L, value: {value:#06X}");
        self.channels[channel].word_count = value;
    }

    /// A rising enable edge latches the address and count registers.
    pub fn set_control(&mut self, channel: usize, value: u16) {
        let old_enable = self.channels[channel].enabled();

        tracing::info!("write to DMA{channel}CNT_H, value: {value:#06X}");
        self.channels[channel].control = value;

        if !old_enable && self.channels[channel].enabled() {
            let length = self.configured_length(channel);
            let ch = &mut self.channels[channel];
            ch.current_source = ch.source_address;
            ch.current_destination = ch.destination_address;
            ch.remaining = length;
        }
    }

    #[must_use]
    pub fn any_enabled(&self) -> bool {
        self.channels.iter().any(DmaChannel::enabled)
    }

    #[must_use]
    pub fn any_running(&self) -> bool {
        self.channels.iter().any(|c| c.running)
    }

    /// Promotes enabled-but-idle channels to running.
    ///
    /// # Errors
    ///
    /// Only the immediate start timing is modelled; VBlank/HBlank/special
    /// timings fail with [`EmuError::UnimplementedDmaTiming`].
    pub fn check_start_conditions(&mut self) -> Result<(), EmuError> {
        for channel in &mut self.channels {
            if channel.enabled() && !channel.running {
                match channel.start_timing() {
                    0 => channel.running = true,
                    timing => return Err(EmuError::UnimplementedDmaTiming(timing)),
                }
            }
        }

        Ok(())
    }
}

//! Hardware components reached through the [`Bus`](crate::bus::Bus).
//!
//! | Module                | Description                              | I/O range           |
//! |-----------------------|------------------------------------------|---------------------|
//! | [`internal_memory`]   | BIOS, RAM regions, cartridge, flash stub | various             |
//! | [`lcd`]               | Display timing and background rendering  | `0x0400_0000-0056`  |
//! | [`dma`]               | 4-channel DMA controller                 | `0x0400_00B0-00DF`  |
//! | [`timers`]            | 4 prescaled hardware timers              | `0x0400_0100-010E`  |
//! | [`keypad`]            | Button input word                        | `0x0400_0130-0132`  |
//! | [`interrupt_control`] | IE / IF / IME                            | `0x0400_0200-0208`  |

pub mod dma;
pub mod internal_memory;
pub mod interrupt_control;
pub mod keypad;
pub mod lcd;
pub mod timers;

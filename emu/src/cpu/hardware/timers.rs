//! The four hardware timers.
//!
//! Each timer is a 16-bit counter fed either by the system clock through a
//! prescaler (1, 64, 256 or 1024) or, for timers 1-3 in count-up mode, by
//! the previous timer's overflow. On overflow the counter reloads from
//! TMxCNT_L and may raise its interrupt. Timers tick in ascending order, so
//! an overflow of timer `i` feeds timer `i+1` within the same tick.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

const PRESCALER: [u16; 4] = [1, 64, 256, 1024];

#[derive(Default, Clone, Copy, Serialize, Deserialize)]
pub struct TimerChannel {
    /// TMxCNT_L on write: the value loaded into the counter on overflow.
    pub reload: u16,
    /// TMxCNT_H.
    pub control: u16,
    /// TMxCNT_L on read: the live counter.
    pub counter: u16,
    sub_counter: u16,
    /// Whether this timer overflowed during the current tick.
    overflow: bool,
}

impl TimerChannel {
    #[must_use]
    pub fn prescaler_select(&self) -> usize {
        self.control.get_bits(0..=1) as usize
    }

    #[must_use]
    pub fn count_up(&self) -> bool {
        self.control.get_bit(2)
    }

    #[must_use]
    pub fn irq_enabled(&self) -> bool {
        self.control.get_bit(6)
    }

    #[must_use]
    pub fn started(&self) -> bool {
        self.control.get_bit(7)
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct Timers {
    pub channels: [TimerChannel; 4],
}

/// Which timers overflowed with IRQ enabled during one tick.
#[derive(Default)]
pub struct TimersStepOutput {
    pub overflow_irqs: [bool; 4],
}

impl Timers {
    /// The live counter value, what a TMxCNT_L read returns.
    #[must_use]
    pub const fn counter(&self, timer: usize) -> u16 {
        self.channels[timer].counter
    }

    pub fn set_reload(&mut self, timer: usize, value: u16) {
        self.channels[timer].reload = value;
    }

    /// A control write always resets the prescaler phase; a rising start
    /// edge also reloads the counter.
    pub fn set_control(&mut self, timer: usize, value: u16) {
        let channel = &mut self.channels[timer];
        let old_start = channel.started();

        channel.control = value;
        channel.sub_counter = 0;

        if !old_start && channel.started() {
            channel.counter = channel.reload;
        }
    }

    pub fn step(&mut self) -> TimersStepOutput {
        let mut output = TimersStepOutput::default();

        for i in 0..4 {
            let old_counter = self.channels[i].counter;
            let previous_overflowed = i > 0 && self.channels[i - 1].overflow;

            let channel = &mut self.channels[i];
            channel.overflow = false;

            if !channel.started() {
                continue;
            }

            if channel.count_up() && i != 0 {
                if previous_overflowed {
                    channel.counter = channel.counter.wrapping_add(1);
                }
            } else {
                channel.sub_counter += 1;

                if channel.sub_counter >= PRESCALER[channel.prescaler_select()] {
                    channel.sub_counter = 0;
                    channel.counter = channel.counter.wrapping_add(1);
                }
            }

            if old_counter == 0xFFFF && channel.counter == 0 {
                channel.overflow = true;
                channel.counter = channel.reload;

                if channel.irq_enabled() {
                    output.overflow_irqs[i] = true;
                }
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const START: u16 = 1 << 7;
    const IRQ: u16 = 1 << 6;
    const COUNT_UP: u16 = 1 << 2;

    #[test]
    fn start_edge_loads_the_reload_value() {
        let mut timers = Timers::default();
        timers.set_reload(0, 0xFF00);
        timers.set_control(0, START);

        assert_eq!(timers.counter(0), 0xFF00);

        // Writing control again with start still high must not reload.
        timers.channels[0].counter = 0x1234;
        timers.set_control(0, START | IRQ);
        assert_eq!(timers.counter(0), 0x1234);
    }

    #[test]
    fn prescaler_divides_the_tick_rate() {
        let mut timers = Timers::default();
        // Prescaler select 1 = divide by 64.
        timers.set_control(0, START | 0b01);

        for _ in 0..63 {
            timers.step();
        }
        assert_eq!(timers.counter(0), 0);

        timers.step();
        assert_eq!(timers.counter(0), 1);
    }

    #[test]
    fn overflow_reloads_and_requests_irq() {
        let mut timers = Timers::default();
        timers.set_reload(0, 0xFFF0);
        timers.set_control(0, START | IRQ);

        let mut requested = false;
        for _ in 0..0x10 {
            requested |= timers.step().overflow_irqs[0];
        }

        assert!(requested);
        assert_eq!(timers.counter(0), 0xFFF0);
    }

    #[test]
    fn cascade_advances_once_per_upstream_overflow() {
        let mut timers = Timers::default();
        // Timer 0 overflows every 4 ticks.
        timers.set_reload(0, 0xFFFC);
        timers.set_control(0, START);
        // Timer 1 counts timer 0 overflows.
        timers.set_control(1, START | COUNT_UP);

        for _ in 0..4 * 5 {
            timers.step();
        }

        assert_eq!(timers.counter(1), 5);
    }

    #[test]
    fn stopped_timers_do_not_tick() {
        let mut timers = Timers::default();
        for _ in 0..100 {
            timers.step();
        }
        assert_eq!(timers.counter(0), 0);
    }
}

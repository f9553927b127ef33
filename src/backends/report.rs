//! Decoding of button-bitmask HID input reports.
//!
//! Most USB switch interfaces (and the button section of most gamepads) report their state
//! as a bitmask: bit *n* set means button *n* is down. [`ButtonReportDecoder`] keeps the last
//! mask and turns each report into press/release edges.

use crate::event::RawSignal;

/// Widest mask we track (64 buttons).
pub const MAX_BUTTON_BYTES: usize = 8;

#[derive(Debug, Clone)]
pub struct ButtonReportDecoder {
    /// Bytes to skip before the bitmask (report id, status bytes).
    offset: usize,
    /// Bitmask width in bytes, at most [`MAX_BUTTON_BYTES`].
    width: usize,
    previous: u64,
}

impl ButtonReportDecoder {
    pub fn new(offset: usize, width: usize) -> Self {
        Self {
            offset,
            width: width.clamp(1, MAX_BUTTON_BYTES),
            previous: 0,
        }
    }

    /// Bitmask carried by `report`, little-endian across bytes. Short reports read as
    /// released for the missing bytes.
    pub fn mask(&self, report: &[u8]) -> u64 {
        report
            .iter()
            .skip(self.offset)
            .take(self.width)
            .enumerate()
            .fold(0u64, |acc, (i, byte)| acc | (u64::from(*byte) << (8 * i)))
    }

    /// Edges between the previous report and this one, lowest button first.
    pub fn decode(&mut self, report: &[u8]) -> Vec<RawSignal> {
        let next = self.mask(report);
        let changed = self.previous ^ next;
        self.previous = next;

        let mut out = Vec::new();
        for bit in 0..(self.width * 8) as u16 {
            let flag = 1u64 << bit;
            if changed & flag == 0 {
                continue;
            }
            out.push(if next & flag != 0 {
                RawSignal::ButtonPressed { button: bit }
            } else {
                RawSignal::ButtonReleased { button: bit }
            });
        }
        out
    }

    /// Forget held buttons (after a reconnect).
    pub fn reset(&mut self) {
        self.previous = 0;
    }
}

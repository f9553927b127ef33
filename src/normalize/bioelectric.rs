//! Bioelectric sensors (EEG headsets, EMG electrodes).
//!
//! Each channel is a latch with hysteresis: it fires once when its activation rises to the
//! trigger level and re-arms only after dropping below the release level. Channels 0..=3
//! map to Select, Next, Previous, Back; other channels carry no action.

use super::{lifecycle_event, unexpected, Normalizer};
use crate::device::DeviceType;
use crate::error::{InputError, Result};
use crate::event::{Action, DeviceEvent, EventPayload, RawSignal};
use std::collections::HashSet;

pub const EMG_TRIGGER: f32 = 0.6;
pub const EMG_RELEASE: f32 = 0.4;
pub const BRAINWAVE_TRIGGER: f32 = 0.7;
pub const BRAINWAVE_RELEASE: f32 = 0.5;

pub struct BioelectricNormalizer {
    device_id: String,
    device_type: DeviceType,
    /// Channels that fired and have not dropped below release yet.
    latched: HashSet<u8>,
}

impl BioelectricNormalizer {
    pub fn new(device_id: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            device_id: device_id.into(),
            device_type,
            latched: HashSet::new(),
        }
    }

    fn levels(&self) -> (f32, f32) {
        match self.device_type {
            DeviceType::Brainwave => (BRAINWAVE_TRIGGER, BRAINWAVE_RELEASE),
            _ => (EMG_TRIGGER, EMG_RELEASE),
        }
    }
}

pub fn channel_action(channel: u8) -> Option<Action> {
    match channel {
        0 => Some(Action::Select),
        1 => Some(Action::Next),
        2 => Some(Action::Previous),
        3 => Some(Action::Back),
        _ => None,
    }
}

impl Normalizer for BioelectricNormalizer {
    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn handle_raw(&mut self, raw: &RawSignal, ts: u64) -> Result<Option<DeviceEvent>> {
        if let Some(ev) = lifecycle_event(&self.device_id, raw, ts) {
            return ev.map(Some);
        }
        let RawSignal::Activation { channel, level } = raw else {
            return Err(unexpected(&self.device_id, self.device_type, raw));
        };
        if !(0.0..=1.0).contains(level) {
            return Err(InputError::malformed(
                &self.device_id,
                format!("activation {level} outside [0, 1]"),
            ));
        }
        let Some(action) = channel_action(*channel) else {
            return Ok(None);
        };

        let (trigger, release) = self.levels();
        if self.latched.contains(channel) {
            if *level < release {
                self.latched.remove(channel);
            }
            return Ok(None);
        }
        if *level < trigger {
            return Ok(None);
        }
        self.latched.insert(*channel);
        Ok(Some(DeviceEvent::new(
            self.device_id.clone(),
            EventPayload::Bioelectric {
                channel: *channel,
                activation: *level,
                action,
            },
            ts,
        )))
    }

    fn reset(&mut self) {
        self.latched.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(n: &mut BioelectricNormalizer, channel: u8, level: f32) -> Option<Action> {
        let ev = n
            .handle_raw(&RawSignal::Activation { channel, level }, 0)
            .unwrap()?;
        match ev.payload() {
            EventPayload::Bioelectric { action, .. } => Some(*action),
            _ => None,
        }
    }

    #[test]
    fn emg_fires_once_until_released() {
        let mut n = BioelectricNormalizer::new("emg", DeviceType::Emg);
        assert_eq!(feed(&mut n, 0, 0.3), None);
        assert_eq!(feed(&mut n, 0, 0.65), Some(Action::Select));
        assert_eq!(feed(&mut n, 0, 0.9), None);
        assert_eq!(feed(&mut n, 0, 0.5), None); // still above release
        assert_eq!(feed(&mut n, 0, 0.2), None); // re-armed
        assert_eq!(feed(&mut n, 0, 0.7), Some(Action::Select));
    }

    #[test]
    fn brainwave_uses_higher_trigger() {
        let mut n = BioelectricNormalizer::new("eeg", DeviceType::Brainwave);
        assert_eq!(feed(&mut n, 1, 0.65), None);
        assert_eq!(feed(&mut n, 1, 0.75), Some(Action::Next));
    }

    #[test]
    fn channels_latch_independently() {
        let mut n = BioelectricNormalizer::new("emg", DeviceType::Emg);
        assert_eq!(feed(&mut n, 2, 0.8), Some(Action::Previous));
        assert_eq!(feed(&mut n, 3, 0.8), Some(Action::Back));
        assert_eq!(feed(&mut n, 9, 0.8), None);
    }
}

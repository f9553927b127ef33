//! Sip-and-puff sensors.
//!
//! There is no settings slot for these devices, so the mapping is fixed:
//!
//! | breath | condition                       | action   |
//! |--------|---------------------------------|----------|
//! | sip    | duration < 500ms                | Select   |
//! | sip    | duration ≥ 500ms                | Back     |
//! | puff   | strength > 0.7                  | Clear    |
//! | puff   | strength ≤ 0.7                  | Next     |
//!
//! Breaths weaker than [`NOISE_FLOOR`] are ignored.

use super::{lifecycle_event, unexpected, Normalizer};
use crate::device::DeviceType;
use crate::error::{InputError, Result};
use crate::event::{Action, Breath, DeviceEvent, EventPayload, RawSignal};

pub const LONG_SIP_MS: u32 = 500;
pub const HARD_PUFF_STRENGTH: f32 = 0.7;
pub const NOISE_FLOOR: f32 = 0.1;

pub struct SipPuffNormalizer {
    device_id: String,
}

impl SipPuffNormalizer {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }
}

pub fn breath_action(kind: Breath, strength: f32, duration_ms: u32) -> Action {
    match kind {
        Breath::Sip if duration_ms < LONG_SIP_MS => Action::Select,
        Breath::Sip => Action::Back,
        Breath::Puff if strength > HARD_PUFF_STRENGTH => Action::Clear,
        Breath::Puff => Action::Next,
    }
}

impl Normalizer for SipPuffNormalizer {
    fn device_type(&self) -> DeviceType {
        DeviceType::SipPuff
    }

    fn handle_raw(&mut self, raw: &RawSignal, ts: u64) -> Result<Option<DeviceEvent>> {
        if let Some(ev) = lifecycle_event(&self.device_id, raw, ts) {
            return ev.map(Some);
        }
        let RawSignal::Breath {
            kind,
            strength,
            duration_ms,
        } = raw
        else {
            return Err(unexpected(&self.device_id, DeviceType::SipPuff, raw));
        };
        if !(0.0..=1.0).contains(strength) {
            return Err(InputError::malformed(
                &self.device_id,
                format!("breath strength {strength} outside [0, 1]"),
            ));
        }
        if *strength < NOISE_FLOOR {
            return Ok(None);
        }
        Ok(Some(DeviceEvent::new(
            self.device_id.clone(),
            EventPayload::SipPuff {
                breath: *kind,
                strength: *strength,
                duration_ms: *duration_ms,
                action: breath_action(*kind, *strength, *duration_ms),
            },
            ts,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action_for(kind: Breath, strength: f32, duration_ms: u32) -> Option<Action> {
        let mut n = SipPuffNormalizer::new("sp");
        let ev = n
            .handle_raw(
                &RawSignal::Breath {
                    kind,
                    strength,
                    duration_ms,
                },
                0,
            )
            .unwrap()?;
        match ev.payload() {
            EventPayload::SipPuff { action, .. } => Some(*action),
            _ => None,
        }
    }

    #[test]
    fn short_sip_selects_long_sip_goes_back() {
        assert_eq!(action_for(Breath::Sip, 0.5, 300), Some(Action::Select));
        assert_eq!(action_for(Breath::Sip, 0.5, 600), Some(Action::Back));
        assert_eq!(action_for(Breath::Sip, 0.5, 500), Some(Action::Back));
    }

    #[test]
    fn puff_strength_splits_clear_and_next() {
        assert_eq!(action_for(Breath::Puff, 0.9, 200), Some(Action::Clear));
        assert_eq!(action_for(Breath::Puff, 0.7, 200), Some(Action::Next));
    }

    #[test]
    fn faint_breath_is_ignored_and_overrange_is_malformed() {
        assert_eq!(action_for(Breath::Puff, 0.05, 200), None);
        let mut n = SipPuffNormalizer::new("sp");
        assert!(n
            .handle_raw(
                &RawSignal::Breath {
                    kind: Breath::Sip,
                    strength: 1.4,
                    duration_ms: 10
                },
                0
            )
            .is_err());
    }
}

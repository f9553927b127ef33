//! Signal normalizers.
//!
//! One normalizer per device category turns [`RawSignal`]s into canonical
//! [`DeviceEvent`]s. Normalizers are pure translators: they keep whatever per-device
//! state parsing needs (last axis values, hysteresis latches) but never touch scan or
//! dwell state.
//!
//! Thresholds come from the device settings where the data model has a slot for them
//! (switch bindings, joystick axes). Touch, sip/puff, and bioelectric devices have no
//! settings slot; their thresholds are the policy constants in their modules.
//!
//! `handle_raw` returns:
//! - `Ok(Some(event))` for a signal that means something,
//! - `Ok(None)` for a well-formed signal that maps to nothing (stick inside its deadzone,
//!   unbound key),
//! - `Err(MalformedSignal)` for signals this normalizer cannot interpret.

mod bioelectric;
mod joystick;
mod pointer;
mod sip_puff;
mod switch;
mod touch;

pub use bioelectric::BioelectricNormalizer;
pub use joystick::JoystickNormalizer;
pub use pointer::PointerNormalizer;
pub use sip_puff::SipPuffNormalizer;
pub use switch::SwitchNormalizer;
pub use touch::TouchNormalizer;

use crate::device::{Device, DeviceType};
use crate::error::{InputError, Result};
use crate::event::{DeviceEvent, EventPayload, RawSignal};

pub trait Normalizer: Send {
    fn device_type(&self) -> DeviceType;

    /// Device-type-specific checks run while the device is `Pairing`.
    fn handshake(&mut self, device: &Device) -> Result<()> {
        if device.device_type != self.device_type() {
            return Err(InputError::UnsupportedDeviceType {
                device_type: device.device_type,
            });
        }
        if !device.settings.matches(device.device_type) {
            return Err(InputError::invalid_config(format!(
                "settings payload does not fit a {} device",
                device.device_type
            )));
        }
        Ok(())
    }

    fn handle_raw(&mut self, raw: &RawSignal, timestamp_ms: u64) -> Result<Option<DeviceEvent>>;

    /// Forget transient parsing state (e.g. on reconnect).
    fn reset(&mut self) {}
}

/// Build the normalizer matching `device`'s type from its current settings.
pub fn normalizer_for(device: &Device) -> Result<Box<dyn Normalizer>> {
    let id = device.id.clone();
    let wrong_settings = || {
        InputError::invalid_config(format!(
            "settings payload does not fit a {} device",
            device.device_type
        ))
    };
    let normalizer: Box<dyn Normalizer> = match device.device_type {
        DeviceType::Switch => {
            let settings = device.settings.as_switch().ok_or_else(wrong_settings)?;
            Box::new(SwitchNormalizer::new(id, settings.bindings.clone()))
        }
        DeviceType::EyeTracker | DeviceType::HeadMouse => {
            Box::new(PointerNormalizer::new(id, device.device_type))
        }
        DeviceType::Joystick => {
            let settings = device.settings.as_joystick().ok_or_else(wrong_settings)?;
            Box::new(JoystickNormalizer::new(id, settings.clone()))
        }
        DeviceType::Touch => Box::new(TouchNormalizer::new(id)),
        DeviceType::SipPuff => Box::new(SipPuffNormalizer::new(id)),
        DeviceType::Brainwave | DeviceType::Emg => {
            Box::new(BioelectricNormalizer::new(id, device.device_type))
        }
    };
    Ok(normalizer)
}

/// Status, battery, and fault signals are shared by every device type.
pub(crate) fn lifecycle_event(
    device_id: &str,
    raw: &RawSignal,
    timestamp_ms: u64,
) -> Option<Result<DeviceEvent>> {
    let payload = match raw {
        RawSignal::StatusChanged(status) => EventPayload::Status(*status),
        RawSignal::Battery { level } if *level > 100 => {
            return Some(Err(InputError::malformed(
                device_id,
                format!("battery level {level} above 100"),
            )))
        }
        RawSignal::Battery { level } => EventPayload::Battery(*level),
        RawSignal::Fault { message } => EventPayload::Error(message.clone()),
        _ => return None,
    };
    Some(Ok(DeviceEvent::new(device_id, payload, timestamp_ms)))
}

pub(crate) fn unexpected(device_id: &str, device_type: DeviceType, raw: &RawSignal) -> InputError {
    InputError::malformed(
        device_id,
        format!("{raw:?} is not a {device_type} signal"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceStatus;
    use crate::event::EventKind;
    use crate::settings::DeviceSettings;

    #[test]
    fn factory_builds_matching_normalizer() {
        for ty in [
            DeviceType::Switch,
            DeviceType::EyeTracker,
            DeviceType::Joystick,
            DeviceType::Touch,
            DeviceType::SipPuff,
            DeviceType::HeadMouse,
            DeviceType::Brainwave,
            DeviceType::Emg,
        ] {
            let dev = Device::new("d", "D", ty);
            let n = normalizer_for(&dev).unwrap();
            assert_eq!(n.device_type(), ty);
        }
    }

    #[test]
    fn factory_rejects_mismatched_settings() {
        let dev = Device::new("d", "D", DeviceType::Switch).with_settings(DeviceSettings::None);
        assert!(normalizer_for(&dev).is_err());
    }

    #[test]
    fn handshake_rejects_other_device_types() {
        let mut n = normalizer_for(&Device::new("d", "D", DeviceType::Touch)).unwrap();
        let other = Device::new("d", "D", DeviceType::SipPuff);
        assert!(matches!(
            n.handshake(&other),
            Err(InputError::UnsupportedDeviceType { .. })
        ));
    }

    #[test]
    fn lifecycle_signals_are_shared() {
        let mut n = normalizer_for(&Device::new("d", "D", DeviceType::SipPuff)).unwrap();
        let ev = n
            .handle_raw(&RawSignal::StatusChanged(DeviceStatus::Disconnected), 9)
            .unwrap()
            .unwrap();
        assert_eq!(ev.kind(), EventKind::StatusChange);
        assert!(n.handle_raw(&RawSignal::Battery { level: 101 }, 9).is_err());
    }
}

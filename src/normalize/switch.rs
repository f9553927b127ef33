//! Switch interfaces: keyboard-emulating boxes and HID button boxes.

use super::{lifecycle_event, unexpected, Normalizer};
use crate::binding::{switch_for_button, switch_for_key};
use crate::device::{Device, DeviceType};
use crate::error::{InputError, Result};
use crate::event::{DeviceEvent, EventPayload, RawSignal};
use crate::settings::SwitchBinding;
use tracing::debug;

pub struct SwitchNormalizer {
    device_id: String,
    bindings: Vec<SwitchBinding>,
}

impl SwitchNormalizer {
    pub fn new(device_id: impl Into<String>, bindings: Vec<SwitchBinding>) -> Self {
        Self {
            device_id: device_id.into(),
            bindings,
        }
    }

    fn emit(&self, binding: Option<&SwitchBinding>, pressed: bool, ts: u64) -> Option<DeviceEvent> {
        let Some(binding) = binding else {
            debug!("{}: switch signal with no binding", self.device_id);
            return None;
        };
        Some(DeviceEvent::new(
            self.device_id.clone(),
            EventPayload::Switch {
                switch_id: binding.id.clone(),
                pressed,
            },
            ts,
        ))
    }
}

impl Normalizer for SwitchNormalizer {
    fn device_type(&self) -> DeviceType {
        DeviceType::Switch
    }

    fn handshake(&mut self, device: &Device) -> Result<()> {
        if device.device_type != DeviceType::Switch {
            return Err(InputError::UnsupportedDeviceType {
                device_type: device.device_type,
            });
        }
        let settings = device
            .settings
            .as_switch()
            .ok_or_else(|| InputError::invalid_config("switch device without switch settings"))?;
        if !settings.bindings.iter().any(|b| b.enabled) {
            return Err(InputError::invalid_config(format!(
                "switch {} has no enabled bindings",
                device.id
            )));
        }
        self.bindings = settings.bindings.clone();
        Ok(())
    }

    fn handle_raw(&mut self, raw: &RawSignal, ts: u64) -> Result<Option<DeviceEvent>> {
        if let Some(ev) = lifecycle_event(&self.device_id, raw, ts) {
            return ev.map(Some);
        }
        let event = match raw {
            RawSignal::KeyPressed { key } => self.emit(switch_for_key(&self.bindings, key), true, ts),
            RawSignal::KeyReleased { key } => {
                self.emit(switch_for_key(&self.bindings, key), false, ts)
            }
            RawSignal::ButtonPressed { button } => {
                self.emit(switch_for_button(&self.bindings, *button), true, ts)
            }
            RawSignal::ButtonReleased { button } => {
                self.emit(switch_for_button(&self.bindings, *button), false, ts)
            }
            other => return Err(unexpected(&self.device_id, DeviceType::Switch, other)),
        };
        Ok(event)
    }
}

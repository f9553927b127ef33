//! Continuous pointing devices: eye trackers and head mice.
//!
//! Coordinates pass through unchanged; smoothing belongs to the dwell selector so the
//! calibration run can see raw samples.

use super::{lifecycle_event, unexpected, Normalizer};
use crate::device::DeviceType;
use crate::error::{InputError, Result};
use crate::event::{DeviceEvent, EventPayload, RawSignal};

pub struct PointerNormalizer {
    device_id: String,
    device_type: DeviceType,
    last: Option<(f32, f32)>,
}

impl PointerNormalizer {
    pub fn new(device_id: impl Into<String>, device_type: DeviceType) -> Self {
        debug_assert!(device_type.is_pointing());
        Self {
            device_id: device_id.into(),
            device_type,
            last: None,
        }
    }
}

impl Normalizer for PointerNormalizer {
    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn handle_raw(&mut self, raw: &RawSignal, ts: u64) -> Result<Option<DeviceEvent>> {
        if let Some(ev) = lifecycle_event(&self.device_id, raw, ts) {
            return ev.map(Some);
        }
        let payload = match (raw, self.device_type) {
            (RawSignal::PointerMoved { x, y }, ty) => {
                if !x.is_finite() || !y.is_finite() {
                    return Err(InputError::malformed(
                        &self.device_id,
                        format!("non-finite pointer ({x}, {y})"),
                    ));
                }
                self.last = Some((*x, *y));
                if ty == DeviceType::EyeTracker {
                    EventPayload::Gaze { x: *x, y: *y }
                } else {
                    EventPayload::HeadMouse {
                        x: *x,
                        y: *y,
                        click: false,
                    }
                }
            }
            (RawSignal::PointerClicked, DeviceType::HeadMouse) => match self.last {
                Some((x, y)) => EventPayload::HeadMouse { x, y, click: true },
                None => return Ok(None),
            },
            (other, ty) => return Err(unexpected(&self.device_id, ty, other)),
        };
        Ok(Some(DeviceEvent::new(self.device_id.clone(), payload, ts)))
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

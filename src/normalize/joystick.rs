//! Joysticks and gamepads.
//!
//! Axis 0 is X, axis 1 is Y (down positive); other axes are ignored. Raw readings are
//! mapped through the per-axis `{min, max}` range into `[-1, 1]`, scaled by
//! `sensitivity`, and compared against the axis deadzone. The dominant axis picks the
//! direction.
//!
//! Movement is edge-triggered: one `JoystickMove` per deflection. The stick must come back
//! inside the deadzone (or swing to another direction) before it fires again. Hats follow
//! the same rule independently of the stick.

use super::{lifecycle_event, unexpected, Normalizer};
use crate::device::{Device, DeviceType};
use crate::error::{InputError, Result};
use crate::event::{DeviceEvent, Direction, EventPayload, RawSignal};
use crate::settings::JoystickSettings;

pub struct JoystickNormalizer {
    device_id: String,
    settings: JoystickSettings,
    x: f32,
    y: f32,
    stick: Option<Direction>,
    hat: Option<Direction>,
}

impl JoystickNormalizer {
    pub fn new(device_id: impl Into<String>, settings: JoystickSettings) -> Self {
        Self {
            device_id: device_id.into(),
            settings,
            x: 0.0,
            y: 0.0,
            stick: None,
            hat: None,
        }
    }

    /// Scaled deflection of one axis, or 0 inside the deadzone.
    fn deflection(value: f32, deadzone: f32, sensitivity: f32) -> f32 {
        let scaled = (value * sensitivity).clamp(-1.0, 1.0);
        if scaled.abs() <= deadzone {
            0.0
        } else {
            scaled
        }
    }

    fn stick_direction(&self) -> Option<(Direction, f32)> {
        let s = &self.settings;
        let dx = Self::deflection(self.x, s.x_axis.deadzone, s.sensitivity);
        let dy = Self::deflection(self.y, s.y_axis.deadzone, s.sensitivity);
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        let dir = if dx.abs() >= dy.abs() {
            if dx > 0.0 {
                Direction::Right
            } else {
                Direction::Left
            }
        } else if dy > 0.0 {
            Direction::Down
        } else {
            Direction::Up
        };
        Some((dir, dx.abs().max(dy.abs())))
    }

    fn moved(&self, direction: Direction, magnitude: f32, ts: u64) -> DeviceEvent {
        DeviceEvent::new(
            self.device_id.clone(),
            EventPayload::JoystickMove {
                direction,
                magnitude,
            },
            ts,
        )
    }
}

impl Normalizer for JoystickNormalizer {
    fn device_type(&self) -> DeviceType {
        DeviceType::Joystick
    }

    fn handshake(&mut self, device: &Device) -> Result<()> {
        let settings = device
            .settings
            .as_joystick()
            .filter(|_| device.device_type == DeviceType::Joystick)
            .ok_or(InputError::UnsupportedDeviceType {
                device_type: device.device_type,
            })?;
        self.settings = settings.clone();
        self.reset();
        Ok(())
    }

    fn handle_raw(&mut self, raw: &RawSignal, ts: u64) -> Result<Option<DeviceEvent>> {
        if let Some(ev) = lifecycle_event(&self.device_id, raw, ts) {
            return ev.map(Some);
        }
        match raw {
            RawSignal::AxisMoved { axis, value } => {
                if !value.is_finite() {
                    return Err(InputError::malformed(&self.device_id, "non-finite axis value"));
                }
                match axis {
                    0 => self.x = self.settings.x_axis.normalize(*value),
                    1 => self.y = self.settings.y_axis.normalize(*value),
                    _ => return Ok(None),
                }
                let current = self.stick_direction();
                let previous = self.stick;
                self.stick = current.map(|(d, _)| d);
                Ok(match current {
                    Some((dir, magnitude)) if previous != Some(dir) => {
                        Some(self.moved(dir, magnitude, ts))
                    }
                    _ => None,
                })
            }
            RawSignal::HatChanged { value, .. } => {
                let dir = Direction::from_hat(*value);
                let previous = std::mem::replace(&mut self.hat, dir);
                Ok(match dir {
                    Some(d) if previous != Some(d) => Some(self.moved(d, 1.0, ts)),
                    _ => None,
                })
            }
            RawSignal::ButtonPressed { button } | RawSignal::ButtonReleased { button } => {
                let pressed = matches!(raw, RawSignal::ButtonPressed { .. });
                Ok(Some(DeviceEvent::new(
                    self.device_id.clone(),
                    EventPayload::JoystickButton {
                        button_id: button.to_string(),
                        pressed,
                    },
                    ts,
                )))
            }
            other => Err(unexpected(&self.device_id, DeviceType::Joystick, other)),
        }
    }

    fn reset(&mut self) {
        self.x = 0.0;
        self.y = 0.0;
        self.stick = None;
        self.hat = None;
    }
}

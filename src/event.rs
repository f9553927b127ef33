//! Raw signals, canonical events, and actions.
//!
//! Input flows through three vocabularies:
//! 1. [`RawSignal`]: what a platform callback or polled [`InputSource`](crate::device::InputSource)
//!    reports, still in device terms (button indices, axis values, breath strength).
//! 2. [`DeviceEvent`]: the canonical, immutable event a normalizer emits.
//! 3. [`Action`]: the six device-independent commands everything reduces to.
//!
//! ## Raw value conventions
//! - **Axes:** raw device units; the joystick normalizer maps them through the per-axis
//!   `{min, max, deadzone}` settings into `[-1.0, 1.0]`.
//! - **Buttons:** press/release edges.
//! - **Hats (POV/D-pad):** `-1` = neutral, `0..7` = 8-way directions (Up = 0, clockwise).
//! - **Pointer coordinates:** screen pixels, origin top-left.
//! - **Breath strength / bioelectric level:** normalized `[0.0, 1.0]`.

use crate::device::{DeviceStatus, DeviceType};
use crate::error::{InputError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical, device-independent command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Select,
    Next,
    Previous,
    Back,
    Clear,
    Speak,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Four-way direction produced by joysticks and swipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Right and Down move forward through the target order; Left and Up move back.
    pub fn action(self) -> Action {
        match self {
            Self::Right | Self::Down => Action::Next,
            Self::Left | Self::Up => Action::Previous,
        }
    }

    /// 8-way hat value to a 4-way direction. Diagonals resolve to their vertical half.
    pub fn from_hat(value: i16) -> Option<Self> {
        match value {
            7 | 0 | 1 => Some(Self::Up),
            2 => Some(Self::Right),
            3 | 4 | 5 => Some(Self::Down),
            6 => Some(Self::Left),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Breath {
    Sip,
    Puff,
}

/// One finger stroke, from touch-down to lift-off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchStroke {
    pub start_x: f32,
    pub start_y: f32,
    pub end_x: f32,
    pub end_y: f32,
    pub duration_ms: u32,
    /// Taps registered in quick succession (1 = single tap).
    pub tap_count: u8,
}

/// Classified touch gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TouchGesture {
    Tap,
    DoubleTap,
    LongPress,
    Swipe(Direction),
}

/// Platform-level signal, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawSignal {
    AxisMoved { axis: u16, value: f32 },
    ButtonPressed { button: u16 },
    ButtonReleased { button: u16 },
    HatChanged { hat: u16, value: i16 },
    /// Keyboard-emulating switch interfaces.
    KeyPressed { key: String },
    KeyReleased { key: String },
    PointerMoved { x: f32, y: f32 },
    /// Head-mouse click (blink, puff, or dedicated button).
    PointerClicked,
    Touch(TouchStroke),
    Breath { kind: Breath, strength: f32, duration_ms: u32 },
    Activation { channel: u8, level: f32 },
    StatusChanged(DeviceStatus),
    Battery { level: u8 },
    Fault { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Input,
    StatusChange,
    Battery,
    Error,
}

/// Event body; the variant depends on the emitting device's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Switch { switch_id: String, pressed: bool },
    Gaze { x: f32, y: f32 },
    HeadMouse { x: f32, y: f32, click: bool },
    JoystickMove { direction: Direction, magnitude: f32 },
    JoystickButton { button_id: String, pressed: bool },
    Touch { gesture: TouchGesture, action: Action },
    SipPuff { breath: Breath, strength: f32, duration_ms: u32, action: Action },
    Bioelectric { channel: u8, activation: f32, action: Action },
    Status(DeviceStatus),
    Battery(u8),
    Error(String),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Status(_) => EventKind::StatusChange,
            Self::Battery(_) => EventKind::Battery,
            Self::Error(_) => EventKind::Error,
            _ => EventKind::Input,
        }
    }

    /// Whether an input payload can come from a device of this type.
    fn fits(&self, device_type: DeviceType) -> bool {
        match self {
            Self::Switch { .. } => device_type == DeviceType::Switch,
            Self::Gaze { .. } => device_type == DeviceType::EyeTracker,
            Self::HeadMouse { .. } => device_type == DeviceType::HeadMouse,
            Self::JoystickMove { .. } | Self::JoystickButton { .. } => {
                device_type == DeviceType::Joystick
            }
            Self::Touch { .. } => device_type == DeviceType::Touch,
            Self::SipPuff { .. } => device_type == DeviceType::SipPuff,
            Self::Bioelectric { .. } => {
                matches!(device_type, DeviceType::Brainwave | DeviceType::Emg)
            }
            Self::Status(_) | Self::Battery(_) | Self::Error(_) => true,
        }
    }
}

/// Canonical, immutable device event.
///
/// Fields are read through accessors; nothing mutates an event after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    device_id: String,
    kind: EventKind,
    payload: EventPayload,
    timestamp_ms: u64,
}

impl DeviceEvent {
    pub fn new(device_id: impl Into<String>, payload: EventPayload, timestamp_ms: u64) -> Self {
        Self {
            device_id: device_id.into(),
            kind: payload.kind(),
            payload,
            timestamp_ms,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Reject events the engine must not act on.
    ///
    /// Events built with [`DeviceEvent::new`] always have a consistent kind, but events can
    /// also arrive deserialized from diagnostics tooling.
    pub fn validate(&self, device_type: DeviceType) -> Result<()> {
        let bad = |msg: String| Err(InputError::malformed(self.device_id.clone(), msg));

        if self.kind != self.payload.kind() {
            return bad(format!(
                "kind {:?} does not match payload {:?}",
                self.kind, self.payload
            ));
        }
        if !self.payload.fits(device_type) {
            return bad(format!("payload not valid for a {device_type} device"));
        }

        match &self.payload {
            EventPayload::Gaze { x, y } | EventPayload::HeadMouse { x, y, .. } => {
                if !x.is_finite() || !y.is_finite() {
                    return bad(format!("non-finite pointer ({x}, {y})"));
                }
            }
            EventPayload::JoystickMove { magnitude, .. } if !magnitude.is_finite() => {
                return bad("non-finite joystick magnitude".into());
            }
            EventPayload::SipPuff { strength: v, .. }
            | EventPayload::Bioelectric { activation: v, .. }
                if !(0.0..=1.0).contains(v) =>
            {
                return bad(format!("level {v} outside [0, 1]"));
            }
            EventPayload::Battery(level) if *level > 100 => {
                return bad(format!("battery level {level} above 100"));
            }
            EventPayload::Switch { switch_id: id, .. }
            | EventPayload::JoystickButton { button_id: id, .. }
                if id.is_empty() =>
            {
                return bad("empty control id".into());
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_derived_from_payload() {
        let ev = DeviceEvent::new("sw", EventPayload::Battery(40), 5);
        assert_eq!(ev.kind(), EventKind::Battery);
        let ev = DeviceEvent::new(
            "sw",
            EventPayload::Switch {
                switch_id: "a".into(),
                pressed: true,
            },
            5,
        );
        assert_eq!(ev.kind(), EventKind::Input);
    }

    #[test]
    fn validate_rejects_payload_from_wrong_device_type() {
        let ev = DeviceEvent::new("et", EventPayload::Gaze { x: 1.0, y: 2.0 }, 0);
        assert!(ev.validate(DeviceType::EyeTracker).is_ok());
        assert!(ev.validate(DeviceType::Switch).is_err());
    }

    #[test]
    fn validate_rejects_non_finite_gaze_and_bad_battery() {
        let ev = DeviceEvent::new("et", EventPayload::Gaze { x: f32::NAN, y: 2.0 }, 0);
        assert!(matches!(
            ev.validate(DeviceType::EyeTracker),
            Err(InputError::MalformedSignal { .. })
        ));

        let ev = DeviceEvent::new("et", EventPayload::Battery(180), 0);
        assert!(ev.validate(DeviceType::EyeTracker).is_err());
    }

    #[test]
    fn validate_rejects_tampered_kind() {
        let json = serde_json::json!({
            "device_id": "sw",
            "kind": "Battery",
            "payload": { "Status": "Connected" },
            "timestamp_ms": 1
        });
        let ev: DeviceEvent = serde_json::from_value(json).unwrap();
        assert!(ev.validate(DeviceType::Switch).is_err());
    }

    #[test]
    fn hat_values_map_to_directions() {
        assert_eq!(Direction::from_hat(-1), None);
        assert_eq!(Direction::from_hat(0), Some(Direction::Up));
        assert_eq!(Direction::from_hat(2), Some(Direction::Right));
        assert_eq!(Direction::from_hat(4), Some(Direction::Down));
        assert_eq!(Direction::from_hat(6), Some(Direction::Left));
        assert_eq!(Direction::Right.action(), Action::Next);
        assert_eq!(Direction::Up.action(), Action::Previous);
    }
}

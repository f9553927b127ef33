//! Touch surfaces used as coarse switches (large pads, tablet edges).

use super::{lifecycle_event, unexpected, Normalizer};
use crate::device::DeviceType;
use crate::error::{InputError, Result};
use crate::event::{Action, DeviceEvent, Direction, EventPayload, RawSignal, TouchGesture, TouchStroke};

/// Strokes shorter than this are taps.
pub const TAP_RADIUS_PX: f32 = 10.0;
/// Strokes at least this long are swipes; anything between is ignored as ambiguous.
pub const MIN_SWIPE_PX: f32 = 40.0;
pub const LONG_PRESS_MS: u32 = 600;

pub struct TouchNormalizer {
    device_id: String,
}

impl TouchNormalizer {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }
}

pub fn classify(stroke: &TouchStroke) -> Option<TouchGesture> {
    let dx = stroke.end_x - stroke.start_x;
    let dy = stroke.end_y - stroke.start_y;
    let distance = dx.hypot(dy);

    if distance <= TAP_RADIUS_PX {
        return Some(if stroke.duration_ms >= LONG_PRESS_MS {
            TouchGesture::LongPress
        } else if stroke.tap_count >= 2 {
            TouchGesture::DoubleTap
        } else {
            TouchGesture::Tap
        });
    }
    if distance < MIN_SWIPE_PX {
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
    Some(TouchGesture::Swipe(dir))
}

pub fn gesture_action(gesture: TouchGesture) -> Action {
    match gesture {
        TouchGesture::Tap => Action::Select,
        TouchGesture::DoubleTap => Action::Speak,
        TouchGesture::LongPress => Action::Back,
        TouchGesture::Swipe(dir) => dir.action(),
    }
}

impl Normalizer for TouchNormalizer {
    fn device_type(&self) -> DeviceType {
        DeviceType::Touch
    }

    fn handle_raw(&mut self, raw: &RawSignal, ts: u64) -> Result<Option<DeviceEvent>> {
        if let Some(ev) = lifecycle_event(&self.device_id, raw, ts) {
            return ev.map(Some);
        }
        let RawSignal::Touch(stroke) = raw else {
            return Err(unexpected(&self.device_id, DeviceType::Touch, raw));
        };
        let coords = [stroke.start_x, stroke.start_y, stroke.end_x, stroke.end_y];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(InputError::malformed(&self.device_id, "non-finite touch stroke"));
        }
        Ok(classify(stroke).map(|gesture| {
            DeviceEvent::new(
                self.device_id.clone(),
                EventPayload::Touch {
                    gesture,
                    action: gesture_action(gesture),
                },
                ts,
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke(dx: f32, dy: f32, duration_ms: u32, tap_count: u8) -> TouchStroke {
        TouchStroke {
            start_x: 100.0,
            start_y: 100.0,
            end_x: 100.0 + dx,
            end_y: 100.0 + dy,
            duration_ms,
            tap_count,
        }
    }

    #[test]
    fn taps() {
        assert_eq!(classify(&stroke(2.0, 1.0, 120, 1)), Some(TouchGesture::Tap));
        assert_eq!(classify(&stroke(0.0, 0.0, 120, 2)), Some(TouchGesture::DoubleTap));
        assert_eq!(classify(&stroke(3.0, 0.0, 900, 1)), Some(TouchGesture::LongPress));
    }

    #[test]
    fn swipes_and_ambiguous_strokes() {
        assert_eq!(
            classify(&stroke(-80.0, 10.0, 200, 1)),
            Some(TouchGesture::Swipe(Direction::Left))
        );
        assert_eq!(
            classify(&stroke(5.0, 60.0, 200, 1)),
            Some(TouchGesture::Swipe(Direction::Down))
        );
        assert_eq!(classify(&stroke(25.0, 0.0, 200, 1)), None);
    }

    #[test]
    fn gestures_map_to_actions() {
        let mut n = TouchNormalizer::new("pad");
        let ev = n
            .handle_raw(&RawSignal::Touch(stroke(100.0, 0.0, 150, 1)), 4)
            .unwrap()
            .unwrap();
        assert_eq!(
            ev.payload(),
            &EventPayload::Touch {
                gesture: TouchGesture::Swipe(Direction::Right),
                action: Action::Next
            }
        );
        assert_eq!(gesture_action(TouchGesture::LongPress), Action::Back);
    }
}

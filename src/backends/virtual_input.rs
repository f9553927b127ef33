//! Scriptable input source.
//!
//! [`VirtualSource`] is an [`InputSource`] whose signals are injected through a
//! [`VirtualFeeder`]. The feeder is cloneable and stays usable after the source has been
//! moved into a poll task, so tests and demos can "press" switches from outside.

use crate::device::InputSource;
use crate::event::{Breath, RawSignal, TouchStroke};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

pub struct VirtualSource {
    id: String,
    name: String,
    queue: Arc<Mutex<VecDeque<RawSignal>>>,
}

/// Injection handle for a [`VirtualSource`].
#[derive(Clone)]
pub struct VirtualFeeder {
    queue: Arc<Mutex<VecDeque<RawSignal>>>,
}

impl VirtualSource {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn feeder(&self) -> VirtualFeeder {
        VirtualFeeder {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl VirtualFeeder {
    /// Inject a raw signal; it is delivered on the next poll.
    pub fn feed(&self, signal: RawSignal) {
        self.queue.lock().push_back(signal);
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn set_axis(&self, axis: u16, value: f32) {
        self.feed(RawSignal::AxisMoved { axis, value });
    }

    pub fn press_button(&self, button: u16) {
        self.feed(RawSignal::ButtonPressed { button });
    }

    pub fn release_button(&self, button: u16) {
        self.feed(RawSignal::ButtonReleased { button });
    }

    /// Press and release in the same frame.
    pub fn tap_button(&self, button: u16) {
        self.press_button(button);
        self.release_button(button);
    }

    pub fn key(&self, key: &str) {
        self.feed(RawSignal::KeyPressed { key: key.into() });
        self.feed(RawSignal::KeyReleased { key: key.into() });
    }

    pub fn point(&self, x: f32, y: f32) {
        self.feed(RawSignal::PointerMoved { x, y });
    }

    pub fn touch(&self, stroke: TouchStroke) {
        self.feed(RawSignal::Touch(stroke));
    }

    pub fn breath(&self, kind: Breath, strength: f32, duration_ms: u32) {
        self.feed(RawSignal::Breath {
            kind,
            strength,
            duration_ms,
        });
    }

    pub fn activation(&self, channel: u8, level: f32) {
        self.feed(RawSignal::Activation { channel, level });
    }
}

impl InputSource for VirtualSource {
    fn poll(&mut self) -> Vec<RawSignal> {
        self.queue.lock().drain(..).collect()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> &str {
        &self.id
    }
}

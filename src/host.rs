//! Collaborators outside the input layer.
//!
//! The engine never renders, speaks, or navigates on its own. Everything it needs from the
//! surrounding application goes through [`Host`], which is handed to the engine at
//! construction and passed down explicitly to the scan engine, dwell selector, and
//! dispatcher.
//!
//! [`PairingBackend`] is the matching seam toward the platform's device APIs.

use crate::device::Device;
use crate::error::{InputError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Opaque id of one focusable element in the host UI.
pub type TargetId = String;

/// Notifications about the scan loop that are not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanNotice {
    /// The active device went away mid-scan; the engine is Idle.
    Interrupted { device_id: String },
    /// `loop_count` traversals passed without a selection; the engine is Idle.
    Exhausted { cycles: u32 },
}

/// Non-visual cue the host may render as a sound or haptic pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackCue {
    ScanStep,
    Commit,
}

pub trait Host: Send {
    /// Scannable elements of the current screen, in scan order.
    fn focusable_targets(&mut self) -> Vec<TargetId>;
    /// Act as if the user tapped `target`.
    fn activate_target(&mut self, target: &str);
    fn target_at_point(&mut self, x: f32, y: f32) -> Option<TargetId>;

    fn navigate_back(&mut self);
    fn clear_composition(&mut self);
    fn speak_current_selection(&mut self);

    /// `progress` in `[0, 1]`.
    fn show_dwell_feedback(&mut self, target: &str, progress: f32);
    fn show_scan_highlight(&mut self, target: &str, on: bool);

    fn scan_notice(&mut self, _notice: ScanNotice) {}
    fn play_feedback(&mut self, _cue: FeedbackCue) {}

    fn show_calibration_point(&mut self, _index: usize, _x: f32, _y: f32) {}
    fn hide_calibration(&mut self) {}
}

/// Platform side of pairing: permission prompts, Bluetooth bonding, opening the HID handle.
///
/// Runs during `connect` while the device is `Pairing`, before the normalizer's own
/// handshake. An error lands the device in `Error`.
pub trait PairingBackend: Send {
    fn pair(&mut self, device: &Device) -> Result<()>;

    /// Called after a device disconnects or is unpaired.
    fn release(&mut self, _device_id: &str) {}
}

/// [`PairingBackend`] that accepts every device except an explicit deny list.
#[derive(Debug, Clone, Default)]
pub struct StaticPairing {
    denied: HashSet<String>,
}

impl StaticPairing {
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Refuse `device_id`, as if the user declined the permission prompt.
    pub fn deny(mut self, device_id: impl Into<String>) -> Self {
        self.denied.insert(device_id.into());
        self
    }
}

impl PairingBackend for StaticPairing {
    fn pair(&mut self, device: &Device) -> Result<()> {
        if self.denied.contains(&device.id) {
            return Err(InputError::PairingFailed {
                device_id: device.id.clone(),
                reason: "permission denied".into(),
            });
        }
        Ok(())
    }
}

/// One recorded call on a [`RecordingHost`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Activate(TargetId),
    NavigateBack,
    ClearComposition,
    Speak,
    DwellFeedback(TargetId, f32),
    Highlight(TargetId, bool),
    Notice(ScanNotice),
    Feedback(FeedbackCue),
    CalibrationPoint(usize, f32, f32),
    HideCalibration,
}

#[derive(Debug, Default)]
struct Recording {
    targets: Vec<TargetId>,
    regions: Vec<(TargetId, [f32; 4])>,
    calls: Vec<HostCall>,
}

/// [`Host`] that serves a fixed target list and hit regions and records every call.
///
/// Clones share state, so a caller can keep a handle after moving one into the engine.
/// Used by the demo and the test suites.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingHost {
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TargetId>,
    {
        let host = Self::default();
        host.set_targets(targets);
        host
    }

    pub fn set_targets<I, S>(&self, targets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<TargetId>,
    {
        self.inner.lock().targets = targets.into_iter().map(Into::into).collect();
    }

    /// Register a hit rectangle `(x, y, width, height)` for `target_at_point`.
    pub fn add_region(&self, target: impl Into<TargetId>, x: f32, y: f32, w: f32, h: f32) {
        self.inner.lock().regions.push((target.into(), [x, y, w, h]));
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    pub fn activations(&self) -> Vec<TargetId> {
        self.filter(|c| match c {
            HostCall::Activate(t) => Some(t.clone()),
            _ => None,
        })
    }

    pub fn notices(&self) -> Vec<ScanNotice> {
        self.filter(|c| match c {
            HostCall::Notice(n) => Some(n.clone()),
            _ => None,
        })
    }

    /// Number of highlight-on calls.
    pub fn highlight_count(&self) -> usize {
        self.filter(|c| matches!(c, HostCall::Highlight(_, true)).then_some(()))
            .len()
    }

    /// Target currently highlighted, replaying on/off calls in order.
    pub fn highlighted(&self) -> Option<TargetId> {
        let mut current = None;
        for call in self.inner.lock().calls.iter() {
            match call {
                HostCall::Highlight(t, true) => current = Some(t.clone()),
                HostCall::Highlight(t, false) if current.as_ref() == Some(t) => current = None,
                _ => {}
            }
        }
        current
    }

    pub fn dwell_feedback(&self) -> Vec<(TargetId, f32)> {
        self.filter(|c| match c {
            HostCall::DwellFeedback(t, p) => Some((t.clone(), *p)),
            _ => None,
        })
    }

    fn filter<T>(&self, f: impl Fn(&HostCall) -> Option<T>) -> Vec<T> {
        self.inner.lock().calls.iter().filter_map(f).collect()
    }

    fn push(&self, call: HostCall) {
        self.inner.lock().calls.push(call);
    }
}

impl Host for RecordingHost {
    fn focusable_targets(&mut self) -> Vec<TargetId> {
        self.inner.lock().targets.clone()
    }

    fn activate_target(&mut self, target: &str) {
        self.push(HostCall::Activate(target.to_string()));
    }

    fn target_at_point(&mut self, x: f32, y: f32) -> Option<TargetId> {
        self.inner
            .lock()
            .regions
            .iter()
            .find(|(_, [rx, ry, w, h])| x >= *rx && x < rx + w && y >= *ry && y < ry + h)
            .map(|(id, _)| id.clone())
    }

    fn navigate_back(&mut self) {
        self.push(HostCall::NavigateBack);
    }

    fn clear_composition(&mut self) {
        self.push(HostCall::ClearComposition);
    }

    fn speak_current_selection(&mut self) {
        self.push(HostCall::Speak);
    }

    fn show_dwell_feedback(&mut self, target: &str, progress: f32) {
        self.push(HostCall::DwellFeedback(target.to_string(), progress));
    }

    fn show_scan_highlight(&mut self, target: &str, on: bool) {
        self.push(HostCall::Highlight(target.to_string(), on));
    }

    fn scan_notice(&mut self, notice: ScanNotice) {
        self.push(HostCall::Notice(notice));
    }

    fn play_feedback(&mut self, cue: FeedbackCue) {
        self.push(HostCall::Feedback(cue));
    }

    fn show_calibration_point(&mut self, index: usize, x: f32, y: f32) {
        self.push(HostCall::CalibrationPoint(index, x, y));
    }

    fn hide_calibration(&mut self) {
        self.push(HostCall::HideCalibration);
    }
}

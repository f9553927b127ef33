//! Type-specific device settings.
//!
//! [`DeviceSettings`] is a sum type: each variant carries the payload for one family of
//! devices, and [`DeviceSettings::matches`] ties a variant to the [`DeviceType`]s allowed to
//! carry it. Head mice share the eye-tracker payload (dwell, smoothing, calibration).
//!
//! Partial updates go through [`SettingsPatch`]; [`DeviceSettings::apply`] produces a new,
//! validated value and leaves the original untouched on error.

use crate::binding::{validate_joystick_buttons, validate_switch_bindings};
use crate::device::DeviceType;
use crate::error::{InputError, Result};
use crate::event::Action;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchBinding {
    pub id: String,
    pub action: Action,
    #[serde(default)]
    pub key_binding: Option<String>,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

impl SwitchBinding {
    pub fn new(id: impl Into<String>, action: Action) -> Self {
        Self {
            id: id.into(),
            action,
            key_binding: None,
            enabled: true,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key_binding = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScanMode {
    /// Highlight advances on a timer.
    #[default]
    Automatic,
    /// Highlight moves only on Next/Previous.
    Step,
    /// Highlight advances while the select switch is held; release commits.
    Inverse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanSettings {
    pub mode: ScanMode,
    pub scan_speed_ms: u32,
    /// Full traversals before the engine gives up. `0` scans forever.
    pub loop_count: u32,
    /// Hold time of the first highlight. `0` uses `scan_speed_ms`.
    pub first_delay_ms: u32,
    pub sound_feedback: bool,
    pub visual_feedback: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            mode: ScanMode::Automatic,
            scan_speed_ms: 1000,
            loop_count: 3,
            first_delay_ms: 0,
            sound_feedback: true,
            visual_feedback: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchSettings {
    /// Ordered; a button-index switch maps to the binding at that position.
    pub bindings: Vec<SwitchBinding>,
    #[serde(default)]
    pub scan_settings: ScanSettings,
}

impl Default for SwitchSettings {
    fn default() -> Self {
        Self {
            bindings: vec![
                SwitchBinding::new("switch-1", Action::Select).with_key("Space"),
                SwitchBinding::new("switch-2", Action::Next).with_key("Enter"),
            ],
            scan_settings: ScanSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DwellSettings {
    pub dwell_time_ms: u32,
    pub dwell_radius_px: f32,
    pub show_feedback: bool,
}

impl Default for DwellSettings {
    fn default() -> Self {
        Self {
            dwell_time_ms: 1000,
            dwell_radius_px: 50.0,
            show_feedback: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationPoint {
    pub x: f32,
    pub y: f32,
    pub sample_count: u32,
    /// `[0, 1]`, 1 = samples landed on the target.
    pub accuracy: f32,
}

/// Committed calibration result. Replaced only as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Calibration {
    pub points: Vec<CalibrationPoint>,
    pub aggregate_accuracy: f32,
    pub last_calibrated_at: Option<u64>,
}

impl Calibration {
    pub fn is_calibrated(&self) -> bool {
        self.last_calibrated_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EyeTrackerSettings {
    #[serde(default)]
    pub dwell_settings: DwellSettings,
    /// Exponential smoothing weight of the previous point, `[0, 1)`.
    #[serde(default = "default_smoothing")]
    pub gaze_smoothing_factor: f32,
    #[serde(default)]
    pub calibration: Calibration,
}

fn default_smoothing() -> f32 {
    0.5
}

fn enabled() -> bool {
    true
}

impl Default for EyeTrackerSettings {
    fn default() -> Self {
        Self {
            dwell_settings: DwellSettings::default(),
            gaze_smoothing_factor: default_smoothing(),
            calibration: Calibration::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSettings {
    pub min: f32,
    pub max: f32,
    /// Fraction of the normalized range treated as centered.
    pub deadzone: f32,
}

impl Default for AxisSettings {
    fn default() -> Self {
        Self {
            min: -1.0,
            max: 1.0,
            deadzone: 0.2,
        }
    }
}

impl AxisSettings {
    /// Map a raw reading into `[-1, 1]`. Deadzone is not applied here.
    pub fn normalize(&self, raw: f32) -> f32 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.0;
        }
        let unit = (raw - self.min) / span;
        (unit * 2.0 - 1.0).clamp(-1.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoystickButtonBinding {
    pub button_id: String,
    pub action: Action,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

impl JoystickButtonBinding {
    pub fn new(button_id: impl Into<String>, action: Action) -> Self {
        Self {
            button_id: button_id.into(),
            action,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoystickSettings {
    #[serde(default)]
    pub x_axis: AxisSettings,
    #[serde(default)]
    pub y_axis: AxisSettings,
    pub sensitivity: f32,
    #[serde(default)]
    pub buttons: Vec<JoystickButtonBinding>,
}

impl Default for JoystickSettings {
    fn default() -> Self {
        Self {
            x_axis: AxisSettings::default(),
            y_axis: AxisSettings::default(),
            sensitivity: 1.0,
            buttons: vec![
                JoystickButtonBinding::new("0", Action::Select),
                JoystickButtonBinding::new("1", Action::Back),
            ],
        }
    }
}

/// Settings payload attached to a [`Device`](crate::device::Device).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceSettings {
    Switch(SwitchSettings),
    /// Eye trackers and head mice.
    EyeTracker(EyeTrackerSettings),
    Joystick(JoystickSettings),
    /// Device types whose thresholds are fixed policy (touch, sip/puff, bioelectric).
    None,
}

impl DeviceSettings {
    pub fn default_for(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::Switch => Self::Switch(SwitchSettings::default()),
            DeviceType::EyeTracker | DeviceType::HeadMouse => {
                Self::EyeTracker(EyeTrackerSettings::default())
            }
            DeviceType::Joystick => Self::Joystick(JoystickSettings::default()),
            DeviceType::Touch | DeviceType::SipPuff | DeviceType::Brainwave | DeviceType::Emg => {
                Self::None
            }
        }
    }

    pub fn matches(&self, device_type: DeviceType) -> bool {
        match self {
            Self::Switch(_) => device_type == DeviceType::Switch,
            Self::EyeTracker(_) => device_type.is_pointing(),
            Self::Joystick(_) => device_type == DeviceType::Joystick,
            Self::None => !matches!(
                device_type,
                DeviceType::Switch
                    | DeviceType::EyeTracker
                    | DeviceType::HeadMouse
                    | DeviceType::Joystick
            ),
        }
    }

    pub fn as_switch(&self) -> Option<&SwitchSettings> {
        match self {
            Self::Switch(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_eye_tracker(&self) -> Option<&EyeTrackerSettings> {
        match self {
            Self::EyeTracker(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_joystick(&self) -> Option<&JoystickSettings> {
        match self {
            Self::Joystick(s) => Some(s),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Switch(s) => {
                validate_switch_bindings(&s.bindings)?;
                if s.scan_settings.scan_speed_ms == 0 {
                    return Err(InputError::invalid_config("scanSpeedMs must be positive"));
                }
            }
            Self::EyeTracker(s) => {
                if !(0.0..1.0).contains(&s.gaze_smoothing_factor) {
                    return Err(InputError::invalid_config(format!(
                        "gazeSmoothingFactor {} outside [0, 1)",
                        s.gaze_smoothing_factor
                    )));
                }
                if s.dwell_settings.dwell_time_ms == 0 {
                    return Err(InputError::invalid_config("dwellTimeMs must be positive"));
                }
                if !(s.dwell_settings.dwell_radius_px >= 0.0) {
                    return Err(InputError::invalid_config("dwellRadiusPx must be >= 0"));
                }
            }
            Self::Joystick(s) => {
                for (name, axis) in [("x", &s.x_axis), ("y", &s.y_axis)] {
                    if !(axis.min < axis.max) {
                        return Err(InputError::invalid_config(format!(
                            "{name} axis min must be below max"
                        )));
                    }
                    if !(0.0..1.0).contains(&axis.deadzone) {
                        return Err(InputError::invalid_config(format!(
                            "{name} axis deadzone {} outside [0, 1)",
                            axis.deadzone
                        )));
                    }
                }
                if !(s.sensitivity > 0.0) || !s.sensitivity.is_finite() {
                    return Err(InputError::invalid_config("sensitivity must be positive"));
                }
                validate_joystick_buttons(&s.buttons)?;
            }
            Self::None => {}
        }
        Ok(())
    }

    /// Return a copy with `patch` merged in, validated.
    pub fn apply(&self, patch: &SettingsPatch) -> Result<DeviceSettings> {
        let mut next = self.clone();
        match (&mut next, patch) {
            (Self::Switch(s), SettingsPatch::Switch(p)) => {
                if let Some(bindings) = &p.bindings {
                    s.bindings = bindings.clone();
                }
                if let Some(scan) = &p.scan_settings {
                    scan.merge_into(&mut s.scan_settings);
                }
            }
            (Self::EyeTracker(s), SettingsPatch::EyeTracker(p)) => {
                if let Some(v) = p.dwell_time_ms {
                    s.dwell_settings.dwell_time_ms = v;
                }
                if let Some(v) = p.dwell_radius_px {
                    s.dwell_settings.dwell_radius_px = v;
                }
                if let Some(v) = p.show_feedback {
                    s.dwell_settings.show_feedback = v;
                }
                if let Some(v) = p.gaze_smoothing_factor {
                    s.gaze_smoothing_factor = v;
                }
            }
            (Self::Joystick(s), SettingsPatch::Joystick(p)) => {
                if let Some(v) = p.x_axis {
                    s.x_axis = v;
                }
                if let Some(v) = p.y_axis {
                    s.y_axis = v;
                }
                if let Some(v) = p.sensitivity {
                    s.sensitivity = v;
                }
                if let Some(v) = &p.buttons {
                    s.buttons = v.clone();
                }
            }
            (current, patch) => {
                return Err(InputError::invalid_config(format!(
                    "{} patch does not apply to {} settings",
                    patch.family(),
                    current.family()
                )));
            }
        }
        next.validate()?;
        Ok(next)
    }

    fn family(&self) -> &'static str {
        match self {
            Self::Switch(_) => "switch",
            Self::EyeTracker(_) => "eye-tracker",
            Self::Joystick(_) => "joystick",
            Self::None => "empty",
        }
    }
}

/// Partial settings update. Absent fields keep their current value.
///
/// Calibration is deliberately not patchable; it is replaced only by a completed
/// calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingsPatch {
    Switch(SwitchPatch),
    EyeTracker(EyeTrackerPatch),
    Joystick(JoystickPatch),
}

impl SettingsPatch {
    fn family(&self) -> &'static str {
        match self {
            Self::Switch(_) => "switch",
            Self::EyeTracker(_) => "eye-tracker",
            Self::Joystick(_) => "joystick",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SwitchPatch {
    pub bindings: Option<Vec<SwitchBinding>>,
    pub scan_settings: Option<ScanSettingsPatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanSettingsPatch {
    pub mode: Option<ScanMode>,
    pub scan_speed_ms: Option<u32>,
    pub loop_count: Option<u32>,
    pub first_delay_ms: Option<u32>,
    pub sound_feedback: Option<bool>,
    pub visual_feedback: Option<bool>,
}

impl ScanSettingsPatch {
    fn merge_into(&self, s: &mut ScanSettings) {
        if let Some(v) = self.mode {
            s.mode = v;
        }
        if let Some(v) = self.scan_speed_ms {
            s.scan_speed_ms = v;
        }
        if let Some(v) = self.loop_count {
            s.loop_count = v;
        }
        if let Some(v) = self.first_delay_ms {
            s.first_delay_ms = v;
        }
        if let Some(v) = self.sound_feedback {
            s.sound_feedback = v;
        }
        if let Some(v) = self.visual_feedback {
            s.visual_feedback = v;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EyeTrackerPatch {
    pub dwell_time_ms: Option<u32>,
    pub dwell_radius_px: Option<f32>,
    pub show_feedback: Option<bool>,
    pub gaze_smoothing_factor: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct JoystickPatch {
    pub x_axis: Option<AxisSettings>,
    pub y_axis: Option<AxisSettings>,
    pub sensitivity: Option<f32>,
    pub buttons: Option<Vec<JoystickButtonBinding>>,
}

//! Error types for the input layer.
//!
//! Every fallible operation returns [`Result<T>`] with an [`InputError`]. Two kinds are
//! *warnings* rather than failures and never come back as the `Err` of the call that
//! produced them:
//! - [`InputError::CalibrationLowAccuracy`] rides inside a successful calibration outcome.
//! - [`InputError::Persistence`] is collected by the registry after its single retry
//!   (see [`DeviceRegistry::take_warnings`](crate::registry::DeviceRegistry::take_warnings)).

use crate::device::DeviceType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    /// No device with this id is known to the registry.
    #[error("device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    /// Handshake or permission failure. Recoverable: the user may retry.
    #[error("pairing failed for {device_id}: {reason}")]
    PairingFailed { device_id: String, reason: String },

    #[error("unsupported device type: {device_type:?}")]
    UnsupportedDeviceType { device_type: DeviceType },

    /// The operation needs a connected device.
    #[error("device {device_id} is not connected")]
    DeviceNotConnected { device_id: String },

    /// Cancelled or timed-out calibration. The previous calibration is retained.
    #[error("calibration aborted: {reason}")]
    CalibrationAborted { reason: String },

    /// Calibration completed and was committed, but scored below the threshold.
    #[error("calibration accuracy {aggregate:.2} is below {threshold:.2}")]
    CalibrationLowAccuracy { aggregate: f32, threshold: f32 },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The active device went away mid-scan; the scan engine is back to Idle.
    #[error("scan interrupted: {device_id} disconnected")]
    ScanInterrupted { device_id: String },

    /// A raw signal or event that cannot be interpreted. Dropped, never propagated past the engine.
    #[error("malformed signal from {device_id}: {message}")]
    MalformedSignal { device_id: String, message: String },

    #[error("persistence failed: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// The runtime loop has shut down.
    #[error("input engine is no longer running")]
    EngineClosed,
}

pub type Result<T> = std::result::Result<T, InputError>;

impl InputError {
    pub fn not_found(device_id: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            device_id: device_id.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub fn malformed(device_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedSignal {
            device_id: device_id.into(),
            message: message.into(),
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::CalibrationAborted {
            reason: reason.into(),
        }
    }

    /// Wrap an io/serde failure from a store.
    pub fn persistence(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Persistence {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// `true` for kinds that are surfaced as warnings instead of failures.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::CalibrationLowAccuracy { .. } | Self::Persistence { .. }
        )
    }
}

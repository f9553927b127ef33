//! Alternative-access input layer for assistive communication.
//!
//! Turns signals from switches, eye trackers, head mice, joysticks, touch surfaces,
//! sip/puff sensors, and bioelectric interfaces into a small set of canonical
//! [`Action`]s, and drives the two selection strategies built on them:
//!
//! - **Switch scanning** ([`scan`]): a highlight walks the host's focusable targets on a
//!   timer (or on demand) and a switch press commits it.
//! - **Dwell selection** ([`dwell`]): a smoothed gaze or head-mouse point that rests on
//!   a target long enough commits it.
//!
//! The core is [`InputEngine`], a synchronous state machine that takes the current time
//! explicitly. [`spawn_engine`] wraps it in a tokio task that owns the scan and calibration
//! timers and serializes every input through one command queue.
//!
//! Device records are persisted through a [`DeviceStore`]; UI side effects go through the
//! [`Host`] trait; diagnostics subscribe through the [`eventbus`].

pub mod backends;
pub mod binding;
pub mod calibration;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod dwell;
pub mod engine;
pub mod error;
pub mod event;
pub mod eventbus;
pub mod host;
pub mod normalize;
pub mod registry;
pub mod runtime;
pub mod scan;
pub mod settings;
pub mod status;
pub mod store;

pub use device::*;
pub use event::*;
pub use settings::*;

pub use config::EngineConfig;
pub use dispatch::Dispatched;
pub use engine::{Handled, InputEngine};
pub use error::{InputError, Result};
pub use eventbus::{EventFilter, EventListener};
pub use host::{Host, PairingBackend, RecordingHost, StaticPairing, TargetId};
pub use registry::DeviceRegistry;
pub use runtime::{spawn_engine, EngineCommand, EngineHandle, SourceTask};
pub use scan::{ScanState, TimerPlan};
pub use status::{CalibrationStatus, DwellProgress, DwellSnapshot, ScanningStatus};
pub use store::{DeviceStore, JsonFileStore, MemoryStore};

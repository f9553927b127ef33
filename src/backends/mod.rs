//! Input backends.
//!
//! Implementations of [`InputSource`](crate::device::InputSource) for concrete signal
//! sources, plus platform discovery.
//!
//! # Feature flags
//! - **`hid`**: enables the hidapi backend ([`hid::HidSwitchSource`],
//!   [`hid::discover_hid_devices`]). Off by default because hidapi links against
//!   platform HID libraries.
//!
//! [`VirtualSource`] is always available and is what tests and the demo drive the engine
//! with.

pub mod report;
pub mod virtual_input;

#[cfg(feature = "hid")]
#[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
pub mod hid;

pub use report::ButtonReportDecoder;
pub use virtual_input::{VirtualFeeder, VirtualSource};

use crate::device::Device;

/// Unified discovery across enabled backends.
///
/// Returns fresh, disconnected [`Device`] records ready for
/// [`InputEngine::discover`](crate::engine::InputEngine::discover). Without the `hid`
/// feature this is always empty.
pub fn probe_devices() -> Vec<Device> {
    #[allow(unused_mut)]
    let mut out = Vec::new();

    #[cfg(feature = "hid")]
    {
        match hidapi::HidApi::new() {
            Ok(api) => out.extend(hid::discover_hid_devices(&api)),
            Err(e) => tracing::warn!("HID enumeration unavailable: {}", e),
        }
    }

    out
}

//! Read-only status snapshots.
//!
//! Everything here is an **owned** copy taken at query time. Holding one never blocks the
//! engine, and the engine never hands out references into its live scan/dwell/calibration
//! state.
//!
//! # Examples
//! ```
//! use switchscan::{DwellProgress, DwellSnapshot};
//!
//! let snap = DwellSnapshot(vec![DwellProgress {
//!     target: "yes".into(),
//!     started_ms: 0,
//!     progress: 0.4,
//! }]);
//! assert_eq!(snap.get("yes").map(|p| p.progress), Some(0.4));
//! ```

use crate::host::TargetId;
use crate::scan::ScanState;
use crate::settings::{Calibration, ScanMode};
use serde::{Deserialize, Serialize};

/// Progress of the scan loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanningStatus {
    pub state: ScanState,
    pub mode: ScanMode,
    pub highlighted: Option<TargetId>,
    pub target_count: usize,
    /// Completed traversals since the scan (re)started or the user last moved it.
    pub cycles: u32,
    /// Active device driving the scan, if any.
    pub device_id: Option<String>,
}

/// One target's dwell timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DwellProgress {
    pub target: TargetId,
    pub started_ms: u64,
    /// `[0, 1]`
    pub progress: f32,
}

/// Copy of the dwell map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DwellSnapshot(pub Vec<DwellProgress>);

impl DwellSnapshot {
    #[inline]
    pub fn get(&self, target: &str) -> Option<&DwellProgress> {
        self.0.iter().find(|p| p.target == target)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &DwellProgress> {
        self.0.iter()
    }
}

/// Calibration state of one device, plus progress of a run in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStatus {
    pub device_id: String,
    /// Last committed result. Untouched while a run is in progress.
    pub committed: Calibration,
    pub in_progress: Option<CalibrationProgress>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProgress {
    /// Index of the point currently shown, `0..total_points`.
    pub point_index: usize,
    pub total_points: usize,
    /// Accepted samples for the current point.
    pub samples: u32,
}

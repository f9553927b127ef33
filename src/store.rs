//! Durable device catalog.
//!
//! Records are opaque JSON keyed by device id. [`JsonFileStore`] keeps the whole catalog in
//! one file and replaces it atomically (write to a sibling temp file, then rename), so a
//! crash mid-write leaves the previous catalog intact.

use crate::device::Device;
use crate::error::{InputError, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub trait DeviceStore: Send {
    fn persist_device_record(&mut self, device: &Device) -> Result<()>;
    fn remove_device_record(&mut self, device_id: &str) -> Result<()>;
    fn load_persisted_devices(&self) -> Result<Vec<Device>>;
}

/// Catalog stored as a single JSON object `{ "<device id>": <device record>, ... }`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_catalog(&self) -> Result<BTreeMap<String, Device>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(InputError::persistence(
                    format!("reading {}", self.path.display()),
                    e,
                ))
            }
        };
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&text)
            .map_err(|e| InputError::persistence(format!("parsing {}", self.path.display()), e))
    }

    fn write_catalog(&self, catalog: &BTreeMap<String, Device>) -> Result<()> {
        let json = serde_json::to_vec_pretty(catalog)
            .map_err(|e| InputError::persistence("encoding device catalog", e))?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                InputError::persistence(format!("creating {}", dir.display()), e)
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let write = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            std::fs::rename(&tmp, &self.path)
        };
        write().map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            InputError::persistence(format!("writing {}", self.path.display()), e)
        })
    }
}

impl DeviceStore for JsonFileStore {
    fn persist_device_record(&mut self, device: &Device) -> Result<()> {
        let mut catalog = self.read_catalog()?;
        catalog.insert(device.id.clone(), device.clone());
        self.write_catalog(&catalog)
    }

    fn remove_device_record(&mut self, device_id: &str) -> Result<()> {
        let mut catalog = self.read_catalog()?;
        if catalog.remove(device_id).is_some() {
            self.write_catalog(&catalog)?;
        }
        Ok(())
    }

    fn load_persisted_devices(&self) -> Result<Vec<Device>> {
        Ok(self.read_catalog()?.into_values().collect())
    }
}

/// In-process store. Clones share the same catalog, so a test can keep a handle while the
/// registry owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: BTreeMap<String, Device>,
    failures_left: u32,
    writes: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail.
    pub fn fail_next_writes(&self, n: u32) {
        self.inner.lock().failures_left = n;
    }

    pub fn record(&self, device_id: &str) -> Option<Device> {
        self.inner.lock().records.get(device_id).cloned()
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> u32 {
        self.inner.lock().writes
    }
}

impl DeviceStore for MemoryStore {
    fn persist_device_record(&mut self, device: &Device) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.failures_left > 0 {
            inner.failures_left -= 1;
            return Err(InputError::Persistence {
                message: format!("simulated write failure for {}", device.id),
                source: None,
            });
        }
        inner.records.insert(device.id.clone(), device.clone());
        inner.writes += 1;
        Ok(())
    }

    fn remove_device_record(&mut self, device_id: &str) -> Result<()> {
        self.inner.lock().records.remove(device_id);
        Ok(())
    }

    fn load_persisted_devices(&self) -> Result<Vec<Device>> {
        Ok(self.inner.lock().records.values().cloned().collect())
    }
}

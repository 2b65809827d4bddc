//! Local persisted state.
//!
//! `MeasurementStore` is the durable per-user store for the shoulder
//! width (survives runs); `SessionCache` holds state scoped to a single
//! run, currently the fetched marker coordinates.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::overlay::MarkerSet;

/// Durable measurement storage backed by a JSON file.
pub struct MeasurementStore {
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredMeasurements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shoulder_width: Option<f64>,
}

impl MeasurementStore {
    /// Open the store at the default platform data location.
    pub fn open_default() -> Result<Self, StorageError> {
        let mut path = dirs::data_dir().ok_or(StorageError::NoDataDir)?;
        path.push("posture-calibrator");
        path.push("measurements.json");
        Ok(Self { path })
    }

    /// Open a store at an explicit path.
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read the stored shoulder width, if any.
    pub fn shoulder_width(&self) -> Result<Option<f64>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path).map_err(StorageError::Io)?;
        let stored: StoredMeasurements =
            serde_json::from_str(&contents).map_err(StorageError::Format)?;
        Ok(stored.shoulder_width)
    }

    /// Persist a shoulder width.
    pub fn save_shoulder_width(&self, width: f64) -> Result<(), StorageError> {
        self.write(StoredMeasurements {
            shoulder_width: Some(width),
        })
    }

    /// Remove any stored measurement.
    pub fn clear(&self) -> Result<(), StorageError> {
        if self.path.exists() {
            self.write(StoredMeasurements::default())?;
        }
        Ok(())
    }

    fn write(&self, stored: StoredMeasurements) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }
        let contents = serde_json::to_string_pretty(&stored).map_err(StorageError::Format)?;
        fs::write(&self.path, contents).map_err(StorageError::Io)?;
        Ok(())
    }
}

/// Per-run cache. Markers are fetched from the backend at most once per
/// run and reused by every capture loop afterwards.
#[derive(Debug, Default)]
pub struct SessionCache {
    markers: Option<MarkerSet>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached markers, if any were stored this run.
    pub fn markers(&self) -> Option<&MarkerSet> {
        self.markers.as_ref()
    }

    /// Cache the markers for the rest of the run.
    pub fn store_markers(&mut self, markers: MarkerSet) {
        self.markers = Some(markers);
    }
}

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no platform data directory available")]
    NoDataDir,
    #[error("storage I/O failed: {0}")]
    Io(#[source] std::io::Error),
    #[error("invalid storage contents: {0}")]
    Format(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> MeasurementStore {
        MeasurementStore::with_path(dir.path().join("measurements.json"))
    }

    #[test]
    fn missing_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.shoulder_width().unwrap(), None);
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save_shoulder_width(42.5).unwrap();
        assert_eq!(store.shoulder_width().unwrap(), Some(42.5));
    }

    #[test]
    fn clear_removes_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save_shoulder_width(38.0).unwrap();
        store.clear().unwrap();
        assert_eq!(store.shoulder_width().unwrap(), None);
    }

    #[test]
    fn session_cache_stores_once_per_run() {
        let mut cache = SessionCache::new();
        assert!(cache.markers().is_none());

        let mut markers = MarkerSet::empty();
        markers.insert("Left Shoulder", 120.0, 80.0);
        cache.store_markers(markers.clone());
        assert_eq!(cache.markers(), Some(&markers));
    }
}

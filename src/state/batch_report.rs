//! Legacy batch report: enumerated Photos items grouped by creation minute.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use super::error::StateError;
use crate::remote::RemoteAsset;

/// Summary of one enumerated item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub filename: String,
    pub id: String,
    pub creation_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aperture: Option<f64>,
}

/// Minute bucket (`YYYY-MM-DD HH:MM`) -> items captured in that minute.
/// Purely additive; there is no dedup key beyond the bucket.
#[derive(Debug)]
pub struct BatchReport {
    path: PathBuf,
    batches: BTreeMap<String, Vec<BatchItem>>,
}

/// Truncate an RFC 3339 timestamp to its minute bucket.
pub fn minute_bucket(creation_time: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(creation_time)
        .ok()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
}

impl BatchReport {
    pub fn open(path: &Path) -> Result<Self, StateError> {
        let batches = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| StateError::io(path, e))?;
            serde_json::from_str(&contents).map_err(|e| StateError::Corrupt {
                path: path.to_path_buf(),
                source: e,
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            batches,
        })
    }

    /// Add an enumerated asset. Assets without a parseable creation time are
    /// ignored.
    pub fn add(&mut self, asset: &RemoteAsset) {
        let Some(creation_time) = asset.created_time.as_deref() else {
            return;
        };
        let Some(bucket) = minute_bucket(creation_time) else {
            tracing::warn!(id = %asset.id, "Unparseable creation time {:?} for batching", creation_time);
            return;
        };
        self.batches.entry(bucket).or_default().push(BatchItem {
            filename: asset.name.clone(),
            id: asset.id.clone(),
            creation_time: creation_time.to_string(),
            camera: asset.camera_model.clone(),
            aperture: asset.aperture,
        });
    }

    pub fn batches(&self) -> &BTreeMap<String, Vec<BatchItem>> {
        &self.batches
    }

    pub fn save(&self) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.batches)?;
        fs::write(&self.path, json).map_err(|e| StateError::io(&self.path, e))
    }
}

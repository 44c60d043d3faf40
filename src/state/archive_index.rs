//! Archives whose current content needs no further work.
//!
//! Keyed by remote file id. An archive is settled at a checksum once every
//! image entry in it is archived, logged as unmatched or left as a known
//! duplicate. A listing that reports the same checksum can then skip the
//! download altogether.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::StateError;
use super::store::part_path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledArchive {
    pub checksum: String,
    /// Entries still inside the remote copy that cleaning would remove.
    #[serde(default)]
    pub pending_removal: usize,
}

#[derive(Debug)]
pub struct ArchiveIndex {
    path: PathBuf,
    archives: BTreeMap<String, SettledArchive>,
}

impl ArchiveIndex {
    /// Load the index. A missing file is empty.
    pub fn open(path: &Path) -> Result<Self, StateError> {
        let archives = if path.exists() {
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
            archives,
        })
    }

    /// Whether the archive at `checksum` can be skipped. Archives that still
    /// hold removable entries are only skipped when no cleaning is asked for.
    pub fn is_settled(&self, file_id: &str, checksum: &str, clean_archives: bool) -> bool {
        self.archives.get(file_id).is_some_and(|settled| {
            settled.checksum == checksum && (settled.pending_removal == 0 || !clean_archives)
        })
    }

    /// Record the archive as settled. Returns whether anything changed.
    pub fn settle(&mut self, file_id: &str, checksum: &str, pending_removal: usize) -> bool {
        let settled = SettledArchive {
            checksum: checksum.to_string(),
            pending_removal,
        };
        if self.archives.get(file_id) == Some(&settled) {
            return false;
        }
        self.archives.insert(file_id.to_string(), settled);
        true
    }

    /// Drop any record for the archive. Returns whether one existed.
    pub fn forget(&mut self, file_id: &str) -> bool {
        self.archives.remove(file_id).is_some()
    }

    pub fn save(&self) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.archives)?;
        let part = part_path(&self.path);
        fs::write(&part, json).map_err(|e| StateError::io(&part, e))?;
        fs::rename(&part, &self.path).map_err(|e| StateError::io(&self.path, e))
    }
}

//! JSON-backed mapping store.
//!
//! The whole map is loaded at start, mutated in memory and rewritten on
//! every save. Writes go to a `.part` file that is renamed over the store,
//! so a crash mid-save leaves the previous version intact. The store is
//! single-writer: [`MappingStore::open`] takes an exclusive lock that is
//! held until the store is dropped.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use super::error::StateError;
use super::types::{MappingEntry, SourceDescriptor};

pub struct MappingStore {
    path: PathBuf,
    entries: BTreeMap<String, MappingEntry>,
    sources: HashSet<SourceDescriptor>,
    filenames: HashSet<String>,
    /// Held for the lifetime of the store; the advisory lock is released
    /// when the file is dropped.
    #[allow(dead_code)]
    lock_file: Option<fs::File>,
}

impl std::fmt::Debug for MappingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingStore")
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .field("locked", &self.lock_file.is_some())
            .finish()
    }
}

/// Lock file path for a store: `photo_mapping.json` -> `photo_mapping.json.lock`.
fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

pub(super) fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

impl MappingStore {
    /// Open the store for writing, creating parent directories as needed.
    ///
    /// Fails with [`StateError::Locked`] when another process holds the store.
    pub fn open(path: &Path) -> Result<Self, StateError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }

        let lock_path = lock_path(path);
        let lock_file = fs::File::create(&lock_path).map_err(|e| StateError::io(&lock_path, e))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StateError::Locked(lock_path.clone()))?;

        let mut store = Self::read(path)?;
        store.lock_file = Some(lock_file);
        Ok(store)
    }

    /// Load the store without taking the lock, for read-only commands.
    /// A missing file yields an empty store.
    pub fn read(path: &Path) -> Result<Self, StateError> {
        let entries: BTreeMap<String, MappingEntry> = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| StateError::io(path, e))?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| StateError::Corrupt {
                    path: path.to_path_buf(),
                    source: e,
                })?
            }
        } else {
            BTreeMap::new()
        };

        let mut store = Self {
            path: path.to_path_buf(),
            entries: BTreeMap::new(),
            sources: HashSet::new(),
            filenames: HashSet::new(),
            lock_file: None,
        };
        for (identifier, entry) in entries {
            if identifier.trim().is_empty() {
                tracing::warn!("Dropping mapping entry with an empty identifier");
                continue;
            }
            store.index(&entry);
            store.entries.insert(identifier, entry);
        }
        tracing::debug!(entries = store.entries.len(), path = %path.display(), "Loaded mapping store");
        Ok(store)
    }

    fn index(&mut self, entry: &MappingEntry) {
        self.sources.insert(entry.source.clone());
        self.filenames.insert(entry.filename.clone());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, identifier: &str) -> Option<&MappingEntry> {
        self.entries.get(identifier)
    }

    /// Whether an asset with this descriptor has already been processed.
    pub fn contains_source(&self, source: &SourceDescriptor) -> bool {
        self.sources.contains(source)
    }

    /// Whether any entry was recorded under this original file name.
    pub fn contains_filename(&self, filename: &str) -> bool {
        self.filenames.contains(filename)
    }

    /// Identifier of the entry whose local image is `path`, compared
    /// case-insensitively since the assets folder may live on a
    /// case-folding filesystem.
    pub fn image_owner(&self, path: &Path) -> Option<&str> {
        let wanted = path.to_string_lossy().to_lowercase();
        self.entries
            .iter()
            .find(|(_, entry)| {
                entry
                    .local_image_path
                    .as_ref()
                    .is_some_and(|p| p.to_string_lossy().to_lowercase() == wanted)
            })
            .map(|(id, _)| id.as_str())
    }

    /// Insert a new entry. Returns `false`, leaving the store unchanged, when
    /// the identifier is empty or already taken: the first match wins.
    pub fn try_insert(&mut self, identifier: &str, entry: MappingEntry) -> bool {
        if identifier.trim().is_empty() || self.entries.contains_key(identifier) {
            return false;
        }
        self.index(&entry);
        self.entries.insert(identifier.to_string(), entry);
        true
    }

    /// Entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MappingEntry)> {
        self.entries.iter()
    }

    pub fn get_mut(&mut self, identifier: &str) -> Option<&mut MappingEntry> {
        self.entries.get_mut(identifier)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Rewrite the whole store on disk.
    pub fn save(&self) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        let part = part_path(&self.path);
        fs::write(&part, json).map_err(|e| StateError::io(&part, e))?;
        fs::rename(&part, &self.path).map_err(|e| StateError::io(&self.path, e))?;
        tracing::debug!(entries = self.entries.len(), "Saved mapping store");
        Ok(())
    }
}

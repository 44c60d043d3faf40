//! Append-only log of assets that were scanned without a usable QR match.
//!
//! One line per asset: `filename | origin | reference`.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::error::StateError;

#[derive(Debug)]
pub struct FailureLog {
    path: PathBuf,
    references: HashSet<String>,
}

impl FailureLog {
    /// Load the references already present in the log. A missing file is empty.
    pub fn open(path: &Path) -> Result<Self, StateError> {
        let mut references = HashSet::new();
        if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| StateError::io(path, e))?;
            for line in contents.lines() {
                if let Some(reference) = parse_reference(line) {
                    references.insert(reference.to_string());
                }
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            references,
        })
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.references.contains(reference)
    }

    /// Append one line. Repeated references are written only once.
    pub fn record(&mut self, filename: &str, origin: &str, reference: &str) -> Result<(), StateError> {
        if self.references.contains(reference) {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StateError::io(&self.path, e))?;
        writeln!(file, "{} | {} | {}", filename, origin, reference)
            .map_err(|e| StateError::io(&self.path, e))?;
        self.references.insert(reference.to_string());
        Ok(())
    }
}

/// The reference is the last `|`-separated column.
fn parse_reference(line: &str) -> Option<&str> {
    let reference = line.rsplit('|').next()?.trim();
    if reference.is_empty() || !line.contains('|') {
        None
    } else {
        Some(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse_reference("a.jpg | Folder | abc123"), Some("abc123"));
        assert_eq!(parse_reference("no separators"), None);
        assert_eq!(parse_reference("a.jpg | Folder | "), None);
    }

    #[test]
    fn test_record_appends_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed_scans.txt");
        let mut log = FailureLog::open(&path).unwrap();
        log.record("a.jpg", "Inbox", "f1").unwrap();
        log.record("a.jpg", "Inbox", "f1").unwrap();
        log.record("b.jpg", "Inbox", "f2").unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "a.jpg | Inbox | f1\nb.jpg | Inbox | f2\n");

        let reloaded = FailureLog::open(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("f2"));
    }
}

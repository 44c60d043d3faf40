//! Types for the mapping store.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// Where a matched image came from.
///
/// Two entries with equal descriptors refer to the same physical image, so
/// the descriptor is the skip key used by the sync loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescriptor {
    /// A standalone remote file (Drive file id or Photos media item id).
    Remote { file_id: String },
    /// An entry inside a remote ZIP container.
    Archive {
        container: String,
        inner_path: String,
    },
}

impl SourceDescriptor {
    pub fn remote(file_id: impl Into<String>) -> Self {
        Self::Remote {
            file_id: file_id.into(),
        }
    }

    pub fn archive(container: impl Into<String>, inner_path: impl Into<String>) -> Self {
        Self::Archive {
            container: container.into(),
            inner_path: inner_path.into(),
        }
    }

    /// Short reference written to logs and the failure log.
    pub fn reference(&self) -> String {
        match self {
            Self::Remote { file_id } => file_id.clone(),
            Self::Archive {
                container,
                inner_path,
            } => format!("{}!{}", container, inner_path),
        }
    }
}

/// One matched specimen image.
///
/// Every optional field is independently absent until derived or healed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EntryRecord")]
pub struct MappingEntry {
    pub source: SourceDescriptor,
    /// Original file name; for archive entries, the entry's base name.
    pub filename: String,
    /// Folder or album the asset was found in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_image_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_crop_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_thumb_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_qr_ref: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<String>,
}

/// On-disk shape accepted when loading. Besides the current layout this
/// reads the older flat layout (`drive_id` / `source_zip`, `local_path`,
/// `thumb_path`, `qr_path`, `drive_thumb_id`, `drive_qr_id`, `timestamp`),
/// where absent values were written as `"Unknown"` or `""`.
#[derive(Deserialize)]
struct EntryRecord {
    #[serde(default)]
    source: Option<SourceDescriptor>,
    #[serde(default, deserialize_with = "known")]
    drive_id: Option<String>,
    #[serde(default, deserialize_with = "known")]
    source_zip: Option<String>,
    filename: String,
    #[serde(default, deserialize_with = "known")]
    origin: Option<String>,
    #[serde(default, alias = "local_path", deserialize_with = "known_path")]
    local_image_path: Option<PathBuf>,
    #[serde(default, alias = "thumb_path", deserialize_with = "known_path")]
    thumbnail_path: Option<PathBuf>,
    #[serde(default, alias = "qr_path", deserialize_with = "known_path")]
    qr_crop_path: Option<PathBuf>,
    #[serde(default, alias = "drive_thumb_id", deserialize_with = "known")]
    remote_thumb_ref: Option<String>,
    #[serde(default, alias = "drive_qr_id", deserialize_with = "known")]
    remote_qr_ref: Option<String>,
    #[serde(default, deserialize_with = "known")]
    camera: Option<String>,
    #[serde(default, deserialize_with = "known")]
    location: Option<String>,
    #[serde(default, deserialize_with = "known")]
    creator: Option<String>,
    #[serde(default, alias = "timestamp", deserialize_with = "known")]
    captured_at: Option<String>,
}

impl TryFrom<EntryRecord> for MappingEntry {
    type Error = String;

    fn try_from(record: EntryRecord) -> Result<Self, Self::Error> {
        let source = match (record.source, record.drive_id, record.source_zip) {
            (Some(source), _, _) => source,
            (None, Some(file_id), _) => SourceDescriptor::Remote { file_id },
            (None, None, Some(container)) => SourceDescriptor::Archive {
                container,
                inner_path: record.filename.clone(),
            },
            (None, None, None) => {
                return Err(format!("entry for {:?} has no source", record.filename))
            }
        };
        Ok(Self {
            source,
            filename: record.filename,
            origin: record.origin,
            local_image_path: record.local_image_path,
            thumbnail_path: record.thumbnail_path,
            qr_crop_path: record.qr_crop_path,
            remote_thumb_ref: record.remote_thumb_ref,
            remote_qr_ref: record.remote_qr_ref,
            camera: record.camera,
            location: record.location,
            creator: record.creator,
            captured_at: record.captured_at,
        })
    }
}

/// Map the legacy `"Unknown"` sentinel and empty strings to `None`.
fn known<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| {
        let v = v.trim();
        !v.is_empty() && !v.eq_ignore_ascii_case("unknown")
    }))
}

fn known_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(known(deserializer)?.map(PathBuf::from))
}

/// Which derived fields of an entry are still absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MissingFields {
    pub thumbnail: bool,
    pub qr_crop: bool,
    pub camera: bool,
    pub location: bool,
    pub captured_at: bool,
    pub creator: bool,
}

impl MissingFields {
    /// Whether any field derived from the local image is missing.
    pub fn needs_image(&self) -> bool {
        self.thumbnail || self.qr_crop || self.camera || self.location || self.captured_at
    }

    pub fn needs_metadata(&self) -> bool {
        self.camera || self.location || self.captured_at
    }

    pub fn is_empty(&self) -> bool {
        !self.needs_image() && !self.creator
    }
}

impl MappingEntry {
    pub fn new(source: SourceDescriptor, filename: impl Into<String>) -> Self {
        Self {
            source,
            filename: filename.into(),
            origin: None,
            local_image_path: None,
            thumbnail_path: None,
            qr_crop_path: None,
            remote_thumb_ref: None,
            remote_qr_ref: None,
            camera: None,
            location: None,
            creator: None,
            captured_at: None,
        }
    }

    pub fn missing(&self) -> MissingFields {
        MissingFields {
            thumbnail: self.thumbnail_path.is_none(),
            qr_crop: self.qr_crop_path.is_none(),
            camera: self.camera.is_none(),
            location: self.location.is_none(),
            captured_at: self.captured_at.is_none(),
            creator: self.creator.is_none(),
        }
    }

    /// Whether a generated preview still lacks a remote copy.
    pub fn pending_upload(&self) -> bool {
        (self.thumbnail_path.is_some() && self.remote_thumb_ref.is_none())
            || (self.qr_crop_path.is_some() && self.remote_qr_ref.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_reference() {
        assert_eq!(SourceDescriptor::remote("abc").reference(), "abc");
        assert_eq!(
            SourceDescriptor::archive("batch.zip", "scans/p1.jpg").reference(),
            "batch.zip!scans/p1.jpg"
        );
    }

    #[test]
    fn test_descriptor_serializes_tagged() {
        let json = serde_json::to_value(SourceDescriptor::archive("a.zip", "x.jpg")).unwrap();
        assert_eq!(json["kind"], "archive");
        assert_eq!(json["container"], "a.zip");
        assert_eq!(json["inner_path"], "x.jpg");
    }

    #[test]
    fn test_new_entry_is_missing_everything() {
        let entry = MappingEntry::new(SourceDescriptor::remote("f1"), "p.jpg");
        let missing = entry.missing();
        assert!(missing.thumbnail && missing.qr_crop && missing.creator);
        assert!(missing.needs_image());
        assert!(!missing.is_empty());
        assert!(!entry.pending_upload());
    }

    #[test]
    fn test_unknown_sentinel_loads_as_none() {
        let json = r#"{
            "source": {"kind": "remote", "file_id": "f1"},
            "filename": "p.jpg",
            "camera": "Unknown",
            "location": "",
            "creator": "Ada"
        }"#;
        let entry: MappingEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.camera, None);
        assert_eq!(entry.location, None);
        assert_eq!(entry.creator.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_legacy_flat_layout_loads() {
        let json = r#"{
            "filename": "IMG_1.jpg",
            "drive_id": "d1",
            "timestamp": "2024-01-01T10:00:00Z",
            "local_path": "assets/images/MPO-1.jpg",
            "thumb_path": null,
            "qr_path": "assets/thumbnails/MPO-1_qr.jpg",
            "drive_qr_id": "q1",
            "creator": "Unknown"
        }"#;
        let entry: MappingEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.source, SourceDescriptor::remote("d1"));
        assert_eq!(entry.local_image_path, Some(PathBuf::from("assets/images/MPO-1.jpg")));
        assert_eq!(entry.thumbnail_path, None);
        assert_eq!(entry.remote_qr_ref.as_deref(), Some("q1"));
        assert_eq!(entry.captured_at.as_deref(), Some("2024-01-01T10:00:00Z"));
        assert_eq!(entry.creator, None);

        let zipped = r#"{"filename": "p2.jpg", "source_zip": "batch.zip"}"#;
        let entry: MappingEntry = serde_json::from_str(zipped).unwrap();
        assert_eq!(entry.source, SourceDescriptor::archive("batch.zip", "p2.jpg"));
    }

    #[test]
    fn test_entry_without_source_is_rejected() {
        assert!(serde_json::from_str::<MappingEntry>(r#"{"filename": "x.jpg"}"#).is_err());
    }

    #[test]
    fn test_current_layout_round_trips() {
        let mut entry = MappingEntry::new(SourceDescriptor::archive("a.zip", "p.jpg"), "p.jpg");
        entry.camera = Some("Canon".into());
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(serde_json::from_str::<MappingEntry>(&json).unwrap(), entry);
    }

    #[test]
    fn test_absent_fields_are_not_serialized() {
        let entry = MappingEntry::new(SourceDescriptor::remote("f1"), "p.jpg");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("camera"));
        assert!(!json.contains("Unknown"));
    }

    #[test]
    fn test_pending_upload() {
        let mut entry = MappingEntry::new(SourceDescriptor::remote("f1"), "p.jpg");
        entry.thumbnail_path = Some(PathBuf::from("t.jpg"));
        assert!(entry.pending_upload());
        entry.remote_thumb_ref = Some("r1".into());
        assert!(!entry.pending_upload());
    }
}

//! Remote services: asset sources, the thumbnail upload destination and the
//! spreadsheet mirror.
//!
//! The sync loop only talks to the traits defined here, so tests drive it
//! with in-memory fakes.

pub mod client;
pub mod drive;
pub mod error;
pub mod photos;
pub mod sheets;
pub mod types;

use async_trait::async_trait;

pub use self::client::ApiClient;
pub use self::drive::{DriveClient, DriveThumbnailSink};
pub use self::error::RemoteError;
pub use self::photos::PhotosClient;
pub use self::sheets::SheetsClient;
use crate::state::SourceDescriptor;

/// A remote file or media item as enumerated from a target.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAsset {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// RFC 3339 creation time, when the service reports one.
    pub created_time: Option<String>,
    /// Display name of the owner or contributor.
    pub owner: Option<String>,
    /// Content checksum, when the service reports one (Drive `md5Checksum`).
    pub checksum: Option<String>,
    /// Direct content URL for sources that serve bytes outside the API.
    pub download_url: Option<String>,
    pub camera_model: Option<String>,
    pub aperture: Option<f64>,
}

impl RemoteAsset {
    pub fn is_archive(&self) -> bool {
        self.mime_type.contains("zip")
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// A folder or album to sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub id: String,
    /// Display name; recorded as the origin of matched entries.
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct AssetPage {
    pub assets: Vec<RemoteAsset>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Service name for logs.
    fn name(&self) -> &'static str;

    /// Turn the configured target list into concrete folders or albums.
    async fn resolve_targets(&self, requested: &[String]) -> Result<Vec<SyncTarget>, RemoteError>;

    async fn list_page(
        &self,
        target: &SyncTarget,
        page_token: Option<&str>,
    ) -> Result<AssetPage, RemoteError>;

    async fn fetch(&self, asset: &RemoteAsset) -> Result<Vec<u8>, RemoteError>;

    /// Overwrite the content of an archive in a single call.
    async fn replace_archive(&self, asset: &RemoteAsset, bytes: Vec<u8>)
        -> Result<(), RemoteError>;

    /// Display name of whoever owns the object an entry came from.
    async fn owner_of(&self, source: &SourceDescriptor) -> Result<Option<String>, RemoteError>;
}

/// Destination for generated previews.
#[async_trait]
pub trait ThumbnailSink: Send + Sync {
    /// Upload a JPEG, make it publicly readable and return its id.
    async fn upload_public(&self, name: &str, bytes: Vec<u8>) -> Result<String, RemoteError>;
}

/// A single sheet holding the archive summary, read and written whole.
#[async_trait]
pub trait SheetStore: Send + Sync {
    async fn read_rows(&self) -> Result<Vec<Vec<String>>, RemoteError>;
    async fn write_rows(&self, rows: &[Vec<String>]) -> Result<(), RemoteError>;
}

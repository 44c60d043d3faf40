//! Google Drive v3 client.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use tracing::{debug, info, warn};

use super::client::ApiClient;
use super::error::RemoteError;
use super::types::{DriveFile, FilesListResponse, NewFile, Permission};
use super::{AssetPage, AssetSource, RemoteAsset, SyncTarget, ThumbnailSink};
use crate::state::SourceDescriptor;

const SERVICE: &str = "Drive";
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const PAGE_SIZE: u32 = 100;
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,createdTime,md5Checksum,owners(displayName))";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const MULTIPART_BOUNDARY: &str = "codicum_sync_boundary";

#[derive(Debug, Clone)]
pub struct DriveClient {
    api: ApiClient,
}

/// Quote a value for a Drive `q` expression.
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Images and ZIP archives directly inside a folder, excluding trash.
pub fn folder_query(folder_id: &str) -> String {
    format!(
        "'{}' in parents and (mimeType contains 'image/' or mimeType contains 'zip') and trashed = false",
        escape_query_value(folder_id)
    )
}

/// Body of a `multipart/related` upload: JSON metadata then the content.
pub fn multipart_related(metadata: &[u8], content_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

impl DriveClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    async fn list(&self, query: &str, fields: &str, page_token: Option<&str>) -> Result<FilesListResponse, RemoteError> {
        let mut url = format!(
            "{}/files?q={}&pageSize={}&fields={}",
            DRIVE_API_BASE,
            urlencoding::encode(query),
            PAGE_SIZE,
            urlencoding::encode(fields)
        );
        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }
        self.api.json(SERVICE, self.api.get(&url)).await
    }

    async fn file_metadata(&self, file_id: &str, fields: &str) -> Result<DriveFile, RemoteError> {
        let url = format!(
            "{}/files/{}?fields={}",
            DRIVE_API_BASE,
            urlencoding::encode(file_id),
            urlencoding::encode(fields)
        );
        self.api.json(SERVICE, self.api.get(&url)).await
    }

    async fn share_publicly(&self, file_id: &str) -> Result<(), RemoteError> {
        let url = format!(
            "{}/files/{}/permissions",
            DRIVE_API_BASE,
            urlencoding::encode(file_id)
        );
        let body = Permission {
            kind: "anyone",
            role: "reader",
        };
        self.api
            .send(SERVICE, self.api.request(Method::POST, &url).json(&body))
            .await?;
        Ok(())
    }

    /// Find a folder by exact name, or create it and share it publicly.
    pub async fn ensure_folder(&self, name: &str) -> Result<String, RemoteError> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query_value(name),
            FOLDER_MIME
        );
        let found = self.list(&query, "files(id)", None).await?;
        if let Some(folder) = found.files.into_iter().find(|f| !f.id.is_empty()) {
            info!("Found thumbnail folder '{}' ({})", name, folder.id);
            return Ok(folder.id);
        }

        info!("Creating thumbnail folder '{}'", name);
        let url = format!("{}/files?fields=id", DRIVE_API_BASE);
        let body = NewFile {
            name,
            mime_type: Some(FOLDER_MIME),
            parents: Vec::new(),
        };
        let created: DriveFile = self
            .api
            .json(SERVICE, self.api.request(Method::POST, &url).json(&body))
            .await?;
        self.share_publicly(&created.id).await?;
        Ok(created.id)
    }

    /// Delete a file permanently, bypassing the trash.
    pub async fn delete_file(&self, file_id: &str) -> Result<(), RemoteError> {
        let url = format!("{}/files/{}", DRIVE_API_BASE, urlencoding::encode(file_id));
        self.api
            .send(SERVICE, self.api.request(Method::DELETE, &url))
            .await?;
        Ok(())
    }

    /// Create a file with content inside `folder_id` and return its id.
    pub async fn create_file(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<String, RemoteError> {
        let metadata = NewFile {
            name,
            mime_type: None,
            parents: vec![folder_id],
        };
        let metadata = serde_json::to_vec(&metadata).map_err(|e| RemoteError::Parse {
            service: SERVICE,
            message: e.to_string(),
        })?;
        let url = format!("{}/files?uploadType=multipart&fields=id", DRIVE_UPLOAD_BASE);
        let request = self
            .api
            .request(Method::POST, &url)
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(multipart_related(&metadata, mime_type, &content));
        let created: DriveFile = self.api.json(SERVICE, request).await?;
        Ok(created.id)
    }
}

fn to_asset(file: DriveFile) -> RemoteAsset {
    let owner = file.first_owner();
    RemoteAsset {
        id: file.id,
        name: file.name,
        mime_type: file.mime_type,
        created_time: file.created_time,
        owner,
        checksum: file.md5_checksum,
        download_url: None,
        camera_model: None,
        aperture: None,
    }
}

#[async_trait]
impl AssetSource for DriveClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn resolve_targets(&self, requested: &[String]) -> Result<Vec<SyncTarget>, RemoteError> {
        let mut targets = Vec::with_capacity(requested.len());
        for folder_id in requested {
            let name = match self.file_metadata(folder_id, "id,name").await {
                Ok(folder) if !folder.name.is_empty() => folder.name,
                Ok(_) => folder_id.clone(),
                Err(e) if e.is_authorization() => return Err(e),
                Err(e) => {
                    warn!("Could not look up folder {}: {}", folder_id, e);
                    folder_id.clone()
                }
            };
            targets.push(SyncTarget {
                id: folder_id.clone(),
                name,
            });
        }
        Ok(targets)
    }

    async fn list_page(
        &self,
        target: &SyncTarget,
        page_token: Option<&str>,
    ) -> Result<AssetPage, RemoteError> {
        let response = self
            .list(&folder_query(&target.id), LIST_FIELDS, page_token)
            .await?;
        debug!(folder = %target.id, files = response.files.len(), "Listed Drive page");
        Ok(AssetPage {
            assets: response.files.into_iter().map(to_asset).collect(),
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn fetch(&self, asset: &RemoteAsset) -> Result<Vec<u8>, RemoteError> {
        let url = format!(
            "{}/files/{}?alt=media",
            DRIVE_API_BASE,
            urlencoding::encode(&asset.id)
        );
        self.api.bytes(SERVICE, self.api.get(&url)).await
    }

    async fn replace_archive(&self, asset: &RemoteAsset, bytes: Vec<u8>) -> Result<(), RemoteError> {
        let url = format!(
            "{}/files/{}?uploadType=media",
            DRIVE_UPLOAD_BASE,
            urlencoding::encode(&asset.id)
        );
        let request = self
            .api
            .request(Method::PATCH, &url)
            .header(CONTENT_TYPE, "application/zip")
            .body(bytes);
        self.api.send(SERVICE, request).await?;
        Ok(())
    }

    async fn owner_of(&self, source: &SourceDescriptor) -> Result<Option<String>, RemoteError> {
        match source {
            SourceDescriptor::Remote { file_id } => Ok(self
                .file_metadata(file_id, "owners(displayName)")
                .await?
                .first_owner()),
            SourceDescriptor::Archive { container, .. } => {
                let query = format!("name = '{}' and trashed = false", escape_query_value(container));
                let found = self.list(&query, "files(owners(displayName))", None).await?;
                Ok(found.files.iter().find_map(DriveFile::first_owner))
            }
        }
    }
}

/// File operations a preview upload is made of.
#[async_trait]
pub trait DriveFiles: Send + Sync {
    async fn create_file(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<String, RemoteError>;
    async fn share_publicly(&self, file_id: &str) -> Result<(), RemoteError>;
    async fn delete_file(&self, file_id: &str) -> Result<(), RemoteError>;
}

#[async_trait]
impl DriveFiles for DriveClient {
    async fn create_file(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<String, RemoteError> {
        DriveClient::create_file(self, folder_id, name, mime_type, content).await
    }

    async fn share_publicly(&self, file_id: &str) -> Result<(), RemoteError> {
        DriveClient::share_publicly(self, file_id).await
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), RemoteError> {
        DriveClient::delete_file(self, file_id).await
    }
}

/// Uploads previews into one Drive folder.
#[derive(Debug, Clone)]
pub struct DriveThumbnailSink<F = DriveClient> {
    drive: F,
    folder_id: String,
}

impl<F: DriveFiles> DriveThumbnailSink<F> {
    pub fn new(drive: F, folder_id: impl Into<String>) -> Self {
        Self {
            drive,
            folder_id: folder_id.into(),
        }
    }
}

#[async_trait]
impl<F: DriveFiles> ThumbnailSink for DriveThumbnailSink<F> {
    /// A file that cannot be shared is deleted again, so a failed upload
    /// leaves nothing behind in the folder.
    async fn upload_public(&self, name: &str, bytes: Vec<u8>) -> Result<String, RemoteError> {
        let id = self
            .drive
            .create_file(&self.folder_id, name, "image/jpeg", bytes)
            .await?;
        if let Err(e) = self.drive.share_publicly(&id).await {
            if let Err(delete_err) = self.drive.delete_file(&id).await {
                warn!("Could not remove unshared upload {} ({}): {}", name, id, delete_err);
            }
            return Err(e);
        }
        debug!("Uploaded {} as {}", name, id);
        Ok(id)
    }
}

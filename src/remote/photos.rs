//! Google Photos Library v1 client (legacy source).

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, info, warn};

use super::client::ApiClient;
use super::error::RemoteError;
use super::types::{Album, AlbumsResponse, MediaItem, SearchRequest, SearchResponse};
use super::{AssetPage, AssetSource, RemoteAsset, SyncTarget};
use crate::state::SourceDescriptor;

const SERVICE: &str = "Photos";
const PHOTOS_API_BASE: &str = "https://photoslibrary.googleapis.com/v1";
const PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone)]
pub struct PhotosClient {
    api: ApiClient,
    /// Album title -> id pairs that bypass discovery.
    manual_albums: BTreeMap<String, String>,
}

/// URL serving the original bytes of a media item.
pub fn original_url(base_url: &str) -> String {
    format!("{}=d", base_url)
}

fn to_asset(item: MediaItem) -> RemoteAsset {
    let photo = item.media_metadata.photo.unwrap_or_default();
    RemoteAsset {
        id: item.id,
        name: item.filename,
        mime_type: item.mime_type,
        created_time: item.media_metadata.creation_time,
        owner: item
            .contributor_info
            .and_then(|c| c.display_name)
            .filter(|n| !n.trim().is_empty()),
        checksum: None,
        download_url: item.base_url.as_deref().map(original_url),
        camera_model: photo.camera_model,
        aperture: photo.aperture_f_number,
    }
}

/// Pick the requested titles out of the discovered albums. The first album
/// seen for a title wins.
fn match_titles(requested: &[String], discovered: &[Album]) -> BTreeMap<String, String> {
    let mut found = BTreeMap::new();
    for album in discovered {
        if requested.iter().any(|t| t == &album.title) && !found.contains_key(&album.title) {
            found.insert(album.title.clone(), album.id.clone());
        }
    }
    found
}

impl PhotosClient {
    pub fn new(api: ApiClient, manual_albums: BTreeMap<String, String>) -> Self {
        Self { api, manual_albums }
    }

    /// Every album in one listing (`albums` or `sharedAlbums`).
    async fn list_albums(&self, collection: &str) -> Result<Vec<Album>, RemoteError> {
        let mut albums = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = format!("{}/{}?pageSize={}", PHOTOS_API_BASE, collection, PAGE_SIZE);
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(&urlencoding::encode(token));
            }
            let response: AlbumsResponse = self.api.json(SERVICE, self.api.get(&url)).await?;
            albums.extend(response.albums);
            albums.extend(response.shared_albums);
            match response.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(albums)
    }
}

#[async_trait]
impl AssetSource for PhotosClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn resolve_targets(&self, requested: &[String]) -> Result<Vec<SyncTarget>, RemoteError> {
        let mut resolved: BTreeMap<String, String> = self
            .manual_albums
            .iter()
            .map(|(title, id)| (title.clone(), id.clone()))
            .collect();

        let to_discover: Vec<String> = requested
            .iter()
            .filter(|t| !resolved.contains_key(*t))
            .cloned()
            .collect();
        if !to_discover.is_empty() {
            let mut discovered = Vec::new();
            for collection in ["albums", "sharedAlbums"] {
                match self.list_albums(collection).await {
                    Ok(albums) => {
                        debug!("{} {} visible", albums.len(), collection);
                        discovered.extend(albums);
                    }
                    Err(e) => warn!("Could not list {}: {}", collection, e),
                }
            }
            for title in &to_discover {
                if !discovered.iter().any(|a| &a.title == title) {
                    warn!("No album titled '{}' was found", title);
                }
            }
            resolved.extend(match_titles(&to_discover, &discovered));
        }

        for (title, id) in &resolved {
            info!("Album '{}' -> {}", title, id);
        }
        Ok(resolved
            .into_iter()
            .map(|(name, id)| SyncTarget { id, name })
            .collect())
    }

    async fn list_page(
        &self,
        target: &SyncTarget,
        page_token: Option<&str>,
    ) -> Result<AssetPage, RemoteError> {
        let url = format!("{}/mediaItems:search", PHOTOS_API_BASE);
        let body = SearchRequest {
            album_id: &target.id,
            page_size: PAGE_SIZE,
            page_token,
        };
        let response: SearchResponse = self
            .api
            .json(SERVICE, self.api.request(Method::POST, &url).json(&body))
            .await?;
        Ok(AssetPage {
            assets: response.media_items.into_iter().map(to_asset).collect(),
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn fetch(&self, asset: &RemoteAsset) -> Result<Vec<u8>, RemoteError> {
        let url = asset.download_url.as_deref().ok_or_else(|| RemoteError::Parse {
            service: SERVICE,
            message: format!("media item {} has no baseUrl", asset.id),
        })?;
        self.api.bytes(SERVICE, self.api.get(url)).await
    }

    async fn replace_archive(&self, _asset: &RemoteAsset, _bytes: Vec<u8>) -> Result<(), RemoteError> {
        Err(RemoteError::Unsupported("Archive replacement"))
    }

    async fn owner_of(&self, source: &SourceDescriptor) -> Result<Option<String>, RemoteError> {
        let SourceDescriptor::Remote { file_id } = source else {
            return Ok(None);
        };
        let url = format!("{}/mediaItems/{}", PHOTOS_API_BASE, urlencoding::encode(file_id));
        let item: MediaItem = self.api.json(SERVICE, self.api.get(&url)).await?;
        Ok(to_asset(item).owner)
    }
}

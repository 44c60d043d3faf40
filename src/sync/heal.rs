//! Healing pass: fill derived fields that earlier runs left absent.
//!
//! Only absent fields are written, so a second pass over a healed store
//! changes nothing.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::{Orchestrator, SyncError};
use crate::remote::AssetSource;
use crate::scan::extract_metadata;
use crate::state::SourceDescriptor;

impl Orchestrator {
    /// Recompute missing previews and metadata from local images, and
    /// missing creators from the remote owner when a source is given.
    /// Returns the number of entries that changed.
    pub async fn heal(&mut self, source: Option<&dyn AssetSource>) -> Result<usize, SyncError> {
        let identifiers: Vec<String> = self
            .store
            .iter()
            .filter(|(_, entry)| !entry.missing().is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        if identifiers.is_empty() {
            return Ok(0);
        }
        info!("Healing {} incomplete entries", identifiers.len());

        // Archive owners are looked up once per container name.
        let mut container_owners: HashMap<String, Option<String>> = HashMap::new();
        let mut owner_lookups_allowed = source.is_some();
        let mut healed = 0;

        for identifier in &identifiers {
            let mut changed = self.heal_from_image(identifier);

            if owner_lookups_allowed {
                if let Some(source) = source {
                    match self.lookup_creator(source, identifier, &mut container_owners).await {
                        Ok(found) => changed |= found,
                        Err(e) if e.is_authorization() => {
                            warn!("Owner lookups not authorized, skipping creator healing: {}", e);
                            owner_lookups_allowed = false;
                        }
                        Err(e) => warn!(identifier, "Owner lookup failed: {}", e),
                    }
                }
            }

            if changed {
                healed += 1;
            }
        }

        if healed > 0 {
            self.store.save()?;
            info!("Healed {} entries", healed);
        }
        Ok(healed)
    }

    /// Regenerate missing previews and metadata from the local image.
    fn heal_from_image(&mut self, identifier: &str) -> bool {
        let Some(entry) = self.store.get(identifier) else {
            return false;
        };
        let missing = entry.missing();
        if !missing.needs_image() {
            return false;
        }
        let Some(path) = entry.local_image_path.clone() else {
            return false;
        };
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(identifier, "Local image {} unavailable: {}", path.display(), e);
                return false;
            }
        };

        // Only the absent previews are produced; present ones keep their files.
        let region = if missing.qr_crop {
            self.matcher.find(&bytes).map(|found| found.region)
        } else {
            None
        };
        let previews = self
            .thumbnails
            .generate_some(identifier, &bytes, missing.thumbnail, region);
        let metadata = missing.needs_metadata().then(|| extract_metadata(&bytes));

        let Some(entry) = self.store.get_mut(identifier) else {
            return false;
        };
        let before = entry.clone();
        if entry.thumbnail_path.is_none() {
            entry.thumbnail_path = previews.thumbnail;
        }
        if entry.qr_crop_path.is_none() {
            entry.qr_crop_path = previews.qr_crop;
        }
        if let Some(metadata) = metadata {
            if entry.camera.is_none() {
                entry.camera = metadata.camera;
            }
            if entry.location.is_none() {
                entry.location = metadata.location;
            }
            if entry.captured_at.is_none() {
                entry.captured_at = metadata.captured_at;
            }
        }
        *entry != before
    }

    async fn lookup_creator(
        &mut self,
        source: &dyn AssetSource,
        identifier: &str,
        container_owners: &mut HashMap<String, Option<String>>,
    ) -> Result<bool, SyncError> {
        let Some(entry) = self.store.get(identifier) else {
            return Ok(false);
        };
        if entry.creator.is_some() {
            return Ok(false);
        }

        let creator = match &entry.source {
            SourceDescriptor::Archive { container, .. } => {
                if let Some(cached) = container_owners.get(container) {
                    cached.clone()
                } else {
                    let container = container.clone();
                    let owner = source.owner_of(&entry.source).await?;
                    container_owners.insert(container, owner.clone());
                    owner
                }
            }
            SourceDescriptor::Remote { .. } => source.owner_of(&entry.source).await?,
        };

        match (creator, self.store.get_mut(identifier)) {
            (Some(creator), Some(entry)) => {
                debug!(identifier, "Creator: {}", creator);
                entry.creator = Some(creator);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

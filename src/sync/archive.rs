//! ZIP reconciliation.
//!
//! Every image entry of an archive is either already archived (dropped by
//! file name), newly matched (persisted with an `Archive` descriptor, then
//! dropped) or unmatched (kept). Directories and other files are kept as-is.
//! The archive is rebuilt in memory and verified before it may replace the
//! remote copy, and every match is saved locally before that happens.
//!
//! With an [`ArchiveIndex`](crate::state::ArchiveIndex), an archive listed at
//! a checksum it was already settled at is not downloaded again.

use std::collections::HashSet;
use std::io::{Cursor, Read};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use zip::result::ZipError;
use zip::{ZipArchive, ZipWriter};

use super::{Orchestrator, SyncError};
use crate::remote::{AssetSource, RemoteAsset, SyncTarget};
use crate::scan::paths::{base_name, is_image_name};
use crate::scan::QrMatch;
use crate::state::SourceDescriptor;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Zip(#[from] ZipError),

    #[error("Rewritten archive has {found} entries, expected {expected}")]
    Verify { expected: usize, found: usize },
}

/// What happens to an archive entry, for entries that are not simply kept.
enum Fate {
    /// Already archived under this file name or descriptor.
    Duplicate,
    /// Decoded a code; dropped once the match is persisted.
    Candidate {
        inner_path: String,
        found: QrMatch,
        bytes: Vec<u8>,
    },
}

struct Classified {
    fates: Vec<(usize, Fate)>,
    /// Entries whose outcome is not final yet, so the archive must be read
    /// again on the next run.
    unresolved: usize,
}

/// Copy an archive without the entries at `drop`. Kept entries are copied
/// raw, without recompression. The result is reopened to check that exactly
/// the kept entries survived.
pub fn rewrite_without(bytes: &[u8], drop: &HashSet<usize>) -> Result<Vec<u8>, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut kept = 0;
    for index in 0..archive.len() {
        if drop.contains(&index) {
            continue;
        }
        writer.raw_copy_file(archive.by_index_raw(index)?)?;
        kept += 1;
    }
    let rewritten = writer.finish()?.into_inner();

    let check = ZipArchive::new(Cursor::new(rewritten.as_slice()))?;
    if check.len() != kept {
        return Err(ArchiveError::Verify {
            expected: kept,
            found: check.len(),
        });
    }
    Ok(rewritten)
}

impl Orchestrator {
    pub(crate) async fn process_archive(
        &mut self,
        source: &dyn AssetSource,
        target: &SyncTarget,
        asset: &RemoteAsset,
    ) -> Result<(), SyncError> {
        if self.archive_is_settled(asset) {
            debug!("Skipping archive {} (unchanged since last run)", asset.name);
            self.stats.skipped += 1;
            return Ok(());
        }

        let bytes = match source.fetch(asset).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_authorization() => return Err(e.into()),
            Err(e) => {
                warn!("Failed to fetch archive {}: {}", asset.name, e);
                self.stats.failed += 1;
                return Ok(());
            }
        };
        self.stats.fetched += 1;
        info!(
            "Processing archive {} (uploaded by {})",
            asset.name,
            asset.owner.as_deref().unwrap_or("unknown")
        );

        let Classified {
            fates,
            mut unresolved,
        } = match self.classify_entries(&asset.name, &target.name, &bytes) {
            Ok(classified) => classified,
            Err(e) => {
                warn!("Cannot read archive {}: {}", asset.name, e);
                self.stats.failed += 1;
                return Ok(());
            }
        };

        let mut drop = HashSet::new();
        for (index, fate) in fates {
            match fate {
                Fate::Duplicate => {
                    drop.insert(index);
                }
                Fate::Candidate {
                    inner_path,
                    found,
                    bytes,
                } => {
                    let descriptor = SourceDescriptor::archive(&asset.name, &inner_path);
                    let reference = descriptor.reference();
                    let recorded = self
                        .record_match(
                            found,
                            descriptor,
                            base_name(&inner_path),
                            &target.name,
                            asset.owner.as_deref(),
                            &bytes,
                        )
                        .await?;
                    if recorded {
                        drop.insert(index);
                    } else if !self.failures.contains(&reference) {
                        // Not logged either: the image could not be saved.
                        unresolved += 1;
                    }
                }
            }
        }

        if unresolved > 0 {
            self.unsettle_archive(asset)?;
        }
        if drop.is_empty() {
            if unresolved == 0 {
                self.settle_archive(asset, 0)?;
            }
            return Ok(());
        }
        self.stats.archive_entries_dropped += drop.len();
        if !self.config.clean_archives {
            info!(
                "{} entries of {} are archived; pass --clean-archives to remove them remotely",
                drop.len(),
                asset.name
            );
            if unresolved == 0 {
                self.settle_archive(asset, drop.len())?;
            }
            return Ok(());
        }
        // The replaced archive gets a new checksum and is settled once it has
        // been read back clean.
        self.unsettle_archive(asset)?;

        let rewritten = match rewrite_without(&bytes, &drop) {
            Ok(rewritten) => rewritten,
            Err(e) => {
                error!("Not replacing {}: {}", asset.name, e);
                return Ok(());
            }
        };
        // Matches must be durable before their only remote copy goes away.
        self.store.save()?;
        info!(
            "Re-uploading {} without {} archived entries ({} -> {} bytes)",
            asset.name,
            drop.len(),
            bytes.len(),
            rewritten.len()
        );
        match source.replace_archive(asset, rewritten).await {
            Ok(()) => self.stats.archives_replaced += 1,
            Err(e) if e.is_authorization() => return Err(e.into()),
            Err(e) => error!("Failed to replace {}: {}", asset.name, e),
        }
        Ok(())
    }

    fn archive_is_settled(&self, asset: &RemoteAsset) -> bool {
        if self.config.rescan_unmatched {
            return false;
        }
        match (&self.archive_index, &asset.checksum) {
            (Some(index), Some(checksum)) => {
                index.is_settled(&asset.id, checksum, self.config.clean_archives)
            }
            _ => false,
        }
    }

    fn settle_archive(&mut self, asset: &RemoteAsset, pending_removal: usize) -> Result<(), SyncError> {
        if let (Some(index), Some(checksum)) = (self.archive_index.as_mut(), &asset.checksum) {
            if index.settle(&asset.id, checksum, pending_removal) {
                index.save()?;
            }
        }
        Ok(())
    }

    fn unsettle_archive(&mut self, asset: &RemoteAsset) -> Result<(), SyncError> {
        if let Some(index) = self.archive_index.as_mut() {
            if index.forget(&asset.id) {
                index.save()?;
            }
        }
        Ok(())
    }

    /// Decide the fate of every entry that is not simply kept.
    fn classify_entries(
        &mut self,
        container: &str,
        origin: &str,
        bytes: &[u8],
    ) -> Result<Classified, SyncError> {
        let mut archive = match ZipArchive::new(Cursor::new(bytes)) {
            Ok(archive) => archive,
            Err(e) => {
                warn!("{} is not a readable ZIP archive: {}", container, e);
                return Ok(Classified {
                    fates: Vec::new(),
                    unresolved: 1,
                });
            }
        };

        let mut fates = Vec::new();
        let mut unresolved = 0;
        let mut seen_names = HashSet::new();
        for index in 0..archive.len() {
            let mut file = match archive.by_index(index) {
                Ok(file) => file,
                Err(e) => {
                    warn!("Keeping unreadable entry #{} of {}: {}", index, container, e);
                    unresolved += 1;
                    continue;
                }
            };
            let inner_path = file.name().to_string();
            if file.is_dir() || !is_image_name(&inner_path) {
                continue;
            }

            let filename = base_name(&inner_path).to_string();
            let descriptor = SourceDescriptor::archive(container, &inner_path);
            if self.store.contains_filename(&filename) || self.store.contains_source(&descriptor) {
                info!("Removing already archived {} from {}", inner_path, container);
                fates.push((index, Fate::Duplicate));
                continue;
            }
            if !self.config.rescan_unmatched && self.failures.contains(&descriptor.reference()) {
                debug!("Skipping {} (previously unmatched)", inner_path);
                continue;
            }

            let mut data = Vec::new();
            if let Err(e) = file.read_to_end(&mut data) {
                warn!("Keeping unreadable entry {} of {}: {}", inner_path, container, e);
                unresolved += 1;
                continue;
            }
            match self.matcher.find(&data) {
                Some(found) if seen_names.insert(filename.clone()) => {
                    fates.push((
                        index,
                        Fate::Candidate {
                            inner_path,
                            found,
                            bytes: data,
                        },
                    ));
                }
                Some(_) => {
                    // Becomes a duplicate by file name on the next pass.
                    debug!("Keeping {}: same file name matched earlier in {}", inner_path, container);
                    unresolved += 1;
                }
                None => {
                    self.stats.unmatched += 1;
                    self.failures
                        .record(&filename, origin, &descriptor.reference())?;
                }
            }
        }
        Ok(Classified { fates, unresolved })
    }
}

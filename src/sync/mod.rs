//! Sync orchestrator: enumerate -> fetch -> match -> persist -> derive ->
//! upload, one asset at a time.
//!
//! Re-running is always safe. An asset whose source descriptor is already in
//! the mapping store is never fetched again, and every match is saved before
//! anything else happens to it.

pub mod archive;
pub mod backfill;
pub mod error;
pub mod heal;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

pub use self::error::SyncError;
use crate::remote::{AssetSource, RemoteAsset, SyncTarget, ThumbnailSink};
use crate::scan::paths::{local_image_path, preview_name};
use crate::scan::{extract_metadata, CodeMatcher, QrMatch, ThumbnailGenerator};
use crate::state::{
    ArchiveIndex, BatchReport, FailureLog, MappingEntry, MappingStore, SourceDescriptor,
};

/// Subset of application config consumed by the orchestrator.
/// Decoupled from CLI parsing so the engine can be tested independently.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub images_dir: PathBuf,
    pub thumbnails_dir: PathBuf,
    /// Replace remote archives once matched or duplicate entries are removed.
    pub clean_archives: bool,
    /// Fetch assets again even when the failure log lists them as unmatched.
    pub rescan_unmatched: bool,
    pub no_progress_bar: bool,
}

/// Counters for one run, logged as the summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub targets: usize,
    pub aborted_targets: usize,
    pub listed: usize,
    pub skipped: usize,
    pub fetched: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub duplicate_ids: usize,
    pub failed: usize,
    pub archive_entries_dropped: usize,
    pub archives_replaced: usize,
    pub uploaded: usize,
}

impl SyncStats {
    pub fn log_summary(&self) {
        info!("── Summary ──");
        info!(
            "  {} targets ({} aborted), {} assets listed",
            self.targets, self.aborted_targets, self.listed
        );
        info!(
            "  {} fetched, {} skipped, {} matched, {} unmatched, {} failed",
            self.fetched, self.skipped, self.matched, self.unmatched, self.failed
        );
        if self.duplicate_ids > 0 {
            info!("  {} identifiers already belonged to another image", self.duplicate_ids);
        }
        if self.archive_entries_dropped > 0 || self.archives_replaced > 0 {
            info!(
                "  {} archive entries removed, {} archives replaced",
                self.archive_entries_dropped, self.archives_replaced
            );
        }
        info!("  {} previews uploaded", self.uploaded);
    }
}

/// Owns the local state for one run and drives remote sources through it.
pub struct Orchestrator {
    config: SyncConfig,
    store: MappingStore,
    failures: FailureLog,
    matcher: Box<dyn CodeMatcher>,
    thumbnails: ThumbnailGenerator,
    sink: Option<Box<dyn ThumbnailSink>>,
    batch_report: Option<BatchReport>,
    archive_index: Option<ArchiveIndex>,
    stats: SyncStats,
}

pub(crate) fn create_spinner(no_progress_bar: bool) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] {spinner} {pos} assets {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Write via a `.part` file renamed into place.
pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut part = path.as_os_str().to_os_string();
    part.push(".part");
    let part = PathBuf::from(part);
    std::fs::write(&part, bytes)?;
    std::fs::rename(&part, path)
}

impl Orchestrator {
    pub fn new(
        config: SyncConfig,
        store: MappingStore,
        failures: FailureLog,
        matcher: Box<dyn CodeMatcher>,
    ) -> Self {
        let thumbnails = ThumbnailGenerator::new(config.thumbnails_dir.clone());
        Self {
            config,
            store,
            failures,
            matcher,
            thumbnails,
            sink: None,
            batch_report: None,
            archive_index: None,
            stats: SyncStats::default(),
        }
    }

    /// Upload previews to this destination after every match.
    pub fn with_sink(mut self, sink: Box<dyn ThumbnailSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Add every enumerated asset to a batch report.
    pub fn with_batch_report(mut self, report: BatchReport) -> Self {
        self.batch_report = Some(report);
        self
    }

    /// Skip downloading archives whose checksum is unchanged since they
    /// were last fully reconciled.
    pub fn with_archive_index(mut self, index: ArchiveIndex) -> Self {
        self.archive_index = Some(index);
        self
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Save everything and hand the store back.
    pub fn finish(self) -> Result<(MappingStore, SyncStats), SyncError> {
        self.store.save()?;
        if let Some(report) = &self.batch_report {
            report.save()?;
        }
        if let Some(index) = &self.archive_index {
            index.save()?;
        }
        Ok((self.store, self.stats))
    }

    /// Sync every target. Authorization and listing failures abort only the
    /// target they occur in; local state failures abort the run.
    pub async fn sync_all(
        &mut self,
        source: &dyn AssetSource,
        targets: &[SyncTarget],
    ) -> Result<(), SyncError> {
        for target in targets {
            self.stats.targets += 1;
            info!("Scanning {} '{}' ({})", source.name(), target.name, target.id);
            match self.sync_target(source, target).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    self.stats.aborted_targets += 1;
                    error!("Aborting '{}': {}", target.name, e);
                    if e.is_authorization() {
                        warn!("Check that the token carries the Drive, Sheets and Photos scopes");
                    }
                }
            }
        }
        Ok(())
    }

    /// Page through one target and process each asset in order.
    pub async fn sync_target(
        &mut self,
        source: &dyn AssetSource,
        target: &SyncTarget,
    ) -> Result<(), SyncError> {
        let pb = create_spinner(self.config.no_progress_bar);
        let mut page_token: Option<String> = None;
        loop {
            let page = source.list_page(target, page_token.as_deref()).await?;
            if page.assets.is_empty() && page.next_page_token.is_none() {
                break;
            }
            for asset in &page.assets {
                pb.set_message(asset.name.clone());
                self.stats.listed += 1;
                if let Some(report) = self.batch_report.as_mut() {
                    report.add(asset);
                }
                if asset.is_archive() {
                    self.process_archive(source, target, asset).await?;
                } else if asset.is_image() {
                    self.process_image(source, target, asset).await?;
                } else {
                    debug!("Ignoring {} ({})", asset.name, asset.mime_type);
                }
                pb.inc(1);
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        pb.finish_and_clear();
        Ok(())
    }

    /// Whether an asset needs no download: already archived, or already
    /// known to carry no usable code.
    fn should_skip(&self, source: &SourceDescriptor) -> bool {
        if self.store.contains_source(source) {
            return true;
        }
        !self.config.rescan_unmatched && self.failures.contains(&source.reference())
    }

    async fn process_image(
        &mut self,
        source: &dyn AssetSource,
        target: &SyncTarget,
        asset: &RemoteAsset,
    ) -> Result<(), SyncError> {
        let descriptor = SourceDescriptor::remote(&asset.id);
        if self.should_skip(&descriptor) {
            self.stats.skipped += 1;
            return Ok(());
        }

        let bytes = match source.fetch(asset).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_authorization() => return Err(e.into()),
            Err(e) => {
                warn!("Failed to fetch {}: {}", asset.name, e);
                self.stats.failed += 1;
                return Ok(());
            }
        };
        self.stats.fetched += 1;

        match self.matcher.find(&bytes) {
            Some(found) => {
                self.record_match(found, descriptor, &asset.name, &target.name, asset.owner.as_deref(), &bytes)
                    .await?;
            }
            None => {
                debug!("No QR code in {}", asset.name);
                self.stats.unmatched += 1;
                self.failures
                    .record(&asset.name, &target.name, &descriptor.reference())?;
            }
        }
        Ok(())
    }

    /// Persist a match, derive previews and metadata, then upload.
    ///
    /// Returns `false` when the identifier or its local image path already
    /// belongs to another entry, or the image could not be written; the
    /// asset is then left unrecorded.
    pub(crate) async fn record_match(
        &mut self,
        found: QrMatch,
        source: SourceDescriptor,
        filename: &str,
        origin: &str,
        owner: Option<&str>,
        bytes: &[u8],
    ) -> Result<bool, SyncError> {
        let identifier = found.identifier;
        if let Some(existing) = self.store.get(&identifier) {
            warn!(
                identifier,
                "Already matched to {}; logging {} as unmatched",
                existing.source.reference(),
                source.reference()
            );
            self.stats.duplicate_ids += 1;
            self.failures.record(filename, origin, &source.reference())?;
            return Ok(false);
        }

        let image_path = local_image_path(&self.config.images_dir, &identifier, filename);
        if let Some(owner) = self.store.image_owner(&image_path) {
            warn!(
                identifier,
                "{} already holds the image of {}; logging {} as unmatched",
                image_path.display(),
                owner,
                source.reference()
            );
            self.stats.duplicate_ids += 1;
            self.failures.record(filename, origin, &source.reference())?;
            return Ok(false);
        }
        if let Err(e) = write_file(&image_path, bytes) {
            error!(identifier, "Failed to save {}: {}", image_path.display(), e);
            self.stats.failed += 1;
            return Ok(false);
        }

        let mut entry = MappingEntry::new(source, filename);
        entry.origin = Some(origin.to_string()).filter(|o| !o.is_empty());
        entry.creator = owner.map(str::to_string);
        entry.local_image_path = Some(image_path);
        self.store.try_insert(&identifier, entry);
        self.store.save()?;
        self.stats.matched += 1;
        info!(identifier, "Matched {}", filename);

        let previews = self.thumbnails.generate(&identifier, bytes, Some(found.region));
        let metadata = extract_metadata(bytes);
        if let Some(entry) = self.store.get_mut(&identifier) {
            entry.thumbnail_path = previews.thumbnail;
            entry.qr_crop_path = previews.qr_crop;
            entry.camera = metadata.camera;
            entry.location = metadata.location;
            entry.captured_at = metadata.captured_at;
        }
        self.store.save()?;

        if self.upload_previews(&identifier).await? > 0 {
            self.store.save()?;
        }
        Ok(true)
    }

    /// Upload whichever previews of an entry lack a remote copy. Returns the
    /// number uploaded. An authorization failure disables uploads for the
    /// rest of the run; other failures leave the entry for the next backfill.
    pub(crate) async fn upload_previews(&mut self, identifier: &str) -> Result<usize, SyncError> {
        let Some(sink) = self.sink.as_deref() else {
            return Ok(0);
        };
        let Some(entry) = self.store.get(identifier) else {
            return Ok(0);
        };

        let mut pending = Vec::new();
        if entry.remote_thumb_ref.is_none() {
            if let Some(path) = &entry.thumbnail_path {
                pending.push(("thumb", path.clone()));
            }
        }
        if entry.remote_qr_ref.is_none() {
            if let Some(path) = &entry.qr_crop_path {
                pending.push(("qr", path.clone()));
            }
        }

        let mut uploaded = Vec::new();
        let mut disable_sink = false;
        for (kind, path) in pending {
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(identifier, "Cannot read {}: {}", path.display(), e);
                    continue;
                }
            };
            match sink.upload_public(&preview_name(identifier, kind), bytes).await {
                Ok(remote_id) => uploaded.push((kind, remote_id)),
                Err(e) if e.is_authorization() => {
                    error!("Preview upload not authorized, disabling uploads: {}", e);
                    disable_sink = true;
                    break;
                }
                Err(e) => warn!(identifier, "Failed to upload {} preview: {}", kind, e),
            }
        }
        if disable_sink {
            self.sink = None;
        }

        let count = uploaded.len();
        if let Some(entry) = self.store.get_mut(identifier) {
            for (kind, remote_id) in uploaded {
                match kind {
                    "thumb" => entry.remote_thumb_ref = Some(remote_id),
                    _ => entry.remote_qr_ref = Some(remote_id),
                }
            }
        }
        self.stats.uploaded += count;
        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::remote::{AssetPage, RemoteError};
    use crate::scan::Rect;

    /// Treats `QR:<id>` payloads as codes; anything else has none.
    pub(crate) struct FakeMatcher;

    impl CodeMatcher for FakeMatcher {
        fn find(&self, bytes: &[u8]) -> Option<QrMatch> {
            let text = std::str::from_utf8(bytes).ok()?;
            let identifier = text.strip_prefix("QR:")?.trim();
            (!identifier.is_empty()).then(|| QrMatch {
                identifier: identifier.to_string(),
                region: Rect {
                    left: 0,
                    top: 0,
                    width: 10,
                    height: 10,
                },
            })
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub assets: HashMap<String, Vec<RemoteAsset>>,
        pub content: HashMap<String, Vec<u8>>,
        pub owners: HashMap<String, String>,
        pub page_size: usize,
        pub deny_listing: bool,
        pub fetches: Mutex<Vec<String>>,
        pub replaced: Mutex<Vec<(String, Vec<u8>)>>,
        pub owner_lookups: Mutex<usize>,
    }

    pub(crate) fn asset(id: &str, name: &str, mime_type: &str) -> RemoteAsset {
        RemoteAsset {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            created_time: Some("2024-03-05T10:15:42Z".to_string()),
            owner: Some("Ada".to_string()),
            checksum: None,
            download_url: None,
            camera_model: None,
            aperture: None,
        }
    }

    impl FakeSource {
        pub(crate) fn with_images(target: &str, images: &[(&str, &str, &[u8])]) -> Self {
            let mut source = FakeSource {
                page_size: 2,
                ..Default::default()
            };
            for (id, name, bytes) in images {
                source.add(target, asset(id, name, "image/jpeg"), bytes.to_vec());
            }
            source
        }

        pub(crate) fn add(&mut self, target: &str, asset: RemoteAsset, bytes: Vec<u8>) {
            self.content.insert(asset.id.clone(), bytes);
            self.assets.entry(target.to_string()).or_default().push(asset);
        }

        pub(crate) fn fetch_count(&self) -> usize {
            self.fetches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AssetSource for FakeSource {
        fn name(&self) -> &'static str {
            "Fake"
        }

        async fn resolve_targets(&self, requested: &[String]) -> Result<Vec<SyncTarget>, RemoteError> {
            Ok(requested
                .iter()
                .map(|id| SyncTarget {
                    id: id.clone(),
                    name: format!("Folder {}", id),
                })
                .collect())
        }

        async fn list_page(
            &self,
            target: &SyncTarget,
            page_token: Option<&str>,
        ) -> Result<AssetPage, RemoteError> {
            if self.deny_listing {
                return Err(RemoteError::Api {
                    service: "Fake",
                    status: 403,
                    message: "denied".into(),
                });
            }
            let all = self.assets.get(&target.id).cloned().unwrap_or_default();
            let start: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let end = (start + self.page_size.max(1)).min(all.len());
            Ok(AssetPage {
                assets: all[start.min(end)..end].to_vec(),
                next_page_token: (end < all.len()).then(|| end.to_string()),
            })
        }

        async fn fetch(&self, asset: &RemoteAsset) -> Result<Vec<u8>, RemoteError> {
            self.fetches.lock().unwrap().push(asset.id.clone());
            self.content.get(&asset.id).cloned().ok_or(RemoteError::Api {
                service: "Fake",
                status: 404,
                message: "gone".into(),
            })
        }

        async fn replace_archive(&self, asset: &RemoteAsset, bytes: Vec<u8>) -> Result<(), RemoteError> {
            self.replaced.lock().unwrap().push((asset.id.clone(), bytes));
            Ok(())
        }

        async fn owner_of(&self, source: &SourceDescriptor) -> Result<Option<String>, RemoteError> {
            *self.owner_lookups.lock().unwrap() += 1;
            let key = match source {
                SourceDescriptor::Remote { file_id } => file_id,
                SourceDescriptor::Archive { container, .. } => container,
            };
            Ok(self.owners.get(key).cloned())
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeSink {
        pub uploads: Mutex<Vec<String>>,
        pub deny: bool,
    }

    #[async_trait]
    impl ThumbnailSink for std::sync::Arc<FakeSink> {
        async fn upload_public(&self, name: &str, _bytes: Vec<u8>) -> Result<String, RemoteError> {
            if self.deny {
                return Err(RemoteError::Api {
                    service: "Fake",
                    status: 401,
                    message: "expired".into(),
                });
            }
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push(name.to_string());
            Ok(format!("remote-{}", uploads.len()))
        }
    }

    pub(crate) struct Fixture {
        pub dir: tempfile::TempDir,
        pub config: SyncConfig,
    }

    impl Fixture {
        pub(crate) fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = SyncConfig {
                images_dir: dir.path().join("images"),
                thumbnails_dir: dir.path().join("thumbnails"),
                clean_archives: false,
                rescan_unmatched: false,
                no_progress_bar: true,
            };
            Self { dir, config }
        }

        pub(crate) fn store_path(&self) -> PathBuf {
            self.dir.path().join("photo_mapping.json")
        }

        pub(crate) fn orchestrator(&self) -> Orchestrator {
            self.orchestrator_with(FakeMatcher)
        }

        pub(crate) fn orchestrator_with(&self, matcher: impl CodeMatcher + 'static) -> Orchestrator {
            let store = MappingStore::open(&self.store_path()).unwrap();
            let failures = FailureLog::open(&self.dir.path().join("failed_scans.txt")).unwrap();
            Orchestrator::new(self.config.clone(), store, failures, Box::new(matcher))
        }
    }

    pub(crate) fn target(id: &str) -> SyncTarget {
        SyncTarget {
            id: id.to_string(),
            name: format!("Folder {}", id),
        }
    }

    #[tokio::test]
    async fn test_matches_and_logs_unmatched() {
        let fx = Fixture::new();
        let source = FakeSource::with_images(
            "t1",
            &[
                ("f1", "a.jpg", b"QR:MPO-1"),
                ("f2", "b.jpg", b"no code here"),
                ("f3", "c.png", b"QR: FA-2 "),
            ],
        );
        let mut orch = fx.orchestrator();
        orch.sync_all(&source, &[target("t1")]).await.unwrap();

        let store = orch.store();
        assert_eq!(store.len(), 2);
        let entry = store.get("MPO-1").unwrap();
        assert_eq!(entry.source, SourceDescriptor::remote("f1"));
        assert_eq!(entry.origin.as_deref(), Some("Folder t1"));
        assert_eq!(entry.creator.as_deref(), Some("Ada"));
        assert_eq!(
            entry.local_image_path.as_deref(),
            Some(fx.config.images_dir.join("MPO-1.jpg").as_path())
        );
        assert!(fx.config.images_dir.join("FA-2.png").exists());

        let log = std::fs::read_to_string(fx.dir.path().join("failed_scans.txt")).unwrap();
        assert_eq!(log, "b.jpg | Folder t1 | f2\n");
        assert_eq!(orch.stats().matched, 2);
        assert_eq!(orch.stats().unmatched, 1);
    }

    #[tokio::test]
    async fn test_second_run_fetches_nothing() {
        let fx = Fixture::new();
        let source = FakeSource::with_images(
            "t1",
            &[("f1", "a.jpg", b"QR:MPO-1"), ("f2", "b.jpg", b"nothing")],
        );
        {
            let mut orch = fx.orchestrator();
            orch.sync_all(&source, &[target("t1")]).await.unwrap();
            orch.finish().unwrap();
        }
        assert_eq!(source.fetch_count(), 2);
        let before = std::fs::read_to_string(fx.store_path()).unwrap();

        let mut orch = fx.orchestrator();
        orch.sync_all(&source, &[target("t1")]).await.unwrap();
        assert_eq!(source.fetch_count(), 2);
        assert_eq!(orch.stats().skipped, 2);
        orch.finish().unwrap();
        assert_eq!(std::fs::read_to_string(fx.store_path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_rescan_unmatched_fetches_logged_assets_again() {
        let mut fx = Fixture::new();
        let source = FakeSource::with_images("t1", &[("f2", "b.jpg", b"nothing")]);
        {
            let mut orch = fx.orchestrator();
            orch.sync_all(&source, &[target("t1")]).await.unwrap();
        }
        fx.config.rescan_unmatched = true;
        let mut orch = fx.orchestrator();
        orch.sync_all(&source, &[target("t1")]).await.unwrap();
        assert_eq!(source.fetch_count(), 2);
        // Still logged once.
        let log = std::fs::read_to_string(fx.dir.path().join("failed_scans.txt")).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_first_match_wins_for_identifier() {
        let fx = Fixture::new();
        let source = FakeSource::with_images(
            "t1",
            &[("f1", "a.jpg", b"QR:MPO-1"), ("f2", "b.jpg", b"QR:MPO-1")],
        );
        let mut orch = fx.orchestrator();
        orch.sync_all(&source, &[target("t1")]).await.unwrap();
        assert_eq!(orch.store().len(), 1);
        assert_eq!(orch.store().get("MPO-1").unwrap().filename, "a.jpg");
        assert_eq!(orch.stats().duplicate_ids, 1);
        let log = std::fs::read_to_string(fx.dir.path().join("failed_scans.txt")).unwrap();
        assert!(log.contains("| f2"));
    }

    #[tokio::test]
    async fn test_similar_identifiers_keep_separate_images() {
        let fx = Fixture::new();
        let source = FakeSource::with_images(
            "t1",
            &[("f1", "a.jpg", b"QR:MPO1"), ("f2", "b.jpg", b"QR:MPO/1")],
        );
        let mut orch = fx.orchestrator();
        orch.sync_all(&source, &[target("t1")]).await.unwrap();

        let first = orch.store().get("MPO1").unwrap().local_image_path.clone().unwrap();
        let second = orch.store().get("MPO/1").unwrap().local_image_path.clone().unwrap();
        assert_ne!(first, second);
        assert_eq!(std::fs::read(&first).unwrap(), b"QR:MPO1");
        assert_eq!(std::fs::read(&second).unwrap(), b"QR:MPO/1");
    }

    #[tokio::test]
    async fn test_image_path_taken_by_other_identifier_is_not_overwritten() {
        let fx = Fixture::new();
        let source = FakeSource::with_images(
            "t1",
            &[("f1", "a.jpg", b"QR:mpo-1"), ("f2", "b.jpg", b"QR:MPO-1")],
        );
        let mut orch = fx.orchestrator();
        orch.sync_all(&source, &[target("t1")]).await.unwrap();

        assert_eq!(orch.store().len(), 1);
        assert!(orch.store().get("MPO-1").is_none());
        let kept = fx.config.images_dir.join("mpo-1.jpg");
        assert_eq!(std::fs::read(&kept).unwrap(), b"QR:mpo-1");
        assert_eq!(orch.stats().duplicate_ids, 1);
        let log = std::fs::read_to_string(fx.dir.path().join("failed_scans.txt")).unwrap();
        assert_eq!(log, "b.jpg | Folder t1 | f2\n");
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_asset() {
        let fx = Fixture::new();
        let mut source = FakeSource::with_images("t1", &[("f1", "a.jpg", b"QR:MPO-1")]);
        source.add("t1", asset("gone", "lost.jpg", "image/jpeg"), Vec::new());
        source.content.remove("gone");
        let mut orch = fx.orchestrator();
        orch.sync_all(&source, &[target("t1")]).await.unwrap();
        assert_eq!(orch.store().len(), 1);
        assert_eq!(orch.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_authorization_failure_aborts_only_the_target() {
        let fx = Fixture::new();
        let source = FakeSource {
            deny_listing: true,
            ..Default::default()
        };
        let mut orch = fx.orchestrator();
        orch.sync_all(&source, &[target("t1"), target("t2")]).await.unwrap();
        assert_eq!(orch.stats().targets, 2);
        assert_eq!(orch.stats().aborted_targets, 2);
    }

    #[tokio::test]
    async fn test_uploads_previews_when_sink_configured() {
        let fx = Fixture::new();
        let png = crate::scan::qr::tests::blank_png(64, 48);
        let mut source = FakeSource::with_images("t1", &[]);
        source.add("t1", asset("f1", "a.png", "image/png"), png);

        struct Always;
        impl CodeMatcher for Always {
            fn find(&self, _bytes: &[u8]) -> Option<QrMatch> {
                Some(QrMatch {
                    identifier: "MPO-9".into(),
                    region: Rect { left: 4, top: 4, width: 20, height: 20 },
                })
            }
        }

        let sink = std::sync::Arc::new(FakeSink::default());
        let mut orch = fx.orchestrator_with(Always).with_sink(Box::new(sink.clone()));
        orch.sync_all(&source, &[target("t1")]).await.unwrap();

        let entry = orch.store().get("MPO-9").unwrap();
        assert!(entry.thumbnail_path.is_some());
        assert!(entry.qr_crop_path.is_some());
        assert_eq!(entry.remote_thumb_ref.as_deref(), Some("remote-1"));
        assert_eq!(entry.remote_qr_ref.as_deref(), Some("remote-2"));
        assert_eq!(
            *sink.uploads.lock().unwrap(),
            vec!["MPO-9_thumb.jpg".to_string(), "MPO-9_qr.jpg".to_string()]
        );
    }

    #[tokio::test]
    async fn test_pages_are_followed() {
        let fx = Fixture::new();
        let images: Vec<(String, String, Vec<u8>)> = (1..=5)
            .map(|i| (format!("f{}", i), format!("{}.jpg", i), format!("QR:A-{}", i).into_bytes()))
            .collect();
        let refs: Vec<(&str, &str, &[u8])> = images
            .iter()
            .map(|(id, name, bytes)| (id.as_str(), name.as_str(), bytes.as_slice()))
            .collect();
        let source = FakeSource::with_images("t1", &refs);
        let mut orch = fx.orchestrator();
        orch.sync_all(&source, &[target("t1")]).await.unwrap();
        assert_eq!(orch.store().len(), 5);
        assert_eq!(orch.stats().listed, 5);
    }

    #[tokio::test]
    async fn test_real_scanner_end_to_end() {
        let fx = Fixture::new();
        let png = crate::scan::qr::tests::qr_png("MPO-77", 400, 300, 20, 20);
        let mut source = FakeSource::with_images("t1", &[]);
        source.add("t1", asset("f1", "scan.png", "image/png"), png);
        let mut orch = fx.orchestrator_with(crate::scan::QrScanner::default());
        orch.sync_all(&source, &[target("t1")]).await.unwrap();

        let entry = orch.store().get("MPO-77").unwrap();
        let thumb = image::open(entry.thumbnail_path.as_ref().unwrap()).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (300, 225));
        assert!(entry.qr_crop_path.as_ref().unwrap().exists());
    }
}

//! codicum-sync: archive QR-tagged parchment photos.
//!
//! Pulls images from Google Drive folders (including contributor ZIP
//! archives) or Google Photos albums, decodes the QR code identifying each
//! specimen, keeps a local mapping of identifier to image with previews and
//! EXIF metadata, uploads the previews back to Drive and mirrors the mapping
//! into a Google Sheet. Every run is safe to repeat.

#![warn(clippy::all)]

mod auth;
mod cli;
mod config;
mod remote;
mod report;
mod scan;
mod state;
mod sync;
mod types;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::Config;
use remote::{
    ApiClient, AssetSource, DriveClient, DriveThumbnailSink, PhotosClient, RemoteError,
    SheetsClient, ThumbnailSink,
};
use scan::QrScanner;
use state::{ArchiveIndex, BatchReport, FailureLog, MappingStore};
use sync::{Orchestrator, SyncError};
use types::SourceKind;

/// Load the OAuth token and build the shared API client.
async fn connect(config: &Config) -> anyhow::Result<ApiClient> {
    let token =
        auth::access_token(&config.token_path, &config.credentials_path, config.timeout_secs)
            .await?;
    Ok(ApiClient::new(token, config.timeout_secs)?)
}

/// Resolve where previews are uploaded. Any failure disables uploads for
/// the run instead of stopping it.
async fn thumbnail_sink(
    drive: &DriveClient,
    args: &cli::ThumbnailArgs,
    config: &Config,
) -> Option<Box<dyn ThumbnailSink>> {
    if args.no_upload {
        tracing::info!("Preview uploads disabled");
        return None;
    }
    let folder_id = match &args.thumbs_folder_id {
        Some(id) => id.clone(),
        None => match drive.ensure_folder(&args.thumbs_folder_name).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(
                    "Cannot resolve preview folder '{}', uploads disabled: {}",
                    args.thumbs_folder_name,
                    e
                );
                if e.is_authorization() {
                    auth::log_reauthorization_help(&config.token_path);
                }
                return None;
            }
        },
    };
    tracing::debug!("Uploading previews to folder {}", folder_id);
    Some(Box::new(DriveThumbnailSink::new(drive.clone(), folder_id)))
}

fn open_orchestrator(
    config: &Config,
    clean_archives: bool,
    rescan_unmatched: bool,
    scan_region: types::ScanRegion,
) -> anyhow::Result<Orchestrator> {
    let store = MappingStore::open(&config.assets.mapping_file)?;
    tracing::info!(
        "Mapping store {} holds {} entries",
        config.assets.mapping_file.display(),
        store.len()
    );
    let failures = FailureLog::open(&config.assets.failure_log_file)?;
    Ok(Orchestrator::new(
        config.sync_config(clean_archives, rescan_unmatched),
        store,
        failures,
        Box::new(QrScanner::new(scan_region)),
    ))
}

/// Mirror the store to the sheet. Failures are logged; the local state is
/// already saved at this point.
async fn mirror_sheet(api: &ApiClient, args: &cli::SheetArgs, store: &MappingStore, config: &Config) {
    let Some(sheet_id) = &args.sheet_id else {
        return;
    };
    let sheet = SheetsClient::new(api.clone(), sheet_id.clone(), &args.sheet_name);
    if let Err(e) = report::mirror(&sheet, store).await {
        tracing::error!("Failed to update sheet {}: {}", sheet_id, e);
        if e.is_authorization() {
            auth::log_reauthorization_help(&config.token_path);
        }
    }
}

async fn run_sync(args: cli::SyncArgs, config: &Config) -> anyhow::Result<()> {
    if args.targets.is_empty() {
        anyhow::bail!("No targets given. Pass --target (folder ids or album titles) or set CODICUM_TARGETS");
    }

    let mut orchestrator = open_orchestrator(
        config,
        args.clean_archives,
        args.rescan_unmatched,
        args.scan_region,
    )?;
    let api = connect(config).await?;
    let drive = DriveClient::new(api.clone());
    if let Some(sink) = thumbnail_sink(&drive, &args.thumbnails, config).await {
        orchestrator = orchestrator.with_sink(sink);
    }

    let source: Box<dyn AssetSource> = match args.source {
        SourceKind::Drive => {
            orchestrator = orchestrator
                .with_archive_index(ArchiveIndex::open(&config.assets.archive_index_file)?);
            Box::new(drive)
        }
        SourceKind::Photos => {
            let albums = config::parse_album_ids(&args.album_ids)?;
            orchestrator = orchestrator
                .with_batch_report(BatchReport::open(&config.assets.batch_report_file)?);
            Box::new(PhotosClient::new(api.clone(), albums))
        }
    };
    if args.clean_archives && args.source == SourceKind::Photos {
        tracing::warn!("--clean-archives only applies to Drive folders");
    }

    let targets = source.resolve_targets(&args.targets).await?;
    tracing::info!(
        "Syncing {} {} target(s) from {}",
        targets.len(),
        args.source.as_str(),
        source.name()
    );
    orchestrator.sync_all(source.as_ref(), &targets).await?;
    orchestrator.heal(Some(source.as_ref())).await?;
    orchestrator.backfill_uploads().await?;

    let (store, stats) = orchestrator.finish()?;
    stats.log_summary();

    mirror_sheet(&api, &args.sheet, &store, config).await;
    report::log_gaps(store.identifiers());
    Ok(())
}

async fn run_heal(args: cli::HealArgs, config: &Config) -> anyhow::Result<()> {
    let mut orchestrator = open_orchestrator(config, false, false, args.scan_region)?;
    if orchestrator.store().is_empty() {
        println!("Mapping store is empty; nothing to heal.");
        return Ok(());
    }

    let healed = if args.offline {
        orchestrator.heal(None).await?
    } else {
        let api = connect(config).await?;
        let drive = DriveClient::new(api.clone());
        if let Some(sink) = thumbnail_sink(&drive, &args.thumbnails, config).await {
            orchestrator = orchestrator.with_sink(sink);
        }
        let source: Box<dyn AssetSource> = match args.source {
            SourceKind::Drive => Box::new(drive),
            SourceKind::Photos => Box::new(PhotosClient::new(api, Default::default())),
        };
        let healed = orchestrator.heal(Some(source.as_ref())).await?;
        orchestrator.backfill_uploads().await?;
        healed
    };

    let (_, stats) = orchestrator.finish()?;
    println!("Healed {} entries, uploaded {} previews", healed, stats.uploaded);
    Ok(())
}

async fn run_report(args: cli::ReportArgs, config: &Config) -> anyhow::Result<()> {
    let store = MappingStore::read(&config.assets.mapping_file)?;
    let gaps = report::log_gaps(store.identifiers());
    for gap in &gaps {
        println!(
            "{}: {} missing, first {:?}",
            gap.prefix, gap.missing_count, gap.preview
        );
    }
    if args.sheet.sheet_id.is_some() {
        let api = connect(config).await?;
        mirror_sheet(&api, &args.sheet, &store, config).await;
    }
    Ok(())
}

/// Run the status command.
fn run_status(args: cli::StatusArgs, config: &Config) -> anyhow::Result<()> {
    let path = &config.assets.mapping_file;
    if !path.exists() {
        println!("No mapping store found at {}", path.display());
        println!("Run a sync first to create it.");
        return Ok(());
    }

    let store = MappingStore::read(path)?;
    let failures = FailureLog::open(&config.assets.failure_log_file)?;
    let incomplete: Vec<&String> = store
        .iter()
        .filter(|(_, entry)| !entry.missing().is_empty())
        .map(|(id, _)| id)
        .collect();
    let pending_uploads = store.iter().filter(|(_, entry)| entry.pending_upload()).count();
    let from_archives = store
        .iter()
        .filter(|(_, entry)| matches!(entry.source, state::SourceDescriptor::Archive { .. }))
        .count();

    println!("Mapping store: {}", path.display());
    println!();
    println!("Entries:");
    println!("  Total:           {}", store.len());
    println!("  From archives:   {}", from_archives);
    println!("  Incomplete:      {}", incomplete.len());
    println!("  Pending uploads: {}", pending_uploads);
    println!("Unmatched scans:   {}", failures.len());

    if args.incomplete && !incomplete.is_empty() {
        println!();
        println!("Incomplete entries:");
        for id in incomplete {
            println!("  {}", id);
        }
    }
    Ok(())
}

/// Run the verify command.
fn run_verify(args: cli::VerifyArgs, config: &Config) -> anyhow::Result<()> {
    let store = MappingStore::read(&config.assets.mapping_file)?;
    println!("Verifying {} entries...", store.len());
    println!();

    let mut missing = 0;
    let mut verified = 0;
    for (id, entry) in store.iter() {
        let mut paths = vec![("image", entry.local_image_path.as_ref())];
        if args.previews {
            paths.push(("thumbnail", entry.thumbnail_path.as_ref()));
            paths.push(("qr crop", entry.qr_crop_path.as_ref()));
        }
        for (kind, path) in paths {
            match path {
                Some(path) if path.exists() => verified += 1,
                Some(path) => {
                    println!("MISSING: {} {} ({})", kind, path.display(), id);
                    missing += 1;
                }
                None => {
                    println!("NO PATH: {} - no {} recorded", id, kind);
                    missing += 1;
                }
            }
        }
    }

    println!();
    println!("Results:");
    println!("  Verified: {}", verified);
    println!("  Missing:  {}", missing);

    if missing > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Whether an error chain ends in a rejected or insufficient credential.
fn is_authorization_failure(error: &anyhow::Error) -> bool {
    if let Some(e) = error.downcast_ref::<auth::AuthError>() {
        return e.needs_reauthorization();
    }
    if let Some(e) = error.downcast_ref::<RemoteError>() {
        return e.is_authorization();
    }
    if let Some(e) = error.downcast_ref::<SyncError>() {
        return e.is_authorization();
    }
    false
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let config = Config::from_cli(&cli);
    tracing::debug!(?config, "Starting codicum-sync");

    let result = match cli.command {
        Command::Sync(args) => run_sync(args, &config).await,
        Command::Heal(args) => run_heal(args, &config).await,
        Command::Report(args) => run_report(args, &config).await,
        Command::Status(args) => run_status(args, &config),
        Command::Verify(args) => run_verify(args, &config),
    };

    if let Err(e) = &result {
        if is_authorization_failure(e) {
            auth::log_reauthorization_help(&config.token_path);
        }
    }
    result
}

use clap::{Args, Parser, Subcommand};

use crate::types::{LogLevel, ScanRegion, SourceKind};

#[derive(Parser, Debug)]
#[command(
    name = "codicum-sync",
    version,
    about = "Archive QR-tagged parchment photos from Google Drive and Photos"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Local directory holding images, thumbnails and the mapping file
    #[arg(long, global = true, env = "CODICUM_ASSETS_DIR", default_value = "assets")]
    pub assets_dir: String,

    /// OAuth client secrets file
    #[arg(long, global = true, env = "CODICUM_CREDENTIALS", default_value = "credentials.json")]
    pub credentials: String,

    /// Authorized-user token file; refreshed in place when expired
    #[arg(long, global = true, env = "CODICUM_TOKEN", default_value = "token.json")]
    pub token: String,

    /// HTTP request timeout in seconds
    #[arg(long, global = true, default_value_t = 60)]
    pub timeout: u64,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Disable progress spinners
    #[arg(long, global = true)]
    pub no_progress_bar: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sync targets, heal, upload missing previews and refresh reports
    Sync(SyncArgs),
    /// Fill missing previews, metadata and creators, then upload previews
    Heal(HealArgs),
    /// Run gap analysis and optionally mirror the store to a sheet
    Report(ReportArgs),
    /// Show mapping store statistics
    Status(StatusArgs),
    /// Check that every recorded local file still exists
    Verify(VerifyArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Service to pull assets from
    #[arg(long, value_enum, default_value = "drive")]
    pub source: SourceKind,

    /// Drive folder ids or Photos album titles to sync
    #[arg(
        short = 't',
        long = "target",
        env = "CODICUM_TARGETS",
        value_delimiter = ','
    )]
    pub targets: Vec<String>,

    /// Photos album id for a title, as TITLE=ID; skips album discovery
    #[arg(long = "album-id", value_name = "TITLE=ID")]
    pub album_ids: Vec<String>,

    /// Remove matched and duplicate images from Drive ZIP archives and
    /// upload the cleaned archive in place
    #[arg(long)]
    pub clean_archives: bool,

    /// Download assets again even if they were logged as unmatched
    #[arg(long)]
    pub rescan_unmatched: bool,

    /// Part of each image searched for a QR code
    #[arg(long, value_enum, default_value = "full")]
    pub scan_region: ScanRegion,

    #[command(flatten)]
    pub sheet: SheetArgs,

    #[command(flatten)]
    pub thumbnails: ThumbnailArgs,
}

#[derive(Args, Debug, Clone)]
pub struct HealArgs {
    /// Service used to look up creators
    #[arg(long, value_enum, default_value = "drive")]
    pub source: SourceKind,

    /// Only heal from local images; no creator lookups or uploads
    #[arg(long)]
    pub offline: bool,

    /// Part of each image searched for a QR code when regenerating crops
    #[arg(long, value_enum, default_value = "full")]
    pub scan_region: ScanRegion,

    #[command(flatten)]
    pub thumbnails: ThumbnailArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[command(flatten)]
    pub sheet: SheetArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SheetArgs {
    /// Spreadsheet to mirror the mapping store into
    #[arg(long, env = "CODICUM_SHEET_ID")]
    pub sheet_id: Option<String>,

    /// Tab name inside the spreadsheet
    #[arg(long, default_value = "Sheet1")]
    pub sheet_name: String,
}

#[derive(Args, Debug, Clone)]
pub struct ThumbnailArgs {
    /// Drive folder receiving uploaded previews
    #[arg(long, env = "CODICUM_THUMBS_FOLDER_ID")]
    pub thumbs_folder_id: Option<String>,

    /// Folder found or created by name when no folder id is given
    #[arg(long, default_value = "Codicum_Thumbnails")]
    pub thumbs_folder_name: String,

    /// Keep previews local only
    #[arg(long)]
    pub no_upload: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// List identifiers of entries that still miss fields
    #[arg(long)]
    pub incomplete: bool,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// Also check generated thumbnails and QR crops
    #[arg(long)]
    pub previews: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_defaults() {
        let cli = Cli::try_parse_from(["codicum-sync", "sync", "--target", "abc"]).unwrap();
        assert_eq!(cli.assets_dir, "assets");
        assert_eq!(cli.log_level, LogLevel::Info);
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.source, SourceKind::Drive);
        assert_eq!(args.targets, vec!["abc".to_string()]);
        assert_eq!(args.scan_region, ScanRegion::Full);
        assert_eq!(args.sheet.sheet_name, "Sheet1");
        assert_eq!(args.thumbnails.thumbs_folder_name, "Codicum_Thumbnails");
        assert!(!args.clean_archives);
    }

    #[test]
    fn test_targets_split_on_commas() {
        let cli = Cli::try_parse_from([
            "codicum-sync",
            "sync",
            "--source",
            "photos",
            "-t",
            "Herbarium,Field 2024",
            "--album-id",
            "Herbarium=AB12",
            "--scan-region",
            "top-left",
        ])
        .unwrap();
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.targets, vec!["Herbarium", "Field 2024"]);
        assert_eq!(args.album_ids, vec!["Herbarium=AB12"]);
        assert_eq!(args.scan_region, ScanRegion::TopLeft);
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let cli = Cli::try_parse_from([
            "codicum-sync",
            "status",
            "--assets-dir",
            "/data/codicum",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.assets_dir, "/data/codicum");
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert!(matches!(cli.command, Command::Status(_)));
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["codicum-sync", "download"]).is_err());
    }
}

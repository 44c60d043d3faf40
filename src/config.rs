use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::sync::SyncConfig;

/// Files and directories under the assets root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLayout {
    pub root: PathBuf,
    pub images_dir: PathBuf,
    pub thumbnails_dir: PathBuf,
    pub mapping_file: PathBuf,
    pub batch_report_file: PathBuf,
    pub failure_log_file: PathBuf,
    pub archive_index_file: PathBuf,
}

impl AssetLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            images_dir: root.join("images"),
            thumbnails_dir: root.join("thumbnails"),
            mapping_file: root.join("photo_mapping.json"),
            batch_report_file: root.join("batch_report.json"),
            failure_log_file: root.join("failed_scans.txt"),
            archive_index_file: root.join("archive_index.json"),
        }
    }
}

/// Application configuration shared by every command.
#[derive(Debug, Clone)]
pub struct Config {
    pub assets: AssetLayout,
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub timeout_secs: u64,
    pub no_progress_bar: bool,
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            assets: AssetLayout::new(&expand_tilde(&cli.assets_dir)),
            credentials_path: expand_tilde(&cli.credentials),
            token_path: expand_tilde(&cli.token),
            timeout_secs: cli.timeout,
            no_progress_bar: cli.no_progress_bar,
        }
    }

    pub fn sync_config(&self, clean_archives: bool, rescan_unmatched: bool) -> SyncConfig {
        SyncConfig {
            images_dir: self.assets.images_dir.clone(),
            thumbnails_dir: self.assets.thumbnails_dir.clone(),
            clean_archives,
            rescan_unmatched,
            no_progress_bar: self.no_progress_bar,
        }
    }
}

/// Parse `TITLE=ID` album overrides. The title may itself contain `=`;
/// the id is everything after the last one.
pub(crate) fn parse_album_ids(pairs: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut albums = BTreeMap::new();
    for pair in pairs {
        let Some((title, id)) = pair.rsplit_once('=') else {
            anyhow::bail!("Cannot parse album override '{}'. Expected TITLE=ID", pair);
        };
        let (title, id) = (title.trim(), id.trim());
        if title.is_empty() || id.is_empty() {
            anyhow::bail!("Cannot parse album override '{}'. Expected TITLE=ID", pair);
        }
        albums.insert(title.to_string(), id.to_string());
    }
    Ok(albums)
}

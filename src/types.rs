#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Part of the frame searched for a QR code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScanRegion {
    /// The whole image.
    Full,
    /// The top-left 45% x 45% of the image.
    #[value(name = "top-left")]
    TopLeft,
}

/// Which remote service assets are pulled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceKind {
    /// Google Drive folders (images and ZIP archives).
    Drive,
    /// Google Photos albums.
    Photos,
}

impl SourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            SourceKind::Drive => "drive",
            SourceKind::Photos => "photos",
        }
    }
}

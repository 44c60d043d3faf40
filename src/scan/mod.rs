//! Per-image processing: QR matching, EXIF extraction and preview generation.

pub mod exif;
pub mod paths;
pub mod qr;
pub mod thumbnail;

pub use self::exif::{extract_metadata, ImageMetadata};
pub use qr::{CodeMatcher, QrMatch, QrScanner, Rect};
pub use thumbnail::{ThumbnailGenerator, Thumbnails};

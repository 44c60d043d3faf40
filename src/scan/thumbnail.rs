use std::path::PathBuf;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use super::paths::preview_name;
use super::qr::Rect;

pub const THUMBNAIL_WIDTH: u32 = 300;
/// Padding added around a QR rectangle, as a fraction of its size per side.
pub const QR_PADDING: f64 = 0.2;

/// Paths of the previews produced for one image. Either may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Thumbnails {
    pub thumbnail: Option<PathBuf>,
    pub qr_crop: Option<PathBuf>,
}

/// Writes `{id}_thumb.jpg` and `{id}_qr.jpg` previews into one directory.
#[derive(Debug, Clone)]
pub struct ThumbnailGenerator {
    output_dir: PathBuf,
}

impl ThumbnailGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Generate the proportional thumbnail and, when `region` is given, the
    /// padded QR crop. Failures are logged and leave the path absent.
    pub fn generate(&self, identifier: &str, bytes: &[u8], region: Option<Rect>) -> Thumbnails {
        self.generate_some(identifier, bytes, true, region)
    }

    /// Like [`generate`](Self::generate), but the thumbnail is only written
    /// when `thumbnail` is set. Existing preview files are never touched
    /// otherwise.
    pub fn generate_some(
        &self,
        identifier: &str,
        bytes: &[u8],
        thumbnail: bool,
        region: Option<Rect>,
    ) -> Thumbnails {
        if !thumbnail && region.is_none() {
            return Thumbnails::default();
        }
        let img = match image::load_from_memory(bytes) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(identifier, "Cannot decode image for thumbnails: {}", e);
                return Thumbnails::default();
            }
        };
        if let Err(e) = std::fs::create_dir_all(&self.output_dir) {
            tracing::error!(
                "Cannot create thumbnail directory {}: {}",
                self.output_dir.display(),
                e
            );
            return Thumbnails::default();
        }

        let thumbnail = thumbnail
            .then(|| self.write(&resize_to_width(&img, THUMBNAIL_WIDTH), identifier, "thumb"))
            .flatten();
        let qr_crop = region.and_then(|rect| {
            let (x, y, w, h) = padded_crop(rect, img.width(), img.height())?;
            self.write(&img.crop_imm(x, y, w, h), identifier, "qr")
        });
        Thumbnails { thumbnail, qr_crop }
    }

    fn write(&self, img: &DynamicImage, identifier: &str, kind: &str) -> Option<PathBuf> {
        let path = self.output_dir.join(preview_name(identifier, kind));
        // JPEG has no alpha channel.
        match img.to_rgb8().save_with_format(&path, ImageFormat::Jpeg) {
            Ok(()) => {
                tracing::debug!(identifier, "Wrote {}", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::error!(identifier, "Failed to write {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Resize to `width`, scaling the height proportionally (at least 1 px).
pub fn resize_to_width(img: &DynamicImage, width: u32) -> DynamicImage {
    let height = ((img.height() as f64 * width as f64 / img.width().max(1) as f64) as u32).max(1);
    img.resize_exact(width, height, FilterType::Triangle)
}

/// Expand `rect` by [`QR_PADDING`] on each side and clamp it to the image.
/// Returns `(x, y, width, height)`, or `None` when nothing is left.
pub fn padded_crop(rect: Rect, img_width: u32, img_height: u32) -> Option<(u32, u32, u32, u32)> {
    let pad_w = (rect.width as f64 * QR_PADDING) as u32;
    let pad_h = (rect.height as f64 * QR_PADDING) as u32;
    let x1 = rect.left.saturating_sub(pad_w);
    let y1 = rect.top.saturating_sub(pad_h);
    let x2 = (rect.left + rect.width + pad_w).min(img_width);
    let y2 = (rect.top + rect.height + pad_h).min(img_height);
    (x2 > x1 && y2 > y1).then(|| (x1, y1, x2 - x1, y2 - y1))
}

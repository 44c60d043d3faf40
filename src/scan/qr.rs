//! QR code matching.
//!
//! Decoding never fails loudly: corrupt images, images without a code and
//! codes whose payload is blank all produce `None`.

use image::GrayImage;

use crate::types::ScanRegion;

/// Fraction of each dimension scanned in [`ScanRegion::TopLeft`] mode.
const TOP_LEFT_FRACTION: f64 = 0.45;

/// Axis-aligned bounding box of a detected code, in full-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrMatch {
    /// Trimmed payload; never empty.
    pub identifier: String,
    pub region: Rect,
}

/// Bytes -> identifier lookup used by the sync loop.
pub trait CodeMatcher: Send + Sync {
    fn find(&self, bytes: &[u8]) -> Option<QrMatch>;
}

/// [`CodeMatcher`] backed by `rqrr`.
#[derive(Debug, Clone, Copy)]
pub struct QrScanner {
    region: ScanRegion,
}

impl QrScanner {
    pub fn new(region: ScanRegion) -> Self {
        Self { region }
    }

    /// Scan an already-decoded image.
    pub fn find_in(&self, image: &GrayImage) -> Option<QrMatch> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let (scan_w, scan_h) = match self.region {
            ScanRegion::Full => (width, height),
            ScanRegion::TopLeft => (
                ((width as f64 * TOP_LEFT_FRACTION) as u32).max(1),
                ((height as f64 * TOP_LEFT_FRACTION) as u32).max(1),
            ),
        };

        // The scanned window is anchored at the origin, so grid coordinates
        // are already in full-image space.
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(scan_w as usize, scan_h as usize, |x, y| {
                image.get_pixel(x as u32, y as u32).0[0]
            });

        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_meta, content)) => {
                    let identifier = content.trim();
                    if identifier.is_empty() {
                        tracing::debug!("Ignoring QR code with a blank payload");
                        continue;
                    }
                    return Some(QrMatch {
                        identifier: identifier.to_string(),
                        region: bounding_rect(&grid.bounds, width, height),
                    });
                }
                Err(e) => tracing::debug!("QR grid failed to decode: {:?}", e),
            }
        }
        None
    }
}

impl Default for QrScanner {
    fn default() -> Self {
        Self::new(ScanRegion::Full)
    }
}

impl CodeMatcher for QrScanner {
    fn find(&self, bytes: &[u8]) -> Option<QrMatch> {
        match image::load_from_memory(bytes) {
            Ok(decoded) => self.find_in(&decoded.to_luma8()),
            Err(e) => {
                tracing::debug!("Image could not be decoded for QR scan: {}", e);
                None
            }
        }
    }
}

/// Bounding box of the four grid corners, clamped to the image.
fn bounding_rect(corners: &[rqrr::Point; 4], width: u32, height: u32) -> Rect {
    let clamp_x = |v: i32| v.clamp(0, width as i32) as u32;
    let clamp_y = |v: i32| v.clamp(0, height as i32) as u32;
    let min_x = corners.iter().map(|p| p.x).min().unwrap_or(0);
    let max_x = corners.iter().map(|p| p.x).max().unwrap_or(0);
    let min_y = corners.iter().map(|p| p.y).min().unwrap_or(0);
    let max_y = corners.iter().map(|p| p.y).max().unwrap_or(0);
    let left = clamp_x(min_x);
    let top = clamp_y(min_y);
    Rect {
        left,
        top,
        width: clamp_x(max_x).saturating_sub(left),
        height: clamp_y(max_y).saturating_sub(top),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Luma, Rgb, RgbImage};
    use std::io::Cursor;

    /// Render `payload` as a QR code at `(left, top)` on a white canvas.
    pub(crate) fn qr_canvas(payload: &str, width: u32, height: u32, left: u32, top: u32) -> GrayImage {
        let code = qrcode::QrCode::new(payload.as_bytes()).unwrap();
        let modules = code.width() as u32;
        let colors = code.to_colors();
        let scale = 8;
        let mut img = GrayImage::from_pixel(width, height, Luma([255]));
        for (i, color) in colors.iter().enumerate() {
            if *color != qrcode::Color::Dark {
                continue;
            }
            let mx = i as u32 % modules;
            let my = i as u32 / modules;
            for dy in 0..scale {
                for dx in 0..scale {
                    img.put_pixel(left + mx * scale + dx, top + my * scale + dy, Luma([0]));
                }
            }
        }
        img
    }

    /// Encode a QR canvas as PNG bytes.
    pub(crate) fn qr_png(payload: &str, width: u32, height: u32, left: u32, top: u32) -> Vec<u8> {
        let img = qr_canvas(payload, width, height, left, top);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    pub(crate) fn blank_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 180, 150]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_finds_code_and_region() {
        let bytes = qr_png("MPO-42", 600, 600, 100, 120);
        let found = QrScanner::default().find(&bytes).unwrap();
        assert_eq!(found.identifier, "MPO-42");
        assert!(found.region.left >= 90 && found.region.left <= 110);
        assert!(found.region.top >= 110 && found.region.top <= 130);
        assert!(found.region.width > 100);
    }

    #[test]
    fn test_payload_is_trimmed() {
        let bytes = qr_png("  FA-7 \n", 500, 500, 60, 60);
        assert_eq!(QrScanner::default().find(&bytes).unwrap().identifier, "FA-7");
    }

    #[test]
    fn test_blank_payload_is_no_match() {
        let bytes = qr_png("   ", 500, 500, 60, 60);
        assert_eq!(QrScanner::default().find(&bytes), None);
    }

    #[test]
    fn test_no_code_is_none() {
        assert_eq!(QrScanner::default().find(&blank_png(200, 100)), None);
    }

    #[test]
    fn test_corrupt_bytes_are_none() {
        assert_eq!(QrScanner::default().find(b"\xff\xd8not really a jpeg"), None);
        assert_eq!(QrScanner::default().find(&[]), None);
    }

    #[test]
    fn test_top_left_region_ignores_other_corners() {
        let scanner = QrScanner::new(ScanRegion::TopLeft);
        let corner = qr_png("MPO-1", 1000, 1000, 40, 40);
        assert_eq!(scanner.find(&corner).unwrap().identifier, "MPO-1");

        let far = qr_png("MPO-2", 1000, 1000, 700, 700);
        assert_eq!(scanner.find(&far), None);
        assert_eq!(QrScanner::default().find(&far).unwrap().identifier, "MPO-2");
    }

    #[test]
    fn test_bounding_rect_clamps() {
        let corners = [
            rqrr::Point { x: -5, y: 10 },
            rqrr::Point { x: 50, y: 8 },
            rqrr::Point { x: 52, y: 70 },
            rqrr::Point { x: -3, y: 68 },
        ];
        let rect = bounding_rect(&corners, 40, 100);
        assert_eq!(rect, Rect { left: 0, top: 8, width: 40, height: 62 });
    }
}

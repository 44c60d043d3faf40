use std::io::Cursor;

use chrono::NaiveDateTime;
use exif::{Exif, In, Tag, Value};

/// Best-effort descriptive metadata read from an image's EXIF block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMetadata {
    /// `"{make} {model}"`, trimmed.
    pub camera: Option<String>,
    /// `"{lat:.5}, {lon:.5}"` in signed decimal degrees.
    pub location: Option<String>,
    /// `DateTimeOriginal` as `YYYY-MM-DD HH:MM:SS`.
    pub captured_at: Option<String>,
}

/// Read camera, location and capture time from image bytes.
///
/// Never fails: images without EXIF, or with unreadable EXIF, yield all
/// fields absent.
pub fn extract_metadata(bytes: &[u8]) -> ImageMetadata {
    let exif_data = match exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif_data) => exif_data,
        Err(e) => {
            tracing::debug!("No EXIF data: {}", e);
            return ImageMetadata::default();
        }
    };

    ImageMetadata {
        camera: camera_label(&exif_data),
        location: location(&exif_data),
        captured_at: ascii(&exif_data, Tag::DateTimeOriginal).map(|raw| normalize_datetime(&raw)),
    }
}

/// First ASCII value of a primary-IFD tag, trimmed of whitespace and NULs.
fn ascii(exif_data: &Exif, tag: Tag) -> Option<String> {
    let field = exif_data.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(values) => {
            let raw = values.first()?;
            let text = String::from_utf8_lossy(raw);
            let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            (!text.is_empty()).then(|| text.to_string())
        }
        _ => None,
    }
}

/// Rational values of a tag. A zero denominator anywhere makes the whole
/// tag unusable.
fn rationals(exif_data: &Exif, tag: Tag) -> Option<Vec<f64>> {
    let field = exif_data.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Rational(values) if !values.is_empty() => values
            .iter()
            .map(|r| Some(r.to_f64()).filter(|v| v.is_finite()))
            .collect(),
        _ => None,
    }
}

fn camera_label(exif_data: &Exif) -> Option<String> {
    let make = ascii(exif_data, Tag::Make).unwrap_or_default();
    let model = ascii(exif_data, Tag::Model).unwrap_or_default();
    let label = format!("{} {}", make, model);
    let label = label.trim();
    (!label.is_empty()).then(|| label.to_string())
}

fn location(exif_data: &Exif) -> Option<String> {
    let lat = rationals(exif_data, Tag::GPSLatitude)?;
    let lat_ref = ascii(exif_data, Tag::GPSLatitudeRef)?;
    let lon = rationals(exif_data, Tag::GPSLongitude)?;
    let lon_ref = ascii(exif_data, Tag::GPSLongitudeRef)?;
    Some(format_location(
        dms_to_decimal(&lat, &lat_ref),
        dms_to_decimal(&lon, &lon_ref),
    ))
}

/// Degrees/minutes/seconds to signed decimal degrees; `S` and `W` are
/// negative. Missing minute or second components count as zero.
pub fn dms_to_decimal(dms: &[f64], reference: &str) -> f64 {
    let component = |i: usize| dms.get(i).copied().unwrap_or(0.0);
    let value = component(0) + component(1) / 60.0 + component(2) / 3600.0;
    if matches!(reference.trim(), "S" | "W" | "s" | "w") {
        -value
    } else {
        value
    }
}

pub fn format_location(lat: f64, lon: f64) -> String {
    format!("{:.5}, {:.5}", lat, lon)
}

/// EXIF stores `YYYY:MM:DD HH:MM:SS`; anything unparseable is kept as-is.
fn normalize_datetime(raw: &str) -> String {
    NaiveDateTime::parse_from_str(raw, "%Y:%m:%d %H:%M:%S")
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

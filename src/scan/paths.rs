use std::path::{Path, PathBuf};

/// Extensions treated as scannable images, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "webp"];

/// File stem for an identifier. Characters outside `[A-Za-z0-9._~-]` are
/// percent-encoded, so distinct identifiers never share a stem and no path
/// separator or reserved character reaches the filesystem.
pub fn file_stem(identifier: &str) -> String {
    let encoded = urlencoding::encode(identifier).into_owned();
    // Leading dots would give hidden files or `..`.
    if let Some(rest) = encoded.strip_prefix('.') {
        return format!("%2E{}", rest);
    }
    encoded
}

/// Lowercased extension without the dot, if any.
pub fn extension(filename: &str) -> Option<String> {
    let base = base_name(filename);
    match base.rfind('.') {
        Some(dot) if dot + 1 < base.len() => Some(base[dot + 1..].to_ascii_lowercase()),
        _ => None,
    }
}

/// Whether an archive entry or file name looks like a scannable image.
pub fn is_image_name(filename: &str) -> bool {
    extension(filename).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Last path component of an archive entry name (`scans/a/p1.jpg` -> `p1.jpg`).
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Local path of the archived image for an identifier: `{dir}/{stem(id)}.{ext}`.
/// The extension comes from the original name, defaulting to `jpg`.
pub fn local_image_path(images_dir: &Path, identifier: &str, original_name: &str) -> PathBuf {
    let ext = extension(original_name).unwrap_or_else(|| "jpg".to_string());
    images_dir.join(format!("{}.{}", file_stem(identifier), ext))
}

/// Remote name of an uploaded preview: `{id}_{kind}.jpg`.
pub fn preview_name(identifier: &str, kind: &str) -> String {
    format!("{}_{}.jpg", file_stem(identifier), kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("FA-7"), "FA-7");
        assert_eq!(file_stem("MPO/12:a?"), "MPO%2F12%3Aa%3F");
        assert_eq!(file_stem("MPO 3"), "MPO%203");
        assert_eq!(file_stem(".."), "%2E.");
    }

    #[test]
    fn test_file_stem_keeps_identifiers_apart() {
        let ids = ["MPO1", "MPO/1", "MPO:1", "MPO%2F1", "MPO 1"];
        let stems: std::collections::HashSet<String> = ids.iter().map(|id| file_stem(id)).collect();
        assert_eq!(stems.len(), ids.len());
    }

    #[test]
    fn test_is_image_name() {
        assert!(is_image_name("scan.JPG"));
        assert!(is_image_name("dir/scan.webp"));
        assert!(is_image_name("a.tiff"));
        assert!(!is_image_name("notes.txt"));
        assert!(!is_image_name("folder/"));
        assert!(!is_image_name("jpg"));
        assert!(!is_image_name("photo.heic"));
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("scans/a/p1.jpg"), "p1.jpg");
        assert_eq!(base_name("p1.jpg"), "p1.jpg");
        assert_eq!(base_name("win\\p2.png"), "p2.png");
    }

    #[test]
    fn test_local_image_path() {
        let dir = Path::new("/assets/images");
        assert_eq!(
            local_image_path(dir, "MPO/1", "IMG_1.PNG"),
            PathBuf::from("/assets/images/MPO%2F1.png")
        );
        assert_eq!(
            local_image_path(dir, "FA-2", "noext"),
            PathBuf::from("/assets/images/FA-2.jpg")
        );
    }

    #[test]
    fn test_preview_name() {
        assert_eq!(preview_name("FA-2", "thumb"), "FA-2_thumb.jpg");
        assert_eq!(preview_name("FA-2", "qr"), "FA-2_qr.jpg");
        assert_ne!(preview_name("MPO/1", "thumb"), preview_name("MPO1", "thumb"));
    }
}

use std::path::Path;

use crate::config::IntakeConfig;
use crate::pipeline::IntakeError;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Bytes needed by `detect_mime_from_bytes`.
pub const HEADER_LEN: usize = 16;

const SIZE_UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Detect a MIME type from magic bytes. Only formats we accept are named.
pub fn detect_mime_from_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        return Some("application/pdf");
    }
    // JPEG: FF D8 FF
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    // PNG: 89 50 4E 47
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some("image/png");
    }
    // HEIF/HEIC: ....ftyp<brand>
    if bytes.len() >= 12 && bytes[4..8] == *b"ftyp" {
        let brand = &bytes[8..12];
        if [b"heic", b"heix", b"mif1", b"msf1"].iter().any(|b| brand == *b) {
            return Some("image/heic");
        }
    }
    None
}

/// Lowercase, drop parameters, and fold `image/jpg` into `image/jpeg`.
pub fn normalize_mime(mime: &str) -> String {
    let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".into(),
        "" => OCTET_STREAM.into(),
        _ => essence,
    }
}

/// Declared type if present, else magic bytes, else the file extension.
pub fn resolve_mime(declared: Option<&str>, header: &[u8], file_name: &str) -> String {
    if let Some(declared) = declared.filter(|m| !m.trim().is_empty()) {
        return normalize_mime(declared);
    }
    if let Some(detected) = detect_mime_from_bytes(header) {
        return detected.into();
    }
    mime_guess::from_path(file_name)
        .first()
        .map(|m| normalize_mime(m.essence_str()))
        .unwrap_or_else(|| OCTET_STREAM.into())
}

/// Strip path components and NUL bytes; never returns an empty name.
pub fn sanitize_filename(original: &str) -> String {
    let last = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original);
    let name = Path::new(last)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let clean: String = name.chars().filter(|c| *c != '\0').take(255).collect();
    if clean.trim().is_empty() {
        "document".to_string()
    } else {
        clean
    }
}

/// Human-readable size: 1024 base, at most two decimals.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", SIZE_UNITS[unit])
}

/// Check a single candidate against the accepted types and the size bound.
pub fn validate_candidate(
    file_name: &str,
    mime_type: &str,
    size_bytes: u64,
    config: &IntakeConfig,
) -> Result<(), IntakeError> {
    if !config.accepts_mime(mime_type) {
        return Err(IntakeError::UnsupportedFile {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
        });
    }
    if size_bytes > config.max_file_size_bytes {
        return Err(IntakeError::FileTooLarge {
            file_name: file_name.to_string(),
            size_bytes,
            max_bytes: config.max_file_size_bytes,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn magic_bytes() {
        assert_eq!(detect_mime_from_bytes(b"%PDF-1.7"), Some("application/pdf"));
        assert_eq!(detect_mime_from_bytes(&[0xFF, 0xD8, 0xFF, 0xE1]), Some("image/jpeg"));
        assert_eq!(
            detect_mime_from_bytes(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]),
            Some("image/png")
        );
        assert_eq!(
            detect_mime_from_bytes(b"\0\0\0\x18ftypheic\0\0\0\0"),
            Some("image/heic")
        );
        assert_eq!(detect_mime_from_bytes(b"\0\0\0\x18ftypisom"), None);
        assert_eq!(detect_mime_from_bytes(b"hello"), None);
    }

    #[test]
    fn jpg_alias_folds_into_jpeg() {
        assert_eq!(normalize_mime("image/jpg"), "image/jpeg");
        assert_eq!(normalize_mime("Image/PNG; charset=binary"), "image/png");
        assert_eq!(normalize_mime(" "), OCTET_STREAM);
    }

    #[test]
    fn resolve_prefers_declared_then_magic_then_extension() {
        assert_eq!(resolve_mime(Some("image/jpg"), b"%PDF", "a.pdf"), "image/jpeg");
        assert_eq!(resolve_mime(None, b"%PDF-1.4", "scan.bin"), "application/pdf");
        assert_eq!(resolve_mime(Some(""), b"", "notes.txt"), "text/plain");
        assert_eq!(resolve_mime(None, b"", "lease.pdf"), "application/pdf");
        assert_eq!(resolve_mime(None, b"", "mystery"), OCTET_STREAM);
    }

    #[test]
    fn sanitize_strips_paths_and_nul() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\card.jpg"), "card.jpg");
        assert_eq!(sanitize_filename("file\0name.pdf"), "filename.pdf");
        assert_eq!(sanitize_filename("my policy (1).pdf"), "my policy (1).pdf");
        assert_eq!(sanitize_filename(""), "document");
        assert_eq!(sanitize_filename("dir/"), "document");
    }

    #[test]
    fn file_size_labels() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(500 * 1024), "500 KB");
        assert_eq!(format_file_size(2 * MIB), "2 MB");
        assert_eq!(format_file_size(2_500_000), "2.38 MB");
    }

    #[test]
    fn size_and_type_bounds() {
        let config = IntakeConfig::default();
        assert!(validate_candidate("a.pdf", "application/pdf", 2 * MIB, &config).is_ok());
        assert!(validate_candidate("b.png", "image/png", 500 * 1024, &config).is_ok());
        assert!(validate_candidate("edge.pdf", "application/pdf", 10 * MIB, &config).is_ok());

        assert!(matches!(
            validate_candidate("big.jpg", "image/jpeg", 15 * MIB, &config),
            Err(IntakeError::FileTooLarge { size_bytes, .. }) if size_bytes == 15 * MIB
        ));
        assert!(matches!(
            validate_candidate("notes.txt", "text/plain", 10, &config),
            Err(IntakeError::UnsupportedFile { .. })
        ));
    }
}

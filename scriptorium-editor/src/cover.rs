//! Checks a cover image must pass before it is uploaded.

use scriptorium_core::config::EditorConfig;
use scriptorium_core::{Error, Result, Session};

/// Field name reported by cover validation errors.
pub const COVER_FIELD: &str = "cover_image";

const SIGNATURES: &[(&str, &[u8])] = &[
    ("image/png", b"\x89PNG\r\n\x1a\n"),
    ("image/jpeg", b"\xff\xd8\xff"),
    ("image/gif", b"GIF87a"),
    ("image/gif", b"GIF89a"),
    ("image/bmp", b"BM"),
];

/// Media type of `bytes`, recognised by their leading signature.
///
/// # Example
///
/// ```rust
/// use scriptorium_editor::cover::sniff_image_type;
///
/// assert_eq!(sniff_image_type(b"GIF89a\x01\x00"), Some("image/gif"));
/// assert_eq!(sniff_image_type(b"plain text"), None);
/// ```
pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    SIGNATURES
        .iter()
        .find(|(_, signature)| bytes.starts_with(signature))
        .map(|(media_type, _)| *media_type)
}

/// Validate an upload: size first, then the image signature, then the
/// session. Returns the detected media type.
pub fn validate_cover(
    bytes: &[u8],
    config: &EditorConfig,
    session: &Session,
) -> Result<&'static str> {
    if bytes.len() > config.max_image_bytes() {
        return Err(Error::validation(
            COVER_FIELD,
            format!("File size must be less than {}MB", config.max_image_size_mb),
        ));
    }

    let media_type = sniff_image_type(bytes)
        .ok_or_else(|| Error::validation(COVER_FIELD, "Please select an image file"))?;

    if !session.is_signed_in() {
        return Err(Error::validation(COVER_FIELD, "Please log in to upload images"));
    }
    Ok(media_type)
}

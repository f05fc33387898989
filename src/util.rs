use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use rand::Rng;

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub(crate) fn base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

pub(crate) fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36_DIGITS[rng.gen_range(0..36)] as char)
        .collect()
}

/// Record identifier: millisecond timestamp in base36 plus a random suffix.
/// Ids generated within the same millisecond stay distinct via the suffix.
pub(crate) fn generate_id(now: DateTime<Utc>) -> String {
    format!("{}{}", base36(now.timestamp_millis() as u128), random_base36(8))
}

/// Namespaced identifier for links, comments and smart albums
/// (`link_...`, `comment_...`, `smart_...`).
pub(crate) fn prefixed_id(prefix: &str, now: DateTime<Utc>) -> String {
    format!(
        "{prefix}_{}{}",
        base36(now.timestamp_millis() as u128),
        random_base36(4)
    )
}

/// Encode a payload as a self-describing data URI. This is the canonical
/// content encoding for `Memory::file_data`.
pub(crate) fn data_uri_from_bytes(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

/// MIME prefix of a data URI, if it has one.
pub(crate) fn data_uri_mime(uri: &str) -> Option<&str> {
    let rest = uri.strip_prefix("data:")?;
    let end = rest.find(';').or_else(|| rest.find(','))?;
    Some(&rest[..end])
}

/// Decoded byte length of a base64 data URI payload.
pub(crate) fn data_uri_byte_len(uri: &str) -> Option<u64> {
    let payload = uri.split_once(";base64,")?.1;
    BASE64.decode(payload).ok().map(|b| b.len() as u64)
}

/// Guess a MIME type from a file extension. Falls back to octet-stream;
/// `category` stays a hint either way, so a miss here is cosmetic.
pub(crate) fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

pub(crate) fn category_for_mime(mime: &str) -> &'static str {
    if mime.starts_with("image/") {
        "Photos"
    } else if mime.starts_with("video/") {
        "Videos"
    } else if mime.starts_with("audio/") {
        "Audio"
    } else if mime.starts_with("text/") {
        "Notes"
    } else {
        "Documents"
    }
}

pub(crate) fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_base36_round_numbers() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        assert_eq!(base36(36 * 36), "100");
    }

    #[test]
    fn test_generate_id_shape() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let id = generate_id(now);
        assert!(id.len() > 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_id(now), generate_id(now));
    }

    #[test]
    fn test_prefixed_id() {
        let now = Utc::now();
        let id = prefixed_id("link", now);
        assert!(id.starts_with("link_"));
    }

    #[test]
    fn test_data_uri_helpers() {
        let uri = data_uri_from_bytes("image/png", b"hello");
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(data_uri_mime(&uri), Some("image/png"));
        assert_eq!(data_uri_byte_len(&uri), Some(5));
        assert_eq!(data_uri_mime("not a uri"), None);
        assert_eq!(data_uri_byte_len("data:text/plain,abc"), None);
    }

    #[test]
    fn test_mime_and_category() {
        assert_eq!(mime_for_extension("JPG"), "image/jpeg");
        assert_eq!(mime_for_extension("weird"), "application/octet-stream");
        assert_eq!(category_for_mime("image/png"), "Photos");
        assert_eq!(category_for_mime("video/mp4"), "Videos");
        assert_eq!(category_for_mime("application/pdf"), "Documents");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(2048), "2.0 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
    }
}

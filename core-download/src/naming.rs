//! File name derivation for completed transfers.
//!
//! The extension comes from the first source that names one:
//! 1. the server-suggested file name
//! 2. the last path segment of the source URL
//! 3. the response MIME type
//! 4. the media kind default (`mp4` / `m4a`)
//!
//! The base name is the sanitized item title.

use core_library::MediaKind;
use url::Url;

/// Longest base name kept, in characters.
pub const MAX_BASE_NAME_CHARS: usize = 120;

const FALLBACK_BASE_NAME: &str = "download";
const FORBIDDEN_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Base name and extension chosen for a finished file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileName {
    pub base: String,
    pub extension: String,
}

/// Choose the on-disk name for a finished transfer.
pub fn derive_file_name(
    title: &str,
    suggested_filename: Option<&str>,
    mime_type: Option<&str>,
    source_url: &str,
    kind: MediaKind,
) -> FileName {
    let extension = suggested_filename
        .and_then(extension_of)
        .or_else(|| url_extension(source_url))
        .or_else(|| mime_type.and_then(extension_for_mime))
        .unwrap_or_else(|| kind.default_extension().to_string());

    FileName {
        base: sanitize_base_name(title),
        extension,
    }
}

/// Make a title safe to use as a file name on every platform.
pub fn sanitize_base_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_control() || FORBIDDEN_CHARS.contains(&c) {
                ' '
            } else {
                c
            }
        })
        .collect();

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_BASE_NAME_CHARS).collect();
    let trimmed = truncated.trim().trim_matches('.').trim();

    if trimmed.is_empty() {
        FALLBACK_BASE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Media kind implied by the URL's file extension, if any.
pub fn infer_kind(source_url: &str) -> Option<MediaKind> {
    url_extension(source_url).and_then(|ext| MediaKind::from_extension(&ext))
}

/// Title to use when the producer supplied none: the URL's file stem.
pub fn title_from_url(source_url: &str) -> Option<String> {
    let url = Url::parse(source_url).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode_binary(segment.as_bytes());
    let decoded = String::from_utf8_lossy(&decoded).into_owned();
    let stem = match decoded.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => decoded,
    };
    let stem = stem.trim();
    (!stem.is_empty()).then(|| stem.to_string())
}

fn url_extension(source_url: &str) -> Option<String> {
    let url = Url::parse(source_url).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    extension_of(segment)
}

fn extension_of(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn extension_for_mime(mime_type: &str) -> Option<String> {
    let ext = match mime_type.trim().to_ascii_lowercase().as_str() {
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "video/x-matroska" => "mkv",
        "video/3gpp" => "3gp",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => "m4a",
        "audio/aac" => "aac",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/flac" => "flac",
        "audio/ogg" => "ogg",
        "audio/opus" => "opus",
        _ => return None,
    };
    Some(ext.to_string())
}

//! Utility functions for URLs, file names and paths

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use url::Url;

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Resolve a possibly-relative resource locator against the service origin
///
/// Absolute `http`/`https` URLs are returned unchanged; anything else is joined
/// onto `origin`.
///
/// # Examples
///
/// ```
/// use jobwatch::utils::resolve_url;
/// use url::Url;
///
/// let origin = Url::parse("http://localhost:8000").unwrap();
/// let url = resolve_url(&origin, "/downloads/clip.mp4").unwrap();
/// assert_eq!(url.as_str(), "http://localhost:8000/downloads/clip.mp4");
/// ```
pub fn resolve_url(origin: &Url, raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::InvalidUrl("empty resource locator".to_string()));
    }

    if let Ok(absolute) = Url::parse(raw)
        && matches!(absolute.scheme(), "http" | "https")
    {
        return Ok(absolute);
    }

    origin
        .join(raw)
        .map_err(|e| Error::InvalidUrl(format!("{}: {}", raw, e)))
}

/// Extract a file name from a `Content-Disposition` header value
///
/// The RFC 5987 form (`filename*=UTF-8''...`) wins over the plain
/// `filename=` form. Returns `None` when neither yields a usable name.
///
/// # Examples
///
/// ```
/// use jobwatch::utils::content_disposition_filename;
///
/// assert_eq!(
///     content_disposition_filename("attachment; filename*=UTF-8''report.mp4").as_deref(),
///     Some("report.mp4")
/// );
/// assert_eq!(
///     content_disposition_filename(r#"attachment; filename="clip.webm""#).as_deref(),
///     Some("clip.webm")
/// );
/// assert_eq!(content_disposition_filename("inline"), None);
/// ```
pub fn content_disposition_filename(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in value.split(';') {
        let part = part.trim();
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim();

        if key == "filename*" {
            // charset'lang'percent-encoded
            if let Some(idx) = raw.rfind('\'')
                && let Ok(decoded) = urlencoding::decode(raw[idx + 1..].trim_matches('"'))
            {
                extended = sanitize_file_name(&decoded);
            }
        } else if key == "filename" {
            plain = sanitize_file_name(raw.trim_matches('"'));
        }
    }

    extended.or(plain)
}

/// Reduce a server- or caller-supplied name to a safe single path component
///
/// Directory parts are dropped and control characters removed. Returns `None`
/// if nothing usable remains.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return None;
    }
    Some(cleaned.to_string())
}

/// Get a path that does not collide with an existing file
///
/// Returns `path` if it is free, otherwise appends ` (1)`, ` (2)`, ... before
/// the extension until a free name is found.
pub fn get_unique_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Other(format!("cannot extract file stem from {}", path.display())))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().ok_or_else(|| {
        Error::Other(format!(
            "cannot extract parent directory from {}",
            path.display()
        ))
    })?;

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let new_name = match extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        let new_path = parent.join(new_name);
        if !new_path.exists() {
            return Ok(new_path);
        }
    }

    Err(Error::Other(format!(
        "could not find a free file name for {} after {} attempts",
        path.display(),
        MAX_RENAME_ATTEMPTS
    )))
}

/// Human-readable size for a value reported in megabytes
///
/// # Examples
///
/// ```
/// use jobwatch::utils::format_file_size;
///
/// assert_eq!(format_file_size(0.5), "512.0 KB");
/// assert_eq!(format_file_size(12.34), "12.3 MB");
/// ```
pub fn format_file_size(size_mb: f64) -> String {
    if size_mb < 1.0 {
        format!("{:.1} KB", size_mb * 1024.0)
    } else {
        format!("{:.1} MB", size_mb)
    }
}

/// Whether the job service can convert media from this URL
///
/// Accepts `youtube.com` (and its subdomains) and `youtu.be`.
pub fn is_supported_source(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    match parsed.host_str() {
        Some(host) => {
            let host = host.to_ascii_lowercase();
            host == "youtube.com" || host.ends_with(".youtube.com") || host == "youtu.be"
        }
        None => false,
    }
}

/// Lenient timestamp (de)serialization
///
/// The job service emits RFC 3339 timestamps, or naive ISO timestamps that are
/// taken as UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub(crate) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}

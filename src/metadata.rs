//! Key/value attributes embedded in thumbnail images
//!
//! Two keys are mandatory on every cache entry: the source URI and the source
//! mtime. The rest are informational and only written when known.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::MetadataError;

/// Mandatory: canonical URI of the source
pub const KEY_URI: &str = "Thumb::URI";
/// Mandatory: source mtime in decimal seconds
pub const KEY_MTIME: &str = "Thumb::MTime";
/// Source image width in pixels
pub const KEY_WIDTH: &str = "Thumb::Image::Width";
/// Source image height in pixels
pub const KEY_HEIGHT: &str = "Thumb::Image::Height";
/// Source file size in bytes
pub const KEY_SIZE: &str = "Thumb::Size";
/// MIME type of the source
pub const KEY_MIME: &str = "Thumb::Mimetype";
/// Page count of a source document
pub const KEY_DOC_PAGES: &str = "Thumb::Document::Pages";
/// Duration of a source video, in seconds
pub const KEY_MOVIE_LENGTH: &str = "Thumb::Movie::Length";

/// Ordered string-to-string map stored in a thumbnail.
///
/// Insertion order is kept so entries are written back in the order they
/// were given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(IndexMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing any previous value in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) -> Option<String> {
        self.0.insert(key.into(), value.to_string())
    }

    /// Set `key` only if it is not present yet
    pub fn set_default(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.entry(key.into()).or_insert_with(|| value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy of `extra` (if any) carrying the mandatory keys for a source.
    ///
    /// Values already present in `extra` win over the computed ones.
    pub fn for_source(extra: Option<&Metadata>, uri: &str, mtime: i64) -> Self {
        let mut metadata = extra.cloned().unwrap_or_default();
        metadata.set_default(KEY_MTIME, mtime);
        metadata.set_default(KEY_URI, uri);
        metadata
    }

    /// Serialize to JSON (used by the command line `info` output)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Self::new();
        metadata.extend(iter);
        metadata
    }
}

impl<K: Into<String>, V: ToString> Extend<(K, V)> for Metadata {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

/// The two mandatory attributes of a cache entry, parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbInfo {
    pub uri: String,
    pub mtime: i64,
}

impl ThumbInfo {
    pub fn from_metadata(metadata: &Metadata) -> Result<Self, MetadataError> {
        let uri = metadata
            .get(KEY_URI)
            .ok_or(MetadataError::MissingKey(KEY_URI))?;
        let raw_mtime = metadata
            .get(KEY_MTIME)
            .ok_or(MetadataError::MissingKey(KEY_MTIME))?;
        let mtime = parse_mtime(raw_mtime)
            .ok_or_else(|| MetadataError::InvalidMTime(raw_mtime.to_owned()))?;

        Ok(Self {
            uri: uri.to_owned(),
            mtime,
        })
    }

    /// Does this entry describe `uri` as it was at `mtime`?
    pub fn matches(&self, uri: &str, mtime: i64) -> bool {
        self.uri == uri && self.mtime == mtime
    }
}

impl TryFrom<&Metadata> for ThumbInfo {
    type Error = MetadataError;

    fn try_from(metadata: &Metadata) -> Result<Self, Self::Error> {
        Self::from_metadata(metadata)
    }
}

/// Integer seconds; some writers store a fractional value, which is truncated
fn parse_mtime(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|secs| secs.is_finite() && secs.abs() < i64::MAX as f64)
            .map(|secs| secs.trunc() as i64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_source_keeps_caller_values() {
        let extra: Metadata = [(KEY_MIME, "image/png"), (KEY_MTIME, "42")].into_iter().collect();
        let metadata = Metadata::for_source(Some(&extra), "file:///tmp/a.png", 1000);

        assert_eq!(metadata.get(KEY_URI), Some("file:///tmp/a.png"));
        assert_eq!(metadata.get(KEY_MTIME), Some("42"));
        assert_eq!(metadata.get(KEY_MIME), Some("image/png"));
        assert_eq!(metadata.len(), 3);
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut metadata = Metadata::new();
        metadata.insert(KEY_URI, "http://x/y.pdf");
        metadata.insert(KEY_MTIME, 0);
        metadata.insert(KEY_DOC_PAGES, 12);
        metadata.insert(KEY_URI, "http://x/z.pdf");

        let keys: Vec<_> = metadata.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, [KEY_URI, KEY_MTIME, KEY_DOC_PAGES]);
        assert_eq!(metadata.get(KEY_URI), Some("http://x/z.pdf"));
    }

    #[test]
    fn test_thumb_info_parsing() {
        let metadata: Metadata = [(KEY_URI, "http://x/y.pdf"), (KEY_MTIME, "1000")]
            .into_iter()
            .collect();
        let info = ThumbInfo::from_metadata(&metadata).unwrap();
        assert_eq!(info.mtime, 1000);
        assert!(info.matches("http://x/y.pdf", 1000));
        assert!(!info.matches("http://x/y.pdf", 1001));
        assert!(!info.matches("http://x/z.pdf", 1000));
    }

    #[test]
    fn test_fractional_mtime_is_truncated() {
        let metadata: Metadata = [(KEY_URI, "u:"), (KEY_MTIME, "1000.9")].into_iter().collect();
        assert_eq!(ThumbInfo::from_metadata(&metadata).unwrap().mtime, 1000);
    }

    #[test]
    fn test_missing_key_differs_from_bad_value() {
        let no_mtime: Metadata = [(KEY_URI, "u:")].into_iter().collect();
        assert_eq!(
            ThumbInfo::from_metadata(&no_mtime),
            Err(MetadataError::MissingKey(KEY_MTIME))
        );

        let no_uri: Metadata = [(KEY_MTIME, "1")].into_iter().collect();
        assert_eq!(
            ThumbInfo::from_metadata(&no_uri),
            Err(MetadataError::MissingKey(KEY_URI))
        );

        let garbage: Metadata = [(KEY_URI, "u:"), (KEY_MTIME, "yesterday")].into_iter().collect();
        assert_eq!(
            ThumbInfo::from_metadata(&garbage),
            Err(MetadataError::InvalidMTime("yesterday".into()))
        );
    }

    #[test]
    fn test_json_roundtrip_is_a_flat_object() {
        let metadata: Metadata = [(KEY_URI, "http://x/y.pdf"), (KEY_MTIME, "0")]
            .into_iter()
            .collect();
        let json = metadata.to_json().unwrap();
        assert!(json.contains("\"Thumb::URI\": \"http://x/y.pdf\""));
        assert_eq!(Metadata::from_json(&json).unwrap(), metadata);
    }
}

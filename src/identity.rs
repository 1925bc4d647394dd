//! Source identity
//!
//! Every source (local path or URI) is reduced to a canonical URI. The MD5 of
//! that URI names the cache entry, so two references that canonicalize to the
//! same URI share one thumbnail.

use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use url::Url;

use crate::error::{Error, Result};

/// `scheme:` prefix, as in RFC 3986
static URI_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9.+-]*:").expect("scheme pattern is valid"));

/// Bytes left as they are in `file://` paths; everything else is escaped
const PATH_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

/// Canonical URI and cache file stem of one source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    uri: String,
    digest: String,
}

impl Identity {
    /// Resolve any source reference (path or URI)
    pub fn of(reference: &str) -> Result<Self> {
        let uri = canonicalize(reference)?;
        let digest = digest_uri(&uri);
        Ok(Self { uri, digest })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Lower-case hex MD5 of the URI
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// `<digest>.png`
    pub fn file_name(&self) -> String {
        format!("{}.png", self.digest)
    }
}

/// True when `reference` starts with a URI scheme
pub fn is_uri(reference: &str) -> bool {
    URI_SCHEME.is_match(reference)
}

/// Canonical URI of a source reference.
///
/// URIs are kept verbatim. Anything else is a local path, made absolute
/// against the current directory and turned into a `file://` URI in which
/// every byte except `A-Z a-z 0-9 / _ . - ~` is percent-encoded.
pub fn canonicalize(reference: &str) -> Result<String> {
    if is_uri(reference) {
        return Ok(reference.to_owned());
    }

    let absolute = absolute_path(Path::new(reference)).map_err(|source| {
        Error::InvalidReference {
            reference: reference.to_owned(),
            source,
        }
    })?;
    Ok(file_uri(&absolute))
}

#[cfg(unix)]
fn file_uri(absolute: &Path) -> String {
    use std::os::unix::ffi::OsStrExt;
    format!("file://{}", percent_encode(absolute.as_os_str().as_bytes(), PATH_SAFE))
}

#[cfg(not(unix))]
fn file_uri(absolute: &Path) -> String {
    let path = absolute.to_string_lossy().replace('\\', "/");
    let path = if path.starts_with('/') { path } else { format!("/{path}") };
    format!("file://{}", percent_encode(path.as_bytes(), PATH_SAFE))
}

/// Cache file stem of a source reference
pub fn identifier(reference: &str) -> Result<String> {
    canonicalize(reference).map(|uri| digest_uri(&uri))
}

fn digest_uri(uri: &str) -> String {
    hex::encode(Md5::digest(uri.as_bytes()))
}

/// Local file behind a reference, if there is one.
///
/// Plain paths are returned as given; `file://` URIs are decoded back to a
/// path. Other schemes have no local file.
pub fn local_path(reference: &str) -> Option<PathBuf> {
    if !is_uri(reference) {
        return Some(PathBuf::from(reference));
    }

    Url::parse(reference)
        .ok()
        .filter(|url| url.scheme() == "file")
        .and_then(|url| url.to_file_path().ok())
}

/// Modification time of a local source, truncated to whole seconds
pub fn source_mtime(reference: &str) -> Result<i64> {
    let path = local_path(reference).ok_or_else(|| Error::MissingMTime(reference.to_owned()))?;
    let metadata = fs::metadata(&path)?;
    mtime_seconds(&metadata)
}

/// `mtime` of a stat result in whole seconds, truncated toward zero
pub(crate) fn mtime_seconds(metadata: &fs::Metadata) -> Result<i64> {
    let modified = metadata.modified()?;
    let seconds = match modified.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_secs()),
        Err(before) => i64::try_from(before.duration().as_secs()).map(|secs| -secs),
    };

    seconds.map_err(|_| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            "modification time out of range",
        ))
    })
}

/// Absolute, lexically normalized form of `path`
pub(crate) fn absolute_path(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(path)))
    }
}

/// Drop `.` components and fold `..` into their parent without touching the
/// file system (symlinks are not resolved).
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() && !normalized.has_root() {
                    normalized.push(component);
                }
            }
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                normalized.push(component)
            }
        }
    }
    normalized
}

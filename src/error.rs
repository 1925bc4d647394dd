use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Result type used across the thumbnail store
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the thumbnail store.
///
/// Generation failures (a source that cannot be decoded, a backend that is
/// missing) are not returned by `Store::get` / `Store::create`: those report
/// them as an absent thumbnail instead.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unsupported thumbnail size: {0:?}")]
    InvalidSize(String),
    #[error("cannot resolve source reference {reference:?}: {source}")]
    InvalidReference {
        reference: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid application name for fail markers: {0:?}")]
    InvalidAppName(String),
    #[error("source is not a local file: {0}")]
    NotLocal(String),
    #[error("no mtime given for non-local source {0}")]
    MissingMTime(String),
    #[error("no image processing backend is available")]
    BackendUnavailable,
    #[error("cannot decode source image {}: {reason}", path.display())]
    SourceUnreadable { path: PathBuf, reason: String },
    #[error("invalid thumbnail metadata: {0}")]
    Metadata(#[from] MetadataError),
    #[error("image backend error: {0}")]
    Backend(#[source] BackendError),
    #[error("there was an i/o error: {0}")]
    Io(#[from] io::Error),
}

impl From<BackendError> for Error {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::Unavailable => Self::BackendUnavailable,
            BackendError::Unreadable { path, reason } => Self::SourceUnreadable { path, reason },
            other => Self::Backend(other),
        }
    }
}

impl From<tempfile::PathPersistError> for Error {
    fn from(value: tempfile::PathPersistError) -> Self {
        Self::Io(value.error)
    }
}

/// Failures reported by an image processing backend
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("backend is not available on this system")]
    Unavailable,
    #[error("cannot decode {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },
    #[cfg(feature = "image-backend")]
    #[error("error while processing the image (via the `image` crate): {0}")]
    Image(#[from] image::ImageError),
    #[error("error while encoding png: {0}")]
    PngEncoding(#[from] png::EncodingError),
    #[error("error while decoding png: {0}")]
    PngDecoding(#[from] png::DecodingError),
    #[error("`{program}` exited with {status}: {stderr}")]
    Command {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("there was an i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Problems with the mandatory keys embedded in a thumbnail.
///
/// A missing key and an unparsable value are kept apart so callers can tell a
/// foreign PNG from a damaged thumbnail.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("mandatory key `{0}` is missing")]
    MissingKey(&'static str),
    #[error("stored mtime {0:?} is not a number")]
    InvalidMTime(String),
}

//! Image processing backends
//!
//! The store never touches pixels itself. It hands decoding, resizing and
//! metadata encoding to a [`Backend`]. Candidates are probed in a fixed
//! priority order and the first available one is bound for the whole process.

use once_cell::sync::OnceCell;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::BackendError;
use crate::metadata::Metadata;

mod magick;
#[cfg(feature = "image-backend")]
mod native;

pub use magick::MagickBackend;
#[cfg(feature = "image-backend")]
pub use native::NativeBackend;

/// Capability the store needs from an imaging toolkit.
///
/// Every writing method receives `out`, an existing temp file it must
/// overwrite with a complete PNG. Publishing that file is the caller's job.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether the facilities this backend relies on are present
    fn is_available(&self) -> bool;

    /// Decode `source`, shrink it to fit a `box_size` square (never enlarging)
    /// and write it as PNG with `metadata` plus the source dimensions.
    fn decode_and_resize(
        &self,
        source: &Path,
        box_size: u32,
        metadata: &Metadata,
        out: &Path,
    ) -> Result<(), BackendError>;

    /// Write a 1x1 image carrying `metadata` (fail markers)
    fn write_blank(&self, metadata: &Metadata, out: &Path) -> Result<(), BackendError>;

    /// All text metadata embedded in the image at `path`
    fn read_metadata(&self, path: &Path) -> Result<Metadata, BackendError>;

    /// Re-encode the image at `image` to `out` with `metadata` attached,
    /// keeping its pixels
    fn reattach_metadata(
        &self,
        image: &Path,
        metadata: &Metadata,
        out: &Path,
    ) -> Result<(), BackendError>;
}

/// Candidate backends, highest priority first
pub fn candidates() -> Vec<Arc<dyn Backend>> {
    let mut candidates: Vec<Arc<dyn Backend>> = Vec::new();
    #[cfg(feature = "image-backend")]
    candidates.push(Arc::new(NativeBackend));
    candidates.push(Arc::new(MagickBackend::locate()));
    candidates
}

/// First available backend of `candidates`
pub fn probe<I>(candidates: I) -> Option<Arc<dyn Backend>>
where
    I: IntoIterator<Item = Arc<dyn Backend>>,
{
    candidates.into_iter().find(|backend| {
        let available = backend.is_available();
        debug!(backend = backend.name(), available, "Probed image backend");
        available
    })
}

/// Process-wide backend, probed on first use and fixed afterwards
pub fn detect() -> Option<Arc<dyn Backend>> {
    static BOUND: OnceCell<Option<Arc<dyn Backend>>> = OnceCell::new();
    BOUND.get_or_init(|| probe(candidates())).clone()
}

//! The thumbnail store
//!
//! [`Store`] ties everything together: it derives cache paths, checks
//! entries for freshness, generates missing thumbnails through the bound
//! backend, adopts thumbnails built by the caller and records failures.
//!
//! Concurrency is delegated to the file system: every write goes through a
//! private temp file renamed into place, so several processes may race on the
//! same entry without locks and the last rename wins.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tracing::{debug, warn};

use crate::atomic;
use crate::backend::{self, Backend};
use crate::error::{Error, Result};
use crate::identity::{self, Identity};
use crate::metadata::{Metadata, KEY_SIZE};
use crate::size::SizeClass;

mod config;
mod paths;
mod validity;

pub use config::{StoreConfig, THUMBNAILS_DIR};
pub use paths::FAIL_DIR;

/// Handle on a thumbnail cache directory
#[derive(Clone)]
pub struct Store {
    config: StoreConfig,
    backend: Option<Arc<dyn Backend>>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("cache_root", &self.config.cache_root)
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .finish()
    }
}

impl Store {
    /// Store at the user's standard location, with the process-wide backend
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(StoreConfig::from_env()?))
    }

    /// Store at `config`, with the process-wide backend
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            backend: backend::detect(),
        }
    }

    pub fn with_backend(config: StoreConfig, backend: Arc<dyn Backend>) -> Self {
        Self {
            config,
            backend: Some(backend),
        }
    }

    /// Store that can only answer path questions
    pub fn without_backend(config: StoreConfig) -> Self {
        Self {
            config,
            backend: None,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn cache_root(&self) -> &Path {
        &self.config.cache_root
    }

    pub fn backend(&self) -> Option<&dyn Backend> {
        self.backend.as_deref()
    }

    fn require_backend(&self) -> Result<&dyn Backend> {
        self.backend().ok_or(Error::BackendUnavailable)
    }

    /// Path the thumbnail of `reference` has (or would have) for `size`.
    ///
    /// The file may be missing or obsolete; see [`Store::try_get`].
    pub fn thumbnail_path(&self, reference: &str, size: SizeClass) -> Result<PathBuf> {
        paths::thumbnail_path(self.cache_root(), reference, size)
    }

    /// Path of the fail marker `app` would write for `reference`
    pub fn fail_path(&self, reference: &str, app: &str) -> Result<PathBuf> {
        paths::fail_path(self.cache_root(), reference, app)
    }

    /// Create `normal/`, `large/` and `fail/` and make them private, including
    /// ones that already existed
    pub fn ensure_layout(&self) -> Result<()> {
        let dirs = [
            SizeClass::Normal.dir_name(),
            SizeClass::Large.dir_name(),
            FAIL_DIR,
        ];
        for name in dirs {
            let dir = self.cache_root().join(name);
            if dir.is_dir() {
                paths::restrict_dir(&dir)?;
            } else {
                paths::create_private_dir(&dir)?;
            }
        }
        Ok(())
    }

    /// New empty file inside the `size` directory, for callers that render a
    /// thumbnail themselves before handing it to [`Store::put`]
    pub fn scratch_file(&self, size: SizeClass) -> Result<PathBuf> {
        let dir = self.cache_root().join(size.dir_name());
        paths::create_private_dir(&dir)?;
        Ok(atomic::temp_file_in(&dir)?.keep()?)
    }

    /// Existing, fresh thumbnail of `reference`.
    ///
    /// Without `size`, large is tried before normal. `mtime` may only be
    /// omitted for local sources. A reference that is itself a cache entry is
    /// returned as soon as it exists, without checking its metadata.
    pub fn try_get(
        &self,
        reference: &str,
        size: Option<SizeClass>,
        mtime: Option<i64>,
    ) -> Result<Option<PathBuf>> {
        let sizes = match size {
            Some(size) => vec![size],
            None => SizeClass::PROBE_ORDER.to_vec(),
        };
        let mtime = match mtime {
            Some(mtime) => mtime,
            None => identity::source_mtime(reference)?,
        };
        let identity = Identity::of(reference)?;

        for size in sizes {
            let thumb = self.thumbnail_path(reference, size)?;
            if !thumb.is_file() {
                continue;
            }
            if Path::new(reference) == thumb {
                debug!(path = %thumb.display(), "Source is a cache entry");
                return Ok(Some(thumb));
            }
            if self.is_valid(&thumb, identity.uri(), mtime) {
                debug!(uri = identity.uri(), path = %thumb.display(), "Thumbnail hit");
                return Ok(Some(thumb));
            }
        }

        Ok(None)
    }

    /// Fresh thumbnail of a local image, generating it if needed.
    ///
    /// When `fail_app` is given, a valid fail marker of that app skips
    /// generation, and a failed generation leaves one behind. Without `size`
    /// any existing size is accepted and large is generated.
    pub fn get(
        &self,
        reference: &str,
        size: Option<SizeClass>,
        fail_app: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        if let Some(thumb) = self.try_get(reference, size, None)? {
            return Ok(Some(thumb));
        }

        if let Some(app) = fail_app {
            if self.is_failed(reference, app, None)? {
                debug!(reference, app, "Thumbnail previously failed, skipping");
                return Ok(None);
            }
        }

        self.create(reference, size.unwrap_or(SizeClass::Large), None, fail_app)
    }

    /// Generate the thumbnail of a local image, replacing any existing one.
    ///
    /// Returns `Ok(None)` when the image cannot be thumbnailed (unreadable
    /// source, no backend); with `fail_app` a fail marker records it.
    /// File system errors on the cache itself are returned.
    pub fn create(
        &self,
        reference: &str,
        size: SizeClass,
        metadata: Option<&Metadata>,
        fail_app: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        let source =
            identity::local_path(reference).ok_or_else(|| Error::NotLocal(reference.to_owned()))?;
        let stat = fs::metadata(&source)?;
        let mtime = identity::mtime_seconds(&stat)?;
        let identity = Identity::of(reference)?;
        let dest = self.thumbnail_path(reference, size)?;

        let Some(backend) = self.backend() else {
            warn!(reference, "No image backend available, cannot create thumbnail");
            return Ok(None);
        };

        let mut info = Metadata::for_source(metadata, identity.uri(), mtime);
        info.insert(KEY_SIZE, stat.len());

        paths::create_private_dir(atomic::parent_dir(&dest)?)?;
        let generated = atomic::publish(&dest, |out| {
            Ok(backend.decode_and_resize(&source, size.pixels(), &info, out)?)
        });

        match generated {
            Ok(path) => {
                debug!(
                    backend = backend.name(),
                    path = %path.display(),
                    "Generated thumbnail"
                );
                Ok(Some(path))
            }
            Err(Error::BackendUnavailable) => {
                warn!(backend = backend.name(), "Image backend became unavailable");
                Ok(None)
            }
            Err(e @ (Error::SourceUnreadable { .. } | Error::Backend(_))) => {
                warn!(reference, "Failed to create thumbnail: {e}");
                if let Some(app) = fail_app {
                    // Mandatory keys only: the caller's may be what failed
                    self.put_fail(reference, app, Some(mtime), None)?;
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Adopt a thumbnail rendered by the caller.
    ///
    /// `built` is re-encoded with the mandatory metadata plus `metadata` and
    /// published at the thumbnail path of `reference`, which is returned.
    /// `built` is removed only once that succeeded; on error it is left
    /// untouched. `mtime` may only be omitted for local sources.
    pub fn put(
        &self,
        reference: &str,
        size: SizeClass,
        built: &Path,
        mtime: Option<i64>,
        metadata: Option<&Metadata>,
    ) -> Result<PathBuf> {
        let backend = self.require_backend()?;
        let mtime = match mtime {
            Some(mtime) => mtime,
            None => identity::source_mtime(reference)?,
        };
        let identity = Identity::of(reference)?;
        let dest = self.thumbnail_path(reference, size)?;
        let dir = atomic::parent_dir(&dest)?;
        paths::create_private_dir(dir)?;

        let info = Metadata::for_source(metadata, identity.uri(), mtime);
        let staged = Staged::adopt(built, &dest)?;
        atomic::publish(&dest, |out| {
            Ok(backend.reattach_metadata(staged.path(), &info, out)?)
        })?;
        staged.release()?;

        debug!(uri = identity.uri(), path = %dest.display(), "Stored external thumbnail");
        Ok(dest)
    }

    /// Record that `app` failed to thumbnail `reference`.
    ///
    /// The marker is tied to the source mtime, so it stops applying once the
    /// source changes. `mtime` may only be omitted for local sources.
    pub fn put_fail(
        &self,
        reference: &str,
        app: &str,
        mtime: Option<i64>,
        metadata: Option<&Metadata>,
    ) -> Result<PathBuf> {
        let backend = self.require_backend()?;
        let dest = self.fail_path(reference, app)?;
        let mtime = match mtime {
            Some(mtime) => mtime,
            None => identity::source_mtime(reference)?,
        };
        let identity = Identity::of(reference)?;
        paths::create_private_dir(atomic::parent_dir(&dest)?)?;

        let info = Metadata::for_source(metadata, identity.uri(), mtime);
        let path = atomic::publish(&dest, |out| Ok(backend.write_blank(&info, out)?))?;

        debug!(app, uri = identity.uri(), "Recorded thumbnail failure");
        Ok(path)
    }

    /// Everything embedded in a thumbnail or fail marker
    pub fn thumbnail_info(&self, path: &Path) -> Result<Metadata> {
        Ok(self.require_backend()?.read_metadata(path)?)
    }
}

/// The caller's raster while metadata is attached to it
enum Staged {
    /// Temp copy of a file already at the destination, deleted on drop
    Copy(TempPath),
    /// Caller's file, read where it is and removed once published
    Caller(PathBuf),
}

impl Staged {
    fn adopt(built: &Path, dest: &Path) -> Result<Self> {
        if built == dest {
            // `dest` is only ever replaced by a rename, so work on a copy
            let staged = atomic::temp_file_in(atomic::parent_dir(dest)?)?;
            fs::copy(built, &staged)?;
            Ok(Self::Copy(staged))
        } else {
            Ok(Self::Caller(built.to_path_buf()))
        }
    }

    fn path(&self) -> &Path {
        match self {
            Self::Copy(staged) => staged,
            Self::Caller(path) => path,
        }
    }

    /// Drop the staged file once its content has been published
    fn release(self) -> io::Result<()> {
        match self {
            Self::Copy(staged) => staged.close(),
            Self::Caller(path) => match fs::remove_file(path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        }
    }
}

//! Crash-safe publication of cache entries.
//!
//! Entries are built in a uniquely named temp file *inside the destination
//! directory* (same file system, so the final rename is atomic), restricted to
//! the owner and renamed over the destination. Readers see the old file, no
//! file, or the new file; never a partial one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempPath};

use crate::error::Result;

const TEMP_PREFIX: &str = ".thumbcache-";
const TEMP_SUFFIX: &str = ".png";

/// Build a new file with `build` and atomically move it to `dest`.
///
/// `build` receives the path of an empty temp file it may overwrite. If it
/// fails, the temp file is removed and `dest` is left untouched.
pub fn publish<F>(dest: &Path, build: F) -> Result<PathBuf>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let dir = parent_dir(dest)?;
    let staged = temp_file_in(dir)?;

    build(&*staged)?;

    // The builder may have replaced the file, so permissions are set afterwards.
    restrict_file(&staged)?;
    staged.persist(dest)?;

    Ok(dest.to_path_buf())
}

/// New empty temp file in `dir`, deleted when the handle is dropped
pub(crate) fn temp_file_in(dir: &Path) -> io::Result<TempPath> {
    let file = Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)?;
    let path = file.into_temp_path();
    restrict_file(&path)?;
    Ok(path)
}

/// True for names produced by [`temp_file_in`]
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

pub(crate) fn parent_dir(path: &Path) -> io::Result<&Path> {
    path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        )
    })
}

/// Owner read/write only (`0600`)
#[cfg(unix)]
pub(crate) fn restrict_file(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
pub(crate) fn restrict_file(_path: &Path) -> io::Result<()> {
    Ok(())
}

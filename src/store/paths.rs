//! Cache layout
//!
//! ```text
//! <cache_root>/normal/<md5(uri)>.png
//! <cache_root>/large/<md5(uri)>.png
//! <cache_root>/fail/<appname>/<md5(uri)>.png
//! ```
//!
//! Directories are private to the user (`0700`).

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::size::SizeClass;

pub const FAIL_DIR: &str = "fail";

/// Where the thumbnail of `reference` lives for `size`.
///
/// A reference that already points inside `<cache_root>/<size>/` is returned
/// unchanged: a cache entry is its own thumbnail. This skips hashing, so such
/// entries are later trusted without a freshness check.
pub fn thumbnail_path(cache_root: &Path, reference: &str, size: SizeClass) -> Result<PathBuf> {
    let size_dir = cache_root.join(size.dir_name());
    if is_inside(Path::new(reference), &size_dir) {
        return Ok(PathBuf::from(reference));
    }

    let identity = Identity::of(reference)?;
    Ok(size_dir.join(identity.file_name()))
}

/// Where the fail marker of `app` for `reference` lives
pub fn fail_path(cache_root: &Path, reference: &str, app: &str) -> Result<PathBuf> {
    Ok(fail_dir(cache_root, app)?.join(Identity::of(reference)?.file_name()))
}

/// `<cache_root>/fail/<app>`, refusing names that would leave that directory
pub fn fail_dir(cache_root: &Path, app: &str) -> Result<PathBuf> {
    let mut components = Path::new(app).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(cache_root.join(FAIL_DIR).join(app)),
        _ => Err(Error::InvalidAppName(app.to_owned())),
    }
}

/// `path` is a file somewhere below `dir`
fn is_inside(path: &Path, dir: &Path) -> bool {
    path != dir && path.starts_with(dir)
}

/// Create `dir` and its missing parents with mode `0700`. Existing
/// directories are left as they are.
#[cfg(unix)]
pub fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
pub fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

/// Reset an existing directory to `0700`
#[cfg(unix)]
pub fn restrict_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
pub fn restrict_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "/home/u/.cache/thumbnails";

    #[test]
    fn test_thumbnail_paths() {
        let root = Path::new(ROOT);
        assert_eq!(
            thumbnail_path(root, "/tmp/a.jpg", SizeClass::Large).unwrap(),
            root.join("large/fd3d4bbf23a83793d4c47b368af0416e.png")
        );
        assert_eq!(
            thumbnail_path(root, "http://x/y.pdf", SizeClass::Normal).unwrap(),
            root.join("normal/667621a20c8e4b6ec0abf069cf1f8298.png")
        );
    }

    #[test]
    fn test_cache_entries_map_to_themselves() {
        let root = Path::new(ROOT);
        let entry = format!("{ROOT}/large/0123456789abcdef0123456789abcdef.png");

        assert_eq!(
            thumbnail_path(root, &entry, SizeClass::Large).unwrap(),
            PathBuf::from(&entry)
        );
        // Only within the matching size directory
        assert_ne!(
            thumbnail_path(root, &entry, SizeClass::Normal).unwrap(),
            PathBuf::from(&entry)
        );
        // A sibling with a common string prefix is not inside
        let sibling = format!("{ROOT}/large-old/x.png");
        assert_ne!(
            thumbnail_path(root, &sibling, SizeClass::Large).unwrap(),
            PathBuf::from(&sibling)
        );
    }

    #[test]
    fn test_fail_paths() {
        let root = Path::new(ROOT);
        assert_eq!(
            fail_path(root, "/tmp/a.jpg", "app-1.0").unwrap(),
            root.join("fail/app-1.0/fd3d4bbf23a83793d4c47b368af0416e.png")
        );
    }

    #[test]
    fn test_app_names_cannot_escape() {
        let root = Path::new(ROOT);
        for bad in ["", ".", "..", "a/b", "/etc"] {
            assert!(
                matches!(fail_dir(root, bad), Err(Error::InvalidAppName(_))),
                "{bad:?} was accepted"
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_private_dirs() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("thumbnails/fail/app");
        create_private_dir(&dir).unwrap();
        create_private_dir(&dir).unwrap();

        for path in [&dir, &tmp.path().join("thumbnails")] {
            let mode = fs::metadata(path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700, "{}", path.display());
        }
    }
}

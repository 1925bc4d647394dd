use std::path::Path;
use tracing::debug;

use super::Store;
use crate::error::{Error, Result};
use crate::identity::{self, Identity};
use crate::metadata::ThumbInfo;

impl Store {
    /// Does the entry at `path` describe `uri` as it was at `mtime`?
    ///
    /// Unreadable entries, entries missing a mandatory key and a missing
    /// backend all count as "not valid".
    pub fn is_valid(&self, path: &Path, uri: &str, mtime: i64) -> bool {
        let Some(backend) = self.backend() else {
            debug!(path = %path.display(), "No backend to validate thumbnail");
            return false;
        };

        let info = backend
            .read_metadata(path)
            .map_err(Error::from)
            .and_then(|metadata| Ok(ThumbInfo::from_metadata(&metadata)?));

        match info {
            Ok(info) if info.matches(uri, mtime) => true,
            Ok(info) => {
                debug!(
                    path = %path.display(),
                    stored_mtime = info.mtime,
                    mtime,
                    "Thumbnail is obsolete"
                );
                false
            }
            Err(e) => {
                debug!(path = %path.display(), "Cannot read thumbnail metadata: {e}");
                false
            }
        }
    }

    /// Has `app` recorded a failure for `reference` at its current mtime?
    ///
    /// A marker written for another mtime is obsolete and ignored. Without a
    /// backend the marker's presence alone decides.
    pub fn is_failed(&self, reference: &str, app: &str, mtime: Option<i64>) -> Result<bool> {
        let marker = self.fail_path(reference, app)?;
        if !marker.is_file() {
            return Ok(false);
        }
        if self.backend().is_none() {
            return Ok(true);
        }

        let mtime = match mtime {
            Some(mtime) => mtime,
            None => identity::source_mtime(reference)?,
        };
        let identity = Identity::of(reference)?;

        Ok(self.is_valid(&marker, identity.uri(), mtime))
    }
}

use serde::{Deserialize, Serialize};
use std::env;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::identity;

/// Name of the cache directory under the user's cache home
pub const THUMBNAILS_DIR: &str = "thumbnails";

/// Where the store lives.
///
/// Resolved once (normally from the environment) and owned by the `Store`;
/// tests and embedders point it anywhere with [`StoreConfig::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root of the shared cache, e.g. `~/.cache/thumbnails`
    pub cache_root: PathBuf,
}

impl StoreConfig {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
        }
    }

    /// `$XDG_CACHE_HOME/thumbnails`, or `~/.cache/thumbnails` when the
    /// variable is unset or empty
    pub fn from_env() -> Result<Self> {
        Self::from_cache_home(env::var_os("XDG_CACHE_HOME"))
    }

    fn from_cache_home(cache_home: Option<OsString>) -> Result<Self> {
        let base = match cache_home.filter(|dir| !dir.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or_else(|| {
                    Error::Io(io::Error::new(
                        io::ErrorKind::NotFound,
                        "could not determine the home directory",
                    ))
                })?
                .join(".cache"),
        };

        Ok(Self::new(identity::normalize(&base).join(THUMBNAILS_DIR)))
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }
}

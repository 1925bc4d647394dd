//! Shared on-disk thumbnail cache
//!
//! Implements the freedesktop.org thumbnail layout: thumbnails live under
//! `$XDG_CACHE_HOME/thumbnails/{normal,large}/<md5(uri)>.png`, carry the URI
//! and modification time of their source as PNG text chunks, and are
//! regenerated once the source changes. Applications that cannot thumbnail a
//! file leave a marker under `fail/<app>/` so they do not retry every time.
//!
//! ```no_run
//! use thumbcache::{SizeClass, Store};
//!
//! let store = Store::from_env()?;
//! if let Some(thumb) = store.get("/home/me/Pictures/cat.jpg", Some(SizeClass::Normal), None)? {
//!     println!("{}", thumb.display());
//! }
//! # Ok::<(), thumbcache::Error>(())
//! ```

pub mod atomic;
pub mod backend;
pub mod codec;
pub mod error;
pub mod identity;
pub mod metadata;
pub mod size;
pub mod store;

pub use backend::Backend;
pub use error::{BackendError, Error, MetadataError, Result};
pub use identity::Identity;
pub use metadata::{
    Metadata, ThumbInfo, KEY_DOC_PAGES, KEY_HEIGHT, KEY_MIME, KEY_MOVIE_LENGTH, KEY_MTIME,
    KEY_SIZE, KEY_URI, KEY_WIDTH,
};
pub use size::SizeClass;
pub use store::{Store, StoreConfig};

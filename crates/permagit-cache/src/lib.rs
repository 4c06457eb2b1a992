//! # Permagit Cache
//!
//! On-disk cache of bare repositories keyed by snapshot id.
//!
//! A working directory holds one directory per cached snapshot plus an
//! optional `<snapshot>.dirty` marker file next to it. An entry is trusted
//! only when its directory exists and no marker is present. The marker is a
//! sibling file rather than a file inside the entry so that removing an
//! entry can never delete the marker before the entry itself is gone.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod store;

pub use error::{CacheError, Result};
pub use store::{CacheStore, PruneReport, DIRTY_SUFFIX};

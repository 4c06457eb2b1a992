//! # Permagit Archive
//!
//! Packs a repository working tree (including its `.git` directory) into a
//! single zip buffer and unpacks such buffers back into a directory tree.
//!
//! Unpacking is all-or-nothing: on any failure the destination directory is
//! removed, so callers never observe a partially written tree.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod ignore;
mod pack;
mod unpack;

pub use error::{ArchiveError, Result};
pub use ignore::IgnoreList;
pub use pack::pack;
pub use unpack::unpack;

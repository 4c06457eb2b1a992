//! # Permagit Types
//!
//! Common types shared by the permagit crates: the remote-side repository
//! descriptor, snapshot identifiers, upload tags and cost estimates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod estimate;
mod repository;
mod snapshot;
mod tag;

pub use error::{Result, TypesError};
pub use estimate::{format_bytes, Estimate};
pub use repository::{GithubSync, PrivateState, RepoRef, RepositoryDescriptor};
pub use snapshot::SnapshotId;
pub use tag::{upload_tags, Tag};

/// Application name written into every upload's `App-Name` tag.
pub const APP_NAME: &str = "Permagit";

/// Content type of packed repository archives.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

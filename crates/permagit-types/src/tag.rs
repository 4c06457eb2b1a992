//! Blob upload tags.

use crate::{RepositoryDescriptor, APP_NAME, ARCHIVE_CONTENT_TYPE};
use serde::{Deserialize, Serialize};

/// A single name/value tag attached to an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag name.
    pub name: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Creates a new tag.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Builds the ordered tag list for a repository update upload.
pub fn upload_tags(repo: &RepositoryDescriptor, creator: &str) -> Vec<Tag> {
    vec![
        Tag::new("App-Name", APP_NAME),
        Tag::new("Content-Type", ARCHIVE_CONTENT_TYPE),
        Tag::new("Creator", creator),
        Tag::new("Title", &repo.name),
        Tag::new("Description", &repo.description),
        Tag::new("Type", "repo-update"),
    ]
}

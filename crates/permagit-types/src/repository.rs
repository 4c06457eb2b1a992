//! Repository descriptor types.

use crate::{Result, SnapshotId, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote-side metadata record for one repository.
///
/// Owned by the ledger; the remote helper only reads it and proposes new
/// values for `snapshot_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryDescriptor {
    /// Stable identifier.
    pub id: String,
    /// Human-readable name; also the root folder inside packed archives.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Owner address.
    pub owner: String,
    /// Addresses allowed to push besides the owner.
    #[serde(default)]
    pub contributors: Vec<String>,
    /// Content address of the latest packed archive.
    #[serde(alias = "dataTxId")]
    pub snapshot_id: SnapshotId,
    /// Parent repository id when this repository is a fork.
    #[serde(default, alias = "parent", skip_serializing_if = "Option::is_none")]
    pub fork_of: Option<String>,
    /// Whether snapshot archives are encrypted at rest.
    #[serde(default)]
    pub private: bool,
    /// Blob id of the key-wrapping state for private repositories.
    #[serde(default, alias = "privateStateTxId", skip_serializing_if = "Option::is_none")]
    pub private_state_id: Option<String>,
    /// CI mirror configuration triggered after each push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_sync: Option<GithubSync>,
}

/// Mirror settings that dispatch a GitHub Actions workflow after a push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GithubSync {
    /// Master switch.
    pub enabled: bool,
    /// `owner/name` of the mirror repository on GitHub.
    pub repository: String,
    /// Branch ref the workflow runs on.
    pub branch: String,
    /// Workflow file name or id.
    pub workflow_id: String,
    /// Encrypted personal access token (base64url).
    pub access_token: String,
    /// Blob id of the key state that decrypts `access_token`.
    #[serde(alias = "privateStateTxId")]
    pub private_state_id: String,
    /// Addresses whose pushes may trigger the workflow.
    pub allowed: Vec<String>,
}

impl GithubSync {
    /// Returns true if a push by `address` should dispatch the workflow.
    pub fn is_triggered_by(&self, address: &str) -> bool {
        self.enabled
            && [
                &self.repository,
                &self.branch,
                &self.workflow_id,
                &self.access_token,
                &self.private_state_id,
            ]
            .iter()
            .all(|field| !field.is_empty())
            && self.allowed.iter().any(|allowed| allowed == address)
    }
}

/// Key-wrapping state stored alongside a private repository.
///
/// `enc_keys` maps a member's key address to the repository's symmetric key,
/// wrapped with that member's public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateState {
    /// Base64url nonce shared by every archive of the repository.
    pub iv: String,
    /// Wrapped symmetric keys by member key address.
    pub enc_keys: std::collections::HashMap<String, String>,
    /// State format version.
    #[serde(default)]
    pub version: String,
}

impl RepositoryDescriptor {
    /// Returns true if `address` may push to this repository.
    pub fn can_write(&self, address: &str) -> bool {
        self.owner == address || self.contributors.iter().any(|c| c == address)
    }

    /// Returns true if this repository was forked from another one.
    pub fn is_fork(&self) -> bool {
        self.fork_of.is_some()
    }
}

/// How a remote URL names a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoRef {
    /// The stable repository id (a UUID).
    Id(String),
    /// A human-readable `owner/name` pair.
    OwnerName {
        /// Owner's username.
        owner: String,
        /// Repository name.
        name: String,
    },
}

impl RepoRef {
    /// Parses a remote identifier with any `<scheme>://` prefix already removed.
    pub fn parse(identifier: &str) -> Result<Self> {
        let identifier = identifier.trim().trim_end_matches('/');
        if uuid::Uuid::parse_str(identifier).is_ok() {
            return Ok(Self::Id(identifier.to_string()));
        }
        match identifier.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::OwnerName {
                    owner: owner.to_string(),
                    name: name.trim_end_matches(".git").to_string(),
                })
            }
            _ => Err(TypesError::InvalidRepoRef(identifier.to_string())),
        }
    }

    /// Strips the `<scheme>://` prefix of a remote URL and parses the rest.
    pub fn from_url(url: &str) -> Result<Self> {
        let identifier = url.split_once("://").map_or(url, |(_, rest)| rest);
        Self::parse(identifier)
    }

    /// Returns true if the remote names the repository by its stable id.
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Id(_))
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => f.write_str(id),
            Self::OwnerName { owner, name } => write!(f, "{owner}/{name}"),
        }
    }
}

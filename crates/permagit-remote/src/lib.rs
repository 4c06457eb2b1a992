//! Permagit remote helper.
//!
//! git runs `git-remote-permagit <remote> <url>` for `permagit://` remotes.
//! The helper materializes the repository's current snapshot as a local bare
//! repository under `$GIT_DIR/.permagit`, bridges git's transport to it, and
//! after a push uploads the new state and publishes it to the ledger.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod bridge;
pub mod config;
pub mod prompt;
pub mod scanner;
pub mod ui;

pub use app::{App, Remote, SetupError, WriteGate, WORKING_DIR_NAME};
pub use bridge::{AllowAll, Bridge, BridgeError, BridgeOutcome, ConnectPolicy, Service};
pub use config::{Config, ConfigError, ProviderConfig};

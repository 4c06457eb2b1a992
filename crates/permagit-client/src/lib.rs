//! # Permagit Client
//!
//! HTTP implementations of the sync adapters:
//!
//! - [`LedgerClient`]: repository descriptors and snapshot publication
//! - [`GatewayDownloader`]: blob retrieval by content address
//! - [`HttpUploadProvider`]: one upload backend, tried once per push
//! - [`GatewayPricing`]: storage cost estimates
//! - [`HttpTelemetry`]: best-effort usage events
//! - [`PrivateRepoCipher`]: archive encryption for private repositories
//! - [`GithubSyncTrigger`]: mirror workflow dispatch after a push
//!
//! The wallet [`Credential`] is loaded once and handed to the collaborators
//! that sign or attribute requests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod credential;
mod error;
mod gateway;
mod github;
mod http;
mod ledger;
mod private;
mod telemetry;
mod upload;

pub use credential::Credential;
pub use error::{ClientError, Result};
pub use gateway::{GatewayDownloader, GatewayPricing, WINSTON_PER_AR};
pub use github::{GithubSyncTrigger, GITHUB_API_URL};
pub use http::ADDRESS_HEADER;
pub use ledger::LedgerClient;
pub use private::PrivateRepoCipher;
pub use telemetry::HttpTelemetry;
pub use upload::{HttpUploadProvider, TAGS_HEADER};

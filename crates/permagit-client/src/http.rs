//! Shared request plumbing.

use crate::{ClientError, Result};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

/// Header carrying the pushing wallet's address.
pub const ADDRESS_HEADER: &str = "x-permagit-address";

/// Default timeout for metadata requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("permagit/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::Network(e.to_string()))
}

/// Maps a non-success response to [`ClientError::Status`].
pub(crate) async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Like [`check`], but maps 404 to `None`.
pub(crate) async fn check_found(response: Response) -> Result<Option<Response>> {
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    check(response).await.map(Some)
}

pub(crate) fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("http://h/", "/a/b"), "http://h/a/b");
        assert_eq!(join("http://h", "a"), "http://h/a");
    }
}

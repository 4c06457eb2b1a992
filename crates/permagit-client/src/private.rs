//! Encryption of private repository archives.
//!
//! Every member of a private repository holds a copy of the repository's
//! AES-256-GCM key, wrapped with RSA-OAEP (SHA-256) under the member's wallet
//! key. The wrapped copies and the shared nonce live in a JSON state blob on
//! the gateway; the member's entry is keyed by the base64url SHA-512 of their
//! public modulus.

use crate::http::{self, DEFAULT_TIMEOUT};
use crate::{ClientError, Credential, Result};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::Aes256Gcm;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use permagit_sync::{BoxError, RepoCipher};
use permagit_types::{PrivateState, RepositoryDescriptor};
use reqwest::Client;
use rsa::{BigUint, Oaep, RsaPrivateKey};
use sha2::{Digest, Sha256, Sha512};
use std::sync::Arc;

const NONCE_LEN: usize = 12;

/// Unlocked repository key.
struct RepoKey {
    cipher: Aes256Gcm,
    nonce: Vec<u8>,
}

impl RepoKey {
    fn seal(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(GenericArray::from_slice(&self.nonce), data)
            .map_err(|_| ClientError::Crypto("encryption failed".to_string()))
    }

    fn open(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .decrypt(GenericArray::from_slice(&self.nonce), data)
            .map_err(|_| ClientError::Crypto("decryption failed: wrong key or corrupt data".to_string()))
    }
}

/// Unwraps repository keys with the loaded wallet and applies them.
pub struct PrivateRepoCipher {
    client: Client,
    gateway_url: String,
    credential: Arc<Credential>,
}

impl PrivateRepoCipher {
    /// Create a cipher that reads key states from the gateway at `gateway_url`.
    pub fn new(gateway_url: impl Into<String>, credential: Arc<Credential>) -> Result<Self> {
        Ok(Self {
            client: http::build_client(DEFAULT_TIMEOUT)?,
            gateway_url: gateway_url.into(),
            credential,
        })
    }

    /// Encrypts `data` with the key held in state `state_id`.
    pub async fn seal(&self, state_id: &str, data: &[u8]) -> Result<Vec<u8>> {
        self.unlock(state_id).await?.seal(data)
    }

    /// Decrypts `data` with the key held in state `state_id`.
    pub async fn open(&self, state_id: &str, data: &[u8]) -> Result<Vec<u8>> {
        self.unlock(state_id).await?.open(data)
    }

    async fn fetch_state(&self, state_id: &str) -> Result<PrivateState> {
        let url = http::join(&self.gateway_url, state_id);
        tracing::debug!(url = %url, "Fetching private state");
        let response = http::check(self.client.get(&url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn unlock(&self, state_id: &str) -> Result<RepoKey> {
        let state = self.fetch_state(state_id).await?;
        let member = member_address(self.credential.jwk())?;
        let wrapped = state.enc_keys.get(&member).ok_or_else(|| {
            ClientError::Crypto(format!("state {state_id} holds no key for this wallet"))
        })?;

        let private_key = private_key(self.credential.jwk())?;
        let key = private_key
            .decrypt(Oaep::new::<Sha256>(), &decode(wrapped, "wrapped key")?)
            .map_err(|e| ClientError::Crypto(format!("cannot unwrap repository key: {e}")))?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| ClientError::Crypto(format!("repository key is {} bytes", key.len())))?;

        let nonce = decode(&state.iv, "iv")?;
        if nonce.len() != NONCE_LEN {
            return Err(ClientError::Crypto(format!(
                "iv is {} bytes, expected {NONCE_LEN}",
                nonce.len()
            )));
        }
        Ok(RepoKey { cipher, nonce })
    }
}

impl std::fmt::Debug for PrivateRepoCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateRepoCipher")
            .field("gateway_url", &self.gateway_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RepoCipher for PrivateRepoCipher {
    async fn decrypt(
        &self,
        repo: &RepositoryDescriptor,
        data: Vec<u8>,
    ) -> std::result::Result<Vec<u8>, BoxError> {
        Ok(self.open(state_id(repo)?, &data).await?)
    }

    async fn encrypt(
        &self,
        repo: &RepositoryDescriptor,
        data: Vec<u8>,
    ) -> std::result::Result<Vec<u8>, BoxError> {
        Ok(self.seal(state_id(repo)?, &data).await?)
    }
}

fn state_id(repo: &RepositoryDescriptor) -> Result<&str> {
    repo.private_state_id
        .as_deref()
        .ok_or_else(|| ClientError::Crypto(format!("repository {} has no private state", repo.id)))
}

/// Key under which a member's wrapped key is stored.
pub(crate) fn member_address(jwk: &serde_json::Value) -> Result<String> {
    let modulus = decode(jwk_member(jwk, "n")?, "n")?;
    Ok(URL_SAFE_NO_PAD.encode(Sha512::digest(modulus)))
}

fn private_key(jwk: &serde_json::Value) -> Result<RsaPrivateKey> {
    let part = |name: &str| -> Result<BigUint> {
        Ok(BigUint::from_bytes_be(&decode(jwk_member(jwk, name)?, name)?))
    };
    RsaPrivateKey::from_components(
        part("n")?,
        part("e")?,
        part("d")?,
        vec![part("p")?, part("q")?],
    )
    .map_err(|e| ClientError::Credential(format!("invalid private key: {e}")))
}

fn jwk_member<'a>(jwk: &'a serde_json::Value, name: &str) -> Result<&'a str> {
    jwk.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ClientError::Credential(format!("keyfile has no '{name}' member")))
}

fn decode(value: &str, what: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| ClientError::Crypto(format!("invalid {what}: {e}")))
}


#[cfg(test)]
mod tests {
    use super::fixtures::{credential, sealed, state, IV};
    use super::*;
    use permagit_types::SnapshotId;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn gateway_with(state: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/state1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(state))
            .mount(&server)
            .await;
        server
    }

    fn private_repo(state_id: Option<&str>) -> RepositoryDescriptor {
        RepositoryDescriptor {
            id: "6ace6247-d267-463d-b5bd-7e50d98c3693".to_string(),
            name: "hello".to_string(),
            description: String::new(),
            owner: "owner-addr".to_string(),
            contributors: Vec::new(),
            snapshot_id: SnapshotId::new("snap1").unwrap(),
            fork_of: None,
            private: true,
            private_state_id: state_id.map(str::to_string),
            github_sync: None,
        }
    }

    #[test]
    fn test_member_address_uses_sha512() {
        let address = member_address(&serde_json::json!({ "n": "AQAB" })).unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(&address).unwrap().len(), 64);
        assert_ne!(address, Credential::from_jwk(serde_json::json!({ "n": "AQAB" })).unwrap().address());
    }

    #[tokio::test]
    async fn test_decrypts_member_ciphertext() {
        let server = gateway_with(state(&IV)).await;
        let cipher = PrivateRepoCipher::new(server.uri(), credential()).unwrap();

        let plain = cipher
            .decrypt(&private_repo(Some("state1")), sealed(b"PK\x03\x04archive"))
            .await
            .unwrap();
        assert_eq!(plain, b"PK\x03\x04archive");
    }

    #[tokio::test]
    async fn test_encrypts_for_other_members() {
        let server = gateway_with(state(&IV)).await;
        let cipher = PrivateRepoCipher::new(server.uri(), credential()).unwrap();

        let data = cipher
            .encrypt(&private_repo(Some("state1")), b"archive".to_vec())
            .await
            .unwrap();
        assert_eq!(data, sealed(b"archive"));
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_is_rejected() {
        let server = gateway_with(state(&IV)).await;
        let cipher = PrivateRepoCipher::new(server.uri(), credential()).unwrap();
        let mut data = sealed(b"archive");
        data[0] ^= 1;

        let err = cipher.open("state1", &data).await.unwrap_err();
        assert!(matches!(err, ClientError::Crypto(_)));
    }

    #[tokio::test]
    async fn test_state_without_member_key() {
        let mut body = state(&IV);
        body["encKeys"] = serde_json::json!({ "someone-else": "AAAA" });
        let server = gateway_with(body).await;
        let cipher = PrivateRepoCipher::new(server.uri(), credential()).unwrap();

        let err = cipher.open("state1", b"data").await.unwrap_err();
        assert!(err.to_string().contains("no key for this wallet"));
    }

    #[tokio::test]
    async fn test_rejects_short_iv() {
        let server = gateway_with(state(&[1; 8])).await;
        let cipher = PrivateRepoCipher::new(server.uri(), credential()).unwrap();

        let err = cipher.seal("state1", b"data").await.unwrap_err();
        assert!(err.to_string().contains("iv is 8 bytes"));
    }

    #[tokio::test]
    async fn test_repository_without_state() {
        let server = MockServer::start().await;
        let cipher = PrivateRepoCipher::new(server.uri(), credential()).unwrap();

        let err = cipher
            .decrypt(&private_repo(None), b"data".to_vec())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("has no private state"));
    }
}

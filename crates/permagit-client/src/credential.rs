//! Wallet keyfile credential.

use crate::{ClientError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::path::Path;

/// A wallet loaded from a JWK keyfile.
///
/// Loaded once per process and passed to the collaborators that need it.
#[derive(Clone)]
pub struct Credential {
    address: String,
    jwk: serde_json::Value,
}

impl Credential {
    /// Reads and parses a JWK keyfile.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Credential(format!("cannot read keyfile {}: {e}", path.display()))
        })?;
        let jwk: serde_json::Value = serde_json::from_str(&contents)?;
        Self::from_jwk(jwk)
    }

    /// Builds a credential from a parsed JWK.
    pub fn from_jwk(jwk: serde_json::Value) -> Result<Self> {
        let modulus = jwk
            .get("n")
            .and_then(|n| n.as_str())
            .ok_or_else(|| ClientError::Credential("keyfile has no 'n' member".to_string()))?;
        let address = address_of(modulus)?;
        Ok(Self { address, jwk })
    }

    /// The wallet address: base64url of the SHA-256 of the public modulus.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The raw key material.
    pub fn jwk(&self) -> &serde_json::Value {
        &self.jwk
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

fn address_of(modulus: &str) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(modulus.trim_end_matches('='))
        .map_err(|e| ClientError::Credential(format!("invalid modulus: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_address_from_modulus() {
        let cred = Credential::from_jwk(serde_json::json!({ "kty": "RSA", "n": "AQAB" })).unwrap();
        assert_eq!(cred.address(), "hfkN_qHYAn4UY-XKlxolARCiDfARnSBKdCILxjUW0Vs");
    }

    #[test]
    fn test_load_keyfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        std::fs::write(
            &path,
            r#"{"kty":"RSA","e":"AQAB","n":"AQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyA"}"#,
        )
        .unwrap();

        let cred = Credential::load(&path).unwrap();
        assert_eq!(cred.address(), "riFsLvUkejeCwTXvonmj5M3GEJQnD10r5YxiBLemEsk");
        assert!(!format!("{cred:?}").contains("AQID"));
    }

    #[test]
    fn test_rejects_incomplete_keys() {
        assert!(Credential::from_jwk(serde_json::json!({ "kty": "RSA" })).is_err());
        assert!(Credential::from_jwk(serde_json::json!({ "n": "!!" })).is_err());

        let dir = tempfile::tempdir().unwrap();
        assert!(Credential::load(&dir.path().join("missing.json")).is_err());
    }
}

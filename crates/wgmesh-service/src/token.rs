//! Join tokens.
//!
//! Phase 1 of the join protocol hands the caller a short-lived HS256 bearer
//! token; phase 2 must present it. The token binds the join call to a
//! successful handshake and bounds replay to its validity window.
//!
//! The signing secret is derived per mesh from the gossip encryption key.
//! Dev mode falls back to a well-known constant and provides no real
//! assurance; the check still runs so both code paths stay identical.

use std::time::Duration;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Result;
use crate::node::unix_now;

/// Audience claim of every join token.
pub const AUDIENCE: &str = "wgmesh";

/// Token validity window.
pub const TOKEN_VALIDITY: Duration = Duration::from_secs(10);

/// Well-known dev-mode secret. Provides no assurance by design.
const DEV_SECRET: &[u8] = b"wgmesh-dev-token-secret";

/// Domain separator for the per-mesh secret derivation.
const SECRET_LABEL: &[u8] = b"wgmesh-join-token";

/// Registered claims of a join token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub aud: String,
    pub iss: String,
    pub jti: String,
    pub iat: u64,
    pub nbf: u64,
    pub exp: u64,
}

/// Derive the HS256 secret for a mesh: SHA-256 over a fixed label and the
/// gossip encryption key, or the dev constant when the mesh runs without
/// one.
pub fn mesh_secret(gossip_key: Option<&[u8; 32]>) -> Vec<u8> {
    match gossip_key {
        Some(key) => {
            let mut hasher = Sha256::new();
            hasher.update(SECRET_LABEL);
            hasher.update(key);
            hasher.finalize().to_vec()
        }
        None => DEV_SECRET.to_vec(),
    }
}

/// Issue a join token valid for [`TOKEN_VALIDITY`] starting now.
pub fn issue(secret: &[u8], mesh_name: &str, node_name: &str) -> Result<String> {
    let now = unix_now() as u64;
    let claims = Claims {
        aud: AUDIENCE.to_string(),
        iss: format!("wgmesh-{}-{}", mesh_name, node_name),
        jti: Uuid::new_v4().to_string(),
        iat: now,
        nbf: now,
        exp: now + TOKEN_VALIDITY.as_secs(),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )?)
}

/// Verify signature, audience and validity window of a join token.
pub fn verify(secret: &[u8], token: &str) -> Result<Claims> {
    let mut validation = Validation::default();
    validation.set_audience(&[AUDIENCE]);
    validation.validate_nbf = true;
    validation.leeway = 0;

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(data.claims)
}

/// Extract the bearer token from an `authorization` header value.
///
/// Accepts both `Bearer <token>` and the legacy `Bearer: <token>` form.
pub fn bearer_from_header(value: &str) -> Option<&str> {
    let rest = value.strip_prefix("Bearer")?;
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let secret = mesh_secret(None);
        let token = issue(&secret, "X", "X0AE80101").unwrap();
        let claims = verify(&secret, &token).unwrap();
        assert_eq!(claims.aud, AUDIENCE);
        assert!(claims.iss.contains("X0AE80101"));
        assert_eq!(claims.exp - claims.nbf, TOKEN_VALIDITY.as_secs());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue(&mesh_secret(None), "X", "n").unwrap();
        let other = mesh_secret(Some(&[9u8; 32]));
        assert!(verify(&other, &token).is_err());
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let secret = mesh_secret(None);
        let now = unix_now() as u64;
        let claims = Claims {
            aud: "other".into(),
            iss: "x".into(),
            jti: "1".into(),
            iat: now,
            nbf: now,
            exp: now + 10,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&secret),
        )
        .unwrap();
        assert!(verify(&secret, &token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let secret = mesh_secret(None);
        let now = unix_now() as u64;
        let claims = Claims {
            aud: AUDIENCE.into(),
            iss: "x".into(),
            jti: "1".into(),
            iat: now - 60,
            nbf: now - 60,
            exp: now - 30,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&secret),
        )
        .unwrap();
        assert!(verify(&secret, &token).is_err());
    }

    #[test]
    fn test_not_yet_valid_token_rejected() {
        let secret = mesh_secret(None);
        let now = unix_now() as u64;
        let claims = Claims {
            aud: AUDIENCE.into(),
            iss: "x".into(),
            jti: "1".into(),
            iat: now + 60,
            nbf: now + 60,
            exp: now + 90,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&secret),
        )
        .unwrap();
        assert!(verify(&secret, &token).is_err());
    }

    #[test]
    fn test_per_mesh_secret_differs_from_dev() {
        assert_ne!(mesh_secret(None), mesh_secret(Some(&[1u8; 32])));
        assert_ne!(
            mesh_secret(Some(&[1u8; 32])),
            mesh_secret(Some(&[2u8; 32]))
        );
    }

    #[test]
    fn test_bearer_from_header() {
        assert_eq!(bearer_from_header("Bearer abc"), Some("abc"));
        assert_eq!(bearer_from_header("Bearer: abc"), Some("abc"));
        assert_eq!(bearer_from_header("Basic abc"), None);
        assert_eq!(bearer_from_header("Bearer "), None);
    }
}

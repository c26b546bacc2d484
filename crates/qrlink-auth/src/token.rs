//! Bearer token signing and verification
//!
//! Tokens are HS256 JWTs carrying the account identity and an expiry claim.
//! Device session tokens additionally carry the device they are scoped to.

use crate::account::Account;
use crate::credentials::CredentialError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims asserted by a signed bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username the token asserts
    pub sub: String,
    /// Account identifier
    pub account_id: String,
    /// Device the token is scoped to (device session tokens only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Expiry as seconds since the Unix epoch
    pub exp: i64,
}

/// Signs and verifies bearer tokens with a shared HMAC secret
#[derive(Debug, Clone)]
pub struct TokenSigner {
    secret: String,
    default_ttl: Duration,
}

impl TokenSigner {
    /// Create a signer with the given secret and default token lifetime
    pub fn new(secret: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            default_ttl,
        }
    }

    /// Issue a login token for an account
    ///
    /// Uses the default TTL unless an explicit one is given.
    pub fn issue(&self, account: &Account, ttl: Option<Duration>) -> Result<String, CredentialError> {
        self.sign(account, None, ttl)
    }

    /// Issue a token scoped to a specific device of an account
    pub fn issue_for_device(
        &self,
        account: &Account,
        device_id: &str,
    ) -> Result<String, CredentialError> {
        self.sign(account, Some(device_id.to_string()), None)
    }

    fn sign(
        &self,
        account: &Account,
        device_id: Option<String>,
        ttl: Option<Duration>,
    ) -> Result<String, CredentialError> {
        let expires_at = Utc::now() + ttl.unwrap_or(self.default_ttl);
        let claims = Claims {
            sub: account.username.clone(),
            account_id: account.id.to_string(),
            device_id,
            exp: expires_at.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| CredentialError::Signing(e.to_string()))
    }

    /// Verify a token's signature and expiry, returning its claims
    pub fn verify(&self, token: &str) -> Result<Claims, CredentialError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => CredentialError::TokenExpired,
            _ => CredentialError::TokenInvalid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_account() -> Account {
        Account::new(
            "alice".to_string(),
            "alice@example.com".to_string(),
            "hash".to_string(),
        )
    }

    fn test_signer() -> TokenSigner {
        TokenSigner::new("test-secret", Duration::minutes(30))
    }

    #[test]
    fn test_issue_and_verify() {
        let signer = test_signer();
        let account = test_account();

        let token = signer.issue(&account, None).unwrap();
        let claims = signer.verify(&token).unwrap();

        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.account_id, account.id.to_string());
        assert!(claims.device_id.is_none());
    }

    #[test]
    fn test_device_token_carries_device_id() {
        let signer = test_signer();
        let account = test_account();

        let token = signer.issue_for_device(&account, "device-42").unwrap();
        let claims = signer.verify(&token).unwrap();

        assert_eq!(claims.device_id.as_deref(), Some("device-42"));
    }

    #[test]
    fn test_expired_token() {
        let signer = test_signer();
        let account = test_account();

        // Past the default 60s validation leeway
        let token = signer
            .issue(&account, Some(Duration::seconds(-120)))
            .unwrap();
        let result = signer.verify(&token);
        assert!(matches!(result, Err(CredentialError::TokenExpired)));
    }

    #[test]
    fn test_invalid_token() {
        let signer = test_signer();
        let result = signer.verify("not-a-token");
        assert!(matches!(result, Err(CredentialError::TokenInvalid)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = test_signer();
        let other = TokenSigner::new("other-secret", Duration::minutes(30));
        let account = test_account();

        let token = signer.issue(&account, None).unwrap();
        let result = other.verify(&token);
        assert!(matches!(result, Err(CredentialError::TokenInvalid)));
    }
}

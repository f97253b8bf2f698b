// GitHub App authentication: builds and signs the short-lived RS256 JWT that
// identifies the App to the installations API.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use regtoken_common::{TokenError, TokenResult};
use serde::{Deserialize, Serialize};

use crate::credentials::AppAssertion;
use crate::key_loader::PrivateKeyPem;

/// JWT claims for GitHub App authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppJwtClaims {
    /// GitHub App ID
    pub iss: u64,
    /// Expiration time
    pub exp: i64,
    /// Issued at, backdated by the issue buffer
    pub iat: i64,
    /// Not before, same as `iat`
    pub nbf: i64,
}

/// Signs App JWTs with a parsed RSA key.
pub struct AppJwtSigner {
    key: EncodingKey,
    app_id: u64,
    ttl: Duration,
    issue_buffer: Duration,
}

impl AppJwtSigner {
    /// Parse `pem` as an RSA private key (PKCS#1 or PKCS#8).
    pub fn from_pem(
        pem: &PrivateKeyPem,
        app_id: u64,
        ttl: std::time::Duration,
        issue_buffer: std::time::Duration,
    ) -> TokenResult<Self> {
        let key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(TokenError::KeyParse)?;

        let ttl = Duration::from_std(ttl)
            .map_err(|_| TokenError::Config("jwt ttl out of range".into()))?;
        let issue_buffer = Duration::from_std(issue_buffer)
            .map_err(|_| TokenError::Config("jwt issue buffer out of range".into()))?;

        Ok(Self {
            key,
            app_id,
            ttl,
            issue_buffer,
        })
    }

    /// Claims for a JWT issued at `now`.
    ///
    /// `iat` and `nbf` are moved `issue_buffer` into the past to absorb clock
    /// drift between this host and the API server.
    pub fn claims_at(&self, now: DateTime<Utc>) -> AppJwtClaims {
        let backdated = (now - self.issue_buffer).timestamp();
        AppJwtClaims {
            iss: self.app_id,
            exp: (now + self.ttl).timestamp(),
            iat: backdated,
            nbf: backdated,
        }
    }

    /// Sign a JWT as if the current time were `now`.
    pub fn sign_at(&self, now: DateTime<Utc>) -> TokenResult<AppAssertion> {
        let claims = self.claims_at(now);
        let header = Header::new(Algorithm::RS256);
        let token = encode(&header, &claims, &self.key).map_err(TokenError::Signing)?;

        Ok(AppAssertion::new(
            token,
            now - self.issue_buffer,
            now + self.ttl,
        ))
    }

    pub fn sign(&self) -> TokenResult<AppAssertion> {
        self.sign_at(Utc::now())
    }
}

//! Admin ("sudo") checks and session tokens.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{CacheError, TokenStore};

const METRIC_TOKENS_ISSUED: &str = "folio_auth_tokens_issued_total";
const METRIC_TOKENS_REJECTED: &str = "folio_auth_tokens_rejected_total";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("admin access is not configured")]
    SudoDisabled,
    #[error("missing admin credentials")]
    MissingCredentials,
    #[error("invalid admin credentials")]
    InvalidCredentials,
    #[error("missing auth token")]
    MissingToken,
    #[error("token mismatch")]
    TokenMismatch,
    #[error("token not recognised or expired")]
    TokenRejected,
    #[error(transparent)]
    Token(#[from] CacheError),
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub max_age: Duration,
}

#[derive(Clone)]
pub struct AuthService {
    sudo_key_hash: Option<Vec<u8>>,
    tokens: Arc<TokenStore>,
}

impl AuthService {
    pub fn new(sudo_key: Option<&str>, tokens: Arc<TokenStore>) -> Self {
        Self {
            sudo_key_hash: sudo_key.map(hash_secret),
            tokens,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Compare a presented admin secret against the configured one in
    /// constant time.
    pub fn verify_sudo(&self, presented: Option<&str>) -> Result<(), AuthError> {
        let expected = self.sudo_key_hash.as_ref().ok_or(AuthError::SudoDisabled)?;
        let presented = presented
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AuthError::MissingCredentials)?;

        if expected.ct_eq(&hash_secret(presented)).unwrap_u8() == 0 {
            debug!("Rejected admin credentials");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(())
    }

    /// Issue a session token after a successful admin check.
    pub fn authenticate(&self, presented: Option<&str>) -> Result<IssuedToken, AuthError> {
        self.verify_sudo(presented)?;
        let token = self.tokens.issue()?;
        counter!(METRIC_TOKENS_ISSUED).increment(1);
        info!(live_tokens = self.tokens.len(), "Issued session token");
        Ok(IssuedToken {
            token,
            max_age: self.tokens.issued_window(),
        })
    }

    /// The cookie token and the token echoed by the client must agree before
    /// the store is consulted. A live token gets its window renewed.
    pub fn verify(
        &self,
        cookie_token: Option<&str>,
        query_token: Option<&str>,
    ) -> Result<IssuedToken, AuthError> {
        let cookie_token = cookie_token
            .filter(|value| !value.is_empty())
            .ok_or_else(|| self.reject(AuthError::MissingToken))?;
        let query_token = query_token.unwrap_or_default();
        let matches = cookie_token.as_bytes().ct_eq(query_token.as_bytes());
        if query_token.is_empty() || matches.unwrap_u8() == 0 {
            return Err(self.reject(AuthError::TokenMismatch));
        }

        let max_age = self
            .tokens
            .renew(cookie_token)
            .ok_or_else(|| self.reject(AuthError::TokenRejected))?;
        Ok(IssuedToken {
            token: cookie_token.to_string(),
            max_age,
        })
    }

    /// Gate for session-protected reads: the cookie must carry a live token,
    /// which is renewed as a side effect.
    pub fn authorize_session(&self, cookie_token: Option<&str>) -> Result<(), AuthError> {
        let token = cookie_token
            .filter(|value| !value.is_empty())
            .ok_or_else(|| self.reject(AuthError::MissingToken))?;
        self.tokens
            .renew(token)
            .map(|_| ())
            .ok_or_else(|| self.reject(AuthError::TokenRejected))
    }

    pub fn logout(&self, token: Option<&str>) -> bool {
        token.is_some_and(|token| self.tokens.revoke(token))
    }

    fn reject(&self, err: AuthError) -> AuthError {
        counter!(METRIC_TOKENS_REJECTED).increment(1);
        err
    }
}

fn hash_secret(secret: &str) -> Vec<u8> {
    Sha256::digest(secret.as_bytes()).to_vec()
}

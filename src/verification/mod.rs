use crate::{ClientId, IdToken, IdTokenClaims, IssuerUrl, Nonce, ISSUER_URL};

use chrono::{DateTime, Utc};
use log::debug;
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::fmt::{Debug, Formatter, Result as FormatterResult};
use std::sync::Arc;


/// Error verifying ID token claims.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClaimsVerificationError {
    /// The token is not a structurally valid compact-serialized token, or its claims could not
    /// be decoded.
    #[error("Malformed ID token: {0}")]
    Malformed(String),
    /// The `iss` claim does not match the expected provider.
    #[error("ID token issued by a different provider, expected {expected:?} got {found:?}")]
    UntrustedIssuer {
        /// Issuer the verifier was configured with.
        expected: String,
        /// Issuer found in the token.
        found: String,
    },
    /// The `aud` claim does not match the configured client.
    #[error("Invalid audience: {0}")]
    InvalidAudience(String),
    /// The token expired at or before the verification time.
    #[error("ID token expired at {expiration} (current time is {now})")]
    Expired {
        /// Value of the `exp` claim.
        expiration: DateTime<Utc>,
        /// Verification time.
        now: DateTime<Utc>,
    },
}

/// Error comparing the `nonce` claim against the value stored at login time.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum NonceVerificationError {
    /// The ID token carries no (or an empty) `nonce` claim.
    #[error("Missing nonce claim")]
    Missing,
    /// The `nonce` claim differs from the stored value.
    #[error("Nonce mismatch")]
    Mismatch,
}

/// Compares the ID token's `nonce` claim against the nonce generated for this login attempt.
pub fn verify_nonce(
    claims: &IdTokenClaims,
    expected: &Nonce,
) -> Result<(), NonceVerificationError> {
    let claims_nonce = claims.nonce().ok_or(NonceVerificationError::Missing)?;
    // Constant time.
    if Sha256::digest(claims_nonce.secret()) != Sha256::digest(expected.secret()) {
        return Err(NonceVerificationError::Mismatch);
    }
    Ok(())
}

/// ID token verifier.
///
/// Checks, in order, that the `iss` claim exactly matches the expected issuer, that the `aud`
/// claim names this client (only if [`require_audience`](Self::require_audience) was called),
/// and that the token has not expired. There is no allowance for clock skew.
///
/// The token's signature is NOT verified. jAccount ID tokens are only ever accepted straight from
/// the token endpoint response, over TLS.
#[derive(Clone)]
pub struct IdTokenVerifier {
    issuer: String,
    client_id: Option<ClientId>,
    time_fn: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl IdTokenVerifier {
    /// Initializes a verifier that accepts tokens issued by `issuer`.
    pub fn new(issuer: IssuerUrl) -> Self {
        IdTokenVerifier {
            issuer: issuer.to_string(),
            client_id: None,
            time_fn: Arc::new(Utc::now),
        }
    }

    /// Initializes a verifier for the production jAccount issuer.
    pub fn new_jaccount() -> Self {
        IdTokenVerifier {
            issuer: ISSUER_URL.to_string(),
            client_id: None,
            time_fn: Arc::new(Utc::now),
        }
    }

    /// Requires the `aud` claim to equal `client_id`.
    pub fn require_audience(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Specifies a function for returning the current time.
    ///
    /// This function is used for verifying ID token expiration. The default is `Utc::now`.
    pub fn set_time_fn<T>(mut self, time_fn: T) -> Self
    where
        T: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.time_fn = Arc::new(time_fn);
        self
    }

    /// Returns the issuer this verifier trusts.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Decodes a compact-serialized ID token and verifies its claims.
    pub fn verify(&self, raw_id_token: &str) -> Result<IdTokenClaims, ClaimsVerificationError> {
        raw_id_token
            .parse::<IdToken>()
            .map_err(|err| ClaimsVerificationError::Malformed(err.to_string()))?
            .into_claims(self)
    }

    pub(crate) fn verify_claims(&self, claims: &IdTokenClaims) -> Result<(), ClaimsVerificationError> {
        debug!("ID token signature is not verified; checking claims only");

        if claims.issuer() != self.issuer {
            return Err(ClaimsVerificationError::UntrustedIssuer {
                expected: self.issuer.clone(),
                found: claims.issuer().to_string(),
            });
        }

        if let Some(ref client_id) = self.client_id {
            if claims.audience().as_str() != client_id.as_str() {
                return Err(ClaimsVerificationError::InvalidAudience(format!(
                    "must equal client ID `{}` (found `{}`)",
                    client_id.as_str(),
                    claims.audience().as_str()
                )));
            }
        }

        let now = (self.time_fn)();
        if now >= claims.expiration() {
            return Err(ClaimsVerificationError::Expired {
                expiration: claims.expiration(),
                now,
            });
        }

        Ok(())
    }
}

impl Default for IdTokenVerifier {
    fn default() -> Self {
        Self::new_jaccount()
    }
}

impl Debug for IdTokenVerifier {
    fn fmt(&self, f: &mut Formatter) -> FormatterResult {
        f.debug_struct("IdTokenVerifier")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

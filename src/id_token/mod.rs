use crate::helpers::{deserialize_non_empty_string, serde_utc_seconds};
use crate::jwt::{JsonWebToken, JsonWebTokenAccess, JsonWebTokenAlgorithm};
use crate::{
    Audience, ClaimsVerificationError, EndUserName, IdTokenVerifier, InstitutionCode, Nonce,
    SubjectIdentifier, UnknownUserType, UserType,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

use std::fmt::{Display, Formatter, Result as FormatterResult};
use std::str::FromStr;


/// jAccount ID token.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct IdToken(JsonWebToken<IdTokenClaims>);

impl FromStr for IdToken {
    type Err = serde_json::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
    }
}

impl IdToken {
    /// Verifies and returns a reference to the ID token claims.
    ///
    /// Only the issuer, audience (if configured) and expiration are checked. The nonce is left
    /// to the caller, which owns the value stored at login time.
    pub fn claims<'a>(
        &'a self,
        verifier: &IdTokenVerifier,
    ) -> Result<&'a IdTokenClaims, ClaimsVerificationError> {
        let claims = self.0.unverified_payload_ref();
        verifier.verify_claims(claims)?;
        Ok(claims)
    }

    /// Verifies and returns the ID token claims.
    pub fn into_claims(
        self,
        verifier: &IdTokenVerifier,
    ) -> Result<IdTokenClaims, ClaimsVerificationError> {
        verifier.verify_claims(self.0.unverified_payload_ref())?;
        Ok(self.0.unverified_payload())
    }

    /// Returns the `alg` header parameter the provider declared for this token.
    pub fn signing_alg(&self) -> &JsonWebTokenAlgorithm {
        &self.0.unverified_header().alg
    }
}

impl Display for IdToken {
    fn fmt(&self, f: &mut Formatter) -> FormatterResult {
        Display::fmt(&self.0, f)
    }
}

/// Claims carried by a jAccount ID token.
///
/// Claims marked optional stay `None` when the provider omits them; the empty string is treated
/// as absent for `nonce`. The `type` claim is kept as sent so that roles added by the provider
/// later still decode.
#[skip_serializing_none]
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct IdTokenClaims {
    #[serde(rename = "iss")]
    issuer: String,
    #[serde(rename = "aud")]
    audience: Audience,
    #[serde(rename = "sub")]
    subject: SubjectIdentifier,
    #[serde(rename = "exp", with = "serde_utc_seconds")]
    expiration: DateTime<Utc>,
    #[serde(rename = "iat", with = "serde_utc_seconds")]
    issue_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_non_empty_string")]
    nonce: Option<Nonce>,
    #[serde(default)]
    name: Option<EndUserName>,
    #[serde(default)]
    code: Option<InstitutionCode>,
    #[serde(rename = "type", default)]
    user_type: Option<String>,
}

impl IdTokenClaims {
    /// Issuer identifier (`iss`), exactly as it appears in the token.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }
    /// Client identifier the token was issued for (`aud`).
    pub fn audience(&self) -> &Audience {
        &self.audience
    }
    /// End-User identifier (`sub`).
    pub fn subject(&self) -> &SubjectIdentifier {
        &self.subject
    }
    /// Expiration time (`exp`).
    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }
    /// Issue time (`iat`).
    pub fn issue_time(&self) -> DateTime<Utc> {
        self.issue_time
    }
    /// Nonce echoed from the authorization request.
    pub fn nonce(&self) -> Option<&Nonce> {
        self.nonce.as_ref()
    }
    /// Full name of the End-User (`name`).
    pub fn name(&self) -> Option<&EndUserName> {
        self.name.as_ref()
    }
    /// Student or staff number (`code`).
    pub fn code(&self) -> Option<&InstitutionCode> {
        self.code.as_ref()
    }
    /// Institutional role of the End-User (`type`), or an error carrying the tag when it is not
    /// one of the known [`UserType`]s.
    pub fn user_type(&self) -> Option<Result<UserType, UnknownUserType>> {
        self.user_type.as_deref().map(str::parse)
    }
    /// The `type` claim exactly as it appears in the token.
    pub fn user_type_tag(&self) -> Option<&str> {
        self.user_type.as_deref()
    }
}

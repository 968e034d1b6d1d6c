use crate::helpers::deserialize_option_or_none;
use crate::{ExtraTokenFields, OAuth2TokenResponse, StandardTokenResponse};

use oauth2::basic::BasicTokenType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extra fields jAccount returns alongside the standard OAuth2 token response.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct JAccountTokenFields {
    // A non-string value is treated the same as an absent one.
    #[serde(
        default,
        deserialize_with = "deserialize_option_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    id_token: Option<String>,
}
impl JAccountTokenFields {
    pub fn new(id_token: Option<String>) -> Self {
        Self { id_token }
    }

    /// Raw compact-serialized ID token, if the provider returned a non-empty one.
    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref().filter(|token| !token.is_empty())
    }
}
impl ExtraTokenFields for JAccountTokenFields {}

/// Token response returned by the jAccount token endpoint.
pub type JAccountTokenResponse = StandardTokenResponse<JAccountTokenFields, BasicTokenType>;

/// The token response did not embed an ID token.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("Token response does not contain an ID token")]
pub struct MissingIdToken;

/// Extends the base OAuth2 token response with the embedded ID token.
pub trait TokenResponse: OAuth2TokenResponse {
    /// Returns the raw ID token string, if present.
    fn id_token(&self) -> Option<&str>;

    /// Returns the raw ID token string, or [`MissingIdToken`] if the provider omitted it.
    fn extract_id_token(&self) -> Result<&str, MissingIdToken> {
        self.id_token().ok_or(MissingIdToken)
    }
}

impl TokenResponse for JAccountTokenResponse {
    fn id_token(&self) -> Option<&str> {
        self.extra_fields().id_token()
    }
}

#![warn(missing_debug_implementations)]
//!
//! Client library for [jAccount](https://jaccount.sjtu.edu.cn), the identity provider of
//! Shanghai Jiao Tong University, and the REST API behind it.
//!
//! The crate covers three things:
//!
//!  * the OAuth2 authorization code flow, including generation and single-use checking of the
//!    `state` and `nonce` values ([`Client`], [`PendingLogin`], [`CallbackRequest`]),
//!  * decoding and validation of the ID token jAccount embeds in its token response
//!    ([`IdToken`], [`IdTokenVerifier`]),
//!  * thin typed wrappers for the profile, card and enterprise endpoints ([`ApiClient`]).
//!
//! # Signature verification
//!
//! jAccount ID tokens are decoded **without** checking their signature; only the issuer,
//! (optionally) audience and expiration claims are validated. Tokens must therefore only be
//! accepted straight from the token endpoint response, as [`CallbackRequest`] does.
//!
//! # Getting started
//!
//! ```rust,ignore
//! use jaccount::{
//!     reqwest, AuthorizationCode, CallbackParams, Client, ClientId, ClientSecret, CsrfToken,
//!     RedirectUrl, Scope, SCOPE_OPENID,
//! };
//! use url::Url;
//!
//! # fn err_wrapper() -> Result<(), anyhow::Error> {
//! let client = Client::new(ClientId::new("client_id".to_string()))?
//!     .set_client_secret(ClientSecret::new("client_secret".to_string()))
//!     .set_redirect_uri(RedirectUrl::new("http://localhost:8000/callback".to_string())?)
//!     .add_scope(Scope::new(SCOPE_OPENID.to_string()));
//!
//! // Send the user to `authorize_url`, and keep `pending` (e.g., in cookies) until the
//! // provider redirects back.
//! let (authorize_url, pending) = client.start_login();
//! println!("Browse to: {}", authorize_url);
//!
//! // ...later, on the redirect back to `/callback`:
//! let redirect = Url::parse("http://localhost:8000/callback?code=C1&state=S1")?;
//! let http_client = reqwest::blocking::ClientBuilder::new()
//!     .redirect(reqwest::redirect::Policy::none())
//!     .build()?;
//! let outcome = client
//!     .handle_callback(Some(pending), CallbackParams::from_url(&redirect))
//!     .request(&http_client)?;
//!
//! if let Some(claims) = outcome.id_token_claims() {
//!     println!("Logged in as {} ({:?})", claims.subject().as_str(), claims.user_type_tag());
//! }
//! let profile = client.api_client(&outcome).profile(&http_client)?;
//! println!("{:?}", profile.name);
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "curl")]
pub use oauth2::curl;
#[cfg(feature = "reqwest")]
pub use oauth2::reqwest;
#[cfg(feature = "ureq")]
pub use oauth2::ureq;

pub use oauth2::{
    AccessToken, AsyncHttpClient, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret,
    CodeTokenRequest, CsrfToken, EmptyExtraTokenFields, ErrorResponse, ExtraTokenFields,
    HttpClientError, HttpRequest, HttpResponse, RedirectUrl, RefreshToken, RequestTokenError,
    Scope, StandardErrorResponse, StandardTokenResponse, SyncHttpClient,
    TokenResponse as OAuth2TokenResponse, TokenType, TokenUrl,
};

pub use crate::api::card::{CardInfo, CardTransaction, CardTransactionsOptions};
pub use crate::api::enterprise::{Dept, Position, Positions, Post};
pub use crate::api::profile::{Birthday, Identity, Major, Organize, Profile};
pub use crate::api::{ApiClient, ApiError, ApiResponse};
pub use crate::client::Client;
pub use crate::id_token::{IdToken, IdTokenClaims};
pub use crate::jwt::{
    JsonWebKeyId, JsonWebToken, JsonWebTokenAccess, JsonWebTokenAlgorithm, JsonWebTokenContentType,
    JsonWebTokenHeader, JsonWebTokenType,
};
pub use crate::login::{
    CallbackParams, CallbackRequest, CorrelationStore, LoginError, LoginOutcome,
    MemoryCorrelationStore, PendingLogin,
};
pub use crate::token::{JAccountTokenFields, JAccountTokenResponse, MissingIdToken, TokenResponse};
pub use crate::types::{
    ApiUrl, Audience, EndUserName, InstitutionCode, IssuerUrl, Nonce, SubjectIdentifier,
    UnknownUserType, UserType, MIN_NONCE_BYTES,
};
pub use crate::verification::{
    verify_nonce, ClaimsVerificationError, IdTokenVerifier, NonceVerificationError,
};

#[macro_use]
mod macros;

/// REST API wrappers.
pub mod api;
/// Cookie carrier for the `state`/`nonce` pair.
pub mod cookies;

mod client;
mod helpers;
mod http_utils;
mod id_token;
mod jwt;
mod login;
mod token;
mod types;
mod verification;

/// jAccount authorization endpoint.
pub const AUTH_URL: &str = "https://jaccount.sjtu.edu.cn/oauth2/authorize";
/// jAccount token endpoint.
pub const TOKEN_URL: &str = "https://jaccount.sjtu.edu.cn/oauth2/token";
/// Issuer identifier (`iss` claim) of jAccount ID tokens.
pub const ISSUER_URL: &str = "https://jaccount.sjtu.edu.cn/oauth2/";
/// Base URL of the jAccount REST API.
pub const API_BASE_URL: &str = "https://api.sjtu.edu.cn";

/// Scope granting access to the essential profile information.
pub const SCOPE_ESSENTIAL: &str = "essential";
/// Scope requesting an ID token in the token response.
pub const SCOPE_OPENID: &str = "openid";

use crate::helpers::constant_time_str_eq;
use crate::token::TokenResponse;
use crate::verification::verify_nonce;
use crate::{
    AccessToken, ApiClient, AsyncHttpClient, AuthorizationCode, ClaimsVerificationError, Client,
    CsrfToken, IdTokenClaims, JAccountTokenResponse, MissingIdToken, Nonce, OAuth2TokenResponse,
    RequestTokenError, SyncHttpClient,
};

use chrono::{DateTime, Duration, Utc};
use http::StatusCode;
use log::{debug, warn};
use oauth2::basic::BasicErrorResponse;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FormatterResult};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};


/// The `state` (and, in ID token mode, `nonce`) generated for one login attempt.
///
/// A `PendingLogin` is created by [`Client::start_login`] and consumed by
/// [`Client::handle_callback`]. Since consumption takes it by value, the same attempt can never be
/// checked twice: after any outcome, success or failure, a fresh login must be started. It does not
/// implement `Clone` for the same reason.
#[derive(Debug, Deserialize, Serialize)]
pub struct PendingLogin {
    state: CsrfToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nonce: Option<Nonce>,
}
impl PendingLogin {
    /// Reassembles a pending login from values the caller stored (e.g., in cookies).
    pub fn new(state: CsrfToken, nonce: Option<Nonce>) -> Self {
        Self { state, nonce }
    }
    /// Value sent as the `state` parameter of the authorization request.
    pub fn state(&self) -> &CsrfToken {
        &self.state
    }
    /// Nonce expected in the ID token; `None` when no ID token was requested.
    pub fn nonce(&self) -> Option<&Nonce> {
        self.nonce.as_ref()
    }
    /// Splits the pending login into its `state` and `nonce`.
    pub fn into_parts(self) -> (CsrfToken, Option<Nonce>) {
        (self.state, self.nonce)
    }
}

/// Query parameters the authorization endpoint appends to the redirect URI.
#[derive(Clone, Debug, Default)]
pub struct CallbackParams {
    /// Authorization code to exchange at the token endpoint.
    pub code: Option<AuthorizationCode>,
    /// `state` echoed by the provider.
    pub state: Option<CsrfToken>,
    /// Error code, if the provider refused the authorization request.
    pub error: Option<String>,
    /// Human-readable explanation accompanying `error`.
    pub error_description: Option<String>,
}
impl CallbackParams {
    /// Callback parameters of a successful authorization.
    pub fn new(code: AuthorizationCode, state: CsrfToken) -> Self {
        Self {
            code: Some(code),
            state: Some(state),
            error: None,
            error_description: None,
        }
    }

    /// Extracts the callback parameters from the full redirect URL.
    pub fn from_url(url: &Url) -> Self {
        Self::from_pairs(url.query_pairs())
    }

    /// Extracts the callback parameters from a raw (still percent-encoded) query string.
    pub fn from_query(query: &str) -> Self {
        Self::from_pairs(url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()))
    }

    fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>,
    {
        pairs.fold(Self::default(), |mut params, (key, value)| {
            // The first occurrence of a parameter wins.
            match key.as_ref() {
                "code" if params.code.is_none() => {
                    params.code = Some(AuthorizationCode::new(value.into_owned()))
                }
                "state" if params.state.is_none() => {
                    params.state = Some(CsrfToken::new(value.into_owned()))
                }
                "error" if params.error.is_none() => params.error = Some(value.into_owned()),
                "error_description" if params.error_description.is_none() => {
                    params.error_description = Some(value.into_owned())
                }
                _ => {}
            }
            params
        })
    }
}

/// Reason a login attempt was rejected.
///
/// Every variant is terminal for the attempt. [`status_code`](Self::status_code) maps each reason
/// to the HTTP status a relying party should answer the callback request with: `400 Bad Request`
/// for anything the user-agent supplied (including state and nonce mismatches, which may indicate
/// an attack), and `500 Internal Server Error` for failures talking to the provider.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoginError<RE>
where
    RE: std::error::Error + 'static,
{
    /// No pending login exists for this callback (never started, expired, or already consumed).
    #[error("State not found")]
    MissingState,
    /// The `state` returned by the provider differs from the stored one.
    #[error("State mismatch")]
    StateMismatch,
    /// The provider redirected back with an `error` parameter instead of a code.
    #[error("Authorization failed: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },
    /// The redirect carries neither a code nor an error.
    #[error("Authorization code not found")]
    MissingCode,
    /// The code could not be exchanged for a token.
    #[error("Failed to exchange token")]
    ExchangeFailed(#[source] RequestTokenError<RE, BasicErrorResponse>),
    /// The token response does not embed an ID token.
    #[error(transparent)]
    MissingIdToken(#[from] MissingIdToken),
    /// The ID token is malformed, from an untrusted issuer, or expired.
    #[error("Failed to verify ID token")]
    InvalidIdToken(#[source] ClaimsVerificationError),
    /// No nonce was stored for this login attempt.
    #[error("Nonce not found")]
    MissingNonce,
    /// The ID token's `nonce` claim is absent or differs from the stored one.
    #[error("Nonce mismatch")]
    NonceMismatch,
}
impl<RE> LoginError<RE>
where
    RE: std::error::Error + 'static,
{
    /// HTTP status the callback endpoint should respond with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            LoginError::ExchangeFailed(_) | LoginError::MissingIdToken(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            LoginError::MissingState
            | LoginError::StateMismatch
            | LoginError::AuthorizationDenied { .. }
            | LoginError::MissingCode
            | LoginError::InvalidIdToken(_)
            | LoginError::MissingNonce
            | LoginError::NonceMismatch => StatusCode::BAD_REQUEST,
        }
    }
}

/// Successfully validated login.
#[derive(Clone, Debug)]
pub struct LoginOutcome {
    token: JAccountTokenResponse,
    id_token_claims: Option<IdTokenClaims>,
}
impl LoginOutcome {
    /// Token response returned by the token endpoint.
    pub fn token(&self) -> &JAccountTokenResponse {
        &self.token
    }
    pub fn access_token(&self) -> &AccessToken {
        self.token.access_token()
    }
    /// Verified ID token claims; `None` unless the client requested the `openid` scope.
    pub fn id_token_claims(&self) -> Option<&IdTokenClaims> {
        self.id_token_claims.as_ref()
    }
    pub fn into_parts(self) -> (JAccountTokenResponse, Option<IdTokenClaims>) {
        (self.token, self.id_token_claims)
    }
}

impl Client {
    /// Begins a login attempt.
    ///
    /// Generates a random `state`, plus a random `nonce` if the `openid` scope is configured, and
    /// returns the authorization URL to redirect the user-agent to along with the values the
    /// caller must keep until the callback arrives.
    pub fn start_login(&self) -> (Url, PendingLogin) {
        let state = CsrfToken::new_random();
        let nonce = if self.wants_id_token() {
            Some(Nonce::new_random())
        } else {
            None
        };
        let url = self.authorize_url(&state, nonce.as_ref());
        (url, PendingLogin { state, nonce })
    }

    /// Prepares the checks and token exchange for the redirect back from the authorization
    /// endpoint.
    ///
    /// `pending` is the value returned by [`start_login`](Self::start_login) for this attempt, or
    /// `None` if the caller could not find one.
    pub fn handle_callback(
        &self,
        pending: Option<PendingLogin>,
        params: CallbackParams,
    ) -> CallbackRequest<'_> {
        CallbackRequest {
            client: self,
            pending,
            params,
        }
    }

    /// Returns an API client authenticated with the access token of `outcome`.
    pub fn api_client(&self, outcome: &LoginOutcome) -> ApiClient {
        self.api_client_for_token(outcome.access_token().clone())
    }

    fn complete_login<RE>(
        &self,
        token: JAccountTokenResponse,
        nonce: Option<Nonce>,
    ) -> Result<LoginOutcome, LoginError<RE>>
    where
        RE: std::error::Error + 'static,
    {
        if !self.wants_id_token() {
            debug!("login completed without ID token");
            return Ok(LoginOutcome {
                token,
                id_token_claims: None,
            });
        }

        let claims = {
            let raw_id_token = token.extract_id_token().map_err(|err| {
                warn!("token response without ID token");
                LoginError::MissingIdToken(err)
            })?;
            self.id_token_verifier()
                .verify(raw_id_token)
                .map_err(|err| {
                    warn!("rejecting ID token: {}", err);
                    LoginError::InvalidIdToken(err)
                })?
        };

        let nonce = nonce.ok_or_else(|| {
            warn!("no nonce stored for login attempt");
            LoginError::MissingNonce
        })?;
        verify_nonce(&claims, &nonce).map_err(|err| {
            warn!("rejecting ID token: {}", err);
            LoginError::NonceMismatch
        })?;

        debug!(
            "login completed for subject {} ({})",
            claims.subject().as_str(),
            claims.user_type_tag().unwrap_or("-")
        );
        Ok(LoginOutcome {
            token,
            id_token_claims: Some(claims),
        })
    }
}

/// Callback handling for one login attempt, ready to be sent with an HTTP client.
///
/// Checks are performed in order: stored state present, state match, no provider error, code
/// present, code exchange, ID token present, ID token claims valid, stored nonce present, nonce
/// match. The first failure rejects the attempt.
pub struct CallbackRequest<'a> {
    client: &'a Client,
    pending: Option<PendingLogin>,
    params: CallbackParams,
}
impl<'a> CallbackRequest<'a> {
    /// Performs the callback checks, synchronously exchanging the code with `http_client`.
    pub fn request<C>(
        self,
        http_client: &C,
    ) -> Result<LoginOutcome, LoginError<<C as SyncHttpClient>::Error>>
    where
        C: SyncHttpClient,
    {
        let (code, nonce) = check_callback(self.pending, self.params)?;
        let token = self
            .client
            .exchange_code(code)
            .request(http_client)
            .map_err(|err| {
                warn!("failed to exchange authorization code: {}", err);
                LoginError::ExchangeFailed(err)
            })?;
        self.client.complete_login(token, nonce)
    }

    /// Performs the callback checks, asynchronously exchanging the code with `http_client`.
    ///
    /// Dropping the returned future cancels the exchange.
    pub fn request_async<'c, C>(
        self,
        http_client: &'c C,
    ) -> impl Future<Output = Result<LoginOutcome, LoginError<<C as AsyncHttpClient<'c>>::Error>>> + 'c
    where
        Self: 'c,
        C: AsyncHttpClient<'c>,
    {
        Box::pin(async move {
            let (code, nonce) = check_callback(self.pending, self.params)?;
            let token = self
                .client
                .exchange_code(code)
                .request_async(http_client)
                .await
                .map_err(|err| {
                    warn!("failed to exchange authorization code: {}", err);
                    LoginError::ExchangeFailed(err)
                })?;
            self.client.complete_login(token, nonce)
        })
    }
}
impl<'a> Debug for CallbackRequest<'a> {
    fn fmt(&self, f: &mut Formatter) -> FormatterResult {
        f.debug_struct("CallbackRequest")
            .field("pending", &self.pending)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

fn check_callback<RE>(
    pending: Option<PendingLogin>,
    params: CallbackParams,
) -> Result<(AuthorizationCode, Option<Nonce>), LoginError<RE>>
where
    RE: std::error::Error + 'static,
{
    let (stored_state, nonce) = pending
        .ok_or_else(|| {
            warn!("callback without pending login");
            LoginError::MissingState
        })?
        .into_parts();

    let state_matches = params
        .state
        .as_ref()
        .map(|state| constant_time_str_eq(state.secret(), stored_state.secret()))
        .unwrap_or(false);
    if !state_matches {
        warn!("callback state does not match pending login");
        return Err(LoginError::StateMismatch);
    }

    if let Some(error) = params.error {
        warn!("provider returned authorization error `{}`", error);
        return Err(LoginError::AuthorizationDenied {
            error,
            description: params.error_description,
        });
    }

    let code = params.code.ok_or_else(|| {
        warn!("callback without authorization code");
        LoginError::MissingCode
    })?;
    Ok((code, nonce))
}

/// Caller-side storage for pending logins, keyed by an opaque session key.
///
/// Implementations must make [`take`](Self::take) atomic: when two callbacks race for the same
/// key, exactly one of them receives the pending login.
pub trait CorrelationStore {
    /// Stores the pending login for `key`, replacing any previous one.
    fn put(&self, key: &str, pending: PendingLogin);
    /// Removes and returns the pending login for `key`.
    fn take(&self, key: &str) -> Option<PendingLogin>;
}

/// In-memory [`CorrelationStore`] with a time-to-live.
#[derive(Clone)]
pub struct MemoryCorrelationStore {
    entries: Arc<Mutex<HashMap<String, (PendingLogin, DateTime<Utc>)>>>,
    ttl: Duration,
    time_fn: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}
impl MemoryCorrelationStore {
    /// Pending logins expire after one hour by default, matching the cookie lifetime.
    pub const DEFAULT_TTL_SECS: i64 = 3600;

    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl: Duration::seconds(Self::DEFAULT_TTL_SECS),
            time_fn: Arc::new(Utc::now),
        }
    }

    pub fn set_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Specifies a function for returning the current time. The default is `Utc::now`.
    pub fn set_time_fn<T>(mut self, time_fn: T) -> Self
    where
        T: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.time_fn = Arc::new(time_fn);
        self
    }

    /// Number of stored (possibly expired) entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
impl Default for MemoryCorrelationStore {
    fn default() -> Self {
        Self::new()
    }
}
impl CorrelationStore for MemoryCorrelationStore {
    fn put(&self, key: &str, pending: PendingLogin) {
        let now = (self.time_fn)();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (pending, now + self.ttl));
    }

    fn take(&self, key: &str) -> Option<PendingLogin> {
        let (pending, expires_at) = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)?;
        if expires_at <= (self.time_fn)() {
            debug!("pending login expired");
            return None;
        }
        Some(pending)
    }
}
impl Debug for MemoryCorrelationStore {
    fn fmt(&self, f: &mut Formatter) -> FormatterResult {
        f.debug_struct("MemoryCorrelationStore")
            .field("len", &self.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

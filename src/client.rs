use crate::{
    AccessToken, ApiClient, ApiUrl, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret,
    CodeTokenRequest, CsrfToken, IdTokenVerifier, JAccountTokenResponse, Nonce, RedirectUrl,
    Scope, TokenUrl, API_BASE_URL, AUTH_URL, SCOPE_OPENID, TOKEN_URL,
};

use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
};
use oauth2::{EndpointNotSet, EndpointSet, StandardRevocableToken};
use url::Url;

pub(crate) type OAuth2Client = oauth2::Client<
    BasicErrorResponse,
    JAccountTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// jAccount OAuth2 client.
///
/// A `Client` holds configuration only: it is immutable once built, can be shared freely across
/// threads, and never stores per-login or per-user state. The `state`/`nonce` of an in-flight
/// login live in a [`PendingLogin`](crate::PendingLogin) owned by the caller, and authenticated
/// API access goes through a per-session [`ApiClient`].
///
/// The authorization and token endpoints default to the production jAccount endpoints; they can
/// be overridden (e.g., to point at a test server) with [`set_auth_uri`](Self::set_auth_uri) and
/// [`set_token_uri`](Self::set_token_uri).
#[derive(Clone, Debug)]
pub struct Client {
    oauth2_client: OAuth2Client,
    client_id: ClientId,
    scopes: Vec<Scope>,
    id_token_verifier: IdTokenVerifier,
    api_base_url: ApiUrl,
}

impl Client {
    /// Initializes a client for the production jAccount endpoints.
    pub fn new(client_id: ClientId) -> Result<Self, url::ParseError> {
        let oauth2_client = oauth2::Client::new(client_id.clone())
            .set_auth_uri(AuthUrl::new(AUTH_URL.to_string())?)
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string())?);
        Ok(Client {
            oauth2_client,
            client_id,
            scopes: Vec::new(),
            id_token_verifier: IdTokenVerifier::new_jaccount(),
            api_base_url: ApiUrl::new(API_BASE_URL)?,
        })
    }

    /// Return the Client ID.
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Set the client secret.
    pub fn set_client_secret(mut self, client_secret: ClientSecret) -> Self {
        self.oauth2_client = self.oauth2_client.set_client_secret(client_secret);
        self
    }

    /// Set the type of client authentication used for communicating with the token endpoint.
    ///
    /// The default is HTTP Basic authentication.
    pub fn set_auth_type(mut self, auth_type: AuthType) -> Self {
        self.oauth2_client = self.oauth2_client.set_auth_type(auth_type);
        self
    }

    /// Return the type of client authentication used for communicating with the token endpoint.
    pub fn auth_type(&self) -> &AuthType {
        self.oauth2_client.auth_type()
    }

    /// Override the authorization endpoint.
    pub fn set_auth_uri(mut self, auth_uri: AuthUrl) -> Self {
        self.oauth2_client = self.oauth2_client.set_auth_uri(auth_uri);
        self
    }

    /// Return the authorization endpoint.
    pub fn auth_uri(&self) -> &AuthUrl {
        self.oauth2_client.auth_uri()
    }

    /// Override the token endpoint.
    pub fn set_token_uri(mut self, token_uri: TokenUrl) -> Self {
        self.oauth2_client = self.oauth2_client.set_token_uri(token_uri);
        self
    }

    /// Return the token endpoint.
    pub fn token_uri(&self) -> &TokenUrl {
        self.oauth2_client.token_uri()
    }

    /// Set the redirect URL registered for this client.
    pub fn set_redirect_uri(mut self, redirect_url: RedirectUrl) -> Self {
        self.oauth2_client = self.oauth2_client.set_redirect_uri(redirect_url);
        self
    }

    /// Return the redirect URL, if set.
    pub fn redirect_uri(&self) -> Option<&RedirectUrl> {
        self.oauth2_client.redirect_uri()
    }

    /// Append a scope to every authorization request.
    ///
    /// Requesting [`SCOPE_OPENID`](crate::SCOPE_OPENID) switches the login flow into ID token
    /// mode: a nonce is generated, and the callback requires, verifies and returns an ID token.
    pub fn add_scope(mut self, scope: Scope) -> Self {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Append multiple scopes to every authorization request.
    pub fn add_scopes<I>(self, scopes: I) -> Self
    where
        I: IntoIterator<Item = Scope>,
    {
        scopes
            .into_iter()
            .fold(self, |client, scope| client.add_scope(scope))
    }

    /// Return the configured scopes.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Whether the `openid` scope is requested, and thus whether logins produce an ID token.
    pub fn wants_id_token(&self) -> bool {
        self.scopes.iter().any(|scope| scope.as_str() == SCOPE_OPENID)
    }

    /// Replace the verifier applied to ID tokens returned by the token endpoint.
    pub fn set_id_token_verifier(mut self, verifier: IdTokenVerifier) -> Self {
        self.id_token_verifier = verifier;
        self
    }

    /// Return the verifier applied to ID tokens returned by the token endpoint.
    pub fn id_token_verifier(&self) -> &IdTokenVerifier {
        &self.id_token_verifier
    }

    /// Override the base URL of the REST API.
    pub fn set_api_base_url(mut self, api_base_url: ApiUrl) -> Self {
        self.api_base_url = api_base_url;
        self
    }

    /// Return the base URL of the REST API.
    pub fn api_base_url(&self) -> &ApiUrl {
        &self.api_base_url
    }

    /// Generates the URL to redirect the user-agent to for authorization.
    ///
    /// The result depends only on the arguments and the client configuration. `state` is always
    /// included; `nonce` is passed as the non-standard `nonce` authorization parameter when given.
    ///
    /// # Security Warning
    ///
    /// Callers should use a fresh, unpredictable `state` (and `nonce`) for each authorization
    /// request, and compare them against the values returned to the redirect URI. See
    /// [`start_login`](Self::start_login), which does both.
    pub fn authorize_url(&self, state: &CsrfToken, nonce: Option<&Nonce>) -> Url {
        let state = state.clone();
        let request = self
            .oauth2_client
            .authorize_url(move || state)
            .add_scopes(self.scopes.iter().cloned());
        let request = match nonce {
            Some(nonce) => request.add_extra_param("nonce", nonce.secret().clone()),
            None => request,
        };
        request.url().0
    }

    /// Exchange a code returned by the authorization endpoint for a token response.
    ///
    /// Acquires ownership of the `code` because authorization codes may only be used once to
    /// retrieve an access token from the authorization server. Transport and provider errors are
    /// returned untouched and never retried.
    pub fn exchange_code(
        &self,
        code: AuthorizationCode,
    ) -> CodeTokenRequest<'_, BasicErrorResponse, JAccountTokenResponse> {
        self.oauth2_client.exchange_code(code)
    }

    /// Returns an API client for the REST endpoints, authenticated with `access_token`.
    pub fn api_client_for_token(&self, access_token: AccessToken) -> ApiClient {
        ApiClient::new(self.api_base_url.clone(), access_token)
    }
}

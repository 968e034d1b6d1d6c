use crate::http_utils::{auth_bearer, check_content_type, MIME_TYPE_JSON};
use crate::{AccessToken, ApiUrl, AsyncHttpClient, HttpRequest, HttpResponse, SyncHttpClient};

use http::header::{HeaderValue, ACCEPT};
use http::{Method, StatusCode};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use std::future::Future;

/// Card data endpoints.
pub mod card;
/// Enterprise (staff) data endpoints.
pub mod enterprise;
/// Profile endpoint.
pub mod profile;


/// Authenticated handle for the jAccount REST API.
///
/// An `ApiClient` is bound to the access token of one user session. It holds no mutable state:
/// clone it freely, and build a new one for each session (see
/// [`Client::api_client`](crate::Client::api_client)).
#[derive(Clone, Debug)]
pub struct ApiClient {
    base_url: ApiUrl,
    access_token: AccessToken,
}
impl ApiClient {
    pub fn new(base_url: ApiUrl, access_token: AccessToken) -> Self {
        Self {
            base_url,
            access_token,
        }
    }

    pub fn base_url(&self) -> &ApiUrl {
        &self.base_url
    }

    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    /// Sends a `GET` request for `path` and decodes the entities of the response envelope.
    ///
    /// `path` is resolved against the [base URL](Self::base_url). Query parameters are
    /// form-encoded.
    pub fn fetch<T, C>(
        &self,
        path: &str,
        query: &[(&str, String)],
        http_client: &C,
    ) -> Result<ApiResponse<T>, ApiError<<C as SyncHttpClient>::Error>>
    where
        T: DeserializeOwned,
        C: SyncHttpClient,
    {
        let (url, request) = self.api_request(path, query)?;
        http_client
            .call(request)
            .map_err(ApiError::Request)
            .and_then(|http_response| api_response(&url, http_response))
    }

    /// Asynchronously sends a `GET` request for `path` and decodes the entities of the response
    /// envelope.
    pub fn fetch_async<'c, T, C>(
        &self,
        path: &str,
        query: &[(&str, String)],
        http_client: &'c C,
    ) -> impl Future<Output = Result<ApiResponse<T>, ApiError<<C as AsyncHttpClient<'c>>::Error>>> + 'c
    where
        T: DeserializeOwned + 'c,
        C: AsyncHttpClient<'c>,
    {
        let prepared = self.api_request(path, query);
        Box::pin(async move {
            let (url, request) = prepared?;
            let http_response = http_client.call(request).await.map_err(ApiError::Request)?;
            api_response(&url, http_response)
        })
    }

    fn api_request<RE>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(Url, HttpRequest), ApiError<RE>>
    where
        RE: std::error::Error + 'static,
    {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|err| ApiError::Other(format!("failed to build URL for `{path}`: {err}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let (auth_header, auth_value) = auth_bearer(&self.access_token)
            .map_err(|err| ApiError::Other(format!("invalid access token: {err}")))?;
        let request = http::Request::builder()
            .uri(url.to_string())
            .method(Method::GET)
            .header(ACCEPT, HeaderValue::from_static(MIME_TYPE_JSON))
            .header(auth_header, auth_value)
            .body(Vec::new())
            .map_err(|err| ApiError::Other(format!("failed to prepare request: {err}")))?;

        debug!("GET {}", url);
        Ok((url, request))
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    errno: i64,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    total: i64,
    #[serde(default, rename = "nextToken")]
    next_token: Option<String>,
    #[serde(default)]
    entities: serde_json::Value,
}

fn api_response<T, RE>(url: &Url, http_response: HttpResponse) -> Result<ApiResponse<T>, ApiError<RE>>
where
    T: DeserializeOwned,
    RE: std::error::Error + 'static,
{
    let status = http_response.status();
    let envelope = serde_path_to_error::deserialize::<_, Envelope>(
        &mut serde_json::Deserializer::from_slice(http_response.body()),
    );

    if status != StatusCode::OK {
        return Err(match envelope {
            Ok(envelope) => ApiError::Api {
                status,
                errno: envelope.errno,
                error: envelope.error.unwrap_or_default(),
            },
            Err(_) => ApiError::Response(
                status,
                http_response.body().to_owned(),
                format!("HTTP status code {} at {}", status, url),
            ),
        });
    }

    check_content_type(http_response.headers(), MIME_TYPE_JSON).map_err(|err_msg| {
        ApiError::Response(status, http_response.body().to_owned(), err_msg)
    })?;

    let envelope = envelope.map_err(ApiError::Parse)?;
    if envelope.errno != 0 {
        return Err(ApiError::Api {
            status,
            errno: envelope.errno,
            error: envelope.error.unwrap_or_default(),
        });
    }

    let entities = if envelope.entities.is_null() {
        Vec::new()
    } else {
        serde_path_to_error::deserialize(envelope.entities).map_err(ApiError::Parse)?
    };
    Ok(ApiResponse {
        total: envelope.total,
        next_token: envelope.next_token.filter(|token| !token.is_empty()),
        entities,
    })
}

/// Decoded entities of an API response envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse<T> {
    total: i64,
    next_token: Option<String>,
    entities: Vec<T>,
}
impl<T> ApiResponse<T> {
    /// Total number of entities reported by the server (`0` if not reported).
    pub fn total(&self) -> i64 {
        self.total
    }
    /// Token for fetching the next page of a list, if any.
    pub fn next_token(&self) -> Option<&str> {
        self.next_token.as_deref()
    }
    pub fn entities(&self) -> &[T] {
        &self.entities
    }
    pub fn into_entities(self) -> Vec<T> {
        self.entities
    }

    /// Returns the first entity, as used by the single-resource endpoints.
    pub fn into_first<RE>(self) -> Result<T, ApiError<RE>>
    where
        RE: std::error::Error + 'static,
    {
        self.entities.into_iter().next().ok_or(ApiError::Empty)
    }
}

/// Error fetching a REST API resource.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError<RE>
where
    RE: std::error::Error + 'static,
{
    /// An unexpected error occurred.
    #[error("Other error: {0}")]
    Other(String),
    /// Failed to parse server response.
    #[error("Failed to parse server response")]
    Parse(#[source] serde_path_to_error::Error<serde_json::Error>),
    /// An error occurred while sending the request or receiving the response (e.g., network
    /// connectivity failed).
    #[error("Request failed")]
    Request(#[source] RE),
    /// Server returned an invalid response.
    #[error("Server returned invalid response: {2}")]
    Response(StatusCode, Vec<u8>, String),
    /// Server reported an error in the response envelope.
    #[error("API error {errno} (HTTP status {status}): {error}")]
    Api {
        status: StatusCode,
        errno: i64,
        error: String,
    },
    /// The response envelope contains no entities.
    #[error("Server returned no entities")]
    Empty,
}

#![allow(dead_code)]

use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use jaccount::{HttpRequest, HttpResponse, ISSUER_URL, TOKEN_URL};
use log::{debug, error};
use serde_json::json;
use thiserror::Error;

use std::cell::RefCell;
use std::future::Future;
use std::sync::Once;

pub const TEST_CLIENT_ID: &str = "test-client";
pub const TEST_CLIENT_SECRET: &str = "test-secret";
pub const TEST_REDIRECT_URI: &str = "http://localhost:8000/callback";
pub const TEST_API_BASE_URL: &str = "http://127.0.0.1:8080/api";

static INIT_LOG: Once = Once::new();

thread_local! {
    static TEST_ID: RefCell<&'static str> = const { RefCell::new("UNINITIALIZED_TEST_ID") };
}

pub fn get_test_id() -> &'static str {
    TEST_ID.with(|id| *id.borrow())
}

fn _init_log() {
    color_backtrace::install();
    env_logger::init();
}

pub fn init_log(test_id: &'static str) {
    INIT_LOG.call_once(_init_log);
    TEST_ID.with(|id| *id.borrow_mut() = test_id);
}

#[derive(Debug, Error)]
pub enum FakeError {
    #[error("connection refused")]
    ConnectionRefused,
}

/// Encodes an unsigned compact JWT carrying `claims`.
pub fn mint_id_token(claims: &serde_json::Value) -> String {
    format!(
        "{}.{}.{}",
        BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
        BASE64_URL_SAFE_NO_PAD.encode(claims.to_string()),
        BASE64_URL_SAFE_NO_PAD.encode("not a real signature"),
    )
}

/// Claims of a freshly issued jAccount ID token.
pub fn id_token_claims(nonce: Option<&str>, user_type: &str) -> serde_json::Value {
    let now = Utc::now();
    let mut claims = json!({
        "iss": ISSUER_URL,
        "aud": TEST_CLIENT_ID,
        "sub": "0xDEADBEEF",
        "iat": now.timestamp(),
        "exp": (now + Duration::hours(1)).timestamp(),
        "name": "张三",
        "code": "519030910001",
        "type": user_type,
    });
    if let Some(nonce) = nonce {
        claims["nonce"] = json!(nonce);
    }
    claims
}

pub fn json_response(status: StatusCode, body: String) -> HttpResponse {
    http::Response::builder()
        .status(status)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .body(body.into_bytes())
        .expect("failed to build response")
}

/// In-process stand-in for the jAccount token endpoint and REST API.
#[derive(Debug, Default)]
pub struct MockProvider {
    /// Value of `id_token` in token responses.
    pub id_token: Option<String>,
    /// Authorization code the token endpoint accepts.
    pub expected_code: Option<String>,
    /// Entities returned by every API endpoint.
    pub api_entities: Option<serde_json::Value>,
    /// URIs of every request received, in order.
    pub requests: RefCell<Vec<String>>,
}
impl MockProvider {
    pub fn new(id_token: Option<String>) -> Self {
        Self {
            id_token,
            expected_code: Some("C1".to_string()),
            ..Self::default()
        }
    }

    pub fn with_api_entities(mut self, entities: serde_json::Value) -> Self {
        self.api_entities = Some(entities);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn respond(&self, request: HttpRequest) -> Result<HttpResponse, FakeError> {
        let uri = request.uri().to_string();
        debug!("[{}] mock provider received {}", get_test_id(), uri);
        self.requests.borrow_mut().push(uri.clone());

        if uri == TOKEN_URL {
            return Ok(self.token_response(&request));
        }
        if uri.starts_with(TEST_API_BASE_URL) {
            return Ok(json_response(
                StatusCode::OK,
                json!({
                    "errno": 0,
                    "error": "success",
                    "total": 0,
                    "entities": self.api_entities.clone().unwrap_or_else(|| json!([])),
                })
                .to_string(),
            ));
        }
        Err(FakeError::ConnectionRefused)
    }

    /// Async adapter with the shape expected by `AsyncHttpClient`.
    pub fn respond_async(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, FakeError>> + Send + Sync + 'static {
        let response = self.respond(request);
        async move { response }
    }

    fn token_response(&self, request: &HttpRequest) -> HttpResponse {
        let body = String::from_utf8_lossy(request.body()).into_owned();
        let code_ok = self
            .expected_code
            .as_ref()
            .map(|code| body.contains(&format!("code={}", code)))
            .unwrap_or(true);
        if !code_ok {
            return json_response(
                StatusCode::BAD_REQUEST,
                json!({"error": "invalid_grant"}).to_string(),
            );
        }

        let mut token = json!({
            "access_token": "AT",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "RT",
        });
        if let Some(id_token) = &self.id_token {
            token["id_token"] = json!(id_token);
        }
        json_response(StatusCode::OK, token.to_string())
    }
}

pub trait PanicIfFail<T, F>
where
    F: std::error::Error,
{
    fn panic_if_fail(self, msg: &'static str) -> T;
}
impl<T, F> PanicIfFail<T, F> for Result<T, F>
where
    F: std::error::Error,
{
    fn panic_if_fail(self, msg: &'static str) -> T {
        match self {
            Ok(ret) => ret,
            Err(fail) => {
                let mut err_msg = format!("Panic: {}", msg);

                let mut cur_fail: Option<&dyn std::error::Error> = Some(&fail);
                while let Some(cause) = cur_fail {
                    err_msg += &format!("\n    caused by: {}", cause);
                    cur_fail = cause.source();
                }
                error!("[{}] {}", get_test_id(), err_msg);
                panic!("{}", msg);
            }
        }
    }
}

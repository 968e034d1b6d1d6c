use jaccount::cookies::{
    append_set_cookie_headers, clear_login_cookies, login_cookies, pending_login_from_headers,
};
use jaccount::{
    ApiUrl, CallbackParams, ClaimsVerificationError, Client, ClientId, ClientSecret,
    CorrelationStore, CsrfToken, HttpRequest, HttpResponse, LoginError, MemoryCorrelationStore, Nonce,
    PendingLogin, RedirectUrl, Scope, UnknownUserType, UserType, SCOPE_ESSENTIAL, SCOPE_OPENID,
};

use chrono::{Duration, Utc};
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;

mod common;

use crate::common::{
    id_token_claims, init_log, mint_id_token, FakeError, MockProvider, PanicIfFail,
    TEST_API_BASE_URL, TEST_CLIENT_ID, TEST_CLIENT_SECRET, TEST_REDIRECT_URI,
};

fn test_client(openid: bool) -> Client {
    let client = Client::new(ClientId::new(TEST_CLIENT_ID.to_string()))
        .expect("failed to build client")
        .set_client_secret(ClientSecret::new(TEST_CLIENT_SECRET.to_string()))
        .set_redirect_uri(RedirectUrl::new(TEST_REDIRECT_URI.to_string()).unwrap())
        .set_api_base_url(ApiUrl::new(TEST_API_BASE_URL).unwrap())
        .add_scope(Scope::new(SCOPE_ESSENTIAL.to_string()));
    if openid {
        client.add_scope(Scope::new(SCOPE_OPENID.to_string()))
    } else {
        client
    }
}

fn pending(state: &str, nonce: &str) -> Option<PendingLogin> {
    Some(PendingLogin::new(
        CsrfToken::new(state.to_string()),
        Some(Nonce::new(nonce.to_string())),
    ))
}

#[test]
fn test_login_with_matching_state_and_nonce() {
    init_log("test_login_with_matching_state_and_nonce");

    let provider = MockProvider::new(Some(mint_id_token(&id_token_claims(
        Some("N1"),
        "student",
    ))));
    let outcome = test_client(true)
        .handle_callback(
            pending("S1", "N1"),
            CallbackParams::from_url(
                &Url::parse("http://localhost:8000/callback?code=C1&state=S1").unwrap(),
            ),
        )
        .request(&|request: HttpRequest| provider.respond(request))
        .panic_if_fail("login failed");

    let claims = outcome.id_token_claims().expect("missing ID token claims");
    assert_eq!(claims.subject().as_str(), "0xDEADBEEF");
    assert_eq!(claims.user_type(), Some(Ok(UserType::Student)));
    assert_eq!(claims.name().map(|name| name.as_str()), Some("张三"));
    assert_eq!(claims.code().map(|code| code.as_str()), Some("519030910001"));
    assert_eq!(outcome.access_token().secret(), "AT");
    assert_eq!(provider.request_count(), 1);
}

#[test]
fn test_login_with_unknown_user_type() {
    init_log("test_login_with_unknown_user_type");

    let provider = MockProvider::new(Some(mint_id_token(&id_token_claims(
        Some("N1"),
        "graduate",
    ))));
    let outcome = test_client(true)
        .handle_callback(pending("S1", "N1"), CallbackParams::from_query("code=C1&state=S1"))
        .request(&|request: HttpRequest| provider.respond(request))
        .panic_if_fail("login failed");

    let claims = outcome.id_token_claims().expect("missing ID token claims");
    assert_eq!(
        claims.user_type(),
        Some(Err(UnknownUserType("graduate".to_string())))
    );
    assert_eq!(claims.user_type_tag(), Some("graduate"));
}

#[test]
fn test_nonce_mismatch_rejects_before_any_resource_fetch() {
    init_log("test_nonce_mismatch_rejects_before_any_resource_fetch");

    let provider = MockProvider::new(Some(mint_id_token(&id_token_claims(
        Some("N1"),
        "student",
    ))));
    let err = test_client(true)
        .handle_callback(pending("S1", "N2"), CallbackParams::from_query("code=C1&state=S1"))
        .request(&|request: HttpRequest| provider.respond(request))
        .unwrap_err();

    assert!(matches!(err, LoginError::NonceMismatch), "{:?}", err);
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    // Only the token endpoint was contacted.
    assert_eq!(*provider.requests.borrow(), vec![jaccount::TOKEN_URL.to_string()]);
}

#[test]
fn test_rejected_id_tokens() {
    init_log("test_rejected_id_tokens");

    let mut expired = id_token_claims(Some("N1"), "student");
    expired["exp"] = json!((Utc::now() - Duration::seconds(1)).timestamp());
    let mut untrusted = id_token_claims(Some("N1"), "student");
    untrusted["iss"] = json!("https://evil.example.com/oauth2/");
    let mut malformed = id_token_claims(Some("N1"), "student");
    malformed["exp"] = json!("tomorrow");

    for (claims, expected_kind) in [
        (expired, "expired"),
        (untrusted, "untrusted issuer"),
        (malformed, "malformed"),
    ] {
        let provider = MockProvider::new(Some(mint_id_token(&claims)));
        match test_client(true)
            .handle_callback(pending("S1", "N1"), CallbackParams::from_query("code=C1&state=S1"))
            .request(&|request: HttpRequest| provider.respond(request))
        {
            Err(LoginError::InvalidIdToken(inner)) => {
                assert_eq!(verification_error_kind(&inner), expected_kind, "{:?}", inner);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}

fn verification_error_kind(err: &ClaimsVerificationError) -> &'static str {
    match err {
        ClaimsVerificationError::Expired { .. } => "expired",
        ClaimsVerificationError::UntrustedIssuer { .. } => "untrusted issuer",
        ClaimsVerificationError::Malformed(_) => "malformed",
        _ => "other",
    }
}

#[test]
fn test_exchange_failures() {
    init_log("test_exchange_failures");

    // Unknown authorization code.
    let provider = MockProvider::new(None);
    let err = test_client(true)
        .handle_callback(pending("S1", "N1"), CallbackParams::from_query("code=C2&state=S1"))
        .request(&|request: HttpRequest| provider.respond(request))
        .unwrap_err();
    assert!(matches!(err, LoginError::ExchangeFailed(_)), "{:?}", err);
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

    // Transport failure.
    let err = test_client(true)
        .handle_callback(pending("S1", "N1"), CallbackParams::from_query("code=C1&state=S1"))
        .request(&|_: HttpRequest| -> Result<HttpResponse, FakeError> {
            Err(FakeError::ConnectionRefused)
        })
        .unwrap_err();
    assert!(matches!(err, LoginError::ExchangeFailed(_)), "{:?}", err);

    // No ID token although `openid` was requested.
    let err = test_client(true)
        .handle_callback(pending("S1", "N1"), CallbackParams::from_query("code=C1&state=S1"))
        .request(&|request: HttpRequest| provider.respond(request))
        .unwrap_err();
    assert!(matches!(err, LoginError::MissingIdToken(_)), "{:?}", err);
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_login_without_openid_skips_id_token() {
    init_log("test_login_without_openid_skips_id_token");

    let client = test_client(false);
    let (_, pending) = client.start_login();
    assert!(pending.nonce().is_none());
    let state = pending.state().secret().clone();

    let provider = MockProvider::new(None);
    let outcome = client
        .handle_callback(
            Some(pending),
            CallbackParams::from_query(&format!("code=C1&state={}", state)),
        )
        .request(&|request: HttpRequest| provider.respond(request))
        .panic_if_fail("login failed");
    assert!(outcome.id_token_claims().is_none());
}

#[test]
fn test_cookie_round_trip_login() {
    init_log("test_cookie_round_trip_login");

    let client = test_client(true);
    let (authorize_url, pending) = client.start_login();

    // `/login` responds with the redirect and the login cookies.
    let mut login_response = HeaderMap::new();
    append_set_cookie_headers(&mut login_response, &login_cookies(&pending, false)).unwrap();
    drop(pending);

    // The user-agent sends the cookies back on `/callback`.
    let cookie_header = login_response
        .get_all(SET_COOKIE)
        .iter()
        .map(|value| {
            value
                .to_str()
                .unwrap()
                .split(';')
                .next()
                .unwrap()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("; ");
    let mut callback_request = HeaderMap::new();
    callback_request.insert(COOKIE, HeaderValue::from_str(&cookie_header).unwrap());

    // The provider echoes the state and embeds the nonce from the authorization URL.
    let query = authorize_url
        .query_pairs()
        .into_owned()
        .collect::<std::collections::HashMap<_, _>>();
    let provider = MockProvider::new(Some(mint_id_token(&id_token_claims(
        Some(query["nonce"].as_str()),
        "faculty",
    ))))
    .with_api_entities(json!([{"account": "test", "name": "张三", "userType": "faculty"}]));

    let outcome = client
        .handle_callback(
            pending_login_from_headers(&callback_request),
            CallbackParams::from_query(&format!(
                "code=C1&state={}",
                url::form_urlencoded::byte_serialize(query["state"].as_bytes()).collect::<String>()
            )),
        )
        .request(&|request: HttpRequest| provider.respond(request))
        .panic_if_fail("login failed");
    assert_eq!(
        outcome.id_token_claims().and_then(|claims| claims.user_type()),
        Some(Ok(UserType::Faculty))
    );

    // Whatever the outcome, the login cookies are cleared.
    let mut callback_response = HeaderMap::new();
    append_set_cookie_headers(&mut callback_response, &clear_login_cookies()).unwrap();
    assert_eq!(callback_response.get_all(SET_COOKIE).iter().count(), 2);

    let profile = client
        .api_client(&outcome)
        .profile(&|request: HttpRequest| provider.respond(request))
        .panic_if_fail("failed to fetch profile");
    assert_eq!(profile.parsed_user_type(), Some(Ok(UserType::Faculty)));
    assert_eq!(
        provider.requests.borrow().last().map(String::as_str),
        Some("http://127.0.0.1:8080/api/v1/me/profile")
    );
}

#[test]
fn test_correlation_store_is_single_use() {
    init_log("test_correlation_store_is_single_use");

    let client = test_client(true);
    let store = MemoryCorrelationStore::new();
    store.put("session-1", pending("S1", "N1").unwrap());

    let provider = MockProvider::new(Some(mint_id_token(&id_token_claims(
        Some("N1"),
        "student",
    ))));
    client
        .handle_callback(store.take("session-1"), CallbackParams::from_query("code=C1&state=S1"))
        .request(&|request: HttpRequest| provider.respond(request))
        .panic_if_fail("login failed");

    // Replaying the same callback finds nothing to check against.
    let err = client
        .handle_callback(store.take("session-1"), CallbackParams::from_query("code=C1&state=S1"))
        .request(&|request: HttpRequest| provider.respond(request))
        .unwrap_err();
    assert!(matches!(err, LoginError::MissingState), "{:?}", err);
    assert_eq!(provider.request_count(), 1);
}

#[test]
fn test_failed_attempt_cannot_be_resumed() {
    init_log("test_failed_attempt_cannot_be_resumed");

    let client = test_client(true);
    let store = MemoryCorrelationStore::new();
    store.put("session-1", pending("S1", "N1").unwrap());

    let err = client
        .handle_callback(store.take("session-1"), CallbackParams::from_query("code=C1&state=S9"))
        .request(&|_: HttpRequest| -> Result<HttpResponse, FakeError> {
            Err(FakeError::ConnectionRefused)
        })
        .unwrap_err();
    assert!(matches!(err, LoginError::StateMismatch), "{:?}", err);

    // A subsequent, otherwise valid callback for the same session is rejected as well.
    let err = client
        .handle_callback(store.take("session-1"), CallbackParams::from_query("code=C1&state=S1"))
        .request(&|_: HttpRequest| -> Result<HttpResponse, FakeError> {
            Err(FakeError::ConnectionRefused)
        })
        .unwrap_err();
    assert!(matches!(err, LoginError::MissingState), "{:?}", err);
}

#[tokio::test]
async fn test_login_async() {
    init_log("test_login_async");

    let provider = MockProvider::new(Some(mint_id_token(&id_token_claims(
        Some("N1"),
        "student",
    ))))
    .with_api_entities(json!([{"cardNo": "12345", "cardBalance": 10.5}]));
    let http_client = |request: HttpRequest| provider.respond_async(request);

    let client = test_client(true);
    let outcome = client
        .handle_callback(pending("S1", "N1"), CallbackParams::from_query("code=C1&state=S1"))
        .request_async(&http_client)
        .await
        .panic_if_fail("login failed");
    assert_eq!(
        outcome.id_token_claims().and_then(|claims| claims.user_type()),
        Some(Ok(UserType::Student))
    );

    let card = client
        .api_client(&outcome)
        .card_info_async(&http_client)
        .await
        .panic_if_fail("failed to fetch card");
    assert_eq!(card.card_no.as_deref(), Some("12345"));
    assert_eq!(card.card_balance, Some(10.5));

    let err = client
        .handle_callback(pending("S1", "N2"), CallbackParams::from_query("code=C1&state=S1"))
        .request_async(&http_client)
        .await
        .unwrap_err();
    assert!(matches!(err, LoginError::NonceMismatch), "{:?}", err);
}

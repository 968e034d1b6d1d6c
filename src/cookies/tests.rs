use crate::cookies::{
    append_set_cookie_headers, clear_login_cookies, login_cookies, pending_login_from_headers,
    NONCE_COOKIE, STATE_COOKIE,
};
use crate::{CsrfToken, Nonce, PendingLogin};

use cookie::time::Duration;
use cookie::SameSite;
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use pretty_assertions::assert_eq;

fn pending(nonce: Option<&str>) -> PendingLogin {
    PendingLogin::new(
        CsrfToken::new("S1".to_string()),
        nonce.map(|nonce| Nonce::new(nonce.to_string())),
    )
}

#[test]
fn test_login_cookies() {
    let cookies = login_cookies(&pending(Some("N1")), true);
    assert_eq!(cookies.len(), 2);

    assert_eq!(cookies[0].name(), STATE_COOKIE);
    assert_eq!(cookies[0].value(), "S1");
    assert_eq!(cookies[1].name(), NONCE_COOKIE);
    assert_eq!(cookies[1].value(), "N1");
    for cookie in &cookies {
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::hours(1)));
    }

    let cookies = login_cookies(&pending(None), false);
    assert_eq!(cookies.len(), 1);
    assert_eq!(cookies[0].secure(), Some(false));
}

#[test]
fn test_clear_login_cookies() {
    let cookies = clear_login_cookies();
    assert_eq!(
        cookies.iter().map(|cookie| cookie.name()).collect::<Vec<_>>(),
        vec![STATE_COOKIE, NONCE_COOKIE]
    );
    for cookie in &cookies {
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }
}

#[test]
fn test_set_cookie_headers() {
    let mut headers = HeaderMap::new();
    append_set_cookie_headers(&mut headers, &login_cookies(&pending(Some("N1")), false)).unwrap();
    let values = headers
        .get_all(SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(values.len(), 2);
    assert!(values[0].starts_with("jaccount_state=S1;"), "{}", values[0]);
    assert!(values[0].contains("HttpOnly"), "{}", values[0]);
    assert!(values[0].contains("Max-Age=3600"), "{}", values[0]);
    assert!(values[1].starts_with("jaccount_nonce=N1;"), "{}", values[1]);
}

#[test]
fn test_pending_login_from_headers() {
    let mut headers = HeaderMap::new();
    headers.append(
        COOKIE,
        HeaderValue::from_static("theme=dark; jaccount_state=S1"),
    );
    headers.append(COOKIE, HeaderValue::from_static("jaccount_nonce=N1"));

    let pending = pending_login_from_headers(&headers).expect("missing pending login");
    assert_eq!(pending.state().secret(), "S1");
    assert_eq!(pending.nonce().map(|nonce| nonce.secret().as_str()), Some("N1"));
}

#[test]
fn test_pending_login_from_headers_missing_state() {
    assert!(pending_login_from_headers(&HeaderMap::new()).is_none());

    let mut headers = HeaderMap::new();
    headers.insert(
        COOKIE,
        HeaderValue::from_static("jaccount_state=; jaccount_nonce=N1"),
    );
    assert!(pending_login_from_headers(&headers).is_none());

    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_static("jaccount_state=S1"));
    let pending = pending_login_from_headers(&headers).expect("missing pending login");
    assert!(pending.nonce().is_none());
}

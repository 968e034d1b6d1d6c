//! Carries a [`PendingLogin`] across the authorization redirect in a pair of cookies.
//!
//! Relying parties without a server-side session store can hand the `state` and `nonce` of a
//! login attempt to the user-agent as `HttpOnly` cookies when redirecting to the authorization
//! endpoint, and read them back from the callback request:
//!
//! ```rust,ignore
//! // On `/login`:
//! let (authorize_url, pending) = client.start_login();
//! for cookie in jaccount::cookies::login_cookies(&pending, is_https) {
//!     response.headers_mut().append(SET_COOKIE, cookie.to_string().parse()?);
//! }
//!
//! // On `/callback`:
//! let pending = jaccount::cookies::pending_login_from_headers(request.headers());
//! let outcome = client.handle_callback(pending, params).request(&http_client);
//! // ...and always expire the cookies, whatever the outcome.
//! ```
use crate::{CsrfToken, Nonce, PendingLogin};

use cookie::time::Duration;
use cookie::{Cookie, SameSite};
use http::header::{InvalidHeaderValue, COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};

#[cfg(test)]
mod tests;

/// Name of the cookie holding the `state` of a pending login.
pub const STATE_COOKIE: &str = "jaccount_state";
/// Name of the cookie holding the `nonce` of a pending login.
pub const NONCE_COOKIE: &str = "jaccount_nonce";

/// Lifetime of the login cookies.
pub const LOGIN_COOKIE_MAX_AGE: Duration = Duration::hours(1);

fn login_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(LOGIN_COOKIE_MAX_AGE)
        .build()
}

/// Creates the cookies carrying `pending` to the callback.
///
/// `secure` should be set whenever the relying party is served over HTTPS. The nonce cookie is
/// only produced if the pending login has a nonce.
pub fn login_cookies(pending: &PendingLogin, secure: bool) -> Vec<Cookie<'static>> {
    let mut cookies = vec![login_cookie(
        STATE_COOKIE,
        pending.state().secret().clone(),
        secure,
    )];
    if let Some(nonce) = pending.nonce() {
        cookies.push(login_cookie(NONCE_COOKIE, nonce.secret().clone(), secure));
    }
    cookies
}

/// Creates removal cookies for both login cookies.
pub fn clear_login_cookies() -> Vec<Cookie<'static>> {
    [STATE_COOKIE, NONCE_COOKIE]
        .into_iter()
        .map(|name| {
            Cookie::build((name, ""))
                .path("/")
                .max_age(Duration::ZERO)
                .build()
        })
        .collect()
}

/// Appends one `Set-Cookie` header per cookie.
pub fn append_set_cookie_headers(
    headers: &mut HeaderMap,
    cookies: &[Cookie<'_>],
) -> Result<(), InvalidHeaderValue> {
    for cookie in cookies {
        headers.append(SET_COOKIE, HeaderValue::from_str(&cookie.to_string())?);
    }
    Ok(())
}

/// Reconstructs the pending login from the `Cookie` headers of the callback request.
///
/// Returns `None` if the state cookie is absent or empty. Unparseable cookie pairs are skipped.
pub fn pending_login_from_headers(headers: &HeaderMap) -> Option<PendingLogin> {
    let mut state = None;
    let mut nonce = None;
    for cookie in headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
    {
        match cookie.name() {
            STATE_COOKIE if state.is_none() && !cookie.value().is_empty() => {
                state = Some(CsrfToken::new(cookie.value().to_string()))
            }
            NONCE_COOKIE if nonce.is_none() && !cookie.value().is_empty() => {
                nonce = Some(Nonce::new(cookie.value().to_string()))
            }
            _ => {}
        }
    }
    state.map(|state| PendingLogin::new(state, nonce))
}

//!
//! This example logs a user in with jAccount and then serves their profile and campus card data
//! through the REST API. Each browser session gets its own `ApiClient`.
//!
//! Before running it, you'll need to register a jAccount client with
//! `http://localhost:8000/callback` as its redirect URI.
//!
//! In order to run the example call:
//!
//! ```sh
//! JACCOUNT_CLIENT_ID=xxx JACCOUNT_CLIENT_SECRET=yyy cargo run --example profile --features reqwest-blocking
//! ```
//!
//! ...and browse to http://localhost:8000/login, then to `/profile`, `/card/info` or
//! `/card/transactions`.
//!

use jaccount::cookies::{
    append_set_cookie_headers, clear_login_cookies, login_cookies, pending_login_from_headers,
};
use jaccount::reqwest;
use jaccount::{
    ApiClient, CallbackParams, CardTransactionsOptions, Client, ClientId, ClientSecret, CsrfToken,
    RedirectUrl, Scope, SCOPE_ESSENTIAL,
};
use chrono::{TimeZone, Utc};
use cookie::Cookie;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, LOCATION};
use http::{HeaderMap, StatusCode};
use log::info;
use serde::Serialize;
use url::Url;

use std::collections::HashMap;
use std::env;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::process::exit;

const SESSION_COOKIE: &str = "session";

fn handle_error<T: std::error::Error>(fail: &T, msg: &'static str) {
    let mut err_msg = format!("ERROR: {}", msg);
    let mut cur_fail: Option<&dyn std::error::Error> = Some(fail);
    while let Some(cause) = cur_fail {
        err_msg += &format!("\n    caused by: {}", cause);
        cur_fail = cause.source();
    }
    println!("{}", err_msg);
    exit(1);
}

fn env_var(name: &str, fallback: &str) -> String {
    env::var(name)
        .or_else(|_| env::var(fallback))
        .unwrap_or_else(|_| panic!("Missing the {} environment variable.", name))
}

fn read_request(stream: &TcpStream) -> anyhow::Result<(Url, HeaderMap)> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("malformed request line {:?}", request_line))?;
    let url = Url::parse(&("http://localhost:8000".to_string() + target))?;

    let mut headers = HeaderMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.append(
                HeaderName::from_bytes(name.trim().as_bytes())?,
                HeaderValue::from_str(value.trim())?,
            );
        }
    }
    Ok((url, headers))
}

fn write_response(
    mut stream: &TcpStream,
    status: StatusCode,
    mut headers: HeaderMap,
    body: &str,
) -> anyhow::Result<()> {
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
    }
    let mut response = format!("HTTP/1.1 {}\r\ncontent-length: {}\r\n", status, body.len());
    for (name, value) in &headers {
        response += &format!("{}: {}\r\n", name, value.to_str()?);
    }
    response += "\r\n";
    response += body;
    stream.write_all(response.as_bytes())?;
    Ok(())
}

fn write_json<T: Serialize>(stream: &TcpStream, value: &T) -> anyhow::Result<()> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    write_response(
        stream,
        StatusCode::OK,
        headers,
        &serde_json::to_string_pretty(value)?,
    )
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

fn main() {
    env_logger::init();

    let client_id = ClientId::new(env_var("JACCOUNT_CLIENT_ID", "CLIENT_ID"));
    let client_secret = ClientSecret::new(env_var("JACCOUNT_CLIENT_SECRET", "CLIENT_SECRET"));

    let client = Client::new(client_id)
        .unwrap_or_else(|err| {
            handle_error(&err, "Invalid jAccount endpoint");
            unreachable!();
        })
        .set_client_secret(client_secret)
        .set_redirect_uri(
            RedirectUrl::new("http://localhost:8000/callback".to_string()).unwrap_or_else(|err| {
                handle_error(&err, "Invalid redirect URL");
                unreachable!();
            }),
        )
        // Profile and card data only need the `essential` scope.
        .add_scope(Scope::new(SCOPE_ESSENTIAL.to_string()));

    let http_client = reqwest::blocking::ClientBuilder::new()
        // Following redirects opens the client up to SSRF vulnerabilities.
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_else(|err| {
            handle_error(&err, "Failed to build HTTP client");
            unreachable!();
        });

    let mut sessions: HashMap<String, ApiClient> = HashMap::new();

    println!("Browse to http://localhost:8000/login");

    // A very naive implementation of the redirect server.
    let listener = TcpListener::bind("127.0.0.1:8000").unwrap_or_else(|err| {
        handle_error(&err, "Failed to listen on port 8000");
        unreachable!();
    });
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                info!("failed to accept connection: {}", err);
                continue;
            }
        };

        let result = read_request(&stream).and_then(|(url, request_headers)| {
            let mut headers = HeaderMap::new();
            let api_client = session_id(&request_headers).and_then(|id| sessions.get(&id).cloned());

            match (url.path(), api_client) {
                ("/login", _) => {
                    let (authorize_url, pending) = client.start_login();
                    append_set_cookie_headers(&mut headers, &login_cookies(&pending, false))?;
                    headers.insert(LOCATION, HeaderValue::from_str(authorize_url.as_str())?);
                    write_response(&stream, StatusCode::FOUND, headers, "")
                }
                ("/callback", _) => {
                    append_set_cookie_headers(&mut headers, &clear_login_cookies())?;
                    match client
                        .handle_callback(
                            pending_login_from_headers(&request_headers),
                            CallbackParams::from_url(&url),
                        )
                        .request(&http_client)
                    {
                        Ok(outcome) => {
                            let id = CsrfToken::new_random().secret().clone();
                            let session_cookie = Cookie::build((SESSION_COOKIE, id.clone()))
                                .http_only(true)
                                .path("/")
                                .build();
                            append_set_cookie_headers(&mut headers, &[session_cookie])?;
                            sessions.insert(id, client.api_client(&outcome));

                            headers.insert(LOCATION, HeaderValue::from_static("/profile"));
                            write_response(&stream, StatusCode::FOUND, headers, "")
                        }
                        Err(err) => {
                            println!("Login rejected: {}", err);
                            write_response(&stream, err.status_code(), headers, &err.to_string())
                        }
                    }
                }
                ("/profile", Some(api_client)) => {
                    write_json(&stream, &api_client.profile(&http_client)?)
                }
                ("/card/info", Some(api_client)) => {
                    write_json(&stream, &api_client.card_info(&http_client)?)
                }
                ("/card/transactions", Some(api_client)) => {
                    let options = CardTransactionsOptions::new().set_begin_date(
                        Utc.timestamp_millis_opt(1_619_881_405_000)
                            .single()
                            .ok_or_else(|| anyhow::anyhow!("invalid begin date"))?,
                    );
                    let transactions = api_client.card_transactions(&options, &http_client)?;
                    write_json(&stream, &transactions.entities())
                }
                ("/profile" | "/card/info" | "/card/transactions", None) => {
                    headers.insert(LOCATION, HeaderValue::from_static("/login"));
                    write_response(&stream, StatusCode::FOUND, headers, "")
                }
                _ => write_response(&stream, StatusCode::NOT_FOUND, headers, "Not found"),
            }
        });
        if let Err(err) = result {
            println!("Failed to handle request: {:#}", err);
        }
    }
}

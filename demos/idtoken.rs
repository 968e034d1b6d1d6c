//!
//! This example showcases the jAccount login flow with an ID token, using the cookie carrier to
//! keep the `state` and `nonce` between the redirect to jAccount and the callback.
//!
//! Before running it, you'll need to register a jAccount client with
//! `http://localhost:8000/callback` as its redirect URI.
//!
//! In order to run the example call:
//!
//! ```sh
//! JACCOUNT_CLIENT_ID=xxx JACCOUNT_CLIENT_SECRET=yyy cargo run --example idtoken --features reqwest-blocking
//! ```
//!
//! ...and browse to http://localhost:8000/login.
//!

use jaccount::cookies::{
    append_set_cookie_headers, clear_login_cookies, login_cookies, pending_login_from_headers,
};
use jaccount::reqwest;
use jaccount::{
    CallbackParams, Client, ClientId, ClientSecret, LoginOutcome, RedirectUrl, Scope,
    SCOPE_ESSENTIAL, SCOPE_OPENID,
};
use http::header::{HeaderName, HeaderValue, LOCATION};
use http::{HeaderMap, StatusCode};
use log::info;
use url::Url;

use std::env;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::process::exit;

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

/// Reads the request line and headers of a plain HTTP/1.1 request.
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
    headers: &HeaderMap,
    body: &str,
) -> anyhow::Result<()> {
    let mut response = format!(
        "HTTP/1.1 {}\r\ncontent-type: text/plain; charset=utf-8\r\ncontent-length: {}\r\n",
        status,
        body.len()
    );
    for (name, value) in headers {
        response += &format!("{}: {}\r\n", name, value.to_str()?);
    }
    response += "\r\n";
    response += body;
    stream.write_all(response.as_bytes())?;
    Ok(())
}

fn describe(outcome: &LoginOutcome) -> String {
    match outcome.id_token_claims() {
        Some(claims) => format!(
            "Logged in as {} ({}, {:?})\nName: {:?}\nCode: {:?}\nID token expires at {}\n",
            claims.subject().as_str(),
            claims.issuer(),
            claims.user_type_tag(),
            claims.name().map(|name| name.as_str()),
            claims.code().map(|code| code.as_str()),
            claims.expiration(),
        ),
        None => "Logged in without an ID token\n".to_string(),
    }
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
        // This example will be running its own server at localhost:8000.
        .set_redirect_uri(
            RedirectUrl::new("http://localhost:8000/callback".to_string()).unwrap_or_else(|err| {
                handle_error(&err, "Invalid redirect URL");
                unreachable!();
            }),
        )
        .add_scope(Scope::new(SCOPE_ESSENTIAL.to_string()))
        .add_scope(Scope::new(SCOPE_OPENID.to_string()));

    let http_client = reqwest::blocking::ClientBuilder::new()
        // Following redirects opens the client up to SSRF vulnerabilities.
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_else(|err| {
            handle_error(&err, "Failed to build HTTP client");
            unreachable!();
        });

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
            match url.path() {
                "/login" => {
                    let (authorize_url, pending) = client.start_login();
                    append_set_cookie_headers(&mut headers, &login_cookies(&pending, false))?;
                    headers.insert(LOCATION, HeaderValue::from_str(authorize_url.as_str())?);
                    write_response(&stream, StatusCode::FOUND, &headers, "")
                }
                "/callback" => {
                    // The login cookies are single-use, whatever the outcome.
                    append_set_cookie_headers(&mut headers, &clear_login_cookies())?;
                    match client
                        .handle_callback(
                            pending_login_from_headers(&request_headers),
                            CallbackParams::from_url(&url),
                        )
                        .request(&http_client)
                    {
                        Ok(outcome) => {
                            write_response(&stream, StatusCode::OK, &headers, &describe(&outcome))
                        }
                        Err(err) => {
                            println!("Login rejected: {}", err);
                            write_response(&stream, err.status_code(), &headers, &err.to_string())
                        }
                    }
                }
                _ => write_response(&stream, StatusCode::NOT_FOUND, &headers, "Not found"),
            }
        });
        if let Err(err) = result {
            println!("Failed to handle request: {:#}", err);
        }
    }
}

//! Cookie header manipulation.

use axum::http::header::COOKIE;
use axum::http::{HeaderMap, HeaderValue};

/// Remove the cookie named `name` from every `cookie` header.
///
/// Other cookies keep their order. When nothing is left the header is
/// removed rather than sent empty.
pub fn strip_cookie(headers: &mut HeaderMap, name: &str) {
    if !headers.contains_key(COOKIE) {
        return;
    }

    let remaining: Vec<&str> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .map(str::trim)
        .filter(|pair| !pair.is_empty() && cookie_name(pair) != name)
        .collect();
    let joined = remaining.join("; ");

    headers.remove(COOKIE);
    if joined.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&joined) {
        headers.insert(COOKIE, value);
    }
}

fn cookie_name(pair: &str) -> &str {
    pair.split_once('=').map_or(pair, |(name, _)| name).trim()
}

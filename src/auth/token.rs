//! Session token transport.
//!
//! The dedicated session header wins over the same-named cookie. Cookies
//! are only ever written back on local-class deployments; everywhere else
//! cross-origin and SSL constraints make cookie round-tripping unreliable,
//! so retrieval never touches the response.

use axum::http::header::COOKIE;
use axum::http::HeaderMap;

/// Header and cookie share one name
pub const SESSION_TOKEN_HEADER: &str = "Cohort-Session";

/// Fixed lifetime for the re-issued local cookie
pub const SESSION_COOKIE_MAX_AGE_SECS: i64 = 12 * 60 * 60;

/// Where the token was found; cookie-sourced tokens trigger the local
/// re-issue behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Header,
    Cookie,
}

/// Extract the session token from the request, header first, cookie second.
/// Never fails; malformed values are treated as absent.
pub fn retrieve_session_token(headers: &HeaderMap) -> Option<(String, TokenSource)> {
    if let Some(value) = headers.get(SESSION_TOKEN_HEADER) {
        if let Ok(token) = value.to_str() {
            let token = token.trim();
            if !token.is_empty() {
                return Some((token.to_string(), TokenSource::Header));
            }
        }
    }
    cookie_value(headers, SESSION_TOKEN_HEADER).map(|token| (token, TokenSource::Cookie))
}

/// Find a cookie by name across all Cookie headers
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        for pair in raw.split(';') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            if key.trim() == name && !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Build the Set-Cookie value for a (re-)issued session cookie: fixed
/// max-age, root path, configured domain, deliberately neither HttpOnly
/// nor Secure so local tooling can read it over plain HTTP
pub fn session_cookie(token: &str, domain: &str) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/; Domain={}",
        SESSION_TOKEN_HEADER, token, SESSION_COOKIE_MAX_AGE_SECS, domain
    )
}

/// Expired cookie used to clear the browser state on sign-out
pub fn expired_session_cookie(domain: &str) -> String {
    format!(
        "{}=; Max-Age=0; Path=/; Domain={}",
        SESSION_TOKEN_HEADER, domain
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_token_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_TOKEN_HEADER, HeaderValue::from_static("from-header"));
        headers.insert(
            COOKIE,
            HeaderValue::from_static("Cohort-Session=from-cookie"),
        );
        let (token, source) = retrieve_session_token(&headers).unwrap();
        assert_eq!(token, "from-header");
        assert_eq!(source, TokenSource::Header);
    }

    #[test]
    fn cookie_token_used_when_header_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("other=1; Cohort-Session=from-cookie; theme=dark"),
        );
        let (token, source) = retrieve_session_token(&headers).unwrap();
        assert_eq!(token, "from-cookie");
        assert_eq!(source, TokenSource::Cookie);
    }

    #[test]
    fn blank_header_falls_through_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_TOKEN_HEADER, HeaderValue::from_static("  "));
        headers.insert(COOKIE, HeaderValue::from_static("Cohort-Session=tok"));
        let (token, source) = retrieve_session_token(&headers).unwrap();
        assert_eq!(token, "tok");
        assert_eq!(source, TokenSource::Cookie);
    }

    #[test]
    fn absent_everywhere_is_none() {
        let headers = HeaderMap::new();
        assert!(retrieve_session_token(&headers).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark"));
        assert!(retrieve_session_token(&headers).is_none());
    }

    #[test]
    fn reissued_cookie_has_fixed_shape() {
        let cookie = session_cookie("abc123", "localhost");
        assert_eq!(
            cookie,
            "Cohort-Session=abc123; Max-Age=43200; Path=/; Domain=localhost"
        );
        assert!(!cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));
    }
}

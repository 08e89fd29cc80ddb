use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::auth::token::{self, TokenSource};
use crate::config;
use crate::context::RequestContext;
use crate::error::ApiError;
use crate::services::AuthService;
use crate::session::{ClientInfo, UserSession};
use crate::stores::AppState;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// The resolved (but not yet authorized) session for this request,
/// injected alongside the RequestContext. Authorization happens when a
/// handler asks the gateway for an authenticated/consented session.
#[derive(Clone)]
pub struct CallerSession(pub Option<UserSession>);

/// Builds the per-request context, resolves the session token, and injects
/// both into the request extensions. On the way out it re-issues the
/// session cookie (local-class deployments only) and emits the request's
/// metrics record.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let headers = request.headers().clone();

    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let caller_ip = caller_ip(&headers, &request);
    let client_info = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(ClientInfo::parse)
        .unwrap_or_default();
    let languages = headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .map(parse_accept_language)
        .unwrap_or_default();

    let ctx = RequestContext::builder()
        .with_request_id(request_id)
        .with_caller_ip_address(caller_ip)
        .with_caller_client_info(client_info)
        .with_caller_languages(languages)
        .build();

    let token = token::retrieve_session_token(&headers);
    let session = match &token {
        Some((value, _)) => match AuthService::new(&state).resolve_session(value).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Session resolution failed: {}", e);
                let api_error =
                    ApiError::internal_server_error("An error occurred while processing your request");
                return api_error.into_response();
            }
        },
        None => None,
    };

    request.extensions_mut().insert(ctx.clone());
    request.extensions_mut().insert(CallerSession(session));

    let mut response = next.run(request).await;

    // Cookie-sourced tokens get a refreshed cookie, but only where cookie
    // round-tripping is reliable
    if let Some((value, TokenSource::Cookie)) = &token {
        let config = config::config();
        if config.environment.emits_session_cookie() {
            let cookie = token::session_cookie(value, &config.security.session_cookie_domain);
            if let Ok(cookie) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
        }
    }

    ctx.metrics().set_status(response.status().as_u16());
    ctx.metrics().emit();
    response
}

/// First X-Forwarded-For hop when present (we sit behind a load balancer
/// everywhere but local), else the peer address
fn caller_ip(headers: &HeaderMap, request: &Request) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    forwarded.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string())
    })
}

/// Order an Accept-Language header by quality, keeping primary subtags
/// only ("en-US;q=0.8" contributes "en") and dropping duplicates
fn parse_accept_language(header: &str) -> Vec<String> {
    let mut weighted: Vec<(String, f32)> = Vec::new();
    for part in header.split(',') {
        let part = part.trim();
        if part.is_empty() || part == "*" {
            continue;
        }
        let (tag, quality) = match part.split_once(';') {
            Some((tag, params)) => {
                let quality = params
                    .trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.parse::<f32>().ok())
                    .unwrap_or(1.0);
                (tag.trim(), quality)
            }
            None => (part, 1.0),
        };
        let primary = tag.split('-').next().unwrap_or(tag).to_lowercase();
        if primary.is_empty() || primary == "*" {
            continue;
        }
        if !weighted.iter().any(|(existing, _)| *existing == primary) {
            weighted.push((primary, quality));
        }
    }
    weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    weighted.into_iter().map(|(tag, _)| tag).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_language_orders_by_quality() {
        let languages = parse_accept_language("fr;q=0.8,en-US,de;q=0.9");
        assert_eq!(languages, vec!["en", "de", "fr"]);
    }

    #[test]
    fn accept_language_drops_duplicates_and_wildcards() {
        let languages = parse_accept_language("en-US,en;q=0.9,*;q=0.5");
        assert_eq!(languages, vec!["en"]);
    }

    #[test]
    fn accept_language_tolerates_garbage() {
        assert!(parse_accept_language("").is_empty());
        assert!(parse_accept_language(";;;,").is_empty());
    }
}

use crate::limiter::{
    RateLimitInfo, RateLimited, RateLimitedError, RouteKey, SequentialRateLimiter, GLOBAL_HEADER,
    HASH_HEADER, LIMIT_HEADER, REMAINING_HEADER, RESET_AFTER_HEADER, RESET_HEADER,
    RETRY_AFTER_HEADER, SCOPE_HEADER,
};
use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

#[derive(Clone)]
pub struct AppState {
    pub limiter: SequentialRateLimiter,
    /// Hold limited requests in the bucket queue instead of answering 429.
    pub queue: bool,
}

impl AppState {
    pub fn new(limiter: SequentialRateLimiter, queue: bool) -> Self {
        Self { limiter, queue }
    }
}

pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let route = route_key(&request);
    let relative = state.limiter.config().is_relative();

    if state.queue {
        return match state.limiter.acquire(route, false).await {
            Some(info) => {
                let mut response = next.run(request).await;
                apply_info(response.headers_mut(), &info, relative);
                response
            }
            None => (StatusCode::SERVICE_UNAVAILABLE, "Request cancelled").into_response(),
        };
    }

    match state.limiter.check(&route) {
        Ok(info) => {
            let mut response = next.run(request).await;
            apply_info(response.headers_mut(), &info, relative);
            response
        }
        Err(limited) => {
            let response = limited_response(&limited, relative);
            let scope = limited.response.scope();
            tracing::warn!(
                client = %route.client,
                scope,
                "{}",
                RateLimitedError::from(limited)
            );
            response
        }
    }
}

/// Bucket key of a request: method, matched route template and client address.
pub fn route_key(request: &Request) -> RouteKey {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    RouteKey::new(request.method().as_str(), route, client_id(request))
}

fn client_id(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn limited_response(limited: &RateLimited, relative: bool) -> Response {
    let body = match limited.response.to_json(limited.retry_after_secs()) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("Failed to render rate limit body: {}", e);
            return StatusCode::TOO_MANY_REQUESTS.into_response();
        }
    };

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response();

    let headers = response.headers_mut();
    insert_header(headers, RETRY_AFTER_HEADER, limited.retry_after_header().to_string());
    insert_header(headers, SCOPE_HEADER, limited.response.scope().to_string());
    if limited.response.is_global() {
        insert_header(headers, GLOBAL_HEADER, "true".to_string());
    }
    if let Some(info) = &limited.info {
        apply_info(headers, info, relative);
    }
    response
}

fn apply_info(headers: &mut HeaderMap, info: &RateLimitInfo, relative: bool) {
    insert_header(headers, LIMIT_HEADER, info.limit.to_string());
    insert_header(headers, REMAINING_HEADER, info.remaining.to_string());
    if relative {
        insert_header(headers, RESET_AFTER_HEADER, info.reset_after_header());
    } else {
        insert_header(headers, RESET_HEADER, info.reset_header());
    }
    insert_header(headers, HASH_HEADER, info.bucket.clone());
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: String) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(&value),
    ) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => tracing::warn!("Failed to add {} header", name),
    }
}

use serde::Serialize;
use thiserror::Error;

/// Bodies sent with `429 Too Many Requests`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorResponse {
    UserRateLimit,
    ResourcesRateLimit,
    GlobalRateLimit,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    retry_after: f64,
    global: bool,
}

impl ErrorResponse {
    pub fn message(&self) -> &'static str {
        match self {
            ErrorResponse::UserRateLimit | ErrorResponse::GlobalRateLimit => {
                "You are being rate limited."
            }
            ErrorResponse::ResourcesRateLimit => "The resource is being rate limited.",
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, ErrorResponse::GlobalRateLimit)
    }

    /// Value of the `X-RateLimit-Scope` header.
    pub fn scope(&self) -> &'static str {
        match self {
            ErrorResponse::UserRateLimit => "user",
            ErrorResponse::ResourcesRateLimit => "shared",
            ErrorResponse::GlobalRateLimit => "global",
        }
    }

    /// `retry_after` is in seconds.
    pub fn to_json(&self, retry_after: f64) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&ErrorBody {
            message: self.message(),
            retry_after,
            global: self.is_global(),
        })
    }
}

/// Indicates that a request hit a `429: Too Many Requests` limit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("The request was ratelimited! Retry-After: {retry_after}  Route: {route}")]
pub struct RateLimitedError {
    /// Route of the bucket responsible for the limit.
    pub route: String,
    /// Back-off delay in milliseconds before the route may be queried again.
    pub retry_after: i64,
}

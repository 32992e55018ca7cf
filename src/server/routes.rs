use axum::http::StatusCode;

/// `GET /ping`
pub async fn ping() -> (StatusCode, &'static str) {
    (StatusCode::OK, "pong")
}

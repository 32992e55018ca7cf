use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use netty_pack::limiter::{RateLimitConfig, RestRateLimiter, SequentialRateLimiter};
use netty_pack::server::{self, AppState};
use std::time::{Duration, Instant};
use tower::ServiceExt;

fn app(config: RateLimitConfig, queue: bool) -> Router {
    server::router(AppState::new(SequentialRateLimiter::new(config), queue))
}

fn ping(client: &str) -> Request<Body> {
    Request::builder()
        .uri("/ping")
        .header("X-Forwarded-For", client)
        .body(Body::empty())
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn header<'a>(response: &'a axum::response::Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn test_ping_reports_bucket_headers() {
    let app = app(RateLimitConfig::new(5, Duration::from_secs(60)), false);

    let response = app.oneshot(ping("10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-limit"), Some("5"));
    assert_eq!(header(&response, "x-ratelimit-remaining"), Some("4"));
    assert!(header(&response, "x-ratelimit-reset-after").is_some());
    assert!(header(&response, "x-ratelimit-reset").is_none());
    assert!(header(&response, "x-ratelimit-bucket").is_some());
    assert_eq!(body_string(response).await, "pong");
}

#[tokio::test]
async fn test_limit_exceeded_returns_429_with_body() {
    let app = app(
        RateLimitConfig::new(2, Duration::from_secs(60)).relative(false),
        false,
    );

    for remaining in ["1", "0"] {
        let response = app.clone().oneshot(ping("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-remaining"), Some(remaining));
        assert!(header(&response, "x-ratelimit-reset").is_some());
    }

    let response = app.clone().oneshot(ping("10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&response, "content-type"), Some("application/json"));
    assert_eq!(header(&response, "x-ratelimit-scope"), Some("user"));
    assert_eq!(header(&response, "x-ratelimit-remaining"), Some("0"));
    assert!(header(&response, "x-ratelimit-global").is_none());

    let retry_after: i64 = header(&response, "retry-after").unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 60);

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["message"], "You are being rate limited.");
    assert_eq!(body["global"], false);
    assert!(body["retry_after"].as_f64().unwrap() > 0.0);

    // other clients have their own bucket
    let response = app.oneshot(ping("10.0.0.2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_global_limit_spans_routes() {
    let app = app(
        RateLimitConfig::new(10, Duration::from_secs(60))
            .with_global_limit(1, Duration::from_secs(60)),
        false,
    );

    let response = app.clone().oneshot(ping("10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(ping("10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&response, "x-ratelimit-global"), Some("true"));
    assert_eq!(header(&response, "x-ratelimit-scope"), Some("global"));

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["global"], true);
}

#[tokio::test]
async fn test_shared_route_limits_all_clients_together() {
    let app = app(
        RateLimitConfig::new(1, Duration::from_secs(60)).with_shared_routes(vec!["/ping".to_string()]),
        false,
    );

    let response = app.clone().oneshot(ping("10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(ping("10.0.0.2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&response, "x-ratelimit-scope"), Some("shared"));

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["message"], "The resource is being rate limited.");
}

#[tokio::test]
async fn test_queue_mode_delays_instead_of_rejecting() {
    let app = app(RateLimitConfig::new(1, Duration::from_millis(200)), true);
    let started = Instant::now();

    let first = tokio::spawn(app.clone().oneshot(ping("10.0.0.1")));
    let second = tokio::spawn(app.oneshot(ping("10.0.0.1")));

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_millis(190));
}

#[tokio::test]
async fn test_queue_mode_after_stop_is_unavailable() {
    let limiter = SequentialRateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));
    limiter.stop(true, Box::new(|| {}));
    let app = server::router(AppState::new(limiter, true));

    let response = app.oneshot(ping("10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_serve_over_tcp_until_shutdown() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let state = AppState::new(
        SequentialRateLimiter::new(RateLimitConfig::new(10, Duration::from_secs(60))),
        false,
    );
    let handle = tokio::spawn(server::serve(listener, state, async {
        let _ = shutdown_rx.await;
    }));

    let response = reqwest::get(format!("http://{}/ping", addr)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response.headers().contains_key("x-ratelimit-bucket"));
    assert_eq!(response.text().await.unwrap(), "pong");

    shutdown_tx.send(()).unwrap();
    tokio_test::assert_ok!(handle.await.unwrap());
}

#[tokio::test]
async fn test_shutdown_releases_parked_requests() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let limiter = SequentialRateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(30)));
    let state = AppState::new(limiter.clone(), true);
    let handle = tokio::spawn(server::serve(listener, state, async {
        let _ = shutdown_rx.await;
    }));

    let url = format!("http://{}/ping", addr);
    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let parked = tokio::spawn(async move { reqwest::get(&url).await.unwrap().status() });
    tokio::time::timeout(Duration::from_secs(5), async {
        while limiter.queued() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let started = Instant::now();
    shutdown_tx.send(()).unwrap();

    let status = tokio::time::timeout(Duration::from_secs(5), parked)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(limiter.is_stopped());
}

//! The HTTP server the packaged archive launches.

pub mod middleware;
pub mod routes;

use crate::limiter::RestRateLimiter;
use crate::utils::error::Result;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

pub use middleware::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(routes::ping))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .with_state(state)
}

/// Serves until `shutdown` resolves. The rate limiter is stopped as soon as
/// the signal fires, so requests parked in its queues are answered with `503`
/// instead of holding up the graceful drain.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let limiter = state.limiter.clone();
    let app = router(state);
    let addr = listener.local_addr()?;

    let shutdown = async move {
        shutdown.await;
        limiter.stop(
            true,
            Box::new(|| tracing::info!("Rate limiter queues drained")),
        );
    };

    tracing::info!(%addr, "Finished Loading!");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

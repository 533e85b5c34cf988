//! Admin status endpoint, served on its own listener.

pub mod handlers;

use std::io;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::dispatch::Dispatcher;
use self::handlers::get_status;

pub fn setup_admin_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .with_state(dispatcher)
}

/// Serve the admin router until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), io::Error> {
    tracing::info!(address = %listener.local_addr()?, "Admin listener starting");

    axum::serve(listener, setup_admin_router(dispatcher))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::handlers::SystemStatus;
    use super::*;
    use crate::dispatch::types::{ForwardOutcome, WorkItem};
    use crate::dispatch::ForwardError;
    use crate::forward::Forward;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    struct Never;

    #[async_trait]
    impl Forward for Never {
        async fn forward(&self, _item: &WorkItem) -> ForwardOutcome {
            Err(ForwardError::Internal("unused".into()))
        }
    }

    #[tokio::test]
    async fn status_reports_pool_capacity() {
        let dispatcher = Arc::new(Dispatcher::start(4, Arc::new(Never)));
        let response = setup_admin_router(dispatcher)
            .oneshot(Request::builder().uri("/admin/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let status: SystemStatus = serde_json::from_slice(&body).unwrap();
        assert_eq!(status.workers, 4);
        assert_eq!(status.available, 4);
        assert_eq!(status.in_flight, 0);
        assert_eq!(status.status, "operational");
    }
}

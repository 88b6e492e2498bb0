//! webcam-http: axum surface for the shared webcam
//!
//! Routes: `/` (index page), `/video_feed` (MJPEG while the session is
//! streaming), `POST /capture`, `POST /start_stream`, `POST /stop_stream`
//! and `/metrics`.

mod metrics;
pub use metrics::{MetricsHub, StreamMetrics};

mod page;
pub use page::render_index;

mod routes;
pub use routes::{create_router, AppState};

pub mod session;
pub use session::{Session, SessionStore, SESSION_COOKIE};

mod store;
pub use store::{validate_name, DirectoryStore, FrameStore};

use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Serve the router until `shutdown` resolves.
///
/// Open feeds never finish on their own, so the camera is closed as soon as
/// shutdown begins; every stream then ends on its next pull and the graceful
/// drain can complete.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let camera = Arc::clone(&state.camera);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Closing camera to end open feeds");
            if let Err(e) = tokio::task::spawn_blocking(move || camera.close()).await {
                tracing::warn!("Camera close during shutdown failed: {e}");
            }
        })
        .await
}

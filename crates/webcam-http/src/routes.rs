use crate::page::render_index;
use crate::session::{Session, SessionStore};
use crate::store::FrameStore;
use crate::MetricsHub;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use futures::Stream;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use webcam_capture::stream::stream_content_type;
use webcam_capture::{CameraManager, Error, FrameEncoder, FrameStream};

/// Everything a request handler needs, shared across all requests.
pub struct AppState {
    pub camera: Arc<CameraManager>,
    pub encoder: Arc<dyn FrameEncoder>,
    pub sessions: SessionStore,
    pub store: Arc<dyn FrameStore>,
    pub capture_name: String,
    pub metrics: MetricsHub,
}

impl AppState {
    pub fn new(
        camera: Arc<CameraManager>,
        encoder: Arc<dyn FrameEncoder>,
        store: Arc<dyn FrameStore>,
        capture_name: impl Into<String>,
    ) -> Result<Self, String> {
        Ok(Self {
            camera,
            encoder,
            sessions: SessionStore::new(),
            store,
            capture_name: capture_name.into(),
            metrics: MetricsHub::new()?,
        })
    }
}

/// Run a blocking camera operation off the async workers.
async fn blocking<T, F>(op: F) -> webcam_capture::Result<T>
where
    F: FnOnce() -> webcam_capture::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| Error::Io(format!("camera worker failed: {e}")))?
}

async fn open_camera(state: &AppState) -> webcam_capture::Result<()> {
    let camera = Arc::clone(&state.camera);
    blocking(move || camera.open()).await
}

fn text_response(status: StatusCode, text: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text.into(),
    )
        .into_response()
}

async fn index(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let streaming = state
        .sessions
        .lookup(&headers)
        .is_some_and(|session| session.streaming());
    Html(render_index(streaming, state.camera.is_open())).into_response()
}

async fn video_feed(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(session) = state.sessions.lookup(&headers).filter(Session::streaming) else {
        return text_response(StatusCode::OK, "Streaming is stopped.");
    };
    if let Err(e) = open_camera(&state).await {
        error!(operation = "video_feed", "Could not start camera: {e}");
        return text_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Could not start camera: {e}"),
        );
    }

    state.metrics.stream.streams_started.inc();
    let frames = FrameStream::new(
        Arc::clone(&state.camera),
        Arc::clone(&state.encoder),
        session.flag.clone(),
    );
    let body = Body::from_stream(mjpeg_body(frames, state.metrics.clone()));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, stream_content_type())
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .body(body);
    match response {
        Ok(response) => response,
        Err(e) => text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Drive a [`FrameStream`] on the blocking pool, one pull per body chunk.
///
/// Dropping the returned stream (client disconnect) schedules no further
/// pulls; a read already in flight finishes and is discarded.
fn mjpeg_body(
    frames: FrameStream,
    metrics: MetricsHub,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    futures::stream::unfold(frames, move |mut frames| {
        let metrics = metrics.clone();
        async move {
            let pulled = tokio::task::spawn_blocking(move || {
                let chunk = frames.next();
                (chunk, frames)
            })
            .await;
            match pulled {
                Ok((Some(chunk), frames)) => {
                    metrics.stream.chunks_streamed.inc();
                    Some((Ok(chunk), frames))
                }
                Ok((None, frames)) => {
                    info!(chunks = frames.chunks(), "Feed finished");
                    None
                }
                Err(e) => {
                    warn!(operation = "video_feed", "Frame worker failed: {e}");
                    None
                }
            }
        }
    })
}

async fn capture(State(state): State<Arc<AppState>>) -> Response {
    let camera = Arc::clone(&state.camera);
    let encoder = Arc::clone(&state.encoder);
    let store = Arc::clone(&state.store);
    let name = state.capture_name.clone();

    let result: webcam_capture::Result<PathBuf> = blocking(move || {
        camera.open()?;
        let raw = camera.read_frame()?;
        let encoded = encoder.encode(&raw)?;
        store.persist(&name, &encoded)
    })
    .await;

    match result {
        Ok(_) => {
            state.metrics.stream.captures.inc();
            Redirect::to("/").into_response()
        }
        Err(e) => {
            state.metrics.stream.capture_failures.inc();
            error!(operation = "capture", "Failed to capture frame: {e}");
            text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to capture frame: {e}"),
            )
        }
    }
}

async fn start_stream(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session = state.sessions.start(&headers);
    match open_camera(&state).await {
        Ok(()) => {
            info!(session = %session.id, "Streaming started");
            session.attach(Redirect::to("/").into_response())
        }
        Err(e) => {
            // Start failed as a whole: the flag goes back to false.
            session.flag.set(false);
            error!(operation = "start_stream", "Could not start camera: {e}");
            session.attach(text_response(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Could not start camera: {e}"),
            ))
        }
    }
}

async fn stop_stream(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session = state.sessions.lookup(&headers);
    if let Some(session) = &session {
        session.flag.set(false);
    }
    let camera = Arc::clone(&state.camera);
    if let Err(e) = blocking(move || {
        camera.close();
        Ok(())
    })
    .await
    {
        warn!(operation = "stop_stream", "Camera close did not complete: {e}");
    }
    info!(session = ?session.as_ref().map(|s| &s.id), "Streaming stopped");
    Redirect::to("/").into_response()
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    state.metrics.observe(&state.camera);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode_text(),
    )
        .into_response()
}

async fn log_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    info!(
        "{} {} -> {} in {:.1}ms",
        method,
        path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed))
        .route("/capture", post(capture))
        .route("/start_stream", post(start_stream))
        .route("/stop_stream", post(stop_stream))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

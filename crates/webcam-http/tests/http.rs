use anyhow::{Context, Result};
use reqwest::{header, Client, StatusCode};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use webcam_capture::{CameraManager, JpegFrameEncoder, MockDriver};
use webcam_http::{AppState, DirectoryStore};

const PART_HEAD: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const NEXT_PART: &[u8] = b"\r\n--frame\r\n";

struct TestServer {
    base: String,
    driver: MockDriver,
    camera: Arc<CameraManager>,
    state: Arc<AppState>,
    dir: TempDir,
}

impl TestServer {
    async fn start() -> Result<Self> {
        let (srv, _server) = Self::start_until(std::future::pending()).await?;
        Ok(srv)
    }

    /// Serve until `shutdown` resolves; the handle finishes with the server.
    async fn start_until<F>(shutdown: F) -> Result<(Self, JoinHandle<std::io::Result<()>>)>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let driver = MockDriver::new().with_frame_interval(Duration::from_millis(5));
        let camera = Arc::new(CameraManager::new("0", Arc::new(driver.clone())));
        let dir = tempfile::tempdir()?;
        let state = AppState::new(
            Arc::clone(&camera),
            Arc::new(JpegFrameEncoder::default()),
            Arc::new(DirectoryStore::new(dir.path())),
            "captured_frame.jpg",
        )
        .map_err(anyhow::Error::msg)?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base = format!("http://{}", listener.local_addr()?);
        let state = Arc::new(state);
        let server = tokio::spawn(webcam_http::serve(listener, Arc::clone(&state), shutdown));
        let srv = Self {
            base,
            driver,
            camera,
            state,
            dir,
        };
        Ok((srv, server))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn capture_path(&self) -> PathBuf {
        self.dir.path().join("captured_frame.jpg")
    }

    /// A browser-like client; it picks up its session cookie on the first start.
    async fn client(&self) -> Result<Client> {
        let client = Client::builder().cookie_store(true).build()?;
        let resp = client.get(self.url("/")).send().await?;
        assert_eq!(resp.status(), StatusCode::OK);
        Ok(client)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

#[tokio::test]
async fn start_then_feed_streams_jpeg_parts() -> Result<()> {
    let srv = TestServer::start().await?;
    let client = srv.client().await?;

    let resp = client.post(srv.url("/start_stream")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(srv.camera.is_open());

    let mut resp = client.get(srv.url("/video_feed")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let mut body = Vec::new();
    while count(&body, b"--frame\r\n") < 3 {
        let chunk = tokio::time::timeout(Duration::from_secs(5), resp.chunk())
            .await??
            .context("feed ended early")?;
        body.extend_from_slice(&chunk);
    }

    assert!(body.starts_with(PART_HEAD));
    let first = &body[PART_HEAD.len()..];
    let end = find(first, NEXT_PART).context("no second part")?;
    let jpeg = &first[..end];
    assert!(!jpeg.is_empty());
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    assert!(body[PART_HEAD.len() + end + 2..].starts_with(PART_HEAD));

    drop(resp);
    assert!(srv.camera.is_open(), "client disconnect must not close the camera");
    Ok(())
}

#[tokio::test]
async fn stopped_session_gets_plain_text() -> Result<()> {
    let srv = TestServer::start().await?;
    let client = srv.client().await?;

    client.post(srv.url("/start_stream")).send().await?;
    let resp = client.post(srv.url("/stop_stream")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!srv.camera.is_open());

    let resp = client.get(srv.url("/video_feed")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()[header::CONTENT_TYPE].to_str()?.to_string();
    assert!(content_type.starts_with("text/plain"));
    assert_eq!(resp.text().await?, "Streaming is stopped.");
    Ok(())
}

#[tokio::test]
async fn new_session_is_not_streaming() -> Result<()> {
    let srv = TestServer::start().await?;
    let resp = reqwest::get(srv.url("/video_feed")).await?;
    assert_eq!(resp.text().await?, "Streaming is stopped.");
    assert!(!srv.camera.is_open());
    assert_eq!(srv.driver.opens(), 0);
    Ok(())
}

#[tokio::test]
async fn cookieless_reads_create_no_sessions() -> Result<()> {
    let srv = TestServer::start().await?;
    let client = Client::new();
    for _ in 0..20 {
        let resp = client.get(srv.url("/")).send().await?;
        assert!(resp.headers().get(header::SET_COOKIE).is_none());
        let resp = client.get(srv.url("/video_feed")).send().await?;
        assert!(resp.headers().get(header::SET_COOKIE).is_none());
    }
    client.post(srv.url("/stop_stream")).send().await?;
    assert!(srv.state.sessions.is_empty());

    let client = srv.client().await?;
    client.post(srv.url("/start_stream")).send().await?;
    assert_eq!(srv.state.sessions.len(), 1);
    Ok(())
}

#[tokio::test]
async fn stop_without_start_is_harmless() -> Result<()> {
    let srv = TestServer::start().await?;
    let client = srv.client().await?;
    let resp = client.post(srv.url("/stop_stream")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!srv.camera.is_open());
    Ok(())
}

#[tokio::test]
async fn start_failure_surfaces_and_rolls_back_flag() -> Result<()> {
    let srv = TestServer::start().await?;
    let client = srv.client().await?;
    srv.driver.set_fail_open(true);

    let resp = client.post(srv.url("/start_stream")).send().await?;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(resp.text().await?.contains("unavailable"));
    assert!(!srv.camera.is_open());

    let resp = client.get(srv.url("/video_feed")).send().await?;
    assert_eq!(resp.text().await?, "Streaming is stopped.");
    assert!(!srv.camera.is_open());

    srv.driver.set_fail_open(false);
    let resp = client.post(srv.url("/start_stream")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(srv.camera.is_open());
    Ok(())
}

#[tokio::test]
async fn capture_opens_camera_and_writes_file() -> Result<()> {
    let srv = TestServer::start().await?;
    let client = srv.client().await?;
    assert!(!srv.camera.is_open());

    let resp = client.post(srv.url("/capture")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(srv.camera.is_open());
    assert_eq!(srv.driver.opens(), 1);
    assert_eq!(srv.driver.reads(), 1);

    let jpeg = std::fs::read(srv.capture_path())?;
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    Ok(())
}

#[tokio::test]
async fn feed_open_failure_keeps_flag_for_retry() -> Result<()> {
    let srv = TestServer::start().await?;
    let client = srv.client().await?;
    client.post(srv.url("/start_stream")).send().await?;

    // Device dropped out from under a streaming session.
    srv.camera.close();
    srv.driver.set_fail_open(true);
    let resp = client.get(srv.url("/video_feed")).send().await?;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(resp.text().await?.starts_with("Could not start camera"));
    assert!(!srv.camera.is_open());

    srv.driver.set_fail_open(false);
    let mut resp = client.get(srv.url("/video_feed")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let chunk = tokio::time::timeout(Duration::from_secs(5), resp.chunk())
        .await??
        .context("feed ended early")?;
    assert!(chunk.starts_with(b"--frame\r\n"));
    assert!(srv.camera.is_open());
    Ok(())
}

#[tokio::test]
async fn capture_read_failure_writes_nothing() -> Result<()> {
    let srv = TestServer::start().await?;
    let client = srv.client().await?;
    srv.driver.set_fail_reads(true);

    let resp = client.post(srv.url("/capture")).send().await?;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(resp.text().await?.starts_with("Failed to capture frame"));
    assert!(!srv.capture_path().exists());
    Ok(())
}

#[tokio::test]
async fn concurrent_starts_acquire_once() -> Result<()> {
    let srv = TestServer::start().await?;
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let client = srv.client().await?;
        let url = srv.url("/start_stream");
        tasks.push(tokio::spawn(async move { client.post(url).send().await }));
    }
    for task in tasks {
        assert_eq!(task.await??.status(), StatusCode::OK);
    }
    assert_eq!(srv.driver.opens(), 1);
    assert_eq!(srv.camera.acquisitions(), 1);
    Ok(())
}

#[tokio::test]
async fn stop_ends_running_feed() -> Result<()> {
    let srv = TestServer::start().await?;
    let client = srv.client().await?;
    client.post(srv.url("/start_stream")).send().await?;

    let mut feed = client.get(srv.url("/video_feed")).send().await?;
    let first = feed.chunk().await?.context("no first chunk")?;
    assert!(!first.is_empty());

    client.post(srv.url("/stop_stream")).send().await?;

    // Parts already on the wire may still arrive; after that the feed must end.
    tokio::time::timeout(Duration::from_secs(5), async {
        while feed.chunk().await?.is_some() {}
        Ok::<_, reqwest::Error>(())
    })
    .await??;
    assert!(!srv.camera.is_open());
    Ok(())
}

#[tokio::test]
async fn index_reflects_streaming_flag() -> Result<()> {
    let srv = TestServer::start().await?;
    let client = srv.client().await?;

    let page = client.get(srv.url("/")).send().await?.text().await?;
    assert!(!page.contains("/video_feed\""));

    let page = client
        .post(srv.url("/start_stream"))
        .send()
        .await?
        .text()
        .await?;
    assert!(page.contains(r#"src="/video_feed""#));
    Ok(())
}

#[tokio::test]
async fn metrics_report_device_state() -> Result<()> {
    let srv = TestServer::start().await?;
    let client = srv.client().await?;
    client.post(srv.url("/capture")).send().await?;

    let text = reqwest::get(srv.url("/metrics")).await?.text().await?;
    assert!(text.contains("webcam_device_open 1"));
    assert!(text.contains("webcam_device_acquisitions 1"));
    assert!(text.contains("webcam_captures_total 1"));
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_camera_under_open_feed() -> Result<()> {
    let (tx, rx) = oneshot::channel::<()>();
    let (srv, server) = TestServer::start_until(async move {
        let _ = rx.await;
    })
    .await?;
    let client = srv.client().await?;
    client.post(srv.url("/start_stream")).send().await?;

    let mut feed = client.get(srv.url("/video_feed")).send().await?;
    let first = tokio::time::timeout(Duration::from_secs(5), feed.chunk())
        .await??
        .context("no first chunk")?;
    assert!(!first.is_empty());

    // Keep reading so the server is never stuck writing to a full socket.
    let drain = tokio::spawn(async move { while let Ok(Some(_)) = feed.chunk().await {} });

    let _ = tx.send(());
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .context("server did not shut down")???;
    assert!(!srv.camera.is_open());

    tokio::time::timeout(Duration::from_secs(5), drain).await??;
    Ok(())
}

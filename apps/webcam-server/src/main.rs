use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use webcam_capture::{CameraDriver, CameraManager, MockDriver};
use webcam_http::{AppState, DirectoryStore};

mod config;
use config::{Backend, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "webcam-server", version, about = "Live webcam feed and snapshots over HTTP")]
struct Args {
    /// YAML config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP bind address
    #[arg(short = 'b', long)]
    bind_address: Option<String>,

    /// HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Camera backend
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Device spec: index like 0 or a path
    #[arg(long)]
    device: Option<String>,

    /// JPEG quality (1-100)
    #[arg(long)]
    jpeg_quality: Option<u8>,

    /// Directory for captured frames
    #[arg(long)]
    capture_dir: Option<PathBuf>,
}

impl Args {
    fn resolve(&self) -> Result<ServerConfig> {
        let mut cfg = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(v) = &self.bind_address {
            cfg.bind_address = v.clone();
        }
        if let Some(v) = self.port {
            cfg.port = v;
        }
        if let Some(v) = self.backend {
            cfg.backend = v;
        }
        if let Some(v) = &self.device {
            cfg.camera.device = v.clone();
        }
        if let Some(v) = self.jpeg_quality {
            cfg.camera.jpeg_quality = v;
        }
        if let Some(v) = &self.capture_dir {
            cfg.capture_dir = v.clone();
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn camera_driver(backend: Backend) -> Result<Arc<dyn CameraDriver>> {
    match backend {
        Backend::Mock => Ok(Arc::new(MockDriver::new())),
        #[cfg(feature = "opencv")]
        Backend::Opencv => Ok(Arc::new(webcam_capture::OpenCvDriver)),
        #[cfg(not(feature = "opencv"))]
        Backend::Opencv => anyhow::bail!("built without the `opencv` feature"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();

    let args = Args::parse();
    let cfg = args.resolve()?;

    let driver = camera_driver(cfg.backend)?;
    info!(
        "Camera backend: {} (device {})",
        driver.name(),
        cfg.camera.device
    );
    let camera = Arc::new(CameraManager::new(cfg.camera.device.clone(), driver));
    // Whatever happens below, the device is released when main returns.
    let _release = camera.release_guard();

    let encoder = cfg.camera.encoder().context("JPEG encoder")?;
    let state = AppState::new(
        Arc::clone(&camera),
        Arc::new(encoder),
        Arc::new(DirectoryStore::new(&cfg.capture_dir)),
        cfg.capture_name.clone(),
    )
    .map_err(|e| anyhow::anyhow!("Failed to create app state: {e}"))?;

    let addr: SocketAddr = format!("{}:{}", cfg.bind_address, cfg.port)
        .parse()
        .context("Invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!("Starting server on http://{}", addr);
    info!("Live feed: http://{}/video_feed", addr);
    info!(
        "Captures go to {}",
        cfg.capture_dir.join(&cfg.capture_name).display()
    );

    webcam_http::serve(listener, Arc::new(state), shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

fn setup_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

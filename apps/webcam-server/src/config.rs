use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use webcam_capture::CameraConfig;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Mock,
    Opencv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub backend: Backend,
    pub camera: CameraConfig,
    /// Directory that receives captured frames.
    pub capture_dir: PathBuf,
    pub capture_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8000,
            backend: Backend::Mock,
            camera: CameraConfig::default(),
            capture_dir: PathBuf::from("."),
            capture_name: "captured_frame.jpg".to_string(),
        }
    }
}

impl ServerConfig {
    /// Read a YAML config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: ServerConfig =
            serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.camera.validate().context("camera settings")?;
        webcam_http::validate_name(&self.capture_name).context("capture_name")?;
        Ok(())
    }
}

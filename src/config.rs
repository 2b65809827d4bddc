//! Agent configuration.
//!
//! Loaded from a JSON file in the platform config directory (or a path
//! given on the command line). Every field has a default so a missing
//! file yields a working configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the calibration backend.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Camera index to capture from (0 for default).
    #[serde(default)]
    pub camera_index: u32,

    /// Requested capture width.
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,

    /// Requested capture height.
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,

    /// Capture tick interval in milliseconds.
    #[serde(default = "default_capture_interval_ms")]
    pub capture_interval_ms: u64,

    /// Background color the backend reports once alignment is satisfied.
    #[serde(default = "default_sentinel_color")]
    pub sentinel_color: String,

    /// Delay before re-acquiring the camera after a recalibration request,
    /// giving the backend time to reset.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    /// Delay between measurement completion and the reading submission step.
    #[serde(default = "default_advance_delay_ms")]
    pub advance_delay_ms: u64,

    /// Radius of the alignment marker circles, in pixels.
    #[serde(default = "default_marker_radius")]
    pub marker_radius: u32,

    /// JPEG encoding quality (1-100).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_frame_width() -> u32 {
    640
}

fn default_frame_height() -> u32 {
    480
}

fn default_capture_interval_ms() -> u64 {
    100
}

fn default_sentinel_color() -> String {
    "#00ff00".to_string()
}

fn default_restart_delay_ms() -> u64 {
    2000
}

fn default_advance_delay_ms() -> u64 {
    2000
}

fn default_marker_radius() -> u32 {
    20
}

fn default_jpeg_quality() -> u8 {
    90
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            camera_index: 0,
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            capture_interval_ms: default_capture_interval_ms(),
            sentinel_color: default_sentinel_color(),
            restart_delay_ms: default_restart_delay_ms(),
            advance_delay_ms: default_advance_delay_ms(),
            marker_radius: default_marker_radius(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl AgentConfig {
    /// Clamp the tick interval to a sane range (10 ms - 10 s).
    pub fn clamp_interval(&mut self) {
        self.capture_interval_ms = self.capture_interval_ms.clamp(10, 10_000);
    }

    /// Capture tick interval.
    pub fn capture_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.capture_interval_ms)
    }

    /// Camera re-acquisition delay used by recalibration.
    pub fn restart_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.restart_delay_ms)
    }

    /// Delay before advancing to reading submission.
    pub fn advance_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.advance_delay_ms)
    }

    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("posture-calibrator");
            p.push("config.json");
            p
        })
    }

    /// Load configuration.
    ///
    /// An explicit path must exist; the default location falls back to
    /// `AgentConfig::default()` when absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if required {
                return Err(ConfigError::NotFound(path));
            }
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path).map_err(ConfigError::Io)?;
        let mut config: Self = serde_json::from_str(&contents).map_err(ConfigError::Parse)?;
        config.clamp_interval();
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Parse)?;
        fs::write(path, contents).map_err(ConfigError::Io)?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read config: {0}")]
    Io(#[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.capture_interval_ms, 100);
        assert_eq!(config.sentinel_color, "#00ff00");
        assert_eq!(config.frame_width, 640);
        assert_eq!(config.frame_height, 480);
        assert_eq!(config.marker_radius, 20);
    }

    #[test]
    fn interval_clamping() {
        let mut config = AgentConfig::default();
        config.capture_interval_ms = 1;
        config.clamp_interval();
        assert_eq!(config.capture_interval_ms, 10);

        config.capture_interval_ms = 60_000;
        config.clamp_interval();
        assert_eq!(config.capture_interval_ms, 10_000);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let config: AgentConfig =
            serde_json::from_str(r#"{"backend_url": "http://example.test"}"#).unwrap();
        assert_eq!(config.backend_url, "http://example.test");
        assert_eq!(config.capture_interval_ms, 100);
        assert_eq!(config.sentinel_color, "#00ff00");
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let result = AgentConfig::load(Some(Path::new("/nonexistent/config.json")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AgentConfig::default();
        config.backend_url = "http://backend.test:5000".to_string();
        config.save(&path).unwrap();

        let loaded = AgentConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.backend_url, "http://backend.test:5000");
    }
}

//! # Configuration Management
//!
//! Loads the relay server's settings from several sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with `APP_` prefix, `__` between nested keys)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` environment variables (deployment platforms)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_BROADCAST__TICK_INTERVAL_MS`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub media: MediaConfig,
    pub webrtc: WebRtcConfig,
    pub broadcast: BroadcastConfig,
    pub assets: AssetsConfig,
}

/// Where the HTTP server listens.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost
/// - `host = "0.0.0.0"`: Accept connections from any interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// The local audio asset attached to every negotiated session.
///
/// `primary_file` is tried first, then `fallback_file`, both relative to
/// `asset_dir`. When neither exists sessions are answered without audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub asset_dir: String,
    pub primary_file: String,
    pub fallback_file: String,
    /// Length of each encoded audio frame written to a track.
    pub frame_duration_ms: u64,
}

/// Peer connection settings handed to the WebRTC stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRtcConfig {
    /// STUN/TURN URLs, e.g. `stun:stun.l.google.com:19302`
    pub ice_servers: Vec<String>,
}

/// Timing of the timestamp fan-out loop behind `/ws`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    pub tick_interval_ms: u64,
    /// Pause after a failed tick before normal ticking resumes
    pub error_backoff_ms: u64,
}

/// Page and static files served next to the signaling API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    pub index_page: String,
    pub static_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            media: MediaConfig {
                asset_dir: ".".to_string(),
                primary_file: "audio.wav".to_string(),
                fallback_file: "audio.mp3".to_string(),
                frame_duration_ms: 20,
            },
            webrtc: WebRtcConfig {
                ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            },
            broadcast: BroadcastConfig {
                tick_interval_ms: 100,
                error_backoff_ms: 1000,
            },
            assets: AssetsConfig {
                index_page: "static/index.html".to_string(),
                static_dir: "static".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=127.0.0.1`: Override server host
    /// - `APP_MEDIA__ASSET_DIR=/srv/audio`: Look for the audio asset elsewhere
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.media.primary_file.trim().is_empty() {
            return Err(anyhow::anyhow!("Media primary file name cannot be empty"));
        }

        if self.media.frame_duration_ms == 0 || self.media.frame_duration_ms > 1000 {
            return Err(anyhow::anyhow!(
                "Media frame duration must be between 1 and 1000 ms, got {}",
                self.media.frame_duration_ms
            ));
        }

        if self.broadcast.tick_interval_ms == 0 {
            return Err(anyhow::anyhow!("Broadcast tick interval must be greater than 0"));
        }

        if self.broadcast.error_backoff_ms == 0 {
            return Err(anyhow::anyhow!("Broadcast error backoff must be greater than 0"));
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl MediaConfig {
    /// Candidate asset paths in lookup order. An empty fallback is skipped.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let dir = PathBuf::from(&self.asset_dir);
        [&self.primary_file, &self.fallback_file]
            .into_iter()
            .filter(|name| !name.trim().is_empty())
            .map(|name| dir.join(name))
            .collect()
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms)
    }
}

impl BroadcastConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

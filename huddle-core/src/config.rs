use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub media: MediaConfig,
    pub rooms: RoomsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path the signaling WebSocket is served on
    pub ws_path: String,
    /// Largest inbound signaling frame accepted (bytes)
    pub max_message_size: usize,
    /// Per-peer buffer for outbound replies and notifications
    pub outbound_queue: usize,
    /// CORS origins; `*` allows any
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            ws_path: "/mediasoup".to_string(),
            max_message_size: 64 * 1024,
            outbound_queue: 256,
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// A codec the media router offers to peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// "audio" or "video"
    pub kind: String,
    pub mime_type: String,
    pub clock_rate: u32,
    #[serde(default)]
    pub channels: Option<u8>,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// Media engine configuration (router codecs and transport listening)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub codecs: Vec<CodecConfig>,
    /// Local address transports bind to
    pub listen_ip: String,
    /// Address advertised to peers in ICE candidates
    pub announced_ip: String,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub prefer_udp: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            codecs: vec![
                CodecConfig {
                    kind: "audio".to_string(),
                    mime_type: "audio/opus".to_string(),
                    clock_rate: 48000,
                    channels: Some(2),
                    parameters: BTreeMap::new(),
                },
                CodecConfig {
                    kind: "video".to_string(),
                    mime_type: "video/VP8".to_string(),
                    clock_rate: 90000,
                    channels: None,
                    parameters: BTreeMap::new(),
                },
            ],
            listen_ip: "0.0.0.0".to_string(),
            announced_ip: "127.0.0.1".to_string(),
            rtc_min_port: 40000,
            rtc_max_port: 49999,
            enable_udp: true,
            enable_tcp: true,
            prefer_udp: true,
        }
    }
}

/// Room naming and reservation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    /// Length of names handed out by `generateRandomRoomName`
    pub generated_name_length: usize,
    /// How long a generated name stays reserved without anyone joining it
    pub reservation_ttl_secs: u64,
    /// Interval of the background reservation sweep
    pub sweep_interval_secs: u64,
    pub max_room_name_length: usize,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            generated_name_length: 8,
            reservation_ttl_secs: 600,
            sweep_interval_secs: 60,
            max_room_name_length: 64,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // HUDDLE_SERVER__PORT=4000, HUDDLE_MEDIA__ANNOUNCED_IP=203.0.113.7, ...
        builder = builder.add_source(
            Environment::with_prefix("HUDDLE")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.allowed_origins")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(path))
    }

    /// Check the configuration, collecting every problem found
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
        if !self.server.ws_path.starts_with('/') {
            errors.push(format!(
                "server.ws_path must start with '/': {}",
                self.server.ws_path
            ));
        }
        if self.server.outbound_queue == 0 {
            errors.push("server.outbound_queue must be at least 1".to_string());
        }

        if self.media.codecs.is_empty() {
            errors.push("media.codecs must list at least one codec".to_string());
        }
        for codec in &self.media.codecs {
            let prefix = format!("{}/", codec.kind);
            if codec.kind != "audio" && codec.kind != "video" {
                errors.push(format!("media codec kind must be audio or video: {}", codec.kind));
            } else if !codec.mime_type.to_lowercase().starts_with(&prefix) {
                errors.push(format!(
                    "media codec {} does not match its kind {}",
                    codec.mime_type, codec.kind
                ));
            }
            if codec.clock_rate == 0 {
                errors.push(format!("media codec {} has zero clock rate", codec.mime_type));
            }
        }
        if self.media.rtc_min_port == 0 || self.media.rtc_min_port > self.media.rtc_max_port {
            errors.push(format!(
                "media port range is invalid: {}-{}",
                self.media.rtc_min_port, self.media.rtc_max_port
            ));
        }
        if !self.media.enable_udp && !self.media.enable_tcp {
            errors.push("media transports need UDP or TCP enabled".to_string());
        }
        if self.media.announced_ip.is_empty() {
            errors.push("media.announced_ip must be set".to_string());
        }

        if self.rooms.generated_name_length == 0 {
            errors.push("rooms.generated_name_length must be at least 1".to_string());
        }
        if self.rooms.generated_name_length > self.rooms.max_room_name_length {
            errors.push("rooms.generated_name_length exceeds rooms.max_room_name_length".to_string());
        }
        if self.rooms.sweep_interval_secs == 0 {
            errors.push("rooms.sweep_interval_secs must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

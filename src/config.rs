use anyhow::Context;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub art: ArtConfig,
    pub audio: AudioConfig,
    pub http: HttpConfig,
}

impl Config {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatasetConfig {
    pub path: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("src/settings/music.json"),
        }
    }
}

/// Settings for the artwork lookup
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ArtConfig {
    /// Artist name every search is restricted to
    pub artist: String,
    pub search_url: String,
    pub timeout_secs: u64,
    /// Pause between two lookups
    pub delay_ms: u64,
}

impl ArtConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for ArtConfig {
    fn default() -> Self {
        Self {
            artist: "Sam Bowman".to_string(),
            search_url: "https://api.deezer.com/search".to_string(),
            timeout_secs: 10,
            delay_ms: 500,
        }
    }
}

/// Settings for clip downloads
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AudioConfig {
    pub output_dir: PathBuf,
    /// Extraction tool binary
    pub extractor: String,
    /// Transcoder the extraction tool relies on
    pub transcoder: String,
    pub bitrate_kbps: u32,
    /// Clips are cut to this many seconds
    pub clip_secs: u32,
    pub socket_timeout_secs: u32,
    pub user_agent: String,
    pub referer: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("public/audio"),
            extractor: "yt-dlp".to_string(),
            transcoder: "ffmpeg".to_string(),
            bitrate_kbps: 128,
            clip_secs: 32,
            socket_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            referer: "https://www.youtube.com/".to_string(),
        }
    }
}

/// Settings for serving the clips over HTTP
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Origins that get a CORS allow header
    pub allowed_origins: Vec<String>,
    /// Requests per minute for each client address, 0 turns the limit off
    pub rate_limit_per_minute: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 3000,
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
            rate_limit_per_minute: 20,
        }
    }
}

//! Cover art lookup against the Deezer search API

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::config::ArtConfig;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("request failed with status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    Decode(#[from] std::io::Error),
}

impl From<ureq::Error> for LookupError {
    fn from(error: ureq::Error) -> Self {
        match error {
            ureq::Error::Status(code, _) => LookupError::Status(code),
            ureq::Error::Transport(transport) => LookupError::Transport(transport.to_string()),
        }
    }
}

/// Finds a cover image URL for a track title
pub trait CoverLookup {
    /// `Ok(None)` means the search succeeded but found nothing usable
    fn cover_for(&self, title: &str) -> Result<Option<String>, LookupError>;
}

pub struct DeezerSearch {
    http_client: ureq::Agent,
    search_url: String,
    artist: String,
}

impl DeezerSearch {
    pub fn new(config: &ArtConfig) -> Self {
        Self::with_timeout(config, config.timeout())
    }

    fn with_timeout(config: &ArtConfig, timeout: Duration) -> Self {
        let http_client = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            http_client,
            search_url: config.search_url.trim_end_matches('/').to_string(),
            artist: config.artist.clone(),
        }
    }

    pub fn request_url(&self, title: &str) -> String {
        format!(
            "{}?q={}",
            self.search_url,
            urlencoding::encode(&search_query(&self.artist, title))
        )
    }
}

impl CoverLookup for DeezerSearch {
    fn cover_for(&self, title: &str) -> Result<Option<String>, LookupError> {
        let url = self.request_url(title);
        log::debug!("GET {url}");

        let body: Value = self
            .http_client
            .get(&url)
            .set("Accept", "application/json")
            .call()?
            .into_json()?;

        Ok(first_cover(&body))
    }
}

/// Structured query matching both the artist and the track title
pub fn search_query(artist: &str, title: &str) -> String {
    format!(r#"artist:"{artist}" track:"{title}""#)
}

/// Medium sized cover of the first search hit
pub fn first_cover(body: &Value) -> Option<String> {
    body["data"]
        .as_array()?
        .first()?
        .get("album")?
        .get("cover_medium")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

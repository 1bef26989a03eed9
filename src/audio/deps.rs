use std::path::PathBuf;

use thiserror::Error;

use crate::config::AudioConfig;

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("{0} is not installed or not in PATH")]
    MissingExtractor(String),
}

impl DependencyError {
    pub fn install_hint(&self) -> &'static [&'static str] {
        match self {
            DependencyError::MissingExtractor(_) => &[
                "Install it with:",
                "  pip install yt-dlp",
                "or download a release from https://github.com/yt-dlp/yt-dlp/releases",
            ],
        }
    }
}

/// Resolved locations of the external tools
#[derive(Debug)]
pub struct Dependencies {
    pub extractor: PathBuf,
    /// Conversion can still work without it on some sources, so it is only a warning
    pub transcoder: Option<PathBuf>,
}

/// Locates the extraction tool, which is required, and the transcoder, which is not
pub fn check(config: &AudioConfig) -> Result<Dependencies, DependencyError> {
    let extractor = which::which(&config.extractor)
        .map_err(|_| DependencyError::MissingExtractor(config.extractor.clone()))?;
    let transcoder = which::which(&config.transcoder).ok();

    Ok(Dependencies {
        extractor,
        transcoder,
    })
}

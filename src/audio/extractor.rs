//! Running the external extraction tool for one clip

use std::{
    io::ErrorKind,
    path::PathBuf,
    process::{Command, Output},
};

use thiserror::Error;

use crate::{config::AudioConfig, storage::fs::AudioDir};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0} not found or not in PATH")]
    MissingExtractor(String),

    #[error("ffmpeg/ffprobe not found or not in PATH")]
    MissingTranscoder,

    #[error("download completed but file not found")]
    NoOutput,

    #[error("download error: {0}")]
    Failed(String),
}

impl FetchError {
    /// Sorts a failure message from the tool into a transcoder problem or a generic failure
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("ffmpeg") || lowered.contains("ffprobe") {
            FetchError::MissingTranscoder
        } else {
            FetchError::Failed(message.trim().to_string())
        }
    }

    /// Lines telling the user how to fix the failure, if there is a known fix
    pub fn remediation(&self) -> &'static [&'static str] {
        match self {
            FetchError::MissingTranscoder => &[
                "QUICK FIX:",
                "   Windows: Download from https://ffmpeg.org/download.html#build-windows",
                "   macOS:   brew install ffmpeg",
                "   Linux:   sudo apt-get install ffmpeg",
                "Then run this command again",
            ],
            FetchError::MissingExtractor(_) => &[
                "QUICK FIX:",
                "   pip install yt-dlp",
                "Then run this command again",
            ],
            FetchError::NoOutput | FetchError::Failed(_) => &[],
        }
    }
}

/// Produces the audio clip for one track
pub trait AudioFetcher {
    fn fetch(&self, url: &str, id: &str, dir: &AudioDir) -> Result<(), FetchError>;
}

/// yt-dlp command line wrapper
pub struct YtDlp {
    binary: PathBuf,
    config: AudioConfig,
}

impl YtDlp {
    pub fn new(binary: PathBuf, config: AudioConfig) -> Self {
        Self { binary, config }
    }

    /// Arguments selecting the best audio stream, converting it to a fixed bitrate mp3
    /// and cutting it down to the clip length
    pub fn args(&self, url: &str, output_template: &str) -> Vec<String> {
        let c = &self.config;
        vec![
            "--format".to_string(),
            "bestaudio/best".to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            format!("{}K", c.bitrate_kbps),
            "--output".to_string(),
            output_template.to_string(),
            "--no-playlist".to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            c.socket_timeout_secs.to_string(),
            "--add-headers".to_string(),
            format!("User-Agent:{}", c.user_agent),
            "--add-headers".to_string(),
            format!("Referer:{}", c.referer),
            "--no-check-certificates".to_string(),
            "--postprocessor-args".to_string(),
            format!("ExtractAudio:-t {}", c.clip_secs),
            "--".to_string(),
            url.to_string(),
        ]
    }

    fn run(&self, args: &[String]) -> Result<Output, FetchError> {
        Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    FetchError::MissingExtractor(self.binary.to_string_lossy().into_owned())
                }
                _ => FetchError::Failed(format!("failed to run {}: {e}", self.binary.display())),
            })
    }
}

impl AudioFetcher for YtDlp {
    fn fetch(&self, url: &str, id: &str, dir: &AudioDir) -> Result<(), FetchError> {
        let template = dir.clip_template(id);
        let args = self.args(url, &template.to_string_lossy());
        log::debug!("{} {}", self.binary.display(), args.join(" "));

        let output = self.run(&args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::classify(&error_line(&stderr, output.status)));
        }

        if dir.has_clip(id) {
            Ok(())
        } else {
            Err(FetchError::NoOutput)
        }
    }
}

/// Picks the most telling line of the tool's error output
fn error_line(stderr: &str, status: std::process::ExitStatus) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
        .unwrap_or_else(|| format!("extraction tool exited with {status}"))
}

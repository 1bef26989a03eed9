//! Downloading one trimmed clip per track record

use crate::{
    domain::track::{DownloadEntry, MissingField, TrackRecord},
    storage::fs::AudioDir,
};

pub mod deps;
pub mod extractor;

use extractor::{AudioFetcher, FetchError};

const URL_PREVIEW_CHARS: usize = 50;
const ERROR_PREVIEW_CHARS: usize = 80;

/// A record excluded from downloading
#[derive(Debug, PartialEq, Eq)]
pub struct Rejected {
    pub position: usize,
    pub title: String,
    pub missing: MissingField,
}

#[derive(Debug, Default)]
pub struct Validation {
    pub entries: Vec<DownloadEntry>,
    pub rejected: Vec<Rejected>,
}

/// Splits records into downloadable entries and rejected ones, keeping file order
pub fn validate(records: &[TrackRecord]) -> Validation {
    let mut validation = Validation::default();

    for (i, record) in records.iter().enumerate() {
        let position = i + 1;
        match DownloadEntry::try_from((position, record)) {
            Ok(entry) => validation.entries.push(entry),
            Err(missing) => {
                log::warn!(
                    "Song {} ('{}') has no '{}' field - skipping",
                    position,
                    record.display_title(),
                    missing.name()
                );
                validation.rejected.push(Rejected {
                    position,
                    title: record.display_title().to_string(),
                    missing,
                });
            }
        }
    }

    validation
}

/// Final state of one entry
#[derive(Debug)]
pub enum Outcome {
    Downloaded { bytes: u64 },
    Skipped,
    Failed(FetchError),
}

/// Skips the entry if its clip exists, otherwise asks the fetcher for it
pub fn acquire_one(entry: &DownloadEntry, dir: &AudioDir, fetcher: &impl AudioFetcher) -> Outcome {
    if dir.has_clip(&entry.id) {
        return Outcome::Skipped;
    }

    match fetcher.fetch(&entry.url, &entry.id, dir) {
        Ok(()) => match dir.clip_size(&entry.id) {
            Some(bytes) => Outcome::Downloaded { bytes },
            None => Outcome::Failed(FetchError::NoOutput),
        },
        Err(e) => Outcome::Failed(e),
    }
}

#[derive(Debug, Default)]
pub struct AcquireReport {
    pub downloaded: usize,
    pub skipped: usize,
    /// identifiers that failed, with the reason
    pub failures: Vec<(String, FetchError)>,
    /// number of valid entries
    pub expected: usize,
}

impl AcquireReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// entries whose clip is on disk after the run
    pub fn present(&self) -> usize {
        self.downloaded + self.skipped
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::from_counts(self.failed(), self.present(), self.expected)
    }
}

/// Whether every valid record has its clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ready,
    NotReady,
    /// nothing failed, yet some clips are missing
    Unexpected,
}

impl Verdict {
    pub fn from_counts(failed: usize, present: usize, expected: usize) -> Self {
        if failed > 0 {
            Verdict::NotReady
        } else if present == expected && expected > 0 {
            Verdict::Ready
        } else {
            Verdict::Unexpected
        }
    }
}

/// Processes every entry in order. A failure is recorded and the batch goes on.
pub fn acquire(
    entries: &[DownloadEntry],
    dir: &AudioDir,
    fetcher: &impl AudioFetcher,
) -> AcquireReport {
    let total = entries.len();
    let mut report = AcquireReport {
        expected: total,
        ..AcquireReport::default()
    };

    for (i, entry) in entries.iter().enumerate() {
        log::info!("[{}/{}] {}", i + 1, total, entry.title);
        log::info!("    ID: {}", entry.id);
        log::info!("    URL: {}...", preview(&entry.url, URL_PREVIEW_CHARS));

        match acquire_one(entry, dir, fetcher) {
            Outcome::Skipped => {
                log::info!("    Already exists, skipping");
                report.skipped += 1;
            }
            Outcome::Downloaded { bytes } => {
                log::info!("    Downloaded ({:.1} MB)", bytes as f64 / (1024.0 * 1024.0));
                report.downloaded += 1;
            }
            Outcome::Failed(e) => {
                match &e {
                    FetchError::Failed(msg) => {
                        log::error!("    Download error: {}", preview(msg, ERROR_PREVIEW_CHARS))
                    }
                    other => log::error!("    {other}"),
                }
                for line in e.remediation() {
                    log::warn!("      {line}");
                }
                report.failures.push((entry.id.clone(), e));
            }
        }
    }

    report
}

/// At most `max` characters of `s`
pub fn preview(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

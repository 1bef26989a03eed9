//! Module for the directory holding downloaded audio clips

use walkdir::WalkDir;

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

/// Extension of every clip the acquisition run produces
pub const AUDIO_EXTENSION: &str = "mp3";

const MUSIC_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "ogg", "aac", "opus", "webm"];

pub fn is_music_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MUSIC_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Output directory where each track's clip lives as `<id>.mp3`
#[derive(Debug, Clone)]
pub struct AudioDir {
    root: PathBuf,
}

impl AudioDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the directory and its parents if needed
    pub fn ensure(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path as displayed to the user, absolute when it can be resolved
    pub fn display_path(&self) -> PathBuf {
        std::path::absolute(&self.root).unwrap_or_else(|_| self.root.clone())
    }

    pub fn clip_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.{AUDIO_EXTENSION}"))
    }

    /// Output template handed to the extraction tool, which fills in the extension itself.
    ///
    /// `%` starts a template field, so a literal one in the id is doubled.
    pub fn clip_template(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.%(ext)s", id.replace('%', "%%")))
    }

    pub fn has_clip(&self, id: &str) -> bool {
        self.clip_path(id).is_file()
    }

    /// Size of the clip in bytes, if it exists
    pub fn clip_size(&self, id: &str) -> Option<u64> {
        fs::metadata(self.clip_path(id)).ok().map(|m| m.len())
    }

    /// Lists audio files directly under the directory whose stem is not in `known_ids`.
    ///
    /// A directory that does not exist yet has no unreferenced files.
    pub fn unreferenced(&self, known_ids: &HashSet<&str>) -> Vec<PathBuf> {
        if !self.root.is_dir() {
            return Vec::new();
        }
        let root_str = self.root.to_string_lossy();

        let mut paths = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| match e {
                Ok(e) => Some(e),
                Err(err) => {
                    log::warn!("error while scanning dir {root_str}, skipping an entry: {err}");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_music_file(p))
            .filter(|p| {
                p.file_stem()
                    .and_then(|s| s.to_str())
                    .map(|stem| !known_ids.contains(stem))
                    .unwrap_or(true)
            })
            .collect::<Vec<_>>();
        paths.sort();
        paths
    }
}

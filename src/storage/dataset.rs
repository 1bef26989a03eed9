//! Loading and atomically rewriting the music dataset file

use std::{
    fs,
    io::{BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::{domain::track::TrackRecord, storage::error::DatasetError};

/// The ordered list of track records together with the file it came from
#[derive(Debug)]
pub struct Dataset {
    path: PathBuf,
    pub records: Vec<TrackRecord>,
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let contents = fs::read_to_string(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => DatasetError::NotFound(path.to_path_buf()),
            _ => DatasetError::Read {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let records: Vec<TrackRecord> =
            serde_json::from_str(&contents).map_err(|source| DatasetError::InvalidJson {
                path: path.to_path_buf(),
                source,
            })?;

        log::debug!("loaded {} records from {}", records.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes the records back as indented JSON.
    ///
    /// The content goes to a temporary file next to the dataset which then replaces it,
    /// so an interrupted save never leaves a truncated file behind.
    pub fn save(&self) -> Result<(), DatasetError> {
        let write_err = |source: std::io::Error| DatasetError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, &self.records)
                .map_err(|e| write_err(e.into()))?;
            writer.flush().map_err(write_err)?;
        }
        // the temp file is created owner-only, keep whatever mode the dataset had
        if let Ok(meta) = fs::metadata(&self.path) {
            tmp.as_file()
                .set_permissions(meta.permissions())
                .map_err(write_err)?;
        }
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        log::debug!("wrote {} records to {}", self.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::Dataset;
    use crate::storage::error::DatasetError;

    const SAMPLE: &str = r#"[
  {
    "title": "Ashes",
    "id": "ashes",
    "url": "https://youtu.be/a",
    "year": 2021,
    "art": "https://old/cover.jpg"
  },
  {
    "title": "Café",
    "url": "https://youtu.be/b"
  }
]"#;

    #[test]
    fn load_then_save_is_byte_identical() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("music.json");
        fs::write(&path, SAMPLE)?;

        let dataset = Dataset::load(&path)?;
        assert_eq!(dataset.len(), 2);
        dataset.save()?;

        assert_eq!(fs::read_to_string(&path)?, SAMPLE);
        Ok(())
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = Dataset::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, DatasetError::NotFound(_)));
    }

    #[test]
    fn malformed_json_is_rejected() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("music.json");
        fs::write(&path, "[{\"id\": ")?;

        let err = Dataset::load(&path).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidJson { .. }));
        Ok(())
    }

    #[test]
    fn top_level_must_be_array_of_objects() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("music.json");

        fs::write(&path, r#"{"id": "song-1"}"#)?;
        assert!(matches!(
            Dataset::load(&path).unwrap_err(),
            DatasetError::InvalidJson { .. }
        ));

        fs::write(&path, r#"["song-1"]"#)?;
        assert!(matches!(
            Dataset::load(&path).unwrap_err(),
            DatasetError::InvalidJson { .. }
        ));
        Ok(())
    }

    #[test]
    fn save_replaces_previous_content() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("music.json");
        fs::write(&path, SAMPLE)?;

        let mut dataset = Dataset::load(&path)?;
        dataset.records[1].set_art("https://new/cover.jpg");
        dataset.save()?;

        let reloaded = Dataset::load(&path)?;
        assert_eq!(reloaded.records[1].art(), Some("https://new/cover.jpg"));
        assert_eq!(reloaded.records[0].art(), Some("https://old/cover.jpg"));

        // only the dataset itself is left in the directory
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn save_keeps_file_mode() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let path = dir.path().join("music.json");
        fs::write(&path, SAMPLE)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;

        Dataset::load(&path)?.save()?;

        let mode = fs::metadata(&path)?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
        Ok(())
    }

    #[test]
    fn empty_array_is_an_empty_dataset() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("music.json");
        fs::write(&path, "[]")?;

        let dataset = Dataset::load(&path)?;
        assert!(dataset.is_empty());
        assert_eq!(dataset.len(), 0);
        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ID: &str = "id";
pub const TITLE: &str = "title";
pub const URL: &str = "url";
pub const ART: &str = "art";

/// One entry of the music dataset.
///
/// Kept as the raw JSON object so that fields this tool does not know about,
/// and the order of keys, survive a rewrite untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackRecord(Map<String, Value>);

impl TrackRecord {
    /// Identifier used as the audio file stem
    pub fn id(&self) -> Option<&str> {
        self.non_empty(ID)
    }

    pub fn title(&self) -> Option<&str> {
        self.non_empty(TITLE)
    }

    pub fn url(&self) -> Option<&str> {
        self.non_empty(URL)
    }

    pub fn art(&self) -> Option<&str> {
        self.non_empty(ART)
    }

    /// Title for console output, `Unknown` when absent
    pub fn display_title(&self) -> &str {
        self.title().unwrap_or("Unknown")
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID.to_string(), Value::String(id.into()));
    }

    pub fn set_art(&mut self, art: impl Into<String>) {
        self.0.insert(ART.to_string(), Value::String(art.into()));
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
impl TrackRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn fields(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

/// A record that passed validation for audio acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEntry {
    /// 1-based position in the dataset
    pub position: usize,
    pub id: String,
    pub url: String,
    pub title: String,
}

/// Why a record cannot be downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    Id,
    Url,
}

impl MissingField {
    pub fn name(&self) -> &'static str {
        match self {
            MissingField::Id => ID,
            MissingField::Url => URL,
        }
    }
}

impl TryFrom<(usize, &TrackRecord)> for DownloadEntry {
    type Error = MissingField;

    fn try_from((position, record): (usize, &TrackRecord)) -> Result<Self, Self::Error> {
        let id = record.id().ok_or(MissingField::Id)?;
        let url = record.url().ok_or(MissingField::Url)?;
        Ok(Self {
            position,
            id: id.to_string(),
            url: url.to_string(),
            title: record.display_title().to_string(),
        })
    }
}

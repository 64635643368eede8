use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 12;
pub const MAX_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    Pdf,
    Image,
    Doc,
    Other,
}

impl NoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteType::Pdf => "pdf",
            NoteType::Image => "image",
            NoteType::Doc => "doc",
            NoteType::Other => "other",
        }
    }

    /// Classifies an uploaded file by its MIME type.
    pub fn from_mime(mime: &str) -> Self {
        if mime == "application/pdf" {
            NoteType::Pdf
        } else if mime.starts_with("image/") {
            NoteType::Image
        } else if mime.contains("word") || mime.contains("document") {
            NoteType::Doc
        } else {
            NoteType::Other
        }
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(NoteType::Pdf),
            "image" => Ok(NoteType::Image),
            "doc" => Ok(NoteType::Doc),
            "other" => Ok(NoteType::Other),
            other => Err(format!("unknown note type: {other}")),
        }
    }
}

/// Read-only projection of a note as seen by the rankers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub course: String,
    #[serde(rename = "type")]
    pub note_type: NoteType,
    pub downloads: u64,
    pub avg_rating: Option<f64>,
    #[serde(default)]
    pub views: u64,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "uploaderRef")]
    pub uploader: Option<String>,
}

impl CandidateRecord {
    /// Unrated notes count as zero wherever a rating feeds a score or a sort.
    pub fn rating_or_zero(&self) -> f64 {
        self.avg_rating.filter(|rating| rating.is_finite()).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: CandidateRecord,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteFilters {
    pub course: Option<String>,
    pub note_type: Option<NoteType>,
}

/// Lowercases the way Postgres `ILIKE` does per character: `İ` folds to a
/// plain `i`, not `i` followed by a combining dot.
pub fn fold_case(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|ch| *ch != '\u{307}')
        .collect()
}

impl NoteFilters {
    /// The course is kept as typed (trimmed); stores compare it case-insensitively.
    pub fn new(course: Option<&str>, note_type: Option<NoteType>) -> Self {
        let course = course
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Self { course, note_type }
    }

    pub fn matches(&self, record: &CandidateRecord) -> bool {
        if let Some(course) = &self.course {
            if !fold_case(&record.course).contains(&fold_case(course)) {
                return false;
            }
        }
        match self.note_type {
            Some(note_type) => record.note_type == note_type,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortMode {
    #[default]
    Newest,
    Oldest,
    Downloads,
    Rating,
}

/// A clamped page request. Out-of-range values are pulled into bounds, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

impl PageRequest {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset())
            .take(self.page_size)
            .cloned()
            .collect()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub items: Vec<ScoredRecord>,
    pub total: usize,
    /// Set when `total` only counts the bounded candidate window.
    pub approximate_total: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopularPage {
    pub items: Vec<ScoredRecord>,
    pub total: usize,
    pub computed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularitySnapshot {
    #[serde(default)]
    pub version: u32,
    pub computed_at: DateTime<Utc>,
    pub items: Vec<ScoredRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteContribution {
    pub downloads: u64,
    pub avg_rating: Option<f64>,
    pub rating_sum: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContributorRecord {
    pub uploader_id: i64,
    pub name: String,
    pub notes: Vec<NoteContribution>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub uploader_id: i64,
    pub name: String,
    pub points: i64,
    pub notes_count: usize,
    pub total_downloads: u64,
    pub avg_rating: f64,
}

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One `<db>` record of a per-area listing query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingStub {
    pub area: u16,
    pub external_id: String,
    pub name: String,
    pub display_poster: String,
}

/// Fields of a detail response, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConcertDetail {
    pub name: Option<String>,
    pub price: Option<String>,
    pub runtime: Option<String>,
    pub cast: Option<String>,
    pub venue: Option<String>,
    pub program_blurb: Option<String>,
    pub showtime_guidance: Option<String>,
    /// `None` when the response has no `<relates>` block at all.
    pub vendor_links: Option<Vec<VendorLink>>,
    /// `None` when the response has no `<styurls>` block at all.
    pub full_posters: Option<Vec<String>>,
}

/// A `<relate>` entry: ticket vendor label (possibly missing) and URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorLink {
    pub label: Option<String>,
    pub url: String,
}

/// Enriched concert, keyed by the KOPIS id.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcertRecord {
    pub external_id: String,
    pub area: u16,
    pub name: String,
    pub event_day: NaiveDate,
    pub starts_at: DateTime<Utc>,
    pub runtime: String,
    pub price: String,
    pub venue: String,
    pub cast: String,
    pub program_blurb: String,
    pub display_poster: String,
    pub full_posters: Vec<String>,
    /// Vendor name to URL.
    pub ticket_vendors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PosterKind {
    Display,
    Full,
}

impl fmt::Display for PosterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PosterKind::Display => write!(f, "display"),
            PosterKind::Full => write!(f, "full"),
        }
    }
}

/// Input chosen once per concert for program extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramSource {
    /// The concert's program blurb.
    TextSource(String),
    /// Merged full-poster image on disk.
    ImageSource(PathBuf),
}

impl ProgramSource {
    pub fn kind(&self) -> &'static str {
        match self {
            ProgramSource::TextSource(_) => "text",
            ProgramSource::ImageSource(_) => "image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionEntry {
    pub composer: String,
    pub title: String,
}

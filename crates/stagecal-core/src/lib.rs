//! Core domain model for stagecal: raw source rows, the canonical event
//! shape, identity keys, and the placeholder sentinel.

pub mod normalize;

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "stagecal-core";

/// Sentinel for "field not supplied by this source". Sources emit it for
/// values they could not extract, and the unifier emits it for columns a
/// source does not carry at all.
pub const PLACEHOLDER: &str = "-";

/// One row of the performer-reported ticket feed, as scraped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTalentRow {
    #[serde(rename = "TalentName")]
    pub talent_name: String,
    #[serde(rename = "TalentID")]
    pub talent_id: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "StartTime")]
    pub start_time: String,
    #[serde(rename = "Members")]
    pub members: String,
    #[serde(rename = "Venue")]
    pub venue: String,
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "Link")]
    pub link: String,
}

/// One row of a venue-reported theater calendar, as scraped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTheaterRow {
    #[serde(rename = "Venue")]
    pub venue: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "OpenTime")]
    pub open_time: String,
    #[serde(rename = "StartTime")]
    pub start_time: String,
    #[serde(rename = "EndTime")]
    pub end_time: String,
    #[serde(rename = "Members")]
    pub members: String,
    #[serde(rename = "Detail")]
    pub detail: String,
    #[serde(rename = "Link")]
    pub link: String,
}

/// The unified record shape every source is projected onto. Field order is
/// the persisted column order; the serde renames are the snapshot CSV
/// headers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalEvent {
    #[serde(rename = "公演日")]
    pub date: String,
    #[serde(rename = "タイトル")]
    pub title: String,
    #[serde(rename = "会場")]
    pub venue: String,
    #[serde(rename = "開場")]
    pub open_time: String,
    #[serde(rename = "開演")]
    pub start_time: String,
    #[serde(rename = "終演")]
    pub end_time: String,
    #[serde(rename = "出演者")]
    pub members: String,
    #[serde(rename = "詳細")]
    pub detail: String,
    #[serde(rename = "チケット")]
    pub ticket_link: String,
    #[serde(rename = "画像")]
    pub image: String,
}

impl CanonicalEvent {
    /// The tuple identifying one real-world performance across sources.
    ///
    /// The title component is re-normalized here so keys stay stable for
    /// rows read back from a persisted snapshot (the normalizer is
    /// idempotent, so already-normalized titles pass through unchanged).
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            date: self.date.clone(),
            title: normalize::normalize_title(&self.title),
            venue: self.venue.clone(),
            start_time: self.start_time.clone(),
        }
    }

    /// Field name/value pairs in persisted column order, for placeholder
    /// substitution in notification payloads.
    pub fn fields(&self) -> [(&'static str, &str); 10] {
        [
            ("date", self.date.as_str()),
            ("title", self.title.as_str()),
            ("venue", self.venue.as_str()),
            ("open_time", self.open_time.as_str()),
            ("start_time", self.start_time.as_str()),
            ("end_time", self.end_time.as_str()),
            ("members", self.members.as_str()),
            ("detail", self.detail.as_str()),
            ("ticket_link", self.ticket_link.as_str()),
            ("image", self.image.as_str()),
        ]
    }
}

/// Identity of one real-world performance: `(date, normalized title, venue,
/// start time)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub date: String,
    pub title: String,
    pub venue: String,
    pub start_time: String,
}

//! Source adapters: raw CSV loading and projection onto the canonical
//! event shape.
//!
//! The scraping collaborators drop one CSV per source (`utf-8-sig`
//! encoded). Loading tolerates the BOM and skips rows that do not match
//! the source's own schema; projection fills every canonical field the
//! source lacks with the placeholder.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use stagecal_core::{normalize::normalize_title, CanonicalEvent, RawTalentRow, RawTheaterRow, PLACEHOLDER};
use thiserror::Error;
use tracing::warn;

pub const CRATE_NAME: &str = "stagecal-adapters";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source file {} is missing", path.display())]
    MissingFile { path: PathBuf },
    #[error("reading source file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Load the performer-reported ticket feed CSV.
pub fn load_talent_rows(path: &Path) -> Result<Vec<RawTalentRow>, SourceError> {
    let data = read_source_file(path)?;
    Ok(parse_csv_rows(&data, "talent-feed"))
}

/// Load the venue-reported theater calendar CSV.
pub fn load_theater_rows(path: &Path) -> Result<Vec<RawTheaterRow>, SourceError> {
    let data = read_source_file(path)?;
    Ok(parse_csv_rows(&data, "theater-calendar"))
}

fn read_source_file(path: &Path) -> Result<String, SourceError> {
    match std::fs::read_to_string(path) {
        Ok(data) => Ok(data),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(SourceError::MissingFile {
            path: path.to_path_buf(),
        }),
        Err(err) => Err(SourceError::Io {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}

fn parse_csv_rows<T: DeserializeOwned>(data: &str, source_id: &str) -> Vec<T> {
    let data = data.strip_prefix('\u{feff}').unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data.as_bytes());
    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<T>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            // Data-quality problem, not a run failure: drop the row.
            Err(err) => warn!(source_id, row = index + 1, %err, "skipping malformed source row"),
        }
    }
    rows
}

/// Select and unify the ticket-feed rows for one performer.
///
/// The feed identifies the performer in its own name column, so the roster
/// name is containment-matched there. Overlapping name substrings between
/// performers will collide; this matches the upstream feeds' semantics and
/// is deliberately left as-is.
pub fn unify_talent(rows: &[RawTalentRow], performer: &str) -> Vec<CanonicalEvent> {
    rows.iter()
        .filter(|row| row.talent_name.contains(performer))
        .map(|row| CanonicalEvent {
            date: value_or_placeholder(&row.date),
            title: normalize_title(&row.title),
            venue: value_or_placeholder(&row.venue),
            open_time: PLACEHOLDER.to_string(),
            start_time: value_or_placeholder(&row.start_time),
            end_time: PLACEHOLDER.to_string(),
            members: value_or_placeholder(&row.members),
            detail: PLACEHOLDER.to_string(),
            ticket_link: value_or_placeholder(&row.link),
            image: value_or_placeholder(&row.image),
        })
        .collect()
}

/// Select and unify the theater-calendar rows for one performer.
///
/// Calendars only list performers in the free-text members column, so the
/// roster name is containment-matched against it.
pub fn unify_theater(rows: &[RawTheaterRow], performer: &str) -> Vec<CanonicalEvent> {
    rows.iter()
        .filter(|row| row.members.contains(performer))
        .map(|row| CanonicalEvent {
            date: value_or_placeholder(&row.date),
            title: normalize_title(&row.title),
            venue: value_or_placeholder(&row.venue),
            open_time: value_or_placeholder(&row.open_time),
            start_time: value_or_placeholder(&row.start_time),
            end_time: value_or_placeholder(&row.end_time),
            members: value_or_placeholder(&row.members),
            detail: value_or_placeholder(&row.detail),
            ticket_link: value_or_placeholder(&row.link),
            image: PLACEHOLDER.to_string(),
        })
        .collect()
}

// Empty cells count as "no information", same as the scrapers' own '-'.
fn value_or_placeholder(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TALENT_CSV: &str = "\u{feff}TalentName,TalentID,Title,Date,StartTime,Members,Venue,Image,Link\n\
        山田花子,123,Live Show　19:00の部,2025-05-10,19:00,山田花子|田中太郎,Hall A,https://img/1.jpg,https://tix/1\n\
        佐藤次郎,456,Solo Night,2025-05-11,18:00,佐藤次郎,Hall B,-,https://tix/2\n";

    const THEATER_CSV: &str = "Venue,Title,Date,OpenTime,StartTime,EndTime,Members,Detail,Link\n\
        Hall A,Live Show,2025-05-10,18:30,19:00,21:00,山田花子／田中太郎,Special guest,https://tix/1\n";

    #[test]
    fn parses_rows_and_strips_bom() {
        let rows: Vec<RawTalentRow> = parse_csv_rows(TALENT_CSV, "talent-feed");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].talent_name, "山田花子");
        assert_eq!(rows[0].date, "2025-05-10");
    }

    #[test]
    fn skips_rows_missing_required_columns() {
        let csv = "TalentName,TalentID,Title,Date,StartTime,Members,Venue,Image,Link\n\
            山田花子,123,Live Show,2025-05-10\n\
            山田花子,123,Live Show,2025-05-10,19:00,山田花子,Hall A,-,-\n";
        let rows: Vec<RawTalentRow> = parse_csv_rows(csv, "talent-feed");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].start_time, "19:00");
    }

    #[test]
    fn talent_filter_matches_name_column_by_containment() {
        let rows: Vec<RawTalentRow> = parse_csv_rows(TALENT_CSV, "talent-feed");
        let unified = unify_talent(&rows, "山田花子");
        assert_eq!(unified.len(), 1);
        assert_eq!(unified[0].venue, "Hall A");
    }

    #[test]
    fn talent_projection_fills_absent_columns_with_placeholder() {
        let rows: Vec<RawTalentRow> = parse_csv_rows(TALENT_CSV, "talent-feed");
        let unified = unify_talent(&rows, "山田花子");
        let event = &unified[0];
        assert_eq!(event.open_time, PLACEHOLDER);
        assert_eq!(event.end_time, PLACEHOLDER);
        assert_eq!(event.detail, PLACEHOLDER);
        assert_eq!(event.ticket_link, "https://tix/1");
        assert_eq!(event.image, "https://img/1.jpg");
    }

    #[test]
    fn titles_are_normalized_during_projection() {
        let rows: Vec<RawTalentRow> = parse_csv_rows(TALENT_CSV, "talent-feed");
        let unified = unify_talent(&rows, "山田花子");
        assert_eq!(unified[0].title, "Live Show");
    }

    #[test]
    fn theater_filter_matches_members_column_by_containment() {
        let rows: Vec<RawTheaterRow> = parse_csv_rows(THEATER_CSV, "theater-calendar");
        assert_eq!(unify_theater(&rows, "田中太郎").len(), 1);
        assert!(unify_theater(&rows, "佐藤次郎").is_empty());
    }

    #[test]
    fn theater_projection_has_no_image_column() {
        let rows: Vec<RawTheaterRow> = parse_csv_rows(THEATER_CSV, "theater-calendar");
        let unified = unify_theater(&rows, "山田花子");
        assert_eq!(unified[0].image, PLACEHOLDER);
        assert_eq!(unified[0].open_time, "18:30");
        assert_eq!(unified[0].detail, "Special guest");
    }

    #[test]
    fn empty_cells_become_placeholders() {
        let csv = "Venue,Title,Date,OpenTime,StartTime,EndTime,Members,Detail,Link\n\
            Hall A,Live Show,2025-05-10,,19:00,,山田花子,,\n";
        let rows: Vec<RawTheaterRow> = parse_csv_rows(csv, "theater-calendar");
        let unified = unify_theater(&rows, "山田花子");
        assert_eq!(unified[0].open_time, PLACEHOLDER);
        assert_eq!(unified[0].end_time, PLACEHOLDER);
        assert_eq!(unified[0].detail, PLACEHOLDER);
        assert_eq!(unified[0].ticket_link, PLACEHOLDER);
    }

    #[test]
    fn missing_file_is_a_typed_error() {
        let err = load_talent_rows(Path::new("/nonexistent/talent_tickets.csv")).unwrap_err();
        assert!(matches!(err, SourceError::MissingFile { .. }));
    }
}

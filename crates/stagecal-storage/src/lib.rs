//! Per-performer snapshot persistence.
//!
//! A snapshot is the complete, ordered schedule for one performer as of one
//! run, stored as an all-quoted UTF-8-with-BOM CSV so spreadsheet tools open
//! it cleanly. The previous run's file is the only state carried between
//! runs; writes go through a temp file and an atomic rename so a crashed run
//! never leaves a half-written diff baseline behind.

use std::path::{Path, PathBuf};

use anyhow::Context;
use stagecal_core::CanonicalEvent;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

pub const CRATE_NAME: &str = "stagecal-storage";

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Persisted column names, in `CanonicalEvent` field order.
const SNAPSHOT_HEADERS: [&str; 10] = [
    "公演日",
    "タイトル",
    "会場",
    "開場",
    "開演",
    "終演",
    "出演者",
    "詳細",
    "チケット",
    "画像",
];

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("encoding snapshot rows")]
    Encode(#[from] csv::Error),
    #[error("snapshot io")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot files are named `{id}_{name}.csv` under the store root.
    pub fn snapshot_path(&self, performer_id: &str, performer_name: &str) -> PathBuf {
        self.root.join(format!("{performer_id}_{performer_name}.csv"))
    }

    /// Read the snapshot persisted by the previous run. `None` means no
    /// previous run exists, which the change detector treats as a first
    /// run rather than as an empty schedule.
    pub async fn load_previous(&self, path: &Path) -> anyhow::Result<Option<Vec<CanonicalEvent>>> {
        let data = match fs::read_to_string(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading previous snapshot {}", path.display()))
            }
        };

        let data = data.strip_prefix('\u{feff}').unwrap_or(&data);
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let mut events = Vec::new();
        for (index, record) in reader.deserialize::<CanonicalEvent>().enumerate() {
            match record {
                Ok(event) => events.push(event),
                Err(err) => warn!(
                    path = %path.display(),
                    row = index + 1,
                    %err,
                    "skipping unreadable snapshot row"
                ),
            }
        }
        Ok(Some(events))
    }

    /// Persist a snapshot, atomically replacing any previous file.
    pub async fn write_snapshot(
        &self,
        path: &Path,
        events: &[CanonicalEvent],
    ) -> anyhow::Result<()> {
        let body = encode_snapshot(events).context("encoding snapshot csv")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating snapshot directory {}", parent.display()))?;
        }

        let temp_name = format!(".{}.tmp", Uuid::new_v4());
        let temp_path = path
            .parent()
            .expect("snapshot path always has parent")
            .join(temp_name);

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp snapshot file {}", temp_path.display()))?;
        file.write_all(&body)
            .await
            .with_context(|| format!("writing temp snapshot file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp snapshot file {}", temp_path.display()))?;
        drop(file);

        match fs::rename(&temp_path, path).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err).with_context(|| {
                    format!(
                        "atomically renaming temp snapshot {} -> {}",
                        temp_path.display(),
                        path.display()
                    )
                })
            }
        }
    }
}

/// Serialize events with every field quoted, BOM-prefixed. Deterministic:
/// the same events always produce the same bytes. The header row is written
/// unconditionally so an empty schedule still persists as a valid file.
fn encode_snapshot(events: &[CanonicalEvent]) -> Result<Vec<u8>, SnapshotError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(SNAPSHOT_HEADERS)?;
    for event in events {
        writer.serialize(event)?;
    }
    let body = writer
        .into_inner()
        .map_err(|err| SnapshotError::Io(err.into_error()))?;

    let mut bytes = Vec::with_capacity(UTF8_BOM.len() + body.len());
    bytes.extend_from_slice(UTF8_BOM);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

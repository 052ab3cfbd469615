//! Reconciliation pipeline orchestration.
//!
//! One run: load both raw source CSVs, then per performer — filter, unify,
//! reconcile duplicate listings into canonical events, sort, diff against
//! the previously persisted snapshot, persist the new snapshot, and hand
//! newly appeared events to the notification hook.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stagecal_core::{CanonicalEvent, IdentityKey, RawTalentRow, RawTheaterRow, PLACEHOLDER};
use stagecal_storage::SnapshotStore;
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "stagecal-sync";

/// One roster entry, as configured in the `TALENTS` environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Performer {
    pub id: String,
    pub name: String,
}

/// How the change detector decides that a row is "new".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffStrategy {
    /// Any difference in any field makes a row new; an edit to an existing
    /// event re-notifies. Matches the historical behavior.
    #[default]
    FullRow,
    /// Only a previously unseen identity key counts as new; edits to known
    /// events are silent.
    IdentityKey,
}

impl DiffStrategy {
    fn from_env() -> Self {
        match std::env::var("STAGECAL_DIFF_STRATEGY").as_deref() {
            Ok("identity-key") => DiffStrategy::IdentityKey,
            _ => DiffStrategy::FullRow,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub talent_csv: PathBuf,
    pub theater_csv: PathBuf,
    pub schedules_dir: PathBuf,
    pub performers: Vec<Performer>,
    pub diff_strategy: DiffStrategy,
    pub notify_on_first_run: bool,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        let performers = match std::env::var("TALENTS") {
            Ok(raw) => serde_json::from_str(&raw).context("parsing TALENTS roster json")?,
            Err(_) => Vec::new(),
        };
        Ok(Self {
            talent_csv: env_path("STAGECAL_TALENT_CSV", "talent_tickets.csv"),
            theater_csv: env_path("STAGECAL_THEATER_CSV", "theater_schedules.csv"),
            schedules_dir: env_path("STAGECAL_SCHEDULES_DIR", "schedules"),
            performers,
            diff_strategy: DiffStrategy::from_env(),
            notify_on_first_run: std::env::var("STAGECAL_NOTIFY_ON_FIRST_RUN")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
        })
    }
}

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var(var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

/// Collapse unified rows sharing an identity key into one canonical event
/// per key.
///
/// Groups form in first-appearance order, which is the concatenation order
/// of the sources (talent feed before theater calendar, original row order
/// within each). Within a group every non-key field is folded explicitly:
/// the first non-placeholder value wins, all-placeholder stays placeholder.
/// Two same-source rows colliding on a key merge the same way, earlier row
/// winning per field.
pub fn reconcile(events: Vec<CanonicalEvent>) -> Vec<CanonicalEvent> {
    let mut order: Vec<IdentityKey> = Vec::new();
    let mut merged: HashMap<IdentityKey, CanonicalEvent> = HashMap::new();

    for event in events {
        let key = event.identity_key();
        match merged.entry(key) {
            Entry::Occupied(mut slot) => merge_into(slot.get_mut(), &event),
            Entry::Vacant(slot) => {
                order.push(slot.key().clone());
                slot.insert(event);
            }
        }
    }

    order
        .into_iter()
        .map(|key| merged.remove(&key).expect("key recorded on first insert"))
        .collect()
}

// Key fields (date, title, venue, start_time) are identical across the
// group by construction, so only the payload fields fold.
fn merge_into(target: &mut CanonicalEvent, incoming: &CanonicalEvent) {
    fill_field(&mut target.open_time, &incoming.open_time);
    fill_field(&mut target.end_time, &incoming.end_time);
    fill_field(&mut target.members, &incoming.members);
    fill_field(&mut target.detail, &incoming.detail);
    fill_field(&mut target.ticket_link, &incoming.ticket_link);
    fill_field(&mut target.image, &incoming.image);
}

fn fill_field(target: &mut String, incoming: &str) {
    if target == PLACEHOLDER && incoming != PLACEHOLDER {
        *target = incoming.to_string();
    }
}

/// Impose the deterministic snapshot order: ascending `(date, open time,
/// start time)`, title as the tie-break. The sort is stable, so rows that
/// compare equal keep their reconciliation-stage relative order.
pub fn sort_snapshot(mut events: Vec<CanonicalEvent>) -> Vec<CanonicalEvent> {
    events.sort_by(|a, b| {
        (
            a.date.as_str(),
            a.open_time.as_str(),
            a.start_time.as_str(),
            a.title.as_str(),
        )
            .cmp(&(
                b.date.as_str(),
                b.open_time.as_str(),
                b.start_time.as_str(),
                b.title.as_str(),
            ))
    });
    events
}

/// Rows of the new snapshot that were absent from the previous one, in
/// snapshot order.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub events: Vec<CanonicalEvent>,
    /// No previous snapshot existed; the whole schedule counts as new.
    /// Distinct from "previous snapshot existed and nothing changed".
    pub first_run: bool,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Compare a freshly built snapshot against the previously persisted one.
pub fn diff(
    new_snapshot: &[CanonicalEvent],
    previous: Option<&[CanonicalEvent]>,
    strategy: DiffStrategy,
) -> ChangeSet {
    let Some(previous) = previous else {
        return ChangeSet {
            events: new_snapshot.to_vec(),
            first_run: true,
        };
    };

    let events = match strategy {
        DiffStrategy::FullRow => {
            let seen: HashSet<&CanonicalEvent> = previous.iter().collect();
            new_snapshot
                .iter()
                .filter(|event| !seen.contains(*event))
                .cloned()
                .collect()
        }
        DiffStrategy::IdentityKey => {
            let seen: HashSet<IdentityKey> =
                previous.iter().map(CanonicalEvent::identity_key).collect();
            new_snapshot
                .iter()
                .filter(|event| !seen.contains(&event.identity_key()))
                .cloned()
                .collect()
        }
    };

    ChangeSet {
        events,
        first_run: false,
    }
}

/// Delivery hook for newly appeared events. Rendering and transport live
/// behind this seam; the pipeline only guarantees the change set it hands
/// over is ordered and non-empty.
pub trait Notifier: Send + Sync {
    fn notify(&self, performer: &Performer, changes: &ChangeSet) -> Result<()>;
}

#[derive(Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _performer: &Performer, _changes: &ChangeSet) -> Result<()> {
        Ok(())
    }
}

/// Substitute `{field}` placeholders in a caller-supplied template with the
/// event's canonical field values (`{date}`, `{title}`, ... `{image}`).
pub fn render_template(template: &str, event: &CanonicalEvent) -> String {
    let mut out = template.to_string();
    for (name, value) in event.fields() {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub performers_processed: usize,
    pub performers_failed: usize,
    pub new_events: usize,
}

pub struct SyncPipeline {
    config: SyncConfig,
    store: SnapshotStore,
    notifier: Box<dyn Notifier>,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Self {
        let store = SnapshotStore::new(config.schedules_dir.clone());
        Self {
            config,
            store,
            notifier: Box::<NoopNotifier>::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// One batch pass over the whole roster. A missing raw source file
    /// aborts the run; a failure inside one performer's processing is
    /// logged and does not stop the remaining performers.
    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();

        let talent_rows = stagecal_adapters::load_talent_rows(&self.config.talent_csv)?;
        let theater_rows = stagecal_adapters::load_theater_rows(&self.config.theater_csv)?;
        info!(
            %run_id,
            talent_rows = talent_rows.len(),
            theater_rows = theater_rows.len(),
            performers = self.config.performers.len(),
            "starting sync run"
        );

        let mut processed = 0usize;
        let mut failed = 0usize;
        let mut new_events = 0usize;

        for performer in &self.config.performers {
            match self
                .run_performer(performer, &talent_rows, &theater_rows)
                .await
            {
                Ok(count) => {
                    processed += 1;
                    new_events += count;
                }
                Err(err) => {
                    failed += 1;
                    warn!(
                        performer = %performer.name,
                        error = %format!("{err:#}"),
                        "performer processing failed"
                    );
                }
            }
        }

        info!(processed, failed, new_events, "all performers processed");
        Ok(SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            performers_processed: processed,
            performers_failed: failed,
            new_events,
        })
    }

    async fn run_performer(
        &self,
        performer: &Performer,
        talent_rows: &[RawTalentRow],
        theater_rows: &[RawTheaterRow],
    ) -> Result<usize> {
        info!(performer = %performer.name, "processing performer schedule");

        // Talent-feed rows come first so that source wins field tie-breaks.
        let mut unified = stagecal_adapters::unify_talent(talent_rows, &performer.name);
        unified.extend(stagecal_adapters::unify_theater(theater_rows, &performer.name));
        let snapshot = sort_snapshot(reconcile(unified));

        let path = self.store.snapshot_path(&performer.id, &performer.name);
        let previous = self.store.load_previous(&path).await?;
        let changes = diff(&snapshot, previous.as_deref(), self.config.diff_strategy);
        if changes.first_run {
            info!(
                performer = %performer.name,
                events = changes.events.len(),
                "no previous snapshot; whole schedule counts as new"
            );
        }

        // Persist before notifying: a delivery failure must not leave the
        // old baseline in place and re-flag the same events next run.
        self.store
            .write_snapshot(&path, &snapshot)
            .await
            .with_context(|| format!("persisting snapshot for {}", performer.name))?;

        let suppress = changes.first_run && !self.config.notify_on_first_run;
        if !changes.is_empty() && !suppress {
            if let Err(err) = self.notifier.notify(performer, &changes) {
                warn!(
                    performer = %performer.name,
                    error = %format!("{err:#}"),
                    "notification delivery failed"
                );
            }
        }

        Ok(changes.events.len())
    }
}

pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    let config = SyncConfig::from_env()?;
    SyncPipeline::new(config).run_once().await
}

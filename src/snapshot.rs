use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::aggregate::{self, Aggregator};
use crate::crossing::{CrossingDetector, TrackState};
use crate::detection::TrackId;
use crate::error::Error;
use crate::vehicle::ClassCounts;

/// Current snapshot document version. Version 1 documents predate the
/// `version` field and carry no per-track last-seen frames.
pub const SNAPSHOT_VERSION: u32 = 2;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Uploaded,
    Analyzing,
    Done,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Uploaded => "uploaded",
            RunStatus::Analyzing => "analyzing",
            RunStatus::Done => "done",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    user: String,
    fingerprint: String,
}

impl SnapshotKey {
    pub fn new(user: &str, fingerprint: &str) -> Self {
        Self {
            user: normalize_user(user),
            fingerprint: fingerprint.trim().to_ascii_lowercase(),
        }
    }

    #[inline]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[inline]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.fingerprint)
    }
}

#[inline]
pub fn normalize_user(user: &str) -> String {
    user.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub frame_count: u64,
    pub counters: ClassCounts,
    pub minute_buckets: Vec<ClassCounts>,
    pub track_state: TrackState,
    pub track_last_seen: BTreeMap<TrackId, u64>,
    pub crossed_ids: BTreeSet<TrackId>,
    pub status: RunStatus,
    pub source_path: String,
    pub updated_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn fresh(source_path: impl Into<String>, total_minutes: usize) -> Self {
        Self {
            frame_count: 0,
            counters: ClassCounts::default(),
            minute_buckets: vec![ClassCounts::default(); total_minutes],
            track_state: TrackState::new(),
            track_last_seen: BTreeMap::new(),
            crossed_ids: BTreeSet::new(),
            status: RunStatus::Uploaded,
            source_path: source_path.into(),
            updated_at: Utc::now(),
        }
    }

    #[inline]
    pub fn reconcile_minutes(&mut self, total_minutes: usize) {
        aggregate::reconcile_minutes(&mut self.minute_buckets, total_minutes);
    }

    #[inline]
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Copies the live counting state in, ready to be persisted.
    pub fn capture(
        &mut self,
        frame_count: u64,
        detector: &CrossingDetector,
        aggregator: &Aggregator,
        status: RunStatus,
    ) {
        self.frame_count = frame_count;
        self.counters = *aggregator.counters();
        self.minute_buckets = aggregator.minutes().to_vec();
        self.track_state = detector.track_state().clone();
        self.track_last_seen = detector.last_seen().clone();
        self.crossed_ids = detector.crossed().clone();
        self.status = status;
        self.touch();
    }

    pub fn encode(&self) -> Result<String, Error> {
        let record = SnapshotRecord {
            version: SNAPSHOT_VERSION,
            frame_count: self.frame_count,
            counters: self.counters,
            minute_buckets: self.minute_buckets.clone(),
            track_state: self.track_state.clone(),
            track_last_seen: self.track_last_seen.clone(),
            crossed_ids: self.crossed_ids.iter().copied().collect(),
            status: self.status,
            source_path: self.source_path.clone(),
            updated_at: self.updated_at,
        };

        Ok(serde_json::to_string(&record)?)
    }

    pub fn decode(data: &str) -> Result<Self, Error> {
        let record: SnapshotRecord = serde_json::from_str(data)?;

        match record.version {
            1 => Ok(record.upgrade_from_v1()),
            SNAPSHOT_VERSION => Ok(record.into_snapshot()),
            other => Err(Error::UnsupportedSnapshotVersion(other)),
        }
    }
}

fn legacy_version() -> u32 {
    1
}

#[derive(Serialize, Deserialize)]
struct SnapshotRecord {
    #[serde(default = "legacy_version")]
    version: u32,
    frame_count: u64,
    counters: ClassCounts,
    minute_buckets: Vec<ClassCounts>,
    track_state: TrackState,
    #[serde(default)]
    track_last_seen: BTreeMap<TrackId, u64>,
    crossed_ids: Vec<TrackId>,
    status: RunStatus,
    #[serde(default)]
    source_path: String,
    #[serde(default)]
    updated_at: DateTime<Utc>,
}

impl SnapshotRecord {
    fn into_snapshot(self) -> ProgressSnapshot {
        ProgressSnapshot {
            frame_count: self.frame_count,
            counters: self.counters,
            minute_buckets: self.minute_buckets,
            track_state: self.track_state,
            track_last_seen: self.track_last_seen,
            crossed_ids: self.crossed_ids.into_iter().collect(),
            status: self.status,
            source_path: self.source_path,
            updated_at: self.updated_at,
        }
    }

    fn upgrade_from_v1(mut self) -> ProgressSnapshot {
        let frame = self.frame_count;
        self.track_last_seen = self.track_state.keys().map(|id| (*id, frame)).collect();
        self.into_snapshot()
    }
}

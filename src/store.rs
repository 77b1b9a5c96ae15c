use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Error;
use crate::snapshot::{normalize_user, ProgressSnapshot, RunStatus, SnapshotKey};

/// Identifying metadata of a user's most recently updated run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub fingerprint: String,
    pub source_path: String,
    pub status: RunStatus,
    pub updated_at: DateTime<Utc>,
}

impl RunSummary {
    fn of(fingerprint: &str, snapshot: &ProgressSnapshot) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            source_path: snapshot.source_path.clone(),
            status: snapshot.status,
            updated_at: snapshot.updated_at,
        }
    }

    #[inline]
    fn is_newer_than(&self, other: &RunSummary) -> bool {
        (self.updated_at, &self.fingerprint) > (other.updated_at, &other.fingerprint)
    }
}

/// Durable progress records, one per key. Assumes a single writer per key.
pub trait RunStore {
    /// Replaces whatever is stored for `key`.
    fn put(&mut self, key: &SnapshotKey, snapshot: &ProgressSnapshot) -> Result<(), Error>;
    fn get(&self, key: &SnapshotKey) -> Result<Option<ProgressSnapshot>, Error>;
    fn latest_for_user(&self, user: &str) -> Result<Option<RunSummary>, Error>;
}

/// Keeps encoded documents in memory, same codec as [`FileStore`].
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    docs: HashMap<SnapshotKey, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl RunStore for MemoryStore {
    fn put(&mut self, key: &SnapshotKey, snapshot: &ProgressSnapshot) -> Result<(), Error> {
        self.docs.insert(key.clone(), snapshot.encode()?);
        Ok(())
    }

    fn get(&self, key: &SnapshotKey) -> Result<Option<ProgressSnapshot>, Error> {
        self.docs
            .get(key)
            .map(|doc| ProgressSnapshot::decode(doc))
            .transpose()
    }

    fn latest_for_user(&self, user: &str) -> Result<Option<RunSummary>, Error> {
        let user = normalize_user(user);
        let mut latest: Option<RunSummary> = None;

        for (key, doc) in &self.docs {
            if key.user() != user {
                continue;
            }
            let summary = RunSummary::of(key.fingerprint(), &ProgressSnapshot::decode(doc)?);
            if latest.as_ref().map_or(true, |l| summary.is_newer_than(l)) {
                latest = Some(summary);
            }
        }

        Ok(latest)
    }
}

/// One JSON document per key at `<root>/<user digest>/<fingerprint>.json`.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        let unavailable = |source| Error::StoreUnavailable {
            path: root.clone(),
            source,
        };

        fs::create_dir_all(&root).map_err(unavailable)?;
        let meta = fs::metadata(&root).map_err(unavailable)?;
        if !meta.is_dir() || meta.permissions().readonly() {
            return Err(unavailable(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "not a writable directory",
            )));
        }

        debug!("run store opened at {}", root.display());
        Ok(Self { root })
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Flushes the directory entries of completed renames.
    pub fn close(self) -> Result<(), Error> {
        File::open(&self.root)?.sync_all()?;
        debug!("run store closed at {}", self.root.display());
        Ok(())
    }

    fn user_dir(&self, user: &str) -> PathBuf {
        let digest = blake3::hash(normalize_user(user).as_bytes());
        self.root.join(&digest.to_hex()[..16])
    }

    fn path_for(&self, key: &SnapshotKey) -> Result<PathBuf, Error> {
        let fingerprint = key.fingerprint();
        if fingerprint.is_empty() || !fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("fingerprint {:?} is not a hex digest", fingerprint),
            )));
        }

        Ok(self.user_dir(key.user()).join(format!("{}.json", fingerprint)))
    }
}

impl RunStore for FileStore {
    fn put(&mut self, key: &SnapshotKey, snapshot: &ProgressSnapshot) -> Result<(), Error> {
        let path = self.path_for(key)?;
        let doc = snapshot.encode()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let tmp = path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(doc.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        Ok(())
    }

    fn get(&self, key: &SnapshotKey) -> Result<Option<ProgressSnapshot>, Error> {
        let path = self.path_for(key)?;

        match fs::read_to_string(&path) {
            Ok(doc) => Ok(Some(ProgressSnapshot::decode(&doc)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn latest_for_user(&self, user: &str) -> Result<Option<RunSummary>, Error> {
        let entries = match fs::read_dir(self.user_dir(user)) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut latest: Option<RunSummary> = None;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let fingerprint = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_string(),
                None => continue,
            };

            let snapshot = ProgressSnapshot::decode(&fs::read_to_string(&path)?)?;
            let summary = RunSummary::of(&fingerprint, &snapshot);
            if latest.as_ref().map_or(true, |l| summary.is_newer_than(l)) {
                latest = Some(summary);
            }
        }

        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::VehicleClass;

    fn snapshot(path: &str, frames: u64) -> ProgressSnapshot {
        let mut s = ProgressSnapshot::fresh(path, 2);
        s.frame_count = frames;
        s.touch();
        s
    }

    fn check_replace_semantics<S: RunStore>(store: &mut S) {
        let key = SnapshotKey::new("Bob@Example.com", "00ff");
        assert!(store.get(&key).unwrap().is_none());

        store.put(&key, &snapshot("/v/a.mp4", 10)).unwrap();
        let mut second = snapshot("/v/a.mp4", 20);
        second.counters.increment(VehicleClass::Truck);
        second.status = RunStatus::Analyzing;
        store.put(&key, &second).unwrap();

        let loaded = store.get(&SnapshotKey::new("bob@example.com", "00FF")).unwrap().unwrap();
        assert_eq!(loaded, second);
    }

    fn check_latest_for_user<S: RunStore>(store: &mut S) {
        assert!(store.latest_for_user("carol@example.com").unwrap().is_none());

        store.put(&SnapshotKey::new("carol@example.com", "aa"), &snapshot("/v/first.mp4", 1)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let mut done = snapshot("/v/second.mp4", 2);
        done.status = RunStatus::Done;
        store.put(&SnapshotKey::new("carol@example.com", "bb"), &done).unwrap();
        store.put(&SnapshotKey::new("dave@example.com", "cc"), &snapshot("/v/other.mp4", 3)).unwrap();

        let latest = store.latest_for_user(" CAROL@example.com").unwrap().unwrap();
        assert_eq!(latest.fingerprint, "bb");
        assert_eq!(latest.source_path, "/v/second.mp4");
        assert_eq!(latest.status, RunStatus::Done);
    }

    #[test]
    fn memory_store_replaces_per_key() {
        let mut store = MemoryStore::new();
        check_replace_semantics(&mut store);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_store_latest_for_user() {
        check_latest_for_user(&mut MemoryStore::new());
    }

    #[test]
    fn file_store_replaces_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("runs")).unwrap();
        check_replace_semantics(&mut store);

        let user_dir = store.user_dir("bob@example.com");
        let files: Vec<_> = fs::read_dir(user_dir).unwrap().collect();
        assert_eq!(files.len(), 1);
        store.close().unwrap();
    }

    #[test]
    fn file_store_latest_for_user() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        check_latest_for_user(&mut store);
    }

    #[test]
    fn file_store_rejects_path_like_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.get(&SnapshotKey::new("a", "../etc")).is_err());
    }

    #[test]
    fn unusable_root_is_store_unavailable() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            FileStore::open(file.path()),
            Err(Error::StoreUnavailable { .. })
        ));
    }
}

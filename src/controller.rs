use std::path::Path;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::config::Config;
use crate::error::Error;
use crate::fingerprint;
use crate::frame::Frame;
use crate::report::Report;
use crate::snapshot::{ProgressSnapshot, RunStatus, SnapshotKey};
use crate::store::{RunStore, RunSummary};
use crate::video::{ObjectTracker, VideoInfo, VideoSource};
use crate::{Counting, LineCounter};

/// Drives one analysis run per key: reload, seek, count, checkpoint.
///
/// Callers must not run two controllers on the same key at once.
pub struct ResumeController<S: RunStore> {
    store: S,
    config: Config,
}

impl<S: RunStore> ResumeController<S> {
    pub fn new(store: S, config: Config) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self { store, config })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn into_store(self) -> S {
        self.store
    }

    /// Validates and fingerprints a video, then records a fresh `uploaded`
    /// snapshot for it, replacing any earlier progress under the same key.
    pub fn register_upload<P: AsRef<Path>>(&mut self, user: &str, path: P) -> Result<SnapshotKey, Error> {
        let path = path.as_ref();
        let size_mb = fingerprint::check_size(path, self.config.limits.max_file_size_mb)?;
        let key = SnapshotKey::new(user, &fingerprint::fingerprint_file(path)?);

        let snapshot = ProgressSnapshot::fresh(path.to_string_lossy(), 0);
        self.store.put(&key, &snapshot)?;

        info!("registered {} ({:.1} MB) as {}", path.display(), size_mb, key);
        Ok(key)
    }

    #[inline]
    pub fn latest_for_user(&self, user: &str) -> Result<Option<RunSummary>, Error> {
        self.store.latest_for_user(user)
    }

    /// Loads the stored snapshot with its minute buckets reconciled to
    /// `total_minutes`, or a fresh one when nothing is stored. Nothing is
    /// written.
    pub fn resume(
        &self,
        key: &SnapshotKey,
        source_path: &str,
        total_minutes: usize,
    ) -> Result<ProgressSnapshot, Error> {
        let snapshot = match self.store.get(key)? {
            Some(mut snapshot) => {
                if snapshot.minute_buckets.len() != total_minutes {
                    debug!(
                        "{}: reconciling {} minute buckets to {}",
                        key,
                        snapshot.minute_buckets.len(),
                        total_minutes
                    );
                }
                snapshot.reconcile_minutes(total_minutes);
                if snapshot.source_path.is_empty() {
                    snapshot.source_path = source_path.to_string();
                }
                snapshot
            }
            None => ProgressSnapshot::fresh(source_path, total_minutes),
        };

        Ok(snapshot)
    }

    pub fn run<V, T>(
        &mut self,
        key: &SnapshotKey,
        source_path: &str,
        source: &mut V,
        tracker: &mut T,
    ) -> Result<ProgressSnapshot, Error>
    where
        V: VideoSource,
        T: ObjectTracker<V::Frame>,
    {
        let video = source.info();
        let fps = aggregate::effective_fps(video.frame_rate);
        let total_minutes = aggregate::total_minutes(video.total_frames, fps);

        let mut snapshot = self.resume(key, source_path, total_minutes)?;
        if snapshot.status == RunStatus::Done {
            info!("{}: analysis already done, nothing to resume", key);
            return Ok(snapshot);
        }

        let mut counter = LineCounter::from_snapshot(&snapshot, &self.config, fps, total_minutes);
        let speed = self.config.counting.speed_factor;
        let checkpoint_every = self.config.counting.checkpoint_every;

        let mut frame_count = snapshot.frame_count;
        let mut decoded = 0u64;
        let mut pending = 0u64;
        let mut last_minute = counter.current_minute(frame_count);

        info!(
            "{}: analyzing from frame {}/{} ({:.2} fps, {} min, speed x{})",
            key, frame_count, video.total_frames, fps, total_minutes, speed
        );
        source.seek(frame_count)?;

        loop {
            let image = match source.read_next() {
                Ok(Some(image)) => image,
                // Nothing left to resume only once the whole source was consumed.
                Ok(None) if decoded == 0 && (frame_count == 0 || frame_count < video.total_frames) => {
                    return Err(Error::UnreadableSource(format!(
                        "{}: no frames from frame {}",
                        source_path, frame_count
                    )));
                }
                Ok(None) => break,
                Err(err) if decoded == 0 => {
                    return Err(Error::UnreadableSource(format!(
                        "{}: frame {}: {}",
                        source_path, frame_count, err
                    )));
                }
                Err(err) => {
                    warn!("{}: frame read failed after frame {}: {}", key, frame_count, err);
                    break;
                }
            };
            decoded += 1;

            // The source position is unknown after a failed skip, so the
            // step is dropped and the run ends at the last counted frame.
            let skipped = if speed > 1 {
                match source.skip(speed - 1) {
                    Ok(skipped) => skipped,
                    Err(err) => {
                        warn!("{}: skipping frames after frame {} failed: {}", key, frame_count, err);
                        break;
                    }
                }
            } else {
                0
            };
            frame_count += 1 + skipped;

            let detections = tracker.track(&image)?;
            let outcome = counter.update(&Frame::new(frame_count, detections));
            for event in &outcome.events {
                debug!(
                    "{}: track {} ({}) crossed at frame {}",
                    key, event.track_id, event.class, event.frame
                );
            }

            let minute = counter.current_minute(frame_count);
            if minute != last_minute {
                info!(
                    "{}: minute {} done, {} vehicles counted",
                    key,
                    last_minute + 1,
                    counter.counters().total()
                );
                last_minute = minute;
            }

            pending += 1;
            if pending >= checkpoint_every {
                counter.capture(&mut snapshot, frame_count, RunStatus::Analyzing);
                self.store.put(key, &snapshot)?;
                debug!("{}: checkpoint at frame {}", key, frame_count);
                pending = 0;
            }
        }

        counter.capture(&mut snapshot, frame_count, RunStatus::Done);
        self.store.put(key, &snapshot)?;

        info!(
            "{}: analysis done at frame {} ({} decoded this run), {} vehicles counted",
            key,
            frame_count,
            decoded,
            snapshot.counters.total()
        );
        Ok(snapshot)
    }

    /// Builds the report for a stored run, `None` when nothing is stored.
    pub fn report(&self, key: &SnapshotKey, video: VideoInfo) -> Result<Option<Report>, Error> {
        let fps = aggregate::effective_fps(video.frame_rate);
        let total_minutes = aggregate::total_minutes(video.total_frames, fps);

        let snapshot = match self.store.get(key)? {
            Some(mut snapshot) => {
                snapshot.reconcile_minutes(total_minutes);
                snapshot
            }
            None => return Ok(None),
        };

        Ok(Some(Report::from_snapshot(
            &snapshot,
            fps,
            video.total_frames,
            &self.config.report,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::detection::TrackedDetection;
    use crate::store::MemoryStore;
    use crate::vehicle::ClassCounts;

    struct Frames {
        frames: Vec<Vec<TrackedDetection>>,
        pos: usize,
        fps: f64,
        reads: usize,
    }

    impl Frames {
        fn new(frames: Vec<Vec<TrackedDetection>>, fps: f64) -> Self {
            Self {
                frames,
                pos: 0,
                fps,
                reads: 0,
            }
        }
    }

    impl VideoSource for Frames {
        type Frame = Vec<TrackedDetection>;

        fn info(&self) -> VideoInfo {
            VideoInfo {
                frame_rate: self.fps,
                total_frames: self.frames.len() as u64,
                width: 1920,
                height: 1080,
            }
        }

        fn seek(&mut self, frame: u64) -> Result<(), Error> {
            self.pos = (frame as usize).min(self.frames.len());
            Ok(())
        }

        fn read_next(&mut self) -> Result<Option<Self::Frame>, Error> {
            let frame = self.frames.get(self.pos).cloned();
            if frame.is_some() {
                self.pos += 1;
                self.reads += 1;
            }
            Ok(frame)
        }

        fn skip(&mut self, n: u64) -> Result<u64, Error> {
            let n = (n as usize).min(self.frames.len() - self.pos);
            self.pos += n;
            Ok(n as u64)
        }
    }

    fn car(id: i64, bottom: f32) -> TrackedDetection {
        TrackedDetection::new(Some(id), "car", BBox::ltwh(400.0, bottom - 80.0, 60.0, 80.0))
    }

    fn key() -> SnapshotKey {
        SnapshotKey::new("ops@example.com", "c0ffee")
    }

    fn controller(config: Config) -> ResumeController<MemoryStore> {
        ResumeController::new(MemoryStore::new(), config).unwrap()
    }

    #[test]
    fn resume_without_progress_is_fresh() {
        let ctl = controller(Config::default());
        let snapshot = ctl.resume(&key(), "/v.mp4", 4).unwrap();
        assert_eq!(snapshot.status, RunStatus::Uploaded);
        assert_eq!(snapshot.frame_count, 0);
        assert_eq!(snapshot.minute_buckets.len(), 4);
        assert!(ctl.store().is_empty());
    }

    #[test]
    fn resume_reconciles_minute_buckets() {
        let mut ctl = controller(Config::default());
        let mut stored = ProgressSnapshot::fresh("/v.mp4", 10);
        stored.minute_buckets[9].car = 3;
        stored.minute_buckets[2].bus = 1;
        ctl.store.put(&key(), &stored).unwrap();

        let shrunk = ctl.resume(&key(), "/v.mp4", 7).unwrap();
        assert_eq!(shrunk.minute_buckets.len(), 7);
        assert_eq!(shrunk.minute_buckets[2].bus, 1);

        ctl.store.put(&key(), &shrunk).unwrap();
        let grown = ctl.resume(&key(), "/v.mp4", 10).unwrap();
        assert_eq!(grown.minute_buckets.len(), 10);
        assert_eq!(&grown.minute_buckets[7..], &[ClassCounts::default(); 3]);
    }

    #[test]
    fn run_counts_and_finishes_once() {
        let mut ctl = controller(Config::default());
        let mut source = Frames::new(
            vec![
                vec![car(1, 560.0)],
                vec![car(1, 620.0)],
                vec![car(1, 590.0)],
                vec![car(1, 640.0)],
            ],
            30.0,
        );

        let done = ctl.run(&key(), "/v.mp4", &mut source, &mut crate::video::Replay).unwrap();
        assert_eq!(done.status, RunStatus::Done);
        assert_eq!(done.frame_count, 4);
        assert_eq!(done.counters.car, 1);

        let mut again = Frames::new(vec![vec![car(1, 560.0)]], 30.0);
        let same = ctl.run(&key(), "/v.mp4", &mut again, &mut crate::video::Replay).unwrap();
        assert_eq!(same, done);
        assert_eq!(again.reads, 0);
    }

    #[test]
    fn speed_factor_advances_frame_count_by_skipped_frames() {
        let mut config = Config::default();
        config.counting.speed_factor = 4;
        let mut ctl = controller(config);

        let frames: Vec<_> = (0..10).map(|i| vec![car(1, 500.0 + 20.0 * i as f32)]).collect();
        let mut source = Frames::new(frames, 30.0);

        let done = ctl.run(&key(), "/v.mp4", &mut source, &mut crate::video::Replay).unwrap();
        assert_eq!(source.reads, 3);
        assert_eq!(done.frame_count, 10);
        assert_eq!(done.counters.car, 1);
        assert_eq!(done.track_last_seen[&1], 10);
    }

    #[test]
    fn empty_fresh_source_is_unreadable() {
        let mut ctl = controller(Config::default());
        let mut source = Frames::new(Vec::new(), 30.0);
        assert!(matches!(
            ctl.run(&key(), "/v.mp4", &mut source, &mut crate::video::Replay),
            Err(Error::UnreadableSource(_))
        ));
        assert!(ctl.store().get(&key()).unwrap().is_none());
    }

    #[test]
    fn oversized_upload_is_rejected_before_hashing() {
        let mut config = Config::default();
        config.limits.max_file_size_mb = 0;
        let mut ctl = controller(config);

        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not really a video").unwrap();

        assert!(matches!(
            ctl.register_upload("a@b.c", file.path()),
            Err(Error::FileTooLarge { .. })
        ));
        assert!(ctl.store().is_empty());
    }

    #[test]
    fn upload_records_fresh_snapshot() {
        let mut ctl = controller(Config::default());
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"video bytes").unwrap();

        let key = ctl.register_upload(" A@B.C", file.path()).unwrap();
        assert_eq!(key.user(), "a@b.c");
        assert_eq!(key.fingerprint(), blake3::hash(b"video bytes").to_hex().as_str());

        let latest = ctl.latest_for_user("a@b.c").unwrap().unwrap();
        assert_eq!(latest.status, RunStatus::Uploaded);
        assert_eq!(latest.fingerprint, key.fingerprint());
        assert_eq!(latest.source_path, file.path().to_string_lossy());
    }
}

pub mod aggregate;
pub mod bbox;
pub mod config;
pub mod controller;
pub mod crossing;
pub mod detection;
pub mod error;
pub mod fingerprint;
pub mod frame;
pub mod report;
pub mod snapshot;
pub mod store;
pub mod vehicle;
pub mod video;

pub use config::Config;
pub use controller::ResumeController;
pub use detection::{TrackId, TrackedDetection};
pub use frame::Frame;
pub use snapshot::{ProgressSnapshot, RunStatus, SnapshotKey};
pub use vehicle::{ClassCounts, VehicleClass};

use aggregate::Aggregator;
use crossing::{CountingLine, CrossingDetector, FrameOutcome};

pub trait Counting {
    fn update(&mut self, frame: &Frame) -> FrameOutcome;
    fn counters(&self) -> &ClassCounts;
}

/// Crossing detection feeding minute aggregation, seeded from a snapshot.
pub struct LineCounter {
    detector: CrossingDetector,
    aggregator: Aggregator,
}

impl LineCounter {
    pub fn new(detector: CrossingDetector, aggregator: Aggregator) -> Self {
        Self {
            detector,
            aggregator,
        }
    }

    pub fn from_snapshot(
        snapshot: &ProgressSnapshot,
        config: &Config,
        fps: f64,
        total_minutes: usize,
    ) -> Self {
        let detector = CrossingDetector::restore(
            CountingLine::from_config(&config.line),
            snapshot.frame_count,
            snapshot.track_state.clone(),
            snapshot.track_last_seen.clone(),
            snapshot.crossed_ids.clone(),
        )
        .with_eviction_window(config.counting.eviction_window);

        let aggregator = Aggregator::restore(
            fps,
            snapshot.counters,
            snapshot.minute_buckets.clone(),
            total_minutes,
        );

        Self::new(detector, aggregator)
    }

    #[inline]
    pub fn detector(&self) -> &CrossingDetector {
        &self.detector
    }

    #[inline]
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    #[inline]
    pub fn current_minute(&self, frame_count: u64) -> usize {
        self.aggregator.current_minute(frame_count)
    }

    #[inline]
    pub fn capture(&self, snapshot: &mut ProgressSnapshot, frame_count: u64, status: RunStatus) {
        snapshot.capture(frame_count, &self.detector, &self.aggregator, status);
    }
}

impl Counting for LineCounter {
    fn update(&mut self, frame: &Frame) -> FrameOutcome {
        let outcome = self.detector.process_frame(frame);
        for event in &outcome.events {
            self.aggregator.record(event);
        }
        outcome
    }

    #[inline]
    fn counters(&self) -> &ClassCounts {
        self.aggregator.counters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;

    fn car(id: i64, bottom: f32) -> TrackedDetection {
        TrackedDetection::new(Some(id), "car", BBox::ltwh(300.0, bottom - 60.0, 50.0, 60.0))
    }

    #[test]
    fn events_reach_the_minute_buckets() {
        let config = Config::default();
        let snapshot = ProgressSnapshot::fresh("v.mp4", 2);
        let mut counter = LineCounter::from_snapshot(&snapshot, &config, 30.0, 2);

        counter.update(&Frame::new(1, vec![car(1, 590.0), car(2, 500.0)]));
        let outcome = counter.update(&Frame::new(1900, vec![car(1, 640.0), car(2, 610.0)]));

        assert_eq!(outcome.events.len(), 2);
        assert_eq!(counter.counters().car, 2);
        assert_eq!(counter.aggregator().minutes()[1].car, 2);

        let mut saved = snapshot.clone();
        counter.capture(&mut saved, 1900, RunStatus::Analyzing);
        assert_eq!(saved.counters.car, 2);
        assert_eq!(saved.crossed_ids.len(), 2);
        assert_eq!(saved.track_state[&1], 640);
        assert_eq!(saved.frame_count, 1900);
    }
}

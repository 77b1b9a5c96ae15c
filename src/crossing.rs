use nalgebra as na;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::config::LineConfig;
use crate::detection::{TrackId, TrackedDetection};
use crate::error::Error;
use crate::frame::Frame;
use crate::vehicle::VehicleClass;

/// Last observed bottom edge per track.
pub type TrackState = BTreeMap<TrackId, i32>;

#[derive(Debug, Clone, PartialEq)]
pub struct CountingLine {
    pub start: na::Point2<f32>,
    pub end: na::Point2<f32>,
    gate_horizontal: bool,
}

impl CountingLine {
    pub fn new(start: na::Point2<f32>, end: na::Point2<f32>) -> Self {
        Self {
            start,
            end,
            gate_horizontal: false,
        }
    }

    pub fn from_config(config: &LineConfig) -> Self {
        Self::new(
            na::Point2::new(config.x1, config.y1),
            na::Point2::new(config.x2, config.y2),
        )
        .with_horizontal_gate(config.gate_horizontal)
    }

    #[inline]
    pub fn with_horizontal_gate(mut self, gate: bool) -> Self {
        self.gate_horizontal = gate;
        self
    }

    /// The line is an infinite horizontal threshold at the start point's Y.
    #[inline]
    pub fn threshold(&self) -> i32 {
        self.start.y as i32
    }

    #[inline]
    pub fn spans(&self, x: f32) -> bool {
        let (lo, hi) = if self.start.x <= self.end.x {
            (self.start.x, self.end.x)
        } else {
            (self.end.x, self.start.x)
        };
        x >= lo && x <= hi
    }

    #[inline]
    fn admits(&self, x: f32) -> bool {
        !self.gate_horizontal || self.spans(x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossingEvent {
    pub track_id: TrackId,
    pub class: VehicleClass,
    pub frame: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// No track id or not a vehicle, nothing recorded.
    Ignored,
    Moved,
    Crossed(CrossingEvent),
    /// Crossed again after already being counted.
    Suppressed,
}

#[derive(Debug, Default)]
pub struct FrameOutcome {
    pub events: Vec<CrossingEvent>,
    pub suppressed: usize,
    pub rejected: Vec<Error>,
}

#[derive(Debug, Clone)]
pub struct CrossingDetector {
    line: CountingLine,
    track_state: TrackState,
    last_seen: BTreeMap<TrackId, u64>,
    crossed: BTreeSet<TrackId>,
    eviction_window: Option<u64>,
}

impl CrossingDetector {
    pub fn new(line: CountingLine) -> Self {
        Self {
            line,
            track_state: BTreeMap::new(),
            last_seen: BTreeMap::new(),
            crossed: BTreeSet::new(),
            eviction_window: None,
        }
    }

    /// Re-seeds the detector from checkpointed state. Tracks with no recorded
    /// last-seen frame are treated as seen at `frame`.
    pub fn restore(
        line: CountingLine,
        frame: u64,
        track_state: TrackState,
        mut last_seen: BTreeMap<TrackId, u64>,
        crossed: BTreeSet<TrackId>,
    ) -> Self {
        last_seen.retain(|id, _| track_state.contains_key(id));
        for id in track_state.keys() {
            last_seen.entry(*id).or_insert(frame);
        }

        Self {
            line,
            track_state,
            last_seen,
            crossed,
            eviction_window: None,
        }
    }

    #[inline]
    pub fn with_eviction_window(mut self, window: Option<u64>) -> Self {
        self.eviction_window = window;
        self
    }

    #[inline]
    pub fn line(&self) -> &CountingLine {
        &self.line
    }

    #[inline]
    pub fn track_state(&self) -> &TrackState {
        &self.track_state
    }

    #[inline]
    pub fn last_seen(&self) -> &BTreeMap<TrackId, u64> {
        &self.last_seen
    }

    #[inline]
    pub fn crossed(&self) -> &BTreeSet<TrackId> {
        &self.crossed
    }

    pub fn observe(&mut self, frame: u64, det: &TrackedDetection) -> Result<Observation, Error> {
        det.check()?;

        let id = match det.id {
            Some(id) => id,
            None => return Ok(Observation::Ignored),
        };
        let class = match det.class() {
            Some(class) => class,
            None => return Ok(Observation::Ignored),
        };

        let ground = det.ltrb()?.ground_point();
        let current_y = ground.y as i32;
        let previous_y = self.track_state.get(&id).copied().unwrap_or(current_y);
        let line_y = self.line.threshold();

        let crossed = previous_y < line_y && current_y >= line_y && self.line.admits(ground.x);

        let observation = if !crossed {
            Observation::Moved
        } else if self.crossed.insert(id) {
            Observation::Crossed(CrossingEvent {
                track_id: id,
                class,
                frame,
            })
        } else {
            Observation::Suppressed
        };

        self.track_state.insert(id, current_y);
        self.last_seen.insert(id, frame);

        Ok(observation)
    }

    pub fn process_frame(&mut self, frame: &Frame) -> FrameOutcome {
        let mut outcome = FrameOutcome::default();

        for det in frame.iter() {
            match self.observe(frame.index, det) {
                Ok(Observation::Crossed(event)) => outcome.events.push(event),
                Ok(Observation::Suppressed) => outcome.suppressed += 1,
                Ok(_) => (),
                Err(err) => {
                    debug!("frame {}: skipping detection: {}", frame.index, err);
                    outcome.rejected.push(err);
                }
            }
        }

        self.evict(frame.index);

        outcome
    }

    fn evict(&mut self, frame: u64) {
        let window = match self.eviction_window {
            Some(window) => window,
            None => return,
        };

        let stale: Vec<TrackId> = self
            .last_seen
            .iter()
            .filter(|(_, &seen)| frame.saturating_sub(seen) > window)
            .map(|(id, _)| *id)
            .collect();

        for id in stale {
            self.last_seen.remove(&id);
            self.track_state.remove(&id);
        }
    }
}

use crate::crossing::CrossingEvent;
use crate::vehicle::ClassCounts;

/// Used when the source reports no usable frame rate.
pub const FALLBACK_FPS: f64 = 30.0;

#[inline]
pub fn effective_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        FALLBACK_FPS
    }
}

/// Whole minutes needed to cover the video, a started minute counts as one.
pub fn total_minutes(total_frames: u64, fps: f64) -> usize {
    let seconds = total_frames as f64 / effective_fps(fps);
    let minutes = (seconds / 60.0).ceil() as usize;
    minutes.max(1)
}

#[inline]
pub fn elapsed_seconds(frame_count: u64, fps: f64) -> f64 {
    frame_count as f64 / effective_fps(fps)
}

pub fn minute_index(frame_count: u64, fps: f64, total_minutes: usize) -> usize {
    let minute = (elapsed_seconds(frame_count, fps) / 60.0).floor() as usize;
    minute.min(total_minutes.saturating_sub(1))
}

/// Extends with empty minutes or truncates so `buckets.len() == total_minutes`.
#[inline]
pub fn reconcile_minutes(buckets: &mut Vec<ClassCounts>, total_minutes: usize) {
    buckets.resize(total_minutes, ClassCounts::default());
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    fps: f64,
    counters: ClassCounts,
    minutes: Vec<ClassCounts>,
}

impl Aggregator {
    pub fn new(fps: f64, total_minutes: usize) -> Self {
        Self::restore(fps, ClassCounts::default(), Vec::new(), total_minutes)
    }

    pub fn restore(
        fps: f64,
        counters: ClassCounts,
        mut minutes: Vec<ClassCounts>,
        total_minutes: usize,
    ) -> Self {
        reconcile_minutes(&mut minutes, total_minutes.max(1));

        Self {
            fps: effective_fps(fps),
            counters,
            minutes,
        }
    }

    #[inline]
    pub fn fps(&self) -> f64 {
        self.fps
    }

    #[inline]
    pub fn counters(&self) -> &ClassCounts {
        &self.counters
    }

    #[inline]
    pub fn minutes(&self) -> &[ClassCounts] {
        &self.minutes
    }

    #[inline]
    pub fn current_minute(&self, frame_count: u64) -> usize {
        minute_index(frame_count, self.fps, self.minutes.len())
    }

    /// Counts one event, returns the minute bucket it landed in.
    pub fn record(&mut self, event: &CrossingEvent) -> usize {
        let minute = self.current_minute(event.frame);
        self.counters.increment(event.class);
        self.minutes[minute].increment(event.class);
        minute
    }
}

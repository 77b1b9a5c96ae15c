use serde_derive::{Deserialize, Serialize};

use crate::aggregate;
use crate::config::{ReportConfig, Thresholds};
use crate::snapshot::{ProgressSnapshot, RunStatus};
use crate::vehicle::ClassCounts;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Density {
    FreeFlowing,
    Moderate,
    Congested,
}

impl Density {
    #[inline]
    fn from_rate(total: u64, span: u64, thresholds: &Thresholds) -> Self {
        if total > thresholds.congested_above.saturating_mul(span) {
            Density::Congested
        } else if total < thresholds.free_flowing_below.saturating_mul(span) {
            Density::FreeFlowing
        } else {
            Density::Moderate
        }
    }
}

/// Classifies multi-minute intervals, thresholds scale with the interval span.
#[derive(Debug, Clone, Copy)]
pub struct IntervalClassifier {
    pub thresholds: Thresholds,
}

impl IntervalClassifier {
    #[inline]
    pub fn classify(&self, total: u64, span: usize) -> Density {
        Density::from_rate(total, span as u64, &self.thresholds)
    }
}

impl Default for IntervalClassifier {
    fn default() -> Self {
        Self {
            thresholds: ReportConfig::default().interval_thresholds,
        }
    }
}

/// Classifies single-minute totals for the trend series. Deliberately not
/// derived from the interval thresholds.
#[derive(Debug, Clone, Copy)]
pub struct MinuteClassifier {
    pub thresholds: Thresholds,
}

impl MinuteClassifier {
    #[inline]
    pub fn classify(&self, total: u64) -> Density {
        Density::from_rate(total, 1, &self.thresholds)
    }
}

impl Default for MinuteClassifier {
    fn default() -> Self {
        Self {
            thresholds: ReportConfig::default().minute_thresholds,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IntervalTotals {
    pub counts: ClassCounts,
    pub total: u64,
    pub density: Density,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IntervalRow {
    pub label: String,
    pub start_minute: usize,
    pub end_minute: usize,
    /// `None` until the interval has fully elapsed.
    pub summary: Option<IntervalTotals>,
}

pub fn interval_summary(
    minutes: &[ClassCounts],
    current_minute: usize,
    width: usize,
    finished: bool,
    classifier: &IntervalClassifier,
) -> Vec<IntervalRow> {
    let width = width.max(1);
    let total_minutes = minutes.len();
    let num_intervals = (total_minutes + width - 1) / width;

    (0..num_intervals)
        .map(|idx| {
            let start = idx * width;
            let end = ((idx + 1) * width).min(total_minutes);
            let elapsed = current_minute + 1 >= (idx + 1) * width;

            let summary = if elapsed || finished {
                let mut counts = ClassCounts::default();
                for minute in &minutes[start..end] {
                    counts.add(minute);
                }
                let total = counts.total();

                Some(IntervalTotals {
                    counts,
                    total,
                    density: classifier.classify(total, end - start),
                })
            } else {
                None
            };

            IntervalRow {
                label: format!("{}-{}", start + 1, end),
                start_minute: start,
                end_minute: end,
                summary,
            }
        })
        .collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrendPoint {
    /// 1-based minute number.
    pub minute: usize,
    pub total: u64,
    pub density: Density,
}

pub fn minute_trend(minutes: &[ClassCounts], classifier: &MinuteClassifier) -> Vec<TrendPoint> {
    minutes
        .iter()
        .enumerate()
        .map(|(idx, counts)| {
            let total = counts.total();
            TrendPoint {
                minute: idx + 1,
                total,
                density: classifier.classify(total),
            }
        })
        .collect()
}

#[inline]
pub fn format_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Everything the presentation layer shows, derived from one snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Report {
    pub status: RunStatus,
    pub frame_count: u64,
    pub total_frames: u64,
    pub elapsed: String,
    pub progress: f64,
    pub counters: ClassCounts,
    pub intervals: Vec<IntervalRow>,
    pub trend: Vec<TrendPoint>,
}

impl Report {
    pub fn from_snapshot(
        snapshot: &ProgressSnapshot,
        fps: f64,
        total_frames: u64,
        config: &ReportConfig,
    ) -> Self {
        let current_minute =
            aggregate::minute_index(snapshot.frame_count, fps, snapshot.minute_buckets.len());
        let interval_classifier = IntervalClassifier {
            thresholds: config.interval_thresholds,
        };
        let minute_classifier = MinuteClassifier {
            thresholds: config.minute_thresholds,
        };

        let progress = if total_frames > 0 {
            (snapshot.frame_count as f64 / total_frames as f64).min(1.0)
        } else {
            0.0
        };

        Self {
            status: snapshot.status,
            frame_count: snapshot.frame_count,
            total_frames,
            elapsed: format_elapsed(aggregate::elapsed_seconds(snapshot.frame_count, fps)),
            progress,
            counters: snapshot.counters,
            intervals: interval_summary(
                &snapshot.minute_buckets,
                current_minute,
                config.interval_minutes,
                snapshot.status == RunStatus::Done,
                &interval_classifier,
            ),
            trend: minute_trend(&snapshot.minute_buckets, &minute_classifier),
        }
    }
}

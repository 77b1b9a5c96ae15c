use crate::detection::TrackedDetection;

pub struct Frame {
    /// Processed-frame count at this step, drives elapsed time.
    pub index: u64,
    pub detections: Vec<TrackedDetection>,
}

impl Frame {
    #[inline]
    pub fn new(index: u64, detections: Vec<TrackedDetection>) -> Self {
        Self { index, detections }
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &TrackedDetection> {
        self.detections.iter()
    }
}

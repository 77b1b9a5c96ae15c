use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use crate::detection::TrackedDetection;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub frame_rate: f64,
    pub total_frames: u64,
    pub width: u32,
    pub height: u32,
}

/// A seekable, strictly forward stream of frames.
pub trait VideoSource {
    type Frame;

    fn info(&self) -> VideoInfo;
    fn seek(&mut self, frame: u64) -> Result<(), Error>;
    /// `Ok(None)` at end of stream.
    fn read_next(&mut self) -> Result<Option<Self::Frame>, Error>;

    /// Advances past up to `n` frames without handing them out, returns how
    /// many were actually skipped.
    fn skip(&mut self, n: u64) -> Result<u64, Error> {
        let mut skipped = 0;
        while skipped < n {
            if self.read_next()?.is_none() {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }
}

/// The external detector + tracker, assigning track ids to objects.
pub trait ObjectTracker<F> {
    fn track(&mut self, frame: &F) -> Result<Vec<TrackedDetection>, Error>;
}

/// Passes recorded tracker output through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Replay;

impl ObjectTracker<Vec<TrackedDetection>> for Replay {
    #[inline]
    fn track(&mut self, frame: &Vec<TrackedDetection>) -> Result<Vec<TrackedDetection>, Error> {
        Ok(frame.clone())
    }
}

/// Recorded tracker output, one frame per line: `<offset>: <json array>`.
pub struct TrackLog {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    position: u64,
    info: VideoInfo,
}

impl TrackLog {
    pub fn open<P: AsRef<Path>>(path: P, frame_rate: f64, dims: (u32, u32)) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let total_frames = BufReader::new(File::open(&path)?).lines().count() as u64;

        Ok(Self {
            lines: BufReader::new(File::open(&path)?).lines(),
            path,
            position: 0,
            info: VideoInfo {
                frame_rate,
                total_frames,
                width: dims.0,
                height: dims.1,
            },
        })
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    fn rewind(&mut self) -> Result<(), Error> {
        self.lines = BufReader::new(File::open(&self.path)?).lines();
        self.position = 0;
        Ok(())
    }

    fn parse_line(line: &str) -> Result<Vec<TrackedDetection>, Error> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Vec::new());
        }

        let payload = match line.find(':') {
            Some(idx) if !line[..idx].contains(['[', '{']) => &line[idx + 1..],
            _ => line,
        };

        let records: Vec<serde_json::Value> = serde_json::from_str(payload.trim())?;
        Ok(records.into_iter().map(TrackedDetection::from_value).collect())
    }
}

impl VideoSource for TrackLog {
    type Frame = Vec<TrackedDetection>;

    #[inline]
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn seek(&mut self, frame: u64) -> Result<(), Error> {
        if frame < self.position {
            self.rewind()?;
        }
        while self.position < frame {
            match self.lines.next() {
                Some(line) => {
                    line?;
                    self.position += 1;
                }
                None => break,
            }
        }
        Ok(())
    }

    fn read_next(&mut self) -> Result<Option<Self::Frame>, Error> {
        let line = match self.lines.next() {
            Some(line) => line?,
            None => return Ok(None),
        };
        self.position += 1;

        Self::parse_line(&line).map(Some)
    }

    fn skip(&mut self, n: u64) -> Result<u64, Error> {
        let target = self.position + n;
        let before = self.position;
        self.seek(target)?;
        Ok(self.position - before)
    }
}

#[cfg(feature = "opencv")]
pub use self::capture::OpencvSource;

#[cfg(feature = "opencv")]
mod capture {
    use opencv::{core::Mat, prelude::*, videoio};

    use super::{VideoInfo, VideoSource};
    use crate::aggregate;
    use crate::error::Error;

    /// Decodes frames with OpenCV; skipped frames are grabbed, not decoded.
    pub struct OpencvSource {
        cam: videoio::VideoCapture,
        info: VideoInfo,
    }

    impl OpencvSource {
        pub fn open(path: &str) -> Result<Self, Error> {
            let cam = videoio::VideoCapture::from_file(path, videoio::CAP_ANY)?;
            if !videoio::VideoCapture::is_opened(&cam)? {
                return Err(Error::UnreadableSource(format!("unable to open {}", path)));
            }

            let info = VideoInfo {
                frame_rate: aggregate::effective_fps(cam.get(videoio::CAP_PROP_FPS)?),
                total_frames: cam.get(videoio::CAP_PROP_FRAME_COUNT)?.max(0.0) as u64,
                width: cam.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32,
                height: cam.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32,
            };

            Ok(Self { cam, info })
        }
    }

    impl VideoSource for OpencvSource {
        type Frame = Mat;

        #[inline]
        fn info(&self) -> VideoInfo {
            self.info
        }

        fn seek(&mut self, frame: u64) -> Result<(), Error> {
            self.cam.set(videoio::CAP_PROP_POS_FRAMES, frame as f64)?;
            Ok(())
        }

        fn read_next(&mut self) -> Result<Option<Mat>, Error> {
            let mut frame = Mat::default();
            if !self.cam.read(&mut frame)? || frame.rows() == 0 || frame.cols() == 0 {
                return Ok(None);
            }
            Ok(Some(frame))
        }

        fn skip(&mut self, n: u64) -> Result<u64, Error> {
            let mut skipped = 0;
            while skipped < n && self.cam.grab()? {
                skipped += 1;
            }
            Ok(skipped)
        }
    }
}

use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub line: LineConfig,
    pub counting: CountingConfig,
    pub report: ReportConfig,
    pub limits: LimitsConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Counting line endpoints in frame pixels. Only `y1` is the threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Require the box centre to lie within `[x1, x2]`.
    pub gate_horizontal: bool,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            x1: 100.0,
            y1: 600.0,
            x2: 1550.0,
            y2: 600.0,
            gate_horizontal: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountingConfig {
    /// Frames advanced per decoded frame.
    pub speed_factor: u64,
    /// Steps between checkpoint writes.
    pub checkpoint_every: u64,
    /// Drop track positions unseen for more than this many frames.
    pub eviction_window: Option<u64>,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            speed_factor: 1,
            checkpoint_every: 1,
            eviction_window: None,
        }
    }
}

/// Per-minute vehicle rates separating the three density classes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub congested_above: u64,
    pub free_flowing_below: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub interval_minutes: usize,
    pub interval_thresholds: Thresholds,
    pub minute_thresholds: Thresholds,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            interval_thresholds: Thresholds {
                congested_above: 600,
                free_flowing_below: 400,
            },
            minute_thresholds: Thresholds {
                congested_above: 80,
                free_flowing_below: 60,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_file_size_mb: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("linecount-runs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "linecount=info".to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.counting.speed_factor == 0 {
            return Err(Error::InvalidConfig("speed_factor must be at least 1".into()));
        }
        if self.counting.checkpoint_every == 0 {
            return Err(Error::InvalidConfig(
                "checkpoint_every must be at least 1".into(),
            ));
        }
        if self.report.interval_minutes == 0 {
            return Err(Error::InvalidConfig(
                "interval_minutes must be at least 1".into(),
            ));
        }
        for (name, t) in [
            ("interval_thresholds", self.report.interval_thresholds),
            ("minute_thresholds", self.report.minute_thresholds),
        ] {
            if t.free_flowing_below > t.congested_above {
                return Err(Error::InvalidConfig(format!(
                    "{}: free_flowing_below exceeds congested_above",
                    name
                )));
            }
        }
        Ok(())
    }
}

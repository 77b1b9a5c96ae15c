use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File too large ({size_mb:.1} MB), maximum is {max_mb} MB")]
    FileTooLarge { size_mb: f64, max_mb: u64 },

    #[error("Unreadable video source: {0}")]
    UnreadableSource(String),

    #[error("Malformed detection for track {track_id:?}: {reason}")]
    MalformedDetection {
        track_id: Option<i64>,
        reason: &'static str,
    },

    #[error("Run store unavailable at {}: {source}", path.display())]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported snapshot version {0}")]
    UnsupportedSnapshotVersion(u32),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config Error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[cfg(feature = "opencv")]
    #[error("OpenCV Error: {0}")]
    Video(#[from] opencv::Error),
}

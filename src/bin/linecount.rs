use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use linecount::store::FileStore;
use linecount::video::{Replay, TrackLog, VideoSource};
use linecount::{Config, ResumeController, SnapshotKey};

#[derive(Parser, Debug)]
#[command(name = "linecount", about = "Resumable line-crossing vehicle counter")]
struct Args {
    /// YAML configuration, defaults apply when omitted
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Overrides `store.root` from the configuration
    #[arg(long, global = true, value_name = "DIR")]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fingerprint a video and register it for analysis
    Upload {
        #[arg(long)]
        user: String,
        video: PathBuf,
    },
    /// Count crossings from recorded tracker output, resuming where the last run stopped
    Analyze {
        #[arg(long)]
        user: String,
        /// Fingerprint printed by `upload`
        #[arg(long)]
        fingerprint: String,
        /// One line of tracked detections per decoded frame
        #[arg(long, value_name = "PATH")]
        tracks: PathBuf,
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
        #[arg(long, default_value_t = 1920)]
        width: u32,
        #[arg(long, default_value_t = 1080)]
        height: u32,
        /// Overrides `counting.speed_factor`
        #[arg(long)]
        speed: Option<u64>,
    },
    /// Print the report of a stored run as JSON
    Report {
        #[arg(long)]
        user: String,
        #[arg(long)]
        fingerprint: String,
        #[arg(long, value_name = "PATH")]
        tracks: PathBuf,
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
    },
    /// Show the most recently updated run of a user
    Latest {
        #[arg(long)]
        user: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(root) = args.store {
        config.store.root = root;
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
            |_| tracing_subscriber::EnvFilter::new(config.logging.filter.as_str()),
        ))
        .init();

    if let Command::Analyze {
        speed: Some(speed), ..
    } = &args.command
    {
        config.counting.speed_factor = *speed;
    }

    let store = FileStore::open(&config.store.root)?;
    let mut controller = ResumeController::new(store, config)?;

    match args.command {
        Command::Upload { user, video } => {
            let key = controller.register_upload(&user, &video)?;
            println!("{}", key.fingerprint());
        }
        Command::Analyze {
            user,
            fingerprint,
            tracks,
            fps,
            width,
            height,
            ..
        } => {
            let key = SnapshotKey::new(&user, &fingerprint);
            let source_path = tracks.to_string_lossy().into_owned();
            let mut source = TrackLog::open(&tracks, fps, (width, height))?;
            let done = controller.run(&key, &source_path, &mut source, &mut Replay)?;
            info!("{}: {} at frame {}", key, done.status, done.frame_count);
            println!("{}", serde_json::to_string_pretty(&done.counters)?);
        }
        Command::Report {
            user,
            fingerprint,
            tracks,
            fps,
        } => {
            let key = SnapshotKey::new(&user, &fingerprint);
            let video = TrackLog::open(&tracks, fps, (0, 0))?.info();
            match controller.report(&key, video)? {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => bail!("no run stored for {}", key),
            }
        }
        Command::Latest { user } => match controller.latest_for_user(&user)? {
            Some(run) => println!(
                "{}\t{}\t{}\t{}",
                run.fingerprint,
                run.status,
                run.updated_at.to_rfc3339(),
                run.source_path
            ),
            None => println!("no runs for {}", user),
        },
    }

    controller.into_store().close()?;
    Ok(())
}

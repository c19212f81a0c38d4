//! weapon_watch - webcam weapon-detection monitor
//!
//! This daemon:
//! 1. Opens the camera (probing indices when none is given)
//! 2. Loads the detection model, falling back once to an alternate model
//! 3. Runs every Nth frame through the detector and alert policy
//! 4. Writes an annotated alert image at most once per cooldown window
//! 5. Stops on `q` in the command file, the stop file, or Ctrl-C

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use weapon_watch::config::model_path;
use weapon_watch::control::install_interrupt_handler;
use weapon_watch::{run_session, CameraSelector, StopSignal, WatchConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML by extension).
    #[arg(long, env = "WEAPON_WATCH_CONFIG")]
    config: Option<PathBuf>,
    /// Camera: "auto", a device index, or stub://<name>.
    #[arg(long)]
    camera: Option<CameraSelector>,
    /// ONNX model path ("none" for the stub detector).
    #[arg(long)]
    model: Option<String>,
    /// Alternate model tried once if the primary fails to load.
    #[arg(long)]
    fallback_model: Option<String>,
    /// Seconds between two alerts.
    #[arg(long)]
    cooldown: Option<u64>,
    /// Process one of every N frames.
    #[arg(long)]
    skip_frames: Option<u64>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Directory for alert images.
    #[arg(long)]
    alert_dir: Option<PathBuf>,
    /// Do not write periodic frame snapshots.
    #[arg(long)]
    no_snapshots: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Some(path) = &args.config {
        std::env::set_var("WEAPON_WATCH_CONFIG", path);
    }
    let mut cfg = WatchConfig::load()?;
    apply_args(&mut cfg, args);
    cfg.validate()?;

    let stop = StopSignal::new(&cfg.control.stop_file);
    install_interrupt_handler(&stop)?;

    log::info!(
        "weapon_watch {} camera={} cooldown={}s skip={}",
        env!("CARGO_PKG_VERSION"),
        cfg.camera.selector,
        cfg.policy.cooldown.as_secs(),
        cfg.monitor.skip_frames
    );

    let summary = run_session(&cfg, &stop)?;
    log::info!(
        "done: {} frames, {} alerts ({:?})",
        summary.frames,
        summary.alerts,
        summary.stop_reason
    );
    Ok(())
}

fn apply_args(cfg: &mut WatchConfig, args: Args) {
    if let Some(camera) = args.camera {
        cfg.camera.selector = camera;
    }
    if let Some(model) = args.model {
        cfg.model.path = model_path(&model);
    }
    if let Some(model) = args.fallback_model {
        cfg.model.fallback_path = model_path(&model);
    }
    if let Some(cooldown) = args.cooldown {
        cfg.policy.cooldown = std::time::Duration::from_secs(cooldown);
    }
    if let Some(skip) = args.skip_frames {
        cfg.monitor.skip_frames = skip;
    }
    if args.max_frames.is_some() {
        cfg.monitor.max_frames = args.max_frames;
    }
    if let Some(dir) = args.alert_dir {
        cfg.alert_dir = dir;
    }
    if args.no_snapshots {
        cfg.snapshots.enabled = false;
    }
}

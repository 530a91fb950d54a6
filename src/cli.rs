use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::config::{LoopPolicy, PlaybackConfig};

const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Formats: GIF, WebP (via image 0.25)\n",
    "Target:  ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Headless animated GIF/WebP player
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Animated image to play (GIF or WebP)
    #[arg(value_name = "FILE")]
    pub file_path: PathBuf,

    /// Stop after N loops (0 = forever)
    #[arg(short = 'n', long = "loops", value_name = "N", conflicts_with = "infinite")]
    pub loops: Option<u32>,

    /// Loop forever, ignoring the file's loop count
    #[arg(short = 'i', long = "infinite")]
    pub infinite: bool,

    /// Mask frames to the largest inscribed circle
    #[arg(long = "circle")]
    pub circle: bool,

    /// Paint alpha (0-255)
    #[arg(short = 'a', long = "alpha", value_name = "A")]
    pub alpha: Option<u8>,

    /// Nearest-neighbor scaling instead of bilinear
    #[arg(long = "no-filter")]
    pub no_filter: bool,

    /// Canvas size (default: image size)
    #[arg(short = 's', long = "size", value_name = "WxH", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Write every swapped frame as PNG into DIR
    #[arg(short = 'o', long = "out", value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Stop after SECS seconds
    #[arg(short = 'd', long = "duration", value_name = "SECS")]
    pub duration: Option<f64>,

    /// Playback config JSON (flags override its values)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging to file (default: animseq.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// Config file (if any) with command-line overrides applied
    pub fn playback_config(&self) -> Result<PlaybackConfig> {
        let mut config = match &self.config {
            Some(path) => PlaybackConfig::load(path)?,
            None => PlaybackConfig::default(),
        };

        if self.infinite {
            config.loop_policy = LoopPolicy::Infinite;
        } else if let Some(n) = self.loops {
            config.loop_policy = LoopPolicy::Finite(n);
        }
        if self.circle {
            config.circle_mask = true;
        }
        if let Some(alpha) = self.alpha {
            config.alpha = alpha;
        }
        if self.no_filter {
            config.filter = false;
        }
        Ok(config)
    }
}

/// Parse `WxH` (also accepts `X` and `*`)
fn parse_size(raw: &str) -> Result<(u32, u32), String> {
    let (w, h) = raw
        .split_once(['x', 'X', '*'])
        .ok_or_else(|| format!("expected WxH, got '{}'", raw))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("bad width '{}'", w))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("bad height '{}'", h))?;
    if w == 0 || h == 0 {
        return Err("size must be non-zero".to_string());
    }
    Ok((w, h))
}

//! Headless player - drives a `PlaybackEngine` without a window.
//!
//! The runner is the engine's host: repaint requests arrive as `HostEvent`s
//! over a channel, the loop sleeps until the earliest requested deadline, then
//! calls `on_tick()` and `present()` into a software `Canvas`.

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, trace, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cli::Args;
use crate::config::PlaybackConfig;
use crate::core::buffer_pool::BufferPool;
use crate::core::clock::MonotonicClock;
use crate::core::player::PlaybackEngine;
use crate::entities::compositor::Canvas;
use crate::entities::loader::AnimatedImageSource;
use crate::entities::traits::{Clock, FrameSource, RepaintScheduler};

/// Give up when nothing is scheduled for this long (e.g. after a decode error)
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Messages from the engine (and its finished listener) to the host loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    RepaintAt(u64),
    RepaintNow,
    Finished,
}

/// `RepaintScheduler` that forwards requests into a channel
pub struct ChannelHost {
    tx: Sender<HostEvent>,
}

impl ChannelHost {
    pub fn channel() -> (Self, Receiver<HostEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    pub fn sender(&self) -> Sender<HostEvent> {
        self.tx.clone()
    }
}

impl RepaintScheduler for ChannelHost {
    fn request_repaint_at(&self, at_ms: u64) {
        let _ = self.tx.send(HostEvent::RepaintAt(at_ms));
    }

    fn request_repaint_now(&self) {
        let _ = self.tx.send(HostEvent::RepaintNow);
    }
}

/// What a run did
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Frames swapped in after start
    pub swaps: u64,
    /// Completed loops when the run ended
    pub loops: u32,
    /// Finished notification received
    pub finished: bool,
    /// PNGs written
    pub written: Vec<PathBuf>,
}

/// Play `args.file_path` until finished, duration elapsed or idle.
pub fn run_app(args: Args) -> Result<RunSummary> {
    let config = args.playback_config()?;
    let duration = args.duration.map(Duration::from_secs_f64);
    play_file(&args.file_path, config, args.size, args.out_dir.as_deref(), duration)
}

pub fn play_file(
    path: &Path,
    config: PlaybackConfig,
    size: Option<(u32, u32)>,
    out_dir: Option<&Path>,
    duration: Option<Duration>,
) -> Result<RunSummary> {
    info!("Input file: {}", path.display());
    let source = AnimatedImageSource::open(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    info!(
        "{}x{}, {} frames, file loop count {}",
        source.width(),
        source.height(),
        source.frame_count(),
        source.default_loop_count()
    );

    if let Some(dir) = out_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output dir {}", dir.display()))?;
    }

    let (host, events) = ChannelHost::channel();
    let finished_tx = host.sender();
    let clock = Arc::new(MonotonicClock::new());

    let engine = PlaybackEngine::builder(Arc::new(source))
        .provider(Arc::new(BufferPool::new(2)))
        .clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .host(Arc::new(host))
        .config(config)
        .build()
        .context("Failed to create playback engine")?;
    engine.set_on_finished(move || {
        let _ = finished_tx.send(HostEvent::Finished);
    })?;

    let (width, height) =
        size.unwrap_or((engine.intrinsic_width(), engine.intrinsic_height()));
    let mut canvas = Canvas::new(width, height);
    let bounds = canvas.bounds();

    let mut summary = RunSummary::default();
    let stop_at = duration.map(|d| Instant::now() + d);
    let mut wake_at: Option<u64> = None;

    engine.start()?;
    info!("Playing into {}x{} canvas", width, height);

    loop {
        let now = Instant::now();
        if stop_at.is_some_and(|t| now >= t) {
            info!("Duration elapsed");
            break;
        }

        let mut timeout = match wake_at {
            Some(at) => Duration::from_millis(at.saturating_sub(clock.now_ms())),
            None => IDLE_TIMEOUT,
        };
        if let Some(t) = stop_at {
            timeout = timeout.min(t.saturating_duration_since(now));
        }

        match events.recv_timeout(timeout) {
            Ok(HostEvent::RepaintAt(at)) => {
                trace!("Wake-up requested at {} ms", at);
                wake_at = Some(wake_at.map_or(at, |w| w.min(at)));
            }
            Ok(HostEvent::RepaintNow) => {
                canvas.clear([0, 0, 0, 0]);
                let presented = engine.present(bounds, &mut canvas)?;
                if presented.swapped {
                    summary.swaps += 1;
                    debug!("Frame {} on screen (swap #{})", presented.frame, summary.swaps);
                    if let Some(dir) = out_dir {
                        let file = dir.join(format!("frame_{:05}.png", summary.swaps - 1));
                        canvas.save(&file)?;
                        summary.written.push(file);
                    }
                }
            }
            Ok(HostEvent::Finished) => {
                info!("Playback finished");
                summary.finished = true;
                break;
            }
            Err(RecvTimeoutError::Timeout) => match wake_at {
                Some(at) if clock.now_ms() >= at => {
                    wake_at = None;
                    engine.on_tick()?;
                }
                Some(_) => {}
                None if stop_at.is_none() => {
                    warn!("Nothing scheduled for {:?}, giving up", IDLE_TIMEOUT);
                    break;
                }
                None => {}
            },
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    summary.loops = engine.current_loop();
    engine.destroy()?;
    info!(
        "Done: {} swaps, {} loops, {} files written",
        summary.swaps,
        summary.loops,
        summary.written.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoopPolicy;
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::{Delay, Frame, Rgba, RgbaImage};

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("animseq_{}_{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_gif(path: &Path, colors: &[[u8; 4]], delay_ms: u32) {
        let file = std::fs::File::create(path).unwrap();
        let mut encoder = GifEncoder::new(file);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        let frames = colors.iter().map(|c| {
            Frame::from_parts(
                RgbaImage::from_pixel(8, 8, Rgba(*c)),
                0,
                0,
                Delay::from_numer_denom_ms(delay_ms, 1),
            )
        });
        encoder.encode_frames(frames).unwrap();
    }

    #[test]
    fn test_channel_host_forwards() {
        let (host, rx) = ChannelHost::channel();
        host.request_repaint_at(42);
        host.request_repaint_now();
        assert_eq!(rx.try_recv(), Ok(HostEvent::RepaintAt(42)));
        assert_eq!(rx.try_recv(), Ok(HostEvent::RepaintNow));
    }

    #[test]
    fn test_plays_finite_loops_and_writes_frames() {
        let dir = temp_dir("finite");
        let gif = dir.join("anim.gif");
        write_gif(&gif, &[[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]], 20);

        let config = PlaybackConfig {
            loop_policy: LoopPolicy::Finite(2),
            ..PlaybackConfig::default()
        };
        let out = dir.join("out");
        let summary = play_file(&gif, config, Some((16, 16)), Some(&out), Some(Duration::from_secs(20)))
            .unwrap();

        assert!(summary.finished);
        assert_eq!(summary.swaps, 6);
        assert_eq!(summary.loops, 2);
        assert_eq!(summary.written.len(), 6);
        assert!(out.join("frame_00000.png").exists());
        assert!(out.join("frame_00005.png").exists());

        let saved = image::open(out.join("frame_00001.png")).unwrap().to_rgba8();
        assert_eq!(saved.dimensions(), (16, 16));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_duration_bounds_infinite_playback() {
        let dir = temp_dir("infinite");
        let gif = dir.join("anim.gif");
        write_gif(&gif, &[[10, 10, 10, 255], [200, 200, 200, 255]], 20);

        let config = PlaybackConfig {
            loop_policy: LoopPolicy::Infinite,
            ..PlaybackConfig::default()
        };
        let started = Instant::now();
        let summary = play_file(&gif, config, None, None, Some(Duration::from_millis(300))).unwrap();

        assert!(!summary.finished);
        assert!(summary.swaps >= 2, "only {} swaps", summary.swaps);
        assert!(started.elapsed() < Duration::from_secs(5));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_errors() {
        let result = play_file(
            Path::new("/nonexistent/anim.gif"),
            PlaybackConfig::default(),
            None,
            None,
            None,
        );
        assert!(result.is_err());
    }
}

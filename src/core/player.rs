//! Playback engine: double-buffered decode/swap state machine
//!
//! **Architecture**: Two pixel buffers, "front" (shown) and "back" (being
//! decoded). The decode worker only writes the back buffer, the presenter only
//! reads the front buffer, and their roles are exchanged only on the
//! presentation path, under the engine lock, once a decode has been published.
//!
//! **Why**: The render step must never wait on decode, decoded pixels must
//! never change while being painted, and teardown may race an in-flight
//! decode without leaking or double-releasing a buffer.
//!
//! # State Machine
//!
//! ```text
//! Idle --start--> Scheduled --task--> Decoding --publish--> WaitingToSwap
//!                     ^                                          |
//!                     |                              deadline (on_tick/present)
//!                     |                                          v
//!                     +------------- swap in present() ---- ReadyToSwap
//! ```
//!
//! `stop()` returns to Idle from any state. A decode finishing after a stop
//! sees it is no longer the expected generation and discards its result.
//!
//! # Buffer Lending
//!
//! Work that touches pixels outside the lock (decode, paint) moves the buffer
//! out of its slot and puts it back under the lock. `destroy()` releases what
//! is still in the slots; a borrower that comes back to a destroyed engine
//! releases its buffer itself.
//!
//! # Timing Model
//!
//! The swap deadline of frame N is `last_swap + delay(N)`, where `last_swap`
//! is when frame N-1 became visible. Decoding is strictly sequential: frame N
//! starts decoding only after N-1 was swapped in, so memory stays at two
//! buffers.

use log::{debug, error, info, trace, warn};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{DelayPolicy, PlaybackConfig};
use crate::core::clock::MonotonicClock;
use crate::core::workers::DecodeWorker;
use crate::entities::frame::{PixelBuffer, Rect};
use crate::entities::traits::{
    AllocatingProvider, BufferProvider, Clock, DrawStyle, FrameSource, NoopRepaint, Presenter,
    RepaintScheduler, TaskQueue,
};
use crate::error::EngineError;

pub use crate::config::LoopPolicy;

/// Swap deadline meaning "never" (decode failed, playback paused)
const NEVER: u64 = u64::MAX;

type FinishedCallback = Arc<dyn Fn() + Send + Sync>;

/// Immutable sequence properties read from the frame source at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceDescriptor {
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
    pub default_loop_count: u32,
    pub opaque: bool,
}

/// Playback phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scheduled,     // decode task posted, not started
    Decoding,      // back buffer lent to the decode task
    WaitingToSwap, // decoded, deadline not reached
    ReadyToSwap,   // next present() swaps
}

/// Whether painted content covers its bounds completely
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opacity {
    Opaque,
    Translucent,
}

/// Result of one `present()` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presented {
    /// Frame index in the front buffer after this call
    pub frame: usize,
    /// Front/back roles were exchanged
    pub swapped: bool,
    /// This swap completed the final loop
    pub finished: bool,
}

/// All mutable engine state, guarded by one mutex
struct PlaybackState {
    slots: [Option<PixelBuffer>; 2], // None = lent to decode task or presenter
    front: usize,                    // index of the front slot
    phase: Phase,
    destroyed: bool,
    next_frame: Option<usize>, // None = not running
    displayed_frame: usize,
    current_loop: u32,
    loop_policy: LoopPolicy,
    style: DrawStyle,
    visible: bool,
    last_swap: u64,
    next_swap: u64,
    on_finished: Option<FinishedCallback>,
}

impl PlaybackState {
    fn back(&self) -> usize {
        self.front ^ 1
    }

    fn is_running(&self) -> bool {
        self.next_frame.is_some() && !self.destroyed
    }

    fn check_destroyed(&self) -> Result<(), EngineError> {
        if self.destroyed {
            Err(EngineError::Destroyed)
        } else {
            Ok(())
        }
    }
}

/// State shared between the engine handle and its queued decode tasks
struct Shared {
    source: Arc<dyn FrameSource>,
    provider: Arc<dyn BufferProvider>,
    queue: Arc<dyn TaskQueue>,
    clock: Arc<dyn Clock>,
    host: Arc<dyn RepaintScheduler>,
    descriptor: SequenceDescriptor,
    delays: DelayPolicy,
    state: Mutex<PlaybackState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Advance to the next frame and post its decode
    fn schedule_decode_locked(self: &Arc<Self>, st: &mut PlaybackState) {
        let next = st
            .next_frame
            .map_or(0, |n| (n + 1) % self.descriptor.frame_count);
        st.next_frame = Some(next);
        st.phase = Phase::Scheduled;
        trace!("Scheduling decode of frame {}", next);

        let shared = Arc::clone(self);
        self.queue.post(Box::new(move || shared.decode_next()));
    }

    /// Loop-termination predicate, evaluated when the final frame became front
    fn loop_complete(&self, st: &PlaybackState) -> bool {
        match st.loop_policy {
            LoopPolicy::Finite(n) => st.current_loop == n,
            LoopPolicy::SourceDefault => st.current_loop == self.descriptor.default_loop_count,
            LoopPolicy::Infinite => false,
        }
    }

    /// Decode task body. Runs on the task queue, only writes the back buffer.
    fn decode_next(self: &Arc<Self>) {
        let (frame, mut buffer) = {
            let mut st = self.lock();
            if st.destroyed || st.phase != Phase::Scheduled {
                return;
            }
            let Some(frame) = st.next_frame else {
                return;
            };
            let back = st.back();
            let Some(buffer) = st.slots[back].take() else {
                warn!("Back buffer unavailable, skipping decode of frame {}", frame);
                return;
            };
            st.phase = Phase::Decoding;
            (frame, buffer)
        };

        // Slow part, unlocked. The buffer last held frame - 2.
        let delay = match self.source.get_frame(frame, &mut buffer, frame.checked_sub(2)) {
            Ok(reported) => Some(self.delays.effective(reported)),
            Err(e) => {
                error!("Exception during decode of frame {}: {}", frame, e);
                None
            }
        };

        let mut wake_at = None;
        let leftover = {
            let mut st = self.lock();
            if st.destroyed {
                Some(buffer)
            } else {
                let back = st.back();
                st.slots[back] = Some(buffer);
                if st.next_frame.is_some() && st.phase == Phase::Decoding {
                    let last = st.last_swap;
                    st.next_swap = delay.map_or(NEVER, |d| last.saturating_add(d));
                    st.phase = Phase::WaitingToSwap;
                    if st.next_swap != NEVER {
                        wake_at = Some(st.next_swap);
                    }
                    trace!("Frame {} decoded, swap at {}", frame, st.next_swap);
                } else {
                    trace!("Decode of frame {} superseded, discarding", frame);
                }
                None
            }
        };

        // No way back to the render thread once destroyed, release here
        if let Some(buffer) = leftover {
            debug!("Engine destroyed during decode, releasing back buffer {}", buffer.id());
            self.provider.release_buffer(buffer);
            return;
        }
        if let Some(at) = wake_at {
            self.host.request_repaint_at(at);
        }
    }
}

/// Acquire a buffer and check it against the engine's size/format contract
fn acquire_validated(
    provider: &dyn BufferProvider,
    width: u32,
    height: u32,
) -> Result<PixelBuffer, EngineError> {
    let buffer = provider.acquire_buffer(width, height);
    if buffer.satisfies(width, height) {
        return Ok(buffer);
    }
    let err = EngineError::InvalidBuffer {
        width: buffer.width(),
        height: buffer.height(),
        format: buffer.format(),
        min_width: width,
        min_height: height,
    };
    provider.release_buffer(buffer);
    Err(err)
}

/// Builder for [`PlaybackEngine`] with pluggable collaborators.
///
/// # Example
/// ```ignore
/// let engine = PlaybackEngine::builder(source)
///     .provider(Arc::new(BufferPool::new(4)))
///     .host(host)
///     .build()?;
/// ```
pub struct EngineBuilder {
    source: Arc<dyn FrameSource>,
    provider: Option<Arc<dyn BufferProvider>>,
    queue: Option<Arc<dyn TaskQueue>>,
    clock: Option<Arc<dyn Clock>>,
    host: Option<Arc<dyn RepaintScheduler>>,
    config: PlaybackConfig,
}

impl EngineBuilder {
    /// Buffer allocation strategy (default: allocate per request)
    pub fn provider(mut self, provider: Arc<dyn BufferProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Decode queue (default: the process-wide [`DecodeWorker`])
    pub fn queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Time source (default: [`MonotonicClock`])
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Repaint hooks (default: none)
    pub fn host(mut self, host: Arc<dyn RepaintScheduler>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn config(mut self, config: PlaybackConfig) -> Self {
        self.config = config;
        self
    }

    /// Acquire both buffers and decode frame 0 into front (blocks once).
    pub fn build(self) -> Result<PlaybackEngine, EngineError> {
        let source = self.source;
        let frame_count = source.frame_count();
        if frame_count == 0 {
            return Err(EngineError::EmptySequence);
        }
        let descriptor = SequenceDescriptor {
            width: source.width(),
            height: source.height(),
            frame_count,
            default_loop_count: source.default_loop_count(),
            opaque: source.is_opaque(),
        };
        let (width, height) = (descriptor.width, descriptor.height);

        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(AllocatingProvider) as Arc<dyn BufferProvider>);
        let mut front = acquire_validated(provider.as_ref(), width, height)?;
        let back = match acquire_validated(provider.as_ref(), width, height) {
            Ok(buffer) => buffer,
            Err(e) => {
                provider.release_buffer(front);
                return Err(e);
            }
        };

        if let Err(e) = source.get_frame(0, &mut front, None) {
            provider.release_buffer(front);
            provider.release_buffer(back);
            return Err(e.into());
        }

        let config = self.config;
        let state = PlaybackState {
            slots: [Some(front), Some(back)],
            front: 0,
            phase: Phase::Idle,
            destroyed: false,
            next_frame: None,
            displayed_frame: 0,
            current_loop: 0,
            loop_policy: config.loop_policy,
            style: DrawStyle {
                circle_mask: config.circle_mask,
                alpha: config.alpha,
                filter: config.filter,
                tint: config.tint,
            },
            visible: true,
            last_swap: 0,
            next_swap: 0,
            on_finished: None,
        };

        info!(
            "PlaybackEngine created: {}x{}, {} frames, default loops {}",
            width, height, frame_count, descriptor.default_loop_count
        );

        let queue: Arc<dyn TaskQueue> = match self.queue {
            Some(queue) => queue,
            None => DecodeWorker::shared(),
        };

        Ok(PlaybackEngine {
            shared: Arc::new(Shared {
                source,
                provider,
                queue,
                clock: self
                    .clock
                    .unwrap_or_else(|| Arc::new(MonotonicClock::new()) as Arc<dyn Clock>),
                host: self
                    .host
                    .unwrap_or_else(|| Arc::new(NoopRepaint) as Arc<dyn RepaintScheduler>),
                descriptor,
                delays: config.delay_policy(),
                state: Mutex::new(state),
            }),
        })
    }
}

/// Frame-sequence playback engine.
///
/// Control methods may be called from any thread; `present()` is meant to be
/// driven by the host's render thread. Dropping the engine destroys it.
pub struct PlaybackEngine {
    shared: Arc<Shared>,
}

impl PlaybackEngine {
    /// Engine with default queue, clock and host; `provider` defaults to
    /// [`AllocatingProvider`].
    pub fn new(
        source: Arc<dyn FrameSource>,
        provider: Option<Arc<dyn BufferProvider>>,
    ) -> Result<Self, EngineError> {
        let mut builder = Self::builder(source);
        if let Some(provider) = provider {
            builder = builder.provider(provider);
        }
        builder.build()
    }

    pub fn builder(source: Arc<dyn FrameSource>) -> EngineBuilder {
        EngineBuilder {
            source,
            provider: None,
            queue: None,
            clock: None,
            host: None,
            config: PlaybackConfig::default(),
        }
    }

    // === Control ===

    /// Begin playback from frame 0. No-op if already running.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut st = self.shared.lock();
        st.check_destroyed()?;
        if st.is_running() {
            return Ok(());
        }
        st.current_loop = 0;
        self.shared.schedule_decode_locked(&mut st);
        debug!("Playback started");
        Ok(())
    }

    /// Stop playback. An in-flight decode finishes but its result is discarded.
    pub fn stop(&self) -> Result<(), EngineError> {
        let mut st = self.shared.lock();
        st.check_destroyed()?;
        if st.is_running() {
            st.next_frame = None;
            st.phase = Phase::Idle;
            debug!("Playback stopped");
        }
        Ok(())
    }

    /// Host wake-up at a requested deadline: marks a due frame ready and asks
    /// for a repaint. Returns whether a repaint was requested.
    pub fn on_tick(&self) -> Result<bool, EngineError> {
        let now = self.shared.clock.now_ms();
        let promoted = {
            let mut st = self.shared.lock();
            st.check_destroyed()?;
            if st.is_running() && st.phase == Phase::WaitingToSwap && now >= st.next_swap {
                st.phase = Phase::ReadyToSwap;
                true
            } else {
                false
            }
        };
        if promoted {
            self.shared.host.request_repaint_now();
        }
        Ok(promoted)
    }

    /// Swap in the next frame if due, then paint the front buffer into `bounds`.
    ///
    /// Never blocks on decode. If the front buffer is currently being painted
    /// by another call, this call skips painting.
    pub fn present(
        &self,
        bounds: Rect,
        presenter: &mut dyn Presenter,
    ) -> Result<Presented, EngineError> {
        let shared = &self.shared;
        let now = shared.clock.now_ms();

        let (lent, style, frame, swapped, finished, callback) = {
            let mut st = shared.lock();
            st.check_destroyed()?;

            // A missed wake-up must not stall playback
            if st.phase == Phase::WaitingToSwap && now >= st.next_swap {
                st.phase = Phase::ReadyToSwap;
            }

            let mut swapped = false;
            let mut finished = false;
            let both_home = st.slots.iter().all(Option::is_some);
            if st.is_running() && st.phase == Phase::ReadyToSwap && both_home {
                if let Some(shown) = st.next_frame {
                    // Painting has completed, so the old front is free to decode into
                    st.front = st.back();
                    st.last_swap = now;
                    st.displayed_frame = shown;
                    swapped = true;

                    let mut keep_looping = true;
                    if shown == shared.descriptor.frame_count - 1 {
                        st.current_loop += 1;
                        keep_looping = !shared.loop_complete(&st);
                        debug!("Loop {} complete", st.current_loop);
                    }
                    if keep_looping {
                        shared.schedule_decode_locked(&mut st);
                    } else {
                        st.next_frame = None;
                        st.phase = Phase::Idle;
                        finished = true;
                    }
                    trace!("Swapped in frame {} at {}", shown, now);
                }
            }

            let front = st.front;
            let callback = if finished { st.on_finished.clone() } else { None };
            (
                st.slots[front].take(),
                st.style,
                st.displayed_frame,
                swapped,
                finished,
                callback,
            )
        };

        match lent {
            Some(buffer) => {
                let d = &shared.descriptor;
                presenter.draw(&buffer, Rect::from_size(d.width, d.height), bounds, &style);

                let leftover = {
                    let mut st = shared.lock();
                    if st.destroyed {
                        Some(buffer)
                    } else {
                        let front = st.front;
                        st.slots[front] = Some(buffer);
                        None
                    }
                };
                if let Some(buffer) = leftover {
                    debug!("Engine destroyed during present, releasing front buffer {}", buffer.id());
                    shared.provider.release_buffer(buffer);
                }
            }
            None => trace!("Front buffer busy, skipping draw"),
        }

        if finished {
            info!("Playback finished after {} loops", self.current_loop());
            shared.host.request_repaint_now();
            if let Some(callback) = callback {
                callback();
            }
        }

        Ok(Presented {
            frame,
            swapped,
            finished,
        })
    }

    /// Release both buffers and make the engine unusable.
    ///
    /// A back buffer lent to an in-flight decode is released by that decode
    /// when it completes.
    pub fn destroy(&self) -> Result<(), EngineError> {
        let (front, back) = {
            let mut st = self.shared.lock();
            if st.destroyed {
                return Err(EngineError::AlreadyDestroyed);
            }
            st.destroyed = true;
            st.on_finished = None;
            let front = st.front;
            let back = st.back();
            (st.slots[front].take(), st.slots[back].take())
        };

        let provider = &self.shared.provider;
        if let Some(buffer) = front {
            provider.release_buffer(buffer);
        }
        match back {
            Some(buffer) => provider.release_buffer(buffer),
            None => debug!("Back buffer lent to in-flight decode, release deferred"),
        }
        info!("PlaybackEngine destroyed");
        Ok(())
    }

    /// Visibility change: hidden stops, shown (re)starts.
    ///
    /// Returns whether visibility changed.
    pub fn set_visible(&self, visible: bool, restart: bool) -> Result<bool, EngineError> {
        let changed = {
            let mut st = self.shared.lock();
            st.check_destroyed()?;
            let changed = st.visible != visible;
            st.visible = visible;
            changed
        };

        if !visible {
            self.stop()?;
        } else if restart || changed {
            self.stop()?;
            self.start()?;
        } else if !self.is_running() {
            self.start()?;
        }
        Ok(changed)
    }

    // === Settings ===

    /// Takes effect at the next loop boundary
    pub fn set_loop_behavior(&self, policy: LoopPolicy) -> Result<(), EngineError> {
        let mut st = self.shared.lock();
        st.check_destroyed()?;
        st.loop_policy = policy;
        Ok(())
    }

    /// Loop `count` times (selects `LoopPolicy::Finite`)
    pub fn set_loop_count(&self, count: u32) -> Result<(), EngineError> {
        self.set_loop_behavior(LoopPolicy::Finite(count))
    }

    /// Mask painting to the largest circle inside the bounds
    pub fn set_circle_mask(&self, enabled: bool) -> Result<(), EngineError> {
        let mut st = self.shared.lock();
        st.check_destroyed()?;
        st.style.circle_mask = enabled;
        Ok(())
    }

    pub fn set_alpha(&self, alpha: u8) -> Result<(), EngineError> {
        let mut st = self.shared.lock();
        st.check_destroyed()?;
        st.style.alpha = alpha;
        Ok(())
    }

    pub fn set_filter(&self, filter: bool) -> Result<(), EngineError> {
        let mut st = self.shared.lock();
        st.check_destroyed()?;
        st.style.filter = filter;
        Ok(())
    }

    /// Multiply painted pixels by an RGBA tint; `None` removes the filter
    pub fn set_color_filter(&self, tint: Option<[u8; 4]>) -> Result<(), EngineError> {
        let mut st = self.shared.lock();
        st.check_destroyed()?;
        st.style.tint = tint;
        Ok(())
    }

    /// Single subscriber, replaces any previous callback.
    ///
    /// Fires once per completed finite run, on the thread calling `present()`.
    /// Never fires for `LoopPolicy::Infinite` or after an explicit `stop()`.
    pub fn set_on_finished<F>(&self, callback: F) -> Result<(), EngineError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut st = self.shared.lock();
        st.check_destroyed()?;
        st.on_finished = Some(Arc::new(callback));
        Ok(())
    }

    pub fn clear_on_finished(&self) -> Result<(), EngineError> {
        let mut st = self.shared.lock();
        st.check_destroyed()?;
        st.on_finished = None;
        Ok(())
    }

    // === Queries ===

    pub fn is_running(&self) -> bool {
        self.shared.lock().is_running()
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.lock().destroyed
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    pub fn current_loop(&self) -> u32 {
        self.shared.lock().current_loop
    }

    /// Frame index currently in the front buffer
    pub fn displayed_frame(&self) -> usize {
        self.shared.lock().displayed_frame
    }

    pub fn loop_policy(&self) -> LoopPolicy {
        self.shared.lock().loop_policy
    }

    pub fn circle_mask(&self) -> bool {
        self.shared.lock().style.circle_mask
    }

    pub fn draw_style(&self) -> DrawStyle {
        self.shared.lock().style
    }

    pub fn descriptor(&self) -> SequenceDescriptor {
        self.shared.descriptor
    }

    pub fn intrinsic_width(&self) -> u32 {
        self.shared.descriptor.width
    }

    pub fn intrinsic_height(&self) -> u32 {
        self.shared.descriptor.height
    }

    pub fn opacity(&self) -> Opacity {
        if self.shared.descriptor.opaque {
            Opacity::Opaque
        } else {
            Opacity::Translucent
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if !self.is_destroyed() {
            let _ = self.destroy();
        }
    }
}

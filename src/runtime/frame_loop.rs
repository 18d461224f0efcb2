//! Fixed-timestep frame driver.
//!
//! Each frame measures elapsed wall time (clamped to 0.25 s so a stall does
//! not trigger a burst of catch-up ticks), feeds it into an accumulator and
//! runs one simulation tick per whole `delta_time` consumed. Every phase
//! submits its callbacks as HIGH, IMMEDIATE tasks and blocks until they
//! finish; render callbacks are context-affine.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::core::{LaunchPolicy, Priority, Scheduler};

/// Longest frame time fed into the accumulator, in seconds.
pub const MAX_FRAME_TIME_SECS: f64 = 0.25;

/// Stage of a frame a callback is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePhase {
    /// Once per frame, before simulation ticks.
    EarlyFrame,
    /// Start of every tick.
    EarlyUpdate,
    /// Every tick.
    Update,
    /// End of every tick.
    LateUpdate,
    /// Once per frame, after simulation ticks.
    LateFrame,
    /// Once per frame, on the rendering context's thread.
    Render,
}

impl FramePhase {
    /// Every phase, in execution order.
    pub const ALL: [Self; 6] = [
        Self::EarlyFrame,
        Self::EarlyUpdate,
        Self::Update,
        Self::LateUpdate,
        Self::LateFrame,
        Self::Render,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

/// What a frame callback sees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Phase being run.
    pub phase: FramePhase,
    /// Frame number, starting at 0.
    pub frame: u64,
    /// Fixed simulation step in seconds.
    pub delta_time: f64,
    /// Simulated time at the start of this tick (or frame).
    pub time: f64,
    /// Leftover accumulator as a fraction of `delta_time`, for interpolation.
    pub alpha: f64,
}

/// Accumulator for a fixed simulation step.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameClock {
    delta_time: f64,
    accumulator: f64,
    time: f64,
}

impl FrameClock {
    /// Clock stepping `delta_time` seconds per tick.
    #[must_use]
    pub const fn new(delta_time: f64) -> Self {
        Self {
            delta_time,
            accumulator: 0.0,
            time: 0.0,
        }
    }

    /// Add `frame_time` seconds (clamped) and return the ticks now due.
    pub fn advance(&mut self, frame_time: f64) -> u32 {
        self.accumulator += frame_time.clamp(0.0, MAX_FRAME_TIME_SECS);
        let mut ticks = 0;
        while self.accumulator >= self.delta_time {
            self.accumulator -= self.delta_time;
            self.time += self.delta_time;
            ticks += 1;
        }
        ticks
    }

    /// Fixed step in seconds.
    #[must_use]
    pub const fn delta_time(&self) -> f64 {
        self.delta_time
    }

    /// Simulated time in seconds.
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.time
    }

    /// Leftover accumulator as a fraction of the step.
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.accumulator / self.delta_time
    }
}

type Callback = Arc<dyn Fn(FrameContext) + Send + Sync>;

/// Result of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number.
    pub frame: u64,
    /// Simulation ticks run during the frame.
    pub ticks: u32,
}

/// Drives registered callbacks through the scheduler, one frame at a time.
pub struct FrameLoop {
    scheduler: Scheduler,
    clock: FrameClock,
    callbacks: [Vec<Callback>; 6],
    frame: u64,
    last: Option<Instant>,
}

impl FrameLoop {
    /// Loop using the engine's fixed step.
    #[must_use]
    pub fn new(scheduler: Scheduler, config: &EngineConfig) -> Self {
        Self::with_delta_time(scheduler, config.delta_time_secs)
    }

    /// Loop stepping `delta_time` seconds per tick.
    #[must_use]
    pub fn with_delta_time(scheduler: Scheduler, delta_time: f64) -> Self {
        Self {
            scheduler,
            clock: FrameClock::new(delta_time),
            callbacks: Default::default(),
            frame: 0,
            last: None,
        }
    }

    /// Attach `callback` to `phase`.
    pub fn on<F>(&mut self, phase: FramePhase, callback: F) -> &mut Self
    where
        F: Fn(FrameContext) + Send + Sync + 'static,
    {
        self.callbacks[phase.index()].push(Arc::new(callback));
        self
    }

    /// Attach a per-tick update callback.
    pub fn on_update<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(FrameContext) + Send + Sync + 'static,
    {
        self.on(FramePhase::Update, callback)
    }

    /// Attach a render callback.
    pub fn on_render<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(FrameContext) + Send + Sync + 'static,
    {
        self.on(FramePhase::Render, callback)
    }

    /// The underlying clock.
    #[must_use]
    pub const fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Frames completed so far.
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.frame
    }

    fn run_phase(&self, phase: FramePhase, time: f64) {
        let callbacks = &self.callbacks[phase.index()];
        if callbacks.is_empty() {
            return;
        }
        let ctx = FrameContext {
            phase,
            frame: self.frame,
            delta_time: self.clock.delta_time(),
            time,
            alpha: self.clock.alpha(),
        };
        let affine = phase == FramePhase::Render;
        for callback in callbacks {
            let callback = Arc::clone(callback);
            self.scheduler
                .add_task(Priority::High, LaunchPolicy::Immediate, affine, move || callback(ctx));
        }
        self.scheduler.block();
    }

    /// Run one frame that took `frame_time` seconds of wall time.
    pub fn step(&mut self, frame_time: f64) -> FrameReport {
        let start_time = self.clock.time();
        let ticks = self.clock.advance(frame_time);

        self.run_phase(FramePhase::EarlyFrame, start_time);
        let delta_time = self.clock.delta_time();
        for tick in 0..ticks {
            let time = delta_time.mul_add(f64::from(tick), start_time);
            self.run_phase(FramePhase::EarlyUpdate, time);
            self.run_phase(FramePhase::Update, time);
            self.run_phase(FramePhase::LateUpdate, time);
        }
        self.run_phase(FramePhase::LateFrame, self.clock.time());
        self.run_phase(FramePhase::Render, self.clock.time());

        let report = FrameReport {
            frame: self.frame,
            ticks,
        };
        trace!(frame = report.frame, ticks, "Frame complete");
        self.frame += 1;
        report
    }

    /// Run one frame timed against the previous call.
    pub fn run_frame(&mut self) -> FrameReport {
        let now = Instant::now();
        let elapsed = self
            .last
            .map_or(0.0, |last| now.duration_since(last).as_secs_f64());
        self.last = Some(now);
        self.step(elapsed)
    }

    /// Run frames while the scheduler is running and `keep_going` agrees.
    pub fn run(&mut self, mut keep_going: impl FnMut(&FrameReport) -> bool) -> u64 {
        debug!(delta_time = self.clock.delta_time(), "Frame loop started");
        let first = self.frame;
        while self.scheduler.running() {
            let report = self.run_frame();
            if !keep_going(&report) {
                break;
            }
        }
        debug!(frames = self.frame - first, "Frame loop stopped");
        self.frame - first
    }
}

impl std::fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLoop")
            .field("clock", &self.clock)
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

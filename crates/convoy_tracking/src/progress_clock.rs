use jiff::{SignedDuration, Timestamp};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Completed,
}

/// How long a full run of the route lasts on screen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimingMode {
    /// Follows the route duration reported by the provider.
    #[default]
    RealTime,
    /// Plays the whole route back in a fixed time, for demos.
    Accelerated { playback: SignedDuration },
}

impl TimingMode {
    pub fn total_duration(&self, route_duration: SignedDuration) -> SignedDuration {
        match self {
            TimingMode::RealTime => route_duration,
            TimingMode::Accelerated { playback } => *playback,
        }
    }
}

/// Wall-clock timestamps derived from the tokio clock.
///
/// Anchored once, then advanced by the monotonic runtime clock, so frames and
/// refresh requests share one timeline that never goes backwards and that
/// follows tokio's paused time in tests.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    anchor: Timestamp,
    anchor_instant: Instant,
}

impl Default for WallClock {
    fn default() -> Self {
        Self::anchored_at(Timestamp::now())
    }
}

impl WallClock {
    pub fn anchored_at(anchor: Timestamp) -> Self {
        Self {
            anchor,
            anchor_instant: Instant::now(),
        }
    }

    pub fn now(&self) -> Timestamp {
        let elapsed = SignedDuration::try_from(self.anchor_instant.elapsed())
            .unwrap_or(SignedDuration::ZERO);
        self.anchor.saturating_add(elapsed).unwrap_or(self.anchor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTick {
    pub progress: f64,
    pub state: RunState,
    /// True only for the tick that reached the end of the route.
    pub completed: bool,
}

/// Turns wall-clock time into a progress fraction.
///
/// Paused time never counts: on resume the start is shifted forward by the
/// length of the pause. The generation changes on every reset so that results
/// of work started before the reset can be recognised and dropped.
#[derive(Debug, Clone)]
pub struct ProgressClock {
    state: RunState,
    total_duration: SignedDuration,
    started_at: Option<Timestamp>,
    adjusted_start: Option<Timestamp>,
    paused_at: Option<Timestamp>,
    paused_offset: SignedDuration,
    progress: f64,
    generation: u64,
}

impl ProgressClock {
    pub fn new(total_duration: SignedDuration) -> Self {
        ProgressClock {
            state: RunState::Idle,
            total_duration: total_duration.max(SignedDuration::ZERO),
            started_at: None,
            adjusted_start: None,
            paused_at: None,
            paused_offset: SignedDuration::ZERO,
            progress: 0.0,
            generation: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn total_duration(&self) -> SignedDuration {
        self.total_duration
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        self.started_at
    }

    pub fn paused_offset(&self) -> SignedDuration {
        self.paused_offset
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn start(&mut self, now: Timestamp) -> bool {
        if self.state != RunState::Idle {
            return false;
        }

        self.state = RunState::Running;
        self.started_at = Some(now);
        self.adjusted_start = Some(now);
        self.paused_at = None;
        self.paused_offset = SignedDuration::ZERO;
        self.progress = 0.0;
        debug!("Clock started (generation {})", self.generation);
        true
    }

    pub fn pause(&mut self, now: Timestamp) -> bool {
        if self.state != RunState::Running {
            return false;
        }

        // freeze progress at the exact pause instant
        self.tick(now);
        if self.state != RunState::Running {
            return false;
        }

        self.state = RunState::Paused;
        self.paused_at = Some(now);
        true
    }

    pub fn resume(&mut self, now: Timestamp) -> bool {
        if self.state != RunState::Paused {
            return false;
        }

        if let (Some(paused_at), Some(adjusted_start)) = (self.paused_at, self.adjusted_start) {
            let paused_for = now.duration_since(paused_at).max(SignedDuration::ZERO);
            self.paused_offset += paused_for;
            self.adjusted_start = Some(adjusted_start + paused_for);
        }

        self.paused_at = None;
        self.state = RunState::Running;
        true
    }

    /// Back to Idle from any state; returns the new generation.
    pub fn reset(&mut self) -> u64 {
        self.state = RunState::Idle;
        self.started_at = None;
        self.adjusted_start = None;
        self.paused_at = None;
        self.paused_offset = SignedDuration::ZERO;
        self.progress = 0.0;
        self.generation += 1;
        debug!("Clock reset (generation {})", self.generation);
        self.generation
    }

    pub fn elapsed(&self, now: Timestamp) -> SignedDuration {
        match (self.state, self.adjusted_start) {
            (RunState::Running, Some(start)) => now.duration_since(start).max(SignedDuration::ZERO),
            (RunState::Paused, Some(start)) => self
                .paused_at
                .map(|paused_at| paused_at.duration_since(start))
                .unwrap_or(SignedDuration::ZERO),
            (RunState::Completed, _) => self.total_duration,
            _ => SignedDuration::ZERO,
        }
    }

    /// Advances the clock to `now`. Driven once per rendered frame.
    pub fn tick(&mut self, now: Timestamp) -> ClockTick {
        if self.state != RunState::Running {
            return ClockTick {
                progress: self.progress,
                state: self.state,
                completed: false,
            };
        }

        let progress = if self.total_duration.is_zero() {
            1.0
        } else {
            let elapsed = self.elapsed(now).as_secs_f64();
            (elapsed / self.total_duration.as_secs_f64()).clamp(0.0, 1.0)
        };

        // progress never moves backwards while running
        self.progress = self.progress.max(progress);

        let completed = self.progress >= 1.0;
        if completed {
            self.progress = 1.0;
            self.state = RunState::Completed;
            debug!("Clock completed (generation {})", self.generation);
        }

        ClockTick {
            progress: self.progress,
            state: self.state,
            completed,
        }
    }
}

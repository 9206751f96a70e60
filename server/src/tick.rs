//! The periodic world update.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::{Duration, Instant};

use scene::{AnimationEngine, ObjectId, SceneEngine};

use crate::config::TickConfig;

/// Hook run at the end of every server cycle.
pub trait IdlePoll: Send {
    fn idle(&mut self);
}

/// Sleeps for a fixed delay. A zero delay yields instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPoll(pub Duration);

impl Default for SleepPoll {
    fn default() -> Self {
        Self(Duration::from_millis(10))
    }
}

impl IdlePoll for SleepPoll {
    fn idle(&mut self) {
        if self.0.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(self.0);
        }
    }
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub dt: f32,
    /// Scene mutations applied by the commit step.
    pub committed: usize,
    /// Properties the commit step wrote, per object.
    pub changed: BTreeMap<ObjectId, BTreeSet<String>>,
    /// Whether the scene update processed every dirty object.
    pub converged: bool,
    /// Animation tracks still playing.
    pub animations: usize,
}

/// Advances animation and scene state once per cycle.
pub struct TickLoop {
    default_dt: f32,
    last: Option<Instant>,
    tick: u64,
    idle: Box<dyn IdlePoll>,
}

impl std::fmt::Debug for TickLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickLoop")
            .field("default_dt", &self.default_dt)
            .field("last", &self.last)
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

impl TickLoop {
    #[must_use]
    pub fn new(config: &TickConfig) -> Self {
        Self {
            default_dt: config.default_dt,
            last: None,
            tick: 0,
            idle: Box::new(SleepPoll(config.idle_delay)),
        }
    }

    /// Replaces the idle hook.
    #[must_use]
    pub fn with_idle(mut self, idle: Box<dyn IdlePoll>) -> Self {
        self.idle = idle;
        self
    }

    /// Number of ticks run so far.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Seconds in `elapsed`, or `default_dt` when that is zero or not finite.
    #[must_use]
    pub fn effective_dt(elapsed: Duration, default_dt: f32) -> f32 {
        let secs = elapsed.as_secs_f32();
        if secs > 0.0 && secs.is_finite() {
            secs
        } else {
            default_dt
        }
    }

    /// Runs one tick at `now`: mark every object dirty, advance animations,
    /// commit staged writes, then update the scene.
    pub fn step(
        &mut self,
        now: Instant,
        scene: &mut dyn SceneEngine,
        animator: &mut dyn AnimationEngine,
    ) -> TickReport {
        let elapsed = self
            .last
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        let dt = Self::effective_dt(elapsed, self.default_dt);
        self.last = Some(now);
        self.tick += 1;

        for id in scene.object_ids() {
            // IDs come from the scene itself.
            let _ = scene.mark_dirty(id);
        }
        let animations = animator.tick(dt, scene);
        let commit = scene.commit();
        let converged = scene.update_frame();

        TickReport {
            tick: self.tick,
            dt,
            committed: commit.applied,
            changed: commit.touched,
            converged,
            animations,
        }
    }

    /// Runs the idle hook.
    pub fn idle(&mut self) {
        self.idle.idle();
    }
}

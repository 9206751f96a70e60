//! Keyframed property transitions and the engine that plays them.

use std::collections::VecDeque;

use crate::engine::SceneEngine;
use crate::error::{SceneError, SceneResult};
use crate::{ObjectId, PropertyValue, Vec3};

/// A single transition: move `property` by `delta` over `seconds`.
///
/// Scalar properties are moved by `delta.x`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Animation {
    pub seconds: f32,
    pub property: String,
    pub delta: Vec3,
}

impl Animation {
    #[must_use]
    pub fn new(seconds: f32, property: impl Into<String>, delta: Vec3) -> Self {
        Self {
            seconds,
            property: property.into(),
            delta,
        }
    }
}

/// Transitions played back-to-back.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct AnimationSequence {
    pub steps: Vec<Animation>,
}

impl AnimationSequence {
    #[must_use]
    pub fn new(steps: Vec<Animation>) -> Self {
        Self { steps }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Total playback time in seconds.
    #[must_use]
    pub fn duration(&self) -> f32 {
        self.steps.iter().map(|step| step.seconds.max(0.0)).sum()
    }
}

/// Advances keyframed transitions against a scene.
pub trait AnimationEngine {
    /// Queues a sequence on `target`. Sequences on the same target play in order.
    fn play(&mut self, target: ObjectId, sequence: AnimationSequence);

    /// Advances every track by `dt` seconds and returns the number still running.
    fn tick(&mut self, dt: f32, scene: &mut dyn SceneEngine) -> usize;

    /// Returns `true` when nothing is playing.
    fn is_idle(&self) -> bool;
}

#[derive(Debug, Clone)]
struct Track {
    target: ObjectId,
    steps: VecDeque<Animation>,
    // Fraction of the front step already applied, in [0, 1].
    progress: f32,
}

/// Linear-interpolation animation engine.
#[derive(Debug, Clone, Default)]
pub struct Animator {
    tracks: Vec<Track>,
}

impl Animator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracks with steps left to play.
    #[must_use]
    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }
}

impl AnimationEngine for Animator {
    fn play(&mut self, target: ObjectId, sequence: AnimationSequence) {
        if sequence.is_empty() {
            return;
        }
        if let Some(track) = self.tracks.iter_mut().find(|track| track.target == target) {
            track.steps.extend(sequence.steps);
            return;
        }
        self.tracks.push(Track {
            target,
            steps: sequence.steps.into(),
            progress: 0.0,
        });
    }

    fn tick(&mut self, dt: f32, scene: &mut dyn SceneEngine) -> usize {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.tracks
            .retain_mut(|track| advance_track(track, dt, scene).is_ok() && !track.steps.is_empty());
        self.tracks.len()
    }

    fn is_idle(&self) -> bool {
        self.tracks.is_empty()
    }
}

fn advance_track(track: &mut Track, dt: f32, scene: &mut dyn SceneEngine) -> SceneResult<()> {
    let mut remaining = dt;
    while let Some(step) = track.steps.front() {
        let step_progress = if step.seconds > 0.0 {
            (track.progress + remaining / step.seconds).min(1.0)
        } else {
            1.0
        };
        let fraction = step_progress - track.progress;
        if fraction <= 0.0 {
            break;
        }
        apply_delta(scene, track.target, &step.property, step.delta * fraction)?;
        if step.seconds > 0.0 {
            remaining -= fraction * step.seconds;
        }
        if step_progress < 1.0 {
            track.progress = step_progress;
            break;
        }
        track.steps.pop_front();
        track.progress = 0.0;
    }
    Ok(())
}

fn apply_delta(
    scene: &mut dyn SceneEngine,
    target: ObjectId,
    property: &str,
    delta: Vec3,
) -> SceneResult<()> {
    let next = match scene.property(target, property) {
        None => PropertyValue::Vector(delta),
        Some(PropertyValue::Vector(current)) => PropertyValue::Vector(current + delta),
        Some(PropertyValue::Scalar(current)) => PropertyValue::Scalar(current + delta.x),
        Some(other) => {
            return Err(SceneError::TypeMismatch {
                id: target,
                property: property.to_string(),
                expected: "vector",
                found: other.type_name(),
            })
        }
    };
    scene.set_property(target, property, next)
}

//! Scene and animation engine interfaces consumed by the rigsync server.
//!
//! The server never owns world state directly. It talks to a scene through
//! the [`SceneEngine`] trait and to an animation system through
//! [`AnimationEngine`], both driven from a single owner thread.
//!
//! [`MemoryScene`] and [`Animator`] are small reference implementations used
//! by the bundled server binary and by tests.

mod animation;
mod engine;
mod error;
mod types;

pub use animation::{Animation, AnimationEngine, AnimationSequence, Animator};
pub use engine::{Commit, MemoryScene, SceneEngine, SceneObject};
pub use error::{SceneError, SceneResult};
pub use types::{ObjectId, PropertyValue, Vec3};

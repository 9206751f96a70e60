//! The handler trait, the per-invocation context and the built-in handlers.

use std::fmt;

use scene::{AnimationEngine, AnimationSequence, ObjectId, SceneEngine, Vec3};
use serde::Deserialize;

use crate::error::{ActionError, ActionResult};
use crate::session::{ObjectView, Session};

/// Bytes at the front of an action payload naming the target object.
pub const TARGET_ID_LEN: usize = 4;

/// What kind of user interaction a handler responds to.
///
/// Every state of an interaction machine shares the capability of the
/// handler bound to its trigger code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Click,
    Input,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Click => write!(f, "click"),
            Self::Input => write!(f, "input"),
        }
    }
}

/// One action invocation: built per inbound action frame and dropped after
/// the handler returns.
pub struct Action<'a> {
    code: u8,
    target: ObjectId,
    payload: &'a [u8],
    session: &'a mut Session,
    scene: &'a mut dyn SceneEngine,
    animator: &'a mut dyn AnimationEngine,
    now: f64,
}

impl<'a> Action<'a> {
    pub fn new(
        code: u8,
        target: ObjectId,
        payload: &'a [u8],
        session: &'a mut Session,
        scene: &'a mut dyn SceneEngine,
        animator: &'a mut dyn AnimationEngine,
        now: f64,
    ) -> Self {
        Self {
            code,
            target,
            payload,
            session,
            scene,
            animator,
            now,
        }
    }

    #[must_use]
    pub const fn code(&self) -> u8 {
        self.code
    }

    #[must_use]
    pub const fn target(&self) -> ObjectId {
        self.target
    }

    /// The full payload, target ID included.
    #[must_use]
    pub const fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// The payload after the target ID.
    #[must_use]
    pub fn argument(&self) -> &'a [u8] {
        self.payload.get(TARGET_ID_LEN..).unwrap_or_default()
    }

    /// The argument as UTF-8 text.
    pub fn text(&self) -> ActionResult<&'a str> {
        std::str::from_utf8(self.argument()).map_err(|_| ActionError::InvalidText)
    }

    /// Seconds since server start.
    #[must_use]
    pub const fn now(&self) -> f64 {
        self.now
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        self.session
    }

    /// The invoking user's view of the target object.
    pub fn view_mut(&mut self) -> &mut ObjectView {
        self.session.view_mut(self.target)
    }

    pub fn scene_mut(&mut self) -> &mut dyn SceneEngine {
        self.scene
    }

    pub fn animator_mut(&mut self) -> &mut dyn AnimationEngine {
        self.animator
    }
}

impl fmt::Debug for Action<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("code", &(self.code as char))
            .field("target", &self.target)
            .field("payload_len", &self.payload.len())
            .field("session", &self.session.address())
            .finish_non_exhaustive()
    }
}

/// Reacts to an action on a target object.
///
/// Handlers are shared by every session and must not keep per-user state;
/// per-user state lives in the session's [`ObjectView`].
pub trait ActionHandler: Send + Sync + fmt::Debug {
    fn capability(&self) -> Capability;

    fn invoke(&self, action: &mut Action<'_>) -> ActionResult<()>;
}

/// Stamps the selection time on the session and the target view.
#[derive(Debug, Clone, Copy, Default)]
pub struct Select;

impl ActionHandler for Select {
    fn capability(&self) -> Capability {
        Capability::Click
    }

    fn invoke(&self, action: &mut Action<'_>) -> ActionResult<()> {
        let now = action.now();
        action.session_mut().select(now);
        action.view_mut().select(now);
        Ok(())
    }
}

/// Stores the payload argument as the target view's input text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Input;

impl ActionHandler for Input {
    fn capability(&self) -> Capability {
        Capability::Input
    }

    fn invoke(&self, action: &mut Action<'_>) -> ActionResult<()> {
        let text = action.text()?;
        action.view_mut().set_input(text);
        Ok(())
    }
}

/// Sets the target view's color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint {
    pub color: Vec3,
}

impl ActionHandler for Paint {
    fn capability(&self) -> Capability {
        Capability::Click
    }

    fn invoke(&self, action: &mut Action<'_>) -> ActionResult<()> {
        action.view_mut().set_color(self.color);
        Ok(())
    }
}

/// Who sees an [`Animate`] handler's sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationScope {
    /// Queued as a one-shot for the invoking client only.
    #[default]
    User,
    /// Played on the server's animation engine and visible to everyone.
    World,
}

/// Plays a keyframed sequence on the target.
#[derive(Debug, Clone, PartialEq)]
pub struct Animate {
    pub sequence: AnimationSequence,
    pub scope: AnimationScope,
}

impl ActionHandler for Animate {
    fn capability(&self) -> Capability {
        Capability::Click
    }

    fn invoke(&self, action: &mut Action<'_>) -> ActionResult<()> {
        match self.scope {
            AnimationScope::User => action.view_mut().queue_animation(self.sequence.clone()),
            AnimationScope::World => {
                let target = action.target();
                action.animator_mut().play(target, self.sequence.clone());
            }
        }
        Ok(())
    }
}

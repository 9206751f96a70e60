//! Resolves action frames to handlers and invokes them.

use std::sync::Arc;

use scene::{AnimationEngine, ObjectId, SceneEngine};

use crate::action::handler::{Action, TARGET_ID_LEN};
use crate::action::registry::Registry;
use crate::error::{ActionError, ActionResult};
use crate::session::{ObjectView, Session};

/// What happened to one action frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No handler is bound to the code.
    Unregistered,
    /// A handler ran. `next_state` is the machine cursor after it, if the
    /// target has an interaction machine for this code.
    Invoked {
        handler: String,
        target: ObjectId,
        next_state: Option<usize>,
    },
    /// The action was dropped.
    Rejected(ActionError),
}

/// Reads the target object ID from the front of an action payload.
pub fn target_of(payload: &[u8]) -> ActionResult<ObjectId> {
    let bytes: [u8; TARGET_ID_LEN] = payload
        .get(..TARGET_ID_LEN)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(ActionError::MissingTarget { len: payload.len() })?;
    Ok(ObjectId::new(u32::from_le_bytes(bytes)))
}

/// Invokes handlers from a shared, read-only registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs the handler for `code` synchronously.
    ///
    /// The target's interaction machine, when one exists for `code`,
    /// overrides the code's default binding and advances only when the
    /// handler succeeds.
    pub fn dispatch(
        &self,
        session: &mut Session,
        code: u8,
        payload: &[u8],
        scene: &mut dyn SceneEngine,
        animator: &mut dyn AnimationEngine,
        now: f64,
    ) -> DispatchOutcome {
        let Some(default) = self.registry.resolve(code) else {
            return DispatchOutcome::Unregistered;
        };
        let target = match target_of(payload) {
            Ok(target) => target,
            Err(err) => return DispatchOutcome::Rejected(err),
        };
        if !scene.contains(target) {
            return DispatchOutcome::Rejected(ActionError::UnknownTarget { id: target });
        }

        let (binding, next_state) = match self.registry.machine(target, code) {
            Some(machine) => {
                let cursor = session
                    .view(target)
                    .map_or(0, ObjectView::interaction_state);
                let (binding, next) = machine.step(cursor);
                (binding, Some(next))
            }
            None => (default, None),
        };

        let mut action = Action::new(
            code,
            target,
            payload,
            &mut *session,
            &mut *scene,
            &mut *animator,
            now,
        );
        if let Err(err) = binding.handler().invoke(&mut action) {
            return DispatchOutcome::Rejected(err);
        }
        if let Some(next) = next_state {
            session.view_mut(target).set_interaction_state(next);
        }
        DispatchOutcome::Invoked {
            handler: binding.name().to_string(),
            target,
            next_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::action::handler::{ActionHandler, Capability};
    use crate::action::registry::{
        ActionConfig, HandlerSpec, InteractionSpec, StateSpec, DEFAULT_CLICK,
    };
    use crate::config::SessionConfig;
    use crate::event::{ConnectionId, SocketHandle};
    use scene::{Animator, MemoryScene, SceneObject, Vec3};
    use std::net::SocketAddr;

    #[derive(Debug, Default)]
    struct Recorder {
        calls: AtomicUsize,
        seen: Mutex<Vec<(ObjectId, Vec<u8>)>>,
    }

    impl ActionHandler for Recorder {
        fn capability(&self) -> Capability {
            Capability::Click
        }

        fn invoke(&self, action: &mut Action<'_>) -> ActionResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((action.target(), action.argument().to_vec()));
            Ok(())
        }
    }

    struct World {
        session: Session,
        scene: MemoryScene,
        animator: Animator,
    }

    impl World {
        fn new() -> Self {
            Self {
                session: Session::new(
                    SocketAddr::from(([127, 0, 0, 1], 6000)),
                    SocketHandle::channel(ConnectionId::new(1)).0,
                    SessionConfig::for_testing(),
                ),
                scene: MemoryScene::from_objects([
                    SceneObject::new(ObjectId::new(1), "lamp"),
                    SceneObject::new(ObjectId::new(2), "chair"),
                ])
                .unwrap(),
                animator: Animator::new(),
            }
        }

        fn dispatch(&mut self, dispatcher: &Dispatcher, code: u8, payload: &[u8]) -> DispatchOutcome {
            dispatcher.dispatch(
                &mut self.session,
                code,
                payload,
                &mut self.scene,
                &mut self.animator,
                1.0,
            )
        }
    }

    #[test]
    fn target_is_little_endian_u32() {
        assert_eq!(target_of(&[1, 2, 0, 0, 9]).unwrap(), ObjectId::new(0x0201));
        assert_eq!(
            target_of(&[1, 2]).unwrap_err(),
            ActionError::MissingTarget { len: 2 }
        );
    }

    #[test]
    fn registered_code_invokes_handler_once() {
        let recorder = Arc::new(Recorder::default());
        let registry = Registry::builder()
            .handler("record", recorder.clone())
            .bind('c', "record")
            .build()
            .unwrap();
        let dispatcher = Dispatcher::new(Arc::new(registry));
        let mut world = World::new();

        let outcome = world.dispatch(&dispatcher, b'c', &[2, 0, 0, 0, b'h', b'i']);
        assert_eq!(
            outcome,
            DispatchOutcome::Invoked {
                handler: "record".to_string(),
                target: ObjectId::new(2),
                next_state: None,
            }
        );
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            recorder.seen.lock().unwrap().as_slice(),
            &[(ObjectId::new(2), b"hi".to_vec())]
        );
    }

    #[test]
    fn unregistered_code_is_ignored() {
        let recorder = Arc::new(Recorder::default());
        let registry = Registry::builder()
            .handler("record", recorder.clone())
            .bind('c', "record")
            .build()
            .unwrap();
        let dispatcher = Dispatcher::new(Arc::new(registry));
        let mut world = World::new();

        assert_eq!(
            world.dispatch(&dispatcher, b'z', &[1, 0, 0, 0]),
            DispatchOutcome::Unregistered
        );
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
        assert!(!world.session.has_pending());
    }

    #[test]
    fn bad_targets_are_rejected() {
        let registry = Registry::from_config(&ActionConfig::standard()).unwrap();
        let dispatcher = Dispatcher::new(Arc::new(registry));
        let mut world = World::new();

        assert_eq!(
            world.dispatch(&dispatcher, b'c', &[1]),
            DispatchOutcome::Rejected(ActionError::MissingTarget { len: 1 })
        );
        assert_eq!(
            world.dispatch(&dispatcher, b'c', &[9, 0, 0, 0]),
            DispatchOutcome::Rejected(ActionError::UnknownTarget {
                id: ObjectId::new(9)
            })
        );
        assert!(world.session.view(ObjectId::new(9)).is_none());
    }

    #[test]
    fn click_chain_cycles_colors() {
        let colors = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let mut config = ActionConfig::standard();
        for (name, color) in ["red", "green", "blue"].iter().zip(colors) {
            config
                .handlers
                .insert((*name).to_string(), HandlerSpec::Paint { color });
        }
        config.interactions.push(InteractionSpec {
            object: ObjectId::new(1),
            code: 'c',
            states: ["red", "green", "blue"]
                .iter()
                .map(|name| StateSpec {
                    handler: (*name).to_string(),
                    next: None,
                })
                .collect(),
        });
        let dispatcher = Dispatcher::new(Arc::new(Registry::from_config(&config).unwrap()));
        let mut world = World::new();
        let lamp = [1, 0, 0, 0];

        for expected in colors.iter().chain(colors.iter()) {
            world.dispatch(&dispatcher, b'c', &lamp);
            assert_eq!(
                world.session.view(ObjectId::new(1)).unwrap().color(),
                Some(*expected)
            );
        }

        // Objects without a machine keep the code's default binding.
        let outcome = world.dispatch(&dispatcher, b'c', &[2, 0, 0, 0]);
        assert!(matches!(
            outcome,
            DispatchOutcome::Invoked { ref handler, next_state: None, .. } if handler == DEFAULT_CLICK
        ));
    }

    #[test]
    fn failed_handler_does_not_advance_machine() {
        let mut config = ActionConfig::standard();
        config.interactions.push(InteractionSpec {
            object: ObjectId::new(1),
            code: 'i',
            states: vec![
                StateSpec {
                    handler: "default_input".to_string(),
                    next: None,
                },
                StateSpec {
                    handler: "default_input".to_string(),
                    next: None,
                },
            ],
        });
        let dispatcher = Dispatcher::new(Arc::new(Registry::from_config(&config).unwrap()));
        let mut world = World::new();

        let outcome = world.dispatch(&dispatcher, b'i', &[1, 0, 0, 0, 0xfe]);
        assert_eq!(outcome, DispatchOutcome::Rejected(ActionError::InvalidText));
        assert_eq!(
            world
                .session
                .view(ObjectId::new(1))
                .map_or(0, ObjectView::interaction_state),
            0
        );

        let outcome = world.dispatch(&dispatcher, b'i', &[1, 0, 0, 0, b'o', b'k']);
        assert!(matches!(
            outcome,
            DispatchOutcome::Invoked {
                next_state: Some(1),
                ..
            }
        ));
        assert_eq!(
            world.session.view(ObjectId::new(1)).unwrap().input(),
            Some("ok")
        );
    }
}

//! Action configuration and the immutable registry built from it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use scene::{AnimationSequence, ObjectId, Vec3};
use serde::Deserialize;

use crate::action::handler::{
    ActionHandler, Animate, AnimationScope, Capability, Input, Paint, Select,
};
use crate::error::{RegistryError, RegistryResult};

/// Name of the built-in click handler.
pub const DEFAULT_CLICK: &str = "default_click";

/// Name of the built-in input handler.
pub const DEFAULT_INPUT: &str = "default_input";

/// A configurable handler kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlerSpec {
    Select,
    Input,
    Paint {
        color: Vec3,
    },
    Animate {
        steps: AnimationSequence,
        #[serde(default)]
        scope: AnimationScope,
    },
}

impl HandlerSpec {
    fn build(&self) -> Arc<dyn ActionHandler> {
        match self {
            Self::Select => Arc::new(Select),
            Self::Input => Arc::new(Input),
            Self::Paint { color } => Arc::new(Paint { color: *color }),
            Self::Animate { steps, scope } => Arc::new(Animate {
                sequence: steps.clone(),
                scope: *scope,
            }),
        }
    }
}

/// Binds an action code to a named handler.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BindingSpec {
    pub code: char,
    pub handler: String,
}

/// One state of an interaction machine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StateSpec {
    pub handler: String,
    /// Index of the following state. Defaults to the next entry, wrapping
    /// to the first.
    #[serde(default)]
    pub next: Option<usize>,
}

/// Chained handlers for one object and trigger code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InteractionSpec {
    pub object: ObjectId,
    pub code: char,
    pub states: Vec<StateSpec>,
}

/// Action configuration, usually loaded from JSON.
///
/// ```json
/// {
///   "handlers": { "red": { "kind": "paint", "color": [1, 0, 0] } },
///   "bindings": [ { "code": "c", "handler": "default_click" } ],
///   "interactions": [
///     { "object": 3, "code": "c", "states": [ { "handler": "red" } ] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionConfig {
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerSpec>,
    #[serde(default)]
    pub bindings: Vec<BindingSpec>,
    #[serde(default)]
    pub interactions: Vec<InteractionSpec>,
}

impl ActionConfig {
    /// `c` clicks and `i` sends input, both through the built-ins.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            bindings: vec![
                BindingSpec {
                    code: 'c',
                    handler: DEFAULT_CLICK.to_string(),
                },
                BindingSpec {
                    code: 'i',
                    handler: DEFAULT_INPUT.to_string(),
                },
            ],
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> RegistryResult<Self> {
        serde_json::from_str(text).map_err(|err| RegistryError::Parse {
            message: err.to_string(),
        })
    }
}

/// A handler together with the name it was registered under.
#[derive(Debug, Clone)]
pub struct Binding {
    name: String,
    handler: Arc<dyn ActionHandler>,
}

impl Binding {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn handler(&self) -> &dyn ActionHandler {
        &*self.handler
    }

    #[must_use]
    pub fn capability(&self) -> Capability {
        self.handler.capability()
    }
}

#[derive(Debug, Clone)]
struct MachineState {
    binding: Binding,
    next: usize,
}

/// Explicit state machine choosing the handler for the next interaction
/// with one object. The cursor lives in each user's view.
#[derive(Debug, Clone)]
pub struct InteractionMachine {
    states: Vec<MachineState>,
}

impl InteractionMachine {
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Handler for `cursor` and the cursor after it. An out-of-range
    /// cursor restarts at state 0.
    #[must_use]
    pub fn step(&self, cursor: usize) -> (&Binding, usize) {
        let index = if cursor < self.states.len() { cursor } else { 0 };
        let state = &self.states[index];
        (&state.binding, state.next)
    }
}

/// Immutable mapping from action codes to handlers.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    handlers: BTreeMap<String, Arc<dyn ActionHandler>>,
    bindings: BTreeMap<u8, Binding>,
    machines: HashMap<(ObjectId, u8), InteractionMachine>,
}

impl Registry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn from_config(config: &ActionConfig) -> RegistryResult<Self> {
        Self::builder().config(config.clone()).build()
    }

    /// Resolves an action code to its bound handler.
    #[must_use]
    pub fn resolve(&self, code: u8) -> Option<&Binding> {
        self.bindings.get(&code)
    }

    /// The interaction machine for `object` triggered by `code`.
    #[must_use]
    pub fn machine(&self, object: ObjectId, code: u8) -> Option<&InteractionMachine> {
        self.machines.get(&(object, code))
    }

    #[must_use]
    pub fn handler(&self, name: &str) -> Option<&dyn ActionHandler> {
        self.handlers.get(name).map(|handler| &**handler)
    }

    /// Bound codes in ascending order.
    pub fn codes(&self) -> impl Iterator<Item = u8> + '_ {
        self.bindings.keys().copied()
    }

    #[must_use]
    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }
}

/// Collects configuration and external handlers, then validates them
/// into a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    config: ActionConfig,
    external: Vec<(String, Arc<dyn ActionHandler>)>,
}

impl RegistryBuilder {
    /// Merges a configuration set into the builder.
    #[must_use]
    pub fn config(mut self, config: ActionConfig) -> Self {
        self.config.handlers.extend(config.handlers);
        self.config.bindings.extend(config.bindings);
        self.config.interactions.extend(config.interactions);
        self
    }

    /// Adds a handler supplied by the host program.
    #[must_use]
    pub fn handler(mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.external.push((name.into(), handler));
        self
    }

    #[must_use]
    pub fn bind(mut self, code: char, handler: impl Into<String>) -> Self {
        self.config.bindings.push(BindingSpec {
            code,
            handler: handler.into(),
        });
        self
    }

    pub fn build(self) -> RegistryResult<Registry> {
        let handlers = self.collect_handlers()?;
        let lookup = |name: &str| -> RegistryResult<Binding> {
            let handler = handlers
                .get(name)
                .ok_or_else(|| RegistryError::UnknownHandler {
                    name: name.to_string(),
                })?;
            Ok(Binding {
                name: name.to_string(),
                handler: Arc::clone(handler),
            })
        };

        let mut bindings = BTreeMap::new();
        for spec in &self.config.bindings {
            let code = validate_code(spec.code)?;
            let binding = lookup(&spec.handler)?;
            if bindings.insert(code, binding).is_some() {
                return Err(RegistryError::DuplicateCode { code: spec.code });
            }
        }

        let mut machines = HashMap::new();
        for spec in &self.config.interactions {
            let code = validate_code(spec.code)?;
            let Some(trigger) = bindings.get(&code) else {
                return Err(RegistryError::UnboundTrigger {
                    object: spec.object,
                    code: spec.code,
                });
            };
            let expected = trigger.capability();
            if spec.states.is_empty() {
                return Err(RegistryError::EmptyMachine {
                    object: spec.object,
                    code: spec.code,
                });
            }
            let len = spec.states.len();
            let mut states = Vec::with_capacity(len);
            for (index, state) in spec.states.iter().enumerate() {
                let next = state.next.unwrap_or((index + 1) % len);
                if next >= len {
                    return Err(RegistryError::NextOutOfRange {
                        object: spec.object,
                        code: spec.code,
                        next,
                        states: len,
                    });
                }
                let binding = lookup(&state.handler)?;
                let found = binding.capability();
                if found != expected {
                    return Err(RegistryError::CapabilityMismatch {
                        object: spec.object,
                        code: spec.code,
                        handler: state.handler.clone(),
                        expected,
                        found,
                    });
                }
                states.push(MachineState { binding, next });
            }
            if machines
                .insert((spec.object, code), InteractionMachine { states })
                .is_some()
            {
                return Err(RegistryError::DuplicateMachine {
                    object: spec.object,
                    code: spec.code,
                });
            }
        }

        Ok(Registry {
            handlers,
            bindings,
            machines,
        })
    }

    fn collect_handlers(&self) -> RegistryResult<BTreeMap<String, Arc<dyn ActionHandler>>> {
        let mut handlers: BTreeMap<String, Arc<dyn ActionHandler>> = BTreeMap::new();
        handlers.insert(DEFAULT_CLICK.to_string(), Arc::new(Select));
        handlers.insert(DEFAULT_INPUT.to_string(), Arc::new(Input));

        let configured = self
            .config
            .handlers
            .iter()
            .map(|(name, spec)| (name.clone(), spec.build()));
        let external = self
            .external
            .iter()
            .map(|(name, handler)| (name.clone(), Arc::clone(handler)));
        for (name, handler) in configured.chain(external) {
            if handlers.contains_key(&name) {
                return Err(RegistryError::DuplicateHandler { name });
            }
            handlers.insert(name, handler);
        }
        Ok(handlers)
    }
}

fn validate_code(code: char) -> RegistryResult<u8> {
    if !code.is_ascii() {
        return Err(RegistryError::NonAsciiCode { code });
    }
    if code == '\0' {
        return Err(RegistryError::ReservedCode);
    }
    Ok(code as u8)
}

//! Action registration and invocation.
//!
//! An action frame carries a one-byte code and a payload whose first four
//! bytes name the target object. The [`Registry`] maps codes to handlers and
//! holds the per-object interaction machines; the [`Dispatcher`] resolves and
//! invokes them.

mod dispatch;
mod handler;
mod registry;

pub use dispatch::{target_of, DispatchOutcome, Dispatcher};
pub use handler::{
    Action, ActionHandler, Animate, AnimationScope, Capability, Input, Paint, Select,
    TARGET_ID_LEN,
};
pub use registry::{
    ActionConfig, Binding, BindingSpec, HandlerSpec, InteractionMachine, InteractionSpec,
    Registry, RegistryBuilder, StateSpec, DEFAULT_CLICK, DEFAULT_INPUT,
};

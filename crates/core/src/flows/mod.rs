pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, QueryRunFlow, RunTransitionError};
pub use states::{RunAction, RunContext, RunEvent, RunState, TransitionOutcome};

use thiserror::Error;

use crate::domain::query::QueryId;
use crate::events::{EventSink, ProgressEvent};
use crate::flows::states::{RunAction, RunContext, RunEvent, RunState, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> RunState;
    fn transition(
        &self,
        current: &RunState,
        event: &RunEvent,
        context: &RunContext,
    ) -> Result<TransitionOutcome, RunTransitionError>;
}

/// analyze, route, retrieve, generate, evaluate, deliver, with a bounded
/// replan edge back to analysis.
#[derive(Clone, Debug, Default)]
pub struct QueryRunFlow;

impl FlowDefinition for QueryRunFlow {
    fn initial_state(&self) -> RunState {
        RunState::Analyzing
    }

    fn transition(
        &self,
        current: &RunState,
        event: &RunEvent,
        context: &RunContext,
    ) -> Result<TransitionOutcome, RunTransitionError> {
        transition_query_run(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> RunState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &RunState,
        event: &RunEvent,
        context: &RunContext,
    ) -> Result<TransitionOutcome, RunTransitionError> {
        self.flow.transition(current, event, context)
    }

    /// Applies the transition and emits one progress event when it succeeds.
    pub fn apply_with_events<S>(
        &self,
        current: &RunState,
        event: &RunEvent,
        context: &RunContext,
        sink: &S,
        query_id: &QueryId,
    ) -> Result<TransitionOutcome, RunTransitionError>
    where
        S: EventSink + ?Sized,
    {
        let outcome = self.apply(current, event, context)?;
        sink.emit(
            ProgressEvent::new(query_id.clone(), outcome.to, context.attempt)
                .with_payload("from", outcome.from.as_str())
                .with_payload("to", outcome.to.as_str())
                .with_payload("event", outcome.event.as_str()),
        );
        Ok(outcome)
    }
}

impl Default for FlowEngine<QueryRunFlow> {
    fn default() -> Self {
        Self::new(QueryRunFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RunTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: RunState, event: RunEvent },
    #[error("run already finished in {0:?}")]
    AlreadyTerminal(RunState),
}

fn transition_query_run(
    current: &RunState,
    event: &RunEvent,
    context: &RunContext,
) -> Result<TransitionOutcome, RunTransitionError> {
    use RunAction::{
        AnalyzeQuery, DeliverAnswer, EmitResult, EvaluateAnswer, GenerateAnswer,
        IncrementAttempt, RetrieveEvidence, RouteCapabilities,
    };
    use RunEvent::{
        AnalysisCompleted, AnswerGenerated, BudgetExhausted, ConfidenceAccepted,
        ConfidenceInsufficient, Delivered, DeliveredDegraded, EvidenceRetrieved, ReplanStarted,
        RoutingCompleted, StageFailed,
    };
    use RunState::{
        Analyzing, Delivering, Evaluating, Failed, Generating, Replanning, Retrieving, Routing,
        Succeeded,
    };

    if current.is_terminal() {
        return Err(RunTransitionError::AlreadyTerminal(*current));
    }

    let replan_or_deliver = || {
        if context.can_replan() {
            (Replanning, vec![IncrementAttempt])
        } else {
            (Delivering, vec![DeliverAnswer])
        }
    };

    let (to, actions) = match (current, event) {
        (Analyzing, AnalysisCompleted) => (Routing, vec![RouteCapabilities]),
        (Routing, RoutingCompleted) => (Retrieving, vec![RetrieveEvidence]),
        (Retrieving, EvidenceRetrieved) => (Generating, vec![GenerateAnswer]),
        (Generating, AnswerGenerated) => (Evaluating, vec![EvaluateAnswer]),
        (Generating, StageFailed) | (Evaluating, StageFailed) => replan_or_deliver(),
        (Evaluating, ConfidenceAccepted) => (Delivering, vec![DeliverAnswer]),
        (Evaluating, ConfidenceInsufficient) => replan_or_deliver(),
        (Replanning, ReplanStarted) => (Analyzing, vec![AnalyzeQuery]),
        (Delivering, Delivered) => (Succeeded, vec![EmitResult]),
        (Delivering, DeliveredDegraded) => (Failed, vec![EmitResult]),
        (state, BudgetExhausted) if *state != Delivering => (Delivering, vec![DeliverAnswer]),
        _ => {
            return Err(RunTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}

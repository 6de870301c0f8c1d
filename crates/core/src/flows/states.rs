use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Analyzing,
    Routing,
    Retrieving,
    Generating,
    Evaluating,
    Delivering,
    Replanning,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Routing => "routing",
            Self::Retrieving => "retrieving",
            Self::Generating => "generating",
            Self::Evaluating => "evaluating",
            Self::Delivering => "delivering",
            Self::Replanning => "replanning",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEvent {
    AnalysisCompleted,
    RoutingCompleted,
    EvidenceRetrieved,
    AnswerGenerated,
    /// A stage or capability step failed in a way the next attempt can avoid.
    StageFailed,
    ConfidenceAccepted,
    ConfidenceInsufficient,
    ReplanStarted,
    BudgetExhausted,
    Delivered,
    DeliveredDegraded,
}

impl RunEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnalysisCompleted => "analysis_completed",
            Self::RoutingCompleted => "routing_completed",
            Self::EvidenceRetrieved => "evidence_retrieved",
            Self::AnswerGenerated => "answer_generated",
            Self::StageFailed => "stage_failed",
            Self::ConfidenceAccepted => "confidence_accepted",
            Self::ConfidenceInsufficient => "confidence_insufficient",
            Self::ReplanStarted => "replan_started",
            Self::BudgetExhausted => "budget_exhausted",
            Self::Delivered => "delivered",
            Self::DeliveredDegraded => "delivered_degraded",
        }
    }
}

/// Attempt bookkeeping the transition function needs to decide between
/// replanning and forced delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub attempt: u32,
    pub max_attempts: u32,
    pub budget_remaining: bool,
}

impl RunContext {
    pub fn can_replan(&self) -> bool {
        self.budget_remaining && self.attempt < self.max_attempts
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunAction {
    AnalyzeQuery,
    RouteCapabilities,
    RetrieveEvidence,
    GenerateAnswer,
    EvaluateAnswer,
    DeliverAnswer,
    IncrementAttempt,
    EmitResult,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RunState,
    pub to: RunState,
    pub event: RunEvent,
    pub actions: Vec<RunAction>,
}

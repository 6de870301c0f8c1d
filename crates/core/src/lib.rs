pub mod analyzer;
pub mod calibration;
pub mod config;
pub mod confidence;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod evaluation;
pub mod events;
pub mod flows;
pub mod scoring;
pub mod text;

pub use analyzer::{ComplexityWeights, QueryAnalyzer};
pub use calibration::{
    CalibrationReport, CalibrationSample, Calibrator, ConfidenceCalibrator, IsotonicRegression,
    PlattScaling, TemperatureScaling,
};
pub use config::{AssayConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use confidence::ConfidenceExtractor;
pub use delivery::{AdaptiveDeliveryManager, DeliveryRequest, DeliveryThresholds};
pub use domain::analysis::{Priority, QueryAnalysis, ResourceNeeds};
pub use domain::capability::{Capability, CapabilityKind};
pub use domain::confidence::{
    CalibratedConfidence, CalibrationMethod, DeliveryResult, EvaluationResult, GenerationResult,
    Tier, TokenConfidence,
};
pub use domain::evidence::ScoredDocument;
pub use domain::execution::{ConfidenceBreakdown, ExecutionResult};
pub use domain::plan::{Plan, PlanId, PlanStatus, PlanStep, PlanStrategy, StepId, StepStatus};
pub use domain::query::{Query, QueryId};
pub use errors::{
    CalibrationError, CapabilityError, CollaboratorError, OrchestrationError, RoutingError,
};
pub use evaluation::{EvaluationInput, Evaluator};
pub use events::{EventSink, InMemoryEventSink, NoopEventSink, ProgressEvent};
pub use flows::{FlowEngine, QueryRunFlow, RunContext, RunEvent, RunState};
pub use scoring::{OverallWeights, RerankWeights};

//! Per-query orchestration
//!
//! One [`Orchestrator`] serves many queries. Each call to [`Orchestrator::run`]
//! creates its own [`OrchestratorContext`] holding the budget clock, the
//! attempt counter and the best result so far, then drives the run-state
//! machine: analyze, route and execute capability steps, retrieve and
//! re-rank evidence, generate, evaluate, and either deliver or replan.
//! Attempts are capped by [`ExecutionPolicy::max_attempts`] and the whole run
//! by [`ExecutionPolicy::total_budget`]; whichever is hit first forces
//! delivery of the best result obtained.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use assay_core::analyzer::QueryAnalyzer;
use assay_core::calibration::Calibrator;
use assay_core::config::{AssayConfig, OrchestratorConfig};
use assay_core::delivery::{AdaptiveDeliveryManager, DeliveryRequest};
use assay_core::domain::capability::CapabilityKind;
use assay_core::domain::confidence::EvaluationResult;
use assay_core::domain::evidence::{retrieval_confidence, ScoredDocument};
use assay_core::domain::execution::{ConfidenceBreakdown, ExecutionResult};
use assay_core::domain::plan::PlanStrategy;
use assay_core::domain::query::{Query, QueryId};
use assay_core::errors::{CollaboratorError, OrchestrationError};
use assay_core::evaluation::{EvaluationInput, Evaluator};
use assay_core::events::EventSink;
use assay_core::flows::{FlowEngine, QueryRunFlow, RunContext, RunEvent, RunState};
use assay_core::scoring::{overall_raw_confidence, OverallWeights};
use assay_core::text::lexical_similarity;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::SharedCaches;
use crate::capability::CapabilityRegistry;
use crate::collaborators::{
    ExtractiveGenerator, GenerationService, KeywordVectorStore, LexicalSimilarity,
    SimilarityService, VectorStore,
};
use crate::executor::PlanExecutor;
use crate::generation::ResponseGenerator;
use crate::rerank::Reranker;
use crate::retrieval::EvidenceRetriever;
use crate::router::{build_plan, CapabilityRouter, RouteDecision};

/// Retry and deadline policy. Only the orchestrator consults it; capabilities
/// and collaborators never retry on their own.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionPolicy {
    pub max_attempts: u32,
    pub per_step_timeout: Duration,
    pub per_stage_timeout: Duration,
    pub total_budget: Duration,
    pub replan_delay: Duration,
    /// Calibrated confidence at or above which an attempt is accepted.
    pub replan_threshold: f64,
    pub strategy: PlanStrategy,
}

impl ExecutionPolicy {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            per_step_timeout: Duration::from_millis(config.per_step_timeout_ms),
            per_stage_timeout: Duration::from_millis(config.per_stage_timeout_ms),
            total_budget: Duration::from_secs(config.total_budget_secs),
            replan_delay: Duration::from_millis(config.replan_delay_ms),
            replan_threshold: config.replan_threshold,
            strategy: config.strategy,
        }
    }
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self::from_config(&AssayConfig::default().orchestrator)
    }
}

/// External services the orchestrator consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub generation: Arc<dyn GenerationService>,
    pub vector_store: Arc<dyn VectorStore>,
    pub similarity: Arc<dyn SimilarityService>,
}

impl Collaborators {
    /// Keyword search over `store`, lexical similarity and extractive
    /// generation. Needs no network access.
    pub fn in_memory(store: KeywordVectorStore) -> Self {
        Self {
            generation: Arc::new(ExtractiveGenerator),
            vector_store: Arc::new(store),
            similarity: Arc::new(LexicalSimilarity),
        }
    }
}

/// Everything one attempt produced that delivery may need.
#[derive(Clone, Debug)]
struct AttemptOutcome {
    attempt: u32,
    answer: String,
    sources: Vec<ScoredDocument>,
    confidence: ConfidenceBreakdown,
    evaluation: EvaluationResult,
    degraded: Vec<String>,
}

impl AttemptOutcome {
    fn empty(attempt: u32) -> Self {
        Self {
            attempt,
            answer: String::new(),
            sources: Vec::new(),
            confidence: ConfidenceBreakdown::default(),
            evaluation: EvaluationResult::default(),
            degraded: Vec::new(),
        }
    }

    /// An attempt with generated text beats one without; then confidence.
    fn is_better_than(&self, other: &AttemptOutcome) -> bool {
        let has_answer = !self.answer.trim().is_empty();
        let other_has_answer = !other.answer.trim().is_empty();
        if has_answer != other_has_answer {
            return has_answer;
        }
        self.confidence.overall > other.confidence.overall
    }
}

/// State of one query run. Created per query and never shared.
#[derive(Debug)]
pub struct OrchestratorContext {
    pub query_id: QueryId,
    pub attempt: u32,
    pub state: RunState,
    /// Capabilities whose steps failed on an earlier attempt.
    pub excluded: BTreeSet<CapabilityKind>,
    started: Instant,
    budget: Duration,
    max_attempts: u32,
    best: Option<AttemptOutcome>,
}

impl OrchestratorContext {
    pub fn new(query_id: QueryId, policy: &ExecutionPolicy) -> Self {
        Self {
            query_id,
            attempt: 1,
            state: RunState::Analyzing,
            excluded: BTreeSet::new(),
            started: Instant::now(),
            budget: policy.total_budget,
            max_attempts: policy.max_attempts,
            best: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn budget_remaining(&self) -> bool {
        !self.remaining().is_zero()
    }

    /// Deadline of the whole run.
    pub fn deadline(&self) -> Instant {
        self.started + self.budget
    }

    /// A stage never gets more time than the run has left.
    pub fn limit(&self, configured: Duration) -> Duration {
        configured.min(self.remaining())
    }

    pub fn run_context(&self) -> RunContext {
        RunContext {
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            budget_remaining: self.budget_remaining(),
        }
    }

    fn record(&mut self, outcome: AttemptOutcome) {
        let replace = match &self.best {
            Some(best) => outcome.is_better_than(best),
            None => true,
        };
        if replace {
            self.best = Some(outcome);
        }
    }
}

pub struct Orchestrator {
    policy: ExecutionPolicy,
    registry: Arc<CapabilityRegistry>,
    analyzer: QueryAnalyzer,
    router: CapabilityRouter,
    retriever: EvidenceRetriever,
    reranker: Reranker,
    generator: ResponseGenerator,
    similarity: Arc<dyn SimilarityService>,
    evaluator: Evaluator,
    calibrator: Calibrator,
    delivery: AdaptiveDeliveryManager,
    overall_weights: OverallWeights,
    flow: FlowEngine<QueryRunFlow>,
    events: Arc<dyn EventSink>,
}

impl Orchestrator {
    /// Fails only when the calibration settings cannot produce a calibrator.
    pub fn new(
        config: &AssayConfig,
        registry: Arc<CapabilityRegistry>,
        collaborators: Collaborators,
        caches: SharedCaches,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, OrchestrationError> {
        let calibrator = config.calibration.build()?;

        Ok(Self {
            policy: ExecutionPolicy::from_config(&config.orchestrator),
            registry,
            analyzer: QueryAnalyzer::with_weights(config.analyzer.complexity_weights),
            router: CapabilityRouter,
            retriever: EvidenceRetriever::new(
                collaborators.vector_store,
                caches.evidence,
                config.retrieval.clone(),
            ),
            reranker: Reranker::new(
                Arc::clone(&collaborators.similarity),
                caches.similarity,
                config.reranking.weights,
            ),
            generator: ResponseGenerator::new(collaborators.generation, config.generation.clone()),
            similarity: collaborators.similarity,
            evaluator: Evaluator::new(config.evaluation.support_threshold),
            calibrator,
            delivery: AdaptiveDeliveryManager::new(config.delivery),
            overall_weights: config.orchestrator.overall_weights,
            flow: FlowEngine::default(),
            events,
        })
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Runs one query to a delivered answer. Only an empty query is an
    /// error here; every other failure degrades the answer instead.
    pub async fn run(&self, query: &Query) -> Result<ExecutionResult, OrchestrationError> {
        if query.is_blank() {
            return Err(OrchestrationError::EmptyQuery);
        }

        let mut ctx = OrchestratorContext::new(query.id().clone(), &self.policy);
        info!(
            event_name = "orchestrator.run.started",
            query_id = %ctx.query_id,
            max_attempts = self.policy.max_attempts,
            budget_ms = self.policy.total_budget.as_millis() as u64,
            "query run started"
        );

        loop {
            self.run_attempt(query, &mut ctx).await?;
            if ctx.state != RunState::Replanning {
                break;
            }

            let wait = ctx.limit(self.policy.replan_delay);
            info!(
                event_name = "orchestrator.replan.scheduled",
                query_id = %ctx.query_id,
                attempt = ctx.attempt,
                excluded = ?ctx.excluded,
                wait_ms = wait.as_millis() as u64,
                "replanning"
            );
            tokio::time::sleep(wait).await;
            if self.exhausted(&mut ctx) {
                break;
            }
            ctx.attempt += 1;
            self.transition(&mut ctx, RunEvent::ReplanStarted);
        }

        if ctx.state != RunState::Delivering {
            self.transition(&mut ctx, RunEvent::BudgetExhausted);
        }
        Ok(self.deliver(&mut ctx))
    }

    async fn run_attempt(
        &self,
        query: &Query,
        ctx: &mut OrchestratorContext,
    ) -> Result<(), OrchestrationError> {
        let attempt = ctx.attempt;
        let text = query.text();
        info!(
            event_name = "orchestrator.attempt.started",
            query_id = %ctx.query_id,
            attempt,
            remaining_ms = ctx.remaining().as_millis() as u64,
            "attempt started"
        );

        let analysis = self.analyzer.analyze(query)?;
        debug!(
            event_name = "orchestrator.analysis.completed",
            query_id = %ctx.query_id,
            attempt,
            complexity = analysis.complexity,
            intents = ?analysis.intents,
            domains = ?analysis.domains,
            "query analyzed"
        );
        self.transition(ctx, RunEvent::AnalysisCompleted);
        if self.exhausted(ctx) {
            return Ok(());
        }

        let route = match self.router.route(&self.registry, &analysis, &ctx.excluded) {
            Ok(route) => route,
            Err(error) => {
                warn!(
                    event_name = "orchestrator.routing.empty",
                    query_id = %ctx.query_id,
                    attempt,
                    error = %error,
                    "no capability selected"
                );
                RouteDecision::default()
            }
        };
        for (failed, replacement) in &route.substitutions {
            info!(
                event_name = "orchestrator.fallback.selected",
                query_id = %ctx.query_id,
                attempt,
                failed = %failed,
                replacement = %replacement,
                "fallback capability selected"
            );
        }

        let mut plan = build_plan(text, &route, self.policy.strategy);
        let executor = PlanExecutor::new(Arc::clone(&self.registry), self.policy.per_step_timeout);
        let report = executor.execute(&mut plan, text, attempt, ctx.deadline()).await;
        let capability_failed = report.failures().next().is_some();
        for error in report.failures() {
            let error = OrchestrationError::from(error.clone());
            warn!(
                event_name = "orchestrator.capability.failed",
                query_id = %ctx.query_id,
                attempt,
                error_class = error.error_class(),
                error = %error,
                "capability step failed"
            );
        }
        ctx.excluded.extend(report.failed_capabilities());
        self.transition(ctx, RunEvent::RoutingCompleted);
        if self.exhausted(ctx) {
            return Ok(());
        }

        let mut degraded = Vec::new();
        let stage_limit = ctx.limit(self.policy.per_stage_timeout);
        let retrieved = timeout(
            stage_limit,
            self.retriever.retrieve(text, analysis.complexity, attempt),
        )
        .await;
        let candidates = match retrieved {
            Ok(Ok(documents)) => documents,
            Ok(Err(error)) => {
                let error = OrchestrationError::RetrievalUnavailable(error.to_string());
                self.log_degraded(ctx, error);
                degraded.push("retrieval".to_owned());
                Vec::new()
            }
            Err(_) => {
                self.log_degraded(
                    ctx,
                    OrchestrationError::RetrievalUnavailable(format!(
                        "timed out after {}ms",
                        stage_limit.as_millis()
                    )),
                );
                degraded.push("retrieval".to_owned());
                Vec::new()
            }
        };

        let stage_limit = ctx.limit(self.policy.per_stage_timeout);
        let sources =
            match timeout(stage_limit, self.reranker.rerank(text, candidates.clone())).await {
                Ok(ranked) => ranked,
                Err(_) => {
                    warn!(
                        event_name = "orchestrator.rerank.degraded",
                        query_id = %ctx.query_id,
                        attempt,
                        timeout_ms = stage_limit.as_millis() as u64,
                        "re-ranking timed out, using lexical similarity"
                    );
                    degraded.push("re-ranking".to_owned());
                    self.reranker.rerank_lexical(text, candidates)
                }
            };
        let retrieval = retrieval_confidence(&sources);
        self.transition(ctx, RunEvent::EvidenceRetrieved);
        if self.exhausted(ctx) {
            ctx.record(AttemptOutcome {
                sources,
                confidence: ConfidenceBreakdown { retrieval, ..Default::default() },
                degraded,
                ..AttemptOutcome::empty(attempt)
            });
            return Ok(());
        }

        let notes = report.notes();
        let stage_limit = ctx.limit(self.policy.per_stage_timeout);
        let generated =
            timeout(stage_limit, self.generator.generate(text, &sources, &notes, attempt)).await;
        let generation = match generated {
            Ok(Ok(generation)) => generation,
            failure => {
                let error = generation_error(failure.ok().and_then(Result::err), stage_limit);
                warn!(
                    event_name = "orchestrator.generation.failed",
                    query_id = %ctx.query_id,
                    attempt,
                    error_class = error.error_class(),
                    error = %error,
                    "generation failed"
                );
                degraded.push("generation".to_owned());
                let raw = overall_raw_confidence(retrieval, 0.0, 0.0, &self.overall_weights);
                ctx.record(AttemptOutcome {
                    sources,
                    confidence: ConfidenceBreakdown {
                        retrieval,
                        generation: 0.0,
                        overall: self.calibrator.apply(raw).value,
                    },
                    degraded,
                    ..AttemptOutcome::empty(attempt)
                });
                self.transition(ctx, RunEvent::StageFailed);
                return Ok(());
            }
        };
        self.transition(ctx, RunEvent::AnswerGenerated);
        if self.exhausted(ctx) {
            ctx.record(AttemptOutcome {
                answer: generation.text,
                sources,
                confidence: ConfidenceBreakdown {
                    retrieval,
                    generation: generation.aggregated_confidence,
                    overall: 0.0,
                },
                degraded,
                ..AttemptOutcome::empty(attempt)
            });
            return Ok(());
        }

        let semantic_similarity = self.semantic_similarity(ctx, text, &generation.text).await;
        let evaluation = self.evaluator.evaluate(&EvaluationInput {
            query: text,
            answer: &generation.text,
            evidence: &sources,
            semantic_similarity,
            task_type: analysis.primary_intent(),
        });
        let generation_confidence = generation.aggregated_confidence.clamp(0.0, 1.0);
        let raw = overall_raw_confidence(
            retrieval,
            generation_confidence,
            evaluation.raw_overall,
            &self.overall_weights,
        );
        let calibrated = self.calibrator.apply(raw);
        let confidence = ConfidenceBreakdown {
            retrieval,
            generation: generation_confidence,
            overall: calibrated.value,
        };
        info!(
            event_name = "orchestrator.attempt.evaluated",
            query_id = %ctx.query_id,
            attempt,
            retrieval = confidence.retrieval,
            generation = confidence.generation,
            evaluation = evaluation.raw_overall,
            raw_overall = raw,
            overall = confidence.overall,
            method = calibrated.method.as_str(),
            sources = sources.len(),
            "attempt evaluated"
        );

        ctx.record(AttemptOutcome {
            attempt,
            answer: generation.text,
            sources,
            confidence,
            evaluation,
            degraded,
        });

        let event = if capability_failed {
            RunEvent::StageFailed
        } else if confidence.overall >= self.policy.replan_threshold {
            RunEvent::ConfidenceAccepted
        } else {
            RunEvent::ConfidenceInsufficient
        };
        self.transition(ctx, event);
        Ok(())
    }

    async fn semantic_similarity(
        &self,
        ctx: &OrchestratorContext,
        query: &str,
        answer: &str,
    ) -> f64 {
        let stage_limit = ctx.limit(self.policy.per_stage_timeout);
        match timeout(stage_limit, self.similarity.similarity(query, answer)).await {
            Ok(Ok(value)) if value.is_finite() => value.clamp(0.0, 1.0),
            outcome => {
                let reason = match outcome {
                    Ok(Err(error)) => error.to_string(),
                    Ok(Ok(value)) => format!("non-finite similarity {value}"),
                    Err(_) => format!("timed out after {}ms", stage_limit.as_millis()),
                };
                warn!(
                    event_name = "orchestrator.similarity.fallback",
                    query_id = %ctx.query_id,
                    attempt = ctx.attempt,
                    reason = %reason,
                    "similarity unavailable for evaluation, using lexical similarity"
                );
                lexical_similarity(query, answer)
            }
        }
    }

    fn deliver(&self, ctx: &mut OrchestratorContext) -> ExecutionResult {
        let best = ctx.best.take().unwrap_or_else(|| AttemptOutcome::empty(ctx.attempt));
        let forced = best.confidence.overall < self.policy.replan_threshold;
        let response = self.delivery.deliver(&DeliveryRequest {
            answer: &best.answer,
            calibrated_confidence: best.confidence.overall,
            sources: &best.sources,
            degraded_stages: &best.degraded,
            forced,
        });

        let event = if forced { RunEvent::DeliveredDegraded } else { RunEvent::Delivered };
        self.transition(ctx, event);

        let elapsed_ms = ctx.elapsed().as_millis() as u64;
        info!(
            event_name = "orchestrator.run.completed",
            query_id = %ctx.query_id,
            attempts = ctx.attempt,
            best_attempt = best.attempt,
            final_state = %ctx.state,
            tier = %response.tier,
            overall = best.confidence.overall,
            elapsed_ms,
            "query run completed"
        );

        ExecutionResult {
            query_id: ctx.query_id.clone(),
            response,
            confidence: best.confidence,
            evaluation: best.evaluation,
            sources: best.sources,
            attempts_used: ctx.attempt,
            final_state: ctx.state,
            elapsed_ms,
        }
    }

    /// Forces delivery once the wall-clock budget is spent.
    fn exhausted(&self, ctx: &mut OrchestratorContext) -> bool {
        if ctx.budget_remaining() {
            return false;
        }
        warn!(
            event_name = "orchestrator.budget.exhausted",
            query_id = %ctx.query_id,
            attempt = ctx.attempt,
            state = %ctx.state,
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "wall-clock budget exhausted"
        );
        self.transition(ctx, RunEvent::BudgetExhausted);
        true
    }

    fn transition(&self, ctx: &mut OrchestratorContext, event: RunEvent) {
        let outcome = self.flow.apply_with_events(
            &ctx.state,
            &event,
            &ctx.run_context(),
            self.events.as_ref(),
            &ctx.query_id,
        );
        match outcome {
            Ok(outcome) => {
                debug!(
                    event_name = "orchestrator.transition",
                    query_id = %ctx.query_id,
                    attempt = ctx.attempt,
                    from = %outcome.from,
                    to = %outcome.to,
                    event = outcome.event.as_str(),
                    "state transition"
                );
                ctx.state = outcome.to;
            }
            Err(error) => {
                warn!(
                    event_name = "orchestrator.transition.rejected",
                    query_id = %ctx.query_id,
                    attempt = ctx.attempt,
                    error = %error,
                    "state transition rejected"
                );
            }
        }
    }

    fn log_degraded(&self, ctx: &OrchestratorContext, error: OrchestrationError) {
        warn!(
            event_name = "orchestrator.retrieval.degraded",
            query_id = %ctx.query_id,
            attempt = ctx.attempt,
            error_class = error.error_class(),
            error = %error,
            "continuing without evidence"
        );
    }
}

/// A failed generation stage in the error taxonomy; `None` means the stage
/// timed out.
fn generation_error(error: Option<CollaboratorError>, stage_limit: Duration) -> OrchestrationError {
    match error {
        Some(error) => OrchestrationError::GenerationUnavailable(error.to_string()),
        None => {
            OrchestrationError::GenerationTimeout { timeout_ms: stage_limit.as_millis() as u64 }
        }
    }
}

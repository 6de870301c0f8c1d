//! Agent runtime - asynchronous orchestration of confidence-aware answers
//!
//! This crate drives one query from text to a delivered answer:
//! - Routes the query to registered capabilities and runs their plan steps
//! - Retrieves evidence from a vector store and re-ranks it
//! - Generates an answer from confidence-labeled context
//! - Evaluates and calibrates the answer, replanning while confidence is low
//!
//! # Architecture
//!
//! 1. **Routing** (`router`) - analysis terms → capabilities and fallbacks
//! 2. **Plan execution** (`executor`) - dependency waves of capability steps
//! 3. **Evidence** (`retrieval`, `rerank`, `cache`) - fetch, filter, re-rank
//! 4. **Generation** (`generation`) - prompt building and token confidence
//! 5. **Orchestration** (`orchestrator`) - state machine and replan loop
//!
//! External services are consumed through the traits in `collaborators`;
//! in-memory implementations there make the runtime usable offline.
//!
//! # Key Types
//!
//! - `Orchestrator` - runs a query to an `ExecutionResult`
//! - `CapabilityRegistry` - capabilities available to the router
//! - `ExecutionPolicy` - attempt cap, budget and timeouts

pub mod cache;
pub mod capability;
pub mod collaborators;
pub mod executor;
pub mod generation;
pub mod orchestrator;
pub mod progress;
pub mod rerank;
pub mod retrieval;
pub mod router;

pub use cache::{CacheReport, CacheStats, EvidenceCache, SharedCaches, SimilarityCache};
pub use capability::{CapabilityHandler, CapabilityRegistry, CapabilityTask, TemplateCapability};
pub use collaborators::{
    CorpusDocument, ExtractiveGenerator, GenerationOutput, GenerationService, KeywordVectorStore,
    LexicalSimilarity, SimilarityService, VectorHit, VectorStore,
};
pub use executor::{PlanExecutor, PlanReport, StepOutcome};
pub use generation::ResponseGenerator;
pub use orchestrator::{Collaborators, ExecutionPolicy, Orchestrator, OrchestratorContext};
pub use progress::ChannelEventSink;
pub use rerank::Reranker;
pub use retrieval::EvidenceRetriever;
pub use router::{build_plan, CapabilityRouter, RouteDecision};

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use assay_agent::{
    CacheReport, CapabilityRegistry, ChannelEventSink, Collaborators, KeywordVectorStore,
    Orchestrator, SharedCaches,
};
use assay_core::config::AssayConfig;
use assay_core::domain::execution::ExecutionResult;
use assay_core::domain::query::Query;
use assay_core::errors::OrchestrationError;
use serde::Serialize;
use tracing::{info, warn};

use super::{CommandResult, EXIT_CONFIG, EXIT_OK, EXIT_RUNTIME};
use crate::AskArgs;

const COMMAND: &str = "ask";

#[derive(Debug, Serialize)]
struct AskReport {
    result: ExecutionResult,
    caches: CacheReport,
}

pub fn run(config: &AssayConfig, args: &AskArgs) -> CommandResult {
    let store = match load_corpus(args.corpus.as_deref()) {
        Ok(store) => store,
        Err(error) => {
            return CommandResult::failure(COMMAND, "corpus", format!("{error:#}"), EXIT_RUNTIME)
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(COMMAND, "runtime", error.to_string(), EXIT_RUNTIME)
        }
    };

    let caches = SharedCaches::from_config(config);
    let outcome = runtime.block_on(answer(config, store, caches.clone(), &args.query));

    match outcome {
        Ok(result) if args.json => {
            CommandResult::report(COMMAND, &AskReport { result, caches: caches.report() })
        }
        Ok(result) => CommandResult { exit_code: EXIT_OK, output: render_text(&result) },
        Err(error) => {
            let exit_code = if matches!(error, OrchestrationError::CalibrationConfig(_)) {
                EXIT_CONFIG
            } else {
                EXIT_RUNTIME
            };
            CommandResult::failure(COMMAND, error.error_class(), error.to_string(), exit_code)
        }
    }
}

async fn answer(
    config: &AssayConfig,
    store: KeywordVectorStore,
    caches: SharedCaches,
    text: &str,
) -> Result<ExecutionResult, OrchestrationError> {
    let (sink, mut progress) = ChannelEventSink::new();
    let reporter = tokio::spawn(async move {
        while let Some(event) = progress.recv().await {
            info!(
                event_name = "cli.ask.progress",
                query_id = %event.query_id,
                stage = %event.stage,
                attempt = event.attempt,
                "run progressed"
            );
        }
    });

    let result = {
        let orchestrator = Orchestrator::new(
            config,
            Arc::new(CapabilityRegistry::with_standard_capabilities()),
            Collaborators::in_memory(store),
            caches,
            Arc::new(sink),
        )?;
        orchestrator.run(&Query::new(text, "cli")).await
    };

    // The orchestrator owned the only sender, so the reporter drains and exits.
    if let Err(error) = reporter.await {
        warn!(event_name = "cli.ask.progress_failed", error = %error, "progress reporter failed");
    }
    result
}

fn load_corpus(path: Option<&Path>) -> anyhow::Result<KeywordVectorStore> {
    let Some(path) = path else {
        warn!(
            event_name = "cli.ask.no_corpus",
            "no corpus given; answering without supporting documents"
        );
        return Ok(KeywordVectorStore::default());
    };

    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read corpus `{}`", path.display()))?;
    let store = KeywordVectorStore::from_json(&raw)
        .with_context(|| format!("could not parse corpus `{}`", path.display()))?;
    info!(event_name = "cli.ask.corpus_loaded", documents = store.len(), "corpus loaded");
    Ok(store)
}

fn render_text(result: &ExecutionResult) -> String {
    // Caveats are already part of the formatted answer.
    let mut lines = vec![result.response.formatted_text.clone(), String::new()];
    lines.push(format!(
        "tier: {} | confidence: {:.2} | attempts: {} | state: {} | elapsed: {}ms",
        result.response.tier,
        result.confidence.overall,
        result.attempts_used,
        result.final_state,
        result.elapsed_ms
    ));
    lines.join("\n")
}

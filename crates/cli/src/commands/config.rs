use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use assay_core::config::AssayConfig;
use serde::Serialize;
use toml::Value;

use super::CommandResult;

const COMMAND: &str = "config";

/// Keys whose origin is reported, with the environment variable that can
/// override each.
const ATTRIBUTED_KEYS: &[(&str, &str)] = &[
    ("retrieval.min_score", "ASSAY_RETRIEVAL_MIN_SCORE"),
    ("retrieval.cache_capacity", "ASSAY_RETRIEVAL_CACHE_CAPACITY"),
    ("retrieval.cache_ttl_secs", "ASSAY_RETRIEVAL_CACHE_TTL_SECS"),
    ("generation.temperature", "ASSAY_GENERATION_TEMPERATURE"),
    ("generation.context_documents", "ASSAY_GENERATION_CONTEXT_DOCUMENTS"),
    ("evaluation.support_threshold", "ASSAY_EVALUATION_SUPPORT_THRESHOLD"),
    ("calibration.method", "ASSAY_CALIBRATION_METHOD"),
    ("calibration.temperature", "ASSAY_CALIBRATION_TEMPERATURE"),
    ("orchestrator.max_attempts", "ASSAY_ORCHESTRATOR_MAX_ATTEMPTS"),
    ("orchestrator.total_budget_secs", "ASSAY_ORCHESTRATOR_TOTAL_BUDGET_SECS"),
    ("orchestrator.per_step_timeout_ms", "ASSAY_ORCHESTRATOR_PER_STEP_TIMEOUT_MS"),
    ("orchestrator.per_stage_timeout_ms", "ASSAY_ORCHESTRATOR_PER_STAGE_TIMEOUT_MS"),
    ("orchestrator.replan_delay_ms", "ASSAY_ORCHESTRATOR_REPLAN_DELAY_MS"),
    ("orchestrator.strategy", "ASSAY_ORCHESTRATOR_STRATEGY"),
    ("logging.level", "ASSAY_LOGGING_LEVEL"),
    ("logging.format", "ASSAY_LOGGING_FORMAT"),
];

#[derive(Debug, Serialize)]
struct ConfigReport<'a> {
    precedence: &'static str,
    config_file: Option<String>,
    sources: BTreeMap<&'static str, String>,
    config: &'a AssayConfig,
}

pub fn run(config: &AssayConfig, explicit_path: Option<&Path>) -> CommandResult {
    let config_file_path = detect_config_path(explicit_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let sources = ATTRIBUTED_KEYS
        .iter()
        .map(|(key_path, env_key)| {
            let source = field_source(
                key_path,
                env_key,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            );
            (*key_path, source)
        })
        .collect();

    let report = ConfigReport {
        precedence: "flag > env > file > default",
        config_file: config_file_path.map(|path| path.display().to_string()),
        sources,
        config,
    };
    CommandResult::report(COMMAND, &report)
}

fn detect_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("assay.toml"), PathBuf::from("config/assay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    let env_set = env::var(env_key).map(|value| !value.trim().is_empty()).unwrap_or(false);
    if env_set {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::contains_path;

    #[test]
    fn nested_keys_are_found_in_toml_documents() {
        let doc: Value = "[orchestrator]\nmax_attempts = 4\n".parse().expect("valid toml");

        assert!(contains_path(&doc, "orchestrator.max_attempts"));
        assert!(!contains_path(&doc, "orchestrator.strategy"));
        assert!(!contains_path(&doc, "logging.level"));
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analyzer::ComplexityWeights;
use crate::calibration::{CalibrationSample, Calibrator};
use crate::delivery::DeliveryThresholds;
use crate::domain::plan::PlanStrategy;
use crate::errors::CalibrationError;
use crate::scoring::{OverallWeights, RerankWeights};

#[derive(Clone, Debug, Serialize)]
pub struct AssayConfig {
    pub analyzer: AnalyzerConfig,
    pub retrieval: RetrievalConfig,
    pub reranking: RerankingConfig,
    pub generation: GenerationConfig,
    pub evaluation: EvaluationConfig,
    pub calibration: CalibrationConfig,
    pub delivery: DeliveryThresholds,
    pub orchestrator: OrchestratorConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize)]
pub struct AnalyzerConfig {
    pub complexity_weights: ComplexityWeights,
}

#[derive(Clone, Debug, Serialize)]
pub struct RetrievalConfig {
    pub min_score: f64,
    /// Candidates fetched for complexity 1..=3.
    pub breadth_low: usize,
    /// Candidates fetched for complexity 4..=6.
    pub breadth_medium: usize,
    /// Candidates fetched for complexity 7 and above.
    pub breadth_high: usize,
    pub cache_capacity: u64,
    pub cache_ttl_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct RerankingConfig {
    pub weights: RerankWeights,
    pub similarity_cache_capacity: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct GenerationConfig {
    pub temperature: f64,
    /// Multiplier applied to the temperature on every replan.
    pub temperature_decay: f64,
    pub context_documents: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct EvaluationConfig {
    pub support_threshold: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct CalibrationConfig {
    pub method: String,
    pub temperature: f64,
    /// Held-out `(raw, outcome)` pairs for isotonic and Platt fitting.
    pub samples: Vec<CalibrationSample>,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrchestratorConfig {
    pub max_attempts: u32,
    pub total_budget_secs: u64,
    pub per_step_timeout_ms: u64,
    pub per_stage_timeout_ms: u64,
    pub replan_delay_ms: u64,
    pub replan_threshold: f64,
    pub strategy: PlanStrategy,
    pub overall_weights: OverallWeights,
}

#[derive(Clone, Debug, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub calibration_method: Option<String>,
    pub max_attempts: Option<u32>,
    pub total_budget_secs: Option<u64>,
    pub min_retrieval_score: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("calibration configuration is invalid: {0}")]
    Calibration(#[from] CalibrationError),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AssayConfig {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerConfig { complexity_weights: ComplexityWeights::default() },
            retrieval: RetrievalConfig {
                min_score: 0.6,
                breadth_low: 5,
                breadth_medium: 10,
                breadth_high: 20,
                cache_capacity: 1_024,
                cache_ttl_secs: 300,
            },
            reranking: RerankingConfig {
                weights: RerankWeights::default(),
                similarity_cache_capacity: 4_096,
            },
            generation: GenerationConfig {
                temperature: 0.7,
                temperature_decay: 0.75,
                context_documents: 5,
            },
            evaluation: EvaluationConfig { support_threshold: 0.5 },
            calibration: CalibrationConfig {
                method: "temperature".to_string(),
                temperature: 1.5,
                samples: Vec::new(),
            },
            delivery: DeliveryThresholds::default(),
            orchestrator: OrchestratorConfig {
                max_attempts: 3,
                total_budget_secs: 120,
                per_step_timeout_ms: 15_000,
                per_stage_timeout_ms: 30_000,
                replan_delay_ms: 250,
                replan_threshold: 0.6,
                strategy: PlanStrategy::Adaptive,
                overall_weights: OverallWeights::default(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl RetrievalConfig {
    /// Step function of complexity: 1..=3 low, 4..=6 medium, 7+ high.
    pub fn breadth_for(&self, complexity: u8) -> usize {
        match complexity {
            0..=3 => self.breadth_low,
            4..=6 => self.breadth_medium,
            _ => self.breadth_high,
        }
    }
}

impl GenerationConfig {
    /// Temperature for a 1-based attempt number.
    pub fn temperature_for_attempt(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        self.temperature * self.temperature_decay.powi(exponent)
    }
}

impl CalibrationConfig {
    pub fn build(&self) -> Result<Calibrator, CalibrationError> {
        Calibrator::from_settings(&self.method, self.temperature, &self.samples)
    }
}

impl AssayConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("assay.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(analyzer) = patch.analyzer {
            if let Some(weights) = analyzer.complexity_weights {
                self.analyzer.complexity_weights = weights;
            }
        }

        if let Some(retrieval) = patch.retrieval {
            if let Some(min_score) = retrieval.min_score {
                self.retrieval.min_score = min_score;
            }
            if let Some(breadth_low) = retrieval.breadth_low {
                self.retrieval.breadth_low = breadth_low;
            }
            if let Some(breadth_medium) = retrieval.breadth_medium {
                self.retrieval.breadth_medium = breadth_medium;
            }
            if let Some(breadth_high) = retrieval.breadth_high {
                self.retrieval.breadth_high = breadth_high;
            }
            if let Some(cache_capacity) = retrieval.cache_capacity {
                self.retrieval.cache_capacity = cache_capacity;
            }
            if let Some(cache_ttl_secs) = retrieval.cache_ttl_secs {
                self.retrieval.cache_ttl_secs = cache_ttl_secs;
            }
        }

        if let Some(reranking) = patch.reranking {
            if let Some(weights) = reranking.weights {
                self.reranking.weights = weights;
            }
            if let Some(capacity) = reranking.similarity_cache_capacity {
                self.reranking.similarity_cache_capacity = capacity;
            }
        }

        if let Some(generation) = patch.generation {
            if let Some(temperature) = generation.temperature {
                self.generation.temperature = temperature;
            }
            if let Some(decay) = generation.temperature_decay {
                self.generation.temperature_decay = decay;
            }
            if let Some(context_documents) = generation.context_documents {
                self.generation.context_documents = context_documents;
            }
        }

        if let Some(evaluation) = patch.evaluation {
            if let Some(support_threshold) = evaluation.support_threshold {
                self.evaluation.support_threshold = support_threshold;
            }
        }

        if let Some(calibration) = patch.calibration {
            if let Some(method) = calibration.method {
                self.calibration.method = method;
            }
            if let Some(temperature) = calibration.temperature {
                self.calibration.temperature = temperature;
            }
            if let Some(samples) = calibration.samples {
                self.calibration.samples = samples;
            }
        }

        if let Some(delivery) = patch.delivery {
            self.delivery = delivery;
        }

        if let Some(orchestrator) = patch.orchestrator {
            if let Some(max_attempts) = orchestrator.max_attempts {
                self.orchestrator.max_attempts = max_attempts;
            }
            if let Some(total_budget_secs) = orchestrator.total_budget_secs {
                self.orchestrator.total_budget_secs = total_budget_secs;
            }
            if let Some(per_step_timeout_ms) = orchestrator.per_step_timeout_ms {
                self.orchestrator.per_step_timeout_ms = per_step_timeout_ms;
            }
            if let Some(per_stage_timeout_ms) = orchestrator.per_stage_timeout_ms {
                self.orchestrator.per_stage_timeout_ms = per_stage_timeout_ms;
            }
            if let Some(replan_delay_ms) = orchestrator.replan_delay_ms {
                self.orchestrator.replan_delay_ms = replan_delay_ms;
            }
            if let Some(replan_threshold) = orchestrator.replan_threshold {
                self.orchestrator.replan_threshold = replan_threshold;
            }
            if let Some(strategy) = orchestrator.strategy {
                self.orchestrator.strategy = strategy;
            }
            if let Some(overall_weights) = orchestrator.overall_weights {
                self.orchestrator.overall_weights = overall_weights;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ASSAY_RETRIEVAL_MIN_SCORE") {
            self.retrieval.min_score = parse_f64("ASSAY_RETRIEVAL_MIN_SCORE", &value)?;
        }
        if let Some(value) = read_env("ASSAY_RETRIEVAL_CACHE_CAPACITY") {
            self.retrieval.cache_capacity = parse_u64("ASSAY_RETRIEVAL_CACHE_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("ASSAY_RETRIEVAL_CACHE_TTL_SECS") {
            self.retrieval.cache_ttl_secs = parse_u64("ASSAY_RETRIEVAL_CACHE_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("ASSAY_GENERATION_TEMPERATURE") {
            self.generation.temperature = parse_f64("ASSAY_GENERATION_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("ASSAY_GENERATION_CONTEXT_DOCUMENTS") {
            self.generation.context_documents =
                parse_usize("ASSAY_GENERATION_CONTEXT_DOCUMENTS", &value)?;
        }

        if let Some(value) = read_env("ASSAY_EVALUATION_SUPPORT_THRESHOLD") {
            self.evaluation.support_threshold =
                parse_f64("ASSAY_EVALUATION_SUPPORT_THRESHOLD", &value)?;
        }

        if let Some(value) = read_env("ASSAY_CALIBRATION_METHOD") {
            self.calibration.method = value;
        }
        if let Some(value) = read_env("ASSAY_CALIBRATION_TEMPERATURE") {
            self.calibration.temperature = parse_f64("ASSAY_CALIBRATION_TEMPERATURE", &value)?;
        }

        if let Some(value) = read_env("ASSAY_ORCHESTRATOR_MAX_ATTEMPTS") {
            self.orchestrator.max_attempts = parse_u32("ASSAY_ORCHESTRATOR_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("ASSAY_ORCHESTRATOR_TOTAL_BUDGET_SECS") {
            self.orchestrator.total_budget_secs =
                parse_u64("ASSAY_ORCHESTRATOR_TOTAL_BUDGET_SECS", &value)?;
        }
        if let Some(value) = read_env("ASSAY_ORCHESTRATOR_PER_STEP_TIMEOUT_MS") {
            self.orchestrator.per_step_timeout_ms =
                parse_u64("ASSAY_ORCHESTRATOR_PER_STEP_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("ASSAY_ORCHESTRATOR_PER_STAGE_TIMEOUT_MS") {
            self.orchestrator.per_stage_timeout_ms =
                parse_u64("ASSAY_ORCHESTRATOR_PER_STAGE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("ASSAY_ORCHESTRATOR_REPLAN_DELAY_MS") {
            self.orchestrator.replan_delay_ms =
                parse_u64("ASSAY_ORCHESTRATOR_REPLAN_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("ASSAY_ORCHESTRATOR_STRATEGY") {
            self.orchestrator.strategy =
                value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "ASSAY_ORCHESTRATOR_STRATEGY".to_string(),
                    value: value.clone(),
                })?;
        }

        let log_level = read_env("ASSAY_LOGGING_LEVEL").or_else(|| read_env("ASSAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("ASSAY_LOGGING_FORMAT").or_else(|| read_env("ASSAY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(method) = overrides.calibration_method {
            self.calibration.method = method;
        }
        if let Some(max_attempts) = overrides.max_attempts {
            self.orchestrator.max_attempts = max_attempts;
        }
        if let Some(total_budget_secs) = overrides.total_budget_secs {
            self.orchestrator.total_budget_secs = total_budget_secs;
        }
        if let Some(min_score) = overrides.min_retrieval_score {
            self.retrieval.min_score = min_score;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_analyzer(&self.analyzer)?;
        validate_retrieval(&self.retrieval)?;
        validate_reranking(&self.reranking)?;
        validate_generation(&self.generation)?;
        validate_unit("evaluation.support_threshold", self.evaluation.support_threshold)?;
        self.calibration.build()?;
        validate_delivery(&self.delivery)?;
        validate_orchestrator(&self.orchestrator)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("assay.toml"), PathBuf::from("config/assay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_unit(key: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must be in range 0.0..=1.0, got {value}")))
    }
}

fn validate_analyzer(analyzer: &AnalyzerConfig) -> Result<(), ConfigError> {
    if !analyzer.complexity_weights.is_valid() {
        return Err(ConfigError::Validation(
            "analyzer.complexity_weights must be non-negative with a positive sum".to_string(),
        ));
    }
    Ok(())
}

fn validate_retrieval(retrieval: &RetrievalConfig) -> Result<(), ConfigError> {
    validate_unit("retrieval.min_score", retrieval.min_score)?;

    if retrieval.breadth_low == 0 {
        return Err(ConfigError::Validation(
            "retrieval.breadth_low must be greater than zero".to_string(),
        ));
    }
    if retrieval.breadth_low > retrieval.breadth_medium
        || retrieval.breadth_medium > retrieval.breadth_high
    {
        return Err(ConfigError::Validation(
            "retrieval breadth must not shrink with complexity \
             (breadth_low <= breadth_medium <= breadth_high)"
                .to_string(),
        ));
    }

    if retrieval.cache_capacity == 0 {
        return Err(ConfigError::Validation(
            "retrieval.cache_capacity must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_reranking(reranking: &RerankingConfig) -> Result<(), ConfigError> {
    if !reranking.weights.is_valid() {
        return Err(ConfigError::Validation(
            "reranking.weights must be non-negative with a positive sum".to_string(),
        ));
    }
    if reranking.similarity_cache_capacity == 0 {
        return Err(ConfigError::Validation(
            "reranking.similarity_cache_capacity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_generation(generation: &GenerationConfig) -> Result<(), ConfigError> {
    if !(0.0..=2.0).contains(&generation.temperature) {
        return Err(ConfigError::Validation(
            "generation.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }
    if !(generation.temperature_decay > 0.0 && generation.temperature_decay <= 1.0) {
        return Err(ConfigError::Validation(
            "generation.temperature_decay must be in range (0.0, 1.0]".to_string(),
        ));
    }
    if generation.context_documents == 0 {
        return Err(ConfigError::Validation(
            "generation.context_documents must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_delivery(delivery: &DeliveryThresholds) -> Result<(), ConfigError> {
    if !delivery.is_valid() {
        return Err(ConfigError::Validation(
            "delivery thresholds must lie in 0.0..=1.0 with low <= medium <= high".to_string(),
        ));
    }
    Ok(())
}

fn validate_orchestrator(orchestrator: &OrchestratorConfig) -> Result<(), ConfigError> {
    if orchestrator.max_attempts == 0 || orchestrator.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "orchestrator.max_attempts must be in range 1..=10".to_string(),
        ));
    }
    if orchestrator.total_budget_secs == 0 || orchestrator.total_budget_secs > 3_600 {
        return Err(ConfigError::Validation(
            "orchestrator.total_budget_secs must be in range 1..=3600".to_string(),
        ));
    }
    if orchestrator.per_step_timeout_ms == 0 || orchestrator.per_stage_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "orchestrator step and stage timeouts must be greater than zero".to_string(),
        ));
    }
    validate_unit("orchestrator.replan_threshold", orchestrator.replan_threshold)?;
    if !orchestrator.overall_weights.is_valid() {
        return Err(ConfigError::Validation(
            "orchestrator.overall_weights must be non-negative with a positive sum".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
        .ok_or_else(|| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    analyzer: Option<AnalyzerPatch>,
    retrieval: Option<RetrievalPatch>,
    reranking: Option<RerankingPatch>,
    generation: Option<GenerationPatch>,
    evaluation: Option<EvaluationPatch>,
    calibration: Option<CalibrationPatch>,
    delivery: Option<DeliveryThresholds>,
    orchestrator: Option<OrchestratorPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyzerPatch {
    complexity_weights: Option<ComplexityWeights>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalPatch {
    min_score: Option<f64>,
    breadth_low: Option<usize>,
    breadth_medium: Option<usize>,
    breadth_high: Option<usize>,
    cache_capacity: Option<u64>,
    cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RerankingPatch {
    weights: Option<RerankWeights>,
    similarity_cache_capacity: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerationPatch {
    temperature: Option<f64>,
    temperature_decay: Option<f64>,
    context_documents: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct EvaluationPatch {
    support_threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct CalibrationPatch {
    method: Option<String>,
    temperature: Option<f64>,
    samples: Option<Vec<CalibrationSample>>,
}

#[derive(Debug, Default, Deserialize)]
struct OrchestratorPatch {
    max_attempts: Option<u32>,
    total_budget_secs: Option<u64>,
    per_step_timeout_ms: Option<u64>,
    per_stage_timeout_ms: Option<u64>,
    replan_delay_ms: Option<u64>,
    replan_threshold: Option<f64>,
    strategy: Option<PlanStrategy>,
    overall_weights: Option<OverallWeights>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

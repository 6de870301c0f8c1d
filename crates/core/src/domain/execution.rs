use serde::{Deserialize, Serialize};

use crate::domain::confidence::{DeliveryResult, EvaluationResult};
use crate::domain::evidence::ScoredDocument;
use crate::domain::query::QueryId;
use crate::flows::RunState;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub retrieval: f64,
    pub generation: f64,
    pub overall: f64,
}

impl ConfidenceBreakdown {
    pub fn is_within_unit_interval(&self) -> bool {
        [self.retrieval, self.generation, self.overall]
            .iter()
            .all(|value| (0.0..=1.0).contains(value))
    }
}

/// Terminal artifact of one orchestrator run. Always carries an answer, even
/// when the run ended in `Failed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub query_id: QueryId,
    pub response: DeliveryResult,
    pub confidence: ConfidenceBreakdown,
    pub evaluation: EvaluationResult,
    pub sources: Vec<ScoredDocument>,
    pub attempts_used: u32,
    pub final_state: RunState,
    pub elapsed_ms: u64,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.final_state == RunState::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::ConfidenceBreakdown;

    #[test]
    fn breakdown_bounds_check_rejects_out_of_range_values() {
        let valid = ConfidenceBreakdown { retrieval: 0.0, generation: 0.5, overall: 1.0 };
        assert!(valid.is_within_unit_interval());

        let invalid = ConfidenceBreakdown { retrieval: -0.1, ..valid };
        assert!(!invalid.is_within_unit_interval());
    }
}

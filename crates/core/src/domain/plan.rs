use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::capability::CapabilityKind;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(pub String);

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStrategy {
    Sequential,
    Parallel,
    Adaptive,
}

impl PlanStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Adaptive => "adaptive",
        }
    }
}

impl std::str::FromStr for PlanStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(format!(
                "unsupported plan strategy `{other}` (expected sequential|parallel|adaptive)"
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Running,
    Completed,
    PartiallyCompleted,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: StepId,
    pub capability: CapabilityKind,
    pub task: String,
    pub depends_on: Vec<StepId>,
    pub status: StepStatus,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: StepId, dependency: StepId },
    #[error("plan steps form a cycle through {0:?}")]
    Cycle(Vec<StepId>),
    #[error("step {0} is not part of this plan")]
    UnknownStep(StepId),
}

/// A DAG of capability steps owned by one orchestrator attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub goal: String,
    pub steps: Vec<PlanStep>,
    pub strategy: PlanStrategy,
    pub status: PlanStatus,
}

impl Plan {
    pub fn new(goal: impl Into<String>, strategy: PlanStrategy) -> Self {
        Self {
            id: PlanId(Uuid::new_v4().to_string()),
            goal: goal.into(),
            steps: Vec::new(),
            strategy,
            status: PlanStatus::Pending,
        }
    }

    /// Appends a step and returns its id. Ids are positional (`step-1`, ...)
    /// so they stay readable in events and logs.
    pub fn add_step(
        &mut self,
        capability: CapabilityKind,
        task: impl Into<String>,
        depends_on: Vec<StepId>,
    ) -> StepId {
        let id = StepId(format!("step-{}", self.steps.len() + 1));
        self.steps.push(PlanStep {
            id: id.clone(),
            capability,
            task: task.into(),
            depends_on,
            status: StepStatus::Pending,
        });
        id
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, id: &StepId) -> Option<&PlanStep> {
        self.steps.iter().find(|step| &step.id == id)
    }

    /// Checks that every dependency exists and that the steps are acyclic
    /// (Kahn's algorithm).
    pub fn validate(&self) -> Result<(), PlanError> {
        let known: BTreeSet<&StepId> = self.steps.iter().map(|step| &step.id).collect();
        for step in &self.steps {
            if let Some(missing) = step.depends_on.iter().find(|dep| !known.contains(dep)) {
                return Err(PlanError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        let mut in_degree: BTreeMap<&StepId, usize> =
            self.steps.iter().map(|step| (&step.id, step.depends_on.len())).collect();
        let mut queue: VecDeque<&StepId> =
            in_degree.iter().filter(|(_, degree)| **degree == 0).map(|(id, _)| *id).collect();
        let mut visited = 0usize;

        while let Some(id) = queue.pop_front() {
            visited += 1;
            for dependent in self.steps.iter().filter(|step| step.depends_on.contains(id)) {
                if let Some(degree) = in_degree.get_mut(&dependent.id) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(&dependent.id);
                    }
                }
            }
        }

        if visited == self.steps.len() {
            Ok(())
        } else {
            let cyclic = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id.clone())
                .collect();
            Err(PlanError::Cycle(cyclic))
        }
    }

    /// Pending steps whose dependencies have all reported `done`.
    pub fn eligible_steps(&self) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Pending)
            .filter(|step| {
                step.depends_on.iter().all(|dep| {
                    self.step(dep).map(|found| found.status == StepStatus::Done).unwrap_or(false)
                })
            })
            .map(|step| step.id.clone())
            .collect()
    }

    /// Pending steps that can never run because a dependency failed.
    pub fn blocked_steps(&self) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Pending)
            .filter(|step| {
                step.depends_on.iter().any(|dep| {
                    self.step(dep).map(|found| found.status == StepStatus::Failed).unwrap_or(true)
                })
            })
            .map(|step| step.id.clone())
            .collect()
    }

    pub fn set_step_status(&mut self, id: &StepId, status: StepStatus) -> Result<(), PlanError> {
        let step = self
            .steps
            .iter_mut()
            .find(|step| &step.id == id)
            .ok_or_else(|| PlanError::UnknownStep(id.clone()))?;
        step.status = status;
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.steps.iter().any(|step| step.status == StepStatus::Pending)
    }

    /// Derives the terminal plan status from step outcomes.
    pub fn settle(&mut self) -> PlanStatus {
        let done = self.steps.iter().filter(|step| step.status == StepStatus::Done).count();
        let failed = self.steps.iter().filter(|step| step.status == StepStatus::Failed).count();
        self.status = match (done, failed) {
            (_, 0) => PlanStatus::Completed,
            (0, _) => PlanStatus::Failed,
            _ => PlanStatus::PartiallyCompleted,
        };
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::{Plan, PlanError, PlanStatus, PlanStrategy, StepId, StepStatus};
    use crate::domain::capability::CapabilityKind;

    fn two_wave_plan() -> (Plan, StepId, StepId, StepId) {
        let mut plan = Plan::new("explain and write up", PlanStrategy::Parallel);
        let research = plan.add_step(CapabilityKind::Research, "gather", vec![]);
        let code = plan.add_step(CapabilityKind::Code, "prototype", vec![]);
        let writing = plan.add_step(
            CapabilityKind::Writing,
            "summarize",
            vec![research.clone(), code.clone()],
        );
        (plan, research, code, writing)
    }

    #[test]
    fn eligible_steps_respect_dependencies() {
        let (mut plan, research, code, writing) = two_wave_plan();
        assert_eq!(plan.eligible_steps(), vec![research.clone(), code.clone()]);

        plan.set_step_status(&research, StepStatus::Done).expect("known step");
        assert_eq!(plan.eligible_steps(), vec![code.clone()]);

        plan.set_step_status(&code, StepStatus::Done).expect("known step");
        assert_eq!(plan.eligible_steps(), vec![writing]);
    }

    #[test]
    fn failed_dependency_blocks_dependents() {
        let (mut plan, research, code, writing) = two_wave_plan();
        plan.set_step_status(&research, StepStatus::Failed).expect("known step");
        plan.set_step_status(&code, StepStatus::Done).expect("known step");

        assert!(plan.eligible_steps().is_empty());
        assert_eq!(plan.blocked_steps(), vec![writing]);
    }

    #[test]
    fn validate_rejects_cycles_and_unknown_dependencies() {
        let (plan, ..) = two_wave_plan();
        assert_eq!(plan.validate(), Ok(()));

        let mut cyclic = Plan::new("loop", PlanStrategy::Sequential);
        cyclic.add_step(CapabilityKind::Research, "a", vec![StepId("step-2".to_string())]);
        cyclic.add_step(CapabilityKind::Code, "b", vec![StepId("step-1".to_string())]);
        assert!(matches!(cyclic.validate(), Err(PlanError::Cycle(ids)) if ids.len() == 2));

        let mut dangling = Plan::new("dangling", PlanStrategy::Sequential);
        dangling.add_step(CapabilityKind::Research, "a", vec![StepId("step-9".to_string())]);
        assert!(matches!(dangling.validate(), Err(PlanError::UnknownDependency { .. })));
    }

    #[test]
    fn settle_reports_partial_completion() {
        let (mut plan, research, code, writing) = two_wave_plan();
        plan.set_step_status(&research, StepStatus::Done).expect("known step");
        plan.set_step_status(&code, StepStatus::Failed).expect("known step");
        plan.set_step_status(&writing, StepStatus::Failed).expect("known step");
        assert_eq!(plan.settle(), PlanStatus::PartiallyCompleted);
    }
}

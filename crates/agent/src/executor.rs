//! Wave scheduling of plan steps
//!
//! Steps whose dependencies have all reported `done` form the next wave. A
//! wave runs concurrently under the parallel strategy, one step at a time
//! under the sequential strategy, and under the adaptive strategy only fans
//! out when no step in the wave holds a shared external resource. The next
//! wave starts after every step of the current one has finished.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use assay_core::domain::capability::CapabilityKind;
use assay_core::domain::plan::{Plan, PlanStatus, PlanStrategy, StepId, StepStatus};
use assay_core::errors::CapabilityError;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::capability::{CapabilityRegistry, CapabilityTask};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    pub step_id: StepId,
    pub capability: CapabilityKind,
    pub result: Result<String, CapabilityError>,
    pub elapsed_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanReport {
    pub status: PlanStatus,
    pub outcomes: Vec<StepOutcome>,
    /// Steps never started because a dependency failed.
    pub skipped: Vec<StepId>,
    pub waves: usize,
}

impl PlanReport {
    /// Successful capability outputs in completion order.
    pub fn notes(&self) -> Vec<String> {
        self.outcomes.iter().filter_map(|outcome| outcome.result.as_ref().ok().cloned()).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CapabilityError> {
        self.outcomes.iter().filter_map(|outcome| outcome.result.as_ref().err())
    }

    pub fn failed_capabilities(&self) -> BTreeSet<CapabilityKind> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.is_err())
            .map(|outcome| outcome.capability)
            .collect()
    }
}

pub struct PlanExecutor {
    registry: Arc<CapabilityRegistry>,
    step_timeout: Duration,
}

impl PlanExecutor {
    pub fn new(registry: Arc<CapabilityRegistry>, step_timeout: Duration) -> Self {
        Self { registry, step_timeout }
    }

    /// Runs every reachable step of `plan`. Each step is bounded by the
    /// per-step timeout and by `deadline`, whichever comes first; a step that
    /// runs out of time fails like any other capability error.
    pub async fn execute(
        &self,
        plan: &mut Plan,
        query: &str,
        attempt: u32,
        deadline: Instant,
    ) -> PlanReport {
        plan.status = PlanStatus::Running;
        let mut outcomes = Vec::new();
        let mut waves = 0;

        loop {
            let eligible = plan.eligible_steps();
            if eligible.is_empty() {
                break;
            }
            waves += 1;

            let tasks: Vec<CapabilityTask> = eligible
                .iter()
                .filter_map(|id| plan.step(id))
                .map(|step| CapabilityTask {
                    step_id: step.id.clone(),
                    capability: step.capability,
                    query: query.to_owned(),
                    task: step.task.clone(),
                    attempt,
                })
                .collect();
            for task in &tasks {
                mark(plan, &task.step_id, StepStatus::Running);
            }

            let fan_out = self.fans_out(plan.strategy, &tasks);
            debug!(
                event_name = "executor.wave.started",
                wave = waves,
                steps = tasks.len(),
                parallel = fan_out,
                "running plan wave"
            );

            let wave = if fan_out {
                join_all(tasks.iter().map(|task| self.run_step(task, deadline))).await
            } else {
                let mut finished = Vec::with_capacity(tasks.len());
                for task in &tasks {
                    finished.push(self.run_step(task, deadline).await);
                }
                finished
            };

            for outcome in wave {
                let status =
                    if outcome.result.is_ok() { StepStatus::Done } else { StepStatus::Failed };
                mark(plan, &outcome.step_id, status);
                outcomes.push(outcome);
            }
        }

        let skipped = plan.blocked_steps();
        for id in &skipped {
            mark(plan, id, StepStatus::Failed);
        }
        let status = plan.settle();

        PlanReport { status, outcomes, skipped, waves }
    }

    fn fans_out(&self, strategy: PlanStrategy, tasks: &[CapabilityTask]) -> bool {
        match strategy {
            PlanStrategy::Parallel => true,
            PlanStrategy::Sequential => false,
            PlanStrategy::Adaptive => tasks.iter().all(|task| {
                self.registry
                    .descriptor(task.capability)
                    .map(|descriptor| descriptor.shared_resource.is_none())
                    .unwrap_or(true)
            }),
        }
    }

    async fn run_step(&self, task: &CapabilityTask, deadline: Instant) -> StepOutcome {
        let started = Instant::now();
        let limit = self.step_timeout.min(deadline.saturating_duration_since(started));

        let result = match self.registry.handler(task.capability) {
            None => Err(CapabilityError::NotRegistered(task.capability)),
            Some(handler) => match tokio::time::timeout(limit, handler.execute(task)).await {
                Ok(result) => result,
                Err(_) => Err(CapabilityError::Execution {
                    capability: task.capability,
                    message: format!("step timed out after {}ms", limit.as_millis()),
                }),
            },
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if let Err(error) = &result {
            warn!(
                event_name = "executor.step.failed",
                step_id = %task.step_id,
                capability = %task.capability,
                attempt = task.attempt,
                elapsed_ms,
                error = %error,
                "capability step failed"
            );
        }

        StepOutcome {
            step_id: task.step_id.clone(),
            capability: task.capability,
            result,
            elapsed_ms,
        }
    }
}

/// Steps missing from the plan are logged and left alone.
fn mark(plan: &mut Plan, id: &StepId, status: StepStatus) {
    if let Err(error) = plan.set_step_status(id, status) {
        warn!(
            event_name = "executor.plan.status_update_failed",
            step_id = %id,
            status = ?status,
            error = %error,
            "could not update step status"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use assay_core::domain::capability::{Capability, CapabilityKind};
    use assay_core::domain::plan::{Plan, PlanStatus, PlanStrategy, StepId, StepStatus};
    use assay_core::errors::CapabilityError;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{mark, PlanExecutor};
    use crate::capability::{CapabilityHandler, CapabilityRegistry, CapabilityTask};

    #[derive(Default)]
    struct Tracker {
        active: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<CapabilityKind>>,
    }

    struct TrackingHandler {
        tracker: Arc<Tracker>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl CapabilityHandler for TrackingHandler {
        async fn execute(&self, task: &CapabilityTask) -> Result<String, CapabilityError> {
            let active = self.tracker.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.tracker.peak.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.tracker.active.fetch_sub(1, Ordering::SeqCst);
            self.tracker.order.lock().await.push(task.capability);

            if self.fail {
                return Err(CapabilityError::Execution {
                    capability: task.capability,
                    message: "sandbox crashed".to_string(),
                });
            }
            Ok(format!("{} done", task.capability))
        }
    }

    fn registry(
        tracker: &Arc<Tracker>,
        failing: &[CapabilityKind],
        shared: &[CapabilityKind],
        delay: Duration,
    ) -> Arc<CapabilityRegistry> {
        let mut registry = CapabilityRegistry::default();
        for kind in CapabilityKind::ALL {
            let mut descriptor = Capability::standard(kind);
            if shared.contains(&kind) {
                descriptor = descriptor.with_shared_resource("sandbox");
            }
            registry.register(
                descriptor,
                TrackingHandler {
                    tracker: Arc::clone(tracker),
                    delay,
                    fail: failing.contains(&kind),
                },
            );
        }
        Arc::new(registry)
    }

    fn gather_then_write(strategy: PlanStrategy) -> Plan {
        let mut plan = Plan::new("explain", strategy);
        let research = plan.add_step(CapabilityKind::Research, "research", vec![]);
        let code = plan.add_step(CapabilityKind::Code, "code", vec![]);
        plan.add_step(CapabilityKind::Writing, "write", vec![research, code]);
        plan
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    #[tokio::test]
    async fn parallel_waves_fan_out_and_respect_dependencies() {
        let tracker = Arc::new(Tracker::default());
        let executor = PlanExecutor::new(
            registry(&tracker, &[], &[], Duration::from_millis(30)),
            Duration::from_secs(5),
        );
        let mut plan = gather_then_write(PlanStrategy::Parallel);

        let report = executor.execute(&mut plan, "q", 1, far_deadline()).await;

        assert_eq!(report.status, PlanStatus::Completed);
        assert_eq!(report.waves, 2);
        assert_eq!(tracker.peak.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.order.lock().await.last(), Some(&CapabilityKind::Writing));
        assert_eq!(report.notes().len(), 3);
    }

    #[tokio::test]
    async fn sequential_strategy_runs_one_step_at_a_time() {
        let tracker = Arc::new(Tracker::default());
        let executor = PlanExecutor::new(
            registry(&tracker, &[], &[], Duration::from_millis(5)),
            Duration::from_secs(5),
        );
        let mut plan = gather_then_write(PlanStrategy::Sequential);

        executor.execute(&mut plan, "q", 1, far_deadline()).await;
        assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn adaptive_strategy_serializes_shared_resources() {
        let tracker = Arc::new(Tracker::default());
        let executor = PlanExecutor::new(
            registry(&tracker, &[], &[CapabilityKind::Code], Duration::from_millis(10)),
            Duration::from_secs(5),
        );
        let mut plan = gather_then_write(PlanStrategy::Adaptive);

        let report = executor.execute(&mut plan, "q", 1, far_deadline()).await;
        assert_eq!(report.status, PlanStatus::Completed);
        assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_step_blocks_its_dependents() {
        let tracker = Arc::new(Tracker::default());
        let executor = PlanExecutor::new(
            registry(&tracker, &[CapabilityKind::Code], &[], Duration::from_millis(1)),
            Duration::from_secs(5),
        );
        let mut plan = gather_then_write(PlanStrategy::Parallel);

        let report = executor.execute(&mut plan, "q", 1, far_deadline()).await;

        assert_eq!(report.status, PlanStatus::PartiallyCompleted);
        assert_eq!(
            report.failed_capabilities().into_iter().collect::<Vec<_>>(),
            vec![CapabilityKind::Code]
        );
        assert_eq!(report.skipped.len(), 1);
        assert!(plan.steps.iter().all(|step| step.status != StepStatus::Pending));
        assert_eq!(plan.steps[2].status, StepStatus::Failed);
    }

    #[test]
    fn marking_an_unknown_step_leaves_the_plan_untouched() {
        let mut plan = gather_then_write(PlanStrategy::Sequential);
        let before = plan.clone();

        mark(&mut plan, &StepId("missing".to_string()), StepStatus::Done);
        assert_eq!(plan, before);

        let first = plan.steps[0].id.clone();
        mark(&mut plan, &first, StepStatus::Running);
        assert_eq!(plan.steps[0].status, StepStatus::Running);
    }

    #[tokio::test]
    async fn slow_steps_time_out_as_failures() {
        let tracker = Arc::new(Tracker::default());
        let executor = PlanExecutor::new(
            registry(&tracker, &[], &[], Duration::from_millis(500)),
            Duration::from_millis(20),
        );
        let mut plan = Plan::new("slow", PlanStrategy::Parallel);
        plan.add_step(CapabilityKind::Research, "research", vec![]);

        let report = executor.execute(&mut plan, "q", 1, far_deadline()).await;

        assert_eq!(report.status, PlanStatus::Failed);
        let failure = report.failures().next().expect("one failure");
        assert!(failure.to_string().contains("timed out"));
    }
}

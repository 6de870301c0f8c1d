use std::collections::{BTreeMap, BTreeSet};

use assay_core::domain::analysis::QueryAnalysis;
use assay_core::domain::capability::CapabilityKind;
use assay_core::domain::plan::{Plan, PlanStrategy};
use assay_core::errors::RoutingError;

use crate::capability::CapabilityRegistry;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteDecision {
    pub selected: Vec<CapabilityKind>,
    /// Registered fallbacks declared for each selected capability.
    pub fallbacks: BTreeMap<CapabilityKind, Vec<CapabilityKind>>,
    /// `(excluded, replacement)` pairs applied on this route.
    pub substitutions: Vec<(CapabilityKind, CapabilityKind)>,
}

/// Pure mapping from an analysis to capabilities; holds no state.
#[derive(Clone, Copy, Debug, Default)]
pub struct CapabilityRouter;

impl CapabilityRouter {
    /// Walks routing terms in order and selects the first registered
    /// capability serving each term. Capabilities in `excluded` failed on an
    /// earlier attempt and are replaced by their first usable fallback.
    pub fn route(
        &self,
        registry: &CapabilityRegistry,
        analysis: &QueryAnalysis,
        excluded: &BTreeSet<CapabilityKind>,
    ) -> Result<RouteDecision, RoutingError> {
        let mut decision = RouteDecision::default();
        let mut replaced: BTreeMap<CapabilityKind, Option<CapabilityKind>> = BTreeMap::new();

        for term in analysis.routing_terms() {
            let Some(matched) = registry
                .descriptors()
                .find(|descriptor| !descriptor.is_general() && descriptor.serves(term))
                .map(|descriptor| descriptor.kind)
            else {
                continue;
            };

            let chosen = if excluded.contains(&matched) {
                if !replaced.contains_key(&matched) {
                    let substitute =
                        first_usable_fallback(registry, matched, excluded, &decision.selected);
                    if let Some(substitute) = substitute {
                        decision.substitutions.push((matched, substitute));
                    }
                    replaced.insert(matched, substitute);
                }
                replaced.get(&matched).copied().flatten()
            } else {
                Some(matched)
            };

            if let Some(kind) = chosen {
                if !decision.selected.contains(&kind) {
                    decision.selected.push(kind);
                }
            }
        }

        if decision.selected.is_empty() {
            let general = registry
                .descriptors()
                .find(|descriptor| descriptor.is_general())
                .map(|descriptor| descriptor.kind)
                .ok_or(RoutingError::NoGeneralCapability)?;
            decision.selected.push(general);
        }

        for kind in &decision.selected {
            let fallbacks = registry
                .descriptor(*kind)
                .map(|descriptor| {
                    descriptor
                        .fallbacks
                        .iter()
                        .copied()
                        .filter(|fallback| registry.contains(*fallback))
                        .collect()
                })
                .unwrap_or_default();
            decision.fallbacks.insert(*kind, fallbacks);
        }

        Ok(decision)
    }
}

fn first_usable_fallback(
    registry: &CapabilityRegistry,
    failed: CapabilityKind,
    excluded: &BTreeSet<CapabilityKind>,
    selected: &[CapabilityKind],
) -> Option<CapabilityKind> {
    registry.descriptor(failed).and_then(|descriptor| {
        descriptor.fallbacks.iter().copied().find(|fallback| {
            registry.contains(*fallback)
                && !excluded.contains(fallback)
                && !selected.contains(fallback)
        })
    })
}

/// One step per selected capability. Writing synthesizes, so it waits for
/// every other step.
pub fn build_plan(goal: &str, route: &RouteDecision, strategy: PlanStrategy) -> Plan {
    let mut plan = Plan::new(goal, strategy);
    let mut gathering = Vec::new();

    for kind in route.selected.iter().filter(|kind| **kind != CapabilityKind::Writing) {
        gathering.push(plan.add_step(*kind, format!("{kind}: {goal}"), Vec::new()));
    }
    if route.selected.contains(&CapabilityKind::Writing) {
        plan.add_step(CapabilityKind::Writing, format!("writing: {goal}"), gathering);
    }
    plan
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use assay_core::analyzer::QueryAnalyzer;
    use assay_core::domain::capability::{Capability, CapabilityKind};
    use assay_core::domain::plan::PlanStrategy;
    use assay_core::errors::RoutingError;

    use super::{build_plan, CapabilityRouter};
    use crate::capability::{CapabilityRegistry, TemplateCapability};

    fn analyze(text: &str) -> assay_core::domain::analysis::QueryAnalysis {
        QueryAnalyzer::new().analyze_text(text).expect("non-empty query")
    }

    #[test]
    fn research_query_routes_to_research() {
        let registry = CapabilityRegistry::with_standard_capabilities();
        let decision = CapabilityRouter
            .route(
                &registry,
                &analyze("What is the boiling point of water at sea level?"),
                &BTreeSet::new(),
            )
            .expect("route");

        assert_eq!(decision.selected, vec![CapabilityKind::Research]);
        assert_eq!(
            decision.fallbacks.get(&CapabilityKind::Research),
            Some(&vec![CapabilityKind::ToolExecution])
        );
    }

    #[test]
    fn excluded_capability_is_replaced_by_first_fallback() {
        let registry = CapabilityRegistry::with_standard_capabilities();
        let analysis = analyze("Debug this Rust function that panics on empty input");

        let first = CapabilityRouter.route(&registry, &analysis, &BTreeSet::new()).expect("route");
        assert_eq!(first.selected, vec![CapabilityKind::Code]);

        let excluded = BTreeSet::from([CapabilityKind::Code]);
        let second = CapabilityRouter.route(&registry, &analysis, &excluded).expect("route");
        assert_eq!(second.selected, vec![CapabilityKind::ToolExecution]);
        assert_eq!(
            second.substitutions,
            vec![(CapabilityKind::Code, CapabilityKind::ToolExecution)]
        );
    }

    #[test]
    fn unmatched_query_falls_back_to_general() {
        let registry = CapabilityRegistry::with_standard_capabilities();
        let decision = CapabilityRouter
            .route(&registry, &analyze("hello there friend"), &BTreeSet::new())
            .expect("route");
        assert_eq!(decision.selected, vec![CapabilityKind::General]);
    }

    #[test]
    fn missing_general_capability_is_reported() {
        let mut registry = CapabilityRegistry::default();
        registry.register(Capability::standard(CapabilityKind::Code), TemplateCapability);
        let error = CapabilityRouter
            .route(&registry, &analyze("hello there friend"), &BTreeSet::new())
            .expect_err("nothing matches");
        assert_eq!(error, RoutingError::NoGeneralCapability);
    }

    #[test]
    fn writing_steps_depend_on_gathering_steps() {
        let route = super::RouteDecision {
            selected: vec![CapabilityKind::Writing, CapabilityKind::Research],
            ..Default::default()
        };
        let plan = build_plan("summarize the report", &route, PlanStrategy::Adaptive);

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].capability, CapabilityKind::Research);
        assert_eq!(plan.steps[1].depends_on, vec![plan.steps[0].id.clone()]);
        assert!(plan.validate().is_ok());
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use assay_core::domain::capability::{Capability, CapabilityKind};
use assay_core::domain::plan::StepId;
use assay_core::errors::CapabilityError;
use assay_core::text::content_terms;
use async_trait::async_trait;

/// Work handed to a capability for one plan step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityTask {
    pub step_id: StepId,
    pub capability: CapabilityKind,
    pub query: String,
    pub task: String,
    pub attempt: u32,
}

#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn execute(&self, task: &CapabilityTask) -> Result<String, CapabilityError>;
}

struct RegisteredCapability {
    descriptor: Capability,
    handler: Arc<dyn CapabilityHandler>,
}

/// Registered once at startup and read-only while queries run, so it is
/// shared behind an `Arc` without locking. Registration order is the
/// router's match order.
#[derive(Default)]
pub struct CapabilityRegistry {
    order: Vec<CapabilityKind>,
    entries: HashMap<CapabilityKind, RegisteredCapability>,
}

impl CapabilityRegistry {
    /// Every capability kind with its stock descriptor and a template handler.
    pub fn with_standard_capabilities() -> Self {
        let mut registry = Self::default();
        for kind in CapabilityKind::ALL {
            registry.register(Capability::standard(kind), TemplateCapability);
        }
        registry
    }

    /// Registers or replaces a capability; a replacement keeps its position.
    pub fn register<H>(&mut self, descriptor: Capability, handler: H)
    where
        H: CapabilityHandler + 'static,
    {
        self.register_shared(descriptor, Arc::new(handler));
    }

    pub fn register_shared(&mut self, descriptor: Capability, handler: Arc<dyn CapabilityHandler>) {
        let kind = descriptor.kind;
        if !self.entries.contains_key(&kind) {
            self.order.push(kind);
        }
        self.entries.insert(kind, RegisteredCapability { descriptor, handler });
    }

    pub fn descriptor(&self, kind: CapabilityKind) -> Option<&Capability> {
        self.entries.get(&kind).map(|entry| &entry.descriptor)
    }

    pub fn handler(&self, kind: CapabilityKind) -> Option<Arc<dyn CapabilityHandler>> {
        self.entries.get(&kind).map(|entry| Arc::clone(&entry.handler))
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Capability> {
        self.order.iter().filter_map(|kind| self.descriptor(*kind))
    }

    pub fn contains(&self, kind: CapabilityKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Produces short capability notes from the task's key terms. Stands in for
/// domain-specific capability logic, which lives outside this crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateCapability;

#[async_trait]
impl CapabilityHandler for TemplateCapability {
    async fn execute(&self, task: &CapabilityTask) -> Result<String, CapabilityError> {
        let terms: Vec<String> = content_terms(&task.query).into_iter().take(6).collect();
        if terms.is_empty() {
            return Ok(format!("{}: no specific focus terms.", task.capability));
        }
        Ok(format!("{}: focus on {}.", task.capability, terms.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use assay_core::domain::capability::{Capability, CapabilityKind};
    use assay_core::domain::plan::StepId;

    use super::{CapabilityHandler, CapabilityRegistry, CapabilityTask, TemplateCapability};

    #[test]
    fn standard_registry_keeps_registration_order() {
        let registry = CapabilityRegistry::with_standard_capabilities();
        assert_eq!(registry.len(), CapabilityKind::ALL.len());
        let order: Vec<CapabilityKind> =
            registry.descriptors().map(|descriptor| descriptor.kind).collect();
        assert_eq!(order, CapabilityKind::ALL.to_vec());
    }

    #[test]
    fn replacing_a_capability_keeps_its_position() {
        let mut registry = CapabilityRegistry::default();
        registry.register(Capability::standard(CapabilityKind::Research), TemplateCapability);
        registry.register(Capability::standard(CapabilityKind::Code), TemplateCapability);
        registry.register(
            Capability::standard(CapabilityKind::Research).with_categories(["papers"]),
            TemplateCapability,
        );

        let first = registry.descriptors().next().map(|descriptor| descriptor.kind);
        assert_eq!(first, Some(CapabilityKind::Research));
        assert_eq!(registry.len(), 2);
        assert!(registry
            .descriptor(CapabilityKind::Research)
            .is_some_and(|descriptor| descriptor.serves("papers")));
    }

    #[tokio::test]
    async fn template_capability_lists_focus_terms() {
        let task = CapabilityTask {
            step_id: StepId("step-1".to_string()),
            capability: CapabilityKind::Research,
            query: "What is the boiling point of water?".to_string(),
            task: "research: boiling point".to_string(),
            attempt: 1,
        };
        let output = TemplateCapability.execute(&task).await.expect("template never fails");
        assert_eq!(output, "research: focus on boiling, point, water.");
    }
}

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The closed set of processing capabilities a query can be routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityKind {
    Research,
    Code,
    DataAnalysis,
    Writing,
    ToolExecution,
    General,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 6] = [
        Self::Research,
        Self::Code,
        Self::DataAnalysis,
        Self::Writing,
        Self::ToolExecution,
        Self::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Code => "code",
            Self::DataAnalysis => "data-analysis",
            Self::Writing => "writing",
            Self::ToolExecution => "tool-execution",
            Self::General => "general",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "research" => Some(Self::Research),
            "code" => Some(Self::Code),
            "data-analysis" => Some(Self::DataAnalysis),
            "writing" => Some(Self::Writing),
            "tool-execution" => Some(Self::ToolExecution),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    fn default_categories(&self) -> &'static [&'static str] {
        match self {
            Self::Research => {
                &["research", "question", "explain", "science", "history", "health", "legal"]
            }
            Self::Code => &["code", "software", "programming", "debug"],
            Self::DataAnalysis => &["data-analysis", "statistics", "finance"],
            Self::Writing => &["writing", "draft", "summarize", "email"],
            Self::ToolExecution => &["tool-execution", "calculate", "convert", "fetch"],
            Self::General => &["general"],
        }
    }

    fn default_fallbacks(&self) -> &'static [CapabilityKind] {
        match self {
            Self::Research => &[Self::ToolExecution],
            Self::Code => &[Self::ToolExecution, Self::Research],
            Self::DataAnalysis => &[Self::Code, Self::Research],
            Self::Writing => &[Self::Research],
            Self::ToolExecution => &[Self::General],
            Self::General => &[],
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a registered capability. Registered once at
/// startup and read-only afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub kind: CapabilityKind,
    pub task_categories: BTreeSet<String>,
    pub fallbacks: Vec<CapabilityKind>,
    /// External resource the capability holds while executing (a sandbox, a
    /// rate-limited API). Adaptive plans only fan out steps that declare none.
    pub shared_resource: Option<String>,
}

impl Capability {
    /// Descriptor with the stock categories and fallback chain for `kind`.
    pub fn standard(kind: CapabilityKind) -> Self {
        Self {
            kind,
            task_categories: kind.default_categories().iter().map(|c| (*c).to_string()).collect(),
            fallbacks: kind.default_fallbacks().to_vec(),
            shared_resource: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task_categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fallbacks(mut self, fallbacks: Vec<CapabilityKind>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn with_shared_resource(mut self, resource: impl Into<String>) -> Self {
        self.shared_resource = Some(resource.into());
        self
    }

    pub fn is_general(&self) -> bool {
        self.task_categories.contains("general")
    }

    /// Keyword containment in either direction, case-insensitive.
    pub fn serves(&self, term: &str) -> bool {
        let term = term.trim().to_ascii_lowercase();
        if term.is_empty() {
            return false;
        }
        self.task_categories.iter().any(|category| {
            let category = category.to_ascii_lowercase();
            category.contains(&term) || term.contains(&category)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Capability, CapabilityKind};

    #[test]
    fn kind_names_round_trip_through_parse() {
        for kind in CapabilityKind::ALL {
            assert_eq!(CapabilityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CapabilityKind::parse("tool_execution"), Some(CapabilityKind::ToolExecution));
        assert_eq!(CapabilityKind::parse("astrology"), None);
    }

    #[test]
    fn serves_matches_by_containment_in_either_direction() {
        let analysis = Capability::standard(CapabilityKind::DataAnalysis);
        assert!(analysis.serves("data-analysis"));
        assert!(analysis.serves("statistics"));
        assert!(analysis.serves("data"));
        assert!(!analysis.serves("poetry"));
        assert!(!analysis.serves("  "));
    }

    #[test]
    fn standard_code_capability_falls_back_to_tools_then_research() {
        let code = Capability::standard(CapabilityKind::Code);
        assert_eq!(code.fallbacks, vec![CapabilityKind::ToolExecution, CapabilityKind::Research]);
        assert!(Capability::standard(CapabilityKind::General).is_general());
    }
}

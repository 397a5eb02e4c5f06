use crate::error::{Result, RouterError};
use crate::tool::{Tool, ToolContext};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Static declaration of a tool's capability, created once when the tool
/// registers and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub trigger_keywords: Vec<String>,
    pub example_queries: Vec<String>,
    pub requires_data_loaded: bool,
    pub requires_prior_analysis: bool,
}

impl CapabilityDescriptor {
    pub fn new(
        name: impl Into<String>,
        trigger_keywords: &[&str],
        example_queries: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            trigger_keywords: trigger_keywords.iter().map(|s| s.to_string()).collect(),
            example_queries: example_queries.iter().map(|s| s.to_string()).collect(),
            requires_data_loaded: false,
            requires_prior_analysis: false,
        }
    }

    pub fn requires_data_loaded(mut self) -> Self {
        self.requires_data_loaded = true;
        self
    }

    pub fn requires_prior_analysis(mut self) -> Self {
        self.requires_prior_analysis = true;
        self
    }

    /// True when every declared precondition holds for the given dataset.
    pub fn preconditions_met(&self, dataset: &crate::tool::DatasetContext) -> bool {
        (!self.requires_data_loaded || dataset.data_loaded)
            && (!self.requires_prior_analysis || dataset.analysis_complete)
    }
}

/// Holds every registered tool. Built once at startup by whoever composes
/// the coordinator, then treated as read-only; no process-wide singletons.
/// Registration order is stable and doubles as the resolver's tie-break.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool. Registering two tools under one name is a composition
    /// bug, not a runtime condition to recover from.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(RouterError::DuplicateTool(name));
        }
        self.by_name.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    /// Exact keyword lookup across all capability descriptors, first
    /// registered tool wins.
    pub fn find_by_keyword(&self, keyword: &str) -> Option<&Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|tool| tool.keywords().iter().any(|k| k == keyword))
    }

    /// Asks every tool "can you handle this?", preserving registration
    /// order in the result. The predicates are read-only, so callers are
    /// free to fan them out, but the returned order is the contract.
    pub fn find_capable_tools(&self, message: &str, ctx: &ToolContext<'_>) -> Vec<&Arc<dyn Tool>> {
        self.tools
            .iter()
            .filter(|tool| tool.can_handle(message, ctx))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::tool::{ToolRequest, ToolResult};
    use async_trait::async_trait;

    struct DummyTool {
        descriptor: CapabilityDescriptor,
    }

    impl DummyTool {
        fn named(name: &str, keywords: &[&str]) -> Arc<dyn Tool> {
            Arc::new(Self {
                descriptor: CapabilityDescriptor::new(name, keywords, &[]),
            })
        }
    }

    #[async_trait]
    impl Tool for DummyTool {
        fn descriptor(&self) -> &CapabilityDescriptor {
            &self.descriptor
        }

        fn description(&self) -> &str {
            "dummy"
        }

        fn can_handle(&self, message: &str, _ctx: &ToolContext<'_>) -> bool {
            self.keywords().iter().any(|k| message.contains(k.as_str()))
        }

        async fn execute(
            &self,
            _request: &ToolRequest,
            _ctx: &ToolContext<'_>,
        ) -> Result<ToolResult> {
            Ok(ToolResult::message("ok"))
        }
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ToolRegistry::new();
        registry
            .register(DummyTool::named("stats", &["mean"]))
            .unwrap();
        let err = registry
            .register(DummyTool::named("stats", &["median"]))
            .unwrap_err();
        assert!(matches!(err, crate::error::RouterError::DuplicateTool(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn keyword_lookup_is_exact() {
        let mut registry = ToolRegistry::new();
        registry
            .register(DummyTool::named("stats", &["mean", "median"]))
            .unwrap();
        registry
            .register(DummyTool::named("viz", &["map"]))
            .unwrap();

        assert_eq!(registry.find_by_keyword("map").unwrap().name(), "viz");
        assert!(registry.find_by_keyword("mea").is_none());
    }

    #[test]
    fn capable_tools_preserve_registration_order() {
        let mut registry = ToolRegistry::new();
        registry
            .register(DummyTool::named("first", &["shared"]))
            .unwrap();
        registry
            .register(DummyTool::named("second", &["shared"]))
            .unwrap();

        let session = crate::session::SessionState::new("s1");
        let dataset = crate::tool::DatasetContext::default();
        let ctx = ToolContext {
            dataset: &dataset,
            session: &session,
        };
        let capable = registry.find_capable_tools("shared keyword here", &ctx);
        let names: Vec<&str> = capable.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }
}

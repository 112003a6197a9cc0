use std::collections::HashMap;
use std::sync::Arc;

use svarflyt_core::error::{Result, SvarflytError};

use crate::pipelines::{Pipeline, StructuredAnswer, SubqueryOrchestrator};

/// Registry of pipelines by agent name.
pub struct AgentRegistry {
    pipelines: HashMap<String, Arc<dyn Pipeline>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            pipelines: HashMap::new(),
        }
    }

    /// Register a pipeline under its own name.
    pub fn register(&mut self, pipeline: impl Pipeline) {
        self.pipelines
            .insert(pipeline.name().to_string(), Arc::new(pipeline));
    }

    /// Get a pipeline by agent name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Pipeline>> {
        self.pipelines
            .get(name)
            .cloned()
            .ok_or_else(|| SvarflytError::UnknownAgent(name.to_string()))
    }

    /// Registered agent names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.pipelines.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Create a registry with both built-in pipelines.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(StructuredAnswer::new()?);
        registry.register(SubqueryOrchestrator::new()?);
        Ok(registry)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::{structured_answer, subquery};

    #[test]
    fn test_defaults_registered() {
        let registry = AgentRegistry::with_defaults().unwrap();
        assert_eq!(
            registry.names(),
            vec![structured_answer::NAME, subquery::NAME]
        );
        assert_eq!(registry.get(subquery::NAME).unwrap().name(), subquery::NAME);
    }

    #[test]
    fn test_unknown_agent() {
        let registry = AgentRegistry::with_defaults().unwrap();
        let err = registry.get("agent_workflow_magic").err().unwrap();
        assert_eq!(err.to_string(), "Agent agent_workflow_magic mangler!");
    }
}

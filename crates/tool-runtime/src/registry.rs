use crate::prompt::{Prompt, PromptDefinition};
use crate::tool::{Tool, ToolDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// Manages available tools, their schemas, and lookup.
/// Thread-safe via Arc wrapping of individual tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, replacing any tool with the same name.
    /// Returns the replaced tool, if there was one.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Option<Arc<dyn Tool>> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.definition().name;
        let replaced = self.tools.insert(name.clone(), tool);
        if replaced.is_some() {
            tracing::debug!(tool = %name, "Replaced existing tool registration");
        }
        replaced
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All registered tool definitions, sorted by name.
    pub fn list(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Name → prompt mapping, same replacement rules as [`ToolRegistry`].
pub struct PromptRegistry {
    prompts: HashMap<String, Arc<dyn Prompt>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self {
            prompts: HashMap::new(),
        }
    }

    pub fn register(&mut self, prompt: impl Prompt + 'static) -> Option<Arc<dyn Prompt>> {
        self.register_arc(Arc::new(prompt))
    }

    pub fn register_arc(&mut self, prompt: Arc<dyn Prompt>) -> Option<Arc<dyn Prompt>> {
        let name = prompt.definition().name;
        self.prompts.insert(name, prompt)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Prompt>> {
        self.prompts.get(name).cloned()
    }

    pub fn list(&self) -> Vec<PromptDefinition> {
        let mut defs: Vec<_> = self.prompts.values().map(|p| p.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::CodeReviewPrompt;
    use crate::tool::{FnTool, ToolError, ToolOutput};
    use crate::tools::{CalculatorTool, EchoTool};

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register(EchoTool).is_none());

        let replacement = FnTool::new(
            "echo",
            "Replacement echo",
            serde_json::json!({"type": "object"}),
            |_, _| async { Ok::<_, ToolError>(ToolOutput::text("v2")) },
        );
        let previous = registry.register(replacement);

        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("echo").unwrap().definition().description,
            "Replacement echo"
        );
    }

    #[test]
    fn test_list_definitions_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(CalculatorTool);

        let names: Vec<_> = registry.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["calculator", "echo"]);
    }

    #[test]
    fn test_prompt_registry() {
        let mut registry = PromptRegistry::new();
        assert!(registry.is_empty());
        registry.register(CodeReviewPrompt);
        assert!(registry.register(CodeReviewPrompt).is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list()[0].name, "code_review");
    }
}

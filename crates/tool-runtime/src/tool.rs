use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::content::Content;

/// Describes a tool's interface: name, description and input schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name within a server (e.g., "calculator")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema describing the expected input
    pub input_schema: Value,
}

/// What a tool produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Vec<Content>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
        }
    }

    /// All text blocks joined by newlines.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Per-call information handed to a tool.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Authenticated caller, when the server enforces auth.
    pub subject: Option<String>,
    /// JSON-RPC id of the originating request, rendered as a string.
    pub request_id: Option<String>,
}

/// The primary extension point: all tools implement this trait.
///
/// Tools are object-safe, Send + Sync, and async. Input has already been
/// checked against `definition().input_schema` when a server dispatches.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's definition (name, description, JSON Schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given JSON input.
    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Timeout after {0:?}")]
    Timeout(std::time::Duration),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl fmt::Display for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.description)
    }
}

type ToolHandler =
    Arc<dyn Fn(Value, ToolContext) -> BoxFuture<'static, Result<ToolOutput, ToolError>> + Send + Sync>;

/// A tool backed by an async closure.
///
/// Lets an embedding application register an opaque function together with
/// its declared schema, without writing a `Tool` impl.
#[derive(Clone)]
pub struct FnTool {
    definition: ToolDefinition,
    handler: ToolHandler,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        Self {
            definition: ToolDefinition {
                name: name.into(),
                description: description.into(),
                input_schema,
            },
            handler: Arc::new(move |input: Value, ctx: ToolContext| handler(input, ctx).boxed()),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
        (self.handler)(input, context.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_definition_serialization() {
        let def = ToolDefinition {
            name: "test_tool".to_string(),
            description: "A test tool".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        };
        let json = serde_json::to_string(&def).unwrap();
        let roundtrip: ToolDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(roundtrip, def);
        assert_eq!(def.to_string(), "test_tool(A test tool)");
    }

    #[test]
    fn test_joined_text_skips_non_text_blocks() {
        let output = ToolOutput {
            content: vec![
                Content::text("a"),
                Content::Image {
                    data: String::new(),
                    mime_type: "image/png".into(),
                },
                Content::text("b"),
            ],
        };
        assert_eq!(output.joined_text(), "a\nb");
    }

    #[tokio::test]
    async fn test_fn_tool_runs_closure() {
        let tool = FnTool::new(
            "shout",
            "Uppercases text",
            serde_json::json!({"type": "object"}),
            |input, ctx| async move {
                let text = input["text"].as_str().unwrap_or_default().to_uppercase();
                Ok::<_, ToolError>(ToolOutput::text(format!(
                    "{}:{}",
                    ctx.subject.unwrap_or_default(),
                    text
                )))
            },
        );

        assert_eq!(tool.definition().name, "shout");
        let ctx = ToolContext {
            subject: Some("ops".into()),
            request_id: None,
        };
        let out = tool
            .execute(serde_json::json!({"text": "hey"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.joined_text(), "ops:HEY");
    }

    #[tokio::test]
    async fn test_fn_tool_propagates_error() {
        let tool = FnTool::new("boom", "Always fails", serde_json::json!({}), |_, _| async {
            Err::<ToolOutput, _>(ToolError::ExecutionFailed("kaput".into()))
        });
        let err = tool
            .execute(Value::Null, &ToolContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Execution failed: kaput");
    }
}

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::content::{Content, Role};

/// A named argument a prompt accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl PromptArgument {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            required: false,
        }
    }
}

/// Describes a prompt: name, description and ordered arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

impl PromptDefinition {
    /// Required argument names absent from `args`, in declaration order.
    pub fn missing_arguments(&self, args: &HashMap<String, String>) -> Vec<&str> {
        self.arguments
            .iter()
            .filter(|a| a.required && !args.contains_key(&a.name))
            .map(|a| a.name.as_str())
            .collect()
    }
}

/// One role-tagged message of a rendered prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: Content,
}

impl PromptMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::text(text),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Missing required argument: {0}")]
    MissingArgument(String),
    #[error("Rendering failed: {0}")]
    RenderFailed(String),
}

/// A prompt template exposed by a server.
///
/// `render` is only called after required arguments have been checked.
#[async_trait]
pub trait Prompt: Send + Sync {
    fn definition(&self) -> PromptDefinition;

    async fn render(&self, args: &HashMap<String, String>) -> Result<Vec<PromptMessage>, PromptError>;
}

type PromptHandler = Arc<
    dyn Fn(HashMap<String, String>) -> BoxFuture<'static, Result<Vec<PromptMessage>, PromptError>>
        + Send
        + Sync,
>;

/// A prompt backed by an async closure.
#[derive(Clone)]
pub struct FnPrompt {
    definition: PromptDefinition,
    handler: PromptHandler,
}

impl FnPrompt {
    pub fn new<F, Fut>(definition: PromptDefinition, handler: F) -> Self
    where
        F: Fn(HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<PromptMessage>, PromptError>> + Send + 'static,
    {
        Self {
            definition,
            handler: Arc::new(move |args: HashMap<String, String>| handler(args).boxed()),
        }
    }
}

#[async_trait]
impl Prompt for FnPrompt {
    fn definition(&self) -> PromptDefinition {
        self.definition.clone()
    }

    async fn render(&self, args: &HashMap<String, String>) -> Result<Vec<PromptMessage>, PromptError> {
        (self.handler)(args.clone()).await
    }
}

/// Built-in prompt asking for a review of a code snippet.
pub struct CodeReviewPrompt;

#[async_trait]
impl Prompt for CodeReviewPrompt {
    fn definition(&self) -> PromptDefinition {
        PromptDefinition {
            name: "code_review".to_string(),
            description: Some("Ask for a focused review of a code snippet.".to_string()),
            arguments: vec![
                PromptArgument::required("code", "The code to review"),
                PromptArgument::optional("language", "Language of the snippet"),
                PromptArgument::optional("focus", "What to concentrate on (e.g. performance)"),
            ],
        }
    }

    async fn render(&self, args: &HashMap<String, String>) -> Result<Vec<PromptMessage>, PromptError> {
        let code = args
            .get("code")
            .ok_or_else(|| PromptError::MissingArgument("code".to_string()))?;
        let language = args.get("language").map(String::as_str).unwrap_or("");
        let focus = args
            .get("focus")
            .map(|f| format!(" Focus on {f}."))
            .unwrap_or_default();

        Ok(vec![
            PromptMessage::user(format!(
                "Please review the following code.{focus}\n\n```{language}\n{code}\n```"
            )),
            PromptMessage::assistant(
                "I'll review it for correctness, clarity and edge cases.",
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_missing_arguments_in_order() {
        let def = PromptDefinition {
            name: "p".into(),
            description: None,
            arguments: vec![
                PromptArgument::required("b", ""),
                PromptArgument::optional("x", ""),
                PromptArgument::required("a", ""),
            ],
        };
        assert_eq!(def.missing_arguments(&args(&[])), vec!["b", "a"]);
        assert!(def.missing_arguments(&args(&[("a", "1"), ("b", "2")])).is_empty());
    }

    #[tokio::test]
    async fn test_code_review_renders_ordered_messages() {
        let messages = CodeReviewPrompt
            .render(&args(&[("code", "fn main() {}"), ("language", "rust"), ("focus", "naming")]))
            .await
            .unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        let text = messages[0].content.as_text().unwrap();
        assert!(text.contains("```rust\nfn main() {}\n```"));
        assert!(text.contains("Focus on naming."));
    }

    #[tokio::test]
    async fn test_fn_prompt() {
        let prompt = FnPrompt::new(
            PromptDefinition {
                name: "greet".into(),
                description: None,
                arguments: vec![PromptArgument::required("name", "who")],
            },
            |args| async move {
                Ok::<_, PromptError>(vec![PromptMessage::user(format!("Hello {}", args["name"]))])
            },
        );
        let out = prompt.render(&args(&[("name", "Ada")])).await.unwrap();
        assert_eq!(out, vec![PromptMessage::user("Hello Ada")]);
    }
}

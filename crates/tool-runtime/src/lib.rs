pub mod content;
pub mod tool;
pub mod tools;
pub mod prompt;
pub mod schema;
pub mod registry;

pub use content::{Content, Role};
pub use tool::{FnTool, Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};
pub use prompt::{
    CodeReviewPrompt, FnPrompt, Prompt, PromptArgument, PromptDefinition, PromptError,
    PromptMessage,
};
pub use registry::{PromptRegistry, ToolRegistry};
pub use schema::{validate_input, SchemaViolation};
pub use tools::{CalculatorTool, EchoTool, SleepTool};

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};

/// Waits `ms` milliseconds, then answers with `tag` (or "slept <ms>ms").
pub struct SleepTool;

#[async_trait]
impl Tool for SleepTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "sleep".to_string(),
            description: "Sleeps for the given number of milliseconds, then answers.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "ms": { "type": "integer", "minimum": 0, "maximum": 60000 },
                    "tag": { "type": "string" }
                },
                "required": ["ms"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolOutput, ToolError> {
        let ms = input
            .get("ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| ToolError::InvalidInput("missing 'ms' field".to_string()))?;

        tokio::time::sleep(Duration::from_millis(ms)).await;

        let text = match input.get("tag").and_then(Value::as_str) {
            Some(tag) => tag.to_string(),
            None => format!("slept {ms}ms"),
        };
        Ok(ToolOutput::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_answers_with_tag() {
        let out = SleepTool
            .execute(serde_json::json!({"ms": 500, "tag": "done"}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(out.joined_text(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_default_text() {
        let out = SleepTool
            .execute(serde_json::json!({"ms": 10}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(out.joined_text(), "slept 10ms");
    }
}

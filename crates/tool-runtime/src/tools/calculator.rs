use async_trait::async_trait;
use serde_json::Value;

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};

/// Arithmetic on two operands. Answers in the form `"5 add 3 = 8"`.
pub struct CalculatorTool;

impl CalculatorTool {
    fn apply(operation: &str, a: f64, b: f64) -> Result<f64, ToolError> {
        match operation {
            "add" => Ok(a + b),
            "subtract" => Ok(a - b),
            "multiply" => Ok(a * b),
            "divide" if b == 0.0 => Err(ToolError::ExecutionFailed("division by zero".to_string())),
            "divide" => Ok(a / b),
            other => Err(ToolError::InvalidInput(format!("unknown operation '{other}'"))),
        }
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "calculator".to_string(),
            description: "Performs basic arithmetic on two numbers.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "operation": {
                        "type": "string",
                        "enum": ["add", "subtract", "multiply", "divide"],
                        "description": "Arithmetic operation to apply"
                    },
                    "a": { "type": "number", "description": "Left operand" },
                    "b": { "type": "number", "description": "Right operand" }
                },
                "required": ["operation", "a", "b"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolOutput, ToolError> {
        let operation = input
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidInput("missing 'operation' field".to_string()))?;
        let operand = |key: &str| {
            input
                .get(key)
                .and_then(Value::as_f64)
                .ok_or_else(|| ToolError::InvalidInput(format!("missing numeric '{key}' field")))
        };
        let (a, b) = (operand("a")?, operand("b")?);

        let result = Self::apply(operation, a, b)?;
        Ok(ToolOutput::text(format!("{a} {operation} {b} = {result}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(input: Value) -> Result<String, ToolError> {
        CalculatorTool
            .execute(input, &ToolContext::default())
            .await
            .map(|out| out.joined_text())
    }

    #[tokio::test]
    async fn test_add_formats_integers_plainly() {
        let text = run(json!({"operation": "add", "a": 5, "b": 3})).await.unwrap();
        assert_eq!(text, "5 add 3 = 8");
    }

    #[tokio::test]
    async fn test_fractional_results() {
        let text = run(json!({"operation": "divide", "a": 7, "b": 2})).await.unwrap();
        assert_eq!(text, "7 divide 2 = 3.5");
    }

    #[tokio::test]
    async fn test_divide_by_zero_fails() {
        let err = run(json!({"operation": "divide", "a": 1, "b": 0})).await.unwrap_err();
        assert_eq!(err.to_string(), "Execution failed: division by zero");
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let err = run(json!({"operation": "pow", "a": 2, "b": 3})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}

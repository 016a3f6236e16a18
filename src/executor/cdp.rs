use async_trait::async_trait;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use serde_json::Value;

use super::{async_call_expression, function_call_expression, preview, ScriptExecutor};
use crate::error::ScriptError;

#[async_trait]
impl ScriptExecutor for Page {
    async fn execute_script(&self, script: &str, args: &[Value]) -> Result<Value, ScriptError> {
        let expression = function_call_expression(script, args)?;
        evaluate(self, expression).await
    }

    async fn execute_async_script(&self, script: &str, args: &[Value]) -> Result<Value, ScriptError> {
        let expression = async_call_expression(script, args)?;
        evaluate(self, expression).await
    }
}

/// Evaluate an expression through `Runtime.evaluate`, awaiting promises and
/// returning the result by value.
async fn evaluate(page: &Page, expression: String) -> Result<Value, ScriptError> {
    let params = EvaluateParams::builder()
        .expression(expression.clone())
        .await_promise(true)
        .return_by_value(true)
        .build()
        .map_err(ScriptError::Execution)?;

    let eval_result = page.evaluate(params).await.map_err(|e| {
        tracing::debug!("evaluation failed for script:\n{}", expression);
        ScriptError::Execution(format!("{} (script: {})", e, preview(&expression)))
    })?;

    // `undefined` has no JSON value; report it as null like WebDriver does
    Ok(eval_result.into_value().unwrap_or(Value::Null))
}

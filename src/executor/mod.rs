pub mod boa;
pub mod cdp;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::ScriptError;

pub use boa::BoaSession;

/// A script-execution channel into a browser page.
///
/// Both primitives follow WebDriver semantics: `script` is the body of an
/// anonymous function and `args` are visible to it through `arguments`.
/// The async variant appends a completion callback as the last argument.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn execute_script(&self, script: &str, args: &[Value]) -> Result<Value, ScriptError>;

    async fn execute_async_script(&self, script: &str, args: &[Value])
        -> Result<Value, ScriptError>;
}

/// Shared handle to the channel a call or wait runs against.
pub type SessionHandle = Arc<dyn ScriptExecutor>;

impl std::fmt::Debug for dyn ScriptExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ScriptExecutor")
    }
}

/// Build an expression that runs `script` as a function body with `args` bound to `arguments`.
pub(crate) fn function_call_expression(script: &str, args: &[Value]) -> Result<String, ScriptError> {
    let args_json = args_literal(args)?;
    Ok(format!(
        "(function(){{\n{script}\n}}).apply(null, {args_json})",
        script = script,
        args_json = args_json
    ))
}

/// Like [`function_call_expression`], but resolves to whatever the script passes
/// to its trailing callback.
pub(crate) fn async_call_expression(script: &str, args: &[Value]) -> Result<String, ScriptError> {
    let args_json = args_literal(args)?;
    Ok(format!(
        r#"new Promise(function(resolve) {{
            (function(){{
{script}
            }}).apply(null, {args_json}.concat([resolve]));
        }})"#,
        script = script,
        args_json = args_json
    ))
}

fn args_literal(args: &[Value]) -> Result<String, ScriptError> {
    serde_json::to_string(args).map_err(|e| ScriptError::Execution(format!("cannot encode script arguments: {}", e)))
}

pub(crate) fn preview(script: &str) -> String {
    if script.chars().count() > 200 {
        let head: String = script.chars().take(200).collect();
        format!("{}...", head)
    } else {
        script.to_string()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Recorded {
        pub script: String,
        pub args: Vec<Value>,
        pub is_async: bool,
    }

    /// In-memory channel that records every request and answers from a queue.
    ///
    /// Each request is matched against the configured rules first (substring of
    /// the script), then against the FIFO of queued replies, and falls back to
    /// `null`.
    #[derive(Default)]
    pub struct RecordingSession {
        pub requests: Mutex<Vec<Recorded>>,
        replies: Mutex<VecDeque<Result<Value, String>>>,
        rules: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingSession {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn reply(&self, value: Value) {
            self.replies.lock().push_back(Ok(value));
        }

        pub fn fail(&self, message: &str) {
            self.replies.lock().push_back(Err(message.to_string()));
        }

        pub fn when(&self, needle: &str, value: Value) {
            self.rules.lock().push((needle.to_string(), value));
        }

        pub fn scripts(&self) -> Vec<String> {
            self.requests.lock().iter().map(|r| r.script.clone()).collect()
        }

        pub fn last(&self) -> Option<Recorded> {
            self.requests.lock().last().cloned()
        }

        fn answer(&self, script: &str, args: &[Value], is_async: bool) -> Result<Value, ScriptError> {
            self.requests.lock().push(Recorded {
                script: script.to_string(),
                args: args.to_vec(),
                is_async,
            });
            if let Some((_, value)) = self.rules.lock().iter().find(|(needle, _)| script.contains(needle.as_str())) {
                return Ok(value.clone());
            }
            match self.replies.lock().pop_front() {
                Some(Ok(value)) => Ok(value),
                Some(Err(message)) => Err(ScriptError::Execution(message)),
                None => Ok(Value::Null),
            }
        }
    }

    #[async_trait]
    impl ScriptExecutor for RecordingSession {
        async fn execute_script(&self, script: &str, args: &[Value]) -> Result<Value, ScriptError> {
            self.answer(script, args, false)
        }

        async fn execute_async_script(&self, script: &str, args: &[Value]) -> Result<Value, ScriptError> {
            self.answer(script, args, true)
        }
    }
}

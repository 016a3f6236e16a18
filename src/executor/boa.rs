use async_trait::async_trait;
use boa_engine::{Context, Source};
use serde_json::Value;
use std::sync::mpsc;
use tokio::sync::oneshot;

use super::{function_call_expression, preview, ScriptExecutor};
use crate::error::ScriptError;

/// Globals every page-like context needs: `window` aliases the global object
/// and `console` output is buffered for the host to drain.
const PRELUDE: &str = r#"
var window = globalThis;
window.__remixConsole = [];
var console = {
    log: function() {
        window.__remixConsole.push(Array.prototype.slice.call(arguments).join(' '));
    }
};
console.info = console.log;
console.warn = console.log;
console.error = console.log;
console.debug = console.log;
"#;

const DRAIN_CONSOLE: &str = "JSON.stringify(window.__remixConsole.splice(0))";

struct Request {
    expression: String,
    reply: oneshot::Sender<Result<Value, ScriptError>>,
}

/// In-process script channel backed by `boa_engine`.
///
/// The engine lives on its own thread so the global object persists across
/// calls, which is what lets detection probes observe earlier injections.
/// Async scripts are supported only when they invoke their callback before
/// returning; there is no event loop.
pub struct BoaSession {
    requests: mpsc::Sender<Request>,
}

impl BoaSession {
    pub fn start() -> Result<Self, ScriptError> {
        let (tx, rx) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), ScriptError>>();

        std::thread::Builder::new()
            .name("boa-session".into())
            .spawn(move || {
                let mut js_ctx = Context::default();
                if let Err(e) = js_ctx.eval(Source::from_bytes(PRELUDE)) {
                    let _ = ready_tx.send(Err(ScriptError::Execution(format!(
                        "Failed to initialise script context: {}",
                        e
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while let Ok(request) = rx.recv() {
                    let result = evaluate(&mut js_ctx, &request.expression);
                    drain_console(&mut js_ctx);
                    let _ = request.reply.send(result);
                }
            })
            .map_err(|e| ScriptError::Execution(format!("cannot spawn script thread: {}", e)))?;

        ready_rx
            .recv()
            .map_err(|_| ScriptError::Execution("script thread exited during startup".into()))??;

        Ok(Self { requests: tx })
    }

    async fn submit(&self, expression: String) -> Result<Value, ScriptError> {
        let (reply, receiver) = oneshot::channel();
        self.requests
            .send(Request { expression, reply })
            .map_err(|_| ScriptError::Execution("script session is closed".into()))?;
        receiver
            .await
            .map_err(|_| ScriptError::Execution("script session dropped the request".into()))?
    }
}

#[async_trait]
impl ScriptExecutor for BoaSession {
    async fn execute_script(&self, script: &str, args: &[Value]) -> Result<Value, ScriptError> {
        self.submit(function_call_expression(script, args)?).await
    }

    async fn execute_async_script(&self, script: &str, args: &[Value]) -> Result<Value, ScriptError> {
        let args_json = serde_json::to_string(args)
            .map_err(|e| ScriptError::Execution(format!("cannot encode script arguments: {}", e)))?;
        let expression = format!(
            r#"(function() {{
                var __done = false, __value;
                (function(){{
{script}
                }}).apply(null, {args_json}.concat([function(v) {{ __done = true; __value = v; }}]));
                if (!__done) {{ throw new Error('async script did not complete synchronously'); }}
                return __value;
            }})()"#,
            script = script,
            args_json = args_json
        );
        self.submit(expression).await
    }
}

/// Evaluate `expression` and bring its value back through JSON.
fn evaluate(js_ctx: &mut Context, expression: &str) -> Result<Value, ScriptError> {
    let wrapped = format!(
        "(function(){{ var __r = {}; return __r === undefined ? undefined : JSON.stringify(__r); }})()",
        expression
    );
    let value = js_ctx.eval(Source::from_bytes(wrapped.as_str())).map_err(|e| {
        tracing::debug!("evaluation failed for script:\n{}", expression);
        ScriptError::Execution(format!("{} (script: {})", e, preview(expression)))
    })?;

    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    let text = value
        .to_string(js_ctx)
        .map_err(|e| ScriptError::Execution(format!("{}", e)))?
        .to_std_string_escaped();
    serde_json::from_str(&text)
        .map_err(|e| ScriptError::Execution(format!("cannot decode script result '{}': {}", text, e)))
}

fn drain_console(js_ctx: &mut Context) {
    let Ok(value) = js_ctx.eval(Source::from_bytes(DRAIN_CONSOLE)) else {
        return;
    };
    let Ok(text) = value.to_string(js_ctx) else {
        return;
    };
    let lines: Vec<String> = serde_json::from_str(&text.to_std_string_escaped()).unwrap_or_default();
    for line in lines {
        tracing::debug!(target: "remix_bind::console", "{}", line);
    }
}

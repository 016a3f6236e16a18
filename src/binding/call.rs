use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::FunctionDecl;
use crate::error::ScriptError;
use crate::executor::{ScriptExecutor, SessionHandle};
use crate::script::{CallWrapper, InjectionPlanner, ScriptSource, WrapperRole};

/// Prefix of the string a failing call returns instead of throwing.
pub const ERROR_SENTINEL: &str = "@JS-ERROR:";

/// Declared kind of a contract method parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    #[default]
    Value,
    Channel,
    GlobalReference,
}

/// An object cached on the page under a global reference.
pub trait GlobalReferenceHolder: Send + Sync {
    fn global_reference(&self) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultGlobalReferenceHolder {
    reference: String,
}

impl DefaultGlobalReferenceHolder {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }
}

impl GlobalReferenceHolder for DefaultGlobalReferenceHolder {
    fn global_reference(&self) -> Option<String> {
        Some(self.reference.clone())
    }
}

/// One argument of a contract method call.
#[derive(Clone)]
pub enum CallArg {
    Value(Value),
    Channel(SessionHandle),
    Reference(Arc<dyn GlobalReferenceHolder>),
}

impl From<Value> for CallArg {
    fn from(value: Value) -> Self {
        CallArg::Value(value)
    }
}

impl std::fmt::Debug for CallArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallArg::Value(v) => f.debug_tuple("Value").field(v).finish(),
            CallArg::Channel(_) => f.write_str("Channel(..)"),
            CallArg::Reference(r) => f.debug_tuple("Reference").field(&r.global_reference()).finish(),
        }
    }
}

pub fn values<I: IntoIterator<Item = Value>>(items: I) -> Vec<CallArg> {
    items.into_iter().map(CallArg::Value).collect()
}

#[derive(Default)]
pub struct FilteredArgs {
    pub real: Vec<Value>,
    pub channel: Option<SessionHandle>,
    pub reference: Option<Arc<dyn GlobalReferenceHolder>>,
}

/// Separate infrastructure arguments from the ones forwarded to the script.
///
/// A null value at a position declared as [`ParamKind::Channel`] or
/// [`ParamKind::GlobalReference`] is an absent infrastructure argument and is
/// dropped. Every other value, strings included, is forwarded.
pub fn filter_arguments(params: &[ParamKind], args: &[CallArg]) -> FilteredArgs {
    let mut filtered = FilteredArgs::default();
    for (idx, arg) in args.iter().enumerate() {
        match arg {
            CallArg::Channel(session) => filtered.channel = Some(session.clone()),
            CallArg::Reference(holder) => filtered.reference = Some(holder.clone()),
            CallArg::Value(Value::Null)
                if matches!(
                    params.get(idx),
                    Some(ParamKind::Channel) | Some(ParamKind::GlobalReference)
                ) => {}
            CallArg::Value(value) => filtered.real.push(value.clone()),
        }
    }
    filtered
}

/// Build the argument array a call wrapper is applied to, one entry per bound role.
pub fn wrapper_arguments(
    wrapper: &CallWrapper,
    function_name: Option<&str>,
    reference: Option<&dyn GlobalReferenceHolder>,
    real: Vec<Value>,
) -> Vec<Value> {
    let mut out = Vec::with_capacity(wrapper.roles.len());
    for role in &wrapper.roles {
        match role {
            WrapperRole::Reference => {
                out.push(reference.and_then(|r| r.global_reference()).map_or(Value::Null, Value::String))
            }
            WrapperRole::FunctionName => {
                out.push(function_name.map_or(Value::Null, |name| Value::String(name.to_string())))
            }
            WrapperRole::Arguments => out.push(Value::Array(real.clone())),
            WrapperRole::Unbound => {}
        }
    }
    out
}

/// Guard a call expression so a thrown exception comes back as the error sentinel.
pub fn wrap_call(expression: &str) -> String {
    format!(
        "try{{{}}}catch(ex){{console.log('Failed to execute injected script: '+ex);return '@JS-ERROR: '+ex;}}",
        expression
    )
}

pub fn check_sentinel(raw: Value) -> Result<Value, ScriptError> {
    match raw {
        Value::String(text) if text.starts_with(ERROR_SENTINEL) => Err(ScriptError::Injected(text)),
        other => Ok(other),
    }
}

/// A contract method bound to a remote function or an inline body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBinding {
    method: String,
    name: Option<String>,
    body: Option<String>,
    params: Vec<ParamKind>,
}

impl FunctionBinding {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            name: None,
            body: None,
            params: Vec::new(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &[ParamKind] {
        &self.params
    }

    pub fn has_body(&self) -> bool {
        self.body.as_deref().is_some_and(|b| !b.is_empty())
    }

    pub fn function_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.method,
        }
    }

    pub fn call_expression(&self, wrapper: Option<&CallWrapper>) -> String {
        if let Some(body) = self.body.as_deref().filter(|b| !b.is_empty()) {
            return body.to_string();
        }
        let name = self.function_name();
        match wrapper {
            None => format!("return {}.apply(null,arguments);", name),
            Some(wrapper) => {
                let variable = format!("remixJsCallFunc_{}", identifier(name));
                format!(
                    "var {var} = {src};return {var}.apply(null,arguments);",
                    var = variable,
                    src = wrapper.source
                )
            }
        }
    }
}

impl From<&FunctionDecl> for FunctionBinding {
    fn from(decl: &FunctionDecl) -> Self {
        Self {
            method: decl.method.clone(),
            name: decl.name.clone(),
            body: decl.body.clone(),
            params: decl.params.clone(),
        }
    }
}

fn identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect()
}

/// Run one bound method: plan the payload, execute it once, check the sentinel.
///
/// Returns the raw result with the session it ran against. Any failure is
/// wrapped in [`ScriptError::Dispatch`] naming the contract and method.
pub async fn dispatch(
    source: &Arc<ScriptSource>,
    binding: &FunctionBinding,
    args: &[CallArg],
    ambient: Option<SessionHandle>,
) -> Result<(Value, SessionHandle), ScriptError> {
    let wrap = |err: ScriptError| ScriptError::Dispatch {
        contract: source.contract().to_string(),
        method: binding.method().to_string(),
        source: Box::new(err),
    };

    let filtered = filter_arguments(binding.params(), args);
    let wrapper = source.wrapper();
    let call = wrap_call(&binding.call_expression(wrapper));
    let script_args = match wrapper {
        Some(wrapper) => {
            let function_name = if binding.has_body() {
                None
            } else {
                Some(binding.function_name())
            };
            wrapper_arguments(wrapper, function_name, filtered.reference.as_deref(), filtered.real)
        }
        None => filtered.real,
    };

    let session = filtered.channel.or(ambient).ok_or(ScriptError::NoSession).map_err(wrap)?;
    let raw = run(session.as_ref(), source, &call, &script_args, false).await.map_err(wrap)?;
    Ok((raw, session))
}

/// Prepend the planned payload to `script`, execute it and check the sentinel.
pub(crate) async fn run(
    session: &dyn ScriptExecutor,
    source: &Arc<ScriptSource>,
    script: &str,
    args: &[Value],
    is_async: bool,
) -> Result<Value, ScriptError> {
    let payload = InjectionPlanner::new(session).prepare(Some(source), script).await?;
    let result = if is_async {
        session.execute_async_script(&payload, args).await
    } else {
        session.execute_script(&payload, args).await
    };
    let raw = result.inspect_err(|_| tracing::debug!("execution failed for script:\n{}", payload))?;
    check_sentinel(raw).inspect_err(|_| tracing::debug!("execution failed for script:\n{}", payload))
}

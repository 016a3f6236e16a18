use async_trait::async_trait;
use serde_json::{json, Value};

use super::ConditionSource;
use crate::contracts::{remix_utils, xhr, RemixUtils, XhrTracking};
use crate::error::{ScriptError, WaitError};
use crate::executor::SessionHandle;

/// Snapshot of the first element matching `arguments[0]`, optionally below
/// the first match of `arguments[1]`. Null when nothing matches.
const ELEMENT_SNAPSHOT: &str = r#"
var scope = arguments[1] ? document.querySelector(arguments[1]) : document;
if (!scope) { return null; }
var el = scope.querySelector(arguments[0]);
if (!el) { return null; }
var style = window.getComputedStyle(el);
var rect = el.getBoundingClientRect();
return {
    tag: el.tagName.toLowerCase(),
    text: el.textContent,
    value: el.value === undefined ? null : el.value,
    displayed: style.display !== 'none' && style.visibility !== 'hidden' && rect.width > 0 && rect.height > 0,
    enabled: !el.disabled,
    selected: !!(el.selected || el.checked)
};
"#;

#[derive(Debug, Clone)]
pub struct ElementSource {
    selector: String,
    root: Option<String>,
}

impl ElementSource {
    pub fn new(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            root: None,
        }
    }

    pub fn within(mut self, root: &str) -> Self {
        self.root = Some(root.to_string());
        self
    }
}

#[async_trait]
impl ConditionSource for ElementSource {
    async fn target(&self, session: &SessionHandle) -> Result<Value, WaitError> {
        let snapshot = session
            .execute_script(ELEMENT_SNAPSHOT, &[json!(self.selector), json!(self.root)])
            .await?;
        if snapshot.is_null() {
            return Err(WaitError::NotFound(self.describe()));
        }
        Ok(snapshot)
    }

    fn describe(&self) -> String {
        match &self.root {
            Some(root) => format!("{} within {}", self.selector, root),
            None => self.selector.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValueSource(pub Value);

#[async_trait]
impl ConditionSource for ValueSource {
    async fn target(&self, _session: &SessionHandle) -> Result<Value, WaitError> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        format!("value {}", self.0)
    }
}

/// The session itself. The target is null; conditions receive the session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSource;

#[async_trait]
impl ConditionSource for SessionSource {
    async fn target(&self, _session: &SessionHandle) -> Result<Value, WaitError> {
        Ok(Value::Null)
    }

    fn describe(&self) -> String {
        "session".into()
    }
}

#[derive(Debug, Clone)]
pub struct VariableSource {
    utils: Option<RemixUtils>,
    name: String,
}

impl VariableSource {
    pub fn new(utils: Option<RemixUtils>, name: &str) -> Self {
        Self {
            utils,
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl ConditionSource for VariableSource {
    async fn target(&self, session: &SessionHandle) -> Result<Value, WaitError> {
        let utils = self
            .utils
            .as_ref()
            .ok_or_else(|| ScriptError::UnknownContract(remix_utils::NAME.into()))?;
        Ok(utils.on(session.clone()).get(&self.name).await?)
    }

    fn describe(&self) -> String {
        format!("variable {}", self.name)
    }
}

/// Whether a matching XHR request started after a point in time.
#[derive(Debug, Clone)]
pub struct AjaxSource {
    xhr: Option<XhrTracking>,
    url: String,
    start_millis: i64,
}

impl AjaxSource {
    pub fn new(xhr: Option<XhrTracking>, url: &str, start_millis: i64) -> Self {
        Self {
            xhr,
            url: url.to_string(),
            start_millis,
        }
    }
}

#[async_trait]
impl ConditionSource for AjaxSource {
    async fn target(&self, session: &SessionHandle) -> Result<Value, WaitError> {
        let xhr = self
            .xhr
            .as_ref()
            .ok_or_else(|| ScriptError::UnknownContract(xhr::NAME.into()))?;
        let seen = xhr
            .on(session.clone())
            .has_request_for(&self.url, self.start_millis)
            .await?;
        Ok(Value::Bool(seen))
    }

    fn decides_alone(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("ajax request {}", self.url)
    }
}

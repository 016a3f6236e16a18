use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

use super::channel_arg;
use crate::binding::{CallArg, Contract, ContractAdapter, GlobalReferenceHolder, ParamKind, TypeConverter};
use crate::config::{ContractDecl, FunctionDecl, Settings, WrapperDecl};
use crate::error::ScriptError;
use crate::executor::SessionHandle;
use crate::script::{DetectionProbe, WrapperRole};

pub const NAME: &str = "JQuery";

const LENGTH_BODY: &str = "var target = arguments[0] ? window[arguments[0]] : null;return target ? target.length : 0;";
const OBJECT_ATTRIBUTE_BODY: &str =
    "var target = arguments[0] ? window[arguments[0]] : null;return target ? target[arguments[2][0]] : null;";

/// `(method, jQuery function, extra value parameters)`
const FUNCTIONS: &[(&str, &str, usize)] = &[
    ("find", "find", 1),
    ("text", "text", 0),
    ("val", "val", 0),
    ("setVal", "val", 1),
    ("attr", "attr", 1),
    ("prop", "prop", 1),
    ("css", "css", 1),
    ("is", "is", 1),
    ("click", "click", 0),
    ("submit", "submit", 0),
    ("width", "width", 0),
    ("height", "height", 0),
    ("first", "first", 0),
    ("last", "last", 0),
    ("prev", "prev", 1),
];

fn element_params(values: usize) -> Vec<ParamKind> {
    let mut params = vec![ParamKind::GlobalReference];
    params.extend(std::iter::repeat(ParamKind::Value).take(values));
    params.push(ParamKind::Channel);
    params
}

pub(crate) fn declaration(settings: &Settings) -> ContractDecl {
    let mut decl = ContractDecl::new(NAME);
    decl.sources = settings.jquery_source.iter().cloned().collect();
    decl.dependencies = vec![super::remix_utils::NAME.into(), super::xhr::NAME.into()];
    decl.detection = Some(DetectionProbe::new("typeof jQuery !== 'undefined'"));
    decl.wrapper = Some(WrapperDecl {
        source: "classpath:remix/javascript/jquery-call\\.js".into(),
        roles: vec![WrapperRole::Reference, WrapperRole::FunctionName, WrapperRole::Arguments],
    });
    decl.functions = FUNCTIONS
        .iter()
        .map(|(method, name, values)| {
            FunctionDecl::new(*method)
                .named(*name)
                .with_params(element_params(*values))
        })
        .collect();
    decl.functions.push(
        FunctionDecl::new("length")
            .with_body(LENGTH_BODY)
            .with_params(element_params(0)),
    );
    decl.functions.push(
        FunctionDecl::new("objectAttribute")
            .with_body(OBJECT_ATTRIBUTE_BODY)
            .with_params(element_params(1)),
    );
    decl
}

/// A jQuery result cached on the page under a global reference.
#[derive(Clone)]
pub struct JQueryElement {
    reference: String,
    session: SessionHandle,
}

impl JQueryElement {
    pub fn new(reference: impl Into<String>, session: SessionHandle) -> Self {
        Self {
            reference: reference.into(),
            session,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }
}

impl std::fmt::Debug for JQueryElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JQueryElement").field("reference", &self.reference).finish()
    }
}

impl GlobalReferenceHolder for JQueryElement {
    fn global_reference(&self) -> Option<String> {
        Some(self.reference.clone())
    }
}

/// Turns the cache reference returned for jQuery results into a [`JQueryElement`].
pub struct JQueryElementConverter;

impl TypeConverter for JQueryElementConverter {
    type Target = JQueryElement;

    fn convert(&self, raw: Value, session: &SessionHandle) -> Result<JQueryElement, ScriptError> {
        match raw {
            Value::String(reference) => Ok(JQueryElement::new(reference, session.clone())),
            other => Err(ScriptError::Conversion {
                target: "JQueryElement",
                reason: format!("expected a jQuery cache reference, got {}", other),
            }),
        }
    }
}

/// jQuery bridge. Every call goes through the `jquery-call.js` wrapper, which
/// applies the named jQuery function to the cached target.
#[derive(Debug, Clone)]
pub struct JQuery {
    contract: Contract,
    channel: Option<SessionHandle>,
}

impl ContractAdapter for JQuery {
    const CONTRACT: &'static str = NAME;

    fn from_contract(contract: Contract) -> Self {
        Self { contract, channel: None }
    }
}

impl JQuery {
    pub fn on(&self, session: SessionHandle) -> Self {
        Self {
            contract: self.contract.clone(),
            channel: Some(session),
        }
    }

    pub async fn find(&self, selector: &str) -> Result<JQueryElement, ScriptError> {
        let args = [
            CallArg::Value(Value::Null),
            CallArg::Value(json!(selector)),
            channel_arg(&self.channel),
        ];
        self.contract.call_converted("find", &args).await
    }

    pub async fn find_in(&self, parent: &JQueryElement, selector: &str) -> Result<JQueryElement, ScriptError> {
        self.on_element_converted("find", parent, vec![json!(selector)]).await
    }

    pub async fn text(&self, element: &JQueryElement) -> Result<String, ScriptError> {
        self.on_element("text", element, vec![]).await
    }

    pub async fn val(&self, element: &JQueryElement) -> Result<Option<String>, ScriptError> {
        self.on_element("val", element, vec![]).await
    }

    pub async fn set_val(&self, element: &JQueryElement, value: &str) -> Result<(), ScriptError> {
        self.invoke_on("setVal", element, vec![json!(value)]).await.map(|_| ())
    }

    pub async fn attr(&self, element: &JQueryElement, name: &str) -> Result<Option<String>, ScriptError> {
        self.on_element("attr", element, vec![json!(name)]).await
    }

    pub async fn prop(&self, element: &JQueryElement, name: &str) -> Result<Value, ScriptError> {
        self.invoke_on("prop", element, vec![json!(name)]).await
    }

    pub async fn css(&self, element: &JQueryElement, name: &str) -> Result<String, ScriptError> {
        self.on_element("css", element, vec![json!(name)]).await
    }

    /// Whether the element matches a jQuery expression such as `:visible`.
    pub async fn is(&self, element: &JQueryElement, expression: &str) -> Result<bool, ScriptError> {
        self.on_element("is", element, vec![json!(expression)]).await
    }

    pub async fn click(&self, element: &JQueryElement) -> Result<(), ScriptError> {
        self.invoke_on("click", element, vec![]).await.map(|_| ())
    }

    pub async fn submit(&self, element: &JQueryElement) -> Result<(), ScriptError> {
        self.invoke_on("submit", element, vec![]).await.map(|_| ())
    }

    pub async fn width(&self, element: &JQueryElement) -> Result<f64, ScriptError> {
        self.on_element("width", element, vec![]).await
    }

    pub async fn height(&self, element: &JQueryElement) -> Result<f64, ScriptError> {
        self.on_element("height", element, vec![]).await
    }

    pub async fn first(&self, element: &JQueryElement) -> Result<JQueryElement, ScriptError> {
        self.on_element_converted("first", element, vec![]).await
    }

    pub async fn last(&self, element: &JQueryElement) -> Result<JQueryElement, ScriptError> {
        self.on_element_converted("last", element, vec![]).await
    }

    pub async fn prev(&self, element: &JQueryElement, selector: &str) -> Result<JQueryElement, ScriptError> {
        self.on_element_converted("prev", element, vec![json!(selector)]).await
    }

    pub async fn length(&self, element: &JQueryElement) -> Result<u64, ScriptError> {
        self.on_element("length", element, vec![]).await
    }

    pub async fn object_attribute(&self, element: &JQueryElement, attribute: &str) -> Result<Value, ScriptError> {
        self.invoke_on("objectAttribute", element, vec![json!(attribute)]).await
    }

    fn element_args(element: &JQueryElement, values: Vec<Value>) -> Vec<CallArg> {
        let mut args = Vec::with_capacity(values.len() + 2);
        args.push(CallArg::Reference(Arc::new(element.clone())));
        args.extend(values.into_iter().map(CallArg::Value));
        args.push(CallArg::Channel(element.session.clone()));
        args
    }

    async fn invoke_on(&self, method: &str, element: &JQueryElement, values: Vec<Value>) -> Result<Value, ScriptError> {
        self.contract.invoke(method, &Self::element_args(element, values)).await
    }

    async fn on_element<T: DeserializeOwned + 'static>(
        &self,
        method: &str,
        element: &JQueryElement,
        values: Vec<Value>,
    ) -> Result<T, ScriptError> {
        self.contract.call(method, &Self::element_args(element, values)).await
    }

    async fn on_element_converted(
        &self,
        method: &str,
        element: &JQueryElement,
        values: Vec<Value>,
    ) -> Result<JQueryElement, ScriptError> {
        self.contract
            .call_converted(method, &Self::element_args(element, values))
            .await
    }
}

use serde_json::{json, Value};

use super::channel_arg;
use crate::binding::{CallArg, Contract, ContractAdapter, ParamKind};
use crate::config::{ContractDecl, FunctionDecl};
use crate::error::ScriptError;
use crate::executor::SessionHandle;
use crate::script::DetectionProbe;

pub const NAME: &str = "RemixUtils";

pub(crate) fn declaration() -> ContractDecl {
    let mut decl = ContractDecl::new(NAME);
    decl.sources = vec!["classpath:remix/javascript/remix-utils\\.js".into()];
    decl.detection = Some(DetectionProbe::new(
        "window.remix !== undefined && window.remix.uuid4 !== undefined",
    ));
    decl.functions = vec![
        FunctionDecl::new("uuid4")
            .named("window.remix.uuid4")
            .with_params(vec![ParamKind::Channel]),
        FunctionDecl::new("get")
            .named("window.remix.get")
            .with_params(vec![ParamKind::Value, ParamKind::Channel]),
        FunctionDecl::new("set")
            .named("window.remix.set")
            .with_params(vec![ParamKind::Value, ParamKind::Value, ParamKind::Channel]),
        FunctionDecl::new("remove")
            .named("window.remix.remove")
            .with_params(vec![ParamKind::Value, ParamKind::Channel]),
    ];
    decl
}

/// Page-global helpers: unique ids and window variables.
#[derive(Debug, Clone)]
pub struct RemixUtils {
    contract: Contract,
    channel: Option<SessionHandle>,
}

impl ContractAdapter for RemixUtils {
    const CONTRACT: &'static str = NAME;

    fn from_contract(contract: Contract) -> Self {
        Self { contract, channel: None }
    }
}

impl RemixUtils {
    /// A copy that runs against `session` instead of the ambient one.
    pub fn on(&self, session: SessionHandle) -> Self {
        Self {
            contract: self.contract.clone(),
            channel: Some(session),
        }
    }

    pub async fn uuid4(&self) -> Result<String, ScriptError> {
        self.contract.call("uuid4", &[channel_arg(&self.channel)]).await
    }

    /// Value of the window variable `name`, null when undefined.
    pub async fn get(&self, name: &str) -> Result<Value, ScriptError> {
        self.contract
            .invoke("get", &[CallArg::Value(json!(name)), channel_arg(&self.channel)])
            .await
    }

    pub async fn set(&self, name: &str, value: Value) -> Result<(), ScriptError> {
        self.contract
            .invoke(
                "set",
                &[CallArg::Value(json!(name)), CallArg::Value(value), channel_arg(&self.channel)],
            )
            .await
            .map(|_| ())
    }

    pub async fn remove(&self, name: &str) -> Result<(), ScriptError> {
        self.contract
            .invoke("remove", &[CallArg::Value(json!(name)), channel_arg(&self.channel)])
            .await
            .map(|_| ())
    }
}

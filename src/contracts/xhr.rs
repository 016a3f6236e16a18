use serde_json::json;

use super::channel_arg;
use crate::binding::{CallArg, Contract, ContractAdapter, ParamKind};
use crate::config::{ContractDecl, FunctionDecl};
use crate::error::ScriptError;
use crate::executor::SessionHandle;
use crate::script::DetectionProbe;

pub const NAME: &str = "XhrTracking";

pub(crate) fn declaration() -> ContractDecl {
    let mut decl = ContractDecl::new(NAME);
    decl.sources = vec!["classpath:remix/javascript/xhr-tracking\\.js".into()];
    decl.detection = Some(DetectionProbe::new(
        "window.remix !== undefined && window.remix.xhrTracking !== undefined",
    ));
    decl.functions = vec![FunctionDecl::new("hasRequestFor")
        .named("window.remix.xhrTracking.hasRequestFor")
        .with_params(vec![ParamKind::Value, ParamKind::Value, ParamKind::Channel])];
    decl
}

/// Records XHR requests started by the page.
#[derive(Debug, Clone)]
pub struct XhrTracking {
    contract: Contract,
    channel: Option<SessionHandle>,
}

impl ContractAdapter for XhrTracking {
    const CONTRACT: &'static str = NAME;

    fn from_contract(contract: Contract) -> Self {
        Self { contract, channel: None }
    }
}

impl XhrTracking {
    pub fn on(&self, session: SessionHandle) -> Self {
        Self {
            contract: self.contract.clone(),
            channel: Some(session),
        }
    }

    /// Whether a request whose URL matches the `url` regex started after
    /// `start_millis` (epoch milliseconds).
    pub async fn has_request_for(&self, url: &str, start_millis: i64) -> Result<bool, ScriptError> {
        self.contract
            .call(
                "hasRequestFor",
                &[
                    CallArg::Value(json!(url)),
                    CallArg::Value(json!(start_millis)),
                    channel_arg(&self.channel),
                ],
            )
            .await
    }
}

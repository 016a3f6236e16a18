use serde_json::json;

use super::channel_arg;
use crate::binding::{CallArg, Contract, ContractAdapter, ParamKind};
use crate::config::{ContractDecl, FunctionDecl};
use crate::error::ScriptError;
use crate::executor::SessionHandle;
use crate::script::DetectionProbe;

pub const NAME: &str = "LinkUtils";

pub(crate) fn declaration() -> ContractDecl {
    let mut decl = ContractDecl::new(NAME);
    decl.sources = vec!["classpath:remix/javascript/link-utils\\.js".into()];
    decl.dependencies = vec![super::remix_utils::NAME.into()];
    decl.detection = Some(DetectionProbe::new(
        "window.remix !== undefined && window.remix.linkUtils !== undefined",
    ));
    decl.functions = vec![FunctionDecl::new("getApplicableUrls")
        .named("window.remix.linkUtils.getApplicableUrls")
        .with_params(vec![ParamKind::Value, ParamKind::Channel])];
    decl
}

#[derive(Debug, Clone)]
pub struct LinkUtils {
    contract: Contract,
    channel: Option<SessionHandle>,
}

impl ContractAdapter for LinkUtils {
    const CONTRACT: &'static str = NAME;

    fn from_contract(contract: Contract) -> Self {
        Self { contract, channel: None }
    }
}

impl LinkUtils {
    pub fn on(&self, session: SessionHandle) -> Self {
        Self {
            contract: self.contract.clone(),
            channel: Some(session),
        }
    }

    /// Every anchor `href` on the page matching one of the regex `patterns`.
    pub async fn applicable_urls(&self, patterns: &[&str]) -> Result<Vec<String>, ScriptError> {
        self.contract
            .call(
                "getApplicableUrls",
                &[CallArg::Value(json!(patterns)), channel_arg(&self.channel)],
            )
            .await
    }
}

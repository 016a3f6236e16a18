//! Contracts shipped with the crate and their typed adapters.

pub mod jquery;
pub mod link_utils;
pub mod remix_utils;
pub mod xhr;

use serde_json::Value;

use crate::binding::CallArg;
use crate::config::{ContractDecl, Settings};
use crate::executor::SessionHandle;

pub use jquery::{JQuery, JQueryElement, JQueryElementConverter};
pub use link_utils::LinkUtils;
pub use remix_utils::RemixUtils;
pub use xhr::XhrTracking;

/// Scripts embedded in the binary, keyed by their classpath-style path.
pub(crate) const EMBEDDED_SCRIPTS: &[(&str, &str)] = &[
    (
        "remix/javascript/remix-utils.js",
        include_str!("../../scripts/remix/javascript/remix-utils.js"),
    ),
    (
        "remix/javascript/xhr-tracking.js",
        include_str!("../../scripts/remix/javascript/xhr-tracking.js"),
    ),
    (
        "remix/javascript/link-utils.js",
        include_str!("../../scripts/remix/javascript/link-utils.js"),
    ),
    (
        "remix/javascript/jquery-call.js",
        include_str!("../../scripts/remix/javascript/jquery-call.js"),
    ),
];

/// Declarations of every built-in contract.
pub fn builtin_declarations(settings: &Settings) -> Vec<ContractDecl> {
    vec![
        remix_utils::declaration(),
        xhr::declaration(),
        jquery::declaration(settings),
        link_utils::declaration(),
    ]
}

/// The trailing channel argument of an adapter call. Null when the adapter
/// runs against the ambient session.
fn channel_arg(channel: &Option<SessionHandle>) -> CallArg {
    match channel {
        Some(session) => CallArg::Channel(session.clone()),
        None => CallArg::Value(Value::Null),
    }
}

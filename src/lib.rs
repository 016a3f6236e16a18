//! Declarative script contracts for browser automation.
//!
//! A contract names a set of page scripts, their dependencies and the
//! functions they expose. Calling a contract method injects whatever the page
//! is missing and runs the function through the session's script channel.
//! The [`wait`] module polls page state until it settles.

pub mod binding;
pub mod browser;
pub mod config;
pub mod context;
pub mod contracts;
pub mod error;
pub mod executor;
pub mod script;
pub mod wait;

pub use binding::{CallArg, Contract, ContractAdapter, ManualImplementation, ParamKind, TypeConverter};
pub use config::{ContractDecl, FunctionDecl, Manifest, Settings};
pub use context::ScriptContext;
pub use error::{ScriptError, WaitError};
pub use executor::{BoaSession, ScriptExecutor, SessionHandle};
pub use wait::{Is, WaitBuilder, WaitUtil};

//! Contract script model: loading sources, linking them into a graph and
//! planning which fragments a call must deliver first.

pub mod graph;
pub mod loader;
pub mod planner;
pub mod source;

pub use graph::ScriptRegistry;
pub use loader::{ResourceSet, ScriptLoader};
pub use planner::InjectionPlanner;
pub use source::{CallWrapper, ContractId, DetectionProbe, ScriptSource, WrapperRole};

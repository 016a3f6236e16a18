use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(String);

impl ContractId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContractId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Script-side check asserting that a contract's code is already present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionProbe {
    pub script: String,
    #[serde(default = "default_auto_return")]
    pub auto_return: bool,
}

fn default_auto_return() -> bool {
    true
}

impl DetectionProbe {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            auto_return: true,
        }
    }

    pub fn without_auto_return(mut self) -> Self {
        self.auto_return = false;
        self
    }

    pub fn statement(&self) -> String {
        if self.auto_return {
            format!("return {};", self.script)
        } else {
            self.script.clone()
        }
    }
}

/// What a call-wrapper parameter receives, by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperRole {
    /// The global reference string of the call's reference holder, or null.
    Reference,
    FunctionName,
    Arguments,
    /// Not populated.
    Unbound,
}

/// Custom script template wrapping every call of a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallWrapper {
    pub source: String,
    pub roles: Vec<WrapperRole>,
}

/// One contract's remote code together with its dependency and plugin edges.
/// Edges can only be added while the source is still owned, before it is frozen behind `Arc`.
#[derive(Debug)]
pub struct ScriptSource {
    contract: ContractId,
    name: Option<String>,
    source: String,
    probe: Option<DetectionProbe>,
    wrapper: Option<CallWrapper>,
    dependencies: Vec<Arc<ScriptSource>>,
    plugins: Vec<Arc<ScriptSource>>,
}

impl ScriptSource {
    pub fn new(contract: impl Into<ContractId>, source: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            name: None,
            source: source.into(),
            probe: None,
            wrapper: None,
            dependencies: Vec::new(),
            plugins: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_probe(mut self, probe: DetectionProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_wrapper(mut self, wrapper: CallWrapper) -> Self {
        self.wrapper = Some(wrapper);
        self
    }

    pub fn add_dependency(&mut self, dependency: Arc<ScriptSource>) {
        self.dependencies.push(dependency);
    }

    pub fn add_plugin(&mut self, plugin: Arc<ScriptSource>) {
        self.plugins.push(plugin);
    }

    pub fn contract(&self) -> &ContractId {
        &self.contract
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn probe(&self) -> Option<&DetectionProbe> {
        self.probe.as_ref()
    }

    pub fn wrapper(&self) -> Option<&CallWrapper> {
        self.wrapper.as_ref()
    }

    pub fn dependencies(&self) -> &[Arc<ScriptSource>] {
        &self.dependencies
    }

    pub fn plugins(&self) -> &[Arc<ScriptSource>] {
        &self.plugins
    }
}

impl From<String> for ContractId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

//! Contract manifest parsing.
//!
//! A manifest is a TOML file that declares global [`Settings`] and the list of
//! capability contracts: where their script sources live, how they relate to
//! other contracts and which remote functions their methods are bound to.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::binding::ParamKind;
use crate::script::{DetectionProbe, WrapperRole};

/// Name of the page variable a page sets when it finished loading.
pub const DEFAULT_PAGE_MARKER: &str = "pageIsReady";

/// Global settings shared by every contract and wait helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub page_marker: String,
    pub marker_timeout_ms: u64,
    pub poll_period_ms: u64,
    /// Period between `$.active` checks while waiting for ajax idle.
    pub ajax_poll_ms: u64,
    pub resource_roots: Vec<PathBuf>,
    /// Location of a jQuery build to inject when the page has none.
    pub jquery_source: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_marker: DEFAULT_PAGE_MARKER.to_string(),
            marker_timeout_ms: 30_000,
            poll_period_ms: 500,
            ajax_poll_ms: 100,
            resource_roots: Vec::new(),
            jquery_source: None,
        }
    }
}

/// Custom call-wrapper declaration of a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperDecl {
    pub source: String,
    #[serde(default)]
    pub roles: Vec<WrapperRole>,
}

/// One contract method bound to a remote function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub method: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Inline call expression used verbatim instead of a function call.
    #[serde(default)]
    pub body: Option<String>,
    /// Declared parameter kinds, used to classify arguments that are null.
    #[serde(default)]
    pub params: Vec<ParamKind>,
}

impl FunctionDecl {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            name: None,
            body: None,
            params: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_params(mut self, params: Vec<ParamKind>) -> Self {
        self.params = params;
        self
    }
}

/// Declaration of one capability contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDecl {
    pub name: String,
    /// Source locations, concatenated in declaration order.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Contracts whose scripts must be present before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Contracts this one extends. Their scripts are appended as plugins.
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub detection: Option<DetectionProbe>,
    #[serde(default)]
    pub wrapper: Option<WrapperDecl>,
    #[serde(default, rename = "function")]
    pub functions: Vec<FunctionDecl>,
    /// Manual interfaces whose registered implementation serves unbound methods.
    #[serde(default)]
    pub manual: Vec<String>,
}

impl ContractDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn function(&self, method: &str) -> Option<&FunctionDecl> {
        self.functions.iter().find(|f| f.method == method)
    }
}

/// A parsed contract manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, rename = "contract")]
    pub contracts: Vec<ContractDecl>,
}

impl Manifest {
    pub fn parse(toml_str: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(toml_str).context("failed to parse contract manifest TOML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse a manifest file. Relative resource roots are resolved against
    /// the manifest's directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let mut manifest = Self::parse(&content).with_context(|| format!("invalid manifest {}", path.display()))?;
        if let Some(base) = path.parent() {
            for root in manifest.settings.resource_roots.iter_mut() {
                if root.is_relative() {
                    *root = base.join(&*root);
                }
            }
        }
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for contract in &self.contracts {
            if contract.name.trim().is_empty() {
                anyhow::bail!("contract name must not be empty");
            }
            if !seen.insert(contract.name.as_str()) {
                anyhow::bail!("contract '{}' is declared twice", contract.name);
            }
        }
        Ok(())
    }
}

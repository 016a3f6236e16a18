use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::binding::{
    Contract, ContractAdapter, ContractSpec, FunctionBinding, ManualImplementation, SessionSlot, TypeConversionRegistry,
    TypeConverter,
};
use crate::config::{ContractDecl, Manifest, Settings};
use crate::contracts::{self, JQueryElementConverter};
use crate::error::ScriptError;
use crate::executor::SessionHandle;
use crate::script::{ResourceSet, ScriptLoader, ScriptRegistry};
use crate::wait::WaitBuilder;

/// Process-wide binding state: the frozen script graph, the converter
/// registry, manual implementations and the ambient session.
pub struct ScriptContext {
    settings: Settings,
    decls: HashMap<String, ContractDecl>,
    registry: ScriptRegistry,
    conversions: Arc<TypeConversionRegistry>,
    manual: RwLock<HashMap<String, Vec<Arc<dyn ManualImplementation>>>>,
    session: SessionSlot,
}

impl ScriptContext {
    /// Build from a manifest, resolving `classpath:` locations against the
    /// embedded scripts and the manifest's resource roots.
    pub fn new(manifest: Manifest) -> Result<Self, ScriptError> {
        let mut resources = ResourceSet::builtin();
        for root in &manifest.settings.resource_roots {
            resources.add_root(root);
        }
        Self::with_resources(manifest, resources)
    }

    /// Build with an explicit resource set. Built-in contracts are declared
    /// first; a manifest contract of the same name replaces the built-in one.
    pub fn with_resources(manifest: Manifest, resources: ResourceSet) -> Result<Self, ScriptError> {
        let Manifest { settings, contracts } = manifest;

        let mut declared = contracts::builtin_declarations(&settings);
        for decl in contracts {
            match declared.iter_mut().find(|d| d.name == decl.name) {
                Some(existing) => *existing = decl,
                None => declared.push(decl),
            }
        }

        let loader = ScriptLoader::new(resources);
        let registry = ScriptRegistry::assemble(&loader, &declared)?;
        tracing::info!(
            "Loaded {} contracts from {} script resources",
            registry.len(),
            loader.resources().len()
        );

        let conversions = Arc::new(TypeConversionRegistry::new());
        conversions.register(JQueryElementConverter);

        Ok(Self {
            settings,
            decls: declared.into_iter().map(|d| (d.name.clone(), d)).collect(),
            registry,
            conversions,
            manual: RwLock::new(HashMap::new()),
            session: Arc::new(RwLock::new(None)),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    pub fn contract_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.decls.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn set_session(&self, session: SessionHandle) {
        *self.session.write() = Some(session);
    }

    pub fn clear_session(&self) {
        *self.session.write() = None;
    }

    pub fn session(&self) -> Option<SessionHandle> {
        self.session.read().clone()
    }

    pub fn register_type_handler<C: TypeConverter>(&self, converter: C) {
        self.conversions.register(converter);
    }

    pub fn conversions(&self) -> &Arc<TypeConversionRegistry> {
        &self.conversions
    }

    pub fn register_manual(&self, interface: &str, implementation: Arc<dyn ManualImplementation>) {
        self.manual
            .write()
            .entry(interface.to_string())
            .or_default()
            .push(implementation);
    }

    /// Build the call surface of contract `name`.
    ///
    /// Functions of extended contracts are callable too; the contract's own
    /// declaration wins on a name clash. Fails when a manual interface has
    /// more than one registered implementation.
    pub fn contract(&self, name: &str) -> Result<Contract, ScriptError> {
        let decl = self
            .decls
            .get(name)
            .ok_or_else(|| ScriptError::UnknownContract(name.to_string()))?;
        let source = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::UnknownContract(name.to_string()))?;

        let mut functions: Vec<FunctionBinding> = Vec::new();
        let mut interfaces: Vec<&str> = Vec::new();
        self.collect(decl, &mut functions, &mut interfaces, &mut Vec::new());

        let manual = {
            let registered = self.manual.read();
            let mut selected = Vec::new();
            for interface in interfaces {
                match registered.get(interface).map(Vec::as_slice) {
                    None | Some([]) => {
                        tracing::warn!("no manual implementation registered for '{}'", interface)
                    }
                    Some([only]) => selected.push(only.clone()),
                    Some(_) => return Err(ScriptError::AmbiguousManualImplementation(interface.to_string())),
                }
            }
            selected
        };

        Ok(Contract::new(
            ContractSpec {
                source,
                functions,
                manual,
            },
            self.conversions.clone(),
            self.session.clone(),
        ))
    }

    pub fn adapter<A: ContractAdapter>(&self) -> Result<A, ScriptError> {
        self.contract(A::CONTRACT).map(A::from_contract)
    }

    /// A wait builder wired to this context's `RemixUtils` and `XhrTracking`.
    pub fn wait(&self) -> WaitBuilder {
        let mut builder = WaitBuilder::new();
        if let Some(session) = self.session() {
            builder = builder.on(session);
        }
        match (self.adapter(), self.adapter()) {
            (Ok(utils), Ok(xhr)) => builder.with_contracts(utils, xhr),
            _ => builder,
        }
    }

    fn collect<'a>(
        &'a self,
        decl: &'a ContractDecl,
        functions: &mut Vec<FunctionBinding>,
        interfaces: &mut Vec<&'a str>,
        seen: &mut Vec<&'a str>,
    ) {
        if seen.contains(&decl.name.as_str()) {
            return;
        }
        seen.push(decl.name.as_str());
        for function in &decl.functions {
            if !functions.iter().any(|f| f.method() == function.method) {
                functions.push(FunctionBinding::from(function));
            }
        }
        for interface in &decl.manual {
            if !interfaces.contains(&interface.as_str()) {
                interfaces.push(interface.as_str());
            }
        }
        for parent in &decl.extends {
            if let Some(parent) = self.decls.get(parent) {
                self.collect(parent, functions, interfaces, seen);
            }
        }
    }
}

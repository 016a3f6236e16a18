use std::collections::HashMap;
use std::sync::Arc;

use super::loader::ScriptLoader;
use super::source::{ContractId, ScriptSource};
use crate::config::ContractDecl;
use crate::error::ScriptError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// The frozen graph of every loaded contract script.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    sources: HashMap<ContractId, Arc<ScriptSource>>,
    order: Vec<ContractId>,
}

impl ScriptRegistry {
    /// Load every declaration and link dependency and plugin edges.
    ///
    /// Dependencies are attached in declaration order, followed by extended
    /// contracts as plugins. References to undeclared contracts are logged and
    /// omitted. A cycle through dependencies or extensions fails assembly.
    pub fn assemble(loader: &ScriptLoader, decls: &[ContractDecl]) -> Result<Self, ScriptError> {
        let by_name: HashMap<&str, &ContractDecl> = decls.iter().map(|d| (d.name.as_str(), d)).collect();
        let mut assembly = Assembly {
            loader,
            by_name: &by_name,
            marks: HashMap::new(),
            path: Vec::new(),
            registry: ScriptRegistry::default(),
        };
        for decl in decls {
            assembly.build(decl)?;
        }
        tracing::debug!("assembled {} contract scripts", assembly.registry.len());
        Ok(assembly.registry)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ScriptSource>> {
        self.sources.get(&ContractId::new(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ScriptSource>> {
        self.order.iter().filter_map(|id| self.sources.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

struct Assembly<'a> {
    loader: &'a ScriptLoader,
    by_name: &'a HashMap<&'a str, &'a ContractDecl>,
    marks: HashMap<String, Mark>,
    path: Vec<String>,
    registry: ScriptRegistry,
}

impl Assembly<'_> {
    fn build(&mut self, decl: &ContractDecl) -> Result<Arc<ScriptSource>, ScriptError> {
        match self.marks.get(&decl.name) {
            Some(Mark::Done) => {
                if let Some(source) = self.registry.get(&decl.name) {
                    return Ok(source.clone());
                }
            }
            Some(Mark::InProgress) => {
                let mut cycle = self.path.clone();
                cycle.push(decl.name.clone());
                return Err(ScriptError::Cycle(cycle.join(" -> ")));
            }
            None => {}
        }
        self.marks.insert(decl.name.clone(), Mark::InProgress);
        self.path.push(decl.name.clone());

        let dependencies = self.resolve_all(decl, &decl.dependencies, "dependency")?;
        let plugins = self.resolve_all(decl, &decl.extends, "extended contract")?;

        let mut source = self.loader.load(decl)?;
        for dependency in dependencies {
            source.add_dependency(dependency);
        }
        for plugin in plugins {
            source.add_plugin(plugin);
        }
        let source = Arc::new(source);

        self.path.pop();
        self.marks.insert(decl.name.clone(), Mark::Done);
        let id = source.contract().clone();
        self.registry.sources.insert(id.clone(), source.clone());
        self.registry.order.push(id);
        Ok(source)
    }

    fn resolve_all(
        &mut self,
        owner: &ContractDecl,
        names: &[String],
        kind: &str,
    ) -> Result<Vec<Arc<ScriptSource>>, ScriptError> {
        let by_name = self.by_name;
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            match by_name.get(name.as_str()) {
                Some(decl) => resolved.push(self.build(decl)?),
                None => tracing::warn!(
                    "{} '{}' of contract '{}' is not declared, ignoring it",
                    kind,
                    name,
                    owner.name
                ),
            }
        }
        Ok(resolved)
    }
}

use std::path::{Path, PathBuf};

use globset::Glob;
use regex::Regex;
use walkdir::WalkDir;

use super::source::{CallWrapper, ScriptSource};
use crate::config::ContractDecl;
use crate::error::ScriptError;

const CLASSPATH_PREFIX: &str = "classpath:";

#[derive(Debug, Clone)]
enum Body {
    Embedded(&'static str),
    File(PathBuf),
}

#[derive(Debug, Clone)]
struct Resource {
    path: String,
    body: Body,
}

impl Resource {
    fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    fn read(&self) -> Result<String, ScriptError> {
        match &self.body {
            Body::Embedded(text) => Ok((*text).to_string()),
            Body::File(path) => std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
                location: path.display().to_string(),
                source,
            }),
        }
    }
}

/// Every resource a `classpath:` location can resolve to.
///
/// Built-in contract scripts are embedded in the binary; resource roots add
/// every file found beneath them.
#[derive(Debug, Clone, Default)]
pub struct ResourceSet {
    resources: Vec<Resource>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut set = Self::new();
        for (path, text) in crate::contracts::EMBEDDED_SCRIPTS {
            set.add_embedded(path, text);
        }
        set
    }

    pub fn add_embedded(&mut self, path: &str, text: &'static str) {
        self.resources.push(Resource {
            path: path.trim_start_matches('/').to_string(),
            body: Body::Embedded(text),
        });
    }

    /// Enumerate every file beneath `root`. A missing root only warns.
    pub fn add_root(&mut self, root: &Path) {
        if !root.is_dir() {
            tracing::warn!("resource root '{}' is not a directory", root.display());
            return;
        }
        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("skipping unreadable entry under '{}': {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            self.resources.push(Resource {
                path,
                body: Body::File(entry.path().to_path_buf()),
            });
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources matching a classpath pattern `[<dir-regex>/]<file-regex>`, sorted by path.
    ///
    /// The file regex must match a resource's whole file name. With a
    /// directory part, the joined `dir/file` regex must additionally be found
    /// somewhere in the resource path.
    fn matching(&self, pattern: &str) -> Result<Vec<&Resource>, ScriptError> {
        let (dir, file) = match pattern.rfind('/') {
            Some(idx) => (Some(&pattern[..idx]), &pattern[idx + 1..]),
            None => (None, pattern),
        };
        let file_re = compile(pattern, &format!("^(?:{})$", file))?;
        let path_re = match dir {
            Some(dir) => Some(compile(pattern, &format!("{}/{}", dir, file))?),
            None => None,
        };

        let mut matches: Vec<&Resource> = self
            .resources
            .iter()
            .filter(|r| file_re.is_match(r.file_name()))
            .filter(|r| path_re.as_ref().map_or(true, |re| re.is_match(&r.path)))
            .collect();
        matches.sort_by(|a, b| a.path.cmp(&b.path));
        matches.dedup_by(|a, b| a.path == b.path);
        Ok(matches)
    }
}

fn compile(pattern: &str, regex: &str) -> Result<Regex, ScriptError> {
    Regex::new(regex).map_err(|e| ScriptError::Pattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

pub struct ScriptLoader {
    resources: ResourceSet,
}

impl ScriptLoader {
    pub fn new(resources: ResourceSet) -> Self {
        Self { resources }
    }

    pub fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    /// Load one contract's sources, detection probe and call wrapper.
    ///
    /// Dependency and plugin edges are attached later, when the whole
    /// registry is assembled.
    pub fn load(&self, decl: &ContractDecl) -> Result<ScriptSource, ScriptError> {
        let mut text = String::new();
        for location in decl.sources.iter().filter(|l| !l.is_empty()) {
            text.push_str(&self.resolve(location)?);
            text.push('\n');
        }

        let mut source = ScriptSource::new(decl.name.as_str(), text);
        if let Some(probe) = &decl.detection {
            source = source.with_probe(probe.clone());
        }
        if let Some(wrapper) = &decl.wrapper {
            if wrapper.source.is_empty() {
                tracing::warn!("contract '{}' declares a call wrapper without a location", decl.name);
            } else {
                let wrapper_text = self.resolve(&wrapper.source)?;
                if !wrapper_text.is_empty() {
                    source = source.with_wrapper(CallWrapper {
                        source: wrapper_text,
                        roles: wrapper.roles.clone(),
                    });
                }
            }
        }
        Ok(source)
    }

    /// Resolve one location to its text. Every match is followed by a newline;
    /// a location with no match yields an empty string.
    pub fn resolve(&self, location: &str) -> Result<String, ScriptError> {
        match location.strip_prefix(CLASSPATH_PREFIX) {
            Some(pattern) => self.from_classpath(pattern),
            None => from_filesystem(location),
        }
    }

    fn from_classpath(&self, pattern: &str) -> Result<String, ScriptError> {
        let matches = self.resources.matching(pattern)?;
        if matches.is_empty() {
            tracing::warn!("no matching script resources for classpath '{}'", pattern);
        }
        let mut text = String::new();
        for resource in matches {
            text.push_str(&resource.read()?);
            text.push('\n');
        }
        Ok(text)
    }
}

/// Resolve `[<dir>/]<glob>` against the files of one directory.
fn from_filesystem(location: &str) -> Result<String, ScriptError> {
    let (dir, file) = match location.rfind('/') {
        Some(idx) => (&location[..idx], &location[idx + 1..]),
        None => ("", location),
    };
    let dir = if dir.is_empty() { Path::new(".") } else { Path::new(dir) };

    let matcher = Glob::new(file)
        .map_err(|e| ScriptError::Pattern {
            pattern: location.to_string(),
            reason: e.to_string(),
        })?
        .compile_matcher();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("requested resource '{}' not found", location);
            return Ok(String::new());
        }
        Err(source) => {
            return Err(ScriptError::Read {
                location: location.to_string(),
                source,
            })
        }
    };

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ScriptError::Read {
            location: location.to_string(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && matcher.is_match(entry.file_name()) {
            paths.push(path);
        }
    }
    paths.sort();

    if paths.is_empty() {
        tracing::warn!("requested resource '{}' not found", location);
    }
    let mut text = String::new();
    for path in paths {
        let content = std::fs::read_to_string(&path).map_err(|source| ScriptError::Read {
            location: path.display().to_string(),
            source,
        })?;
        text.push_str(&content);
        text.push('\n');
    }
    Ok(text)
}

//! Multi-module inference
//!
//! A [`Project`] owns the constraint graph shared by every module it loads.
//! Adding a module first forces the modules it imports, so exports are wired
//! in dependency order. A module that is still being analysed when it is
//! imported again closes a cycle and is seen as `Any` by the importer.

use crate::ast::{Module, Stmt, StmtKind};
use crate::ast_bridge::parse_module;
use crate::config::InferConfig;
use crate::dataflow::{Diagnostic, DiagnosticKind, Graph, ModuleAnalysis, ModuleId, ModuleInferencer, NodeId, Ty};
use crate::error::{InferError, Result};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Source text of one module
#[derive(Debug, Clone)]
pub struct SourceModule {
    pub text: String,
    /// `__init__.py` of a package
    pub is_package: bool,
    pub path: Option<PathBuf>,
}

/// Where module source comes from
pub trait ModuleSource {
    /// Load a module by dotted name; `Ok(None)` when it does not exist
    fn load(&self, name: &str) -> Result<Option<SourceModule>>;
}

/// Modules laid out as `.py` files under a root directory
#[derive(Debug, Clone)]
pub struct FsModuleSource {
    root: PathBuf,
}

impl FsModuleSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Dotted module name of a file under the root
    pub fn module_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        if relative.extension()? != "py" {
            return None;
        }
        let mut parts: Vec<String> = relative
            .with_extension("")
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.last().is_some_and(|last| last == "__init__") {
            parts.pop();
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("."))
        }
    }
}

impl ModuleSource for FsModuleSource {
    fn load(&self, name: &str) -> Result<Option<SourceModule>> {
        let base = name.split('.').fold(self.root.clone(), |path, part| path.join(part));
        let candidates = [(base.with_extension("py"), false), (base.join("__init__.py"), true)];
        for (path, is_package) in candidates {
            if path.is_file() {
                let text = std::fs::read_to_string(&path).map_err(|e| InferError::io(&path, e))?;
                return Ok(Some(SourceModule {
                    text,
                    is_package,
                    path: Some(path),
                }));
            }
        }
        Ok(None)
    }
}

/// In-memory modules, keyed by dotted name
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    modules: IndexMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, name: &str, text: &str) -> Self {
        self.modules.insert(name.to_string(), text.to_string());
        self
    }
}

impl ModuleSource for MemorySource {
    fn load(&self, name: &str) -> Result<Option<SourceModule>> {
        let prefix = format!("{name}.");
        Ok(self.modules.get(name).map(|text| SourceModule {
            text: text.clone(),
            is_package: self.modules.keys().any(|other| other.starts_with(&prefix)),
            path: None,
        }))
    }
}

/// What an import path resolved to when the importer was analysed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportTarget {
    Module(ModuleId),
    /// Still being analysed further up the import chain
    Cyclic,
    Missing,
}

/// Absolute name of `from <level dots><module> import ...` inside `importer`
pub fn resolve_import(importer: &str, is_package: bool, module: Option<&str>, level: u32) -> Option<String> {
    if level == 0 {
        return module.map(str::to_string);
    }
    let mut parts: Vec<&str> = importer.split('.').collect();
    if !is_package {
        parts.pop();
    }
    for _ in 1..level {
        parts.pop()?;
    }
    if let Some(module) = module {
        parts.extend(module.split('.'));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}

#[derive(Debug, Clone, Copy)]
enum LoadState {
    InProgress(ModuleId),
    Done(ModuleId),
    Missing,
}

/// Module paths a body imports; `true` marks paths that may legitimately be
/// absent (a `from` import naming a member rather than a submodule)
fn import_candidates(importer: &str, is_package: bool, body: &[Stmt], out: &mut IndexMap<String, bool>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    let mut prefix = String::new();
                    for part in alias.path.split('.') {
                        if !prefix.is_empty() {
                            prefix.push('.');
                        }
                        prefix.push_str(part);
                        out.insert(prefix.clone(), false);
                    }
                }
            }
            StmtKind::ImportFrom { module, names, level } => {
                let Some(absolute) = resolve_import(importer, is_package, module.as_deref(), *level) else {
                    continue;
                };
                let mut prefix = String::new();
                for part in absolute.split('.') {
                    if !prefix.is_empty() {
                        prefix.push('.');
                    }
                    prefix.push_str(part);
                    out.entry(prefix.clone()).or_insert(false);
                }
                for alias in names.iter().filter(|a| a.binder.name != "*") {
                    out.entry(format!("{absolute}.{}", alias.path)).or_insert(true);
                }
            }
            StmtKind::FunctionDef(def) => import_candidates(importer, is_package, &def.body, out),
            StmtKind::ClassDef(def) => import_candidates(importer, is_package, &def.body, out),
            StmtKind::For { body, orelse, .. } | StmtKind::While { body, orelse, .. } | StmtKind::If { body, orelse, .. } => {
                import_candidates(importer, is_package, body, out);
                import_candidates(importer, is_package, orelse, out);
            }
            StmtKind::With { body, .. } => import_candidates(importer, is_package, body, out),
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                import_candidates(importer, is_package, body, out);
                for handler in handlers {
                    import_candidates(importer, is_package, &handler.body, out);
                }
                import_candidates(importer, is_package, orelse, out);
                import_candidates(importer, is_package, finalbody, out);
            }
            _ => {}
        }
    }
}

/// A set of modules inferred together over one constraint graph
pub struct Project<S> {
    source: S,
    config: InferConfig,
    graph: Graph,
    states: HashMap<String, LoadState>,
    analyses: Vec<ModuleAnalysis>,
}

impl<S: ModuleSource> Project<S> {
    pub fn new(source: S, config: InferConfig) -> Self {
        let graph = Graph::new(config.unbound_as_none);
        Self {
            source,
            config,
            graph,
            states: HashMap::new(),
            analyses: Vec::new(),
        }
    }

    pub fn config(&self) -> &InferConfig {
        &self.config
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Analyse a module and everything it imports
    ///
    /// Unlike its dependencies, the requested module must exist and parse.
    pub fn add_module(&mut self, name: &str) -> Result<()> {
        match self.states.get(name) {
            Some(LoadState::Done(_) | LoadState::InProgress(_)) => return Ok(()),
            Some(LoadState::Missing) => return Err(InferError::ModuleNotFound(name.to_string())),
            None => {}
        }
        let loaded = self
            .source
            .load(name)?
            .ok_or_else(|| InferError::ModuleNotFound(name.to_string()))?;
        let module = parse_module(&loaded.text, name)?;
        self.analyse(name, loaded.is_package, &module);
        Ok(())
    }

    fn id_of(&self, name: &str) -> Option<ModuleId> {
        match self.states.get(name)? {
            LoadState::InProgress(id) | LoadState::Done(id) => Some(*id),
            LoadState::Missing => None,
        }
    }

    /// Load an imported module on demand
    fn ensure(&mut self, name: &str) -> ImportTarget {
        match self.states.get(name) {
            Some(LoadState::InProgress(_)) => return ImportTarget::Cyclic,
            Some(LoadState::Done(id)) => return ImportTarget::Module(*id),
            Some(LoadState::Missing) => return ImportTarget::Missing,
            None => {}
        }
        let loaded = match self.source.load(name) {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                self.states.insert(name.to_string(), LoadState::Missing);
                return ImportTarget::Missing;
            }
            Err(error) => {
                warn!(module = name, %error, "failed to load imported module");
                self.states.insert(name.to_string(), LoadState::Missing);
                return ImportTarget::Missing;
            }
        };
        match parse_module(&loaded.text, name) {
            Ok(module) => self.analyse(name, loaded.is_package, &module),
            Err(error) => {
                warn!(module = name, %error, "skipping imported module that does not parse");
                self.states.insert(name.to_string(), LoadState::Missing);
                ImportTarget::Missing
            }
        }
    }

    fn analyse(&mut self, name: &str, is_package: bool, module: &Module) -> ImportTarget {
        let parent = match name.rsplit_once('.') {
            Some((parent, leaf)) => {
                self.ensure(parent);
                self.id_of(parent).map(|id| (id, leaf))
            }
            None => None,
        };
        let id = self.graph.add_module(name);
        self.states.insert(name.to_string(), LoadState::InProgress(id));
        if let Some((parent, leaf)) = parent {
            self.graph.add_submodule(parent, leaf, id);
        }

        let mut candidates = IndexMap::new();
        import_candidates(name, is_package, &module.body, &mut candidates);
        let mut imports = HashMap::new();
        for (candidate, optional) in candidates {
            if candidate == name {
                continue;
            }
            let target = self.ensure(&candidate);
            if !(optional && target == ImportTarget::Missing) {
                imports.insert(candidate, target);
            }
        }
        debug!(module = name, imports = imports.len(), "analysing module");

        let analysis = ModuleInferencer::new(&mut self.graph, &self.config, &imports, name, id, is_package).infer(module);
        self.states.insert(name.to_string(), LoadState::Done(id));
        self.analyses.push(analysis);
        ImportTarget::Module(id)
    }

    /// Recompute every node once more; a settled graph reports zero growths
    pub fn repropagate(&mut self) -> u64 {
        self.graph.repropagate_all()
    }

    /// Settle the graph and produce one report per analysed module, in
    /// dependency order
    pub fn finish(mut self) -> Vec<ModuleReport> {
        let grown = self.repropagate();
        if grown > 0 {
            warn!(grown, "constraint graph was not at a fixpoint");
        }
        let stats = self.graph.stats();
        debug!(
            modules = self.analyses.len(),
            nodes = self.graph.node_count(),
            recomputations = stats.recomputations,
            growths = stats.growths,
            "inference finished"
        );
        self.analyses.iter().map(|analysis| self.report(analysis)).collect()
    }

    fn report(&self, analysis: &ModuleAnalysis) -> ModuleReport {
        let graph = &self.graph;
        let mut diagnostics = analysis.diagnostics.clone();
        for node in &analysis.checks {
            if let Some(kind) = graph.check(*node) {
                diagnostics.push(Diagnostic::new(analysis.name.clone(), graph.line(*node), kind));
            }
        }
        if self.config.check_constructor_returns {
            for constructor in &analysis.constructors {
                let returned: Vec<String> = graph
                    .types(constructor.returns)
                    .iter()
                    .filter(|ty| **ty != Ty::NONE && **ty != Ty::Any)
                    .map(|ty| graph.describe(ty))
                    .collect();
                if !returned.is_empty() {
                    let kind = DiagnosticKind::ConstructorReturnsValue {
                        class: graph.class(constructor.class).name.clone(),
                        value: format!("{{{}}}", returned.join(", ")),
                    };
                    diagnostics.push(Diagnostic::new(analysis.name.clone(), constructor.line, kind));
                }
            }
        }
        diagnostics.sort_by_key(|d| d.line);
        diagnostics.dedup();

        let bindings = analysis
            .exports
            .iter()
            .map(|(name, node)| BindingSummary::new(graph, name, *node))
            .collect();
        let functions = analysis
            .functions
            .iter()
            .map(|id| {
                let info = graph.function(*id);
                FunctionSummary {
                    name: info.name.clone(),
                    line: info.line,
                    params: info
                        .params
                        .iter()
                        .map(|p| BindingSummary::new(graph, &p.name, p.node))
                        .collect(),
                    returns: TypeSummary(graph.type_names(info.returns)),
                }
            })
            .collect();

        ModuleReport {
            module: analysis.name.clone(),
            diagnostics,
            bindings,
            functions,
        }
    }
}

/// Sorted type names of one binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TypeSummary(pub Vec<String>);

impl TypeSummary {
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }
}

impl fmt::Display for TypeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingSummary {
    pub name: String,
    pub types: TypeSummary,
}

impl BindingSummary {
    fn new(graph: &Graph, name: &str, node: NodeId) -> Self {
        Self {
            name: name.to_string(),
            types: TypeSummary(graph.type_names(node)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionSummary {
    /// Qualified by enclosing classes and functions, e.g. `A.get`
    pub name: String,
    pub line: u32,
    pub params: Vec<BindingSummary>,
    pub returns: TypeSummary,
}

impl FunctionSummary {
    pub fn param(&self, name: &str) -> Option<&TypeSummary> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.types)
    }
}

/// Inference results for one module
#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    pub module: String,
    pub diagnostics: Vec<Diagnostic>,
    pub bindings: Vec<BindingSummary>,
    pub functions: Vec<FunctionSummary>,
}

impl ModuleReport {
    pub fn binding(&self, name: &str) -> Option<&TypeSummary> {
        self.bindings.iter().find(|b| b.name == name).map(|b| &b.types)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSummary> {
        self.functions.iter().find(|f| f.name == name)
    }
}

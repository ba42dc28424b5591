//! High-level API for constraint-based type inference
//!
//! [`ModuleInferencer`] walks one module after its CFG and SSA form have been
//! built. Every binding site and expression gets a node in the shared
//! [`Graph`]; class and function bodies are analysed in scopes of their own,
//! and usages of unannotated parameters feed one [`ParamSolver`] per function.

use super::builtins;
use super::cfg::{BlockItem, Cfg, CfgError, LoopId};
use super::graph::{ArgKind, CallArg, FunctionInfo, Graph, MethodKind, NodeId, ParamInfo, ParamKind, Target};
use super::issues::{Diagnostic, DiagnosticKind};
use super::lattice::{indexable_kinds, iterable_kinds, ClassId, FuncId, Kind, KindSet, ModuleId, Ty, TypeSet};
use super::solver::{invertible_kinds, numeric_kinds, operand_kinds, ParamSolver};
use super::ssa::{Def, Ssa, INITIAL_VERSION};
use crate::ast::{
    BinOp, ClassDef, Comprehension, ComprehensionKind, Constant, Expr, ExprKind, FunctionDef, ImportAlias, Module,
    NameId, Parameters, Stmt, StmtKind, UnaryOp,
};
use crate::config::InferConfig;
use crate::project::{resolve_import, ImportTarget, MemorySource, ModuleReport, Project};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Infer types for a Python source string.
///
/// The source is analysed as a standalone module named `__main__`; imports
/// of other modules resolve to `Any` and are reported as unresolved.
///
/// # Example
/// ```ignore
/// use pyinfer_core::dataflow::infer_python;
///
/// let report = infer_python("x = 1 + 2.5\n")?;
/// assert_eq!(report.binding("x").unwrap().to_string(), "{float}");
/// ```
pub fn infer_python(source: &str) -> Result<ModuleReport> {
    infer_python_with(source, InferConfig::default())
}

/// Like [`infer_python`] with an explicit configuration
pub fn infer_python_with(source: &str, config: InferConfig) -> Result<ModuleReport> {
    let mut project = Project::new(MemorySource::new().with_module("__main__", source), config);
    project.add_module("__main__").context("failed to analyse source")?;
    project
        .finish()
        .into_iter()
        .find(|report| report.module == "__main__")
        .context("no report produced for __main__")
}

/// An `__init__` whose return values are checked once inference is done
#[derive(Debug, Clone, Copy)]
pub struct ConstructorReturn {
    pub class: ClassId,
    pub returns: NodeId,
    pub line: u32,
}

/// Everything the driver produced for one module
#[derive(Debug)]
pub struct ModuleAnalysis {
    pub name: String,
    pub module: ModuleId,
    /// Top-level bindings, each the union of all its versions
    pub exports: IndexMap<String, NodeId>,
    pub functions: Vec<FuncId>,
    /// Nodes whose success is queried after the fixpoint
    pub checks: Vec<NodeId>,
    pub constructors: Vec<ConstructorReturn>,
    /// Issues known without waiting for the fixpoint
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Module,
    Class(ClassId),
    Function(FuncId),
}

struct Scope {
    kind: ScopeKind,
    ssa: Ssa,
    bindings: HashMap<(String, u32), NodeId>,
    summary: IndexMap<String, NodeId>,
    loops: HashMap<LoopId, NodeId>,
    /// Names bound by comprehensions and lambdas being walked
    frames: Vec<HashMap<String, NodeId>>,
}

impl Scope {
    fn new(kind: ScopeKind, ssa: Ssa) -> Self {
        Self {
            kind,
            ssa,
            bindings: HashMap::new(),
            summary: IndexMap::new(),
            loops: HashMap::new(),
            frames: Vec::new(),
        }
    }
}

struct Solving {
    solver: ParamSolver,
    params: Vec<NodeId>,
}

pub struct ModuleInferencer<'g> {
    graph: &'g mut Graph,
    config: &'g InferConfig,
    imports: &'g HashMap<String, ImportTarget>,
    name: String,
    module: ModuleId,
    is_package: bool,
    scopes: Vec<Scope>,
    /// Qualified-name prefix of the body being walked
    path: Vec<String>,
    solvers: Vec<Solving>,
    param_slots: HashMap<NodeId, (usize, usize)>,
    star_imports: Vec<ModuleId>,
    functions: Vec<FuncId>,
    checks: Vec<NodeId>,
    constructors: Vec<ConstructorReturn>,
    diagnostics: Vec<Diagnostic>,
}

impl<'g> ModuleInferencer<'g> {
    pub fn new(
        graph: &'g mut Graph,
        config: &'g InferConfig,
        imports: &'g HashMap<String, ImportTarget>,
        name: &str,
        module: ModuleId,
        is_package: bool,
    ) -> Self {
        Self {
            graph,
            config,
            imports,
            name: name.to_string(),
            module,
            is_package,
            scopes: Vec::new(),
            path: Vec::new(),
            solvers: Vec::new(),
            param_slots: HashMap::new(),
            star_imports: Vec::new(),
            functions: Vec::new(),
            checks: Vec::new(),
            constructors: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn infer(mut self, module: &Module) -> ModuleAnalysis {
        let cfg = Cfg::module(&module.body);
        self.report_cfg_errors(&cfg.errors);
        let ssa = Ssa::build(&cfg, &[]);
        self.scopes.push(Scope::new(ScopeKind::Module, ssa));
        let locals: Vec<String> = self.scopes[0].ssa.locals.iter().cloned().collect();
        for local in &locals {
            self.summary(0, local);
        }
        self.walk(&cfg);

        let exports = self.scopes.pop().map(|scope| scope.summary).unwrap_or_default();
        debug!(
            module = %self.name,
            bindings = exports.len(),
            functions = self.functions.len(),
            checks = self.checks.len(),
            "module inferred"
        );
        ModuleAnalysis {
            name: self.name,
            module: self.module,
            exports,
            functions: self.functions,
            checks: self.checks,
            constructors: self.constructors,
            diagnostics: self.diagnostics,
        }
    }

    // ----- scopes and bindings -------------------------------------------

    fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    fn current(&self) -> &Scope {
        &self.scopes[self.depth()]
    }

    fn current_mut(&mut self) -> &mut Scope {
        let depth = self.depth();
        &mut self.scopes[depth]
    }

    fn qualify(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{name}", self.path.join("."))
        }
    }

    /// Union of every version of `name` in the scope at `depth`
    fn summary(&mut self, depth: usize, name: &str) -> NodeId {
        if let Some(node) = self.scopes[depth].summary.get(name) {
            return *node;
        }
        let node = self.graph.plain(0);
        self.scopes[depth].summary.insert(name.to_string(), node);
        match self.scopes[depth].kind {
            ScopeKind::Module => self.graph.set_export(self.module, name, node),
            ScopeKind::Class(class) => self.graph.add_own_member(class, name, node),
            ScopeKind::Function(_) => {}
        }
        node
    }

    /// Node of one version of a local in the current scope
    fn binding(&mut self, name: &str, version: u32, line: u32) -> NodeId {
        let depth = self.depth();
        let key = (name.to_string(), version);
        if let Some(node) = self.scopes[depth].bindings.get(&key) {
            return *node;
        }
        let node = self.graph.plain(line);
        self.scopes[depth].bindings.insert(key, node);
        let summary = self.summary(depth, name);
        self.graph.add_input(summary, node);
        node
    }

    fn any(&mut self) -> NodeId {
        self.graph.constant(Ty::Any)
    }

    fn unbound(&mut self, line: u32) -> NodeId {
        if self.config.unbound_as_none {
            self.graph.constant(Ty::NONE)
        } else {
            self.graph.plain(line)
        }
    }

    /// A local of the nearest enclosing function scope
    fn enclosing(&mut self, depth: usize, name: &str) -> Option<NodeId> {
        let found = (1..depth)
            .rev()
            .find(|d| matches!(self.scopes[*d].kind, ScopeKind::Function(_)) && self.scopes[*d].ssa.is_local(name))?;
        Some(self.summary(found, name))
    }

    /// Module-level name, star imports, then builtins
    fn global(&mut self, name: &str) -> NodeId {
        if self.scopes[0].ssa.is_local(name) || self.scopes[0].summary.contains_key(name) {
            return self.summary(0, name);
        }
        for module in &self.star_imports {
            if let Some(node) = self.graph.module(*module).exports.get(name) {
                return *node;
            }
        }
        if self.config.builtins_as_any.iter().any(|n| n == name) {
            return self.any();
        }
        match builtins::lookup(name) {
            Some(ty) => self.graph.constant(ty),
            None => {
                trace!(module = %self.name, name, "unresolved name");
                self.any()
            }
        }
    }

    fn read_name(&mut self, id: NameId, name: &str, line: u32) -> NodeId {
        let depth = self.depth();
        let framed = self.scopes[depth]
            .frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).copied());
        if let Some(node) = framed {
            return node;
        }
        let ssa = &self.scopes[depth].ssa;
        if ssa.globals.contains(name) {
            return self.global(name);
        }
        if ssa.nonlocals.contains(name) {
            return match self.enclosing(depth, name) {
                Some(node) => node,
                None => self.any(),
            };
        }
        match ssa.reads.get(&id).copied() {
            Some(Def::Version(version)) => return self.binding(name, version, line),
            Some(Def::Unbound) => return self.unbound(line),
            None => {}
        }
        if ssa.is_local(name) {
            return self.summary(depth, name);
        }
        match self.enclosing(depth, name) {
            Some(node) => node,
            None => self.global(name),
        }
    }

    fn write_name(&mut self, id: NameId, name: &str, value: NodeId, line: u32) {
        let depth = self.depth();
        let ssa = &self.scopes[depth].ssa;
        let target = if let Some(version) = ssa.writes.get(&id).copied() {
            Some(self.binding(name, version, line))
        } else if ssa.globals.contains(name) {
            Some(self.summary(0, name))
        } else if ssa.nonlocals.contains(name) {
            self.enclosing(depth, name)
        } else {
            None
        };
        if let Some(target) = target {
            self.graph.add_input(target, value);
        }
    }

    // ----- parameter solving ---------------------------------------------

    fn push_solver(&mut self, params: Vec<NodeId>) {
        let index = self.solvers.len();
        for (position, node) in params.iter().enumerate() {
            self.param_slots.insert(*node, (index, position));
        }
        self.solvers.push(Solving {
            solver: ParamSolver::new(params.len()),
            params,
        });
    }

    fn pop_solver(&mut self) {
        let Some(Solving { solver, params }) = self.solvers.pop() else {
            return;
        };
        for node in &params {
            self.param_slots.remove(node);
        }
        let solved = solver.solve();
        for (node, kinds) in params.into_iter().zip(solved) {
            let types = match kinds {
                Some(kinds) if self.config.infer_parameters => TypeSet::from_kinds(kinds),
                _ => TypeSet::any(),
            };
            trace!(node = node.0, %types, "parameter solved");
            self.graph.seed(node, &types);
        }
    }

    fn restrict(&mut self, node: NodeId, allowed: KindSet) {
        if let Some((solver, index)) = self.param_slots.get(&node).copied() {
            self.solvers[solver].solver.restrict(index, allowed);
        }
    }

    /// Kinds of a fully resolved operand, if it only holds base kinds
    fn known_kinds(&self, node: NodeId) -> Option<KindSet> {
        let types = self.graph.types(node);
        if types.is_empty() || types.has_any() {
            None
        } else {
            types.kinds()
        }
    }

    fn constrain_binop(&mut self, op: BinOp, left: NodeId, right: NodeId) {
        let slots = (self.param_slots.get(&left).copied(), self.param_slots.get(&right).copied());
        match slots {
            (Some((ls, li)), Some((rs, ri))) => {
                if ls == rs {
                    self.solvers[ls].solver.pair(li, ri, op);
                }
            }
            (Some(_), None) => {
                if let Some(kinds) = self.known_kinds(right) {
                    self.restrict(left, operand_kinds(op, Some(kinds), true));
                }
            }
            (None, Some(_)) => {
                if let Some(kinds) = self.known_kinds(left) {
                    self.restrict(right, operand_kinds(op, Some(kinds), false));
                }
            }
            (None, None) => {}
        }
    }

    fn param_kinds(&self, function: FuncId, position: usize) -> Option<KindSet> {
        let info = self.graph.function(function);
        let param = info
            .params
            .iter()
            .filter(|p| p.kind == ParamKind::Positional)
            .nth(position)?;
        self.known_kinds(param.node)
    }

    /// Parameters passed as arguments take the kinds the callee accepts
    fn constrain_arguments(&mut self, callee: NodeId, args: &[CallArg]) {
        let positional: Vec<(usize, NodeId)> = args
            .iter()
            .filter(|a| a.kind == ArgKind::Positional)
            .map(|a| a.value)
            .enumerate()
            .collect();
        for (position, value) in positional {
            if !self.param_slots.contains_key(&value) {
                continue;
            }
            let candidates = self.graph.types(callee);
            let mut informative = !candidates.is_empty();
            let mut allowed = KindSet::EMPTY;
            for ty in candidates.iter() {
                let kinds = match *ty {
                    Ty::BuiltinFunction(name) if position == 0 => builtins::function(name).and_then(|f| f.accepts),
                    Ty::Function(f) => self.param_kinds(f, position),
                    Ty::Method(f) => self.param_kinds(f, position + 1),
                    _ => None,
                };
                match kinds {
                    Some(kinds) => allowed = allowed.union(kinds),
                    None => informative = false,
                }
            }
            if informative {
                self.restrict(value, allowed);
            }
        }
    }

    // ----- walking ---------------------------------------------------------

    fn report_cfg_errors(&mut self, errors: &[CfgError]) {
        if !self.config.report_construction_errors {
            return;
        }
        for error in errors {
            self.diagnostics.push(Diagnostic::new(
                self.name.clone(),
                error.line(),
                DiagnosticKind::Construction {
                    message: error.to_string(),
                },
            ));
        }
    }

    fn walk(&mut self, cfg: &Cfg<'_>) {
        // merges first, so a read resolving to one always finds its node
        let phis = self.current().ssa.phis.clone();
        let mut merges = Vec::with_capacity(phis.len());
        for phi in &phis {
            let node = self.graph.merge(cfg.block(phi.block).line);
            self.current_mut()
                .bindings
                .insert((phi.name.clone(), phi.version), node);
            merges.push(node);
        }
        for (phi, node) in phis.iter().zip(merges) {
            let line = cfg.block(phi.block).line;
            let targets: Vec<Target> = phi
                .targets
                .iter()
                .map(|target| match target {
                    Def::Version(version) => Target::Binding(self.binding(&phi.name, *version, line)),
                    Def::Unbound => Target::Unbound,
                })
                .collect();
            self.graph.add_merge_targets(node, &targets);
        }

        let reachable = self.current().ssa.reachable.clone();
        for block in reachable {
            for item in &cfg.block(block).items {
                self.item(item.line, &item.kind);
            }
        }
    }

    fn item(&mut self, line: u32, item: &BlockItem<'_>) {
        match *item {
            BlockItem::Stmt(stmt) => self.stmt(stmt),
            BlockItem::Test(test) => {
                self.expr(test);
            }
            BlockItem::ForIter { loop_id, iter } => {
                let source = self.expr(iter);
                let element = self.iterate(source, line);
                self.current_mut().loops.insert(loop_id, element);
            }
            BlockItem::ForTarget { loop_id, target } => {
                let element = match self.current().loops.get(&loop_id).copied() {
                    Some(element) => element,
                    None => self.any(),
                };
                self.assign(target, element);
            }
            BlockItem::FunctionDef(def) => self.function(def, line),
            BlockItem::ClassDef(def) => self.class(def, line),
            BlockItem::WithEnter(item) => {
                let context = self.expr(&item.context);
                let enter = self.graph.member_read(context, "__enter__", line);
                let value = self.graph.invoke(enter, Vec::new(), line);
                if let Some(vars) = &item.vars {
                    self.assign(vars, value);
                }
            }
            BlockItem::ExceptHandler(handler) => {
                if let Some(type_) = &handler.type_ {
                    self.expr(type_);
                }
                if let Some(name) = &handler.name {
                    let value = self.any();
                    self.write_name(name.id, &name.name, value, line);
                }
            }
            BlockItem::Return { value } => {
                let node = match value {
                    Some(value) => self.expr(value),
                    None => self.graph.constant(Ty::NONE),
                };
                if let ScopeKind::Function(function) = self.current().kind {
                    let returns = self.graph.function(function).returns;
                    self.graph.add_input(returns, node);
                }
            }
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Assign { targets, value } => self.assign_stmt(targets, value),
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value, line),
            StmtKind::AnnAssign { target, value } => {
                if let Some(value) = value {
                    let node = self.expr(value);
                    self.assign(target, node);
                }
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    match &target.kind {
                        ExprKind::Name { .. } => {}
                        ExprKind::Attribute { value, .. } => {
                            self.expr(value);
                        }
                        _ => {
                            self.expr(target);
                        }
                    }
                }
            }
            StmtKind::Raise { exc, cause } => {
                for expr in exc.iter().chain(cause) {
                    self.expr(expr);
                }
            }
            StmtKind::Assert { test, msg } => {
                self.expr(test);
                if let Some(msg) = msg {
                    self.expr(msg);
                }
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    let full = self.module_node(&alias.path, line, true);
                    let value = if alias.aliased {
                        full
                    } else {
                        let top = alias.path.split('.').next().unwrap_or(alias.path.as_str());
                        self.module_node(top, line, false)
                    };
                    self.write_name(alias.binder.id, &alias.binder.name, value, line);
                }
            }
            StmtKind::ImportFrom { module, names, level } => {
                self.import_from(module.as_deref(), names, *level, line);
            }
            StmtKind::Expr(expr) => {
                self.expr(expr);
            }
            StmtKind::Global(_) | StmtKind::Nonlocal(_) | StmtKind::Pass => {}
            // compound statements reach the driver as CFG items
            _ => {}
        }
    }

    fn module_node(&mut self, module: &str, line: u32, report: bool) -> NodeId {
        match self.imports.get(module).copied() {
            Some(ImportTarget::Module(id)) => self.graph.constant(Ty::Module(id)),
            Some(ImportTarget::Cyclic) => self.any(),
            Some(ImportTarget::Missing) | None => {
                if report {
                    self.unresolved_import(module, line);
                }
                self.any()
            }
        }
    }

    fn unresolved_import(&mut self, module: &str, line: u32) {
        self.diagnostics.push(Diagnostic::new(
            self.name.clone(),
            line,
            DiagnosticKind::UnresolvedImport {
                module: module.to_string(),
            },
        ));
    }

    fn import_from(&mut self, module: Option<&str>, names: &[ImportAlias], level: u32, line: u32) {
        let absolute = resolve_import(&self.name, self.is_package, module, level);
        let target = absolute.as_ref().and_then(|name| self.imports.get(name).copied());
        match (&absolute, target) {
            (Some(_), Some(ImportTarget::Module(_) | ImportTarget::Cyclic)) => {}
            (Some(name), _) => self.unresolved_import(name, line),
            (None, _) => {
                let written = format!("{}{}", ".".repeat(level as usize), module.unwrap_or_default());
                self.unresolved_import(&written, line);
            }
        }
        for alias in names {
            if alias.binder.name == "*" {
                if let Some(ImportTarget::Module(id)) = target {
                    self.star_imports.push(id);
                }
                continue;
            }
            let value = match target {
                Some(ImportTarget::Module(id)) => {
                    let module = self.graph.constant(Ty::Module(id));
                    let read = self.graph.member_read(module, &alias.path, line);
                    self.checks.push(read);
                    read
                }
                _ => self.any(),
            };
            self.write_name(alias.binder.id, &alias.binder.name, value, line);
        }
    }

    fn assign_stmt(&mut self, targets: &[Expr], value: &Expr) {
        // `a, b = x, y` pairs up elements instead of going through a tuple
        if let [target] = targets {
            if let (ExprKind::Tuple(names) | ExprKind::List(names), ExprKind::Tuple(values) | ExprKind::List(values)) =
                (&target.kind, &value.kind)
            {
                let starred = |e: &Expr| matches!(e.kind, ExprKind::Starred(_));
                if names.len() == values.len() && !names.iter().chain(values).any(starred) {
                    for (name, value) in names.iter().zip(values) {
                        let node = self.expr(value);
                        self.assign(name, node);
                    }
                    return;
                }
            }
        }
        let node = self.expr(value);
        for target in targets {
            self.assign(target, node);
        }
    }

    fn assign(&mut self, target: &Expr, value: NodeId) {
        let line = target.line;
        match &target.kind {
            ExprKind::Name { id, name } => self.write_name(*id, name, value, line),
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                let element = self.iterate(value, line);
                for item in items {
                    match &item.kind {
                        ExprKind::Starred(inner) => {
                            let rest = self.graph.constant(Ty::Base(Kind::List));
                            self.assign(inner, rest);
                        }
                        _ => self.assign(item, element),
                    }
                }
            }
            ExprKind::Starred(inner) => {
                let rest = self.graph.constant(Ty::Base(Kind::List));
                self.assign(inner, rest);
            }
            ExprKind::Attribute { value: object, attr } => {
                let object = self.expr(object);
                self.graph.member_write(object, attr, value, line);
            }
            ExprKind::Subscript { value: object, index } => {
                let object = self.expr(object);
                self.expr(index);
                self.restrict(object, indexable_kinds());
            }
            _ => {
                self.expr(target);
            }
        }
    }

    fn aug_assign(&mut self, target: &Expr, op: BinOp, value: &Expr, line: u32) {
        match &target.kind {
            ExprKind::Name { id, name } => {
                let current = self.read_name(*id, name, line);
                let operand = self.expr(value);
                let result = self.binary(op, current, operand, line);
                self.write_name(*id, name, result, line);
            }
            ExprKind::Attribute { value: object, attr } => {
                let object = self.expr(object);
                let current = self.member_read(object, attr, line);
                let operand = self.expr(value);
                let result = self.binary(op, current, operand, line);
                self.graph.member_write(object, attr, result, line);
            }
            _ => {
                let current = self.expr(target);
                let operand = self.expr(value);
                self.binary(op, current, operand, line);
            }
        }
    }

    // ----- definitions -----------------------------------------------------------

    fn parameters(&mut self, params: &Parameters, line: u32) -> Vec<ParamInfo> {
        let groups = params
            .positional
            .iter()
            .map(|p| (p, ParamKind::Positional))
            .chain(params.vararg.iter().map(|p| (p, ParamKind::VarArgs)))
            .chain(params.kwonly.iter().map(|p| (p, ParamKind::KeywordOnly)))
            .chain(params.kwarg.iter().map(|p| (p, ParamKind::VarKeywords)));
        let mut infos = Vec::new();
        for (param, kind) in groups {
            let node = self.graph.plain(line);
            if let Some(default) = &param.default {
                let value = self.expr(default);
                self.graph.add_input(node, value);
            }
            infos.push(ParamInfo {
                name: param.name.clone(),
                node,
                kind,
                has_default: param.default.is_some(),
            });
        }
        infos
    }

    /// Seed receiver and splat parameters; returns the ones left to solve
    fn seed_parameters(&mut self, params: &[ParamInfo], receiver: Option<Ty>) -> Vec<NodeId> {
        let mut unresolved = Vec::new();
        for (index, param) in params.iter().enumerate() {
            let seed = match (param.kind, receiver) {
                (ParamKind::VarArgs, _) => Some(Ty::Base(Kind::Tuple)),
                (ParamKind::VarKeywords, _) => Some(Ty::Base(Kind::Dict)),
                (ParamKind::Positional, Some(receiver)) if index == 0 => Some(receiver),
                _ => None,
            };
            match seed {
                Some(ty) => self.graph.seed(param.node, &TypeSet::single(ty)),
                None => unresolved.push(param.node),
            }
        }
        unresolved
    }

    fn function(&mut self, def: &FunctionDef, line: u32) {
        let mut method_kind = MethodKind::Plain;
        let mut opaque = false;
        let mut accessor = false;
        for decorator in &def.decorators {
            self.expr(decorator);
            match &decorator.kind {
                ExprKind::Name { name, .. } if name == "staticmethod" => method_kind = MethodKind::Static,
                ExprKind::Name { name, .. } if name == "classmethod" => method_kind = MethodKind::Class,
                ExprKind::Name { name, .. } if name == "property" => method_kind = MethodKind::Property,
                ExprKind::Attribute { attr, .. } if matches!(attr.as_str(), "setter" | "getter" | "deleter") => {
                    accessor = true;
                }
                _ => opaque = true,
            }
        }

        let class = match self.current().kind {
            ScopeKind::Class(class) => Some(class),
            _ => None,
        };
        let params = self.parameters(&def.params, line);
        let returns = self.graph.plain(line);
        let qualified = self.qualify(&def.name.name);
        let function = self.graph.add_function(FunctionInfo {
            name: qualified,
            params: params.clone(),
            returns,
            method_kind,
            line,
        });
        self.functions.push(function);

        if !accessor {
            let value = if opaque {
                self.any()
            } else {
                self.graph.constant(Ty::Function(function))
            };
            self.write_name(def.name.id, &def.name.name, value, line);
        }
        if let Some(class) = class {
            if def.name.name == "__init__" && self.config.check_constructor_returns {
                self.constructors.push(ConstructorReturn { class, returns, line });
            }
        }

        let receiver = class.and_then(|class| match method_kind {
            MethodKind::Plain | MethodKind::Property => Some(Ty::Instance(class)),
            MethodKind::Class => Some(Ty::Class(class)),
            MethodKind::Static => None,
        });
        trace!(function = %self.graph.function(function).name, params = params.len(), "walking function body");

        let cfg = Cfg::function(&def.body);
        self.report_cfg_errors(&cfg.errors);
        let names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        let ssa = Ssa::build(&cfg, &names);
        let has_yield = ssa.has_yield;
        self.scopes.push(Scope::new(ScopeKind::Function(function), ssa));
        self.path.push(def.name.name.clone());
        let depth = self.depth();
        for param in &params {
            self.scopes[depth]
                .bindings
                .insert((param.name.clone(), INITIAL_VERSION), param.node);
            let summary = self.summary(depth, &param.name);
            self.graph.add_input(summary, param.node);
        }
        let unresolved = self.seed_parameters(&params, receiver);
        self.push_solver(unresolved);

        self.walk(&cfg);
        if has_yield {
            self.graph.seed(returns, &TypeSet::any());
        } else if cfg.falls_through {
            let none = self.graph.constant(Ty::NONE);
            self.graph.add_input(returns, none);
        }

        self.pop_solver();
        self.path.pop();
        self.scopes.pop();
    }

    fn class(&mut self, def: &ClassDef, line: u32) {
        for decorator in &def.decorators {
            self.expr(decorator);
        }
        let bases: Vec<NodeId> = def.bases.iter().map(|base| self.expr(base)).collect();
        for keyword in &def.keywords {
            self.expr(&keyword.value);
        }

        let qualified = self.qualify(&def.name.name);
        let class = self.graph.add_class(&qualified, line);
        let class_node = self.graph.class(class).node;
        self.write_name(def.name.id, &def.name.name, class_node, line);

        let cfg = Cfg::class(&def.body);
        self.report_cfg_errors(&cfg.errors);
        let ssa = Ssa::build(&cfg, &[]);
        let locals: Vec<String> = ssa.locals.iter().cloned().collect();
        self.scopes.push(Scope::new(ScopeKind::Class(class), ssa));
        self.path.push(def.name.name.clone());
        let depth = self.depth();
        for local in &locals {
            self.summary(depth, local);
        }
        self.graph.set_bases(class, bases);
        self.checks.push(class_node);

        self.walk(&cfg);

        self.path.pop();
        self.scopes.pop();
    }

    // ----- expressions ---------------------------------------------------------

    fn binary(&mut self, op: BinOp, left: NodeId, right: NodeId, line: u32) -> NodeId {
        self.constrain_binop(op, left, right);
        let node = self.graph.binop(op, left, right, line);
        self.checks.push(node);
        node
    }

    fn member_read(&mut self, object: NodeId, attr: &str, line: u32) -> NodeId {
        self.restrict(object, builtins::kinds_with_method(attr));
        let node = self.graph.member_read(object, attr, line);
        self.checks.push(node);
        node
    }

    fn iterate(&mut self, source: NodeId, line: u32) -> NodeId {
        self.restrict(source, iterable_kinds());
        let node = self.graph.iterate(source, line);
        self.checks.push(node);
        node
    }

    fn literal(&mut self, constant: Constant) -> NodeId {
        let ty = match constant {
            Constant::None => Ty::NONE,
            Constant::Bool => Ty::BOOL,
            Constant::Int => Ty::INT,
            Constant::Float => Ty::FLOAT,
            Constant::Str => Ty::STR,
            Constant::Bytes => Ty::Base(Kind::Bytes),
            Constant::Tuple => Ty::Base(Kind::Tuple),
            Constant::Complex | Constant::Ellipsis => Ty::Any,
        };
        self.graph.constant(ty)
    }

    fn container(&mut self, items: &[Expr], kind: Kind) -> NodeId {
        for item in items {
            self.expr(item);
        }
        self.graph.constant(Ty::Base(kind))
    }

    fn expr(&mut self, expr: &Expr) -> NodeId {
        let line = expr.line;
        match &expr.kind {
            ExprKind::Name { id, name } => self.read_name(*id, name, line),
            ExprKind::Constant(constant) => self.literal(*constant),
            ExprKind::BinOp { left, op, right } => {
                let left = self.expr(left);
                let right = self.expr(right);
                self.binary(*op, left, right, line)
            }
            ExprKind::UnaryOp { op, operand } => {
                let operand = self.expr(operand);
                match op {
                    UnaryOp::USub | UnaryOp::UAdd => self.restrict(operand, numeric_kinds()),
                    UnaryOp::Invert => self.restrict(operand, invertible_kinds()),
                    UnaryOp::Not => {}
                }
                let node = self.graph.unary(*op, operand, line);
                self.checks.push(node);
                node
            }
            ExprKind::BoolOp { values, .. } => {
                let nodes: Vec<NodeId> = values.iter().map(|v| self.expr(v)).collect();
                self.graph.union(nodes, line)
            }
            ExprKind::Compare { left, ops, comparators } => {
                let mut previous = self.expr(left);
                let mut links = Vec::with_capacity(ops.len());
                for (op, comparator) in ops.iter().zip(comparators) {
                    let right = self.expr(comparator);
                    links.push(self.binary(*op, previous, right, line));
                    previous = right;
                }
                match links.as_slice() {
                    [single] => *single,
                    _ => self.graph.union(links, line),
                }
            }
            ExprKind::Call { func, args, keywords } => {
                let callee = self.expr(func);
                self.restrict(callee, KindSet::EMPTY);
                let mut call_args = Vec::with_capacity(args.len() + keywords.len());
                for arg in args {
                    let (value, kind) = match &arg.kind {
                        ExprKind::Starred(inner) => (self.expr(inner), ArgKind::Star),
                        _ => (self.expr(arg), ArgKind::Positional),
                    };
                    call_args.push(CallArg { value, kind });
                }
                for keyword in keywords {
                    let value = self.expr(&keyword.value);
                    let kind = match &keyword.arg {
                        Some(name) => ArgKind::Keyword(name.clone()),
                        None => ArgKind::DoubleStar,
                    };
                    call_args.push(CallArg { value, kind });
                }
                self.constrain_arguments(callee, &call_args);
                let node = self.graph.invoke(callee, call_args, line);
                self.checks.push(node);
                node
            }
            ExprKind::Attribute { value, attr } => {
                let object = self.expr(value);
                self.member_read(object, attr, line)
            }
            ExprKind::Subscript { value, index } => {
                let value = self.expr(value);
                let index = self.expr(index);
                self.restrict(value, indexable_kinds());
                let node = self.graph.subscript(value, index, line);
                self.checks.push(node);
                node
            }
            ExprKind::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.expr(part);
                }
                self.graph.constant(Ty::Slice)
            }
            ExprKind::List(items) => self.container(items, Kind::List),
            ExprKind::Tuple(items) => self.container(items, Kind::Tuple),
            ExprKind::Set(items) => self.container(items, Kind::Set),
            ExprKind::Dict { keys, values } => {
                for key in keys.iter().flatten() {
                    self.expr(key);
                }
                self.container(values, Kind::Dict)
            }
            ExprKind::FString(parts) => self.container(parts, Kind::Str),
            ExprKind::Comprehension {
                kind,
                elt,
                value,
                generators,
            } => self.comprehension(*kind, elt, value.as_deref(), generators),
            ExprKind::Lambda { params, body } => self.lambda(params, body, line),
            ExprKind::IfExp { test, body, orelse } => {
                self.expr(test);
                let body = self.expr(body);
                let orelse = self.expr(orelse);
                self.graph.union(vec![body, orelse], line)
            }
            ExprKind::NamedExpr { target, value } => {
                let value = self.expr(value);
                if let ExprKind::Name { id, name } = &target.kind {
                    self.write_name(*id, name, value, line);
                }
                value
            }
            ExprKind::Starred(inner) => self.expr(inner),
            ExprKind::Yield(value) => {
                if let Some(value) = value {
                    self.expr(value);
                }
                self.any()
            }
            ExprKind::YieldFrom(value) | ExprKind::Await(value) => {
                self.expr(value);
                self.any()
            }
        }
    }

    fn comprehension(
        &mut self,
        kind: ComprehensionKind,
        elt: &Expr,
        value: Option<&Expr>,
        generators: &[Comprehension],
    ) -> NodeId {
        for (index, generator) in generators.iter().enumerate() {
            // the first iterable is evaluated outside the comprehension
            let source = self.expr(&generator.iter);
            if index == 0 {
                self.current_mut().frames.push(HashMap::new());
            }
            let element = self.iterate(source, generator.iter.line);
            self.bind_frame(&generator.target, element);
            for condition in &generator.ifs {
                self.expr(condition);
            }
        }
        self.expr(elt);
        if let Some(value) = value {
            self.expr(value);
        }
        if !generators.is_empty() {
            self.current_mut().frames.pop();
        }
        let ty = match kind {
            ComprehensionKind::List => Ty::Base(Kind::List),
            ComprehensionKind::Set => Ty::Base(Kind::Set),
            ComprehensionKind::Dict => Ty::Base(Kind::Dict),
            ComprehensionKind::Generator => Ty::Any,
        };
        self.graph.constant(ty)
    }

    fn bind_frame(&mut self, target: &Expr, value: NodeId) {
        let line = target.line;
        match &target.kind {
            ExprKind::Name { name, .. } => {
                let node = self.graph.union(vec![value], line);
                if let Some(frame) = self.current_mut().frames.last_mut() {
                    frame.insert(name.clone(), node);
                }
            }
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                let element = self.graph.iterate(value, line);
                for item in items {
                    self.bind_frame(item, element);
                }
            }
            ExprKind::Starred(inner) => {
                let rest = self.graph.constant(Ty::Base(Kind::List));
                self.bind_frame(inner, rest);
            }
            _ => {
                self.assign(target, value);
            }
        }
    }

    fn lambda(&mut self, params: &Parameters, body: &Expr, line: u32) -> NodeId {
        let infos = self.parameters(params, line);
        let returns = self.graph.plain(line);
        let qualified = self.qualify("<lambda>");
        let function = self.graph.add_function(FunctionInfo {
            name: qualified,
            params: infos.clone(),
            returns,
            method_kind: MethodKind::Plain,
            line,
        });
        let frame = infos.iter().map(|p| (p.name.clone(), p.node)).collect();
        let unresolved = self.seed_parameters(&infos, None);
        self.current_mut().frames.push(frame);
        self.push_solver(unresolved);
        let value = self.expr(body);
        self.pop_solver();
        self.current_mut().frames.pop();
        self.graph.add_input(returns, value);
        self.graph.constant(Ty::Function(function))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(source: &str, name: &str) -> String {
        let report = infer_python(source).unwrap();
        report
            .binding(name)
            .unwrap_or_else(|| panic!("no binding {name}"))
            .to_string()
    }

    #[test]
    fn test_literal_arithmetic() {
        assert_eq!(binding("x = 1 + 2.5\n", "x"), "{float}");
        assert_eq!(binding("x = 'a' * 3\n", "x"), "{str}");
    }

    #[test]
    fn test_branches_union() {
        let source = "import random\nif random.random():\n    x = 1\nelse:\n    x = 'a'\ny = x\n";
        assert_eq!(binding(source, "y"), "{int, str}");
    }

    #[test]
    fn test_tuple_unpacking_pairs_elements() {
        let source = "a, b = 1, 'x'\n";
        assert_eq!(binding(source, "a"), "{int}");
        assert_eq!(binding(source, "b"), "{str}");
    }

    #[test]
    fn test_function_returns() {
        let report = infer_python("def f():\n    return 1\nx = f()\n").unwrap();
        assert_eq!(report.binding("x").unwrap().to_string(), "{int}");
        let f = report.function("f").unwrap();
        assert_eq!(f.returns.to_string(), "{int}");
    }

    #[test]
    fn test_function_without_return_is_none() {
        assert_eq!(binding("def f():\n    pass\nx = f()\n", "x"), "{None}");
    }

    #[test]
    fn test_method_call_through_instance() {
        let source = "class A:\n    def __init__(self):\n        self.v = 1\n    def get(self):\n        return self.v\nx = A().get()\n";
        assert_eq!(binding(source, "x"), "{int}");
    }

    #[test]
    fn test_lambda_and_comprehension() {
        let source = "f = lambda a: a * 2.0\nxs = [c for c in 'abc']\n";
        let report = infer_python(source).unwrap();
        assert_eq!(report.binding("xs").unwrap().to_string(), "{list}");
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    }

    #[test]
    fn test_unknown_decorator_makes_binding_any() {
        let source = "def deco(f):\n    return f\n@deco\ndef g():\n    return 1\n";
        assert_eq!(binding(source, "g"), "{Any}");
    }

    #[test]
    fn test_unresolved_import_is_reported() {
        let report = infer_python("import does_not_exist\n").unwrap();
        assert!(report
            .diagnostics
            .iter()
            .any(|d| matches!(d.kind, DiagnosticKind::UnresolvedImport { .. })));
        assert_eq!(report.binding("does_not_exist").unwrap().to_string(), "{Any}");
    }

    #[test]
    fn test_construction_errors_are_diagnostics() {
        let report = infer_python("break\n").unwrap();
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].line, 1);

        let config = InferConfig {
            report_construction_errors: false,
            ..InferConfig::default()
        };
        assert!(infer_python_with("break\n", config).unwrap().diagnostics.is_empty());
    }

    #[test]
    fn test_parameters_as_any_when_disabled() {
        let config = InferConfig {
            infer_parameters: false,
            ..InferConfig::default()
        };
        let report = infer_python_with("def f(a):\n    return a + 1\n", config).unwrap();
        let f = report.function("f").unwrap();
        assert_eq!(f.params[0].types.to_string(), "{Any}");
    }
}

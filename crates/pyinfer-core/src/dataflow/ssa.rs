//! Static single assignment form over a [`Cfg`]
//!
//! Every write of a local name gets a fresh version and every read resolves
//! to exactly one [`Def`]: a version written in the same block, a merge
//! ([`Phi`]) at the block entry, the initial version of a parameter, or the
//! possibly-unbound sentinel.
//!
//! Merges are placed at the entry of every reachable block for each local
//! whose value matters in that block or any block after it, then trivial
//! merges (all targets equal, ignoring self references) are folded away.

use super::cfg::{BlockId, BlockItem, Cfg};
use crate::ast::{Comprehension, Expr, ExprKind, NameId, Stmt, StmtKind};
use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};

/// Version of a parameter on function entry
pub const INITIAL_VERSION: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Def {
    Version(u32),
    /// The name may not have been assigned on this path
    Unbound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phi {
    pub name: String,
    pub version: u32,
    pub block: BlockId,
    pub targets: Vec<Def>,
}

#[derive(Debug, Default)]
pub struct Ssa {
    /// Definition seen by each name read
    pub reads: HashMap<NameId, Def>,
    /// Version created by each name write
    pub writes: HashMap<NameId, u32>,
    /// Non-trivial merges, targets already simplified
    pub phis: Vec<Phi>,
    /// Names local to the scope, in first-write order
    pub locals: IndexSet<String>,
    pub globals: HashSet<String>,
    pub nonlocals: HashSet<String>,
    pub reachable: Vec<BlockId>,
    /// The body contains `yield`
    pub has_yield: bool,
}

impl Ssa {
    pub fn build(cfg: &Cfg<'_>, params: &[String]) -> Self {
        let mut ssa = Ssa::default();
        let events: Vec<Vec<Event<'_>>> = cfg
            .blocks
            .iter()
            .map(|block| {
                let mut walker = EventWalker::default();
                for item in &block.items {
                    walker.item(&item.kind);
                }
                ssa.has_yield |= walker.has_yield;
                ssa.globals.extend(walker.globals);
                ssa.nonlocals.extend(walker.nonlocals);
                walker.events
            })
            .collect();

        for param in params {
            ssa.locals.insert(param.clone());
        }
        for event in events.iter().flatten() {
            if let Event::Write(_, name) = event {
                ssa.locals.insert((*name).to_string());
            }
        }
        ssa.locals
            .retain(|name| !ssa.globals.contains(name) && !ssa.nonlocals.contains(name));

        ssa.reachable = cfg.reachable();
        let interest = interest(cfg, &events, &ssa.locals);
        let preds = cfg.predecessors();
        let reachable: HashSet<BlockId> = ssa.reachable.iter().copied().collect();

        let mut counters: HashMap<String, u32> = HashMap::new();
        let mut fresh = |name: &str| -> u32 {
            let counter = counters.entry(name.to_string()).or_insert(INITIAL_VERSION);
            *counter += 1;
            *counter
        };

        // one merge per interesting local at every reachable block entry
        let mut entry_versions: HashMap<BlockId, HashMap<&str, u32>> = HashMap::new();
        let mut phis = Vec::new();
        for block in &ssa.reachable {
            let mut versions = HashMap::new();
            for name in ssa.locals.iter().filter(|n| interest[block.0].contains(n.as_str())) {
                let version = fresh(name);
                versions.insert(name.as_str(), version);
                phis.push(Phi {
                    name: name.clone(),
                    version,
                    block: *block,
                    targets: Vec::new(),
                });
            }
            entry_versions.insert(*block, versions);
        }

        let mut read_names: HashMap<NameId, &str> = HashMap::new();
        let mut exit_versions: HashMap<BlockId, HashMap<&str, u32>> = HashMap::new();
        for block in &ssa.reachable {
            let mut current = entry_versions.get(block).cloned().unwrap_or_default();
            for event in &events[block.0] {
                match event {
                    Event::Read(id, name) => {
                        if let Some(version) = current.get(name) {
                            ssa.reads.insert(*id, Def::Version(*version));
                            read_names.insert(*id, *name);
                        }
                    }
                    Event::Write(id, name) => {
                        if let Some(local) = ssa.locals.get(*name) {
                            let version = fresh(local);
                            ssa.writes.insert(*id, version);
                            current.insert(local.as_str(), version);
                        }
                    }
                }
            }
            exit_versions.insert(*block, current);
        }

        let param_set: HashSet<&str> = params.iter().map(String::as_str).collect();
        for phi in &mut phis {
            let mut targets = Vec::new();
            if phi.block == cfg.entry {
                targets.push(if param_set.contains(phi.name.as_str()) {
                    Def::Version(INITIAL_VERSION)
                } else {
                    Def::Unbound
                });
            }
            for pred in preds[phi.block.0].iter().filter(|p| reachable.contains(*p)) {
                let def = exit_versions
                    .get(pred)
                    .and_then(|versions| versions.get(phi.name.as_str()))
                    .map_or(Def::Unbound, |v| Def::Version(*v));
                if !targets.contains(&def) {
                    targets.push(def);
                }
            }
            phi.targets = targets;
        }

        let substitution = simplify(&phis);
        for (id, def) in ssa.reads.iter_mut() {
            if let Some(name) = read_names.get(id) {
                *def = resolve(&substitution, name, *def);
            }
        }
        ssa.phis = phis
            .into_iter()
            .filter(|phi| resolve(&substitution, &phi.name, Def::Version(phi.version)) == Def::Version(phi.version))
            .map(|mut phi| {
                let own = Def::Version(phi.version);
                let mut targets = Vec::new();
                for target in phi.targets.iter().map(|t| resolve(&substitution, &phi.name, *t)) {
                    if target != own && !targets.contains(&target) {
                        targets.push(target);
                    }
                }
                phi.targets = targets;
                phi
            })
            .collect();
        ssa
    }

    /// Whether `name` is assigned in this scope
    pub fn is_local(&self, name: &str) -> bool {
        self.locals.contains(name)
    }
}

/// Replacement definition of each folded merge, per name
type Substitution = HashMap<String, HashMap<u32, Def>>;

fn resolve(substitution: &Substitution, name: &str, def: Def) -> Def {
    match def {
        Def::Version(version) => substitution
            .get(name)
            .and_then(|folded| folded.get(&version))
            .copied()
            .unwrap_or(def),
        Def::Unbound => def,
    }
}

/// Fold merges whose targets, ignoring themselves, agree on one definition
fn simplify(phis: &[Phi]) -> Substitution {
    let mut by_name: HashMap<&str, Vec<&Phi>> = HashMap::new();
    for phi in phis {
        by_name.entry(phi.name.as_str()).or_default().push(phi);
    }
    let mut substitution = Substitution::new();
    for (name, group) in by_name {
        let mut local: HashMap<u32, Def> = HashMap::new();
        let lookup = |local: &HashMap<u32, Def>, def: Def| {
            let mut current = def;
            for _ in 0..=local.len() {
                match current {
                    Def::Version(v) => match local.get(&v) {
                        Some(next) => current = *next,
                        None => break,
                    },
                    Def::Unbound => break,
                }
            }
            current
        };
        loop {
            let mut changed = false;
            for phi in &group {
                if local.contains_key(&phi.version) {
                    continue;
                }
                let own = Def::Version(phi.version);
                let mut distinct: Vec<Def> = Vec::new();
                for target in &phi.targets {
                    let target = lookup(&local, *target);
                    if target != own && !distinct.contains(&target) {
                        distinct.push(target);
                    }
                }
                match distinct.as_slice() {
                    [] => {
                        local.insert(phi.version, Def::Unbound);
                        changed = true;
                    }
                    [single] => {
                        local.insert(phi.version, *single);
                        changed = true;
                    }
                    _ => {}
                }
            }
            if !changed {
                break;
            }
        }
        let resolved = local
            .iter()
            .map(|(version, def)| (*version, lookup(&local, *def)))
            .collect();
        substitution.insert(name.to_string(), resolved);
    }
    substitution
}

/// Locals whose value matters in each block or any block reachable from it
fn interest(cfg: &Cfg<'_>, events: &[Vec<Event<'_>>], locals: &IndexSet<String>) -> Vec<HashSet<String>> {
    let mut interest: Vec<HashSet<String>> = events
        .iter()
        .map(|block| {
            block
                .iter()
                .map(Event::name)
                .filter(|name| locals.contains(*name))
                .map(str::to_string)
                .collect()
        })
        .collect();
    loop {
        let mut changed = false;
        for index in (0..cfg.blocks.len()).rev() {
            let mut gathered = Vec::new();
            for exit in &cfg.blocks[index].exits {
                if exit.0 != index {
                    gathered.extend(interest[exit.0].iter().cloned());
                }
            }
            for name in gathered {
                changed |= interest[index].insert(name);
            }
        }
        if !changed {
            break;
        }
    }
    interest
}

#[derive(Debug, Clone, Copy)]
enum Event<'a> {
    Read(NameId, &'a str),
    Write(NameId, &'a str),
}

impl<'a> Event<'a> {
    fn name(&self) -> &'a str {
        match self {
            Event::Read(_, name) | Event::Write(_, name) => name,
        }
    }
}

/// Collects name reads and writes of block items in evaluation order
#[derive(Default)]
struct EventWalker<'a> {
    events: Vec<Event<'a>>,
    /// Names bound by enclosing comprehensions
    hidden: Vec<&'a str>,
    globals: HashSet<String>,
    nonlocals: HashSet<String>,
    has_yield: bool,
}

impl<'a> EventWalker<'a> {
    fn item(&mut self, item: &BlockItem<'a>) {
        match *item {
            BlockItem::Stmt(stmt) => self.stmt(stmt),
            BlockItem::Test(expr) => self.expr(expr),
            BlockItem::ForIter { iter, .. } => self.expr(iter),
            BlockItem::ForTarget { target, .. } => self.target(target),
            BlockItem::FunctionDef(def) => {
                for decorator in &def.decorators {
                    self.expr(decorator);
                }
                for default in def.params.iter().filter_map(|p| p.default.as_ref()) {
                    self.expr(default);
                }
                self.write(def.name.id, &def.name.name);
            }
            BlockItem::ClassDef(def) => {
                for expr in def.decorators.iter().chain(&def.bases) {
                    self.expr(expr);
                }
                for keyword in &def.keywords {
                    self.expr(&keyword.value);
                }
                self.write(def.name.id, &def.name.name);
            }
            BlockItem::WithEnter(item) => {
                self.expr(&item.context);
                if let Some(vars) = &item.vars {
                    self.target(vars);
                }
            }
            BlockItem::ExceptHandler(handler) => {
                if let Some(type_) = &handler.type_ {
                    self.expr(type_);
                }
                if let Some(name) = &handler.name {
                    self.write(name.id, &name.name);
                }
            }
            BlockItem::Return { value } => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
        }
    }

    fn stmt(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Assign { targets, value } => {
                self.expr(value);
                for target in targets {
                    self.target(target);
                }
            }
            StmtKind::AugAssign { target, value, .. } => match &target.kind {
                ExprKind::Name { id, name } => {
                    self.read(*id, name);
                    self.expr(value);
                    self.write(*id, name);
                }
                _ => {
                    self.target(target);
                    self.expr(value);
                }
            },
            StmtKind::AnnAssign { target, value } => {
                if let Some(value) = value {
                    self.expr(value);
                    self.target(target);
                }
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    if !matches!(target.kind, ExprKind::Name { .. }) {
                        self.target(target);
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
            StmtKind::Import(aliases) | StmtKind::ImportFrom { names: aliases, .. } => {
                for alias in aliases.iter().filter(|a| a.binder.name != "*") {
                    self.write(alias.binder.id, &alias.binder.name);
                }
            }
            StmtKind::Global(names) => self.globals.extend(names.iter().cloned()),
            StmtKind::Nonlocal(names) => self.nonlocals.extend(names.iter().cloned()),
            StmtKind::Expr(expr) => self.expr(expr),
            // compound statements are split into items by the CFG builder
            _ => {}
        }
    }

    fn read(&mut self, id: NameId, name: &'a str) {
        if !self.hidden.contains(&name) {
            self.events.push(Event::Read(id, name));
        }
    }

    fn write(&mut self, id: NameId, name: &'a str) {
        if !self.hidden.contains(&name) {
            self.events.push(Event::Write(id, name));
        }
    }

    fn target(&mut self, target: &'a Expr) {
        match &target.kind {
            ExprKind::Name { id, name } => self.write(*id, name),
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                for item in items {
                    self.target(item);
                }
            }
            ExprKind::Starred(inner) => self.target(inner),
            ExprKind::Attribute { value, .. } => self.expr(value),
            ExprKind::Subscript { value, index } => {
                self.expr(value);
                self.expr(index);
            }
            _ => self.expr(target),
        }
    }

    fn expr(&mut self, expr: &'a Expr) {
        match &expr.kind {
            ExprKind::Name { id, name } => self.read(*id, name),
            ExprKind::Constant(_) => {}
            ExprKind::BinOp { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            ExprKind::UnaryOp { operand, .. } => self.expr(operand),
            ExprKind::BoolOp { values, .. } => self.exprs(values),
            ExprKind::Compare { left, comparators, .. } => {
                self.expr(left);
                self.exprs(comparators);
            }
            ExprKind::Call { func, args, keywords } => {
                self.expr(func);
                self.exprs(args);
                for keyword in keywords {
                    self.expr(&keyword.value);
                }
            }
            ExprKind::Attribute { value, .. } => self.expr(value),
            ExprKind::Subscript { value, index } => {
                self.expr(value);
                self.expr(index);
            }
            ExprKind::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.expr(part);
                }
            }
            ExprKind::List(items) | ExprKind::Tuple(items) | ExprKind::Set(items) | ExprKind::FString(items) => {
                self.exprs(items)
            }
            ExprKind::Dict { keys, values } => {
                for (key, value) in keys.iter().zip(values) {
                    if let Some(key) = key {
                        self.expr(key);
                    }
                    self.expr(value);
                }
            }
            ExprKind::Comprehension {
                elt, value, generators, ..
            } => self.comprehension(elt, value.as_deref(), generators),
            ExprKind::Lambda { params, .. } => {
                // the body runs later, in its own scope
                for default in params.iter().filter_map(|p| p.default.as_ref()) {
                    self.expr(default);
                }
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.expr(test);
                self.expr(body);
                self.expr(orelse);
            }
            ExprKind::NamedExpr { target, value } => {
                self.expr(value);
                if let ExprKind::Name { id, name } = &target.kind {
                    // assignment expressions bind in the enclosing scope
                    self.events.push(Event::Write(*id, name));
                }
            }
            ExprKind::Starred(inner) | ExprKind::Await(inner) => self.expr(inner),
            ExprKind::Yield(value) => {
                self.has_yield = true;
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            ExprKind::YieldFrom(value) => {
                self.has_yield = true;
                self.expr(value);
            }
        }
    }

    fn exprs(&mut self, exprs: &'a [Expr]) {
        for expr in exprs {
            self.expr(expr);
        }
    }

    fn comprehension(&mut self, elt: &'a Expr, value: Option<&'a Expr>, generators: &'a [Comprehension]) {
        let depth = self.hidden.len();
        for (index, generator) in generators.iter().enumerate() {
            // the first iterable is evaluated in the enclosing scope
            if index == 0 {
                self.expr(&generator.iter);
            }
            bound_names(&generator.target, &mut self.hidden);
            if index > 0 {
                self.expr(&generator.iter);
            }
            self.exprs(&generator.ifs);
        }
        self.expr(elt);
        if let Some(value) = value {
            self.expr(value);
        }
        self.hidden.truncate(depth);
    }
}

fn bound_names<'a>(target: &'a Expr, names: &mut Vec<&'a str>) {
    match &target.kind {
        ExprKind::Name { name, .. } => names.push(name),
        ExprKind::Tuple(items) | ExprKind::List(items) => {
            for item in items {
                bound_names(item, names);
            }
        }
        ExprKind::Starred(inner) => bound_names(inner, names),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Module;
    use crate::ast_bridge::parse_module;

    fn module(source: &str) -> Module {
        parse_module(source, "test").unwrap()
    }

    /// Name ids of every occurrence of `name`, in source order
    fn occurrences(module: &Module, name: &str) -> Vec<NameId> {
        fn visit_expr(expr: &Expr, name: &str, out: &mut Vec<NameId>) {
            match &expr.kind {
                ExprKind::Name { id, name: n } if n == name => out.push(*id),
                ExprKind::BinOp { left, right, .. } => {
                    visit_expr(left, name, out);
                    visit_expr(right, name, out);
                }
                ExprKind::Call { func, args, .. } => {
                    visit_expr(func, name, out);
                    for arg in args {
                        visit_expr(arg, name, out);
                    }
                }
                ExprKind::Compare { left, comparators, .. } => {
                    visit_expr(left, name, out);
                    for c in comparators {
                        visit_expr(c, name, out);
                    }
                }
                _ => {}
            }
        }
        fn visit(stmts: &[Stmt], name: &str, out: &mut Vec<NameId>) {
            for stmt in stmts {
                match &stmt.kind {
                    StmtKind::Assign { targets, value } => {
                        visit_expr(value, name, out);
                        for t in targets {
                            visit_expr(t, name, out);
                        }
                    }
                    StmtKind::Expr(e) => visit_expr(e, name, out),
                    StmtKind::If { test, body, orelse } | StmtKind::While { test, body, orelse } => {
                        visit_expr(test, name, out);
                        visit(body, name, out);
                        visit(orelse, name, out);
                    }
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        visit(&module.body, name, &mut out);
        out.sort();
        out
    }

    #[test]
    fn test_straight_line_versions() {
        let m = module("x = 1\ny = x\nx = y\n");
        let cfg = Cfg::module(&m.body);
        let ssa = Ssa::build(&cfg, &[]);
        let xs = occurrences(&m, "x");
        let first_write = ssa.writes[&xs[0]];
        assert_eq!(ssa.reads[&xs[1]], Def::Version(first_write));
        assert_ne!(ssa.writes[&xs[2]], first_write);
        assert!(ssa.phis.is_empty());
    }

    #[test]
    fn test_if_join_creates_phi() {
        let m = module("if c:\n    x = 1\nelse:\n    x = 'a'\nprint(x)\n");
        let cfg = Cfg::module(&m.body);
        let ssa = Ssa::build(&cfg, &[]);
        let xs = occurrences(&m, "x");
        let Def::Version(read) = ssa.reads[&xs[2]] else {
            panic!("x should be bound");
        };
        let phi = ssa.phis.iter().find(|p| p.version == read).unwrap();
        let mut targets = phi.targets.clone();
        targets.sort_by_key(|t| match t {
            Def::Version(v) => *v,
            Def::Unbound => 0,
        });
        let mut expected = vec![Def::Version(ssa.writes[&xs[0]]), Def::Version(ssa.writes[&xs[1]])];
        expected.sort_by_key(|t| match t {
            Def::Version(v) => *v,
            Def::Unbound => 0,
        });
        assert_eq!(targets, expected);
    }

    #[test]
    fn test_possibly_unbound() {
        let m = module("if c:\n    x = 1\nprint(x)\n");
        let cfg = Cfg::module(&m.body);
        let ssa = Ssa::build(&cfg, &[]);
        let xs = occurrences(&m, "x");
        let Def::Version(read) = ssa.reads[&xs[1]] else {
            panic!("expected a merge");
        };
        let phi = ssa.phis.iter().find(|p| p.version == read).unwrap();
        assert!(phi.targets.contains(&Def::Unbound));
    }

    #[test]
    fn test_loop_phi_keeps_back_edge() {
        let m = module("x = 0\nwhile c:\n    x = x + 1\nprint(x)\n");
        let cfg = Cfg::module(&m.body);
        let ssa = Ssa::build(&cfg, &[]);
        let xs = occurrences(&m, "x");
        let init = ssa.writes[&xs[0]];
        let step = ssa.writes[&xs[2]];
        let Def::Version(in_loop) = ssa.reads[&xs[1]] else {
            panic!("expected a merge");
        };
        let phi = ssa.phis.iter().find(|p| p.version == in_loop).unwrap();
        assert!(phi.targets.contains(&Def::Version(init)));
        assert!(phi.targets.contains(&Def::Version(step)));
        assert!(!phi.targets.contains(&Def::Unbound));
        assert_eq!(ssa.reads[&xs[3]], Def::Version(in_loop));
    }

    #[test]
    fn test_params_start_at_initial_version() {
        let m = module("def f(a):\n    return a\n");
        let StmtKind::FunctionDef(def) = &m.body[0].kind else {
            panic!("expected function");
        };
        let cfg = Cfg::function(&def.body);
        let ssa = Ssa::build(&cfg, &["a".to_string()]);
        assert_eq!(ssa.reads.values().copied().collect::<Vec<_>>(), vec![Def::Version(INITIAL_VERSION)]);
    }

    #[test]
    fn test_globals_and_comprehensions_are_not_local() {
        let m = module("def f():\n    global g\n    g = 1\n    return [i for i in range(3)]\n");
        let StmtKind::FunctionDef(def) = &m.body[0].kind else {
            panic!("expected function");
        };
        let cfg = Cfg::function(&def.body);
        let ssa = Ssa::build(&cfg, &[]);
        assert!(!ssa.is_local("g"));
        assert!(!ssa.is_local("i"));
        assert!(ssa.globals.contains("g"));
    }

    #[test]
    fn test_yield_detected() {
        let m = module("def f():\n    yield 1\n");
        let StmtKind::FunctionDef(def) = &m.body[0].kind else {
            panic!("expected function");
        };
        let cfg = Cfg::function(&def.body);
        assert!(Ssa::build(&cfg, &[]).has_yield);
    }
}

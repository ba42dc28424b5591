//! Constraint graph of type variables
//!
//! Every expression and binding site owns one node in an arena. A node holds
//! a growable [`TypeSet`] and the set of nodes depending on it. Creating a
//! node, adding an input or seeding a set schedules work on an internal
//! worklist which is drained before the public call returns, so every
//! transitive effect is visible to the caller.
//!
//! Termination follows from monotonic growth over a finite universe: a node
//! only notifies its dependents when its set grew (or, for classes, when the
//! member table grew).

use super::builtins::{self, Returns};
use super::issues::DiagnosticKind;
use super::lattice::{
    binop_result, binop_with_unknown_left, binop_with_unknown_right, contains, element_of, needs_integer_index,
    subscript_of, unary_result, ClassId, FuncId, Kind, ModuleId, Ty, TypeSet,
};
use crate::ast::{BinOp, UnaryOp};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, trace};

/// Stable handle of a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One incoming value of a merge node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Binding(NodeId),
    /// The variable may be unbound along this path
    Unbound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgKind {
    Positional,
    Keyword(String),
    /// `*args` splat
    Star,
    /// `**kwargs` splat
    DoubleStar,
}

#[derive(Debug, Clone)]
pub struct CallArg {
    pub value: NodeId,
    pub kind: ArgKind,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Union of its inputs plus whatever was seeded
    Plain { inputs: Vec<NodeId> },
    Merge { targets: Vec<Target> },
    BinOp { op: BinOp, left: NodeId, right: NodeId },
    Unary { op: UnaryOp, operand: NodeId },
    MemberRead { object: NodeId, attr: String },
    MemberWrite { object: NodeId, attr: String, value: NodeId },
    Invoke { callee: NodeId, args: Vec<CallArg> },
    Iterate { source: NodeId },
    Subscript { value: NodeId, index: NodeId },
    ClassMerge { class: ClassId },
}

impl NodeKind {
    fn static_inputs(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Plain { inputs } => inputs.clone(),
            NodeKind::Merge { targets } => targets
                .iter()
                .filter_map(|t| match t {
                    Target::Binding(id) => Some(*id),
                    Target::Unbound => None,
                })
                .collect(),
            NodeKind::BinOp { left, right, .. } => vec![*left, *right],
            NodeKind::Unary { operand, .. } => vec![*operand],
            NodeKind::MemberRead { object, .. } => vec![*object],
            NodeKind::MemberWrite { object, .. } => vec![*object],
            NodeKind::Invoke { callee, args } => {
                std::iter::once(*callee).chain(args.iter().map(|a| a.value)).collect()
            }
            NodeKind::Iterate { source } => vec![*source],
            NodeKind::Subscript { value, index } => vec![*value, *index],
            NodeKind::ClassMerge { .. } => Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    types: TypeSet,
    dependents: IndexSet<NodeId>,
    line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Plain,
    Static,
    Class,
    Property,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Positional,
    VarArgs,
    KeywordOnly,
    VarKeywords,
}

#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: String,
    pub node: NodeId,
    pub kind: ParamKind,
    pub has_default: bool,
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    /// Qualified name (`Outer.method`, `f.<lambda>`)
    pub name: String,
    pub params: Vec<ParamInfo>,
    pub returns: NodeId,
    pub method_kind: MethodKind,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Own,
    /// Taken from the base at this position
    Inherited(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub node: NodeId,
    pub origin: Origin,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    /// The class-merge node; its set is `{Class(id)}`
    pub node: NodeId,
    pub bases: Vec<NodeId>,
    pub members: IndexMap<String, Member>,
    /// Some base is unknown or builtin, so missing members are not errors
    pub any_based: bool,
    linked: HashSet<(NodeId, NodeId)>,
}

#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub exports: IndexMap<String, NodeId>,
    pub submodules: IndexMap<String, ModuleId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationStats {
    pub recomputations: u64,
    pub growths: u64,
}

#[derive(Default)]
struct Outcome {
    types: TypeSet,
    subscribe: Vec<NodeId>,
    notify: bool,
}

impl Outcome {
    fn add(&mut self, ty: Ty) {
        self.types.insert(ty);
    }

    fn watch(&mut self, id: NodeId) {
        self.subscribe.push(id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallResult {
    Ok,
    Mismatch,
    NotCallable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    /// An input is still empty
    Pending,
    Ok,
    Failed,
}

impl Verdict {
    fn from_found(found: bool) -> Self {
        if found {
            Verdict::Ok
        } else {
            Verdict::Failed
        }
    }
}

pub struct Graph {
    nodes: Vec<Node>,
    classes: Vec<ClassInfo>,
    functions: Vec<FunctionInfo>,
    modules: Vec<ModuleInfo>,
    constants: HashMap<Ty, NodeId>,
    worklist: VecDeque<NodeId>,
    queued: HashSet<NodeId>,
    unbound_as_none: bool,
    stats: PropagationStats,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Graph {
    pub fn new(unbound_as_none: bool) -> Self {
        Self {
            nodes: Vec::new(),
            classes: Vec::new(),
            functions: Vec::new(),
            modules: Vec::new(),
            constants: HashMap::new(),
            worklist: VecDeque::new(),
            queued: HashSet::new(),
            unbound_as_none,
            stats: PropagationStats::default(),
        }
    }

    // ----- node construction -------------------------------------------

    fn push_node(&mut self, kind: NodeKind, line: u32) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let inputs = kind.static_inputs();
        self.nodes.push(Node {
            kind,
            types: TypeSet::new(),
            dependents: IndexSet::new(),
            line,
        });
        for input in inputs {
            self.subscribe(id, input);
        }
        self.schedule(id);
        id
    }

    fn add_node(&mut self, kind: NodeKind, line: u32) -> NodeId {
        let id = self.push_node(kind, line);
        self.propagate();
        id
    }

    /// A node with no inputs, filled by [`Graph::add_input`] or [`Graph::seed`]
    pub fn plain(&mut self, line: u32) -> NodeId {
        self.add_node(NodeKind::Plain { inputs: Vec::new() }, line)
    }

    pub fn union(&mut self, inputs: Vec<NodeId>, line: u32) -> NodeId {
        self.add_node(NodeKind::Plain { inputs }, line)
    }

    /// Shared node holding exactly one type; never receives inputs
    pub fn constant(&mut self, ty: Ty) -> NodeId {
        if let Some(id) = self.constants.get(&ty) {
            return *id;
        }
        let id = self.push_node(NodeKind::Plain { inputs: Vec::new() }, 0);
        self.nodes[id.index()].types.insert(ty);
        self.constants.insert(ty, id);
        id
    }

    pub fn merge(&mut self, line: u32) -> NodeId {
        self.add_node(NodeKind::Merge { targets: Vec::new() }, line)
    }

    /// Add targets to a merge node; targets never shrink
    pub fn add_merge_targets(&mut self, merge: NodeId, targets: &[Target]) {
        for target in targets {
            let NodeKind::Merge { targets: existing } = &mut self.nodes[merge.index()].kind else {
                return;
            };
            if existing.contains(target) {
                continue;
            }
            existing.push(*target);
            if let Target::Binding(input) = target {
                self.subscribe(merge, *input);
            }
        }
        self.schedule(merge);
        self.propagate();
    }

    pub fn binop(&mut self, op: BinOp, left: NodeId, right: NodeId, line: u32) -> NodeId {
        self.add_node(NodeKind::BinOp { op, left, right }, line)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeId, line: u32) -> NodeId {
        self.add_node(NodeKind::Unary { op, operand }, line)
    }

    pub fn member_read(&mut self, object: NodeId, attr: &str, line: u32) -> NodeId {
        let attr = attr.to_string();
        self.add_node(NodeKind::MemberRead { object, attr }, line)
    }

    pub fn member_write(&mut self, object: NodeId, attr: &str, value: NodeId, line: u32) -> NodeId {
        let attr = attr.to_string();
        self.add_node(NodeKind::MemberWrite { object, attr, value }, line)
    }

    pub fn invoke(&mut self, callee: NodeId, args: Vec<CallArg>, line: u32) -> NodeId {
        self.add_node(NodeKind::Invoke { callee, args }, line)
    }

    pub fn iterate(&mut self, source: NodeId, line: u32) -> NodeId {
        self.add_node(NodeKind::Iterate { source }, line)
    }

    pub fn subscript(&mut self, value: NodeId, index: NodeId, line: u32) -> NodeId {
        self.add_node(NodeKind::Subscript { value, index }, line)
    }

    /// Make `input` flow into the plain node `node`
    pub fn add_input(&mut self, node: NodeId, input: NodeId) {
        self.connect(node, input);
        self.propagate();
    }

    /// Add types directly to a node
    pub fn seed(&mut self, node: NodeId, types: &TypeSet) {
        if self.nodes[node.index()].types.extend_from(types) {
            self.touch(node);
        }
        self.propagate();
    }

    fn connect(&mut self, node: NodeId, input: NodeId) {
        let NodeKind::Plain { inputs } = &mut self.nodes[node.index()].kind else {
            return;
        };
        if node == input || inputs.contains(&input) {
            return;
        }
        inputs.push(input);
        self.subscribe(node, input);
        self.schedule(node);
    }

    // ----- classes, functions, modules ----------------------------------

    pub fn add_class(&mut self, name: &str, line: u32) -> ClassId {
        let class = ClassId(self.classes.len() as u32);
        let node = self.push_node(NodeKind::ClassMerge { class }, line);
        self.nodes[node.index()].types.insert(Ty::Class(class));
        self.classes.push(ClassInfo {
            name: name.to_string(),
            node,
            bases: Vec::new(),
            members: IndexMap::new(),
            any_based: false,
            linked: HashSet::new(),
        });
        self.propagate();
        class
    }

    pub fn set_bases(&mut self, class: ClassId, bases: Vec<NodeId>) {
        let node = self.classes[class.0 as usize].node;
        for base in &bases {
            self.subscribe(node, *base);
        }
        self.classes[class.0 as usize].bases = bases;
        self.schedule(node);
        self.propagate();
    }

    /// Declare a member defined in the class body
    pub fn add_own_member(&mut self, class: ClassId, name: &str, node: NodeId) {
        let info = &mut self.classes[class.0 as usize];
        let previous = info.members.insert(
            name.to_string(),
            Member {
                node,
                origin: Origin::Own,
            },
        );
        if let Some(previous) = previous {
            if previous.node != node && name != "__init__" {
                self.link(class, node, previous.node);
            }
        }
        self.touch(self.classes[class.0 as usize].node);
        self.propagate();
    }

    pub fn class(&self, class: ClassId) -> &ClassInfo {
        &self.classes[class.0 as usize]
    }

    pub fn add_function(&mut self, info: FunctionInfo) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(info);
        id
    }

    pub fn function(&self, id: FuncId) -> &FunctionInfo {
        &self.functions[id.0 as usize]
    }

    pub fn add_module(&mut self, name: &str) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(ModuleInfo {
            name: name.to_string(),
            exports: IndexMap::new(),
            submodules: IndexMap::new(),
        });
        id
    }

    pub fn set_export(&mut self, module: ModuleId, name: &str, node: NodeId) {
        self.modules[module.0 as usize].exports.insert(name.to_string(), node);
    }

    pub fn add_submodule(&mut self, parent: ModuleId, name: &str, child: ModuleId) {
        self.modules[parent.0 as usize]
            .submodules
            .entry(name.to_string())
            .or_insert(child);
    }

    pub fn module(&self, id: ModuleId) -> &ModuleInfo {
        &self.modules[id.0 as usize]
    }

    // ----- queries -------------------------------------------------------

    /// Raw candidate set; empty while nothing is known
    pub fn types(&self, id: NodeId) -> &TypeSet {
        &self.nodes[id.index()].types
    }

    /// Candidate set as reported: empty sets read as `Any`
    pub fn presented(&self, id: NodeId) -> TypeSet {
        self.types(id).presented()
    }

    pub fn line(&self, id: NodeId) -> u32 {
        self.nodes[id.index()].line
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of dependency edges between nodes
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|node| node.dependents.len()).sum()
    }

    pub fn stats(&self) -> PropagationStats {
        self.stats
    }

    /// Recompute every node once more; returns how many sets grew
    pub fn repropagate_all(&mut self) -> u64 {
        let before = self.stats.growths;
        for index in 0..self.nodes.len() {
            self.schedule(NodeId(index as u32));
        }
        self.propagate();
        let grown = self.stats.growths - before;
        debug!(grown, nodes = self.nodes.len(), "re-propagated constraint graph");
        grown
    }

    /// Human-readable name of a type
    pub fn describe(&self, ty: &Ty) -> String {
        match ty {
            Ty::Class(c) => format!("type[{}]", self.class(*c).name),
            Ty::Instance(c) => self.class(*c).name.clone(),
            Ty::Function(f) => format!("def {}", self.function(*f).name),
            Ty::Method(f) => format!("method {}", self.function(*f).name),
            Ty::Module(m) => format!("module {}", self.module(*m).name),
            other => other.to_string(),
        }
    }

    /// Sorted type names of a node, empty sets reading as `Any`
    pub fn type_names(&self, id: NodeId) -> Vec<String> {
        let mut names: Vec<String> = self.presented(id).iter().map(|t| self.describe(t)).collect();
        names.sort();
        names
    }

    pub fn render(&self, id: NodeId) -> String {
        format!("{{{}}}", self.type_names(id).join(", "))
    }

    // ----- propagation ---------------------------------------------------

    fn subscribe(&mut self, dependent: NodeId, source: NodeId) {
        self.nodes[source.index()].dependents.insert(dependent);
    }

    fn schedule(&mut self, id: NodeId) {
        if self.queued.insert(id) {
            self.worklist.push_back(id);
        }
    }

    fn touch(&mut self, id: NodeId) {
        let dependents: Vec<NodeId> = self.nodes[id.index()].dependents.iter().copied().collect();
        for dependent in dependents {
            self.schedule(dependent);
        }
    }

    fn propagate(&mut self) {
        while let Some(id) = self.worklist.pop_front() {
            self.queued.remove(&id);
            if self.recompute(id) {
                self.touch(id);
            }
        }
    }

    fn recompute(&mut self, id: NodeId) -> bool {
        self.stats.recomputations += 1;
        let outcome = self.evaluate(id);
        for source in outcome.subscribe {
            self.subscribe(id, source);
        }
        let grew = self.nodes[id.index()].types.extend_from(&outcome.types);
        if grew {
            self.stats.growths += 1;
            trace!(node = id.0, types = %self.nodes[id.index()].types, "type set grew");
        }
        grew || outcome.notify
    }

    fn evaluate(&mut self, id: NodeId) -> Outcome {
        let mut out = Outcome::default();
        match self.nodes[id.index()].kind.clone() {
            NodeKind::Plain { inputs } => {
                for input in inputs {
                    out.types.extend_from(self.types(input));
                }
            }
            NodeKind::Merge { targets } => {
                for target in targets {
                    match target {
                        Target::Binding(input) => {
                            out.types.extend_from(self.types(input));
                        }
                        Target::Unbound if self.unbound_as_none => out.add(Ty::NONE),
                        Target::Unbound => {}
                    }
                }
            }
            NodeKind::BinOp { op, left, right } => {
                self.eval_binop(op, left, right, &mut out);
            }
            NodeKind::Unary { op, operand } => {
                self.eval_unary(op, operand, &mut out);
            }
            NodeKind::MemberRead { object, attr } => {
                self.eval_member_read(object, &attr, &mut out);
            }
            NodeKind::MemberWrite { object, attr, value } => {
                self.apply_member_write(object, &attr, value, self.line(id));
            }
            NodeKind::Invoke { callee, args } => {
                self.eval_invoke(callee, &args, &mut out);
            }
            NodeKind::Iterate { source } => {
                self.eval_iterate(source, &mut out);
            }
            NodeKind::Subscript { value, index } => {
                self.eval_subscript(value, index, &mut out);
            }
            NodeKind::ClassMerge { class } => {
                out.notify = self.merge_class(class);
            }
        }
        out
    }

    // ----- member tables ---------------------------------------------------

    fn member(&self, class: ClassId, name: &str) -> Option<Member> {
        self.classes[class.0 as usize].members.get(name).copied()
    }

    fn watch_class(&self, class: ClassId, out: &mut Outcome) {
        out.watch(self.classes[class.0 as usize].node);
    }

    fn link(&mut self, class: ClassId, a: NodeId, b: NodeId) {
        let key = (a.min(b), a.max(b));
        if self.classes[class.0 as usize].linked.insert(key) {
            self.connect(a, b);
            self.connect(b, a);
        }
    }

    /// Member node for `name`, created on first write
    fn ensure_member(&mut self, class: ClassId, name: &str, line: u32) -> NodeId {
        if let Some(member) = self.member(class, name) {
            return member.node;
        }
        let node = self.push_node(NodeKind::Plain { inputs: Vec::new() }, line);
        self.classes[class.0 as usize].members.insert(
            name.to_string(),
            Member {
                node,
                origin: Origin::Own,
            },
        );
        trace!(class = %self.classes[class.0 as usize].name, member = name, "member created by assignment");
        self.touch(self.classes[class.0 as usize].node);
        node
    }

    /// Pull base members into the class table; returns true if the table changed
    fn merge_class(&mut self, class: ClassId) -> bool {
        let info = &self.classes[class.0 as usize];
        let own_node = info.node;
        let bases = info.bases.clone();
        let mut any_based = false;
        let mut inherited: Vec<(usize, String, NodeId)> = Vec::new();
        for (position, base) in bases.iter().enumerate() {
            for ty in self.types(*base).iter() {
                match ty {
                    Ty::Class(parent) if *parent != class => {
                        let parent_info = &self.classes[parent.0 as usize];
                        any_based |= parent_info.any_based;
                        inherited.extend(
                            parent_info
                                .members
                                .iter()
                                .map(|(name, member)| (position, name.clone(), member.node)),
                        );
                    }
                    Ty::Any | Ty::BuiltinType(_) => any_based = true,
                    Ty::BuiltinClass(name) => any_based |= *name != "object",
                    _ => {}
                }
            }
        }
        let parents: Vec<NodeId> = bases
            .iter()
            .flat_map(|base| self.types(*base).iter())
            .filter_map(|ty| match ty {
                Ty::Class(parent) if *parent != class => Some(self.classes[parent.0 as usize].node),
                _ => None,
            })
            .collect();
        for parent in parents {
            self.subscribe(own_node, parent);
        }

        let mut changed = false;
        for (position, name, node) in inherited {
            match self.member(class, &name) {
                None => {
                    self.classes[class.0 as usize].members.insert(
                        name,
                        Member {
                            node,
                            origin: Origin::Inherited(position),
                        },
                    );
                    changed = true;
                }
                Some(Member {
                    node: existing,
                    origin: Origin::Own,
                }) => {
                    if existing != node && name != "__init__" {
                        self.link(class, existing, node);
                    }
                }
                Some(Member {
                    node: existing,
                    origin: Origin::Inherited(earlier),
                }) => {
                    if position < earlier && existing != node {
                        self.classes[class.0 as usize].members.insert(
                            name,
                            Member {
                                node,
                                origin: Origin::Inherited(position),
                            },
                        );
                        changed = true;
                    }
                }
            }
        }
        let info = &mut self.classes[class.0 as usize];
        if any_based && !info.any_based {
            info.any_based = true;
            changed = true;
        }
        if changed {
            trace!(class = %info.name, members = info.members.len(), "class members merged");
        }
        changed
    }

    fn apply_member_write(&mut self, object: NodeId, attr: &str, value: NodeId, line: u32) {
        let candidates: Vec<Ty> = self.types(object).iter().copied().collect();
        for ty in candidates {
            match ty {
                Ty::Instance(class) | Ty::Class(class) => {
                    let member = self.ensure_member(class, attr, line);
                    self.connect(member, value);
                }
                Ty::Module(module) => {
                    if let Some(export) = self.modules[module.0 as usize].exports.get(attr).copied() {
                        self.connect(export, value);
                    }
                }
                _ => {}
            }
        }
    }

    /// Return types of every function held by `member`
    fn extend_returns(&self, member: NodeId, out: &mut Outcome) {
        out.watch(member);
        for ty in self.types(member).iter() {
            match ty {
                Ty::Function(f) | Ty::Method(f) => {
                    let returns = self.function(*f).returns;
                    out.watch(returns);
                    out.types.extend_from(self.types(returns));
                }
                _ => out.add(Ty::Any),
            }
        }
    }

    /// Look up a special method and add its return types
    fn call_special(&self, class: ClassId, name: &str, out: &mut Outcome) -> bool {
        self.watch_class(class, out);
        match self.member(class, name) {
            Some(member) => {
                self.extend_returns(member.node, out);
                true
            }
            None if self.class(class).any_based => {
                out.add(Ty::Any);
                true
            }
            None => false,
        }
    }

    fn has_special(&self, class: ClassId, name: &str, out: &mut Outcome) -> bool {
        self.watch_class(class, out);
        self.member(class, name).is_some()
    }

    // ----- node rules -------------------------------------------------------

    fn eval_binop(&self, op: BinOp, left: NodeId, right: NodeId, out: &mut Outcome) -> Verdict {
        let (lhs, rhs) = (self.types(left), self.types(right));
        if lhs.is_empty() || rhs.is_empty() {
            return Verdict::Pending;
        }
        let mut supported = false;
        for l in lhs.iter() {
            for r in rhs.iter() {
                supported |= self.binop_pair(op, *l, *r, out);
            }
        }
        Verdict::from_found(supported)
    }

    fn binop_pair(&self, op: BinOp, l: Ty, r: Ty, out: &mut Outcome) -> bool {
        if matches!(op, BinOp::Eq | BinOp::NotEq | BinOp::Is | BinOp::IsNot) {
            out.add(Ty::BOOL);
            return true;
        }
        if op.is_membership() {
            let found = self.membership_pair(l, r, out);
            if found {
                out.add(Ty::BOOL);
            }
            return found;
        }
        match (l, r) {
            (Ty::Base(a), Ty::Base(b)) => match binop_result(op, a, b) {
                Some(kind) => {
                    out.add(Ty::Base(kind));
                    true
                }
                None => false,
            },
            (Ty::Any, Ty::Base(b)) => {
                self.add_unknown_side(binop_with_unknown_left(op, b), out);
                true
            }
            (Ty::Base(a), Ty::Any) => {
                self.add_unknown_side(binop_with_unknown_right(op, a), out);
                true
            }
            (Ty::Any, _) | (_, Ty::Any) => {
                out.add(Ty::Any);
                true
            }
            (Ty::Instance(class), _) if op.dunder().is_some_and(|name| self.call_special(class, name, out)) => true,
            (_, Ty::Instance(class)) => {
                reflected_dunder(op).is_some_and(|name| self.call_special(class, name, out))
            }
            _ => false,
        }
    }

    fn add_unknown_side(&self, kinds: super::lattice::KindSet, out: &mut Outcome) {
        if kinds.is_empty() {
            out.add(Ty::Any);
        } else {
            out.types.extend_from(&TypeSet::from_kinds(kinds));
        }
    }

    fn membership_pair(&self, item: Ty, container: Ty, out: &mut Outcome) -> bool {
        match container {
            Ty::Base(kind) => match item {
                Ty::Base(item) => contains(item, kind),
                Ty::Any => element_of(kind).is_some(),
                _ => matches!(kind, Kind::List | Kind::Tuple | Kind::Set | Kind::Dict),
            },
            Ty::Any => true,
            Ty::Instance(class) => {
                ["__contains__", "__iter__", "__getitem__"]
                    .iter()
                    .any(|name| self.has_special(class, name, out))
                    || self.class(class).any_based
            }
            Ty::Class(class) => {
                self.watch_class(class, out);
                self.class(class).any_based
            }
            _ => false,
        }
    }

    fn eval_unary(&self, op: UnaryOp, operand: NodeId, out: &mut Outcome) -> Verdict {
        let types = self.types(operand);
        if types.is_empty() {
            return Verdict::Pending;
        }
        let mut supported = false;
        for ty in types.iter() {
            supported |= match (op, ty) {
                (UnaryOp::Not, _) => {
                    out.add(Ty::BOOL);
                    true
                }
                (_, Ty::Base(kind)) => match unary_result(op, *kind) {
                    Some(kind) => {
                        out.add(Ty::Base(kind));
                        true
                    }
                    None => false,
                },
                (_, Ty::Any) => {
                    out.add(Ty::Any);
                    true
                }
                (_, Ty::Instance(class)) => self.call_special(*class, unary_dunder(op), out),
                _ => false,
            };
        }
        Verdict::from_found(supported)
    }

    fn eval_member_read(&self, object: NodeId, attr: &str, out: &mut Outcome) -> Verdict {
        let types = self.types(object);
        if types.is_empty() {
            return Verdict::Pending;
        }
        let mut found = false;
        for ty in types.iter() {
            found |= self.read_member(*ty, attr, out);
        }
        Verdict::from_found(found)
    }

    fn read_member(&self, ty: Ty, attr: &str, out: &mut Outcome) -> bool {
        match ty {
            Ty::Any => {
                out.add(Ty::Any);
                true
            }
            Ty::Instance(class) => {
                self.watch_class(class, out);
                if let Some(member) = self.member(class, attr) {
                    out.watch(member.node);
                    for member_ty in self.types(member.node).iter() {
                        self.instance_view(*member_ty, out);
                    }
                    true
                } else if attr == "__class__" {
                    out.add(Ty::Class(class));
                    true
                } else if attr == "__dict__" {
                    out.add(Ty::Base(Kind::Dict));
                    true
                } else if self.class(class).any_based {
                    out.add(Ty::Any);
                    true
                } else {
                    false
                }
            }
            Ty::Class(class) => {
                self.watch_class(class, out);
                if let Some(member) = self.member(class, attr) {
                    out.watch(member.node);
                    for member_ty in self.types(member.node).iter() {
                        match member_ty {
                            Ty::Function(f) => match self.function(*f).method_kind {
                                MethodKind::Class => out.add(Ty::Method(*f)),
                                MethodKind::Property => out.add(Ty::Any),
                                MethodKind::Plain | MethodKind::Static => out.add(Ty::Function(*f)),
                            },
                            other => out.add(*other),
                        }
                    }
                    true
                } else if attr == "__name__" || attr == "__qualname__" {
                    out.add(Ty::STR);
                    true
                } else if self.class(class).any_based || attr.starts_with("__") {
                    out.add(Ty::Any);
                    true
                } else {
                    false
                }
            }
            Ty::Module(module) => {
                let info = self.module(module);
                if let Some(export) = info.exports.get(attr) {
                    out.watch(*export);
                    out.types.extend_from(self.types(*export));
                    true
                } else if let Some(sub) = info.submodules.get(attr) {
                    out.add(Ty::Module(*sub));
                    true
                } else if matches!(attr, "__name__" | "__file__" | "__doc__") {
                    out.add(Ty::STR);
                    true
                } else {
                    false
                }
            }
            Ty::Base(kind) => {
                if let Some((name, _)) = builtins::method(kind, attr) {
                    out.add(Ty::BuiltinMethod(kind, name));
                    true
                } else if attr == "__class__" {
                    out.add(Ty::BuiltinType(kind));
                    true
                } else {
                    false
                }
            }
            Ty::Slice
            | Ty::Function(_)
            | Ty::Method(_)
            | Ty::BuiltinFunction(_)
            | Ty::BuiltinType(_)
            | Ty::BuiltinClass(_)
            | Ty::BuiltinMethod(..) => {
                out.add(Ty::Any);
                true
            }
        }
    }

    /// How a class member looks when read through an instance
    fn instance_view(&self, ty: Ty, out: &mut Outcome) {
        match ty {
            Ty::Function(f) => match self.function(f).method_kind {
                MethodKind::Static => out.add(Ty::Function(f)),
                MethodKind::Property => {
                    let returns = self.function(f).returns;
                    out.watch(returns);
                    out.types.extend_from(self.types(returns));
                }
                MethodKind::Plain | MethodKind::Class => out.add(Ty::Method(f)),
            },
            other => out.add(other),
        }
    }

    fn eval_invoke(&self, callee: NodeId, args: &[CallArg], out: &mut Outcome) -> Option<CallResult> {
        let types = self.types(callee);
        if types.is_empty() {
            return None;
        }
        let mut result = CallResult::NotCallable;
        for ty in types.iter() {
            match self.call_candidate(*ty, args, out) {
                CallResult::Ok => result = CallResult::Ok,
                CallResult::Mismatch if result == CallResult::NotCallable => result = CallResult::Mismatch,
                _ => {}
            }
        }
        Some(result)
    }

    fn call_candidate(&self, ty: Ty, args: &[CallArg], out: &mut Outcome) -> CallResult {
        match ty {
            Ty::Any => {
                out.add(Ty::Any);
                CallResult::Ok
            }
            Ty::Function(f) => self.call_function(f, args, false, out),
            Ty::Method(f) => self.call_function(f, args, true, out),
            Ty::Class(class) => {
                self.watch_class(class, out);
                let accepted = match self.member(class, "__init__") {
                    Some(init) => {
                        out.watch(init.node);
                        let mut scratch = Outcome::default();
                        let mut any_function = false;
                        let mut matched = false;
                        for init_ty in self.types(init.node).iter() {
                            if let Ty::Function(f) = init_ty {
                                any_function = true;
                                matched |= self.call_function(*f, args, true, &mut scratch) == CallResult::Ok;
                            }
                        }
                        out.subscribe.extend(scratch.subscribe);
                        matched || !any_function
                    }
                    None => self.class(class).any_based || args.is_empty(),
                };
                if accepted {
                    out.add(Ty::Instance(class));
                    CallResult::Ok
                } else {
                    CallResult::Mismatch
                }
            }
            Ty::Instance(class) => {
                self.watch_class(class, out);
                match self.member(class, "__call__") {
                    Some(call) => {
                        out.watch(call.node);
                        let mut result = CallResult::Mismatch;
                        for call_ty in self.types(call.node).iter() {
                            match call_ty {
                                Ty::Function(f) if self.call_function(*f, args, true, out) == CallResult::Ok => {
                                    result = CallResult::Ok;
                                }
                                Ty::Function(_) => {}
                                _ => {
                                    out.add(Ty::Any);
                                    result = CallResult::Ok;
                                }
                            }
                        }
                        if self.types(call.node).is_empty() {
                            result = CallResult::Ok;
                        }
                        result
                    }
                    None if self.class(class).any_based => {
                        out.add(Ty::Any);
                        CallResult::Ok
                    }
                    None => CallResult::NotCallable,
                }
            }
            Ty::BuiltinFunction(name) => {
                let Some(function) = builtins::function(name) else {
                    out.add(Ty::Any);
                    return CallResult::Ok;
                };
                let positional: Vec<&CallArg> =
                    args.iter().filter(|a| a.kind == ArgKind::Positional).collect();
                let splat = args.iter().any(|a| matches!(a.kind, ArgKind::Star | ArgKind::DoubleStar));
                let count = positional.len();
                let arity_ok = splat
                    || (count >= function.min_args && function.max_args.map_or(true, |max| count <= max));
                if !arity_ok {
                    return CallResult::Mismatch;
                }
                let first = positional.first().map(|a| self.types(a.value));
                if let Some(arg) = positional.first() {
                    out.watch(arg.value);
                }
                out.types.extend_from(&function.returns.types(first.filter(|t| !t.is_empty())));
                CallResult::Ok
            }
            Ty::BuiltinType(kind) => {
                let count = args.iter().filter(|a| a.kind == ArgKind::Positional).count();
                if count > builtins::type_max_args(kind) {
                    return CallResult::Mismatch;
                }
                out.add(Ty::Base(kind));
                CallResult::Ok
            }
            Ty::BuiltinClass(_) => {
                out.add(Ty::Any);
                CallResult::Ok
            }
            Ty::BuiltinMethod(kind, name) => {
                let returns = builtins::method(kind, name).map_or(Returns::Any, |(_, r)| r);
                out.types.extend_from(&returns.types(None));
                CallResult::Ok
            }
            Ty::Base(_) | Ty::Slice | Ty::Module(_) => CallResult::NotCallable,
        }
    }

    fn call_function(&self, f: FuncId, args: &[CallArg], bound: bool, out: &mut Outcome) -> CallResult {
        let info = self.function(f);
        out.watch(info.returns);
        let Some(pairs) = bind_arguments(&info.params, args, bound) else {
            return CallResult::Mismatch;
        };
        if pairs
            .iter()
            .all(|(arg, param)| self.compatible(arg.value, *param))
        {
            out.types.extend_from(self.types(info.returns));
            CallResult::Ok
        } else {
            CallResult::Mismatch
        }
    }

    /// Argument and parameter sets intersect; empty sets are still open
    fn compatible(&self, arg: NodeId, param: NodeId) -> bool {
        let (given, expected) = (self.types(arg), self.types(param));
        if given.is_empty() || expected.is_empty() || given.has_any() || expected.has_any() {
            return true;
        }
        given
            .iter()
            .any(|g| expected.iter().any(|e| self.accepts(*e, *g)))
    }

    fn accepts(&self, expected: Ty, given: Ty) -> bool {
        match (expected, given) {
            _ if expected == given => true,
            (Ty::FLOAT, Ty::INT | Ty::BOOL) | (Ty::INT, Ty::BOOL) => true,
            (Ty::Instance(base), Ty::Instance(derived)) => self.is_subclass(derived, base),
            (Ty::Function(_) | Ty::Method(_), Ty::Function(_) | Ty::Method(_)) => true,
            _ => false,
        }
    }

    pub fn is_subclass(&self, derived: ClassId, base: ClassId) -> bool {
        let mut stack = vec![derived];
        let mut seen = HashSet::new();
        while let Some(class) = stack.pop() {
            if class == base {
                return true;
            }
            if !seen.insert(class) {
                continue;
            }
            for node in &self.class(class).bases {
                for ty in self.types(*node).iter() {
                    if let Ty::Class(parent) = ty {
                        stack.push(*parent);
                    }
                }
            }
        }
        false
    }

    fn eval_iterate(&self, source: NodeId, out: &mut Outcome) -> Verdict {
        let types = self.types(source);
        if types.is_empty() {
            return Verdict::Pending;
        }
        let mut found = false;
        for ty in types.iter() {
            found |= match *ty {
                Ty::Base(kind) => match element_of(kind) {
                    Some(element) => {
                        out.add(element);
                        true
                    }
                    None => false,
                },
                Ty::Any => {
                    out.add(Ty::Any);
                    true
                }
                Ty::Instance(class) => {
                    if self.has_special(class, "__iter__", out) {
                        out.add(Ty::Any);
                        true
                    } else {
                        self.call_special(class, "__getitem__", out)
                    }
                }
                Ty::Class(class) => {
                    self.watch_class(class, out);
                    if self.class(class).any_based {
                        out.add(Ty::Any);
                    }
                    self.class(class).any_based
                }
                _ => false,
            };
        }
        Verdict::from_found(found)
    }

    fn eval_subscript(&self, value: NodeId, index: NodeId, out: &mut Outcome) -> Verdict {
        let types = self.types(value);
        if types.is_empty() {
            return Verdict::Pending;
        }
        let index_types = self.types(index);
        let sliced = index_types.contains(&Ty::Slice);
        let plain = index_types.is_empty() || index_types.iter().any(|t| *t != Ty::Slice);
        let mut found = false;
        for ty in types.iter() {
            found |= match *ty {
                Ty::Base(kind) => {
                    let mut ok = false;
                    for (wanted, slice) in [(sliced, true), (plain, false)] {
                        if let Some(result) = subscript_of(kind, slice).filter(|_| wanted) {
                            out.add(result);
                            ok = true;
                        }
                    }
                    ok
                }
                Ty::Any | Ty::BuiltinType(_) | Ty::BuiltinClass(_) => {
                    out.add(Ty::Any);
                    true
                }
                Ty::Instance(class) => self.call_special(class, "__getitem__", out),
                Ty::Class(class) => {
                    let generic = self.has_special(class, "__class_getitem__", out) || self.class(class).any_based;
                    if generic {
                        out.add(Ty::Any);
                    }
                    generic
                }
                _ => false,
            };
        }
        Verdict::from_found(found)
    }

    // ----- issue checks ---------------------------------------------------------

    /// Re-evaluate a node against the final sets and report a problem, if any
    pub fn check(&self, id: NodeId) -> Option<DiagnosticKind> {
        let mut scratch = Outcome::default();
        match &self.nodes[id.index()].kind {
            NodeKind::BinOp { op, left, right } => {
                if self.eval_binop(*op, *left, *right, &mut scratch) != Verdict::Failed {
                    return None;
                }
                if op.is_membership() {
                    Some(DiagnosticKind::NotSearchable {
                        container: self.render(*right),
                    })
                } else {
                    Some(DiagnosticKind::IncompatibleOperands {
                        op: op.symbol().to_string(),
                        left: self.render(*left),
                        right: self.render(*right),
                    })
                }
            }
            NodeKind::Unary { op, operand } => {
                (self.eval_unary(*op, *operand, &mut scratch) == Verdict::Failed).then(|| {
                    DiagnosticKind::BadOperand {
                        op: unary_symbol(*op).to_string(),
                        operand: self.render(*operand),
                    }
                })
            }
            NodeKind::MemberRead { object, attr } => {
                (self.eval_member_read(*object, attr, &mut scratch) == Verdict::Failed).then(|| {
                    DiagnosticKind::MissingAttribute {
                        object: self.render(*object),
                        attr: attr.clone(),
                    }
                })
            }
            NodeKind::Invoke { callee, args } => match self.eval_invoke(*callee, args, &mut scratch) {
                Some(CallResult::NotCallable) => Some(DiagnosticKind::NotCallable {
                    callee: self.render(*callee),
                }),
                Some(CallResult::Mismatch) => Some(DiagnosticKind::ArgumentMismatch {
                    callee: self.render(*callee),
                }),
                _ => None,
            },
            NodeKind::Iterate { source } => {
                (self.eval_iterate(*source, &mut scratch) == Verdict::Failed).then(|| DiagnosticKind::NotIterable {
                    value: self.render(*source),
                })
            }
            NodeKind::Subscript { value, index } => {
                if self.eval_subscript(*value, *index, &mut scratch) == Verdict::Failed {
                    return Some(DiagnosticKind::NotIndexable {
                        value: self.render(*value),
                    });
                }
                self.non_integer_index(*value, *index)
            }
            NodeKind::ClassMerge { class } => self.bad_base(*class),
            NodeKind::Plain { .. } | NodeKind::Merge { .. } | NodeKind::MemberWrite { .. } => None,
        }
    }

    fn non_integer_index(&self, value: NodeId, index: NodeId) -> Option<DiagnosticKind> {
        let (values, indices) = (self.types(value), self.types(index));
        if values.is_empty() || indices.is_empty() {
            return None;
        }
        let sequence_only = values
            .iter()
            .all(|t| matches!(t, Ty::Base(kind) if needs_integer_index(*kind)));
        let integral = indices
            .iter()
            .any(|t| matches!(*t, Ty::INT | Ty::BOOL | Ty::Slice | Ty::Any | Ty::Instance(_)));
        (sequence_only && !integral).then(|| DiagnosticKind::NonIntegerIndex {
            index: self.render(index),
        })
    }

    fn bad_base(&self, class: ClassId) -> Option<DiagnosticKind> {
        self.class(class).bases.iter().find_map(|base| {
            let types = self.types(*base);
            let acceptable = types.is_empty()
                || types.iter().any(|t| {
                    matches!(
                        t,
                        Ty::Class(_) | Ty::Any | Ty::BuiltinType(_) | Ty::BuiltinClass(_)
                    )
                });
            (!acceptable).then(|| DiagnosticKind::BadBaseClass {
                base: self.render(*base),
            })
        })
    }
}

/// Match call arguments to parameters
///
/// Returns the (argument, parameter node) pairs to type-check, or `None` on
/// an arity or keyword mismatch. Splatted arguments relax the arity checks
/// they could satisfy.
fn bind_arguments<'a>(params: &[ParamInfo], args: &'a [CallArg], bound: bool) -> Option<Vec<(&'a CallArg, NodeId)>> {
    let positional: Vec<&ParamInfo> = params
        .iter()
        .filter(|p| p.kind == ParamKind::Positional)
        .skip(usize::from(bound))
        .collect();
    let has_varargs = params.iter().any(|p| p.kind == ParamKind::VarArgs);
    let has_varkw = params.iter().any(|p| p.kind == ParamKind::VarKeywords);
    let mut filled = vec![false; positional.len()];
    let mut keywords_filled: HashSet<&str> = HashSet::new();
    let mut pairs = Vec::new();
    let (mut star, mut double_star) = (false, false);
    let mut next = 0;

    for arg in args {
        match &arg.kind {
            ArgKind::Positional => {
                if next < positional.len() {
                    filled[next] = true;
                    pairs.push((arg, positional[next].node));
                    next += 1;
                } else if !has_varargs {
                    return None;
                }
            }
            ArgKind::Star => star = true,
            ArgKind::DoubleStar => double_star = true,
            ArgKind::Keyword(name) => {
                if let Some(i) = positional.iter().position(|p| p.name == *name) {
                    if filled[i] {
                        return None;
                    }
                    filled[i] = true;
                    pairs.push((arg, positional[i].node));
                } else if let Some(param) = params
                    .iter()
                    .find(|p| p.kind == ParamKind::KeywordOnly && p.name == *name)
                {
                    if !keywords_filled.insert(param.name.as_str()) {
                        return None;
                    }
                    pairs.push((arg, param.node));
                } else if !has_varkw {
                    return None;
                }
            }
        }
    }

    if !star && !double_star {
        let missing = positional
            .iter()
            .zip(&filled)
            .any(|(param, filled)| !filled && !param.has_default);
        if missing {
            return None;
        }
    }
    if !double_star {
        let missing_keyword = params.iter().any(|p| {
            p.kind == ParamKind::KeywordOnly && !p.has_default && !keywords_filled.contains(p.name.as_str())
        });
        if missing_keyword {
            return None;
        }
    }
    Some(pairs)
}

fn reflected_dunder(op: BinOp) -> Option<&'static str> {
    Some(match op {
        BinOp::Add => "__radd__",
        BinOp::Sub => "__rsub__",
        BinOp::Mult => "__rmul__",
        BinOp::MatMult => "__rmatmul__",
        BinOp::Div => "__rtruediv__",
        BinOp::Mod => "__rmod__",
        BinOp::Pow => "__rpow__",
        BinOp::LShift => "__rlshift__",
        BinOp::RShift => "__rrshift__",
        BinOp::BitOr => "__ror__",
        BinOp::BitXor => "__rxor__",
        BinOp::BitAnd => "__rand__",
        BinOp::FloorDiv => "__rfloordiv__",
        BinOp::Lt => "__gt__",
        BinOp::LtE => "__ge__",
        BinOp::Gt => "__lt__",
        BinOp::GtE => "__le__",
        _ => return None,
    })
}

fn unary_dunder(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Invert => "__invert__",
        UnaryOp::Not => "__bool__",
        UnaryOp::UAdd => "__pos__",
        UnaryOp::USub => "__neg__",
    }
}

fn unary_symbol(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Invert => "~",
        UnaryOp::Not => "not",
        UnaryOp::UAdd => "+",
        UnaryOp::USub => "-",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::lattice::KindSet;

    fn set(types: &[Ty]) -> TypeSet {
        types.iter().copied().collect()
    }

    #[test]
    fn test_plain_node_unions_inputs() {
        let mut graph = Graph::default();
        let one = graph.constant(Ty::INT);
        let text = graph.constant(Ty::STR);
        let node = graph.union(vec![one, text], 1);
        assert_eq!(graph.types(node), &set(&[Ty::INT, Ty::STR]));
    }

    #[test]
    fn test_input_added_later_propagates() {
        let mut graph = Graph::default();
        let a = graph.plain(1);
        let b = graph.union(vec![a], 2);
        let c = graph.union(vec![b], 3);
        assert!(graph.types(c).is_empty());
        let one = graph.constant(Ty::INT);
        graph.add_input(a, one);
        assert_eq!(graph.types(c), &set(&[Ty::INT]));
    }

    #[test]
    fn test_binop_promotes() {
        let mut graph = Graph::default();
        let one = graph.constant(Ty::INT);
        let half = graph.constant(Ty::FLOAT);
        let sum = graph.binop(BinOp::Add, one, half, 1);
        assert_eq!(graph.types(sum), &set(&[Ty::FLOAT]));
        assert!(graph.check(sum).is_none());
    }

    #[test]
    fn test_set_plus_int_is_flagged() {
        let mut graph = Graph::default();
        let s = graph.constant(Ty::Base(Kind::Set));
        let one = graph.constant(Ty::INT);
        let sum = graph.binop(BinOp::Add, s, one, 4);
        assert!(graph.types(sum).is_empty());
        assert!(matches!(
            graph.check(sum),
            Some(DiagnosticKind::IncompatibleOperands { .. })
        ));
    }

    #[test]
    fn test_pending_binop_is_not_flagged() {
        let mut graph = Graph::default();
        let unknown = graph.plain(1);
        let one = graph.constant(Ty::INT);
        let sum = graph.binop(BinOp::Add, unknown, one, 1);
        assert!(graph.check(sum).is_none());
        assert_eq!(graph.presented(sum), TypeSet::any());
    }

    #[test]
    fn test_any_operand_uses_base_kinds() {
        let mut graph = Graph::default();
        let any = graph.constant(Ty::Any);
        let one = graph.constant(Ty::INT);
        let sum = graph.binop(BinOp::Add, any, one, 1);
        assert_eq!(graph.types(sum), &TypeSet::from_kinds(KindSet::of(&[Kind::Int, Kind::Float])));
    }

    #[test]
    fn test_merge_with_unbound_contributes_none() {
        let mut graph = Graph::default();
        let one = graph.constant(Ty::INT);
        let merge = graph.merge(1);
        graph.add_merge_targets(merge, &[Target::Binding(one), Target::Unbound]);
        assert_eq!(graph.types(merge), &set(&[Ty::INT, Ty::NONE]));

        let mut strict = Graph::new(false);
        let one = strict.constant(Ty::INT);
        let merge = strict.merge(1);
        strict.add_merge_targets(merge, &[Target::Binding(one), Target::Unbound]);
        assert_eq!(strict.types(merge), &set(&[Ty::INT]));
    }

    #[test]
    fn test_cycle_reaches_fixpoint() {
        let mut graph = Graph::default();
        let zero = graph.constant(Ty::INT);
        let phi = graph.merge(1);
        let one = graph.constant(Ty::INT);
        let next = graph.binop(BinOp::Add, phi, one, 2);
        graph.add_merge_targets(phi, &[Target::Binding(zero), Target::Binding(next)]);
        assert_eq!(graph.types(phi), &set(&[Ty::INT]));
        assert_eq!(graph.repropagate_all(), 0);
    }

    #[test]
    fn test_member_write_creates_member() {
        let mut graph = Graph::default();
        let class = graph.add_class("Point", 1);
        let instance = graph.constant(Ty::Instance(class));
        let read = graph.member_read(instance, "x", 3);
        assert!(graph.check(read).is_some());

        let one = graph.constant(Ty::INT);
        graph.member_write(instance, "x", one, 2);
        assert_eq!(graph.types(read), &set(&[Ty::INT]));
        assert!(graph.check(read).is_none());
    }

    #[test]
    fn test_inherited_member_is_shared() {
        let mut graph = Graph::default();
        let base = graph.add_class("A", 1);
        let m = graph.plain(2);
        graph.add_own_member(base, "m", m);
        let derived = graph.add_class("B", 3);
        let base_ref = graph.constant(Ty::Class(base));
        graph.set_bases(derived, vec![base_ref]);
        let member = graph.class(derived).members.get("m").copied();
        assert_eq!(
            member,
            Some(Member {
                node: m,
                origin: Origin::Inherited(0)
            })
        );
    }

    #[test]
    fn test_overridden_member_is_linked() {
        let mut graph = Graph::default();
        let base = graph.add_class("A", 1);
        let base_m = graph.plain(2);
        graph.add_own_member(base, "m", base_m);
        let derived = graph.add_class("B", 3);
        let derived_m = graph.plain(4);
        graph.add_own_member(derived, "m", derived_m);
        let base_ref = graph.constant(Ty::Class(base));
        graph.set_bases(derived, vec![base_ref]);

        let text = graph.constant(Ty::STR);
        graph.add_input(derived_m, text);
        assert!(graph.types(base_m).contains(&Ty::STR));
        let one = graph.constant(Ty::INT);
        graph.add_input(base_m, one);
        assert!(graph.types(derived_m).contains(&Ty::INT));
    }

    #[test]
    fn test_builtin_base_marks_any_based() {
        let mut graph = Graph::default();
        let class = graph.add_class("MyError", 1);
        let base = graph.constant(Ty::BuiltinClass("Exception"));
        graph.set_bases(class, vec![base]);
        assert!(graph.class(class).any_based);
        assert!(graph.check(graph.class(class).node).is_none());

        let other = graph.add_class("Bad", 2);
        let number = graph.constant(Ty::INT);
        graph.set_bases(other, vec![number]);
        assert!(matches!(
            graph.check(graph.class(other).node),
            Some(DiagnosticKind::BadBaseClass { .. })
        ));
    }

    #[test]
    fn test_calling_int_is_not_callable() {
        let mut graph = Graph::default();
        let one = graph.constant(Ty::INT);
        let call = graph.invoke(one, Vec::new(), 1);
        assert!(matches!(graph.check(call), Some(DiagnosticKind::NotCallable { .. })));
    }

    #[test]
    fn test_builtin_arity() {
        let mut graph = Graph::default();
        let len = graph.constant(Ty::BuiltinFunction("len"));
        let text = graph.constant(Ty::STR);
        let ok = graph.invoke(
            len,
            vec![CallArg {
                value: text,
                kind: ArgKind::Positional,
            }],
            1,
        );
        assert_eq!(graph.types(ok), &set(&[Ty::INT]));
        let bad = graph.invoke(len, Vec::new(), 2);
        assert!(matches!(graph.check(bad), Some(DiagnosticKind::ArgumentMismatch { .. })));
    }

    #[test]
    fn test_bind_arguments() {
        let params = vec![
            ParamInfo {
                name: "a".into(),
                node: NodeId(0),
                kind: ParamKind::Positional,
                has_default: false,
            },
            ParamInfo {
                name: "b".into(),
                node: NodeId(1),
                kind: ParamKind::Positional,
                has_default: true,
            },
        ];
        let positional = |value| CallArg {
            value: NodeId(value),
            kind: ArgKind::Positional,
        };
        assert_eq!(bind_arguments(&params, &[positional(5)], false).map(|p| p.len()), Some(1));
        assert!(bind_arguments(&params, &[], false).is_none());
        assert!(bind_arguments(&params, &[positional(5), positional(6), positional(7)], false).is_none());
        let keyword = CallArg {
            value: NodeId(8),
            kind: ArgKind::Keyword("b".into()),
        };
        assert_eq!(
            bind_arguments(&params, &[positional(5), keyword.clone()], false).map(|p| p.len()),
            Some(2)
        );
        assert!(bind_arguments(&params, &[keyword], true).is_some());
    }

    #[test]
    fn test_iterate_and_subscript() {
        let mut graph = Graph::default();
        let text = graph.constant(Ty::STR);
        let chars = graph.iterate(text, 1);
        assert_eq!(graph.types(chars), &set(&[Ty::STR]));

        let number = graph.constant(Ty::INT);
        let bad = graph.iterate(number, 2);
        assert!(matches!(graph.check(bad), Some(DiagnosticKind::NotIterable { .. })));

        let list = graph.constant(Ty::Base(Kind::List));
        let key = graph.constant(Ty::STR);
        let item = graph.subscript(list, key, 3);
        assert!(matches!(graph.check(item), Some(DiagnosticKind::NonIntegerIndex { .. })));

        let not_indexable = graph.subscript(number, number, 4);
        assert!(matches!(graph.check(not_indexable), Some(DiagnosticKind::NotIndexable { .. })));
    }

    #[test]
    fn test_membership_on_int_is_not_searchable() {
        let mut graph = Graph::default();
        let one = graph.constant(Ty::INT);
        let test = graph.binop(BinOp::In, one, one, 1);
        assert!(matches!(graph.check(test), Some(DiagnosticKind::NotSearchable { .. })));
    }

    /// Each node is recomputed at most once per growth of one of its inputs
    fn assert_bounded(graph: &Graph) {
        let height = (Kind::ALL.len() + 8) as u64;
        let bound = (graph.node_count() + graph.edge_count()) as u64 * height;
        let recomputations = graph.stats().recomputations;
        assert!(recomputations <= bound, "{recomputations} recomputations, bound {bound}");
    }

    #[test]
    fn test_own_constructor_is_not_linked_to_base() {
        let mut graph = Graph::default();
        let base = graph.add_class("A", 1);
        let base_init = graph.plain(2);
        graph.add_own_member(base, "__init__", base_init);
        let derived = graph.add_class("B", 3);
        let derived_init = graph.plain(4);
        graph.add_own_member(derived, "__init__", derived_init);
        let base_ref = graph.constant(Ty::Class(base));
        graph.set_bases(derived, vec![base_ref]);

        graph.seed(base_init, &set(&[Ty::STR]));
        assert!(graph.types(derived_init).is_empty());
        assert_eq!(
            graph.class(derived).members.get("__init__").copied(),
            Some(Member {
                node: derived_init,
                origin: Origin::Own
            })
        );

        // without a constructor of its own the base one is inherited
        let plain = graph.add_class("C", 5);
        let base_ref = graph.constant(Ty::Class(base));
        graph.set_bases(plain, vec![base_ref]);
        assert_eq!(
            graph.class(plain).members.get("__init__").copied(),
            Some(Member {
                node: base_init,
                origin: Origin::Inherited(0)
            })
        );
    }

    #[test]
    fn test_cyclic_class_hierarchy_converges() {
        let mut graph = Graph::default();
        let a = graph.add_class("A", 1);
        let b = graph.add_class("B", 2);
        let m = graph.plain(3);
        graph.add_own_member(a, "m", m);
        let n = graph.plain(4);
        graph.add_own_member(b, "n", n);
        let a_ref = graph.constant(Ty::Class(a));
        let b_ref = graph.constant(Ty::Class(b));
        graph.set_bases(a, vec![b_ref]);
        graph.set_bases(b, vec![a_ref]);
        graph.seed(m, &set(&[Ty::INT]));

        assert_eq!(graph.class(a).members.get("n").map(|member| member.node), Some(n));
        assert_eq!(graph.class(b).members.get("m").map(|member| member.node), Some(m));
        assert_eq!(graph.class(a).members.get("m").map(|member| member.origin), Some(Origin::Own));
        assert_eq!(graph.repropagate_all(), 0);
        assert_bounded(&graph);
    }

    #[test]
    fn test_long_cycle_is_bounded() {
        let mut graph = Graph::default();
        let phi = graph.merge(1);
        let mut previous = phi;
        let mut chain = Vec::new();
        for line in 2..40 {
            let node = graph.union(vec![previous], line);
            chain.push(node);
            previous = node;
        }
        let seed = graph.constant(Ty::INT);
        graph.add_merge_targets(phi, &[Target::Binding(seed), Target::Binding(previous)]);
        for (kind, line) in [Ty::STR, Ty::FLOAT, Ty::NONE].into_iter().zip(40..) {
            let extra = graph.constant(kind);
            let late = graph.union(vec![extra], line);
            graph.add_input(chain[0], late);
        }
        assert_eq!(graph.types(phi), &set(&[Ty::INT, Ty::STR, Ty::FLOAT, Ty::NONE]));
        assert_eq!(graph.repropagate_all(), 0);
        assert_bounded(&graph);
    }
}

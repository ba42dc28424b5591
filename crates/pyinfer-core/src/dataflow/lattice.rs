//! Type lattice for constraint propagation
//!
//! A type variable holds a *set* of candidate types. The lattice is the
//! powerset of [`Ty`] ordered by inclusion:
//! - Bottom (∅) = nothing known yet, presented as `Any` once inference ends
//! - Sets only grow while propagating
//! - `Any` is an ordinary member that absorbs every operation it meets
//!
//! The finite universe of base kinds ([`Kind`]) is what the operator tables
//! and the parameter solver reason about.

use crate::ast::{BinOp, UnaryOp};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Handle of a class descriptor in the constraint graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClassId(pub u32);

/// Handle of a function descriptor in the constraint graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FuncId(pub u32);

/// Handle of a module symbol table in the constraint graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleId(pub u32);

/// Base kinds of builtin values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Kind {
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    None,
    List,
    Tuple,
    Set,
    Dict,
}

impl Kind {
    pub const ALL: [Kind; 10] = [
        Kind::Bool,
        Kind::Int,
        Kind::Float,
        Kind::Str,
        Kind::Bytes,
        Kind::None,
        Kind::List,
        Kind::Tuple,
        Kind::Set,
        Kind::Dict,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Str => "str",
            Kind::Bytes => "bytes",
            Kind::None => "None",
            Kind::List => "list",
            Kind::Tuple => "tuple",
            Kind::Set => "set",
            Kind::Dict => "dict",
        }
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }

    fn is_intlike(self) -> bool {
        matches!(self, Kind::Bool | Kind::Int)
    }

    fn is_numeric(self) -> bool {
        matches!(self, Kind::Bool | Kind::Int | Kind::Float)
    }

    fn is_sequence(self) -> bool {
        matches!(self, Kind::Str | Kind::Bytes | Kind::List | Kind::Tuple)
    }
}

/// A subset of the base-kind universe, stored as a bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KindSet(u16);

impl KindSet {
    pub const EMPTY: KindSet = KindSet(0);
    pub const FULL: KindSet = KindSet((1 << Kind::ALL.len()) - 1);

    pub fn of(kinds: &[Kind]) -> Self {
        kinds.iter().copied().collect()
    }

    pub fn insert(&mut self, kind: Kind) {
        self.0 |= kind.bit();
    }

    pub fn contains(self, kind: Kind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn intersect(self, other: KindSet) -> KindSet {
        KindSet(self.0 & other.0)
    }

    pub fn union(self, other: KindSet) -> KindSet {
        KindSet(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_full(self) -> bool {
        self == Self::FULL
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Kind> {
        Kind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl FromIterator<Kind> for KindSet {
    fn from_iter<I: IntoIterator<Item = Kind>>(iter: I) -> Self {
        let mut set = KindSet::EMPTY;
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

/// One candidate type of a type variable
///
/// Containers carry no element types; element reads give `Any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ty {
    Any,
    Base(Kind),
    Slice,
    /// The class object itself
    Class(ClassId),
    /// An instance of a user class
    Instance(ClassId),
    Function(FuncId),
    /// A function reached through an instance; the first parameter is bound
    Method(FuncId),
    Module(ModuleId),
    BuiltinFunction(&'static str),
    /// `int`, `str`, `list`, ... used as a value
    BuiltinType(Kind),
    /// `object` and the builtin exception hierarchy
    BuiltinClass(&'static str),
    BuiltinMethod(Kind, &'static str),
}

impl Ty {
    pub const NONE: Ty = Ty::Base(Kind::None);
    pub const BOOL: Ty = Ty::Base(Kind::Bool);
    pub const INT: Ty = Ty::Base(Kind::Int);
    pub const FLOAT: Ty = Ty::Base(Kind::Float);
    pub const STR: Ty = Ty::Base(Kind::Str);

    pub fn kind(&self) -> Option<Kind> {
        match self {
            Ty::Base(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Any => write!(f, "Any"),
            Ty::Base(kind) => write!(f, "{}", kind.name()),
            Ty::Slice => write!(f, "slice"),
            Ty::Class(id) => write!(f, "class#{}", id.0),
            Ty::Instance(id) => write!(f, "instance#{}", id.0),
            Ty::Function(id) => write!(f, "function#{}", id.0),
            Ty::Method(id) => write!(f, "method#{}", id.0),
            Ty::Module(id) => write!(f, "module#{}", id.0),
            Ty::BuiltinFunction(name) => write!(f, "builtin {name}"),
            Ty::BuiltinType(kind) => write!(f, "type[{}]", kind.name()),
            Ty::BuiltinClass(name) => write!(f, "type[{name}]"),
            Ty::BuiltinMethod(kind, name) => write!(f, "{}.{name}", kind.name()),
        }
    }
}

/// Candidate set of a type variable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSet(BTreeSet<Ty>);

impl TypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(ty: Ty) -> Self {
        let mut set = Self::new();
        set.insert(ty);
        set
    }

    pub fn any() -> Self {
        Self::single(Ty::Any)
    }

    pub fn from_kinds(kinds: KindSet) -> Self {
        kinds.iter().map(Ty::Base).collect()
    }

    /// Returns true if the set grew
    pub fn insert(&mut self, ty: Ty) -> bool {
        self.0.insert(ty)
    }

    /// Union `other` into `self`; returns true if the set grew
    pub fn extend_from(&mut self, other: &TypeSet) -> bool {
        let before = self.0.len();
        self.0.extend(other.0.iter().copied());
        self.0.len() != before
    }

    pub fn contains(&self, ty: &Ty) -> bool {
        self.0.contains(ty)
    }

    pub fn has_any(&self) -> bool {
        self.0.contains(&Ty::Any)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_subset(&self, other: &TypeSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ty> {
        self.0.iter()
    }

    /// The base kinds in the set, or `None` if it holds anything else
    pub fn kinds(&self) -> Option<KindSet> {
        self.0.iter().map(Ty::kind).collect()
    }

    /// Empty sets, and sets holding every base kind, read as `Any` once
    /// inference is over
    pub fn presented(&self) -> TypeSet {
        if self.is_empty() || self.kinds() == Some(KindSet::FULL) {
            TypeSet::any()
        } else {
            self.clone()
        }
    }
}

impl FromIterator<Ty> for TypeSet {
    fn from_iter<I: IntoIterator<Item = Ty>>(iter: I) -> Self {
        TypeSet(iter.into_iter().collect())
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.0.iter().map(|t| t.to_string()).collect();
        names.sort();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Result kind of `l <op> r` for base kinds, `None` if Python raises `TypeError`
pub fn binop_result(op: BinOp, l: Kind, r: Kind) -> Option<Kind> {
    use Kind::*;
    let numeric = l.is_numeric() && r.is_numeric();
    let widened = if l == Float || r == Float { Float } else { Int };
    match op {
        BinOp::Eq | BinOp::NotEq | BinOp::Is | BinOp::IsNot => Some(Bool),
        BinOp::In | BinOp::NotIn => contains(l, r).then_some(Bool),
        BinOp::Lt | BinOp::LtE | BinOp::Gt | BinOp::GtE => {
            let ordered = numeric || (l == r && matches!(l, Str | Bytes | List | Tuple | Set));
            ordered.then_some(Bool)
        }
        BinOp::Add => match (l, r) {
            _ if numeric => Some(widened),
            (Str, Str) | (Bytes, Bytes) | (List, List) | (Tuple, Tuple) => Some(l),
            _ => Option::None,
        },
        BinOp::Sub => match (l, r) {
            _ if numeric => Some(widened),
            (Set, Set) => Some(Set),
            _ => Option::None,
        },
        BinOp::Mult => match (l, r) {
            _ if numeric => Some(widened),
            (seq, n) if seq.is_sequence() && n.is_intlike() => Some(seq),
            (n, seq) if seq.is_sequence() && n.is_intlike() => Some(seq),
            _ => Option::None,
        },
        BinOp::Div => numeric.then_some(Float),
        BinOp::FloorDiv | BinOp::Pow => numeric.then_some(widened),
        BinOp::Mod => match (l, r) {
            _ if numeric => Some(widened),
            (Str, _) => Some(Str),
            (Bytes, _) => Some(Bytes),
            _ => Option::None,
        },
        BinOp::LShift | BinOp::RShift => (l.is_intlike() && r.is_intlike()).then_some(Int),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => match (l, r) {
            (Bool, Bool) => Some(Bool),
            _ if l.is_intlike() && r.is_intlike() => Some(Int),
            (Set, Set) => Some(Set),
            (Dict, Dict) if op == BinOp::BitOr => Some(Dict),
            _ => Option::None,
        },
        BinOp::MatMult => Option::None,
    }
}

/// Whether `l <op> r` is defined for base kinds
pub fn supports(op: BinOp, l: Kind, r: Kind) -> bool {
    binop_result(op, l, r).is_some()
}

/// Results of `l <op> r` when `l` is unresolved: every base kind that works
/// with `r` contributes its result
pub fn binop_with_unknown_left(op: BinOp, r: Kind) -> KindSet {
    Kind::ALL.iter().filter_map(|l| binop_result(op, *l, r)).collect()
}

/// Mirror of [`binop_with_unknown_left`] for an unresolved right operand
pub fn binop_with_unknown_right(op: BinOp, l: Kind) -> KindSet {
    Kind::ALL.iter().filter_map(|r| binop_result(op, l, *r)).collect()
}

/// Whether `item in container` is accepted for base kinds
pub fn contains(item: Kind, container: Kind) -> bool {
    match container {
        Kind::Str => item == Kind::Str,
        Kind::Bytes => matches!(item, Kind::Bytes | Kind::Int | Kind::Bool),
        Kind::List | Kind::Tuple | Kind::Set | Kind::Dict => true,
        _ => false,
    }
}

pub fn unary_result(op: UnaryOp, operand: Kind) -> Option<Kind> {
    match op {
        UnaryOp::Not => Some(Kind::Bool),
        UnaryOp::UAdd | UnaryOp::USub => match operand {
            Kind::Bool | Kind::Int => Some(Kind::Int),
            Kind::Float => Some(Kind::Float),
            _ => None,
        },
        UnaryOp::Invert => operand.is_intlike().then_some(Kind::Int),
    }
}

/// Kinds that can be iterated over
pub fn iterable_kinds() -> KindSet {
    KindSet::of(&[Kind::Str, Kind::Bytes, Kind::List, Kind::Tuple, Kind::Set, Kind::Dict])
}

/// Kinds accepting `value[index]`
pub fn indexable_kinds() -> KindSet {
    KindSet::of(&[Kind::Str, Kind::Bytes, Kind::List, Kind::Tuple, Kind::Dict])
}

/// Element type produced by iterating a base kind
pub fn element_of(kind: Kind) -> Option<Ty> {
    match kind {
        Kind::Str => Some(Ty::STR),
        Kind::Bytes => Some(Ty::INT),
        Kind::List | Kind::Tuple | Kind::Set | Kind::Dict => Some(Ty::Any),
        _ => None,
    }
}

/// Result of `value[index]` for a base kind; `sliced` when the index is a slice
pub fn subscript_of(kind: Kind, sliced: bool) -> Option<Ty> {
    match kind {
        Kind::Str => Some(Ty::STR),
        Kind::Bytes if sliced => Some(Ty::Base(Kind::Bytes)),
        Kind::Bytes => Some(Ty::INT),
        Kind::List | Kind::Tuple if sliced => Some(Ty::Base(kind)),
        Kind::List | Kind::Tuple | Kind::Dict => Some(Ty::Any),
        _ => None,
    }
}

/// Whether an integer (or slice) index is required for this kind
pub fn needs_integer_index(kind: Kind) -> bool {
    matches!(kind, Kind::Str | Kind::Bytes | Kind::List | Kind::Tuple)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_promotion() {
        assert_eq!(binop_result(BinOp::Add, Kind::Int, Kind::Float), Some(Kind::Float));
        assert_eq!(binop_result(BinOp::Add, Kind::Bool, Kind::Int), Some(Kind::Int));
        assert_eq!(binop_result(BinOp::Div, Kind::Int, Kind::Int), Some(Kind::Float));
        assert_eq!(binop_result(BinOp::FloorDiv, Kind::Int, Kind::Int), Some(Kind::Int));
    }

    #[test]
    fn test_sequence_operators() {
        assert_eq!(binop_result(BinOp::Add, Kind::Str, Kind::Str), Some(Kind::Str));
        assert_eq!(binop_result(BinOp::Mult, Kind::Int, Kind::List), Some(Kind::List));
        assert_eq!(binop_result(BinOp::Mod, Kind::Str, Kind::Tuple), Some(Kind::Str));
        assert_eq!(binop_result(BinOp::Add, Kind::Str, Kind::Int), None);
        assert_eq!(binop_result(BinOp::Add, Kind::List, Kind::Tuple), None);
    }

    #[test]
    fn test_set_plus_int_is_incompatible() {
        assert_eq!(binop_result(BinOp::Add, Kind::Set, Kind::Int), None);
        assert_eq!(binop_result(BinOp::BitOr, Kind::Set, Kind::Set), Some(Kind::Set));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(binop_result(BinOp::Eq, Kind::Set, Kind::Int), Some(Kind::Bool));
        assert_eq!(binop_result(BinOp::Lt, Kind::Str, Kind::Str), Some(Kind::Bool));
        assert_eq!(binop_result(BinOp::Lt, Kind::Str, Kind::Int), None);
        assert_eq!(binop_result(BinOp::In, Kind::Int, Kind::List), Some(Kind::Bool));
        assert_eq!(binop_result(BinOp::In, Kind::Int, Kind::Str), None);
        assert_eq!(binop_result(BinOp::In, Kind::Str, Kind::Int), None);
    }

    #[test]
    fn test_unknown_left_operand() {
        let kinds = binop_with_unknown_left(BinOp::Add, Kind::Int);
        assert_eq!(kinds, KindSet::of(&[Kind::Int, Kind::Float]));
        assert!(binop_with_unknown_left(BinOp::Add, Kind::None).is_empty());
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary_result(UnaryOp::USub, Kind::Bool), Some(Kind::Int));
        assert_eq!(unary_result(UnaryOp::Invert, Kind::Float), None);
        assert_eq!(unary_result(UnaryOp::Not, Kind::List), Some(Kind::Bool));
    }

    #[test]
    fn test_kind_set() {
        let mut set = KindSet::EMPTY;
        set.insert(Kind::Str);
        set.insert(Kind::Int);
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Kind::Int, Kind::Str]);
        assert!(KindSet::FULL.is_full());
        assert_eq!(KindSet::FULL.len(), Kind::ALL.len());
    }

    #[test]
    fn test_type_set_display_is_sorted() {
        let set: TypeSet = [Ty::INT, Ty::FLOAT].into_iter().collect();
        assert_eq!(set.to_string(), "{float, int}");
        assert_eq!(TypeSet::new().presented().to_string(), "{Any}");
    }

    #[test]
    fn test_every_base_kind_presents_as_any() {
        assert_eq!(TypeSet::from_kinds(KindSet::FULL).presented(), TypeSet::any());
        let almost: KindSet = Kind::ALL.into_iter().filter(|k| *k != Kind::Dict).collect();
        assert_eq!(TypeSet::from_kinds(almost).presented().len(), 9);
    }

    #[test]
    fn test_type_set_growth() {
        let mut set = TypeSet::single(Ty::INT);
        assert!(!set.extend_from(&TypeSet::single(Ty::INT)));
        assert!(set.extend_from(&TypeSet::single(Ty::STR)));
        assert_eq!(set.kinds(), Some(KindSet::of(&[Kind::Int, Kind::Str])));
        set.insert(Ty::Any);
        assert_eq!(set.kinds(), None);
    }

    #[test]
    fn test_element_and_subscript() {
        assert_eq!(element_of(Kind::Bytes), Some(Ty::INT));
        assert_eq!(element_of(Kind::Int), None);
        assert_eq!(subscript_of(Kind::List, true), Some(Ty::Base(Kind::List)));
        assert_eq!(subscript_of(Kind::Set, false), None);
    }
}

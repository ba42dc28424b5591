//! Static tables for the builtin namespace

use super::lattice::{iterable_kinds, Kind, KindSet, Ty, TypeSet};

/// What a builtin call evaluates to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    Kind(Kind),
    /// The types of the first argument (`abs`, `copy`-like helpers)
    FirstArg,
    Any,
}

impl Returns {
    pub fn types(self, first_arg: Option<&TypeSet>) -> TypeSet {
        match self {
            Returns::Kind(kind) => TypeSet::single(Ty::Base(kind)),
            Returns::FirstArg => first_arg.cloned().unwrap_or_else(TypeSet::any),
            Returns::Any => TypeSet::any(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BuiltinFunction {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic functions
    pub max_args: Option<usize>,
    pub returns: Returns,
    /// Kinds accepted for the first positional argument, when restricted
    pub accepts: Option<KindSet>,
}

const fn func(name: &'static str, min_args: usize, max_args: Option<usize>, returns: Returns) -> BuiltinFunction {
    BuiltinFunction {
        name,
        min_args,
        max_args,
        returns,
        accepts: None,
    }
}

fn sized() -> KindSet {
    KindSet::of(&[Kind::Str, Kind::Bytes, Kind::List, Kind::Tuple, Kind::Set, Kind::Dict])
}

fn numeric() -> KindSet {
    KindSet::of(&[Kind::Bool, Kind::Int, Kind::Float])
}

fn integer() -> KindSet {
    KindSet::of(&[Kind::Bool, Kind::Int])
}

const FUNCTIONS: &[BuiltinFunction] = &[
    func("abs", 1, Some(1), Returns::FirstArg),
    func("all", 1, Some(1), Returns::Kind(Kind::Bool)),
    func("any", 1, Some(1), Returns::Kind(Kind::Bool)),
    func("ascii", 1, Some(1), Returns::Kind(Kind::Str)),
    func("bin", 1, Some(1), Returns::Kind(Kind::Str)),
    func("callable", 1, Some(1), Returns::Kind(Kind::Bool)),
    func("chr", 1, Some(1), Returns::Kind(Kind::Str)),
    func("delattr", 2, Some(2), Returns::Kind(Kind::None)),
    func("dir", 0, Some(1), Returns::Kind(Kind::List)),
    func("divmod", 2, Some(2), Returns::Kind(Kind::Tuple)),
    func("enumerate", 1, Some(2), Returns::Any),
    func("eval", 1, Some(3), Returns::Any),
    func("exec", 1, Some(3), Returns::Kind(Kind::None)),
    func("filter", 2, Some(2), Returns::Any),
    func("format", 1, Some(2), Returns::Kind(Kind::Str)),
    func("getattr", 2, Some(3), Returns::Any),
    func("globals", 0, Some(0), Returns::Kind(Kind::Dict)),
    func("hasattr", 2, Some(2), Returns::Kind(Kind::Bool)),
    func("hash", 1, Some(1), Returns::Kind(Kind::Int)),
    func("hex", 1, Some(1), Returns::Kind(Kind::Str)),
    func("id", 1, Some(1), Returns::Kind(Kind::Int)),
    func("input", 0, Some(1), Returns::Kind(Kind::Str)),
    func("isinstance", 2, Some(2), Returns::Kind(Kind::Bool)),
    func("issubclass", 2, Some(2), Returns::Kind(Kind::Bool)),
    func("iter", 1, Some(2), Returns::Any),
    func("len", 1, Some(1), Returns::Kind(Kind::Int)),
    func("locals", 0, Some(0), Returns::Kind(Kind::Dict)),
    func("map", 2, None, Returns::Any),
    func("max", 1, None, Returns::Any),
    func("min", 1, None, Returns::Any),
    func("next", 1, Some(2), Returns::Any),
    func("oct", 1, Some(1), Returns::Kind(Kind::Str)),
    func("open", 1, Some(8), Returns::Any),
    func("ord", 1, Some(1), Returns::Kind(Kind::Int)),
    func("pow", 2, Some(3), Returns::Any),
    func("print", 0, None, Returns::Kind(Kind::None)),
    func("property", 0, Some(4), Returns::Any),
    func("range", 1, Some(3), Returns::Any),
    func("repr", 1, Some(1), Returns::Kind(Kind::Str)),
    func("reversed", 1, Some(1), Returns::Any),
    func("round", 1, Some(2), Returns::Any),
    func("setattr", 3, Some(3), Returns::Kind(Kind::None)),
    func("sorted", 1, Some(1), Returns::Kind(Kind::List)),
    func("sum", 1, Some(2), Returns::Any),
    func("super", 0, Some(2), Returns::Any),
    func("type", 1, Some(3), Returns::Any),
    func("vars", 0, Some(1), Returns::Kind(Kind::Dict)),
    func("zip", 0, None, Returns::Any),
    func("classmethod", 1, Some(1), Returns::Any),
    func("staticmethod", 1, Some(1), Returns::Any),
];

const TYPES: &[(&str, Kind)] = &[
    ("bool", Kind::Bool),
    ("int", Kind::Int),
    ("float", Kind::Float),
    ("str", Kind::Str),
    ("bytes", Kind::Bytes),
    ("bytearray", Kind::Bytes),
    ("list", Kind::List),
    ("tuple", Kind::Tuple),
    ("set", Kind::Set),
    ("frozenset", Kind::Set),
    ("dict", Kind::Dict),
];

const CLASSES: &[&str] = &[
    "object",
    "BaseException",
    "Exception",
    "ArithmeticError",
    "AssertionError",
    "AttributeError",
    "EOFError",
    "FileNotFoundError",
    "ImportError",
    "IndexError",
    "IOError",
    "KeyError",
    "KeyboardInterrupt",
    "LookupError",
    "MemoryError",
    "ModuleNotFoundError",
    "NameError",
    "NotImplementedError",
    "OSError",
    "OverflowError",
    "RecursionError",
    "RuntimeError",
    "StopIteration",
    "SystemExit",
    "TypeError",
    "UnicodeDecodeError",
    "UnicodeEncodeError",
    "ValueError",
    "ZeroDivisionError",
    "Warning",
    "DeprecationWarning",
    "UserWarning",
];

/// Resolve a name in the builtin namespace
pub fn lookup(name: &str) -> Option<Ty> {
    if let Some(f) = function(name) {
        return Some(Ty::BuiltinFunction(f.name));
    }
    if let Some((_, kind)) = TYPES.iter().find(|(n, _)| *n == name) {
        return Some(Ty::BuiltinType(*kind));
    }
    if let Some(class) = CLASSES.iter().find(|c| **c == name) {
        return Some(Ty::BuiltinClass(*class));
    }
    match name {
        "__name__" | "__file__" | "__doc__" => Some(Ty::STR),
        "__debug__" => Some(Ty::BOOL),
        "NotImplemented" | "Ellipsis" | "__builtins__" => Some(Ty::Any),
        _ => None,
    }
}

pub fn function(name: &str) -> Option<BuiltinFunction> {
    let mut found = FUNCTIONS.iter().find(|f| f.name == name).copied()?;
    found.accepts = match name {
        "len" => Some(sized()),
        "abs" | "round" => Some(numeric()),
        "chr" | "bin" | "hex" | "oct" => Some(integer()),
        "ord" => Some(KindSet::of(&[Kind::Str, Kind::Bytes])),
        "sorted" | "sum" | "min" | "max" | "enumerate" | "reversed" | "all" | "any" | "iter" => {
            Some(iterable_kinds())
        }
        _ => None,
    };
    Some(found)
}

/// Largest positional arity accepted when calling a builtin type
pub fn type_max_args(kind: Kind) -> usize {
    match kind {
        Kind::Int => 2,
        Kind::Str | Kind::Bytes => 3,
        _ => 1,
    }
}

/// Builtin methods available on values of a base kind
pub fn method(kind: Kind, name: &str) -> Option<(&'static str, Returns)> {
    let table: &[(&'static str, Returns)] = match kind {
        Kind::Str => STR_METHODS,
        Kind::Bytes => BYTES_METHODS,
        Kind::List => LIST_METHODS,
        Kind::Dict => DICT_METHODS,
        Kind::Set => SET_METHODS,
        Kind::Tuple => TUPLE_METHODS,
        Kind::Int | Kind::Bool => INT_METHODS,
        Kind::Float => FLOAT_METHODS,
        Kind::None => &[],
    };
    table.iter().find(|(n, _)| *n == name).copied()
}

/// Kinds on which `name` is a builtin method
pub fn kinds_with_method(name: &str) -> KindSet {
    Kind::ALL.iter().copied().filter(|k| method(*k, name).is_some()).collect()
}

const STR: Returns = Returns::Kind(Kind::Str);
const BYTES: Returns = Returns::Kind(Kind::Bytes);
const BOOL: Returns = Returns::Kind(Kind::Bool);
const INT: Returns = Returns::Kind(Kind::Int);
const NONE: Returns = Returns::Kind(Kind::None);
const LIST: Returns = Returns::Kind(Kind::List);
const TUPLE: Returns = Returns::Kind(Kind::Tuple);
const SET: Returns = Returns::Kind(Kind::Set);

const STR_METHODS: &[(&str, Returns)] = &[
    ("capitalize", STR),
    ("casefold", STR),
    ("center", STR),
    ("count", INT),
    ("encode", BYTES),
    ("endswith", BOOL),
    ("expandtabs", STR),
    ("find", INT),
    ("format", STR),
    ("index", INT),
    ("isalnum", BOOL),
    ("isalpha", BOOL),
    ("isdigit", BOOL),
    ("isidentifier", BOOL),
    ("islower", BOOL),
    ("isnumeric", BOOL),
    ("isspace", BOOL),
    ("istitle", BOOL),
    ("isupper", BOOL),
    ("join", STR),
    ("ljust", STR),
    ("lower", STR),
    ("lstrip", STR),
    ("partition", TUPLE),
    ("removeprefix", STR),
    ("removesuffix", STR),
    ("replace", STR),
    ("rfind", INT),
    ("rindex", INT),
    ("rjust", STR),
    ("rpartition", TUPLE),
    ("rsplit", LIST),
    ("rstrip", STR),
    ("split", LIST),
    ("splitlines", LIST),
    ("startswith", BOOL),
    ("strip", STR),
    ("swapcase", STR),
    ("title", STR),
    ("upper", STR),
    ("zfill", STR),
];

const BYTES_METHODS: &[(&str, Returns)] = &[
    ("count", INT),
    ("decode", STR),
    ("endswith", BOOL),
    ("find", INT),
    ("hex", STR),
    ("index", INT),
    ("join", BYTES),
    ("lower", BYTES),
    ("replace", BYTES),
    ("split", LIST),
    ("startswith", BOOL),
    ("strip", BYTES),
    ("upper", BYTES),
];

const LIST_METHODS: &[(&str, Returns)] = &[
    ("append", NONE),
    ("clear", NONE),
    ("copy", LIST),
    ("count", INT),
    ("extend", NONE),
    ("index", INT),
    ("insert", NONE),
    ("pop", Returns::Any),
    ("remove", NONE),
    ("reverse", NONE),
    ("sort", NONE),
];

const DICT_METHODS: &[(&str, Returns)] = &[
    ("clear", NONE),
    ("copy", Returns::Kind(Kind::Dict)),
    ("get", Returns::Any),
    ("items", Returns::Any),
    ("keys", Returns::Any),
    ("pop", Returns::Any),
    ("popitem", TUPLE),
    ("setdefault", Returns::Any),
    ("update", NONE),
    ("values", Returns::Any),
];

const SET_METHODS: &[(&str, Returns)] = &[
    ("add", NONE),
    ("clear", NONE),
    ("copy", SET),
    ("difference", SET),
    ("difference_update", NONE),
    ("discard", NONE),
    ("intersection", SET),
    ("intersection_update", NONE),
    ("isdisjoint", BOOL),
    ("issubset", BOOL),
    ("issuperset", BOOL),
    ("pop", Returns::Any),
    ("remove", NONE),
    ("symmetric_difference", SET),
    ("union", SET),
    ("update", NONE),
];

const TUPLE_METHODS: &[(&str, Returns)] = &[("count", INT), ("index", INT)];

const INT_METHODS: &[(&str, Returns)] = &[
    ("bit_length", INT),
    ("conjugate", INT),
    ("to_bytes", BYTES),
    ("real", INT),
    ("imag", INT),
];

const FLOAT_METHODS: &[(&str, Returns)] = &[
    ("conjugate", Returns::Kind(Kind::Float)),
    ("hex", STR),
    ("is_integer", BOOL),
    ("real", Returns::Kind(Kind::Float)),
    ("imag", Returns::Kind(Kind::Float)),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_kinds_of_names() {
        assert_eq!(lookup("len"), Some(Ty::BuiltinFunction("len")));
        assert_eq!(lookup("int"), Some(Ty::BuiltinType(Kind::Int)));
        assert_eq!(lookup("ValueError"), Some(Ty::BuiltinClass("ValueError")));
        assert_eq!(lookup("__name__"), Some(Ty::STR));
        assert_eq!(lookup("no_such_builtin"), None);
    }

    #[test]
    fn test_function_arity_and_accepts() {
        let len = function("len").unwrap();
        assert_eq!((len.min_args, len.max_args), (1, Some(1)));
        assert_eq!(len.accepts, Some(sized()));
        let print = function("print").unwrap();
        assert_eq!(print.max_args, None);
        assert_eq!(print.returns, Returns::Kind(Kind::None));
    }

    #[test]
    fn test_methods() {
        assert_eq!(method(Kind::Str, "upper").map(|m| m.1), Some(STR));
        assert_eq!(method(Kind::List, "append").map(|m| m.1), Some(NONE));
        assert!(method(Kind::Int, "upper").is_none());
        assert_eq!(kinds_with_method("upper"), KindSet::of(&[Kind::Str, Kind::Bytes]));
        assert!(kinds_with_method("frobnicate").is_empty());
    }

    #[test]
    fn test_first_arg_returns() {
        let arg = TypeSet::single(Ty::FLOAT);
        assert_eq!(Returns::FirstArg.types(Some(&arg)), arg);
        assert_eq!(Returns::FirstArg.types(None), TypeSet::any());
    }
}

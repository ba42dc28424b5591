use pyinfer_core::{infer_python, infer_python_with, InferConfig};

fn types_of(source: &str, name: &str) -> String {
    let report = infer_python(source).unwrap();
    report
        .binding(name)
        .unwrap_or_else(|| panic!("no binding named {name}"))
        .to_string()
}

#[test]
fn test_mixed_arithmetic_widens_to_float() {
    assert_eq!(types_of("x = 1 + 2.5\n", "x"), "{float}");
}

#[test]
fn test_parameter_typed_from_usage() {
    let report = infer_python("def f(a):\n    return a + 1\n").unwrap();
    let f = report.function("f").unwrap();
    assert_eq!(f.param("a").unwrap().to_string(), "{bool, float, int}");
    assert_eq!(f.returns.to_string(), "{float, int}");
}

#[test]
fn test_loop_counter_stays_int() {
    let python_code = r#"
x = 0
while cond:
    x = x + 1
y = x
"#;
    assert_eq!(types_of(python_code, "y"), "{int}");
}

#[test]
fn test_possibly_unbound_variable_includes_none() {
    let python_code = r#"
if cond:
    x = 1
y = x
"#;
    assert_eq!(types_of(python_code, "y"), "{None, int}");

    let config = InferConfig {
        unbound_as_none: false,
        ..InferConfig::default()
    };
    let report = infer_python_with(python_code, config).unwrap();
    assert_eq!(report.binding("y").unwrap().to_string(), "{int}");
}

#[test]
fn test_binding_of_every_base_kind_is_any() {
    let python_code = r#"
if c1:
    x = True
elif c2:
    x = 1
elif c3:
    x = 1.5
elif c4:
    x = "s"
elif c5:
    x = b"b"
elif c6:
    x = None
elif c7:
    x = [1]
elif c8:
    x = (1,)
elif c9:
    x = {1}
else:
    x = {}
y = x
"#;
    assert_eq!(types_of(python_code, "y"), "{Any}");
}

#[test]
fn test_for_loop_binds_elements() {
    let python_code = r#"
total = 0
for c in "abc":
    last = c
"#;
    assert_eq!(types_of(python_code, "last"), "{str}");
}

#[test]
fn test_inherited_method_is_linked() {
    let python_code = r#"
class A:
    def __init__(self):
        self.v = 1

    def m(self):
        return self.v

class B(A):
    def __init__(self, s):
        self.s = s

b = B("x")
r = b.m()
"#;
    let report = infer_python(python_code).unwrap();
    assert_eq!(report.binding("r").unwrap().to_string(), "{int}");
    assert_eq!(report.binding("b").unwrap().to_string(), "{B}");
    // B's own constructor takes one argument, A's takes none
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
}

#[test]
fn test_attribute_written_outside_class() {
    let python_code = r#"
class Box:
    pass

b = Box()
b.content = 1.5
got = b.content
"#;
    assert_eq!(types_of(python_code, "got"), "{float}");
}

#[test]
fn test_classmethod_and_staticmethod() {
    let python_code = r#"
class Factory:
    @classmethod
    def create(cls):
        return cls()

    @staticmethod
    def version():
        return "1"

made = Factory.create()
v = Factory.version()
"#;
    assert_eq!(types_of(python_code, "made"), "{Factory}");
    assert_eq!(types_of(python_code, "v"), "{str}");
}

#[test]
fn test_property_reads_as_value() {
    let python_code = r#"
class Circle:
    def __init__(self):
        self.r = 2.0

    @property
    def area(self):
        return self.r * self.r

a = Circle().area
"#;
    assert_eq!(types_of(python_code, "a"), "{float}");
}

#[test]
fn test_builtin_calls_and_methods() {
    let python_code = r#"
n = len("abc")
s = str(n)
u = s.upper()
xs = [1, 2]
xs.append(3)
"#;
    let report = infer_python(python_code).unwrap();
    assert_eq!(report.binding("n").unwrap().to_string(), "{int}");
    assert_eq!(report.binding("s").unwrap().to_string(), "{str}");
    assert_eq!(report.binding("u").unwrap().to_string(), "{str}");
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
}

#[test]
fn test_generators_return_any() {
    let python_code = r#"
def gen():
    yield 1

g = gen()
"#;
    assert_eq!(types_of(python_code, "g"), "{Any}");
}

#[test]
fn test_global_declaration_writes_module_binding() {
    let python_code = r#"
counter = 0

def bump():
    global counter
    counter = "reset"
"#;
    assert_eq!(types_of(python_code, "counter"), "{int, str}");
}

#[test]
fn test_closure_reads_enclosing_local() {
    let python_code = r#"
def outer():
    value = 1.0
    def inner():
        return value
    return inner()

r = outer()
"#;
    assert_eq!(types_of(python_code, "r"), "{float}");
}

#[test]
fn test_walrus_and_conditional_expression() {
    let python_code = r#"
y = (n := 10) if cond else "none"
m = n
"#;
    let report = infer_python(python_code).unwrap();
    assert_eq!(report.binding("y").unwrap().to_string(), "{int, str}");
    assert_eq!(report.binding("m").unwrap().to_string(), "{int}");
}

#[test]
fn test_try_except_binds_handler_name() {
    let python_code = r#"
try:
    x = 1
except ValueError as err:
    x = "failed"
    e = err
"#;
    let report = infer_python(python_code).unwrap();
    assert_eq!(report.binding("e").unwrap().to_string(), "{Any}");
    assert!(report.binding("x").unwrap().contains("int"));
    assert!(report.binding("x").unwrap().contains("str"));
}

#[test]
fn test_two_parameters_share_constraints() {
    let python_code = r#"
def join(a, b):
    shout = a + "!"
    return a + b
"#;
    let report = infer_python(python_code).unwrap();
    let join = report.function("join").unwrap();
    assert_eq!(join.param("a").unwrap().to_string(), "{str}");
    assert_eq!(join.param("b").unwrap().to_string(), "{str}");
}

#[test]
fn test_method_names_are_qualified() {
    let report = infer_python("class A:\n    def m(self):\n        return None\n").unwrap();
    let m = report.function("A.m").unwrap();
    assert_eq!(m.param("self").unwrap().to_string(), "{A}");
    assert_eq!(m.returns.to_string(), "{None}");
}

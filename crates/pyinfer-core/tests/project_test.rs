use pyinfer_core::dataflow::Graph;
use pyinfer_core::{
    DiagnosticKind, FsModuleSource, InferConfig, InferError, MemorySource, ModuleReport, ModuleSource, Project,
};
use std::fs;
use std::path::Path;

fn write(root: &Path, relative: &str, text: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

fn analyse(root: &Path, modules: &[&str]) -> Vec<ModuleReport> {
    let mut project = Project::new(FsModuleSource::new(root), InferConfig::default());
    for module in modules {
        project.add_module(module).unwrap();
    }
    project.finish()
}

fn report<'a>(reports: &'a [ModuleReport], module: &str) -> &'a ModuleReport {
    reports
        .iter()
        .find(|r| r.module == module)
        .unwrap_or_else(|| panic!("no report for {module}"))
}

#[test]
fn test_module_names_from_paths() {
    let dir = tempfile::tempdir().unwrap();
    let source = FsModuleSource::new(dir.path());
    assert_eq!(source.module_name(&dir.path().join("a.py")).as_deref(), Some("a"));
    assert_eq!(source.module_name(&dir.path().join("pkg/mod.py")).as_deref(), Some("pkg.mod"));
    assert_eq!(source.module_name(&dir.path().join("pkg/__init__.py")).as_deref(), Some("pkg"));
    assert_eq!(source.module_name(&dir.path().join("notes.txt")), None);
    assert_eq!(source.module_name(Path::new("/elsewhere/a.py")), None);
}

#[test]
fn test_fs_source_prefers_module_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pkg/__init__.py", "");
    write(dir.path(), "pkg/util.py", "x = 1\n");
    let source = FsModuleSource::new(dir.path());
    assert!(source.load("pkg").unwrap().unwrap().is_package);
    let util = source.load("pkg.util").unwrap().unwrap();
    assert!(!util.is_package);
    assert_eq!(util.text, "x = 1\n");
    assert!(source.load("pkg.missing").unwrap().is_none());
}

#[test]
fn test_imported_function_types_flow_across_modules() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "geometry.py", "def scale(v):\n    return v * 2.0\n");
    write(
        dir.path(),
        "main.py",
        "from geometry import scale\nimport geometry as g\na = scale(3)\nb = g.scale(1.5)\n",
    );
    let reports = analyse(dir.path(), &["main"]);
    let main = report(&reports, "main");
    assert_eq!(main.binding("a").unwrap().to_string(), "{float}");
    assert_eq!(main.binding("b").unwrap().to_string(), "{float}");
    assert!(main.diagnostics.is_empty(), "{:?}", main.diagnostics);
}

#[test]
fn test_relative_imports_in_package() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app/__init__.py", "from .models import User\n");
    write(
        dir.path(),
        "app/models.py",
        "class User:\n    def __init__(self, name):\n        self.name = name\n",
    );
    write(
        dir.path(),
        "app/views.py",
        "from . import models\nfrom .models import User\nu = User('x')\nv = models.User('y')\n",
    );
    let reports = analyse(dir.path(), &["app.views"]);
    let views = report(&reports, "app.views");
    assert_eq!(views.binding("u").unwrap().to_string(), "{User}");
    assert_eq!(views.binding("v").unwrap().to_string(), "{User}");
    assert!(views.diagnostics.is_empty(), "{:?}", views.diagnostics);
}

#[test]
fn test_star_import_exposes_exports() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "consts.py", "PI = 3.14\nNAME = 'circle'\n");
    write(dir.path(), "main.py", "from consts import *\narea = PI * 2\n");
    let reports = analyse(dir.path(), &["main"]);
    assert_eq!(report(&reports, "main").binding("area").unwrap().to_string(), "{float}");
}

#[test]
fn test_missing_import_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "main.py", "import absent\nfrom gone import thing\nx = 1\n");
    let reports = analyse(dir.path(), &["main"]);
    let main = report(&reports, "main");
    let unresolved: Vec<&str> = main
        .diagnostics
        .iter()
        .filter_map(|d| match &d.kind {
            DiagnosticKind::UnresolvedImport { module } => Some(module.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(unresolved, vec!["absent", "gone"]);
    assert_eq!(main.binding("thing").unwrap().to_string(), "{Any}");
}

#[test]
fn test_unparsable_dependency_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "broken.py", "def (:\n");
    write(dir.path(), "main.py", "import broken\ny = 2\n");
    let reports = analyse(dir.path(), &["main"]);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].binding("y").unwrap().to_string(), "{int}");

    let mut project = Project::new(FsModuleSource::new(dir.path()), InferConfig::default());
    let error = project.add_module("broken").unwrap_err();
    assert!(matches!(error, InferError::Parse { .. }));
}

#[test]
fn test_import_cycle_terminates() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "import b\nx = 1\ndef get():\n    return b.y\n");
    write(dir.path(), "b.py", "import a\ny = 'b'\nz = a.x\n");
    let reports = analyse(dir.path(), &["a", "b"]);
    assert_eq!(reports.len(), 2);
    let a = report(&reports, "a");
    assert_eq!(a.function("get").unwrap().returns.to_string(), "{str}");
    // `a` was still being analysed when `b` imported it
    assert_eq!(report(&reports, "b").binding("z").unwrap().to_string(), "{Any}");
}

fn assert_settled(graph: &Graph) {
    let height = 18;
    let bound = (graph.node_count() + graph.edge_count()) as u64 * height;
    let recomputations = graph.stats().recomputations;
    assert!(recomputations <= bound, "{recomputations} recomputations, bound {bound}");
}

#[test]
fn test_mutually_recursive_functions_settle() {
    let source = MemorySource::new().with_module(
        "parity",
        r#"
def even(n):
    if n == 0:
        return True
    return odd(n - 1)

def odd(n):
    if n == 0:
        return False
    return even(n - 1)

r = even(10)
"#,
    );
    let mut project = Project::new(source, InferConfig::default());
    project.add_module("parity").unwrap();
    assert_eq!(project.repropagate(), 0);
    assert_settled(project.graph());
    let reports = project.finish();
    let parity = report(&reports, "parity");
    assert!(parity.binding("r").unwrap().contains("bool"));
    assert!(parity.function("odd").unwrap().returns.contains("bool"));
}

#[test]
fn test_mutually_recursive_modules_settle() {
    let source = MemorySource::new()
        .with_module(
            "ping",
            "import pong\ndef ping(n):\n    if n > 0:\n        return pong.pong(n - 1)\n    return 'done'\n",
        )
        .with_module("pong", "import ping\ndef pong(n):\n    return ping.ping(n)\n");
    let mut project = Project::new(source, InferConfig::default());
    project.add_module("ping").unwrap();
    project.add_module("pong").unwrap();
    assert_eq!(project.repropagate(), 0);
    assert_settled(project.graph());
    let reports = project.finish();
    assert_eq!(reports.len(), 2);
    assert!(report(&reports, "ping").function("ping").unwrap().returns.contains("str"));
}

#[test]
fn test_config_file_is_discovered() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pyinfer.toml", "unbound_as_none = false\nbuiltins_as_any = [\"magic\"]\n");
    let config = InferConfig::discover(dir.path()).unwrap();
    assert!(!config.unbound_as_none);
    assert_eq!(config.builtins_as_any, vec!["magic".to_string()]);

    write(dir.path(), "main.py", "x = magic + 1\n");
    let mut project = Project::new(FsModuleSource::new(dir.path()), config);
    project.add_module("main").unwrap();
    let reports = project.finish();
    assert!(reports[0].diagnostics.is_empty());
}

#[test]
fn test_reports_serialize_to_json() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "m.py", "s = {1}\nt = s + 1\n");
    let reports = analyse(dir.path(), &["m"]);
    let json = serde_json::to_value(&reports).unwrap();
    assert_eq!(json[0]["module"], "m");
    assert_eq!(json[0]["bindings"][0]["name"], "s");
    assert_eq!(json[0]["bindings"][0]["types"][0], "set");
    assert_eq!(json[0]["diagnostics"][0]["kind"], "incompatible_operands");
    assert_eq!(json[0]["diagnostics"][0]["line"], 2);
}

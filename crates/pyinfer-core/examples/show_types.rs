//! Demo: control flow, phi placement and inferred types for a small module

use pyinfer_core::ast_bridge::parse_module;
use pyinfer_core::ast::StmtKind;
use pyinfer_core::dataflow::{Cfg, Ssa};
use pyinfer_core::infer_python;

fn main() -> anyhow::Result<()> {
    let python_code = r#"
def calculate_stats(numbers):
    total = 0
    count = 0

    for num in numbers:
        total = total + num
        count = count + 1

    if count > 0:
        average = total / count
    else:
        average = 0.0
    return average

def process_names(names):
    upper_names = []
    for name in names:
        upper_names.append(name.upper())
    return upper_names

def find_max(items):
    if len(items) == 0:
        return None
    max_val = items[0]
    for item in items:
        if item > max_val:
            max_val = item
    return max_val

stats = calculate_stats([1, 2, 3])
"#;

    let module = parse_module(python_code, "demo")?;
    for stmt in &module.body {
        let StmtKind::FunctionDef(def) = &stmt.kind else {
            continue;
        };
        let cfg = Cfg::function(&def.body);
        let params: Vec<String> = def.params.iter().map(|p| p.name.clone()).collect();
        let ssa = Ssa::build(&cfg, &params);
        println!("=== {} ===", def.name.name);
        print!("{cfg}");
        for phi in &ssa.phis {
            println!("  phi {}#{} in block {} <- {:?}", phi.name, phi.version, phi.block.0, phi.targets);
        }
        println!();
    }

    let report = infer_python(python_code)?;
    println!("=== Inferred types ===");
    for function in &report.functions {
        let params: Vec<String> = function
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.types))
            .collect();
        println!("def {}({}) -> {}", function.name, params.join(", "), function.returns);
    }
    for binding in &report.bindings {
        println!("{}: {}", binding.name, binding.types);
    }
    for diagnostic in &report.diagnostics {
        println!("{diagnostic}");
    }
    Ok(())
}

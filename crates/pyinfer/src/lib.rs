//! Command-line front end for pyinfer.
//!
//! - `pyinfer check <paths...>` reports type issues and fails when any exist
//! - `pyinfer types <file>` prints the inferred types of a module

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use pyinfer_core::config::CONFIG_FILE_NAME;
use pyinfer_core::{FsModuleSource, InferConfig, ModuleReport, Project};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "pyinfer", about = "Static type inference for unannotated Python", version)]
pub struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Report operations that cannot succeed for any inferred type
    Check(CheckArgs),
    /// Print the inferred types of a module's bindings and functions
    Types(TypesArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Project root that module names are resolved against.
    ///
    /// Defaults to the directory given, or the parent of the file given.
    #[arg(long)]
    root: Option<PathBuf>,
    /// Configuration file; defaults to `pyinfer.toml` in the project root
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Python files or directories to check
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct TypesArgs {
    /// Python file to analyse
    file: PathBuf,
    #[command(flatten)]
    common: CommonArgs,
}

/// Run a parsed command line; `Ok(false)` when issues were found
pub fn run(cli: Cli) -> Result<bool> {
    match cli.cmd {
        Cmd::Check(args) => check(args),
        Cmd::Types(args) => types(args),
    }
}

/// `EnvFilter` directive for a `-v` count
pub fn log_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    }
}

fn default_root(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn load_config(common: &CommonArgs, root: &Path) -> Result<InferConfig> {
    match &common.config {
        Some(path) => InferConfig::from_file(path).with_context(|| format!("failed to load {}", path.display())),
        None => InferConfig::discover(root)
            .with_context(|| format!("failed to load {}", root.join(CONFIG_FILE_NAME).display())),
    }
}

/// Python files under `path`, sorted
fn python_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "py"))
        .collect();
    files.sort();
    files
}

/// Analyse `files` under `root`, returning the reports of those files only
fn analyse(root: &Path, files: &[PathBuf], config: InferConfig) -> Result<Vec<ModuleReport>> {
    let root = root
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", root.display()))?;
    let source = FsModuleSource::new(&root);
    let mut names = Vec::with_capacity(files.len());
    for file in files {
        let canonical = file
            .canonicalize()
            .with_context(|| format!("failed to resolve {}", file.display()))?;
        let name = source
            .module_name(&canonical)
            .with_context(|| format!("{} is not a Python module under {}", file.display(), root.display()))?;
        names.push(name);
    }
    let mut project = Project::new(source, config);
    for name in &names {
        debug!(module = %name, "adding module");
        project.add_module(name)?;
    }
    let reports = project.finish();
    Ok(reports.into_iter().filter(|r| names.contains(&r.module)).collect())
}

fn check(args: CheckArgs) -> Result<bool> {
    let mut reports = Vec::new();
    for path in &args.paths {
        if !path.exists() {
            bail!("{} does not exist", path.display());
        }
        let root = args.common.root.clone().unwrap_or_else(|| default_root(path));
        let config = load_config(&args.common, &root)?;
        let files = python_files(path);
        info!(root = %root.display(), files = files.len(), "checking");
        reports.extend(analyse(&root, &files, config)?);
    }

    let issues: usize = reports.iter().map(|r| r.diagnostics.len()).sum();
    match args.common.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        Format::Text => {
            for diagnostic in reports.iter().flat_map(|r| &r.diagnostics) {
                println!(
                    "{}:{}: {}",
                    diagnostic.module.bold(),
                    diagnostic.line,
                    diagnostic.message.red()
                );
            }
            if issues == 0 {
                println!("{} ({} modules)", "No issues found".green(), reports.len());
            } else {
                println!(
                    "{}",
                    format!("Found {issues} issues in {} modules", reports.len()).red().bold()
                );
            }
        }
    }
    Ok(issues == 0)
}

fn types(args: TypesArgs) -> Result<bool> {
    if !args.file.is_file() {
        bail!("{} is not a file", args.file.display());
    }
    let root = args.common.root.clone().unwrap_or_else(|| default_root(&args.file));
    let config = load_config(&args.common, &root)?;
    let reports = analyse(&root, std::slice::from_ref(&args.file), config)?;
    let report = reports.into_iter().next().context("no report produced")?;

    match args.common.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => print_types(&report),
    }
    Ok(true)
}

fn print_types(report: &ModuleReport) {
    println!("{}", format!("module {}", report.module).bold());
    for binding in &report.bindings {
        println!("  {}: {}", binding.name.cyan(), binding.types);
    }
    for function in &report.functions {
        let params: Vec<String> = function
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.types))
            .collect();
        println!(
            "  {} {}({}) -> {}",
            "def".bold(),
            function.name.cyan(),
            params.join(", "),
            function.returns
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_python_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/__init__.py"), "").unwrap();
        fs::write(dir.path().join("b.py"), "").unwrap();
        fs::write(dir.path().join("a.py"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        let files = python_files(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.py", "b.py", "pkg/__init__.py"]);
    }

    #[test]
    fn test_default_root() {
        assert_eq!(default_root(Path::new("main.py")), PathBuf::from("."));
        assert_eq!(default_root(Path::new("src/main.py")), PathBuf::from("src"));
    }

    #[test]
    fn test_analyse_reports_requested_modules_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.py"), "import util\nx = util.f()\n").unwrap();
        fs::write(dir.path().join("util.py"), "def f():\n    return 1\n").unwrap();
        let reports = analyse(dir.path(), &[dir.path().join("main.py")], InferConfig::default()).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].binding("x").unwrap().to_string(), "{int}");
    }

    #[test]
    fn test_log_directive() {
        assert_eq!(log_directive(0), "warn");
        assert_eq!(log_directive(3), "trace");
    }
}

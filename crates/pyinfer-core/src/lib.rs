//! # pyinfer-core
//!
//! Static type inference for unannotated Python.
//!
//! Every variable, attribute, parameter and return value gets the set of
//! types it may hold at runtime. Operations that cannot succeed for any of
//! those types are reported as [`Diagnostic`]s.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pyinfer_core::infer_python;
//!
//! let report = infer_python("def f(a):\n    return a + 1\n").unwrap();
//! for function in &report.functions {
//!     println!("{} -> {}", function.name, function.returns);
//! }
//! ```
//!
//! Multi-module projects go through [`Project`], which loads imported
//! modules on demand from a [`ModuleSource`].

pub mod ast;
pub mod ast_bridge;
pub mod config;
pub mod dataflow;
pub mod error;
pub mod project;

pub use config::InferConfig;
pub use dataflow::{infer_python, infer_python_with, Diagnostic, DiagnosticKind};
pub use error::{InferError, Result};
pub use project::{
    BindingSummary, FsModuleSource, FunctionSummary, MemorySource, ModuleReport, ModuleSource, Project, SourceModule,
    TypeSummary,
};

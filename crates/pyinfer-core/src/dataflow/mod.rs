//! Constraint-based type inference for Python modules
//!
//! The pipeline for one module:
//! - Control Flow Graph construction per scope ([`cfg`])
//! - Static single assignment form with phi placement ([`ssa`])
//! - A dependency graph of typing constraints propagated to a fixpoint
//!   with a worklist ([`graph`])
//! - Parameter typing from usage with arc consistency ([`solver`])
//!
//! Inferred type sets only ever grow, so propagation terminates and the
//! result is independent of the order modules and nodes are visited in.

pub mod builtins;
pub mod cfg;
pub mod graph;
mod issues;
pub mod lattice;
mod solver;
pub mod ssa;
mod type_inference;

pub use cfg::{BasicBlock, BlockId, BlockItem, Cfg, CfgBuilder, CfgError};
pub use graph::{FunctionInfo, Graph, MethodKind, NodeId, ParamInfo, ParamKind, PropagationStats};
pub use issues::{Diagnostic, DiagnosticKind};
pub use lattice::{ClassId, FuncId, Kind, KindSet, ModuleId, Ty, TypeSet};
pub use solver::ParamSolver;
pub use ssa::{Def, Phi, Ssa};
pub use type_inference::{infer_python, infer_python_with, ConstructorReturn, ModuleAnalysis, ModuleInferencer};

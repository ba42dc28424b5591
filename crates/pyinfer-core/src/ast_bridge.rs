//! Bridge from the rustpython AST to the engine's syntax tree
//!
//! Parsing belongs to rustpython; this module only lowers its output into the
//! owned [`crate::ast`] tree, resolving byte offsets to line numbers and
//! assigning a fresh [`NameId`] to every name occurrence.

use crate::ast::{
    BinOp, Binder, BoolOp, ClassDef, Comprehension, ComprehensionKind, Constant, ExceptHandler, Expr, ExprKind,
    FunctionDef, ImportAlias, Keyword, Module, NameId, Param, Parameters, Stmt, StmtKind, UnaryOp, WithItem,
};
use crate::error::{InferError, Result};
use rustpython_ast as py;
use rustpython_parser::Parse;

/// Parse Python source text and lower it into a [`Module`].
///
/// `name` is the dotted module name; it is also used as the source path in
/// parse error messages.
pub fn parse_module(source: &str, name: &str) -> Result<Module> {
    let statements = py::Suite::parse(source, name).map_err(|e| InferError::Parse {
        path: name.to_string(),
        message: e.to_string(),
    })?;
    Ok(AstBridge::new(source).lower_module(name, statements))
}

/// Byte offset → 1-based line number
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn line(&self, offset: usize) -> u32 {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        line as u32
    }
}

pub struct AstBridge {
    lines: LineIndex,
    next_name: u32,
}

impl AstBridge {
    pub fn new(source: &str) -> Self {
        Self {
            lines: LineIndex::new(source),
            next_name: 0,
        }
    }

    pub fn lower_module(mut self, name: &str, statements: Vec<py::Stmt>) -> Module {
        let body = self.stmts(statements, 1);
        Module {
            name: name.to_string(),
            body,
        }
    }

    fn line_of(&self, range: py::text_size::TextRange) -> u32 {
        self.lines.line(usize::from(range.start()))
    }

    fn fresh_id(&mut self) -> NameId {
        let id = NameId(self.next_name);
        self.next_name += 1;
        id
    }

    fn binder(&mut self, name: &str) -> Binder {
        Binder {
            id: self.fresh_id(),
            name: name.to_string(),
        }
    }

    fn stmts(&mut self, body: Vec<py::Stmt>, parent_line: u32) -> Vec<Stmt> {
        body.into_iter().filter_map(|s| self.stmt(s, parent_line)).collect()
    }

    fn stmt(&mut self, stmt: py::Stmt, parent_line: u32) -> Option<Stmt> {
        let (line, kind) = match stmt {
            py::Stmt::FunctionDef(py::StmtFunctionDef {
                name,
                args,
                body,
                decorator_list,
                range,
                ..
            }) => {
                let line = self.line_of(range);
                (line, StmtKind::FunctionDef(self.function(&name, *args, body, decorator_list, line)))
            }
            py::Stmt::AsyncFunctionDef(py::StmtAsyncFunctionDef {
                name,
                args,
                body,
                decorator_list,
                range,
                ..
            }) => {
                let line = self.line_of(range);
                (line, StmtKind::FunctionDef(self.function(&name, *args, body, decorator_list, line)))
            }
            py::Stmt::ClassDef(py::StmtClassDef {
                name,
                bases,
                keywords,
                body,
                decorator_list,
                range,
                ..
            }) => {
                let line = self.line_of(range);
                let class = ClassDef {
                    name: self.binder(name.as_str()),
                    bases: self.exprs(bases),
                    keywords: self.keywords(keywords),
                    decorators: self.exprs(decorator_list),
                    body: self.stmts(body, line),
                };
                (line, StmtKind::ClassDef(class))
            }
            py::Stmt::Return(py::StmtReturn { value, range }) => {
                (self.line_of(range), StmtKind::Return(value.map(|v| self.expr(*v))))
            }
            py::Stmt::Delete(py::StmtDelete { targets, range }) => {
                (self.line_of(range), StmtKind::Delete(self.exprs(targets)))
            }
            py::Stmt::Assign(py::StmtAssign {
                targets, value, range, ..
            }) => {
                // Python evaluates the value before binding the targets.
                let value = self.expr(*value);
                let targets = self.exprs(targets);
                (self.line_of(range), StmtKind::Assign { targets, value })
            }
            py::Stmt::AugAssign(py::StmtAugAssign {
                target,
                op,
                value,
                range,
            }) => {
                let value = self.expr(*value);
                let target = self.expr(*target);
                (
                    self.line_of(range),
                    StmtKind::AugAssign {
                        target,
                        op: operator(op),
                        value,
                    },
                )
            }
            py::Stmt::AnnAssign(py::StmtAnnAssign {
                target, value, range, ..
            }) => {
                let value = value.map(|v| self.expr(*v));
                let target = self.expr(*target);
                (self.line_of(range), StmtKind::AnnAssign { target, value })
            }
            py::Stmt::For(py::StmtFor {
                target,
                iter,
                body,
                orelse,
                range,
                ..
            }) => {
                let line = self.line_of(range);
                (line, self.for_loop(*target, *iter, body, orelse, line))
            }
            py::Stmt::AsyncFor(py::StmtAsyncFor {
                target,
                iter,
                body,
                orelse,
                range,
                ..
            }) => {
                let line = self.line_of(range);
                (line, self.for_loop(*target, *iter, body, orelse, line))
            }
            py::Stmt::While(py::StmtWhile {
                test,
                body,
                orelse,
                range,
            }) => {
                let line = self.line_of(range);
                let test = self.expr(*test);
                (
                    line,
                    StmtKind::While {
                        test,
                        body: self.stmts(body, line),
                        orelse: self.stmts(orelse, line),
                    },
                )
            }
            py::Stmt::If(py::StmtIf {
                test,
                body,
                orelse,
                range,
            }) => {
                let line = self.line_of(range);
                let test = self.expr(*test);
                (
                    line,
                    StmtKind::If {
                        test,
                        body: self.stmts(body, line),
                        orelse: self.stmts(orelse, line),
                    },
                )
            }
            py::Stmt::With(py::StmtWith { items, body, range, .. }) => {
                let line = self.line_of(range);
                (line, self.with(items, body, line))
            }
            py::Stmt::AsyncWith(py::StmtAsyncWith { items, body, range, .. }) => {
                let line = self.line_of(range);
                (line, self.with(items, body, line))
            }
            py::Stmt::Raise(py::StmtRaise { exc, cause, range }) => (
                self.line_of(range),
                StmtKind::Raise {
                    exc: exc.map(|e| self.expr(*e)),
                    cause: cause.map(|c| self.expr(*c)),
                },
            ),
            py::Stmt::Try(py::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                range,
            }) => {
                let line = self.line_of(range);
                (line, self.try_stmt(body, handlers, orelse, finalbody, line))
            }
            py::Stmt::TryStar(py::StmtTryStar {
                body,
                handlers,
                orelse,
                finalbody,
                range,
            }) => {
                let line = self.line_of(range);
                (line, self.try_stmt(body, handlers, orelse, finalbody, line))
            }
            py::Stmt::Assert(py::StmtAssert { test, msg, range }) => (
                self.line_of(range),
                StmtKind::Assert {
                    test: self.expr(*test),
                    msg: msg.map(|m| self.expr(*m)),
                },
            ),
            py::Stmt::Import(py::StmtImport { names, range }) => {
                let aliases = names
                    .into_iter()
                    .map(|alias| {
                        let path = alias.name.as_str().to_string();
                        match alias.asname {
                            Some(asname) => ImportAlias {
                                binder: self.binder(asname.as_str()),
                                path,
                                aliased: true,
                            },
                            None => {
                                let top = path.split('.').next().unwrap_or_default().to_string();
                                ImportAlias {
                                    binder: self.binder(&top),
                                    path,
                                    aliased: false,
                                }
                            }
                        }
                    })
                    .collect();
                (self.line_of(range), StmtKind::Import(aliases))
            }
            py::Stmt::ImportFrom(py::StmtImportFrom {
                module,
                names,
                level,
                range,
            }) => {
                let names = names
                    .into_iter()
                    .map(|alias| {
                        let path = alias.name.as_str().to_string();
                        let aliased = alias.asname.is_some();
                        let local = alias.asname.as_ref().map_or(path.as_str(), |a| a.as_str()).to_string();
                        ImportAlias {
                            binder: self.binder(&local),
                            path,
                            aliased,
                        }
                    })
                    .collect();
                (
                    self.line_of(range),
                    StmtKind::ImportFrom {
                        module: module.map(|m| m.as_str().to_string()),
                        names,
                        level: level.map_or(0, |l| l.to_u32()),
                    },
                )
            }
            py::Stmt::Global(py::StmtGlobal { names, range }) => (
                self.line_of(range),
                StmtKind::Global(names.iter().map(|n| n.as_str().to_string()).collect()),
            ),
            py::Stmt::Nonlocal(py::StmtNonlocal { names, range }) => (
                self.line_of(range),
                StmtKind::Nonlocal(names.iter().map(|n| n.as_str().to_string()).collect()),
            ),
            py::Stmt::Expr(py::StmtExpr { value, range }) => (self.line_of(range), StmtKind::Expr(self.expr(*value))),
            py::Stmt::Pass(py::StmtPass { range }) => (self.line_of(range), StmtKind::Pass),
            py::Stmt::Break(py::StmtBreak { range }) => (self.line_of(range), StmtKind::Break),
            py::Stmt::Continue(py::StmtContinue { range }) => (self.line_of(range), StmtKind::Continue),
            // `match` and `type` statements are not analysed.
            _ => (parent_line, StmtKind::Pass),
        };
        Some(Stmt { line, kind })
    }

    fn function(
        &mut self,
        name: &py::Identifier,
        args: py::Arguments,
        body: Vec<py::Stmt>,
        decorators: Vec<py::Expr>,
        line: u32,
    ) -> FunctionDef {
        let decorators = self.exprs(decorators);
        let params = self.parameters(args);
        FunctionDef {
            name: self.binder(name.as_str()),
            params,
            decorators,
            body: self.stmts(body, line),
        }
    }

    fn parameters(&mut self, args: py::Arguments) -> Parameters {
        let py::Arguments {
            posonlyargs,
            args,
            vararg,
            kwonlyargs,
            kwarg,
            ..
        } = args;
        let positional = posonlyargs
            .into_iter()
            .chain(args)
            .map(|a| self.param_with_default(a))
            .collect();
        let kwonly = kwonlyargs.into_iter().map(|a| self.param_with_default(a)).collect();
        Parameters {
            positional,
            vararg: vararg.map(|a| Param {
                name: a.arg.as_str().to_string(),
                default: None,
            }),
            kwonly,
            kwarg: kwarg.map(|a| Param {
                name: a.arg.as_str().to_string(),
                default: None,
            }),
        }
    }

    fn param_with_default(&mut self, arg: py::ArgWithDefault) -> Param {
        Param {
            name: arg.def.arg.as_str().to_string(),
            default: arg.default.map(|d| self.expr(*d)),
        }
    }

    fn for_loop(
        &mut self,
        target: py::Expr,
        iter: py::Expr,
        body: Vec<py::Stmt>,
        orelse: Vec<py::Stmt>,
        line: u32,
    ) -> StmtKind {
        let iter = self.expr(iter);
        let target = self.expr(target);
        StmtKind::For {
            target,
            iter,
            body: self.stmts(body, line),
            orelse: self.stmts(orelse, line),
        }
    }

    fn with(&mut self, items: Vec<py::WithItem>, body: Vec<py::Stmt>, line: u32) -> StmtKind {
        let items = items
            .into_iter()
            .map(|item| WithItem {
                context: self.expr(item.context_expr),
                vars: item.optional_vars.map(|v| self.expr(*v)),
            })
            .collect();
        StmtKind::With {
            items,
            body: self.stmts(body, line),
        }
    }

    fn try_stmt(
        &mut self,
        body: Vec<py::Stmt>,
        handlers: Vec<py::ExceptHandler>,
        orelse: Vec<py::Stmt>,
        finalbody: Vec<py::Stmt>,
        line: u32,
    ) -> StmtKind {
        let body = self.stmts(body, line);
        let handlers = handlers
            .into_iter()
            .map(|handler| {
                let py::ExceptHandler::ExceptHandler(h) = handler;
                let line = self.line_of(h.range);
                ExceptHandler {
                    line,
                    type_: h.type_.map(|t| self.expr(*t)),
                    name: h.name.map(|n| self.binder(n.as_str())),
                    body: self.stmts(h.body, line),
                }
            })
            .collect();
        StmtKind::Try {
            body,
            handlers,
            orelse: self.stmts(orelse, line),
            finalbody: self.stmts(finalbody, line),
        }
    }

    fn exprs(&mut self, exprs: Vec<py::Expr>) -> Vec<Expr> {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    fn boxed(&mut self, expr: py::Expr) -> Box<Expr> {
        Box::new(self.expr(expr))
    }

    fn keywords(&mut self, keywords: Vec<py::Keyword>) -> Vec<Keyword> {
        keywords
            .into_iter()
            .map(|k| Keyword {
                arg: k.arg.map(|a| a.as_str().to_string()),
                value: self.expr(k.value),
            })
            .collect()
    }

    fn comprehensions(&mut self, generators: Vec<py::Comprehension>) -> Vec<Comprehension> {
        generators
            .into_iter()
            .map(|g| {
                let iter = self.expr(g.iter);
                let target = self.expr(g.target);
                Comprehension {
                    target,
                    iter,
                    ifs: self.exprs(g.ifs),
                }
            })
            .collect()
    }

    fn comprehension(
        &mut self,
        kind: ComprehensionKind,
        elt: py::Expr,
        value: Option<py::Expr>,
        generators: Vec<py::Comprehension>,
    ) -> ExprKind {
        // Generators are evaluated first so that their targets get the
        // lower name ids, matching evaluation order.
        let generators = self.comprehensions(generators);
        ExprKind::Comprehension {
            kind,
            elt: self.boxed(elt),
            value: value.map(|v| self.boxed(v)),
            generators,
        }
    }

    fn expr(&mut self, expr: py::Expr) -> Expr {
        let (range, kind) = match expr {
            py::Expr::BoolOp(py::ExprBoolOp { op, values, range }) => {
                let op = match op {
                    py::BoolOp::And => BoolOp::And,
                    py::BoolOp::Or => BoolOp::Or,
                };
                (
                    range,
                    ExprKind::BoolOp {
                        op,
                        values: self.exprs(values),
                    },
                )
            }
            py::Expr::NamedExpr(py::ExprNamedExpr { target, value, range }) => {
                let value = self.boxed(*value);
                let target = self.boxed(*target);
                (range, ExprKind::NamedExpr { target, value })
            }
            py::Expr::BinOp(py::ExprBinOp { left, op, right, range }) => (
                range,
                ExprKind::BinOp {
                    left: self.boxed(*left),
                    op: operator(op),
                    right: self.boxed(*right),
                },
            ),
            py::Expr::UnaryOp(py::ExprUnaryOp { op, operand, range }) => {
                let op = match op {
                    py::UnaryOp::Invert => UnaryOp::Invert,
                    py::UnaryOp::Not => UnaryOp::Not,
                    py::UnaryOp::UAdd => UnaryOp::UAdd,
                    py::UnaryOp::USub => UnaryOp::USub,
                };
                (
                    range,
                    ExprKind::UnaryOp {
                        op,
                        operand: self.boxed(*operand),
                    },
                )
            }
            py::Expr::Lambda(py::ExprLambda { args, body, range }) => {
                let params = Box::new(self.parameters(*args));
                (
                    range,
                    ExprKind::Lambda {
                        params,
                        body: self.boxed(*body),
                    },
                )
            }
            py::Expr::IfExp(py::ExprIfExp {
                test,
                body,
                orelse,
                range,
            }) => (
                range,
                ExprKind::IfExp {
                    test: self.boxed(*test),
                    body: self.boxed(*body),
                    orelse: self.boxed(*orelse),
                },
            ),
            py::Expr::Dict(py::ExprDict { keys, values, range }) => {
                let keys = keys.into_iter().map(|k| k.map(|k| self.expr(k))).collect();
                (
                    range,
                    ExprKind::Dict {
                        keys,
                        values: self.exprs(values),
                    },
                )
            }
            py::Expr::Set(py::ExprSet { elts, range }) => (range, ExprKind::Set(self.exprs(elts))),
            py::Expr::ListComp(py::ExprListComp { elt, generators, range }) => (
                range,
                self.comprehension(ComprehensionKind::List, *elt, None, generators),
            ),
            py::Expr::SetComp(py::ExprSetComp { elt, generators, range }) => (
                range,
                self.comprehension(ComprehensionKind::Set, *elt, None, generators),
            ),
            py::Expr::DictComp(py::ExprDictComp {
                key,
                value,
                generators,
                range,
            }) => (
                range,
                self.comprehension(ComprehensionKind::Dict, *key, Some(*value), generators),
            ),
            py::Expr::GeneratorExp(py::ExprGeneratorExp { elt, generators, range }) => (
                range,
                self.comprehension(ComprehensionKind::Generator, *elt, None, generators),
            ),
            py::Expr::Await(py::ExprAwait { value, range }) => (range, ExprKind::Await(self.boxed(*value))),
            py::Expr::Yield(py::ExprYield { value, range }) => {
                (range, ExprKind::Yield(value.map(|v| self.boxed(*v))))
            }
            py::Expr::YieldFrom(py::ExprYieldFrom { value, range }) => (range, ExprKind::YieldFrom(self.boxed(*value))),
            py::Expr::Compare(py::ExprCompare {
                left,
                ops,
                comparators,
                range,
            }) => (
                range,
                ExprKind::Compare {
                    left: self.boxed(*left),
                    ops: ops.into_iter().map(comparison).collect(),
                    comparators: self.exprs(comparators),
                },
            ),
            py::Expr::Call(py::ExprCall {
                func,
                args,
                keywords,
                range,
            }) => (
                range,
                ExprKind::Call {
                    func: self.boxed(*func),
                    args: self.exprs(args),
                    keywords: self.keywords(keywords),
                },
            ),
            py::Expr::FormattedValue(py::ExprFormattedValue { value, range, .. }) => {
                (range, ExprKind::FString(vec![self.expr(*value)]))
            }
            py::Expr::JoinedStr(py::ExprJoinedStr { values, range }) => {
                let parts = values
                    .into_iter()
                    .filter_map(|part| match part {
                        py::Expr::FormattedValue(py::ExprFormattedValue { value, .. }) => Some(self.expr(*value)),
                        _ => None,
                    })
                    .collect();
                (range, ExprKind::FString(parts))
            }
            py::Expr::Constant(py::ExprConstant { value, range, .. }) => (range, ExprKind::Constant(constant(&value))),
            py::Expr::Attribute(py::ExprAttribute { value, attr, range, .. }) => (
                range,
                ExprKind::Attribute {
                    value: self.boxed(*value),
                    attr: attr.as_str().to_string(),
                },
            ),
            py::Expr::Subscript(py::ExprSubscript { value, slice, range, .. }) => (
                range,
                ExprKind::Subscript {
                    value: self.boxed(*value),
                    index: self.boxed(*slice),
                },
            ),
            py::Expr::Starred(py::ExprStarred { value, range, .. }) => (range, ExprKind::Starred(self.boxed(*value))),
            py::Expr::Name(py::ExprName { id, range, .. }) => (
                range,
                ExprKind::Name {
                    id: self.fresh_id(),
                    name: id.as_str().to_string(),
                },
            ),
            py::Expr::List(py::ExprList { elts, range, .. }) => (range, ExprKind::List(self.exprs(elts))),
            py::Expr::Tuple(py::ExprTuple { elts, range, .. }) => (range, ExprKind::Tuple(self.exprs(elts))),
            py::Expr::Slice(py::ExprSlice {
                lower,
                upper,
                step,
                range,
            }) => (
                range,
                ExprKind::Slice {
                    lower: lower.map(|e| self.boxed(*e)),
                    upper: upper.map(|e| self.boxed(*e)),
                    step: step.map(|e| self.boxed(*e)),
                },
            ),
        };
        Expr {
            line: self.line_of(range),
            kind,
        }
    }
}

fn operator(op: py::Operator) -> BinOp {
    match op {
        py::Operator::Add => BinOp::Add,
        py::Operator::Sub => BinOp::Sub,
        py::Operator::Mult => BinOp::Mult,
        py::Operator::MatMult => BinOp::MatMult,
        py::Operator::Div => BinOp::Div,
        py::Operator::Mod => BinOp::Mod,
        py::Operator::Pow => BinOp::Pow,
        py::Operator::LShift => BinOp::LShift,
        py::Operator::RShift => BinOp::RShift,
        py::Operator::BitOr => BinOp::BitOr,
        py::Operator::BitXor => BinOp::BitXor,
        py::Operator::BitAnd => BinOp::BitAnd,
        py::Operator::FloorDiv => BinOp::FloorDiv,
    }
}

fn comparison(op: py::CmpOp) -> BinOp {
    match op {
        py::CmpOp::Eq => BinOp::Eq,
        py::CmpOp::NotEq => BinOp::NotEq,
        py::CmpOp::Lt => BinOp::Lt,
        py::CmpOp::LtE => BinOp::LtE,
        py::CmpOp::Gt => BinOp::Gt,
        py::CmpOp::GtE => BinOp::GtE,
        py::CmpOp::Is => BinOp::Is,
        py::CmpOp::IsNot => BinOp::IsNot,
        py::CmpOp::In => BinOp::In,
        py::CmpOp::NotIn => BinOp::NotIn,
    }
}

fn constant(value: &py::Constant) -> Constant {
    match value {
        py::Constant::None => Constant::None,
        py::Constant::Bool(_) => Constant::Bool,
        py::Constant::Str(_) => Constant::Str,
        py::Constant::Bytes(_) => Constant::Bytes,
        py::Constant::Int(_) => Constant::Int,
        py::Constant::Tuple(_) => Constant::Tuple,
        py::Constant::Float(_) => Constant::Float,
        py::Constant::Complex { .. } => Constant::Complex,
        py::Constant::Ellipsis => Constant::Ellipsis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_numbers() {
        let module = parse_module("x = 1\n\ny = 2\n", "m").unwrap();
        assert_eq!(module.body.len(), 2);
        assert_eq!(module.body[0].line, 1);
        assert_eq!(module.body[1].line, 3);
    }

    #[test]
    fn test_name_ids_are_unique() {
        let module = parse_module("x = y\nx = x\n", "m").unwrap();
        let mut ids = Vec::new();
        for stmt in &module.body {
            if let StmtKind::Assign { targets, value } = &stmt.kind {
                for e in targets.iter().chain(std::iter::once(value)) {
                    if let ExprKind::Name { id, .. } = &e.kind {
                        ids.push(*id);
                    }
                }
            }
        }
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(ids.len(), 4);
        assert_eq!(deduped.len(), 4);
    }

    #[test]
    fn test_compare_lowers_to_binops() {
        let module = parse_module("a < b <= c\n", "m").unwrap();
        let StmtKind::Expr(expr) = &module.body[0].kind else {
            panic!("expected expression statement");
        };
        match &expr.kind {
            ExprKind::Compare { ops, comparators, .. } => {
                assert_eq!(ops, &vec![BinOp::Lt, BinOp::LtE]);
                assert_eq!(comparators.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_import_binders() {
        let module = parse_module("import os.path\nimport numpy as np\nfrom a import b as c, d\n", "m").unwrap();
        let StmtKind::Import(aliases) = &module.body[0].kind else {
            panic!("expected import");
        };
        assert_eq!(aliases[0].binder.name, "os");
        assert_eq!(aliases[0].path, "os.path");
        assert!(!aliases[0].aliased);

        let StmtKind::Import(aliases) = &module.body[1].kind else {
            panic!("expected import");
        };
        assert_eq!(aliases[0].binder.name, "np");
        assert!(aliases[0].aliased);

        let StmtKind::ImportFrom { module: from, names, level } = &module.body[2].kind else {
            panic!("expected from-import");
        };
        assert_eq!(from.as_deref(), Some("a"));
        assert_eq!(*level, 0);
        assert_eq!(names[0].binder.name, "c");
        assert_eq!(names[0].path, "b");
        assert_eq!(names[1].binder.name, "d");
    }

    #[test]
    fn test_function_parameters() {
        let module = parse_module("def f(a, b=1, *args, c, **kw):\n    pass\n", "m").unwrap();
        let StmtKind::FunctionDef(def) = &module.body[0].kind else {
            panic!("expected def");
        };
        assert_eq!(def.name.name, "f");
        assert_eq!(def.params.positional.len(), 2);
        assert!(def.params.positional[1].default.is_some());
        assert_eq!(def.params.vararg.as_ref().map(|p| p.name.as_str()), Some("args"));
        assert_eq!(def.params.kwonly[0].name, "c");
        assert_eq!(def.params.kwarg.as_ref().map(|p| p.name.as_str()), Some("kw"));
    }

    #[test]
    fn test_parse_error() {
        let err = parse_module("def (:\n", "broken").unwrap_err();
        assert!(matches!(err, InferError::Parse { .. }));
    }
}

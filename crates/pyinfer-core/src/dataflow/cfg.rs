//! Control Flow Graph construction from the syntax tree

use crate::ast::{ClassDef, ExceptHandler, Expr, FunctionDef, Stmt, StmtKind, WithItem};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Unique identifier for a basic block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// Identifies one `for` loop so its iterator and target items can be paired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Normal,
    LoopHeader,
}

/// Something evaluated inside a block
#[derive(Debug, Clone, Copy)]
pub enum BlockItem<'a> {
    /// A simple statement (assignment, expression, import, raise, ...)
    Stmt(&'a Stmt),
    /// Condition of an `if` or `while`
    Test(&'a Expr),
    /// Iterator expression of a `for`, evaluated once before the loop
    ForIter { loop_id: LoopId, iter: &'a Expr },
    /// Loop target bound from the iterator at the start of each iteration
    ForTarget { loop_id: LoopId, target: &'a Expr },
    FunctionDef(&'a FunctionDef),
    ClassDef(&'a ClassDef),
    WithEnter(&'a WithItem),
    ExceptHandler(&'a ExceptHandler),
    Return { value: Option<&'a Expr> },
}

impl BlockItem<'_> {
    fn label(&self) -> &'static str {
        match self {
            BlockItem::Stmt(stmt) => match &stmt.kind {
                StmtKind::Assign { .. } => "assign",
                StmtKind::AugAssign { .. } => "augassign",
                StmtKind::AnnAssign { .. } => "annassign",
                StmtKind::Delete(_) => "delete",
                StmtKind::Raise { .. } => "raise",
                StmtKind::Assert { .. } => "assert",
                StmtKind::Import(_) | StmtKind::ImportFrom { .. } => "import",
                StmtKind::Global(_) => "global",
                StmtKind::Nonlocal(_) => "nonlocal",
                StmtKind::Expr(_) => "expr",
                _ => "stmt",
            },
            BlockItem::Test(_) => "test",
            BlockItem::ForIter { .. } => "for-iter",
            BlockItem::ForTarget { .. } => "for-target",
            BlockItem::FunctionDef(_) => "def",
            BlockItem::ClassDef(_) => "class",
            BlockItem::WithEnter(_) => "with",
            BlockItem::ExceptHandler(_) => "except",
            BlockItem::Return { .. } => "return",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Item<'a> {
    pub line: u32,
    pub kind: BlockItem<'a>,
}

/// A basic block in the CFG
#[derive(Debug, Clone)]
pub struct BasicBlock<'a> {
    pub items: Vec<Item<'a>>,
    /// Every successor, fall-through included
    pub exits: Vec<BlockId>,
    /// Fall-through successor
    pub next: Option<BlockId>,
    /// Ends in `return`, `raise`, `break` or `continue`
    pub definite_exit: bool,
    pub kind: BlockKind,
    pub line: u32,
}

impl BasicBlock<'_> {
    fn new(kind: BlockKind, line: u32) -> Self {
        Self {
            items: Vec::new(),
            exits: Vec::new(),
            next: None,
            definite_exit: false,
            kind,
            line,
        }
    }
}

/// Misplaced jump statements; recorded and skipped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CfgError {
    #[error("'break' outside loop")]
    BreakOutsideLoop { line: u32 },
    #[error("'continue' not properly in loop")]
    ContinueOutsideLoop { line: u32 },
    #[error("'return' outside function")]
    ReturnOutsideFunction { line: u32 },
}

impl CfgError {
    pub fn line(&self) -> u32 {
        match self {
            CfgError::BreakOutsideLoop { line }
            | CfgError::ContinueOutsideLoop { line }
            | CfgError::ReturnOutsideFunction { line } => *line,
        }
    }
}

/// Control Flow Graph of one body
#[derive(Debug)]
pub struct Cfg<'a> {
    pub blocks: Vec<BasicBlock<'a>>,
    pub entry: BlockId,
    /// Sentinel reached by `return` and by falling off the end
    pub exit: BlockId,
    pub errors: Vec<CfgError>,
    /// Control can reach the end of the body without a `return`
    pub falls_through: bool,
}

impl<'a> Cfg<'a> {
    pub fn module(body: &'a [Stmt]) -> Self {
        CfgBuilder::new(false).build(body.iter())
    }

    pub fn function(body: &'a [Stmt]) -> Self {
        CfgBuilder::new(true).build(body.iter())
    }

    /// Class bodies run with the constructor first, so attributes it assigns
    /// exist before the remaining members are analyzed
    pub fn class(body: &'a [Stmt]) -> Self {
        let ordered = body
            .iter()
            .filter(|s| is_constructor(s))
            .chain(body.iter().filter(|s| !is_constructor(s)));
        CfgBuilder::new(false).build(ordered)
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock<'a> {
        &self.blocks[id.0]
    }

    pub fn predecessors(&self) -> Vec<Vec<BlockId>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for (index, block) in self.blocks.iter().enumerate() {
            for exit in &block.exits {
                if !preds[exit.0].contains(&BlockId(index)) {
                    preds[exit.0].push(BlockId(index));
                }
            }
        }
        preds
    }

    /// Blocks reachable from the entry, in depth-first preorder
    pub fn reachable(&self) -> Vec<BlockId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![self.entry];
        while let Some(block) = stack.pop() {
            if !visited.insert(block) {
                continue;
            }
            order.push(block);
            for exit in self.block(block).exits.iter().rev() {
                if !visited.contains(exit) {
                    stack.push(*exit);
                }
            }
        }
        order
    }
}

fn is_constructor(stmt: &Stmt) -> bool {
    matches!(&stmt.kind, StmtKind::FunctionDef(def) if def.name.name == "__init__")
}

impl fmt::Display for Cfg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, block) in self.blocks.iter().enumerate() {
            let id = BlockId(index);
            let mut tags = Vec::new();
            if id == self.entry {
                tags.push("entry");
            }
            if id == self.exit {
                tags.push("exit");
            }
            if block.kind == BlockKind::LoopHeader {
                tags.push("loop");
            }
            if tags.is_empty() {
                writeln!(f, "block {index}:")?;
            } else {
                writeln!(f, "block {index} ({}):", tags.join(", "))?;
            }
            for item in &block.items {
                writeln!(f, "  {}: {}", item.line, item.kind.label())?;
            }
            let exits: Vec<String> = block.exits.iter().map(|b| b.0.to_string()).collect();
            writeln!(f, "  exits: [{}]", exits.join(", "))?;
        }
        Ok(())
    }
}

enum Frame {
    Loop { header: BlockId, after: BlockId },
    Try { handlers: Vec<BlockId> },
    Finally { entry: BlockId, pending: Vec<BlockId> },
}

#[derive(Clone, Copy)]
enum Jump {
    Break,
    Continue,
    Return,
}

/// Builder for constructing a CFG from one body
pub struct CfgBuilder<'a> {
    blocks: Vec<BasicBlock<'a>>,
    current: BlockId,
    exit: BlockId,
    frames: Vec<Frame>,
    errors: Vec<CfgError>,
    in_function: bool,
    next_loop: u32,
}

impl<'a> CfgBuilder<'a> {
    pub fn new(in_function: bool) -> Self {
        let blocks = vec![
            BasicBlock::new(BlockKind::Normal, 0),
            BasicBlock::new(BlockKind::Normal, 0),
        ];
        Self {
            blocks,
            current: BlockId(0),
            exit: BlockId(1),
            frames: Vec::new(),
            errors: Vec::new(),
            in_function,
            next_loop: 0,
        }
    }

    pub fn build(mut self, stmts: impl Iterator<Item = &'a Stmt>) -> Cfg<'a> {
        self.build_body(stmts);
        let tail = self.current;
        let falls_through = !self.blocks[tail.0].definite_exit && self.reaches(BlockId(0), tail);
        self.fall(tail, self.exit);
        let mut cfg = self.finish(BlockId(0));
        cfg.falls_through = falls_through;
        cfg
    }

    fn reaches(&self, from: BlockId, to: BlockId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(block) = stack.pop() {
            if block == to {
                return true;
            }
            if visited.insert(block) {
                stack.extend(self.blocks[block.0].exits.iter().copied());
            }
        }
        false
    }

    fn new_block(&mut self, kind: BlockKind, line: u32) -> BlockId {
        self.blocks.push(BasicBlock::new(kind, line));
        BlockId(self.blocks.len() - 1)
    }

    fn edge(&mut self, from: BlockId, to: BlockId) {
        let exits = &mut self.blocks[from.0].exits;
        if !exits.contains(&to) {
            exits.push(to);
        }
    }

    /// Fall-through edge, dropped when `from` already jumped away
    fn fall(&mut self, from: BlockId, to: BlockId) {
        if self.blocks[from.0].definite_exit {
            return;
        }
        self.edge(from, to);
        self.blocks[from.0].next = Some(to);
    }

    fn push_item(&mut self, line: u32, kind: BlockItem<'a>) {
        let block = &mut self.blocks[self.current.0];
        if block.items.is_empty() {
            block.line = line;
        }
        block.items.push(Item { line, kind });
    }

    /// Blocks an exception raised here may land in
    fn exception_targets(&self) -> Vec<BlockId> {
        let mut targets = Vec::new();
        for frame in self.frames.iter().rev() {
            match frame {
                Frame::Try { handlers } => targets.extend(handlers.iter().copied()),
                Frame::Finally { entry, .. } => {
                    targets.push(*entry);
                    break;
                }
                Frame::Loop { .. } => {}
            }
        }
        targets
    }

    /// Statements inside a try region get a block of their own with an edge
    /// to every handler
    fn push_protected(&mut self, line: u32, kind: BlockItem<'a>) {
        let targets = self.exception_targets();
        if targets.is_empty() {
            self.push_item(line, kind);
            return;
        }
        let block = self.new_block(BlockKind::Normal, line);
        let from = self.current;
        self.fall(from, block);
        self.current = block;
        self.push_item(line, kind);
        for target in targets {
            self.edge(block, target);
        }
    }

    /// Continue in a fresh block with no predecessors
    fn terminate(&mut self, line: u32) {
        self.blocks[self.current.0].definite_exit = true;
        self.current = self.new_block(BlockKind::Normal, line);
    }

    fn build_body(&mut self, stmts: impl Iterator<Item = &'a Stmt>) {
        for stmt in stmts {
            self.build_stmt(stmt);
        }
    }

    fn build_stmt(&mut self, stmt: &'a Stmt) {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::FunctionDef(def) => self.push_protected(line, BlockItem::FunctionDef(def)),
            StmtKind::ClassDef(def) => self.push_protected(line, BlockItem::ClassDef(def)),
            StmtKind::Return(value) => {
                if !self.in_function {
                    self.errors.push(CfgError::ReturnOutsideFunction { line });
                    return;
                }
                self.push_protected(line, BlockItem::Return { value: value.as_ref() });
                self.jump(Jump::Return, line);
            }
            StmtKind::Raise { .. } => {
                self.push_protected(line, BlockItem::Stmt(stmt));
                self.terminate(line);
            }
            StmtKind::Break => self.jump(Jump::Break, line),
            StmtKind::Continue => self.jump(Jump::Continue, line),
            StmtKind::Pass => {}
            StmtKind::If { test, body, orelse } => self.build_if(test, body, orelse, line),
            StmtKind::While { test, body, orelse } => self.build_while(test, body, orelse, line),
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => self.build_for(target, iter, body, orelse, line),
            StmtKind::With { items, body } => {
                for item in items {
                    self.push_protected(line, BlockItem::WithEnter(item));
                }
                self.build_body(body.iter());
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => self.build_try(body, handlers, orelse, finalbody, line),
            StmtKind::Delete(_)
            | StmtKind::Assign { .. }
            | StmtKind::AugAssign { .. }
            | StmtKind::AnnAssign { .. }
            | StmtKind::Assert { .. }
            | StmtKind::Import(_)
            | StmtKind::ImportFrom { .. }
            | StmtKind::Global(_)
            | StmtKind::Nonlocal(_)
            | StmtKind::Expr(_) => self.push_protected(line, BlockItem::Stmt(stmt)),
        }
    }

    /// Route a jump through every finally block between here and its target
    fn jump(&mut self, jump: Jump, line: u32) {
        let mut finally_frames = Vec::new();
        let mut target = None;
        for (index, frame) in self.frames.iter().enumerate().rev() {
            match (frame, jump) {
                (Frame::Finally { .. }, _) => finally_frames.push(index),
                (Frame::Loop { after, .. }, Jump::Break) => {
                    target = Some(*after);
                    break;
                }
                (Frame::Loop { header, .. }, Jump::Continue) => {
                    target = Some(*header);
                    break;
                }
                _ => {}
            }
        }
        let target = match (target, jump) {
            (Some(target), _) => target,
            (None, Jump::Return) => self.exit,
            (None, Jump::Break) => {
                self.errors.push(CfgError::BreakOutsideLoop { line });
                return;
            }
            (None, Jump::Continue) => {
                self.errors.push(CfgError::ContinueOutsideLoop { line });
                return;
            }
        };

        // innermost finally first, each one continuing into the next
        let mut hops: Vec<BlockId> = finally_frames
            .iter()
            .filter_map(|index| match &self.frames[*index] {
                Frame::Finally { entry, .. } => Some(*entry),
                _ => None,
            })
            .collect();
        hops.push(target);
        let from = self.current;
        self.edge(from, hops[0]);
        for (position, index) in finally_frames.iter().enumerate() {
            if let Frame::Finally { pending, .. } = &mut self.frames[*index] {
                let next = hops[position + 1];
                if !pending.contains(&next) {
                    pending.push(next);
                }
            }
        }
        self.terminate(line);
    }

    fn build_if(&mut self, test: &'a Expr, body: &'a [Stmt], orelse: &'a [Stmt], line: u32) {
        self.push_item(line, BlockItem::Test(test));
        let cond = self.current;
        let then_block = self.new_block(BlockKind::Normal, line);
        let after = self.new_block(BlockKind::Normal, line);
        let else_block = if orelse.is_empty() {
            after
        } else {
            self.new_block(BlockKind::Normal, line)
        };
        self.edge(cond, then_block);
        self.edge(cond, else_block);

        self.current = then_block;
        self.build_body(body.iter());
        self.fall(self.current, after);

        if !orelse.is_empty() {
            self.current = else_block;
            self.build_body(orelse.iter());
            self.fall(self.current, after);
        }
        self.current = after;
    }

    fn build_loop(&mut self, header: BlockId, body: &'a [Stmt], orelse: &'a [Stmt], body_block: BlockId, line: u32) {
        let after = self.new_block(BlockKind::Normal, line);
        let else_block = if orelse.is_empty() {
            after
        } else {
            self.new_block(BlockKind::Normal, line)
        };
        self.edge(header, body_block);
        self.edge(header, else_block);

        self.frames.push(Frame::Loop { header, after });
        self.current = body_block;
        self.build_body(body.iter());
        self.fall(self.current, header);
        self.frames.pop();

        if !orelse.is_empty() {
            self.current = else_block;
            self.build_body(orelse.iter());
            self.fall(self.current, after);
        }
        self.current = after;
    }

    fn build_while(&mut self, test: &'a Expr, body: &'a [Stmt], orelse: &'a [Stmt], line: u32) {
        let header = self.new_block(BlockKind::LoopHeader, line);
        self.fall(self.current, header);
        self.current = header;
        self.push_item(line, BlockItem::Test(test));
        let body_block = self.new_block(BlockKind::Normal, line);
        self.build_loop(header, body, orelse, body_block, line);
    }

    fn build_for(&mut self, target: &'a Expr, iter: &'a Expr, body: &'a [Stmt], orelse: &'a [Stmt], line: u32) {
        let loop_id = LoopId(self.next_loop);
        self.next_loop += 1;
        self.push_protected(line, BlockItem::ForIter { loop_id, iter });
        let header = self.new_block(BlockKind::LoopHeader, line);
        self.fall(self.current, header);
        let body_block = self.new_block(BlockKind::Normal, line);
        self.blocks[body_block.0].items.push(Item {
            line,
            kind: BlockItem::ForTarget { loop_id, target },
        });
        self.build_loop(header, body, orelse, body_block, line);
    }

    fn build_try(
        &mut self,
        body: &'a [Stmt],
        handlers: &'a [ExceptHandler],
        orelse: &'a [Stmt],
        finalbody: &'a [Stmt],
        line: u32,
    ) {
        let after = self.new_block(BlockKind::Normal, line);
        let final_entry = if finalbody.is_empty() {
            None
        } else {
            let entry = self.new_block(BlockKind::Normal, line);
            self.frames.push(Frame::Finally {
                entry,
                pending: Vec::new(),
            });
            Some(entry)
        };
        let handler_blocks: Vec<BlockId> = handlers
            .iter()
            .map(|h| self.new_block(BlockKind::Normal, h.line))
            .collect();
        self.frames.push(Frame::Try {
            handlers: handler_blocks.clone(),
        });
        // an exception may be raised before the first statement completes
        let start = self.current;
        for target in self.exception_targets() {
            self.edge(start, target);
        }
        self.build_body(body.iter());
        self.frames.pop();

        self.build_body(orelse.iter());
        let join = final_entry.unwrap_or(after);
        self.fall(self.current, join);

        for (handler, block) in handlers.iter().zip(handler_blocks) {
            self.current = block;
            self.push_item(handler.line, BlockItem::ExceptHandler(handler));
            self.build_body(handler.body.iter());
            self.fall(self.current, join);
        }

        if let Some(entry) = final_entry {
            let pending = match self.frames.pop() {
                Some(Frame::Finally { pending, .. }) => pending,
                _ => Vec::new(),
            };
            self.current = entry;
            self.build_body(finalbody.iter());
            let tail = self.current;
            if !self.blocks[tail.0].definite_exit {
                self.fall(tail, after);
                for target in pending {
                    self.edge(tail, target);
                }
            }
        }
        self.current = after;
    }

    /// Splice empty blocks onto their successor and renumber
    fn finish(self, entry: BlockId) -> Cfg<'a> {
        let count = self.blocks.len();
        let foldable = |index: usize| {
            let block = &self.blocks[index];
            index != self.exit.0
                && block.items.is_empty()
                && block.kind == BlockKind::Normal
                && block.exits.len() == 1
                && block.exits[0].0 != index
        };
        let resolve = |start: BlockId| {
            let mut current = start;
            let mut steps = 0;
            while foldable(current.0) && steps <= count {
                current = self.blocks[current.0].exits[0];
                steps += 1;
            }
            current
        };

        let mut renumber = vec![None; count];
        let mut kept = 0;
        for (index, slot) in renumber.iter_mut().enumerate() {
            if !foldable(index) {
                *slot = Some(BlockId(kept));
                kept += 1;
            }
        }
        let map = |id: BlockId| renumber[resolve(id).0];

        let mut blocks = Vec::with_capacity(kept);
        for (index, block) in self.blocks.iter().enumerate() {
            if renumber[index].is_none() {
                continue;
            }
            let mut exits = Vec::new();
            for exit in &block.exits {
                if let Some(mapped) = map(*exit) {
                    if !exits.contains(&mapped) {
                        exits.push(mapped);
                    }
                }
            }
            blocks.push(BasicBlock {
                items: block.items.clone(),
                exits,
                next: block.next.and_then(map),
                definite_exit: block.definite_exit,
                kind: block.kind,
                line: block.line,
            });
        }

        let entry = map(entry).unwrap_or(BlockId(0));
        let exit = renumber[self.exit.0].unwrap_or(BlockId(0));
        Cfg {
            blocks,
            entry,
            exit,
            errors: self.errors,
            falls_through: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast_bridge::parse_module;

    fn body(source: &str) -> Vec<Stmt> {
        parse_module(source, "test").unwrap().body
    }

    fn function_body(source: &str) -> Vec<Stmt> {
        match body(source).remove(0).kind {
            StmtKind::FunctionDef(def) => def.body,
            other => panic!("expected a function, got {other:?}"),
        }
    }

    #[test]
    fn test_cfg_straight_line() {
        let stmts = body("x = 1\ny = x\n");
        let cfg = Cfg::module(&stmts);
        assert!(cfg.errors.is_empty());
        assert_eq!(cfg.block(cfg.entry).items.len(), 2);
        assert_eq!(cfg.block(cfg.entry).exits, vec![cfg.exit]);
        assert!(cfg.falls_through);
    }

    #[test]
    fn test_cfg_if_statement() {
        let stmts = body("if c:\n    x = 1\nelse:\n    x = 2\ny = x\n");
        let cfg = Cfg::module(&stmts);
        let entry = cfg.block(cfg.entry);
        assert_eq!(entry.exits.len(), 2);
        let joins: Vec<BlockId> = entry.exits.iter().map(|b| cfg.block(*b).exits[0]).collect();
        assert_eq!(joins[0], joins[1]);
    }

    #[test]
    fn test_cfg_branch_with_return_skips_join() {
        let stmts = function_body("def f(c):\n    if c:\n        return 1\n    return 2\n");
        let cfg = Cfg::function(&stmts);
        let then_block = cfg.block(cfg.entry).exits[0];
        assert_eq!(cfg.block(then_block).exits, vec![cfg.exit]);
        assert!(!cfg.falls_through);
    }

    #[test]
    fn test_cfg_while_loop() {
        let stmts = body("x = 0\nwhile c:\n    x = x + 1\n");
        let cfg = Cfg::module(&stmts);
        let header = cfg.block(cfg.entry).exits[0];
        assert_eq!(cfg.block(header).kind, BlockKind::LoopHeader);
        let body_block = cfg.block(header).exits[0];
        assert_eq!(cfg.block(body_block).exits, vec![header]);
    }

    #[test]
    fn test_cfg_for_target_opens_body() {
        let stmts = body("for i in items:\n    print(i)\n");
        let cfg = Cfg::module(&stmts);
        assert!(matches!(cfg.block(cfg.entry).items[0].kind, BlockItem::ForIter { .. }));
        let header = cfg.block(cfg.entry).exits[0];
        let body_block = cfg.block(header).exits[0];
        assert!(matches!(cfg.block(body_block).items[0].kind, BlockItem::ForTarget { .. }));
    }

    #[test]
    fn test_cfg_break_continue() {
        let stmts = body("while a:\n    if b:\n        break\n    if c:\n        continue\n    x = 1\ny = 2\n");
        let cfg = Cfg::module(&stmts);
        assert!(cfg.errors.is_empty());
        let at_line = |line: u32| {
            BlockId(
                cfg.blocks
                    .iter()
                    .position(|block| block.items.iter().any(|item| item.line == line))
                    .unwrap(),
            )
        };
        let header = BlockId(cfg.blocks.iter().position(|b| b.kind == BlockKind::LoopHeader).unwrap());
        // empty break and continue blocks fold into their targets
        assert!(cfg.block(at_line(4)).exits.contains(&header));
        assert_eq!(cfg.block(at_line(6)).exits, vec![header]);
        assert!(cfg.block(at_line(2)).exits.contains(&at_line(7)));
        assert!(cfg.predecessors()[at_line(7).0].contains(&at_line(2)));
    }

    #[test]
    fn test_cfg_misplaced_jumps() {
        let stmts = body("break\ncontinue\nreturn 1\n");
        let cfg = Cfg::module(&stmts);
        assert_eq!(
            cfg.errors,
            vec![
                CfgError::BreakOutsideLoop { line: 1 },
                CfgError::ContinueOutsideLoop { line: 2 },
                CfgError::ReturnOutsideFunction { line: 3 },
            ]
        );
        assert_eq!(cfg.errors[0].to_string(), "'break' outside loop");
    }

    #[test]
    fn test_cfg_try_statements_reach_handler() {
        let stmts = body("try:\n    a = 1\n    b = 2\nexcept E:\n    c = 3\n");
        let cfg = Cfg::module(&stmts);
        let handler = (0..cfg.blocks.len())
            .map(BlockId)
            .find(|b| matches!(cfg.block(*b).items.first().map(|i| i.kind), Some(BlockItem::ExceptHandler(_))))
            .unwrap();
        let preds = cfg.predecessors();
        // the entry plus one block per protected statement
        assert_eq!(preds[handler.0].len(), 3);
    }

    #[test]
    fn test_cfg_return_through_finally() {
        let stmts = function_body("def f():\n    try:\n        return 1\n    finally:\n        x = 2\n    y = 3\n");
        let cfg = Cfg::function(&stmts);
        let finally_block = (0..cfg.blocks.len())
            .map(BlockId)
            .find(|b| cfg.block(*b).items.iter().any(|i| i.line == 5))
            .unwrap();
        assert!(cfg.block(finally_block).exits.contains(&cfg.exit));
        assert!(cfg.reachable().contains(&finally_block));
    }

    #[test]
    fn test_cfg_class_moves_init_first() {
        let stmts = body("class A:\n    def m(self): pass\n    def __init__(self): pass\n");
        let StmtKind::ClassDef(def) = &stmts[0].kind else {
            panic!("expected class");
        };
        let cfg = Cfg::class(&def.body);
        let first = cfg.block(cfg.entry).items[0];
        assert!(matches!(first.kind, BlockItem::FunctionDef(f) if f.name.name == "__init__"));
    }

    #[test]
    fn test_cfg_display() {
        let stmts = body("x = 1\n");
        let cfg = Cfg::module(&stmts);
        let text = cfg.to_string();
        assert!(text.contains("block 0 (entry):"));
        assert!(text.contains("1: assign"));
    }
}

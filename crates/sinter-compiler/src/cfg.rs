//! Control-flow graphs over function bodies.
//!
//! Both the non-void return-path check and the pointer cleanup validator run
//! on the same graph: basic blocks of statement references linked by
//! branch / loop / break / continue / return edges. Blocks borrow the AST;
//! nothing is copied.
//!
//! Loop conditions are not constant-folded, so `while (true)` still gets a
//! false exit edge; the return-path check is conservative about that.

use sinter_ast::{Block, Expr, Stmt, StmtKind};

/// Index of a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// Why an edge exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Fallthrough,
    BranchTrue,
    BranchFalse,
    LoopBack,
    Break,
    Continue,
    Return,
}

/// One element of a basic block.
///
/// Branch conditions appear as their own node so dataflow transfer functions
/// see the condition's reads exactly once, in the block that branches.
#[derive(Debug, Clone, Copy)]
pub enum CfgNode<'a> {
    Stmt(&'a Stmt),
    Cond(&'a Expr),
}

/// A basic block: straight-line nodes plus outgoing edges.
#[derive(Debug, Default)]
pub struct BasicBlock<'a> {
    pub nodes: Vec<CfgNode<'a>>,
    pub succs: Vec<(BlockId, EdgeKind)>,
}

/// The graph for one function body.
#[derive(Debug)]
pub struct ControlFlowGraph<'a> {
    pub blocks: Vec<BasicBlock<'a>>,
    pub entry: BlockId,
    pub exit: BlockId,
}

impl<'a> ControlFlowGraph<'a> {
    /// Build the graph for a function body.
    pub fn build(body: &'a Block) -> Self {
        let mut builder = Builder {
            blocks: vec![BasicBlock::default(), BasicBlock::default()],
            loop_stack: Vec::new(),
        };
        let entry = BlockId(0);
        let exit = BlockId(1);
        let end = builder.lower_stmts(&body.stmts, entry, exit);
        builder.edge(end, exit, EdgeKind::Fallthrough);
        ControlFlowGraph {
            blocks: builder.blocks,
            entry,
            exit,
        }
    }

    /// Predecessors of every block.
    pub fn preds(&self) -> Vec<Vec<BlockId>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for (i, block) in self.blocks.iter().enumerate() {
            for &(succ, _) in &block.succs {
                preds[succ.0].push(BlockId(i));
            }
        }
        preds
    }

    /// Which blocks are reachable from the entry.
    pub fn reachable(&self) -> Vec<bool> {
        let mut seen = vec![false; self.blocks.len()];
        let mut work = vec![self.entry];
        while let Some(block) = work.pop() {
            if seen[block.0] {
                continue;
            }
            seen[block.0] = true;
            for &(succ, _) in &self.blocks[block.0].succs {
                work.push(succ);
            }
        }
        seen
    }

    /// Whether some reachable path reaches the exit without a `return`.
    ///
    /// This is the non-void "missing return" condition.
    pub fn falls_off_end(&self) -> bool {
        let reachable = self.reachable();
        self.blocks.iter().enumerate().any(|(i, block)| {
            reachable[i]
                && block
                    .succs
                    .iter()
                    .any(|&(succ, kind)| succ == self.exit && kind != EdgeKind::Return)
        })
    }
}

// ============================================================================
// Builder
// ============================================================================

struct Builder<'a> {
    blocks: Vec<BasicBlock<'a>>,
    /// (continue target, break target)
    loop_stack: Vec<(BlockId, BlockId)>,
}

impl<'a> Builder<'a> {
    fn new_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlock::default());
        BlockId(self.blocks.len() - 1)
    }

    fn edge(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        self.blocks[from.0].succs.push((to, kind));
    }

    fn push_node(&mut self, block: BlockId, node: CfgNode<'a>) {
        self.blocks[block.0].nodes.push(node);
    }

    /// Lower a statement list into the graph, returning the block where
    /// control continues afterwards. Statements after a diverting statement
    /// land in a fresh predecessor-less block, which the reachability pass
    /// naturally ignores.
    fn lower_stmts(&mut self, stmts: &'a [Stmt], mut current: BlockId, exit: BlockId) -> BlockId {
        for stmt in stmts {
            current = self.lower_stmt(stmt, current, exit);
        }
        current
    }

    fn lower_stmt(&mut self, stmt: &'a Stmt, current: BlockId, exit: BlockId) -> BlockId {
        match &stmt.kind {
            StmtKind::VarDecl { .. }
            | StmtKind::Assign { .. }
            | StmtKind::Expr(_)
            | StmtKind::Print { .. } => {
                self.push_node(current, CfgNode::Stmt(stmt));
                current
            }
            StmtKind::Return(_) => {
                self.push_node(current, CfgNode::Stmt(stmt));
                self.edge(current, exit, EdgeKind::Return);
                self.new_block()
            }
            StmtKind::Break => {
                if let Some(&(_, break_target)) = self.loop_stack.last() {
                    self.edge(current, break_target, EdgeKind::Break);
                }
                self.new_block()
            }
            StmtKind::Continue => {
                if let Some(&(continue_target, _)) = self.loop_stack.last() {
                    self.edge(current, continue_target, EdgeKind::Continue);
                }
                self.new_block()
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.push_node(current, CfgNode::Cond(cond));
                let join = self.new_block();
                let then_start = self.new_block();
                self.edge(current, then_start, EdgeKind::BranchTrue);
                let then_end = self.lower_stmts(&then_block.stmts, then_start, exit);
                self.edge(then_end, join, EdgeKind::Fallthrough);
                match else_block {
                    Some(else_block) => {
                        let else_start = self.new_block();
                        self.edge(current, else_start, EdgeKind::BranchFalse);
                        let else_end = self.lower_stmts(&else_block.stmts, else_start, exit);
                        self.edge(else_end, join, EdgeKind::Fallthrough);
                    }
                    None => self.edge(current, join, EdgeKind::BranchFalse),
                }
                join
            }
            StmtKind::While { cond, body } => {
                let cond_block = self.new_block();
                self.edge(current, cond_block, EdgeKind::Fallthrough);
                self.push_node(cond_block, CfgNode::Cond(cond));
                let body_start = self.new_block();
                let after = self.new_block();
                self.edge(cond_block, body_start, EdgeKind::BranchTrue);
                self.edge(cond_block, after, EdgeKind::BranchFalse);
                self.loop_stack.push((cond_block, after));
                let body_end = self.lower_stmts(&body.stmts, body_start, exit);
                self.edge(body_end, cond_block, EdgeKind::LoopBack);
                self.loop_stack.pop();
                after
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let mut header_from = current;
                if let Some(init) = init {
                    header_from = self.lower_stmt(init, current, exit);
                }
                let cond_block = self.new_block();
                self.edge(header_from, cond_block, EdgeKind::Fallthrough);
                let body_start = self.new_block();
                let after = self.new_block();
                match cond {
                    Some(cond) => {
                        self.push_node(cond_block, CfgNode::Cond(cond));
                        self.edge(cond_block, body_start, EdgeKind::BranchTrue);
                        self.edge(cond_block, after, EdgeKind::BranchFalse);
                    }
                    None => self.edge(cond_block, body_start, EdgeKind::Fallthrough),
                }
                let update_block = self.new_block();
                self.loop_stack.push((update_block, after));
                let body_end = self.lower_stmts(&body.stmts, body_start, exit);
                self.edge(body_end, update_block, EdgeKind::Fallthrough);
                if let Some(update) = update {
                    self.push_node(update_block, CfgNode::Stmt(update));
                }
                self.edge(update_block, cond_block, EdgeKind::LoopBack);
                self.loop_stack.pop();
                after
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinter_ast::{BinaryOp, Expr, Stmt, StmtKind};
    use sinter_core::Span;

    fn span() -> Span {
        Span::default()
    }

    fn ret(value: Option<Expr>) -> Stmt {
        Stmt::new(StmtKind::Return(value), span())
    }

    #[test]
    fn straight_line_falls_through() {
        let body = Block::new(
            vec![Stmt::new(StmtKind::Expr(Expr::int(1, span())), span())],
            span(),
        );
        let cfg = ControlFlowGraph::build(&body);
        assert!(cfg.falls_off_end());
    }

    #[test]
    fn trailing_return_covers_all_paths() {
        let body = Block::new(vec![ret(Some(Expr::int(1, span())))], span());
        let cfg = ControlFlowGraph::build(&body);
        assert!(!cfg.falls_off_end());
    }

    #[test]
    fn if_without_else_leaks_a_path() {
        let body = Block::new(
            vec![Stmt::new(
                StmtKind::If {
                    cond: Expr::boolean(true, span()),
                    then_block: Block::new(vec![ret(Some(Expr::int(1, span())))], span()),
                    else_block: None,
                },
                span(),
            )],
            span(),
        );
        let cfg = ControlFlowGraph::build(&body);
        assert!(cfg.falls_off_end());
    }

    #[test]
    fn if_else_both_returning_covers_all_paths() {
        let body = Block::new(
            vec![Stmt::new(
                StmtKind::If {
                    cond: Expr::boolean(true, span()),
                    then_block: Block::new(vec![ret(Some(Expr::int(1, span())))], span()),
                    else_block: Some(Block::new(vec![ret(Some(Expr::int(2, span())))], span())),
                },
                span(),
            )],
            span(),
        );
        let cfg = ControlFlowGraph::build(&body);
        assert!(!cfg.falls_off_end());
    }

    #[test]
    fn code_after_return_is_unreachable() {
        let body = Block::new(
            vec![
                ret(Some(Expr::int(1, span()))),
                Stmt::new(StmtKind::Expr(Expr::int(2, span())), span()),
            ],
            span(),
        );
        let cfg = ControlFlowGraph::build(&body);
        // The trailing expression falls through to exit, but from a dead block.
        assert!(!cfg.falls_off_end());
    }

    #[test]
    fn while_loop_shape() {
        let body = Block::new(
            vec![
                Stmt::new(
                    StmtKind::While {
                        cond: Expr::binary(
                            BinaryOp::Lt,
                            Expr::int(0, span()),
                            Expr::int(10, span()),
                            span(),
                        ),
                        body: Block::new(vec![Stmt::new(StmtKind::Break, span())], span()),
                    },
                    span(),
                ),
                ret(None),
            ],
            span(),
        );
        let cfg = ControlFlowGraph::build(&body);
        assert!(!cfg.falls_off_end());
        // Loop-back edge exists.
        let has_loopback = cfg
            .blocks
            .iter()
            .any(|b| b.succs.iter().any(|&(_, k)| k == EdgeKind::LoopBack));
        assert!(has_loopback);
    }
}

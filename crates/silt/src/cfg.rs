//! The control-flow graph produced by lowering: an arena of shape-restricted
//! basic blocks addressed by [`BlockId`].
//!
//! Blocks reference their successors by id, so a graph can hold cycles; the
//! generator only ever returns graphs whose cycles are confined to
//! [`Block::Loop`] bodies, and `check::wellformedness` verifies exactly that.

use crate::ast::{Expr, Stmt};

/// Index of a block within its owning [`Cfg`].
///
/// Ids are only meaningful relative to one graph; a nested loop body is its
/// own graph with its own ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u32);

impl BlockId {
    pub fn new(index: usize) -> BlockId {
        BlockId(index as u32)
    }
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// A basic block. The shape restricts the successor relation.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// No successor; the unique exit of a well-formed graph.
    Terminal { stmt: Stmt },
    /// One unconditional successor.
    Normal { stmt: Stmt, succ: BlockId },
    /// Two mutually exclusive successors: `then_succ` under `cond`,
    /// `else_succ` under the implicit negation.
    Conditional {
        stmt: Stmt,
        cond: Expr,
        then_succ: BlockId,
        else_succ: BlockId,
    },
    /// A structured loop: `body` is a nested sub-graph entered while `cond`
    /// holds, `succ` the post-loop continuation.
    Loop {
        body: Cfg,
        cond: Expr,
        invariants: Vec<Expr>,
        succ: BlockId,
    },
}

impl Block {
    /// The straight-line statement of the block, if it carries one
    /// (loop blocks carry a sub-graph instead).
    pub fn stmt(&self) -> Option<&Stmt> {
        match self {
            Block::Terminal { stmt }
            | Block::Normal { stmt, .. }
            | Block::Conditional { stmt, .. } => Some(stmt),
            Block::Loop { .. } => None,
        }
    }

    /// Successors in edge order; a conditional block yields `[then, else]`.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Block::Terminal { .. } => Vec::new(),
            Block::Normal { succ, .. } | Block::Loop { succ, .. } => vec![*succ],
            Block::Conditional {
                then_succ,
                else_succ,
                ..
            } => vec![*then_succ, *else_succ],
        }
    }
}

/// An immutable control-flow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Cfg {
    blocks: Vec<Block>,
    entry: BlockId,
}

impl Cfg {
    /// Assemble a graph from blocks and an entry id. The generator is the
    /// usual producer; hand-assembled graphs are useful for exercising the
    /// well-formedness predicates.
    pub fn new(blocks: Vec<Block>, entry: BlockId) -> Cfg {
        debug_assert!(entry.index() < blocks.len());
        Cfg { blocks, entry }
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }
    pub fn entry_block(&self) -> &Block {
        &self[self.entry]
    }
    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }
    pub fn len(&self) -> usize {
        self.blocks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
    /// All blocks in allocation order (a breadth-first order from the entry,
    /// as materialization produces them).
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId::new(i), b))
    }
}

impl std::ops::Index<BlockId> for Cfg {
    type Output = Block;
    fn index(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }
}

impl Cfg {
    fn fmt_indented(&self, f: &mut std::fmt::Formatter<'_>, indent: usize) -> std::fmt::Result {
        let pad = "  ".repeat(indent);
        for (id, block) in self.blocks() {
            match block {
                Block::Terminal { stmt } => writeln!(f, "{pad}{id}: {stmt}")?,
                Block::Normal { stmt, succ } => writeln!(f, "{pad}{id}: {stmt} -> {succ}")?,
                Block::Conditional {
                    stmt,
                    cond,
                    then_succ,
                    else_succ,
                } => writeln!(
                    f,
                    "{pad}{id}: {stmt} if {cond} -> {then_succ}, {else_succ}"
                )?,
                Block::Loop {
                    body, cond, succ, ..
                } => {
                    writeln!(f, "{pad}{id}: loop {cond} -> {succ}")?;
                    body.fmt_indented(f, indent + 1)?;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Cfg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Name, Type};

    #[test]
    fn successor_order_is_then_else() {
        let cond = Expr::var("c", Type::Bool);
        let block = Block::Conditional {
            stmt: Stmt::skip(),
            cond,
            then_succ: BlockId::new(1),
            else_succ: BlockId::new(2),
        };
        assert_eq!(block.successors(), vec![BlockId::new(1), BlockId::new(2)]);
    }

    #[test]
    fn display_lists_blocks_in_order() {
        let x = Name::new("x");
        let cfg = Cfg::new(
            vec![
                Block::Normal {
                    stmt: Stmt::assign(&x, &Expr::num(1)),
                    succ: BlockId::new(1),
                },
                Block::Terminal { stmt: Stmt::skip() },
            ],
            BlockId::new(0),
        );
        assert_eq!(cfg.to_string(), "b0: x := 1 -> b1\nb1: skip\n");
    }
}

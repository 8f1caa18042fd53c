//! Lowering from structured statements to a [`Cfg`].
//!
//! Three phases:
//!   1. *Linearize*: flatten the statement tree into extended statements
//!      (regular statements plus synthetic jumps and loop markers) and a
//!      label→index map. Every position a label binds to is a leader.
//!   2. *Build*: partition the linear form at leaders into a temporary
//!      mutable graph, deferring edges whose target block does not exist yet.
//!   3. *Materialize*: convert the temporary graph into the immutable
//!      [`Cfg`], allocating final blocks breadth-first before wiring their
//!      successor ids.

use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;
use thiserror::Error;

use crate::ast::{Expr, Ident, Stmt, StmtKind};
use crate::cfg::{Block, BlockId, Cfg};
use crate::Span;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LowerError {
    #[error("goto targets unknown label `{label}`")]
    UnknownLabel { label: Ident },
    #[error("goto target `{label}` crosses a loop boundary")]
    NonLocalJump { label: Ident },
    #[error("block with {edges} outgoing edges has no materializable shape")]
    BlockShape { edges: usize },
    #[error("two-way block must branch on a condition and its negation")]
    BranchPair,
}

/// Lower a structured statement to a control-flow graph.
///
/// Construction never inspects the internals of atomic statements and never
/// fails on semantically ill-formed programs (a backward `goto` produces a
/// cyclic graph that `check::wellformedness` rejects); errors are reserved
/// for jumps that cannot be wired at all.
pub fn to_cfg(stmt: &Stmt) -> Result<Cfg, LowerError> {
    let lin = linearize(stmt);
    tracing::trace!(
        nodes = lin.nodes.len(),
        labels = lin.labels.len(),
        "linearized statement"
    );
    let tmp = build_blocks(&lin, 0, lin.nodes.len())?;
    materialize(&tmp)
}

// ---------------------------------------------------------------------------
// Phase 1: linearization
// ---------------------------------------------------------------------------

/// A statement of the linearized form.
#[derive(Debug, Clone)]
enum ExtStmt {
    /// An atomic statement, opaque to control flow.
    Regular(Stmt),
    /// Unconditional transfer to a label.
    Jump(Ident),
    /// Two-way transfer: `then_lbl` when `cond` holds, `else_lbl` otherwise.
    CondJump {
        then_lbl: Ident,
        else_lbl: Ident,
        cond: Expr,
    },
    /// Loop scaffold; the body follows inline up to `after_lbl`.
    Loop {
        after_lbl: Ident,
        cond: Expr,
        invariants: Vec<Expr>,
    },
    /// No semantics; keeps every construct at least one node wide so that
    /// "the index of the next node" is always addressable.
    Empty,
}

/// Synthesizes labels unique within one lowering run. The `$$` prefix keeps
/// them disjoint from user labels, which cannot contain `$`.
#[derive(Default)]
struct LabelGen {
    next: u64,
}

impl LabelGen {
    fn fresh(&mut self, role: &str) -> Ident {
        let n = self.next;
        self.next += 1;
        Ident::new(format!("$${role}_{n}"))
    }
}

struct Linearized {
    nodes: Vec<ExtStmt>,
    labels: IndexMap<Ident, usize>,
    /// `leaders[i]` iff some label binds to position `i`.
    leaders: Vec<bool>,
}

#[derive(Default)]
struct Linearizer {
    nodes: Vec<ExtStmt>,
    labels: IndexMap<Ident, usize>,
    labelgen: LabelGen,
}

impl Linearizer {
    /// Bind `label` to the position the next emitted node will occupy.
    fn bind(&mut self, label: Ident) {
        let at = self.nodes.len();
        if let Some(old) = self.labels.insert(label.clone(), at) {
            tracing::debug!(%label, old, new = at, "label bound twice; last binding wins");
        }
    }

    fn stmt(&mut self, s: &Stmt) {
        match &s.kind {
            StmtKind::Seqn(stmts) => {
                self.nodes.push(ExtStmt::Empty);
                for s in stmts {
                    self.stmt(s);
                }
            }
            StmtKind::If { cond, then, els } => {
                let then_lbl = self.labelgen.fresh("then");
                let else_lbl = self.labelgen.fresh("else");
                let after_lbl = self.labelgen.fresh("after");
                self.nodes.push(ExtStmt::CondJump {
                    then_lbl: then_lbl.clone(),
                    else_lbl: else_lbl.clone(),
                    cond: cond.clone(),
                });
                self.bind(then_lbl);
                self.stmt(then);
                self.nodes.push(ExtStmt::Jump(after_lbl.clone()));
                self.bind(else_lbl);
                self.stmt(els);
                self.bind(after_lbl);
            }
            StmtKind::While {
                cond,
                invariants,
                body,
            } => {
                let after_lbl = self.labelgen.fresh("endloop");
                self.nodes.push(ExtStmt::Loop {
                    after_lbl: after_lbl.clone(),
                    cond: cond.clone(),
                    invariants: invariants.clone(),
                });
                self.stmt(body);
                // A trailing branch binds its join label to the body's end
                // position. Give that position a node of its own before the
                // after-label, so the join stays inside the body range and
                // becomes the body's terminal instead of escaping to the
                // post-loop block.
                if self.labels.values().any(|&at| at == self.nodes.len()) {
                    let end_lbl = self.labelgen.fresh("endbody");
                    self.bind(end_lbl);
                    self.nodes.push(ExtStmt::Empty);
                }
                self.bind(after_lbl);
            }
            StmtKind::Label(name) => {
                self.bind(name.ident.clone());
                self.nodes.push(ExtStmt::Empty);
            }
            StmtKind::Goto(name) => {
                self.nodes.push(ExtStmt::Jump(name.ident.clone()));
            }
            _ => {
                debug_assert!(s.kind.is_atomic());
                self.nodes.push(ExtStmt::Regular(s.clone()));
            }
        }
    }
}

fn linearize(stmt: &Stmt) -> Linearized {
    let mut lin = Linearizer::default();
    lin.stmt(stmt);
    // Sentinel, so labels bound past the last construct stay addressable.
    lin.nodes.push(ExtStmt::Empty);

    let mut leaders = vec![false; lin.nodes.len()];
    for &at in lin.labels.values() {
        leaders[at] = true;
    }
    Linearized {
        nodes: lin.nodes,
        labels: lin.labels,
        leaders,
    }
}

// ---------------------------------------------------------------------------
// Phase 2: temporary graph construction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TmpId(usize);

#[derive(Debug)]
enum TmpBlock {
    Stmts {
        stmts: Vec<Stmt>,
        edges: Vec<TmpEdge>,
    },
    Loop {
        cond: Expr,
        invariants: Vec<Expr>,
        body: TmpGraph,
        edges: Vec<TmpEdge>,
    },
}

impl TmpBlock {
    fn edges(&self) -> &[TmpEdge] {
        match self {
            TmpBlock::Stmts { edges, .. } | TmpBlock::Loop { edges, .. } => edges,
        }
    }
    fn edges_mut(&mut self) -> &mut Vec<TmpEdge> {
        match self {
            TmpBlock::Stmts { edges, .. } | TmpBlock::Loop { edges, .. } => edges,
        }
    }
}

#[derive(Debug)]
struct TmpEdge {
    target: TmpId,
    branch: Option<Branch>,
}

/// A conditional edge: taken when `cond` holds, or, if `negated`, when it
/// does not.
#[derive(Debug, Clone)]
struct Branch {
    cond: Expr,
    negated: bool,
}

#[derive(Debug)]
struct TmpGraph {
    blocks: Vec<TmpBlock>,
    entry: TmpId,
}

/// An edge recorded before its target block exists. `target` is the node
/// index the label resolved to; the block opened at that leader receives the
/// edge once the linear pass is done.
struct PendingEdge {
    from: TmpId,
    target: usize,
    label: Ident,
    branch: Option<Branch>,
}

struct BlockBuilder<'a> {
    lin: &'a Linearized,
    blocks: Vec<TmpBlock>,
    cur: TmpId,
    pending: Vec<PendingEdge>,
    node_to_block: HashMap<usize, TmpId>,
}

fn build_blocks(lin: &Linearized, lo: usize, hi: usize) -> Result<TmpGraph, LowerError> {
    let mut builder = BlockBuilder {
        lin,
        blocks: Vec::new(),
        cur: TmpId(0),
        pending: Vec::new(),
        node_to_block: HashMap::new(),
    };
    let entry = builder.new_block();
    builder.cur = entry;
    builder.run(lo, hi)?;
    Ok(TmpGraph {
        blocks: builder.blocks,
        entry,
    })
}

impl BlockBuilder<'_> {
    fn new_block(&mut self) -> TmpId {
        let id = TmpId(self.blocks.len());
        self.blocks.push(TmpBlock::Stmts {
            stmts: Vec::new(),
            edges: Vec::new(),
        });
        id
    }

    /// A block is fresh while nothing has been appended to it; a fresh `cur`
    /// can still become the block of the leader under the cursor.
    fn is_fresh(&self, id: TmpId) -> bool {
        matches!(
            &self.blocks[id.0],
            TmpBlock::Stmts { stmts, edges } if stmts.is_empty() && edges.is_empty()
        )
    }

    fn add_edge(&mut self, from: TmpId, to: TmpId, branch: Option<Branch>) {
        self.blocks[from.0]
            .edges_mut()
            .push(TmpEdge { target: to, branch });
    }

    fn resolve_label(&self, label: &Ident) -> Result<usize, LowerError> {
        self.lin
            .labels
            .get(label)
            .copied()
            .ok_or_else(|| LowerError::UnknownLabel {
                label: label.clone(),
            })
    }

    fn defer_edge(&mut self, label: &Ident, branch: Option<Branch>) -> Result<(), LowerError> {
        let target = self.resolve_label(label)?;
        self.pending.push(PendingEdge {
            from: self.cur,
            target,
            label: label.clone(),
            branch,
        });
        Ok(())
    }

    fn run(&mut self, lo: usize, hi: usize) -> Result<(), LowerError> {
        let mut i = lo;
        while i < hi {
            if self.lin.leaders[i] {
                let block = if self.is_fresh(self.cur) {
                    self.cur
                } else {
                    let new = self.new_block();
                    self.add_edge(self.cur, new, None);
                    self.cur = new;
                    new
                };
                self.node_to_block.insert(i, block);
            }
            match &self.lin.nodes[i] {
                ExtStmt::Regular(s) => match &mut self.blocks[self.cur.0] {
                    TmpBlock::Stmts { stmts, .. } => stmts.push(s.clone()),
                    TmpBlock::Loop { .. } => unreachable!("cursor never rests on a loop block"),
                },
                ExtStmt::Jump(label) => {
                    self.defer_edge(label, None)?;
                    self.cur = self.new_block();
                }
                ExtStmt::CondJump {
                    then_lbl,
                    else_lbl,
                    cond,
                } => {
                    self.defer_edge(
                        then_lbl,
                        Some(Branch {
                            cond: cond.clone(),
                            negated: false,
                        }),
                    )?;
                    self.defer_edge(
                        else_lbl,
                        Some(Branch {
                            cond: cond.clone(),
                            negated: true,
                        }),
                    )?;
                    self.cur = self.new_block();
                }
                ExtStmt::Loop {
                    after_lbl,
                    cond,
                    invariants,
                } => {
                    let after = self.resolve_label(after_lbl)?;
                    debug_assert!(i < after && after <= hi, "loop body must lie in range");
                    let body = build_blocks(self.lin, i + 1, after)?;
                    let header = TmpBlock::Loop {
                        cond: cond.clone(),
                        invariants: invariants.clone(),
                        body,
                        edges: Vec::new(),
                    };
                    // An empty cursor becomes the loop itself, so a loop at
                    // the start of its block needs no empty pre-header; any
                    // label bound here enters the loop head directly.
                    let loop_id = if self.is_fresh(self.cur) {
                        self.blocks[self.cur.0] = header;
                        self.cur
                    } else {
                        let id = TmpId(self.blocks.len());
                        self.blocks.push(header);
                        self.add_edge(self.cur, id, None);
                        id
                    };
                    let post = self.new_block();
                    self.add_edge(loop_id, post, None);
                    self.cur = post;
                    // Resume at the after-label; its leader claims `post`.
                    i = after;
                    continue;
                }
                ExtStmt::Empty => {}
            }
            i += 1;
        }
        self.resolve_pending()
    }

    fn resolve_pending(&mut self) -> Result<(), LowerError> {
        for PendingEdge {
            from,
            target,
            label,
            branch,
        } in std::mem::take(&mut self.pending)
        {
            let to = self
                .node_to_block
                .get(&target)
                .copied()
                .ok_or(LowerError::NonLocalJump { label })?;
            self.blocks[from.0]
                .edges_mut()
                .push(TmpEdge { target: to, branch });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Final phase: materialization
// ---------------------------------------------------------------------------

fn materialize(tmp: &TmpGraph) -> Result<Cfg, LowerError> {
    // Allocate final ids breadth-first from the entry. Unreachable temporary
    // blocks (left behind by jump rewiring) get no id and are dropped.
    let mut order = Vec::new();
    let mut alloc: HashMap<TmpId, BlockId> = HashMap::new();
    let mut queue = VecDeque::from([tmp.entry]);
    while let Some(id) = queue.pop_front() {
        if alloc.contains_key(&id) {
            continue;
        }
        alloc.insert(id, BlockId::new(order.len()));
        order.push(id);
        for edge in tmp.blocks[id.0].edges() {
            queue.push_back(edge.target);
        }
    }

    // Wire: every successor of a reachable block is reachable, so the
    // allocation map is total for the edges seen here.
    let mut blocks = Vec::with_capacity(order.len());
    for &id in &order {
        blocks.push(materialize_block(&tmp.blocks[id.0], &alloc)?);
    }
    Ok(Cfg::new(blocks, BlockId::new(0)))
}

fn materialize_block(
    tmp: &TmpBlock,
    alloc: &HashMap<TmpId, BlockId>,
) -> Result<Block, LowerError> {
    match tmp {
        TmpBlock::Loop {
            cond,
            invariants,
            body,
            edges,
        } => match edges.as_slice() {
            [out] if out.branch.is_none() => Ok(Block::Loop {
                body: materialize(body)?,
                cond: cond.clone(),
                invariants: invariants.clone(),
                succ: alloc[&out.target],
            }),
            _ => Err(LowerError::BlockShape {
                edges: edges.len(),
            }),
        },
        TmpBlock::Stmts { stmts, edges } => {
            let stmt = match stmts.as_slice() {
                [stmt] => stmt.clone(),
                _ => Stmt::seqn(stmts.clone()).with_span(Span::default()),
            };
            match edges.as_slice() {
                [] => Ok(Block::Terminal { stmt }),
                [out] if out.branch.is_none() => Ok(Block::Normal {
                    stmt,
                    succ: alloc[&out.target],
                }),
                [then_edge, else_edge] => {
                    match (&then_edge.branch, &else_edge.branch) {
                        (Some(t), Some(e)) if !t.negated && e.negated && t.cond == e.cond => {
                            Ok(Block::Conditional {
                                stmt,
                                cond: t.cond.clone(),
                                then_succ: alloc[&then_edge.target],
                                else_succ: alloc[&else_edge.target],
                            })
                        }
                        _ => Err(LowerError::BranchPair),
                    }
                }
                _ => Err(LowerError::BlockShape {
                    edges: edges.len(),
                }),
            }
        }
    }
}

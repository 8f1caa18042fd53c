//! Pure consistency predicates.
//!
//! Everything here is read-only and total: malformed input yields `false`
//! (or a structured reason from [`wellformedness`]), never a panic. The
//! identifier predicates exist in two forms: a convenience form using the
//! crate defaults, and a `_with` form taking the reserved words and the
//! identifier regex a surface parser supplies.

use std::collections::VecDeque;
use std::hash::Hash;

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::ast::Type;
use crate::cfg::{Block, BlockId, Cfg};

/// Default identifier shape. A leading letter or underscore keeps user names
/// disjoint from the `$$`-prefixed labels the lowering synthesizes.
static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_$']*$").expect("the identifier regex parses"));

/// Words the default surface syntax claims for itself.
pub const RESERVED_WORDS: &[&str] = &[
    "Bool", "Int", "Ref", "else", "exhale", "exists", "false", "fold", "forall", "goto", "if",
    "inhale", "invariant", "label", "method", "result", "true", "unfold", "var", "while",
];

pub fn valid_identifier(name: &str) -> bool {
    valid_identifier_with(&IDENTIFIER, name)
}

pub fn valid_identifier_with(identifier: &Regex, name: &str) -> bool {
    identifier.is_match(name)
}

pub fn valid_user_defined_identifier(name: &str) -> bool {
    valid_user_defined_identifier_with(&IDENTIFIER, RESERVED_WORDS, name)
}

pub fn valid_user_defined_identifier_with(
    identifier: &Regex,
    reserved: &[&str],
    name: &str,
) -> bool {
    valid_identifier_with(identifier, name) && !reserved.contains(&name)
}

pub fn same_length<A, B>(a: &[A], b: &[B]) -> bool {
    a.len() == b.len()
}

pub fn no_duplicates<I>(items: I) -> bool
where
    I: IntoIterator,
    I::Item: Eq + Hash,
{
    items.into_iter().all_unique()
}

/// Element-wise assignability; `false` when the lengths differ.
pub fn are_assignable(targets: &[Type], sources: &[Type]) -> bool {
    same_length(targets, sources)
        && targets
            .iter()
            .zip(sources)
            .all(|(t, s)| t.is_assignable_from(s))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WellformednessError {
    #[error("the graph has no blocks")]
    Empty,
    #[error("expected exactly one terminal block, found {count}")]
    TerminalCount { count: usize },
    #[error("block {at} references a block outside the graph")]
    DanglingReference { at: BlockId },
    #[error("block {at} is unreachable from the entry")]
    Unreachable { at: BlockId },
    #[error("block {at} lies on a cycle outside any loop body")]
    Cyclic { at: BlockId },
    #[error("conditional block {at} has identical successors")]
    IdenticalBranches { at: BlockId },
    #[error("condition of block {at} is not Boolean")]
    NonBooleanCondition { at: BlockId },
    #[error("in the body of loop {at}: {source}")]
    InLoopBody {
        at: BlockId,
        #[source]
        source: Box<WellformednessError>,
    },
}

pub fn is_wellformed_cfg(cfg: &Cfg) -> bool {
    wellformedness(cfg).is_ok()
}

/// Check the graph invariants, reporting the first violation:
/// exactly one terminal, no dangling or unreachable blocks, acyclicity with
/// loop bodies treated as atomic, distinct Boolean-guarded branches, and
/// recursively well-formed loop bodies.
pub fn wellformedness(cfg: &Cfg) -> Result<(), WellformednessError> {
    if cfg.is_empty() {
        return Err(WellformednessError::Empty);
    }
    for (id, block) in cfg.blocks() {
        for succ in block.successors() {
            if cfg.get(succ).is_none() {
                return Err(WellformednessError::DanglingReference { at: id });
            }
        }
    }
    check_reachability(cfg)?;

    let terminals = cfg
        .blocks()
        .filter(|(_, b)| matches!(b, Block::Terminal { .. }))
        .count();
    if terminals != 1 {
        return Err(WellformednessError::TerminalCount { count: terminals });
    }

    for (id, block) in cfg.blocks() {
        match block {
            Block::Conditional {
                cond,
                then_succ,
                else_succ,
                ..
            } => {
                if then_succ == else_succ {
                    return Err(WellformednessError::IdenticalBranches { at: id });
                }
                if cond.ty != Type::Bool {
                    return Err(WellformednessError::NonBooleanCondition { at: id });
                }
            }
            Block::Loop { cond, .. } if cond.ty != Type::Bool => {
                return Err(WellformednessError::NonBooleanCondition { at: id });
            }
            _ => {}
        }
    }

    let mut state = vec![Visit::New; cfg.len()];
    if let Some(at) = find_cycle(cfg, cfg.entry(), &mut state) {
        return Err(WellformednessError::Cyclic { at });
    }

    for (id, block) in cfg.blocks() {
        if let Block::Loop { body, .. } = block {
            wellformedness(body).map_err(|source| WellformednessError::InLoopBody {
                at: id,
                source: Box::new(source),
            })?;
        }
    }
    Ok(())
}

fn check_reachability(cfg: &Cfg) -> Result<(), WellformednessError> {
    let mut seen = vec![false; cfg.len()];
    let mut queue = VecDeque::from([cfg.entry()]);
    seen[cfg.entry().index()] = true;
    while let Some(id) = queue.pop_front() {
        for succ in cfg[id].successors() {
            if !seen[succ.index()] {
                seen[succ.index()] = true;
                queue.push_back(succ);
            }
        }
    }
    match seen.iter().position(|reached| !reached) {
        Some(at) => Err(WellformednessError::Unreachable {
            at: BlockId::new(at),
        }),
        None => Ok(()),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    New,
    Open,
    Done,
}

/// Depth-first search for a cycle among successor edges. Loop bodies are
/// opaque here; their back-edges are by construction not part of this graph.
fn find_cycle(cfg: &Cfg, id: BlockId, state: &mut Vec<Visit>) -> Option<BlockId> {
    match state[id.index()] {
        Visit::Open => return Some(id),
        Visit::Done => return None,
        Visit::New => {}
    }
    state[id.index()] = Visit::Open;
    for succ in cfg[id].successors() {
        if let Some(at) = find_cycle(cfg, succ, state) {
            return Some(at);
        }
    }
    state[id.index()] = Visit::Done;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Name, Stmt};

    #[test]
    fn identifier_validity() {
        assert!(valid_identifier("x"));
        assert!(valid_identifier("_tmp'0"));
        assert!(valid_identifier("while"));
        assert!(!valid_identifier("$$then_0"));
        assert!(!valid_identifier("0x"));
        assert!(!valid_identifier(""));
    }

    #[test]
    fn user_defined_identifiers_reject_reserved_words() {
        assert!(valid_user_defined_identifier("x"));
        assert!(!valid_user_defined_identifier("while"));
        let upper = Regex::new(r"^[A-Z]+$").unwrap();
        assert!(valid_user_defined_identifier_with(&upper, &["WHILE"], "FOO"));
        assert!(!valid_user_defined_identifier_with(&upper, &["WHILE"], "WHILE"));
        assert!(!valid_user_defined_identifier_with(&upper, &[], "foo"));
    }

    #[test]
    fn sequence_predicates() {
        assert!(same_length(&[1, 2], &["a", "b"]));
        assert!(!same_length(&[1], &["a", "b"]));
        assert!(no_duplicates(["a", "b", "c"]));
        assert!(!no_duplicates(["a", "b", "a"]));
        assert!(no_duplicates(Vec::<&str>::new()));
    }

    #[test]
    fn assignability_is_elementwise() {
        assert!(are_assignable(&[Type::Int, Type::Bool], &[Type::Int, Type::Bool]));
        assert!(!are_assignable(&[Type::Int], &[Type::Bool]));
        assert!(!are_assignable(&[Type::Int, Type::Int], &[Type::Int]));
        // Poisoned types never cascade.
        assert!(are_assignable(&[Type::Error], &[Type::Bool]));
        assert!(are_assignable(&[Type::Int], &[Type::Unresolved]));
    }

    fn terminal() -> Block {
        Block::Terminal { stmt: Stmt::skip() }
    }

    fn cfg(blocks: Vec<Block>) -> Cfg {
        Cfg::new(blocks, BlockId::new(0))
    }

    #[test]
    fn single_terminal_is_wellformed() {
        assert_eq!(wellformedness(&cfg(vec![terminal()])), Ok(()));
    }

    #[test]
    fn two_terminals_are_rejected() {
        let g = cfg(vec![
            Block::Conditional {
                stmt: Stmt::skip(),
                cond: Expr::bool(true),
                then_succ: BlockId::new(1),
                else_succ: BlockId::new(2),
            },
            terminal(),
            terminal(),
        ]);
        assert_eq!(
            wellformedness(&g),
            Err(WellformednessError::TerminalCount { count: 2 })
        );
    }

    #[test]
    fn self_loop_is_cyclic() {
        let g = cfg(vec![Block::Normal {
            stmt: Stmt::skip(),
            succ: BlockId::new(0),
        }]);
        assert!(matches!(
            wellformedness(&g),
            Err(WellformednessError::TerminalCount { count: 0 })
        ));
        // With a terminal present the cycle itself is reported.
        let g = cfg(vec![
            Block::Conditional {
                stmt: Stmt::skip(),
                cond: Expr::bool(true),
                then_succ: BlockId::new(0),
                else_succ: BlockId::new(1),
            },
            terminal(),
        ]);
        assert_eq!(
            wellformedness(&g),
            Err(WellformednessError::Cyclic { at: BlockId::new(0) })
        );
    }

    #[test]
    fn identical_branches_are_rejected() {
        let g = cfg(vec![
            Block::Conditional {
                stmt: Stmt::skip(),
                cond: Expr::bool(true),
                then_succ: BlockId::new(1),
                else_succ: BlockId::new(1),
            },
            terminal(),
        ]);
        assert_eq!(
            wellformedness(&g),
            Err(WellformednessError::IdenticalBranches { at: BlockId::new(0) })
        );
    }

    #[test]
    fn non_boolean_condition_is_rejected() {
        let g = cfg(vec![
            Block::Conditional {
                stmt: Stmt::skip(),
                cond: Expr::num(1),
                then_succ: BlockId::new(1),
                else_succ: BlockId::new(2),
            },
            terminal(),
            Block::Normal {
                stmt: Stmt::skip(),
                succ: BlockId::new(1),
            },
        ]);
        assert_eq!(
            wellformedness(&g),
            Err(WellformednessError::NonBooleanCondition { at: BlockId::new(0) })
        );
    }

    #[test]
    fn unreachable_and_dangling_blocks_are_rejected() {
        let g = cfg(vec![terminal(), terminal()]);
        assert_eq!(
            wellformedness(&g),
            Err(WellformednessError::Unreachable { at: BlockId::new(1) })
        );
        let g = cfg(vec![Block::Normal {
            stmt: Stmt::skip(),
            succ: BlockId::new(7),
        }]);
        assert_eq!(
            wellformedness(&g),
            Err(WellformednessError::DanglingReference { at: BlockId::new(0) })
        );
    }

    #[test]
    fn loop_body_violations_are_attributed() {
        let bad_body = cfg(vec![Block::Normal {
            stmt: Stmt::assign(&Name::new("x"), &Expr::num(1)),
            succ: BlockId::new(0),
        }]);
        let g = cfg(vec![
            Block::Loop {
                body: bad_body,
                cond: Expr::bool(true),
                invariants: Vec::new(),
                succ: BlockId::new(1),
            },
            terminal(),
        ]);
        assert_eq!(
            wellformedness(&g),
            Err(WellformednessError::InLoopBody {
                at: BlockId::new(0),
                source: Box::new(WellformednessError::TerminalCount { count: 0 }),
            })
        );
    }
}

//! Generic rewriting and querying over tree-shaped nodes.
//!
//! A node type opts in through [`Rewritable`]: an ordered list of children
//! of the same type, and reconstruction from a same-length replacement list.
//! On top of that capability sit four rewriters:
//!
//!   - [`Strategy`]: a partial rule `Fn(&N) -> Option<N>`; `None` means the
//!     rule does not apply and the node is kept (the engine never fails on a
//!     non-matching node).
//!   - [`StrategyC`]: a rule with a caller-typed context threaded along the
//!     path from the root. Siblings never see each other's context.
//!   - [`StrategyA`]: a rule that can inspect its [`Ancestors`]: the parent
//!     chain and the positional siblings.
//!   - [`Query`]: a read-only fold with a neutral element and an
//!     accumulator; nothing is rebuilt.
//!
//! All per-run state lives on the call stack, so distinct trees can be
//! rewritten from distinct threads; a single strategy value is not meant to
//! be shared across concurrent `execute` calls.

use itertools::Itertools;

use crate::ast::{Expr, ExprKind, Stmt, StmtKind};

/// Capability the engine needs from a tree node.
pub trait Rewritable: Sized + Clone + PartialEq {
    /// The ordered child nodes.
    fn children(&self) -> Vec<Self>;
    /// Rebuild this node from replacement children. Callers pass exactly as
    /// many nodes as [`children`](Rewritable::children) returned.
    fn with_children(&self, children: Vec<Self>) -> Self;
}

/// Order in which a rule is applied relative to the descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Traversal {
    /// Apply at the node, then descend into the result.
    #[default]
    TopDown,
    /// Descend first, then apply at the rebuilt node.
    BottomUp,
    /// Bottom-up, re-applying at each rebuilt node until it is stable.
    Innermost,
}

type Rule<N> = Box<dyn Fn(&N) -> Option<N>>;
type RecurseFilter<N> = Box<dyn Fn(&N) -> Vec<bool>>;

enum StrategyKind<N> {
    /// Node-level rules; the first that matches wins.
    Rules(Vec<Rule<N>>),
    /// Sequential: the second strategy runs on the first one's output.
    Then(Box<Strategy<N>>, Box<Strategy<N>>),
    /// The second strategy runs only if the first changed the tree.
    ThenIfChanged(Box<Strategy<N>>, Box<Strategy<N>>),
    /// Reapply until the tree stabilizes.
    Repeat(Box<Strategy<N>>),
}

/// A configurable rewriter around a partial rewrite rule.
pub struct Strategy<N> {
    kind: StrategyKind<N>,
    traversal: Traversal,
    recurse: Option<RecurseFilter<N>>,
}

impl<N: Rewritable + 'static> Strategy<N> {
    pub fn new(rule: impl Fn(&N) -> Option<N> + 'static) -> Strategy<N> {
        Strategy {
            kind: StrategyKind::Rules(vec![Box::new(rule)]),
            traversal: Traversal::default(),
            recurse: None,
        }
    }

    pub fn with_traversal(mut self, traversal: Traversal) -> Strategy<N> {
        self.traversal = traversal;
        self
    }

    /// Select which children to descend into; unselected children are kept
    /// verbatim. The returned mask must be as long as the child list.
    pub fn with_recurse_filter(mut self, filter: impl Fn(&N) -> Vec<bool> + 'static) -> Strategy<N> {
        self.recurse = Some(Box::new(filter));
        self
    }

    /// Sequential composition: `other` runs on this strategy's output.
    pub fn then(self, other: Strategy<N>) -> Strategy<N> {
        Strategy {
            kind: StrategyKind::Then(Box::new(self), Box::new(other)),
            traversal: Traversal::default(),
            recurse: None,
        }
    }

    /// Layered composition: `other` runs only when this strategy changed the
    /// tree.
    pub fn then_if_changed(self, other: Strategy<N>) -> Strategy<N> {
        Strategy {
            kind: StrategyKind::ThenIfChanged(Box::new(self), Box::new(other)),
            traversal: Traversal::default(),
            recurse: None,
        }
    }

    /// Reapply this strategy until the tree stabilizes.
    pub fn repeat(self) -> Strategy<N> {
        Strategy {
            kind: StrategyKind::Repeat(Box::new(self)),
            traversal: Traversal::default(),
            recurse: None,
        }
    }

    pub fn execute(&self, node: &N) -> N {
        match &self.kind {
            StrategyKind::Rules(rules) => self.traverse(rules, node).0,
            StrategyKind::Then(first, second) => second.execute(&first.execute(node)),
            StrategyKind::ThenIfChanged(first, second) => {
                let mid = first.execute(node);
                if mid != *node {
                    second.execute(&mid)
                } else {
                    mid
                }
            }
            StrategyKind::Repeat(inner) => {
                let mut node = node.clone();
                loop {
                    let next = inner.execute(&node);
                    if next == node {
                        return node;
                    }
                    node = next;
                }
            }
        }
    }

    fn traverse(&self, rules: &[Rule<N>], node: &N) -> (N, bool) {
        match self.traversal {
            Traversal::TopDown => self.top_down(rules, node),
            Traversal::BottomUp => self.bottom_up(rules, node),
            Traversal::Innermost => self.innermost(rules, node),
        }
    }

    fn apply(&self, rules: &[Rule<N>], node: &N) -> Option<N> {
        rules.iter().find_map(|rule| rule(node))
    }

    fn rewrite_children(
        &self,
        rules: &[Rule<N>],
        node: &N,
        rec: fn(&Self, &[Rule<N>], &N) -> (N, bool),
    ) -> (N, bool) {
        let mut children = node.children();
        if children.is_empty() {
            return (node.clone(), false);
        }
        let mask = self.recurse.as_ref().map(|filter| filter(node));
        if let Some(mask) = &mask {
            debug_assert_eq!(mask.len(), children.len(), "recursion mask length");
        }
        let mut changed = false;
        for (i, child) in children.iter_mut().enumerate() {
            if mask
                .as_ref()
                .is_some_and(|m| !m.get(i).copied().unwrap_or(true))
            {
                continue;
            }
            let (new_child, child_changed) = rec(self, rules, child);
            if child_changed {
                *child = new_child;
                changed = true;
            }
        }
        if changed {
            (node.with_children(children), true)
        } else {
            (node.clone(), false)
        }
    }

    fn top_down(&self, rules: &[Rule<N>], node: &N) -> (N, bool) {
        let (node, fired) = match self.apply(rules, node) {
            Some(next) => (next, true),
            None => (node.clone(), false),
        };
        let (node, child_changed) = self.rewrite_children(rules, &node, Self::top_down);
        (node, fired || child_changed)
    }

    fn bottom_up(&self, rules: &[Rule<N>], node: &N) -> (N, bool) {
        let (node, child_changed) = self.rewrite_children(rules, node, Self::bottom_up);
        match self.apply(rules, &node) {
            Some(next) => (next, true),
            None => (node, child_changed),
        }
    }

    fn innermost(&self, rules: &[Rule<N>], node: &N) -> (N, bool) {
        let mut node = node.clone();
        let mut changed = false;
        loop {
            let (rebuilt, child_changed) = self.rewrite_children(rules, &node, Self::innermost);
            changed |= child_changed;
            match self.apply(rules, &rebuilt) {
                Some(next) if next != rebuilt => {
                    node = next;
                    changed = true;
                }
                _ => return (rebuilt, changed),
            }
        }
    }
}

/// Choice: at each node the left strategy's rules are tried first; the
/// first rule that matches wins and the tree is traversed once.
///
/// Both operands must be plain rule strategies (not `then`/`repeat`
/// compositions); composing anything else is a programming error.
impl<N: Rewritable + 'static> std::ops::Add for Strategy<N> {
    type Output = Strategy<N>;

    fn add(self, rhs: Strategy<N>) -> Strategy<N> {
        match (self.kind, rhs.kind) {
            (StrategyKind::Rules(mut left), StrategyKind::Rules(right)) => {
                left.extend(right);
                Strategy {
                    kind: StrategyKind::Rules(left),
                    traversal: self.traversal,
                    recurse: self.recurse,
                }
            }
            _ => panic!("`+` combines node-level rules; use `then` for whole-tree composition"),
        }
    }
}

/// A rewriter whose rule sees a context threaded along the path from the
/// root. Descending into a child first derives the child's context with the
/// update function; on ascent the enclosing context is restored, so parallel
/// siblings are isolated from each other.
pub struct StrategyC<N, C> {
    rule: Box<dyn Fn(&N, &C) -> Option<N>>,
    update: Box<dyn Fn(&N, &C) -> C>,
    initial: C,
    traversal: Traversal,
    recurse: Option<RecurseFilter<N>>,
}

impl<N: Rewritable + 'static, C: Clone + 'static> StrategyC<N, C> {
    /// `initial` is the context the root node is rewritten under.
    pub fn new(initial: C, rule: impl Fn(&N, &C) -> Option<N> + 'static) -> StrategyC<N, C> {
        StrategyC {
            rule: Box::new(rule),
            update: Box::new(|_, ctx| ctx.clone()),
            initial,
            traversal: Traversal::default(),
            recurse: None,
        }
    }

    /// Derive the context a child is visited under from the child node and
    /// the enclosing context. Defaults to passing the context unchanged.
    pub fn with_context_update(
        mut self,
        update: impl Fn(&N, &C) -> C + 'static,
    ) -> StrategyC<N, C> {
        self.update = Box::new(update);
        self
    }

    pub fn with_default_context(mut self, initial: C) -> StrategyC<N, C> {
        self.initial = initial;
        self
    }

    pub fn with_traversal(mut self, traversal: Traversal) -> StrategyC<N, C> {
        self.traversal = traversal;
        self
    }

    pub fn with_recurse_filter(
        mut self,
        filter: impl Fn(&N) -> Vec<bool> + 'static,
    ) -> StrategyC<N, C> {
        self.recurse = Some(Box::new(filter));
        self
    }

    pub fn execute(&self, node: &N) -> N {
        self.apply_at(node, &self.initial).0
    }

    fn apply_at(&self, node: &N, ctx: &C) -> (N, bool) {
        match self.traversal {
            Traversal::TopDown => {
                let (node, fired) = match (self.rule)(node, ctx) {
                    Some(next) => (next, true),
                    None => (node.clone(), false),
                };
                let (node, child_changed) = self.rewrite_children(&node, ctx);
                (node, fired || child_changed)
            }
            Traversal::BottomUp => {
                let (node, child_changed) = self.rewrite_children(node, ctx);
                match (self.rule)(&node, ctx) {
                    Some(next) => (next, true),
                    None => (node, child_changed),
                }
            }
            Traversal::Innermost => {
                let mut node = node.clone();
                let mut changed = false;
                loop {
                    let (rebuilt, child_changed) = self.rewrite_children(&node, ctx);
                    changed |= child_changed;
                    match (self.rule)(&rebuilt, ctx) {
                        Some(next) if next != rebuilt => {
                            node = next;
                            changed = true;
                        }
                        _ => return (rebuilt, changed),
                    }
                }
            }
        }
    }

    fn rewrite_children(&self, node: &N, ctx: &C) -> (N, bool) {
        let mut children = node.children();
        if children.is_empty() {
            return (node.clone(), false);
        }
        let mask = self.recurse.as_ref().map(|filter| filter(node));
        if let Some(mask) = &mask {
            debug_assert_eq!(mask.len(), children.len(), "recursion mask length");
        }
        let mut changed = false;
        for (i, child) in children.iter_mut().enumerate() {
            if mask
                .as_ref()
                .is_some_and(|m| !m.get(i).copied().unwrap_or(true))
            {
                continue;
            }
            let child_ctx = (self.update)(child, ctx);
            let (new_child, child_changed) = self.apply_at(child, &child_ctx);
            if child_changed {
                *child = new_child;
                changed = true;
            }
        }
        if changed {
            (node.with_children(children), true)
        } else {
            (node.clone(), false)
        }
    }
}

/// The dynamic surroundings of a node during an ancestor-aware rewrite.
#[derive(Debug)]
pub struct Ancestors<'a, N> {
    /// Enclosing nodes, root first.
    pub ancestors: &'a [N],
    /// The parent's child list; siblings already visited appear in their
    /// rewritten form, the rest as written.
    pub siblings: &'a [N],
    /// Index of the current node within `siblings`.
    pub position: usize,
}

impl<'a, N> Ancestors<'a, N> {
    pub fn parent(&self) -> Option<&'a N> {
        self.ancestors.last()
    }
    pub fn previous(&self) -> Option<&'a N> {
        self.position.checked_sub(1).map(|i| &self.siblings[i])
    }
    pub fn next(&self) -> Option<&'a N> {
        self.siblings.get(self.position + 1)
    }
    /// The siblings after the current node.
    pub fn successors(&self) -> &'a [N] {
        &self.siblings[self.position + 1..]
    }
}

/// A rewriter whose rule sees the ancestor chain and positional siblings.
pub struct StrategyA<N> {
    rule: Box<dyn Fn(&N, &Ancestors<'_, N>) -> Option<N>>,
    traversal: Traversal,
    recurse: Option<RecurseFilter<N>>,
}

impl<N: Rewritable + 'static> StrategyA<N> {
    pub fn new(rule: impl Fn(&N, &Ancestors<'_, N>) -> Option<N> + 'static) -> StrategyA<N> {
        StrategyA {
            rule: Box::new(rule),
            traversal: Traversal::default(),
            recurse: None,
        }
    }

    pub fn with_traversal(mut self, traversal: Traversal) -> StrategyA<N> {
        self.traversal = traversal;
        self
    }

    pub fn with_recurse_filter(
        mut self,
        filter: impl Fn(&N) -> Vec<bool> + 'static,
    ) -> StrategyA<N> {
        self.recurse = Some(Box::new(filter));
        self
    }

    pub fn execute(&self, node: &N) -> N {
        let siblings = std::slice::from_ref(node);
        let mut spine = Vec::new();
        self.apply_at(node, &mut spine, siblings, 0).0
    }

    fn apply_at(&self, node: &N, spine: &mut Vec<N>, siblings: &[N], position: usize) -> (N, bool) {
        match self.traversal {
            Traversal::TopDown => {
                let info = Ancestors {
                    ancestors: spine,
                    siblings,
                    position,
                };
                let (node, fired) = match (self.rule)(node, &info) {
                    Some(next) => (next, true),
                    None => (node.clone(), false),
                };
                let (node, child_changed) = self.rewrite_children(&node, spine);
                (node, fired || child_changed)
            }
            Traversal::BottomUp | Traversal::Innermost => {
                let mut node = node.clone();
                let mut changed = false;
                loop {
                    let (rebuilt, child_changed) = self.rewrite_children(&node, spine);
                    changed |= child_changed;
                    let info = Ancestors {
                        ancestors: spine,
                        siblings,
                        position,
                    };
                    match (self.rule)(&rebuilt, &info) {
                        Some(next) if next != rebuilt => {
                            if self.traversal == Traversal::BottomUp {
                                return (next, true);
                            }
                            node = next;
                            changed = true;
                        }
                        _ => return (rebuilt, changed),
                    }
                }
            }
        }
    }

    fn rewrite_children(&self, node: &N, spine: &mut Vec<N>) -> (N, bool) {
        let mut children = node.children();
        if children.is_empty() {
            return (node.clone(), false);
        }
        let mask = self.recurse.as_ref().map(|filter| filter(node));
        if let Some(mask) = &mask {
            debug_assert_eq!(mask.len(), children.len(), "recursion mask length");
        }
        spine.push(node.clone());
        let mut changed = false;
        for i in 0..children.len() {
            if mask
                .as_ref()
                .is_some_and(|m| !m.get(i).copied().unwrap_or(true))
            {
                continue;
            }
            let child = children[i].clone();
            let (new_child, child_changed) = self.apply_at(&child, spine, &children, i);
            if child_changed {
                children[i] = new_child;
                changed = true;
            }
        }
        spine.pop();
        if changed {
            (node.with_children(children), true)
        } else {
            (node.clone(), false)
        }
    }
}

/// A read-only fold over a tree. Per node, the partial query yields a value
/// (or the neutral element where undefined); the node's value and its
/// children's results are combined with the accumulator.
pub struct Query<N, T> {
    query: Box<dyn Fn(&N) -> Option<T>>,
    neutral: T,
    accumulate: Box<dyn Fn(Vec<T>) -> T>,
    recurse: Option<RecurseFilter<N>>,
}

impl<N: Rewritable + 'static, T: Clone + 'static> Query<N, T> {
    pub fn new(
        neutral: T,
        accumulate: impl Fn(Vec<T>) -> T + 'static,
        query: impl Fn(&N) -> Option<T> + 'static,
    ) -> Query<N, T> {
        Query {
            query: Box::new(query),
            neutral,
            accumulate: Box::new(accumulate),
            recurse: None,
        }
    }

    pub fn with_neutral(mut self, neutral: T) -> Query<N, T> {
        self.neutral = neutral;
        self
    }

    pub fn with_accumulate(mut self, accumulate: impl Fn(Vec<T>) -> T + 'static) -> Query<N, T> {
        self.accumulate = Box::new(accumulate);
        self
    }

    pub fn with_recurse_filter(
        mut self,
        filter: impl Fn(&N) -> Vec<bool> + 'static,
    ) -> Query<N, T> {
        self.recurse = Some(Box::new(filter));
        self
    }

    pub fn execute(&self, node: &N) -> T {
        let own = (self.query)(node).unwrap_or_else(|| self.neutral.clone());
        let children = node.children();
        let mask = self.recurse.as_ref().map(|filter| filter(node));
        if let Some(mask) = &mask {
            debug_assert_eq!(mask.len(), children.len(), "recursion mask length");
        }
        let mut results = vec![own];
        for (i, child) in children.iter().enumerate() {
            if mask
                .as_ref()
                .is_some_and(|m| !m.get(i).copied().unwrap_or(true))
            {
                continue;
            }
            results.push(self.execute(child));
        }
        (self.accumulate)(results)
    }
}

// ---------------------------------------------------------------------------
// Rewritable instances for the AST
// ---------------------------------------------------------------------------

impl Rewritable for Expr {
    fn children(&self) -> Vec<Expr> {
        match &self.kind {
            ExprKind::Bool(_) | ExprKind::Num(_) | ExprKind::Ident(_) | ExprKind::Error => {
                Vec::new()
            }
            ExprKind::Prefix(_, e) => vec![(**e).clone()],
            ExprKind::Infix(l, _, r) => vec![(**l).clone(), (**r).clone()],
            ExprKind::Ite(c, t, o) => vec![(**c).clone(), (**t).clone(), (**o).clone()],
            ExprKind::Quantifier(_, _, body) => vec![(**body).clone()],
            ExprKind::FunctionCall { args, .. } => args.clone(),
        }
    }

    fn with_children(&self, children: Vec<Expr>) -> Expr {
        debug_assert_eq!(children.len(), self.children().len(), "child count");
        let kind = match &self.kind {
            ExprKind::Bool(_) | ExprKind::Num(_) | ExprKind::Ident(_) | ExprKind::Error => {
                self.kind.clone()
            }
            ExprKind::Prefix(op, _) => {
                let (e,) = children.into_iter().collect_tuple().expect("one child");
                ExprKind::Prefix(*op, Box::new(e))
            }
            ExprKind::Infix(_, op, _) => {
                let (l, r) = children.into_iter().collect_tuple().expect("two children");
                ExprKind::Infix(Box::new(l), *op, Box::new(r))
            }
            ExprKind::Ite(..) => {
                let (c, t, o) = children.into_iter().collect_tuple().expect("three children");
                ExprKind::Ite(Box::new(c), Box::new(t), Box::new(o))
            }
            ExprKind::Quantifier(q, vars, _) => {
                let (body,) = children.into_iter().collect_tuple().expect("one child");
                ExprKind::Quantifier(*q, vars.clone(), Box::new(body))
            }
            ExprKind::FunctionCall { fun_name, .. } => ExprKind::FunctionCall {
                fun_name: fun_name.clone(),
                args: children,
            },
        };
        Expr {
            span: self.span,
            kind,
            ty: self.ty.clone(),
            info: self.info.clone(),
        }
    }
}

impl Rewritable for Stmt {
    fn children(&self) -> Vec<Stmt> {
        match &self.kind {
            StmtKind::Seqn(stmts) => stmts.clone(),
            StmtKind::If { then, els, .. } => vec![(**then).clone(), (**els).clone()],
            StmtKind::While { body, .. } => vec![(**body).clone()],
            _ => Vec::new(),
        }
    }

    fn with_children(&self, children: Vec<Stmt>) -> Stmt {
        debug_assert_eq!(children.len(), self.children().len(), "child count");
        let kind = match &self.kind {
            StmtKind::Seqn(_) => StmtKind::Seqn(children),
            StmtKind::If { cond, .. } => {
                let (then, els) = children.into_iter().collect_tuple().expect("two children");
                StmtKind::If {
                    cond: cond.clone(),
                    then: Box::new(then),
                    els: Box::new(els),
                }
            }
            StmtKind::While {
                cond, invariants, ..
            } => {
                let (body,) = children.into_iter().collect_tuple().expect("one child");
                StmtKind::While {
                    cond: cond.clone(),
                    invariants: invariants.clone(),
                    body: Box::new(body),
                }
            }
            other => other.clone(),
        };
        Stmt {
            span: self.span,
            kind,
            info: self.info.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Name, Op, PrefixOp, Type};
    use num_bigint::BigInt;

    fn num(n: i64) -> Expr {
        Expr::num(n)
    }

    /// `a ==> b`  becomes  `!a || b`.
    fn unfold_implication() -> Strategy<Expr> {
        Strategy::new(|e: &Expr| match &e.kind {
            ExprKind::Infix(l, Op::Imp, r) => Some((!(**l).clone()).or(r)),
            _ => None,
        })
    }

    /// Constant folding for addition.
    fn fold_add() -> Strategy<Expr> {
        Strategy::new(|e: &Expr| match &e.kind {
            ExprKind::Infix(l, Op::Add, r) => match (&l.kind, &r.kind) {
                (ExprKind::Num(a), ExprKind::Num(b)) => Some(Expr::num(a + b)),
                _ => None,
            },
            _ => None,
        })
    }

    #[test]
    fn implication_unfolds_the_same_either_way() {
        let a = Expr::var("a", Type::Bool);
        let b = Expr::var("b", Type::Bool);
        let c = Expr::var("c", Type::Bool);
        let input = a.imp(&b.imp(&c));
        let expected = (!a.clone()).or(&(!b.clone()).or(&c));

        let top_down = unfold_implication().with_traversal(Traversal::TopDown);
        assert_eq!(top_down.execute(&input), expected);
        let bottom_up = unfold_implication().with_traversal(Traversal::BottomUp);
        assert_eq!(bottom_up.execute(&input), expected);
    }

    #[test]
    fn bottom_up_folds_in_one_traversal() {
        let input = (num(1) + num(2)) + num(3);
        let folded = fold_add().with_traversal(Traversal::BottomUp).execute(&input);
        assert_eq!(folded, num(6));
    }

    #[test]
    fn top_down_needs_repeat_to_normalize() {
        let input = (num(1) + num(2)) + num(3);
        let single = fold_add().with_traversal(Traversal::TopDown).execute(&input);
        assert_eq!(single, num(3) + num(3));
        let normalized = fold_add()
            .with_traversal(Traversal::TopDown)
            .repeat()
            .execute(&input);
        assert_eq!(normalized, num(6));
    }

    #[test]
    fn innermost_normalizes_without_repeat() {
        let input = (num(1) + num(2)) + (num(3) + num(4));
        let folded = fold_add()
            .with_traversal(Traversal::Innermost)
            .execute(&input);
        assert_eq!(folded, num(10));
    }

    #[test]
    fn identity_rules_terminate_and_preserve_the_tree() {
        let input = (num(1) + num(2)).lt(&num(4));
        for traversal in [Traversal::TopDown, Traversal::BottomUp, Traversal::Innermost] {
            let identity = Strategy::new(|e: &Expr| Some(e.clone())).with_traversal(traversal);
            assert_eq!(identity.execute(&input), input);
            assert_eq!(identity.repeat().execute(&input), input);
        }
    }

    #[test]
    fn choice_prefers_the_left_rule() {
        let left = Strategy::new(|e: &Expr| match &e.kind {
            ExprKind::Num(n) if *n == BigInt::from(1) => Some(num(10)),
            _ => None,
        });
        let right = Strategy::new(|e: &Expr| match &e.kind {
            ExprKind::Num(n) if *n == BigInt::from(1) => Some(num(20)),
            ExprKind::Num(n) if *n == BigInt::from(2) => Some(num(30)),
            _ => None,
        });
        let either = left + right;
        assert_eq!(either.execute(&(num(1) + num(2))), num(10) + num(30));
    }

    #[test]
    fn sequential_composition_matches_nested_execution() {
        let input = num(1) + (num(2) + num(3));
        let double = Strategy::new(|e: &Expr| match &e.kind {
            ExprKind::Num(n) => Some(Expr::num(n * 2)),
            _ => None,
        });
        // Guard against re-doubling: only fold after doubling is done.
        let composed = double.then(fold_add().with_traversal(Traversal::BottomUp));
        let expected = fold_add()
            .with_traversal(Traversal::BottomUp)
            .execute(&Strategy::new(|e: &Expr| match &e.kind {
                ExprKind::Num(n) => Some(Expr::num(n * 2)),
                _ => None,
            })
            .execute(&input));
        assert_eq!(composed.execute(&input), expected);
        assert_eq!(composed.execute(&input), num(12));
    }

    #[test]
    fn repeat_is_idempotent() {
        let input = ((num(1) + num(2)) + num(3)) + num(4);
        let once = fold_add().repeat().execute(&input);
        let twice = fold_add().repeat().execute(&once);
        assert_eq!(once, twice);
        assert_eq!(once, num(10));
    }

    #[test]
    fn then_if_changed_skips_on_stable_input() {
        let fold = fold_add().with_traversal(Traversal::BottomUp);
        let negate_all = Strategy::new(|e: &Expr| match &e.kind {
            ExprKind::Num(n) => Some(Expr::num(-n)),
            _ => None,
        });
        let layered = fold.then_if_changed(negate_all);
        // The fold changes this tree, so negation runs afterwards.
        assert_eq!(layered.execute(&(num(1) + num(2))), num(-3));
        // Nothing to fold in a lone literal, so negation must not run either.
        let layered = fold_add()
            .with_traversal(Traversal::BottomUp)
            .then_if_changed(Strategy::new(|e: &Expr| match &e.kind {
                ExprKind::Num(n) => Some(Expr::num(-n)),
                _ => None,
            }));
        assert_eq!(layered.execute(&num(5)), num(5));
    }

    #[test]
    fn recursion_filter_protects_subtrees() {
        // Rename identifiers everywhere except in a conditional's guard.
        let rename = Strategy::new(|e: &Expr| {
            e.is_ident(&crate::ast::Ident::new("x"))
                .then(|| Expr::var("y", e.ty.clone()))
        })
        .with_recurse_filter(|e: &Expr| match &e.kind {
            ExprKind::Ite(..) => vec![false, true, true],
            _ => vec![true; e.children().len()],
        });
        let x = Expr::var("x", Type::Int);
        let guard = Expr::var("x", Type::Bool);
        let input = guard.ite(&x, &(x.clone() + num(1)));
        let got = rename.execute(&input);
        let ExprKind::Ite(c, t, o) = &got.kind else {
            panic!("expected a conditional expression");
        };
        assert!(c.is_ident(&crate::ast::Ident::new("x")));
        assert!(t.is_ident(&crate::ast::Ident::new("y")));
        assert_eq!(**o, Expr::var("y", Type::Int) + num(1));
    }

    #[test]
    fn context_is_scoped_to_the_path() {
        // Replace every literal zero by the number of enclosing prefix
        // negations; siblings must not leak nesting to each other.
        let strategy = StrategyC::new(0i64, |e: &Expr, depth: &i64| match &e.kind {
            ExprKind::Num(n) if *n == BigInt::from(0) => Some(Expr::num(*depth)),
            _ => None,
        })
        .with_context_update(|child: &Expr, depth: &i64| match &child.kind {
            ExprKind::Prefix(PrefixOp::Neg, _) => depth + 1,
            _ => *depth,
        });
        // -(0) + 0  =>  the nested zero sits under one negation, the other
        // under none. The update fires when descending *into* the prefix
        // node, so its operand already sees the incremented depth.
        let input = (-num(0)) + num(0);
        let got = strategy.execute(&input);
        assert_eq!(got, (-num(1)) + num(0));
    }

    #[test]
    fn default_context_update_is_identity() {
        let strategy = StrategyC::new(7i64, |e: &Expr, ctx: &i64| match &e.kind {
            ExprKind::Num(_) => Some(Expr::num(*ctx)),
            _ => None,
        });
        assert_eq!(strategy.execute(&(num(0) + num(1))), num(7) + num(7));
    }

    #[test]
    fn ancestors_expose_parent_and_siblings() {
        // Replace every argument of f by its position, leaving other
        // occurrences alone.
        let strategy = StrategyA::new(|e: &Expr, info: &Ancestors<'_, Expr>| {
            let parent_is_call = matches!(
                info.parent().map(|p| &p.kind),
                Some(ExprKind::FunctionCall { .. })
            );
            match &e.kind {
                ExprKind::Num(_) if parent_is_call => Some(Expr::num(info.position as i64)),
                _ => None,
            }
        });
        let call = Expr::call(
            Name::new("f"),
            vec![num(9), num(9), num(9)],
            Type::Int,
        );
        let input = call + num(9);
        let got = strategy.execute(&input);
        let expected = Expr::call(Name::new("f"), vec![num(0), num(1), num(2)], Type::Int) + num(9);
        assert_eq!(got, expected);
    }

    #[test]
    fn ancestors_see_rewritten_previous_siblings() {
        let strategy = StrategyA::new(|e: &Expr, info: &Ancestors<'_, Expr>| {
            match (&e.kind, info.previous().map(|p| &p.kind)) {
                // The first argument becomes 1; later arguments copy their
                // left neighbour's (already rewritten) value plus one.
                (ExprKind::Num(_), None) => Some(num(1)),
                (ExprKind::Num(_), Some(ExprKind::Num(prev))) => Some(Expr::num(prev + 1)),
                _ => None,
            }
        });
        let input = Expr::call(Name::new("f"), vec![num(9), num(9), num(9)], Type::Int);
        let got = strategy.execute(&input);
        assert_eq!(
            got,
            Expr::call(Name::new("f"), vec![num(1), num(2), num(3)], Type::Int)
        );
    }

    #[test]
    fn query_counts_matching_nodes() {
        let count_adds = Query::new(0usize, |results: Vec<usize>| results.iter().sum(), |e: &Expr| {
            matches!(&e.kind, ExprKind::Infix(_, Op::Add, _)).then_some(1)
        });
        let input = (num(1) + num(2)).and(&((num(3) + num(4)) + num(5)));
        assert_eq!(count_adds.execute(&input), 3);
    }

    #[test]
    fn query_on_a_leaf_returns_the_neutral_element() {
        let count_adds = Query::new(0usize, |results: Vec<usize>| results.iter().sum(), |e: &Expr| {
            matches!(&e.kind, ExprKind::Infix(_, Op::Add, _)).then_some(1)
        });
        assert_eq!(count_adds.execute(&Expr::var("x", Type::Int)), 0);
        let empty = Stmt::skip();
        let count_assigns = Query::new(0usize, |results: Vec<usize>| results.iter().sum(), |s: &Stmt| {
            matches!(&s.kind, StmtKind::Assign { .. }).then_some(1)
        });
        assert_eq!(count_assigns.execute(&empty), 0);
    }

    #[test]
    fn statements_rewrite_through_loop_bodies() {
        let x = Name::new("x");
        let drop_skips = Strategy::new(|s: &Stmt| match &s.kind {
            StmtKind::Seqn(stmts) if stmts.iter().any(|s| *s == Stmt::skip()) => Some(Stmt::seqn(
                stmts.iter().filter(|s| **s != Stmt::skip()).cloned().collect(),
            )),
            _ => None,
        })
        .with_traversal(Traversal::BottomUp);
        let body = Stmt::seqn(vec![Stmt::skip(), Stmt::assign(&x, &num(1))]);
        let input = Stmt::while_(&Expr::var("b", Type::Bool), &[], &body);
        let got = drop_skips.execute(&input);
        let StmtKind::While { body, .. } = &got.kind else {
            panic!("expected a while statement");
        };
        assert_eq!(**body, Stmt::seqn(vec![Stmt::assign(&x, &num(1))]));
    }
}

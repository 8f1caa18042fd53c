use itertools::Itertools;

use crate::{
    ast::{Expr, Info, Name, Stmt, StmtKind},
    Span,
};

impl Stmt {
    pub fn new(kind: StmtKind) -> Stmt {
        Stmt {
            span: kind.infer_span().unwrap_or_default(),
            kind,
            info: Info::default(),
        }
    }
    pub fn seqn(stmts: Vec<Stmt>) -> Stmt {
        Stmt::new(StmtKind::Seqn(stmts))
    }
    /// The empty sequence; the unit of sequential composition.
    pub fn skip() -> Stmt {
        Stmt::seqn(Vec::new())
    }
    pub fn if_(cond: &Expr, then: &Stmt, els: &Stmt) -> Stmt {
        Stmt::new(StmtKind::If {
            cond: cond.clone(),
            then: Box::new(then.clone()),
            els: Box::new(els.clone()),
        })
    }
    pub fn while_(cond: &Expr, invariants: &[Expr], body: &Stmt) -> Stmt {
        Stmt::new(StmtKind::While {
            cond: cond.clone(),
            invariants: invariants.to_vec(),
            body: Box::new(body.clone()),
        })
    }
    pub fn label(name: &str) -> Stmt {
        Stmt::new(StmtKind::Label(Name::new(name)))
    }
    pub fn goto(target: &str) -> Stmt {
        Stmt::new(StmtKind::Goto(Name::new(target)))
    }
    pub fn assign(name: &Name, expr: &Expr) -> Stmt {
        Stmt::new(StmtKind::Assign {
            name: name.clone(),
            expr: expr.clone(),
        })
    }
    pub fn field_assign(target: &Expr, field: &Name, expr: &Expr) -> Stmt {
        Stmt::new(StmtKind::FieldAssign {
            target: target.clone(),
            field: field.clone(),
            expr: expr.clone(),
        })
    }
    pub fn inhale(expr: &Expr) -> Stmt {
        Stmt::new(StmtKind::Inhale(expr.clone()))
    }
    pub fn exhale(expr: &Expr) -> Stmt {
        Stmt::new(StmtKind::Exhale(expr.clone()))
    }
    pub fn fold(expr: &Expr) -> Stmt {
        Stmt::new(StmtKind::Fold(expr.clone()))
    }
    pub fn unfold(expr: &Expr) -> Stmt {
        Stmt::new(StmtKind::Unfold(expr.clone()))
    }
    pub fn method_call(targets: &[Name], fun_name: &Name, args: &[Expr]) -> Stmt {
        Stmt::new(StmtKind::MethodCall {
            targets: targets.to_vec(),
            fun_name: fun_name.clone(),
            args: args.to_vec(),
        })
    }

    pub fn with_span(&self, span: Span) -> Stmt {
        Stmt {
            span,
            ..self.clone()
        }
    }

    pub fn with_info(&self, note: impl Into<String>) -> Stmt {
        let mut s = self.clone();
        s.info.0.push(note.into());
        s
    }
}

impl StmtKind {
    fn infer_span(&self) -> Option<Span> {
        Some(match self {
            StmtKind::Seqn(stmts) => {
                let span = Span::join(stmts.iter().map(|s| s.span));
                if span.is_none() {
                    return None;
                }
                span
            }
            StmtKind::If { cond, then, els } => Span::join([cond.span, then.span, els.span]),
            StmtKind::While {
                cond,
                invariants,
                body,
            } => Span::join(invariants.iter().map(|inv| inv.span))
                .union(cond.span)
                .union(body.span),
            StmtKind::Label(name) | StmtKind::Goto(name) => return Some(name.span),
            StmtKind::Assign { name, expr } => name.span.union(expr.span),
            StmtKind::FieldAssign {
                target,
                field,
                expr,
            } => Span::join([target.span, field.span, expr.span]),
            StmtKind::Inhale(e)
            | StmtKind::Exhale(e)
            | StmtKind::Fold(e)
            | StmtKind::Unfold(e) => return Some(e.span),
            StmtKind::MethodCall {
                targets,
                fun_name,
                args,
            } => Span::join(targets.iter().map(|t| t.span))
                .union(fun_name.span)
                .union(Span::join(args.iter().map(|a| a.span))),
        })
    }
}

impl std::fmt::Display for Stmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            StmtKind::Seqn(stmts) if stmts.is_empty() => write!(f, "skip"),
            StmtKind::Seqn(stmts) => write!(f, "{{ {} }}", stmts.iter().format("; ")),
            StmtKind::If { cond, then, els } => {
                write!(f, "if {cond} {then} else {els}")
            }
            StmtKind::While {
                cond, invariants, ..
            } if invariants.is_empty() => write!(f, "while {cond} ..."),
            StmtKind::While {
                cond, invariants, ..
            } => write!(
                f,
                "while {cond} invariant {} ...",
                invariants.iter().format(", ")
            ),
            StmtKind::Label(name) => write!(f, "label {name}"),
            StmtKind::Goto(target) => write!(f, "goto {target}"),
            StmtKind::Assign { name, expr } => write!(f, "{name} := {expr}"),
            StmtKind::FieldAssign {
                target,
                field,
                expr,
            } => write!(f, "{target}.{field} := {expr}"),
            StmtKind::Inhale(e) => write!(f, "inhale {e}"),
            StmtKind::Exhale(e) => write!(f, "exhale {e}"),
            StmtKind::Fold(e) => write!(f, "fold {e}"),
            StmtKind::Unfold(e) => write!(f, "unfold {e}"),
            StmtKind::MethodCall {
                targets,
                fun_name,
                args,
            } if targets.is_empty() => write!(f, "{fun_name}({})", args.iter().format(", ")),
            StmtKind::MethodCall {
                targets,
                fun_name,
                args,
            } => write!(
                f,
                "{} := {fun_name}({})",
                targets.iter().format(", "),
                args.iter().format(", ")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Type;

    #[test]
    fn display_reads_like_source() {
        let x = Name::new("x");
        let s = Stmt::seqn(vec![
            Stmt::assign(&x, &Expr::num(1)),
            Stmt::inhale(&Expr::var("x", Type::Int).gt(&Expr::num(0))),
        ]);
        assert_eq!(s.to_string(), "{ x := 1; inhale (x > 0) }");
        assert_eq!(Stmt::skip().to_string(), "skip");
    }

    #[test]
    fn span_inference_unions_children() {
        let e = Expr::var("x", Type::Int).with_span(Span::from_start_end(4, 5));
        let s = Stmt::inhale(&e);
        assert_eq!(s.span, Span::from_start_end(4, 5));
        assert!(Stmt::skip().span.is_none());
    }
}

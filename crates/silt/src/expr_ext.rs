use itertools::Itertools;
use num_bigint::BigInt;

use crate::{
    ast::{Expr, ExprKind, Ident, Info, Name, Op, PrefixOp, Quantifier, Type, Var},
    Span,
};

macro_rules! impl_binop {
    ($name:ident, $Name:ident, $Trait:ident, $trait_fn:ident) => {
        impl Expr {
            pub fn $name(&self, other: &Expr) -> Expr {
                Expr::op(self, Op::$Name, other)
            }
        }
        impl std::ops::$Trait<Expr> for Expr {
            type Output = Expr;

            fn $trait_fn(self, rhs: Expr) -> Self::Output {
                Expr::$name(&self, &rhs)
            }
        }
        impl std::ops::$Trait<&Expr> for Expr {
            type Output = Expr;

            fn $trait_fn(self, rhs: &Expr) -> Self::Output {
                Expr::$name(&self, rhs)
            }
        }
        impl std::ops::$Trait<&Expr> for &Expr {
            type Output = Expr;

            fn $trait_fn(self, rhs: &Expr) -> Self::Output {
                Expr::$name(self, rhs)
            }
        }
        impl std::ops::$Trait<Expr> for &Expr {
            type Output = Expr;

            fn $trait_fn(self, rhs: Expr) -> Self::Output {
                Expr::$name(self, &rhs)
            }
        }
    };
}

impl_binop!(add, Add, Add, add);
impl_binop!(sub, Sub, Sub, sub);
impl_binop!(mul, Mul, Mul, mul);
impl_binop!(div, Div, Div, div);
impl_binop!(and, And, BitAnd, bitand);
impl_binop!(or, Or, BitOr, bitor);

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Self::Output {
        self.prefix(PrefixOp::Not)
    }
}
impl std::ops::Not for &Expr {
    type Output = Expr;

    fn not(self) -> Self::Output {
        self.prefix(PrefixOp::Not)
    }
}
impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Self::Output {
        self.prefix(PrefixOp::Neg)
    }
}

impl Expr {
    pub fn new_typed(kind: ExprKind, ty: Type) -> Expr {
        Expr {
            span: kind.infer_span().unwrap_or_default(),
            kind,
            ty,
            info: Info::default(),
        }
    }
    pub fn error() -> Expr {
        Expr {
            span: Span::default(),
            kind: ExprKind::Error,
            ty: Type::Error,
            info: Info::default(),
        }
    }
    pub fn bool(value: bool) -> Expr {
        Expr::new_typed(ExprKind::Bool(value), Type::Bool)
    }
    pub fn num(value: impl Into<BigInt>) -> Expr {
        Expr::new_typed(ExprKind::Num(value.into()), Type::Int)
    }
    pub fn ident(ident: &Ident, ty: &Type) -> Expr {
        Expr::new_typed(ExprKind::Ident(ident.clone()), ty.clone())
    }
    pub fn var(name: &str, ty: Type) -> Expr {
        Expr::ident(&Ident::new(name), &ty)
    }
    pub fn op(&self, op: Op, rhs: &Expr) -> Expr {
        let ty = match op {
            Op::Mul | Op::Div | Op::Mod | Op::Add | Op::Sub => Type::Int,
            Op::Lt | Op::Le | Op::Gt | Op::Ge | Op::Eq | Op::Ne | Op::And | Op::Or | Op::Imp => {
                Type::Bool
            }
        };
        Expr::new_typed(
            ExprKind::Infix(Box::new(self.clone()), op, Box::new(rhs.clone())),
            ty,
        )
    }
    pub fn prefix(&self, op: PrefixOp) -> Expr {
        let ty = match op {
            PrefixOp::Neg => Type::Int,
            PrefixOp::Not => Type::Bool,
        };
        Expr::new_typed(ExprKind::Prefix(op, Box::new(self.clone())), ty)
    }
    pub fn imp(&self, other: &Expr) -> Expr {
        Expr::op(self, Op::Imp, other)
    }
    pub fn lt(&self, other: &Expr) -> Expr {
        Expr::op(self, Op::Lt, other)
    }
    pub fn gt(&self, other: &Expr) -> Expr {
        Expr::op(self, Op::Gt, other)
    }
    pub fn eq_cmp(&self, other: &Expr) -> Expr {
        Expr::op(self, Op::Eq, other)
    }
    pub fn ite(&self, then: &Expr, otherwise: &Expr) -> Expr {
        Expr::new_typed(
            ExprKind::Ite(
                Box::new(self.clone()),
                Box::new(then.clone()),
                Box::new(otherwise.clone()),
            ),
            then.ty.clone(),
        )
    }
    pub fn quantifier(q: Quantifier, vars: &[Var], body: &Expr) -> Expr {
        Expr::new_typed(
            ExprKind::Quantifier(q, vars.to_vec(), Box::new(body.clone())),
            Type::Bool,
        )
    }
    pub fn call(fun_name: Name, args: Vec<Expr>, ty: Type) -> Expr {
        Expr::new_typed(ExprKind::FunctionCall { fun_name, args }, ty)
    }

    pub fn with_span(&self, span: Span) -> Expr {
        Expr {
            span,
            ..self.clone()
        }
    }

    pub fn with_info(&self, note: impl Into<String>) -> Expr {
        let mut e = self.clone();
        e.info.0.push(note.into());
        e
    }

    pub fn as_ident(&self) -> Option<&Ident> {
        match &self.kind {
            ExprKind::Ident(i) => Some(i),
            _ => None,
        }
    }
    pub fn is_ident(&self, i: &Ident) -> bool {
        matches!(&self.kind, ExprKind::Ident(x) if x == i)
    }

    /// Pre-order map: a sub-expression `f` maps to `Some` is replaced
    /// wholesale, and the replacement is not descended into.
    pub fn pre_order_map(&self, mut f: impl FnMut(&Expr) -> Option<Expr>) -> Expr {
        self.pre_order_map_impl(&mut f)
            .unwrap_or_else(|| self.clone())
    }

    fn pre_order_map_impl(&self, f: &mut dyn FnMut(&Expr) -> Option<Expr>) -> Option<Expr> {
        if let Some(x) = f(self) {
            return Some(x);
        }
        use crate::rewrite::Rewritable;
        let mut changed = false;
        let children = self
            .children()
            .iter()
            .map(|c| match c.pre_order_map_impl(f) {
                Some(x) => {
                    changed = true;
                    x
                }
                None => c.clone(),
            })
            .collect();
        changed.then(|| self.with_children(children))
    }

    /// Substitute every sub-expression matched by `f` with `to`.
    pub fn subst(&self, mut f: impl FnMut(&Expr) -> bool, to: &Expr) -> Expr {
        self.pre_order_map(|x| f(x).then(|| to.clone()))
    }
    /// Substitute all occurrences of the identifier `from` with `to`.
    pub fn subst_ident(&self, from: &Ident, to: &Expr) -> Expr {
        self.subst(|x| x.is_ident(from), to)
    }
}

impl ExprKind {
    fn infer_span(&self) -> Option<Span> {
        Some(match self {
            ExprKind::Error | ExprKind::Bool(_) | ExprKind::Num(_) | ExprKind::Ident(_) => {
                return None
            }
            ExprKind::Prefix(_, e) => return Some(e.span),
            ExprKind::Infix(l, _, r) => l.span.union(r.span),
            ExprKind::Ite(c, t, o) => Span::join([c.span, t.span, o.span]),
            ExprKind::Quantifier(_, vars, body) => {
                Span::join(vars.iter().map(|v| v.span)).union(body.span)
            }
            ExprKind::FunctionCall { fun_name, args } => {
                Span::join(args.iter().map(|a| a.span)).union(fun_name.span)
            }
        })
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ExprKind::Bool(b) => write!(f, "{b}"),
            ExprKind::Num(n) => write!(f, "{n}"),
            ExprKind::Ident(i) => write!(f, "{i}"),
            ExprKind::Prefix(op, e) => write!(f, "{op}{e}"),
            ExprKind::Infix(l, op, r) => write!(f, "({l} {op} {r})"),
            ExprKind::Ite(c, t, o) => write!(f, "({c} ? {t} : {o})"),
            ExprKind::Quantifier(q, vars, body) => {
                write!(f, "{q} {} :: {body}", vars.iter().format(", "))
            }
            ExprKind::FunctionCall { fun_name, args } => {
                write!(f, "{fun_name}({})", args.iter().format(", "))
            }
            ExprKind::Error => write!(f, "error"),
        }
    }
}

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

impl std::fmt::Display for Quantifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quantifier::Forall => write!(f, "forall"),
            Quantifier::Exists => write!(f, "exists"),
        }
    }
}

impl Var {
    pub fn new(name: &str, ty: Type) -> Var {
        Var {
            span: Span::default(),
            name: Name::new(name),
            ty,
        }
    }
}

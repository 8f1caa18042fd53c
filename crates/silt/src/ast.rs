use num_bigint::BigInt;

use crate::Span;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ident(pub String);

impl Ident {
    pub fn new(s: impl Into<String>) -> Ident {
        Ident(s.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// An identifier together with its occurrence span.
///
/// Two names are equal when their identifiers are; spans never take part in
/// comparisons.
#[derive(Debug, Clone, Eq)]
pub struct Name {
    pub span: Span,
    pub ident: Ident,
}

impl Name {
    pub fn new(ident: impl Into<String>) -> Name {
        Name {
            span: Span::default(),
            ident: Ident::new(ident),
        }
    }
    pub fn as_str(&self) -> &str {
        self.ident.as_str()
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.ident == other.ident
    }
}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ident.hash(state);
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.ident.fmt(f)
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Unresolved,
    Int,
    Bool,
    Ref,
    Error,
}

impl Type {
    /// Can a value of type `other` be assigned to a location of this type?
    ///
    /// Poisoned types are assignable in both directions so one resolution
    /// failure does not cascade into follow-up reports.
    pub fn is_assignable_from(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Error | Type::Unresolved, _) => true,
            (_, Type::Error | Type::Unresolved) => true,
            _ => self == other,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Type::Unresolved => "unresolved",
            Type::Int => "Int",
            Type::Bool => "Bool",
            Type::Ref => "Ref",
            Type::Error => "error",
        };
        s.fmt(f)
    }
}

/// A variable bound by a quantifier.
#[non_exhaustive]
#[derive(Debug, Clone, Eq)]
pub struct Var {
    pub span: Span,
    pub name: Name,
    pub ty: Type,
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.ty == other.ty
    }
}

/// Free-form metadata attached to a node: provenance notes, comments to
/// carry through transformations. Never interpreted by the core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Info(pub Vec<String>);

impl Info {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An expression node: a kind, the span it covers, and its type.
///
/// Equality is structural on `kind` and `ty`; spans and info are metadata.
#[non_exhaustive]
#[derive(Debug, Clone, Eq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
    pub ty: Type,
    pub info: Info,
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.ty == other.ty
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    Bool(bool),
    Num(BigInt),
    Ident(Ident),
    Prefix(PrefixOp, Box<Expr>),
    Infix(Box<Expr>, Op, Box<Expr>),
    Ite(Box<Expr>, Box<Expr>, Box<Expr>),
    Quantifier(Quantifier, Vec<Var>, Box<Expr>),
    FunctionCall { fun_name: Name, args: Vec<Expr> },
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quantifier {
    Forall,
    Exists,
}

macro_rules! def_op {
    ($([$s:literal, $name:ident],)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Op {
            $($name,)*
        }
        impl std::fmt::Display for Op {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let s = match self {
                    $(Op::$name => $s,)*
                };
                s.fmt(f)
            }
        }
    };
}

def_op!(
    ["*", Mul],
    ["/", Div],
    ["%", Mod],
    ["+", Add],
    ["-", Sub],
    ["<", Lt],
    ["<=", Le],
    [">", Gt],
    [">=", Ge],
    ["==", Eq],
    ["!=", Ne],
    ["&&", And],
    ["||", Or],
    ["==>", Imp],
);

macro_rules! def_prefix_op {
    ($([$s:literal, $name:ident],)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum PrefixOp {
            $($name,)*
        }
        impl std::fmt::Display for PrefixOp {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let s = match self {
                    $(PrefixOp::$name => $s,)*
                };
                s.fmt(f)
            }
        }
    };
}

def_prefix_op!(["-", Neg], ["!", Not],);

/// A statement node.
///
/// `Seqn`, `If`, `While`, `Label` and `Goto` are the structured control-flow
/// constructs the CFG generator consumes; all remaining kinds are atomic
/// side-effecting statements whose internals the generator never inspects.
#[non_exhaustive]
#[derive(Debug, Clone, Eq)]
pub struct Stmt {
    pub span: Span,
    pub kind: StmtKind,
    pub info: Info,
}

impl PartialEq for Stmt {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    Seqn(Vec<Stmt>),
    If {
        cond: Expr,
        then: Box<Stmt>,
        els: Box<Stmt>,
    },
    While {
        cond: Expr,
        invariants: Vec<Expr>,
        body: Box<Stmt>,
    },
    Label(Name),
    Goto(Name),

    Assign {
        name: Name,
        expr: Expr,
    },
    FieldAssign {
        target: Expr,
        field: Name,
        expr: Expr,
    },
    Inhale(Expr),
    Exhale(Expr),
    Fold(Expr),
    Unfold(Expr),
    MethodCall {
        targets: Vec<Name>,
        fun_name: Name,
        args: Vec<Expr>,
    },
}

impl StmtKind {
    /// An atomic statement contributes a single node to the linearized form
    /// and never affects control flow.
    pub fn is_atomic(&self) -> bool {
        !matches!(
            self,
            StmtKind::Seqn(_)
                | StmtKind::If { .. }
                | StmtKind::While { .. }
                | StmtKind::Label(_)
                | StmtKind::Goto(_)
        )
    }
}

//! Abstract syntax tree for FLYUX.
//!
//! Every node carries the [`SourceLocation`] of the token that introduced it,
//! already resolved to original-file coordinates. Parents own children
//! exclusively; the program owns its statement vector.

use crate::source_map::SourceLocation;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// Type names usable in annotations: `:[num]`, `:(str)`, `:<func>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    Num,
    Str,
    Bl,
    Obj,
    Func,
}

impl TypeName {
    /// Runtime tag passed to `box_null_typed`.
    pub fn runtime_tag(self) -> i32 {
        match self {
            TypeName::Num => 0,
            TypeName::Str => 1,
            TypeName::Obj => 3,
            TypeName::Bl => 4,
            TypeName::Func => 5,
        }
    }
}

/// `:[T]` (variable), `:(T)` (constant), or `:<T>` (function type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeAnnotation {
    pub type_name: TypeName,
    /// Derived from the `(...)` form of the annotation.
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<String>,
    pub return_type: Option<TypeAnnotation>,
    pub body: Block,
    /// Set by the closure analyzer after construction when the body
    /// references `self`.
    pub uses_self: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopKind {
    /// `L> [n] { ... }`: run the body n times.
    Repeat(Expr),
    /// `L> (init; cond; update) { ... }`. Each sub-node may be absent.
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        update: Option<Box<Stmt>>,
    },
    /// `L> (iterable : name) { ... }`.
    Foreach { iterable: Expr, binding: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopStmt {
    pub kind: LoopKind,
    /// Optional name consumed by `B> name` / `N> name`.
    pub label: Option<String>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    VarDecl {
        name: String,
        type_annotation: Option<TypeAnnotation>,
        is_const: bool,
        init: Option<Expr>,
    },
    FuncDecl(FuncDecl),
    ExprStmt(Expr),
    Assign {
        target: Expr,
        value: Expr,
    },
    If {
        conditions: Vec<Expr>,
        then_blocks: Vec<Block>,
        else_block: Option<Block>,
    },
    Loop(LoopStmt),
    Return(Option<Expr>),
    Break {
        label: Option<String>,
    },
    Next {
        label: Option<String>,
    },
    Try {
        try_block: Block,
        catch_param: Option<String>,
        catch_block: Option<Block>,
        finally_block: Option<Block>,
    },
    Block(Block),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
    Inc,
    Dec,
}

/// One link of a `.>` chain: `.>method(args)` or `.>prop`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainLink {
    pub name: String,
    /// `None` for the parenthesis-less property form.
    pub args: Option<Vec<Expr>>,
    pub throw_on_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Num {
        value: f64,
        raw: String,
    },
    /// Escape-decoded content; may contain embedded NUL bytes.
    Str(Vec<u8>),
    Bool(bool),
    Null,
    Undef,
    SelfRef,
    Identifier(String),
    Array {
        elements: Vec<Expr>,
        /// Parallel to `elements`: marked entries are `...expr` spreads.
        spread: Vec<bool>,
    },
    Object {
        properties: Vec<(String, Expr)>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        is_postfix: bool,
    },
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        throw_on_error: bool,
    },
    Member {
        object: Box<Expr>,
        property: String,
        /// `?.` access: missing fields yield null instead of an error.
        is_optional: bool,
        /// Plain `.prop` access fetches the raw field; `.>prop` access binds
        /// method values to their receiver.
        is_unbound: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Chain {
        object: Box<Expr>,
        links: Vec<ChainLink>,
    },
    /// Anonymous function literal; named `_anon_N` by the parser.
    Func(FuncDecl),
}

impl Expr {
    pub fn new(kind: ExprKind, loc: SourceLocation) -> Self {
        Expr { kind, loc }
    }

    pub fn identifier_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, loc: SourceLocation) -> Self {
        Stmt { kind, loc }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_runtime_tags() {
        assert_eq!(TypeName::Num.runtime_tag(), 0);
        assert_eq!(TypeName::Str.runtime_tag(), 1);
        assert_eq!(TypeName::Obj.runtime_tag(), 3);
        assert_eq!(TypeName::Bl.runtime_tag(), 4);
    }

    #[test]
    fn test_identifier_name() {
        let loc = SourceLocation::synthetic();
        let expr = Expr::new(ExprKind::Identifier("x".into()), loc);
        assert_eq!(expr.identifier_name(), Some("x"));
        let num = Expr::new(
            ExprKind::Num {
                value: 1.0,
                raw: "1".into(),
            },
            loc,
        );
        assert_eq!(num.identifier_name(), None);
    }
}

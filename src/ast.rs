//! Abstract syntax tree produced by the parser.
//!
//! Nodes are immutable after construction with one exception: `Expr::ty`,
//! a cache slot the type checker fills in, and the `Var` text inside a
//! call base, which the module loader rewrites during import qualification.

use crate::types::Type;
use std::cell::RefCell;

/// Syntactic type as written in source: a name, an array-bracket depth,
/// and a void flag (since `void` is not a type name the resolver knows).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    pub name: String,
    pub array_depth: u32,
    pub is_void: bool,
}

impl TypeSpec {
    pub fn named(name: impl Into<String>) -> Self {
        TypeSpec {
            name: name.into(),
            array_depth: 0,
            is_void: false,
        }
    }

    pub fn void() -> Self {
        TypeSpec {
            name: String::new(),
            array_depth: 0,
            is_void: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    IntLit(i64),
    RealLitBits(u64),
    StringLit(String),
    BoolLit(bool),
    /// Bare identifier. Call-base `Var` nodes are the target of the
    /// module loader's import-qualification rewrite.
    Var(String),
    Unary {
        op: String,
        operand: Box<Expr>,
    },
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        base: Box<Expr>,
        args: Vec<Expr>,
    },
    Field {
        base: Box<Expr>,
        field: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    NewExpr {
        new_type: TypeSpec,
        size: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: usize,
    pub ty: RefCell<Option<Type>>,
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.line == other.line
    }
}
impl Eq for Expr {}

impl Expr {
    pub fn new(kind: ExprKind, line: usize) -> Self {
        Expr {
            kind,
            line,
            ty: RefCell::new(None),
        }
    }

    /// Reinterpret a `RealLitBits` payload as an `f64`. Stored as bits so
    /// `Expr` can derive `Eq` (floats otherwise can't).
    pub fn real_value(&self) -> f64 {
        match self.kind {
            ExprKind::RealLitBits(bits) => f64::from_bits(bits),
            _ => panic!("real_value called on non-RealLit expr"),
        }
    }

    pub fn new_real(value: f64, line: usize) -> Self {
        Expr::new(ExprKind::RealLitBits(value.to_bits()), line)
    }

    pub fn cached_type(&self) -> Option<Type> {
        self.ty.borrow().clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    VarDecl {
        var_type: TypeSpec,
        name: String,
        init: Option<Expr>,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    ExprStmt(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: usize) -> Self {
        Stmt { kind, line }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub return_type: TypeSpec,
    pub params: Vec<(TypeSpec, String)>,
    pub body: Vec<Stmt>,
    pub is_method: bool,
    pub owner: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    pub name: String,
    pub parent: Option<String>,
    pub fields: Vec<(TypeSpec, String)>,
    pub methods: Vec<Function>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub module: String,
    pub alias: Option<String>,
    pub is_path: bool,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub imports: Vec<ImportDecl>,
    pub structs: Vec<StructDef>,
    pub functions: Vec<Function>,
}

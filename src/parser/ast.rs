use crate::types::{Span, Type, call_signature};
use std::cell::OnceCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal {
    None,
    Bool(bool),
    Number(i32),
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::None => Type::None,
            Literal::Bool(_) => Type::Bool,
            Literal::Number(_) => Type::Number,
        }
    }

    /// Machine word of the literal: booleans are 0/1 and `None` is 0.
    pub fn word(&self) -> i32 {
        match self {
            Literal::None => 0,
            Literal::Bool(b) => *b as i32,
            Literal::Number(n) => *n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    FloorDivide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Is,
}

impl BinaryOp {
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::FloorDivide => "//",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Is => "is",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Nested(Box<Expr>),
    /// Free function call or constructor.
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Attribute {
        object: Box<Expr>,
        attr: String,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
}

/// Expression node. `ty` is written once by the type checker.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    ty: OnceCell<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: OnceCell::new(),
        }
    }

    pub fn ty(&self) -> Option<&Type> {
        self.ty.get()
    }

    /// Records the checked type. Returns false if the node was already
    /// annotated with a different type.
    pub fn annotate(&self, ty: Type) -> bool {
        match self.ty.get() {
            Some(existing) => *existing == ty,
            None => self.ty.set(ty).is_ok(),
        }
    }

    /// Constant value of a literal, a parenthesized literal or a negated
    /// number literal.
    pub fn as_literal(&self) -> Option<Literal> {
        match &self.kind {
            ExprKind::Literal(lit) => Some(*lit),
            ExprKind::Nested(inner) => inner.as_literal(),
            ExprKind::Unary {
                op: UnaryOp::Negate,
                operand,
            } => match operand.as_literal() {
                Some(Literal::Number(n)) => Some(Literal::Number(n.wrapping_neg())),
                _ => None,
            },
            _ => None,
        }
    }
}

/// A declared variable: global, local or class attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclr {
    pub ty: Type,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncIdentity {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
}

impl FuncIdentity {
    pub fn signature(&self) -> String {
        call_signature(&self.name, &self.params)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub identity: FuncIdentity,
    pub params: Vec<(String, Type)>,
    pub locals: Vec<(String, VarDeclr)>,
    pub body: Vec<StmtS>,
    pub span: Span,
}

impl FuncDef {
    pub fn signature(&self) -> String {
        self.identity.signature()
    }

    /// First parameter, if it is named `self`.
    pub fn self_param(&self) -> Option<&Type> {
        self.params
            .first()
            .filter(|(name, _)| name == "self")
            .map(|(_, ty)| ty)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassVar {
    pub name: String,
    pub decl: VarDeclr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    /// Assigned by the organizer.
    pub type_code: usize,
    /// Position in this list is the attribute's heap slot.
    pub class_vars: Vec<ClassVar>,
    pub methods: Vec<FuncDef>,
    pub span: Span,
}

impl ClassDef {
    pub fn attribute(&self, name: &str) -> Option<(usize, &ClassVar)> {
        self.class_vars
            .iter()
            .enumerate()
            .find(|(_, v)| v.name == name)
    }

    pub fn method(&self, signature: &str) -> Option<&FuncDef> {
        self.methods.iter().find(|m| m.signature() == signature)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VarDecl {
        name: String,
        decl: VarDeclr,
    },
    Assign {
        name: String,
        value: Expr,
    },
    AttrAssign {
        object: Expr,
        attr: String,
        value: Expr,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then_block: Vec<StmtS>,
        else_block: Vec<StmtS>,
    },
    While {
        cond: Expr,
        body: Vec<StmtS>,
    },
    Return(Expr),
    Pass,
    FuncDef(FuncDef),
    ClassDef(ClassDef),
}

pub type StmtS = (Stmt, Span);

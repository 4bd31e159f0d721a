use crate::error::Span;

/// Root of a parsed source file.
#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub body: Vec<Decl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionFlag {
    Inline,
    Async,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Named {
        path: Vec<String>,
        generics: Vec<TypeExpr>,
        span: Span,
    },
    Array {
        element: Box<TypeExpr>,
        span: Span,
    },
    Union {
        lhs: Box<TypeExpr>,
        rhs: Box<TypeExpr>,
        span: Span,
    },
    Intersection {
        lhs: Box<TypeExpr>,
        rhs: Box<TypeExpr>,
        span: Span,
    },
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub is_rest: bool,
    pub span: Span,
}

/// Shared by function declarations, function expressions, extern
/// declarations and interface methods.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: Option<String>,
    pub flag: Option<FunctionFlag>,
    pub generics: Vec<String>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub span: Span,
}

impl Signature {
    pub fn is_async(&self) -> bool {
        self.flag == Some(FunctionFlag::Async)
    }

    pub fn has_rest(&self) -> bool {
        self.params.last().map_or(false, |p| p.is_rest)
    }
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub sig: Signature,
    pub body: Vec<Stmt>,
    pub is_exported: bool,
    pub span: Span,
}

impl FunctionDecl {
    pub fn name(&self) -> &str {
        self.sig.name.as_deref().unwrap_or("<anonymous>")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
    Protected,
}

#[derive(Debug, Clone)]
pub struct ClassMember {
    pub visibility: Visibility,
    pub is_static: bool,
    pub decl: Decl,
}

#[derive(Debug, Clone)]
pub enum ImportSymbols {
    /// `import a::b`
    Module,
    /// `from a import *`
    All,
    /// `from a import x, y::z`
    List(Vec<Vec<String>>),
}

#[derive(Debug, Clone)]
pub enum Decl {
    Variable {
        name: String,
        is_const: bool,
        ty: Option<TypeExpr>,
        value: Option<Expr>,
        is_exported: bool,
        span: Span,
    },
    Function(FunctionDecl),
    Extern {
        sig: Signature,
        is_exported: bool,
        span: Span,
    },
    Module {
        name: String,
        body: Vec<Decl>,
        is_exported: bool,
        span: Span,
    },
    Class {
        name: String,
        generics: Vec<String>,
        inherits: Option<String>,
        implements: Vec<String>,
        members: Vec<ClassMember>,
        is_exported: bool,
        span: Span,
    },
    Import {
        path: Vec<String>,
        symbols: ImportSymbols,
        span: Span,
    },
    Type {
        name: String,
        generics: Vec<String>,
        value: TypeExpr,
        is_exported: bool,
        span: Span,
    },
    Interface {
        name: String,
        generics: Vec<String>,
        methods: Vec<Signature>,
        is_exported: bool,
        span: Span,
    },
}

impl Decl {
    pub fn span(&self) -> &Span {
        match self {
            Decl::Variable { span, .. } => span,
            Decl::Function(function) => &function.span,
            Decl::Extern { span, .. } => span,
            Decl::Module { span, .. } => span,
            Decl::Class { span, .. } => span,
            Decl::Import { span, .. } => span,
            Decl::Type { span, .. } => span,
            Decl::Interface { span, .. } => span,
        }
    }

    /// Declared name, `None` for imports which may bind several names.
    pub fn name(&self) -> Option<&str> {
        match self {
            Decl::Variable { name, .. } => Some(name),
            Decl::Function(function) => function.sig.name.as_deref(),
            Decl::Extern { sig, .. } => sig.name.as_deref(),
            Decl::Module { name, .. } => Some(name),
            Decl::Class { name, .. } => Some(name),
            Decl::Import { .. } => None,
            Decl::Type { name, .. } => Some(name),
            Decl::Interface { name, .. } => Some(name),
        }
    }

    pub fn is_exported(&self) -> bool {
        match self {
            Decl::Variable { is_exported, .. } => *is_exported,
            Decl::Function(function) => function.is_exported,
            Decl::Extern { is_exported, .. } => *is_exported,
            Decl::Module { is_exported, .. } => *is_exported,
            Decl::Class { is_exported, .. } => *is_exported,
            Decl::Import { .. } => false,
            Decl::Type { is_exported, .. } => *is_exported,
            Decl::Interface { is_exported, .. } => *is_exported,
        }
    }

    /// Marks the declaration as exported. Only called while parsing.
    pub fn set_exported(&mut self) {
        match self {
            Decl::Variable { is_exported, .. }
            | Decl::Extern { is_exported, .. }
            | Decl::Module { is_exported, .. }
            | Decl::Class { is_exported, .. }
            | Decl::Type { is_exported, .. }
            | Decl::Interface { is_exported, .. } => *is_exported = true,
            Decl::Function(function) => function.is_exported = true,
            Decl::Import { .. } => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub subjects: Vec<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationKind {
    /// `for const x of xs` walks values
    Of,
    /// `for const k in xs` walks keys or indices
    In,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Declaration(Decl),
    Expression {
        expr: Expr,
        span: Span,
    },
    If {
        condition: Expr,
        body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
        span: Span,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    For {
        init: Box<Decl>,
        condition: Expr,
        step: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    ForEach {
        binding: String,
        is_const: bool,
        kind: IterationKind,
        subject: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    Match {
        subject: Expr,
        arms: Vec<MatchArm>,
        default: Option<Vec<Stmt>>,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Break {
        span: Span,
    },
    Skip {
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> &Span {
        match self {
            Stmt::Declaration(decl) => decl.span(),
            Stmt::Expression { span, .. } => span,
            Stmt::If { span, .. } => span,
            Stmt::While { span, .. } => span,
            Stmt::For { span, .. } => span,
            Stmt::ForEach { span, .. } => span,
            Stmt::Match { span, .. } => span,
            Stmt::Return { span, .. } => span,
            Stmt::Break { span } => span,
            Stmt::Skip { span } => span,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number {
        value: i64,
        span: Span,
    },
    Float {
        value: f64,
        span: Span,
    },
    String {
        value: String,
        span: Span,
    },
    Char {
        value: char,
        span: Span,
    },
    Identifier {
        name: String,
        span: Span,
    },
    Array {
        elements: Vec<Expr>,
        span: Span,
    },
    Object {
        entries: Vec<(String, Expr)>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Binary {
        operator: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Reassignment {
        target: String,
        value: Box<Expr>,
        span: Span,
    },
    ModuleAccess {
        module: String,
        member: Box<Expr>,
        span: Span,
    },
    ObjectAccess {
        object: Box<Expr>,
        member: String,
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Reference {
        target: String,
        span: Span,
    },
    Function(Box<FunctionDecl>),
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Number { span, .. } => span,
            Expr::Float { span, .. } => span,
            Expr::String { span, .. } => span,
            Expr::Char { span, .. } => span,
            Expr::Identifier { span, .. } => span,
            Expr::Array { span, .. } => span,
            Expr::Object { span, .. } => span,
            Expr::Call { span, .. } => span,
            Expr::Binary { span, .. } => span,
            Expr::Unary { span, .. } => span,
            Expr::Reassignment { span, .. } => span,
            Expr::ModuleAccess { span, .. } => span,
            Expr::ObjectAccess { span, .. } => span,
            Expr::Index { span, .. } => span,
            Expr::Reference { span, .. } => span,
            Expr::Function(function) => &function.span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    In,
    And,
    Or,
    /// `and!`, never short-circuits
    EagerAnd,
    /// `or!`, never short-circuits
    EagerOr,
    Range,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::In => "in",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::EagerAnd => "and!",
            BinaryOp::EagerOr => "or!",
            BinaryOp::Range => "..",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
    Await,
    Increment,
    Decrement,
}

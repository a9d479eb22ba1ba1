//! Go syntax tree
//!
//! The tree is immutable once parsed. Identifier names live in the package's
//! [`IdentArena`](super::IdentArena); every identifier occurrence in the tree
//! is an [`Ident`] handle into it, so rename passes mutate the arena only.

/// Half-open byte range `[start, end)` within one source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: Self) -> Self {
        Self::new(self.start, other.end)
    }

    pub fn contains(self, other: Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Index of a source file within its package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// Handle of one identifier occurrence in the package arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentId(pub u32);

impl IdentId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ident {
    pub id: IdentId,
    pub span: Span,
}

/// Adjacent comments with no blank line or token between them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentGroup {
    pub comments: Vec<Span>,
    pub span: Span,
}

impl CommentGroup {
    pub fn new(first: Span) -> Self {
        Self {
            comments: vec![first],
            span: first,
        }
    }

    pub fn push(&mut self, comment: Span) {
        self.comments.push(comment);
        self.span.end = comment.end;
    }
}

#[derive(Debug, Clone)]
pub struct File {
    pub id: FileId,
    /// The package name in the package clause
    pub package: Ident,
    /// From the `package` keyword through the package name
    pub package_span: Span,
    /// Import declarations, in source order
    pub import_decls: Vec<GenDecl>,
    /// Every other top-level declaration, in source order
    pub decls: Vec<Decl>,
    pub comments: Vec<CommentGroup>,
}

impl File {
    pub fn imports(&self) -> impl Iterator<Item = &ImportSpec> {
        self.import_decls.iter().flat_map(|decl| {
            decl.specs.iter().filter_map(|spec| match spec {
                Spec::Import(import) => Some(import),
                _ => None,
            })
        })
    }
}

#[derive(Debug, Clone)]
pub enum Decl {
    Gen(GenDecl),
    Func(FuncDecl),
}

impl Decl {
    pub fn span(&self) -> Span {
        match self {
            Self::Gen(decl) => decl.span,
            Self::Func(decl) => decl.span,
        }
    }

    /// Index into [`File::comments`] of the doc comment
    pub fn doc(&self) -> Option<usize> {
        match self {
            Self::Gen(decl) => decl.doc,
            Self::Func(decl) => decl.doc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKeyword {
    Import,
    Const,
    Var,
    Type,
}

#[derive(Debug, Clone)]
pub struct GenDecl {
    pub keyword: DeclKeyword,
    pub span: Span,
    pub doc: Option<usize>,
    pub specs: Vec<Spec>,
}

#[derive(Debug, Clone)]
pub enum Spec {
    Import(ImportSpec),
    Value(ValueSpec),
    Type(TypeSpec),
}

#[derive(Debug, Clone)]
pub struct ImportSpec {
    /// Explicit local name, including `_`
    pub name: Option<Ident>,
    /// `import . "path"`
    pub dot: bool,
    /// Unquoted import path
    pub path: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ValueSpec {
    pub names: Vec<Ident>,
    pub ty: Option<Expr>,
    pub values: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct TypeSpec {
    pub name: Ident,
    pub type_params: Vec<Field>,
    /// `type A = B`
    pub alias: bool,
    pub ty: Expr,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub doc: Option<usize>,
    pub span: Span,
    pub recv: Option<Field>,
    pub name: Ident,
    pub type_params: Vec<Field>,
    pub sig: FuncType,
    pub body: Option<Block>,
}

/// A parameter, result, struct field, type parameter or interface element
///
/// Embedded struct fields and unnamed parameters have no names.
#[derive(Debug, Clone)]
pub struct Field {
    pub names: Vec<Ident>,
    pub ty: Expr,
}

#[derive(Debug, Clone, Default)]
pub struct FuncType {
    pub params: Vec<Field>,
    pub results: Vec<Field>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Ident(Ident),
    BasicLit(Span),
    CompositeLit {
        ty: Option<Box<Expr>>,
        elts: Vec<Expr>,
    },
    FuncLit {
        sig: FuncType,
        body: Block,
    },
    Paren(Box<Expr>),
    Selector {
        x: Box<Expr>,
        sel: Ident,
    },
    /// Index expression or generic instantiation
    Index {
        x: Box<Expr>,
        indices: Vec<Expr>,
    },
    Slice {
        x: Box<Expr>,
        bounds: Vec<Expr>,
    },
    /// `x.(T)`; `ty` is `None` for `x.(type)`
    TypeAssert {
        x: Box<Expr>,
        ty: Option<Box<Expr>>,
    },
    Call {
        fun: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Pointer type or dereference
    Star(Box<Expr>),
    Unary(Box<Expr>),
    Binary(Box<Expr>, Box<Expr>),
    KeyValue {
        key: Box<Expr>,
        value: Box<Expr>,
    },
    /// `...T` in parameter lists and `[...]T` array lengths
    Ellipsis(Option<Box<Expr>>),
    /// Array type when `len` is present, slice type otherwise
    ArrayType {
        len: Option<Box<Expr>>,
        elem: Box<Expr>,
    },
    StructType(Vec<Field>),
    FuncType(FuncType),
    /// Methods carry a name and a `FuncType`; embedded elements have no name
    InterfaceType(Vec<Field>),
    MapType {
        key: Box<Expr>,
        value: Box<Expr>,
    },
    ChanType(Box<Expr>),
}

impl Expr {
    /// Whether `{` after this expression may open a composite literal
    pub fn is_literal_type(&self) -> bool {
        match self {
            Self::Ident(_) | Self::ArrayType { .. } | Self::StructType(_) | Self::MapType { .. } => {
                true
            }
            Self::Selector { x, .. } => matches!(**x, Self::Ident(_)),
            Self::Index { x, .. } => x.is_literal_type(),
            _ => false,
        }
    }

    pub fn is_type_name(&self) -> bool {
        match self {
            Self::Ident(_) => true,
            Self::Selector { x, .. } => matches!(**x, Self::Ident(_)),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Decl(GenDecl),
    Labeled {
        label: Ident,
        stmt: Box<Stmt>,
    },
    Expr(Expr),
    Send {
        chan: Expr,
        value: Expr,
    },
    IncDec(Expr),
    Assign {
        lhs: Vec<Expr>,
        rhs: Vec<Expr>,
        define: bool,
    },
    Go(Expr),
    Defer(Expr),
    Return(Vec<Expr>),
    /// break, continue, goto and fallthrough
    Branch(Option<Ident>),
    Block(Block),
    If {
        init: Option<Box<Stmt>>,
        cond: Expr,
        then: Block,
        els: Option<Box<Stmt>>,
    },
    Switch {
        init: Option<Box<Stmt>>,
        tag: Option<Expr>,
        clauses: Vec<CaseClause>,
    },
    TypeSwitch {
        init: Option<Box<Stmt>>,
        /// `v` in `switch v := x.(type)`
        binding: Option<Ident>,
        subject: Expr,
        clauses: Vec<CaseClause>,
    },
    Select(Vec<CommClause>),
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Block,
    },
    Range {
        key: Option<Expr>,
        value: Option<Expr>,
        define: bool,
        x: Expr,
        body: Block,
    },
    Empty,
}

/// `case list:` clause; an empty list is `default:`
#[derive(Debug, Clone)]
pub struct CaseClause {
    pub list: Vec<Expr>,
    pub body: Vec<Stmt>,
}

/// `case comm:` clause of a select; `None` is `default:`
#[derive(Debug, Clone)]
pub struct CommClause {
    pub comm: Option<Box<Stmt>>,
    pub body: Vec<Stmt>,
}

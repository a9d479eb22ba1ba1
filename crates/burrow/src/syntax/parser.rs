//! Recursive-descent parser for Go source files
//!
//! Follows the structure of the reference Go parser: `expr_lev` tracks
//! whether a `{` after a type name may open a composite literal (it may not
//! inside `if`/`for`/`switch` headers), and ambiguous bracket forms are
//! settled by looking at the tokens around them.

use super::{
    IdentArena, ParseError,
    ast::{
        Block, CaseClause, CommClause, CommentGroup, Decl, DeclKeyword, Expr, Field, File, FileId,
        FuncDecl, FuncType, GenDecl, Ident, ImportSpec, Span, Spec, Stmt, TypeSpec, ValueSpec,
    },
    lexer::{Lexed, LineIndex, Token},
    token::TokenKind,
};

type PResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StmtMode {
    Basic,
    LabelOk,
    RangeOk,
}

pub(super) struct Parser<'src, 'a> {
    file: FileId,
    source: &'src str,
    tokens: Vec<Token>,
    comments: Vec<CommentGroup>,
    pos: usize,
    last_end: u32,
    expr_lev: i32,
    arena: &'a mut IdentArena,
}

impl<'src, 'a> Parser<'src, 'a> {
    pub(super) fn new(
        file: FileId,
        source: &'src str,
        lexed: Lexed,
        arena: &'a mut IdentArena,
    ) -> Self {
        Self {
            file,
            source,
            tokens: lexed.tokens,
            comments: lexed.comments,
            pos: 0,
            last_end: 0,
            expr_lev: 0,
            arena,
        }
    }

    // ---- token cursor ----

    fn peek(&self) -> TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map_or(TokenKind::Eof, |token| token.kind)
    }

    fn current(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    fn bump(&mut self) -> Token {
        let token = self.current();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        if token.span.end > token.span.start {
            self.last_end = token.span.end;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn text(&self, token: Token) -> &'src str {
        &self.source[token.span.start as usize..token.span.end as usize]
    }

    fn error(&self, expected: &str) -> ParseError {
        let token = self.current();
        let found = match token.kind {
            TokenKind::Eof => "EOF".to_owned(),
            TokenKind::Semicolon if token.span.start == token.span.end => "newline".to_owned(),
            _ => format!("'{}'", self.text(token)),
        };
        ParseError::new(
            token.span.start as usize,
            format!("expected {expected}, found {found}"),
        )
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.error(what))
        }
    }

    /// Closing delimiter, tolerating an automatic semicolon right before it
    fn expect_closing(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.at(TokenKind::Semicolon) && self.peek_at(1) == kind {
            let token = self.current();
            if token.span.start == token.span.end {
                self.bump();
            }
        }
        self.expect(kind, what)
    }

    /// Statement terminator; optional before a closing `)` or `}`
    fn expect_semi(&mut self) -> PResult<()> {
        match self.peek() {
            TokenKind::Semicolon => {
                self.bump();
                Ok(())
            }
            TokenKind::RParen | TokenKind::RBrace | TokenKind::Eof => Ok(()),
            _ => Err(self.error("';' or newline")),
        }
    }

    fn ident(&mut self) -> PResult<Ident> {
        let token = self.expect(TokenKind::Ident, "identifier")?;
        let text = self.text(token);
        let id = self.arena.alloc(self.file, token.span, text);
        Ok(Ident {
            id,
            span: token.span,
        })
    }

    fn ident_list(&mut self) -> PResult<Vec<Ident>> {
        let mut names = vec![self.ident()?];
        while self.at(TokenKind::Comma) && self.peek_at(1) == TokenKind::Ident {
            self.bump();
            names.push(self.ident()?);
        }
        Ok(names)
    }

    /// Index of the `]` matching the `[` at token offset `n`
    fn matching_bracket(&self, n: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (offset, token) in self.tokens[self.pos + n..].iter().enumerate() {
            match token.kind {
                TokenKind::LBrack | TokenKind::LParen | TokenKind::LBrace => depth += 1,
                TokenKind::RBrack | TokenKind::RParen | TokenKind::RBrace => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(n + offset);
                    }
                }
                TokenKind::Eof => return None,
                _ => {}
            }
        }
        None
    }

    /// `name [N]T` rather than the instantiation `name[T]`
    fn ident_then_array_type(&self) -> bool {
        self.peek() == TokenKind::Ident
            && self.peek_at(1) == TokenKind::LBrack
            && self
                .matching_bracket(1)
                .is_some_and(|close| starts_type(self.peek_at(close + 1)))
    }

    // ---- file and declarations ----

    pub(super) fn parse_file(mut self) -> PResult<File> {
        let package_tok = self.expect(TokenKind::Package, "'package'")?;
        let package = self.ident()?;
        let package_span = package_tok.span.to(package.span);
        self.expect_semi()?;

        let mut import_decls = Vec::new();
        while self.at(TokenKind::Import) {
            import_decls.push(self.gen_decl()?);
            self.expect_semi()?;
        }

        let mut decls = Vec::new();
        while !self.at(TokenKind::Eof) {
            let decl = match self.peek() {
                TokenKind::Func => Decl::Func(self.func_decl()?),
                TokenKind::Const | TokenKind::Var | TokenKind::Type => Decl::Gen(self.gen_decl()?),
                TokenKind::Import => {
                    return Err(self.error("declaration (imports must precede other declarations)"));
                }
                TokenKind::Semicolon => {
                    self.bump();
                    continue;
                }
                _ => return Err(self.error("declaration")),
            };
            decls.push(decl);
            self.expect_semi()?;
        }

        let mut file = File {
            id: self.file,
            package,
            package_span,
            import_decls,
            decls,
            comments: std::mem::take(&mut self.comments),
        };
        attach_doc_comments(&mut file, self.source);
        Ok(file)
    }

    fn gen_decl(&mut self) -> PResult<GenDecl> {
        let keyword_tok = self.bump();
        let keyword = match keyword_tok.kind {
            TokenKind::Import => DeclKeyword::Import,
            TokenKind::Const => DeclKeyword::Const,
            TokenKind::Var => DeclKeyword::Var,
            _ => DeclKeyword::Type,
        };
        let mut specs = Vec::new();
        if self.eat(TokenKind::LParen) {
            while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                specs.push(self.spec(keyword)?);
                self.expect_semi()?;
            }
            self.expect(TokenKind::RParen, "')'")?;
        } else {
            specs.push(self.spec(keyword)?);
        }
        Ok(GenDecl {
            keyword,
            span: Span::new(keyword_tok.span.start, self.last_end),
            doc: None,
            specs,
        })
    }

    fn spec(&mut self, keyword: DeclKeyword) -> PResult<Spec> {
        match keyword {
            DeclKeyword::Import => self.import_spec().map(Spec::Import),
            DeclKeyword::Type => self.type_spec().map(Spec::Type),
            DeclKeyword::Const | DeclKeyword::Var => self.value_spec().map(Spec::Value),
        }
    }

    fn import_spec(&mut self) -> PResult<ImportSpec> {
        let start = self.current().span.start;
        let mut name = None;
        let mut dot = false;
        match self.peek() {
            TokenKind::Ident => name = Some(self.ident()?),
            TokenKind::Period => {
                self.bump();
                dot = true;
            }
            _ => {}
        }
        let path_tok = match self.peek() {
            TokenKind::String | TokenKind::RawString => self.bump(),
            _ => return Err(self.error("import path")),
        };
        let quoted = self.text(path_tok);
        let path = quoted[1..quoted.len() - 1].to_owned();
        if path.is_empty() {
            return Err(ParseError::new(
                path_tok.span.start as usize,
                "invalid import path: empty string",
            ));
        }
        Ok(ImportSpec {
            name,
            dot,
            path,
            span: Span::new(start, self.last_end),
        })
    }

    fn type_spec(&mut self) -> PResult<TypeSpec> {
        let name = self.ident()?;
        let mut type_params = Vec::new();
        if self.at(TokenKind::LBrack) && self.opens_type_params() {
            type_params = self.type_params()?;
        }
        let alias = self.eat(TokenKind::Assign);
        let ty = self.parse_type()?;
        Ok(TypeSpec {
            name,
            type_params,
            alias,
            ty,
        })
    }

    /// `type T[P any]` as opposed to the array type `type T [N]int`
    fn opens_type_params(&self) -> bool {
        self.peek_at(1) == TokenKind::Ident
            && matches!(
                self.peek_at(2),
                TokenKind::Ident
                    | TokenKind::Comma
                    | TokenKind::Interface
                    | TokenKind::Tilde
                    | TokenKind::LBrack
                    | TokenKind::Map
                    | TokenKind::Func
                    | TokenKind::Chan
                    | TokenKind::Struct
            )
    }

    fn type_params(&mut self) -> PResult<Vec<Field>> {
        self.expect(TokenKind::LBrack, "'['")?;
        let mut params = Vec::new();
        while !self.at(TokenKind::RBrack) {
            let names = self.ident_list()?;
            let ty = self.type_elem()?;
            params.push(Field { names, ty });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrack, "']'")?;
        Ok(params)
    }

    fn value_spec(&mut self) -> PResult<ValueSpec> {
        let names = self.ident_list()?;
        let ty = match self.peek() {
            TokenKind::Assign | TokenKind::Semicolon | TokenKind::RParen => None,
            _ => Some(self.parse_type()?),
        };
        let values = if self.eat(TokenKind::Assign) {
            self.expr_list()?
        } else {
            Vec::new()
        };
        Ok(ValueSpec { names, ty, values })
    }

    fn func_decl(&mut self) -> PResult<FuncDecl> {
        let func_tok = self.expect(TokenKind::Func, "'func'")?;
        let recv = if self.at(TokenKind::LParen) {
            let mut params = self.parameters()?;
            if params.len() != 1 {
                return Err(ParseError::new(
                    func_tok.span.start as usize,
                    "method has multiple receivers",
                ));
            }
            params.pop()
        } else {
            None
        };
        let name = self.ident()?;
        let type_params = if self.at(TokenKind::LBrack) {
            self.type_params()?
        } else {
            Vec::new()
        };
        let sig = self.signature()?;
        let body = if self.at(TokenKind::LBrace) {
            let saved = std::mem::replace(&mut self.expr_lev, 0);
            let body = self.block()?;
            self.expr_lev = saved;
            Some(body)
        } else {
            None
        };
        Ok(FuncDecl {
            doc: None,
            span: Span::new(func_tok.span.start, self.last_end),
            recv,
            name,
            type_params,
            sig,
            body,
        })
    }

    // ---- signatures ----

    fn signature(&mut self) -> PResult<FuncType> {
        let params = self.parameters()?;
        let results = if self.at(TokenKind::LParen) {
            self.parameters()?
        } else if starts_type(self.peek()) {
            vec![Field {
                names: Vec::new(),
                ty: self.parse_type()?,
            }]
        } else {
            Vec::new()
        };
        Ok(FuncType { params, results })
    }

    fn parameters(&mut self) -> PResult<Vec<Field>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut entries: Vec<(Expr, Option<Expr>)> = Vec::new();
        while !self.at(TokenKind::RParen) {
            let first = if self.ident_then_array_type() {
                Expr::Ident(self.ident()?)
            } else {
                self.param_type()?
            };
            let second = match self.peek() {
                TokenKind::Comma | TokenKind::RParen => None,
                _ => Some(self.param_type()?),
            };
            entries.push((first, second));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let close = self.expect_closing(TokenKind::RParen, "')'")?;
        group_parameters(entries, close.span.start)
    }

    fn param_type(&mut self) -> PResult<Expr> {
        if self.eat(TokenKind::Ellipsis) {
            Ok(Expr::Ellipsis(Some(Box::new(self.parse_type()?))))
        } else {
            self.parse_type()
        }
    }

    // ---- types ----

    fn parse_type(&mut self) -> PResult<Expr> {
        match self.peek() {
            TokenKind::Ident => self.type_name(),
            TokenKind::LBrack => self.array_type(),
            TokenKind::Mul => {
                self.bump();
                Ok(Expr::Star(Box::new(self.parse_type()?)))
            }
            TokenKind::Arrow => {
                self.bump();
                self.expect(TokenKind::Chan, "'chan'")?;
                Ok(Expr::ChanType(Box::new(self.parse_type()?)))
            }
            TokenKind::Chan => {
                self.bump();
                self.eat(TokenKind::Arrow);
                Ok(Expr::ChanType(Box::new(self.parse_type()?)))
            }
            TokenKind::Func => {
                self.bump();
                Ok(Expr::FuncType(self.signature()?))
            }
            TokenKind::Map => {
                self.bump();
                self.expect(TokenKind::LBrack, "'['")?;
                let key = self.parse_type()?;
                self.expect(TokenKind::RBrack, "']'")?;
                let value = self.parse_type()?;
                Ok(Expr::MapType {
                    key: Box::new(key),
                    value: Box::new(value),
                })
            }
            TokenKind::Struct => self.struct_type(),
            TokenKind::Interface => self.interface_type(),
            TokenKind::LParen => {
                self.bump();
                let ty = self.parse_type()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr::Paren(Box::new(ty)))
            }
            _ => Err(self.error("type")),
        }
    }

    /// `T`, `pkg.T`, optionally instantiated as `T[A, B]`
    fn type_name(&mut self) -> PResult<Expr> {
        let mut ty = Expr::Ident(self.ident()?);
        if self.eat(TokenKind::Period) {
            let sel = self.ident()?;
            ty = Expr::Selector {
                x: Box::new(ty),
                sel,
            };
        }
        if self.at(TokenKind::LBrack) && self.peek_at(1) != TokenKind::RBrack {
            self.bump();
            let mut indices = vec![self.type_elem()?];
            while self.eat(TokenKind::Comma) {
                if self.at(TokenKind::RBrack) {
                    break;
                }
                indices.push(self.type_elem()?);
            }
            self.expect(TokenKind::RBrack, "']'")?;
            ty = Expr::Index {
                x: Box::new(ty),
                indices,
            };
        }
        Ok(ty)
    }

    fn array_type(&mut self) -> PResult<Expr> {
        self.expect(TokenKind::LBrack, "'['")?;
        let len = if self.eat(TokenKind::RBrack) {
            None
        } else {
            let len = if self.at(TokenKind::Ellipsis) {
                self.bump();
                Expr::Ellipsis(None)
            } else {
                self.expr_lev += 1;
                let len = self.expr();
                self.expr_lev -= 1;
                len?
            };
            self.expect(TokenKind::RBrack, "']'")?;
            Some(Box::new(len))
        };
        let elem = self.parse_type()?;
        Ok(Expr::ArrayType {
            len,
            elem: Box::new(elem),
        })
    }

    /// Constraint or interface element: `~T | U | ...`
    fn type_elem(&mut self) -> PResult<Expr> {
        let mut elem = self.type_term()?;
        while self.eat(TokenKind::Or) {
            let rhs = self.type_term()?;
            elem = Expr::Binary(Box::new(elem), Box::new(rhs));
        }
        Ok(elem)
    }

    fn type_term(&mut self) -> PResult<Expr> {
        if self.eat(TokenKind::Tilde) {
            Ok(Expr::Unary(Box::new(self.parse_type()?)))
        } else {
            self.parse_type()
        }
    }

    fn struct_type(&mut self) -> PResult<Expr> {
        self.expect(TokenKind::Struct, "'struct'")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            fields.push(self.field_decl()?);
            if matches!(self.peek(), TokenKind::String | TokenKind::RawString) {
                self.bump();
            }
            self.expect_semi()?;
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expr::StructType(fields))
    }

    fn field_decl(&mut self) -> PResult<Field> {
        let embedded = match self.peek() {
            TokenKind::Mul | TokenKind::LParen => true,
            TokenKind::Ident => match self.peek_at(1) {
                TokenKind::Period
                | TokenKind::Semicolon
                | TokenKind::RBrace
                | TokenKind::String
                | TokenKind::RawString => true,
                TokenKind::LBrack => !self.ident_then_array_type(),
                _ => false,
            },
            _ => return Err(self.error("field name or embedded type")),
        };
        if embedded {
            let ty = self.parse_type()?;
            return Ok(Field {
                names: Vec::new(),
                ty,
            });
        }
        let names = self.ident_list()?;
        let ty = self.parse_type()?;
        Ok(Field { names, ty })
    }

    fn interface_type(&mut self) -> PResult<Expr> {
        self.expect(TokenKind::Interface, "'interface'")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut elems = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            if self.at(TokenKind::Ident) && self.peek_at(1) == TokenKind::LParen {
                let name = self.ident()?;
                let sig = self.signature()?;
                elems.push(Field {
                    names: vec![name],
                    ty: Expr::FuncType(sig),
                });
            } else {
                elems.push(Field {
                    names: Vec::new(),
                    ty: self.type_elem()?,
                });
            }
            self.expect_semi()?;
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expr::InterfaceType(elems))
    }

    // ---- expressions ----

    fn expr(&mut self) -> PResult<Expr> {
        self.binary_expr(1)
    }

    fn expr_list(&mut self) -> PResult<Vec<Expr>> {
        let mut list = vec![self.expr()?];
        while self.eat(TokenKind::Comma) {
            list.push(self.expr()?);
        }
        Ok(list)
    }

    fn binary_expr(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut x = self.unary_expr()?;
        loop {
            let prec = self.peek().precedence();
            if prec == 0 || prec < min_prec {
                return Ok(x);
            }
            self.bump();
            let y = self.binary_expr(prec + 1)?;
            x = Expr::Binary(Box::new(x), Box::new(y));
        }
    }

    fn unary_expr(&mut self) -> PResult<Expr> {
        match self.peek() {
            TokenKind::Add
            | TokenKind::Sub
            | TokenKind::Not
            | TokenKind::Xor
            | TokenKind::And
            | TokenKind::Tilde => {
                self.bump();
                Ok(Expr::Unary(Box::new(self.unary_expr()?)))
            }
            TokenKind::Arrow => {
                self.bump();
                if self.eat(TokenKind::Chan) {
                    self.eat(TokenKind::Arrow);
                    let elem = self.parse_type()?;
                    return Ok(Expr::ChanType(Box::new(elem)));
                }
                Ok(Expr::Unary(Box::new(self.unary_expr()?)))
            }
            TokenKind::Mul => {
                self.bump();
                Ok(Expr::Star(Box::new(self.unary_expr()?)))
            }
            _ => self.primary_expr(),
        }
    }

    fn primary_expr(&mut self) -> PResult<Expr> {
        let mut x = self.operand()?;
        loop {
            x = match self.peek() {
                TokenKind::Period => {
                    self.bump();
                    if self.at(TokenKind::Ident) {
                        Expr::Selector {
                            x: Box::new(x),
                            sel: self.ident()?,
                        }
                    } else {
                        self.expect(TokenKind::LParen, "selector or type assertion")?;
                        let ty = if self.eat(TokenKind::Type) {
                            None
                        } else {
                            Some(Box::new(self.parse_type()?))
                        };
                        self.expect(TokenKind::RParen, "')'")?;
                        Expr::TypeAssert { x: Box::new(x), ty }
                    }
                }
                TokenKind::LBrack => self.index_or_slice(x)?,
                TokenKind::LParen => self.call(x)?,
                TokenKind::LBrace if self.composite_allowed(&x) => {
                    let elts = self.literal_value()?;
                    Expr::CompositeLit {
                        ty: Some(Box::new(x)),
                        elts,
                    }
                }
                _ => return Ok(x),
            };
        }
    }

    fn composite_allowed(&self, x: &Expr) -> bool {
        if !x.is_literal_type() {
            return false;
        }
        self.expr_lev >= 0 || !matches!(x, Expr::Ident(_) | Expr::Selector { .. } | Expr::Index { .. })
    }

    fn operand(&mut self) -> PResult<Expr> {
        match self.peek() {
            TokenKind::Ident => Ok(Expr::Ident(self.ident()?)),
            kind if kind.is_literal() => Ok(Expr::BasicLit(self.bump().span)),
            TokenKind::LParen => {
                self.bump();
                self.expr_lev += 1;
                let inner = self.expr();
                self.expr_lev -= 1;
                let inner = inner?;
                self.expect_closing(TokenKind::RParen, "')'")?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            TokenKind::Func => {
                self.bump();
                let sig = self.signature()?;
                if !self.at(TokenKind::LBrace) {
                    return Ok(Expr::FuncType(sig));
                }
                self.expr_lev += 1;
                let body = self.block();
                self.expr_lev -= 1;
                Ok(Expr::FuncLit { sig, body: body? })
            }
            TokenKind::LBrack
            | TokenKind::Struct
            | TokenKind::Map
            | TokenKind::Chan
            | TokenKind::Interface => self.parse_type(),
            _ => Err(self.error("expression")),
        }
    }

    fn index_or_slice(&mut self, x: Expr) -> PResult<Expr> {
        self.expect(TokenKind::LBrack, "'['")?;
        self.expr_lev += 1;
        let result = self.index_or_slice_inner(x);
        self.expr_lev -= 1;
        let expr = result?;
        self.expect(TokenKind::RBrack, "']'")?;
        Ok(expr)
    }

    fn index_or_slice_inner(&mut self, x: Expr) -> PResult<Expr> {
        let first = if self.at(TokenKind::Colon) {
            None
        } else {
            Some(self.index_elem()?)
        };
        if !self.at(TokenKind::Colon) {
            let mut indices: Vec<Expr> = first.into_iter().collect();
            while self.eat(TokenKind::Comma) {
                if self.at(TokenKind::RBrack) {
                    break;
                }
                indices.push(self.index_elem()?);
            }
            return Ok(Expr::Index {
                x: Box::new(x),
                indices,
            });
        }
        let mut bounds: Vec<Expr> = first.into_iter().collect();
        while self.eat(TokenKind::Colon) {
            if !matches!(self.peek(), TokenKind::Colon | TokenKind::RBrack) {
                bounds.push(self.expr()?);
            }
        }
        Ok(Expr::Slice {
            x: Box::new(x),
            bounds,
        })
    }

    /// Index expression or type argument (which may be a union in constraints)
    fn index_elem(&mut self) -> PResult<Expr> {
        if self.at(TokenKind::Tilde) {
            self.type_elem()
        } else {
            self.expr()
        }
    }

    fn call(&mut self, fun: Expr) -> PResult<Expr> {
        self.expect(TokenKind::LParen, "'('")?;
        self.expr_lev += 1;
        let mut args = Vec::new();
        let mut result = Ok(());
        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
            match self.expr() {
                Ok(arg) => args.push(arg),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
            self.eat(TokenKind::Ellipsis);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expr_lev -= 1;
        result?;
        self.expect_closing(TokenKind::RParen, "')'")?;
        Ok(Expr::Call {
            fun: Box::new(fun),
            args,
        })
    }

    fn literal_value(&mut self) -> PResult<Vec<Expr>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let saved = std::mem::replace(&mut self.expr_lev, 0);
        let mut elts = Vec::new();
        let mut result = Ok(());
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            match self.element() {
                Ok(elt) => elts.push(elt),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expr_lev = saved;
        result?;
        self.expect_closing(TokenKind::RBrace, "'}'")?;
        Ok(elts)
    }

    fn element(&mut self) -> PResult<Expr> {
        let key = self.element_value()?;
        if self.eat(TokenKind::Colon) {
            let value = self.element_value()?;
            return Ok(Expr::KeyValue {
                key: Box::new(key),
                value: Box::new(value),
            });
        }
        Ok(key)
    }

    fn element_value(&mut self) -> PResult<Expr> {
        if self.at(TokenKind::LBrace) {
            let elts = self.literal_value()?;
            Ok(Expr::CompositeLit { ty: None, elts })
        } else {
            self.expr()
        }
    }

    // ---- statements ----

    fn block(&mut self) -> PResult<Block> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let stmts = self.stmt_list()?;
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Block { stmts })
    }

    fn stmt_list(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !matches!(
            self.peek(),
            TokenKind::RBrace | TokenKind::Case | TokenKind::Default | TokenKind::Eof
        ) {
            let stmt = self.stmt()?;
            if !matches!(stmt, Stmt::Empty) {
                stmts.push(stmt);
            }
            if matches!(
                self.peek(),
                TokenKind::RBrace | TokenKind::Case | TokenKind::Default
            ) {
                break;
            }
            self.expect(TokenKind::Semicolon, "';' or newline")?;
        }
        Ok(stmts)
    }

    fn stmt(&mut self) -> PResult<Stmt> {
        match self.peek() {
            TokenKind::Const | TokenKind::Var | TokenKind::Type => Ok(Stmt::Decl(self.gen_decl()?)),
            TokenKind::Go => {
                self.bump();
                Ok(Stmt::Go(self.expr()?))
            }
            TokenKind::Defer => {
                self.bump();
                Ok(Stmt::Defer(self.expr()?))
            }
            TokenKind::Return => {
                self.bump();
                let results = if matches!(self.peek(), TokenKind::Semicolon | TokenKind::RBrace) {
                    Vec::new()
                } else {
                    self.expr_list()?
                };
                Ok(Stmt::Return(results))
            }
            TokenKind::Break | TokenKind::Continue | TokenKind::Goto | TokenKind::Fallthrough => {
                self.bump();
                let label = if self.at(TokenKind::Ident) {
                    Some(self.ident()?)
                } else {
                    None
                };
                Ok(Stmt::Branch(label))
            }
            TokenKind::LBrace => Ok(Stmt::Block(self.block()?)),
            TokenKind::If => self.if_stmt(),
            TokenKind::Switch => self.switch_stmt(),
            TokenKind::Select => self.select_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Semicolon | TokenKind::RBrace => Ok(Stmt::Empty),
            _ => self.simple_stmt(StmtMode::LabelOk),
        }
    }

    fn simple_stmt(&mut self, mode: StmtMode) -> PResult<Stmt> {
        if mode == StmtMode::RangeOk && self.eat(TokenKind::Range) {
            return Ok(Stmt::Range {
                key: None,
                value: None,
                define: false,
                x: self.expr()?,
                body: Block::default(),
            });
        }
        let mut lhs = self.expr_list()?;
        let kind = self.peek();
        if kind == TokenKind::Define || kind.is_assign_op() {
            self.bump();
            let define = kind == TokenKind::Define;
            if mode == StmtMode::RangeOk
                && (define || kind == TokenKind::Assign)
                && self.eat(TokenKind::Range)
            {
                let mut parts = lhs.into_iter();
                return Ok(Stmt::Range {
                    key: parts.next(),
                    value: parts.next(),
                    define,
                    x: self.expr()?,
                    body: Block::default(),
                });
            }
            let rhs = self.expr_list()?;
            return Ok(Stmt::Assign { lhs, rhs, define });
        }
        if lhs.len() > 1 {
            return Err(self.error("':=' or '='"));
        }
        let Some(x) = lhs.pop() else {
            return Err(self.error("expression"));
        };
        match kind {
            TokenKind::Colon if mode == StmtMode::LabelOk => {
                let Expr::Ident(label) = x else {
                    return Err(self.error("';' or newline"));
                };
                self.bump();
                let stmt = self.stmt()?;
                Ok(Stmt::Labeled {
                    label,
                    stmt: Box::new(stmt),
                })
            }
            TokenKind::Arrow => {
                self.bump();
                Ok(Stmt::Send {
                    chan: x,
                    value: self.expr()?,
                })
            }
            TokenKind::Inc | TokenKind::Dec => {
                self.bump();
                Ok(Stmt::IncDec(x))
            }
            _ => Ok(Stmt::Expr(x)),
        }
    }

    /// Parse a control clause header with composite literals disabled
    fn header<T>(&mut self, parse: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        let saved = std::mem::replace(&mut self.expr_lev, -1);
        let result = parse(self);
        self.expr_lev = saved;
        result
    }

    fn if_stmt(&mut self) -> PResult<Stmt> {
        self.expect(TokenKind::If, "'if'")?;
        let (init, cond) = self.header(|p| {
            let first = if p.at(TokenKind::Semicolon) {
                None
            } else {
                Some(p.simple_stmt(StmtMode::Basic)?)
            };
            if p.eat(TokenKind::Semicolon) {
                let cond = p.simple_stmt(StmtMode::Basic)?;
                Ok((first, Some(cond)))
            } else {
                Ok((None, first))
            }
        })?;
        let cond = match cond {
            Some(Stmt::Expr(cond)) => cond,
            _ => return Err(self.error("condition in if statement")),
        };
        let then = self.block()?;
        let els = if self.eat(TokenKind::Else) {
            match self.peek() {
                TokenKind::If => Some(Box::new(self.if_stmt()?)),
                TokenKind::LBrace => Some(Box::new(Stmt::Block(self.block()?))),
                _ => return Err(self.error("if statement or block")),
            }
        } else {
            None
        };
        Ok(Stmt::If {
            init: init.map(Box::new),
            cond,
            then,
            els,
        })
    }

    fn switch_stmt(&mut self) -> PResult<Stmt> {
        self.expect(TokenKind::Switch, "'switch'")?;
        let (init, tag) = self.header(|p| {
            let mut init = None;
            let mut tag = None;
            if !p.at(TokenKind::LBrace) {
                if !p.at(TokenKind::Semicolon) {
                    tag = Some(p.simple_stmt(StmtMode::Basic)?);
                }
                if p.eat(TokenKind::Semicolon) {
                    init = tag.take();
                    if !p.at(TokenKind::LBrace) {
                        tag = Some(p.simple_stmt(StmtMode::Basic)?);
                    }
                }
            }
            Ok((init, tag))
        })?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut clauses = Vec::new();
        while matches!(self.peek(), TokenKind::Case | TokenKind::Default) {
            let list = if self.eat(TokenKind::Case) {
                self.expr_list()?
            } else {
                self.bump();
                Vec::new()
            };
            self.expect(TokenKind::Colon, "':'")?;
            clauses.push(CaseClause {
                list,
                body: self.stmt_list()?,
            });
        }
        self.expect(TokenKind::RBrace, "'}'")?;

        let init = init.map(Box::new);
        match tag {
            None => Ok(Stmt::Switch {
                init,
                tag: None,
                clauses,
            }),
            Some(Stmt::Expr(x)) if is_type_switch_guard(&x) => Ok(Stmt::TypeSwitch {
                init,
                binding: None,
                subject: x,
                clauses,
            }),
            Some(Stmt::Assign { mut lhs, mut rhs, define: true })
                if lhs.len() == 1 && rhs.len() == 1 && is_type_switch_guard(&rhs[0]) =>
            {
                let (Some(Expr::Ident(binding)), Some(subject)) = (lhs.pop(), rhs.pop()) else {
                    return Err(self.error("type switch guard"));
                };
                Ok(Stmt::TypeSwitch {
                    init,
                    binding: Some(binding),
                    subject,
                    clauses,
                })
            }
            Some(Stmt::Expr(x)) => Ok(Stmt::Switch {
                init,
                tag: Some(x),
                clauses,
            }),
            Some(_) => Err(self.error("switch expression")),
        }
    }

    fn select_stmt(&mut self) -> PResult<Stmt> {
        self.expect(TokenKind::Select, "'select'")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut clauses = Vec::new();
        while matches!(self.peek(), TokenKind::Case | TokenKind::Default) {
            let comm = if self.eat(TokenKind::Case) {
                Some(Box::new(self.simple_stmt(StmtMode::Basic)?))
            } else {
                self.bump();
                None
            };
            self.expect(TokenKind::Colon, "':'")?;
            clauses.push(CommClause {
                comm,
                body: self.stmt_list()?,
            });
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Stmt::Select(clauses))
    }

    fn for_stmt(&mut self) -> PResult<Stmt> {
        self.expect(TokenKind::For, "'for'")?;
        let (init, cond, post) = self.header(|p| {
            let (mut init, mut cond, mut post) = (None, None, None);
            if p.at(TokenKind::LBrace) {
                return Ok((init, cond, post));
            }
            if !p.at(TokenKind::Semicolon) {
                cond = Some(p.simple_stmt(StmtMode::RangeOk)?);
                if matches!(cond, Some(Stmt::Range { .. })) {
                    return Ok((init, cond, post));
                }
            }
            if p.eat(TokenKind::Semicolon) {
                init = cond.take();
                if !p.at(TokenKind::Semicolon) {
                    cond = Some(p.simple_stmt(StmtMode::Basic)?);
                }
                p.expect(TokenKind::Semicolon, "';'")?;
                if !p.at(TokenKind::LBrace) {
                    post = Some(p.simple_stmt(StmtMode::Basic)?);
                }
            }
            Ok((init, cond, post))
        })?;
        let body = self.block()?;

        if let Some(Stmt::Range {
            key,
            value,
            define,
            x,
            ..
        }) = cond
        {
            return Ok(Stmt::Range {
                key,
                value,
                define,
                x,
                body,
            });
        }
        let cond = match cond {
            None => None,
            Some(Stmt::Expr(cond)) => Some(cond),
            Some(_) => return Err(self.error("for loop condition")),
        };
        Ok(Stmt::For {
            init: init.map(Box::new),
            cond,
            post: post.map(Box::new),
            body,
        })
    }
}

fn is_type_switch_guard(x: &Expr) -> bool {
    matches!(x, Expr::TypeAssert { ty: None, .. })
}

/// Tokens that may begin a type
fn starts_type(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Ident
            | TokenKind::LBrack
            | TokenKind::Mul
            | TokenKind::Func
            | TokenKind::Map
            | TokenKind::Chan
            | TokenKind::Struct
            | TokenKind::Interface
            | TokenKind::Arrow
            | TokenKind::LParen
    )
}

/// Turn raw parameter entries into fields
///
/// Either every entry is a bare type, or names are grouped with the type that
/// follows them: `(a, b int, c string)`.
fn group_parameters(entries: Vec<(Expr, Option<Expr>)>, offset: u32) -> PResult<Vec<Field>> {
    if entries.iter().all(|(_, ty)| ty.is_none()) {
        return Ok(entries
            .into_iter()
            .map(|(ty, _)| Field {
                names: Vec::new(),
                ty,
            })
            .collect());
    }
    let mut fields = Vec::new();
    let mut pending = Vec::new();
    for (first, ty) in entries {
        let Expr::Ident(name) = first else {
            return Err(ParseError::new(
                offset as usize,
                "mixed named and unnamed parameters",
            ));
        };
        pending.push(name);
        if let Some(ty) = ty {
            fields.push(Field {
                names: std::mem::take(&mut pending),
                ty,
            });
        }
    }
    if pending.is_empty() {
        Ok(fields)
    } else {
        Err(ParseError::new(
            offset as usize,
            "mixed named and unnamed parameters",
        ))
    }
}

/// Link each top-level declaration to the comment group ending on the line
/// right above it, provided no other token sits in between and the group
/// does not trail the previous declaration's last line
fn attach_doc_comments(file: &mut File, source: &str) {
    let lines = LineIndex::new(source);
    let mut prev_end = file
        .import_decls
        .last()
        .map_or(file.package_span.end, |decl| decl.span.end);
    let comments = &file.comments;
    for decl in &mut file.decls {
        let start = decl.span().start;
        let before = comments.partition_point(|group| group.span.end <= start);
        let doc = before.checked_sub(1).filter(|&index| {
            let group = &comments[index];
            group.span.start >= prev_end
                && lines.line(group.span.start) > lines.line(prev_end)
                && lines.line(group.span.end) + 1 == lines.line(start)
        });
        match decl {
            Decl::Gen(gen_decl) => gen_decl.doc = doc,
            Decl::Func(func_decl) => func_decl.doc = doc,
        }
        prev_end = decl.span().end;
    }
}

//! Name resolution for one Go package
//!
//! Builds the definition and use maps the bundler needs: every identifier
//! occurrence that declares something is recorded in `defs`, every occurrence
//! that refers to something declared in this package (or to an import name)
//! in `uses`. Predeclared identifiers and names from other packages stay
//! unresolved.
//!
//! Without type inference, field and method selections `x.f` are resolved by
//! name against the members declared in this package, and composite literal
//! keys against the literal's struct type when that type is declared here.

use indexmap::IndexMap;
use log::trace;
use rustc_hash::FxHashMap;

use crate::syntax::{
    IdentArena, SourceFile,
    ast::{
        Block, CaseClause, Decl, DeclKeyword, Expr, Field, FileId, FuncDecl, FuncType, GenDecl,
        Ident, IdentId, Spec, Stmt, TypeSpec,
    },
};

/// Unique identifier for a symbol within one package's table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Const,
    Var,
    TypeName,
    Func,
    /// Struct field; `embedded` fields are named after their type
    Field { embedded: bool },
    /// Concrete or interface method
    Method,
    /// Import name binding
    PkgName { path: String },
    /// Anything declared inside a function or signature
    Local,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Import path of the declaring package
    pub package: String,
}

impl Symbol {
    pub fn is_type_name(&self) -> bool {
        self.kind == SymbolKind::TypeName
    }
}

/// `qualifier.Selector` where the qualifier is an import name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualifiedRef {
    pub file: FileId,
    pub qualifier: IdentId,
    pub selector: IdentId,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub symbols: Vec<Symbol>,
    /// Identifier occurrences that declare a symbol, in source order
    pub defs: IndexMap<IdentId, SymbolId>,
    /// Identifier occurrences that refer to a symbol, in source order
    pub uses: IndexMap<IdentId, SymbolId>,
    /// Package-scope symbols sorted by name
    pub package_scope: Vec<SymbolId>,
    pub qualified_refs: Vec<QualifiedRef>,
}

impl SymbolTable {
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn def_of(&self, ident: IdentId) -> Option<SymbolId> {
        self.defs.get(&ident).copied()
    }

    pub fn use_of(&self, ident: IdentId) -> Option<SymbolId> {
        self.uses.get(&ident).copied()
    }

    pub fn lookup_package(&self, name: &str) -> Option<SymbolId> {
        self.package_scope
            .binary_search_by(|id| self.symbol(*id).name.as_str().cmp(name))
            .ok()
            .map(|index| self.package_scope[index])
    }

    /// Every definition and use site of `symbol`
    pub fn occurrences(&self, symbol: SymbolId) -> impl Iterator<Item = IdentId> + '_ {
        self.defs
            .iter()
            .chain(self.uses.iter())
            .filter(move |(_, sym)| **sym == symbol)
            .map(|(ident, _)| *ident)
    }

    fn add(&mut self, name: &str, kind: SymbolKind, package: &str) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            name: name.to_owned(),
            kind,
            package: package.to_owned(),
        });
        id
    }
}

/// What an elided composite literal inside a literal of this type looks like
#[derive(Debug, Clone)]
enum Shape {
    Unknown,
    /// Index into the resolver's struct field maps
    Struct(usize),
    Array(Box<Shape>),
    Map(Box<Shape>, Box<Shape>),
}

/// What is known about the type of a value on the left of a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Declared by another package; none of its members are declared here
    Foreign,
    /// A struct type of this package, by index into the field maps
    Local(usize),
}

type Scope = FxHashMap<String, SymbolId>;

/// Resolve all files of one package
///
/// `import_name` maps an import path to the name the imported package
/// declares; it is consulted for imports without an explicit name.
pub fn resolve_package(
    package: &str,
    files: &[SourceFile],
    arena: &IdentArena,
    import_name: &dyn Fn(&str) -> String,
) -> SymbolTable {
    let mut resolver = Resolver {
        package,
        arena,
        table: SymbolTable::default(),
        scopes: Vec::new(),
        members: FxHashMap::default(),
        structs: Vec::new(),
        type_shapes: FxHashMap::default(),
        origins: FxHashMap::default(),
    };

    let package_scope = resolver.declare_package_scope(files);
    let file_scopes: Vec<Scope> = files
        .iter()
        .map(|file| resolver.file_scope(file, import_name))
        .collect();

    // Types and method names first so literals and selections anywhere in
    // the package can see every struct and member
    resolver.scopes = vec![package_scope];
    for (file, scope) in files.iter().zip(&file_scopes) {
        resolver.scopes.truncate(1);
        resolver.scopes.push(scope.clone());
        resolver.declare_types_and_methods(file);
    }
    for (file, scope) in files.iter().zip(&file_scopes) {
        resolver.scopes.truncate(1);
        resolver.scopes.push(scope.clone());
        resolver.declare_package_var_origins(file);
    }
    for (file, scope) in files.iter().zip(file_scopes) {
        resolver.scopes.truncate(1);
        resolver.scopes.push(scope);
        resolver.walk_file(file);
    }

    resolver.finish()
}

struct Resolver<'a> {
    package: &'a str,
    arena: &'a IdentArena,
    table: SymbolTable,
    scopes: Vec<Scope>,
    /// Field and method symbols by name, for selections
    members: FxHashMap<String, Vec<SymbolId>>,
    /// Field maps of every struct type seen
    structs: Vec<Scope>,
    type_shapes: FxHashMap<SymbolId, Shape>,
    /// Type origin of variables, parameters and fields
    origins: FxHashMap<SymbolId, Origin>,
}

impl<'a> Resolver<'a> {
    fn name(&self, ident: Ident) -> &'a str {
        self.arena.original(ident.id)
    }

    fn finish(mut self) -> SymbolTable {
        let mut scope: Vec<SymbolId> = self
            .scopes
            .first()
            .map(|scope| scope.values().copied().collect())
            .unwrap_or_default();
        scope.sort_by(|a, b| self.table.symbol(*a).name.cmp(&self.table.symbol(*b).name));
        self.table.package_scope = scope;
        self.table
    }

    // ---- scopes ----

    fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn scoped(&mut self, walk: impl FnOnce(&mut Self)) {
        self.scopes.push(Scope::default());
        walk(self);
        self.scopes.pop();
    }

    fn resolve(&mut self, ident: Ident) {
        if let Some(symbol) = self.lookup(self.name(ident)) {
            self.table.uses.insert(ident.id, symbol);
        }
    }

    fn declare_local(&mut self, ident: Ident) {
        let name = self.name(ident).to_owned();
        if name == "_" {
            return;
        }
        let symbol = self.table.add(&name, SymbolKind::Local, self.package);
        self.table.defs.insert(ident.id, symbol);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, symbol);
        }
    }

    fn declare_member(&mut self, ident: Ident, kind: SymbolKind) -> SymbolId {
        let name = self.name(ident).to_owned();
        let symbol = self.table.add(&name, kind, self.package);
        self.table.defs.insert(ident.id, symbol);
        self.members.entry(name).or_default().push(symbol);
        symbol
    }

    /// Resolve `x.sel` by member name
    ///
    /// A selection on a value of another package's type stays unresolved.
    /// On a local struct value the struct's own fields win; otherwise the
    /// name has to belong to exactly one member of the package.
    fn resolve_member(&mut self, x: &Expr, sel: Ident) {
        let name = self.name(sel);
        let chosen = match self.value_origin(x) {
            Some(Origin::Foreign) => None,
            Some(Origin::Local(index)) => self.structs[index]
                .get(name)
                .copied()
                .or_else(|| self.unique_member(name)),
            None => self.unique_member(name),
        };
        if let Some(symbol) = chosen {
            trace!("selection {name} -> member #{}", symbol.as_u32());
            self.table.uses.insert(sel.id, symbol);
        }
    }

    fn unique_member(&self, name: &str) -> Option<SymbolId> {
        match self.members.get(name)?.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    // ---- type origins ----

    fn is_package_name(&self, ident: Ident) -> bool {
        self.lookup(self.name(ident)).is_some_and(|symbol| {
            matches!(self.table.symbol(symbol).kind, SymbolKind::PkgName { .. })
        })
    }

    /// Origin of a named type expression: `T`, `*T`, `T[int]`, `pkg.T`
    fn type_origin(&self, ty: &Expr) -> Option<Origin> {
        match ty {
            Expr::Star(inner) | Expr::Paren(inner) => self.type_origin(inner),
            Expr::Index { x, .. } => self.type_origin(x),
            Expr::Selector { x, .. } => match &**x {
                Expr::Ident(qualifier) if self.is_package_name(*qualifier) => Some(Origin::Foreign),
                _ => None,
            },
            Expr::Ident(ident) => {
                let symbol = self.lookup(self.name(*ident))?;
                match self.type_shapes.get(&symbol)? {
                    Shape::Struct(index) => Some(Origin::Local(*index)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Origin of the type of an expression, as far as it can be told
    /// without type inference
    fn value_origin(&self, x: &Expr) -> Option<Origin> {
        match x {
            Expr::Ident(ident) => {
                let symbol = self.lookup(self.name(*ident))?;
                self.origins.get(&symbol).copied()
            }
            Expr::Paren(inner) | Expr::Unary(inner) | Expr::Star(inner) => self.value_origin(inner),
            Expr::CompositeLit { ty: Some(ty), .. } => self.type_origin(ty),
            Expr::Selector { x: operand, sel } => match &**operand {
                // a variable of another package
                Expr::Ident(qualifier) if self.is_package_name(*qualifier) => Some(Origin::Foreign),
                _ => self
                    .table
                    .use_of(sel.id)
                    .and_then(|field| self.origins.get(&field).copied()),
            },
            Expr::Call { fun, .. } => match &**fun {
                // constructors and conversions of another package
                Expr::Selector { x: operand, .. }
                    if matches!(&**operand, Expr::Ident(q) if self.is_package_name(*q)) =>
                {
                    Some(Origin::Foreign)
                }
                // conversion to a local type
                Expr::Ident(_) | Expr::Paren(_) => self.type_origin(fun),
                _ => None,
            },
            _ => None,
        }
    }

    fn record_origin(&mut self, ident: Ident, origin: Option<Origin>) {
        if let (Some(symbol), Some(origin)) = (self.table.def_of(ident.id), origin) {
            self.origins.insert(symbol, origin);
        }
    }

    /// Package-level variables are visible to every function body
    fn declare_package_var_origins(&mut self, file: &SourceFile) {
        for decl in &file.ast.decls {
            let Decl::Gen(gen_decl) = decl else {
                continue;
            };
            if gen_decl.keyword != DeclKeyword::Var {
                continue;
            }
            for spec in &gen_decl.specs {
                if let Spec::Value(spec) = spec {
                    self.record_value_spec_origins(&spec.names, spec.ty.as_ref(), &spec.values);
                }
            }
        }
    }

    fn record_value_spec_origins(&mut self, names: &[Ident], ty: Option<&Expr>, values: &[Expr]) {
        if let Some(ty) = ty {
            let origin = self.type_origin(ty);
            for name in names {
                self.record_origin(*name, origin);
            }
        } else if names.len() == values.len() {
            for (name, value) in names.iter().zip(values) {
                let origin = self.value_origin(value);
                self.record_origin(*name, origin);
            }
        }
    }

    // ---- package and file scope ----

    fn declare_package_scope(&mut self, files: &[SourceFile]) -> Scope {
        let mut scope = Scope::default();
        for file in files {
            for decl in &file.ast.decls {
                match decl {
                    Decl::Gen(gen_decl) => {
                        for (ident, kind) in gen_decl_names(gen_decl) {
                            self.declare_package(&mut scope, ident, kind);
                        }
                    }
                    Decl::Func(func) if func.recv.is_none() => {
                        if self.name(func.name) == "init" {
                            let symbol = self.table.add("init", SymbolKind::Func, self.package);
                            self.table.defs.insert(func.name.id, symbol);
                        } else {
                            self.declare_package(&mut scope, func.name, SymbolKind::Func);
                        }
                    }
                    Decl::Func(_) => {}
                }
            }
        }
        scope
    }

    fn declare_package(&mut self, scope: &mut Scope, ident: Ident, kind: SymbolKind) {
        let name = self.name(ident).to_owned();
        if name == "_" {
            return;
        }
        let symbol = self.table.add(&name, kind, self.package);
        self.table.defs.insert(ident.id, symbol);
        scope.entry(name).or_insert(symbol);
    }

    fn file_scope(&mut self, file: &SourceFile, import_name: &dyn Fn(&str) -> String) -> Scope {
        let mut scope = Scope::default();
        for import in file.ast.imports() {
            if import.dot {
                continue;
            }
            let name = match import.name {
                Some(ident) => self.name(ident).to_owned(),
                None => import_name(&import.path),
            };
            if name == "_" {
                continue;
            }
            let kind = SymbolKind::PkgName {
                path: import.path.clone(),
            };
            let symbol = self.table.add(&name, kind, self.package);
            if let Some(ident) = import.name {
                self.table.defs.insert(ident.id, symbol);
            }
            scope.insert(name, symbol);
        }
        scope
    }

    fn declare_types_and_methods(&mut self, file: &SourceFile) {
        for decl in &file.ast.decls {
            match decl {
                Decl::Gen(gen_decl) if gen_decl.keyword == DeclKeyword::Type => {
                    for spec in &gen_decl.specs {
                        if let Spec::Type(spec) = spec {
                            self.walk_type_spec(spec);
                        }
                    }
                }
                Decl::Func(func) if func.recv.is_some() => {
                    self.declare_member(func.name, SymbolKind::Method);
                }
                _ => {}
            }
        }
    }

    fn walk_file(&mut self, file: &SourceFile) {
        for decl in &file.ast.decls {
            match decl {
                Decl::Gen(gen_decl) => match gen_decl.keyword {
                    DeclKeyword::Const | DeclKeyword::Var => {
                        for spec in &gen_decl.specs {
                            if let Spec::Value(spec) = spec {
                                if let Some(ty) = &spec.ty {
                                    self.walk_type(ty);
                                }
                                for value in &spec.values {
                                    self.walk_expr(value);
                                }
                            }
                        }
                    }
                    DeclKeyword::Type | DeclKeyword::Import => {}
                },
                Decl::Func(func) => self.walk_func_decl(func),
            }
        }
    }

    // ---- declarations ----

    /// Walk a type spec whose name is already declared or is declared here
    fn walk_type_spec(&mut self, spec: &TypeSpec) {
        let symbol = match self.table.def_of(spec.name.id) {
            Some(symbol) => Some(symbol),
            None => {
                self.declare_local(spec.name);
                self.table.def_of(spec.name.id)
            }
        };
        self.scopes.push(Scope::default());
        self.declare_type_params(&spec.type_params);
        let shape = self.walk_type(&spec.ty);
        self.scopes.pop();
        if let Some(symbol) = symbol {
            self.type_shapes.insert(symbol, shape);
        }
    }

    fn declare_type_params(&mut self, params: &[Field]) {
        for param in params {
            for name in &param.names {
                self.declare_local(*name);
            }
        }
        for param in params {
            self.walk_type(&param.ty);
        }
    }

    fn walk_func_decl(&mut self, func: &FuncDecl) {
        self.scoped(|r| {
            if let Some(recv) = &func.recv {
                r.walk_receiver(recv);
            }
            r.declare_type_params(&func.type_params);
            r.declare_signature(&func.sig);
            if let Some(body) = &func.body {
                r.walk_stmts(&body.stmts);
            }
        });
    }

    /// Receiver type arguments declare the method's type parameters
    fn walk_receiver(&mut self, recv: &Field) {
        let mut base = &recv.ty;
        while let Expr::Star(inner) | Expr::Paren(inner) = base {
            base = inner.as_ref();
        }
        if let Expr::Index { x, indices } = base {
            self.walk_type(x);
            for index in indices {
                match index {
                    Expr::Ident(ident) => self.declare_local(*ident),
                    other => {
                        self.walk_type(other);
                    }
                }
            }
        } else {
            self.walk_type(base);
        }
        let origin = self.type_origin(&recv.ty);
        for name in &recv.names {
            self.declare_local(*name);
            self.record_origin(*name, origin);
        }
    }

    fn declare_signature(&mut self, sig: &FuncType) {
        for field in sig.params.iter().chain(&sig.results) {
            self.walk_type(&field.ty);
        }
        for field in sig.params.iter().chain(&sig.results) {
            let origin = self.type_origin(&field.ty);
            for name in &field.names {
                self.declare_local(*name);
                self.record_origin(*name, origin);
            }
        }
    }

    fn walk_local_decl(&mut self, decl: &GenDecl) {
        for spec in &decl.specs {
            match spec {
                Spec::Type(spec) => self.walk_type_spec(spec),
                Spec::Value(spec) => {
                    if let Some(ty) = &spec.ty {
                        self.walk_type(ty);
                    }
                    for value in &spec.values {
                        self.walk_expr(value);
                    }
                    for name in &spec.names {
                        self.declare_local(*name);
                    }
                    self.record_value_spec_origins(&spec.names, spec.ty.as_ref(), &spec.values);
                }
                Spec::Import(_) => {}
            }
        }
    }

    // ---- types ----

    fn walk_type(&mut self, ty: &Expr) -> Shape {
        match ty {
            Expr::Ident(ident) => {
                self.resolve(*ident);
                self.table
                    .use_of(ident.id)
                    .and_then(|symbol| self.type_shapes.get(&symbol).cloned())
                    .unwrap_or(Shape::Unknown)
            }
            Expr::Index { x, indices } => {
                let shape = self.walk_type(x);
                for index in indices {
                    self.walk_type(index);
                }
                shape
            }
            Expr::Star(inner) | Expr::Paren(inner) => self.walk_type(inner),
            Expr::ArrayType { len, elem } => {
                if let Some(len) = len {
                    self.walk_expr(len);
                }
                Shape::Array(Box::new(self.walk_type(elem)))
            }
            Expr::Ellipsis(elem) => match elem {
                Some(elem) => Shape::Array(Box::new(self.walk_type(elem))),
                None => Shape::Unknown,
            },
            Expr::MapType { key, value } => {
                let key = self.walk_type(key);
                let value = self.walk_type(value);
                Shape::Map(Box::new(key), Box::new(value))
            }
            Expr::StructType(fields) => self.walk_struct(fields),
            Expr::InterfaceType(elems) => {
                self.walk_interface(elems);
                Shape::Unknown
            }
            Expr::FuncType(sig) => {
                self.scoped(|r| r.declare_signature(sig));
                Shape::Unknown
            }
            Expr::ChanType(elem) | Expr::Unary(elem) => {
                self.walk_type(elem);
                Shape::Unknown
            }
            Expr::Binary(lhs, rhs) => {
                self.walk_type(lhs);
                self.walk_type(rhs);
                Shape::Unknown
            }
            other => {
                self.walk_expr(other);
                Shape::Unknown
            }
        }
    }

    fn walk_struct(&mut self, fields: &[Field]) -> Shape {
        let index = self.structs.len();
        self.structs.push(Scope::default());
        for field in fields {
            self.walk_type(&field.ty);
            let origin = self.type_origin(&field.ty);
            if field.names.is_empty() {
                if let Some(ident) = embedded_name(&field.ty) {
                    let symbol = self.declare_member(ident, SymbolKind::Field { embedded: true });
                    self.record_origin(ident, origin);
                    let name = self.name(ident).to_owned();
                    self.structs[index].insert(name, symbol);
                }
            }
            for name in &field.names {
                let symbol = self.declare_member(*name, SymbolKind::Field { embedded: false });
                self.record_origin(*name, origin);
                let name = self.name(*name).to_owned();
                self.structs[index].insert(name, symbol);
            }
        }
        Shape::Struct(index)
    }

    fn walk_interface(&mut self, elems: &[Field]) {
        for elem in elems {
            match (elem.names.first(), &elem.ty) {
                (Some(name), Expr::FuncType(sig)) => {
                    self.declare_member(*name, SymbolKind::Method);
                    self.scoped(|r| r.declare_signature(sig));
                }
                _ => {
                    self.walk_type(&elem.ty);
                }
            }
        }
    }

    // ---- statements ----

    fn walk_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.walk_stmt(stmt);
        }
    }

    fn walk_block(&mut self, block: &Block) {
        self.scoped(|r| r.walk_stmts(&block.stmts));
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Decl(decl) => self.walk_local_decl(decl),
            Stmt::Labeled { stmt, .. } => self.walk_stmt(stmt),
            Stmt::Expr(x) | Stmt::IncDec(x) | Stmt::Go(x) | Stmt::Defer(x) => self.walk_expr(x),
            Stmt::Send { chan, value } => {
                self.walk_expr(chan);
                self.walk_expr(value);
            }
            Stmt::Assign { lhs, rhs, define } => {
                for x in rhs {
                    self.walk_expr(x);
                }
                // taken before the left side can shadow a name on the right
                let origins: Vec<Option<Origin>> = if *define && lhs.len() == rhs.len() {
                    rhs.iter().map(|value| self.value_origin(value)).collect()
                } else {
                    Vec::new()
                };
                for x in lhs {
                    match x {
                        Expr::Ident(ident) if *define => self.define_or_reuse(*ident),
                        _ => self.walk_expr(x),
                    }
                }
                for (x, origin) in lhs.iter().zip(origins) {
                    if let Expr::Ident(ident) = x {
                        self.record_origin(*ident, origin);
                    }
                }
            }
            Stmt::Return(results) => {
                for x in results {
                    self.walk_expr(x);
                }
            }
            Stmt::Branch(_) | Stmt::Empty => {}
            Stmt::Block(block) => self.walk_block(block),
            _ => self.walk_control(stmt),
        }
    }

    /// `a, err := f()` declares `a` but reuses `err` from the same scope
    fn define_or_reuse(&mut self, ident: Ident) {
        let existing = self
            .scopes
            .last()
            .and_then(|scope| scope.get(self.name(ident)).copied());
        match existing {
            Some(symbol) => {
                self.table.uses.insert(ident.id, symbol);
            }
            None => self.declare_local(ident),
        }
    }

    fn walk_control(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::If {
                init,
                cond,
                then,
                els,
            } => self.scoped(|r| {
                if let Some(init) = init {
                    r.walk_stmt(init);
                }
                r.walk_expr(cond);
                r.walk_block(then);
                if let Some(els) = els {
                    r.walk_stmt(els);
                }
            }),
            Stmt::Switch { init, tag, clauses } => self.scoped(|r| {
                if let Some(init) = init {
                    r.walk_stmt(init);
                }
                if let Some(tag) = tag {
                    r.walk_expr(tag);
                }
                r.walk_clauses(clauses, None, false);
            }),
            Stmt::TypeSwitch {
                init,
                binding,
                subject,
                clauses,
            } => self.scoped(|r| {
                if let Some(init) = init {
                    r.walk_stmt(init);
                }
                r.walk_expr(subject);
                r.walk_clauses(clauses, *binding, true);
            }),
            Stmt::Select(clauses) => {
                for clause in clauses {
                    self.scoped(|r| {
                        if let Some(comm) = &clause.comm {
                            r.walk_stmt(comm);
                        }
                        r.walk_stmts(&clause.body);
                    });
                }
            }
            Stmt::For {
                init,
                cond,
                post,
                body,
            } => self.scoped(|r| {
                if let Some(init) = init {
                    r.walk_stmt(init);
                }
                if let Some(cond) = cond {
                    r.walk_expr(cond);
                }
                if let Some(post) = post {
                    r.walk_stmt(post);
                }
                r.walk_block(body);
            }),
            Stmt::Range {
                key,
                value,
                define,
                x,
                body,
            } => self.scoped(|r| {
                r.walk_expr(x);
                for var in key.iter().chain(value) {
                    match var {
                        Expr::Ident(ident) if *define => r.declare_local(*ident),
                        other => r.walk_expr(other),
                    }
                }
                r.walk_block(body);
            }),
            other => self.walk_stmt(other),
        }
    }

    fn walk_clauses(&mut self, clauses: &[CaseClause], binding: Option<Ident>, types: bool) {
        let mut bound = None;
        for clause in clauses {
            for x in &clause.list {
                if types {
                    self.walk_type(x);
                } else {
                    self.walk_expr(x);
                }
            }
            self.scoped(|r| {
                if let Some(ident) = binding {
                    // One symbol stands for the implicit variable of every clause
                    match bound {
                        Some(symbol) => {
                            let name = r.name(ident).to_owned();
                            if let Some(scope) = r.scopes.last_mut() {
                                scope.insert(name, symbol);
                            }
                        }
                        None => {
                            r.declare_local(ident);
                            bound = r.table.def_of(ident.id);
                        }
                    }
                }
                r.walk_stmts(&clause.body);
            });
        }
    }

    // ---- expressions ----

    fn walk_expr(&mut self, x: &Expr) {
        match x {
            Expr::Ident(ident) => self.resolve(*ident),
            Expr::BasicLit(_) => {}
            Expr::CompositeLit { ty, elts } => {
                self.walk_composite(ty.as_deref(), elts, Shape::Unknown);
            }
            Expr::FuncLit { sig, body } => self.scoped(|r| {
                r.declare_signature(sig);
                r.walk_stmts(&body.stmts);
            }),
            Expr::Selector { x, sel } => self.walk_selector(x, *sel),
            Expr::Index { x, indices } => {
                self.walk_expr(x);
                for index in indices {
                    self.walk_type(index);
                }
            }
            Expr::Slice { x, bounds } => {
                self.walk_expr(x);
                for bound in bounds {
                    self.walk_expr(bound);
                }
            }
            Expr::TypeAssert { x, ty } => {
                self.walk_expr(x);
                if let Some(ty) = ty {
                    self.walk_type(ty);
                }
            }
            Expr::Call { fun, args } => {
                self.walk_type(fun);
                for arg in args {
                    self.walk_type(arg);
                }
            }
            Expr::Paren(inner) | Expr::Star(inner) | Expr::Unary(inner) => self.walk_expr(inner),
            Expr::Binary(lhs, rhs) => {
                self.walk_expr(lhs);
                self.walk_expr(rhs);
            }
            Expr::KeyValue { key, value } => {
                self.walk_expr(key);
                self.walk_expr(value);
            }
            Expr::Ellipsis(_)
            | Expr::ArrayType { .. }
            | Expr::StructType(_)
            | Expr::FuncType(_)
            | Expr::InterfaceType(_)
            | Expr::MapType { .. }
            | Expr::ChanType(_) => {
                self.walk_type(x);
            }
        }
    }

    fn walk_selector(&mut self, x: &Expr, sel: Ident) {
        if let Expr::Ident(qualifier) = x
            && let Some(symbol) = self.lookup(self.name(*qualifier))
            && matches!(self.table.symbol(symbol).kind, SymbolKind::PkgName { .. })
        {
            self.table.uses.insert(qualifier.id, symbol);
            self.table.qualified_refs.push(QualifiedRef {
                file: self.arena.file(qualifier.id),
                qualifier: qualifier.id,
                selector: sel.id,
            });
            return;
        }
        self.walk_expr(x);
        self.resolve_member(x, sel);
    }

    fn walk_composite(&mut self, ty: Option<&Expr>, elts: &[Expr], inherited: Shape) {
        let shape = match ty {
            Some(ty) => self.walk_type(ty),
            None => inherited,
        };
        for elt in elts {
            let Expr::KeyValue { key, value } = elt else {
                let elem = match &shape {
                    Shape::Array(elem) | Shape::Map(_, elem) => (**elem).clone(),
                    Shape::Struct(_) | Shape::Unknown => Shape::Unknown,
                };
                self.walk_element(elt, elem);
                continue;
            };
            match &shape {
                Shape::Struct(index) => {
                    if let Expr::Ident(field) = &**key {
                        if let Some(symbol) = self.structs[*index].get(self.name(*field)).copied() {
                            self.table.uses.insert(field.id, symbol);
                        }
                    } else {
                        self.walk_expr(key);
                    }
                    self.walk_element(value, Shape::Unknown);
                }
                Shape::Map(key_shape, value_shape) => {
                    let (key_shape, value_shape) = ((**key_shape).clone(), (**value_shape).clone());
                    self.walk_element(key, key_shape);
                    self.walk_element(value, value_shape);
                }
                Shape::Array(elem) => {
                    let elem = (**elem).clone();
                    self.walk_expr(key);
                    self.walk_element(value, elem);
                }
                // Keys of literals of foreign types are field names of that type
                Shape::Unknown => {
                    if !matches!(**key, Expr::Ident(_)) {
                        self.walk_expr(key);
                    }
                    self.walk_element(value, Shape::Unknown);
                }
            }
        }
    }

    fn walk_element(&mut self, x: &Expr, shape: Shape) {
        match x {
            Expr::CompositeLit { ty: None, elts } => self.walk_composite(None, elts, shape),
            Expr::Unary(inner) if matches!(**inner, Expr::CompositeLit { ty: None, .. }) => {
                self.walk_element(inner, shape);
            }
            other => self.walk_expr(other),
        }
    }
}

/// Names declared by a package-level const, var or type declaration
fn gen_decl_names(decl: &GenDecl) -> Vec<(Ident, SymbolKind)> {
    let kind = match decl.keyword {
        DeclKeyword::Const => SymbolKind::Const,
        DeclKeyword::Var => SymbolKind::Var,
        DeclKeyword::Type => SymbolKind::TypeName,
        DeclKeyword::Import => return Vec::new(),
    };
    decl.specs
        .iter()
        .flat_map(|spec| match spec {
            Spec::Value(spec) => spec.names.clone(),
            Spec::Type(spec) => vec![spec.name],
            Spec::Import(_) => Vec::new(),
        })
        .map(|ident| (ident, kind.clone()))
        .collect()
}

/// The identifier an embedded field is named after: `T`, `*T`, `pkg.T`, `T[int]`
pub fn embedded_name(ty: &Expr) -> Option<Ident> {
    match ty {
        Expr::Ident(ident) => Some(*ident),
        Expr::Selector { sel, .. } => Some(*sel),
        Expr::Star(inner) | Expr::Paren(inner) => embedded_name(inner),
        Expr::Index { x, .. } => embedded_name(x),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct Fixture {
        arena: IdentArena,
        files: Vec<SourceFile>,
        table: SymbolTable,
    }

    fn resolve(sources: &[&str]) -> Fixture {
        let mut arena = IdentArena::new();
        let files: Vec<SourceFile> = sources
            .iter()
            .enumerate()
            .map(|(i, src)| {
                SourceFile::parse(FileId(i as u32), format!("f{i}.go"), (*src).to_owned(), &mut arena)
                    .expect("parses")
            })
            .collect();
        let table = resolve_package("example.com/p", &files, &arena, &|path: &str| {
            path.rsplit('/').next().unwrap_or(path).to_owned()
        });
        Fixture {
            arena,
            files,
            table,
        }
    }

    impl Fixture {
        /// (text, line) of every occurrence of the package-scope symbol `name`
        fn occurrences(&self, name: &str) -> Vec<(String, usize)> {
            let symbol = self.table.lookup_package(name).expect("declared");
            self.sites(symbol)
        }

        fn sites(&self, symbol: SymbolId) -> Vec<(String, usize)> {
            let mut sites: Vec<_> = self
                .table
                .occurrences(symbol)
                .map(|id| {
                    let file = &self.files[self.arena.file(id).0 as usize];
                    (
                        self.arena.original(id).to_owned(),
                        file.lines.line(self.arena.span(id).start) + 1,
                    )
                })
                .collect();
            sites.sort_by_key(|(_, line)| *line);
            sites
        }
    }

    #[test]
    fn test_package_scope_is_sorted_and_skips_init() {
        let fx = resolve(&[
            "package p\nfunc init() {}\nvar b, _ = 1, 2\nconst a = 0\ntype C struct{}\nfunc (C) m() {}\n",
        ]);
        let names: Vec<&str> = fx
            .table
            .package_scope
            .iter()
            .map(|id| fx.table.symbol(*id).name.as_str())
            .collect();
        assert_eq!(names, vec!["C", "a", "b"]);
    }

    #[test]
    fn test_locals_shadow_package_names() {
        let fx = resolve(&[
            "package p\n\nvar count int\n\nfunc f(count int) int {\n\treturn count\n}\n\nfunc g() int {\n\treturn count\n}\n",
        ]);
        assert_eq!(
            fx.occurrences("count"),
            vec![("count".to_owned(), 3), ("count".to_owned(), 10)]
        );
    }

    #[test]
    fn test_uses_across_files() {
        let fx = resolve(&[
            "package p\n\ntype Widget struct{ Name string }\n",
            "package p\n\nfunc New() *Widget {\n\treturn &Widget{Name: \"w\"}\n}\n",
        ]);
        let sites = fx.occurrences("Widget");
        assert_eq!(sites.len(), 3);
    }

    #[test]
    fn test_qualified_refs_recorded_for_imports() {
        let fx = resolve(&[
            "package p\n\nimport (\n\t\"fmt\"\n\tw \"example.com/widgets\"\n)\n\nfunc f() {\n\tfmt.Println(w.New())\n}\n",
        ]);
        let refs: Vec<(String, String)> = fx
            .table
            .qualified_refs
            .iter()
            .map(|r| {
                (
                    fx.arena.original(r.qualifier).to_owned(),
                    fx.arena.original(r.selector).to_owned(),
                )
            })
            .collect();
        assert_eq!(
            refs,
            vec![
                ("fmt".to_owned(), "Println".to_owned()),
                ("w".to_owned(), "New".to_owned())
            ]
        );
        let qualifier = fx.table.qualified_refs[1].qualifier;
        let symbol = fx.table.use_of(qualifier).expect("resolved");
        assert_eq!(
            fx.table.symbol(symbol).kind,
            SymbolKind::PkgName {
                path: "example.com/widgets".to_owned()
            }
        );
    }

    #[test]
    fn test_local_variable_named_like_import_is_not_qualified() {
        let fx = resolve(&[
            "package p\n\nimport \"strings\"\n\ntype T struct{ n int }\n\nfunc f(strings T) int {\n\treturn strings.n\n}\n",
        ]);
        assert!(fx.table.qualified_refs.is_empty());
    }

    #[test]
    fn test_embedded_field_is_def_and_use() {
        let fx = resolve(&[
            "package p\n\ntype Base struct{ ID int }\n\ntype Item struct {\n\tBase\n\tName string\n}\n\nfunc (i Item) key() int {\n\treturn i.Base.ID\n}\n\nvar zero = Item{Base: Base{ID: 0}}\n",
        ]);
        let base = fx.table.lookup_package("Base").expect("declared");
        let embedded_ident = fx
            .table
            .defs
            .iter()
            .find(|(id, sym)| {
                fx.arena.original(**id) == "Base"
                    && matches!(fx.table.symbol(**sym).kind, SymbolKind::Field { embedded: true })
            })
            .map(|(id, _)| *id)
            .expect("embedded field def");
        assert_eq!(fx.table.use_of(embedded_ident), Some(base));

        let field = fx.table.def_of(embedded_ident).expect("field");
        // definition, the `i.Base` selection and the literal key
        assert_eq!(
            fx.sites(field),
            vec![
                ("Base".to_owned(), 6),
                ("Base".to_owned(), 11),
                ("Base".to_owned(), 14)
            ]
        );
    }

    #[test]
    fn test_selection_on_foreign_value_stays_unresolved() {
        let fx = resolve(&[
            "package p\n\nimport \"bufio\"\n\ntype Reader struct{}\n\ntype Buffered struct{ Reader }\n\nfunc Wrap(rw *bufio.ReadWriter) *bufio.Reader {\n\treturn rw.Reader\n}\n\nfunc Own(b Buffered) Reader {\n\treturn b.Reader\n}\n\nfunc Made() {\n\trw := bufio.NewReadWriter(nil, nil)\n\t_ = rw.Reader\n}\n",
        ]);
        let field = fx
            .table
            .defs
            .iter()
            .find(|(_, sym)| matches!(fx.table.symbol(**sym).kind, SymbolKind::Field { embedded: true }))
            .map(|(_, sym)| *sym)
            .expect("embedded field");
        // the definition and the selection on a local Buffered only
        assert_eq!(
            fx.sites(field),
            vec![("Reader".to_owned(), 7), ("Reader".to_owned(), 14)]
        );
    }

    #[test]
    fn test_ambiguous_member_on_unknown_value_stays_unresolved() {
        let fx = resolve(&[
            "package p\n\ntype A struct{ ID int }\n\ntype B struct{ ID string }\n\nfunc id(get func() A) int {\n\treturn get().ID\n}\n\nfunc bid(b B) string {\n\treturn b.ID\n}\n",
        ]);
        let resolved_lines: Vec<usize> = fx
            .table
            .uses
            .keys()
            .filter(|id| fx.arena.original(**id) == "ID")
            .map(|id| fx.files[0].lines.line(fx.arena.span(*id).start) + 1)
            .collect();
        assert_eq!(resolved_lines, vec![12]);
    }

    #[test]
    fn test_foreign_literal_keys_are_not_resolved() {
        let fx = resolve(&[
            "package p\n\nimport \"net/http\"\n\nvar Handler http.Handler\n\nvar srv = http.Server{Handler: Handler}\n",
        ]);
        assert_eq!(
            fx.occurrences("Handler"),
            vec![("Handler".to_owned(), 5), ("Handler".to_owned(), 7)]
        );
        let key_line_uses = fx.occurrences("Handler").iter().filter(|(_, l)| *l == 7).count();
        assert_eq!(key_line_uses, 1);
    }

    #[test]
    fn test_elided_literals_use_element_type() {
        let fx = resolve(&[
            "package p\n\ntype Point struct{ X, Y int }\n\nvar X = 1\n\nvar pts = []Point{{X: X, Y: 2}}\n",
        ]);
        // the key resolves to the field, the value to the package var
        assert_eq!(
            fx.occurrences("X"),
            vec![("X".to_owned(), 5), ("X".to_owned(), 7)]
        );
    }

    #[test]
    fn test_generic_receiver_declares_type_params() {
        let fx = resolve(&[
            "package p\n\ntype T int\n\ntype List[E any] struct{ items []E }\n\nfunc (l *List[T]) Push(v T) {\n\tl.items = append(l.items, v)\n}\n",
        ]);
        // the receiver's T shadows the package type
        assert_eq!(fx.occurrences("T"), vec![("T".to_owned(), 3)]);
        assert_eq!(fx.occurrences("List").len(), 2);
    }

    #[test]
    fn test_short_var_redeclaration_reuses_symbol() {
        let fx = resolve(&[
            "package p\n\nfunc f() (int, error) { return 0, nil }\n\nfunc g() error {\n\ta, err := f()\n\tb, err := f()\n\t_ = a + b\n\treturn err\n}\n",
        ]);
        let err_defs = fx
            .table
            .defs
            .keys()
            .filter(|id| fx.arena.original(**id) == "err")
            .count();
        assert_eq!(err_defs, 1);
    }

    #[test]
    fn test_type_switch_binding() {
        let fx = resolve(&[
            "package p\n\ntype A struct{}\n\nfunc f(x any) {\n\tswitch v := x.(type) {\n\tcase A:\n\t\t_ = v\n\tcase *A:\n\t\t_ = v\n\t}\n}\n",
        ]);
        assert_eq!(fx.occurrences("A").len(), 3);
        let binding = fx
            .table
            .defs
            .iter()
            .find(|(id, _)| fx.arena.original(**id) == "v")
            .map(|(_, sym)| *sym)
            .expect("binding");
        assert_eq!(fx.sites(binding).len(), 3);
    }
}

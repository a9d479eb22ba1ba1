//! Go front-end: scanning, parsing and the identifier arena
//!
//! There is no Go toolchain to call into, so packages are parsed here. The
//! tree keeps byte ranges for every declaration and every identifier, which
//! is all the emitter needs to re-render source with renamed identifiers.

pub mod ast;
pub mod lexer;
mod parser;
pub mod token;

use std::{
    ops::Range,
    path::{Path, PathBuf},
};

use crate::error::BundleError;
use ast::{FileId, IdentId, Span};
use lexer::LineIndex;

/// Syntax error at a byte offset of the file being parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }

    /// Attach file and line information
    pub fn into_bundle_error(self, path: &Path, source: &str) -> BundleError {
        let (line, column) = LineIndex::new(source).line_col(self.offset as u32);
        BundleError::Parse {
            file: path.to_path_buf(),
            line,
            column,
            message: self.message,
        }
    }
}

#[derive(Debug, Clone)]
struct IdentSlot {
    file: FileId,
    span: Span,
    original: String,
    name: String,
}

/// Every identifier occurrence of one package
///
/// The current name of a slot starts out as the source text and is changed
/// by the rename and rewrite passes. The original text is kept so a slot can
/// always be matched back to its source.
#[derive(Debug, Clone, Default)]
pub struct IdentArena {
    slots: Vec<IdentSlot>,
}

impl IdentArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, file: FileId, span: Span, name: &str) -> IdentId {
        let id = IdentId(self.slots.len() as u32);
        self.slots.push(IdentSlot {
            file,
            span,
            original: name.to_owned(),
            name: name.to_owned(),
        });
        id
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn name(&self, id: IdentId) -> &str {
        &self.slots[id.index()].name
    }

    pub fn original(&self, id: IdentId) -> &str {
        &self.slots[id.index()].original
    }

    pub fn span(&self, id: IdentId) -> Span {
        self.slots[id.index()].span
    }

    pub fn file(&self, id: IdentId) -> FileId {
        self.slots[id.index()].file
    }

    pub fn rename(&mut self, id: IdentId, name: impl Into<String>) {
        self.slots[id.index()].name = name.into();
    }

    pub fn is_renamed(&self, id: IdentId) -> bool {
        let slot = &self.slots[id.index()];
        slot.name != slot.original
    }
}

/// One parsed `.go` file of a package
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    pub lines: LineIndex,
    pub ast: ast::File,
    /// Arena slots allocated while parsing this file, in source order
    pub idents: Range<u32>,
}

impl SourceFile {
    /// Parse `text` as file `id` of a package, allocating its identifiers
    pub fn parse(
        id: FileId,
        path: impl Into<PathBuf>,
        text: String,
        arena: &mut IdentArena,
    ) -> Result<Self, BundleError> {
        let path = path.into();
        let first = arena.len() as u32;
        let ast = parse_file(id, &text, arena).map_err(|err| err.into_bundle_error(&path, &text))?;
        let idents = first..arena.len() as u32;
        Ok(Self {
            lines: LineIndex::new(&text),
            path,
            text,
            ast,
            idents,
        })
    }

    pub fn slice(&self, span: Span) -> &str {
        &self.text[span.start as usize..span.end as usize]
    }
}

/// Parse one Go source file
pub fn parse_file(id: FileId, source: &str, arena: &mut IdentArena) -> Result<ast::File, ParseError> {
    let lexed = lexer::lex(source)?;
    parser::Parser::new(id, source, lexed, arena).parse_file()
}

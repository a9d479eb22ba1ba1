//! Re-emission of a package's declarations with their comments
//!
//! Declarations are rendered from their original source text with every
//! identifier replaced by its current arena name, so layout and inner
//! comments survive untouched. Free-standing comments between declarations
//! are carried over; comments in the file header and import section are not.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    loader::ModuleUnit,
    rewriter::QUALIFIER_SENTINEL,
    syntax::{
        IdentArena, SourceFile,
        ast::{CommentGroup, IdentId, Span},
    },
};

/// What follows a dropped qualifier: the selector dot and any spacing
static SELECTOR_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\.\s*").expect("selector regex is valid"));

/// Append every file of `unit` to `out`
pub fn emit_unit(unit: &ModuleUnit, out: &mut String) {
    for file in &unit.files {
        emit_file(file, &unit.idents, out);
    }
}

pub fn emit_file(file: &SourceFile, idents: &IdentArena, out: &mut String) {
    let ast = &file.ast;
    let mut last = ast
        .import_decls
        .last()
        .map_or(ast.package_span.end, |decl| decl.span.end);
    // a comment trailing the package clause or the imports belongs to them
    if let Some(group) = same_line_comment(file, last) {
        last = group.span.end;
    }

    for decl in &ast.decls {
        let span = decl.span();
        let beg = decl
            .doc()
            .map_or(span.start, |index| ast.comments[index].span.start);

        free_comments(file, last, beg, out);
        render(file, idents, Span::new(beg, span.end), out);
        last = span.end;

        if let Some(group) = same_line_comment(file, span.end) {
            let gap = &file.text[span.end as usize..group.span.start as usize];
            if gap.trim().is_empty() {
                out.push_str(gap);
            } else {
                out.push(' ');
            }
            out.push_str(file.slice(group.span));
            last = group.span.end;
        }
        out.push_str("\n\n");
    }

    free_comments(file, last, u32::MAX, out);
}

/// Comment groups starting within `[from, to)`, each followed by a blank line
fn free_comments(file: &SourceFile, from: u32, to: u32, out: &mut String) {
    for group in &file.ast.comments {
        if from <= group.span.start && group.span.start < to {
            out.push_str(file.slice(group.span));
            out.push_str("\n\n");
        }
    }
}

/// The first comment group at or after `pos`, if it starts on the same line
fn same_line_comment(file: &SourceFile, pos: u32) -> Option<&CommentGroup> {
    let comments = &file.ast.comments;
    let index = comments.partition_point(|group| group.span.start < pos);
    comments
        .get(index)
        .filter(|group| file.lines.line(group.span.start) == file.lines.line(pos))
}

/// Source text of `span` with arena names substituted
fn render(file: &SourceFile, idents: &IdentArena, span: Span, out: &mut String) {
    let text = file.text.as_str();
    let mut cursor = span.start as usize;
    let mut id = first_ident_at(file, idents, span.start);
    while id < file.idents.end {
        let ident = IdentId(id);
        let at = idents.span(ident);
        if at.start >= span.end {
            break;
        }
        out.push_str(&text[cursor..at.start as usize]);
        let name = idents.name(ident);
        cursor = at.end as usize;
        if name == QUALIFIER_SENTINEL {
            if let Some(dot) = SELECTOR_DOT.find(&text[cursor..span.end as usize]) {
                cursor += dot.end();
            }
        } else {
            out.push_str(name);
        }
        id += 1;
    }
    out.push_str(&text[cursor..span.end as usize]);
}

/// Index of the first arena slot of `file` starting at or after `pos`
fn first_ident_at(file: &SourceFile, idents: &IdentArena, pos: u32) -> u32 {
    let (mut lo, mut hi) = (file.idents.start, file.idents.end);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if idents.span(IdentId(mid)).start < pos {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

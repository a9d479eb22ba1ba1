//! Go scanner on top of the logos token set
//!
//! Produces the significant tokens (with automatic semicolons inserted the
//! way the Go specification describes) and, separately, the comment groups
//! of the file.

use logos::Logos;

use super::{
    ParseError,
    ast::{CommentGroup, Span},
    token::TokenKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Default)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub comments: Vec<CommentGroup>,
}

pub fn lex(source: &str) -> Result<Lexed, ParseError> {
    let mut lexed = Lexed::default();
    let mut scanner = TokenKind::lexer(source);

    // Last significant token, used for semicolon insertion
    let mut last: Option<Token> = None;
    // End of the previous raw token (comments included)
    let mut prev_end = 0usize;
    // Most newlines a comment may follow and still join the open group
    let mut group_reach: Option<usize> = None;
    // Whether the previous raw token was a significant one
    let mut after_token = false;

    while let Some(result) = scanner.next() {
        let range = scanner.span();
        let Ok(kind) = result else {
            return Err(ParseError::new(
                range.start,
                format!("unexpected character {:?}", &source[range.clone()]),
            ));
        };
        let gap = &source[prev_end..range.start];
        let newlines = gap.matches('\n').count();

        if newlines > 0 {
            insert_semicolon(&mut lexed.tokens, &mut last);
        }

        let span = Span::new(range.start as u32, range.end as u32);
        if kind.is_comment() {
            match (group_reach, lexed.comments.last_mut()) {
                (Some(reach), Some(group)) if newlines <= reach => group.push(span),
                _ => {
                    lexed.comments.push(CommentGroup::new(span));
                    // a comment trailing a token closes its group at the end of the line
                    group_reach = Some(if after_token && newlines == 0 { 0 } else { 1 });
                }
            }
            after_token = false;
            // A block comment spanning lines acts like a newline
            if kind == TokenKind::BlockComment && source[range.clone()].contains('\n') {
                insert_semicolon(&mut lexed.tokens, &mut last);
            }
        } else {
            group_reach = None;
            after_token = true;
            let token = Token { kind, span };
            lexed.tokens.push(token);
            last = Some(token);
        }
        prev_end = range.end;
    }

    insert_semicolon(&mut lexed.tokens, &mut last);
    let end = source.len() as u32;
    lexed.tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(end, end),
    });
    Ok(lexed)
}

fn insert_semicolon(tokens: &mut Vec<Token>, last: &mut Option<Token>) {
    if let Some(prev) = last.take()
        && prev.kind.ends_statement()
    {
        tokens.push(Token {
            kind: TokenKind::Semicolon,
            span: Span::new(prev.span.end, prev.span.end),
        });
    }
}

/// Byte offset to line lookup for one source file
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i as u32 + 1),
        );
        Self { line_starts }
    }

    /// Zero-based line of an offset
    pub fn line(&self, offset: u32) -> usize {
        self.line_starts.partition_point(|start| *start <= offset) - 1
    }

    /// One-based (line, column) pair for diagnostics
    pub fn line_col(&self, offset: u32) -> (usize, usize) {
        let line = self.line(offset);
        (line + 1, (offset - self.line_starts[line]) as usize + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src)
            .expect("lexes")
            .tokens
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_semicolon_inserted_at_line_end() {
        assert_eq!(
            kinds("x := 1\nreturn\n"),
            vec![
                TokenKind::Ident,
                TokenKind::Define,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::Return,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_no_semicolon_after_operator() {
        assert_eq!(
            kinds("a +\nb"),
            vec![
                TokenKind::Ident,
                TokenKind::Add,
                TokenKind::Ident,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_line_comment_terminates_statement() {
        assert_eq!(
            kinds("x++ // bump\ny"),
            vec![
                TokenKind::Ident,
                TokenKind::Inc,
                TokenKind::Semicolon,
                TokenKind::Ident,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comment_groups_split_on_blank_line() {
        let lexed = lex("// a\n// b\n\n// c\nx").expect("lexes");
        assert_eq!(lexed.comments.len(), 2);
        assert_eq!(lexed.comments[0].comments.len(), 2);
        assert_eq!(lexed.comments[1].comments.len(), 1);
    }

    #[test]
    fn test_token_between_comments_splits_group() {
        let lexed = lex("// a\nx // b\n").expect("lexes");
        assert_eq!(lexed.comments.len(), 2);
    }

    #[test]
    fn test_trailing_comment_does_not_absorb_next_line() {
        let lexed = lex("const A = 1 // one\n// B is two.\nconst B = 2\n").expect("lexes");
        assert_eq!(lexed.comments.len(), 2);
        assert_eq!(lexed.comments[0].comments.len(), 1);
        assert_eq!(lexed.comments[1].comments.len(), 1);

        let lexed = lex("x /* a */ // b\n").expect("lexes");
        assert_eq!(lexed.comments.len(), 1);
        assert_eq!(lexed.comments[0].comments.len(), 2);
    }

    #[test]
    fn test_unexpected_character() {
        let err = lex("x := #").expect_err("invalid");
        assert_eq!(err.offset, 5);
    }

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(index.line(0), 0);
        assert_eq!(index.line(3), 1);
        assert_eq!(index.line(6), 2);
        assert_eq!(index.line_col(8), (4, 2));
    }
}

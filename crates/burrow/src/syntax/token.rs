use logos::Logos;

/// Raw Go tokens as produced by the scanner
///
/// Semicolons inserted at line ends are added afterwards by the lexer and
/// reuse [`TokenKind::Semicolon`].
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n\f\u{FEFF}]+")]
pub enum TokenKind {
    #[regex(r"//[^\n]*", allow_greedy = true)]
    LineComment,
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/")]
    BlockComment,

    // Keywords
    #[token("break")]
    Break,
    #[token("case")]
    Case,
    #[token("chan")]
    Chan,
    #[token("const")]
    Const,
    #[token("continue")]
    Continue,
    #[token("default")]
    Default,
    #[token("defer")]
    Defer,
    #[token("else")]
    Else,
    #[token("fallthrough")]
    Fallthrough,
    #[token("for")]
    For,
    #[token("func")]
    Func,
    #[token("go")]
    Go,
    #[token("goto")]
    Goto,
    #[token("if")]
    If,
    #[token("import")]
    Import,
    #[token("interface")]
    Interface,
    #[token("map")]
    Map,
    #[token("package")]
    Package,
    #[token("range")]
    Range,
    #[token("return")]
    Return,
    #[token("select")]
    Select,
    #[token("struct")]
    Struct,
    #[token("switch")]
    Switch,
    #[token("type")]
    Type,
    #[token("var")]
    Var,

    #[regex(r"[\p{L}_][\p{L}\p{Nd}_]*")]
    Ident,

    // Literals
    #[regex(r"0[xX][0-9a-fA-F_]+|0[bB][01_]+|0[oO][0-7_]+|[0-9][0-9_]*")]
    Int,
    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9_]+)?")]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9_]+")]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9_]+)?")]
    #[regex(r"0[xX][0-9a-fA-F_]*(\.[0-9a-fA-F_]*)?[pP][+-]?[0-9_]+")]
    Float,
    #[regex(r"([0-9][0-9_]*(\.[0-9_]*)?([eE][+-]?[0-9_]+)?|\.[0-9][0-9_]*([eE][+-]?[0-9_]+)?|0[xX][0-9a-fA-F_]+)i")]
    Imag,
    #[regex(r"'(\\[^\n][^'\\\n]*|[^'\\\n])'")]
    Rune,
    #[regex(r#""([^"\\\n]|\\[^\n])*""#)]
    String,
    #[regex(r"`[^`]*`")]
    RawString,

    // Operators
    #[token("+")]
    Add,
    #[token("-")]
    Sub,
    #[token("*")]
    Mul,
    #[token("/")]
    Quo,
    #[token("%")]
    Rem,
    #[token("&")]
    And,
    #[token("|")]
    Or,
    #[token("^")]
    Xor,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("&^")]
    AndNot,
    #[token("+=")]
    AddAssign,
    #[token("-=")]
    SubAssign,
    #[token("*=")]
    MulAssign,
    #[token("/=")]
    QuoAssign,
    #[token("%=")]
    RemAssign,
    #[token("&=")]
    AndAssign,
    #[token("|=")]
    OrAssign,
    #[token("^=")]
    XorAssign,
    #[token("<<=")]
    ShlAssign,
    #[token(">>=")]
    ShrAssign,
    #[token("&^=")]
    AndNotAssign,
    #[token("&&")]
    LAnd,
    #[token("||")]
    LOr,
    #[token("<-")]
    Arrow,
    #[token("++")]
    Inc,
    #[token("--")]
    Dec,
    #[token("==")]
    Eql,
    #[token("<")]
    Lss,
    #[token(">")]
    Gtr,
    #[token("=")]
    Assign,
    #[token("!")]
    Not,
    #[token("~")]
    Tilde,
    #[token("!=")]
    Neq,
    #[token("<=")]
    Leq,
    #[token(">=")]
    Geq,
    #[token(":=")]
    Define,
    #[token("...")]
    Ellipsis,
    #[token("(")]
    LParen,
    #[token("[")]
    LBrack,
    #[token("{")]
    LBrace,
    #[token(",")]
    Comma,
    #[token(".")]
    Period,
    #[token(")")]
    RParen,
    #[token("]")]
    RBrack,
    #[token("}")]
    RBrace,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,

    /// Synthetic end-of-file marker, never produced by the scanner
    Eof,
}

impl TokenKind {
    pub fn is_comment(self) -> bool {
        matches!(self, Self::LineComment | Self::BlockComment)
    }

    pub fn is_literal(self) -> bool {
        matches!(
            self,
            Self::Int | Self::Float | Self::Imag | Self::Rune | Self::String | Self::RawString
        )
    }

    /// Whether a newline after this token terminates the statement
    pub fn ends_statement(self) -> bool {
        self.is_literal()
            || matches!(
                self,
                Self::Ident
                    | Self::Break
                    | Self::Continue
                    | Self::Fallthrough
                    | Self::Return
                    | Self::Inc
                    | Self::Dec
                    | Self::RParen
                    | Self::RBrack
                    | Self::RBrace
            )
    }

    /// Binary operator precedence, 0 for non-operators
    pub fn precedence(self) -> u8 {
        match self {
            Self::LOr => 1,
            Self::LAnd => 2,
            Self::Eql | Self::Neq | Self::Lss | Self::Leq | Self::Gtr | Self::Geq => 3,
            Self::Add | Self::Sub | Self::Or | Self::Xor => 4,
            Self::Mul
            | Self::Quo
            | Self::Rem
            | Self::Shl
            | Self::Shr
            | Self::And
            | Self::AndNot => 5,
            _ => 0,
        }
    }

    pub fn is_assign_op(self) -> bool {
        matches!(
            self,
            Self::Assign
                | Self::AddAssign
                | Self::SubAssign
                | Self::MulAssign
                | Self::QuoAssign
                | Self::RemAssign
                | Self::AndAssign
                | Self::OrAssign
                | Self::XorAssign
                | Self::ShlAssign
                | Self::ShrAssign
                | Self::AndNotAssign
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        TokenKind::lexer(src)
            .map(|t| t.expect("valid token"))
            .collect()
    }

    #[test]
    fn test_keywords_win_over_identifiers() {
        assert_eq!(
            kinds("func funcs type typed"),
            vec![
                TokenKind::Func,
                TokenKind::Ident,
                TokenKind::Type,
                TokenKind::Ident
            ]
        );
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(
            kinds("42 0x1F 0b101 0o17 1_000 3.14 1e9 .5 0x1p-2 2i 1.5i"),
            vec![
                TokenKind::Int,
                TokenKind::Int,
                TokenKind::Int,
                TokenKind::Int,
                TokenKind::Int,
                TokenKind::Float,
                TokenKind::Float,
                TokenKind::Float,
                TokenKind::Float,
                TokenKind::Imag,
                TokenKind::Imag,
            ]
        );
    }

    #[test]
    fn test_string_and_rune_literals() {
        assert_eq!(
            kinds(r#""a\"b" `raw
line` '\'' 'x' '\x41'"#),
            vec![
                TokenKind::String,
                TokenKind::RawString,
                TokenKind::Rune,
                TokenKind::Rune,
                TokenKind::Rune
            ]
        );
    }

    #[test]
    fn test_comments_are_tokens() {
        assert_eq!(
            kinds("a // trailing\n/* block\n */ b"),
            vec![
                TokenKind::Ident,
                TokenKind::LineComment,
                TokenKind::BlockComment,
                TokenKind::Ident
            ]
        );
    }

    #[test]
    fn test_longest_operator_match() {
        assert_eq!(
            kinds("&^= <<= ... := <-"),
            vec![
                TokenKind::AndNotAssign,
                TokenKind::ShlAssign,
                TokenKind::Ellipsis,
                TokenKind::Define,
                TokenKind::Arrow
            ]
        );
    }
}

//! Build constraint evaluation
//!
//! Decides which `.go` files of a package directory take part in the build
//! for the configured GOOS/GOARCH and tags, from file names
//! (`_linux.go`, `_amd64.go`, `_test.go`) and from `//go:build` or legacy
//! `// +build` lines in the file header.

use indexmap::IndexSet;
use log::{trace, warn};

use crate::config::Config;

const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux",
    "netbsd", "openbsd", "solaris",
];

const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle",
    "mips64", "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv",
    "riscv64", "s390", "s390x", "sparc", "sparc64", "wasm",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub goos: String,
    pub goarch: String,
    pub tags: IndexSet<String>,
}

impl BuildContext {
    pub fn new(goos: impl Into<String>, goarch: impl Into<String>) -> Self {
        Self {
            goos: goos.into(),
            goarch: goarch.into(),
            tags: IndexSet::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            goos: config.goos.clone(),
            goarch: config.goarch.clone(),
            tags: config.build_tags.clone(),
        }
    }

    /// Whether a single build tag holds
    pub fn tag_satisfied(&self, tag: &str) -> bool {
        tag == self.goos
            || tag == self.goarch
            || tag == "gc"
            || (tag == "unix" && UNIX_OS.contains(&self.goos.as_str()))
            || (tag == "linux" && self.goos == "android")
            || (tag == "darwin" && self.goos == "ios")
            || (tag == "solaris" && self.goos == "illumos")
            || is_release_tag(tag)
            || self.tags.contains(tag)
    }

    /// File-name rules: `.go` sources that are not tests or hidden files and
    /// whose `_GOOS`/`_GOARCH` suffix (if any) matches
    pub fn matches_file_name(&self, file_name: &str) -> bool {
        let Some(stem) = file_name.strip_suffix(".go") else {
            return false;
        };
        if stem.ends_with("_test") || stem.starts_with('_') || stem.starts_with('.') {
            return false;
        }
        let parts: Vec<&str> = stem.split('_').skip(1).collect();
        match parts.as_slice() {
            [.., os, arch] if KNOWN_OS.contains(os) && KNOWN_ARCH.contains(arch) => {
                self.tag_satisfied(os) && self.tag_satisfied(arch)
            }
            [.., last] if KNOWN_OS.contains(last) || KNOWN_ARCH.contains(last) => {
                self.tag_satisfied(last)
            }
            _ => true,
        }
    }

    /// Header rules: every constraint line before the package clause must hold
    pub fn matches_content(&self, text: &str) -> bool {
        let header = constraint_lines(text);
        if let Some(expr) = header.go_build {
            return match eval(expr, |tag| self.tag_satisfied(tag)) {
                Ok(result) => result,
                Err(message) => {
                    warn!("Ignoring file with malformed //go:build line '{expr}': {message}");
                    false
                }
            };
        }
        header
            .plus_build
            .iter()
            .all(|line| self.plus_build_holds(line))
    }

    /// `// +build a,b !c` means `(a && b) || !c`
    fn plus_build_holds(&self, line: &str) -> bool {
        line.split_whitespace().any(|option| {
            option.split(',').all(|term| match term.strip_prefix('!') {
                Some(tag) => !self.tag_satisfied(tag),
                None => self.tag_satisfied(term),
            })
        })
    }

    pub fn matches(&self, file_name: &str, text: &str) -> bool {
        let matched = self.matches_file_name(file_name) && self.matches_content(text);
        trace!("build constraints for {file_name}: {matched}");
        matched
    }
}

fn is_release_tag(tag: &str) -> bool {
    tag.strip_prefix("go1.")
        .is_some_and(|minor| !minor.is_empty() && minor.bytes().all(|b| b.is_ascii_digit()))
}

#[derive(Debug, Default)]
struct Header<'a> {
    go_build: Option<&'a str>,
    plus_build: Vec<&'a str>,
}

fn constraint_lines(text: &str) -> Header<'_> {
    let mut header = Header::default();
    let mut in_block = false;
    for line in text.lines() {
        let line = line.trim();
        if in_block {
            in_block = !line.contains("*/");
            continue;
        }
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix("//") {
            if let Some(expr) = comment.strip_prefix("go:build") {
                header.go_build.get_or_insert(expr.trim());
            } else if let Some(rest) = comment.trim_start().strip_prefix("+build") {
                header.plus_build.push(rest.trim());
            }
            continue;
        }
        if line.starts_with("/*") {
            in_block = !line.contains("*/");
            continue;
        }
        break;
    }
    header
}

/// Evaluate a `//go:build` expression
pub fn eval(expr: &str, satisfied: impl Fn(&str) -> bool) -> Result<bool, String> {
    let tokens = tokenize(expr)?;
    let mut parser = ExprParser {
        tokens: &tokens,
        pos: 0,
        satisfied: &satisfied,
    };
    let value = parser.or()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(value),
        Some(token) => Err(format!("unexpected {token:?}")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ExprToken<'a> {
    Tag(&'a str),
    Not,
    And,
    Or,
    Open,
    Close,
}

fn tokenize(expr: &str) -> Result<Vec<ExprToken<'_>>, String> {
    let mut tokens = Vec::new();
    let mut rest = expr.trim_start();
    while let Some(c) = rest.chars().next() {
        let (token, len) = match c {
            '!' => (ExprToken::Not, 1),
            '(' => (ExprToken::Open, 1),
            ')' => (ExprToken::Close, 1),
            '&' if rest.starts_with("&&") => (ExprToken::And, 2),
            '|' if rest.starts_with("||") => (ExprToken::Or, 2),
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let len = rest
                    .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
                    .unwrap_or(rest.len());
                (ExprToken::Tag(&rest[..len]), len)
            }
            other => return Err(format!("unexpected character '{other}'")),
        };
        tokens.push(token);
        rest = rest[len..].trim_start();
    }
    Ok(tokens)
}

struct ExprParser<'t, 'a, F> {
    tokens: &'t [ExprToken<'a>],
    pos: usize,
    satisfied: &'t F,
}

impl<F: Fn(&str) -> bool> ExprParser<'_, '_, F> {
    fn eat(&mut self, token: &ExprToken<'_>) -> bool {
        if self.tokens.get(self.pos) == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<bool, String> {
        let mut value = self.and()?;
        while self.eat(&ExprToken::Or) {
            // both sides are parsed so syntax errors surface either way
            let rhs = self.and()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn and(&mut self) -> Result<bool, String> {
        let mut value = self.not()?;
        while self.eat(&ExprToken::And) {
            let rhs = self.not()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn not(&mut self) -> Result<bool, String> {
        if self.eat(&ExprToken::Not) {
            return Ok(!self.not()?);
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<bool, String> {
        match self.tokens.get(self.pos) {
            Some(ExprToken::Open) => {
                self.pos += 1;
                let value = self.or()?;
                if !self.eat(&ExprToken::Close) {
                    return Err("missing ')'".to_owned());
                }
                Ok(value)
            }
            Some(ExprToken::Tag(tag)) => {
                self.pos += 1;
                Ok((self.satisfied)(tag))
            }
            Some(token) => Err(format!("unexpected {token:?}")),
            None => Err("unexpected end of expression".to_owned()),
        }
    }
}

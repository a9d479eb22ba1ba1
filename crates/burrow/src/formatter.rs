//! Final normalization of the bundled source

use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use cow_utils::CowUtils;
use log::{debug, warn};

use crate::{
    config::{Config, FormatterChoice},
    error::{BundleError, BundleResult},
    syntax::{IdentArena, ast::FileId, lexer, parse_file, token::TokenKind},
};

/// Returns normalized source, or rejects syntactically invalid source
pub trait SourceFormatter {
    fn name(&self) -> &'static str;

    fn format(&self, source: &str) -> BundleResult<String>;
}

/// Pipes the source through an external `gofmt`
#[derive(Debug, Clone)]
pub struct Gofmt {
    binary: PathBuf,
}

impl Gofmt {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl SourceFormatter for Gofmt {
    fn name(&self) -> &'static str {
        "gofmt"
    }

    fn format(&self, source: &str) -> BundleResult<String> {
        let mut child = Command::new(&self.binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BundleError::io(&self.binary, e))?;
        // gofmt reads all of stdin before writing anything
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .map_err(|e| BundleError::io(&self.binary, e))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| BundleError::io(&self.binary, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BundleError::Format {
                message: stderr
                    .trim()
                    .cow_replace("<standard input>", "bundle")
                    .into_owned(),
                text: source.to_owned(),
            });
        }
        String::from_utf8(output.stdout).map_err(|e| BundleError::Format {
            message: format!("gofmt produced invalid UTF-8: {e}"),
            text: source.to_owned(),
        })
    }
}

/// Validates by re-parsing, then normalizes whitespace
///
/// Trailing whitespace is removed, runs of blank lines collapse to one and
/// the text ends in exactly one newline. Raw string contents are untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinFormatter;

impl SourceFormatter for BuiltinFormatter {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn format(&self, source: &str) -> BundleResult<String> {
        let rejected = |offset: usize, message: String| {
            let (line, column) = lexer::LineIndex::new(source).line_col(offset as u32);
            BundleError::Format {
                message: format!("{line}:{column}: {message}"),
                text: source.to_owned(),
            }
        };
        let mut arena = IdentArena::new();
        parse_file(FileId(0), source, &mut arena).map_err(|err| rejected(err.offset, err.message))?;
        let lexed = lexer::lex(source).map_err(|err| rejected(err.offset, err.message))?;

        let raw_strings: Vec<(usize, usize)> = lexed
            .tokens
            .iter()
            .filter(|token| token.kind == TokenKind::RawString)
            .map(|token| (token.span.start as usize, token.span.end as usize))
            .filter(|(start, end)| source[*start..*end].contains('\n'))
            .collect();
        Ok(normalize(source, &raw_strings))
    }
}

fn normalize(source: &str, protected: &[(usize, usize)]) -> String {
    let inside = |offset: usize| {
        protected
            .iter()
            .any(|(start, end)| *start < offset && offset < *end)
    };

    let mut out = String::with_capacity(source.len());
    let mut blank_run = 0;
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        let newline = offset + line.len() - 1;
        offset += line.len();
        if line.ends_with('\n') && inside(newline) {
            out.push_str(line);
            blank_run = 0;
            continue;
        }
        let content = line.trim_end();
        if content.is_empty() {
            blank_run += 1;
            if blank_run == 1 && !out.is_empty() {
                out.push('\n');
            }
            continue;
        }
        blank_run = 0;
        out.push_str(content);
        out.push('\n');
    }
    let trimmed = out.trim_end_matches('\n').len();
    out.truncate(trimmed);
    out.push('\n');
    out
}

/// `gofmt` from the config, then from `PATH`
pub fn locate_gofmt(config: &Config) -> Option<PathBuf> {
    if let Some(path) = &config.gofmt_path {
        if path.is_file() {
            return Some(path.clone());
        }
        warn!("Configured gofmt {} does not exist", path.display());
    }
    let name = if cfg!(windows) { "gofmt.exe" } else { "gofmt" };
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// The formatter selected by the configuration
pub fn formatter_for(config: &Config) -> Box<dyn SourceFormatter> {
    match config.formatter {
        FormatterChoice::Builtin => Box::new(BuiltinFormatter),
        FormatterChoice::Gofmt => Box::new(Gofmt::new(
            locate_gofmt(config).unwrap_or_else(|| PathBuf::from("gofmt")),
        )),
        FormatterChoice::Auto => match locate_gofmt(config) {
            Some(binary) => {
                debug!("Formatting with {}", binary.display());
                Box::new(Gofmt::new(binary))
            }
            None => {
                warn!("gofmt not found, falling back to the builtin formatter");
                Box::new(BuiltinFormatter)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_builtin_normalizes_whitespace() {
        let source = "package main   \n\n\n\nimport \"fmt\"\n\n\nfunc main() {\t\n\tfmt.Println()\n}\n\n\n";
        let formatted = BuiltinFormatter.format(source).expect("valid source");
        assert_eq!(
            formatted,
            "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println()\n}\n"
        );
    }

    #[test]
    fn test_builtin_keeps_raw_strings() {
        let source = "package main\n\nvar s = `a  \n\n\n\nb`\n";
        let formatted = BuiltinFormatter.format(source).expect("valid source");
        assert_eq!(formatted, source);
    }

    #[test]
    fn test_builtin_rejects_invalid_source() {
        let source = "package main\n\nfunc main() {\n";
        let err = BuiltinFormatter.format(source).expect_err("invalid");
        assert_eq!(err.unformatted_source(), Some(source));
        assert!(matches!(err, BundleError::Format { .. }));
    }

    #[test]
    fn test_missing_gofmt_binary_is_io_error() {
        let gofmt = Gofmt::new("/nonexistent/burrow-test/gofmt");
        assert!(matches!(
            gofmt.format("package main\n"),
            Err(BundleError::Io { .. })
        ));
    }

    #[test]
    fn test_builtin_choice() {
        let config = Config {
            formatter: FormatterChoice::Builtin,
            ..Config::default()
        };
        assert_eq!(formatter_for(&config).name(), "builtin");
    }
}

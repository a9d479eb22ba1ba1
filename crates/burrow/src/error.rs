//! Fatal error kinds of a bundling run
//!
//! Every failure aborts the run; nothing is retried and nothing is written
//! to the output path once one of these has been produced.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    /// The import path did not resolve to exactly one buildable package
    #[error("cannot load package '{path}': {reason}")]
    ModuleResolution { path: String, reason: String },

    /// A source file of a loaded package is not valid Go
    #[error("{}:{line}:{column}: {message}", .file.display())]
    Parse {
        file: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    /// An inlined package reaches itself through its own imports
    #[error("import cycle not allowed: {}", .chain.join(" -> "))]
    ImportCycle { chain: Vec<String> },

    /// The assembled output was rejected by the formatter
    ///
    /// `text` keeps the unformatted source so it can be inspected.
    #[error("formatting the bundled source failed: {message}")]
    Format { message: String, text: String },

    #[error("I/O error on {}: {error}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}

impl BundleError {
    pub fn resolution(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModuleResolution {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }

    /// The unformatted text carried by a formatter rejection
    pub fn unformatted_source(&self) -> Option<&str> {
        match self {
            Self::Format { text, .. } => Some(text),
            _ => None,
        }
    }
}

pub type BundleResult<T> = Result<T, BundleError>;

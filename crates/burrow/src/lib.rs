//! burrow merges a Go package and every internal package it imports into a
//! single source file, keeping only standard and external imports.

pub mod assembler;
pub mod build_constraints;
pub mod classifier;
pub mod collision;
pub mod config;
pub mod emitter;
pub mod error;
pub mod formatter;
pub mod loader;
pub mod orchestrator;
pub mod renamer;
pub mod resolver;
pub mod rewriter;
pub mod semantic;
pub mod syntax;
pub mod walker;

pub use error::{BundleError, BundleResult};

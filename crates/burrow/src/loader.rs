//! Loading one package: syntax trees plus symbol table

use std::path::PathBuf;

use indexmap::{IndexMap, IndexSet};
use log::debug;

use crate::{
    error::{BundleError, BundleResult},
    resolver::{ModuleResolver, guess_package_name, package_clause},
    semantic::{SymbolTable, resolve_package},
    syntax::{IdentArena, SourceFile, ast::FileId},
};

/// A loaded package, exclusively owned by the walker while bundling
#[derive(Debug, Clone)]
pub struct ModuleUnit {
    /// Canonical import path
    pub path: String,
    /// Name from the package clause
    pub name: String,
    pub dir: Option<PathBuf>,
    pub files: Vec<SourceFile>,
    pub idents: IdentArena,
    pub symbols: SymbolTable,
    /// Imported paths, sorted and deduplicated
    pub imports: Vec<String>,
}

impl ModuleUnit {
    /// Parse and resolve the sources of one package
    ///
    /// `import_name` gives the name an imported package declares, for
    /// imports without an explicit name.
    pub fn from_sources(
        path: &str,
        dir: Option<PathBuf>,
        sources: Vec<(PathBuf, String)>,
        import_name: &mut dyn FnMut(&str) -> String,
    ) -> BundleResult<Self> {
        if sources.is_empty() {
            return Err(BundleError::resolution(path, "no buildable Go source files"));
        }

        let mut idents = IdentArena::new();
        let files = sources
            .into_iter()
            .enumerate()
            .map(|(i, (file_path, text))| SourceFile::parse(FileId(i as u32), file_path, text, &mut idents))
            .collect::<BundleResult<Vec<_>>>()?;

        let name = single_package_name(path, &files, &idents)?;

        let imports: IndexSet<&str> = files
            .iter()
            .flat_map(|file| file.ast.imports())
            .map(|import| import.path.as_str())
            .collect();
        let mut imports: Vec<String> = imports.into_iter().map(str::to_owned).collect();
        imports.sort();

        let symbols = {
            let names: IndexMap<&str, String> = imports
                .iter()
                .map(|import| (import.as_str(), import_name(import)))
                .collect();
            resolve_package(path, &files, &idents, &|import: &str| {
                names
                    .get(import)
                    .cloned()
                    .unwrap_or_else(|| guess_package_name(import))
            })
        };

        debug!(
            "Loaded package {path} ({name}): {} files, {} symbols, {} imports",
            files.len(),
            symbols.symbols.len(),
            imports.len()
        );
        Ok(Self {
            path: path.to_owned(),
            name,
            dir,
            files,
            idents,
            symbols,
            imports,
        })
    }

    /// Names `import_path` is imported under: `None` for a plain import,
    /// otherwise `_`, `.` or the alias
    pub fn import_bindings(&self, import_path: &str) -> Vec<Option<String>> {
        let mut bindings: Vec<Option<String>> = self
            .files
            .iter()
            .flat_map(|file| file.ast.imports())
            .filter(|import| import.path == import_path)
            .map(|import| {
                if import.dot {
                    Some(".".to_owned())
                } else {
                    import
                        .name
                        .map(|name| self.idents.original(name.id).to_owned())
                }
            })
            .collect();
        bindings.sort();
        bindings.dedup();
        bindings
    }

    /// Whether any file dot-imports `import_path`
    pub fn dot_imports(&self, import_path: &str) -> bool {
        self.files
            .iter()
            .flat_map(|file| file.ast.imports())
            .any(|import| import.dot && import.path == import_path)
    }
}

fn single_package_name(path: &str, files: &[SourceFile], idents: &IdentArena) -> BundleResult<String> {
    let mut found: IndexMap<&str, &SourceFile> = IndexMap::new();
    for file in files {
        found
            .entry(idents.original(file.ast.package.id))
            .or_insert(file);
    }
    match found.len() {
        1 => Ok(found
            .keys()
            .next()
            .map(|name| (*name).to_owned())
            .unwrap_or_default()),
        _ => {
            let listing: Vec<String> = found
                .iter()
                .map(|(name, file)| format!("{name} ({})", file.path.display()))
                .collect();
            Err(BundleError::resolution(
                path,
                format!("found packages {}", listing.join(", ")),
            ))
        }
    }
}

/// Parse + type-resolve service for exactly one package per import path
pub trait ModuleLoader {
    fn load(&mut self, path: &str) -> BundleResult<ModuleUnit>;
}

/// Loads packages from disk through a [`ModuleResolver`]
#[derive(Debug)]
pub struct GoLoader {
    resolver: ModuleResolver,
}

impl GoLoader {
    pub fn new(resolver: ModuleResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &ModuleResolver {
        &self.resolver
    }
}

impl ModuleLoader for GoLoader {
    fn load(&mut self, path: &str) -> BundleResult<ModuleUnit> {
        let Some(dir) = self.resolver.resolve_package_dir(path) else {
            let searched: Vec<String> = self
                .resolver
                .candidate_dirs(path)
                .iter()
                .map(|dir| dir.display().to_string())
                .collect();
            let reason = if searched.is_empty() {
                "cannot find package (no module root, src or GOPATH configured)".to_owned()
            } else {
                format!("cannot find package in any of: {}", searched.join(", "))
            };
            return Err(BundleError::resolution(path, reason));
        };
        let sources = self.resolver.buildable_files(&dir)?;
        if sources.is_empty() {
            return Err(BundleError::resolution(
                path,
                format!("no buildable Go source files in {}", dir.display()),
            ));
        }
        let resolver = &mut self.resolver;
        ModuleUnit::from_sources(path, Some(dir), sources, &mut |import| {
            resolver.package_name(import)
        })
    }
}

/// Packages registered from in-memory sources
#[derive(Debug, Default, Clone)]
pub struct InMemoryLoader {
    packages: IndexMap<String, Vec<(PathBuf, String)>>,
    /// How often each path was loaded
    loads: IndexMap<String, usize>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package from `(file name, source)` pairs
    pub fn register<P, S>(&mut self, path: &str, files: impl IntoIterator<Item = (P, S)>) -> &mut Self
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        let files = files
            .into_iter()
            .map(|(name, text)| (name.into(), text.into()))
            .collect();
        self.packages.insert(path.to_owned(), files);
        self
    }

    pub fn load_count(&self, path: &str) -> usize {
        self.loads.get(path).copied().unwrap_or(0)
    }

    fn declared_name(&self, path: &str) -> String {
        self.packages
            .get(path)
            .and_then(|files| {
                files
                    .iter()
                    .find_map(|(_, text)| package_clause(text).map(str::to_owned))
            })
            .unwrap_or_else(|| guess_package_name(path))
    }
}

impl ModuleLoader for InMemoryLoader {
    fn load(&mut self, path: &str) -> BundleResult<ModuleUnit> {
        let Some(sources) = self.packages.get(path).cloned() else {
            return Err(BundleError::resolution(path, "cannot find package"));
        };
        *self.loads.entry(path.to_owned()).or_default() += 1;
        ModuleUnit::from_sources(path, None, sources, &mut |import| {
            self.declared_name(import)
        })
    }
}

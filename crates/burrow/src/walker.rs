//! Depth-first traversal of the import graph
//!
//! Each inline-eligible package is loaded, renamed and emitted once, after
//! its own dependencies; kept imports accumulate in an [`ImportSet`].

use indexmap::{IndexMap, IndexSet};
use log::{debug, info, warn};

use crate::{
    classifier::{Classification, classify},
    collision::CollisionSet,
    config::Config,
    emitter::emit_unit,
    error::{BundleError, BundleResult},
    loader::{ModuleLoader, ModuleUnit},
    renamer::{RenameTable, rename_unit},
    resolver::guess_package_name,
    rewriter::rewrite_references,
};

/// Kept imports with every name each one is bound to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSet {
    entries: IndexMap<String, IndexSet<Option<String>>>,
}

impl ImportSet {
    pub fn insert(&mut self, path: &str, bindings: impl IntoIterator<Item = Option<String>>) {
        let entry = self.entries.entry(path.to_owned()).or_default();
        let before = entry.len();
        entry.extend(bindings);
        if entry.is_empty() {
            entry.insert(None);
        }
        let added: Vec<String> = entry
            .iter()
            .skip(before)
            .filter_map(|name| bound_name(path, name.as_deref()))
            .collect();

        for name in added {
            let others: Vec<&str> = self
                .binders(&name)
                .into_iter()
                .filter(|other| *other != path)
                .collect();
            if !others.is_empty() {
                warn!(
                    "Kept import {path} binds '{name}', which {} also binds; the bundle will not compile",
                    others.join(", ")
                );
            }
        }
    }

    /// Kept paths that bind `name` in the bundle's file scope
    pub fn binders(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(path, names)| {
                names
                    .iter()
                    .any(|bound| bound_name(path, bound.as_deref()).as_deref() == Some(name))
            })
            .map(|(path, _)| path.as_str())
            .collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Kept paths, sorted
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// `(name, path)` import specs sorted by path, plain imports first
    pub fn specs(&self) -> Vec<(Option<&str>, &str)> {
        let mut specs: Vec<(Option<&str>, &str)> = self
            .entries
            .iter()
            .flat_map(|(path, names)| {
                names
                    .iter()
                    .map(move |name| (name.as_deref(), path.as_str()))
            })
            .collect();
        specs.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(&b.0)));
        specs
    }
}

/// File-scope name an import spec binds; blank and dot imports bind none
fn bound_name(path: &str, name: Option<&str>) -> Option<String> {
    match name {
        None => Some(guess_package_name(path)),
        Some("_" | ".") => None,
        Some(name) => Some(name.to_owned()),
    }
}

/// Memo entry of a package merged into the bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinedPackage {
    pub path: String,
    pub name: String,
    pub renames: RenameTable,
}

impl InlinedPackage {
    pub fn prefix(&self) -> &str {
        self.renames.prefix()
    }
}

/// Everything the assembler needs
#[derive(Debug, Clone)]
pub struct WalkOutput {
    pub root: String,
    pub imports: ImportSet,
    /// In emission order
    pub inlined: Vec<InlinedPackage>,
    pub body: String,
}

pub struct DependencyWalker<'a> {
    loader: &'a mut dyn ModuleLoader,
    config: &'a Config,
    memo: IndexMap<String, InlinedPackage>,
    in_progress: Vec<String>,
    imports: ImportSet,
    /// Prefix to the package path that owns it
    prefixes: IndexMap<String, String>,
    output: String,
}

impl<'a> DependencyWalker<'a> {
    pub fn new(loader: &'a mut dyn ModuleLoader, config: &'a Config) -> Self {
        Self {
            loader,
            config,
            memo: IndexMap::new(),
            in_progress: Vec::new(),
            imports: ImportSet::default(),
            prefixes: IndexMap::new(),
            output: String::new(),
        }
    }

    /// Walk everything reachable from `root` and emit it
    pub fn walk(mut self, root: &str) -> BundleResult<WalkOutput> {
        let mut unit = self.loader.load(root)?;
        self.in_progress.push(unit.path.clone());
        self.visit(&mut unit)?;
        self.in_progress.pop();
        emit_unit(&unit, &mut self.output);

        info!(
            "Walked {root}: {} packages inlined, {} imports kept",
            self.memo.len(),
            self.imports.len()
        );
        Ok(WalkOutput {
            root: unit.path,
            imports: self.imports,
            inlined: self.memo.into_values().collect(),
            body: self.output,
        })
    }

    /// Handle every import of `unit`, then point its references at the
    /// renamed symbols of the packages it inlines
    fn visit(&mut self, unit: &mut ModuleUnit) -> BundleResult<()> {
        let mut inlined = Vec::new();
        for import in &unit.imports {
            match classify(import, self.config) {
                Classification::Keep => {
                    self.imports.insert(import, unit.import_bindings(import));
                }
                Classification::Inline => {
                    self.check_cycle(import)?;
                    if !self.memo.contains_key(import.as_str()) {
                        self.inline(import)?;
                    }
                    inlined.push(import.clone());
                }
            }
        }

        for import in inlined {
            if unit.dot_imports(&import) {
                warn!(
                    "{} dot-imports inlined package {import}; its unqualified references are not rewritten",
                    unit.path
                );
            }
            let renames = &self.memo[import.as_str()].renames;
            rewrite_references(unit, &import, renames);
        }
        Ok(())
    }

    fn check_cycle(&self, import: &str) -> BundleResult<()> {
        let Some(start) = self.in_progress.iter().position(|path| path == import) else {
            return Ok(());
        };
        let mut chain = self.in_progress[start..].to_vec();
        chain.push(import.to_owned());
        Err(BundleError::ImportCycle { chain })
    }

    /// Load, rename, recurse into and emit one dependency
    fn inline(&mut self, import: &str) -> BundleResult<()> {
        let mut unit = self.loader.load(import)?;
        let prefix = self.prefix_for(&unit);
        debug!("Inlining {} as '{prefix}'", unit.path);

        let set = CollisionSet::for_unit(&unit);
        let renames = rename_unit(&mut unit, &set, &prefix);

        self.in_progress.push(unit.path.clone());
        self.visit(&mut unit)?;
        self.in_progress.pop();

        emit_unit(&unit, &mut self.output);
        let entry = InlinedPackage {
            path: unit.path.clone(),
            name: unit.name.clone(),
            renames,
        };
        self.memo.insert(import.to_owned(), entry);
        Ok(())
    }

    /// `<name>_`, numbered when another package already took it
    fn prefix_for(&mut self, unit: &ModuleUnit) -> String {
        let mut prefix = format!("{}_", unit.name);
        let mut n = 2;
        while self
            .prefixes
            .get(&prefix)
            .is_some_and(|owner| owner != &unit.path)
        {
            prefix = format!("{}{n}_", unit.name);
            n += 1;
        }
        if n > 2 {
            warn!(
                "Package name '{}' of {} is already used by {}, renaming with '{prefix}'",
                unit.name,
                unit.path,
                self.prefixes
                    .get(&format!("{}_", unit.name))
                    .map_or("another package", String::as_str)
            );
        }
        self.prefixes.insert(prefix.clone(), unit.path.clone());
        prefix
    }
}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cow_utils::CowUtils;
use indexmap::IndexMap;
use log::{debug, trace, warn};

use crate::{
    build_constraints::BuildContext,
    config::Config,
    error::{BundleError, BundleResult},
    syntax::{lexer, token::TokenKind},
};

/// A scoped guard for safely setting and cleaning up the GOPATH environment variable.
///
/// This guard ensures that the GOPATH environment variable is properly restored
/// to its original value when the guard is dropped, even if a panic occurs during testing.
///
/// # Example
///
/// ```rust
/// use burrow::resolver::GoPathGuard;
/// let _guard = GoPathGuard::new("/tmp/gopath");
/// // GOPATH is now set to "/tmp/gopath"
/// // When _guard goes out of scope, GOPATH is restored to its original value
/// ```
#[must_use = "GoPathGuard must be held in scope to ensure cleanup"]
pub struct GoPathGuard {
    /// The original value of GOPATH, if it was set
    original_value: Option<String>,
}

impl GoPathGuard {
    pub fn new(new_value: &str) -> Self {
        let original_value = std::env::var("GOPATH").ok();

        // SAFETY: only used from tests marked `serial`, and restored on drop
        unsafe {
            std::env::set_var("GOPATH", new_value);
        }

        Self { original_value }
    }

    pub fn unset() -> Self {
        let original_value = std::env::var("GOPATH").ok();

        // SAFETY: only used from tests marked `serial`, and restored on drop
        unsafe {
            std::env::remove_var("GOPATH");
        }

        Self { original_value }
    }
}

impl Drop for GoPathGuard {
    fn drop(&mut self) {
        // Restore even while unwinding; a second panic here would abort the test run
        #[allow(clippy::disallowed_methods)]
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            // SAFETY: restores the environment to its state before the guard
            unsafe {
                match self.original_value.take() {
                    Some(original) => std::env::set_var("GOPATH", original),
                    None => std::env::remove_var("GOPATH"),
                }
            }
        }));
    }
}

/// The module declared by `go.mod` and the directory it lives in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainModule {
    pub path: String,
    pub dir: PathBuf,
}

#[derive(Debug)]
pub struct ModuleResolver {
    config: Config,
    build: BuildContext,
    main_module: Option<MainModule>,
    /// Cache of resolved package directories
    package_cache: IndexMap<String, Option<PathBuf>>,
    /// Cache of package clause names
    name_cache: IndexMap<String, String>,
    /// GOPATH override for testing
    gopath_override: Option<String>,
}

impl ModuleResolver {
    /// Canonicalize a path, handling errors gracefully
    fn canonicalize_path(&self, path: PathBuf) -> PathBuf {
        match path.canonicalize() {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!("Failed to canonicalize path {}: {}", path.display(), e);
                path
            }
        }
    }

    pub fn new(config: Config) -> Result<Self> {
        Self::new_with_gopath(config, None)
    }

    /// Create a resolver with an explicit GOPATH instead of the environment's
    pub fn new_with_gopath(config: Config, gopath_override: Option<&str>) -> Result<Self> {
        let main_module = match &config.module_root {
            Some(root) => read_main_module(root)?,
            None => None,
        };
        if let Some(module) = &main_module {
            debug!(
                "Main module {} at {}",
                module.path,
                module.dir.display()
            );
        }
        Ok(Self {
            build: BuildContext::from_config(&config),
            config,
            main_module,
            package_cache: IndexMap::new(),
            name_cache: IndexMap::new(),
            gopath_override: gopath_override.map(str::to_owned),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn build_context(&self) -> &BuildContext {
        &self.build
    }

    pub fn main_module(&self) -> Option<&MainModule> {
        self.main_module.as_ref()
    }

    /// GOPATH entries, falling back to `$HOME/go` like the go command
    pub fn gopath_entries(&self) -> Vec<PathBuf> {
        let value = self
            .gopath_override
            .clone()
            .or_else(|| std::env::var("GOPATH").ok());
        match value {
            Some(value) => std::env::split_paths(&value)
                .filter(|entry| !entry.as_os_str().is_empty())
                .collect(),
            None => etcetera::home_dir()
                .map(|home| vec![home.join("go")])
                .unwrap_or_default(),
        }
    }

    /// Every directory that could hold `import_path`, in search order
    pub fn candidate_dirs(&self, import_path: &str) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(module) = &self.main_module {
            if import_path == module.path {
                candidates.push(module.dir.clone());
            } else if let Some(rest) = import_path
                .strip_prefix(module.path.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                candidates.push(module.dir.join(rest));
            }
        }
        if let Some(root) = &self.config.module_root {
            candidates.push(root.join("vendor").join(import_path));
        }
        for src in &self.config.src {
            candidates.push(src.join(import_path));
        }
        for gopath in self.gopath_entries() {
            candidates.push(gopath.join("src").join(import_path));
        }
        candidates
    }

    /// Find the directory of a package
    pub fn resolve_package_dir(&mut self, import_path: &str) -> Option<PathBuf> {
        if let Some(cached) = self.package_cache.get(import_path) {
            return cached.clone();
        }
        let found = self
            .candidate_dirs(import_path)
            .into_iter()
            .inspect(|candidate| trace!("Trying {}", candidate.display()))
            .find(|candidate| candidate.is_dir())
            .map(|dir| self.canonicalize_path(dir));
        match &found {
            Some(dir) => debug!("Resolved '{import_path}' to {}", dir.display()),
            None => debug!("Package '{import_path}' not found"),
        }
        self.package_cache
            .insert(import_path.to_owned(), found.clone());
        found
    }

    /// Buildable `.go` files of a package directory, sorted by file name
    pub fn buildable_files(&self, dir: &Path) -> BundleResult<Vec<(PathBuf, String)>> {
        let mut names = Vec::new();
        let entries = std::fs::read_dir(dir).map_err(|e| BundleError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| BundleError::io(dir, e))?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && self.build.matches_file_name(name)
            {
                names.push(name.to_owned());
            }
        }
        names.sort();

        let mut files = Vec::new();
        for name in names {
            let path = dir.join(&name);
            let text = std::fs::read_to_string(&path).map_err(|e| BundleError::io(&path, e))?;
            if self.build.matches_content(&text) {
                files.push((path, text));
            } else {
                debug!("Excluding {} by build constraints", path.display());
            }
        }
        Ok(files)
    }

    /// The name an import of `import_path` binds when it has no explicit name
    pub fn package_name(&mut self, import_path: &str) -> String {
        if let Some(name) = self.name_cache.get(import_path) {
            return name.clone();
        }
        let declared = self
            .resolve_package_dir(import_path)
            .and_then(|dir| self.buildable_files(&dir).ok())
            .and_then(|files| {
                files
                    .iter()
                    .find_map(|(_, text)| package_clause(text).map(str::to_owned))
            });
        let name = declared.unwrap_or_else(|| guess_package_name(import_path));
        self.name_cache.insert(import_path.to_owned(), name.clone());
        name
    }
}

/// Read `module` from `<root>/go.mod`, if present
pub fn read_main_module(root: &Path) -> Result<Option<MainModule>> {
    let go_mod = root.join("go.mod");
    if !go_mod.is_file() {
        warn!("No go.mod in module root {}", root.display());
        return Ok(None);
    }
    let text = std::fs::read_to_string(&go_mod)
        .with_context(|| format!("Failed to read {}", go_mod.display()))?;
    let Some(path) = module_directive(&text) else {
        warn!("{} has no module directive", go_mod.display());
        return Ok(None);
    };
    let dir = root
        .canonicalize()
        .unwrap_or_else(|_| root.to_path_buf());
    Ok(Some(MainModule { path, dir }))
}

fn module_directive(go_mod: &str) -> Option<String> {
    go_mod.lines().find_map(|line| {
        let line = line.split("//").next().unwrap_or_default().trim();
        let rest = line.strip_prefix("module")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let path = rest.trim().trim_matches(|c| c == '"' || c == '`');
        (!path.is_empty()).then(|| path.cow_replace('\\', "/").into_owned())
    })
}

/// The name in a file's `package` clause
pub fn package_clause(text: &str) -> Option<&str> {
    let lexed = lexer::lex(text).ok()?;
    let mut tokens = lexed.tokens.iter();
    tokens.find(|token| token.kind == TokenKind::Package)?;
    let name = tokens.next().filter(|token| token.kind == TokenKind::Ident)?;
    Some(&text[name.span.start as usize..name.span.end as usize])
}

/// Best guess at a package name from its import path alone
pub fn guess_package_name(import_path: &str) -> String {
    let mut elements: Vec<&str> = import_path.split('/').filter(|e| !e.is_empty()).collect();
    if elements.len() > 1
        && let Some(last) = elements.last()
        && is_major_version(last)
    {
        elements.pop();
    }
    let last = elements.last().copied().unwrap_or(import_path);
    let last = match last.rsplit_once(".v") {
        Some((base, version)) if !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()) => {
            base
        }
        _ => last,
    };
    let last = last.strip_prefix("go-").unwrap_or(last);
    last.cow_replace('-', "_").into_owned()
}

fn is_major_version(element: &str) -> bool {
    element
        .strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

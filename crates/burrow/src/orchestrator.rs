//! One bundling run, from root import path to written file

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::{
    assembler::assemble_formatted,
    config::Config,
    error::{BundleError, BundleResult},
    formatter::{SourceFormatter, formatter_for},
    loader::{GoLoader, ModuleLoader},
    resolver::ModuleResolver,
    walker::{DependencyWalker, WalkOutput},
};

/// Formatted bundle text and what went into it
#[derive(Debug, Clone)]
pub struct Bundle {
    pub source: String,
    pub walk: WalkOutput,
}

impl Bundle {
    pub fn inlined_paths(&self) -> impl Iterator<Item = &str> {
        self.walk.inlined.iter().map(|package| package.path.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleReport {
    pub output_path: PathBuf,
    pub inlined: usize,
    pub kept_imports: usize,
    pub bytes: usize,
}

#[derive(Debug)]
pub struct BundleOrchestrator {
    config: Config,
}

impl BundleOrchestrator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bundle `root` using packages from `loader`
    pub fn bundle_with(
        &self,
        loader: &mut dyn ModuleLoader,
        formatter: &dyn SourceFormatter,
        root: &str,
    ) -> BundleResult<Bundle> {
        if self.config.root_modules.is_empty() {
            warn!("No root modules configured; only vendored packages will be inlined");
        }
        let walk = DependencyWalker::new(loader, &self.config).walk(root)?;
        let source = assemble_formatted(&self.config.package_name, &walk, formatter)?;
        Ok(Bundle { source, walk })
    }

    /// Bundle `root` from disk with the configured formatter
    pub fn bundle(&self, root: &str) -> Result<Bundle> {
        let resolver = ModuleResolver::new(self.config.clone())?;
        let mut loader = GoLoader::new(resolver);
        let formatter = formatter_for(&self.config);
        self.bundle_with(&mut loader, formatter.as_ref(), root)
            .map_err(|err| self.explain(err, root))
    }

    /// `<destination root>/<target>/<file name>`
    pub fn output_path(&self, target: &str) -> PathBuf {
        self.config
            .destination_root
            .join(target)
            .join(&self.config.file_name)
    }

    /// Bundle `root` and write it for `target`
    pub fn run(&self, root: &str, target: &str) -> Result<BundleReport> {
        let bundle = self.bundle(root)?;
        let output_path = self.output_path(target);
        write_output(&output_path, &bundle.source)?;

        let report = BundleReport {
            output_path,
            inlined: bundle.walk.inlined.len(),
            kept_imports: bundle.walk.imports.len(),
            bytes: bundle.source.len(),
        };
        info!(
            "Bundled {root}: {} packages inlined, {} imports kept, {} bytes written to {}",
            report.inlined,
            report.kept_imports,
            report.bytes,
            report.output_path.display()
        );
        Ok(report)
    }

    /// Attach diagnostics; a formatter rejection is saved for inspection
    fn explain(&self, err: BundleError, root: &str) -> anyhow::Error {
        let Some(text) = err.unformatted_source() else {
            return anyhow::Error::new(err).context(format!("Failed to bundle {root}"));
        };
        match save_unformatted(root, text) {
            Ok(path) => anyhow::Error::new(err).context(format!(
                "Failed to bundle {root}; unformatted output saved to {}",
                path.display()
            )),
            Err(save_err) => {
                warn!("Could not save unformatted output: {save_err:#}");
                anyhow::Error::new(err).context(format!("Failed to bundle {root}"))
            }
        }
    }
}

/// Write the bundle, creating directories and making the file world-writable
pub fn write_output(path: &Path, source: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, source)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }
    debug!("Wrote {} bytes to {}", source.len(), path.display());
    Ok(())
}

/// Save text a formatter rejected to the temp directory
pub fn save_unformatted(root: &str, text: &str) -> Result<PathBuf> {
    let stem: String = root
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let path = std::env::temp_dir().join(format!("burrow-{stem}-unformatted.go"));
    std::fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use indexmap::IndexSet;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::{formatter::BuiltinFormatter, loader::InMemoryLoader};

    fn config(destination_root: &Path) -> Config {
        Config {
            root_modules: IndexSet::from(["acme.io".to_owned()]),
            destination_root: destination_root.to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn test_output_path_layout() {
        let orchestrator = BundleOrchestrator::new(Config::default());
        assert_eq!(
            orchestrator.output_path("billing"),
            PathBuf::from("build/billing/plugin.go")
        );
    }

    #[test]
    fn test_bundle_with_in_memory_loader() {
        let mut loader = InMemoryLoader::new();
        loader
            .register(
                "acme.io/app",
                [("main.go", "package main\n\nimport \"acme.io/greet\"\n\nfunc main() { greet.Hello() }\n")],
            )
            .register(
                "acme.io/greet",
                [("greet.go", "package greet\n\nimport \"fmt\"\n\nfunc Hello() { fmt.Println(\"hello\") }\n")],
            );
        let orchestrator = BundleOrchestrator::new(config(Path::new("build")));
        let bundle = orchestrator
            .bundle_with(&mut loader, &BuiltinFormatter, "acme.io/app")
            .expect("bundles");
        assert_eq!(
            bundle.source,
            "package main\n\nimport (\n\t\"fmt\"\n)\n\nfunc greet_Hello() { fmt.Println(\"hello\") }\n\nfunc main() { greet_Hello() }\n"
        );
        assert_eq!(bundle.inlined_paths().collect::<Vec<_>>(), vec!["acme.io/greet"]);
    }

    #[test]
    fn test_write_output_creates_dirs() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("build/billing/plugin.go");
        write_output(&path, "package main\n")?;
        assert_eq!(std::fs::read_to_string(&path)?, "package main\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path)?.permissions().mode();
            assert_eq!(mode & 0o777, 0o666);
        }
        Ok(())
    }

    #[test]
    fn test_save_unformatted_names_file_after_root() -> Result<()> {
        let path = save_unformatted("acme.io/app", "package main\nfunc (")?;
        assert!(
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name == "burrow-acme_io_app-unformatted.go")
        );
        assert_eq!(std::fs::read_to_string(&path)?, "package main\nfunc (");
        std::fs::remove_file(path)?;
        Ok(())
    }
}

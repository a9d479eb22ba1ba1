//! Bundler configuration
//!
//! Layers, later ones override earlier ones:
//! built-in defaults, the user config (`<config dir>/burrow/burrow.toml`),
//! `./burrow.toml`, an explicit `--config` file, `BURROW_*` environment
//! variables, and finally command-line flags (applied by the binary).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use etcetera::BaseStrategy;
use indexmap::IndexSet;
use log::debug;
use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "burrow.toml";

/// Which formatter normalizes the bundled source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FormatterChoice {
    /// `gofmt` when it can be found, the builtin formatter otherwise
    #[default]
    Auto,
    Gofmt,
    Builtin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Import path prefixes of first-party code to inline
    pub root_modules: IndexSet<String>,
    /// Substrings marking vendored third-party code to inline
    pub vendor_markers: IndexSet<String>,
    /// Import path prefixes that are always kept as imports
    pub known_external: IndexSet<String>,
    /// Extra GOPATH-style source roots (`<src>/<import path>`)
    pub src: Vec<PathBuf>,
    /// Directory holding the main module's `go.mod`
    pub module_root: Option<PathBuf>,
    pub file_name: String,
    pub package_name: String,
    pub destination_root: PathBuf,
    pub formatter: FormatterChoice,
    pub gofmt_path: Option<PathBuf>,
    pub goos: String,
    pub goarch: String,
    pub build_tags: IndexSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_modules: IndexSet::new(),
            vendor_markers: IndexSet::from(["github.com".to_owned()]),
            known_external: IndexSet::new(),
            src: Vec::new(),
            module_root: None,
            file_name: "plugin.go".to_owned(),
            package_name: "main".to_owned(),
            destination_root: PathBuf::from("build"),
            formatter: FormatterChoice::Auto,
            gofmt_path: None,
            goos: host_goos(),
            goarch: host_goarch(),
            build_tags: IndexSet::new(),
        }
    }
}

/// One configuration layer; unset fields leave the previous value alone
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PartialConfig {
    pub root_modules: Option<Vec<String>>,
    pub vendor_markers: Option<Vec<String>>,
    pub known_external: Option<Vec<String>>,
    pub src: Option<Vec<PathBuf>>,
    pub module_root: Option<PathBuf>,
    pub file_name: Option<String>,
    pub package_name: Option<String>,
    pub destination_root: Option<PathBuf>,
    pub formatter: Option<FormatterChoice>,
    pub gofmt_path: Option<PathBuf>,
    pub goos: Option<String>,
    pub goarch: Option<String>,
    pub build_tags: Option<Vec<String>>,
}

impl PartialConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// The `BURROW_*` environment layer
    pub fn from_env(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let list = |name: &str| var(name).map(|value| split_list(&value));
        let formatter = match var("BURROW_FORMATTER") {
            Some(value) => Some(parse_formatter(&value).with_context(|| {
                format!("Invalid BURROW_FORMATTER value '{value}'")
            })?),
            None => None,
        };
        Ok(Self {
            root_modules: list("BURROW_ROOT_MODULES"),
            vendor_markers: list("BURROW_VENDOR_MARKERS"),
            known_external: list("BURROW_KNOWN_EXTERNAL"),
            formatter,
            gofmt_path: var("BURROW_GOFMT").map(PathBuf::from),
            ..Self::default()
        })
    }
}

impl Config {
    /// Load every file and environment layer on top of the defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(user) = user_config_path()
            && user.is_file()
        {
            debug!("Loading user config from {}", user.display());
            config.apply(PartialConfig::from_file(&user)?);
        }
        let project = Path::new(CONFIG_FILE_NAME);
        if project.is_file() {
            debug!("Loading project config from {}", project.display());
            config.apply(PartialConfig::from_file(project)?);
        }
        if let Some(path) = explicit {
            debug!("Loading config from {}", path.display());
            config.apply(PartialConfig::from_file(path)?);
        }
        config.apply(PartialConfig::from_env(|name| std::env::var(name).ok())?);
        Ok(config)
    }

    pub fn apply(&mut self, layer: PartialConfig) {
        if let Some(values) = layer.root_modules {
            self.root_modules = values.into_iter().collect();
        }
        if let Some(values) = layer.vendor_markers {
            self.vendor_markers = values.into_iter().collect();
        }
        if let Some(values) = layer.known_external {
            self.known_external = values.into_iter().collect();
        }
        if let Some(src) = layer.src {
            self.src = src;
        }
        if let Some(values) = layer.build_tags {
            self.build_tags = values.into_iter().collect();
        }
        macro_rules! replace {
            ($($field:ident),*) => {
                $(if let Some(value) = layer.$field {
                    self.$field = value;
                })*
            };
        }
        replace!(file_name, package_name, destination_root, formatter, goos, goarch);
        if layer.module_root.is_some() {
            self.module_root = layer.module_root;
        }
        if layer.gofmt_path.is_some() {
            self.gofmt_path = layer.gofmt_path;
        }
    }
}

pub fn user_config_path() -> Option<PathBuf> {
    let strategy = etcetera::choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("burrow").join(CONFIG_FILE_NAME))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_formatter(value: &str) -> Result<FormatterChoice> {
    match value.trim().to_ascii_lowercase().as_str() {
        "auto" => Ok(FormatterChoice::Auto),
        "gofmt" => Ok(FormatterChoice::Gofmt),
        "builtin" => Ok(FormatterChoice::Builtin),
        other => anyhow::bail!("expected auto, gofmt or builtin, got '{other}'"),
    }
}

/// GOOS of the host, honoring an explicit `GOOS`
fn host_goos() -> String {
    if let Ok(goos) = std::env::var("GOOS")
        && !goos.is_empty()
    {
        return goos;
    }
    match std::env::consts::OS {
        "macos" => "darwin".to_owned(),
        other => other.to_owned(),
    }
}

/// GOARCH of the host, honoring an explicit `GOARCH`
fn host_goarch() -> String {
    if let Ok(goarch) = std::env::var("GOARCH")
        && !goarch.is_empty()
    {
        return goarch;
    }
    match std::env::consts::ARCH {
        "x86_64" => "amd64".to_owned(),
        "x86" => "386".to_owned(),
        "aarch64" => "arm64".to_owned(),
        "powerpc64" => "ppc64".to_owned(),
        "loongarch64" => "loong64".to_owned(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.file_name, "plugin.go");
        assert_eq!(config.package_name, "main");
        assert_eq!(config.destination_root, PathBuf::from("build"));
        assert!(config.vendor_markers.contains("github.com"));
        assert!(config.root_modules.is_empty());
        assert_eq!(config.formatter, FormatterChoice::Auto);
    }

    #[test]
    fn test_file_layer_overrides_only_set_fields() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
root-modules = ["acme.io/platform"]
vendor-markers = ["github.com", "gitlab.com"]
package-name = "plugin"
formatter = "builtin"
build-tags = ["netgo"]
"#,
        )?;
        let mut config = Config::default();
        config.apply(PartialConfig::from_file(&path)?);

        assert_eq!(
            config.root_modules,
            IndexSet::from(["acme.io/platform".to_owned()])
        );
        assert_eq!(config.vendor_markers.len(), 2);
        assert_eq!(config.package_name, "plugin");
        assert_eq!(config.file_name, "plugin.go");
        assert_eq!(config.formatter, FormatterChoice::Builtin);
        assert!(config.build_tags.contains("netgo"));
        Ok(())
    }

    #[test]
    fn test_malformed_file_names_path() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("broken.toml");
        std::fs::write(&path, "root-modules = [")?;
        let err = PartialConfig::from_file(&path).expect_err("malformed");
        assert!(format!("{err:#}").contains("broken.toml"));
        Ok(())
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(PartialConfig::from_toml("root_module = \"x\"").is_err());
    }

    #[test]
    fn test_env_layer() -> Result<()> {
        let layer = PartialConfig::from_env(|name| match name {
            "BURROW_ROOT_MODULES" => Some("acme.io/a, acme.io/b,".to_owned()),
            "BURROW_FORMATTER" => Some("GOFMT".to_owned()),
            "BURROW_GOFMT" => Some("/opt/go/bin/gofmt".to_owned()),
            _ => None,
        })?;
        let mut config = Config::default();
        config.apply(layer);
        assert_eq!(
            config.root_modules.iter().collect::<Vec<_>>(),
            vec!["acme.io/a", "acme.io/b"]
        );
        assert_eq!(config.formatter, FormatterChoice::Gofmt);
        assert_eq!(config.gofmt_path, Some(PathBuf::from("/opt/go/bin/gofmt")));
        assert!(config.vendor_markers.contains("github.com"));
        Ok(())
    }

    #[test]
    fn test_env_layer_rejects_unknown_formatter() {
        let result = PartialConfig::from_env(|name| {
            (name == "BURROW_FORMATTER").then(|| "prettier".to_owned())
        });
        assert!(result.is_err());
    }
}

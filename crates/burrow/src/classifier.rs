//! Keep-or-inline decision for import paths

use log::debug;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Stays an ordinary import of the bundle
    Keep,
    /// Source is merged into the bundle
    Inline,
}

/// Why an import path got its [`Classification`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportKind {
    Standard,
    External,
    FirstParty,
    Vendored,
}

impl ImportKind {
    pub fn classification(self) -> Classification {
        match self {
            Self::Standard | Self::External => Classification::Keep,
            Self::FirstParty | Self::Vendored => Classification::Inline,
        }
    }
}

/// Classify an import path; first matching rule wins
pub fn import_kind(path: &str, config: &Config) -> ImportKind {
    let kind = if config
        .known_external
        .iter()
        .any(|prefix| has_path_prefix(path, prefix))
    {
        ImportKind::External
    } else if config
        .root_modules
        .iter()
        .any(|prefix| has_path_prefix(path, prefix))
    {
        ImportKind::FirstParty
    } else if is_standard_import_path(path) {
        ImportKind::Standard
    } else if config
        .vendor_markers
        .iter()
        .any(|marker| !marker.is_empty() && path.contains(marker.as_str()))
    {
        ImportKind::Vendored
    } else {
        ImportKind::External
    };
    debug!("Classified '{path}' as {kind:?}");
    kind
}

pub fn classify(path: &str, config: &Config) -> Classification {
    import_kind(path, config).classification()
}

/// The leading element of standard library paths has no dot
pub fn is_standard_import_path(path: &str) -> bool {
    let first = path.split('/').next().unwrap_or(path);
    !first.contains('.')
}

/// `prefix` matches `path` as whole path elements
fn has_path_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use indexmap::IndexSet;
    use pretty_assertions::assert_eq;

    use super::*;

    fn config() -> Config {
        Config {
            root_modules: IndexSet::from(["acme.io/platform".to_owned(), "corp".to_owned()]),
            known_external: IndexSet::from(["github.com/acme/sdk".to_owned()]),
            ..Config::default()
        }
    }

    #[test]
    fn test_standard_library_kept() {
        let config = config();
        assert_eq!(import_kind("fmt", &config), ImportKind::Standard);
        assert_eq!(import_kind("net/http", &config), ImportKind::Standard);
        assert_eq!(classify("encoding/json", &config), Classification::Keep);
    }

    #[test]
    fn test_root_modules_inlined_at_segment_boundary() {
        let config = config();
        assert_eq!(import_kind("acme.io/platform", &config), ImportKind::FirstParty);
        assert_eq!(import_kind("acme.io/platform/geo", &config), ImportKind::FirstParty);
        assert_eq!(import_kind("acme.io/platformer", &config), ImportKind::External);
    }

    #[test]
    fn test_root_module_beats_standard_heuristic() {
        // a dotless module path would otherwise look like the standard library
        assert_eq!(import_kind("corp/shared", &config()), ImportKind::FirstParty);
    }

    #[test]
    fn test_vendor_marker_and_known_external() {
        let config = config();
        assert_eq!(import_kind("github.com/x/y", &config), ImportKind::Vendored);
        assert_eq!(classify("github.com/x/y", &config), Classification::Inline);
        assert_eq!(import_kind("github.com/acme/sdk/v2", &config), ImportKind::External);
        assert_eq!(import_kind("golang.org/x/sync", &config), ImportKind::External);
    }

    #[test]
    fn test_without_root_modules_nothing_first_party() {
        let config = Config::default();
        assert_eq!(import_kind("acme.io/platform/geo", &config), ImportKind::External);
    }
}

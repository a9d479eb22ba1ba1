//! Prefix renaming inside an inlined package

use indexmap::IndexMap;
use log::{debug, trace};

use crate::{collision::CollisionSet, loader::ModuleUnit};

/// Original to renamed name of every renamed package-scope symbol
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameTable {
    prefix: String,
    names: IndexMap<String, String>,
}

impl RenameTable {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            names: IndexMap::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.names.get(original).map(String::as_str)
    }

    /// The renamed form, or `prefix + original` for names not in the table
    pub fn renamed_or_prefixed(&self, original: &str) -> (String, bool) {
        match self.get(original) {
            Some(renamed) => (renamed.to_owned(), true),
            None => (format!("{}{original}", self.prefix), false),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .map(|(original, renamed)| (original.as_str(), renamed.as_str()))
    }
}

/// Rename every definition and use of the set's symbols to `prefix + name`
pub fn rename_unit(unit: &mut ModuleUnit, set: &CollisionSet, prefix: &str) -> RenameTable {
    let table = &unit.symbols;
    let mut renamed_sites = 0usize;
    for (&ident, &symbol) in table.defs.iter().chain(table.uses.iter()) {
        if !set.contains(symbol) {
            continue;
        }
        let name = format!("{prefix}{}", table.symbol(symbol).name);
        trace!("{} -> {name}", unit.idents.original(ident));
        unit.idents.rename(ident, name);
        renamed_sites += 1;
    }

    let mut renames = RenameTable::new(prefix);
    for &symbol in &table.package_scope {
        if set.contains(symbol) {
            let name = &table.symbol(symbol).name;
            renames
                .names
                .insert(name.clone(), format!("{prefix}{name}"));
        }
    }
    debug!(
        "Renamed {} symbols of {} at {renamed_sites} sites with prefix '{prefix}'",
        set.len(),
        unit.path
    );
    renames
}

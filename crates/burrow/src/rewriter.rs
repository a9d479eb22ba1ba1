//! Qualified reference rewriting in a dependent package
//!
//! `geo.Point` becomes `<sentinel>.geo_Point` in the arena; the emitter
//! drops the sentinel together with its dot, leaving `geo_Point`.

use log::{debug, trace, warn};

use crate::{
    loader::ModuleUnit,
    renamer::RenameTable,
    semantic::{SymbolId, SymbolKind},
};

/// Placeholder name for a qualifier that no longer exists
///
/// Not a valid Go identifier, so it can never clash with real names.
pub const QUALIFIER_SENTINEL: &str = "@@inlined@@";

/// Point every reference to `inlined_path` at its renamed symbol
///
/// Returns the number of rewritten references.
pub fn rewrite_references(unit: &mut ModuleUnit, inlined_path: &str, renames: &RenameTable) -> usize {
    let mut rewritten = 0;
    let mut embedded_fields: Vec<(SymbolId, String)> = Vec::new();

    for reference in &unit.symbols.qualified_refs {
        let Some(qualifier) = unit.symbols.use_of(reference.qualifier) else {
            continue;
        };
        match &unit.symbols.symbol(qualifier).kind {
            SymbolKind::PkgName { path } if path == inlined_path => {}
            _ => continue,
        }

        let selector = unit.idents.original(reference.selector).to_owned();
        let (renamed, known) = renames.renamed_or_prefixed(&selector);
        if !known {
            warn!(
                "{} has no package-scope symbol '{selector}' to refer to from {}, using '{renamed}'",
                inlined_path, unit.path
            );
        }
        trace!("{}.{selector} -> {renamed}", unit.idents.original(reference.qualifier));

        if let Some(field) = unit.symbols.def_of(reference.selector)
            && unit.symbols.symbol(field).kind == (SymbolKind::Field { embedded: true })
        {
            embedded_fields.push((field, renamed.clone()));
        }
        unit.idents.rename(reference.selector, renamed);
        unit.idents.rename(reference.qualifier, QUALIFIER_SENTINEL);
        rewritten += 1;
    }

    // a field embedding `geo.Point` is called `Point`; it takes the new type name
    for (field, renamed) in embedded_fields {
        let sites: Vec<_> = unit.symbols.occurrences(field).collect();
        for site in sites {
            unit.idents.rename(site, renamed.clone());
        }
    }

    if rewritten > 0 {
        debug!("Rewrote {rewritten} references from {} to {inlined_path}", unit.path);
    }
    rewritten
}

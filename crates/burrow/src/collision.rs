//! Which symbols of an inlined package need a rename
//!
//! Every package-scope name is renamed. The set is then closed over
//! embedded struct fields: an embedded field is named after its type, so
//! when the type is renamed the field has to follow. Other reference chains
//! are deliberately not followed.

use indexmap::IndexSet;
use log::trace;

use crate::{
    loader::ModuleUnit,
    semantic::{SymbolId, SymbolTable},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollisionSet {
    symbols: IndexSet<SymbolId>,
}

impl CollisionSet {
    pub fn for_unit(unit: &ModuleUnit) -> Self {
        Self::build(&unit.symbols)
    }

    pub fn build(table: &SymbolTable) -> Self {
        let mut set = Self::default();
        for &seed in &table.package_scope {
            set.close_over(table, seed);
        }
        set
    }

    fn close_over(&mut self, table: &SymbolTable, seed: SymbolId) {
        let mut pending = vec![seed];
        while let Some(symbol) = pending.pop() {
            if !self.symbols.insert(symbol) {
                continue;
            }
            trace!("collision set += {}", table.symbol(symbol).name);
            if !table.symbol(symbol).is_type_name() {
                continue;
            }
            // use sites that also define something: embedded fields
            let defined: Vec<SymbolId> = table
                .uses
                .iter()
                .filter(|(_, used)| **used == symbol)
                .filter_map(|(ident, _)| table.def_of(*ident))
                .collect();
            pending.extend(defined.into_iter().rev());
        }
    }

    pub fn contains(&self, symbol: SymbolId) -> bool {
        self.symbols.contains(&symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Members in discovery order
    pub fn iter(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.symbols.iter().copied()
    }
}

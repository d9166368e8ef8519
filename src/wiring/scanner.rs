//! Per-type handler table assembly and caching.

use std::any::TypeId;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::marker::{Behavior, HandlerDecl};

/// Assembles a type's handler table on first encounter and caches it by
/// `TypeId`. Types with no declarations land in a negative cache so every
/// later instance short-circuits all downstream work.
#[derive(Default)]
pub struct MetadataScanner {
    decls: FxHashMap<TypeId, Rc<[HandlerDecl]>>,
    unmarked: FxHashSet<TypeId>,
}

impl MetadataScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the declaration table for the behavior's concrete type, or
    /// `None` when the type declares no handlers.
    pub fn scan(&mut self, behavior: &dyn Behavior) -> Option<Rc<[HandlerDecl]>> {
        let ty = behavior.as_any().type_id();
        if self.unmarked.contains(&ty) {
            return None;
        }
        if let Some(cached) = self.decls.get(&ty) {
            return Some(cached.clone());
        }

        let assembled = behavior.handlers();
        if assembled.is_empty() {
            self.unmarked.insert(ty);
            return None;
        }
        let table: Rc<[HandlerDecl]> = assembled.into();
        self.decls.insert(ty, table.clone());
        Some(table)
    }

    /// Number of types with a cached result, marked or not.
    pub fn cached_types(&self) -> usize {
        self.decls.len() + self.unmarked.len()
    }

    pub fn clear(&mut self) {
        self.decls.clear();
        self.unmarked.clear();
    }
}

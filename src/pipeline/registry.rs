//! The explicit pass registry.
//!
//! Passes are enumerated in a table instead of being discovered by
//! scanning a package: the set is statically verifiable and each entry is
//! just a zero-argument constructor. The table order is the recommended
//! default pipeline order (vendor decryption → generic flow cleanup →
//! constant/field folding → inlining → dead-code removal → attribute
//! cleanup); callers compose their own selections freely.

use crate::passes::{
    cleanup::{
        InlineConstantFields, InlineTrivialMethods, RemoveUnusedClasses, SimplifyBitOperations,
        StripAttributes,
    },
    zkm::{RemoveFakeTryCatch, ZkmDesDecrypt},
};
use crate::pipeline::pass::{Pass, PassInfo};

/// Holds the instantiated pass set for a pipeline run.
pub struct PassRegistry {
    passes: Vec<Box<dyn Pass>>,
}

impl Default for PassRegistry {
    fn default() -> Self {
        PassRegistry::new()
    }
}

impl PassRegistry {
    /// Instantiates every builtin pass in recommended order.
    #[must_use]
    pub fn new() -> Self {
        PassRegistry {
            passes: vec![
                Box::new(ZkmDesDecrypt::new()),
                Box::new(RemoveFakeTryCatch::new()),
                Box::new(SimplifyBitOperations::new()),
                Box::new(InlineConstantFields::new()),
                Box::new(InlineTrivialMethods::new()),
                Box::new(RemoveUnusedClasses::new()),
                Box::new(StripAttributes::new()),
            ],
        }
    }

    /// Metadata of every registered pass, in registry order.
    #[must_use]
    pub fn list_passes(&self) -> Vec<&'static PassInfo> {
        self.passes.iter().map(|p| p.info()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub(crate) fn find_mut(&mut self, id: &str) -> Option<&mut Box<dyn Pass>> {
        self.passes.iter_mut().find(|p| p.info().id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_unique_and_stable() {
        let registry = PassRegistry::new();
        let infos = registry.list_passes();
        assert!(!infos.is_empty());

        let mut ids: Vec<&str> = infos.iter().map(|i| i.id).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total, "duplicate pass identifiers");
    }

    #[test]
    fn vendor_passes_precede_cleanup() {
        let registry = PassRegistry::new();
        let ids: Vec<&str> = registry.list_passes().iter().map(|i| i.id).collect();
        let zkm = ids.iter().position(|&id| id == "zkm-des-decrypt").unwrap();
        let unused = ids
            .iter()
            .position(|&id| id == "remove-unused-classes")
            .unwrap();
        assert!(zkm < unused);
    }
}

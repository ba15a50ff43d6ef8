//! The restricted class loader.
//!
//! Resolution follows a fixed policy:
//!
//! 1. Explicitly preloaded classes (injected without initialization).
//! 2. Classes the [`VmReferenceHandler`] can supply - typically a view
//!    into the universe under analysis.
//! 3. The builtin allow-list of runtime classes (strings, numerics, a few
//!    collections, the DES crypto primitives, method-handle plumbing),
//!    dispatched to native implementations.
//! 4. Everything else: a *stub class* whose methods return typed defaults
//!    and whose initializers are empty. Adversarial static initializers in
//!    peripheral classes can therefore link without running.

use std::rc::Rc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::ir::ClassNode;
use crate::sandbox::natives;

/// Highest class file major version the sandbox materializes. Derived
/// probes ([`supported_class_version`](crate::sandbox::supported_class_version))
/// report against this constant rather than a hard-coded range.
pub const LATEST_MAJOR_VERSION: u16 = 69;
/// Lowest accepted class file major version (1.1).
pub const OLDEST_MAJOR_VERSION: u16 = 45;

/// Resolves class names that are not part of the sandbox's own universe.
///
/// Implementations typically look into the universe under analysis and
/// hand out a clone of the stored node.
pub trait VmReferenceHandler {
    /// The class node for `name` (internal form), or `None` if this
    /// handler does not know it.
    fn try_class_load(&self, name: &str) -> Option<ClassNode>;
}

/// A reference handler that resolves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferenceHandler;

impl VmReferenceHandler for NoReferenceHandler {
    fn try_class_load(&self, _name: &str) -> Option<ClassNode> {
        None
    }
}

/// How a name was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// Materialized from an in-memory class node.
    User,
    /// Allow-listed runtime class with native dispatch.
    Builtin,
    /// Synthesized stub.
    Stub,
}

/// A resolved class in the loader cache.
#[derive(Debug, Clone)]
pub(crate) enum LoadedClass {
    User(Rc<ClassNode>),
    Builtin,
    Stub,
}

impl LoadedClass {
    pub(crate) fn kind(&self) -> ClassKind {
        match self {
            LoadedClass::User(_) => ClassKind::User,
            LoadedClass::Builtin => ClassKind::Builtin,
            LoadedClass::Stub => ClassKind::Stub,
        }
    }

    pub(crate) fn node(&self) -> Option<&Rc<ClassNode>> {
        match self {
            LoadedClass::User(node) => Some(node),
            _ => None,
        }
    }
}

pub(crate) struct SandboxLoader {
    handler: Box<dyn VmReferenceHandler>,
    cache: FxHashMap<String, LoadedClass>,
}

impl SandboxLoader {
    pub(crate) fn new(handler: Box<dyn VmReferenceHandler>) -> Self {
        SandboxLoader {
            handler,
            cache: FxHashMap::default(),
        }
    }

    /// Injects `node` into the cache without triggering initialization.
    /// Replaces any previous entry of the same name.
    pub(crate) fn preload(&mut self, node: ClassNode) {
        self.cache
            .insert(node.name.clone(), LoadedClass::User(Rc::new(node)));
    }

    /// Resolves `name` by policy. Returns `None` only when a user-supplied
    /// node exists but carries an unsupported class file version - the one
    /// genuine load failure the sandbox reports.
    pub(crate) fn resolve(&mut self, name: &str) -> Option<LoadedClass> {
        if let Some(found) = self.cache.get(name) {
            return Self::version_checked(found.clone());
        }

        let resolved = if let Some(node) = self.handler.try_class_load(name) {
            LoadedClass::User(Rc::new(node))
        } else if natives::is_builtin_class(name) {
            LoadedClass::Builtin
        } else {
            debug!("stubbing unresolvable class {name}");
            LoadedClass::Stub
        };
        self.cache.insert(name.to_string(), resolved.clone());
        Self::version_checked(resolved)
    }

    fn version_checked(class: LoadedClass) -> Option<LoadedClass> {
        if let LoadedClass::User(node) = &class {
            let major = node.major_version();
            if !(OLDEST_MAJOR_VERSION..=LATEST_MAJOR_VERSION).contains(&major) {
                debug!(
                    "refusing class {} with unsupported major version {major}",
                    node.name
                );
                return None;
            }
        }
        Some(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneClass(ClassNode);
    impl VmReferenceHandler for OneClass {
        fn try_class_load(&self, name: &str) -> Option<ClassNode> {
            (name == self.0.name).then(|| self.0.clone())
        }
    }

    #[test]
    fn resolution_policy_order() {
        let node = ClassNode::new("a/A", 52);
        let mut loader = SandboxLoader::new(Box::new(OneClass(node)));

        assert_eq!(loader.resolve("a/A").unwrap().kind(), ClassKind::User);
        assert_eq!(
            loader.resolve("java/lang/String").unwrap().kind(),
            ClassKind::Builtin
        );
        assert_eq!(
            loader.resolve("com/vendor/Unknown").unwrap().kind(),
            ClassKind::Stub
        );
    }

    #[test]
    fn preload_wins_over_handler() {
        let handler_node = ClassNode::new("a/A", 52);
        let mut loader = SandboxLoader::new(Box::new(OneClass(handler_node)));
        let mut preloaded = ClassNode::new("a/A", 52);
        preloaded.source_file = Some("marker".into());
        loader.preload(preloaded);

        let resolved = loader.resolve("a/A").unwrap();
        assert_eq!(
            resolved.node().unwrap().source_file.as_deref(),
            Some("marker")
        );
    }

    #[test]
    fn unsupported_version_fails_load() {
        let mut loader = SandboxLoader::new(Box::new(NoReferenceHandler));
        loader.preload(ClassNode::new("v/High", LATEST_MAJOR_VERSION + 1));
        loader.preload(ClassNode::new("v/Ok", LATEST_MAJOR_VERSION));
        assert!(loader.resolve("v/High").is_none());
        assert!(loader.resolve("v/Ok").is_some());
    }
}

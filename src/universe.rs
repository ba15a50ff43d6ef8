//! The class universe: every class under analysis, keyed by internal name.

use rustc_hash::FxHashMap;

use crate::ir::ClassNode;

/// One class under analysis: the mutable node, where it came from, and the
/// failures recorded against it during any pass.
#[derive(Debug, Clone)]
pub struct ClassEntry {
    pub node: ClassNode,
    /// Original container entry path (e.g. `com/example/Foo.class`).
    pub origin: String,
    /// Per-class failure log: `(pass name, message)` pairs.
    pub failures: Vec<(String, String)>,
}

impl ClassEntry {
    #[must_use]
    pub fn new(node: ClassNode) -> Self {
        let origin = format!("{}.class", node.name);
        ClassEntry {
            node,
            origin,
            failures: Vec::new(),
        }
    }

    /// Records a pass failure against this class.
    pub fn record_failure(&mut self, pass: &str, message: impl Into<String>) {
        self.failures.push((pass.to_string(), message.into()));
    }
}

/// Mutable map of all classes under analysis.
///
/// Passes receive exclusive mutable access for the duration of their
/// execution and may add, remove or replace entries. Key iteration order
/// carries no meaning; passes that mutate while iterating must work off a
/// [`names`](Universe::names) snapshot.
#[derive(Debug, Default)]
pub struct Universe {
    classes: FxHashMap<String, ClassEntry>,
}

impl Universe {
    #[must_use]
    pub fn new() -> Self {
        Universe::default()
    }

    /// Inserts a class, keyed by its internal name. Replaces and returns
    /// any previous entry with the same name.
    pub fn insert(&mut self, entry: ClassEntry) -> Option<ClassEntry> {
        self.classes.insert(entry.node.name.clone(), entry)
    }

    pub fn remove(&mut self, name: &str) -> Option<ClassEntry> {
        self.classes.remove(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ClassEntry> {
        self.classes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ClassEntry> {
        self.classes.get_mut(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Stable snapshot of all class names, sorted for deterministic
    /// iteration while the universe is being mutated.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ClassEntry)> {
        self.classes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut ClassEntry)> {
        self.classes.iter_mut()
    }

    /// Records a failure against a class, if it is (still) present.
    pub fn record_failure(&mut self, class: &str, pass: &str, message: impl Into<String>) {
        if let Some(entry) = self.classes.get_mut(class) {
            entry.record_failure(pass, message);
        }
    }
}

impl FromIterator<ClassNode> for Universe {
    fn from_iter<T: IntoIterator<Item = ClassNode>>(iter: T) -> Self {
        let mut universe = Universe::new();
        for node in iter {
            universe.insert(ClassEntry::new(node));
        }
        universe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_sorted_and_stable() {
        let universe: Universe = ["b/B", "a/A", "c/C"]
            .into_iter()
            .map(|n| ClassNode::new(n, 52))
            .collect();
        assert_eq!(universe.names(), vec!["a/A", "b/B", "c/C"]);
        assert_eq!(universe.len(), 3);
    }

    #[test]
    fn failures_attach_to_entries() {
        let mut universe: Universe = [ClassNode::new("a/A", 52)].into_iter().collect();
        universe.record_failure("a/A", "some-pass", "boom");
        universe.record_failure("missing", "some-pass", "ignored");
        assert_eq!(universe.get("a/A").unwrap().failures.len(), 1);
    }
}

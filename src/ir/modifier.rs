//! Batched instruction edits.

use rustc_hash::FxHashMap;

use crate::ir::{insn::Insn, method::MethodNode};

/// Buffers pending edits against a method's instruction list and applies
/// them in one atomic step.
///
/// Passes iterate the original list, collecting positions of interest, and
/// queue their rewrites here. Nothing moves until [`apply`](Self::apply),
/// so every queued index keeps referring to the instruction the pass saw -
/// no iterator invalidation, and the whole edit set is reviewable as a
/// unit before it lands.
///
/// Edits are keyed by position: at most one removal/replacement per index
/// (a later queue call overwrites an earlier one), plus any number of
/// before/after insertions.
#[derive(Debug, Default)]
pub struct InstructionModifier {
    replacements: FxHashMap<usize, Vec<Insn>>,
    before: FxHashMap<usize, Vec<Insn>>,
    after: FxHashMap<usize, Vec<Insn>>,
}

impl InstructionModifier {
    #[must_use]
    pub fn new() -> Self {
        InstructionModifier::default()
    }

    /// Queues removal of the instruction at `idx`.
    pub fn remove(&mut self, idx: usize) {
        self.replacements.insert(idx, Vec::new());
    }

    /// Queues replacement of the instruction at `idx` with `insns`.
    pub fn replace(&mut self, idx: usize, insns: Vec<Insn>) {
        self.replacements.insert(idx, insns);
    }

    /// Queues insertion of `insns` immediately before the instruction at `idx`.
    pub fn insert_before(&mut self, idx: usize, insns: Vec<Insn>) {
        self.before.entry(idx).or_default().extend(insns);
    }

    /// Queues insertion of `insns` immediately after the instruction at `idx`.
    pub fn insert_after(&mut self, idx: usize, insns: Vec<Insn>) {
        self.after.entry(idx).or_default().extend(insns);
    }

    /// Returns `true` if no edits are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty() && self.before.is_empty() && self.after.is_empty()
    }

    /// Applies all queued edits to `method` and clears the buffer.
    ///
    /// Positions are processed from the back so earlier indices stay valid
    /// while later ones are spliced.
    pub fn apply(&mut self, method: &mut MethodNode) {
        let mut positions: Vec<usize> = self
            .replacements
            .keys()
            .chain(self.before.keys())
            .chain(self.after.keys())
            .copied()
            .collect();
        positions.sort_unstable();
        positions.dedup();

        for idx in positions.into_iter().rev() {
            if idx >= method.insns.len() {
                continue;
            }
            if let Some(insns) = self.after.remove(&idx) {
                method.insns.splice(idx + 1..idx + 1, insns);
            }
            if let Some(insns) = self.replacements.remove(&idx) {
                method.insns.splice(idx..=idx, insns);
            }
            if let Some(insns) = self.before.remove(&idx) {
                method.insns.splice(idx..idx, insns);
            }
        }
        self.replacements.clear();
        self.before.clear();
        self.after.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::opcodes::*;
    use crate::ir::Access;

    fn simple(op: u8) -> Insn {
        Insn::Simple { op }
    }

    fn method_with(ops: &[u8]) -> MethodNode {
        let mut m = MethodNode::new(Access::STATIC, "m", "()V");
        m.insns = ops.iter().map(|&op| simple(op)).collect();
        m
    }

    #[test]
    fn edits_apply_at_original_positions() {
        let mut m = method_with(&[NOP, ICONST_0, POP, RETURN]);
        let mut modifier = InstructionModifier::new();
        modifier.remove(0);
        modifier.replace(1, vec![simple(ICONST_1), simple(ICONST_2)]);
        modifier.insert_before(3, vec![simple(NOP)]);
        modifier.apply(&mut m);

        assert_eq!(
            m.insns,
            vec![
                simple(ICONST_1),
                simple(ICONST_2),
                simple(POP),
                simple(NOP),
                simple(RETURN),
            ]
        );
    }

    #[test]
    fn mixed_edits_on_one_index() {
        let mut m = method_with(&[ICONST_0, RETURN]);
        let mut modifier = InstructionModifier::new();
        modifier.insert_before(0, vec![simple(NOP)]);
        modifier.replace(0, vec![simple(ICONST_1)]);
        modifier.insert_after(0, vec![simple(POP)]);
        modifier.apply(&mut m);

        assert_eq!(
            m.insns,
            vec![simple(NOP), simple(ICONST_1), simple(POP), simple(RETURN)]
        );
    }

    #[test]
    fn apply_clears_the_buffer() {
        let mut m = method_with(&[RETURN]);
        let mut modifier = InstructionModifier::new();
        modifier.remove(0);
        modifier.apply(&mut m);
        assert!(m.insns.is_empty());
        assert!(modifier.is_empty());

        // A second apply is a no-op.
        modifier.apply(&mut m);
        assert!(m.insns.is_empty());
    }
}

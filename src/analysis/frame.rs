//! Per-instruction abstract state.

use crate::analysis::value::ConstantValue;
use crate::{error::malformed_error, Result};

/// Abstract stack and locals at one instruction position.
///
/// Produced by the tracker; a frame describes the state *before* the
/// instruction at its position executes. Dead instructions have no frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    stack: Vec<ConstantValue>,
    locals: Vec<ConstantValue>,
}

impl Frame {
    #[must_use]
    pub fn new(locals: Vec<ConstantValue>) -> Self {
        Frame {
            stack: Vec::new(),
            locals,
        }
    }

    #[must_use]
    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    /// Stack entry at `index`, where 0 is the bottom. Mirrors the indexing
    /// convention of tree-API frames: callers address the operands of an
    /// instruction as `stack(stack_size() - n + i)`.
    #[must_use]
    pub fn stack(&self, index: usize) -> Option<&ConstantValue> {
        self.stack.get(index)
    }

    /// The value `depth` entries below the top of the stack (0 = top).
    #[must_use]
    pub fn peek(&self, depth: usize) -> Option<&ConstantValue> {
        self.stack.iter().rev().nth(depth)
    }

    #[must_use]
    pub fn local(&self, index: u16) -> Option<&ConstantValue> {
        self.locals.get(usize::from(index))
    }

    pub(crate) fn set_local(&mut self, index: u16, value: ConstantValue) {
        let index = usize::from(index);
        if index >= self.locals.len() {
            self.locals
                .resize(index + 1, ConstantValue::unknown(1));
        }
        self.locals[index] = value;
    }

    pub(crate) fn push(&mut self, value: ConstantValue) {
        self.stack.push(value);
    }

    pub(crate) fn pop(&mut self) -> Result<ConstantValue> {
        self.stack
            .pop()
            .ok_or_else(|| crate::Error::Analysis("pop from empty abstract stack".into()))
    }

    /// Replaces the stack with a single unknown reference - the state at
    /// the entry of an exception handler.
    #[must_use]
    pub(crate) fn with_handler_stack(&self) -> Frame {
        Frame {
            stack: vec![ConstantValue::unknown(1)],
            locals: self.locals.clone(),
        }
    }

    /// Joins `other` into `self`; returns `true` if anything changed.
    ///
    /// Merging frames with different stack heights is a verification
    /// inconsistency and aborts the analysis.
    pub(crate) fn merge(&mut self, other: &Frame) -> Result<bool> {
        if self.stack.len() != other.stack.len() {
            return Err(malformed_error!(
                "stack height mismatch at merge point ({} vs {})",
                self.stack.len(),
                other.stack.len()
            ));
        }
        let mut changed = false;
        for (mine, theirs) in self.stack.iter_mut().zip(&other.stack) {
            let joined = mine.join(theirs);
            if joined != *mine {
                *mine = joined;
                changed = true;
            }
        }

        let max = self.locals.len().max(other.locals.len());
        self.locals.resize(max, ConstantValue::unknown(1));
        for (idx, mine) in self.locals.iter_mut().enumerate() {
            let theirs = other
                .locals
                .get(idx)
                .cloned()
                .unwrap_or_else(|| ConstantValue::unknown(1));
            let joined = mine.join(&theirs);
            if joined != *mine {
                *mine = joined;
                changed = true;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::value::Constant;

    #[test]
    fn merge_joins_slotwise() {
        let mut a = Frame::new(vec![ConstantValue::known(Constant::Int(1))]);
        a.push(ConstantValue::known(Constant::Int(7)));
        let mut b = Frame::new(vec![ConstantValue::known(Constant::Int(1))]);
        b.push(ConstantValue::known(Constant::Int(8)));

        assert!(a.merge(&b).unwrap());
        assert!(!a.peek(0).unwrap().is_known());
        assert!(a.local(0).unwrap().is_known());
        // A second merge with the same input is a fixpoint.
        assert!(!a.merge(&b).unwrap());
    }

    #[test]
    fn merge_rejects_height_mismatch() {
        let mut a = Frame::new(vec![]);
        a.push(ConstantValue::unknown(1));
        let b = Frame::new(vec![]);
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn handler_stack_is_single_unknown() {
        let mut f = Frame::new(vec![ConstantValue::known(Constant::Int(2))]);
        f.push(ConstantValue::known(Constant::Int(3)));
        let h = f.with_handler_stack();
        assert_eq!(h.stack_size(), 1);
        assert!(!h.peek(0).unwrap().is_known());
        assert_eq!(h.local(0), f.local(0));
    }
}

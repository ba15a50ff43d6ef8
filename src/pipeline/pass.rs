//! The pass capability and its metadata.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use strum::Display;

use crate::{universe::Universe, Result};

/// Which family a pass belongs to. Vendor categories exist so a front end
/// can group the obfuscator-specific decryptors away from the generic
/// cleanup set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PassCategory {
    Analysis,
    Cleaning,
    Generic,
    Zkm,
    Allatori,
    Stringer,
    DashO,
    Paramorphism,
}

/// Behavioral hints a front end can surface next to a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PassTag {
    /// Output is expected to shrink.
    Shrink,
    /// Output should remain runnable.
    Runnable,
    /// Primarily improves decompiler output.
    BetterDecompile,
    /// Primarily enables further deobfuscation.
    BetterDeobfuscate,
    /// May damage semantics on unexpected input.
    PossibleDamage,
    /// Executes potentially hostile code in the sandbox.
    PossiblyMalicious,
}

/// Static metadata of a pass.
#[derive(Debug, Clone)]
pub struct PassInfo {
    /// Stable identifier used for pipeline selection.
    pub id: &'static str,
    pub category: PassCategory,
    /// Human-readable display name.
    pub name: &'static str,
    pub description: &'static str,
    pub tags: &'static [PassTag],
}

/// Cooperative cancellation token, checked between passes and between
/// classes within a pass.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Requests cancellation. Takes effect at the next pass or class
    /// boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-run context handed to every pass.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Verbose diagnostics requested by the caller.
    pub verbose: bool,
    pub cancel: CancelToken,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(verbose: bool, cancel: CancelToken) -> Self {
        ExecutionContext { verbose, cancel }
    }

    /// Errors with [`crate::Error::Canceled`] if cancellation was
    /// requested. Passes call this between classes so a canceled run
    /// stops at a consistent boundary.
    pub fn check_canceled(&self) -> Result<()> {
        if self.cancel.is_canceled() {
            Err(crate::Error::Canceled)
        } else {
            Ok(())
        }
    }
}

/// One deobfuscation pass.
///
/// Implementations are constructed once by the registry (every pass has a
/// zero-argument constructor) and `execute` runs at most once per pipeline
/// run. Per-run state must be reset at the start of `execute`.
///
/// The return value reports whether the pass changed the universe; the
/// framework uses it for the run summary and idempotence checks. Errors
/// never abort the pipeline - the runner records them and continues.
pub trait Pass {
    /// Static metadata: identifier, category, description, tags.
    fn info(&self) -> &'static PassInfo;

    /// Runs the pass over the universe. Returns `true` if anything
    /// changed.
    fn execute(&mut self, universe: &mut Universe, ctx: &ExecutionContext) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_sticky_and_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_canceled());
        clone.cancel();
        assert!(token.is_canceled());

        let ctx = ExecutionContext::new(false, token);
        assert!(matches!(
            ctx.check_canceled(),
            Err(crate::Error::Canceled)
        ));
    }

    #[test]
    fn tag_display_names() {
        assert_eq!(PassTag::Shrink.to_string(), "Shrink");
        assert_eq!(PassCategory::Zkm.to_string(), "Zkm");
    }
}

//! The transformation pipeline and pass framework.
//!
//! A pipeline run is a strictly sequential reduction over the universe:
//! the caller selects registered passes by identifier, the runner executes
//! them one by one, and every failure is captured rather than propagated.
//! See [`pass::Pass`] for the per-pass contract and [`registry`] for the
//! builtin set.

pub mod pass;
pub mod registry;
pub mod runner;

pub use pass::{CancelToken, ExecutionContext, Pass, PassCategory, PassInfo, PassTag};
pub use registry::PassRegistry;
pub use runner::{run_pipeline, PassOutcome, PipelineSummary};

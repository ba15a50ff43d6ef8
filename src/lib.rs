//! Static deobfuscation engine for JVM class files.
//!
//! `jvmscope` rewrites obfuscated bytecode so downstream decompilers
//! produce sensible source: it recovers readable control flow, constant
//! strings, direct member references and clean class sets from archives
//! protected by commercial obfuscators (ZKM and friends) or by generic
//! schemes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Deobfuscation Pipeline                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Input: Universe (internal name -> ClassNode)                    │
//! │           │                                                      │
//! │           ▼                                                      │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │            Pass Registry (explicit, statically known)      │  │
//! │  │  vendor decryption -> flow cleanup -> constant folding     │  │
//! │  │  -> inlining -> dead-class removal -> attribute cleanup    │  │
//! │  └───────────────────────────┬────────────────────────────────┘  │
//! │                              │  sequential, cancellable          │
//! │                              ▼                                   │
//! │  ┌────────────────────┐   ┌──────────────────────────────────┐   │
//! │  │ Constant tracker   │   │ Sandbox VM                       │   │
//! │  │ (per-insn frames)  │   │ (restricted loader + interpreter)│   │
//! │  └────────────────────┘   └──────────────────────────────────┘   │
//! │                              │                                   │
//! │                              ▼                                   │
//! │  Output: mutated Universe + PipelineSummary                      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Components
//!
//! - [`universe::Universe`] - the mutable class set under analysis. The
//!   caller supplies it (archive I/O is not this crate's concern) and
//!   receives it back mutated in place.
//! - [`pipeline`] - the pass framework: registry, selection, sequential
//!   runner with per-pass failure capture and cooperative cancellation.
//! - [`sandbox`] - a restricted in-process interpreter that executes
//!   obfuscator initialization code so its outputs can be harvested.
//! - [`analysis`] - the constant-tracking dataflow analyzer.
//! - [`passes`] - the rewriting passes themselves, from the trivial
//!   method inliner up to the ZKM DES decryptor.
//!
//! # Usage
//!
//! ```rust
//! use jvmscope::{
//!     pipeline::{run_pipeline, CancelToken, PassRegistry},
//!     universe::Universe,
//! };
//!
//! let mut universe = Universe::new(); // filled from an archive by the caller
//! let mut registry = PassRegistry::new();
//!
//! let summary = run_pipeline(
//!     &mut registry,
//!     &mut universe,
//!     &["zkm-des-decrypt", "remove-fake-try-catch", "inline-constant-fields"],
//!     false,
//!     &CancelToken::new(),
//! );
//! assert_eq!(summary.failures(), 0);
//! ```
//!
//! # Safety model
//!
//! Passes that need runtime semantics never execute target code on the
//! host: the [`sandbox`] interprets it against a restricted class loader
//! whose unresolvable names become inert stubs and whose runtime
//! allow-list reroutes every process-affecting API to a typed default.
//! A pipeline run always completes; failed classes keep their original
//! bytecode and carry their failure records.

pub mod analysis;
pub mod ir;
pub mod passes;
pub mod pipeline;
pub mod sandbox;
pub mod universe;

mod error;

pub use error::Error;

/// Convenience alias for operations that can fail with this crate's
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

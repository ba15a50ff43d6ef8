//! Constant-tracking dataflow analysis.
//!
//! The analyzer performs abstract interpretation over the operand stack
//! and locals of a method, producing per-instruction [`Frame`]s of
//! [`ConstantValue`]s. Passes consume the frames to harvest statically
//! provable operands - decryption keys, bootstrap arguments, foldable
//! bitwise inputs.

pub mod frame;
pub mod tracker;
pub mod value;

pub use frame::Frame;
pub use tracker::{analyze, ConstantReferenceHandler, NoConstantReferences};
pub use value::{Constant, ConstantValue};

//! In-memory bytecode representation.
//!
//! The IR mirrors a tree-style class model: a [`ClassNode`] owns
//! [`MethodNode`]s whose bodies are flat `Vec<Insn>` sequences with integer
//! [`LabelId`](insn::LabelId) anchors instead of linked nodes. All batch
//! rewriting goes through the [`InstructionModifier`].

pub mod access;
pub mod class;
pub mod descriptor;
pub mod insn;
pub mod method;
pub mod modifier;
pub mod opcodes;

pub use access::Access;
pub use class::{ClassNode, FieldNode};
pub use descriptor::{JvmType, MethodDescriptor};
pub use insn::{Handle, HandleKind, Insn, LabelId, LdcConst};
pub use method::{
    clone_with_fresh_labels, isolate_matching_calls, merge_static_initializers, LocalVariable,
    MethodNode, TryCatchBlock, CLINIT_DESC, CLINIT_NAME,
};
pub use modifier::InstructionModifier;

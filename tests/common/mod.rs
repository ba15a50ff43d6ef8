//! Shared builders for integration tests.
//!
//! The engine's input is an in-memory universe, so tests assemble class
//! nodes programmatically instead of shipping binary fixtures.
#![allow(dead_code)]

use jvmscope::ir::{
    opcodes::*, Access, ClassNode, FieldNode, Insn, LdcConst, MethodNode, CLINIT_DESC, CLINIT_NAME,
};

/// Routes pass logging through the capture-aware test logger (enable with
/// `RUST_LOG=jvmscope=debug`). Only the first call installs it.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A public class extending `java/lang/Object`, class file version 52.
pub fn class(name: &str) -> ClassNode {
    ClassNode::new(name, 52)
}

/// A `public static` method with the given body.
pub fn static_method(name: &str, desc: &str, insns: Vec<Insn>) -> MethodNode {
    let mut m = MethodNode::new(Access::PUBLIC | Access::STATIC, name, desc);
    m.insns = insns;
    m.max_stack = 8;
    m.max_locals = 8;
    m
}

/// A `<clinit>` with the given body.
pub fn clinit(insns: Vec<Insn>) -> MethodNode {
    let mut m = MethodNode::new(Access::STATIC, CLINIT_NAME, CLINIT_DESC);
    m.insns = insns;
    m.max_stack = 8;
    m.max_locals = 8;
    m
}

/// A static field.
pub fn static_field(name: &str, desc: &str) -> FieldNode {
    FieldNode::new(Access::PRIVATE | Access::STATIC, name, desc)
}

/// Instructions that materialize `bytes` as a `byte[]` on the stack.
pub fn push_byte_array(bytes: &[u8]) -> Vec<Insn> {
    let mut insns = vec![
        Insn::push_int(bytes.len() as i32),
        Insn::IntOp {
            op: NEWARRAY,
            operand: array_type::T_BYTE,
        },
    ];
    for (idx, &byte) in bytes.iter().enumerate() {
        insns.push(Insn::Simple { op: DUP });
        insns.push(Insn::push_int(idx as i32));
        insns.push(Insn::push_int(i32::from(byte as i8)));
        insns.push(Insn::Simple { op: BASTORE });
    }
    insns
}

/// Shorthand for a string constant load.
pub fn ldc_str(s: &str) -> Insn {
    Insn::Ldc {
        constant: LdcConst::Str(s.into()),
    }
}

/// Shorthand for a long constant load.
pub fn ldc_long(v: i64) -> Insn {
    Insn::Ldc {
        constant: LdcConst::Long(v),
    }
}

/// Opcode sequence of a method's real instructions.
pub fn opcodes_of(method: &MethodNode) -> Vec<u8> {
    method.insns.iter().filter_map(Insn::opcode).collect()
}

//! Bitwise constant folding.

use log::{debug, info, warn};

use crate::{
    analysis::{analyze, Constant, NoConstantReferences},
    ir::{opcodes as op, Insn, InstructionModifier, LdcConst, MethodNode},
    pipeline::{ExecutionContext, Pass, PassCategory, PassInfo},
    universe::Universe,
    Result,
};

static INFO: PassInfo = PassInfo {
    id: "simplify-bit-operations",
    category: PassCategory::Cleaning,
    name: "Simplify bitwise operations",
    description: "Folds AND/OR/XOR/SHL/SHR/USHR whose operands are statically known into a \
                  single optimally-encoded constant push.",
    tags: &[],
};

/// Folds bitwise operations over known operands.
///
/// The constant tracker proves the two top-of-stack operands. When they
/// come from the two immediately preceding constant pushes, the pushes
/// are elided together with the operation (`BIPUSH 6; BIPUSH 3; IAND`
/// becomes `ICONST_2`). Operands proven known through any other route -
/// locals, earlier folds - keep their producers; the operation is
/// replaced by pops of the operand values followed by the constant push,
/// so the stack shape is preserved either way.
#[derive(Debug, Default)]
pub struct SimplifyBitOperations {
    simplifications: usize,
}

impl SimplifyBitOperations {
    #[must_use]
    pub fn new() -> Self {
        SimplifyBitOperations::default()
    }

    fn simplify_method(&mut self, class_name: &str, method: &mut MethodNode) -> Result<()> {
        let frames = analyze(method, &NoConstantReferences)?;
        let mut modifier = InstructionModifier::new();
        let mut consumed = vec![false; method.insns.len()];

        for (idx, insn) in method.insns.iter().enumerate() {
            let Some(o) = insn.opcode() else { continue };
            if !op::is_bitwise(o) {
                continue;
            }
            let Some(frame) = frames.get(idx).and_then(Option::as_ref) else {
                continue; // dead code
            };
            let (Some(bv), Some(av)) = (frame.peek(0), frame.peek(1)) else {
                continue;
            };
            let (Some(b), Some(a)) = (bv.value(), av.value()) else {
                continue;
            };
            let Some(folded) = fold(o, a, b) else {
                continue;
            };

            // Fast path: the operands are the two literal pushes directly
            // in front of the operation; elide them with it.
            let adjacent = prev_real(method, idx)
                .and_then(|p1| prev_real(method, p1).map(|p2| (p1, p2)));
            if let Some((p1, p2)) = adjacent {
                if !consumed[p1]
                    && !consumed[p2]
                    && push_constant(&method.insns[p1]).as_ref() == Some(b)
                    && push_constant(&method.insns[p2]).as_ref() == Some(a)
                {
                    modifier.remove(p2);
                    modifier.remove(p1);
                    modifier.replace(idx, vec![folded]);
                    consumed[p1] = true;
                    consumed[p2] = true;
                    consumed[idx] = true;
                    self.simplifications += 1;
                    debug!("folded bitwise op at {class_name}.{}[{idx}]", method.name);
                    continue;
                }
            }

            // The values are known but flow in through locals or earlier
            // folds; keep the producers and drop their values instead.
            modifier.replace(idx, vec![pop_of(bv.size()), pop_of(av.size()), folded]);
            consumed[idx] = true;
            self.simplifications += 1;
            debug!(
                "folded non-adjacent bitwise op at {class_name}.{}[{idx}]",
                method.name
            );
        }

        modifier.apply(method);
        Ok(())
    }
}

/// The constant a lone push instruction produces, if it is one.
fn push_constant(insn: &Insn) -> Option<Constant> {
    match insn {
        Insn::Simple { op: o } => match *o {
            op::ICONST_M1..=op::ICONST_5 => {
                Some(Constant::Int(i32::from(*o) - i32::from(op::ICONST_0)))
            }
            op::LCONST_0 | op::LCONST_1 => Some(Constant::Long(i64::from(*o - op::LCONST_0))),
            _ => None,
        },
        Insn::IntOp {
            op: op::BIPUSH | op::SIPUSH,
            operand,
        } => Some(Constant::Int(*operand)),
        Insn::Ldc {
            constant: LdcConst::Int(v),
        } => Some(Constant::Int(*v)),
        Insn::Ldc {
            constant: LdcConst::Long(v),
        } => Some(Constant::Long(*v)),
        _ => None,
    }
}

fn prev_real(method: &MethodNode, idx: usize) -> Option<usize> {
    (0..idx).rev().find(|&i| !method.insns[i].is_pseudo())
}

fn pop_of(slot_size: u8) -> Insn {
    Insn::Simple {
        op: if slot_size == 2 { op::POP2 } else { op::POP },
    }
}

fn fold(o: u8, a: &Constant, b: &Constant) -> Option<Insn> {
    match o {
        op::IAND => Some(Insn::push_int(a.as_int()? & b.as_int()?)),
        op::IOR => Some(Insn::push_int(a.as_int()? | b.as_int()?)),
        op::IXOR => Some(Insn::push_int(a.as_int()? ^ b.as_int()?)),
        op::ISHL => Some(Insn::push_int(a.as_int()?.wrapping_shl(b.as_int()? as u32 & 31))),
        op::ISHR => Some(Insn::push_int(a.as_int()?.wrapping_shr(b.as_int()? as u32 & 31))),
        op::IUSHR => Some(Insn::push_int(
            ((a.as_int()? as u32) >> (b.as_int()? as u32 & 31)) as i32,
        )),
        op::LAND => Some(Insn::push_long(a.as_long()? & b.as_long()?)),
        op::LOR => Some(Insn::push_long(a.as_long()? | b.as_long()?)),
        op::LXOR => Some(Insn::push_long(a.as_long()? ^ b.as_long()?)),
        op::LSHL => Some(Insn::push_long(
            a.as_long()?.wrapping_shl(b.as_int()? as u32 & 63),
        )),
        op::LSHR => Some(Insn::push_long(
            a.as_long()?.wrapping_shr(b.as_int()? as u32 & 63),
        )),
        op::LUSHR => Some(Insn::push_long(
            ((a.as_long()? as u64) >> (b.as_int()? as u32 & 63)) as i64,
        )),
        _ => None,
    }
}

impl Pass for SimplifyBitOperations {
    fn info(&self) -> &'static PassInfo {
        &INFO
    }

    fn execute(&mut self, universe: &mut Universe, ctx: &ExecutionContext) -> Result<bool> {
        self.simplifications = 0;

        for class_name in universe.names() {
            ctx.check_canceled()?;
            let Some(entry) = universe.get_mut(&class_name) else {
                continue;
            };
            let mut failures = Vec::new();
            for method in &mut entry.node.methods {
                if method.access.is_abstract() || method.access.is_native() {
                    continue;
                }
                if let Err(e) = self.simplify_method(&class_name, method) {
                    warn!(
                        "failed to simplify {class_name}.{}: {e}",
                        method.name
                    );
                    failures.push(e.to_string());
                }
            }
            for failure in failures {
                universe.record_failure(&class_name, INFO.id, failure);
            }
        }

        info!("Simplified {} bitwise operations.", self.simplifications);
        Ok(self.simplifications > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Access;

    fn run_on(insns: Vec<Insn>) -> Vec<Insn> {
        let mut method = MethodNode::new(Access::STATIC, "m", "()V");
        method.insns = insns;
        let mut pass = SimplifyBitOperations::new();
        pass.simplify_method("t/T", &mut method).unwrap();
        method.insns
    }

    #[test]
    fn folds_adjacent_int_and() {
        // BIPUSH 6; BIPUSH 3; IAND; POP -> ICONST_2; POP
        let insns = run_on(vec![
            Insn::push_int(6),
            Insn::push_int(3),
            Insn::Simple { op: op::IAND },
            Insn::Simple { op: op::POP },
            Insn::Simple { op: op::RETURN },
        ]);
        assert_eq!(
            insns,
            vec![
                Insn::Simple { op: op::ICONST_2 },
                Insn::Simple { op: op::POP },
                Insn::Simple { op: op::RETURN },
            ]
        );
    }

    #[test]
    fn folds_long_xor_with_ldc() {
        let insns = run_on(vec![
            Insn::Ldc {
                constant: LdcConst::Long(0xFF00),
            },
            Insn::Ldc {
                constant: LdcConst::Long(0x00FF),
            },
            Insn::Simple { op: op::LXOR },
            Insn::Simple { op: op::POP2 },
            Insn::Simple { op: op::RETURN },
        ]);
        assert_eq!(
            insns[0],
            Insn::Ldc {
                constant: LdcConst::Long(0xFFFF)
            }
        );
        assert_eq!(insns.len(), 3);
    }

    #[test]
    fn long_shift_distance_is_an_int() {
        let insns = run_on(vec![
            Insn::Ldc {
                constant: LdcConst::Long(1),
            },
            Insn::push_int(8),
            Insn::Simple { op: op::LSHL },
            Insn::Simple { op: op::POP2 },
            Insn::Simple { op: op::RETURN },
        ]);
        assert_eq!(
            insns[0],
            Insn::Ldc {
                constant: LdcConst::Long(256)
            }
        );
    }

    #[test]
    fn known_operand_through_a_local_is_popped_and_folded() {
        // BIPUSH 6; ISTORE 0; ILOAD 0; BIPUSH 3; IAND - the tracker
        // proves both operands, but only one is a literal push. The
        // producers stay; the operation becomes POP; POP; ICONST_2.
        let insns = run_on(vec![
            Insn::push_int(6),
            Insn::Var { op: op::ISTORE, var: 0 },
            Insn::Var { op: op::ILOAD, var: 0 },
            Insn::push_int(3),
            Insn::Simple { op: op::IAND },
            Insn::Simple { op: op::POP },
            Insn::Simple { op: op::RETURN },
        ]);
        assert_eq!(
            insns,
            vec![
                Insn::push_int(6),
                Insn::Var { op: op::ISTORE, var: 0 },
                Insn::Var { op: op::ILOAD, var: 0 },
                Insn::push_int(3),
                Insn::Simple { op: op::POP },
                Insn::Simple { op: op::POP },
                Insn::Simple { op: op::ICONST_2 },
                Insn::Simple { op: op::POP },
                Insn::Simple { op: op::RETURN },
            ]
        );
    }

    #[test]
    fn known_long_operand_through_a_local_uses_pop2() {
        let insns = run_on(vec![
            Insn::Ldc {
                constant: LdcConst::Long(0xF0),
            },
            Insn::Var { op: op::LSTORE, var: 0 },
            Insn::Var { op: op::LLOAD, var: 0 },
            Insn::Ldc {
                constant: LdcConst::Long(0x0F),
            },
            Insn::Simple { op: op::LOR },
            Insn::Simple { op: op::POP2 },
            Insn::Simple { op: op::RETURN },
        ]);
        // LOR becomes POP2 (literal), POP2 (local load), LDC 0xFF.
        assert_eq!(
            insns[4..7],
            [
                Insn::Simple { op: op::POP2 },
                Insn::Simple { op: op::POP2 },
                Insn::Ldc {
                    constant: LdcConst::Long(0xFF)
                },
            ]
        );
    }

    #[test]
    fn unknown_operands_are_left_alone() {
        // A local load is not a literal push; nothing must change.
        let original = vec![
            Insn::Var { op: op::ILOAD, var: 0 },
            Insn::push_int(3),
            Insn::Simple { op: op::IAND },
            Insn::Simple { op: op::POP },
            Insn::Simple { op: op::RETURN },
        ];
        let mut method = MethodNode::new(Access::STATIC, "m", "(I)V");
        method.max_locals = 1;
        method.insns = original.clone();
        let mut pass = SimplifyBitOperations::new();
        pass.simplify_method("t/T", &mut method).unwrap();
        assert_eq!(method.insns, original);
    }
}

//! Trivial method inlining.

use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    ir::{
        clone_with_fresh_labels, opcodes as op, Insn, InstructionModifier, JvmType,
        MethodDescriptor, MethodNode, CLINIT_NAME,
    },
    pipeline::{ExecutionContext, Pass, PassCategory, PassInfo, PassTag},
    universe::Universe,
    Result,
};

/// Callee size ceiling; anything larger is not "trivial".
const MAX_METHOD_SIZE: usize = 32;

static INFO: PassInfo = PassInfo {
    id: "inline-trivial-methods",
    category: PassCategory::Cleaning,
    name: "Inline trivial methods",
    description: "Inlines methods that only compute and return (or throw) into their call \
                  sites, then removes them. Skips constructors, initializers and anything \
                  touching fields, calls or control flow.",
    tags: &[PassTag::Shrink, PassTag::Runnable],
};

/// Inlines trivial methods into their call sites and deletes them.
///
/// A method qualifies when it is not `<init>`/`<clinit>`, has at most
/// [`MAX_METHOD_SIZE`] real instructions, contains no calls, field
/// accesses, dynamic invokes, type instructions or jumps, and ends with a
/// return or throw. Each call site is replaced by argument spills into
/// fresh locals followed by the callee's body with its returns stripped,
/// so the return value (if any) is left on the caller's stack - the net
/// stack effect of the replacement equals that of the original invoke.
#[derive(Debug, Default)]
pub struct InlineTrivialMethods {
    inlines: usize,
}

impl InlineTrivialMethods {
    #[must_use]
    pub fn new() -> Self {
        InlineTrivialMethods::default()
    }

    fn is_eligible(method: &MethodNode) -> bool {
        if method.name == "<init>" || method.name == CLINIT_NAME {
            return false;
        }
        if method.real_len() == 0 || method.real_len() > MAX_METHOD_SIZE {
            return false;
        }
        for insn in &method.insns {
            match insn {
                Insn::Method { .. }
                | Insn::Field { .. }
                | Insn::InvokeDynamic { .. }
                | Insn::TypeOp { .. }
                | Insn::Jump { .. }
                | Insn::TableSwitch { .. }
                | Insn::LookupSwitch { .. } => return false,
                _ => {}
            }
        }
        matches!(
            method.last_real_opcode(),
            Some(o) if op::is_return(o) || o == op::ATHROW
        )
    }

    /// Builds the replacement sequence for one call site, or `None` when
    /// the descriptor cannot be handled (that single site is skipped).
    fn inline_sequence(caller: &mut MethodNode, callee: &MethodNode) -> Option<Vec<Insn>> {
        let md = MethodDescriptor::parse(&callee.desc).ok()?;
        let is_static = callee.access.is_static();

        // Callee slot layout: receiver (if any) at 0, then parameters.
        let receiver_slots = u16::from(!is_static);
        let mut param_slots: Vec<u16> = Vec::with_capacity(md.params.len());
        let mut next = receiver_slots;
        for param in &md.params {
            param_slots.push(next);
            next += u16::from(param.slot_size());
        }
        let total_param_slots = next;

        let base = caller.max_locals;

        // Arguments sit on the caller's stack in declaration order, so they
        // pop in reverse; each lands in the slot the callee body expects
        // (offset by `base`), the receiver last.
        let mut spills = Vec::with_capacity(md.params.len() + 1);
        for (param, slot) in md.params.iter().zip(&param_slots).rev() {
            spills.push(Insn::Var {
                op: store_opcode(param),
                var: base + slot,
            });
        }
        if !is_static {
            spills.push(Insn::Var {
                op: op::ASTORE,
                var: base,
            });
        }

        let (body, _) = clone_with_fresh_labels(&callee.insns, || caller.alloc_label());
        let mut sequence = spills;
        sequence.extend(body.into_iter().filter_map(|insn| {
            if insn.opcode().is_some_and(op::is_return) {
                return None;
            }
            Some(match insn {
                Insn::Var { op: o, var } => Insn::Var {
                    op: o,
                    var: var + base,
                },
                Insn::Iinc { var, incr } => Insn::Iinc {
                    var: var + base,
                    incr,
                },
                other => other,
            })
        }));

        // No return instruction may survive inlining.
        debug_assert!(sequence
            .iter()
            .all(|i| !i.opcode().is_some_and(op::is_return)));

        caller.max_locals = base + callee.max_locals.max(total_param_slots) + 2;
        caller.max_stack = caller.max_stack.max(callee.max_stack);
        Some(sequence)
    }
}

impl Pass for InlineTrivialMethods {
    fn info(&self) -> &'static PassInfo {
        &INFO
    }

    fn execute(&mut self, universe: &mut Universe, ctx: &ExecutionContext) -> Result<bool> {
        self.inlines = 0;

        let mut eligible: FxHashMap<(String, String, String), MethodNode> = FxHashMap::default();
        for name in universe.names() {
            ctx.check_canceled()?;
            let Some(entry) = universe.get(&name) else {
                continue;
            };
            for method in &entry.node.methods {
                if Self::is_eligible(method) {
                    eligible.insert(
                        (name.clone(), method.name.clone(), method.desc.clone()),
                        method.clone(),
                    );
                }
            }
        }
        info!("{} trivial methods found that could be inlined", eligible.len());
        if eligible.is_empty() {
            return Ok(false);
        }

        // A callee is only deleted once every one of its call sites was
        // rewritten - and only if it had any to begin with.
        let mut inlined_keys: FxHashSet<(String, String, String)> = FxHashSet::default();
        let mut unresolved: FxHashSet<(String, String, String)> = FxHashSet::default();

        for class_name in universe.names() {
            ctx.check_canceled()?;
            let Some(entry) = universe.get_mut(&class_name) else {
                continue;
            };
            for method in &mut entry.node.methods {
                let call_sites: Vec<(usize, (String, String, String))> = method
                    .insns
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, insn)| match insn {
                        Insn::Method {
                            op: o,
                            owner,
                            name,
                            desc,
                            ..
                        } if matches!(
                            *o,
                            op::INVOKESTATIC | op::INVOKEVIRTUAL | op::INVOKESPECIAL
                        ) =>
                        {
                            let key = (owner.clone(), name.clone(), desc.clone());
                            eligible.contains_key(&key).then_some((idx, key))
                        }
                        _ => None,
                    })
                    .collect();
                if call_sites.is_empty() {
                    continue;
                }

                let mut modifier = InstructionModifier::new();
                for (idx, key) in call_sites {
                    let callee = &eligible[&key];
                    match Self::inline_sequence(method, callee) {
                        Some(sequence) => {
                            modifier.replace(idx, sequence);
                            self.inlines += 1;
                            inlined_keys.insert(key);
                        }
                        None => {
                            warn!(
                                "skipping call site of {}.{}{} (unsupported descriptor)",
                                key.0, key.1, key.2
                            );
                            unresolved.insert(key);
                        }
                    }
                }
                modifier.apply(method);
            }
        }

        // Every call site of these callees is rewritten; they can go.
        for key @ (owner, name, desc) in &inlined_keys {
            if unresolved.contains(key) {
                continue;
            }
            if let Some(entry) = universe.get_mut(owner) {
                entry
                    .node
                    .methods
                    .retain(|m| !(m.name == *name && m.desc == *desc));
            }
        }

        info!("Inlined {} method references!", self.inlines);
        Ok(self.inlines > 0)
    }
}

fn store_opcode(ty: &JvmType) -> u8 {
    match ty {
        JvmType::Long => op::LSTORE,
        JvmType::Float => op::FSTORE,
        JvmType::Double => op::DSTORE,
        JvmType::Object(_) | JvmType::Array(_) => op::ASTORE,
        _ => op::ISTORE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Access;

    #[test]
    fn eligibility_rules() {
        let mut trivial = MethodNode::new(Access::STATIC, "k", "()I");
        trivial.insns = vec![Insn::push_int(42), Insn::Simple { op: op::IRETURN }];
        assert!(InlineTrivialMethods::is_eligible(&trivial));

        let mut ctor = trivial.clone();
        ctor.name = "<init>".into();
        assert!(!InlineTrivialMethods::is_eligible(&ctor));

        let mut with_call = trivial.clone();
        with_call.insns.insert(
            0,
            Insn::Method {
                op: op::INVOKESTATIC,
                owner: "x/X".into(),
                name: "f".into(),
                desc: "()V".into(),
                itf: false,
            },
        );
        assert!(!InlineTrivialMethods::is_eligible(&with_call));

        let mut no_return = MethodNode::new(Access::STATIC, "k", "()V");
        no_return.insns = vec![Insn::Simple { op: op::NOP }];
        assert!(!InlineTrivialMethods::is_eligible(&no_return));

        let mut thrower = MethodNode::new(Access::STATIC, "k", "()V");
        thrower.insns = vec![
            Insn::Simple { op: op::ACONST_NULL },
            Insn::Simple { op: op::ATHROW },
        ];
        assert!(InlineTrivialMethods::is_eligible(&thrower));
    }

    #[test]
    fn inline_sequence_spills_args_into_callee_slots() {
        // static int add(int a, long b) { return a + (int) b; } shaped body.
        let mut callee = MethodNode::new(Access::STATIC, "f", "(IJ)I");
        callee.max_locals = 3;
        callee.insns = vec![
            Insn::Var { op: op::ILOAD, var: 0 },
            Insn::Var { op: op::LLOAD, var: 1 },
            Insn::Simple { op: op::L2I },
            Insn::Simple { op: op::IADD },
            Insn::Simple { op: op::IRETURN },
        ];

        let mut caller = MethodNode::new(Access::STATIC, "m", "()I");
        caller.max_locals = 5;
        let sequence = InlineTrivialMethods::inline_sequence(&mut caller, &callee).unwrap();

        // Pops reverse order: long arg (callee slot 1 -> 6), int arg (slot 0 -> 5).
        assert_eq!(sequence[0], Insn::Var { op: op::LSTORE, var: 6 });
        assert_eq!(sequence[1], Insn::Var { op: op::ISTORE, var: 5 });
        // Body loads remapped to the same slots; return stripped.
        assert_eq!(sequence[2], Insn::Var { op: op::ILOAD, var: 5 });
        assert_eq!(sequence[3], Insn::Var { op: op::LLOAD, var: 6 });
        assert!(sequence
            .iter()
            .all(|i| !i.opcode().is_some_and(op::is_return)));
        assert!(caller.max_locals >= 8);
    }
}

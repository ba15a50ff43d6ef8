//! Method bodies: instruction sequences, exception ranges, and the shared
//! static-initializer utilities the passes build on.

use log::debug;
use rustc_hash::FxHashMap;

use crate::ir::{
    insn::{Insn, LabelId},
    opcodes, Access,
};

/// Name of the class-scoped initialization routine.
pub const CLINIT_NAME: &str = "<clinit>";
/// Descriptor of the class-scoped initialization routine.
pub const CLINIT_DESC: &str = "()V";

/// One protected region of a method, delimited by label anchors.
#[derive(Debug, Clone, PartialEq)]
pub struct TryCatchBlock {
    pub start: LabelId,
    pub end: LabelId,
    pub handler: LabelId,
    /// Internal name of the caught type; `None` for a catch-all entry.
    pub catch_type: Option<String>,
}

/// A local-variable table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
    pub start: LabelId,
    pub end: LabelId,
    pub index: u16,
}

/// Mutable representation of a single method.
#[derive(Debug, Clone, Default)]
pub struct MethodNode {
    pub access: Access,
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
    pub insns: Vec<Insn>,
    pub try_catch_blocks: Vec<TryCatchBlock>,
    pub local_variables: Vec<LocalVariable>,
    pub max_stack: u16,
    pub max_locals: u16,
    /// Next free label id; advanced by [`MethodNode::alloc_label`].
    next_label: LabelId,
}

impl MethodNode {
    #[must_use]
    pub fn new(access: Access, name: impl Into<String>, desc: impl Into<String>) -> Self {
        MethodNode {
            access,
            name: name.into(),
            desc: desc.into(),
            ..MethodNode::default()
        }
    }

    /// Allocates a fresh label id unique within this method.
    pub fn alloc_label(&mut self) -> LabelId {
        let id = self.next_label;
        self.next_label += 1;
        id
    }

    /// Registers externally created label ids so future allocations do not
    /// collide. Used after splicing cloned instruction ranges.
    pub fn reserve_labels(&mut self, highest_seen: LabelId) {
        self.next_label = self.next_label.max(highest_seen + 1);
    }

    /// Maps every label id to the index of its anchor instruction.
    #[must_use]
    pub fn label_positions(&self) -> FxHashMap<LabelId, usize> {
        let mut map = FxHashMap::default();
        for (idx, insn) in self.insns.iter().enumerate() {
            if let Insn::Label(id) = insn {
                map.insert(*id, idx);
            }
        }
        map
    }

    /// Index of the first non-pseudo instruction at or after `idx`.
    #[must_use]
    pub fn next_real(&self, idx: usize) -> Option<usize> {
        (idx..self.insns.len()).find(|&i| !self.insns[i].is_pseudo())
    }

    /// The opcode of the last real instruction, skipping trailing
    /// line/frame/label nodes.
    #[must_use]
    pub fn last_real_opcode(&self) -> Option<u8> {
        self.insns.iter().rev().find_map(Insn::opcode)
    }

    /// Number of real (non-pseudo) instructions.
    #[must_use]
    pub fn real_len(&self) -> usize {
        self.insns.iter().filter(|i| !i.is_pseudo()).count()
    }

    /// Returns `true` if this is a `<clinit> ()V` method.
    #[must_use]
    pub fn is_static_initializer(&self) -> bool {
        self.name == CLINIT_NAME && self.desc == CLINIT_DESC
    }
}

/// Clones `insns`, assigning a fresh label (from `alloc`) to every label
/// anchor found, and returns the cloned list together with the remap table.
///
/// Line and frame pseudo-nodes are dropped - cloned code is synthesized
/// code, it has no source position.
pub fn clone_with_fresh_labels(
    insns: &[Insn],
    mut alloc: impl FnMut() -> LabelId,
) -> (Vec<Insn>, FxHashMap<LabelId, LabelId>) {
    let mut remap = FxHashMap::default();
    for insn in insns {
        if let Insn::Label(id) = insn {
            remap.insert(*id, alloc());
        }
    }
    let cloned = insns
        .iter()
        .filter(|i| !matches!(i, Insn::Line { .. } | Insn::Frame))
        .map(|i| i.clone_remapped(&remap))
        .collect();
    (cloned, remap)
}

/// Merges every secondary `<clinit>` of `methods` into the first one.
///
/// Multiple static initializers are a manipulation artifact - the format
/// allows at most one - so the engine folds them before any pass relies on
/// "the" initializer. Each secondary body is cloned through a fresh label
/// remap, its terminal `RETURN` stripped, and the remainder spliced in
/// front of the primary's first return. Try/catch ranges and local
/// variables follow the same remap. Returns `true` if a merge happened.
pub fn merge_static_initializers(class_name: &str, methods: &mut Vec<MethodNode>) -> bool {
    let clinit_indices: Vec<usize> = methods
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_static_initializer())
        .map(|(i, _)| i)
        .collect();
    if clinit_indices.len() <= 1 {
        return false;
    }

    debug!(
        "merging {} static initializers in {class_name}",
        clinit_indices.len()
    );

    let primary_idx = clinit_indices[0];
    let extras: Vec<MethodNode> = clinit_indices[1..]
        .iter()
        .rev()
        .map(|&i| methods.remove(i))
        .collect();

    let primary = &mut methods[primary_idx];
    for extra in extras.iter().rev() {
        let (mut body, remap) =
            clone_with_fresh_labels(&extra.insns, || primary.alloc_label());
        body.retain(|i| i.opcode() != Some(opcodes::RETURN));

        // Splice before the primary's first return, or append if the
        // primary never returns normally.
        let insert_at = primary
            .insns
            .iter()
            .position(|i| i.opcode().is_some_and(opcodes::is_return))
            .unwrap_or(primary.insns.len());
        primary.insns.splice(insert_at..insert_at, body);

        for tcb in &extra.try_catch_blocks {
            primary.try_catch_blocks.push(TryCatchBlock {
                start: remap[&tcb.start],
                end: remap[&tcb.end],
                handler: remap[&tcb.handler],
                catch_type: tcb.catch_type.clone(),
            });
        }
        for lv in &extra.local_variables {
            primary.local_variables.push(LocalVariable {
                start: remap[&lv.start],
                end: remap[&lv.end],
                ..lv.clone()
            });
        }
        primary.max_stack = primary.max_stack.max(extra.max_stack);
        primary.max_locals = primary.max_locals.max(extra.max_locals);
    }
    true
}

/// Removes invocation instructions from `method` whose owner and descriptor
/// both satisfy the given predicates, popping their arguments so the stack
/// stays balanced.
///
/// The ZKM pass uses this to strip tamper checks and unrelated helper calls
/// out of a static initializer before re-executing it in the sandbox. Only
/// calls whose argument/return shape can be compensated with `POP`/`POP2`
/// are removed; anything else is left in place.
pub fn isolate_matching_calls(
    method: &mut MethodNode,
    owner_matches: impl Fn(&str, &str) -> bool,
    desc_matches: impl Fn(&str, &str) -> bool,
) -> usize {
    use crate::ir::descriptor::MethodDescriptor;

    let mut removed = 0;
    let mut idx = 0;
    while idx < method.insns.len() {
        let replace = match &method.insns[idx] {
            Insn::Method {
                op,
                owner,
                name: _,
                desc,
                ..
            } if *op == opcodes::INVOKESTATIC
                && owner_matches(owner, desc)
                && desc_matches(owner, desc) =>
            {
                MethodDescriptor::parse(desc).ok().map(|md| {
                    let mut pops: Vec<Insn> = md
                        .params
                        .iter()
                        .map(|p| Insn::Simple {
                            op: if p.slot_size() == 2 {
                                opcodes::POP2
                            } else {
                                opcodes::POP
                            },
                        })
                        .collect();
                    match md.ret.slot_size() {
                        0 => {}
                        1 => pops.push(Insn::Simple {
                            op: opcodes::ACONST_NULL,
                        }),
                        _ => pops.push(Insn::Simple {
                            op: opcodes::LCONST_0,
                        }),
                    }
                    pops
                })
            }
            _ => None,
        };
        if let Some(replacement) = replace {
            let len = replacement.len();
            method.insns.splice(idx..=idx, replacement);
            idx += len;
            removed += 1;
        } else {
            idx += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::opcodes::*;

    fn clinit_with(body: Vec<Insn>) -> MethodNode {
        let mut m = MethodNode::new(Access::STATIC, CLINIT_NAME, CLINIT_DESC);
        m.insns = body;
        m
    }

    #[test]
    fn merge_folds_secondary_initializers() {
        let mut methods = vec![
            clinit_with(vec![
                Insn::Simple { op: ICONST_1 },
                Insn::Field {
                    op: PUTSTATIC,
                    owner: "A".into(),
                    name: "x".into(),
                    desc: "I".into(),
                },
                Insn::Simple { op: RETURN },
            ]),
            clinit_with(vec![
                Insn::Simple { op: ICONST_2 },
                Insn::Field {
                    op: PUTSTATIC,
                    owner: "A".into(),
                    name: "y".into(),
                    desc: "I".into(),
                },
                Insn::Simple { op: RETURN },
            ]),
        ];

        assert!(merge_static_initializers("A", &mut methods));
        assert_eq!(methods.len(), 1);
        let merged = &methods[0];
        // Secondary body sits before the primary's return, return stripped.
        assert_eq!(merged.insns.iter().filter(|i| i.opcode() == Some(RETURN)).count(), 1);
        assert_eq!(merged.insns.last().unwrap().opcode(), Some(RETURN));
        assert_eq!(merged.real_len(), 5);
    }

    #[test]
    fn merge_is_noop_for_single_initializer() {
        let mut methods = vec![clinit_with(vec![Insn::Simple { op: RETURN }])];
        assert!(!merge_static_initializers("A", &mut methods));
        assert_eq!(methods.len(), 1);
    }

    #[test]
    fn merge_remaps_labels_and_handlers() {
        let mut secondary = clinit_with(vec![
            Insn::Label(0),
            Insn::Simple { op: NOP },
            Insn::Label(1),
            Insn::Simple { op: RETURN },
            Insn::Label(2),
            Insn::Simple { op: ATHROW },
        ]);
        secondary.reserve_labels(2);
        secondary.try_catch_blocks.push(TryCatchBlock {
            start: 0,
            end: 1,
            handler: 2,
            catch_type: None,
        });

        let mut primary = clinit_with(vec![Insn::Label(0), Insn::Simple { op: RETURN }]);
        primary.reserve_labels(0);

        let mut methods = vec![primary, secondary];
        assert!(merge_static_initializers("A", &mut methods));

        let merged = &methods[0];
        assert_eq!(merged.try_catch_blocks.len(), 1);
        let tcb = &merged.try_catch_blocks[0];
        // Remapped handler labels must resolve inside the merged body and
        // must not collide with the primary's original label 0.
        let positions = merged.label_positions();
        assert!(tcb.start != 0 && tcb.end != 0 && tcb.handler != 0);
        assert!(positions.contains_key(&tcb.start));
        assert!(positions.contains_key(&tcb.handler));
    }

    #[test]
    fn isolation_pops_arguments_and_fakes_results() {
        let mut m = MethodNode::new(Access::STATIC, CLINIT_NAME, CLINIT_DESC);
        m.insns = vec![
            Insn::Simple { op: ICONST_0 },
            Insn::Method {
                op: INVOKESTATIC,
                owner: "evil/Check".into(),
                name: "t".into(),
                desc: "(I)Ljava/lang/Object;".into(),
                itf: false,
            },
            Insn::Simple { op: POP },
            Insn::Simple { op: RETURN },
        ];

        let removed = isolate_matching_calls(&mut m, |o, _| o != "self/Name", |_, _| true);
        assert_eq!(removed, 1);
        // Call replaced by POP (argument) + ACONST_NULL (faked result).
        assert_eq!(
            m.insns,
            vec![
                Insn::Simple { op: ICONST_0 },
                Insn::Simple { op: POP },
                Insn::Simple { op: ACONST_NULL },
                Insn::Simple { op: POP },
                Insn::Simple { op: RETURN },
            ]
        );
    }
}

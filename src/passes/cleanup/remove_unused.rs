//! Dead-class elimination.

use log::{debug, info, warn};
use rustc_hash::FxHashSet;

use crate::{
    ir::{Access, ClassNode, Insn, LdcConst},
    pipeline::{ExecutionContext, Pass, PassCategory, PassInfo, PassTag},
    universe::Universe,
    Result,
};

static INFO: PassInfo = PassInfo {
    id: "remove-unused-classes",
    category: PassCategory::Cleaning,
    name: "Remove unused classes",
    description: "Removes classes unreachable from any main-method root, following member \
                  references, type operands, constants, bootstrap data and super types.",
    tags: &[
        PassTag::Shrink,
        PassTag::Runnable,
        PassTag::BetterDecompile,
        PassTag::BetterDeobfuscate,
    ],
};

/// Removes classes unreachable from the root set.
///
/// Roots are classes declaring `public static main([Ljava/lang/String;)V`.
/// Reachability follows every class an instruction can name: method and
/// field owners, type operands, `LDC` class and handle constants,
/// invokedynamic bootstrap owners and static arguments, `multianewarray`
/// element types, plus super and interface names of reachable classes.
/// A universe without any root is left untouched - removing everything
/// from a library input would be nonsense.
#[derive(Debug, Default)]
pub struct RemoveUnusedClasses;

impl RemoveUnusedClasses {
    #[must_use]
    pub fn new() -> Self {
        RemoveUnusedClasses
    }

    fn is_main(node: &ClassNode) -> bool {
        node.methods.iter().any(|m| {
            m.name == "main"
                && m.desc == "([Ljava/lang/String;)V"
                && m.access.contains(Access::PUBLIC | Access::STATIC)
        })
    }

    /// All class names an instruction of `node` can refer to, plus its
    /// super types.
    fn referenced_classes(node: &ClassNode, out: &mut FxHashSet<String>) {
        let mut add = |name_or_desc: &str| {
            if let Some(class) = element_class(name_or_desc) {
                out.insert(class);
            }
        };
        if let Some(parent) = &node.super_name {
            add(parent);
        }
        for itf in &node.interfaces {
            add(itf);
        }
        for method in &node.methods {
            for insn in &method.insns {
                match insn {
                    Insn::Field { owner, .. } | Insn::Method { owner, .. } => add(owner),
                    Insn::TypeOp { class, .. } => add(class),
                    Insn::MultiANewArray { desc, .. } => add(desc),
                    Insn::Ldc { constant } => add_constant(constant, &mut add),
                    Insn::InvokeDynamic { bsm, args, .. } => {
                        add(&bsm.owner);
                        for arg in args {
                            add_constant(arg, &mut add);
                        }
                    }
                    _ => {}
                }
            }
            for tcb in &method.try_catch_blocks {
                if let Some(t) = &tcb.catch_type {
                    add(t);
                }
            }
        }
    }
}

fn add_constant(constant: &LdcConst, add: &mut impl FnMut(&str)) {
    match constant {
        LdcConst::Class(name) => add(name),
        LdcConst::Handle(handle) => add(&handle.owner),
        _ => {}
    }
}

/// Strips array dimensions and the `L...;` wrapper, yielding the class a
/// name or descriptor ultimately refers to (`None` for primitives).
fn element_class(name_or_desc: &str) -> Option<String> {
    let is_array_desc = name_or_desc.starts_with('[');
    let stripped = name_or_desc.trim_start_matches('[');
    if let Some(object) = stripped.strip_prefix('L').and_then(|s| s.strip_suffix(';')) {
        return Some(object.to_string());
    }
    if is_array_desc {
        // Primitive array descriptor.
        return None;
    }
    Some(stripped.to_string())
}

impl Pass for RemoveUnusedClasses {
    fn info(&self) -> &'static PassInfo {
        &INFO
    }

    fn execute(&mut self, universe: &mut Universe, ctx: &ExecutionContext) -> Result<bool> {
        let roots: Vec<String> = universe
            .iter()
            .filter(|(_, entry)| Self::is_main(&entry.node))
            .map(|(name, _)| name.clone())
            .collect();
        if roots.is_empty() {
            warn!("no root classes (public static main) found; refusing to remove anything");
            return Ok(false);
        }
        debug!("total root classes identified: {}", roots.len());

        let mut reachable: FxHashSet<String> = FxHashSet::default();
        let mut worklist = roots;
        while let Some(name) = worklist.pop() {
            ctx.check_canceled()?;
            if !reachable.insert(name.clone()) {
                continue;
            }
            let Some(entry) = universe.get(&name) else {
                continue;
            };
            let mut referenced = FxHashSet::default();
            Self::referenced_classes(&entry.node, &mut referenced);
            for target in referenced {
                if !reachable.contains(&target) && universe.contains(&target) {
                    worklist.push(target);
                }
            }
        }

        let unused: Vec<String> = universe
            .names()
            .into_iter()
            .filter(|name| !reachable.contains(name))
            .collect();
        for name in &unused {
            universe.remove(name);
            debug!("removed unused class: {}", name.replace('/', "."));
        }
        info!("Removed {} unused classes.", unused.len());
        Ok(!unused.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::opcodes::*;
    use crate::ir::MethodNode;

    fn main_class(name: &str, calls: &[&str]) -> ClassNode {
        let mut cn = ClassNode::new(name, 52);
        let mut main = MethodNode::new(
            Access::PUBLIC | Access::STATIC,
            "main",
            "([Ljava/lang/String;)V",
        );
        for callee in calls {
            main.insns.push(Insn::Method {
                op: INVOKESTATIC,
                owner: (*callee).into(),
                name: "u".into(),
                desc: "()V".into(),
                itf: false,
            });
        }
        main.insns.push(Insn::Simple { op: RETURN });
        cn.methods.push(main);
        cn
    }

    #[test]
    fn element_class_normalization() {
        assert_eq!(element_class("a/B"), Some("a/B".into()));
        assert_eq!(element_class("[La/B;"), Some("a/B".into()));
        assert_eq!(element_class("[[I"), None);
        assert_eq!(element_class("La/B;"), Some("a/B".into()));
        // Single-letter class names are real classes, not primitives.
        assert_eq!(element_class("A"), Some("A".into()));
    }

    #[test]
    fn without_roots_nothing_is_removed() {
        let mut universe: Universe = [ClassNode::new("a/A", 52), ClassNode::new("b/B", 52)]
            .into_iter()
            .collect();
        let changed = RemoveUnusedClasses::new()
            .execute(&mut universe, &ExecutionContext::default())
            .unwrap();
        assert!(!changed);
        assert_eq!(universe.len(), 2);
    }

    #[test]
    fn junk_is_removed_reachable_kept() {
        let mut used = ClassNode::new("Used", 52);
        used.methods.push(MethodNode::new(
            Access::PUBLIC | Access::STATIC,
            "u",
            "()V",
        ));
        let mut universe: Universe = [
            main_class("Main", &["Used"]),
            used,
            ClassNode::new("Junk", 52),
        ]
        .into_iter()
        .collect();

        let changed = RemoveUnusedClasses::new()
            .execute(&mut universe, &ExecutionContext::default())
            .unwrap();
        assert!(changed);
        assert!(universe.contains("Main"));
        assert!(universe.contains("Used"));
        assert!(!universe.contains("Junk"));
    }

    #[test]
    fn reachability_is_transitive() {
        let mut used = ClassNode::new("Used", 52);
        let mut u = MethodNode::new(Access::PUBLIC | Access::STATIC, "u", "()V");
        u.insns.push(Insn::Method {
            op: INVOKESTATIC,
            owner: "Deep".into(),
            name: "d".into(),
            desc: "()V".into(),
            itf: false,
        });
        used.methods.push(u);

        let mut universe: Universe = [
            main_class("Main", &["Used"]),
            used,
            ClassNode::new("Deep", 52),
            ClassNode::new("Junk", 52),
        ]
        .into_iter()
        .collect();

        RemoveUnusedClasses::new()
            .execute(&mut universe, &ExecutionContext::default())
            .unwrap();
        assert!(universe.contains("Deep"));
        assert!(!universe.contains("Junk"));
    }
}

//! Fake try/catch removal (ZKM flow obfuscation).

use log::info;

use crate::{
    ir::{opcodes as op, Insn, MethodNode},
    pipeline::{ExecutionContext, Pass, PassCategory, PassInfo, PassTag},
    universe::Universe,
    Result,
};

static INFO: PassInfo = PassInfo {
    id: "remove-fake-try-catch",
    category: PassCategory::Zkm,
    name: "Fake try/catch removal",
    description: "Removes exception handlers that immediately rethrow (directly or through \
                  a static helper) - a decompiler-confusion idiom with no runtime effect.",
    tags: &[PassTag::PossibleDamage, PassTag::BetterDecompile],
};

/// Removes handlers whose body starts with `ATHROW`, or `INVOKESTATIC`
/// immediately followed by `ATHROW`. The protected region never throws
/// the handler's type in practice, so dropping the entry changes nothing
/// at runtime and unknots the decompiler's output.
#[derive(Debug, Default)]
pub struct RemoveFakeTryCatch {
    removed: usize,
}

impl RemoveFakeTryCatch {
    #[must_use]
    pub fn new() -> Self {
        RemoveFakeTryCatch::default()
    }

    fn is_fake_handler(method: &MethodNode, handler_label: u32) -> bool {
        let positions = method.label_positions();
        let Some(&label_idx) = positions.get(&handler_label) else {
            return false;
        };
        let Some(first) = method.next_real(label_idx + 1) else {
            return false;
        };
        match method.insns[first].opcode() {
            Some(op::ATHROW) => true,
            Some(op::INVOKESTATIC) => method
                .next_real(first + 1)
                .and_then(|i| method.insns[i].opcode())
                == Some(op::ATHROW),
            _ => false,
        }
    }
}

impl Pass for RemoveFakeTryCatch {
    fn info(&self) -> &'static PassInfo {
        &INFO
    }

    fn execute(&mut self, universe: &mut Universe, ctx: &ExecutionContext) -> Result<bool> {
        self.removed = 0;

        for name in universe.names() {
            ctx.check_canceled()?;
            let Some(entry) = universe.get_mut(&name) else {
                continue;
            };
            for method in &mut entry.node.methods {
                if method.access.is_abstract() || method.access.is_native() {
                    continue;
                }
                let before = method.try_catch_blocks.len();
                if before == 0 {
                    continue;
                }
                let fake: Vec<bool> = method
                    .try_catch_blocks
                    .iter()
                    .map(|tcb| Self::is_fake_handler(method, tcb.handler))
                    .collect();
                let mut keep = fake.iter().map(|f| !f);
                method.try_catch_blocks.retain(|_| keep.next().unwrap_or(true));
                self.removed += before - method.try_catch_blocks.len();
            }
        }

        info!("[ZKM] Removed {} fake try-catch blocks.", self.removed);
        Ok(self.removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{opcodes::*, Access, ClassNode, TryCatchBlock};

    fn method_with_handler(handler_body: Vec<Insn>) -> MethodNode {
        let mut m = MethodNode::new(Access::PUBLIC, "m", "()V");
        m.insns = vec![
            Insn::Label(0),
            Insn::Simple { op: NOP },
            Insn::Label(1),
            Insn::Simple { op: RETURN },
            Insn::Label(2),
        ];
        m.insns.extend(handler_body);
        m.try_catch_blocks.push(TryCatchBlock {
            start: 0,
            end: 1,
            handler: 2,
            catch_type: Some("java/lang/Exception".into()),
        });
        m
    }

    fn run(m: MethodNode) -> (bool, usize) {
        let mut cn = ClassNode::new("z/Z", 52);
        cn.methods.push(m);
        let mut universe: Universe = [cn].into_iter().collect();
        let mut pass = RemoveFakeTryCatch::new();
        let changed = pass
            .execute(&mut universe, &ExecutionContext::default())
            .unwrap();
        let remaining = universe.get("z/Z").unwrap().node.methods[0]
            .try_catch_blocks
            .len();
        (changed, remaining)
    }

    #[test]
    fn handler_starting_with_athrow_is_removed() {
        let (changed, remaining) = run(method_with_handler(vec![Insn::Simple { op: ATHROW }]));
        assert!(changed);
        assert_eq!(remaining, 0);
    }

    #[test]
    fn invokestatic_then_athrow_is_removed() {
        let (changed, remaining) = run(method_with_handler(vec![
            Insn::Method {
                op: INVOKESTATIC,
                owner: "z/Z".into(),
                name: "wrap".into(),
                desc: "(Ljava/lang/Throwable;)Ljava/lang/Throwable;".into(),
                itf: false,
            },
            Insn::Simple { op: ATHROW },
        ]));
        assert!(changed);
        assert_eq!(remaining, 0);
    }

    #[test]
    fn real_handlers_survive() {
        let (changed, remaining) = run(method_with_handler(vec![
            Insn::Simple { op: POP },
            Insn::Simple { op: RETURN },
        ]));
        assert!(!changed);
        assert_eq!(remaining, 1);
    }

    #[test]
    fn line_nodes_before_handler_body_are_skipped() {
        let (changed, remaining) = run(method_with_handler(vec![
            Insn::Line { line: 99 },
            Insn::Simple { op: ATHROW },
        ]));
        assert!(changed);
        assert_eq!(remaining, 0);
    }
}

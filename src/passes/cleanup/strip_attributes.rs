//! Debug-attribute cleanup.

use log::info;

use crate::{
    ir::Insn,
    pipeline::{ExecutionContext, Pass, PassCategory, PassInfo, PassTag},
    universe::Universe,
    Result,
};

static INFO: PassInfo = PassInfo {
    id: "strip-attributes",
    category: PassCategory::Cleaning,
    name: "Strip debug attributes",
    description: "Drops source-file names, line numbers, local-variable tables and generic \
                  signatures - metadata obfuscators scramble to confuse decompilers.",
    tags: &[PassTag::Shrink, PassTag::BetterDecompile],
};

/// Strips scrambled debug metadata across the universe.
#[derive(Debug, Default)]
pub struct StripAttributes {
    removed: usize,
}

impl StripAttributes {
    #[must_use]
    pub fn new() -> Self {
        StripAttributes::default()
    }
}

impl Pass for StripAttributes {
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
            let node = &mut entry.node;

            if node.source_file.take().is_some() {
                self.removed += 1;
            }
            if node.signature.take().is_some() {
                self.removed += 1;
            }
            for field in &mut node.fields {
                if field.signature.take().is_some() {
                    self.removed += 1;
                }
            }
            for method in &mut node.methods {
                if method.signature.take().is_some() {
                    self.removed += 1;
                }
                self.removed += method.local_variables.len();
                method.local_variables.clear();

                let before = method.insns.len();
                method.insns.retain(|i| !matches!(i, Insn::Line { .. }));
                self.removed += before - method.insns.len();
            }
        }

        info!("Stripped {} debug attributes.", self.removed);
        Ok(self.removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{opcodes::*, Access, ClassNode, LocalVariable, MethodNode};

    #[test]
    fn strips_everything_and_reports_counts() {
        let mut cn = ClassNode::new("a/A", 52);
        cn.source_file = Some("A.java".into());
        cn.signature = Some("<T:Ljava/lang/Object;>Ljava/lang/Object;".into());
        let mut m = MethodNode::new(Access::PUBLIC, "m", "()V");
        m.insns = vec![
            Insn::Label(0),
            Insn::Line { line: 12 },
            Insn::Simple { op: RETURN },
        ];
        m.local_variables.push(LocalVariable {
            name: "this".into(),
            desc: "La/A;".into(),
            signature: None,
            start: 0,
            end: 0,
            index: 0,
        });
        cn.methods.push(m);

        let mut universe: Universe = [cn].into_iter().collect();
        let mut pass = StripAttributes::new();
        let changed = pass
            .execute(&mut universe, &ExecutionContext::default())
            .unwrap();
        assert!(changed);
        assert_eq!(pass.removed, 4);

        let node = &universe.get("a/A").unwrap().node;
        assert!(node.source_file.is_none());
        let m = &node.methods[0];
        assert!(m.local_variables.is_empty());
        assert!(!m.insns.iter().any(|i| matches!(i, Insn::Line { .. })));
        // Labels and code survive.
        assert_eq!(m.insns.len(), 2);

        // Second run is a no-op.
        assert!(!pass
            .execute(&mut universe, &ExecutionContext::default())
            .unwrap());
    }
}

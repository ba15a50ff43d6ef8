//! Constant-field inlining through sandbox execution.

use std::rc::Rc;

use log::{debug, info, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    ir::{merge_static_initializers, ClassNode, Insn, JvmType, LdcConst, opcodes as op},
    pipeline::{ExecutionContext, Pass, PassCategory, PassInfo, PassTag},
    sandbox::{Obj, Value, Vm, VmReferenceHandler},
    universe::Universe,
    Result,
};

static INFO: PassInfo = PassInfo {
    id: "inline-constant-fields",
    category: PassCategory::Cleaning,
    name: "Inline constant static fields",
    description: "Merges duplicated static initializers, runs them in the sandbox, and \
                  replaces reads of fields that are never written elsewhere with the \
                  observed constant values.",
    tags: &[
        PassTag::Runnable,
        PassTag::BetterDecompile,
        PassTag::BetterDeobfuscate,
    ],
};

/// Resolves sandbox class loads from a point-in-time snapshot of the
/// universe.
pub(crate) struct SnapshotHandler {
    classes: Rc<FxHashMap<String, ClassNode>>,
}

impl SnapshotHandler {
    pub(crate) fn of(universe: &Universe) -> Self {
        let classes = universe
            .iter()
            .map(|(name, entry)| (name.clone(), entry.node.clone()))
            .collect();
        SnapshotHandler {
            classes: Rc::new(classes),
        }
    }

    pub(crate) fn share(&self) -> Self {
        SnapshotHandler {
            classes: Rc::clone(&self.classes),
        }
    }
}

impl VmReferenceHandler for SnapshotHandler {
    fn try_class_load(&self, name: &str) -> Option<ClassNode> {
        self.classes.get(name).cloned()
    }
}

/// Inlines static fields whose value is fixed at class initialization.
///
/// For every class (enums excluded) the pass merges multiple static
/// initializers into one, executes the initializer in a fresh sandbox VM,
/// and records the resulting value of each static field that no
/// instruction outside that initializer ever writes. Every `GETSTATIC` of
/// a recorded field across the universe is then replaced by a constant
/// push of matching type. The fields themselves are kept.
#[derive(Debug, Default)]
pub struct InlineConstantFields {
    inlined: usize,
}

impl InlineConstantFields {
    #[must_use]
    pub fn new() -> Self {
        InlineConstantFields::default()
    }
}

impl Pass for InlineConstantFields {
    fn info(&self) -> &'static PassInfo {
        &INFO
    }

    #[allow(clippy::too_many_lines)]
    fn execute(&mut self, universe: &mut Universe, ctx: &ExecutionContext) -> Result<bool> {
        self.inlined = 0;
        let names = universe.names();

        // Duplicated <clinit> methods are a manipulation artifact; fold
        // them before anything observes "the" initializer. A merge is a
        // universe change in its own right.
        let mut merged = 0usize;
        for name in &names {
            if let Some(entry) = universe.get_mut(name) {
                if merge_static_initializers(name, &mut entry.node.methods) {
                    merged += 1;
                }
            }
        }

        // Every field written by any instruction outside its owner's
        // static initializer is disqualified.
        let mut written_outside: FxHashSet<(String, String, String)> = FxHashSet::default();
        for name in &names {
            let Some(entry) = universe.get(name) else {
                continue;
            };
            for method in &entry.node.methods {
                let in_own_clinit = method.is_static_initializer();
                for insn in &method.insns {
                    if let Insn::Field {
                        op: op::PUTSTATIC | op::PUTFIELD,
                        owner,
                        name: field,
                        desc,
                    } = insn
                    {
                        if !(in_own_clinit && owner == name) {
                            written_outside.insert((owner.clone(), field.clone(), desc.clone()));
                        }
                    }
                }
            }
        }

        let mut vm = Vm::new(Box::new(SnapshotHandler::of(universe)));

        let mut constants: FxHashMap<(String, String, String), Insn> = FxHashMap::default();
        for name in &names {
            ctx.check_canceled()?;
            let Some(entry) = universe.get(name) else {
                continue;
            };
            let node = &entry.node;
            if node.access.is_enum() {
                continue;
            }
            if node.static_initializer().is_some() {
                if let Err(e) = vm.initialize_class(name) {
                    warn!("initializer of {name} failed in sandbox: {e}");
                    universe.record_failure(name, INFO.id, e.to_string());
                    continue;
                }
            }

            let Some(entry) = universe.get(name) else {
                continue;
            };
            for field in &entry.node.fields {
                if !field.access.is_static() {
                    continue;
                }
                let key = (name.clone(), field.name.clone(), field.desc.clone());
                if written_outside.contains(&key) {
                    continue;
                }
                let value = vm.static_field_value(name, &field.name, &field.desc);
                if let Some(push) = constant_push(&field.desc, value.as_ref()) {
                    debug!("constant field {}.{} {}", name, field.name, field.desc);
                    constants.insert(key, push);
                }
            }
        }

        if constants.is_empty() {
            info!("Inlined 0 field references!");
            return Ok(merged > 0);
        }

        for name in &names {
            ctx.check_canceled()?;
            let Some(entry) = universe.get_mut(name) else {
                continue;
            };
            for method in &mut entry.node.methods {
                for insn in &mut method.insns {
                    if let Insn::Field {
                        op: op::GETSTATIC,
                        owner,
                        name: field,
                        desc,
                    } = insn
                    {
                        let key = (owner.clone(), field.clone(), desc.clone());
                        if let Some(push) = constants.get(&key) {
                            *insn = push.clone();
                            self.inlined += 1;
                        }
                    }
                }
            }
        }

        info!("Inlined {} field references!", self.inlined);
        Ok(self.inlined > 0 || merged > 0)
    }
}

/// A constant push matching the field's declared type, or `None` when the
/// observed value cannot be expressed as a bytecode constant.
fn constant_push(desc: &str, value: Option<&Value>) -> Option<Insn> {
    let ty = JvmType::parse(desc).ok()?;
    // Fields the initializer never assigned hold their type's default.
    let default = Value::default_of(&ty);
    let value = value.unwrap_or(&default);
    match (&ty, value) {
        (
            JvmType::Boolean | JvmType::Byte | JvmType::Char | JvmType::Short | JvmType::Int,
            Value::Int(v),
        ) => Some(Insn::push_int(*v)),
        (JvmType::Long, Value::Long(v)) => Some(Insn::push_long(*v)),
        (JvmType::Float, Value::Float(v)) => Some(Insn::Ldc {
            constant: LdcConst::Float(*v),
        }),
        (JvmType::Double, Value::Double(v)) => Some(Insn::Ldc {
            constant: LdcConst::Double(*v),
        }),
        (JvmType::Object(_) | JvmType::Array(_), Value::Null) => Some(Insn::Simple {
            op: op::ACONST_NULL,
        }),
        (JvmType::Object(class), Value::Ref(r)) if class == "java/lang/String" => {
            match &*r.borrow() {
                Obj::Str(s) => Some(Insn::Ldc {
                    constant: LdcConst::Str(s.clone()),
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_shapes_by_type() {
        assert_eq!(
            constant_push("I", Some(&Value::Int(3))),
            Some(Insn::Simple { op: op::ICONST_3 })
        );
        assert_eq!(
            constant_push("J", Some(&Value::Long(0))),
            Some(Insn::Simple { op: op::LCONST_0 })
        );
        assert_eq!(
            constant_push("Ljava/lang/String;", Some(&Value::string("abc"))),
            Some(Insn::Ldc {
                constant: LdcConst::Str("abc".into())
            })
        );
        // Unassigned fields inline their type default.
        assert_eq!(
            constant_push("I", None),
            Some(Insn::Simple { op: op::ICONST_0 })
        );
        // Arbitrary object values cannot be expressed as constants.
        assert_eq!(
            constant_push(
                "Ljava/lang/Object;",
                Some(&Value::object(Obj::Class("x".into())))
            ),
            None
        );
    }
}

//! Proxy-class synthesis.
//!
//! To harvest the effects of a static initializer without running the rest
//! of the class, the ZKM pass executes a *proxy*: a copy of the target
//! containing only its static fields, its static methods, and the (already
//! isolated) initializer renamed so loading the proxy does not trigger it.
//! Every self-reference inside the proxy is remapped to the proxy's own
//! name so the copy is self-contained in the sandbox.

use crate::ir::{Access, ClassNode, Insn, LdcConst, MethodNode};

/// Name the proxy's initializer runs under. Renaming it away from
/// `<clinit>` means the loader can materialize the proxy without running
/// it; the pass invokes it explicitly when it is ready to observe.
pub const PROXY_CLINIT_NAME: &str = "clinitProxy";

/// The internal name a proxy of `original` is synthesized under.
#[must_use]
pub fn proxy_name(original: &str) -> String {
    format!("{original}$Proxy")
}

/// Builds the proxy for `original`, carrying `clinit` as its initializer.
///
/// `clinit` is the (cloned, isolated) static initializer of the original;
/// it is renamed to [`PROXY_CLINIT_NAME`] here. All self-references in the
/// copied methods and field descriptors are rewritten to the proxy's name.
#[must_use]
pub fn create_class_proxy(original: &ClassNode, mut clinit: MethodNode) -> ClassNode {
    let name = proxy_name(&original.name);

    let mut proxy = ClassNode {
        version: original.version,
        access: original.access,
        name: name.clone(),
        super_name: original.super_name.clone(),
        interfaces: original.interfaces.clone(),
        signature: original.signature.clone(),
        source_file: None,
        fields: original
            .fields
            .iter()
            .filter(|f| f.access.is_static())
            .cloned()
            .collect(),
        methods: Vec::new(),
    };

    for method in &original.methods {
        if method.access.contains(Access::STATIC) && !method.is_static_initializer() {
            proxy.methods.push(method.clone());
        }
    }

    clinit.name = PROXY_CLINIT_NAME.to_string();
    clinit.desc = "()V".to_string();
    proxy.methods.push(clinit);

    remap_self_references(&mut proxy, &original.name);
    proxy
}

/// Rewrites every reference to `from` inside `class` to the class's own
/// name: member owners, type operands, constants, handle owners, and
/// field/method descriptors that mention the type.
fn remap_self_references(class: &mut ClassNode, from: &str) {
    let to = class.name.clone();
    let from_desc = format!("L{from};");
    let to_desc = format!("L{to};");
    let remap_desc = |desc: &mut String| {
        if desc.contains(&from_desc) {
            *desc = desc.replace(&from_desc, &to_desc);
        }
    };
    let remap_name = |name: &mut String| {
        if name == from {
            *name = to.clone();
        }
    };

    for field in &mut class.fields {
        remap_desc(&mut field.desc);
    }

    for method in &mut class.methods {
        remap_desc(&mut method.desc);
        for insn in &mut method.insns {
            match insn {
                Insn::Field {
                    owner, desc: d, ..
                } => {
                    remap_name(owner);
                    remap_desc(d);
                }
                Insn::Method {
                    owner, desc: d, ..
                } => {
                    remap_name(owner);
                    remap_desc(d);
                }
                Insn::TypeOp { class: c, .. } => remap_name(c),
                Insn::MultiANewArray { desc: d, .. } => remap_desc(d),
                Insn::InvokeDynamic {
                    desc: d, bsm, args, ..
                } => {
                    remap_desc(d);
                    remap_name(&mut bsm.owner);
                    remap_desc(&mut bsm.desc);
                    for arg in args {
                        remap_ldc(arg, from, &to, &from_desc, &to_desc);
                    }
                }
                Insn::Ldc { constant } => remap_ldc(constant, from, &to, &from_desc, &to_desc),
                _ => {}
            }
        }
    }
}

fn remap_ldc(constant: &mut LdcConst, from: &str, to: &str, from_desc: &str, to_desc: &str) {
    match constant {
        LdcConst::Class(name) if name == from => *name = to.to_string(),
        LdcConst::MethodType(desc) => {
            if desc.contains(from_desc) {
                *desc = desc.replace(from_desc, to_desc);
            }
        }
        LdcConst::Handle(handle) => {
            if handle.owner == from {
                handle.owner = to.to_string();
            }
            if handle.desc.contains(from_desc) {
                handle.desc = handle.desc.replace(from_desc, to_desc);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{opcodes::*, FieldNode, CLINIT_DESC, CLINIT_NAME};

    #[test]
    fn proxy_keeps_static_members_only() {
        let mut cn = ClassNode::new("a/Target", 52);
        cn.fields.push(FieldNode::new(Access::STATIC, "K", "J"));
        cn.fields.push(FieldNode::new(Access::PUBLIC, "inst", "I"));
        cn.methods.push(MethodNode::new(
            Access::PUBLIC | Access::STATIC,
            "helper",
            "()V",
        ));
        cn.methods
            .push(MethodNode::new(Access::PUBLIC, "virtualM", "()V"));
        cn.methods
            .push(MethodNode::new(Access::STATIC, CLINIT_NAME, CLINIT_DESC));

        let clinit = cn.static_initializer().unwrap().clone();
        let proxy = create_class_proxy(&cn, clinit);

        assert_eq!(proxy.name, "a/Target$Proxy");
        assert_eq!(proxy.fields.len(), 1);
        assert!(proxy.field("K").is_some());
        assert!(proxy.method("helper", "()V").is_some());
        assert!(proxy.method("virtualM", "()V").is_none());
        // The initializer is renamed, so loading the proxy runs nothing.
        assert!(proxy.static_initializer().is_none());
        assert!(proxy.method(PROXY_CLINIT_NAME, "()V").is_some());
    }

    #[test]
    fn proxy_remaps_self_references() {
        let mut cn = ClassNode::new("a/Target", 52);
        let mut clinit = MethodNode::new(Access::STATIC, CLINIT_NAME, CLINIT_DESC);
        clinit.insns = vec![
            Insn::Simple { op: LCONST_1 },
            Insn::Field {
                op: PUTSTATIC,
                owner: "a/Target".into(),
                name: "K".into(),
                desc: "J".into(),
            },
            Insn::Method {
                op: INVOKESTATIC,
                owner: "a/Target".into(),
                name: "helper".into(),
                desc: "()La/Target;".into(),
                itf: false,
            },
            Insn::Simple { op: POP },
            Insn::Simple { op: RETURN },
        ];
        cn.methods.push(clinit.clone());

        let proxy = create_class_proxy(&cn, clinit);
        let body = &proxy.method(PROXY_CLINIT_NAME, "()V").unwrap().insns;
        assert!(matches!(
            &body[1],
            Insn::Field { owner, .. } if owner == "a/Target$Proxy"
        ));
        assert!(matches!(
            &body[2],
            Insn::Method { owner, desc, .. }
                if owner == "a/Target$Proxy" && desc == "()La/Target$Proxy;"
        ));
    }
}

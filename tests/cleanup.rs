//! End-to-end scenarios for the cleaning passes.

mod common;

use common::*;
use jvmscope::{
    ir::{opcodes::*, Insn, LdcConst},
    pipeline::{run_pipeline, CancelToken, PassRegistry},
    universe::Universe,
};

/// A trivial getter is inlined into its caller and removed.
#[test]
fn inline_trivial_getter() {
    init_logging();
    let mut p = class("P");
    p.methods.push(static_method(
        "k",
        "()I",
        vec![Insn::push_int(42), Insn::Simple { op: IRETURN }],
    ));
    p.methods.push(static_method(
        "m",
        "()I",
        vec![
            Insn::Method {
                op: INVOKESTATIC,
                owner: "P".into(),
                name: "k".into(),
                desc: "()I".into(),
                itf: false,
            },
            Insn::Simple { op: IRETURN },
        ],
    ));

    let mut universe: Universe = [p].into_iter().collect();
    let mut registry = PassRegistry::new();
    let summary = run_pipeline(
        &mut registry,
        &mut universe,
        &["inline-trivial-methods"],
        false,
        &CancelToken::new(),
    );
    assert!(summary.changed());

    let node = &universe.get("P").unwrap().node;
    assert!(node.method("k", "()I").is_none(), "callee must be removed");
    let m = node.method("m", "()I").unwrap();
    assert_eq!(opcodes_of(m), vec![BIPUSH, IRETURN]);
    assert!(matches!(
        m.insns[0],
        Insn::IntOp {
            op: BIPUSH,
            operand: 42
        }
    ));
}

/// A field assigned once in `<clinit>` is folded into its readers,
/// and the field itself survives.
#[test]
fn inline_constant_string_field() {
    init_logging();
    let mut q = class("Q");
    q.fields.push(static_field("S", "Ljava/lang/String;"));
    q.methods.push(clinit(vec![
        ldc_str("abc"),
        Insn::Field {
            op: PUTSTATIC,
            owner: "Q".into(),
            name: "S".into(),
            desc: "Ljava/lang/String;".into(),
        },
        Insn::Simple { op: RETURN },
    ]));
    q.methods.push(static_method(
        "m",
        "()Ljava/lang/String;",
        vec![
            Insn::Field {
                op: GETSTATIC,
                owner: "Q".into(),
                name: "S".into(),
                desc: "Ljava/lang/String;".into(),
            },
            Insn::Simple { op: ARETURN },
        ],
    ));

    let mut universe: Universe = [q].into_iter().collect();
    let mut registry = PassRegistry::new();
    let summary = run_pipeline(
        &mut registry,
        &mut universe,
        &["inline-constant-fields"],
        false,
        &CancelToken::new(),
    );
    assert!(summary.changed());

    let node = &universe.get("Q").unwrap().node;
    let m = node.method("m", "()Ljava/lang/String;").unwrap();
    assert_eq!(
        m.insns[0],
        Insn::Ldc {
            constant: LdcConst::Str("abc".into())
        }
    );
    assert!(node.field("S").is_some(), "the field itself is kept");
}

/// A field also written outside `<clinit>` must not be folded.
#[test]
fn mutable_fields_are_not_inlined() {
    init_logging();
    let mut q = class("Q2");
    q.fields.push(static_field("S", "I"));
    q.methods.push(clinit(vec![
        Insn::push_int(7),
        Insn::Field {
            op: PUTSTATIC,
            owner: "Q2".into(),
            name: "S".into(),
            desc: "I".into(),
        },
        Insn::Simple { op: RETURN },
    ]));
    q.methods.push(static_method(
        "bump",
        "()V",
        vec![
            Insn::push_int(8),
            Insn::Field {
                op: PUTSTATIC,
                owner: "Q2".into(),
                name: "S".into(),
                desc: "I".into(),
            },
            Insn::Simple { op: RETURN },
        ],
    ));
    let reader = vec![
        Insn::Field {
            op: GETSTATIC,
            owner: "Q2".into(),
            name: "S".into(),
            desc: "I".into(),
        },
        Insn::Simple { op: IRETURN },
    ];
    q.methods.push(static_method("m", "()I", reader.clone()));

    let mut universe: Universe = [q].into_iter().collect();
    let mut registry = PassRegistry::new();
    run_pipeline(
        &mut registry,
        &mut universe,
        &["inline-constant-fields"],
        false,
        &CancelToken::new(),
    );

    let node = &universe.get("Q2").unwrap().node;
    assert_eq!(node.method("m", "()I").unwrap().insns, reader);
}

/// Unreferenced classes disappear; the root and its callees stay.
#[test]
fn unused_class_removal() {
    init_logging();
    let mut main = class("Main");
    main.methods.push(static_method(
        "main",
        "([Ljava/lang/String;)V",
        vec![
            Insn::Method {
                op: INVOKESTATIC,
                owner: "Used".into(),
                name: "u".into(),
                desc: "()V".into(),
                itf: false,
            },
            Insn::Simple { op: RETURN },
        ],
    ));
    let mut used = class("Used");
    used.methods
        .push(static_method("u", "()V", vec![Insn::Simple { op: RETURN }]));

    let mut universe: Universe = [main, used, class("Junk")].into_iter().collect();
    let mut registry = PassRegistry::new();
    let summary = run_pipeline(
        &mut registry,
        &mut universe,
        &["remove-unused-classes"],
        false,
        &CancelToken::new(),
    );
    assert!(summary.changed());
    assert!(universe.contains("Main"));
    assert!(universe.contains("Used"));
    assert!(!universe.contains("Junk"));
}

/// `BIPUSH 6; BIPUSH 3; IAND` collapses to a single `ICONST_2`.
#[test]
fn bitwise_folding() {
    init_logging();
    let mut c = class("B");
    c.methods.push(static_method(
        "m",
        "()I",
        vec![
            Insn::push_int(6),
            Insn::push_int(3),
            Insn::Simple { op: IAND },
            Insn::Simple { op: IRETURN },
        ],
    ));

    let mut universe: Universe = [c].into_iter().collect();
    let mut registry = PassRegistry::new();
    let summary = run_pipeline(
        &mut registry,
        &mut universe,
        &["simplify-bit-operations"],
        false,
        &CancelToken::new(),
    );
    assert!(summary.changed());

    let m = universe.get("B").unwrap().node.method("m", "()I").unwrap();
    assert_eq!(opcodes_of(m), vec![ICONST_2, IRETURN]);
}

/// Attribute stripping drops debug metadata and reports a change.
#[test]
fn attribute_stripping() {
    init_logging();
    let mut c = class("A");
    c.source_file = Some("A.java".into());
    let mut m = static_method(
        "m",
        "()V",
        vec![
            Insn::Label(0),
            Insn::Line { line: 3 },
            Insn::Simple { op: RETURN },
        ],
    );
    m.signature = Some("()V".into());
    c.methods.push(m);

    let mut universe: Universe = [c].into_iter().collect();
    let mut registry = PassRegistry::new();
    let summary = run_pipeline(
        &mut registry,
        &mut universe,
        &["strip-attributes"],
        false,
        &CancelToken::new(),
    );
    assert!(summary.changed());

    let node = &universe.get("A").unwrap().node;
    assert!(node.source_file.is_none());
    let m = node.method("m", "()V").unwrap();
    assert!(m.signature.is_none());
    assert!(!m.insns.iter().any(|i| matches!(i, Insn::Line { .. })));
}

//! Pipeline framework invariants.

mod common;

use common::*;
use jvmscope::{
    ir::{opcodes::*, Insn},
    pipeline::{run_pipeline, CancelToken, PassRegistry},
    universe::Universe,
};

fn cleaned_universe() -> Universe {
    let mut main = class("Main");
    main.methods.push(static_method(
        "main",
        "([Ljava/lang/String;)V",
        vec![Insn::Simple { op: RETURN }],
    ));
    [main].into_iter().collect()
}

const ALL_CLEANUP: &[&str] = &[
    "zkm-des-decrypt",
    "remove-fake-try-catch",
    "simplify-bit-operations",
    "inline-constant-fields",
    "inline-trivial-methods",
    "remove-unused-classes",
];

/// The pipeline is idempotent on a fully-deobfuscated input: a second run
/// reports no changes.
#[test]
fn second_run_is_a_fixpoint() {
    init_logging();
    let mut universe = cleaned_universe();

    let mut registry = PassRegistry::new();
    let first = run_pipeline(
        &mut registry,
        &mut universe,
        ALL_CLEANUP,
        false,
        &CancelToken::new(),
    );
    assert_eq!(first.failures(), 0);

    let mut registry = PassRegistry::new();
    let second = run_pipeline(
        &mut registry,
        &mut universe,
        ALL_CLEANUP,
        false,
        &CancelToken::new(),
    );
    assert!(!second.changed(), "second run must report no changes");
    assert_eq!(second.failures(), 0);
}

/// A selection runs in order and every outcome is reported.
#[test]
fn outcomes_follow_selection_order() {
    init_logging();
    let mut universe = cleaned_universe();
    let mut registry = PassRegistry::new();
    let selection = ["remove-fake-try-catch", "strip-attributes"];
    let summary = run_pipeline(
        &mut registry,
        &mut universe,
        &selection,
        false,
        &CancelToken::new(),
    );
    let ids: Vec<&str> = summary.outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, selection);
}

/// Pass failures are captured on the summary; the pipeline never aborts.
#[test]
fn failed_selection_entries_do_not_stop_the_run() {
    init_logging();
    let mut universe = cleaned_universe();
    let mut registry = PassRegistry::new();
    let summary = run_pipeline(
        &mut registry,
        &mut universe,
        &["does-not-exist", "remove-fake-try-catch"],
        false,
        &CancelToken::new(),
    );
    assert_eq!(summary.outcomes.len(), 2);
    assert_eq!(summary.failures(), 1);
    assert!(summary.outcomes[1].error.is_none());
}

/// Registry listing exposes the metadata front ends need.
#[test]
fn registry_lists_pass_metadata() {
    init_logging();
    let registry = PassRegistry::new();
    let infos = registry.list_passes();
    assert!(infos.len() >= 7);

    let zkm = infos.iter().find(|i| i.id == "zkm-des-decrypt").unwrap();
    assert!(!zkm.description.is_empty());
    assert!(!zkm.tags.is_empty());
}

/// Universe state survives untouched when every selected pass is a no-op
/// for the input.
#[test]
fn untouched_classes_keep_their_bytecode() {
    init_logging();
    let mut universe = cleaned_universe();
    let original = universe.get("Main").unwrap().node.clone();

    let mut registry = PassRegistry::new();
    run_pipeline(
        &mut registry,
        &mut universe,
        &["remove-fake-try-catch", "simplify-bit-operations"],
        false,
        &CancelToken::new(),
    );

    let after = &universe.get("Main").unwrap().node;
    assert_eq!(after.methods[0].insns, original.methods[0].insns);
    assert_eq!(after.methods.len(), original.methods.len());
}

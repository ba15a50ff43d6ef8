//! ZKM DES string and reference deobfuscation.
//!
//! ZKM hides member accesses and string constants behind `invokedynamic`:
//! a per-class bootstrap method decrypts the real target with DES, keyed
//! by a `long` that lives in a static field (initialized by the class's
//! static initializer) or is assembled at the call site. This pass
//! re-executes exactly those pieces in the sandbox and rewrites each call
//! site with what they produce:
//!
//! - *Reference phase*: the class's isolated initializer runs in a proxy,
//!   the real bootstrap is invoked with the recovered key and the constant
//!   arguments harvested from analyzer frames, and the returned method
//!   handle is cracked into a direct field/method instruction. The
//!   dynamic invoke becomes `POP2; POP2; <direct reference>`.
//! - *String phase*: the two-argument decryptor method is invoked with
//!   the call site's operands (the second XOR'd with the key) and the
//!   dynamic invoke collapses to `LDC "<decrypted>"`.

use log::{debug, info, warn};

use crate::{
    analysis::{analyze, Constant, NoConstantReferences},
    ir::{
        isolate_matching_calls, opcodes as op, ClassNode, Insn, InstructionModifier, JvmType,
        LdcConst, MethodDescriptor, MethodNode,
    },
    passes::cleanup::inline_fields::SnapshotHandler,
    pipeline::{ExecutionContext, Pass, PassCategory, PassInfo, PassTag},
    sandbox::{
        create_class_proxy, Obj, Value, Vm, BAD_PADDING_EXCEPTION, NULL_POINTER_EXCEPTION,
        PROXY_CLINIT_NAME,
    },
    universe::Universe,
    Result,
};

/// Bootstrap-handle descriptor ZKM emits on every obfuscated call site.
const ZKM_INDY_HANDLE_DESC: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;\
Ljava/lang/String;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;";

static INFO: PassInfo = PassInfo {
    id: "zkm-des-decrypt",
    category: PassCategory::Zkm,
    name: "ZKM DES deobfuscation",
    description: "Decrypts string and member-access obfuscation keyed with DES by \
                  re-executing the obfuscator's own initializers and bootstrap methods \
                  in the sandbox.",
    tags: &[PassTag::PossibleDamage, PassTag::PossiblyMalicious],
};

/// The ZKM DES deobfuscator: reference decryption first, strings second.
#[derive(Debug, Default)]
pub struct ZkmDesDecrypt {
    decrypted_strings: usize,
    encrypted_strings: usize,
    decrypted_references: usize,
    encrypted_references: usize,
}

impl ZkmDesDecrypt {
    #[must_use]
    pub fn new() -> Self {
        ZkmDesDecrypt::default()
    }
}

impl Pass for ZkmDesDecrypt {
    fn info(&self) -> &'static PassInfo {
        &INFO
    }

    fn execute(&mut self, universe: &mut Universe, ctx: &ExecutionContext) -> Result<bool> {
        self.decrypted_strings = 0;
        self.encrypted_strings = 0;
        self.decrypted_references = 0;
        self.encrypted_references = 0;

        info!("Starting ZKM DES deobfuscation...");
        let names = universe.names();

        info!("Phase 1: Decrypting references...");
        let snapshot = SnapshotHandler::of(universe);
        for (i, name) in names.iter().enumerate() {
            ctx.check_canceled()?;
            if ctx.verbose {
                info!("Processing class {}/{}: {name}", i + 1, names.len());
            }
            if let Err(e) = self.decrypt_references(universe, name, &snapshot) {
                warn!("Failed to decrypt references for {name}: {e}");
                universe.record_failure(name, INFO.id, e.to_string());
            }
        }

        info!("Phase 2: Decrypting strings...");
        let snapshot = SnapshotHandler::of(universe);
        for (i, name) in names.iter().enumerate() {
            ctx.check_canceled()?;
            if ctx.verbose {
                info!("Processing class {}/{}: {name}", i + 1, names.len());
            }
            if let Err(e) = self.decrypt_strings(universe, name, &snapshot) {
                warn!("Failed to decrypt strings for {name}: {e}");
                universe.record_failure(name, INFO.id, e.to_string());
            }
        }

        let total_encrypted = self.encrypted_strings + self.encrypted_references;
        let total_decrypted = self.decrypted_strings + self.decrypted_references;
        info!("DECRYPTION COMPLETE");
        info!(
            "Strings: {}/{} ({}% success)",
            self.decrypted_strings,
            self.encrypted_strings,
            rate(self.decrypted_strings, self.encrypted_strings)
        );
        info!(
            "References: {}/{} ({}% success)",
            self.decrypted_references,
            self.encrypted_references,
            rate(self.decrypted_references, self.encrypted_references)
        );
        info!(
            "Total: {total_decrypted}/{total_encrypted} ({}% success)",
            rate(total_decrypted, total_encrypted)
        );

        Ok(self.decrypted_references > 0 || self.decrypted_strings > 0)
    }
}

fn rate(succeeded: usize, attempted: usize) -> usize {
    if attempted == 0 {
        0
    } else {
        (succeeded * 100 + attempted / 2) / attempted
    }
}

impl ZkmDesDecrypt {
    #[allow(clippy::too_many_lines)]
    fn decrypt_references(
        &mut self,
        universe: &mut Universe,
        class_name: &str,
        snapshot: &SnapshotHandler,
    ) -> Result<()> {
        let Some(entry) = universe.get(class_name) else {
            return Ok(());
        };
        let node = entry.node.clone();

        let Some(clinit) = node.static_initializer() else {
            debug!("Skipping class {class_name} - no static initializer found");
            return Ok(());
        };

        // Isolate the initializer: strip helper calls that are neither
        // self-calls, runtime-package calls, nor ZKM decryption plumbing.
        let mut isolated = clinit.clone();
        isolate_matching_calls(
            &mut isolated,
            |owner, _| owner != class_name && !is_runtime_owner(owner),
            |_, desc| !is_allowed_clinit_desc(desc),
        );

        let proxy = create_class_proxy(&node, isolated);
        let proxy_class = proxy.name.clone();
        let mut vm = Vm::new(Box::new(snapshot.share()));
        vm.explicitly_preload(proxy);

        // Run the isolated initializer and classify the outcome:
        // cryptographic failure means the key is wrong (give up on the
        // class), a null dereference is an expected isolation artifact.
        match vm.invoke_static(&proxy_class, PROXY_CLINIT_NAME, "()V", Vec::new()) {
            Ok(_) => {}
            Err(e) if e.thrown_class() == Some(BAD_PADDING_EXCEPTION) => {
                warn!("Skipping class {class_name} due to decryption key issues");
                return Ok(());
            }
            Err(e) if e.thrown_class() == Some(NULL_POINTER_EXCEPTION) => {
                debug!("NPE during proxy initialization in {class_name} (expected)");
            }
            Err(e) => {
                warn!("Proxy initialization failed for {class_name}: {e}");
                return Ok(());
            }
        }

        let bootstrap = node
            .methods
            .iter()
            .find(|m| is_zkm_real_bootstrap_desc(&m.desc))
            .map(|m| (m.name.clone(), m.desc.clone()));

        let mut class_total = 0usize;
        let mut class_success = 0usize;

        for method in &node.methods {
            let sites: Vec<(usize, String, String)> = method
                .insns
                .iter()
                .enumerate()
                .filter_map(|(idx, insn)| match insn {
                    Insn::InvokeDynamic {
                        name, desc, bsm, ..
                    } if bsm.name != "metafactory"
                        && bsm.desc == ZKM_INDY_HANDLE_DESC
                        && !is_zkm_string_indy_desc(desc) =>
                    {
                        Some((idx, name.clone(), desc.clone()))
                    }
                    _ => None,
                })
                .collect();
            if sites.is_empty() {
                continue;
            }
            let site_count = sites.len();
            debug!("Found {site_count} encrypted references in {class_name}.{}", method.name);
            class_total += site_count;
            self.encrypted_references += site_count;

            let frames = match analyze(method, &NoConstantReferences) {
                Ok(frames) => frames,
                Err(e) => {
                    warn!(
                        "Constant tracking failed in {class_name}.{}: {e}",
                        method.name
                    );
                    continue;
                }
            };

            let mut modifier = InstructionModifier::new();
            let mut key = 0i64;
            let mut method_success = 0usize;

            for (idx, site_name, site_desc) in sites {
                if key == 0 {
                    key = recover_reference_key(&node, method, idx, &proxy_class, &mut vm)
                        .unwrap_or(0);
                }
                if key == 0 {
                    warn!("Key extraction failed for {class_name}.{}", method.name);
                    continue;
                }

                let Some((bsm_name, bsm_desc)) = &bootstrap else {
                    warn!("Bootstrap method not found in {class_name}");
                    continue;
                };
                let Ok(bsm_md) = MethodDescriptor::parse(bsm_desc) else {
                    continue;
                };
                // Everything after (Lookup, CallSite, String, MethodType).
                let extra_count = bsm_md.params.len() - 4;

                let Some(frame) = frames.get(idx).and_then(Option::as_ref) else {
                    warn!(
                        "No frame for call site in {class_name}.{}",
                        method.name
                    );
                    continue;
                };
                if frame.stack_size() < extra_count {
                    warn!(
                        "Operand stack too shallow for bootstrap in {class_name}.{}",
                        method.name
                    );
                    continue;
                }

                let mut args = vec![
                    vm.trusted_lookup(),
                    Value::Null,
                    Value::string(site_name.clone()),
                    Value::object(Obj::MethodType(site_desc.clone())),
                ];
                let mut harvested_ok = true;
                for i in 0..extra_count - 1 {
                    let stack_index = frame.stack_size() - extra_count + i;
                    let constant = frame
                        .stack(stack_index)
                        .and_then(|cv| cv.value())
                        .and_then(sandbox_value_of);
                    match constant {
                        Some(value) => args.push(value),
                        None => {
                            warn!(
                                "Unknown stack value at depth {i} in {class_name}.{}",
                                method.name
                            );
                            harvested_ok = false;
                            break;
                        }
                    }
                }
                if !harvested_ok {
                    continue;
                }
                args.push(Value::Long(key));

                let handle = match vm.invoke_static(&proxy_class, bsm_name, bsm_desc, args) {
                    Ok(handle) => handle,
                    Err(e) => {
                        warn!(
                            "Failed to get MethodHandle in {class_name}.{}: {e}",
                            method.name
                        );
                        continue;
                    }
                };
                let mut revealed = match vm.reveal_method_handle(&handle) {
                    Ok(info) => info,
                    Err(e) => {
                        warn!(
                            "No instruction generated for {class_name}.{}: {e}",
                            method.name
                        );
                        continue;
                    }
                };
                // The bootstrap resolved against the proxy; point the
                // synthesized reference back at the real class.
                if revealed.owner == proxy_class {
                    revealed.owner = class_name.to_string();
                }
                let proxy_desc = format!("L{proxy_class};");
                if revealed.desc.contains(&proxy_desc) {
                    revealed.desc = revealed
                        .desc
                        .replace(&proxy_desc, &format!("L{class_name};"));
                }

                let direct = crate::sandbox::instruction_from_handle(&revealed);
                modifier.replace(
                    idx,
                    vec![
                        Insn::Simple { op: op::POP2 },
                        Insn::Simple { op: op::POP2 },
                        direct,
                    ],
                );
                method_success += 1;
                class_success += 1;
                self.decrypted_references += 1;
                info!(
                    "REFERENCE DECRYPTION SUCCESS: {class_name}.{} -> {}.{}{}",
                    method.name, revealed.owner, revealed.name, revealed.desc
                );
            }

            if let Some(live) = universe
                .get_mut(class_name)
                .and_then(|e| e.node.method_mut(&method.name, &method.desc))
            {
                modifier.apply(live);
            }
            info!(
                "Method {class_name}.{} reference summary: {method_success}/{site_count} decrypted",
                method.name
            );
        }

        if class_total > 0 {
            info!(
                "Class {class_name} reference summary: {class_success}/{class_total} successful ({}%)",
                rate(class_success, class_total)
            );
        } else {
            debug!("Class {class_name}: No encrypted references found");
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn decrypt_strings(
        &mut self,
        universe: &mut Universe,
        class_name: &str,
        snapshot: &SnapshotHandler,
    ) -> Result<()> {
        let Some(entry) = universe.get(class_name) else {
            return Ok(());
        };
        let node = entry.node.clone();

        let mut class_total = 0usize;
        let mut class_success = 0usize;

        for method in &node.methods {
            let sites: Vec<(usize, String)> = method
                .insns
                .iter()
                .enumerate()
                .filter_map(|(idx, insn)| match insn {
                    Insn::InvokeDynamic { desc, bsm, .. }
                        if bsm.name != "metafactory" && is_zkm_string_indy_desc(desc) =>
                    {
                        Some((idx, bsm.owner.clone()))
                    }
                    _ => None,
                })
                .collect();
            if sites.is_empty() {
                continue;
            }
            class_total += sites.len();
            self.encrypted_strings += sites.len();

            let mut modifier = InstructionModifier::new();
            let mut method_success = 0usize;

            for (idx, bsm_owner) in sites {
                let mut vm = Vm::new(Box::new(snapshot.share()));

                let Some(key) = string_key(&node, method, idx, &mut vm) else {
                    warn!(
                        "Key extraction failed for string in {class_name}.{}",
                        method.name
                    );
                    continue;
                };

                let Some(decryptor) = find_string_decryptor(&bsm_owner, snapshot) else {
                    warn!("String decryption method not found in {bsm_owner}");
                    continue;
                };

                let Some((first, second)) = string_call_params(method, idx) else {
                    warn!(
                        "Could not find string decryption parameters in {class_name}.{}",
                        method.name
                    );
                    continue;
                };
                let second = second ^ key;

                let first_value = if decryptor.1.starts_with("(I") {
                    Value::Int(first)
                } else {
                    Value::Long(i64::from(first))
                };
                let decrypted = vm
                    .invoke_static(
                        &bsm_owner,
                        &decryptor.0,
                        &decryptor.1,
                        vec![first_value, Value::Long(second)],
                    )
                    .ok()
                    .and_then(|v| v.as_string());

                match decrypted {
                    Some(s) if !s.is_empty() => {
                        queue_string_replacement(method, idx, &s, &mut modifier);
                        method_success += 1;
                        class_success += 1;
                        self.decrypted_strings += 1;
                        info!(
                            "STRING DECRYPTION SUCCESS: {class_name}.{} -> '{}'",
                            method.name,
                            truncate(&s, 100)
                        );
                    }
                    _ => {
                        warn!(
                            "STRING DECRYPTION FAILED: {class_name}.{} - decryption \
                             returned nothing",
                            method.name
                        );
                    }
                }
            }

            if let Some(live) = universe
                .get_mut(class_name)
                .and_then(|e| e.node.method_mut(&method.name, &method.desc))
            {
                modifier.apply(live);
            }
            info!(
                "Method {class_name}.{} string summary: {method_success} decrypted",
                method.name
            );
        }

        if class_total > 0 {
            info!(
                "Class {class_name} string summary: {class_success}/{class_total} successful ({}%)",
                rate(class_success, class_total)
            );
        } else {
            debug!("Class {class_name}: No encrypted strings found");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pattern recognition
// ---------------------------------------------------------------------------

/// `([IJ]+)Ljava/lang/String;` - an encrypted string call site.
fn is_zkm_string_indy_desc(desc: &str) -> bool {
    let Ok(md) = MethodDescriptor::parse(desc) else {
        return false;
    };
    !md.params.is_empty()
        && md
            .params
            .iter()
            .all(|p| matches!(p, JvmType::Int | JvmType::Long))
        && md.ret == JvmType::Object("java/lang/String".into())
}

/// `(Lookup, MutableCallSite, String, MethodType, [JI]+)MethodHandle` -
/// the "real bootstrap" hidden behind the call-site handle.
fn is_zkm_real_bootstrap_desc(desc: &str) -> bool {
    let Ok(md) = MethodDescriptor::parse(desc) else {
        return false;
    };
    let expected_head = [
        "java/lang/invoke/MethodHandles$Lookup",
        "java/lang/invoke/MutableCallSite",
        "java/lang/String",
        "java/lang/invoke/MethodType",
    ];
    md.params.len() > expected_head.len()
        && md
            .params
            .iter()
            .zip(expected_head.iter())
            .all(|(p, head)| matches!(p, JvmType::Object(name) if name == head))
        && md.params[expected_head.len()..]
            .iter()
            .all(|p| matches!(p, JvmType::Int | JvmType::Long))
        && md.ret == JvmType::Object("java/lang/invoke/MethodHandle".into())
}

/// `((L...;)?J+)(\[?(I|J|L...;))` - the shape of ZKM's encrypted member
/// accessors.
fn is_zkm_reference_desc(desc: &str) -> bool {
    let Ok(md) = MethodDescriptor::parse(desc) else {
        return false;
    };
    let mut params = md.params.as_slice();
    if matches!(params.first(), Some(JvmType::Object(_))) {
        params = &params[1..];
    }
    let ret_ok = |ty: &JvmType| {
        matches!(ty, JvmType::Int | JvmType::Long | JvmType::Object(_))
    };
    !params.is_empty()
        && params.iter().all(|p| *p == JvmType::Long)
        && match &md.ret {
            JvmType::Array(elem) => ret_ok(elem),
            other => ret_ok(other),
        }
}

fn is_runtime_owner(owner: &str) -> bool {
    owner.starts_with("java/lang/")
        || owner.starts_with("java/util/")
        || owner.starts_with("javax/crypto/")
}

/// Descriptors the initializer isolation keeps: key material loads and
/// the decryption helper shapes.
fn is_allowed_clinit_desc(desc: &str) -> bool {
    matches!(desc, "J" | "Ljava/lang/String;" | "[Ljava/lang/String;" | "(J)J")
        || is_jj_object_helper_desc(desc)
        || is_zkm_reference_desc(desc)
}

/// `(JJLjava/lang/Object;)L...;`
fn is_jj_object_helper_desc(desc: &str) -> bool {
    let Ok(md) = MethodDescriptor::parse(desc) else {
        return false;
    };
    md.params.len() == 3
        && md.params[0] == JvmType::Long
        && md.params[1] == JvmType::Long
        && md.params[2] == JvmType::Object("java/lang/Object".into())
        && matches!(md.ret, JvmType::Object(_))
}

// ---------------------------------------------------------------------------
// Key recovery
// ---------------------------------------------------------------------------

/// Reference-phase key: a local assembled near the call site, the class's
/// first static `long` field (read through the proxy), or the
/// `GETSTATIC; LDC; LXOR` pattern.
fn recover_reference_key(
    node: &ClassNode,
    method: &MethodNode,
    site: usize,
    proxy_class: &str,
    vm: &mut Vm,
) -> Option<i64> {
    if let Some(var) = find_key_variable(method, site) {
        if let Some(key) = search_for_second_key(method, var) {
            return Some(key);
        }
    }
    if let Some(field) = first_static_long_field(node) {
        if let Some(value) = vm.static_field_value(proxy_class, &field, "J") {
            return value.as_long();
        }
    }
    find_key_by_pattern(method, site)
}

/// String-phase key: the class's first static `long` field after running
/// its real initializer, falling back to the call-site XOR pattern.
fn string_key(node: &ClassNode, method: &MethodNode, site: usize, vm: &mut Vm) -> Option<i64> {
    if let Some(field) = first_static_long_field(node) {
        if vm.initialize_class(&node.name).is_ok() {
            if let Some(value) = vm.static_field_value(&node.name, &field, "J") {
                return value.as_long();
            }
        }
    }
    find_key_by_pattern(method, site)
}

/// Nearest `LSTORE` above the call site.
fn find_key_variable(method: &MethodNode, site: usize) -> Option<u16> {
    method.insns[..site].iter().rev().find_map(|insn| match insn {
        Insn::Var {
            op: op::LSTORE,
            var,
        } => Some(*var),
        _ => None,
    })
}

/// An `LDC <long>` two real instructions above any `LSTORE` of `var`.
fn search_for_second_key(method: &MethodNode, var: u16) -> Option<i64> {
    for (idx, insn) in method.insns.iter().enumerate() {
        let Insn::Var {
            op: op::LSTORE,
            var: v,
        } = insn
        else {
            continue;
        };
        if *v != var {
            continue;
        }
        let p1 = prev_real(method, idx)?;
        let p2 = prev_real(method, p1)?;
        if let Insn::Ldc {
            constant: LdcConst::Long(key),
        } = &method.insns[p2]
        {
            return Some(*key);
        }
    }
    None
}

/// `GETSTATIC J; LDC <long>; LXOR` above the call site.
fn find_key_by_pattern(method: &MethodNode, site: usize) -> Option<i64> {
    for idx in (0..site).rev() {
        if method.insns[idx].opcode() != Some(op::LXOR) {
            continue;
        }
        let p1 = prev_real(method, idx)?;
        let p2 = prev_real(method, p1)?;
        if let (
            Insn::Ldc {
                constant: LdcConst::Long(key),
            },
            Insn::Field {
                op: op::GETSTATIC,
                desc,
                ..
            },
        ) = (&method.insns[p1], &method.insns[p2])
        {
            if desc == "J" {
                return Some(*key);
            }
        }
    }
    None
}

/// Name of the first static `long` field the initializer assigns.
fn first_static_long_field(node: &ClassNode) -> Option<String> {
    let clinit = node.static_initializer()?;
    let first_put = clinit.insns.iter().find_map(|insn| match insn {
        Insn::Field {
            op: op::PUTSTATIC,
            name,
            desc,
            ..
        } => Some((name.clone(), desc.clone())),
        _ => None,
    })?;
    (first_put.1 == "J").then_some(first_put.0)
}

fn prev_real(method: &MethodNode, idx: usize) -> Option<usize> {
    (0..idx).rev().find(|&i| !method.insns[i].is_pseudo())
}

// ---------------------------------------------------------------------------
// String phase helpers
// ---------------------------------------------------------------------------

/// The two-argument `(int|long, long) -> String` decryptor of the
/// bootstrap owner.
fn find_string_decryptor(owner: &str, snapshot: &SnapshotHandler) -> Option<(String, String)> {
    use crate::sandbox::VmReferenceHandler;
    let node = snapshot.try_class_load(owner)?;
    node.methods
        .iter()
        .find(|m| {
            m.access.is_static()
                && matches!(m.desc.as_str(), "(IJ)Ljava/lang/String;" | "(JJ)Ljava/lang/String;")
        })
        .map(|m| (m.name.clone(), m.desc.clone()))
}

/// The `SIPUSH/BIPUSH` id and `LDC <long>` operand pushed right before
/// the call site.
fn string_call_params(method: &MethodNode, site: usize) -> Option<(i32, i64)> {
    let mut first = None;
    let mut second = None;
    let mut idx = site;
    for _ in 0..5 {
        idx = prev_real(method, idx)?;
        match &method.insns[idx] {
            Insn::IntOp {
                op: op::BIPUSH | op::SIPUSH,
                operand,
            } => first = Some(*operand),
            Insn::Ldc {
                constant: LdcConst::Long(v),
            } => second = Some(*v),
            _ => {}
        }
        if let (Some(f), Some(s)) = (first, second) {
            return Some((f, s));
        }
    }
    None
}

/// Removes the operand pushes and replaces the call site with the
/// decrypted literal.
fn queue_string_replacement(
    method: &MethodNode,
    site: usize,
    decrypted: &str,
    modifier: &mut InstructionModifier,
) {
    let mut idx = site;
    for _ in 0..2 {
        let Some(prev) = prev_real(method, idx) else {
            break;
        };
        if matches!(
            &method.insns[prev],
            Insn::IntOp {
                op: op::BIPUSH | op::SIPUSH,
                ..
            } | Insn::Ldc {
                constant: LdcConst::Long(_)
            }
        ) {
            modifier.remove(prev);
        }
        idx = prev;
    }
    modifier.replace(
        site,
        vec![Insn::Ldc {
            constant: LdcConst::Str(decrypted.to_string()),
        }],
    );
}

fn sandbox_value_of(constant: &Constant) -> Option<Value> {
    match constant {
        Constant::Int(v) => Some(Value::Int(*v)),
        Constant::Long(v) => Some(Value::Long(*v)),
        Constant::Float(v) => Some(Value::Float(*v)),
        Constant::Double(v) => Some(Value::Double(*v)),
        Constant::Str(s) => Some(Value::string(s.clone())),
        Constant::Null => Some(Value::Null),
        Constant::Class(name) => Some(Value::object(Obj::Class(name.clone()))),
        Constant::MethodType(desc) => Some(Value::object(Obj::MethodType(desc.clone()))),
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_indy_descriptor_shapes() {
        assert!(is_zkm_string_indy_desc("(IJ)Ljava/lang/String;"));
        assert!(is_zkm_string_indy_desc("(J)Ljava/lang/String;"));
        assert!(is_zkm_string_indy_desc("(III)Ljava/lang/String;"));
        assert!(!is_zkm_string_indy_desc("()Ljava/lang/String;"));
        assert!(!is_zkm_string_indy_desc("(IJ)J"));
        assert!(!is_zkm_string_indy_desc("(Ljava/lang/String;)Ljava/lang/String;"));
    }

    #[test]
    fn real_bootstrap_descriptor_shapes() {
        let good = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/invoke/MutableCallSite;\
Ljava/lang/String;Ljava/lang/invoke/MethodType;JI)Ljava/lang/invoke/MethodHandle;";
        assert!(is_zkm_real_bootstrap_desc(good));

        let no_extras = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/invoke/MutableCallSite;\
Ljava/lang/String;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/MethodHandle;";
        assert!(!is_zkm_real_bootstrap_desc(no_extras));

        let wrong_ret = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/invoke/MutableCallSite;\
Ljava/lang/String;Ljava/lang/invoke/MethodType;J)Ljava/lang/invoke/CallSite;";
        assert!(!is_zkm_real_bootstrap_desc(wrong_ret));
    }

    #[test]
    fn reference_descriptor_shapes() {
        assert!(is_zkm_reference_desc("(J)J"));
        assert!(is_zkm_reference_desc("(JJ)I"));
        assert!(is_zkm_reference_desc("(Ljava/lang/Object;J)Ljava/lang/String;"));
        assert!(is_zkm_reference_desc("(J)[I"));
        assert!(!is_zkm_reference_desc("()J"));
        assert!(!is_zkm_reference_desc("(I)J"));
        assert!(!is_zkm_reference_desc("(JI)J"));
    }

    #[test]
    fn key_pattern_search() {
        use crate::ir::Access;
        let mut m = MethodNode::new(Access::STATIC, "m", "()V");
        m.insns = vec![
            Insn::Field {
                op: op::GETSTATIC,
                owner: "z/C".into(),
                name: "K".into(),
                desc: "J".into(),
            },
            Insn::Ldc {
                constant: LdcConst::Long(0x1234_5678),
            },
            Insn::Simple { op: op::LXOR },
            Insn::Var {
                op: op::LSTORE,
                var: 0,
            },
            Insn::Simple { op: op::RETURN },
        ];
        assert_eq!(find_key_by_pattern(&m, 4), Some(0x1234_5678));
        assert_eq!(find_key_variable(&m, 4), Some(0));
        // The LSTORE's operand chain is LXOR, not an LDC, so the
        // second-key search must come up empty here.
        assert_eq!(search_for_second_key(&m, 0), None);
    }

    #[test]
    fn string_params_within_window() {
        use crate::ir::Access;
        let mut m = MethodNode::new(Access::STATIC, "m", "()V");
        m.insns = vec![
            Insn::IntOp {
                op: op::SIPUSH,
                operand: 513,
            },
            Insn::Ldc {
                constant: LdcConst::Long(-77),
            },
            Insn::InvokeDynamic {
                name: "a".into(),
                desc: "(IJ)Ljava/lang/String;".into(),
                bsm: crate::ir::Handle {
                    kind: crate::ir::HandleKind::InvokeStatic,
                    owner: "z/C".into(),
                    name: "bsm".into(),
                    desc: ZKM_INDY_HANDLE_DESC.into(),
                    itf: false,
                },
                args: vec![],
            },
        ];
        assert_eq!(string_call_params(&m, 2), Some((513, -77)));
    }
}

//! The bytecode interpreter.
//!
//! Executes method bodies from the crate's own IR against a [`Vm`]. The
//! interpreter is deliberately partial: it models what obfuscator
//! initializers and bootstrap methods actually do (constants, arithmetic,
//! arrays, strings, field traffic, direct calls, exceptions) and reports
//! an engine error for anything else. Two budgets bound adversarial input:
//! a per-invocation instruction ceiling and a call-depth ceiling.

use rustc_hash::FxHashMap;

use crate::ir::{
    opcodes as op, Handle, Insn, JvmType, LdcConst, MethodDescriptor, MethodNode,
};
use crate::sandbox::{
    loader::LoadedClass,
    natives,
    value::{ArrayObj, HandleInfo, Instance, Obj, Value},
    vm::Vm,
    SandboxError, ThrownException, NULL_POINTER_EXCEPTION,
};

/// Maximum nested sandbox call depth.
pub(crate) const MAX_CALL_DEPTH: usize = 128;

enum Step {
    Next,
    Jump(usize),
    Return(Value),
}

/// Invokes a static method by resolution through the loader, applying the
/// stub policy when the target cannot be modeled.
pub(crate) fn call_static(
    vm: &mut Vm,
    owner: &str,
    name: &str,
    desc: &str,
    args: Vec<Value>,
    depth: usize,
) -> Result<Value, SandboxError> {
    if depth > MAX_CALL_DEPTH {
        return Err(SandboxError::engine("call depth limit exceeded"));
    }
    vm.ensure_initialized(owner, depth)?;

    let mut current = owner.to_string();
    // Static methods resolve through the superclass chain.
    for _ in 0..64 {
        match vm.resolve_class(&current) {
            Some(LoadedClass::User(node)) => {
                if let Some(method) = node.method(name, desc) {
                    if method.access.is_native() || method.access.is_abstract() {
                        return default_return(desc);
                    }
                    let method = method.clone();
                    return execute_method(vm, &node.name, &method, args, depth);
                }
                match &node.super_name {
                    Some(parent) => current = parent.clone(),
                    None => return default_return(desc),
                }
            }
            Some(LoadedClass::Builtin) => {
                return match natives::invoke_static(vm, &current, name, desc, &args)? {
                    Some(value) => Ok(value),
                    None => default_return(desc),
                };
            }
            Some(LoadedClass::Stub) => return default_return(desc),
            None => {
                return Err(SandboxError::engine(format!(
                    "could not load class {current}"
                )))
            }
        }
    }
    default_return(desc)
}

/// Invokes an instance method on `receiver`.
fn call_instance(
    vm: &mut Vm,
    receiver: Value,
    owner: &str,
    name: &str,
    desc: &str,
    args: Vec<Value>,
    depth: usize,
    special: bool,
) -> Result<Value, SandboxError> {
    if depth > MAX_CALL_DEPTH {
        return Err(SandboxError::engine("call depth limit exceeded"));
    }
    let recv_ref = match &receiver {
        Value::Ref(r) => r.clone(),
        _ => {
            return Err(SandboxError::thrown(
                NULL_POINTER_EXCEPTION,
                format!("{owner}.{name}"),
            ))
        }
    };

    // Virtual dispatch starts at the receiver's dynamic class; special
    // dispatch (constructors, super calls, private methods) starts at the
    // named owner.
    let start = if special {
        owner.to_string()
    } else {
        match &*recv_ref.borrow() {
            Obj::Instance(i) => i.class.clone(),
            _ => owner.to_string(),
        }
    };

    let mut current = start;
    for _ in 0..64 {
        match vm.resolve_class(&current) {
            Some(LoadedClass::User(node)) => {
                if let Some(method) = node.method(name, desc) {
                    if method.access.is_native() || method.access.is_abstract() {
                        return default_return(desc);
                    }
                    let method = method.clone();
                    let mut full_args = Vec::with_capacity(args.len() + 1);
                    full_args.push(receiver);
                    full_args.extend(args);
                    return execute_method(vm, &node.name, &method, full_args, depth);
                }
                match &node.super_name {
                    Some(parent) => current = parent.clone(),
                    None => break,
                }
            }
            Some(LoadedClass::Builtin | LoadedClass::Stub) | None => break,
        }
    }

    match natives::invoke_instance(vm, &recv_ref, name, desc, &args)? {
        Some(value) => Ok(value),
        None => default_return(desc),
    }
}

fn default_return(desc: &str) -> Result<Value, SandboxError> {
    let md = MethodDescriptor::parse(desc)
        .map_err(|e| SandboxError::engine(format!("bad descriptor {desc}: {e}")))?;
    Ok(Value::default_of(&md.ret))
}

/// Runs one method body to completion.
#[allow(clippy::too_many_lines)]
pub(crate) fn execute_method(
    vm: &mut Vm,
    class_name: &str,
    method: &MethodNode,
    args: Vec<Value>,
    depth: usize,
) -> Result<Value, SandboxError> {
    if depth > MAX_CALL_DEPTH {
        return Err(SandboxError::engine("call depth limit exceeded"));
    }
    if method.insns.is_empty() {
        return default_return(&method.desc);
    }

    let labels = method.label_positions();
    let resolve = |label: u32| -> Result<usize, SandboxError> {
        labels.get(&label).copied().ok_or_else(|| {
            SandboxError::engine(format!(
                "{class_name}.{} jumps to unknown label {label}",
                method.name
            ))
        })
    };

    let mut handlers = Vec::with_capacity(method.try_catch_blocks.len());
    for tcb in &method.try_catch_blocks {
        handlers.push((
            resolve(tcb.start)?,
            resolve(tcb.end)?,
            resolve(tcb.handler)?,
            tcb.catch_type.clone(),
        ));
    }

    let mut locals: Vec<Value> = Vec::with_capacity(usize::from(method.max_locals));
    for value in args {
        let size = value.size();
        locals.push(value);
        if size == 2 {
            locals.push(Value::Null);
        }
    }
    locals.resize(
        locals.len().max(usize::from(method.max_locals)),
        Value::Null,
    );

    let mut stack: Vec<Value> = Vec::new();
    let mut pc = 0usize;

    loop {
        if pc >= method.insns.len() {
            return Err(SandboxError::engine(format!(
                "{class_name}.{} ran past the end of its body",
                method.name
            )));
        }
        vm.consume_budget()?;

        let step = step(
            vm,
            &method.insns[pc],
            &mut stack,
            &mut locals,
            &resolve,
            depth,
        );
        match step {
            Ok(Step::Next) => pc += 1,
            Ok(Step::Jump(target)) => pc = target,
            Ok(Step::Return(value)) => return Ok(value),
            Err(SandboxError::Thrown(thrown)) => {
                let Some(handler_pc) = find_handler(vm, &handlers, pc, &thrown.class_name) else {
                    return Err(SandboxError::Thrown(thrown));
                };
                let object = thrown.object.clone().unwrap_or_else(|| {
                    let mut instance = Instance {
                        class: thrown.class_name.clone(),
                        fields: FxHashMap::default(),
                    };
                    if let Some(msg) = &thrown.message {
                        instance
                            .fields
                            .insert("message".into(), Value::string(msg.clone()));
                    }
                    Value::object(Obj::Instance(instance))
                });
                stack.clear();
                stack.push(object);
                pc = handler_pc;
            }
            Err(engine) => return Err(engine),
        }
    }
}

fn find_handler(
    vm: &mut Vm,
    handlers: &[(usize, usize, usize, Option<String>)],
    pc: usize,
    thrown_class: &str,
) -> Option<usize> {
    handlers
        .iter()
        .find(|(start, end, _, catch_type)| {
            pc >= *start
                && pc < *end
                && catch_type
                    .as_deref()
                    .map_or(true, |caught| throwable_matches(vm, thrown_class, caught))
        })
        .map(|(_, _, handler, _)| *handler)
}

/// Walks the thrown class's superclass chain (user classes through the
/// loader, builtins through a fixed hierarchy table) looking for `caught`.
fn throwable_matches(vm: &mut Vm, thrown: &str, caught: &str) -> bool {
    if caught == "java/lang/Throwable" {
        return true;
    }
    let mut current = thrown.to_string();
    for _ in 0..32 {
        if current == caught {
            return true;
        }
        let parent = match vm.resolve_class(&current) {
            Some(LoadedClass::User(node)) => node.super_name.clone(),
            _ => builtin_throwable_parent(&current).map(str::to_string),
        };
        match parent {
            Some(parent) => current = parent,
            None => return false,
        }
    }
    false
}

fn builtin_throwable_parent(name: &str) -> Option<&'static str> {
    Some(match name {
        "java/lang/NullPointerException"
        | "java/lang/ArithmeticException"
        | "java/lang/IllegalStateException"
        | "java/lang/ClassCastException"
        | "java/lang/NegativeArraySizeException"
        | "java/lang/SecurityException"
        | "java/lang/IndexOutOfBoundsException" => "java/lang/RuntimeException",
        "java/lang/IllegalArgumentException" => "java/lang/RuntimeException",
        "java/lang/NumberFormatException" => "java/lang/IllegalArgumentException",
        "java/lang/ArrayIndexOutOfBoundsException"
        | "java/lang/StringIndexOutOfBoundsException" => "java/lang/IndexOutOfBoundsException",
        "java/lang/RuntimeException"
        | "java/lang/ClassNotFoundException"
        | "java/lang/IllegalAccessException"
        | "java/lang/NoSuchMethodException"
        | "java/lang/NoSuchFieldException"
        | "java/io/IOException"
        | "java/security/GeneralSecurityException" => "java/lang/Exception",
        "javax/crypto/BadPaddingException"
        | "javax/crypto/IllegalBlockSizeException"
        | "java/security/NoSuchAlgorithmException"
        | "java/security/InvalidKeyException" => "java/security/GeneralSecurityException",
        "java/lang/Exception" | "java/lang/Error" => "java/lang/Throwable",
        "java/lang/NoClassDefFoundError"
        | "java/lang/ExceptionInInitializerError"
        | "java/lang/BootstrapMethodError"
        | "java/lang/IncompatibleClassChangeError" => "java/lang/LinkageError",
        "java/lang/NoSuchMethodError" | "java/lang/NoSuchFieldError" => {
            "java/lang/IncompatibleClassChangeError"
        }
        "java/lang/LinkageError" => "java/lang/Error",
        _ => return None,
    })
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, SandboxError> {
    stack
        .pop()
        .ok_or_else(|| SandboxError::engine("operand stack underflow"))
}

fn pop_int(stack: &mut Vec<Value>) -> Result<i32, SandboxError> {
    match pop(stack)? {
        Value::Int(v) => Ok(v),
        other => Err(SandboxError::engine(format!("expected int, got {other:?}"))),
    }
}

fn pop_long(stack: &mut Vec<Value>) -> Result<i64, SandboxError> {
    match pop(stack)? {
        Value::Long(v) => Ok(v),
        other => Err(SandboxError::engine(format!("expected long, got {other:?}"))),
    }
}

fn pop_float(stack: &mut Vec<Value>) -> Result<f32, SandboxError> {
    match pop(stack)? {
        Value::Float(v) => Ok(v),
        other => Err(SandboxError::engine(format!("expected float, got {other:?}"))),
    }
}

fn pop_double(stack: &mut Vec<Value>) -> Result<f64, SandboxError> {
    match pop(stack)? {
        Value::Double(v) => Ok(v),
        other => Err(SandboxError::engine(format!(
            "expected double, got {other:?}"
        ))),
    }
}

fn pop_args(stack: &mut Vec<Value>, desc: &str) -> Result<Vec<Value>, SandboxError> {
    let md = MethodDescriptor::parse(desc)
        .map_err(|e| SandboxError::engine(format!("bad descriptor {desc}: {e}")))?;
    let mut args = Vec::with_capacity(md.params.len());
    for _ in &md.params {
        args.push(pop(stack)?);
    }
    args.reverse();
    Ok(args)
}

fn push_return(stack: &mut Vec<Value>, desc: &str, value: Value) -> Result<(), SandboxError> {
    let md = MethodDescriptor::parse(desc)
        .map_err(|e| SandboxError::engine(format!("bad descriptor {desc}: {e}")))?;
    if md.ret != JvmType::Void {
        stack.push(value);
    }
    Ok(())
}

fn class_of_object(value: &Value) -> String {
    match value {
        Value::Ref(r) => match &*r.borrow() {
            Obj::Instance(i) => i.class.clone(),
            Obj::Str(_) => "java/lang/String".into(),
            Obj::Builder(_) => "java/lang/StringBuilder".into(),
            Obj::Class(_) => "java/lang/Class".into(),
            Obj::MethodType(_) => "java/lang/invoke/MethodType".into(),
            Obj::MethodHandle(_) => "java/lang/invoke/MethodHandle".into(),
            Obj::Lookup { .. } => "java/lang/invoke/MethodHandles$Lookup".into(),
            Obj::CallSite { .. } => "java/lang/invoke/MutableCallSite".into(),
            Obj::Boxed { class, .. } => class.clone(),
            Obj::Array(_) => "java/lang/Object".into(),
        },
        _ => "java/lang/Object".into(),
    }
}

fn arithmetic_exception() -> SandboxError {
    SandboxError::thrown("java/lang/ArithmeticException", "/ by zero")
}

fn array_bounds(index: i32) -> SandboxError {
    SandboxError::thrown(
        "java/lang/ArrayIndexOutOfBoundsException",
        format!("Index {index}"),
    )
}

#[allow(clippy::too_many_lines)]
fn step(
    vm: &mut Vm,
    insn: &Insn,
    stack: &mut Vec<Value>,
    locals: &mut Vec<Value>,
    resolve: &dyn Fn(u32) -> Result<usize, SandboxError>,
    depth: usize,
) -> Result<Step, SandboxError> {
    match insn {
        Insn::Label(_) | Insn::Line { .. } | Insn::Frame => Ok(Step::Next),

        Insn::Simple { op: o } => step_simple(vm, *o, stack, depth),

        Insn::IntOp { op: o, operand } => {
            match *o {
                op::BIPUSH | op::SIPUSH => stack.push(Value::Int(*operand)),
                op::NEWARRAY => {
                    let len = pop_int(stack)?;
                    let len_usize = usize::try_from(len).map_err(|_| {
                        SandboxError::thrown(
                            "java/lang/NegativeArraySizeException",
                            len.to_string(),
                        )
                    })?;
                    let array = match *operand {
                        op::array_type::T_BOOLEAN => ArrayObj::Bool(vec![false; len_usize]),
                        op::array_type::T_CHAR => ArrayObj::Char(vec![0; len_usize]),
                        op::array_type::T_FLOAT => ArrayObj::Float(vec![0.0; len_usize]),
                        op::array_type::T_DOUBLE => ArrayObj::Double(vec![0.0; len_usize]),
                        op::array_type::T_BYTE => ArrayObj::Byte(vec![0; len_usize]),
                        op::array_type::T_SHORT => ArrayObj::Short(vec![0; len_usize]),
                        op::array_type::T_INT => ArrayObj::Int(vec![0; len_usize]),
                        op::array_type::T_LONG => ArrayObj::Long(vec![0; len_usize]),
                        other => {
                            return Err(SandboxError::engine(format!(
                                "invalid newarray type {other}"
                            )))
                        }
                    };
                    stack.push(Value::object(Obj::Array(array)));
                }
                other => {
                    return Err(SandboxError::engine(format!(
                        "unexpected int operand op {other:#x}"
                    )))
                }
            }
            Ok(Step::Next)
        }

        Insn::Var { op: o, var } => {
            let var = usize::from(*var);
            match *o {
                op::ILOAD | op::LLOAD | op::FLOAD | op::DLOAD | op::ALOAD => {
                    let value = locals.get(var).cloned().unwrap_or(Value::Null);
                    stack.push(value);
                }
                op::ISTORE | op::LSTORE | op::FSTORE | op::DSTORE | op::ASTORE => {
                    let value = pop(stack)?;
                    let size = value.size();
                    if locals.len() <= var + 1 {
                        locals.resize(var + 2, Value::Null);
                    }
                    locals[var] = value;
                    if size == 2 {
                        locals[var + 1] = Value::Null;
                    }
                }
                op::RET => return Err(SandboxError::engine("JSR/RET not supported")),
                other => {
                    return Err(SandboxError::engine(format!(
                        "unexpected var op {other:#x}"
                    )))
                }
            }
            Ok(Step::Next)
        }

        Insn::TypeOp { op: o, class } => {
            match *o {
                op::NEW => {
                    vm.ensure_initialized(class, depth)?;
                    let obj = match vm.resolve_class(class) {
                        Some(LoadedClass::Builtin) => natives::new_builtin_object(class),
                        Some(_) => Obj::Instance(Instance {
                            class: class.clone(),
                            fields: FxHashMap::default(),
                        }),
                        None => {
                            return Err(SandboxError::engine(format!(
                                "could not load class {class}"
                            )))
                        }
                    };
                    stack.push(Value::object(obj));
                }
                op::ANEWARRAY => {
                    let len = pop_int(stack)?;
                    let len_usize = usize::try_from(len).map_err(|_| {
                        SandboxError::thrown(
                            "java/lang/NegativeArraySizeException",
                            len.to_string(),
                        )
                    })?;
                    stack.push(Value::object(Obj::Array(ArrayObj::Ref(vec![
                        Value::Null;
                        len_usize
                    ]))));
                }
                op::CHECKCAST => {
                    // The sandbox trusts the bytecode's casts.
                }
                op::INSTANCEOF => {
                    let value = pop(stack)?;
                    let result = match &value {
                        Value::Null => 0,
                        other => i32::from(class_of_object(other) == *class),
                    };
                    stack.push(Value::Int(result));
                }
                other => {
                    return Err(SandboxError::engine(format!(
                        "unexpected type op {other:#x}"
                    )))
                }
            }
            Ok(Step::Next)
        }

        Insn::Field {
            op: o,
            owner,
            name,
            desc,
        } => {
            match *o {
                op::GETSTATIC => {
                    vm.ensure_initialized(owner, depth)?;
                    let value = vm.read_static(owner, name, desc)?;
                    stack.push(value);
                }
                op::PUTSTATIC => {
                    vm.ensure_initialized(owner, depth)?;
                    let value = pop(stack)?;
                    vm.write_static(owner, name, desc, value);
                }
                op::GETFIELD => {
                    let receiver = pop(stack)?;
                    let Value::Ref(r) = &receiver else {
                        return Err(SandboxError::thrown(
                            NULL_POINTER_EXCEPTION,
                            format!("{owner}.{name}"),
                        ));
                    };
                    let value = match &*r.borrow() {
                        Obj::Instance(i) => i.fields.get(name).cloned(),
                        _ => None,
                    };
                    let ty = JvmType::parse(desc)
                        .map_err(|e| SandboxError::engine(e.to_string()))?;
                    stack.push(value.unwrap_or_else(|| Value::default_of(&ty)));
                }
                op::PUTFIELD => {
                    let value = pop(stack)?;
                    let receiver = pop(stack)?;
                    let Value::Ref(r) = &receiver else {
                        return Err(SandboxError::thrown(
                            NULL_POINTER_EXCEPTION,
                            format!("{owner}.{name}"),
                        ));
                    };
                    if let Obj::Instance(i) = &mut *r.borrow_mut() {
                        i.fields.insert(name.clone(), value);
                    };
                }
                other => {
                    return Err(SandboxError::engine(format!(
                        "unexpected field op {other:#x}"
                    )))
                }
            }
            Ok(Step::Next)
        }

        Insn::Method {
            op: o,
            owner,
            name,
            desc,
            ..
        } => {
            let args = pop_args(stack, desc)?;
            let result = match *o {
                op::INVOKESTATIC => call_static(vm, owner, name, desc, args, depth + 1)?,
                op::INVOKEVIRTUAL | op::INVOKEINTERFACE => {
                    let receiver = pop(stack)?;
                    call_instance(vm, receiver, owner, name, desc, args, depth + 1, false)?
                }
                op::INVOKESPECIAL => {
                    let receiver = pop(stack)?;
                    call_instance(vm, receiver, owner, name, desc, args, depth + 1, true)?
                }
                other => {
                    return Err(SandboxError::engine(format!(
                        "unexpected method op {other:#x}"
                    )))
                }
            };
            push_return(stack, desc, result)?;
            Ok(Step::Next)
        }

        Insn::InvokeDynamic { name, .. } => Err(SandboxError::engine(format!(
            "invokedynamic '{name}' cannot be executed in the sandbox"
        ))),

        Insn::Ldc { constant } => {
            let value = match constant {
                LdcConst::Int(v) => Value::Int(*v),
                LdcConst::Long(v) => Value::Long(*v),
                LdcConst::Float(v) => Value::Float(*v),
                LdcConst::Double(v) => Value::Double(*v),
                LdcConst::Str(s) => vm.intern(s),
                LdcConst::Class(name) => Value::object(Obj::Class(name.clone())),
                LdcConst::MethodType(desc) => Value::object(Obj::MethodType(desc.clone())),
                LdcConst::Handle(handle) => Value::object(Obj::MethodHandle(handle_info(handle))),
            };
            stack.push(value);
            Ok(Step::Next)
        }

        Insn::Jump { op: o, target } => {
            let target = resolve(*target)?;
            let jump = match *o {
                op::GOTO => true,
                op::JSR => return Err(SandboxError::engine("JSR/RET not supported")),
                op::IFNULL => pop(stack)?.is_null(),
                op::IFNONNULL => !pop(stack)?.is_null(),
                op::IF_ACMPEQ => {
                    let b = pop(stack)?;
                    let a = pop(stack)?;
                    a.ref_eq(&b)
                }
                op::IF_ACMPNE => {
                    let b = pop(stack)?;
                    let a = pop(stack)?;
                    !a.ref_eq(&b)
                }
                op::IF_ICMPEQ | op::IF_ICMPNE | op::IF_ICMPLT | op::IF_ICMPGE
                | op::IF_ICMPGT | op::IF_ICMPLE => {
                    let b = pop_int(stack)?;
                    let a = pop_int(stack)?;
                    match *o {
                        op::IF_ICMPEQ => a == b,
                        op::IF_ICMPNE => a != b,
                        op::IF_ICMPLT => a < b,
                        op::IF_ICMPGE => a >= b,
                        op::IF_ICMPGT => a > b,
                        _ => a <= b,
                    }
                }
                cond => {
                    let v = pop_int(stack)?;
                    match cond {
                        op::IFEQ => v == 0,
                        op::IFNE => v != 0,
                        op::IFLT => v < 0,
                        op::IFGE => v >= 0,
                        op::IFGT => v > 0,
                        op::IFLE => v <= 0,
                        other => {
                            return Err(SandboxError::engine(format!(
                                "unexpected jump op {other:#x}"
                            )))
                        }
                    }
                }
            };
            Ok(if jump { Step::Jump(target) } else { Step::Next })
        }

        Insn::TableSwitch {
            min,
            max,
            default,
            targets,
        } => {
            let key = pop_int(stack)?;
            let target = if key >= *min && key <= *max {
                targets
                    .get(key.wrapping_sub(*min) as usize)
                    .copied()
                    .unwrap_or(*default)
            } else {
                *default
            };
            Ok(Step::Jump(resolve(target)?))
        }

        Insn::LookupSwitch {
            default,
            keys,
            targets,
        } => {
            let key = pop_int(stack)?;
            let target = keys
                .iter()
                .position(|&k| k == key)
                .and_then(|i| targets.get(i).copied())
                .unwrap_or(*default);
            Ok(Step::Jump(resolve(target)?))
        }

        Insn::Iinc { var, incr } => {
            let var = usize::from(*var);
            let current = locals
                .get(var)
                .and_then(Value::as_int)
                .ok_or_else(|| SandboxError::engine("iinc on non-int local"))?;
            locals[var] = Value::Int(current.wrapping_add(i32::from(*incr)));
            Ok(Step::Next)
        }

        Insn::MultiANewArray { desc, dims } => {
            let mut sizes = Vec::with_capacity(usize::from(*dims));
            for _ in 0..*dims {
                sizes.push(pop_int(stack)?);
            }
            sizes.reverse();
            stack.push(new_multi_array(desc, &sizes)?);
            Ok(Step::Next)
        }
    }
}

fn new_multi_array(desc: &str, sizes: &[i32]) -> Result<Value, SandboxError> {
    let (&len, rest) = sizes
        .split_first()
        .ok_or_else(|| SandboxError::engine("multianewarray without dimensions"))?;
    let len_usize = usize::try_from(len).map_err(|_| {
        SandboxError::thrown("java/lang/NegativeArraySizeException", len.to_string())
    })?;

    let elem_desc = desc
        .strip_prefix('[')
        .ok_or_else(|| SandboxError::engine(format!("bad array descriptor {desc}")))?;
    if rest.is_empty() {
        let ty = JvmType::parse(desc).map_err(|e| SandboxError::engine(e.to_string()))?;
        let JvmType::Array(elem) = ty else {
            return Err(SandboxError::engine(format!("bad array descriptor {desc}")));
        };
        let array = match *elem {
            JvmType::Boolean => ArrayObj::Bool(vec![false; len_usize]),
            JvmType::Byte => ArrayObj::Byte(vec![0; len_usize]),
            JvmType::Char => ArrayObj::Char(vec![0; len_usize]),
            JvmType::Short => ArrayObj::Short(vec![0; len_usize]),
            JvmType::Int => ArrayObj::Int(vec![0; len_usize]),
            JvmType::Long => ArrayObj::Long(vec![0; len_usize]),
            JvmType::Float => ArrayObj::Float(vec![0.0; len_usize]),
            JvmType::Double => ArrayObj::Double(vec![0.0; len_usize]),
            _ => ArrayObj::Ref(vec![Value::Null; len_usize]),
        };
        return Ok(Value::object(Obj::Array(array)));
    }

    let mut elements = Vec::with_capacity(len_usize);
    for _ in 0..len_usize {
        elements.push(new_multi_array(elem_desc, rest)?);
    }
    Ok(Value::object(Obj::Array(ArrayObj::Ref(elements))))
}

fn handle_info(handle: &Handle) -> HandleInfo {
    HandleInfo {
        kind: handle.kind,
        owner: handle.owner.clone(),
        name: handle.name.clone(),
        desc: handle.desc.clone(),
    }
}

#[allow(clippy::too_many_lines)]
fn step_simple(
    vm: &mut Vm,
    o: u8,
    stack: &mut Vec<Value>,
    _depth: usize,
) -> Result<Step, SandboxError> {
    let _ = &vm;
    match o {
        op::NOP => {}
        op::ACONST_NULL => stack.push(Value::Null),
        op::ICONST_M1..=op::ICONST_5 => {
            stack.push(Value::Int(i32::from(o) - i32::from(op::ICONST_0)));
        }
        op::LCONST_0 | op::LCONST_1 => stack.push(Value::Long(i64::from(o - op::LCONST_0))),
        op::FCONST_0 | op::FCONST_1 | op::FCONST_2 => {
            stack.push(Value::Float(f32::from(o - op::FCONST_0)));
        }
        op::DCONST_0 | op::DCONST_1 => stack.push(Value::Double(f64::from(o - op::DCONST_0))),

        op::IALOAD..=op::SALOAD => {
            let index = pop_int(stack)?;
            let array = pop(stack)?;
            let Value::Ref(r) = &array else {
                return Err(SandboxError::thrown(NULL_POINTER_EXCEPTION, "array load"));
            };
            let obj = r.borrow();
            let Obj::Array(arr) = &*obj else {
                return Err(SandboxError::engine("array load on non-array"));
            };
            let i = usize::try_from(index).map_err(|_| array_bounds(index))?;
            let value = match arr {
                ArrayObj::Bool(v) => v.get(i).map(|&b| Value::Int(i32::from(b))),
                ArrayObj::Byte(v) => v.get(i).map(|&b| Value::Int(i32::from(b))),
                ArrayObj::Char(v) => v.get(i).map(|&c| Value::Int(i32::from(c))),
                ArrayObj::Short(v) => v.get(i).map(|&s| Value::Int(i32::from(s))),
                ArrayObj::Int(v) => v.get(i).copied().map(Value::Int),
                ArrayObj::Long(v) => v.get(i).copied().map(Value::Long),
                ArrayObj::Float(v) => v.get(i).copied().map(Value::Float),
                ArrayObj::Double(v) => v.get(i).copied().map(Value::Double),
                ArrayObj::Ref(v) => v.get(i).cloned(),
            };
            stack.push(value.ok_or_else(|| array_bounds(index))?);
        }

        op::IASTORE..=op::SASTORE => {
            let value = pop(stack)?;
            let index = pop_int(stack)?;
            let array = pop(stack)?;
            let Value::Ref(r) = &array else {
                return Err(SandboxError::thrown(NULL_POINTER_EXCEPTION, "array store"));
            };
            let mut obj = r.borrow_mut();
            let Obj::Array(arr) = &mut *obj else {
                return Err(SandboxError::engine("array store on non-array"));
            };
            let i = usize::try_from(index).map_err(|_| array_bounds(index))?;
            if i >= arr.len() {
                return Err(array_bounds(index));
            }
            match (arr, value) {
                (ArrayObj::Bool(v), Value::Int(x)) => v[i] = x != 0,
                (ArrayObj::Byte(v), Value::Int(x)) => v[i] = x as i8,
                (ArrayObj::Char(v), Value::Int(x)) => v[i] = x as u16,
                (ArrayObj::Short(v), Value::Int(x)) => v[i] = x as i16,
                (ArrayObj::Int(v), Value::Int(x)) => v[i] = x,
                (ArrayObj::Long(v), Value::Long(x)) => v[i] = x,
                (ArrayObj::Float(v), Value::Float(x)) => v[i] = x,
                (ArrayObj::Double(v), Value::Double(x)) => v[i] = x,
                (ArrayObj::Ref(v), x) => v[i] = x,
                _ => return Err(SandboxError::engine("array store type mismatch")),
            }
        }

        op::ARRAYLENGTH => {
            let array = pop(stack)?;
            let Value::Ref(r) = &array else {
                return Err(SandboxError::thrown(NULL_POINTER_EXCEPTION, "arraylength"));
            };
            let len = match &*r.borrow() {
                Obj::Array(arr) => arr.len(),
                _ => return Err(SandboxError::engine("arraylength on non-array")),
            };
            stack.push(Value::Int(len as i32));
        }

        op::POP => {
            pop(stack)?;
        }
        op::POP2 => {
            let top = pop(stack)?;
            if top.size() == 1 {
                pop(stack)?;
            }
        }
        op::DUP => {
            let top = pop(stack)?;
            stack.push(top.clone());
            stack.push(top);
        }
        op::DUP_X1 => {
            let v1 = pop(stack)?;
            let v2 = pop(stack)?;
            stack.push(v1.clone());
            stack.push(v2);
            stack.push(v1);
        }
        op::DUP_X2 => {
            let v1 = pop(stack)?;
            let v2 = pop(stack)?;
            if v2.size() == 2 {
                stack.push(v1.clone());
                stack.push(v2);
                stack.push(v1);
            } else {
                let v3 = pop(stack)?;
                stack.push(v1.clone());
                stack.push(v3);
                stack.push(v2);
                stack.push(v1);
            }
        }
        op::DUP2 => {
            let v1 = pop(stack)?;
            if v1.size() == 2 {
                stack.push(v1.clone());
                stack.push(v1);
            } else {
                let v2 = pop(stack)?;
                stack.push(v2.clone());
                stack.push(v1.clone());
                stack.push(v2);
                stack.push(v1);
            }
        }
        op::DUP2_X1 => {
            let v1 = pop(stack)?;
            if v1.size() == 2 {
                let v2 = pop(stack)?;
                stack.push(v1.clone());
                stack.push(v2);
                stack.push(v1);
            } else {
                let v2 = pop(stack)?;
                let v3 = pop(stack)?;
                stack.push(v2.clone());
                stack.push(v1.clone());
                stack.push(v3);
                stack.push(v2);
                stack.push(v1);
            }
        }
        op::DUP2_X2 => {
            let v1 = pop(stack)?;
            if v1.size() == 2 {
                let v2 = pop(stack)?;
                if v2.size() == 2 {
                    stack.push(v1.clone());
                    stack.push(v2);
                    stack.push(v1);
                } else {
                    let v3 = pop(stack)?;
                    stack.push(v1.clone());
                    stack.push(v3);
                    stack.push(v2);
                    stack.push(v1);
                }
            } else {
                let v2 = pop(stack)?;
                let v3 = pop(stack)?;
                if v3.size() == 2 {
                    stack.push(v2.clone());
                    stack.push(v1.clone());
                    stack.push(v3);
                    stack.push(v2);
                    stack.push(v1);
                } else {
                    let v4 = pop(stack)?;
                    stack.push(v2.clone());
                    stack.push(v1.clone());
                    stack.push(v4);
                    stack.push(v3);
                    stack.push(v2);
                    stack.push(v1);
                }
            }
        }
        op::SWAP => {
            let v1 = pop(stack)?;
            let v2 = pop(stack)?;
            stack.push(v1);
            stack.push(v2);
        }

        // Arithmetic.
        op::IADD => int_binop(stack, i32::wrapping_add)?,
        op::ISUB => int_binop(stack, i32::wrapping_sub)?,
        op::IMUL => int_binop(stack, i32::wrapping_mul)?,
        op::IDIV => {
            let b = pop_int(stack)?;
            let a = pop_int(stack)?;
            if b == 0 {
                return Err(arithmetic_exception());
            }
            stack.push(Value::Int(a.wrapping_div(b)));
        }
        op::IREM => {
            let b = pop_int(stack)?;
            let a = pop_int(stack)?;
            if b == 0 {
                return Err(arithmetic_exception());
            }
            stack.push(Value::Int(a.wrapping_rem(b)));
        }
        op::INEG => {
            let a = pop_int(stack)?;
            stack.push(Value::Int(a.wrapping_neg()));
        }
        op::ISHL => int_binop(stack, |a, b| a.wrapping_shl(b as u32 & 31))?,
        op::ISHR => int_binop(stack, |a, b| a.wrapping_shr(b as u32 & 31))?,
        op::IUSHR => int_binop(stack, |a, b| ((a as u32) >> (b as u32 & 31)) as i32)?,
        op::IAND => int_binop(stack, |a, b| a & b)?,
        op::IOR => int_binop(stack, |a, b| a | b)?,
        op::IXOR => int_binop(stack, |a, b| a ^ b)?,

        op::LADD => long_binop(stack, i64::wrapping_add)?,
        op::LSUB => long_binop(stack, i64::wrapping_sub)?,
        op::LMUL => long_binop(stack, i64::wrapping_mul)?,
        op::LDIV => {
            let b = pop_long(stack)?;
            let a = pop_long(stack)?;
            if b == 0 {
                return Err(arithmetic_exception());
            }
            stack.push(Value::Long(a.wrapping_div(b)));
        }
        op::LREM => {
            let b = pop_long(stack)?;
            let a = pop_long(stack)?;
            if b == 0 {
                return Err(arithmetic_exception());
            }
            stack.push(Value::Long(a.wrapping_rem(b)));
        }
        op::LNEG => {
            let a = pop_long(stack)?;
            stack.push(Value::Long(a.wrapping_neg()));
        }
        op::LSHL => long_shift(stack, |a, s| a.wrapping_shl(s))?,
        op::LSHR => long_shift(stack, |a, s| a.wrapping_shr(s))?,
        op::LUSHR => long_shift(stack, |a, s| ((a as u64) >> s) as i64)?,
        op::LAND => long_binop(stack, |a, b| a & b)?,
        op::LOR => long_binop(stack, |a, b| a | b)?,
        op::LXOR => long_binop(stack, |a, b| a ^ b)?,

        op::FADD => float_binop(stack, |a, b| a + b)?,
        op::FSUB => float_binop(stack, |a, b| a - b)?,
        op::FMUL => float_binop(stack, |a, b| a * b)?,
        op::FDIV => float_binop(stack, |a, b| a / b)?,
        op::FREM => float_binop(stack, |a, b| a % b)?,
        op::FNEG => {
            let a = pop_float(stack)?;
            stack.push(Value::Float(-a));
        }
        op::DADD => double_binop(stack, |a, b| a + b)?,
        op::DSUB => double_binop(stack, |a, b| a - b)?,
        op::DMUL => double_binop(stack, |a, b| a * b)?,
        op::DDIV => double_binop(stack, |a, b| a / b)?,
        op::DREM => double_binop(stack, |a, b| a % b)?,
        op::DNEG => {
            let a = pop_double(stack)?;
            stack.push(Value::Double(-a));
        }

        // Conversions.
        op::I2L => {
            let v = pop_int(stack)?;
            stack.push(Value::Long(i64::from(v)));
        }
        op::I2F => {
            let v = pop_int(stack)?;
            stack.push(Value::Float(v as f32));
        }
        op::I2D => {
            let v = pop_int(stack)?;
            stack.push(Value::Double(f64::from(v)));
        }
        op::L2I => {
            let v = pop_long(stack)?;
            stack.push(Value::Int(v as i32));
        }
        op::L2F => {
            let v = pop_long(stack)?;
            stack.push(Value::Float(v as f32));
        }
        op::L2D => {
            let v = pop_long(stack)?;
            stack.push(Value::Double(v as f64));
        }
        op::F2I => {
            let v = pop_float(stack)?;
            stack.push(Value::Int(v as i32));
        }
        op::F2L => {
            let v = pop_float(stack)?;
            stack.push(Value::Long(v as i64));
        }
        op::F2D => {
            let v = pop_float(stack)?;
            stack.push(Value::Double(f64::from(v)));
        }
        op::D2I => {
            let v = pop_double(stack)?;
            stack.push(Value::Int(v as i32));
        }
        op::D2L => {
            let v = pop_double(stack)?;
            stack.push(Value::Long(v as i64));
        }
        op::D2F => {
            let v = pop_double(stack)?;
            stack.push(Value::Float(v as f32));
        }
        op::I2B => {
            let v = pop_int(stack)?;
            stack.push(Value::Int(i32::from(v as i8)));
        }
        op::I2C => {
            let v = pop_int(stack)?;
            stack.push(Value::Int(i32::from(v as u16)));
        }
        op::I2S => {
            let v = pop_int(stack)?;
            stack.push(Value::Int(i32::from(v as i16)));
        }

        op::LCMP => {
            let b = pop_long(stack)?;
            let a = pop_long(stack)?;
            stack.push(Value::Int(a.cmp(&b) as i32));
        }
        op::FCMPL | op::FCMPG => {
            let b = pop_float(stack)?;
            let a = pop_float(stack)?;
            let result = a
                .partial_cmp(&b)
                .map_or_else(|| if o == op::FCMPG { 1 } else { -1 }, |ord| ord as i32);
            stack.push(Value::Int(result));
        }
        op::DCMPL | op::DCMPG => {
            let b = pop_double(stack)?;
            let a = pop_double(stack)?;
            let result = a
                .partial_cmp(&b)
                .map_or_else(|| if o == op::DCMPG { 1 } else { -1 }, |ord| ord as i32);
            stack.push(Value::Int(result));
        }

        op::IRETURN | op::LRETURN | op::FRETURN | op::DRETURN | op::ARETURN => {
            return Ok(Step::Return(pop(stack)?));
        }
        op::RETURN => return Ok(Step::Return(Value::Null)),

        op::ATHROW => {
            let value = pop(stack)?;
            if value.is_null() {
                return Err(SandboxError::thrown(NULL_POINTER_EXCEPTION, "throw null"));
            }
            let class_name = class_of_object(&value);
            let message = value.as_ref_obj().and_then(|r| match &*r.borrow() {
                Obj::Instance(i) => i.fields.get("message").and_then(Value::as_string),
                _ => None,
            });
            return Err(SandboxError::Thrown(ThrownException {
                class_name,
                message,
                object: Some(value),
            }));
        }

        op::MONITORENTER | op::MONITOREXIT => {
            pop(stack)?;
        }

        other => {
            return Err(SandboxError::engine(format!(
                "unsupported opcode {other:#x}"
            )))
        }
    }
    Ok(Step::Next)
}

fn int_binop(stack: &mut Vec<Value>, f: impl Fn(i32, i32) -> i32) -> Result<(), SandboxError> {
    let b = pop_int(stack)?;
    let a = pop_int(stack)?;
    stack.push(Value::Int(f(a, b)));
    Ok(())
}

fn long_binop(stack: &mut Vec<Value>, f: impl Fn(i64, i64) -> i64) -> Result<(), SandboxError> {
    let b = pop_long(stack)?;
    let a = pop_long(stack)?;
    stack.push(Value::Long(f(a, b)));
    Ok(())
}

fn long_shift(stack: &mut Vec<Value>, f: impl Fn(i64, u32) -> i64) -> Result<(), SandboxError> {
    let shift = pop_int(stack)?;
    let a = pop_long(stack)?;
    stack.push(Value::Long(f(a, shift as u32 & 63)));
    Ok(())
}

fn float_binop(stack: &mut Vec<Value>, f: impl Fn(f32, f32) -> f32) -> Result<(), SandboxError> {
    let b = pop_float(stack)?;
    let a = pop_float(stack)?;
    stack.push(Value::Float(f(a, b)));
    Ok(())
}

fn double_binop(stack: &mut Vec<Value>, f: impl Fn(f64, f64) -> f64) -> Result<(), SandboxError> {
    let b = pop_double(stack)?;
    let a = pop_double(stack)?;
    stack.push(Value::Double(f(a, b)));
    Ok(())
}

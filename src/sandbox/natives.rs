//! The builtin runtime classes and dangerous-API stubs.
//!
//! Every class the sandbox delegates to the "ambient runtime" is modeled
//! here natively. The surface is deliberately small: strings and string
//! builders, boxed numerics, `System.arraycopy`, the DES cipher stack the
//! ZKM runtime requests, and the method-handle plumbing bootstrap methods
//! need. Anything with process-wide side effects - `System.exit`,
//! `Runtime.exec`, property access, timers, threads - is rerouted to an
//! inert implementation that returns a typed default, so hostile
//! initializers can link and run without touching the host.
//!
//! Dispatch contract: the `invoke_*` functions return `Ok(None)` when a
//! method is not specifically modeled; the interpreter then substitutes
//! the return type's default value (the stub policy applied to method
//! granularity).

use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use des::Des;

use crate::ir::HandleKind;
use crate::sandbox::{
    value::{string_of_value, ArrayObj, HandleInfo, Instance, Obj, ObjRef, Value},
    vm::Vm,
    SandboxError, BAD_PADDING_EXCEPTION, NULL_POINTER_EXCEPTION,
};

type DesCbcDec = cbc::Decryptor<Des>;
type DesCbcEnc = cbc::Encryptor<Des>;

/// Classes resolved against the ambient runtime instead of being stubbed.
const BUILTIN_CLASSES: &[&str] = &[
    "java/lang/Object",
    "java/lang/String",
    "java/lang/StringBuilder",
    "java/lang/StringBuffer",
    "java/lang/CharSequence",
    "java/lang/Class",
    "java/lang/ClassLoader",
    "java/lang/System",
    "java/lang/Runtime",
    "java/lang/Thread",
    "java/lang/Math",
    "java/lang/StrictMath",
    "java/lang/Number",
    "java/lang/Integer",
    "java/lang/Long",
    "java/lang/Short",
    "java/lang/Byte",
    "java/lang/Character",
    "java/lang/Boolean",
    "java/lang/Float",
    "java/lang/Double",
    "java/util/Arrays",
    "java/util/Objects",
    "java/io/PrintStream",
    "javax/crypto/Cipher",
    "javax/crypto/SecretKeyFactory",
    "javax/crypto/spec/SecretKeySpec",
    "javax/crypto/spec/IvParameterSpec",
    "javax/crypto/spec/DESKeySpec",
    "java/lang/invoke/MethodHandles",
    "java/lang/invoke/MethodHandles$Lookup",
    "java/lang/invoke/MethodHandle",
    "java/lang/invoke/MethodType",
    "java/lang/invoke/CallSite",
    "java/lang/invoke/ConstantCallSite",
    "java/lang/invoke/MutableCallSite",
];

/// Builtin throwables. User classes extending these still work: the
/// interpreter throws whatever instance it is given.
const BUILTIN_THROWABLES: &[&str] = &[
    "java/lang/Throwable",
    "java/lang/Exception",
    "java/lang/RuntimeException",
    "java/lang/Error",
    "java/lang/NullPointerException",
    "java/lang/IllegalStateException",
    "java/lang/IllegalArgumentException",
    "java/lang/IllegalAccessException",
    "java/lang/ArithmeticException",
    "java/lang/ArrayIndexOutOfBoundsException",
    "java/lang/StringIndexOutOfBoundsException",
    "java/lang/IndexOutOfBoundsException",
    "java/lang/ClassCastException",
    "java/lang/ClassNotFoundException",
    "java/lang/NoSuchMethodException",
    "java/lang/NoSuchFieldException",
    "java/lang/NoSuchMethodError",
    "java/lang/NoSuchFieldError",
    "java/lang/NoClassDefFoundError",
    "java/lang/ExceptionInInitializerError",
    "java/lang/BootstrapMethodError",
    "java/lang/IncompatibleClassChangeError",
    "java/lang/SecurityException",
    "java/lang/NegativeArraySizeException",
    "java/io/IOException",
    "java/security/NoSuchAlgorithmException",
    "java/security/InvalidKeyException",
    "javax/crypto/BadPaddingException",
    "javax/crypto/IllegalBlockSizeException",
];

/// Returns `true` if `name` is on the runtime allow-list.
pub(crate) fn is_builtin_class(name: &str) -> bool {
    BUILTIN_CLASSES.contains(&name) || BUILTIN_THROWABLES.contains(&name)
}

/// Allocates the uninitialized object `NEW` produces for a builtin class.
pub(crate) fn new_builtin_object(class: &str) -> Obj {
    match class {
        "java/lang/StringBuilder" | "java/lang/StringBuffer" => Obj::Builder(String::new()),
        "java/lang/String" => Obj::Str(String::new()),
        "java/lang/invoke/MutableCallSite" | "java/lang/invoke/ConstantCallSite" => Obj::CallSite {
            method_type: String::new(),
            target: None,
        },
        _ => Obj::Instance(Instance {
            class: class.to_string(),
            fields: rustc_hash::FxHashMap::default(),
        }),
    }
}

/// Static fields of builtin classes.
pub(crate) fn static_field(class: &str, name: &str) -> Option<Value> {
    match (class, name) {
        ("javax/crypto/Cipher", "ENCRYPT_MODE") => Some(Value::Int(1)),
        ("javax/crypto/Cipher", "DECRYPT_MODE") => Some(Value::Int(2)),
        ("javax/crypto/Cipher", "WRAP_MODE") => Some(Value::Int(3)),
        ("javax/crypto/Cipher", "UNWRAP_MODE") => Some(Value::Int(4)),
        ("java/lang/System", "out" | "err") => Some(Value::object(Obj::Instance(Instance {
            class: "java/io/PrintStream".into(),
            fields: rustc_hash::FxHashMap::default(),
        }))),
        ("java/lang/Integer", "MAX_VALUE") => Some(Value::Int(i32::MAX)),
        ("java/lang/Integer", "MIN_VALUE") => Some(Value::Int(i32::MIN)),
        ("java/lang/Long", "MAX_VALUE") => Some(Value::Long(i64::MAX)),
        ("java/lang/Long", "MIN_VALUE") => Some(Value::Long(i64::MIN)),
        ("java/lang/Boolean", "TRUE") => Some(boxed("java/lang/Boolean", Value::Int(1))),
        ("java/lang/Boolean", "FALSE") => Some(boxed("java/lang/Boolean", Value::Int(0))),
        _ => None,
    }
}

fn boxed(class: &str, value: Value) -> Value {
    Value::object(Obj::Boxed {
        class: class.into(),
        value,
    })
}

fn npe() -> SandboxError {
    SandboxError::thrown(NULL_POINTER_EXCEPTION, "null")
}

fn arg(args: &[Value], i: usize) -> Result<&Value, SandboxError> {
    args.get(i)
        .ok_or_else(|| SandboxError::engine("missing native argument"))
}

fn arg_int(args: &[Value], i: usize) -> Result<i32, SandboxError> {
    arg(args, i)?
        .as_int()
        .ok_or_else(|| SandboxError::engine("expected int argument"))
}

fn arg_long(args: &[Value], i: usize) -> Result<i64, SandboxError> {
    arg(args, i)?
        .as_long()
        .ok_or_else(|| SandboxError::engine("expected long argument"))
}

fn arg_str(args: &[Value], i: usize) -> Result<String, SandboxError> {
    arg(args, i)?.as_string().ok_or_else(npe)
}

/// Reads a `byte[]` argument into host bytes.
fn arg_bytes(args: &[Value], i: usize) -> Result<Vec<u8>, SandboxError> {
    bytes_of(arg(args, i)?).ok_or_else(npe)
}

fn bytes_of(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Ref(r) => match &*r.borrow() {
            Obj::Array(ArrayObj::Byte(bytes)) => {
                Some(bytes.iter().map(|&b| b as u8).collect())
            }
            _ => None,
        },
        _ => None,
    }
}

fn byte_array(bytes: &[u8]) -> Value {
    Value::byte_array(bytes.iter().map(|&b| b as i8).collect())
}

/// Field descriptor of a `java/lang/Class` token.
fn descriptor_of_class_token(token: &str) -> String {
    match token {
        "boolean" => "Z".into(),
        "byte" => "B".into(),
        "char" => "C".into(),
        "short" => "S".into(),
        "int" => "I".into(),
        "long" => "J".into(),
        "float" => "F".into(),
        "double" => "D".into(),
        "void" => "V".into(),
        array if array.starts_with('[') => array.into(),
        object => format!("L{object};"),
    }
}

fn class_token_of(value: &Value) -> Result<String, SandboxError> {
    match value {
        Value::Ref(r) => match &*r.borrow() {
            Obj::Class(name) => Ok(name.clone()),
            _ => Err(SandboxError::engine("expected Class argument")),
        },
        _ => Err(npe()),
    }
}

fn method_type_of(value: &Value) -> Result<String, SandboxError> {
    match value {
        Value::Ref(r) => match &*r.borrow() {
            Obj::MethodType(desc) => Ok(desc.clone()),
            _ => Err(SandboxError::engine("expected MethodType argument")),
        },
        _ => Err(npe()),
    }
}

// ---------------------------------------------------------------------------
// Static dispatch
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_lines)]
pub(crate) fn invoke_static(
    vm: &mut Vm,
    owner: &str,
    name: &str,
    desc: &str,
    args: &[Value],
) -> Result<Option<Value>, SandboxError> {
    let result = match (owner, name) {
        // --- java/lang/System: the dangerous-API poster child ---
        ("java/lang/System", "arraycopy") => {
            arraycopy(args)?;
            Value::Null
        }
        ("java/lang/System", "exit" | "gc" | "load" | "loadLibrary" | "setProperty") => Value::Null,
        ("java/lang/System", "currentTimeMillis" | "nanoTime") => Value::Long(0),
        ("java/lang/System", "identityHashCode") => Value::Int(0),
        ("java/lang/System", "getProperty" | "getenv" | "getSecurityManager" | "console") => {
            Value::Null
        }
        ("java/lang/System", "lineSeparator") => vm.intern("\n"),

        ("java/lang/Runtime", "getRuntime") => Value::object(new_builtin_object("java/lang/Runtime")),
        ("java/lang/Thread", "currentThread") => {
            Value::object(new_builtin_object("java/lang/Thread"))
        }
        ("java/lang/Thread", "sleep" | "yield" | "onSpinWait") => Value::Null,

        // --- java/lang/Math ---
        ("java/lang/Math" | "java/lang/StrictMath", _) => match (name, desc) {
            ("abs", "(I)I") => Value::Int(arg_int(args, 0)?.wrapping_abs()),
            ("abs", "(J)J") => Value::Long(arg_long(args, 0)?.wrapping_abs()),
            ("min", "(II)I") => Value::Int(arg_int(args, 0)?.min(arg_int(args, 1)?)),
            ("max", "(II)I") => Value::Int(arg_int(args, 0)?.max(arg_int(args, 1)?)),
            ("min", "(JJ)J") => Value::Long(arg_long(args, 0)?.min(arg_long(args, 1)?)),
            ("max", "(JJ)J") => Value::Long(arg_long(args, 0)?.max(arg_long(args, 1)?)),
            ("floorMod", "(II)I") => {
                let (a, b) = (arg_int(args, 0)?, arg_int(args, 1)?);
                if b == 0 {
                    return Err(SandboxError::thrown(
                        "java/lang/ArithmeticException",
                        "/ by zero",
                    ));
                }
                Value::Int(a.rem_euclid(b))
            }
            _ => return Ok(None),
        },

        // --- string factories ---
        ("java/lang/String", "valueOf") => match args.first() {
            Some(Value::Ref(r)) => {
                if let Obj::Array(ArrayObj::Char(chars)) = &*r.borrow() {
                    vm.intern(&String::from_utf16_lossy(chars))
                } else {
                    let rendered = string_of_value(&args[0]);
                    vm.intern(&rendered)
                }
            }
            Some(other) => {
                let rendered = string_of_value(other);
                vm.intern(&rendered)
            }
            None => return Ok(None),
        },

        // --- boxed numerics ---
        ("java/lang/Integer", "valueOf") if desc.starts_with("(I") => {
            boxed("java/lang/Integer", Value::Int(arg_int(args, 0)?))
        }
        ("java/lang/Integer", "parseInt") => {
            let s = arg_str(args, 0)?;
            let radix = if desc == "(Ljava/lang/String;I)I" {
                arg_int(args, 1)? as u32
            } else {
                10
            };
            match i64::from_str_radix(s.trim(), radix) {
                Ok(v) if i32::try_from(v).is_ok() => Value::Int(v as i32),
                _ => {
                    return Err(SandboxError::thrown(
                        "java/lang/NumberFormatException",
                        format!("For input string: \"{s}\""),
                    ))
                }
            }
        }
        ("java/lang/Integer", "toString") => vm.intern(&arg_int(args, 0)?.to_string()),
        ("java/lang/Integer", "toHexString") => {
            vm.intern(&format!("{:x}", arg_int(args, 0)? as u32))
        }
        ("java/lang/Integer", "rotateLeft") => {
            Value::Int(arg_int(args, 0)?.rotate_left(arg_int(args, 1)? as u32 & 31))
        }
        ("java/lang/Integer", "rotateRight") => {
            Value::Int(arg_int(args, 0)?.rotate_right(arg_int(args, 1)? as u32 & 31))
        }
        ("java/lang/Integer", "reverse") => Value::Int(arg_int(args, 0)?.reverse_bits()),
        ("java/lang/Integer", "bitCount") => Value::Int(arg_int(args, 0)?.count_ones() as i32),

        ("java/lang/Long", "valueOf") if desc.starts_with("(J") => {
            boxed("java/lang/Long", Value::Long(arg_long(args, 0)?))
        }
        ("java/lang/Long", "parseLong") => {
            let s = arg_str(args, 0)?;
            match s.trim().parse::<i64>() {
                Ok(v) => Value::Long(v),
                Err(_) => {
                    return Err(SandboxError::thrown(
                        "java/lang/NumberFormatException",
                        format!("For input string: \"{s}\""),
                    ))
                }
            }
        }
        ("java/lang/Long", "toString") => vm.intern(&arg_long(args, 0)?.to_string()),
        ("java/lang/Long", "toHexString") => {
            vm.intern(&format!("{:x}", arg_long(args, 0)? as u64))
        }
        ("java/lang/Long", "rotateLeft") => {
            Value::Long(arg_long(args, 0)?.rotate_left(arg_int(args, 1)? as u32 & 63))
        }
        ("java/lang/Long", "rotateRight") => {
            Value::Long(arg_long(args, 0)?.rotate_right(arg_int(args, 1)? as u32 & 63))
        }
        ("java/lang/Long", "reverse") => Value::Long(arg_long(args, 0)?.reverse_bits()),
        ("java/lang/Long", "bitCount") => Value::Int(arg_long(args, 0)?.count_ones() as i32),

        ("java/lang/Character", "valueOf") => {
            boxed("java/lang/Character", Value::Int(arg_int(args, 0)?))
        }
        ("java/lang/Boolean", "valueOf") if desc.starts_with("(Z") => {
            boxed("java/lang/Boolean", Value::Int(arg_int(args, 0)?))
        }
        ("java/lang/Byte", "valueOf") if desc.starts_with("(B") => {
            boxed("java/lang/Byte", Value::Int(arg_int(args, 0)?))
        }
        ("java/lang/Short", "valueOf") if desc.starts_with("(S") => {
            boxed("java/lang/Short", Value::Int(arg_int(args, 0)?))
        }

        ("java/lang/Float", "intBitsToFloat") => {
            Value::Float(f32::from_bits(arg_int(args, 0)? as u32))
        }
        ("java/lang/Float", "floatToIntBits" | "floatToRawIntBits") => match arg(args, 0)? {
            Value::Float(f) => Value::Int(f.to_bits() as i32),
            _ => return Err(SandboxError::engine("expected float argument")),
        },
        ("java/lang/Double", "longBitsToDouble") => {
            Value::Double(f64::from_bits(arg_long(args, 0)? as u64))
        }
        ("java/lang/Double", "doubleToLongBits" | "doubleToRawLongBits") => match arg(args, 0)? {
            Value::Double(d) => Value::Long(d.to_bits() as i64),
            _ => return Err(SandboxError::engine("expected double argument")),
        },

        // --- java/util ---
        ("java/util/Arrays", "copyOf" | "copyOfRange") => array_copy_of(name, args)?,
        ("java/util/Objects", "requireNonNull") => {
            let v = arg(args, 0)?;
            if v.is_null() {
                return Err(npe());
            }
            v.clone()
        }

        ("java/lang/Class", "forName") => {
            let internal = arg_str(args, 0)?.replace('.', "/");
            Value::object(Obj::Class(internal))
        }
        ("java/lang/ClassLoader", "getSystemClassLoader") => {
            Value::object(new_builtin_object("java/lang/ClassLoader"))
        }

        // --- method-handle plumbing ---
        ("java/lang/invoke/MethodHandles", "lookup" | "publicLookup") => {
            Value::object(Obj::Lookup { trusted: false })
        }
        ("java/lang/invoke/MethodType", "fromMethodDescriptorString") => {
            Value::object(Obj::MethodType(arg_str(args, 0)?))
        }
        ("java/lang/invoke/MethodType", "methodType") => method_type_factory(args)?,

        // --- javax/crypto ---
        ("javax/crypto/Cipher", "getInstance") => {
            let transformation = arg_str(args, 0)?;
            if !matches!(transformation.as_str(), "DES" | "DES/CBC/PKCS5Padding") {
                return Err(SandboxError::thrown(
                    "java/security/NoSuchAlgorithmException",
                    transformation,
                ));
            }
            let mut instance = Instance {
                class: "javax/crypto/Cipher".into(),
                fields: rustc_hash::FxHashMap::default(),
            };
            instance
                .fields
                .insert("transformation".into(), Value::string(transformation));
            Value::object(Obj::Instance(instance))
        }
        ("javax/crypto/SecretKeyFactory", "getInstance") => {
            Value::object(new_builtin_object("javax/crypto/SecretKeyFactory"))
        }

        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// `MethodType.methodType(Class)` / `methodType(Class, Class[])`.
fn method_type_factory(args: &[Value]) -> Result<Value, SandboxError> {
    let ret = descriptor_of_class_token(&class_token_of(arg(args, 0)?)?);
    let mut params = String::new();
    if let Some(Value::Ref(r)) = args.get(1) {
        match &*r.borrow() {
            Obj::Array(ArrayObj::Ref(classes)) => {
                for class in classes {
                    params.push_str(&descriptor_of_class_token(&class_token_of(class)?));
                }
            }
            Obj::Class(token) => params.push_str(&descriptor_of_class_token(token)),
            _ => {}
        }
    }
    Ok(Value::object(Obj::MethodType(format!("({params}){ret}"))))
}

fn arraycopy(args: &[Value]) -> Result<(), SandboxError> {
    let src = arg(args, 0)?.as_ref_obj().ok_or_else(npe)?.clone();
    let src_pos = usize::try_from(arg_int(args, 1)?).map_err(|_| bounds_error(-1))?;
    let dst = arg(args, 2)?.as_ref_obj().ok_or_else(npe)?.clone();
    let dst_pos = usize::try_from(arg_int(args, 3)?).map_err(|_| bounds_error(-1))?;
    let len = usize::try_from(arg_int(args, 4)?).map_err(|_| bounds_error(-1))?;

    // Copy through a snapshot so overlapping self-copies behave.
    let slice = {
        let src_obj = src.borrow();
        let Obj::Array(src_arr) = &*src_obj else {
            return Err(SandboxError::thrown(
                "java/lang/ArrayStoreException",
                "source is not an array",
            ));
        };
        if src_pos + len > src_arr.len() {
            return Err(bounds_error((src_pos + len) as i64));
        }
        src_arr.clone()
    };

    let mut dst_obj = dst.borrow_mut();
    let Obj::Array(dst_arr) = &mut *dst_obj else {
        return Err(SandboxError::thrown(
            "java/lang/ArrayStoreException",
            "destination is not an array",
        ));
    };
    if dst_pos + len > dst_arr.len() {
        return Err(bounds_error((dst_pos + len) as i64));
    }
    match (slice, dst_arr) {
        (ArrayObj::Byte(s), ArrayObj::Byte(d)) => {
            d[dst_pos..dst_pos + len].copy_from_slice(&s[src_pos..src_pos + len]);
        }
        (ArrayObj::Char(s), ArrayObj::Char(d)) => {
            d[dst_pos..dst_pos + len].copy_from_slice(&s[src_pos..src_pos + len]);
        }
        (ArrayObj::Int(s), ArrayObj::Int(d)) => {
            d[dst_pos..dst_pos + len].copy_from_slice(&s[src_pos..src_pos + len]);
        }
        (ArrayObj::Long(s), ArrayObj::Long(d)) => {
            d[dst_pos..dst_pos + len].copy_from_slice(&s[src_pos..src_pos + len]);
        }
        (ArrayObj::Ref(s), ArrayObj::Ref(d)) => {
            d[dst_pos..dst_pos + len].clone_from_slice(&s[src_pos..src_pos + len]);
        }
        _ => {
            return Err(SandboxError::thrown(
                "java/lang/ArrayStoreException",
                "incompatible array types",
            ))
        }
    }
    Ok(())
}

fn bounds_error(index: i64) -> SandboxError {
    SandboxError::thrown(
        "java/lang/ArrayIndexOutOfBoundsException",
        format!("Index {index}"),
    )
}

fn array_copy_of(name: &str, args: &[Value]) -> Result<Value, SandboxError> {
    let src = arg(args, 0)?.as_ref_obj().ok_or_else(npe)?.clone();
    let src_obj = src.borrow();
    let Obj::Array(arr) = &*src_obj else {
        return Err(SandboxError::engine("Arrays.copyOf on non-array"));
    };
    let (from, to) = if name == "copyOfRange" {
        (
            usize::try_from(arg_int(args, 1)?).map_err(|_| bounds_error(-1))?,
            usize::try_from(arg_int(args, 2)?).map_err(|_| bounds_error(-1))?,
        )
    } else {
        (
            0,
            usize::try_from(arg_int(args, 1)?).map_err(|_| bounds_error(-1))?,
        )
    };
    if from > to {
        return Err(SandboxError::thrown(
            "java/lang/IllegalArgumentException",
            format!("{from} > {to}"),
        ));
    }

    fn resized<T: Clone + Default>(src: &[T], from: usize, to: usize) -> Vec<T> {
        let mut out = vec![T::default(); to - from];
        let available = src.len().saturating_sub(from);
        let n = available.min(to - from);
        out[..n].clone_from_slice(&src[from..from + n]);
        out
    }

    let copied = match arr {
        ArrayObj::Bool(v) => ArrayObj::Bool(resized(v, from, to)),
        ArrayObj::Byte(v) => ArrayObj::Byte(resized(v, from, to)),
        ArrayObj::Char(v) => ArrayObj::Char(resized(v, from, to)),
        ArrayObj::Short(v) => ArrayObj::Short(resized(v, from, to)),
        ArrayObj::Int(v) => ArrayObj::Int(resized(v, from, to)),
        ArrayObj::Long(v) => ArrayObj::Long(resized(v, from, to)),
        ArrayObj::Float(v) => ArrayObj::Float(resized(v, from, to)),
        ArrayObj::Double(v) => ArrayObj::Double(resized(v, from, to)),
        ArrayObj::Ref(v) => {
            let mut out = vec![Value::Null; to - from];
            let available = v.len().saturating_sub(from);
            let n = available.min(to - from);
            out[..n].clone_from_slice(&v[from..from + n]);
            ArrayObj::Ref(out)
        }
    };
    Ok(Value::object(Obj::Array(copied)))
}

// ---------------------------------------------------------------------------
// Instance dispatch
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_lines)]
pub(crate) fn invoke_instance(
    vm: &mut Vm,
    receiver: &ObjRef,
    name: &str,
    desc: &str,
    args: &[Value],
) -> Result<Option<Value>, SandboxError> {
    // Universal Object methods first; concrete kinds may override below.
    let kind_result = {
        let obj = receiver.borrow();
        match &*obj {
            Obj::Str(s) => string_method(vm, s, name, desc, args)?,
            Obj::Builder(_) => None, // handled below, needs borrow_mut
            Obj::Boxed { value, .. } => boxed_method(value, name)?,
            Obj::Class(token) => class_method(vm, token, name)?,
            Obj::MethodType(mt) => method_type_method(vm, mt, name)?,
            Obj::Lookup { trusted } => lookup_method(*trusted, name, args)?,
            Obj::MethodHandle(info) => match name {
                "asType" | "bindTo" => Some(Value::Ref(receiver.clone())),
                "type" => Some(Value::object(Obj::MethodType(info.desc.clone()))),
                _ => None,
            },
            Obj::Array(arr) => match name {
                "clone" => Some(Value::object(Obj::Array(arr.clone()))),
                _ => None,
            },
            Obj::CallSite { .. } | Obj::Instance(_) => None,
        }
    };
    if let Some(result) = kind_result {
        return Ok(Some(result));
    }

    // Mutating receivers take a fresh borrow.
    {
        let mut obj = receiver.borrow_mut();
        match &mut *obj {
            Obj::Builder(content) => {
                if let Some(result) = builder_method(receiver, content, name, desc, args)? {
                    return Ok(Some(result));
                }
            }
            Obj::CallSite {
                method_type,
                target,
            } => {
                if let Some(result) = call_site_method(method_type, target, name, args)? {
                    return Ok(Some(result));
                }
            }
            Obj::Str(content) => {
                // String constructors initialize the freshly NEW'd object.
                if name == "<init>" {
                    *content = string_ctor_value(desc, args)?;
                    return Ok(Some(Value::Null));
                }
            }
            _ => {}
        }
    }

    let instance_class = match &*receiver.borrow() {
        Obj::Instance(i) => Some(i.class.clone()),
        _ => None,
    };
    if let Some(class) = instance_class {
        return instance_method(vm, receiver, &class, name, desc, args);
    }
    Ok(None)
}

fn string_ctor_value(desc: &str, args: &[Value]) -> Result<String, SandboxError> {
    match desc {
        "()V" => Ok(String::new()),
        "(Ljava/lang/String;)V" => arg_str(args, 0),
        "([C)V" => match &*arg(args, 0)?.as_ref_obj().ok_or_else(npe)?.borrow() {
            Obj::Array(ArrayObj::Char(chars)) => Ok(String::from_utf16_lossy(chars)),
            _ => Err(SandboxError::engine("String([C]) on non-char array")),
        },
        "([CII)V" => {
            let offset = usize::try_from(arg_int(args, 1)?).map_err(|_| bounds_error(-1))?;
            let count = usize::try_from(arg_int(args, 2)?).map_err(|_| bounds_error(-1))?;
            match &*arg(args, 0)?.as_ref_obj().ok_or_else(npe)?.borrow() {
                Obj::Array(ArrayObj::Char(chars)) if offset + count <= chars.len() => {
                    Ok(String::from_utf16_lossy(&chars[offset..offset + count]))
                }
                Obj::Array(ArrayObj::Char(_)) => Err(bounds_error((offset + count) as i64)),
                _ => Err(SandboxError::engine("String([CII]) on non-char array")),
            }
        }
        "([B)V" => Ok(String::from_utf8_lossy(&arg_bytes(args, 0)?).into_owned()),
        _ => Ok(String::new()),
    }
}

#[allow(clippy::too_many_lines)]
fn string_method(
    vm: &mut Vm,
    s: &str,
    name: &str,
    desc: &str,
    args: &[Value],
) -> Result<Option<Value>, SandboxError> {
    let utf16: Vec<u16> = s.encode_utf16().collect();
    let result = match (name, desc) {
        ("length", _) => Value::Int(utf16.len() as i32),
        ("isEmpty", _) => Value::Int(i32::from(s.is_empty())),
        ("hashCode", _) => Value::Int(super::value::java_string_hash(s)),
        ("charAt", _) => {
            let i = arg_int(args, 0)?;
            match usize::try_from(i).ok().and_then(|i| utf16.get(i)) {
                Some(&c) => Value::Int(i32::from(c)),
                None => {
                    return Err(SandboxError::thrown(
                        "java/lang/StringIndexOutOfBoundsException",
                        format!("index {i}"),
                    ))
                }
            }
        }
        ("toCharArray", _) => Value::object(Obj::Array(ArrayObj::Char(utf16))),
        ("getBytes", "()[B") => byte_array(s.as_bytes()),
        ("equals", _) => Value::Int(i32::from(
            arg(args, 0)?.as_string().as_deref() == Some(s),
        )),
        ("equalsIgnoreCase", _) => Value::Int(i32::from(
            arg(args, 0)?
                .as_string()
                .is_some_and(|o| o.eq_ignore_ascii_case(s)),
        )),
        ("concat", _) => vm.intern(&format!("{s}{}", arg_str(args, 0)?)),
        ("substring", "(I)Ljava/lang/String;") => {
            let from = usize::try_from(arg_int(args, 0)?).map_err(|_| bounds_error(-1))?;
            if from > utf16.len() {
                return Err(bounds_error(from as i64));
            }
            vm.intern(&String::from_utf16_lossy(&utf16[from..]))
        }
        ("substring", "(II)Ljava/lang/String;") => {
            let from = usize::try_from(arg_int(args, 0)?).map_err(|_| bounds_error(-1))?;
            let to = usize::try_from(arg_int(args, 1)?).map_err(|_| bounds_error(-1))?;
            if from > to || to > utf16.len() {
                return Err(bounds_error(to as i64));
            }
            vm.intern(&String::from_utf16_lossy(&utf16[from..to]))
        }
        ("indexOf", "(I)I") => {
            let c = arg_int(args, 0)? as u16;
            Value::Int(utf16.iter().position(|&u| u == c).map_or(-1, |p| p as i32))
        }
        ("indexOf", "(Ljava/lang/String;)I") => {
            let needle = arg_str(args, 0)?;
            Value::Int(s.find(&needle).map_or(-1, |byte| {
                s[..byte].encode_utf16().count() as i32
            }))
        }
        ("replace", "(CC)Ljava/lang/String;") => {
            let from = arg_int(args, 0)? as u16;
            let to = arg_int(args, 1)? as u16;
            let replaced: Vec<u16> = utf16
                .iter()
                .map(|&u| if u == from { to } else { u })
                .collect();
            vm.intern(&String::from_utf16_lossy(&replaced))
        }
        ("trim", _) => vm.intern(s.trim()),
        ("toLowerCase", "()Ljava/lang/String;") => vm.intern(&s.to_lowercase()),
        ("toUpperCase", "()Ljava/lang/String;") => vm.intern(&s.to_uppercase()),
        ("startsWith", "(Ljava/lang/String;)Z") => {
            Value::Int(i32::from(s.starts_with(&arg_str(args, 0)?)))
        }
        ("endsWith", _) => Value::Int(i32::from(s.ends_with(&arg_str(args, 0)?))),
        ("toString", _) => vm.intern(s),
        ("intern", _) => vm.intern(s),
        ("compareTo", _) => {
            let other = arg_str(args, 0)?;
            Value::Int(match s.cmp(other.as_str()) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            })
        }
        _ => return Ok(None),
    };
    Ok(Some(result))
}

fn builder_method(
    receiver: &ObjRef,
    content: &mut String,
    name: &str,
    desc: &str,
    args: &[Value],
) -> Result<Option<Value>, SandboxError> {
    let result = match name {
        "<init>" => {
            if desc == "(Ljava/lang/String;)V" {
                *content = arg_str(args, 0)?;
            }
            Value::Null
        }
        "append" => {
            match args.first() {
                Some(Value::Int(v)) if desc.starts_with("(C") => {
                    if let Some(c) = char::from_u32(*v as u32) {
                        content.push(c);
                    }
                }
                Some(Value::Int(v)) if desc.starts_with("(Z") => {
                    content.push_str(if *v == 0 { "false" } else { "true" });
                }
                // Appending the builder to itself would re-enter the
                // receiver borrow; render it from the already-borrowed
                // contents instead.
                Some(Value::Ref(r)) if std::rc::Rc::ptr_eq(r, receiver) => {
                    let copy = content.clone();
                    content.push_str(&copy);
                }
                Some(v) => content.push_str(&string_of_value(v)),
                None => {}
            }
            Value::Ref(receiver.clone())
        }
        "toString" => Value::string(content.clone()),
        "length" => Value::Int(content.encode_utf16().count() as i32),
        "reverse" => {
            let reversed: Vec<u16> = content.encode_utf16().collect();
            *content = String::from_utf16_lossy(&reversed.into_iter().rev().collect::<Vec<_>>());
            Value::Ref(receiver.clone())
        }
        "setLength" => {
            let n = usize::try_from(arg_int(args, 0)?).unwrap_or(0);
            let mut units: Vec<u16> = content.encode_utf16().collect();
            units.resize(n, 0);
            *content = String::from_utf16_lossy(&units);
            Value::Null
        }
        "charAt" => {
            let i = arg_int(args, 0)?;
            let units: Vec<u16> = content.encode_utf16().collect();
            match usize::try_from(i).ok().and_then(|i| units.get(i)) {
                Some(&c) => Value::Int(i32::from(c)),
                None => return Err(bounds_error(i64::from(i))),
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(result))
}

fn boxed_method(inner: &Value, name: &str) -> Result<Option<Value>, SandboxError> {
    let result = match name {
        "intValue" | "charValue" | "booleanValue" | "byteValue" | "shortValue" => match inner {
            Value::Int(v) => Value::Int(*v),
            Value::Long(v) => Value::Int(*v as i32),
            _ => return Ok(None),
        },
        "longValue" => match inner {
            Value::Int(v) => Value::Long(i64::from(*v)),
            Value::Long(v) => Value::Long(*v),
            _ => return Ok(None),
        },
        "floatValue" => match inner {
            Value::Int(v) => Value::Float(*v as f32),
            Value::Long(v) => Value::Float(*v as f32),
            Value::Float(v) => Value::Float(*v),
            _ => return Ok(None),
        },
        "doubleValue" => match inner {
            Value::Int(v) => Value::Double(f64::from(*v)),
            Value::Long(v) => Value::Double(*v as f64),
            Value::Double(v) => Value::Double(*v),
            _ => return Ok(None),
        },
        "hashCode" => match inner {
            Value::Int(v) => Value::Int(*v),
            Value::Long(v) => Value::Int((*v ^ (*v >> 32)) as i32),
            _ => return Ok(None),
        },
        _ => return Ok(None),
    };
    Ok(Some(result))
}

fn class_method(vm: &mut Vm, token: &str, name: &str) -> Result<Option<Value>, SandboxError> {
    let result = match name {
        "getName" => vm.intern(&token.replace('/', ".")),
        "getSimpleName" => {
            let simple = token.rsplit('/').next().unwrap_or(token);
            vm.intern(simple)
        }
        "getClassLoader" | "getComponentType" | "getSuperclass" => Value::Null,
        "isPrimitive" => Value::Int(i32::from(matches!(
            token,
            "boolean" | "byte" | "char" | "short" | "int" | "long" | "float" | "double" | "void"
        ))),
        "isArray" => Value::Int(i32::from(token.starts_with('['))),
        "desiredAssertionStatus" => Value::Int(0),
        "hashCode" => Value::Int(super::value::java_string_hash(token)),
        _ => return Ok(None),
    };
    Ok(Some(result))
}

fn method_type_method(vm: &mut Vm, mt: &str, name: &str) -> Result<Option<Value>, SandboxError> {
    use crate::ir::MethodDescriptor;
    let result = match name {
        "toMethodDescriptorString" | "toString" => vm.intern(mt),
        "parameterCount" => {
            let parsed = MethodDescriptor::parse(mt)
                .map_err(|e| SandboxError::engine(format!("bad method type {mt}: {e}")))?;
            Value::Int(parsed.params.len() as i32)
        }
        "returnType" => {
            let parsed = MethodDescriptor::parse(mt)
                .map_err(|e| SandboxError::engine(format!("bad method type {mt}: {e}")))?;
            Value::object(Obj::Class(parsed.ret.descriptor()))
        }
        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// `MethodHandles.Lookup` resolution. Only the trusted lookup the VM hands
/// to bootstrap invocations may resolve members; the public form throws
/// the access error the real runtime would.
fn lookup_method(
    trusted: bool,
    name: &str,
    args: &[Value],
) -> Result<Option<Value>, SandboxError> {
    let kind = match name {
        "findStatic" => HandleKind::InvokeStatic,
        "findVirtual" => HandleKind::InvokeVirtual,
        "findSpecial" => HandleKind::InvokeSpecial,
        "findConstructor" => HandleKind::NewInvokeSpecial,
        "findGetter" => HandleKind::GetField,
        "findStaticGetter" => HandleKind::GetStatic,
        "findSetter" => HandleKind::PutField,
        "findStaticSetter" => HandleKind::PutStatic,
        "in" | "lookupClass" | "dropLookupMode" => {
            return Ok(None);
        }
        _ => return Ok(None),
    };
    if !trusted {
        return Err(SandboxError::thrown(
            "java/lang/IllegalAccessException",
            "untrusted lookup",
        ));
    }

    let owner = class_token_of(arg(args, 0)?)?;
    let info = match kind {
        HandleKind::NewInvokeSpecial => HandleInfo {
            kind,
            owner,
            name: "<init>".into(),
            desc: method_type_of(arg(args, 1)?)?,
        },
        HandleKind::GetField
        | HandleKind::GetStatic
        | HandleKind::PutField
        | HandleKind::PutStatic => HandleInfo {
            kind,
            owner,
            name: arg_str(args, 1)?,
            desc: descriptor_of_class_token(&class_token_of(arg(args, 2)?)?),
        },
        _ => HandleInfo {
            kind,
            owner,
            name: arg_str(args, 1)?,
            desc: method_type_of(arg(args, 2)?)?,
        },
    };
    Ok(Some(Value::object(Obj::MethodHandle(info))))
}

fn call_site_method(
    method_type: &mut String,
    target: &mut Option<HandleInfo>,
    name: &str,
    args: &[Value],
) -> Result<Option<Value>, SandboxError> {
    let result = match name {
        "<init>" => {
            match args.first() {
                Some(Value::Ref(r)) => match &*r.borrow() {
                    Obj::MethodType(mt) => *method_type = mt.clone(),
                    Obj::MethodHandle(info) => {
                        *method_type = info.desc.clone();
                        *target = Some(info.clone());
                    }
                    _ => {}
                },
                _ => {}
            }
            Value::Null
        }
        "setTarget" => {
            match args.first() {
                Some(Value::Ref(r)) => {
                    if let Obj::MethodHandle(info) = &*r.borrow() {
                        *target = Some(info.clone());
                    }
                }
                _ => return Err(npe()),
            }
            Value::Null
        }
        "getTarget" | "dynamicInvoker" => match target {
            Some(info) => Value::object(Obj::MethodHandle(info.clone())),
            None => {
                return Err(SandboxError::thrown(
                    "java/lang/IllegalStateException",
                    "call site has no target",
                ))
            }
        },
        "type" => Value::object(Obj::MethodType(method_type.clone())),
        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// Methods on `Obj::Instance` receivers: throwables, the crypto classes,
/// and the generic Object protocol.
#[allow(clippy::too_many_lines)]
fn instance_method(
    vm: &mut Vm,
    receiver: &ObjRef,
    class: &str,
    name: &str,
    desc: &str,
    args: &[Value],
) -> Result<Option<Value>, SandboxError> {
    // Crypto classes get exact modeling.
    match class {
        "javax/crypto/Cipher" => return cipher_method(receiver, name, args),
        "javax/crypto/spec/SecretKeySpec" | "javax/crypto/spec/DESKeySpec" => {
            if name == "<init>" {
                let key = arg(args, 0)?.clone();
                if key.is_null() {
                    return Err(npe());
                }
                set_field(receiver, "key", key);
                return Ok(Some(Value::Null));
            }
            if name == "getEncoded" || name == "getKey" {
                return Ok(Some(get_field(receiver, "key").unwrap_or(Value::Null)));
            }
        }
        "javax/crypto/spec/IvParameterSpec" => {
            if name == "<init>" {
                let iv = arg(args, 0)?.clone();
                if iv.is_null() {
                    return Err(npe());
                }
                set_field(receiver, "iv", iv);
                return Ok(Some(Value::Null));
            }
            if name == "getIV" {
                return Ok(Some(get_field(receiver, "iv").unwrap_or(Value::Null)));
            }
        }
        "javax/crypto/SecretKeyFactory" => {
            if name == "generateSecret" {
                // Lift the key bytes out of whatever spec was supplied.
                let key = arg(args, 0)?
                    .as_ref_obj()
                    .and_then(|spec| match &*spec.borrow() {
                        Obj::Instance(i) => i.fields.get("key").cloned(),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        SandboxError::thrown("java/security/InvalidKeyException", "no key material")
                    })?;
                let mut instance = Instance {
                    class: "javax/crypto/spec/SecretKeySpec".into(),
                    fields: rustc_hash::FxHashMap::default(),
                };
                instance.fields.insert("key".into(), key);
                return Ok(Some(Value::object(Obj::Instance(instance))));
            }
        }
        _ => {}
    }

    // Throwable protocol, applicable to every instance.
    let result = match (name, desc) {
        ("<init>", "()V") => Value::Null,
        ("<init>", "(Ljava/lang/String;)V") => {
            set_field(receiver, "message", arg(args, 0)?.clone());
            Value::Null
        }
        ("<init>", "(Ljava/lang/Throwable;)V") | ("initCause", _) => {
            set_field(receiver, "cause", arg(args, 0)?.clone());
            if name == "initCause" {
                Value::Ref(receiver.clone())
            } else {
                Value::Null
            }
        }
        ("getMessage" | "getLocalizedMessage", _) => {
            get_field(receiver, "message").unwrap_or(Value::Null)
        }
        ("getCause", _) => get_field(receiver, "cause").unwrap_or(Value::Null),
        ("fillInStackTrace", _) => Value::Ref(receiver.clone()),
        ("getStackTrace", _) => Value::object(Obj::Array(ArrayObj::Ref(Vec::new()))),
        ("printStackTrace" | "addSuppressed" | "setStackTrace", _) => Value::Null,
        ("getClass", _) => Value::object(Obj::Class(class.to_string())),
        ("hashCode", _) => Value::Int(0),
        ("equals", _) => Value::Int(i32::from(arg(args, 0)?.ref_eq(&Value::Ref(receiver.clone())))),
        ("toString", _) => vm.intern(&format!("{}@0", class.replace('/', "."))),

        // Thread / Runtime / PrintStream inert surface.
        ("getName", _) if class == "java/lang/Thread" => vm.intern("main"),
        ("availableProcessors", _) => Value::Int(1),
        ("exec", _) => Value::Null,
        ("println" | "print" | "flush" | "write" | "close", _) => Value::Null,

        _ => return Ok(None),
    };
    Ok(Some(result))
}

fn set_field(receiver: &ObjRef, field: &str, value: Value) {
    if let Obj::Instance(instance) = &mut *receiver.borrow_mut() {
        instance.fields.insert(field.to_string(), value);
    }
}

fn get_field(receiver: &ObjRef, field: &str) -> Option<Value> {
    match &*receiver.borrow() {
        Obj::Instance(instance) => instance.fields.get(field).cloned(),
        _ => None,
    }
}

fn cipher_method(
    receiver: &ObjRef,
    name: &str,
    args: &[Value],
) -> Result<Option<Value>, SandboxError> {
    match name {
        "init" => {
            let mode = arg_int(args, 0)?;
            set_field(receiver, "opmode", Value::Int(mode));
            if let Some(key) = args.get(1).and_then(|k| {
                k.as_ref_obj().and_then(|spec| match &*spec.borrow() {
                    Obj::Instance(i) => i.fields.get("key").cloned(),
                    _ => None,
                })
            }) {
                set_field(receiver, "key", key);
            } else {
                return Err(SandboxError::thrown(
                    "java/security/InvalidKeyException",
                    "missing key material",
                ));
            }
            if let Some(iv) = args.get(2).and_then(|p| {
                p.as_ref_obj().and_then(|spec| match &*spec.borrow() {
                    Obj::Instance(i) => i.fields.get("iv").cloned(),
                    _ => None,
                })
            }) {
                set_field(receiver, "iv", iv);
            }
            Ok(Some(Value::Null))
        }
        "doFinal" => {
            let data = arg_bytes(args, 0)?;
            let key = get_field(receiver, "key")
                .as_ref()
                .and_then(bytes_of)
                .ok_or_else(|| {
                    SandboxError::thrown(
                        "java/lang/IllegalStateException",
                        "cipher not initialized",
                    )
                })?;
            let iv = get_field(receiver, "iv")
                .as_ref()
                .and_then(bytes_of)
                .unwrap_or_else(|| vec![0u8; 8]);
            if key.len() < 8 || iv.len() < 8 {
                return Err(SandboxError::thrown(
                    "java/security/InvalidKeyException",
                    "DES key/IV must be 8 bytes",
                ));
            }
            let decrypt = get_field(receiver, "opmode").and_then(|m| m.as_int()) != Some(1);
            let output = if decrypt {
                let cipher = DesCbcDec::new_from_slices(&key[..8], &iv[..8])
                    .map_err(|e| SandboxError::engine(format!("DES init: {e}")))?;
                cipher
                    .decrypt_padded_vec_mut::<Pkcs7>(&data)
                    .map_err(|_| {
                        SandboxError::thrown(
                            BAD_PADDING_EXCEPTION,
                            "Given final block not properly padded",
                        )
                    })?
            } else {
                let cipher = DesCbcEnc::new_from_slices(&key[..8], &iv[..8])
                    .map_err(|e| SandboxError::engine(format!("DES init: {e}")))?;
                cipher.encrypt_padded_vec_mut::<Pkcs7>(&data)
            };
            Ok(Some(byte_array(&output)))
        }
        "getBlockSize" => Ok(Some(Value::Int(8))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_membership() {
        assert!(is_builtin_class("java/lang/String"));
        assert!(is_builtin_class("javax/crypto/Cipher"));
        assert!(is_builtin_class("javax/crypto/BadPaddingException"));
        assert!(!is_builtin_class("java/io/File"));
        assert!(!is_builtin_class("java/net/Socket"));
        assert!(!is_builtin_class("com/vendor/Anything"));
    }

    #[test]
    fn class_token_descriptors() {
        assert_eq!(descriptor_of_class_token("int"), "I");
        assert_eq!(descriptor_of_class_token("[B"), "[B");
        assert_eq!(
            descriptor_of_class_token("java/lang/String"),
            "Ljava/lang/String;"
        );
    }

    #[test]
    fn des_round_trip_and_bad_padding() {
        let key = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let iv = [0u8; 8];
        let plaintext = b"attack at dawn";

        let enc = DesCbcEnc::new_from_slices(&key, &iv).unwrap();
        let ciphertext = enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let dec = DesCbcDec::new_from_slices(&key, &iv).unwrap();
        let decrypted = dec.decrypt_padded_vec_mut::<Pkcs7>(&ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);

        // Corrupt ciphertext must fail the pad check.
        let mut corrupted = ciphertext;
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;
        let dec = DesCbcDec::new_from_slices(&key, &iv).unwrap();
        assert!(dec.decrypt_padded_vec_mut::<Pkcs7>(&corrupted).is_err());
    }

    #[test]
    fn lookup_requires_trust() {
        let owner = Value::object(Obj::Class("a/B".into()));
        let name = Value::string("target");
        let mt = Value::object(Obj::MethodType("()J".into()));

        let err = lookup_method(false, "findStatic", &[owner.clone(), name.clone(), mt.clone()])
            .unwrap_err();
        assert_eq!(err.thrown_class(), Some("java/lang/IllegalAccessException"));

        let handle = lookup_method(true, "findStatic", &[owner, name, mt])
            .unwrap()
            .unwrap();
        match &*handle.as_ref_obj().unwrap().borrow() {
            Obj::MethodHandle(info) => {
                assert_eq!(info.kind, HandleKind::InvokeStatic);
                assert_eq!(info.owner, "a/B");
                assert_eq!(info.name, "target");
                assert_eq!(info.desc, "()J");
            }
            other => panic!("expected method handle, got {other:?}"),
        };
    }

    #[test]
    fn getter_handles_use_field_descriptors() {
        let owner = Value::object(Obj::Class("a/B".into()));
        let name = Value::string("K");
        let field_type = Value::object(Obj::Class("long".into()));

        let handle = lookup_method(true, "findStaticGetter", &[owner, name, field_type])
            .unwrap()
            .unwrap();
        match &*handle.as_ref_obj().unwrap().borrow() {
            Obj::MethodHandle(info) => {
                assert_eq!(info.kind, HandleKind::GetStatic);
                assert_eq!(info.desc, "J");
            }
            other => panic!("expected method handle, got {other:?}"),
        };
    }
}

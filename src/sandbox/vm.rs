//! The sandbox VM facade.

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::ir::{opcodes as op, ClassNode, HandleKind, Insn, JvmType};
use crate::sandbox::{
    interpreter,
    loader::{ClassKind, LoadedClass, NoReferenceHandler, SandboxLoader, VmReferenceHandler},
    natives,
    value::{HandleInfo, Obj, ObjRef, Value},
    SandboxError,
};

/// Instructions one public invocation may execute before the sandbox
/// aborts it. Obfuscator initializers are short; a run that reaches this
/// ceiling is looping.
const INSTRUCTION_BUDGET: u64 = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    InProgress,
    Done,
}

/// A short-lived, restricted execution environment.
///
/// A `Vm` materializes classes through the loader policy, runs their code
/// in the interpreter, and exposes the results (return values, static
/// fields, resolved method handles) to the calling pass. Instances are
/// cheap and meant to be discarded after one target: class identity,
/// static state and the intern pool all reset with the instance.
pub struct Vm {
    loader: SandboxLoader,
    statics: FxHashMap<String, FxHashMap<(String, String), Value>>,
    init_state: FxHashMap<String, InitState>,
    interned: FxHashMap<String, ObjRef>,
    budget: u64,
}

impl Vm {
    /// Constructs a VM whose unresolved names are offered to
    /// `reference_handler` before falling back to builtins and stubs.
    #[must_use]
    pub fn new(reference_handler: Box<dyn VmReferenceHandler>) -> Self {
        Vm {
            loader: SandboxLoader::new(reference_handler),
            statics: FxHashMap::default(),
            init_state: FxHashMap::default(),
            interned: FxHashMap::default(),
            budget: INSTRUCTION_BUDGET,
        }
    }

    /// Injects `node` into the loader cache without triggering its
    /// initializer.
    pub fn explicitly_preload(&mut self, node: ClassNode) {
        self.loader.preload(node);
    }

    /// Loads a class by policy. Returns `None` on failure - never an
    /// error, per the sandbox contract.
    pub fn load_class(&mut self, name: &str) -> Option<ClassKind> {
        match self.loader.resolve(name) {
            Some(class) => Some(class.kind()),
            None => {
                debug!("load_class({name}) failed");
                None
            }
        }
    }

    pub(crate) fn resolve_class(&mut self, name: &str) -> Option<LoadedClass> {
        self.loader.resolve(name)
    }

    /// Invokes a static method and returns its result. The instruction
    /// budget is replenished per public invocation.
    pub fn invoke_static(
        &mut self,
        class: &str,
        name: &str,
        desc: &str,
        args: Vec<Value>,
    ) -> Result<Value, SandboxError> {
        self.budget = INSTRUCTION_BUDGET;
        interpreter::call_static(self, class, name, desc, args, 0)
    }

    /// Runs a class's static initializer (if it has one and it has not run
    /// in this VM yet).
    pub fn initialize_class(&mut self, class: &str) -> Result<(), SandboxError> {
        self.budget = INSTRUCTION_BUDGET;
        self.ensure_initialized(class, 0)
    }

    /// Reads a static field's current value, if one was ever written in
    /// this VM.
    #[must_use]
    pub fn static_field_value(&mut self, class: &str, name: &str, desc: &str) -> Option<Value> {
        self.statics
            .get(class)
            .and_then(|fields| fields.get(&(name.to_string(), desc.to_string())))
            .cloned()
    }

    /// The privileged lookup object bootstrap methods require. This is the
    /// single acknowledged coupling to runtime internals: a real runtime
    /// guards this object, the sandbox hands it out because the classes it
    /// executes are the analysis target itself.
    #[must_use]
    pub fn trusted_lookup(&self) -> Value {
        Value::object(Obj::Lookup { trusted: true })
    }

    /// Cracks a method-handle value open, exposing enough to reconstruct a
    /// direct reference instruction.
    pub fn reveal_method_handle(&self, handle: &Value) -> Result<HandleInfo, SandboxError> {
        match handle {
            Value::Ref(r) => match &*r.borrow() {
                Obj::MethodHandle(info) => Ok(info.clone()),
                other => Err(SandboxError::engine(format!(
                    "expected a method handle, got {other:?}"
                ))),
            },
            _ => Err(SandboxError::engine("expected a method handle, got null")),
        }
    }

    /// Runs `<clinit>` of `class` (and its user-defined superclasses)
    /// exactly once per VM.
    pub(crate) fn ensure_initialized(
        &mut self,
        class: &str,
        depth: usize,
    ) -> Result<(), SandboxError> {
        if self.init_state.contains_key(class) {
            return Ok(());
        }
        let Some(LoadedClass::User(node)) = self.resolve_class(class) else {
            // Builtins and stubs have no observable initialization.
            self.init_state.insert(class.to_string(), InitState::Done);
            return Ok(());
        };

        self.init_state
            .insert(class.to_string(), InitState::InProgress);

        if let Some(parent) = node.super_name.clone() {
            self.ensure_initialized(&parent, depth)?;
        }

        let clinit = node.static_initializer().cloned();
        let result = match clinit {
            Some(method) => {
                debug!("running <clinit> of {class}");
                interpreter::execute_method(self, class, &method, Vec::new(), depth + 1)
                    .map(|_| ())
            }
            None => Ok(()),
        };
        // Mark done either way so a failed initializer does not rerun.
        self.init_state.insert(class.to_string(), InitState::Done);
        if let Err(e) = &result {
            warn!("initializer of {class} failed: {e}");
        }
        result
    }

    pub(crate) fn read_static(
        &mut self,
        owner: &str,
        name: &str,
        desc: &str,
    ) -> Result<Value, SandboxError> {
        if let Some(value) = self
            .statics
            .get(owner)
            .and_then(|fields| fields.get(&(name.to_string(), desc.to_string())))
        {
            return Ok(value.clone());
        }
        if let Some(value) = natives::static_field(owner, name) {
            return Ok(value);
        }
        let ty = JvmType::parse(desc).map_err(|e| SandboxError::engine(e.to_string()))?;
        Ok(Value::default_of(&ty))
    }

    pub(crate) fn write_static(&mut self, owner: &str, name: &str, desc: &str, value: Value) {
        self.statics
            .entry(owner.to_string())
            .or_default()
            .insert((name.to_string(), desc.to_string()), value);
    }

    /// Canonical string object for `s` within this VM.
    pub(crate) fn intern(&mut self, s: &str) -> Value {
        if let Some(existing) = self.interned.get(s) {
            return Value::Ref(existing.clone());
        }
        let Value::Ref(r) = Value::string(s) else {
            unreachable!("Value::string always builds a reference")
        };
        self.interned.insert(s.to_string(), r.clone());
        Value::Ref(r)
    }

    pub(crate) fn consume_budget(&mut self) -> Result<(), SandboxError> {
        match self.budget.checked_sub(1) {
            Some(remaining) => {
                self.budget = remaining;
                Ok(())
            }
            None => Err(SandboxError::engine("instruction budget exhausted")),
        }
    }
}

/// Probes how recent a class file version the sandbox materializes, by
/// synthesizing dummy classes with rising major versions until the loader
/// refuses one. The upper probe bound derives from the loader's declared
/// latest version, so the result tracks the engine rather than a
/// hard-coded range.
#[must_use]
pub fn supported_class_version() -> Option<u16> {
    let mut vm = Vm::new(Box::new(NoReferenceHandler));
    let mut last_supported = None;
    for major in 49..=crate::sandbox::loader::LATEST_MAJOR_VERSION + 1 {
        let name = format!("v{major}");
        vm.explicitly_preload(ClassNode::new(name.as_str(), major));
        if vm.load_class(&name).is_none() {
            break;
        }
        last_supported = Some(major);
    }
    last_supported
}

/// Synthesizes the direct reference instruction a revealed method handle
/// stands for.
#[must_use]
pub fn instruction_from_handle(info: &HandleInfo) -> Insn {
    match info.kind {
        HandleKind::GetField => Insn::Field {
            op: op::GETFIELD,
            owner: info.owner.clone(),
            name: info.name.clone(),
            desc: info.desc.clone(),
        },
        HandleKind::GetStatic => Insn::Field {
            op: op::GETSTATIC,
            owner: info.owner.clone(),
            name: info.name.clone(),
            desc: info.desc.clone(),
        },
        HandleKind::PutField => Insn::Field {
            op: op::PUTFIELD,
            owner: info.owner.clone(),
            name: info.name.clone(),
            desc: info.desc.clone(),
        },
        HandleKind::PutStatic => Insn::Field {
            op: op::PUTSTATIC,
            owner: info.owner.clone(),
            name: info.name.clone(),
            desc: info.desc.clone(),
        },
        HandleKind::InvokeStatic => Insn::Method {
            op: op::INVOKESTATIC,
            owner: info.owner.clone(),
            name: info.name.clone(),
            desc: info.desc.clone(),
            itf: false,
        },
        HandleKind::InvokeVirtual => Insn::Method {
            op: op::INVOKEVIRTUAL,
            owner: info.owner.clone(),
            name: info.name.clone(),
            desc: info.desc.clone(),
            itf: false,
        },
        HandleKind::InvokeSpecial | HandleKind::NewInvokeSpecial => Insn::Method {
            op: op::INVOKESPECIAL,
            owner: info.owner.clone(),
            name: info.name.clone(),
            desc: info.desc.clone(),
            itf: false,
        },
        HandleKind::InvokeInterface => Insn::Method {
            op: op::INVOKEINTERFACE,
            owner: info.owner.clone(),
            name: info.name.clone(),
            desc: info.desc.clone(),
            itf: true,
        },
    }
}

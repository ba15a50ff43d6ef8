//! The sandbox execution environment.
//!
//! Obfuscator runtime helpers - static initializers that decrypt constant
//! tables, bootstrap methods that resolve hidden member references - only
//! reveal their outputs when executed. The sandbox provides a controlled
//! in-process interpreter to do exactly that: it executes selected classes
//! from the universe (never arbitrary host code) against a restricted
//! loader, and lets the calling pass read the results back.
//!
//! # Architecture
//!
//! - [`Vm`] - the facade: construct, preload, load, invoke, read statics,
//!   reveal method handles.
//! - [`loader`] - the 4-step resolution policy (universe via the
//!   reference handler → builtin allow-list → stub classes).
//! - [`natives`] - the allow-listed runtime classes, with every
//!   process-affecting API stubbed inert.
//! - [`interpreter`] - the bytecode interpreter with exception dispatch
//!   and execution budgets.
//! - [`proxy`] - proxy-class synthesis for re-running static initializers
//!   in isolation.
//!
//! # Lifecycle
//!
//! A `Vm` is short-lived: passes build one per target class (or per small
//! batch), harvest what they need, and drop it. Class identity, static
//! state and interned strings die with the instance; only the immutable
//! builtin allow-list is shared between VMs.

mod interpreter;
mod natives;

pub mod loader;
pub mod proxy;
pub mod value;
pub mod vm;

pub use loader::{ClassKind, NoReferenceHandler, VmReferenceHandler, LATEST_MAJOR_VERSION};
pub use proxy::{create_class_proxy, proxy_name, PROXY_CLINIT_NAME};
pub use value::{ArrayObj, HandleInfo, Instance, Obj, ObjRef, Value};
pub use vm::{instruction_from_handle, supported_class_version, Vm};

/// Internal name of the cryptographic failure the ZKM pass classifies on.
pub const BAD_PADDING_EXCEPTION: &str = "javax/crypto/BadPaddingException";
/// Internal name of the expected proxy-initialization artifact.
pub const NULL_POINTER_EXCEPTION: &str = "java/lang/NullPointerException";

/// An exception object that escaped sandbox execution.
#[derive(Debug, Clone)]
pub struct ThrownException {
    /// Internal name of the throwable's class.
    pub class_name: String,
    /// The throwable's message, if it had one.
    pub message: Option<String>,
    /// The throwable object itself, when one was materialized.
    pub(crate) object: Option<Value>,
}

impl ThrownException {
    #[must_use]
    pub fn new(class_name: impl Into<String>, message: Option<String>) -> Self {
        ThrownException {
            class_name: class_name.into(),
            message,
            object: None,
        }
    }
}

/// Failure of a sandbox operation.
///
/// `Thrown` reproduces an exception raised by the executed bytecode;
/// `Engine` covers everything the interpreter itself refuses to do
/// (exhausted budgets, unsupported constructs, unresolvable members).
/// Neither ever escapes the engine as a panic.
#[derive(Debug, Clone)]
pub enum SandboxError {
    Thrown(ThrownException),
    Engine(String),
}

impl SandboxError {
    /// Shorthand for a thrown exception without a materialized object.
    #[must_use]
    pub fn thrown(class_name: &str, message: impl Into<String>) -> Self {
        SandboxError::Thrown(ThrownException::new(class_name, Some(message.into())))
    }

    #[must_use]
    pub fn engine(message: impl Into<String>) -> Self {
        SandboxError::Engine(message.into())
    }

    /// The thrown exception's class, if this is a `Thrown` failure.
    #[must_use]
    pub fn thrown_class(&self) -> Option<&str> {
        match self {
            SandboxError::Thrown(t) => Some(&t.class_name),
            SandboxError::Engine(_) => None,
        }
    }
}

impl std::fmt::Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxError::Thrown(t) => match &t.message {
                Some(msg) => write!(f, "{}: {msg}", t.class_name),
                None => write!(f, "{}", t.class_name),
            },
            SandboxError::Engine(msg) => write!(f, "engine: {msg}"),
        }
    }
}

impl From<SandboxError> for crate::Error {
    fn from(err: SandboxError) -> Self {
        crate::Error::Sandbox(err.to_string())
    }
}

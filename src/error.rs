use thiserror::Error;

/// The generic Error type covering every failure this library can surface.
///
/// The pipeline itself never aborts on these: pass-level errors are caught by
/// the framework and recorded on the run summary or the affected class entry,
/// per the engine's "a run always completes" contract. The variants exist so
/// that the individual subsystems (IR manipulation, constant analysis, the
/// sandbox) can report *why* something was skipped.
///
/// # Error Categories
///
/// ## Bytecode and IR
/// - [`Error::Malformed`] - Corrupted or internally inconsistent class structure
/// - [`Error::MemberNotFound`] - A referenced field or method does not exist
///
/// ## Analysis
/// - [`Error::Analysis`] - The constant tracker could not converge on a method
///
/// ## Sandbox
/// - [`Error::Sandbox`] - The sandbox VM failed to load or execute a class
///
/// ## Control
/// - [`Error::Unsupported`] - A construct the engine deliberately does not model
/// - [`Error::Canceled`] - The caller's cancellation token was triggered
#[derive(Error, Debug)]
pub enum Error {
    /// The class structure is damaged or internally inconsistent.
    ///
    /// Includes the source location where the malformation was detected,
    /// for debugging. Raised for things like jumps to labels that do not
    /// exist in the method, or descriptors that fail to parse.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// Description of what was malformed.
        message: String,
        /// Source file in which the error was detected.
        file: &'static str,
        /// Source line in which the error was detected.
        line: u32,
    },

    /// A referenced field or method could not be resolved.
    #[error("Member not found: {owner}.{name} {desc}")]
    MemberNotFound {
        /// Internal name of the owning class.
        owner: String,
        /// Member name.
        name: String,
        /// Member descriptor.
        desc: String,
    },

    /// The constant-tracking analyzer failed on a method.
    ///
    /// Typically caused by inconsistent stack heights at a merge point,
    /// which obfuscators produce on purpose. The affected method keeps its
    /// original bytecode.
    #[error("Analysis failed: {0}")]
    Analysis(String),

    /// The sandbox VM failed to load or execute a class.
    ///
    /// Covers link failures, exhausted execution budgets, and exceptions
    /// that escaped the executed initializer. The message carries the
    /// sandbox-level detail; callers usually log it and skip the class.
    #[error("Sandbox failure: {0}")]
    Sandbox(String),

    /// A construct the engine deliberately does not model.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The caller requested cancellation.
    #[error("Pipeline run was canceled")]
    Canceled,
}

macro_rules! malformed_error {
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

pub(crate) use malformed_error;

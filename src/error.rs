use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type covering all errors this library can return.
///
/// Errors are limited to the construction of IR structures from untrusted
/// input (malformed branch targets, missing terminators, out-of-range
/// references). The transform itself never returns recoverable errors: a
/// rewrite rule that cannot prove its precondition simply abstains, and
/// internal invariant violations (stale queued edits, double commits) panic
/// because they indicate a bug in the transform, not bad input.
#[derive(Error, Debug)]
pub enum Error {
    /// The instruction stream is damaged and could not be turned into a CFG.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A branch or switch referenced an instruction index outside the method.
    #[error("Branch target {target} is out of bounds (method has {len} instructions)")]
    TargetOutOfBounds {
        /// The referenced instruction index
        target: usize,
        /// The number of instructions in the method
        len: usize,
    },

    /// An empty method body was provided where code was required.
    #[error("Method body is empty")]
    Empty,
}

/// Convenience `Result` alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

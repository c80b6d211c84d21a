use thiserror::Error;

use crate::metadata::token::Token;

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

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Only fatal conditions are represented here. A reference that cannot be resolved in the
/// target framework is *not* an error: it is recorded as a
/// [`crate::rewrite::Diagnostic`] and rewriting continues.
///
/// # Error Categories
///
/// ## Configuration Errors
/// - [`Error::Configuration`] - Invalid framework directory, malformed option values
/// - [`Error::AssemblyNotFound`] - A module named on the command line could not be located
/// - [`Error::LockFile`] - The project lock file could not be turned into reference paths
///
/// ## Module Errors
/// - [`Error::Malformed`] - Corrupted or inconsistent module graph
/// - [`Error::TokenNotFound`] - A token does not address a row of its table
/// - [`Error::InvalidTypeName`] - A type name with unbalanced generic brackets
/// - [`Error::InvalidOperand`] - An instruction carries an operand its opcode cannot take
/// - [`Error::RecursionLimit`] - A resolution chain exceeded the maximum depth
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Json`] - Module images or lock files that are not valid JSON
///
/// # Examples
///
/// ```rust,no_run
/// use refrewrite::{Error, metadata::provider::{JsonModuleProvider, MetadataProvider}};
/// use refrewrite::metadata::provider::DebugSymbolFormat;
/// use std::path::Path;
///
/// match JsonModuleProvider.load(Path::new("Target.dll"), DebugSymbolFormat::None) {
///     Ok(module) => println!("Loaded {}", module.name),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed module: {} ({}:{})", message, file, line);
///     }
///     Err(Error::FileError(io_err)) => eprintln!("I/O error: {}", io_err),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The module graph is damaged and could not be processed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
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

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A module image or lock file is not valid JSON or does not match the expected layout.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// The rewrite was configured with values that cannot work.
    ///
    /// Raised before any rewriting starts, e.g. for a framework directory that does not
    /// exist or does not contain `mscorlib.dll`.
    #[error("Invalid configuration - {0}")]
    Configuration(String),

    /// A module that must be present (support, platform or alternate module) could not be
    /// located.
    #[error("Assembly could not be found - {0}")]
    AssemblyNotFound(String),

    /// A token does not address an existing row of the table it names.
    #[error("Failed to find row for token - {0}")]
    TokenNotFound(Token),

    /// A type name whose generic argument brackets are unbalanced.
    #[error("Invalid type name - {0}")]
    InvalidTypeName(String),

    /// An instruction carries an operand its opcode cannot take.
    #[error("Invalid operand for {opcode} - {message}")]
    InvalidOperand {
        /// Mnemonic of the offending instruction
        opcode: &'static str,
        /// What is wrong with the operand
        message: String,
    },

    /// Recursion limit reached.
    ///
    /// Nested-type scopes, exported-type forwarders and base-type chains are walked with a
    /// depth limit so that cyclic metadata cannot hang the rewriter.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// The project lock file could not be turned into a set of reference paths.
    #[error("Lock file error - {0}")]
    LockFile(String),
}

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

/// The generic Error type covering every failure this crate can surface.
///
/// Variants fall into the three classes the composer distinguishes: fatal
/// conditions that abort a run (unreadable images, occupied section names,
/// failing external tools), per-item conditions the orchestrator logs and
/// skips (duplicate declared addresses), and structural parse failures that
/// carry their detection site for debugging.
#[derive(Error, Debug)]
pub enum Error {
    /// The file is not a valid executable image.
    ///
    /// Raised when the DOS magic or the PE signature check fails while
    /// opening a target or artifact image.
    #[error("not an executable image: {0}")]
    NotAnImage(String),

    /// An out of bound access was attempted while parsing a buffer.
    #[error("out of bound read or write would have occurred")]
    OutOfBounds,

    /// A structure inside the file did not match its expected shape.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The target image already contains a section with the requested name.
    #[error("section already exists: {0}")]
    SectionExists(String),

    /// A section expected in an image or artifact was not found.
    #[error("section not found: {0}")]
    SectionNotFound(String),

    /// The reserved section size is smaller than the compiled section needs.
    #[error("section size too small, required: 0x{required:x}, reserved: 0x{reserved:x}")]
    SectionTooSmall {
        /// Raw size the compiled section actually occupies
        required: u32,
        /// Size reserved for the section by configuration
        reserved: u32,
    },

    /// Two stub declarations in one file claim the same hook address.
    ///
    /// Scanning of the offending file stops; declarations registered before
    /// the collision are kept.
    #[error("function '{duplicate}' has same address as '{existing}': 0x{address:x}")]
    DuplicateAddress {
        /// The contested hook address
        address: u32,
        /// Qualified name of the declaration already registered
        existing: String,
        /// Qualified name of the declaration being rejected
        duplicate: String,
    },

    /// An external tool exited with a non-zero status.
    #[error("{tool} failed with exit code {code}")]
    ToolFailed {
        /// Name of the external tool that failed
        tool: String,
        /// The exit code it returned
        code: i32,
    },

    /// File I/O error.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

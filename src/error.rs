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

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into three groups that are handled very differently by the rest of the
/// crate.
///
/// # Error Categories
///
/// ## Anchor Location
/// - [`Error::NoMatch`] - A matcher found no instruction
/// - [`Error::AmbiguousMatch`] - A matcher that required a unique hit found several
/// - [`Error::IndexOutOfRange`] - An occurrence or relative offset fell outside the body
///
/// ## Installation
/// These are fatal for the single patch that produced them. The installer records them and
/// moves on to the next, independent patch.
/// - [`Error::AnchorNotFound`], [`Error::AmbiguousAnchor`] - Directive anchors
/// - [`Error::UnresolvedTarget`] - The method locator exhausted every strategy
/// - [`Error::OrphanedLabel`], [`Error::OrphanedBlock`] - A replace would drop a jump target
///   or an exception marker
/// - [`Error::InvalidSlotReference`] - A payload touches an undeclared local
/// - [`Error::UndefinedLabel`], [`Error::DuplicateLabel`], [`Error::OperandMismatch`],
///   [`Error::UnbalancedBlock`] - Post-edit verification
/// - [`Error::PatchFailed`], [`Error::PatchAlreadyInstalled`] - Installer level wrapping
///
/// ## Dispatch
/// - [`Error::Handler`] - Returned by event handlers. The dispatcher records it and continues
///   with the next handler; it never reaches the firing routine.
///
/// # Examples
///
/// ```rust
/// use hookscope::{Error, patching::{find, InstructionMatcher, Occurrence}};
/// use hookscope::assembly::{OpCode, RoutineBodyBuilder};
///
/// let body = RoutineBodyBuilder::new()
///     .implementation(|asm| {
///         asm.nop()?.ret()?;
///         Ok(())
///     })
///     .build()?;
///
/// match find(&body, &InstructionMatcher::opcode(OpCode::Call), Occurrence::Only) {
///     Err(Error::NoMatch { anchor }) => println!("nothing matched {anchor}"),
///     Err(e) => println!("other error: {e}"),
///     Ok(index) => println!("found at {index}"),
/// }
/// # Ok::<(), hookscope::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Structurally invalid input.
    ///
    /// Carries the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    // Anchor location
    /// No instruction satisfied the matcher.
    #[error("No instruction matches anchor `{anchor}`")]
    NoMatch {
        /// Rendered matcher
        anchor: String,
    },

    /// More than one instruction satisfied a matcher that must be unique.
    #[error("Anchor `{anchor}` matched {matches} instructions, exactly one was required")]
    AmbiguousMatch {
        /// Rendered matcher
        anchor: String,
        /// Number of matching instructions
        matches: usize,
    },

    /// A requested occurrence or offset lies outside the routine body.
    #[error("Index {index} is out of range for a body of {len} instructions")]
    IndexOutOfRange {
        /// Requested (possibly negative) index
        index: isize,
        /// Length of the body or match list
        len: usize,
    },

    // Installation
    /// The anchor of a directive could not be located.
    #[error("Directive #{directive}: anchor `{anchor}` not found")]
    AnchorNotFound {
        /// Position of the directive in its list
        directive: usize,
        /// Rendered matcher plus occurrence
        anchor: String,
    },

    /// The anchor of a directive matched more than one position.
    #[error("Directive #{directive}: anchor `{anchor}` is ambiguous ({matches} matches)")]
    AmbiguousAnchor {
        /// Position of the directive in its list
        directive: usize,
        /// Rendered matcher
        anchor: String,
        /// Number of matching instructions
        matches: usize,
    },

    /// The method locator could not resolve a target routine.
    #[error("Unresolved target `{target}` (last strategy: {strategy}): {reason}")]
    UnresolvedTarget {
        /// Rendered target descriptor
        target: String,
        /// Name of the last strategy that was attempted
        strategy: String,
        /// Failure reasons of all attempted strategies
        reason: String,
    },

    /// A replace directive would drop a label attached to a replaced instruction.
    #[error("Directive #{directive}: label {label} would be orphaned")]
    OrphanedLabel {
        /// Position of the directive in its list
        directive: usize,
        /// The label that would be lost
        label: String,
    },

    /// A replace directive would drop an exception block marker.
    #[error("Directive #{directive}: exception block marker on instruction {index} would be orphaned")]
    OrphanedBlock {
        /// Position of the directive in its list
        directive: usize,
        /// Index of the instruction carrying the marker
        index: usize,
    },

    /// An instruction references a local slot that the routine never declared.
    #[error("Local slot {slot} is not declared (routine declares {declared}, directive: {directive:?})")]
    InvalidSlotReference {
        /// Position of the directive, if the reference came from a payload
        directive: Option<usize>,
        /// Referenced slot index
        slot: u16,
        /// Number of slots the routine declares
        declared: usize,
    },

    /// A branch references a label that is attached to no instruction.
    #[error("Undefined label: {0}")]
    UndefinedLabel(String),

    /// A label is defined or attached more than once.
    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),

    /// The operand of an instruction does not have the shape its opcode requires.
    #[error("Instruction {index}: operand does not fit `{opcode}`")]
    OperandMismatch {
        /// Index of the offending instruction
        index: usize,
        /// Mnemonic of the opcode
        opcode: String,
    },

    /// Exception block markers do not nest properly.
    #[error("Unbalanced exception block marker at instruction {index}")]
    UnbalancedBlock {
        /// Index of the instruction carrying the offending marker
        index: usize,
    },

    /// Installing a patch failed; wraps the underlying cause.
    #[error("Patch `{patch}` failed: {source}")]
    PatchFailed {
        /// Patch name
        patch: String,
        /// Underlying installation error
        #[source]
        source: Box<Error>,
    },

    /// A patch with the same name has already been installed.
    #[error("Patch `{0}` is already installed")]
    PatchAlreadyInstalled(String),

    // Dispatch
    /// An event handler reported a failure.
    #[error("Handler failed: {0}")]
    Handler(String),
}

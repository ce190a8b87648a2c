//! Edit directives: what to splice where, and what happens to labels on the way.

use std::fmt;

use crate::{
    assembly::Instruction,
    patching::matcher::{Anchor, InstructionMatcher, Occurrence},
};

/// Where a payload goes relative to the anchor instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Insert ahead of the anchor
    Before,
    /// Insert behind the anchor
    After,
    /// Replace `count` instructions starting at the anchor
    Replace {
        /// Number of replaced instructions, at least one
        count: usize,
    },
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Before => f.write_str("before"),
            Position::After => f.write_str("after"),
            Position::Replace { count } => write!(f, "replace {count}"),
        }
    }
}

/// What happens to labels and exception markers of the anchor when a payload is spliced in.
///
/// | Position | `Keep` | `Move` |
/// |---|---|---|
/// | `Before` | stay on the anchor; jumps bypass the payload | move to the first payload instruction |
/// | `After` | stay on the anchor | stay on the anchor |
/// | `Replace` | fail if the replaced range carries any | move to the first payload instruction, or to the instruction after the range for an empty payload |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelPolicy {
    /// Leave attachments where they are; refuse to drop them
    #[default]
    Keep,
    /// Reattach attachments to the first payload instruction
    Move,
}

/// A single requested edit.
///
/// # Examples
///
/// ```rust
/// use hookscope::assembly::{Instruction, OpCode};
/// use hookscope::patching::{EditDirective, InstructionMatcher, LabelPolicy, Occurrence};
///
/// let directive = EditDirective::replace(
///     InstructionMatcher::opcode(OpCode::Ret),
///     1,
///     vec![Instruction::simple(OpCode::Nop), Instruction::simple(OpCode::Ret)],
/// )
/// .occurrence(Occurrence::Last)
/// .move_labels();
///
/// assert_eq!(directive.label_policy, LabelPolicy::Move);
/// assert_eq!(directive.to_string(), "replace 1 at ret [last] (2 instructions)");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EditDirective {
    /// Where the edit applies
    pub anchor: Anchor,
    /// How the payload relates to the anchor
    pub position: Position,
    /// Instructions to splice in
    pub payload: Vec<Instruction>,
    /// Treatment of anchor attachments
    pub label_policy: LabelPolicy,
}

impl EditDirective {
    /// Creates a directive.
    #[must_use]
    pub fn new(anchor: impl Into<Anchor>, position: Position, payload: Vec<Instruction>) -> Self {
        Self {
            anchor: anchor.into(),
            position,
            payload,
            label_policy: LabelPolicy::Keep,
        }
    }

    /// Inserts `payload` ahead of the anchor.
    #[must_use]
    pub fn before(anchor: impl Into<Anchor>, payload: Vec<Instruction>) -> Self {
        Self::new(anchor, Position::Before, payload)
    }

    /// Inserts `payload` behind the anchor.
    #[must_use]
    pub fn after(anchor: impl Into<Anchor>, payload: Vec<Instruction>) -> Self {
        Self::new(anchor, Position::After, payload)
    }

    /// Replaces `count` instructions starting at the anchor with `payload`.
    #[must_use]
    pub fn replace(anchor: impl Into<Anchor>, count: usize, payload: Vec<Instruction>) -> Self {
        Self::new(anchor, Position::Replace { count }, payload)
    }

    /// Sets the occurrence rule of the anchor.
    #[must_use]
    pub fn occurrence(mut self, occurrence: Occurrence) -> Self {
        self.anchor.occurrence = occurrence;
        self
    }

    /// Sets the relative offset of the anchor.
    #[must_use]
    pub fn offset(mut self, offset: isize) -> Self {
        self.anchor.offset = offset;
        self
    }

    /// Reattaches labels and markers to the first payload instruction.
    #[must_use]
    pub fn move_labels(mut self) -> Self {
        self.label_policy = LabelPolicy::Move;
        self
    }

    /// The matcher of the anchor.
    #[must_use]
    pub fn matcher(&self) -> &InstructionMatcher {
        &self.anchor.matcher
    }
}

impl fmt::Display for EditDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} ({} instructions)",
            self.position,
            self.anchor,
            self.payload.len()
        )
    }
}

//! Instruction representation, operand types and the identities attached to instructions.
//!
//! This module defines the value types a routine body is made of. An [`Instruction`] is an
//! [`OpCode`], an [`Operand`] and two kinds of attachments that must survive every edit:
//!
//! - [`Label`]s, the opaque identities branch instructions jump to;
//! - [`ExceptionBlock`] markers, which open and close protected regions.
//!
//! Instructions have no byte offsets. Jumps refer to labels, never to positions, so inserting
//! or removing instructions can never silently retarget a branch.
//!
//! # Key Components
//!
//! - [`Instruction`] - Opcode, operand, labels and exception markers
//! - [`Operand`] - Type-safe operand representation
//! - [`Immediate`] - Immediate value types with conversions
//! - [`Label`] - Jump target identity
//! - [`LocalSlot`] - Index into a routine's local variable table
//! - [`ExceptionBlock`] - Protected region markers
//!
//! # Usage Examples
//!
//! ```rust
//! use hookscope::assembly::{Immediate, Instruction, Label, OpCode, Operand};
//!
//! let target = Label::new(3);
//! let branch = Instruction::branch(OpCode::BrtrueS, target);
//! assert_eq!(branch.branch_targets(), vec![target]);
//!
//! let load = Instruction::new(OpCode::LdcI4S, Operand::Immediate(Immediate::Int8(42)))
//!     .with_label(Label::new(7));
//! assert_eq!(load.constant(), Some(42));
//! assert!(load.has_label(Label::new(7)));
//! ```

use std::collections::BTreeSet;
use std::fmt::{self, UpperHex};

use crate::{
    assembly::opcode::{OpCode, OperandKind},
    metadata::{MemberRef, TypeName},
};

/// Opaque identity of a jump target.
///
/// Labels are allocated by a [`crate::assembly::RoutineBody`] and are unique within it. The
/// numeric value carries no positional meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(u32);

impl Label {
    /// Creates a label from its raw identity.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Label(id)
    }

    /// Returns the raw identity.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L_{:04}", self.0)
    }
}

/// Index into a routine's local variable table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalSlot(u16);

impl LocalSlot {
    /// Creates a slot reference from its index.
    #[must_use]
    pub const fn new(index: u16) -> Self {
        LocalSlot(index)
    }

    /// Returns the slot index.
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Display for LocalSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V_{}", self.0)
    }
}

/// Represents an immediate value type embedded in instructions.
///
/// # Examples
///
/// ```rust
/// use hookscope::assembly::Immediate;
///
/// let byte_val = Immediate::Int8(42);
/// let as_u64: u64 = byte_val.into();
/// assert_eq!(as_u64, 42);
/// assert_eq!(Immediate::Int32(-1).as_i64(), Some(-1));
/// assert_eq!(Immediate::Float32(1.5).as_i64(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

impl Immediate {
    /// Returns the value as `i64` for integer immediates.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Immediate::Int8(value) => Some(i64::from(*value)),
            Immediate::Int32(value) => Some(i64::from(*value)),
            Immediate::Int64(value) => Some(*value),
            Immediate::Float32(_) | Immediate::Float64(_) => None,
        }
    }

    /// Returns the operand shape this immediate satisfies.
    #[must_use]
    pub fn kind(&self) -> OperandKind {
        match self {
            Immediate::Int8(_) | Immediate::Int32(_) => OperandKind::Int32,
            Immediate::Int64(_) => OperandKind::Int64,
            Immediate::Float32(_) => OperandKind::Float32,
            Immediate::Float64(_) => OperandKind::Float64,
        }
    }
}

impl UpperHex for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value:02X}"),
            Immediate::Int32(value) => write!(f, "{value:08X}"),
            Immediate::Int64(value) => write!(f, "{value:016X}"),
            Immediate::Float32(value) => write!(f, "{:08X}", value.to_bits()),
            Immediate::Float64(value) => write!(f, "{:016X}", value.to_bits()),
        }
    }
}

impl From<Immediate> for u64 {
    fn from(val: Immediate) -> Self {
        match val {
            // For signed integers, we preserve the bit pattern
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int8(value) => value as u64,
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int32(value) => value as u64,
            #[allow(clippy::cast_sign_loss)]
            Immediate::Int64(value) => value as u64,
            Immediate::Float32(value) => u64::from(value.to_bits()),
            Immediate::Float64(value) => value.to_bits(),
        }
    }
}

/// Represents an operand in a structured way.
///
/// Branch operands are [`Label`]s rather than offsets, and member operands carry the full
/// [`MemberRef`] identity so that anchors can match on "which member", not "which token".
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value (constant embedded in instruction)
    Immediate(Immediate),
    /// String literal (`ldstr`)
    String(String),
    /// Method, field or type reference
    Member(MemberRef),
    /// Branch target
    Target(Label),
    /// Switch table
    Switch(Vec<Label>),
    /// Local variable slot
    Local(LocalSlot),
    /// Method argument index
    Argument(u16),
}

impl Operand {
    /// Returns true if this operand has the shape `kind` requires.
    #[must_use]
    pub fn fits(&self, kind: OperandKind) -> bool {
        match (self, kind) {
            (Operand::None, OperandKind::None) => true,
            (Operand::Immediate(imm), expected) => imm.kind() == expected,
            (Operand::String(_), OperandKind::String) => true,
            (Operand::Member(member), OperandKind::Method) => member.is_method(),
            (Operand::Member(member), OperandKind::Field) => member.is_field(),
            (Operand::Member(member), OperandKind::Type) => {
                !member.is_method() && !member.is_field()
            }
            (Operand::Member(_), OperandKind::Member) => true,
            (Operand::Target(_), OperandKind::Target) => true,
            (Operand::Switch(targets), OperandKind::Switch) => !targets.is_empty(),
            (Operand::Local(_), OperandKind::Local) => true,
            (Operand::Argument(_), OperandKind::Argument) => true,
            _ => false,
        }
    }

    /// Returns a formatted string representation of the operand.
    ///
    /// # Returns
    ///
    /// - `None` for [`Operand::None`]
    /// - A formatted string for all other operand types
    #[must_use]
    pub fn as_string(&self) -> Option<String> {
        match self {
            Operand::None => None,
            Operand::Immediate(imm) => Some(format!("{imm:?}")),
            Operand::String(s) => Some(format!("{s:?}")),
            Operand::Member(m) => Some(m.to_string()),
            Operand::Target(l) => Some(l.to_string()),
            Operand::Switch(targets) => Some(format!("switch({})", targets.len())),
            Operand::Local(slot) => Some(slot.to_string()),
            Operand::Argument(a) => Some(format!("A_{a}")),
        }
    }
}

/// Marker that opens or closes a protected region at an instruction.
///
/// Markers belong to the instruction they are attached to, exactly like labels: moving the
/// instruction moves the marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExceptionBlock {
    /// Starts a `try` region
    BeginTry,
    /// Starts a `catch` handler for the given type (any exception if `None`)
    BeginCatch(Option<TypeName>),
    /// Starts a `finally` handler
    BeginFinally,
    /// Starts a `fault` handler
    BeginFault,
    /// Closes the innermost open region or handler
    End,
}

/// A single instruction of a routine body.
///
/// Instructions are plain values; editing a body means building new instruction sequences,
/// never mutating an instruction that another body still references.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub(crate) opcode: OpCode,
    pub(crate) operand: Operand,
    pub(crate) labels: BTreeSet<Label>,
    pub(crate) blocks: Vec<ExceptionBlock>,
}

impl Instruction {
    /// Creates an instruction with an operand.
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Self {
            opcode,
            operand,
            labels: BTreeSet::new(),
            blocks: Vec::new(),
        }
    }

    /// Creates an instruction without operand.
    #[must_use]
    pub fn simple(opcode: OpCode) -> Self {
        Self::new(opcode, Operand::None)
    }

    /// Creates a `call` to `member`.
    #[must_use]
    pub fn call(member: MemberRef) -> Self {
        Self::new(OpCode::Call, Operand::Member(member))
    }

    /// Creates a branch of kind `opcode` to `target`.
    #[must_use]
    pub fn branch(opcode: OpCode, target: Label) -> Self {
        Self::new(opcode, Operand::Target(target))
    }

    /// Returns this instruction with `label` attached.
    #[must_use]
    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.insert(label);
        self
    }

    /// Returns this instruction with an exception block marker attached.
    #[must_use]
    pub fn with_block(mut self, block: ExceptionBlock) -> Self {
        self.blocks.push(block);
        self
    }

    /// The opcode.
    #[must_use]
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// The operand.
    #[must_use]
    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// Labels attached to this instruction, in ascending identity order.
    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.labels.iter().copied()
    }

    /// Returns true if `label` is attached to this instruction.
    #[must_use]
    pub fn has_label(&self, label: Label) -> bool {
        self.labels.contains(&label)
    }

    /// Exception block markers attached to this instruction.
    #[must_use]
    pub fn blocks(&self) -> &[ExceptionBlock] {
        &self.blocks
    }

    /// The member this instruction references, if any.
    #[must_use]
    pub fn member(&self) -> Option<&MemberRef> {
        match &self.operand {
            Operand::Member(member) => Some(member),
            _ => None,
        }
    }

    /// Every label this instruction may transfer control to.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<Label> {
        match &self.operand {
            Operand::Target(label) => vec![*label],
            Operand::Switch(labels) => labels.clone(),
            _ => Vec::new(),
        }
    }

    /// The local slot accessed by this instruction, normalising shorthand forms.
    #[must_use]
    pub fn local_slot(&self) -> Option<LocalSlot> {
        if let Some(index) = self.opcode.implicit_local() {
            return Some(LocalSlot::new(index));
        }
        match &self.operand {
            Operand::Local(slot) => Some(*slot),
            _ => None,
        }
    }

    /// The argument accessed by this instruction, normalising shorthand forms.
    #[must_use]
    pub fn argument(&self) -> Option<u16> {
        if let Some(index) = self.opcode.implicit_argument() {
            return Some(index);
        }
        match &self.operand {
            Operand::Argument(index) => Some(*index),
            _ => None,
        }
    }

    /// The integer constant loaded by this instruction, normalising `ldc.i4.*` forms.
    #[must_use]
    pub fn constant(&self) -> Option<i64> {
        if let Some(value) = self.opcode.implicit_constant() {
            return Some(i64::from(value));
        }
        match (self.opcode, &self.operand) {
            (OpCode::LdcI4S | OpCode::LdcI4 | OpCode::LdcI8, Operand::Immediate(imm)) => {
                imm.as_i64()
            }
            _ => None,
        }
    }

    pub(crate) fn take_attachments(&mut self) -> (BTreeSet<Label>, Vec<ExceptionBlock>) {
        (
            std::mem::take(&mut self.labels),
            std::mem::take(&mut self.blocks),
        )
    }

    pub(crate) fn attach(&mut self, labels: BTreeSet<Label>, blocks: Vec<ExceptionBlock>) {
        self.labels.extend(labels);
        // Markers carried over from an earlier instruction precede the local ones.
        let mut merged = blocks;
        merged.append(&mut self.blocks);
        self.blocks = merged;
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.labels {
            write!(f, "{label}: ")?;
        }
        write!(f, "{}", self.opcode)?;
        if let Some(operand) = self.operand.as_string() {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MethodSignature, TypeSig};

    #[test]
    fn test_operand_fits() {
        let method = MemberRef::method("Host", "Run", MethodSignature::void());
        let field = MemberRef::field("Host", "count", TypeSig::I4);

        assert!(Operand::Member(method.clone()).fits(OperandKind::Method));
        assert!(!Operand::Member(method).fits(OperandKind::Field));
        assert!(Operand::Member(field.clone()).fits(OperandKind::Field));
        assert!(Operand::Member(field).fits(OperandKind::Member));
        assert!(Operand::Immediate(Immediate::Int8(1)).fits(OperandKind::Int32));
        assert!(!Operand::Immediate(Immediate::Int64(1)).fits(OperandKind::Int32));
        assert!(!Operand::Switch(Vec::new()).fits(OperandKind::Switch));
        assert!(Operand::None.fits(OperandKind::None));
    }

    #[test]
    fn test_normalised_accessors() {
        assert_eq!(
            Instruction::simple(OpCode::Ldloc2).local_slot(),
            Some(LocalSlot::new(2))
        );
        assert_eq!(
            Instruction::new(OpCode::StlocS, Operand::Local(LocalSlot::new(9))).local_slot(),
            Some(LocalSlot::new(9))
        );
        assert_eq!(Instruction::simple(OpCode::Ldarg0).argument(), Some(0));
        assert_eq!(Instruction::simple(OpCode::LdcI4M1).constant(), Some(-1));
        assert_eq!(
            Instruction::new(OpCode::LdcI8, Operand::Immediate(Immediate::Int64(1 << 40)))
                .constant(),
            Some(1 << 40)
        );
        assert_eq!(
            Instruction::new(OpCode::LdcR4, Operand::Immediate(Immediate::Float32(2.0)))
                .constant(),
            None
        );
    }

    #[test]
    fn test_attachments_move() {
        let mut source = Instruction::simple(OpCode::Nop)
            .with_label(Label::new(1))
            .with_block(ExceptionBlock::BeginTry);
        let (labels, blocks) = source.take_attachments();
        assert_eq!(source.labels().count(), 0);
        assert!(source.blocks().is_empty());

        let mut target = Instruction::simple(OpCode::Ret).with_block(ExceptionBlock::End);
        target.attach(labels, blocks);
        assert!(target.has_label(Label::new(1)));
        assert_eq!(
            target.blocks(),
            &[ExceptionBlock::BeginTry, ExceptionBlock::End]
        );
    }

    #[test]
    fn test_display() {
        let instr = Instruction::branch(OpCode::Br, Label::new(12)).with_label(Label::new(3));
        assert_eq!(instr.to_string(), "L_0003: br L_0012");
        assert_eq!(format!("{:X}", Immediate::Int8(-1)), "FF");
    }
}

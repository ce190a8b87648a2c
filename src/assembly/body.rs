//! Routine bodies: ordered instructions, the local variable table and the label allocator.
//!
//! A [`RoutineBody`] is what the patcher consumes and produces. It is index-addressable and
//! owns the two pieces of bookkeeping edits must keep consistent:
//!
//! - the [`LocalTable`], which only ever grows; existing slots keep their index and type
//! - the label allocator, which hands out identities never used before in this body
//!
//! # Examples
//!
//! ```rust
//! use hookscope::assembly::{Instruction, OpCode, RoutineBody};
//! use hookscope::metadata::TypeSig;
//!
//! let mut body = RoutineBody::new();
//! let slot = body.declare_local(TypeSig::I4);
//! let exit = body.define_label();
//! body.push(Instruction::simple(OpCode::Ret).with_label(exit));
//!
//! assert_eq!(slot.index(), 0);
//! assert_eq!(body.label_position(exit), Some(0));
//! ```

use std::collections::HashMap;

use crate::{
    assembly::instruction::{Instruction, Label, LocalSlot},
    metadata::TypeSig,
};

/// A declared local variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    /// Slot index
    pub slot: LocalSlot,
    /// Declared type
    pub ty: TypeSig,
    /// Whether the local is pinned
    pub pinned: bool,
}

/// The local variable table of a routine.
///
/// Slots are allocated sequentially and are never removed or renumbered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalTable {
    locals: Vec<LocalVariable>,
}

impl LocalTable {
    /// Declares a new local and returns its slot.
    pub fn declare(&mut self, ty: TypeSig) -> LocalSlot {
        self.push(ty, false)
    }

    /// Declares a new pinned local and returns its slot.
    pub fn declare_pinned(&mut self, ty: TypeSig) -> LocalSlot {
        self.push(ty, true)
    }

    fn push(&mut self, ty: TypeSig, pinned: bool) -> LocalSlot {
        #[allow(clippy::cast_possible_truncation)]
        let slot = LocalSlot::new(self.locals.len() as u16);
        self.locals.push(LocalVariable { slot, ty, pinned });
        slot
    }

    /// Returns the local declared at `slot`.
    #[must_use]
    pub fn get(&self, slot: LocalSlot) -> Option<&LocalVariable> {
        self.locals.get(usize::from(slot.index()))
    }

    /// Returns true if `slot` has been declared.
    #[must_use]
    pub fn contains(&self, slot: LocalSlot) -> bool {
        usize::from(slot.index()) < self.locals.len()
    }

    /// Number of declared locals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locals.len()
    }

    /// Returns true if no locals are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    /// Iterates the declared locals in slot order.
    pub fn iter(&self) -> std::slice::Iter<'_, LocalVariable> {
        self.locals.iter()
    }
}

/// An ordered, index-addressable instruction sequence with its locals and label allocator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutineBody {
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) locals: LocalTable,
    pub(crate) next_label: u32,
}

impl RoutineBody {
    /// Creates an empty body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a body from existing parts.
    ///
    /// The label allocator starts after the highest label found on, or referenced by, any of
    /// `instructions`.
    #[must_use]
    pub fn from_parts(instructions: Vec<Instruction>, locals: LocalTable) -> Self {
        let next_label = instructions
            .iter()
            .flat_map(|instr| instr.labels().chain(instr.branch_targets()))
            .map(|label| label.id() + 1)
            .max()
            .unwrap_or(0);

        Self {
            instructions,
            locals,
            next_label,
        }
    }

    /// Allocates a fresh label. It is not attached to any instruction yet.
    pub fn define_label(&mut self) -> Label {
        let label = Label::new(self.next_label);
        self.next_label += 1;
        label
    }

    /// Declares a new local and returns its slot.
    pub fn declare_local(&mut self, ty: TypeSig) -> LocalSlot {
        self.locals.declare(ty)
    }

    /// Appends an instruction.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// The instructions in order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// The local variable table.
    #[must_use]
    pub fn locals(&self) -> &LocalTable {
        &self.locals
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the body has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Returns the instruction at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Returns the index of the instruction `label` is attached to.
    #[must_use]
    pub fn label_position(&self, label: Label) -> Option<usize> {
        self.instructions
            .iter()
            .position(|instr| instr.has_label(label))
    }

    /// Maps every attached label to the index of its instruction.
    #[must_use]
    pub fn label_positions(&self) -> HashMap<Label, usize> {
        let mut positions = HashMap::new();
        for (index, instr) in self.instructions.iter().enumerate() {
            for label in instr.labels() {
                positions.insert(label, index);
            }
        }
        positions
    }
}

impl std::fmt::Display for RoutineBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for local in self.locals.iter() {
            writeln!(f, ".local {} {}", local.slot, local.ty)?;
        }
        for (index, instr) in self.instructions.iter().enumerate() {
            writeln!(f, "{index:>4}  {instr}")?;
        }
        Ok(())
    }
}

//! Fluent instruction emission with named labels.
//!
//! [`InstructionEmitter`] is the authoring tool for payloads and test bodies. Every method
//! returns `Result<&mut Self>` so emission chains with `?`, and branch targets are referred to
//! by name. Names are mapped to [`Label`] identities as they are first seen and checked when the
//! emitter is finished:
//!
//! - a name that is branched to but never placed yields [`crate::Error::UndefinedLabel`]
//! - placing the same name twice yields [`crate::Error::DuplicateLabel`]
//!
//! Placed labels and exception block markers attach to the next emitted instruction.
//!
//! [`RoutineBodyBuilder`] wraps the emitter together with local declarations and produces a
//! complete [`RoutineBody`].
//!
//! # Examples
//!
//! ```rust
//! use hookscope::assembly::RoutineBodyBuilder;
//! use hookscope::metadata::TypeSig;
//!
//! let body = RoutineBodyBuilder::new()
//!     .local(TypeSig::I4)
//!     .implementation(|asm| {
//!         asm.ldc_i4(0)?
//!             .stloc(0)?
//!             .label("loop")?
//!             .ldloc(0)?
//!             .ldc_i4(1)?
//!             .add()?
//!             .dup()?
//!             .stloc(0)?
//!             .ldc_i4(10)?
//!             .blt("loop")?
//!             .ret()?;
//!         Ok(())
//!     })
//!     .build()?;
//!
//! assert_eq!(body.len(), 10);
//! assert_eq!(body.locals().len(), 1);
//! # Ok::<(), hookscope::Error>(())
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
    assembly::{
        body::{LocalTable, RoutineBody},
        instruction::{ExceptionBlock, Immediate, Instruction, Label, LocalSlot, Operand},
        opcode::OpCode,
    },
    metadata::{MemberRef, TypeName, TypeSig},
    Error, Result,
};

/// Type alias for body implementation closures
type ImplementationFn = Box<dyn FnOnce(&mut InstructionEmitter) -> Result<()>>;

/// Fluent builder for instruction sequences with named labels.
pub struct InstructionEmitter {
    instructions: Vec<Instruction>,
    /// label name -> allocated identity
    names: HashMap<String, Label>,
    /// names that have been placed on an instruction
    placed: HashSet<String>,
    pending_labels: BTreeSet<Label>,
    pending_blocks: Vec<ExceptionBlock>,
    next_label: u32,
}

impl Default for InstructionEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionEmitter {
    /// Creates an empty emitter.
    #[must_use]
    pub fn new() -> Self {
        Self::continuing(0)
    }

    /// Creates an emitter whose label identities start at `next_label`, so that its labels do
    /// not collide with those of an existing body.
    pub(crate) fn continuing(next_label: u32) -> Self {
        Self {
            instructions: Vec::new(),
            names: HashMap::new(),
            placed: HashSet::new(),
            pending_labels: BTreeSet::new(),
            pending_blocks: Vec::new(),
            next_label,
        }
    }

    fn label_for(&mut self, name: &str) -> Label {
        if let Some(label) = self.names.get(name) {
            return *label;
        }
        let label = Label::new(self.next_label);
        self.next_label += 1;
        self.names.insert(name.to_string(), label);
        label
    }

    /// Emits an instruction after checking that the operand fits the opcode.
    ///
    /// Labels and markers placed since the previous instruction attach to this one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperandMismatch`] if the operand has the wrong shape.
    pub fn emit(&mut self, mut instruction: Instruction) -> Result<&mut Self> {
        if !instruction.operand.fits(instruction.opcode.operand_kind()) {
            return Err(Error::OperandMismatch {
                index: self.instructions.len(),
                opcode: instruction.opcode.mnemonic().to_string(),
            });
        }

        let labels = std::mem::take(&mut self.pending_labels);
        let blocks = std::mem::take(&mut self.pending_blocks);
        instruction.attach(labels, blocks);
        self.instructions.push(instruction);
        Ok(self)
    }

    fn op(&mut self, opcode: OpCode) -> Result<&mut Self> {
        self.emit(Instruction::simple(opcode))
    }

    fn with_operand(&mut self, opcode: OpCode, operand: Operand) -> Result<&mut Self> {
        self.emit(Instruction::new(opcode, operand))
    }

    /// Places a named label on the next emitted instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateLabel`] if the name was already placed.
    pub fn label(&mut self, name: &str) -> Result<&mut Self> {
        if !self.placed.insert(name.to_string()) {
            return Err(Error::DuplicateLabel(name.to_string()));
        }
        let label = self.label_for(name);
        self.pending_labels.insert(label);
        Ok(self)
    }

    /// Attaches an existing label identity to the next emitted instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateLabel`] if the identity is already attached within this
    /// emitter.
    pub fn place(&mut self, label: Label) -> Result<&mut Self> {
        let attached = self.pending_labels.contains(&label)
            || self.instructions.iter().any(|instr| instr.has_label(label));
        if attached {
            return Err(Error::DuplicateLabel(label.to_string()));
        }
        self.pending_labels.insert(label);
        Ok(self)
    }

    /// Emits a branch of kind `opcode` to the named label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperandMismatch`] if `opcode` is not a branch.
    pub fn branch(&mut self, opcode: OpCode, name: &str) -> Result<&mut Self> {
        let target = self.label_for(name);
        self.with_operand(opcode, Operand::Target(target))
    }

    /// Emits a branch of kind `opcode` to an existing label identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperandMismatch`] if `opcode` is not a branch.
    pub fn branch_to(&mut self, opcode: OpCode, target: Label) -> Result<&mut Self> {
        self.with_operand(opcode, Operand::Target(target))
    }

    /// Emits a `switch` over the named labels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperandMismatch`] if `names` is empty.
    pub fn switch(&mut self, names: &[&str]) -> Result<&mut Self> {
        let targets: Vec<Label> = names.iter().map(|name| self.label_for(name)).collect();
        self.with_operand(OpCode::Switch, Operand::Switch(targets))
    }

    /// Opens a `try` region at the next instruction.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn begin_try(&mut self) -> Result<&mut Self> {
        self.pending_blocks.push(ExceptionBlock::BeginTry);
        Ok(self)
    }

    /// Opens a `catch` handler at the next instruction.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn begin_catch(&mut self, exception: Option<TypeName>) -> Result<&mut Self> {
        self.pending_blocks
            .push(ExceptionBlock::BeginCatch(exception));
        Ok(self)
    }

    /// Opens a `finally` handler at the next instruction.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn begin_finally(&mut self) -> Result<&mut Self> {
        self.pending_blocks.push(ExceptionBlock::BeginFinally);
        Ok(self)
    }

    /// Closes the innermost protected construct at the next instruction.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for chaining.
    pub fn end_block(&mut self) -> Result<&mut Self> {
        self.pending_blocks.push(ExceptionBlock::End);
        Ok(self)
    }

    /// `nop`
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn nop(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Nop)
    }

    /// `ldarg.0`, usually `this`
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn ldarg_0(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Ldarg0)
    }

    /// `ldarg.1`
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn ldarg_1(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Ldarg1)
    }

    /// Loads argument `index`, choosing the shortest form.
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn ldarg(&mut self, index: u16) -> Result<&mut Self> {
        match index {
            0 => self.op(OpCode::Ldarg0),
            1 => self.op(OpCode::Ldarg1),
            2 => self.op(OpCode::Ldarg2),
            3 => self.op(OpCode::Ldarg3),
            i if i <= u16::from(u8::MAX) => self.with_operand(OpCode::LdargS, Operand::Argument(i)),
            i => self.with_operand(OpCode::Ldarg, Operand::Argument(i)),
        }
    }

    /// Loads local `slot`, choosing the shortest form.
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn ldloc(&mut self, slot: u16) -> Result<&mut Self> {
        match slot {
            0 => self.op(OpCode::Ldloc0),
            1 => self.op(OpCode::Ldloc1),
            2 => self.op(OpCode::Ldloc2),
            3 => self.op(OpCode::Ldloc3),
            s if s <= u16::from(u8::MAX) => {
                self.with_operand(OpCode::LdlocS, Operand::Local(LocalSlot::new(s)))
            }
            s => self.with_operand(OpCode::Ldloc, Operand::Local(LocalSlot::new(s))),
        }
    }

    /// Stores to local `slot`, choosing the shortest form.
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn stloc(&mut self, slot: u16) -> Result<&mut Self> {
        match slot {
            0 => self.op(OpCode::Stloc0),
            1 => self.op(OpCode::Stloc1),
            2 => self.op(OpCode::Stloc2),
            3 => self.op(OpCode::Stloc3),
            s if s <= u16::from(u8::MAX) => {
                self.with_operand(OpCode::StlocS, Operand::Local(LocalSlot::new(s)))
            }
            s => self.with_operand(OpCode::Stloc, Operand::Local(LocalSlot::new(s))),
        }
    }

    /// Loads the address of local `slot`.
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn ldloca(&mut self, slot: u16) -> Result<&mut Self> {
        self.with_operand(OpCode::LdlocaS, Operand::Local(LocalSlot::new(slot)))
    }

    /// Loads an `int32` constant, choosing the shortest form.
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn ldc_i4(&mut self, value: i32) -> Result<&mut Self> {
        let shorthand = match value {
            -1 => Some(OpCode::LdcI4M1),
            0 => Some(OpCode::LdcI40),
            1 => Some(OpCode::LdcI41),
            2 => Some(OpCode::LdcI42),
            3 => Some(OpCode::LdcI43),
            4 => Some(OpCode::LdcI44),
            5 => Some(OpCode::LdcI45),
            6 => Some(OpCode::LdcI46),
            7 => Some(OpCode::LdcI47),
            8 => Some(OpCode::LdcI48),
            _ => None,
        };
        if let Some(opcode) = shorthand {
            return self.op(opcode);
        }
        match i8::try_from(value) {
            Ok(small) => {
                self.with_operand(OpCode::LdcI4S, Operand::Immediate(Immediate::Int8(small)))
            }
            Err(_) => self.with_operand(OpCode::LdcI4, Operand::Immediate(Immediate::Int32(value))),
        }
    }

    /// Loads an `int64` constant.
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn ldc_i8(&mut self, value: i64) -> Result<&mut Self> {
        self.with_operand(OpCode::LdcI8, Operand::Immediate(Immediate::Int64(value)))
    }

    /// Loads a `float32` constant.
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn ldc_r4(&mut self, value: f32) -> Result<&mut Self> {
        self.with_operand(OpCode::LdcR4, Operand::Immediate(Immediate::Float32(value)))
    }

    /// Loads a string literal.
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn ldstr(&mut self, value: &str) -> Result<&mut Self> {
        self.with_operand(OpCode::Ldstr, Operand::String(value.to_string()))
    }

    /// `ldnull`
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn ldnull(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Ldnull)
    }

    /// `dup`
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn dup(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Dup)
    }

    /// `pop`
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn pop(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Pop)
    }

    /// `add`
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn add(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Add)
    }

    /// `sub`
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn sub(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Sub)
    }

    /// `ceq`
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn ceq(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Ceq)
    }

    /// `call` to a method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperandMismatch`] if `method` is not a method reference.
    pub fn call(&mut self, method: MemberRef) -> Result<&mut Self> {
        self.with_operand(OpCode::Call, Operand::Member(method))
    }

    /// `callvirt` to a method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperandMismatch`] if `method` is not a method reference.
    pub fn callvirt(&mut self, method: MemberRef) -> Result<&mut Self> {
        self.with_operand(OpCode::Callvirt, Operand::Member(method))
    }

    /// `newobj` with a constructor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperandMismatch`] if `ctor` is not a method reference.
    pub fn newobj(&mut self, ctor: MemberRef) -> Result<&mut Self> {
        self.with_operand(OpCode::Newobj, Operand::Member(ctor))
    }

    /// `ldfld`
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperandMismatch`] if `field` is not a field reference.
    pub fn ldfld(&mut self, field: MemberRef) -> Result<&mut Self> {
        self.with_operand(OpCode::Ldfld, Operand::Member(field))
    }

    /// `stfld`
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperandMismatch`] if `field` is not a field reference.
    pub fn stfld(&mut self, field: MemberRef) -> Result<&mut Self> {
        self.with_operand(OpCode::Stfld, Operand::Member(field))
    }

    /// `ldsfld`
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperandMismatch`] if `field` is not a field reference.
    pub fn ldsfld(&mut self, field: MemberRef) -> Result<&mut Self> {
        self.with_operand(OpCode::Ldsfld, Operand::Member(field))
    }

    /// `stsfld`
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperandMismatch`] if `field` is not a field reference.
    pub fn stsfld(&mut self, field: MemberRef) -> Result<&mut Self> {
        self.with_operand(OpCode::Stsfld, Operand::Member(field))
    }

    /// `isinst`
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn isinst(&mut self, ty: impl Into<TypeName>) -> Result<&mut Self> {
        self.with_operand(OpCode::Isinst, Operand::Member(MemberRef::type_ref(ty)))
    }

    /// `br` to the named label.
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn br(&mut self, name: &str) -> Result<&mut Self> {
        self.branch(OpCode::Br, name)
    }

    /// `brtrue` to the named label.
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn brtrue(&mut self, name: &str) -> Result<&mut Self> {
        self.branch(OpCode::Brtrue, name)
    }

    /// `brfalse` to the named label.
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn brfalse(&mut self, name: &str) -> Result<&mut Self> {
        self.branch(OpCode::Brfalse, name)
    }

    /// `blt` to the named label.
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn blt(&mut self, name: &str) -> Result<&mut Self> {
        self.branch(OpCode::Blt, name)
    }

    /// `leave` to the named label.
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn leave(&mut self, name: &str) -> Result<&mut Self> {
        self.branch(OpCode::Leave, name)
    }

    /// `endfinally`
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn endfinally(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Endfinally)
    }

    /// `throw`
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn throw(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Throw)
    }

    /// `ret`
    ///
    /// # Errors
    ///
    /// Never fails in practice; returns `Result` for chaining.
    pub fn ret(&mut self) -> Result<&mut Self> {
        self.op(OpCode::Ret)
    }

    /// Number of instructions emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Finishes emission and resolves every named label.
    ///
    /// Returns the instructions, the name to label mapping and the next free label identity.
    ///
    /// # Errors
    ///
    /// - [`Error::UndefinedLabel`] if a branch names a label that was never placed
    /// - [`Error::Malformed`] if labels or markers were placed after the last instruction
    pub fn finish(self) -> Result<(Vec<Instruction>, HashMap<String, Label>, u32)> {
        if !self.pending_labels.is_empty() || !self.pending_blocks.is_empty() {
            return Err(malformed_error!(
                "{} label(s) and {} block marker(s) are not followed by an instruction",
                self.pending_labels.len(),
                self.pending_blocks.len()
            ));
        }

        let mut undefined: Vec<&String> = self
            .names
            .keys()
            .filter(|name| !self.placed.contains(*name))
            .collect();
        undefined.sort();
        if let Some(name) = undefined.first() {
            return Err(Error::UndefinedLabel((*name).clone()));
        }

        Ok((self.instructions, self.names, self.next_label))
    }
}

/// Builder for complete routine bodies.
///
/// # Examples
///
/// ```rust
/// use hookscope::assembly::{OpCode, RoutineBodyBuilder};
///
/// let body = RoutineBodyBuilder::new()
///     .implementation(|asm| {
///         asm.ldarg_0()?.brtrue("done")?.nop()?.label("done")?.ret()?;
///         Ok(())
///     })
///     .build()?;
/// assert_eq!(body.get(3).map(|i| i.opcode()), Some(OpCode::Ret));
/// # Ok::<(), hookscope::Error>(())
/// ```
#[derive(Default)]
pub struct RoutineBodyBuilder {
    locals: Vec<TypeSig>,
    implementation: Option<ImplementationFn>,
}

impl RoutineBodyBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a local; slots are assigned in declaration order.
    #[must_use]
    pub fn local(mut self, ty: TypeSig) -> Self {
        self.locals.push(ty);
        self
    }

    /// Sets the closure that emits the instructions.
    #[must_use]
    pub fn implementation<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut InstructionEmitter) -> Result<()> + 'static,
    {
        self.implementation = Some(Box::new(f));
        self
    }

    /// Builds the body.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the implementation closure or by label resolution.
    pub fn build(self) -> Result<RoutineBody> {
        self.build_with_labels().map(|(body, _)| body)
    }

    /// Builds the body and also returns the name to label mapping.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the implementation closure or by label resolution.
    pub fn build_with_labels(self) -> Result<(RoutineBody, HashMap<String, Label>)> {
        let mut emitter = InstructionEmitter::new();
        if let Some(implementation) = self.implementation {
            implementation(&mut emitter)?;
        }
        let (instructions, names, next_label) = emitter.finish()?;

        let mut locals = LocalTable::default();
        for ty in self.locals {
            locals.declare(ty);
        }

        Ok((
            RoutineBody {
                instructions,
                locals,
                next_label,
            },
            names,
        ))
    }
}

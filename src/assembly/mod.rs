//! Instruction model for host routines.
//!
//! This module contains the leaf data types everything else operates on: opcodes, instructions
//! with their operands and attachments, routine bodies with their local tables, and the
//! [`InstructionEmitter`] used to author instruction sequences.
//!
//! # Architecture
//!
//! - [`opcode`] - The closed [`OpCode`] set with flow and operand classification
//! - [`instruction`] - [`Instruction`], [`Operand`], [`Label`], [`LocalSlot`], [`ExceptionBlock`]
//! - [`body`] - [`RoutineBody`] and its [`LocalTable`]
//! - [`emitter`] - [`InstructionEmitter`] and [`RoutineBodyBuilder`]
//!
//! Instructions reference jump targets by [`Label`] identity rather than by offset. Edits never
//! need to re-resolve branches, they only need to keep every label attached to the instruction
//! it marks.
//!
//! # Examples
//!
//! ```rust
//! use hookscope::assembly::{InstructionEmitter, OpCode};
//!
//! let mut asm = InstructionEmitter::new();
//! asm.ldarg_0()?.brfalse("skip")?.nop()?.label("skip")?.ret()?;
//! let (instructions, labels, _) = asm.finish()?;
//!
//! assert_eq!(instructions.len(), 4);
//! assert!(instructions[3].has_label(labels["skip"]));
//! assert_eq!(instructions[1].opcode(), OpCode::Brfalse);
//! # Ok::<(), hookscope::Error>(())
//! ```

pub mod body;
pub mod emitter;
pub mod instruction;
pub mod opcode;

pub use body::{LocalTable, LocalVariable, RoutineBody};
pub use emitter::{InstructionEmitter, RoutineBodyBuilder};
pub use instruction::{ExceptionBlock, Immediate, Instruction, Label, LocalSlot, Operand};
pub use opcode::{FlowType, OpCode, OperandKind};

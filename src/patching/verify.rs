//! Structural verification of edited bodies.
//!
//! This is not a bytecode verifier. It checks the bookkeeping an edit can break:
//!
//! - every label is attached to exactly one instruction
//! - every branch target is attached somewhere
//! - every local slot access refers to a declared slot
//! - every operand has the shape its opcode requires
//! - exception block markers nest
//!
//! The first violation found, scanning the body front to back, is returned.

use std::collections::HashSet;

use crate::{
    assembly::{ExceptionBlock, RoutineBody},
    Error, Result,
};

struct OpenRegion {
    start: usize,
    in_handler: bool,
}

/// Verifies the structural consistency of `body`.
///
/// # Errors
///
/// - [`Error::DuplicateLabel`] if a label is attached more than once
/// - [`Error::UndefinedLabel`] if a branch targets an unattached label
/// - [`Error::InvalidSlotReference`] if a local slot is not declared
/// - [`Error::OperandMismatch`] if an operand does not fit its opcode
/// - [`Error::UnbalancedBlock`] if exception block markers do not nest
pub fn verify(body: &RoutineBody) -> Result<()> {
    let mut attached = HashSet::new();
    for instr in body.instructions() {
        for label in instr.labels() {
            if !attached.insert(label) {
                return Err(Error::DuplicateLabel(label.to_string()));
            }
        }
    }

    let mut open: Vec<OpenRegion> = Vec::new();
    for (index, instr) in body.instructions().iter().enumerate() {
        if !instr.operand().fits(instr.opcode().operand_kind()) {
            return Err(Error::OperandMismatch {
                index,
                opcode: instr.opcode().mnemonic().to_string(),
            });
        }

        if let Some(target) = instr
            .branch_targets()
            .into_iter()
            .find(|target| !attached.contains(target))
        {
            return Err(Error::UndefinedLabel(target.to_string()));
        }

        if let Some(slot) = instr.local_slot() {
            if !body.locals().contains(slot) {
                return Err(Error::InvalidSlotReference {
                    directive: None,
                    slot: slot.index(),
                    declared: body.locals().len(),
                });
            }
        }

        for block in instr.blocks() {
            match block {
                ExceptionBlock::BeginTry => open.push(OpenRegion {
                    start: index,
                    in_handler: false,
                }),
                ExceptionBlock::BeginCatch(_)
                | ExceptionBlock::BeginFinally
                | ExceptionBlock::BeginFault => match open.last_mut() {
                    Some(region) => region.in_handler = true,
                    None => return Err(Error::UnbalancedBlock { index }),
                },
                ExceptionBlock::End => match open.pop() {
                    Some(region) if region.in_handler => {}
                    _ => return Err(Error::UnbalancedBlock { index }),
                },
            }
        }
    }

    match open.first() {
        Some(region) => Err(Error::UnbalancedBlock {
            index: region.start,
        }),
        None => Ok(()),
    }
}

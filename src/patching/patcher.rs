//! Application of edit directives to routine bodies.
//!
//! Directives are applied one after another, and each anchor is located against the body as
//! edited by all previous directives. A directive may therefore anchor on an instruction that an
//! earlier directive inserted.
//!
//! The patcher owns the bookkeeping that keeps the result valid:
//!
//! - labels and exception markers follow the directive's [`LabelPolicy`] and are never dropped
//!   silently; a replace that would lose one fails with [`Error::OrphanedLabel`] or
//!   [`Error::OrphanedBlock`]
//! - payload local slots must already be declared in the body's [`crate::assembly::LocalTable`]
//! - payload labels must not already be attached elsewhere in the body
//! - the label allocator is advanced past every label the payload brings in
//!
//! The input body is never modified; a failed application leaves nothing half-applied.

use std::collections::BTreeSet;

use crate::{
    assembly::{ExceptionBlock, Instruction, Label, RoutineBody},
    patching::{
        directive::{EditDirective, LabelPolicy, Position},
        verify::verify,
    },
    Error, Result,
};

/// Applies `directives` to a copy of `body` and verifies the result.
///
/// # Errors
///
/// Returns the first installation error encountered, see [`InstructionPatcher::apply`].
///
/// # Examples
///
/// ```rust
/// use hookscope::assembly::{Instruction, RoutineBodyBuilder};
/// use hookscope::metadata::{MemberRef, MethodSignature};
/// use hookscope::patching::{apply, EditDirective, InstructionMatcher};
///
/// let target = MemberRef::method("Host", "Tick", MethodSignature::void());
/// let hook = MemberRef::method("Hooks", "OnTick", MethodSignature::void());
///
/// let t = target.clone();
/// let body = RoutineBodyBuilder::new()
///     .implementation(move |asm| {
///         asm.nop()?.call(t)?.ret()?;
///         Ok(())
///     })
///     .build()?;
///
/// let patched = apply(
///     &body,
///     &[EditDirective::after(
///         InstructionMatcher::calls(target),
///         vec![Instruction::call(hook.clone())],
///     )],
/// )?;
///
/// assert_eq!(patched.len(), 4);
/// assert_eq!(patched.get(2).and_then(|i| i.member()), Some(&hook));
/// # Ok::<(), hookscope::Error>(())
/// ```
pub fn apply(body: &RoutineBody, directives: &[EditDirective]) -> Result<RoutineBody> {
    InstructionPatcher::new().apply(body, directives)
}

/// Applies edit directives, optionally verifying the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionPatcher {
    verify: bool,
}

impl Default for InstructionPatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionPatcher {
    /// Creates a patcher that verifies its output.
    #[must_use]
    pub fn new() -> Self {
        Self { verify: true }
    }

    /// Enables or disables post-edit verification.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Applies `directives` in order to a copy of `body`.
    ///
    /// # Errors
    ///
    /// - [`Error::AnchorNotFound`] if an anchor matches nothing or its offset leaves the body
    /// - [`Error::AmbiguousAnchor`] if an anchor requiring one match finds several
    /// - [`Error::OrphanedLabel`], [`Error::OrphanedBlock`] if a replace would drop an attachment
    /// - [`Error::InvalidSlotReference`] if a payload uses an undeclared local
    /// - [`Error::DuplicateLabel`] if a payload attaches a label already present in the body
    /// - any error of [`verify`] when verification is enabled
    pub fn apply(&self, body: &RoutineBody, directives: &[EditDirective]) -> Result<RoutineBody> {
        let mut patched = body.clone();
        for (index, directive) in directives.iter().enumerate() {
            apply_directive(&mut patched, index, directive)?;
            log::debug!(
                "applied directive #{index} ({directive}), body now has {} instructions",
                patched.len()
            );
        }

        if self.verify {
            verify(&patched)?;
        }
        Ok(patched)
    }
}

fn locate(body: &RoutineBody, index: usize, directive: &EditDirective) -> Result<usize> {
    directive.anchor.locate(body).map_err(|error| match error {
        Error::AmbiguousMatch { matches, .. } => Error::AmbiguousAnchor {
            directive: index,
            anchor: directive.anchor.to_string(),
            matches,
        },
        Error::NoMatch { .. } | Error::IndexOutOfRange { .. } => Error::AnchorNotFound {
            directive: index,
            anchor: directive.anchor.to_string(),
        },
        other => other,
    })
}

fn check_payload(
    body: &RoutineBody,
    index: usize,
    directive: &EditDirective,
    replaced: std::ops::Range<usize>,
) -> Result<()> {
    for instr in &directive.payload {
        if let Some(slot) = instr.local_slot() {
            if !body.locals().contains(slot) {
                return Err(Error::InvalidSlotReference {
                    directive: Some(index),
                    slot: slot.index(),
                    declared: body.locals().len(),
                });
            }
        }
    }

    let mut seen = BTreeSet::new();
    for label in directive.payload.iter().flat_map(Instruction::labels) {
        let elsewhere = body
            .instructions()
            .iter()
            .enumerate()
            .any(|(i, instr)| !replaced.contains(&i) && instr.has_label(label));
        if elsewhere || !seen.insert(label) {
            return Err(Error::DuplicateLabel(label.to_string()));
        }
    }
    Ok(())
}

fn advance_allocator(body: &mut RoutineBody, payload: &[Instruction]) {
    let highest = payload
        .iter()
        .flat_map(|instr| instr.labels().chain(instr.branch_targets()))
        .map(Label::id)
        .max();
    if let Some(highest) = highest {
        body.next_label = body.next_label.max(highest + 1);
    }
}

fn apply_directive(body: &mut RoutineBody, index: usize, directive: &EditDirective) -> Result<()> {
    let at = locate(body, index, directive)?;
    let mut payload = directive.payload.clone();

    match directive.position {
        Position::Before => {
            check_payload(body, index, directive, 0..0)?;
            if directive.label_policy == LabelPolicy::Move {
                if let Some(first) = payload.first_mut() {
                    let (labels, blocks) = body.instructions[at].take_attachments();
                    first.attach(labels, blocks);
                }
            }
            advance_allocator(body, &payload);
            body.instructions.splice(at..at, payload);
        }
        Position::After => {
            check_payload(body, index, directive, 0..0)?;
            advance_allocator(body, &payload);
            body.instructions.splice(at + 1..at + 1, payload);
        }
        Position::Replace { count } => {
            if count == 0 {
                return Err(malformed_error!(
                    "Directive #{} replaces zero instructions, use before/after instead",
                    index
                ));
            }
            let end = at + count;
            if end > body.len() {
                return Err(Error::AnchorNotFound {
                    directive: index,
                    anchor: format!("{} (range of {} exceeds body)", directive.anchor, count),
                });
            }
            check_payload(body, index, directive, at..end)?;

            let mut labels = BTreeSet::new();
            let mut blocks: Vec<ExceptionBlock> = Vec::new();
            let mut first_block = None;
            for (offset, instr) in body.instructions[at..end].iter().enumerate() {
                labels.extend(instr.labels());
                if !instr.blocks().is_empty() {
                    first_block.get_or_insert(at + offset);
                    blocks.extend(instr.blocks().iter().cloned());
                }
            }

            match directive.label_policy {
                LabelPolicy::Keep => {
                    // Only labels the payload explicitly carries survive.
                    if let Some(orphan) = labels
                        .iter()
                        .find(|label| !payload.iter().any(|instr| instr.has_label(**label)))
                    {
                        return Err(Error::OrphanedLabel {
                            directive: index,
                            label: orphan.to_string(),
                        });
                    }
                    if let Some(block_index) = first_block {
                        return Err(Error::OrphanedBlock {
                            directive: index,
                            index: block_index,
                        });
                    }
                }
                LabelPolicy::Move => {
                    labels.retain(|label| !payload.iter().any(|instr| instr.has_label(*label)));
                    if let Some(first) = payload.first_mut() {
                        first.attach(labels, blocks);
                    } else if let Some(next) = body.instructions.get_mut(end) {
                        next.attach(labels, blocks);
                    } else if let Some(orphan) = labels.iter().next() {
                        return Err(Error::OrphanedLabel {
                            directive: index,
                            label: orphan.to_string(),
                        });
                    } else if let Some(block_index) = first_block {
                        return Err(Error::OrphanedBlock {
                            directive: index,
                            index: block_index,
                        });
                    }
                }
            }

            advance_allocator(body, &payload);
            body.instructions.splice(at..end, payload);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{LocalSlot, OpCode, Operand},
        metadata::{MemberRef, MethodSignature, TypeSig},
        patching::{InstructionMatcher, Occurrence},
        test::{event_hook, member_x, twenty_instruction_body},
    };

    #[test]
    fn test_insert_after_unique_call() -> Result<()> {
        let body = twenty_instruction_body();
        let before = body.label_positions();

        let patched = apply(
            &body,
            &[EditDirective::after(
                InstructionMatcher::calls(member_x()),
                vec![Instruction::call(event_hook())],
            )],
        )?;

        assert_eq!(patched.len(), 21);
        assert_eq!(patched.get(8).and_then(Instruction::member), Some(&event_hook()));
        for (label, position) in before {
            let expected = if position > 7 { position + 1 } else { position };
            assert_eq!(patched.label_position(label), Some(expected));
        }
        Ok(())
    }

    #[test]
    fn test_before_keeps_label_on_anchor() -> Result<()> {
        let body = twenty_instruction_body();
        let loop_head = body.get(3).unwrap().labels().next().unwrap();

        let directive = EditDirective::before(
            InstructionMatcher::HasLabel(loop_head),
            vec![Instruction::simple(OpCode::Nop)],
        );
        let kept = apply(&body, &[directive.clone()])?;
        assert_eq!(kept.label_position(loop_head), Some(4));
        assert_eq!(kept.get(3).unwrap().opcode(), OpCode::Nop);

        let moved = apply(&body, &[directive.move_labels()])?;
        assert_eq!(moved.label_position(loop_head), Some(3));
        assert!(moved.get(4).unwrap().labels().next().is_none());
        Ok(())
    }

    #[test]
    fn test_replace_requires_reattachment() -> Result<()> {
        let body = twenty_instruction_body();
        let loop_head = body.get(3).unwrap().labels().next().unwrap();
        let anchor = InstructionMatcher::HasLabel(loop_head);

        let orphaning =
            EditDirective::replace(anchor.clone(), 1, vec![Instruction::simple(OpCode::Nop)]);
        assert!(matches!(
            apply(&body, &[orphaning.clone()]),
            Err(Error::OrphanedLabel { directive: 0, .. })
        ));

        let explicit = EditDirective::replace(
            anchor.clone(),
            1,
            vec![Instruction::simple(OpCode::Nop).with_label(loop_head)],
        );
        assert_eq!(apply(&body, &[explicit])?.label_position(loop_head), Some(3));

        let moved = apply(&body, &[orphaning.move_labels()])?;
        assert_eq!(moved.label_position(loop_head), Some(3));
        assert_eq!(moved.len(), body.len());

        let removed = apply(&body, &[EditDirective::replace(anchor, 1, vec![]).move_labels()])?;
        assert_eq!(removed.len(), body.len() - 1);
        assert_eq!(removed.label_position(loop_head), Some(3));
        Ok(())
    }

    #[test]
    fn test_directives_see_earlier_edits() -> Result<()> {
        let body = twenty_instruction_body();
        let patched = apply(
            &body,
            &[
                EditDirective::after(
                    InstructionMatcher::calls(member_x()),
                    vec![Instruction::call(event_hook())],
                ),
                EditDirective::after(
                    InstructionMatcher::calls(event_hook()),
                    vec![Instruction::simple(OpCode::Pop)],
                ),
            ],
        )?;
        assert_eq!(patched.len(), 22);
        assert_eq!(patched.get(9).unwrap().opcode(), OpCode::Pop);
        Ok(())
    }

    #[test]
    fn test_anchor_failures_name_the_directive() {
        let body = twenty_instruction_body();
        let missing = MemberRef::method("Host", "Missing", MethodSignature::void());
        let result = apply(
            &body,
            &[
                EditDirective::after(InstructionMatcher::calls(member_x()), vec![]),
                EditDirective::after(InstructionMatcher::calls(missing), vec![]),
            ],
        );
        assert!(matches!(result, Err(Error::AnchorNotFound { directive: 1, .. })));

        let result = apply(
            &body,
            &[EditDirective::after(InstructionMatcher::opcode(OpCode::Nop), vec![])],
        );
        assert!(matches!(result, Err(Error::AmbiguousAnchor { directive: 0, .. })));

        let result = apply(
            &body,
            &[EditDirective::after(InstructionMatcher::opcode(OpCode::Ret), vec![])
                .offset(5)],
        );
        assert!(matches!(result, Err(Error::AnchorNotFound { directive: 0, .. })));
    }

    #[test]
    fn test_payload_slots_are_validated() -> Result<()> {
        let mut body = twenty_instruction_body();
        let store = Instruction::new(OpCode::StlocS, Operand::Local(LocalSlot::new(5)));
        let directive = EditDirective::before(
            InstructionMatcher::opcode(OpCode::Ret),
            vec![Instruction::simple(OpCode::Ldnull), store],
        )
        .occurrence(Occurrence::Last);
        assert!(matches!(
            apply(&body, &[directive.clone()]),
            Err(Error::InvalidSlotReference {
                directive: Some(0),
                slot: 5,
                ..
            })
        ));

        while body.locals().len() < 6 {
            body.declare_local(TypeSig::Object);
        }
        let patched = apply(&body, &[directive])?;
        assert_eq!(patched.locals().len(), 6);
        Ok(())
    }

    #[test]
    fn test_apply_is_deterministic_and_pure() -> Result<()> {
        let body = twenty_instruction_body();
        let directives = [EditDirective::replace(
            InstructionMatcher::calls(member_x()),
            1,
            vec![Instruction::call(event_hook()), Instruction::simple(OpCode::Nop)],
        )
        .move_labels()];
        let first = apply(&body, &directives)?;
        let second = apply(&body, &directives)?;
        assert_eq!(first, second);
        assert_eq!(body, twenty_instruction_body());
        Ok(())
    }

    #[test]
    fn test_duplicate_payload_label() {
        let body = twenty_instruction_body();
        let loop_head = body.get(3).unwrap().labels().next().unwrap();
        let result = apply(
            &body,
            &[EditDirective::after(
                InstructionMatcher::calls(member_x()),
                vec![Instruction::simple(OpCode::Nop).with_label(loop_head)],
            )],
        );
        assert!(matches!(result, Err(Error::DuplicateLabel(_))));
    }

    #[test]
    fn test_replace_moves_exception_markers() -> Result<()> {
        let body = crate::test::guarded_body();
        let anchor = InstructionMatcher::opcode(OpCode::Endfinally);
        let keep = EditDirective::replace(
            anchor.clone(),
            1,
            vec![Instruction::simple(OpCode::Endfinally)],
        );
        assert!(matches!(
            apply(&body, &[keep]),
            Err(Error::OrphanedBlock {
                directive: 0,
                index: 3
            })
        ));

        let patched = apply(
            &body,
            &[EditDirective::replace(
                anchor,
                1,
                vec![Instruction::simple(OpCode::Nop), Instruction::simple(OpCode::Endfinally)],
            )
            .move_labels()],
        )?;
        assert_eq!(
            patched.get(3).unwrap().blocks(),
            &[ExceptionBlock::BeginFinally]
        );
        Ok(())
    }
}

//! Integration tests for routine editing and patch installation through the public API.

use std::collections::HashMap;

use hookscope::{
    assembly::{Instruction, Label, OpCode, RoutineBody, RoutineBodyBuilder},
    metadata::{
        HostImage, HostType, MemberRef, MethodSignature, RoutineDef, RoutineFlags, RoutineSource,
        TargetDescriptor, TypeSig,
    },
    patch::{InstallConfig, Patch, PatchContext, PatchInstaller},
    patching::{apply, EditDirective, InstructionMatcher, Occurrence},
    Error, Result,
};

fn member_x() -> MemberRef {
    MemberRef::method(
        "Host",
        "MemberX",
        MethodSignature::instance(vec![], TypeSig::Void),
    )
}

fn event_hook() -> MemberRef {
    MemberRef::method("Hooks", "OnMemberX", MethodSignature::void())
}

/// A counting loop of 20 instructions with one call to `MemberX` at index 7.
///
/// `loop` is attached at index 3 and `exit` at index 17.
fn loop_body() -> Result<(RoutineBody, HashMap<String, Label>)> {
    RoutineBodyBuilder::new()
        .local(TypeSig::I4)
        .local(TypeSig::Object)
        .implementation(|asm| {
            asm.nop()?
                .ldc_i4(0)?
                .stloc(0)?
                .label("loop")?
                .ldloc(0)?
                .ldc_i4(5)?
                .branch(OpCode::Bge, "exit")?
                .ldarg_0()?
                .call(member_x())?
                .nop()?
                .ldloc(0)?
                .ldc_i4(1)?
                .add()?
                .stloc(0)?
                .ldarg_0()?
                .ldfld(MemberRef::field("Host", "count", TypeSig::I4))?
                .brtrue("loop")?
                .nop()?
                .label("exit")?
                .ldnull()?
                .pop()?
                .ret()?;
            Ok(())
        })
        .build_with_labels()
}

fn hook_after_member_x() -> EditDirective {
    EditDirective::after(
        InstructionMatcher::calls(member_x()),
        vec![Instruction::call(event_hook())],
    )
}

#[test]
fn insert_after_unique_call() -> Result<()> {
    let (body, labels) = loop_body()?;
    assert_eq!(body.len(), 20);

    let patched = apply(&body, &[hook_after_member_x()])?;
    assert_eq!(patched.len(), 21);
    assert_eq!(patched.instructions()[7].member(), Some(&member_x()));
    assert_eq!(patched.instructions()[8].member(), Some(&event_hook()));

    // Both labels stay on the instructions they were attached to
    assert_eq!(patched.label_position(labels["loop"]), Some(3));
    assert_eq!(patched.label_position(labels["exit"]), Some(18));
    assert_eq!(patched.instructions()[18].opcode(), OpCode::Ldnull);

    // Branches still target the same labels
    assert_eq!(patched.instructions()[5].branch_targets(), vec![labels["exit"]]);
    assert_eq!(patched.instructions()[16].branch_targets(), vec![labels["loop"]]);
    Ok(())
}

#[test]
fn apply_is_deterministic() -> Result<()> {
    let (body, _) = loop_body()?;
    let directives = [hook_after_member_x()];
    assert_eq!(apply(&body, &directives)?, apply(&body, &directives)?);
    Ok(())
}

#[test]
fn ambiguous_and_missing_anchors_fail() -> Result<()> {
    let (body, _) = loop_body()?;

    let ambiguous = EditDirective::before(InstructionMatcher::opcode(OpCode::Ldarg0), vec![]);
    assert!(matches!(
        apply(&body, &[ambiguous.clone()]),
        Err(Error::AmbiguousAnchor {
            directive: 0,
            matches: 2,
            ..
        })
    ));
    // An explicit occurrence resolves it
    apply(&body, &[ambiguous.occurrence(Occurrence::Last)])?;

    let missing = EditDirective::after(
        InstructionMatcher::calls_named("Host", "MemberY"),
        vec![Instruction::call(event_hook())],
    );
    assert!(matches!(
        apply(&body, &[hook_after_member_x(), missing]),
        Err(Error::AnchorNotFound { directive: 1, .. })
    ));
    Ok(())
}

#[test]
fn label_policy_on_labelled_anchor() -> Result<()> {
    let (body, labels) = loop_body()?;
    // The first ldloc.0 carries `loop`
    let anchor = || InstructionMatcher::opcode(OpCode::Ldloc0);
    let payload = || vec![Instruction::call(event_hook())];

    // Keep: the loop re-enters at the anchor, skipping the payload
    let kept = apply(
        &body,
        &[EditDirective::before(anchor(), payload()).occurrence(Occurrence::First)],
    )?;
    assert_eq!(kept.label_position(labels["loop"]), Some(4));

    // Move: the loop re-enters at the payload
    let moved = apply(
        &body,
        &[EditDirective::before(anchor(), payload())
            .occurrence(Occurrence::First)
            .move_labels()],
    )?;
    assert_eq!(moved.label_position(labels["loop"]), Some(3));

    // Replacing a labelled instruction without moving labels would orphan the label
    let replaced = apply(
        &body,
        &[EditDirective::replace(anchor(), 1, payload()).occurrence(Occurrence::First)],
    );
    assert!(matches!(replaced, Err(Error::OrphanedLabel { .. })));
    Ok(())
}

struct MemberXHook {
    name: &'static str,
    callee: &'static str,
}

impl Patch for MemberXHook {
    fn name(&self) -> &str {
        self.name
    }

    fn target(&self) -> TargetDescriptor {
        TargetDescriptor::new("Host").by_name("Run")
    }

    fn directives(&self, ctx: &mut PatchContext<'_>) -> Result<Vec<EditDirective>> {
        let payload = ctx.emit(|asm| {
            asm.call(event_hook())?;
            Ok(())
        })?;
        Ok(vec![EditDirective::after(
            InstructionMatcher::calls_named("Host", self.callee),
            payload,
        )])
    }
}

#[test]
fn failing_patch_does_not_block_others() -> Result<()> {
    let (body, _) = loop_body()?;
    let run = RoutineDef::new(
        MemberRef::method("Host", "Run", MethodSignature::instance(vec![], TypeSig::Void)),
        RoutineFlags::PUBLIC,
        body,
    );
    let mut image = HostImage::new();
    image.add_type(HostType::new("Host").with_routine(run)?);

    let stale = MemberXHook {
        name: "stale",
        callee: "RenamedInNewerHost",
    };
    let good = MemberXHook {
        name: "good",
        callee: "MemberX",
    };

    let mut installer = PatchInstaller::new(InstallConfig::new());
    let report = installer.install_all(&mut image, &[&stale, &good]);

    assert!(!report.is_success());
    assert!(report.failure("stale").is_some());
    let handle = report.installed_at("good").expect("good patch installed");
    assert_eq!(image.routine(handle).map(|r| r.body.len()), Some(21));

    let diagnostics = installer.diagnostics();
    assert_eq!(diagnostics.error_count(), 1);
    assert_eq!(diagnostics.by_patch("stale").len(), 1);
    Ok(())
}

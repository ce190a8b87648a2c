//! Hands the host's round-end coroutine over to [`RoundEndMachine`](super::RoundEndMachine).
//!
//! `RoundSummary::Start` schedules the host's own polling coroutine:
//!
//! ```text
//! ldarg.0
//! call      RoundSummary::_ProcessServerSideCode
//! ldarg.0
//! call      UnityEngine.Component::get_gameObject
//! call      MECExtensionMethods2::CancelWith<GameObject>
//! ...
//! ```
//!
//! [`RoundEndPatch`] swaps the call to `_ProcessServerSideCode` for a call to the extension's
//! process hook, and ties the returned coroutine to the summary object's lifetime with the
//! single-type `CancelWith` overload instantiated over `RoundSummary`. The `ldarg.0` in front of
//! the replaced call becomes the hook's argument.

use crate::{
    metadata::{MemberRef, MethodSignature, SignaturePattern, TargetDescriptor, TypeSig},
    patch::{Patch, PatchContext},
    patching::{EditDirective, InstructionMatcher},
    Result,
};

/// Type hosting the extension's process hook.
pub const HOOK_TYPE: &str = "Hookscope.Patches.RoundEnd";

/// Name of the process hook.
pub const HOOK_NAME: &str = "Process";

const ROUND_SUMMARY: &str = "RoundSummary";
const IENUMERATOR: &str = "System.Collections.Generic.IEnumerator`1";

fn coroutine() -> TypeSig {
    TypeSig::generic_inst(IENUMERATOR, vec![TypeSig::R4])
}

/// `static IEnumerator<float> Process(RoundSummary)`, the coroutine driving the machine.
#[must_use]
pub fn process_hook() -> MemberRef {
    MemberRef::method(
        HOOK_TYPE,
        HOOK_NAME,
        MethodSignature::new(vec![TypeSig::named(ROUND_SUMMARY)], coroutine()),
    )
}

/// Replaces the host's round-end coroutine in `RoundSummary::Start`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundEndPatch;

impl RoundEndPatch {
    /// Creates the patch.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Patch for RoundEndPatch {
    fn name(&self) -> &str {
        "RoundEnd"
    }

    fn target(&self) -> TargetDescriptor {
        TargetDescriptor::new(ROUND_SUMMARY).by_name("Start")
    }

    fn directives(&self, ctx: &mut PatchContext<'_>) -> Result<Vec<EditDirective>> {
        // CancelWith<T>(IEnumerator<float>, T), not the two-type overload
        let cancel_with = ctx
            .member(
                &TargetDescriptor::new("MECExtensionMethods2").by_shape(
                    SignaturePattern::new()
                        .generic_arity(1)
                        .params(vec![coroutine(), TypeSig::MethodGeneric(0)]),
                ),
            )?
            .instantiate(vec![TypeSig::named(ROUND_SUMMARY)])?;

        let payload = ctx.emit(|asm| {
            asm.call(process_hook())?.ldarg_0()?.call(cancel_with)?;
            Ok(())
        })?;

        Ok(vec![EditDirective::replace(
            InstructionMatcher::calls_named(ROUND_SUMMARY, "_ProcessServerSideCode"),
            1,
            payload,
        )
        .move_labels()])
    }

    fn events(&self) -> &[&'static str] {
        &["EndingRound", "RoundEnded"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::OpCode,
        metadata::{MethodLocator, RoutineSource},
        patch::{InstallConfig, PatchInstaller},
        test::sample_host,
        Error,
    };

    #[test]
    fn test_round_end_patch() -> Result<()> {
        let mut image = sample_host();
        let mut installer = PatchInstaller::new(InstallConfig::new());
        let handle = installer.install(&mut image, &RoundEndPatch::new())?;

        let start = image.routine(&handle).unwrap();
        let instructions = start.body.instructions();
        assert_eq!(instructions.len(), 11);

        assert_eq!(instructions[0].opcode(), OpCode::Ldarg0);
        assert_eq!(instructions[1].member(), Some(&process_hook()));
        assert_eq!(instructions[2].opcode(), OpCode::Ldarg0);

        let cancel_with = instructions[3].member().unwrap();
        assert_eq!(cancel_with.name(), "CancelWith");
        assert_eq!(cancel_with.generic_args(), &[TypeSig::named("RoundSummary")]);

        // The host's own scheduling is untouched
        assert_eq!(instructions[5].member().unwrap().name(), "get_gameObject");
        assert_eq!(instructions[10].opcode(), OpCode::Ret);
        assert!(!instructions.iter().any(|i| i
            .member()
            .is_some_and(|m| m.name() == "_ProcessServerSideCode")));

        assert_eq!(installer.diagnostics().by_patch("RoundEnd").len(), 1);
        Ok(())
    }

    #[test]
    fn test_patch_target() -> Result<()> {
        let image = sample_host();
        let handle = MethodLocator::new(&image).resolve(&RoundEndPatch.target())?;
        assert_eq!(handle.name(), "Start");
        assert_eq!(RoundEndPatch.events(), &["EndingRound", "RoundEnded"]);
        Ok(())
    }

    #[test]
    fn test_patch_twice_fails() -> Result<()> {
        let mut image = sample_host();
        let mut installer = PatchInstaller::new(InstallConfig::new().with_allow_reinstall(true));
        installer.install(&mut image, &RoundEndPatch)?;

        // The anchor call is gone after the first install
        let result = installer.install(&mut image, &RoundEndPatch);
        assert!(matches!(result, Err(Error::PatchFailed { .. })));
        Ok(())
    }
}

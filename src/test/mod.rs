//! Shared fixtures for unit tests.
//!
//! Bodies are built through [`RoutineBodyBuilder`] so the fixtures exercise the emitter the same
//! way patch authors do.

use crate::{
    assembly::{OpCode, RoutineBody, RoutineBodyBuilder},
    metadata::{
        HostImage, HostType, MemberRef, MethodSignature, RoutineDef, RoutineFlags, TypeSig,
    },
};

pub const IENUMERATOR: &str = "System.Collections.Generic.IEnumerator`1";

// The member the scenario bodies call exactly once
pub fn member_x() -> MemberRef {
    MemberRef::method(
        "Host",
        "MemberX",
        MethodSignature::instance(vec![], TypeSig::Void),
    )
}

// The hook spliced in by the scenario patches
pub fn event_hook() -> MemberRef {
    MemberRef::method("Hooks", "OnMemberX", MethodSignature::void())
}

pub fn enumerator_of_float() -> TypeSig {
    TypeSig::generic_inst(IENUMERATOR, vec![TypeSig::R4])
}

// 20 instructions, a counting loop with one call to MemberX at index 7.
//
//  0 nop               10 ldc.i4.1
//  1 ldc.i4.0          11 add
//  2 stloc.0           12 stloc.0
//  3 loop: ldloc.0     13 ldarg.0
//  4 ldc.i4.5          14 ldfld Host::count
//  5 bge exit          15 brtrue loop
//  6 ldarg.0           16 nop
//  7 call MemberX      17 exit: ldnull
//  8 nop               18 pop
//  9 ldloc.0           19 ret
pub fn twenty_instruction_body() -> RoutineBody {
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
        .build()
        .unwrap()
}

// try { 1; } finally { } return;
//
//  0 [try] ldc.i4.1
//  1 pop
//  2 leave out
//  3 [finally] endfinally
//  4 [end] out: ret
pub fn guarded_body() -> RoutineBody {
    RoutineBodyBuilder::new()
        .implementation(|asm| {
            asm.begin_try()?
                .ldc_i4(1)?
                .pop()?
                .leave("out")?
                .begin_finally()?
                .endfinally()?
                .end_block()?
                .label("out")?
                .ret()?;
            Ok(())
        })
        .build()
        .unwrap()
}

// Body of RoundSummary::Start as the host compiles it:
// Timing.RunCoroutine(_ProcessServerSideCode().CancelWith(gameObject), Segment.FixedUpdate)
pub fn round_summary_start_body() -> RoutineBody {
    let process = MemberRef::method(
        "RoundSummary",
        "_ProcessServerSideCode",
        MethodSignature::instance(vec![], enumerator_of_float()),
    );
    let game_object = MemberRef::method(
        "UnityEngine.Component",
        "get_gameObject",
        MethodSignature::instance(vec![], TypeSig::named("UnityEngine.GameObject")),
    );
    let cancel_with = cancel_with()
        .instantiate(vec![TypeSig::named("UnityEngine.GameObject")])
        .unwrap();
    let run_coroutine = MemberRef::method(
        "MEC.Timing",
        "RunCoroutine",
        MethodSignature::new(
            vec![enumerator_of_float(), TypeSig::named("MEC.Segment")],
            TypeSig::named("MEC.CoroutineHandle"),
        ),
    );

    RoutineBodyBuilder::new()
        .implementation(move |asm| {
            asm.ldarg_0()?
                .call(process)?
                .ldarg_0()?
                .call(game_object)?
                .call(cancel_with)?
                .ldc_i4(1)?
                .call(run_coroutine)?
                .pop()?
                .ret()?;
            Ok(())
        })
        .build()
        .unwrap()
}

// MECExtensionMethods2::CancelWith<T>(IEnumerator<float>, T)
pub fn cancel_with() -> MemberRef {
    MemberRef::method(
        "MECExtensionMethods2",
        "CancelWith",
        MethodSignature::generic(
            1,
            vec![enumerator_of_float(), TypeSig::MethodGeneric(0)],
            enumerator_of_float(),
        ),
    )
}

// Helper function to create a routine with an empty body
fn routine(ty: &str, name: &str, signature: MethodSignature, flags: RoutineFlags) -> RoutineDef {
    RoutineDef::new(MemberRef::method(ty, name, signature), flags, RoutineBody::new())
}

// RoundSummary with its iterator state machines and the coroutine extension class.
//
// Both nested state machines expose an instance `bool MoveNext()`, so a shape lookup over
// RoundSummary and its nested types is ambiguous and needs an ordinal.
pub fn sample_host() -> HostImage {
    let compiler_generated = RoutineFlags::PRIVATE | RoutineFlags::COMPILER_GENERATED;
    let move_next = || MethodSignature::instance(vec![], TypeSig::Boolean);
    let dispose = || MethodSignature::instance(vec![], TypeSig::Void);

    let start = RoutineDef::new(
        MemberRef::method(
            "RoundSummary",
            "Start",
            MethodSignature::instance(vec![], TypeSig::Void),
        ),
        RoutineFlags::PRIVATE,
        round_summary_start_body(),
    );

    let mut image = HostImage::new();
    image.add_type(
        HostType::new("RoundSummary")
            .with_routine(start)
            .unwrap()
            .with_routine(routine(
                "RoundSummary",
                "_ProcessServerSideCode",
                MethodSignature::instance(vec![], enumerator_of_float()),
                RoutineFlags::PRIVATE,
            ))
            .unwrap(),
    );

    for nested in [
        "RoundSummary/<Start>d__1",
        "RoundSummary/<_ProcessServerSideCode>d__2",
    ] {
        image.add_type(
            HostType::new(nested)
                .with_routine(routine(nested, "MoveNext", move_next(), compiler_generated))
                .unwrap()
                .with_routine(routine(nested, "Dispose", dispose(), compiler_generated))
                .unwrap(),
        );
    }

    image.add_type(
        HostType::new("MECExtensionMethods2")
            .with_routine(RoutineDef::new(
                cancel_with(),
                RoutineFlags::PUBLIC | RoutineFlags::STATIC,
                RoutineBody::new(),
            ))
            .unwrap()
            .with_routine(routine(
                "MECExtensionMethods2",
                "CancelWith",
                MethodSignature::generic(
                    2,
                    vec![
                        enumerator_of_float(),
                        TypeSig::MethodGeneric(0),
                        TypeSig::MethodGeneric(1),
                    ],
                    enumerator_of_float(),
                ),
                RoutineFlags::PUBLIC | RoutineFlags::STATIC,
            ))
            .unwrap(),
    );

    image
}

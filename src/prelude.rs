//! # hookscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the hookscope library. Import this module to get quick access to the essential
//! types for writing and installing patches.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all hookscope operations
pub use crate::Error;

/// The result type used throughout hookscope
pub use crate::Result;

// ================================================================================================
// Routine Bodies
// ================================================================================================

/// Symbolic instructions and bodies
pub use crate::assembly::{
    ExceptionBlock, Instruction, InstructionEmitter, Label, LocalSlot, OpCode, Operand,
    RoutineBody, RoutineBodyBuilder,
};

// ================================================================================================
// Editing
// ================================================================================================

/// Anchors, directives and the patcher
pub use crate::patching::{
    apply, verify, EditDirective, InstructionMatcher, InstructionPatcher, MemberPattern,
    Occurrence,
};

// ================================================================================================
// Host Metadata
// ================================================================================================

/// Member identities, the host image and routine resolution
pub use crate::metadata::{
    Diagnostics, HostImage, HostType, MemberRef, MethodLocator, MethodSignature, RoutineDef,
    RoutineFlags, RoutineHandle, SignaturePattern, TargetDescriptor, TypeSig,
};

// ================================================================================================
// Patches
// ================================================================================================

/// Patch definitions and installation
pub use crate::patch::{InstallConfig, InstallReport, Patch, PatchContext, PatchInstaller};

// ================================================================================================
// Events
// ================================================================================================

/// Dispatch and outcome types
pub use crate::events::{
    BinaryGate, Dispatcher, Event, GateDecision, HandlerId, Priority, RetryDecision, VetoRetry,
};

// ================================================================================================
// Proxies
// ================================================================================================

/// Cached wrappers for host objects
pub use crate::proxy::{HostCategory, HostHandle, HostObject, ItemKind, ItemProxy, ProxyCache};

// ================================================================================================
// Round End
// ================================================================================================

/// The round-end state machine and its patch
pub use crate::round::{
    LeadingTeam, RoundAction, RoundConfig, RoundEndMachine, RoundEndPatch, RoundHost, RoundPhase,
};

//! Structural instruction stream patching.
//!
//! This module locates edit positions inside a routine body and splices payloads in while
//! keeping jumps, locals and exception regions valid.
//!
//! # Architecture
//!
//! - [`matcher`] - Anchor locator: [`InstructionMatcher`], [`Occurrence`], [`Anchor`], [`find`]
//! - [`directive`] - [`EditDirective`] with its [`Position`] and [`LabelPolicy`]
//! - [`patcher`] - [`apply`] and the configurable [`InstructionPatcher`]
//! - [`verify`] - Post-edit structural verification
//!
//! Anchors are structural: "the call to `RoundSummary::_ProcessServerSideCode`" rather than
//! "instruction 42".
//!
//! # Failure Policy
//!
//! Every failure is a hard error. An anchor with zero matches, or with several where one was
//! required, fails the directive. There is no best-guess fallback.

pub mod directive;
pub mod matcher;
pub mod patcher;
pub mod verify;

pub use directive::{EditDirective, LabelPolicy, Position};
pub use matcher::{find, find_all, Anchor, InstructionMatcher, MemberPattern, Occurrence};
pub use patcher::{apply, InstructionPatcher};
pub use verify::verify;

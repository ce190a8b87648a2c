//! Host-side identities, routine lookup and diagnostics.
//!
//! The patcher only needs a narrow view of the host: type and member identities that operands
//! can refer to, the routines each type declares, and a way to pick one of them when the
//! host's compiler invents the names. This module provides that view.
//!
//! # Architecture
//!
//! - [`member`] - [`TypeName`], [`TypeSig`], [`MethodSignature`] and [`MemberRef`]
//! - [`host`] - [`HostImage`], [`HostType`], [`RoutineDef`] and the [`RoutineSource`] trait
//! - [`locator`] - The [`MethodLocator`] and its [`SelectionStrategy`] fallback chain
//! - [`diagnostics`] - Thread-safe collection of non-fatal findings
//!
//! # Examples
//!
//! ```rust
//! use hookscope::metadata::{
//!     HostImage, HostType, MemberRef, MethodLocator, MethodSignature, RoutineDef,
//!     RoutineFlags, TargetDescriptor,
//! };
//! use hookscope::assembly::RoutineBody;
//!
//! let start = RoutineDef::new(
//!     MemberRef::method(
//!         "RoundSummary",
//!         "Start",
//!         MethodSignature::instance(vec![], hookscope::metadata::TypeSig::Void),
//!     ),
//!     RoutineFlags::PRIVATE,
//!     RoutineBody::new(),
//! );
//! let mut image = HostImage::new();
//! image.add_type(HostType::new("RoundSummary").with_routine(start)?);
//!
//! let handle = MethodLocator::new(&image)
//!     .resolve(&TargetDescriptor::new("RoundSummary").by_name("Start"))?;
//! assert_eq!(handle.name(), "Start");
//! # Ok::<(), hookscope::Error>(())
//! ```

pub mod diagnostics;
pub mod host;
pub mod locator;
pub mod member;

pub use diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics};
pub use host::{HostImage, HostType, RoutineDef, RoutineFlags, RoutineHandle, RoutineSource};
pub use locator::{MethodLocator, SelectionStrategy, SignaturePattern, TargetDescriptor};
pub use member::{MemberKind, MemberRef, MethodSignature, TypeName, TypeSig};

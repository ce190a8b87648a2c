// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # hookscope
//!
//! Load-time instrumentation for managed game-server hosts. `hookscope` rewrites routines of a
//! host image so they call back into an extension, dispatches the resulting events to
//! prioritized handlers, and wraps host objects in cached, typed proxies.
//!
//! ## Features
//!
//! - **Routine editing** - Symbolic instruction lists with labels, locals and exception blocks,
//!   edited by anchor-relative directives and verified before they are committed
//! - **Robust targeting** - Routines are resolved by name, by signature shape or by ordinal,
//!   including compiler-generated nested types
//! - **Isolated patches** - A patch that fails to install is reported and skipped; every other
//!   patch still installs
//! - **Event dispatch** - Typed events with binary gates and cancellable, retryable outcomes
//! - **Proxy caching** - One proxy per host object, with typed kinds and a serial index
//! - **Round-end sequence** - The host's round-end coroutine redirected into an explicit state
//!   machine that fires events at each stage
//!
//! ## Quick Start
//!
//! ```rust
//! use hookscope::prelude::*;
//!
//! let body = RoutineBodyBuilder::new()
//!     .implementation(|asm| {
//!         let work = MemberRef::method(
//!             "Host",
//!             "Work",
//!             MethodSignature::instance(vec![], TypeSig::Void),
//!         );
//!         asm.ldarg_0()?.call(work)?.ret()?;
//!         Ok(())
//!     })
//!     .build()?;
//!
//! let hook = MemberRef::method("Hooks", "OnWork", MethodSignature::void());
//! let patched = apply(
//!     &body,
//!     &[EditDirective::before(
//!         InstructionMatcher::calls_named("Host", "Work"),
//!         vec![Instruction::call(hook)],
//!     )
//!     .offset(-1)],
//! )?;
//! assert_eq!(patched.len(), 4);
//! # Ok::<(), hookscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`assembly`] - Opcodes, instructions, routine bodies and the instruction emitter
//! - [`patching`] - Anchors, edit directives, the patcher and the structural verifier
//! - [`metadata`] - Host member identities, the host image, the method locator and diagnostics
//! - [`patch`] - The `Patch` trait and the installer
//! - [`events`] - The event dispatcher and outcome types
//! - [`proxy`] - The proxy cache and item proxies
//! - [`round`] - The round-end state machine and its patch
//! - [`utils`] - Object pools
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Installation errors are wrapped per patch
//! and recorded as diagnostics:
//!
//! ```rust
//! use hookscope::{
//!     assembly::{OpCode, RoutineBody},
//!     patching::{find, InstructionMatcher, Occurrence},
//!     Error,
//! };
//!
//! match find(&RoutineBody::new(), &InstructionMatcher::opcode(OpCode::Ret), Occurrence::Only) {
//!     Err(Error::NoMatch { anchor }) => println!("no match for {anchor}"),
//!     Err(e) => println!("other error: {e}"),
//!     Ok(index) => println!("found at {index}"),
//! }
//! ```
//!
//! ## Logging
//!
//! Diagnostics are mirrored to the [`log`] facade; install any logger implementation to see
//! them.
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use hookscope::prelude::*;
///
/// let dispatcher = Dispatcher::new();
/// assert!(dispatcher.is_empty());
/// ```
pub mod prelude;

/// Symbolic routine bodies.
///
/// Instructions reference labels, locals and members symbolically; nothing is encoded. Bodies
/// are built with [`assembly::RoutineBodyBuilder`] or taken from the host image.
///
/// # Key Types
///
/// - [`assembly::Instruction`] - One instruction with its attached labels and block markers
/// - [`assembly::RoutineBody`] - The instruction list plus the local table
/// - [`assembly::InstructionEmitter`] - Fluent construction with named labels
pub mod assembly;

/// Anchor location and edit application.
///
/// # Key Types
///
/// - [`patching::InstructionMatcher`] - Predicates over instructions
/// - [`patching::EditDirective`] - Insert or replace relative to an anchor
/// - [`patching::InstructionPatcher`] - Applies a directive list atomically
pub mod patching;

/// Host member identities, the host image and routine resolution.
pub mod metadata;

/// Patch definitions and the installer.
pub mod patch;

/// Typed event dispatch.
pub mod events;

/// Cached proxies for host objects.
pub mod proxy;

/// The round-end sequence.
pub mod round;

/// Shared utilities.
pub mod utils;

/// `hookscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust
/// use hookscope::{Result, metadata::{HostImage, MethodLocator, RoutineHandle, TargetDescriptor}};
///
/// fn locate_start(image: &HostImage) -> Result<RoutineHandle> {
///     MethodLocator::new(image).resolve(&TargetDescriptor::new("RoundSummary").by_name("Start"))
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `hookscope` Error type
///
/// The main error type for all operations in this crate. Its variants are grouped by the stage
/// that raises them: anchor location, installation and dispatch.
pub use error::Error;

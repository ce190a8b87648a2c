//! Patch definitions and installation.
//!
//! A [`Patch`] bundles everything needed to modify one host routine: the target descriptor for
//! the [`MethodLocator`](crate::metadata::MethodLocator), the edit directives for the
//! [`InstructionPatcher`](crate::patching::InstructionPatcher) and the names of the events it
//! wires in. The [`PatchInstaller`] runs these steps per patch at extension load time.
//!
//! # Failure Isolation
//!
//! Installation errors are fatal for the affected patch only. The installer wraps them in
//! [`Error::PatchFailed`](crate::Error::PatchFailed), records an error diagnostic naming the
//! patch (and the directive, where one is involved) and continues with the next patch, unless
//! [`InstallConfig::fail_fast`] is set.
//!
//! # Examples
//!
//! ```rust
//! use hookscope::assembly::{Instruction, RoutineBody, RoutineBodyBuilder};
//! use hookscope::metadata::{
//!     HostImage, HostType, MemberRef, MethodSignature, RoutineDef, RoutineFlags,
//!     TargetDescriptor,
//! };
//! use hookscope::patch::{InstallConfig, Patch, PatchContext, PatchInstaller};
//! use hookscope::patching::{EditDirective, InstructionMatcher};
//! use hookscope::Result;
//!
//! struct TickHook;
//!
//! impl Patch for TickHook {
//!     fn name(&self) -> &str {
//!         "tick-hook"
//!     }
//!
//!     fn target(&self) -> TargetDescriptor {
//!         TargetDescriptor::new("Server").by_name("Tick")
//!     }
//!
//!     fn directives(&self, _ctx: &mut PatchContext<'_>) -> Result<Vec<EditDirective>> {
//!         let hook = MemberRef::method("Hooks", "OnTick", MethodSignature::void());
//!         Ok(vec![EditDirective::before(
//!             InstructionMatcher::opcode(hookscope::assembly::OpCode::Ret),
//!             vec![Instruction::call(hook)],
//!         )])
//!     }
//! }
//!
//! let body = RoutineBodyBuilder::new()
//!     .implementation(|asm| {
//!         asm.nop()?.ret()?;
//!         Ok(())
//!     })
//!     .build()?;
//! let tick = RoutineDef::new(
//!     MemberRef::method("Server", "Tick", MethodSignature::void()),
//!     RoutineFlags::PUBLIC,
//!     body,
//! );
//! let mut image = HostImage::new();
//! image.add_type(HostType::new("Server").with_routine(tick)?);
//!
//! let mut installer = PatchInstaller::new(InstallConfig::new());
//! let report = installer.install_all(&mut image, &[&TickHook]);
//! assert!(report.is_success());
//! # Ok::<(), hookscope::Error>(())
//! ```

pub mod config;
pub mod context;
pub mod installer;

pub use config::InstallConfig;
pub use context::{Patch, PatchContext};
pub use installer::{InstallReport, PatchInstaller};

//! The [`Patch`] trait and the context a patch authors its directives in.

use crate::{
    assembly::{Instruction, InstructionEmitter, Label, LocalSlot, RoutineBody},
    metadata::{
        HostImage, MemberRef, MethodLocator, RoutineDef, RoutineHandle, RoutineSource,
        TargetDescriptor, TypeSig,
    },
    patching::EditDirective,
    Error, Result,
};

/// One independently installable modification of a host routine.
///
/// A patch names its target routine, produces the edit directives for it, and lists the events
/// the spliced-in code fires. Installation failures of one patch never affect another.
pub trait Patch: Send + Sync {
    /// Unique name used in diagnostics and for the reinstall guard.
    fn name(&self) -> &str;

    /// Which routine to patch.
    fn target(&self) -> TargetDescriptor;

    /// Builds the directives for the resolved target.
    ///
    /// # Errors
    ///
    /// Any error aborts installation of this patch.
    fn directives(&self, ctx: &mut PatchContext<'_>) -> Result<Vec<EditDirective>>;

    /// Names of the events the patched routine fires.
    fn events(&self) -> &[&'static str] {
        &[]
    }
}

/// Working state while a patch prepares its directives.
///
/// Locals and labels declared here are allocated on a working copy of the target body, which is
/// what the directives are later applied to.
pub struct PatchContext<'a> {
    image: &'a HostImage,
    handle: RoutineHandle,
    routine: &'a RoutineDef,
    body: RoutineBody,
}

impl<'a> PatchContext<'a> {
    /// Creates a context for the routine `handle` refers to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Error`] if the handle does not refer to a routine of `image`.
    pub fn new(image: &'a HostImage, handle: RoutineHandle) -> Result<Self> {
        let routine = image
            .routine(&handle)
            .ok_or_else(|| Error::Error(format!("Routine {handle} does not exist")))?;
        Ok(Self {
            image,
            handle,
            routine,
            body: routine.body.clone(),
        })
    }

    /// The host image being patched.
    #[must_use]
    pub fn host(&self) -> &'a HostImage {
        self.image
    }

    /// The resolved target.
    #[must_use]
    pub fn handle(&self) -> &RoutineHandle {
        &self.handle
    }

    /// The target routine as it was before this patch.
    #[must_use]
    pub fn routine(&self) -> &'a RoutineDef {
        self.routine
    }

    /// The working body, including locals declared so far.
    #[must_use]
    pub fn body(&self) -> &RoutineBody {
        &self.body
    }

    /// Resolves another routine of the host image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedTarget`] if no strategy of `target` succeeds.
    pub fn locate(&self, target: &TargetDescriptor) -> Result<RoutineHandle> {
        MethodLocator::new(self.image).resolve(target)
    }

    /// Resolves another routine and returns its member reference, for use as a call operand.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedTarget`] if no strategy of `target` succeeds.
    pub fn member(&self, target: &TargetDescriptor) -> Result<MemberRef> {
        let handle = self.locate(target)?;
        self.image
            .routine(&handle)
            .map(|routine| routine.member.clone())
            .ok_or_else(|| Error::Error(format!("Routine {handle} does not exist")))
    }

    /// Declares a new local in the working body.
    pub fn declare_local(&mut self, ty: TypeSig) -> LocalSlot {
        self.body.declare_local(ty)
    }

    /// Allocates a fresh label in the working body.
    pub fn define_label(&mut self) -> Label {
        self.body.define_label()
    }

    /// Emits a payload with labels allocated after the working body's labels.
    ///
    /// # Errors
    ///
    /// Returns any error raised by `f` or by label resolution.
    pub fn emit<F>(&mut self, f: F) -> Result<Vec<Instruction>>
    where
        F: FnOnce(&mut InstructionEmitter) -> Result<()>,
    {
        let mut asm = InstructionEmitter::continuing(self.body.next_label);
        f(&mut asm)?;
        let (instructions, _, next_label) = asm.finish()?;
        self.body.next_label = next_label;
        Ok(instructions)
    }

    /// Consumes the context, returning the working body.
    #[must_use]
    pub fn into_body(self) -> RoutineBody {
        self.body
    }
}

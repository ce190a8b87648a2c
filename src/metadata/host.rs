//! In-memory view of the host's types and routines.
//!
//! The patcher never talks to a live host runtime. It works on a [`RoutineSource`]: something
//! that can list the routines declared by a type, including compiler-generated nested types.
//! [`HostImage`] is the in-memory implementation used by the installer and the tests; an
//! embedding host populates it from whatever reflection facility it has.

use std::collections::BTreeMap;
use std::fmt;

use bitflags::bitflags;

use crate::{
    assembly::RoutineBody,
    metadata::member::{MemberRef, MethodSignature, TypeName},
    Error, Result,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Attributes of a host routine relevant to target selection
    pub struct RoutineFlags : u32 {
        /// Declared `static`
        const STATIC = 0x0001;
        /// Publicly accessible
        const PUBLIC = 0x0002;
        /// Private to the declaring type
        const PRIVATE = 0x0004;
        /// Virtual or overriding
        const VIRTUAL = 0x0008;
        /// Synthesized by the host's compiler (iterator state machines, lambdas)
        const COMPILER_GENERATED = 0x0010;
    }
}

/// A routine declared by a host type.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineDef {
    /// The member identity of this routine
    pub member: MemberRef,
    /// Selection-relevant attributes
    pub flags: RoutineFlags,
    /// The current body
    pub body: RoutineBody,
}

impl RoutineDef {
    /// Creates a routine from its identity, attributes and body.
    #[must_use]
    pub fn new(member: MemberRef, flags: RoutineFlags, body: RoutineBody) -> Self {
        Self {
            member,
            flags,
            body,
        }
    }

    /// The routine's simple name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.member.name()
    }

    /// The routine's signature, if its member is a method.
    #[must_use]
    pub fn signature(&self) -> Option<&MethodSignature> {
        self.member.signature()
    }
}

/// A host type and the routines it declares, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct HostType {
    name: TypeName,
    routines: Vec<RoutineDef>,
}

impl HostType {
    /// Creates a type without routines.
    pub fn new(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            routines: Vec::new(),
        }
    }

    /// Adds a routine, returning `self` for chaining.
    ///
    /// The routine's member must be a method declared by this type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the member is not a method of this type.
    pub fn with_routine(mut self, routine: RoutineDef) -> Result<Self> {
        if !routine.member.is_method() || routine.member.declaring_type() != &self.name {
            return Err(malformed_error!(
                "{} cannot be declared by {}",
                routine.member,
                self.name
            ));
        }
        self.routines.push(routine);
        Ok(self)
    }

    /// The type's name.
    #[must_use]
    pub fn name(&self) -> &TypeName {
        &self.name
    }

    /// The declared routines in declaration order.
    #[must_use]
    pub fn routines(&self) -> &[RoutineDef] {
        &self.routines
    }
}

/// Stable reference to a routine resolved by the method locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutineHandle {
    declaring_type: TypeName,
    ordinal: usize,
    name: String,
}

impl RoutineHandle {
    pub(crate) fn new(declaring_type: TypeName, ordinal: usize, name: &str) -> Self {
        Self {
            declaring_type,
            ordinal,
            name: name.to_string(),
        }
    }

    /// The type actually declaring the routine (may be a nested type).
    #[must_use]
    pub fn declaring_type(&self) -> &TypeName {
        &self.declaring_type
    }

    /// Position of the routine in its type's declaration order.
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// The routine's name at resolution time.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RoutineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} (#{})", self.declaring_type, self.name, self.ordinal)
    }
}

/// A source of host types that the method locator can search.
pub trait RoutineSource {
    /// Returns the type called `name`.
    fn host_type(&self, name: &TypeName) -> Option<&HostType>;

    /// Returns every type nested (directly or transitively) in `outer`, ordered by name.
    fn types_nested_in(&self, outer: &TypeName) -> Vec<&HostType>;

    /// Returns the routine a handle refers to.
    fn routine(&self, handle: &RoutineHandle) -> Option<&RoutineDef> {
        self.host_type(handle.declaring_type())
            .and_then(|ty| ty.routines().get(handle.ordinal()))
    }
}

/// In-memory host image: the set of host types a patch set is installed against.
#[derive(Debug, Clone, Default)]
pub struct HostImage {
    types: BTreeMap<TypeName, HostType>,
}

impl HostImage {
    /// Creates an empty image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a type.
    pub fn add_type(&mut self, ty: HostType) {
        self.types.insert(ty.name.clone(), ty);
    }

    /// Number of types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if the image has no types.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Replaces the body of a resolved routine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Error`] if the handle no longer refers to a routine of this image.
    pub fn replace_body(&mut self, handle: &RoutineHandle, body: RoutineBody) -> Result<()> {
        let routine = self
            .types
            .get_mut(handle.declaring_type())
            .and_then(|ty| ty.routines.get_mut(handle.ordinal()))
            .ok_or_else(|| Error::Error(format!("Routine {handle} does not exist")))?;
        routine.body = body;
        Ok(())
    }
}

impl RoutineSource for HostImage {
    fn host_type(&self, name: &TypeName) -> Option<&HostType> {
        self.types.get(name)
    }

    fn types_nested_in(&self, outer: &TypeName) -> Vec<&HostType> {
        self.types
            .range(outer.clone()..)
            .take_while(|(name, _)| name.as_str().starts_with(outer.as_str()))
            .filter(|(name, _)| name.is_nested_in(outer))
            .map(|(_, ty)| ty)
            .collect()
    }
}

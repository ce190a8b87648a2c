//! Method locator: resolving the routine a patch targets.
//!
//! Host routines are not always reachable by name. Iterator state machines, lambdas and other
//! compiler-synthesized routines get names like `<Process>d__12` that change with every build.
//! A [`TargetDescriptor`] therefore lists [`SelectionStrategy`]s in order of preference:
//!
//! 1. [`SelectionStrategy::ExactName`] - the declared name, when it is stable
//! 2. [`SelectionStrategy::Shape`] - a [`SignaturePattern`] over parameters, return type,
//!    generic arity and flags, when the name is not
//! 3. [`SelectionStrategy::Ordinal`] - the n-th routine matching a shape, in declaration order,
//!    for the rare case where several routines share a shape and the ordering is known to be
//!    stable for the targeted host build
//!
//! A strategy succeeds only with exactly one candidate (the ordinal strategy picks one by
//! construction). When every strategy fails, [`MethodLocator::resolve`] returns
//! [`crate::Error::UnresolvedTarget`] naming the target, the last strategy tried and the reason
//! each strategy failed. Nothing is guessed.
//!
//! # Examples
//!
//! ```rust
//! use hookscope::assembly::RoutineBody;
//! use hookscope::metadata::{
//!     HostImage, HostType, MemberRef, MethodLocator, MethodSignature, RoutineDef, RoutineFlags,
//!     SignaturePattern, TargetDescriptor, TypeSig,
//! };
//!
//! let mut image = HostImage::new();
//! image.add_type(
//!     HostType::new("Round")
//!         .with_routine(RoutineDef::new(
//!             MemberRef::method(
//!                 "Round",
//!                 "<Tick>b__3_0",
//!                 MethodSignature::new(vec![TypeSig::R4], TypeSig::Void),
//!             ),
//!             RoutineFlags::COMPILER_GENERATED,
//!             RoutineBody::new(),
//!         ))?,
//! );
//!
//! let target = TargetDescriptor::new("Round")
//!     .by_name("Tick")
//!     .by_shape(SignaturePattern::new().params(vec![TypeSig::R4]));
//!
//! let handle = MethodLocator::new(&image).resolve(&target)?;
//! assert_eq!(handle.name(), "<Tick>b__3_0");
//! # Ok::<(), hookscope::Error>(())
//! ```

use std::fmt;

use crate::{
    metadata::{
        host::{RoutineDef, RoutineFlags, RoutineHandle, RoutineSource},
        member::{TypeName, TypeSig},
    },
    Error, Result,
};

/// Structural predicate over a routine's signature and flags.
///
/// Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignaturePattern {
    has_this: Option<bool>,
    generic_arity: Option<u8>,
    params: Option<Vec<TypeSig>>,
    ret: Option<TypeSig>,
    flags: RoutineFlags,
}

impl SignaturePattern {
    /// A pattern matching every routine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires an instance (`true`) or static (`false`) routine.
    #[must_use]
    pub fn instance(mut self, has_this: bool) -> Self {
        self.has_this = Some(has_this);
        self
    }

    /// Requires exactly `arity` method generic parameters.
    #[must_use]
    pub fn generic_arity(mut self, arity: u8) -> Self {
        self.generic_arity = Some(arity);
        self
    }

    /// Requires exactly these parameter types.
    #[must_use]
    pub fn params(mut self, params: Vec<TypeSig>) -> Self {
        self.params = Some(params);
        self
    }

    /// Requires this return type.
    #[must_use]
    pub fn returns(mut self, ret: TypeSig) -> Self {
        self.ret = Some(ret);
        self
    }

    /// Requires all of `flags` to be set.
    #[must_use]
    pub fn with_flags(mut self, flags: RoutineFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Returns true if `routine` satisfies the pattern.
    #[must_use]
    pub fn matches(&self, routine: &RoutineDef) -> bool {
        let Some(signature) = routine.signature() else {
            return false;
        };

        routine.flags.contains(self.flags)
            && self.has_this.map_or(true, |v| v == signature.has_this)
            && self
                .generic_arity
                .map_or(true, |v| v == signature.generic_arity)
            && self.params.as_ref().map_or(true, |v| *v == signature.params)
            && self.ret.as_ref().map_or(true, |v| *v == signature.ret)
    }
}

impl fmt::Display for SignaturePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ret {
            Some(ret) => write!(f, "{ret} ")?,
            None => f.write_str("* ")?,
        }
        if let Some(arity) = self.generic_arity {
            write!(f, "<{arity}>")?;
        }
        match &self.params {
            Some(params) => {
                f.write_str("(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{param}")?;
                }
                f.write_str(")")
            }
            None => f.write_str("(..)"),
        }
    }
}

/// One way of picking a routine among the candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// The routine declared under exactly this name
    ExactName(String),
    /// The single routine matching the signature pattern
    Shape(SignaturePattern),
    /// The `index`-th routine matching the pattern, in declaration order
    Ordinal {
        /// Shape the candidates must have
        pattern: SignaturePattern,
        /// Zero-based position among the matching candidates
        index: usize,
    },
}

impl SelectionStrategy {
    /// Short name of the strategy kind for reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SelectionStrategy::ExactName(_) => "exact-name",
            SelectionStrategy::Shape(_) => "shape",
            SelectionStrategy::Ordinal { .. } => "ordinal",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionStrategy::ExactName(name) => write!(f, "name `{name}`"),
            SelectionStrategy::Shape(pattern) => write!(f, "shape `{pattern}`"),
            SelectionStrategy::Ordinal { pattern, index } => {
                write!(f, "#{index} of shape `{pattern}`")
            }
        }
    }
}

/// Describes where to look for a target routine and how to pick it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    /// The type declaring the routine, or the outer type of its compiler-generated container
    pub declaring_type: TypeName,
    /// Also search types nested in `declaring_type`
    pub include_nested: bool,
    /// Strategies in order of preference
    pub strategies: Vec<SelectionStrategy>,
}

impl TargetDescriptor {
    /// Creates a descriptor without strategies.
    pub fn new(declaring_type: impl Into<TypeName>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            include_nested: false,
            strategies: Vec::new(),
        }
    }

    /// Adds an exact name strategy.
    #[must_use]
    pub fn by_name(mut self, name: impl Into<String>) -> Self {
        self.strategies
            .push(SelectionStrategy::ExactName(name.into()));
        self
    }

    /// Adds a shape strategy.
    #[must_use]
    pub fn by_shape(mut self, pattern: SignaturePattern) -> Self {
        self.strategies.push(SelectionStrategy::Shape(pattern));
        self
    }

    /// Adds an ordinal strategy.
    #[must_use]
    pub fn by_ordinal(mut self, pattern: SignaturePattern, index: usize) -> Self {
        self.strategies
            .push(SelectionStrategy::Ordinal { pattern, index });
        self
    }

    /// Extends the search to nested types.
    #[must_use]
    pub fn include_nested(mut self) -> Self {
        self.include_nested = true;
        self
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.declaring_type)?;
        if self.include_nested {
            f.write_str("/*")?;
        }
        for (i, strategy) in self.strategies.iter().enumerate() {
            f.write_str(if i == 0 { " by " } else { ", then " })?;
            write!(f, "{strategy}")?;
        }
        Ok(())
    }
}

/// Resolves [`TargetDescriptor`]s against a [`RoutineSource`].
pub struct MethodLocator<'a, S: RoutineSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: RoutineSource + ?Sized> MethodLocator<'a, S> {
    /// Creates a locator over `source`.
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Candidate routines in search order: the declaring type first, then nested types by name.
    fn candidates(
        &self,
        target: &TargetDescriptor,
    ) -> Option<Vec<(TypeName, usize, &'a RoutineDef)>> {
        let root = self.source.host_type(&target.declaring_type)?;
        let mut types = vec![root];
        if target.include_nested {
            types.extend(self.source.types_nested_in(&target.declaring_type));
        }

        Some(
            types
                .into_iter()
                .flat_map(|ty| {
                    ty.routines()
                        .iter()
                        .enumerate()
                        .map(move |(ordinal, routine)| (ty.name().clone(), ordinal, routine))
                })
                .collect(),
        )
    }

    /// Resolves `target` by trying its strategies in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedTarget`] if the declaring type does not exist, the descriptor
    /// has no strategies, or every strategy failed.
    pub fn resolve(&self, target: &TargetDescriptor) -> Result<RoutineHandle> {
        let unresolved = |strategy: &str, reason: String| Error::UnresolvedTarget {
            target: target.to_string(),
            strategy: strategy.to_string(),
            reason,
        };

        let Some(candidates) = self.candidates(target) else {
            return Err(unresolved(
                "none",
                format!("type {} does not exist", target.declaring_type),
            ));
        };
        if target.strategies.is_empty() {
            return Err(unresolved("none", "no selection strategy given".to_string()));
        }

        let mut reasons = Vec::with_capacity(target.strategies.len());
        for strategy in &target.strategies {
            let selected: Vec<&(TypeName, usize, &RoutineDef)> = match strategy {
                SelectionStrategy::ExactName(name) => candidates
                    .iter()
                    .filter(|(_, _, routine)| routine.name() == name)
                    .collect(),
                SelectionStrategy::Shape(pattern) | SelectionStrategy::Ordinal { pattern, .. } => {
                    candidates
                        .iter()
                        .filter(|(_, _, routine)| pattern.matches(routine))
                        .collect()
                }
            };

            let picked = match strategy {
                SelectionStrategy::Ordinal { index, .. } => match selected.get(*index) {
                    Some(picked) => Ok(*picked),
                    None => Err(format!(
                        "{}: only {} candidate(s)",
                        strategy,
                        selected.len()
                    )),
                },
                _ => match selected.as_slice() {
                    [single] => Ok(*single),
                    [] => Err(format!("{strategy}: no candidate")),
                    many => Err(format!("{strategy}: {} candidates", many.len())),
                },
            };

            match picked {
                Ok((ty, ordinal, routine)) => {
                    log::debug!(
                        "resolved {target} via {} to {ty}::{}",
                        strategy.kind(),
                        routine.name()
                    );
                    return Ok(RoutineHandle::new(ty.clone(), *ordinal, routine.name()));
                }
                Err(reason) => {
                    log::debug!("{target}: {reason}");
                    reasons.push(reason);
                }
            }
        }

        let last = target
            .strategies
            .last()
            .map_or("none", SelectionStrategy::kind);
        Err(unresolved(last, reasons.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::sample_host;

    fn enumerator_of_float() -> TypeSig {
        TypeSig::generic_inst("System.Collections.Generic.IEnumerator`1", vec![TypeSig::R4])
    }

    #[test]
    fn test_exact_name_wins() -> Result<()> {
        let image = sample_host();
        let handle = MethodLocator::new(&image)
            .resolve(&TargetDescriptor::new("RoundSummary").by_name("Start"))?;
        assert_eq!(handle.declaring_type().as_str(), "RoundSummary");
        assert_eq!(handle.name(), "Start");
        Ok(())
    }

    #[test]
    fn test_falls_back_to_shape() -> Result<()> {
        let image = sample_host();
        let target = TargetDescriptor::new("MECExtensionMethods2")
            .by_name("CancelWith`1")
            .by_shape(
                SignaturePattern::new()
                    .generic_arity(1)
                    .params(vec![enumerator_of_float(), TypeSig::MethodGeneric(0)]),
            );
        let handle = MethodLocator::new(&image).resolve(&target)?;
        assert_eq!(handle.name(), "CancelWith");

        let routine = image.routine(&handle).unwrap();
        assert_eq!(routine.signature().unwrap().generic_arity, 1);
        Ok(())
    }

    #[test]
    fn test_overloads_are_ambiguous_by_name() {
        let image = sample_host();
        let result = MethodLocator::new(&image)
            .resolve(&TargetDescriptor::new("MECExtensionMethods2").by_name("CancelWith"));
        match result {
            Err(Error::UnresolvedTarget {
                strategy, reason, ..
            }) => {
                assert_eq!(strategy, "exact-name");
                assert!(reason.contains("2 candidates"));
            }
            other => panic!("expected unresolved target, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_ordinal() -> Result<()> {
        let image = sample_host();
        let pattern = SignaturePattern::new()
            .instance(true)
            .params(vec![])
            .returns(TypeSig::Boolean)
            .with_flags(RoutineFlags::COMPILER_GENERATED);

        let shape_only = TargetDescriptor::new("RoundSummary")
            .include_nested()
            .by_shape(pattern.clone());
        assert!(MethodLocator::new(&image).resolve(&shape_only).is_err());

        let target = shape_only.by_ordinal(pattern, 1);
        let handle = MethodLocator::new(&image).resolve(&target)?;
        assert_eq!(
            handle.declaring_type().as_str(),
            "RoundSummary/<_ProcessServerSideCode>d__2"
        );
        assert_eq!(handle.name(), "MoveNext");
        Ok(())
    }

    #[test]
    fn test_unknown_type_and_empty_strategies() {
        let image = sample_host();
        let locator = MethodLocator::new(&image);
        assert!(matches!(
            locator.resolve(&TargetDescriptor::new("Nope").by_name("Start")),
            Err(Error::UnresolvedTarget { .. })
        ));
        assert!(matches!(
            locator.resolve(&TargetDescriptor::new("RoundSummary")),
            Err(Error::UnresolvedTarget { .. })
        ));
    }

    #[test]
    fn test_reasons_cover_every_strategy() {
        let image = sample_host();
        let target = TargetDescriptor::new("RoundSummary")
            .by_name("Missing")
            .by_shape(SignaturePattern::new().params(vec![TypeSig::I8]))
            .by_ordinal(SignaturePattern::new(), 99);
        let Err(Error::UnresolvedTarget {
            strategy, reason, ..
        }) = MethodLocator::new(&image).resolve(&target)
        else {
            panic!("expected failure");
        };
        assert_eq!(strategy, "ordinal");
        assert_eq!(reason.split("; ").count(), 3);
    }
}

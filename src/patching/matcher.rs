//! Anchor location by structural predicates.
//!
//! Host routine bodies are recompiled for every host version, so offsets and instruction counts
//! drift. What survives is structure: "the instruction calling member X", "the store to field
//! Y", "the branch to the loop header". [`InstructionMatcher`] expresses such predicates and
//! composes them with [`InstructionMatcher::and`], [`InstructionMatcher::or`] and
//! [`InstructionMatcher::not`].
//!
//! [`find`] turns a matcher into a single index under an [`Occurrence`] rule. The default,
//! [`Occurrence::Only`], insists on exactly one match: zero matches is [`Error::NoMatch`], more
//! than one is [`Error::AmbiguousMatch`]. There is no best-effort fallback.
//!
//! An [`Anchor`] adds a relative offset to the located index. Offsets are the weak mode: they
//! depend on the exact instruction layout around the landmark and break first when the host
//! changes. Use them only when no unique structural predicate exists.
//!
//! # Examples
//!
//! ```rust
//! use hookscope::assembly::RoutineBodyBuilder;
//! use hookscope::metadata::{MemberRef, MethodSignature};
//! use hookscope::patching::{find, Anchor, InstructionMatcher, Occurrence};
//!
//! let tick = MemberRef::method("Host", "Tick", MethodSignature::void());
//! let m = tick.clone();
//! let body = RoutineBodyBuilder::new()
//!     .implementation(move |asm| {
//!         asm.nop()?.call(m.clone())?.nop()?.call(m)?.ret()?;
//!         Ok(())
//!     })
//!     .build()?;
//!
//! let calls = InstructionMatcher::calls(tick);
//! assert!(find(&body, &calls, Occurrence::Only).is_err());
//! assert_eq!(find(&body, &calls, Occurrence::Last)?, 3);
//!
//! let after_first = Anchor::new(calls).occurrence(Occurrence::First).offset(1);
//! assert_eq!(after_first.locate(&body)?, 2);
//! # Ok::<(), hookscope::Error>(())
//! ```

use std::fmt;

use crate::{
    assembly::{FlowType, Instruction, Label, LocalSlot, OpCode, Operand, RoutineBody},
    metadata::{MemberRef, TypeName},
    Error, Result,
};

/// Predicate over the member referenced by an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberPattern {
    /// Full identity: declaring type, name, shape and generic arguments
    Exact(MemberRef),
    /// Declaring type and/or name, any shape
    Named {
        /// Required declaring type, if any
        declaring_type: Option<TypeName>,
        /// Required simple name, if any
        name: Option<String>,
    },
}

impl MemberPattern {
    /// Matches exactly `member`.
    #[must_use]
    pub fn exact(member: MemberRef) -> Self {
        MemberPattern::Exact(member)
    }

    /// Matches any member called `name` declared by `declaring_type`, regardless of shape.
    pub fn named(declaring_type: impl Into<TypeName>, name: impl Into<String>) -> Self {
        MemberPattern::Named {
            declaring_type: Some(declaring_type.into()),
            name: Some(name.into()),
        }
    }

    /// Matches any member called `name`.
    pub fn any_named(name: impl Into<String>) -> Self {
        MemberPattern::Named {
            declaring_type: None,
            name: Some(name.into()),
        }
    }

    /// Returns true if `member` satisfies this pattern.
    #[must_use]
    pub fn matches(&self, member: &MemberRef) -> bool {
        match self {
            MemberPattern::Exact(expected) => expected == member,
            MemberPattern::Named {
                declaring_type,
                name,
            } => {
                declaring_type
                    .as_ref()
                    .map_or(true, |ty| ty == member.declaring_type())
                    && name.as_deref().map_or(true, |n| n == member.name())
            }
        }
    }
}

impl fmt::Display for MemberPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberPattern::Exact(member) => write!(f, "{member}"),
            MemberPattern::Named {
                declaring_type,
                name,
            } => {
                let ty = declaring_type.as_ref().map_or("*", TypeName::as_str);
                let name = name.as_deref().unwrap_or("*");
                write!(f, "{ty}::{name}")
            }
        }
    }
}

/// A composable structural predicate over a single instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionMatcher {
    /// Matches every instruction
    Any,
    /// Exact opcode
    OpCode(OpCode),
    /// Any of the listed opcodes
    OpCodeIn(Vec<OpCode>),
    /// Control flow classification
    Flow(FlowType),
    /// `call`, `callvirt` or `newobj` whose target satisfies the pattern
    Calls(MemberPattern),
    /// Field load (value or address, instance or static) whose field satisfies the pattern
    LoadsField(MemberPattern),
    /// Field store whose field satisfies the pattern
    StoresField(MemberPattern),
    /// Any instruction whose member operand satisfies the pattern
    References(MemberPattern),
    /// Integer constant load of the given value, any encoding
    Constant(i64),
    /// `ldstr` of the given literal
    String(String),
    /// Branch or switch that can jump to the label
    BranchTo(Label),
    /// Read of the local slot, any encoding
    LoadsLocal(LocalSlot),
    /// Write of the local slot, any encoding
    StoresLocal(LocalSlot),
    /// Read of the argument, any encoding
    LoadsArgument(u16),
    /// Instruction carrying the label
    HasLabel(Label),
    /// All inner matchers hold
    All(Vec<InstructionMatcher>),
    /// At least one inner matcher holds
    AnyOf(Vec<InstructionMatcher>),
    /// Inner matcher does not hold
    Not(Box<InstructionMatcher>),
}

impl InstructionMatcher {
    /// Matches an exact opcode.
    #[must_use]
    pub fn opcode(opcode: OpCode) -> Self {
        InstructionMatcher::OpCode(opcode)
    }

    /// Matches a call to exactly `member`.
    #[must_use]
    pub fn calls(member: MemberRef) -> Self {
        InstructionMatcher::Calls(MemberPattern::exact(member))
    }

    /// Matches a call to any overload of `declaring_type::name`.
    pub fn calls_named(declaring_type: impl Into<TypeName>, name: impl Into<String>) -> Self {
        InstructionMatcher::Calls(MemberPattern::named(declaring_type, name))
    }

    /// Matches a load of exactly `field`.
    #[must_use]
    pub fn loads_field(field: MemberRef) -> Self {
        InstructionMatcher::LoadsField(MemberPattern::exact(field))
    }

    /// Matches a store to exactly `field`.
    #[must_use]
    pub fn stores_field(field: MemberRef) -> Self {
        InstructionMatcher::StoresField(MemberPattern::exact(field))
    }

    /// Matches an integer constant load.
    #[must_use]
    pub fn constant(value: i64) -> Self {
        InstructionMatcher::Constant(value)
    }

    /// Matches a branch that can jump to `label`.
    #[must_use]
    pub fn branch_to(label: Label) -> Self {
        InstructionMatcher::BranchTo(label)
    }

    /// Both `self` and `other` must hold.
    #[must_use]
    pub fn and(self, other: InstructionMatcher) -> Self {
        match self {
            InstructionMatcher::All(mut inner) => {
                inner.push(other);
                InstructionMatcher::All(inner)
            }
            first => InstructionMatcher::All(vec![first, other]),
        }
    }

    /// Either `self` or `other` must hold.
    #[must_use]
    pub fn or(self, other: InstructionMatcher) -> Self {
        match self {
            InstructionMatcher::AnyOf(mut inner) => {
                inner.push(other);
                InstructionMatcher::AnyOf(inner)
            }
            first => InstructionMatcher::AnyOf(vec![first, other]),
        }
    }

    /// Negates `self`.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        InstructionMatcher::Not(Box::new(self))
    }

    /// Returns true if `instr` satisfies this matcher.
    #[must_use]
    pub fn matches(&self, instr: &Instruction) -> bool {
        match self {
            InstructionMatcher::Any => true,
            InstructionMatcher::OpCode(opcode) => instr.opcode() == *opcode,
            InstructionMatcher::OpCodeIn(opcodes) => opcodes.contains(&instr.opcode()),
            InstructionMatcher::Flow(flow) => instr.opcode().flow_type() == *flow,
            InstructionMatcher::Calls(pattern) => {
                instr.opcode().flow_type() == FlowType::Call
                    && instr.member().is_some_and(|m| pattern.matches(m))
            }
            InstructionMatcher::LoadsField(pattern) => {
                instr.opcode().is_field_load() && instr.member().is_some_and(|m| pattern.matches(m))
            }
            InstructionMatcher::StoresField(pattern) => {
                instr.opcode().is_field_store()
                    && instr.member().is_some_and(|m| pattern.matches(m))
            }
            InstructionMatcher::References(pattern) => {
                instr.member().is_some_and(|m| pattern.matches(m))
            }
            InstructionMatcher::Constant(value) => instr.constant() == Some(*value),
            InstructionMatcher::String(value) => {
                matches!(instr.operand(), Operand::String(s) if s == value)
            }
            InstructionMatcher::BranchTo(label) => instr.branch_targets().contains(label),
            InstructionMatcher::LoadsLocal(slot) => {
                instr.opcode().is_local_load() && instr.local_slot() == Some(*slot)
            }
            InstructionMatcher::StoresLocal(slot) => {
                instr.opcode().is_local_store() && instr.local_slot() == Some(*slot)
            }
            InstructionMatcher::LoadsArgument(index) => {
                matches!(
                    instr.opcode(),
                    OpCode::Ldarg0
                        | OpCode::Ldarg1
                        | OpCode::Ldarg2
                        | OpCode::Ldarg3
                        | OpCode::LdargS
                        | OpCode::Ldarg
                ) && instr.argument() == Some(*index)
            }
            InstructionMatcher::HasLabel(label) => instr.has_label(*label),
            InstructionMatcher::All(inner) => inner.iter().all(|m| m.matches(instr)),
            InstructionMatcher::AnyOf(inner) => inner.iter().any(|m| m.matches(instr)),
            InstructionMatcher::Not(inner) => !inner.matches(instr),
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    inner: &[InstructionMatcher],
    separator: &str,
) -> fmt::Result {
    f.write_str("(")?;
    for (i, matcher) in inner.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{matcher}")?;
    }
    f.write_str(")")
}

impl fmt::Display for InstructionMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstructionMatcher::Any => f.write_str("*"),
            InstructionMatcher::OpCode(opcode) => write!(f, "{opcode}"),
            InstructionMatcher::OpCodeIn(opcodes) => {
                let names: Vec<&str> = opcodes.iter().map(|op| op.mnemonic()).collect();
                write!(f, "{{{}}}", names.join("|"))
            }
            InstructionMatcher::Flow(flow) => write!(f, "flow {flow:?}"),
            InstructionMatcher::Calls(pattern) => write!(f, "call {pattern}"),
            InstructionMatcher::LoadsField(pattern) => write!(f, "ldfld {pattern}"),
            InstructionMatcher::StoresField(pattern) => write!(f, "stfld {pattern}"),
            InstructionMatcher::References(pattern) => write!(f, "ref {pattern}"),
            InstructionMatcher::Constant(value) => write!(f, "ldc {value}"),
            InstructionMatcher::String(value) => write!(f, "ldstr {value:?}"),
            InstructionMatcher::BranchTo(label) => write!(f, "branch {label}"),
            InstructionMatcher::LoadsLocal(slot) => write!(f, "ldloc {slot}"),
            InstructionMatcher::StoresLocal(slot) => write!(f, "stloc {slot}"),
            InstructionMatcher::LoadsArgument(index) => write!(f, "ldarg {index}"),
            InstructionMatcher::HasLabel(label) => write!(f, "{label}:"),
            InstructionMatcher::All(inner) => write_joined(f, inner, " & "),
            InstructionMatcher::AnyOf(inner) => write_joined(f, inner, " | "),
            InstructionMatcher::Not(inner) => write!(f, "!{inner}"),
        }
    }
}

/// Which of several matches an anchor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Occurrence {
    /// Exactly one match is required
    #[default]
    Only,
    /// The first match
    First,
    /// The last match
    Last,
    /// The n-th match, counting from zero
    Nth(usize),
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Occurrence::Only => f.write_str("only"),
            Occurrence::First => f.write_str("first"),
            Occurrence::Last => f.write_str("last"),
            Occurrence::Nth(n) => write!(f, "#{n}"),
        }
    }
}

/// Returns the indices of every instruction matching `matcher`, in body order.
#[must_use]
pub fn find_all(body: &RoutineBody, matcher: &InstructionMatcher) -> Vec<usize> {
    body.instructions()
        .iter()
        .enumerate()
        .filter(|(_, instr)| matcher.matches(instr))
        .map(|(index, _)| index)
        .collect()
}

/// Locates a single instruction.
///
/// # Errors
///
/// - [`Error::NoMatch`] if nothing matches
/// - [`Error::AmbiguousMatch`] if `occurrence` is [`Occurrence::Only`] and several match
/// - [`Error::IndexOutOfRange`] if [`Occurrence::Nth`] exceeds the number of matches
pub fn find(
    body: &RoutineBody,
    matcher: &InstructionMatcher,
    occurrence: Occurrence,
) -> Result<usize> {
    let matches = find_all(body, matcher);
    if matches.is_empty() {
        return Err(Error::NoMatch {
            anchor: matcher.to_string(),
        });
    }

    match occurrence {
        Occurrence::Only if matches.len() > 1 => Err(Error::AmbiguousMatch {
            anchor: matcher.to_string(),
            matches: matches.len(),
        }),
        Occurrence::Only | Occurrence::First => Ok(matches[0]),
        Occurrence::Last => Ok(matches[matches.len() - 1]),
        Occurrence::Nth(n) => matches.get(n).copied().ok_or(Error::IndexOutOfRange {
            index: isize::try_from(n).unwrap_or(isize::MAX),
            len: matches.len(),
        }),
    }
}

/// A matcher, an occurrence rule and a relative offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    /// Structural predicate
    pub matcher: InstructionMatcher,
    /// Which match to use
    pub occurrence: Occurrence,
    /// Offset added to the located index
    pub offset: isize,
}

impl Anchor {
    /// Creates an anchor requiring a unique match with no offset.
    #[must_use]
    pub fn new(matcher: InstructionMatcher) -> Self {
        Self {
            matcher,
            occurrence: Occurrence::Only,
            offset: 0,
        }
    }

    /// Sets the occurrence rule.
    #[must_use]
    pub fn occurrence(mut self, occurrence: Occurrence) -> Self {
        self.occurrence = occurrence;
        self
    }

    /// Sets the relative offset from the match.
    #[must_use]
    pub fn offset(mut self, offset: isize) -> Self {
        self.offset = offset;
        self
    }

    /// Resolves the anchor to an instruction index in `body`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`find`], or [`Error::IndexOutOfRange`] if the offset leaves the
    /// body.
    pub fn locate(&self, body: &RoutineBody) -> Result<usize> {
        let index = find(body, &self.matcher, self.occurrence)?;
        if self.offset == 0 {
            return Ok(index);
        }

        let target = isize::try_from(index)
            .ok()
            .and_then(|index| index.checked_add(self.offset))
            .unwrap_or(isize::MAX);
        match usize::try_from(target) {
            Ok(target) if target < body.len() => Ok(target),
            _ => Err(Error::IndexOutOfRange {
                index: target,
                len: body.len(),
            }),
        }
    }
}

impl From<InstructionMatcher> for Anchor {
    fn from(matcher: InstructionMatcher) -> Self {
        Anchor::new(matcher)
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.matcher, self.occurrence)?;
        if self.offset != 0 {
            write!(f, " {:+}", self.offset)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::RoutineBodyBuilder,
        metadata::{MethodSignature, TypeSig},
    };

    fn field() -> MemberRef {
        MemberRef::field("Round", "_roundEnded", TypeSig::Boolean)
    }

    fn body() -> RoutineBody {
        let f = field();
        RoutineBodyBuilder::new()
            .local(TypeSig::I4)
            .implementation(move |asm| {
                asm.label("top")?
                    .ldarg_0()?
                    .ldfld(f.clone())?
                    .brtrue("top")?
                    .ldc_i4(3)?
                    .stloc(0)?
                    .ldarg_0()?
                    .ldc_i4(1)?
                    .stfld(f)?
                    .ldstr("done")?
                    .pop()?
                    .ret()?;
                Ok(())
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_structural_matchers() -> Result<()> {
        let body = body();
        assert_eq!(find(&body, &InstructionMatcher::loads_field(field()), Occurrence::Only)?, 1);
        assert_eq!(find(&body, &InstructionMatcher::stores_field(field()), Occurrence::Only)?, 7);
        assert_eq!(find(&body, &InstructionMatcher::constant(3), Occurrence::Only)?, 3);
        assert_eq!(
            find(&body, &InstructionMatcher::StoresLocal(LocalSlot::new(0)), Occurrence::Only)?,
            4
        );
        assert_eq!(
            find(&body, &InstructionMatcher::String("done".into()), Occurrence::Only)?,
            8
        );
        let top = body.get(0).unwrap().labels().next().unwrap();
        assert_eq!(find(&body, &InstructionMatcher::branch_to(top), Occurrence::Only)?, 2);
        assert_eq!(find(&body, &InstructionMatcher::HasLabel(top), Occurrence::Only)?, 0);
        Ok(())
    }

    #[test]
    fn test_occurrences() -> Result<()> {
        let body = body();
        let ldarg = InstructionMatcher::LoadsArgument(0);
        assert_eq!(find_all(&body, &ldarg), vec![0, 5]);
        assert!(matches!(
            find(&body, &ldarg, Occurrence::Only),
            Err(Error::AmbiguousMatch { matches: 2, .. })
        ));
        assert_eq!(find(&body, &ldarg, Occurrence::First)?, 0);
        assert_eq!(find(&body, &ldarg, Occurrence::Last)?, 5);
        assert_eq!(find(&body, &ldarg, Occurrence::Nth(1))?, 5);
        assert!(matches!(
            find(&body, &ldarg, Occurrence::Nth(2)),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
        Ok(())
    }

    #[test]
    fn test_no_match() {
        let body = body();
        let missing = InstructionMatcher::calls(MemberRef::method(
            "Round",
            "Missing",
            MethodSignature::void(),
        ));
        for occurrence in [Occurrence::Only, Occurrence::First, Occurrence::Last] {
            assert!(matches!(
                find(&body, &missing, occurrence),
                Err(Error::NoMatch { .. })
            ));
        }
    }

    #[test]
    fn test_composition() -> Result<()> {
        let body = body();
        let ldarg_then_not_first = InstructionMatcher::LoadsArgument(0)
            .and(InstructionMatcher::HasLabel(Label::new(0)).not());
        assert_eq!(find(&body, &ldarg_then_not_first, Occurrence::Only)?, 5);

        let either =
            InstructionMatcher::opcode(OpCode::Ret).or(InstructionMatcher::opcode(OpCode::Pop));
        assert_eq!(find_all(&body, &either), vec![9, 10]);
        Ok(())
    }

    #[test]
    fn test_anchor_offsets() -> Result<()> {
        let body = body();
        let store = Anchor::new(InstructionMatcher::stores_field(field()));
        assert_eq!(store.clone().offset(-2).locate(&body)?, 5);
        assert!(matches!(
            store.clone().offset(10).locate(&body),
            Err(Error::IndexOutOfRange { index: 17, len: 11 })
        ));
        assert!(matches!(
            Anchor::new(InstructionMatcher::HasLabel(Label::new(0)))
                .offset(-1)
                .locate(&body),
            Err(Error::IndexOutOfRange { index: -1, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_named_member_pattern() {
        let a = MemberRef::method("Host", "Tick", MethodSignature::void());
        let b = MemberRef::method(
            "Host",
            "Tick",
            MethodSignature::new(vec![TypeSig::R4], TypeSig::Void),
        );
        let pattern = MemberPattern::named("Host", "Tick");
        assert!(pattern.matches(&a));
        assert!(pattern.matches(&b));
        assert!(!MemberPattern::exact(a.clone()).matches(&b));
        assert!(MemberPattern::any_named("Tick").matches(&b));
        assert_eq!(pattern.to_string(), "Host::Tick");
    }
}

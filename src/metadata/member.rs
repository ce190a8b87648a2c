//! Member references: the identities instruction operands point at.
//!
//! A [`MemberRef`] names a method, field or type of the host by declaring type, name and shape.
//! Two references are the same member exactly when all of these agree, which is what the anchor
//! locator relies on when it matches "the instruction calling member X".
//!
//! Shapes are described with [`TypeSig`], a small signature language that is sufficient to tell
//! overloads and compiler-generated routines apart (`IEnumerator<float>`, method generic
//! parameters, named host types).
//!
//! # Examples
//!
//! ```rust
//! use hookscope::metadata::{MemberRef, MethodSignature, TypeName, TypeSig};
//!
//! let coroutine =
//!     || TypeSig::generic_inst("System.Collections.Generic.IEnumerator`1", vec![TypeSig::R4]);
//! let cancel_with = MemberRef::method(
//!     "MECExtensionMethods2",
//!     "CancelWith",
//!     MethodSignature::generic(1, vec![coroutine(), TypeSig::MethodGeneric(0)], coroutine()),
//! );
//!
//! let closed = cancel_with.instantiate(vec![TypeSig::named("RoundSummary")])?;
//! assert_eq!(closed.to_string(), "MECExtensionMethods2::CancelWith<RoundSummary>");
//! assert_eq!(closed.declaring_type(), &TypeName::new("MECExtensionMethods2"));
//! # Ok::<(), hookscope::Error>(())
//! ```

use std::fmt;

use crate::Result;

/// Fully qualified name of a host type (`Namespace.Outer/Nested`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeName(String);

impl TypeName {
    /// Creates a type name from its fully qualified textual form.
    pub fn new(name: impl Into<String>) -> Self {
        TypeName(name.into())
    }

    /// Returns the fully qualified name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name of a type nested in this one (`Outer/Inner`).
    #[must_use]
    pub fn nested(&self, inner: &str) -> TypeName {
        TypeName(format!("{}/{}", self.0, inner))
    }

    /// Returns true if `self` is declared (directly or transitively) inside `outer`.
    #[must_use]
    pub fn is_nested_in(&self, outer: &TypeName) -> bool {
        self.0.len() > outer.0.len()
            && self.0.starts_with(outer.0.as_str())
            && self.0.as_bytes()[outer.0.len()] == b'/'
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(value: &str) -> Self {
        TypeName::new(value)
    }
}

impl From<String> for TypeName {
    fn from(value: String) -> Self {
        TypeName(value)
    }
}

/// Type signature of a parameter, return value, field or local.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    /// `void`
    Void,
    /// `bool`
    Boolean,
    /// `int32`
    I4,
    /// `int64`
    I8,
    /// `float32`
    R4,
    /// `float64`
    R8,
    /// `string`
    String,
    /// `object`
    Object,
    /// A named host type
    Named(TypeName),
    /// The n-th generic parameter of the enclosing method (`!!n`)
    MethodGeneric(u8),
    /// A generic instantiation (`List`1<int32>`)
    GenericInst(TypeName, Vec<TypeSig>),
}

impl TypeSig {
    /// Shorthand for [`TypeSig::Named`].
    pub fn named(name: impl Into<TypeName>) -> Self {
        TypeSig::Named(name.into())
    }

    /// Shorthand for [`TypeSig::GenericInst`].
    pub fn generic_inst(name: impl Into<TypeName>, args: Vec<TypeSig>) -> Self {
        TypeSig::GenericInst(name.into(), args)
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Void => f.write_str("void"),
            TypeSig::Boolean => f.write_str("bool"),
            TypeSig::I4 => f.write_str("int32"),
            TypeSig::I8 => f.write_str("int64"),
            TypeSig::R4 => f.write_str("float32"),
            TypeSig::R8 => f.write_str("float64"),
            TypeSig::String => f.write_str("string"),
            TypeSig::Object => f.write_str("object"),
            TypeSig::Named(name) => write!(f, "{name}"),
            TypeSig::MethodGeneric(index) => write!(f, "!!{index}"),
            TypeSig::GenericInst(name, args) => {
                write!(f, "{name}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
        }
    }
}

/// Parameter and return shape of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Whether the method takes an implicit `this`
    pub has_this: bool,
    /// Number of method-level generic parameters
    pub generic_arity: u8,
    /// Declared parameter types, without `this`
    pub params: Vec<TypeSig>,
    /// Return type
    pub ret: TypeSig,
}

impl MethodSignature {
    /// A static, non-generic signature.
    #[must_use]
    pub fn new(params: Vec<TypeSig>, ret: TypeSig) -> Self {
        Self {
            has_this: false,
            generic_arity: 0,
            params,
            ret,
        }
    }

    /// An instance (`this`-taking), non-generic signature.
    #[must_use]
    pub fn instance(params: Vec<TypeSig>, ret: TypeSig) -> Self {
        Self {
            has_this: true,
            ..Self::new(params, ret)
        }
    }

    /// A static generic signature with `arity` method generic parameters.
    #[must_use]
    pub fn generic(arity: u8, params: Vec<TypeSig>, ret: TypeSig) -> Self {
        Self {
            generic_arity: arity,
            ..Self::new(params, ret)
        }
    }

    /// `void ()`, the shape of most parameterless hooks.
    #[must_use]
    pub fn void() -> Self {
        Self::new(Vec::new(), TypeSig::Void)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

/// What kind of member a [`MemberRef`] names, together with its shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// A method with its signature
    Method(MethodSignature),
    /// A field with its type
    Field(TypeSig),
    /// The declaring type itself
    Type,
}

/// Reference to a host member, compared by full identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    declaring_type: TypeName,
    name: String,
    kind: MemberKind,
    generic_args: Vec<TypeSig>,
}

impl MemberRef {
    /// References a method.
    pub fn method(
        declaring_type: impl Into<TypeName>,
        name: impl Into<String>,
        signature: MethodSignature,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            kind: MemberKind::Method(signature),
            generic_args: Vec::new(),
        }
    }

    /// References a field.
    pub fn field(
        declaring_type: impl Into<TypeName>,
        name: impl Into<String>,
        field_type: TypeSig,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            kind: MemberKind::Field(field_type),
            generic_args: Vec::new(),
        }
    }

    /// References a type.
    pub fn type_ref(name: impl Into<TypeName>) -> Self {
        let declaring_type = name.into();
        Self {
            name: declaring_type.as_str().to_string(),
            declaring_type,
            kind: MemberKind::Type,
            generic_args: Vec::new(),
        }
    }

    /// Closes a generic method over `args`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the member is not a generic method, is already
    /// instantiated, or `args` does not match its generic arity.
    pub fn instantiate(&self, args: Vec<TypeSig>) -> Result<MemberRef> {
        let MemberKind::Method(signature) = &self.kind else {
            return Err(malformed_error!("{} is not a method", self));
        };
        if !self.generic_args.is_empty() {
            return Err(malformed_error!("{} is already instantiated", self));
        }
        if usize::from(signature.generic_arity) != args.len() || args.is_empty() {
            return Err(malformed_error!(
                "{} expects {} generic argument(s), got {}",
                self,
                signature.generic_arity,
                args.len()
            ));
        }

        Ok(MemberRef {
            generic_args: args,
            ..self.clone()
        })
    }

    /// Declaring type of the member.
    #[must_use]
    pub fn declaring_type(&self) -> &TypeName {
        &self.declaring_type
    }

    /// Simple name of the member.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind and shape of the member.
    #[must_use]
    pub fn kind(&self) -> &MemberKind {
        &self.kind
    }

    /// Method signature, if this references a method.
    #[must_use]
    pub fn signature(&self) -> Option<&MethodSignature> {
        match &self.kind {
            MemberKind::Method(sig) => Some(sig),
            _ => None,
        }
    }

    /// Generic arguments of a closed generic method.
    #[must_use]
    pub fn generic_args(&self) -> &[TypeSig] {
        &self.generic_args
    }

    /// Returns true for method references.
    #[must_use]
    pub fn is_method(&self) -> bool {
        matches!(self.kind, MemberKind::Method(_))
    }

    /// Returns true for field references.
    #[must_use]
    pub fn is_field(&self) -> bool {
        matches!(self.kind, MemberKind::Field(_))
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if matches!(self.kind, MemberKind::Type) {
            return write!(f, "{}", self.declaring_type);
        }

        write!(f, "{}::{}", self.declaring_type, self.name)?;
        if !self.generic_args.is_empty() {
            f.write_str("<")?;
            for (i, arg) in self.generic_args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{arg}")?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_includes_shape() {
        let a = MemberRef::method("Host", "Tick", MethodSignature::void());
        let b = MemberRef::method(
            "Host",
            "Tick",
            MethodSignature::new(vec![TypeSig::R4], TypeSig::Void),
        );
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_ne!(
            MemberRef::field("Host", "Tick", TypeSig::I4),
            MemberRef::method("Host", "Tick", MethodSignature::void())
        );
    }

    #[test]
    fn test_instantiate_checks_arity() {
        let open = MemberRef::method(
            "Ext",
            "Wrap",
            MethodSignature::generic(1, vec![TypeSig::MethodGeneric(0)], TypeSig::Void),
        );
        assert!(open.instantiate(vec![]).is_err());
        assert!(open
            .instantiate(vec![TypeSig::I4, TypeSig::I8])
            .is_err());

        let closed = open.instantiate(vec![TypeSig::I4]).unwrap();
        assert_eq!(closed.generic_args(), &[TypeSig::I4]);
        assert!(closed.instantiate(vec![TypeSig::I4]).is_err());

        let field = MemberRef::field("Ext", "Count", TypeSig::I4);
        assert!(field.instantiate(vec![TypeSig::I4]).is_err());
    }

    #[test]
    fn test_nested_type_names() {
        let outer = TypeName::new("RoundSummary");
        let inner = outer.nested("<Start>d__12");
        assert_eq!(inner.as_str(), "RoundSummary/<Start>d__12");
        assert!(inner.is_nested_in(&outer));
        assert!(!outer.is_nested_in(&outer));
        assert!(!TypeName::new("RoundSummaryExtra").is_nested_in(&outer));
    }

    #[test]
    fn test_display() {
        let sig = MethodSignature::new(
            vec![TypeSig::generic_inst("List`1", vec![TypeSig::I4]), TypeSig::String],
            TypeSig::Boolean,
        );
        assert_eq!(sig.to_string(), "bool (List`1<int32>, string)");
        assert_eq!(
            MemberRef::field("Round", "_roundEnded", TypeSig::Boolean).to_string(),
            "Round::_roundEnded"
        );
        assert_eq!(MemberRef::type_ref("Round").to_string(), "Round");
    }
}

//! Opcode set, control-flow classification and operand shapes.
//!
//! [`OpCode`] is a closed enum over the CIL instructions that show up in host routines worth
//! patching. Mnemonics follow ECMA-335 spelling (`ldarg.0`, `brtrue.s`, ...) and are provided
//! through `strum`, so an opcode can be printed or parsed from its textual form.
//!
//! Besides naming, each opcode knows
//! - how it affects control flow ([`FlowType`]),
//! - which operand shape it requires ([`OperandKind`]), which the verifier checks after edits,
//! - the implicit local, argument or constant encoded in its shorthand forms, so that matchers
//!   can treat `ldloc.1` and `ldloc.s V_1` as the same access.
//!
//! # Examples
//!
//! ```rust
//! use hookscope::assembly::{FlowType, OpCode};
//! use std::str::FromStr;
//!
//! let op = OpCode::from_str("brtrue.s")?;
//! assert_eq!(op, OpCode::BrtrueS);
//! assert_eq!(op.flow_type(), FlowType::ConditionalBranch);
//! assert_eq!(OpCode::Ldloc1.implicit_local(), Some(1));
//! assert_eq!(OpCode::LdcI4M1.implicit_constant(), Some(-1));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use strum::{EnumCount, EnumIter, EnumString, IntoStaticStr};

/// How an instruction affects control flow.
///
/// # Thread Safety
///
/// [`FlowType`] is [`std::marker::Send`] and [`std::marker::Sync`] as it only contains unit
/// variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

/// The operand shape an opcode requires.
///
/// Checked by [`crate::patching::verify`] so that an edited body never carries, for example,
/// a branch without a label or a `call` whose operand is a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// No operand
    None,
    /// A 32-bit or smaller integer immediate
    Int32,
    /// A 64-bit integer immediate
    Int64,
    /// A 32-bit float immediate
    Float32,
    /// A 64-bit float immediate
    Float64,
    /// A string literal
    String,
    /// A method reference
    Method,
    /// A field reference
    Field,
    /// A type reference
    Type,
    /// Any member reference (`ldtoken`)
    Member,
    /// A single branch target label
    Target,
    /// A table of branch target labels
    Switch,
    /// A local slot
    Local,
    /// An argument index
    Argument,
}

/// CIL opcodes understood by the patcher.
///
/// The set is closed; unknown host opcodes are not representable, which keeps every consumer
/// exhaustive. The textual form of each variant is its ECMA-335 mnemonic.
#[allow(missing_docs)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, EnumString, IntoStaticStr,
)]
pub enum OpCode {
    #[strum(serialize = "nop")]
    Nop,
    #[strum(serialize = "ldarg.0")]
    Ldarg0,
    #[strum(serialize = "ldarg.1")]
    Ldarg1,
    #[strum(serialize = "ldarg.2")]
    Ldarg2,
    #[strum(serialize = "ldarg.3")]
    Ldarg3,
    #[strum(serialize = "ldarg.s")]
    LdargS,
    #[strum(serialize = "ldarg")]
    Ldarg,
    #[strum(serialize = "ldarga.s")]
    LdargaS,
    #[strum(serialize = "starg.s")]
    StargS,
    #[strum(serialize = "ldloc.0")]
    Ldloc0,
    #[strum(serialize = "ldloc.1")]
    Ldloc1,
    #[strum(serialize = "ldloc.2")]
    Ldloc2,
    #[strum(serialize = "ldloc.3")]
    Ldloc3,
    #[strum(serialize = "ldloc.s")]
    LdlocS,
    #[strum(serialize = "ldloc")]
    Ldloc,
    #[strum(serialize = "ldloca.s")]
    LdlocaS,
    #[strum(serialize = "stloc.0")]
    Stloc0,
    #[strum(serialize = "stloc.1")]
    Stloc1,
    #[strum(serialize = "stloc.2")]
    Stloc2,
    #[strum(serialize = "stloc.3")]
    Stloc3,
    #[strum(serialize = "stloc.s")]
    StlocS,
    #[strum(serialize = "stloc")]
    Stloc,
    #[strum(serialize = "ldnull")]
    Ldnull,
    #[strum(serialize = "ldc.i4.m1")]
    LdcI4M1,
    #[strum(serialize = "ldc.i4.0")]
    LdcI40,
    #[strum(serialize = "ldc.i4.1")]
    LdcI41,
    #[strum(serialize = "ldc.i4.2")]
    LdcI42,
    #[strum(serialize = "ldc.i4.3")]
    LdcI43,
    #[strum(serialize = "ldc.i4.4")]
    LdcI44,
    #[strum(serialize = "ldc.i4.5")]
    LdcI45,
    #[strum(serialize = "ldc.i4.6")]
    LdcI46,
    #[strum(serialize = "ldc.i4.7")]
    LdcI47,
    #[strum(serialize = "ldc.i4.8")]
    LdcI48,
    #[strum(serialize = "ldc.i4.s")]
    LdcI4S,
    #[strum(serialize = "ldc.i4")]
    LdcI4,
    #[strum(serialize = "ldc.i8")]
    LdcI8,
    #[strum(serialize = "ldc.r4")]
    LdcR4,
    #[strum(serialize = "ldc.r8")]
    LdcR8,
    #[strum(serialize = "ldstr")]
    Ldstr,
    #[strum(serialize = "dup")]
    Dup,
    #[strum(serialize = "pop")]
    Pop,
    #[strum(serialize = "call")]
    Call,
    #[strum(serialize = "callvirt")]
    Callvirt,
    #[strum(serialize = "newobj")]
    Newobj,
    #[strum(serialize = "ret")]
    Ret,
    #[strum(serialize = "br.s")]
    BrS,
    #[strum(serialize = "brfalse.s")]
    BrfalseS,
    #[strum(serialize = "brtrue.s")]
    BrtrueS,
    #[strum(serialize = "beq.s")]
    BeqS,
    #[strum(serialize = "bge.s")]
    BgeS,
    #[strum(serialize = "bgt.s")]
    BgtS,
    #[strum(serialize = "ble.s")]
    BleS,
    #[strum(serialize = "blt.s")]
    BltS,
    #[strum(serialize = "bne.un.s")]
    BneUnS,
    #[strum(serialize = "br")]
    Br,
    #[strum(serialize = "brfalse")]
    Brfalse,
    #[strum(serialize = "brtrue")]
    Brtrue,
    #[strum(serialize = "beq")]
    Beq,
    #[strum(serialize = "bge")]
    Bge,
    #[strum(serialize = "bgt")]
    Bgt,
    #[strum(serialize = "ble")]
    Ble,
    #[strum(serialize = "blt")]
    Blt,
    #[strum(serialize = "bne.un")]
    BneUn,
    #[strum(serialize = "switch")]
    Switch,
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "sub")]
    Sub,
    #[strum(serialize = "mul")]
    Mul,
    #[strum(serialize = "div")]
    Div,
    #[strum(serialize = "rem")]
    Rem,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "xor")]
    Xor,
    #[strum(serialize = "neg")]
    Neg,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "conv.i4")]
    ConvI4,
    #[strum(serialize = "conv.r4")]
    ConvR4,
    #[strum(serialize = "ldfld")]
    Ldfld,
    #[strum(serialize = "ldflda")]
    Ldflda,
    #[strum(serialize = "stfld")]
    Stfld,
    #[strum(serialize = "ldsfld")]
    Ldsfld,
    #[strum(serialize = "ldsflda")]
    Ldsflda,
    #[strum(serialize = "stsfld")]
    Stsfld,
    #[strum(serialize = "box")]
    Box,
    #[strum(serialize = "unbox.any")]
    UnboxAny,
    #[strum(serialize = "castclass")]
    Castclass,
    #[strum(serialize = "isinst")]
    Isinst,
    #[strum(serialize = "newarr")]
    Newarr,
    #[strum(serialize = "ldlen")]
    Ldlen,
    #[strum(serialize = "ldelem.ref")]
    LdelemRef,
    #[strum(serialize = "stelem.ref")]
    StelemRef,
    #[strum(serialize = "initobj")]
    Initobj,
    #[strum(serialize = "ldtoken")]
    Ldtoken,
    #[strum(serialize = "throw")]
    Throw,
    #[strum(serialize = "rethrow")]
    Rethrow,
    #[strum(serialize = "leave")]
    Leave,
    #[strum(serialize = "leave.s")]
    LeaveS,
    #[strum(serialize = "endfinally")]
    Endfinally,
    #[strum(serialize = "ceq")]
    Ceq,
    #[strum(serialize = "cgt")]
    Cgt,
    #[strum(serialize = "clt")]
    Clt,
}

impl OpCode {
    /// Returns the ECMA-335 mnemonic of this opcode.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Returns how this opcode affects control flow.
    #[must_use]
    pub const fn flow_type(self) -> FlowType {
        match self {
            OpCode::BrS | OpCode::Br => FlowType::UnconditionalBranch,
            OpCode::BrfalseS
            | OpCode::BrtrueS
            | OpCode::BeqS
            | OpCode::BgeS
            | OpCode::BgtS
            | OpCode::BleS
            | OpCode::BltS
            | OpCode::BneUnS
            | OpCode::Brfalse
            | OpCode::Brtrue
            | OpCode::Beq
            | OpCode::Bge
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Blt
            | OpCode::BneUn => FlowType::ConditionalBranch,
            OpCode::Switch => FlowType::Switch,
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj => FlowType::Call,
            OpCode::Ret => FlowType::Return,
            OpCode::Throw | OpCode::Rethrow => FlowType::Throw,
            OpCode::Leave | OpCode::LeaveS => FlowType::Leave,
            OpCode::Endfinally => FlowType::EndFinally,
            _ => FlowType::Sequential,
        }
    }

    /// Returns the operand shape this opcode requires.
    #[must_use]
    pub const fn operand_kind(self) -> OperandKind {
        match self {
            OpCode::LdargS | OpCode::Ldarg | OpCode::LdargaS | OpCode::StargS => {
                OperandKind::Argument
            }
            OpCode::LdlocS
            | OpCode::Ldloc
            | OpCode::LdlocaS
            | OpCode::StlocS
            | OpCode::Stloc => OperandKind::Local,
            OpCode::LdcI4S | OpCode::LdcI4 => OperandKind::Int32,
            OpCode::LdcI8 => OperandKind::Int64,
            OpCode::LdcR4 => OperandKind::Float32,
            OpCode::LdcR8 => OperandKind::Float64,
            OpCode::Ldstr => OperandKind::String,
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj => OperandKind::Method,
            OpCode::Ldfld
            | OpCode::Ldflda
            | OpCode::Stfld
            | OpCode::Ldsfld
            | OpCode::Ldsflda
            | OpCode::Stsfld => OperandKind::Field,
            OpCode::Box
            | OpCode::UnboxAny
            | OpCode::Castclass
            | OpCode::Isinst
            | OpCode::Newarr
            | OpCode::Initobj => OperandKind::Type,
            OpCode::Ldtoken => OperandKind::Member,
            OpCode::Switch => OperandKind::Switch,
            _ if self.is_branch() => OperandKind::Target,
            _ => OperandKind::None,
        }
    }

    /// Returns true for every opcode that transfers control to a single label.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave
        )
    }

    /// Returns true for opcodes that load a field (instance or static, value or address).
    #[must_use]
    pub const fn is_field_load(self) -> bool {
        matches!(
            self,
            OpCode::Ldfld | OpCode::Ldflda | OpCode::Ldsfld | OpCode::Ldsflda
        )
    }

    /// Returns true for opcodes that store a field.
    #[must_use]
    pub const fn is_field_store(self) -> bool {
        matches!(self, OpCode::Stfld | OpCode::Stsfld)
    }

    /// Returns true for opcodes that read a local slot (value or address).
    #[must_use]
    pub const fn is_local_load(self) -> bool {
        matches!(
            self,
            OpCode::Ldloc0
                | OpCode::Ldloc1
                | OpCode::Ldloc2
                | OpCode::Ldloc3
                | OpCode::LdlocS
                | OpCode::Ldloc
                | OpCode::LdlocaS
        )
    }

    /// Returns true for opcodes that write a local slot.
    #[must_use]
    pub const fn is_local_store(self) -> bool {
        matches!(
            self,
            OpCode::Stloc0
                | OpCode::Stloc1
                | OpCode::Stloc2
                | OpCode::Stloc3
                | OpCode::StlocS
                | OpCode::Stloc
        )
    }

    /// The local slot encoded in a shorthand opcode (`ldloc.2` yields `2`).
    #[must_use]
    pub const fn implicit_local(self) -> Option<u16> {
        match self {
            OpCode::Ldloc0 | OpCode::Stloc0 => Some(0),
            OpCode::Ldloc1 | OpCode::Stloc1 => Some(1),
            OpCode::Ldloc2 | OpCode::Stloc2 => Some(2),
            OpCode::Ldloc3 | OpCode::Stloc3 => Some(3),
            _ => None,
        }
    }

    /// The argument index encoded in a shorthand opcode (`ldarg.0` yields `0`).
    #[must_use]
    pub const fn implicit_argument(self) -> Option<u16> {
        match self {
            OpCode::Ldarg0 => Some(0),
            OpCode::Ldarg1 => Some(1),
            OpCode::Ldarg2 => Some(2),
            OpCode::Ldarg3 => Some(3),
            _ => None,
        }
    }

    /// The integer constant encoded in a shorthand `ldc.i4.*` opcode.
    #[must_use]
    pub const fn implicit_constant(self) -> Option<i32> {
        match self {
            OpCode::LdcI4M1 => Some(-1),
            OpCode::LdcI40 => Some(0),
            OpCode::LdcI41 => Some(1),
            OpCode::LdcI42 => Some(2),
            OpCode::LdcI43 => Some(3),
            OpCode::LdcI44 => Some(4),
            OpCode::LdcI45 => Some(5),
            OpCode::LdcI46 => Some(6),
            OpCode::LdcI47 => Some(7),
            OpCode::LdcI48 => Some(8),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

//! The CIL opcode table.
//!
//! Every ECMA-335 opcode is listed once in the `opcodes!` invocation below, together with its
//! encoded value, its mnemonic and the kind of inline operand it takes. The macro generates the
//! [`OpCode`] enum and its accessors; lookups by mnemonic and by encoded value go through lazily
//! built static maps.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// The kind of inline operand an opcode is encoded with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    None,
    /// 8-bit integer (`ldc.i4.s`, `unaligned.`, `no.`)
    ShortInt,
    /// 32-bit integer
    Int32,
    /// 64-bit integer
    Int64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// 8-bit local or argument index
    ShortVariable,
    /// 16-bit local or argument index
    Variable,
    /// 8-bit relative branch target
    ShortBranch,
    /// 32-bit relative branch target
    Branch,
    /// Jump table
    Switch,
    /// `MethodDef`, `MemberRef` or `MethodSpec` token
    Method,
    /// `Field` or `MemberRef` token
    Field,
    /// `TypeDef`, `TypeRef` or `TypeSpec` token
    Type,
    /// Any metadata token (`ldtoken`)
    Token,
    /// User string token
    String,
    /// Stand-alone signature token (`calli`)
    Signature,
}

impl OperandKind {
    /// Encoded size of the operand in bytes; `Switch` reports the size of its count only
    #[must_use]
    pub fn size(self) -> u32 {
        match self {
            OperandKind::None => 0,
            OperandKind::ShortInt | OperandKind::ShortVariable | OperandKind::ShortBranch => 1,
            OperandKind::Variable => 2,
            OperandKind::Int64 | OperandKind::Float64 => 8,
            _ => 4,
        }
    }
}

macro_rules! opcodes {
    ($( $variant:ident = $code:literal, $mnemonic:literal, $operand:ident; )*) => {
        /// A CIL opcode
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum OpCode {
            $(
                #[doc = $mnemonic]
                $variant,
            )*
        }

        impl OpCode {
            /// Every opcode, in encoding order
            pub const ALL: &'static [OpCode] = &[$(OpCode::$variant,)*];

            /// The encoded value; two-byte opcodes carry the `0xFE` prefix in the high byte
            #[must_use]
            pub fn code(self) -> u16 {
                match self {
                    $(OpCode::$variant => $code,)*
                }
            }

            /// The textual mnemonic, e.g. `ldc.i4.s`
            #[must_use]
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(OpCode::$variant => $mnemonic,)*
                }
            }

            /// The kind of inline operand this opcode takes
            #[must_use]
            pub fn operand_kind(self) -> OperandKind {
                match self {
                    $(OpCode::$variant => OperandKind::$operand,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", None;
    Break = 0x01, "break", None;
    Ldarg0 = 0x02, "ldarg.0", None;
    Ldarg1 = 0x03, "ldarg.1", None;
    Ldarg2 = 0x04, "ldarg.2", None;
    Ldarg3 = 0x05, "ldarg.3", None;
    Ldloc0 = 0x06, "ldloc.0", None;
    Ldloc1 = 0x07, "ldloc.1", None;
    Ldloc2 = 0x08, "ldloc.2", None;
    Ldloc3 = 0x09, "ldloc.3", None;
    Stloc0 = 0x0A, "stloc.0", None;
    Stloc1 = 0x0B, "stloc.1", None;
    Stloc2 = 0x0C, "stloc.2", None;
    Stloc3 = 0x0D, "stloc.3", None;
    LdargS = 0x0E, "ldarg.s", ShortVariable;
    LdargaS = 0x0F, "ldarga.s", ShortVariable;
    StargS = 0x10, "starg.s", ShortVariable;
    LdlocS = 0x11, "ldloc.s", ShortVariable;
    LdlocaS = 0x12, "ldloca.s", ShortVariable;
    StlocS = 0x13, "stloc.s", ShortVariable;
    Ldnull = 0x14, "ldnull", None;
    LdcI4M1 = 0x15, "ldc.i4.m1", None;
    LdcI40 = 0x16, "ldc.i4.0", None;
    LdcI41 = 0x17, "ldc.i4.1", None;
    LdcI42 = 0x18, "ldc.i4.2", None;
    LdcI43 = 0x19, "ldc.i4.3", None;
    LdcI44 = 0x1A, "ldc.i4.4", None;
    LdcI45 = 0x1B, "ldc.i4.5", None;
    LdcI46 = 0x1C, "ldc.i4.6", None;
    LdcI47 = 0x1D, "ldc.i4.7", None;
    LdcI48 = 0x1E, "ldc.i4.8", None;
    LdcI4S = 0x1F, "ldc.i4.s", ShortInt;
    LdcI4 = 0x20, "ldc.i4", Int32;
    LdcI8 = 0x21, "ldc.i8", Int64;
    LdcR4 = 0x22, "ldc.r4", Float32;
    LdcR8 = 0x23, "ldc.r8", Float64;
    Dup = 0x25, "dup", None;
    Pop = 0x26, "pop", None;
    Jmp = 0x27, "jmp", Method;
    Call = 0x28, "call", Method;
    Calli = 0x29, "calli", Signature;
    Ret = 0x2A, "ret", None;
    BrS = 0x2B, "br.s", ShortBranch;
    BrfalseS = 0x2C, "brfalse.s", ShortBranch;
    BrtrueS = 0x2D, "brtrue.s", ShortBranch;
    BeqS = 0x2E, "beq.s", ShortBranch;
    BgeS = 0x2F, "bge.s", ShortBranch;
    BgtS = 0x30, "bgt.s", ShortBranch;
    BleS = 0x31, "ble.s", ShortBranch;
    BltS = 0x32, "blt.s", ShortBranch;
    BneUnS = 0x33, "bne.un.s", ShortBranch;
    BgeUnS = 0x34, "bge.un.s", ShortBranch;
    BgtUnS = 0x35, "bgt.un.s", ShortBranch;
    BleUnS = 0x36, "ble.un.s", ShortBranch;
    BltUnS = 0x37, "blt.un.s", ShortBranch;
    Br = 0x38, "br", Branch;
    Brfalse = 0x39, "brfalse", Branch;
    Brtrue = 0x3A, "brtrue", Branch;
    Beq = 0x3B, "beq", Branch;
    Bge = 0x3C, "bge", Branch;
    Bgt = 0x3D, "bgt", Branch;
    Ble = 0x3E, "ble", Branch;
    Blt = 0x3F, "blt", Branch;
    BneUn = 0x40, "bne.un", Branch;
    BgeUn = 0x41, "bge.un", Branch;
    BgtUn = 0x42, "bgt.un", Branch;
    BleUn = 0x43, "ble.un", Branch;
    BltUn = 0x44, "blt.un", Branch;
    Switch = 0x45, "switch", Switch;
    LdindI1 = 0x46, "ldind.i1", None;
    LdindU1 = 0x47, "ldind.u1", None;
    LdindI2 = 0x48, "ldind.i2", None;
    LdindU2 = 0x49, "ldind.u2", None;
    LdindI4 = 0x4A, "ldind.i4", None;
    LdindU4 = 0x4B, "ldind.u4", None;
    LdindI8 = 0x4C, "ldind.i8", None;
    LdindI = 0x4D, "ldind.i", None;
    LdindR4 = 0x4E, "ldind.r4", None;
    LdindR8 = 0x4F, "ldind.r8", None;
    LdindRef = 0x50, "ldind.ref", None;
    StindRef = 0x51, "stind.ref", None;
    StindI1 = 0x52, "stind.i1", None;
    StindI2 = 0x53, "stind.i2", None;
    StindI4 = 0x54, "stind.i4", None;
    StindI8 = 0x55, "stind.i8", None;
    StindR4 = 0x56, "stind.r4", None;
    StindR8 = 0x57, "stind.r8", None;
    Add = 0x58, "add", None;
    Sub = 0x59, "sub", None;
    Mul = 0x5A, "mul", None;
    Div = 0x5B, "div", None;
    DivUn = 0x5C, "div.un", None;
    Rem = 0x5D, "rem", None;
    RemUn = 0x5E, "rem.un", None;
    And = 0x5F, "and", None;
    Or = 0x60, "or", None;
    Xor = 0x61, "xor", None;
    Shl = 0x62, "shl", None;
    Shr = 0x63, "shr", None;
    ShrUn = 0x64, "shr.un", None;
    Neg = 0x65, "neg", None;
    Not = 0x66, "not", None;
    ConvI1 = 0x67, "conv.i1", None;
    ConvI2 = 0x68, "conv.i2", None;
    ConvI4 = 0x69, "conv.i4", None;
    ConvI8 = 0x6A, "conv.i8", None;
    ConvR4 = 0x6B, "conv.r4", None;
    ConvR8 = 0x6C, "conv.r8", None;
    ConvU4 = 0x6D, "conv.u4", None;
    ConvU8 = 0x6E, "conv.u8", None;
    Callvirt = 0x6F, "callvirt", Method;
    Cpobj = 0x70, "cpobj", Type;
    Ldobj = 0x71, "ldobj", Type;
    Ldstr = 0x72, "ldstr", String;
    Newobj = 0x73, "newobj", Method;
    Castclass = 0x74, "castclass", Type;
    Isinst = 0x75, "isinst", Type;
    ConvRUn = 0x76, "conv.r.un", None;
    Unbox = 0x79, "unbox", Type;
    Throw = 0x7A, "throw", None;
    Ldfld = 0x7B, "ldfld", Field;
    Ldflda = 0x7C, "ldflda", Field;
    Stfld = 0x7D, "stfld", Field;
    Ldsfld = 0x7E, "ldsfld", Field;
    Ldsflda = 0x7F, "ldsflda", Field;
    Stsfld = 0x80, "stsfld", Field;
    Stobj = 0x81, "stobj", Type;
    ConvOvfI1Un = 0x82, "conv.ovf.i1.un", None;
    ConvOvfI2Un = 0x83, "conv.ovf.i2.un", None;
    ConvOvfI4Un = 0x84, "conv.ovf.i4.un", None;
    ConvOvfI8Un = 0x85, "conv.ovf.i8.un", None;
    ConvOvfU1Un = 0x86, "conv.ovf.u1.un", None;
    ConvOvfU2Un = 0x87, "conv.ovf.u2.un", None;
    ConvOvfU4Un = 0x88, "conv.ovf.u4.un", None;
    ConvOvfU8Un = 0x89, "conv.ovf.u8.un", None;
    ConvOvfIUn = 0x8A, "conv.ovf.i.un", None;
    ConvOvfUUn = 0x8B, "conv.ovf.u.un", None;
    Box = 0x8C, "box", Type;
    Newarr = 0x8D, "newarr", Type;
    Ldlen = 0x8E, "ldlen", None;
    Ldelema = 0x8F, "ldelema", Type;
    LdelemI1 = 0x90, "ldelem.i1", None;
    LdelemU1 = 0x91, "ldelem.u1", None;
    LdelemI2 = 0x92, "ldelem.i2", None;
    LdelemU2 = 0x93, "ldelem.u2", None;
    LdelemI4 = 0x94, "ldelem.i4", None;
    LdelemU4 = 0x95, "ldelem.u4", None;
    LdelemI8 = 0x96, "ldelem.i8", None;
    LdelemI = 0x97, "ldelem.i", None;
    LdelemR4 = 0x98, "ldelem.r4", None;
    LdelemR8 = 0x99, "ldelem.r8", None;
    LdelemRef = 0x9A, "ldelem.ref", None;
    StelemI = 0x9B, "stelem.i", None;
    StelemI1 = 0x9C, "stelem.i1", None;
    StelemI2 = 0x9D, "stelem.i2", None;
    StelemI4 = 0x9E, "stelem.i4", None;
    StelemI8 = 0x9F, "stelem.i8", None;
    StelemR4 = 0xA0, "stelem.r4", None;
    StelemR8 = 0xA1, "stelem.r8", None;
    StelemRef = 0xA2, "stelem.ref", None;
    Ldelem = 0xA3, "ldelem", Type;
    Stelem = 0xA4, "stelem", Type;
    UnboxAny = 0xA5, "unbox.any", Type;
    ConvOvfI1 = 0xB3, "conv.ovf.i1", None;
    ConvOvfU1 = 0xB4, "conv.ovf.u1", None;
    ConvOvfI2 = 0xB5, "conv.ovf.i2", None;
    ConvOvfU2 = 0xB6, "conv.ovf.u2", None;
    ConvOvfI4 = 0xB7, "conv.ovf.i4", None;
    ConvOvfU4 = 0xB8, "conv.ovf.u4", None;
    ConvOvfI8 = 0xB9, "conv.ovf.i8", None;
    ConvOvfU8 = 0xBA, "conv.ovf.u8", None;
    Refanyval = 0xC2, "refanyval", Type;
    Ckfinite = 0xC3, "ckfinite", None;
    Mkrefany = 0xC6, "mkrefany", Type;
    Ldtoken = 0xD0, "ldtoken", Token;
    ConvU2 = 0xD1, "conv.u2", None;
    ConvU1 = 0xD2, "conv.u1", None;
    ConvI = 0xD3, "conv.i", None;
    ConvOvfI = 0xD4, "conv.ovf.i", None;
    ConvOvfU = 0xD5, "conv.ovf.u", None;
    AddOvf = 0xD6, "add.ovf", None;
    AddOvfUn = 0xD7, "add.ovf.un", None;
    MulOvf = 0xD8, "mul.ovf", None;
    MulOvfUn = 0xD9, "mul.ovf.un", None;
    SubOvf = 0xDA, "sub.ovf", None;
    SubOvfUn = 0xDB, "sub.ovf.un", None;
    Endfinally = 0xDC, "endfinally", None;
    Leave = 0xDD, "leave", Branch;
    LeaveS = 0xDE, "leave.s", ShortBranch;
    StindI = 0xDF, "stind.i", None;
    ConvU = 0xE0, "conv.u", None;
    Arglist = 0xFE00, "arglist", None;
    Ceq = 0xFE01, "ceq", None;
    Cgt = 0xFE02, "cgt", None;
    CgtUn = 0xFE03, "cgt.un", None;
    Clt = 0xFE04, "clt", None;
    CltUn = 0xFE05, "clt.un", None;
    Ldftn = 0xFE06, "ldftn", Method;
    Ldvirtftn = 0xFE07, "ldvirtftn", Method;
    Ldarg = 0xFE09, "ldarg", Variable;
    Ldarga = 0xFE0A, "ldarga", Variable;
    Starg = 0xFE0B, "starg", Variable;
    Ldloc = 0xFE0C, "ldloc", Variable;
    Ldloca = 0xFE0D, "ldloca", Variable;
    Stloc = 0xFE0E, "stloc", Variable;
    Localloc = 0xFE0F, "localloc", None;
    Endfilter = 0xFE11, "endfilter", None;
    Unaligned = 0xFE12, "unaligned.", ShortInt;
    Volatile = 0xFE13, "volatile.", None;
    Tail = 0xFE14, "tail.", None;
    Initobj = 0xFE15, "initobj", Type;
    Constrained = 0xFE16, "constrained.", Type;
    Cpblk = 0xFE17, "cpblk", None;
    Initblk = 0xFE18, "initblk", None;
    No = 0xFE19, "no.", ShortInt;
    Rethrow = 0xFE1A, "rethrow", None;
    Sizeof = 0xFE1C, "sizeof", Type;
    Refanytype = 0xFE1D, "refanytype", None;
    Readonly = 0xFE1E, "readonly.", None;
}

static MNEMONIC_TO_OPCODE: OnceLock<HashMap<&'static str, OpCode>> = OnceLock::new();
static CODE_TO_OPCODE: OnceLock<HashMap<u16, OpCode>> = OnceLock::new();

impl OpCode {
    /// Look an opcode up by its mnemonic
    #[must_use]
    pub fn from_mnemonic(mnemonic: &str) -> Option<OpCode> {
        MNEMONIC_TO_OPCODE
            .get_or_init(|| OpCode::ALL.iter().map(|op| (op.mnemonic(), *op)).collect())
            .get(mnemonic)
            .copied()
    }

    /// Look an opcode up by its encoded value
    #[must_use]
    pub fn from_code(code: u16) -> Option<OpCode> {
        CODE_TO_OPCODE
            .get_or_init(|| OpCode::ALL.iter().map(|op| (op.code(), *op)).collect())
            .get(&code)
            .copied()
    }

    /// Encoded size of the opcode itself (one byte, or two with the `0xFE` prefix)
    #[must_use]
    pub fn size(self) -> u32 {
        if self.code() > 0xFF {
            2
        } else {
            1
        }
    }

    /// Returns true for opcodes whose operand is a branch target or jump table
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(
            self.operand_kind(),
            OperandKind::ShortBranch | OperandKind::Branch | OperandKind::Switch
        )
    }

    /// Returns true for `call`, `callvirt` and `newobj`
    #[must_use]
    pub fn is_call(self) -> bool {
        matches!(self, OpCode::Call | OpCode::Callvirt | OpCode::Newobj)
    }

    /// The long form of a short branch (`br.s` to `br`), `None` for anything else
    #[must_use]
    pub fn long_form(self) -> Option<OpCode> {
        let long = match self {
            OpCode::BrS => OpCode::Br,
            OpCode::BrfalseS => OpCode::Brfalse,
            OpCode::BrtrueS => OpCode::Brtrue,
            OpCode::BeqS => OpCode::Beq,
            OpCode::BgeS => OpCode::Bge,
            OpCode::BgtS => OpCode::Bgt,
            OpCode::BleS => OpCode::Ble,
            OpCode::BltS => OpCode::Blt,
            OpCode::BneUnS => OpCode::BneUn,
            OpCode::BgeUnS => OpCode::BgeUn,
            OpCode::BgtUnS => OpCode::BgtUn,
            OpCode::BleUnS => OpCode::BleUn,
            OpCode::BltUnS => OpCode::BltUn,
            OpCode::LeaveS => OpCode::Leave,
            _ => return None,
        };
        Some(long)
    }

    /// The short form of a long branch (`br` to `br.s`), `None` for anything else
    #[must_use]
    pub fn short_form(self) -> Option<OpCode> {
        OpCode::ALL
            .iter()
            .copied()
            .find(|op| op.long_form() == Some(self))
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl Serialize for OpCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.mnemonic())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let mnemonic = String::deserialize(deserializer)?;
        OpCode::from_mnemonic(&mnemonic)
            .ok_or_else(|| de::Error::custom(format!("unknown opcode '{mnemonic}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_mnemonic() {
        assert_eq!(OpCode::from_mnemonic("ldc.i4.s"), Some(OpCode::LdcI4S));
        assert_eq!(OpCode::from_mnemonic("stelem.ref"), Some(OpCode::StelemRef));
        assert_eq!(OpCode::from_mnemonic("constrained."), Some(OpCode::Constrained));
        assert_eq!(OpCode::from_mnemonic("bogus"), None);
    }

    #[test]
    fn test_lookup_by_code() {
        assert_eq!(OpCode::from_code(0x28), Some(OpCode::Call));
        assert_eq!(OpCode::from_code(0xFE0E), Some(OpCode::Stloc));
        assert_eq!(OpCode::from_code(0x24), None);
    }

    #[test]
    fn test_table_is_consistent() {
        for op in OpCode::ALL {
            assert_eq!(OpCode::from_mnemonic(op.mnemonic()), Some(*op));
            assert_eq!(OpCode::from_code(op.code()), Some(*op));
        }
    }

    #[test]
    fn test_sizes() {
        assert_eq!(OpCode::Nop.size(), 1);
        assert_eq!(OpCode::Ldloc.size(), 2);
        assert_eq!(OpCode::Ldloc.operand_kind().size(), 2);
        assert_eq!(OpCode::LdcI8.operand_kind().size(), 8);
        assert_eq!(OpCode::BrS.operand_kind().size(), 1);
    }

    #[test]
    fn test_branch_forms() {
        assert_eq!(OpCode::BrS.long_form(), Some(OpCode::Br));
        assert_eq!(OpCode::Leave.short_form(), Some(OpCode::LeaveS));
        assert_eq!(OpCode::Switch.short_form(), None);
        assert!(OpCode::Switch.is_branch());
        assert!(OpCode::Newobj.is_call());
        assert!(!OpCode::Ldftn.is_call());
    }

    #[test]
    fn test_serde_uses_mnemonic() {
        let json = serde_json::to_string(&OpCode::Callvirt).unwrap();
        assert_eq!(json, "\"callvirt\"");
        let back: OpCode = serde_json::from_str("\"unbox.any\"").unwrap();
        assert_eq!(back, OpCode::UnboxAny);
        assert!(serde_json::from_str::<OpCode>("\"frobnicate\"").is_err());
    }
}

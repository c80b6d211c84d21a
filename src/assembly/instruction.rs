use serde::{Deserialize, Serialize};

use crate::{
    assembly::opcodes::{OpCode, OperandKind},
    metadata::token::{TableId, Token},
    Error, Result,
};

/// Stable handle of an instruction inside a [`crate::assembly::MethodBody`].
///
/// Handles survive insertions: the body keeps instructions in an arena and only reorders the
/// list of handles, so branch targets and exception handler anchors never need to be
/// renumbered when code is inserted in front of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrId(pub usize);

/// Inline operand of an instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// No operand
    None,
    /// Integer constant (`ldc.i4`, `ldc.i4.s`, `unaligned.`, `no.`)
    Int32(i32),
    /// 64-bit integer constant
    Int64(i64),
    /// 32-bit float constant
    Float32(f32),
    /// 64-bit float constant
    Float64(f64),
    /// Local or argument index
    Variable(u16),
    /// Branch target
    Target(InstrId),
    /// Jump table
    Switch(Vec<InstrId>),
    /// Metadata token (method, field, type or signature)
    Token(Token),
    /// String literal of `ldstr`
    String(String),
}

/// A single CIL instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The operation
    pub opcode: OpCode,
    /// Its inline operand
    #[serde(default = "Instruction::no_operand", skip_serializing_if = "Operand::is_none")]
    pub operand: Operand,
    /// Offset from the start of the body, valid after [`crate::assembly::MethodBody::compute_offsets`]
    #[serde(skip)]
    pub offset: u32,
}

impl Operand {
    /// Returns true for [`Operand::None`]
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Operand::None)
    }

    /// The token carried by the operand, if any
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self {
            Operand::Token(token) => Some(*token),
            _ => None,
        }
    }
}

impl Instruction {
    fn no_operand() -> Operand {
        Operand::None
    }

    /// Creates an instruction after checking that `operand` fits the opcode.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperand`] if the operand kind does not match the opcode,
    /// if a short operand is out of range, or if a token addresses a table the opcode cannot
    /// reference.
    pub fn new(opcode: OpCode, operand: Operand) -> Result<Self> {
        Self::check_operand(opcode, &operand)?;
        Ok(Instruction {
            opcode,
            operand,
            offset: 0,
        })
    }

    /// Creates an instruction without operand
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperand`] if the opcode requires an operand.
    pub fn simple(opcode: OpCode) -> Result<Self> {
        Self::new(opcode, Operand::None)
    }

    /// Encoded size of the instruction in bytes
    #[must_use]
    pub fn size(&self) -> u32 {
        let operand = match &self.operand {
            #[allow(clippy::cast_possible_truncation)]
            Operand::Switch(targets) => 4 + 4 * targets.len() as u32,
            _ => self.opcode.operand_kind().size(),
        };
        self.opcode.size() + operand
    }

    /// Returns true if the instruction branches to `target`
    #[must_use]
    pub fn targets(&self, target: InstrId) -> bool {
        match &self.operand {
            Operand::Target(id) => *id == target,
            Operand::Switch(ids) => ids.contains(&target),
            _ => false,
        }
    }

    /// Replaces every branch to `from` by a branch to `to`; returns true if anything changed
    pub fn retarget(&mut self, from: InstrId, to: InstrId) -> bool {
        let mut changed = false;
        match &mut self.operand {
            Operand::Target(id) if *id == from => {
                *id = to;
                changed = true;
            }
            Operand::Switch(ids) => {
                for id in ids.iter_mut().filter(|id| **id == from) {
                    *id = to;
                    changed = true;
                }
            }
            _ => {}
        }
        changed
    }

    fn check_operand(opcode: OpCode, operand: &Operand) -> Result<()> {
        let invalid = |message: String| Error::InvalidOperand {
            opcode: opcode.mnemonic(),
            message,
        };

        match (opcode.operand_kind(), operand) {
            (OperandKind::None, Operand::None)
            | (OperandKind::Int32, Operand::Int32(_))
            | (OperandKind::Int64, Operand::Int64(_))
            | (OperandKind::Float32, Operand::Float32(_))
            | (OperandKind::Float64, Operand::Float64(_))
            | (OperandKind::Variable, Operand::Variable(_))
            | (OperandKind::Branch | OperandKind::ShortBranch, Operand::Target(_))
            | (OperandKind::Switch, Operand::Switch(_))
            | (OperandKind::String, Operand::String(_)) => Ok(()),
            (OperandKind::ShortInt, Operand::Int32(value)) => {
                if (-128..=255).contains(value) {
                    Ok(())
                } else {
                    Err(invalid(format!("{value} does not fit in one byte")))
                }
            }
            (OperandKind::ShortVariable, Operand::Variable(index)) => {
                if *index <= 0xFF {
                    Ok(())
                } else {
                    Err(invalid(format!("index {index} does not fit in one byte")))
                }
            }
            (kind, Operand::Token(token)) => {
                let allowed: &[TableId] = match kind {
                    OperandKind::Method => &[TableId::MethodDef, TableId::MemberRef, TableId::MethodSpec],
                    OperandKind::Field => &[TableId::Field, TableId::MemberRef],
                    OperandKind::Type => &[TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec],
                    OperandKind::Token => &[
                        TableId::TypeDef,
                        TableId::TypeRef,
                        TableId::TypeSpec,
                        TableId::Field,
                        TableId::MethodDef,
                        TableId::MemberRef,
                        TableId::MethodSpec,
                    ],
                    OperandKind::Signature => return Ok(()),
                    _ => return Err(invalid(format!("unexpected token {token}"))),
                };
                if allowed.iter().any(|table| token.is_table(*table)) {
                    Ok(())
                } else {
                    Err(invalid(format!("token {token} addresses the wrong table")))
                }
            }
            (kind, operand) => Err(invalid(format!(
                "operand {operand:?} does not match operand kind {kind:?}"
            ))),
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.opcode)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int32(value) => write!(f, " {value}"),
            Operand::Int64(value) => write!(f, " {value}"),
            Operand::Float32(value) => write!(f, " {value}"),
            Operand::Float64(value) => write!(f, " {value}"),
            Operand::Variable(index) => write!(f, " V_{index}"),
            Operand::Target(id) => write!(f, " #{}", id.0),
            Operand::Switch(ids) => {
                let targets: Vec<String> = ids.iter().map(|id| format!("#{}", id.0)).collect();
                write!(f, " ({})", targets.join(", "))
            }
            Operand::Token(token) => write!(f, " {token}"),
            Operand::String(value) => write!(f, " \"{value}\""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_validation() {
        assert!(Instruction::simple(OpCode::Ret).is_ok());
        assert!(Instruction::simple(OpCode::LdcI4).is_err());
        assert!(Instruction::new(OpCode::LdcI4S, Operand::Int32(-128)).is_ok());
        assert!(Instruction::new(OpCode::LdcI4S, Operand::Int32(1000)).is_err());
        assert!(Instruction::new(OpCode::LdlocS, Operand::Variable(300)).is_err());
        assert!(Instruction::new(OpCode::Ldloc, Operand::Variable(300)).is_ok());
    }

    #[test]
    fn test_token_table_validation() {
        let member_ref = Token::from_parts(TableId::MemberRef, 1);
        let type_ref = Token::from_parts(TableId::TypeRef, 1);

        assert!(Instruction::new(OpCode::Call, Operand::Token(member_ref)).is_ok());
        assert!(Instruction::new(OpCode::Ldfld, Operand::Token(member_ref)).is_ok());
        assert!(Instruction::new(OpCode::Newarr, Operand::Token(type_ref)).is_ok());
        assert!(Instruction::new(OpCode::Call, Operand::Token(type_ref)).is_err());
        assert!(Instruction::new(OpCode::Ldtoken, Operand::Token(member_ref)).is_ok());

        match Instruction::new(OpCode::Box, Operand::Token(member_ref)) {
            Err(Error::InvalidOperand { opcode, .. }) => assert_eq!(opcode, "box"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_size() {
        let ldc = Instruction::new(OpCode::LdcI4, Operand::Int32(7)).unwrap();
        assert_eq!(ldc.size(), 5);

        let stloc = Instruction::new(OpCode::Stloc, Operand::Variable(2)).unwrap();
        assert_eq!(stloc.size(), 4);

        let switch =
            Instruction::new(OpCode::Switch, Operand::Switch(vec![InstrId(0), InstrId(1)])).unwrap();
        assert_eq!(switch.size(), 1 + 4 + 8);
    }

    #[test]
    fn test_retarget() {
        let mut br = Instruction::new(OpCode::Br, Operand::Target(InstrId(3))).unwrap();
        assert!(br.targets(InstrId(3)));
        assert!(br.retarget(InstrId(3), InstrId(9)));
        assert!(br.targets(InstrId(9)));
        assert!(!br.retarget(InstrId(3), InstrId(1)));

        let mut switch = Instruction::new(
            OpCode::Switch,
            Operand::Switch(vec![InstrId(3), InstrId(4), InstrId(3)]),
        )
        .unwrap();
        assert!(switch.retarget(InstrId(3), InstrId(0)));
        assert_eq!(
            switch.operand,
            Operand::Switch(vec![InstrId(0), InstrId(4), InstrId(0)])
        );
    }

    #[test]
    fn test_serde_skips_empty_operand() {
        let ret = Instruction::simple(OpCode::Ret).unwrap();
        let json = serde_json::to_string(&ret).unwrap();
        assert_eq!(json, "{\"opcode\":\"ret\"}");

        let back: Instruction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ret);
    }
}

//! CIL instructions and method bodies.
//!
//! This module models method code at the level the rewriter needs: an opcode table, typed
//! operands, and a [`MethodBody`] whose instructions can be inserted in place without
//! invalidating branch targets.
//!
//! # Key Types
//! - [`OpCode`] - Every ECMA-335 opcode with its mnemonic and operand kind
//! - [`Instruction`] / [`Operand`] - A single instruction and its inline operand
//! - [`InstrId`] - Stable handle of an instruction inside its body
//! - [`MethodBody`] - Locals, instructions and exception handlers of a method
//!
//! # Example
//! ```rust
//! use refrewrite::assembly::{Instruction, MethodBody, OpCode, Operand};
//!
//! let mut body = MethodBody::new();
//! body.push(Instruction::new(OpCode::LdcI4, Operand::Int32(2))?);
//! body.push(Instruction::simple(OpCode::Ret)?);
//! body.optimize_macros();
//!
//! assert_eq!(body.at(0).map(|i| i.opcode), Some(OpCode::LdcI42));
//! assert_eq!(body.code_size(), 2);
//! # Ok::<(), refrewrite::Error>(())
//! ```

mod body;
mod instruction;
mod layout;
mod opcodes;

pub use body::{ExceptionHandler, ExceptionHandlerFlags, MethodBody};
pub use instruction::{InstrId, Instruction, Operand};
pub use opcodes::{OpCode, OperandKind};

//! Macro expansion, macro selection and offset computation for method bodies.
//!
//! Code that edits a body first calls [`MethodBody::simplify_macros`] so every instruction is in
//! its long, offset-independent form (`ldloc.0` becomes `ldloc 0`, `br.s` becomes `br`). After
//! editing, [`MethodBody::optimize_macros`] picks the shortest encoding again and recomputes
//! offsets, shortening branches until their displacements settle.

use crate::assembly::{
    body::MethodBody,
    instruction::{Instruction, Operand},
    opcodes::OpCode,
};

/// Long form and implicit operand of a macro opcode
fn expand(opcode: OpCode) -> Option<(OpCode, Option<Operand>)> {
    let expanded = match opcode {
        OpCode::Ldarg0 => (OpCode::Ldarg, Some(Operand::Variable(0))),
        OpCode::Ldarg1 => (OpCode::Ldarg, Some(Operand::Variable(1))),
        OpCode::Ldarg2 => (OpCode::Ldarg, Some(Operand::Variable(2))),
        OpCode::Ldarg3 => (OpCode::Ldarg, Some(Operand::Variable(3))),
        OpCode::Ldloc0 => (OpCode::Ldloc, Some(Operand::Variable(0))),
        OpCode::Ldloc1 => (OpCode::Ldloc, Some(Operand::Variable(1))),
        OpCode::Ldloc2 => (OpCode::Ldloc, Some(Operand::Variable(2))),
        OpCode::Ldloc3 => (OpCode::Ldloc, Some(Operand::Variable(3))),
        OpCode::Stloc0 => (OpCode::Stloc, Some(Operand::Variable(0))),
        OpCode::Stloc1 => (OpCode::Stloc, Some(Operand::Variable(1))),
        OpCode::Stloc2 => (OpCode::Stloc, Some(Operand::Variable(2))),
        OpCode::Stloc3 => (OpCode::Stloc, Some(Operand::Variable(3))),
        OpCode::LdargS => (OpCode::Ldarg, None),
        OpCode::LdargaS => (OpCode::Ldarga, None),
        OpCode::StargS => (OpCode::Starg, None),
        OpCode::LdlocS => (OpCode::Ldloc, None),
        OpCode::LdlocaS => (OpCode::Ldloca, None),
        OpCode::StlocS => (OpCode::Stloc, None),
        OpCode::LdcI4M1 => (OpCode::LdcI4, Some(Operand::Int32(-1))),
        OpCode::LdcI40 => (OpCode::LdcI4, Some(Operand::Int32(0))),
        OpCode::LdcI41 => (OpCode::LdcI4, Some(Operand::Int32(1))),
        OpCode::LdcI42 => (OpCode::LdcI4, Some(Operand::Int32(2))),
        OpCode::LdcI43 => (OpCode::LdcI4, Some(Operand::Int32(3))),
        OpCode::LdcI44 => (OpCode::LdcI4, Some(Operand::Int32(4))),
        OpCode::LdcI45 => (OpCode::LdcI4, Some(Operand::Int32(5))),
        OpCode::LdcI46 => (OpCode::LdcI4, Some(Operand::Int32(6))),
        OpCode::LdcI47 => (OpCode::LdcI4, Some(Operand::Int32(7))),
        OpCode::LdcI48 => (OpCode::LdcI4, Some(Operand::Int32(8))),
        OpCode::LdcI4S => (OpCode::LdcI4, None),
        other => (other.long_form()?, None),
    };
    Some(expanded)
}

/// Shortest encoding of a simplified instruction, ignoring branches
fn contract(instruction: &Instruction) -> Option<(OpCode, Operand)> {
    let contracted = match (instruction.opcode, &instruction.operand) {
        (OpCode::Ldarg, Operand::Variable(index)) => match index {
            0 => (OpCode::Ldarg0, Operand::None),
            1 => (OpCode::Ldarg1, Operand::None),
            2 => (OpCode::Ldarg2, Operand::None),
            3 => (OpCode::Ldarg3, Operand::None),
            0..=255 => (OpCode::LdargS, Operand::Variable(*index)),
            _ => return None,
        },
        (OpCode::Ldloc, Operand::Variable(index)) => match index {
            0 => (OpCode::Ldloc0, Operand::None),
            1 => (OpCode::Ldloc1, Operand::None),
            2 => (OpCode::Ldloc2, Operand::None),
            3 => (OpCode::Ldloc3, Operand::None),
            0..=255 => (OpCode::LdlocS, Operand::Variable(*index)),
            _ => return None,
        },
        (OpCode::Stloc, Operand::Variable(index)) => match index {
            0 => (OpCode::Stloc0, Operand::None),
            1 => (OpCode::Stloc1, Operand::None),
            2 => (OpCode::Stloc2, Operand::None),
            3 => (OpCode::Stloc3, Operand::None),
            0..=255 => (OpCode::StlocS, Operand::Variable(*index)),
            _ => return None,
        },
        (OpCode::Ldarga, Operand::Variable(index @ 0..=255)) => {
            (OpCode::LdargaS, Operand::Variable(*index))
        }
        (OpCode::Starg, Operand::Variable(index @ 0..=255)) => {
            (OpCode::StargS, Operand::Variable(*index))
        }
        (OpCode::Ldloca, Operand::Variable(index @ 0..=255)) => {
            (OpCode::LdlocaS, Operand::Variable(*index))
        }
        (OpCode::LdcI4, Operand::Int32(value)) => match value {
            -1 => (OpCode::LdcI4M1, Operand::None),
            0 => (OpCode::LdcI40, Operand::None),
            1 => (OpCode::LdcI41, Operand::None),
            2 => (OpCode::LdcI42, Operand::None),
            3 => (OpCode::LdcI43, Operand::None),
            4 => (OpCode::LdcI44, Operand::None),
            5 => (OpCode::LdcI45, Operand::None),
            6 => (OpCode::LdcI46, Operand::None),
            7 => (OpCode::LdcI47, Operand::None),
            8 => (OpCode::LdcI48, Operand::None),
            -128..=127 => (OpCode::LdcI4S, Operand::Int32(*value)),
            _ => return None,
        },
        _ => return None,
    };
    Some(contracted)
}

impl MethodBody {
    /// Rewrites every macro instruction into its long form with an explicit operand
    pub fn simplify_macros(&mut self) {
        let (order, arena) = self.parts_mut();
        for id in order {
            let Some(instruction) = arena.get_mut(id.0) else {
                continue;
            };
            if let Some((opcode, operand)) = expand(instruction.opcode) {
                instruction.opcode = opcode;
                if let Some(operand) = operand {
                    instruction.operand = operand;
                }
            }
        }
    }

    /// Picks the shortest encoding for every instruction and recomputes offsets
    pub fn optimize_macros(&mut self) {
        {
            let (order, arena) = self.parts_mut();
            for id in order {
                let Some(instruction) = arena.get_mut(id.0) else {
                    continue;
                };
                if let Some((opcode, operand)) = contract(instruction) {
                    instruction.opcode = opcode;
                    instruction.operand = operand;
                }
            }
        }
        self.optimize_branches();
    }

    /// Shortens long branches whose displacement fits into a signed byte.
    ///
    /// Shortening a branch only ever moves other instructions closer together, so the loop
    /// terminates once a pass finds nothing left to shorten.
    fn optimize_branches(&mut self) {
        loop {
            self.compute_offsets();

            let mut shortened = None;
            for id in self.ids() {
                let Some(instruction) = self.get(*id) else {
                    continue;
                };
                let (Some(short), Operand::Target(target)) =
                    (instruction.opcode.short_form(), &instruction.operand)
                else {
                    continue;
                };
                let Some(target_offset) = self.get(*target).map(|t| i64::from(t.offset)) else {
                    continue;
                };

                let offset = i64::from(instruction.offset);
                let long_size = i64::from(instruction.size());
                let short_size = i64::from(short.size()) + 1;
                let shrink = long_size - short_size;

                let target_after_shrink = if target_offset > offset {
                    target_offset - shrink
                } else {
                    target_offset
                };
                let displacement = target_after_shrink - (offset + short_size);
                if (-128..=127).contains(&displacement) {
                    shortened = Some((*id, short));
                    break;
                }
            }

            match shortened {
                Some((id, short)) => {
                    if let Some(instruction) = self.get_mut(id) {
                        instruction.opcode = short;
                    }
                }
                None => break,
            }
        }
    }

    /// Assigns every instruction its byte offset from the start of the body
    pub fn compute_offsets(&mut self) {
        let mut offset = 0u32;
        let (order, arena) = self.parts_mut();
        for id in order {
            if let Some(instruction) = arena.get_mut(id.0) {
                instruction.offset = offset;
                offset += instruction.size();
            }
        }
    }

    /// Total encoded size of the code
    #[must_use]
    pub fn code_size(&self) -> u32 {
        self.iter().map(Instruction::size).sum()
    }
}

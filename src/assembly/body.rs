//! Method bodies with stable instruction handles.
//!
//! A [`MethodBody`] stores its instructions in an append-only arena and keeps a separate order
//! vector of [`InstrId`]s. Inserting an instruction only touches the order vector, so every
//! handle held elsewhere (branch operands, exception handler anchors, a walker's cursor) keeps
//! addressing the same instruction.
//!
//! The serialized form is positional: branch operands and handler anchors are written as
//! indices into the instruction list and turned back into handles on load.

use std::collections::HashMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    assembly::instruction::{InstrId, Instruction, Operand},
    metadata::signatures::TypeSignature,
    Result,
};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause
        const FILTER = 0x0001;
        /// A finally clause
        const FINALLY = 0x0002;
        /// A fault clause (finally that executes only on exception)
        const FAULT = 0x0004;
    }
}

/// Exception handler defining try/catch/finally blocks within a method.
///
/// Regions are anchored on instructions: a region starts at its `*_start` instruction and ends
/// before its `*_end` instruction, or at the end of the body if the end is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault)
    pub flags: ExceptionHandlerFlags,
    /// First instruction of the protected block
    pub try_start: InstrId,
    /// First instruction after the protected block
    pub try_end: Option<InstrId>,
    /// First instruction of the handler
    pub handler_start: InstrId,
    /// First instruction after the handler
    pub handler_end: Option<InstrId>,
    /// First instruction of the filter, for `FILTER` clauses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_start: Option<InstrId>,
    /// Caught exception type, for typed clauses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catch_type: Option<TypeSignature>,
}

impl ExceptionHandler {
    fn anchors_mut(&mut self) -> impl Iterator<Item = &mut InstrId> {
        std::iter::once(&mut self.try_start)
            .chain(std::iter::once(&mut self.handler_start))
            .chain(self.try_end.iter_mut())
            .chain(self.handler_end.iter_mut())
            .chain(self.filter_start.iter_mut())
    }
}

/// The code of a method
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawMethodBody", into = "RawMethodBody")]
pub struct MethodBody {
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Locals are zero-initialised on entry
    pub init_locals: bool,
    /// Types of the local variable slots
    pub locals: Vec<TypeSignature>,
    /// Exception handling clauses
    pub exception_handlers: Vec<ExceptionHandler>,
    arena: Vec<Instruction>,
    order: Vec<InstrId>,
}

impl MethodBody {
    /// Creates an empty body
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a body from instructions in order. Branch operands must use the position of their
    /// target as [`InstrId`].
    #[must_use]
    pub fn from_instructions(instructions: Vec<Instruction>) -> Self {
        let order = (0..instructions.len()).map(InstrId).collect();
        MethodBody {
            arena: instructions,
            order,
            ..Default::default()
        }
    }

    /// Number of instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if the body has no instructions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Handles of all instructions, in execution order
    #[must_use]
    pub fn ids(&self) -> &[InstrId] {
        &self.order
    }

    /// Handle of the instruction at `index`
    #[must_use]
    pub fn id_at(&self, index: usize) -> Option<InstrId> {
        self.order.get(index).copied()
    }

    /// Current position of the instruction `id`
    #[must_use]
    pub fn position(&self, id: InstrId) -> Option<usize> {
        self.order.iter().position(|candidate| *candidate == id)
    }

    /// The instruction `id`
    #[must_use]
    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        self.arena.get(id.0)
    }

    /// The instruction `id`, mutably
    pub fn get_mut(&mut self, id: InstrId) -> Option<&mut Instruction> {
        self.arena.get_mut(id.0)
    }

    /// The instruction at `index`
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&Instruction> {
        self.id_at(index).and_then(|id| self.get(id))
    }

    /// Instructions in execution order
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.order.iter().filter_map(|id| self.arena.get(id.0))
    }

    /// Appends an instruction
    pub fn push(&mut self, instruction: Instruction) -> InstrId {
        let id = InstrId(self.arena.len());
        self.arena.push(instruction);
        self.order.push(id);
        id
    }

    /// Inserts an instruction in front of the one currently at `index`
    pub fn insert(&mut self, index: usize, instruction: Instruction) -> InstrId {
        let id = InstrId(self.arena.len());
        self.arena.push(instruction);
        self.order.insert(index.min(self.order.len()), id);
        id
    }

    /// Adds a local variable slot and returns its index
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the body already has `u16::MAX` locals.
    pub fn add_local(&mut self, local: TypeSignature) -> Result<u16> {
        let index = u16::try_from(self.locals.len())
            .map_err(|_| malformed_error!("Too many local variables"))?;
        self.locals.push(local);
        Ok(index)
    }

    /// Makes every branch and exception handler anchor that points at `from` point at `to`.
    ///
    /// Returns the number of redirected references.
    pub fn redirect(&mut self, from: InstrId, to: InstrId) -> usize {
        let mut count = 0;
        for id in &self.order {
            if *id == to {
                continue;
            }
            if let Some(instruction) = self.arena.get_mut(id.0) {
                if instruction.retarget(from, to) {
                    count += 1;
                }
            }
        }

        for handler in &mut self.exception_handlers {
            for anchor in handler.anchors_mut() {
                if *anchor == from {
                    *anchor = to;
                    count += 1;
                }
            }
        }
        count
    }

    /// Returns the instruction handles in order together with their instructions, mutably
    pub(crate) fn parts_mut(&mut self) -> (&[InstrId], &mut [Instruction]) {
        (&self.order, &mut self.arena)
    }
}

#[derive(Serialize, Deserialize)]
struct RawMethodBody {
    #[serde(default)]
    max_stack: u16,
    #[serde(default)]
    init_locals: bool,
    #[serde(default)]
    locals: Vec<TypeSignature>,
    #[serde(default)]
    instructions: Vec<Instruction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    exception_handlers: Vec<ExceptionHandler>,
}

fn remap_operand(operand: &mut Operand, map: &mut impl FnMut(InstrId) -> Option<InstrId>) -> bool {
    match operand {
        Operand::Target(id) => match map(*id) {
            Some(new_id) => {
                *id = new_id;
                true
            }
            None => false,
        },
        Operand::Switch(ids) => ids.iter_mut().all(|id| match map(*id) {
            Some(new_id) => {
                *id = new_id;
                true
            }
            None => false,
        }),
        _ => true,
    }
}

fn remap_handler(
    handler: &mut ExceptionHandler,
    map: &mut impl FnMut(InstrId) -> Option<InstrId>,
) -> bool {
    handler.anchors_mut().all(|anchor| match map(*anchor) {
        Some(new_id) => {
            *anchor = new_id;
            true
        }
        None => false,
    })
}

impl From<MethodBody> for RawMethodBody {
    fn from(body: MethodBody) -> Self {
        let positions: HashMap<InstrId, usize> = body
            .order
            .iter()
            .enumerate()
            .map(|(position, id)| (*id, position))
            .collect();
        let mut map = |id: InstrId| positions.get(&id).copied().map(InstrId);

        let mut instructions: Vec<Instruction> = body
            .order
            .iter()
            .filter_map(|id| body.arena.get(id.0).cloned())
            .collect();
        for instruction in &mut instructions {
            remap_operand(&mut instruction.operand, &mut map);
        }

        let mut exception_handlers = body.exception_handlers;
        for handler in &mut exception_handlers {
            remap_handler(handler, &mut map);
        }

        RawMethodBody {
            max_stack: body.max_stack,
            init_locals: body.init_locals,
            locals: body.locals,
            instructions,
            exception_handlers,
        }
    }
}

impl TryFrom<RawMethodBody> for MethodBody {
    type Error = String;

    fn try_from(raw: RawMethodBody) -> std::result::Result<Self, Self::Error> {
        let count = raw.instructions.len();
        let mut check = |id: InstrId| (id.0 < count).then_some(id);

        for (index, instruction) in raw.instructions.iter().enumerate() {
            let mut operand = instruction.operand.clone();
            if !remap_operand(&mut operand, &mut check) {
                return Err(format!(
                    "instruction {index} ({}) branches outside of the body",
                    instruction.opcode
                ));
            }
        }

        let mut exception_handlers = raw.exception_handlers;
        for handler in &mut exception_handlers {
            if !remap_handler(handler, &mut check) {
                return Err("exception handler is anchored outside of the body".to_string());
            }
        }

        let mut body = MethodBody::from_instructions(raw.instructions);
        body.max_stack = raw.max_stack;
        body.init_locals = raw.init_locals;
        body.locals = raw.locals;
        body.exception_handlers = exception_handlers;
        body.compute_offsets();
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::opcodes::OpCode;

    fn ins(opcode: OpCode, operand: Operand) -> Instruction {
        Instruction::new(opcode, operand).unwrap()
    }

    fn sample() -> MethodBody {
        MethodBody::from_instructions(vec![
            ins(OpCode::Ldarg, Operand::Variable(0)),
            ins(OpCode::Brtrue, Operand::Target(InstrId(3))),
            ins(OpCode::Nop, Operand::None),
            ins(OpCode::Ret, Operand::None),
        ])
    }

    #[test]
    fn test_insert_keeps_handles() {
        let mut body = sample();
        let ret = body.id_at(3).unwrap();

        let inserted = body.insert(3, ins(OpCode::Nop, Operand::None));
        assert_eq!(body.len(), 5);
        assert_eq!(body.position(ret), Some(4));
        assert_eq!(body.position(inserted), Some(3));
        assert_eq!(body.get(ret).map(|i| i.opcode), Some(OpCode::Ret));
        assert!(body.at(1).unwrap().targets(ret));
    }

    #[test]
    fn test_redirect_branches_and_handlers() {
        let mut body = sample();
        let ret = body.id_at(3).unwrap();
        body.exception_handlers.push(ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start: InstrId(0),
            try_end: Some(ret),
            handler_start: ret,
            handler_end: None,
            filter_start: None,
            catch_type: None,
        });

        let first = body.insert(3, ins(OpCode::Nop, Operand::None));
        assert_eq!(body.redirect(ret, first), 3);
        assert!(body.at(1).unwrap().targets(first));
        assert_eq!(body.exception_handlers[0].handler_start, first);
        assert_eq!(body.exception_handlers[0].try_end, Some(first));
    }

    #[test]
    fn test_serde_is_positional() {
        let mut body = sample();
        body.max_stack = 8;
        let ret = body.id_at(3).unwrap();
        let first = body.insert(0, ins(OpCode::Nop, Operand::None));
        body.redirect(ret, first);

        let json = serde_json::to_string(&body).unwrap();
        let back: MethodBody = serde_json::from_str(&json).unwrap();

        assert_eq!(back.len(), 5);
        assert_eq!(back.max_stack, 8);
        assert_eq!(back.ids(), &[InstrId(0), InstrId(1), InstrId(2), InstrId(3), InstrId(4)]);
        assert_eq!(back.at(2).unwrap().operand, Operand::Target(InstrId(0)));
    }

    #[test]
    fn test_deserialize_rejects_dangling_target() {
        let json = r#"{"instructions":[{"opcode":"br","operand":{"Target":7}}]}"#;
        let result: std::result::Result<MethodBody, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_add_local() {
        let mut body = MethodBody::new();
        assert_eq!(body.add_local(TypeSignature::Object).unwrap(), 0);
        assert_eq!(body.add_local(TypeSignature::I4).unwrap(), 1);
        assert_eq!(body.locals.len(), 2);
    }
}

//! Turning a fixed-arity call into a call of a `params` overload.
//!
//! When a referenced method only exists as an overload whose last parameter is an array
//! (`Format(string, object[])` instead of `Format(string, object, object)`), the arguments the
//! caller already pushed are packed into a fresh array right before the call:
//!
//! ```text
//! ldstr "{0}, {1}"            ldstr "{0}, {1}"
//! ldstr "one"                 ldstr "one"
//! ldstr "two"                 ldstr "two"
//! call Format(s, o, o)   =>   ldc.i4 2
//!                             newarr System.Object
//!                             stloc A
//!                             stloc T0            // "two"
//!                             stloc T1            // "one"
//!                             ldloc A, ldc.i4 1, ldloc T0, stelem.ref
//!                             ldloc A, ldc.i4 0, ldloc T1, stelem.ref
//!                             ldloc A
//!                             call Format(s, o[])
//! ```
//!
//! Branches and exception handler anchors that pointed at the call are moved to the first
//! inserted instruction so every path into the call runs the packing code.

use log::debug;

use crate::{
    assembly::{InstrId, Instruction, MethodBody, OpCode, Operand},
    metadata::{
        import::Importer,
        method::MethodSpec,
        module::Module,
        signatures::{MethodSignature, TypeSignature},
        token::{TableId, Token},
    },
    resolver::{MemberHandle, ModuleKey, Resolver, TypeHandle},
    rewrite::context::RewriteContext,
    Error, Result,
};

/// The `params` overload chosen for a call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamsCall {
    /// Module defining the overload
    pub module: ModuleKey,
    /// `MethodDef` token of the overload inside that module
    pub method: Token,
}

fn insert_at(body: &mut MethodBody, at: &mut usize, instruction: Instruction) -> InstrId {
    let id = body.insert(*at, instruction);
    *at += 1;
    id
}

/// Token naming `signature` in an instruction operand
fn type_operand(module: &mut Module, signature: &TypeSignature) -> Token {
    match signature {
        TypeSignature::Class(token) | TypeSignature::ValueType(token) => *token,
        other => module.find_or_add_type_spec(other.clone()),
    }
}

/// The overload as a method token of the target.
///
/// A call site on a generic instantiation keeps that instantiation as declaring type when it
/// denotes the type defining the overload.
fn import_overload(ctx: &mut RewriteContext, call: &ParamsCall, site: &TypeSignature) -> Result<Token> {
    let ModuleKey::Loaded(id) = call.module else {
        return Ok(call.method);
    };

    let declaring = {
        let resolver = Resolver::new(&ctx.target, &ctx.modules);
        let owner = resolver.method_def(MemberHandle {
            module: call.module,
            token: call.method,
        })?;
        let defining = TypeHandle {
            module: call.module,
            token: owner.declaring,
        };
        match site {
            TypeSignature::GenericInst(..)
                if resolver.resolve_signature(ModuleKey::Target, site)? == Some(defining) =>
            {
                Some(site.clone())
            }
            _ => None,
        }
    };

    let source = ctx
        .modules
        .get(id)
        .ok_or_else(|| Error::AssemblyNotFound(format!("module #{}", id.index())))?;
    Importer::new(source, &mut ctx.target).import_method(call.method, declaring)
}

/// Signature and declaring type arguments of a method token of the target
fn overload_signature(module: &Module, token: Token) -> Result<(MethodSignature, Vec<TypeSignature>)> {
    if token.is_table(TableId::MethodDef) {
        return Ok((module.method(token)?.signature.clone(), Vec::new()));
    }

    let member = module.member_ref(token)?;
    let signature = member
        .method_signature()
        .ok_or_else(|| malformed_error!("{} is not a method reference", token))?;
    Ok((signature.clone(), member.declaring.generic_args().to_vec()))
}

/// Rewrites the call at `index` in the body of `method` so its trailing arguments are passed
/// as one array to the overload `call`.
///
/// Returns the new index of the call instruction.
///
/// # Errors
/// Returns [`Error::Malformed`] if the instruction is not a call of a method reference, or if
/// the overload's last parameter is not an array or takes more leading arguments than the
/// call site passes.
pub fn pack_params_call(
    ctx: &mut RewriteContext,
    method: Token,
    index: usize,
    call: &ParamsCall,
) -> Result<usize> {
    let (call_id, original) = {
        let body = ctx
            .target
            .method(method)?
            .body
            .as_ref()
            .ok_or_else(|| malformed_error!("Method {} has no body", method))?;
        let id = body
            .id_at(index)
            .ok_or_else(|| malformed_error!("No instruction {} in {}", index, method))?;
        let instruction = body
            .get(id)
            .ok_or_else(|| malformed_error!("Dangling instruction {} in {}", id.0, method))?;
        let token = instruction.operand.token().ok_or_else(|| Error::InvalidOperand {
            opcode: instruction.opcode.mnemonic(),
            message: "call site without method operand".to_string(),
        })?;
        (id, token)
    };

    let (reference, instantiation) = if original.is_table(TableId::MethodSpec) {
        let spec = ctx.target.method_spec(original)?;
        (spec.method, Some(spec.instantiation.clone()))
    } else {
        (original, None)
    };
    let method_args = instantiation.clone().unwrap_or_default();

    let member = ctx.target.member_ref(reference)?.clone();
    let site = member
        .method_signature()
        .ok_or_else(|| malformed_error!("{} is not a method reference", reference))?
        .clone();

    let overload = import_overload(ctx, call, &member.declaring)?;
    let (signature, type_args) = overload_signature(&ctx.target, overload)?;

    let array_type = signature
        .params
        .last()
        .map(|last| last.substitute(&type_args, &method_args))
        .ok_or_else(|| malformed_error!("Overload {} has no parameters", overload))?;
    let element = array_type
        .array_element()
        .cloned()
        .ok_or_else(|| malformed_error!("Last parameter of {} is not an array", overload))?;

    let leading = signature.params.len() - 1;
    let packed = site.params.len().checked_sub(leading).ok_or_else(|| {
        malformed_error!(
            "Call passes {} arguments, overload needs {}",
            site.params.len(),
            signature.params.len()
        )
    })?;

    let site_args = member.declaring.generic_args().to_vec();
    let argument_types: Vec<TypeSignature> = site.params[leading..]
        .iter()
        .map(|param| param.substitute(&site_args, &method_args))
        .collect();

    let by_value = element.is_value_type() || element.is_generic_param();
    let element_token = type_operand(&mut ctx.target, &element);

    // Temporary i receives the argument pushed last but i.
    let mut boxes = Vec::with_capacity(packed);
    for argument in argument_types.iter().rev() {
        let needs_box = !by_value && (argument.is_value_type() || argument.is_generic_param());
        boxes.push(if needs_box {
            Some(type_operand(&mut ctx.target, argument))
        } else {
            None
        });
    }

    let new_operand = match instantiation {
        Some(instantiation) => ctx.target.find_or_add_method_spec(MethodSpec {
            method: overload,
            instantiation,
        }),
        None => overload,
    };

    let count = i32::try_from(packed).map_err(|_| malformed_error!("Too many packed arguments"))?;
    let body = ctx
        .target
        .method_mut(method)?
        .body
        .as_mut()
        .ok_or_else(|| malformed_error!("Method {} has no body", method))?;

    body.simplify_macros();
    body.init_locals = true;
    let array_local = body.add_local(array_type)?;
    let temps = (0..packed)
        .map(|_| body.add_local(element.clone()))
        .collect::<Result<Vec<u16>>>()?;

    let mut at = body
        .position(call_id)
        .ok_or_else(|| malformed_error!("Call site vanished from {}", method))?;

    let first = insert_at(body, &mut at, Instruction::new(OpCode::LdcI4, Operand::Int32(count))?);
    insert_at(body, &mut at, Instruction::new(OpCode::Newarr, Operand::Token(element_token))?);
    insert_at(body, &mut at, Instruction::new(OpCode::Stloc, Operand::Variable(array_local))?);

    for (temp, boxed) in temps.iter().zip(&boxes) {
        if let Some(boxed) = boxed {
            insert_at(body, &mut at, Instruction::new(OpCode::Box, Operand::Token(*boxed))?);
        }
        insert_at(body, &mut at, Instruction::new(OpCode::Stloc, Operand::Variable(*temp))?);
    }

    for (position, temp) in (0..count).rev().zip(&temps) {
        insert_at(body, &mut at, Instruction::new(OpCode::Ldloc, Operand::Variable(array_local))?);
        insert_at(body, &mut at, Instruction::new(OpCode::LdcI4, Operand::Int32(position))?);
        insert_at(body, &mut at, Instruction::new(OpCode::Ldloc, Operand::Variable(*temp))?);
        let store = if by_value {
            Instruction::new(OpCode::Stelem, Operand::Token(element_token))?
        } else {
            Instruction::simple(OpCode::StelemRef)?
        };
        insert_at(body, &mut at, store);
    }
    insert_at(body, &mut at, Instruction::new(OpCode::Ldloc, Operand::Variable(array_local))?);

    if let Some(instruction) = body.get_mut(call_id) {
        instruction.operand = Operand::Token(new_operand);
    }
    body.redirect(call_id, first);

    let packed_u16 = u16::try_from(packed).unwrap_or(u16::MAX);
    body.max_stack = body
        .max_stack
        .saturating_add(3u16.saturating_sub(packed_u16).max(1));
    body.optimize_macros();

    debug!(
        "Packed {} arguments of {} into {}",
        packed,
        ctx.target.member_full_name(original),
        ctx.target.member_full_name(new_operand)
    );
    Ok(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{ExceptionHandler, ExceptionHandlerFlags},
        metadata::{
            builder::ModuleBuilder, identity::AssemblyVersion, method::MethodDef,
            typesystem::GenericParam,
        },
        resolver::ModuleSet,
    };

    struct Fixture {
        ctx: RewriteContext,
        caller: Token,
        format: Token,
    }

    /// A support module with `Text.Format(string, object[])` and a target whose `Game.Log::Write`
    /// calls `Format(string, object, int)` behind a branch
    fn fixture() -> Fixture {
        let mut support = ModuleBuilder::new("Support", AssemblyVersion::default());
        let text = support.class("Support", "Text").build_token();
        let object = support.system_type("Object");
        let format = support
            .method_named(
                text,
                "Format",
                MethodSignature::new_static(
                    TypeSignature::String,
                    vec![
                        TypeSignature::String,
                        TypeSignature::SzArray(Box::new(object)),
                    ],
                ),
            )
            .unwrap();

        let mut target = ModuleBuilder::new("Game", AssemblyVersion::default());
        let support_ref = target.assembly_ref("Support", AssemblyVersion::default());
        let text_ref = target.type_ref(support_ref, "Support", "Text");
        let object = target.system_type("Object");
        let site = target.method_ref(
            TypeSignature::Class(text_ref),
            "Format",
            MethodSignature::new_static(
                TypeSignature::String,
                vec![TypeSignature::String, object, TypeSignature::I4],
            ),
        );
        let log = target.class("Game", "Log").build_token();

        let mut body = MethodBody::from_instructions(vec![
            Instruction::new(OpCode::Br, Operand::Target(InstrId(1))).unwrap(),
            Instruction::new(OpCode::Ldstr, Operand::String("{0} {1}".to_string())).unwrap(),
            Instruction::simple(OpCode::Ldnull).unwrap(),
            Instruction::simple(OpCode::LdcI47).unwrap(),
            Instruction::new(OpCode::Call, Operand::Token(site)).unwrap(),
            Instruction::simple(OpCode::Pop).unwrap(),
            Instruction::simple(OpCode::Ret).unwrap(),
        ]);
        body.max_stack = 3;

        let mut write = MethodDef::new(
            "Write",
            log,
            MethodSignature::new_static(TypeSignature::Void, vec![]),
        );
        write.body = Some(body);
        let caller = target.method(log, write).unwrap();

        let mut modules = ModuleSet::new();
        let support = modules.register(support.build()).unwrap();
        Fixture {
            ctx: RewriteContext::new(target.build(), modules, support),
            caller,
            format,
        }
    }

    /// Registers `support` and wraps `target` into a context
    fn context(support: ModuleBuilder, target: ModuleBuilder) -> (RewriteContext, ModuleKey) {
        let mut modules = ModuleSet::new();
        let support = modules.register(support.build()).unwrap();
        (
            RewriteContext::new(target.build(), modules, support),
            ModuleKey::Loaded(support),
        )
    }

    /// Adds `Game.Log::Write` with `instructions` as body to `target`
    fn write_method(target: &mut ModuleBuilder, instructions: Vec<Instruction>) -> Token {
        let log = target.class("Game", "Log").build_token();
        let mut write = MethodDef::new(
            "Write",
            log,
            MethodSignature::new_static(TypeSignature::Void, vec![]),
        );
        write.body = Some(MethodBody::from_instructions(instructions));
        target.method(log, write).unwrap()
    }

    fn mnemonics(body: &MethodBody) -> Vec<&'static str> {
        body.iter().map(|instruction| instruction.opcode.mnemonic()).collect()
    }

    #[test]
    fn test_pack_two_arguments() {
        let Fixture {
            mut ctx,
            caller,
            format,
        } = fixture();
        let support = ModuleKey::Loaded(ctx.support);

        let call_index = pack_params_call(
            &mut ctx,
            caller,
            4,
            &ParamsCall {
                module: support,
                method: format,
            },
        )
        .unwrap();

        let body = ctx.target.method(caller).unwrap().body.as_ref().unwrap();
        let listing: Vec<String> = body
            .iter()
            .map(|instruction| instruction.opcode.mnemonic().to_string())
            .collect();
        assert_eq!(
            listing,
            vec![
                "br.s", "ldstr", "ldnull", "ldc.i4.7",
                "ldc.i4.2", "newarr", "stloc.0",
                "box", "stloc.1",
                "stloc.2",
                "ldloc.0", "ldc.i4.1", "ldloc.1", "stelem.ref",
                "ldloc.0", "ldc.i4.0", "ldloc.2", "stelem.ref",
                "ldloc.0",
                "call", "pop", "ret",
            ]
        );
        assert_eq!(call_index, 19);
        assert_eq!(body.locals.len(), 3);
        assert!(body.init_locals);
        assert_eq!(body.max_stack, 4);

        // the branch now enters the packing code
        let first = body.id_at(4).unwrap();
        assert!(body.at(0).unwrap().targets(body.id_at(1).unwrap()));
        assert!(!body.iter().any(|i| i.targets(body.id_at(19).unwrap())));
        assert_ne!(first, body.id_at(19).unwrap());

        let callee = body.at(19).unwrap().operand.token().unwrap();
        assert_eq!(
            ctx.target.member_full_name(callee),
            "System.String Support.Text::Format(System.String,System.Object[])"
        );
        assert_eq!(ctx.target.assembly_refs.len(), 2);
    }

    #[test]
    fn test_branch_to_call_moves_to_prologue() {
        let Fixture {
            mut ctx,
            caller,
            format,
        } = fixture();
        let support = ModuleKey::Loaded(ctx.support);

        {
            let body = ctx.target.method_mut(caller).unwrap().body.as_mut().unwrap();
            let call = body.id_at(4).unwrap();
            body.get_mut(body.id_at(0).unwrap()).unwrap().operand = Operand::Target(call);
        }

        pack_params_call(
            &mut ctx,
            caller,
            4,
            &ParamsCall {
                module: support,
                method: format,
            },
        )
        .unwrap();

        let body = ctx.target.method(caller).unwrap().body.as_ref().unwrap();
        assert!(body.at(0).unwrap().targets(body.id_at(4).unwrap()));
        assert_eq!(body.at(4).unwrap().opcode, OpCode::LdcI42);
    }

    #[test]
    fn test_rejects_non_array_overload() {
        let Fixture { mut ctx, caller, .. } = fixture();
        let support = ModuleKey::Loaded(ctx.support);
        let text = Token::from_parts(TableId::TypeDef, 1);

        let mut replacement = ctx.modules.get(ctx.support).unwrap().clone();
        let plain = replacement
            .add_method(MethodDef::new(
                "Format",
                text,
                MethodSignature::new_static(TypeSignature::String, vec![TypeSignature::String]),
            ))
            .unwrap();
        let mut modules = ModuleSet::new();
        modules.register(replacement).unwrap();
        ctx.modules = modules;

        let result = pack_params_call(
            &mut ctx,
            caller,
            4,
            &ParamsCall {
                module: support,
                method: plain,
            },
        );
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_generic_instantiation_call_site() {
        let mut support = ModuleBuilder::new("Support", AssemblyVersion::default());
        let bag = support
            .class("Support", "Bag`1")
            .generic_param(GenericParam::new("T", 0))
            .build_token();
        let mut signature = MethodSignature::new_static(
            TypeSignature::Void,
            vec![
                TypeSignature::String,
                TypeSignature::SzArray(Box::new(TypeSignature::GenericParamMethod(0))),
            ],
        );
        signature.generic_param_count = 1;
        let mut pick = MethodDef::new("Pick", bag, signature);
        pick.generic_params.push(GenericParam::new("M", 0));
        let pick = support.method(bag, pick).unwrap();

        let mut target = ModuleBuilder::new("Game", AssemblyVersion::default());
        let support_ref = target.assembly_ref("Support", AssemblyVersion::default());
        let bag_ref = target.type_ref(support_ref, "Support", "Bag`1");
        let declaring = TypeSignature::GenericInst(
            Box::new(TypeSignature::Class(bag_ref)),
            vec![TypeSignature::String],
        );
        let mut site_signature = MethodSignature::new_static(
            TypeSignature::Void,
            vec![
                TypeSignature::String,
                TypeSignature::GenericParamMethod(0),
                TypeSignature::GenericParamMethod(0),
            ],
        );
        site_signature.generic_param_count = 1;
        let site = target.method_ref(declaring.clone(), "Pick", site_signature);
        let spec = target.method_spec(site, vec![TypeSignature::Object]);
        let caller = write_method(
            &mut target,
            vec![
                Instruction::new(OpCode::Ldstr, Operand::String("key".to_string())).unwrap(),
                Instruction::simple(OpCode::Ldnull).unwrap(),
                Instruction::simple(OpCode::Ldnull).unwrap(),
                Instruction::new(OpCode::Call, Operand::Token(spec)).unwrap(),
                Instruction::simple(OpCode::Ret).unwrap(),
            ],
        );
        let (mut ctx, module) = context(support, target);

        let call_index = pack_params_call(&mut ctx, caller, 3, &ParamsCall { module, method: pick })
            .unwrap();

        let body = ctx.target.method(caller).unwrap().body.as_ref().unwrap();
        assert_eq!(body.at(call_index).unwrap().opcode, OpCode::Call);
        let callee = body.at(call_index).unwrap().operand.token().unwrap();
        assert!(callee.is_table(TableId::MethodSpec));
        assert_ne!(callee, spec);

        let new_spec = ctx.target.method_spec(callee).unwrap();
        assert_eq!(new_spec.instantiation, vec![TypeSignature::Object]);
        let overload = ctx.target.member_ref(new_spec.method).unwrap();
        assert_eq!(overload.name, "Pick");
        assert_eq!(overload.declaring, declaring);
        assert_eq!(overload.method_signature().unwrap().params.len(), 2);

        assert_eq!(
            body.locals[0],
            TypeSignature::SzArray(Box::new(TypeSignature::Object))
        );
        assert_eq!(
            mnemonics(body).iter().filter(|m| **m == "stelem.ref").count(),
            2
        );
    }

    #[test]
    fn test_value_type_elements_stored_by_type() {
        let mut support = ModuleBuilder::new("Support", AssemblyVersion::default());
        let numbers = support.class("Support", "Numbers").build_token();
        let sum = support
            .method_named(
                numbers,
                "Sum",
                MethodSignature::new_static(
                    TypeSignature::I4,
                    vec![TypeSignature::SzArray(Box::new(TypeSignature::I4))],
                ),
            )
            .unwrap();

        let mut target = ModuleBuilder::new("Game", AssemblyVersion::default());
        let support_ref = target.assembly_ref("Support", AssemblyVersion::default());
        let numbers_ref = target.type_ref(support_ref, "Support", "Numbers");
        let site = target.method_ref(
            TypeSignature::Class(numbers_ref),
            "Sum",
            MethodSignature::new_static(TypeSignature::I4, vec![TypeSignature::I4, TypeSignature::I4]),
        );
        let caller = write_method(
            &mut target,
            vec![
                Instruction::simple(OpCode::LdcI41).unwrap(),
                Instruction::simple(OpCode::LdcI42).unwrap(),
                Instruction::new(OpCode::Call, Operand::Token(site)).unwrap(),
                Instruction::simple(OpCode::Pop).unwrap(),
                Instruction::simple(OpCode::Ret).unwrap(),
            ],
        );
        let (mut ctx, module) = context(support, target);

        pack_params_call(&mut ctx, caller, 2, &ParamsCall { module, method: sum }).unwrap();

        let body = ctx.target.method(caller).unwrap().body.as_ref().unwrap();
        assert_eq!(
            mnemonics(body),
            vec![
                "ldc.i4.1", "ldc.i4.2",
                "ldc.i4.2", "newarr", "stloc.0",
                "stloc.1",
                "stloc.2",
                "ldloc.0", "ldc.i4.1", "ldloc.1", "stelem",
                "ldloc.0", "ldc.i4.0", "ldloc.2", "stelem",
                "ldloc.0",
                "call", "pop", "ret",
            ]
        );
        let element = body.at(3).unwrap().operand.token().unwrap();
        assert_eq!(ctx.target.type_spec(element).unwrap(), &TypeSignature::I4);
        assert_eq!(body.at(10).unwrap().operand.token(), Some(element));
        assert_eq!(body.at(14).unwrap().operand.token(), Some(element));
        assert_eq!(body.locals[1], TypeSignature::I4);
    }

    #[test]
    fn test_handler_starting_at_call_moves_to_prologue() {
        let mut support = ModuleBuilder::new("Support", AssemblyVersion::default());
        let trace = support.class("Support", "Trace").build_token();
        let object = support.system_type("Object");
        let log = support
            .method_named(
                trace,
                "Log",
                MethodSignature::new_static(
                    TypeSignature::Void,
                    vec![TypeSignature::SzArray(Box::new(object))],
                ),
            )
            .unwrap();

        let mut target = ModuleBuilder::new("Game", AssemblyVersion::default());
        let support_ref = target.assembly_ref("Support", AssemblyVersion::default());
        let trace_ref = target.type_ref(support_ref, "Support", "Trace");
        let object = target.system_type("Object");
        let site = target.method_ref(
            TypeSignature::Class(trace_ref),
            "Log",
            MethodSignature::new_static(TypeSignature::Void, vec![object.clone()]),
        );
        // catch (object e) { Trace.Log(e); }
        let caller = write_method(
            &mut target,
            vec![
                Instruction::simple(OpCode::Nop).unwrap(),
                Instruction::new(OpCode::Leave, Operand::Target(InstrId(4))).unwrap(),
                Instruction::new(OpCode::Call, Operand::Token(site)).unwrap(),
                Instruction::new(OpCode::Leave, Operand::Target(InstrId(4))).unwrap(),
                Instruction::simple(OpCode::Ret).unwrap(),
            ],
        );
        let (mut ctx, module) = context(support, target);
        ctx.target
            .method_mut(caller)
            .unwrap()
            .body
            .as_mut()
            .unwrap()
            .exception_handlers
            .push(ExceptionHandler {
                flags: ExceptionHandlerFlags::EXCEPTION,
                try_start: InstrId(0),
                try_end: Some(InstrId(2)),
                handler_start: InstrId(2),
                handler_end: Some(InstrId(4)),
                filter_start: None,
                catch_type: Some(object),
            });

        let call_index = pack_params_call(&mut ctx, caller, 2, &ParamsCall { module, method: log })
            .unwrap();

        let body = ctx.target.method(caller).unwrap().body.as_ref().unwrap();
        let prologue = body.id_at(2).unwrap();
        let handler = &body.exception_handlers[0];
        assert_eq!(handler.handler_start, prologue);
        assert_eq!(handler.try_end, Some(prologue));
        assert_eq!(handler.try_start, InstrId(0));
        assert_eq!(handler.handler_end, Some(InstrId(4)));
        assert_eq!(body.at(2).unwrap().opcode, OpCode::LdcI41);
        assert_eq!(call_index, 11);
        assert_eq!(body.at(call_index).unwrap().opcode, OpCode::Call);
    }
}

//! Cranelift backend implementation
//!
//! Slots become explicit stack slots, globals become writable data objects,
//! phis become block parameters and bodiless functions are imports.

use std::collections::HashMap;
use std::io::BufRead;

use cranelift::codegen::ir::{
    FuncRef, GlobalValue, MemFlags, StackSlot, StackSlotData, StackSlotKind,
};
use cranelift::codegen::isa::OwnedTargetIsa;
use cranelift::prelude::{
    settings, types, AbiParam, Block, Configurable, FunctionBuilder, FunctionBuilderContext,
    InstBuilder, IntCC, Signature, Value as ClifValue,
};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module as ClifModule};
use cranelift_object::{ObjectBuilder, ObjectModule};

use crate::backend::Backend;
use crate::ir::{
    BinOp, BlockId, CmpOp, Function as IrFunction, Instruction, Location, Module, Terminator,
    Type, Value,
};
use crate::{KilnError, Result};

/// Cranelift code generator.
pub struct CraneliftBackend {
    /// Target ISA (instruction set architecture).
    target: String,
}

impl CraneliftBackend {
    /// Create a new Cranelift backend.
    pub fn new() -> Self {
        Self {
            target: std::env::consts::ARCH.to_string(),
        }
    }

    /// Compile IR to object bytes.
    fn compile_module(&self, module: &Module) -> Result<Vec<u8>> {
        let isa = build_native_isa()?;
        let builder = ObjectBuilder::new(
            isa,
            module.name.as_str(),
            cranelift_module::default_libcall_names(),
        )
        .map_err(module_error)?;
        let mut object_module = ObjectModule::new(builder);

        compile_into_module(&mut object_module, module)?;
        let product = object_module.finish();
        product
            .emit()
            .map_err(|err| KilnError::Backend(format!("failed to emit object bytes: {}", err)))
    }

    /// JIT-compile and run `main`, returning its exit code.
    ///
    /// `writeln` prints to stdout and `readln` reads one line from stdin.
    pub fn run_main(&self, module: &Module) -> Result<i32> {
        module.verify()?;
        let mut jit_builder =
            JITBuilder::new(cranelift_module::default_libcall_names()).map_err(module_error)?;
        jit_builder.symbol("writeln", mila_writeln as *const u8);
        jit_builder.symbol("readln", mila_readln as *const u8);

        let mut jit_module = JITModule::new(jit_builder);
        let compiled = compile_into_module(&mut jit_module, module)?;
        jit_module.finalize_definitions().map_err(module_error)?;

        let main_id = compiled
            .functions
            .get("main")
            .copied()
            .ok_or_else(|| KilnError::InvalidIR("module has no `main` function".to_string()))?;
        let main = module
            .function("main")
            .ok_or_else(|| KilnError::UnknownFunction("main".to_string()))?;
        if !main.params.is_empty() || main.return_type != Type::I32 {
            return Err(KilnError::InvalidIR(
                "`main` must take no arguments and return i32".to_string(),
            ));
        }

        let code = jit_module.get_finalized_function(main_id);
        // SAFETY: `main` was checked above to have the signature `fn() -> i32`.
        let main_fn: extern "C" fn() -> i32 = unsafe { std::mem::transmute(code) };
        Ok(main_fn())
    }

    /// Get configured target architecture name.
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Default for CraneliftBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CraneliftBackend {
    fn generate(&self, module: &Module) -> Result<Vec<u8>> {
        module.verify()?;
        self.compile_module(module)
    }

    fn name(&self) -> &'static str {
        "cranelift"
    }

    fn supported_targets(&self) -> &[&str] {
        &["x86_64", "aarch64", "riscv64", "s390x"]
    }
}

struct CompiledModule {
    functions: HashMap<String, FuncId>,
}

fn compile_into_module<M: ClifModule>(module: &mut M, ir_module: &Module) -> Result<CompiledModule> {
    let mut globals = HashMap::new();
    for global in &ir_module.globals {
        let data_id = module
            .declare_data(&global.name, Linkage::Export, true, false)
            .map_err(module_error)?;
        let mut data = DataDescription::new();
        data.define(global.initializer.to_ne_bytes().to_vec().into_boxed_slice());
        module.define_data(data_id, &data).map_err(module_error)?;
        globals.insert(global.name.clone(), data_id);
    }

    let mut functions = HashMap::new();
    for function in &ir_module.functions {
        let signature = make_signature(module, function);
        let linkage = if function.is_declaration() {
            Linkage::Import
        } else {
            Linkage::Export
        };
        let func_id = module
            .declare_function(&function.name, linkage, &signature)
            .map_err(module_error)?;
        functions.insert(function.name.clone(), func_id);
    }

    for function in ir_module.functions.iter().filter(|f| !f.is_declaration()) {
        let func_id = *functions.get(&function.name).ok_or_else(|| {
            KilnError::InvalidIR(format!("missing function id for {}", function.name))
        })?;

        let mut context = module.make_context();
        context.func.signature = make_signature(module, function);

        {
            let mut builder_context = FunctionBuilderContext::new();
            let mut builder = FunctionBuilder::new(&mut context.func, &mut builder_context);
            let mut lowering =
                FunctionLowering::new(module, function, &functions, &globals, &mut builder)?;
            lowering.lower_body(&mut builder)?;
            builder.seal_all_blocks();
            builder.finalize();
        }

        module
            .define_function(func_id, &mut context)
            .map_err(module_error)?;
    }

    Ok(CompiledModule { functions })
}

type PhiList = Vec<Vec<(Value, BlockId)>>;

struct FunctionLowering<'a> {
    ir: &'a IrFunction,
    pointer_type: cranelift::prelude::Type,
    blocks: Vec<Block>,
    params: Vec<ClifValue>,
    slots: Vec<StackSlot>,
    temps: HashMap<usize, ClifValue>,
    phis: Vec<PhiList>,
    functions: HashMap<String, FuncRef>,
    globals: HashMap<String, GlobalValue>,
}

impl<'a> FunctionLowering<'a> {
    fn new<M: ClifModule>(
        module: &mut M,
        ir: &'a IrFunction,
        function_ids: &HashMap<String, FuncId>,
        data_ids: &HashMap<String, DataId>,
        builder: &mut FunctionBuilder,
    ) -> Result<Self> {
        let blocks: Vec<Block> = ir.blocks.iter().map(|_| builder.create_block()).collect();
        let entry = blocks[0];
        builder.append_block_params_for_function_params(entry);
        let params = builder.block_params(entry).to_vec();

        let mut temps = HashMap::new();
        let mut phis = Vec::with_capacity(ir.blocks.len());
        for (block, clif_block) in ir.blocks.iter().zip(&blocks) {
            let mut incoming_lists = Vec::new();
            for instruction in &block.instructions {
                if let Instruction::Phi { dest, incoming } = instruction {
                    let param = builder.append_block_param(*clif_block, types::I32);
                    temps.insert(*dest, param);
                    incoming_lists.push(incoming.clone());
                }
            }
            phis.push(incoming_lists);
        }

        let slots = ir
            .slots
            .iter()
            .map(|_| {
                builder.create_sized_stack_slot(StackSlotData::new(StackSlotKind::ExplicitSlot, 4, 2))
            })
            .collect();

        let mut functions = HashMap::new();
        let mut globals = HashMap::new();
        for instruction in ir.blocks.iter().flat_map(|b| &b.instructions) {
            match instruction {
                Instruction::Call { callee, .. } if !functions.contains_key(callee) => {
                    let id = function_ids.get(callee).ok_or_else(|| {
                        KilnError::InvalidIR(format!("unknown call target '{}'", callee))
                    })?;
                    functions.insert(callee.clone(), module.declare_func_in_func(*id, builder.func));
                }
                Instruction::Load {
                    from: Location::Global(name),
                    ..
                }
                | Instruction::Store {
                    to: Location::Global(name),
                    ..
                }
                | Instruction::AddressOf {
                    location: Location::Global(name),
                    ..
                } if !globals.contains_key(name) => {
                    let id = data_ids
                        .get(name)
                        .ok_or_else(|| KilnError::UnknownGlobal(name.clone()))?;
                    globals.insert(name.clone(), module.declare_data_in_func(*id, builder.func));
                }
                _ => {}
            }
        }

        Ok(Self {
            ir,
            pointer_type: module.target_config().pointer_type(),
            blocks,
            params,
            slots,
            temps,
            phis,
            functions,
            globals,
        })
    }

    fn lower_body(&mut self, builder: &mut FunctionBuilder) -> Result<()> {
        // Dominators come first in a depth-first preorder, so every temporary
        // is lowered before any block that reads it.
        let ir = self.ir;
        for index in block_order(ir) {
            let block = &ir.blocks[index];
            builder.switch_to_block(self.blocks[index]);

            for instruction in &block.instructions {
                self.lower_instruction(instruction, builder)?;
            }

            let terminator = block.terminator.as_ref().ok_or_else(|| {
                KilnError::InvalidIR(format!("block '{}' has no terminator", block.label))
            })?;
            self.lower_terminator(BlockId(index), terminator, builder)?;
        }
        Ok(())
    }

    fn lower_instruction(
        &mut self,
        instruction: &Instruction,
        builder: &mut FunctionBuilder,
    ) -> Result<()> {
        match instruction {
            Instruction::BinOp { dest, op, lhs, rhs } => {
                let lhs = self.value(*lhs, builder)?;
                let rhs = self.value(*rhs, builder)?;
                let result = match op {
                    BinOp::Add => builder.ins().iadd(lhs, rhs),
                    BinOp::Sub => builder.ins().isub(lhs, rhs),
                    BinOp::Mul => builder.ins().imul(lhs, rhs),
                    BinOp::SDiv => builder.ins().sdiv(lhs, rhs),
                };
                self.temps.insert(*dest, result);
            }
            Instruction::Icmp { dest, op, lhs, rhs } => {
                let lhs = self.value(*lhs, builder)?;
                let rhs = self.value(*rhs, builder)?;
                let result = builder.ins().icmp(int_cc(*op), lhs, rhs);
                self.temps.insert(*dest, result);
            }
            Instruction::Zext { dest, value } => {
                let value = self.value(*value, builder)?;
                let result = if builder.func.dfg.value_type(value) == types::I32 {
                    value
                } else {
                    builder.ins().uextend(types::I32, value)
                };
                self.temps.insert(*dest, result);
            }
            Instruction::Load { dest, from } => {
                let result = match from {
                    Location::Slot(slot) => {
                        let slot = self.slot(*slot)?;
                        builder.ins().stack_load(types::I32, slot, 0)
                    }
                    Location::Global(_) => {
                        let addr = self.address(from, builder)?;
                        builder.ins().load(types::I32, MemFlags::trusted(), addr, 0)
                    }
                };
                self.temps.insert(*dest, result);
            }
            Instruction::Store { value, to } => {
                let value = self.value(*value, builder)?;
                match to {
                    Location::Slot(slot) => {
                        let slot = self.slot(*slot)?;
                        builder.ins().stack_store(value, slot, 0);
                    }
                    Location::Global(_) => {
                        let addr = self.address(to, builder)?;
                        builder.ins().store(MemFlags::trusted(), value, addr, 0);
                    }
                }
            }
            Instruction::AddressOf { dest, location } => {
                let addr = self.address(location, builder)?;
                self.temps.insert(*dest, addr);
            }
            Instruction::Call { dest, callee, args } => {
                let func_ref = self.functions.get(callee).copied().ok_or_else(|| {
                    KilnError::InvalidIR(format!("unknown call target '{}'", callee))
                })?;
                let mut lowered = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.value(*arg, builder)?);
                }
                let call = builder.ins().call(func_ref, &lowered);
                if let Some(dest) = dest {
                    let result = builder.inst_results(call).first().copied().ok_or_else(|| {
                        KilnError::InvalidIR(format!("call to '{}' produced no value", callee))
                    })?;
                    self.temps.insert(*dest, result);
                }
            }
            // Bound to block parameters up front.
            Instruction::Phi { .. } => {}
        }
        Ok(())
    }

    fn lower_terminator(
        &mut self,
        from: BlockId,
        terminator: &Terminator,
        builder: &mut FunctionBuilder,
    ) -> Result<()> {
        match terminator {
            Terminator::Return(value) => {
                if let Some(value) = value {
                    let lowered = self.value(*value, builder)?;
                    builder.ins().return_(&[lowered]);
                } else {
                    builder.ins().return_(&[]);
                }
            }
            Terminator::Jump(target) => {
                let args = self.block_args(from, *target, builder)?;
                let target = self.block(*target)?;
                builder.ins().jump(target, &args);
            }
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.value(*cond, builder)?;
                let then_args = self.block_args(from, *then_block, builder)?;
                let else_args = self.block_args(from, *else_block, builder)?;
                let then_block = self.block(*then_block)?;
                let else_block = self.block(*else_block)?;
                builder
                    .ins()
                    .brif(cond, then_block, &then_args, else_block, &else_args);
            }
        }
        Ok(())
    }

    fn block_args(
        &self,
        from: BlockId,
        target: BlockId,
        builder: &mut FunctionBuilder,
    ) -> Result<Vec<ClifValue>> {
        let Some(phis) = self.phis.get(target.0) else {
            return Err(KilnError::InvalidIR(format!("unknown block {}", target.0)));
        };
        let mut args = Vec::with_capacity(phis.len());
        for incoming in phis {
            let (value, _) = incoming
                .iter()
                .find(|(_, pred)| *pred == from)
                .ok_or_else(|| {
                    KilnError::InvalidIR(format!(
                        "phi in block {} has no value for predecessor {}",
                        target.0, from.0
                    ))
                })?;
            args.push(self.value(*value, builder)?);
        }
        Ok(args)
    }

    fn value(&self, value: Value, builder: &mut FunctionBuilder) -> Result<ClifValue> {
        match value {
            Value::Const(value) => Ok(builder.ins().iconst(types::I32, i64::from(value))),
            Value::Temp(id) => self.temps.get(&id).copied().ok_or_else(|| {
                KilnError::InvalidIR(format!(
                    "temporary %{} used before definition in '{}'",
                    id, self.ir.name
                ))
            }),
            Value::Param(index) => self.params.get(index).copied().ok_or_else(|| {
                KilnError::InvalidIR(format!(
                    "missing parameter {} for function {}",
                    index, self.ir.name
                ))
            }),
        }
    }

    fn address(&self, location: &Location, builder: &mut FunctionBuilder) -> Result<ClifValue> {
        match location {
            Location::Slot(slot) => {
                let slot = self.slot(*slot)?;
                Ok(builder.ins().stack_addr(self.pointer_type, slot, 0))
            }
            Location::Global(name) => {
                let global = self
                    .globals
                    .get(name)
                    .copied()
                    .ok_or_else(|| KilnError::UnknownGlobal(name.clone()))?;
                Ok(builder.ins().global_value(self.pointer_type, global))
            }
        }
    }

    fn slot(&self, index: usize) -> Result<StackSlot> {
        self.slots.get(index).copied().ok_or_else(|| {
            KilnError::InvalidIR(format!("function '{}' has no slot {}", self.ir.name, index))
        })
    }

    fn block(&self, id: BlockId) -> Result<Block> {
        self.blocks
            .get(id.0)
            .copied()
            .ok_or_else(|| KilnError::InvalidIR(format!("unknown branch target {}", id.0)))
    }
}

/// Depth-first preorder from the entry block, followed by unreachable blocks.
fn block_order(function: &IrFunction) -> Vec<usize> {
    let mut visited = vec![false; function.blocks.len()];
    let mut order = Vec::with_capacity(function.blocks.len());
    let mut stack = vec![0];

    while let Some(index) = stack.pop() {
        if index >= visited.len() || visited[index] {
            continue;
        }
        visited[index] = true;
        order.push(index);
        for successor in function.blocks[index].successors().into_iter().rev() {
            stack.push(successor.0);
        }
    }

    order.extend((0..visited.len()).filter(|index| !visited[*index]));
    order
}

fn int_cc(op: CmpOp) -> IntCC {
    match op {
        CmpOp::Eq => IntCC::Equal,
        CmpOp::Ne => IntCC::NotEqual,
        CmpOp::Slt => IntCC::SignedLessThan,
        CmpOp::Sle => IntCC::SignedLessThanOrEqual,
        CmpOp::Sgt => IntCC::SignedGreaterThan,
        CmpOp::Sge => IntCC::SignedGreaterThanOrEqual,
    }
}

fn make_signature<M: ClifModule>(module: &M, function: &IrFunction) -> Signature {
    let pointer_type = module.target_config().pointer_type();
    let mut signature = module.make_signature();

    for param in &function.params {
        let ty = match param.ty {
            Type::Ptr => pointer_type,
            _ => types::I32,
        };
        signature.params.push(AbiParam::new(ty));
    }

    if function.return_type != Type::Void {
        signature.returns.push(AbiParam::new(types::I32));
    }

    signature
}

fn build_native_isa() -> Result<OwnedTargetIsa> {
    let mut flags = settings::builder();
    flags
        .set("is_pic", "true")
        .map_err(|err| KilnError::Backend(format!("failed to set Cranelift flag: {}", err)))?;

    let isa_builder = cranelift_native::builder().map_err(|msg| {
        KilnError::Backend(format!("host machine is not supported by Cranelift: {}", msg))
    })?;

    isa_builder
        .finish(settings::Flags::new(flags))
        .map_err(module_error)
}

fn module_error(err: impl std::fmt::Display) -> KilnError {
    KilnError::Backend(err.to_string())
}

extern "C" fn mila_writeln(value: i32) -> i32 {
    println!("{}", value);
    0
}

extern "C" fn mila_readln(target: *mut i32) -> i32 {
    let mut line = String::new();
    let Ok(read) = std::io::stdin().lock().read_line(&mut line) else {
        return 0;
    };
    match line.trim().parse::<i32>() {
        Ok(value) if read > 0 && !target.is_null() => {
            // SAFETY: Generated code only passes addresses of live i32 slots or globals.
            unsafe { *target = value };
            1
        }
        _ => 0,
    }
}

//! IR builder utilities
//!
//! [`ModuleBuilder`] owns the module under construction together with an
//! insertion cursor (function + block). Every instruction goes to the end of
//! the block under the cursor; the cursor can be moved to any block of any
//! function, which is how a re-entered function keeps growing.

use super::*;
use crate::{KilnError, Result};

/// IR builder for constructing modules
#[derive(Debug, Clone)]
pub struct ModuleBuilder {
    module: Module,
    position: Option<(usize, BlockId)>,
}

impl ModuleBuilder {
    /// Create a new module builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: Module::new(name),
            position: None,
        }
    }

    /// The module built so far.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Finish building and return the module
    pub fn build(self) -> Module {
        self.module
    }

    /// Declare a function, or return the existing one of the same name.
    ///
    /// A function that is still a declaration takes the new signature; one
    /// that already has a body keeps its own.
    pub fn declare_function(
        &mut self,
        name: &str,
        params: Vec<Param>,
        return_type: Type,
    ) -> &Function {
        let index = match self.module.function_index(name) {
            Some(index) => {
                let function = &mut self.module.functions[index];
                if function.is_declaration() {
                    function.params = params;
                    function.return_type = return_type;
                }
                index
            }
            None => {
                self.module
                    .functions
                    .push(Function::new(name, params, return_type));
                self.module.functions.len() - 1
            }
        };
        &self.module.functions[index]
    }

    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.module.function(name)
    }

    /// Erase a function from the module.
    pub fn remove_function(&mut self, name: &str) -> Option<Function> {
        let index = self.module.function_index(name)?;
        let removed = self.module.functions.remove(index);
        self.position = match self.position {
            Some((current, _)) if current == index => None,
            Some((current, block)) if current > index => Some((current - 1, block)),
            other => other,
        };
        Some(removed)
    }

    /// Put a previously captured copy of a function back in place.
    ///
    /// A cursor inside the replaced function is dropped.
    pub fn restore_function(&mut self, function: Function) {
        match self.module.function_index(&function.name) {
            Some(index) => {
                self.module.functions[index] = function;
                if matches!(self.position, Some((current, _)) if current == index) {
                    self.position = None;
                }
            }
            None => self.module.functions.push(function),
        }
    }

    /// Create (or re-initialize) an externally visible global.
    pub fn add_global(&mut self, name: &str, initializer: i32) -> Location {
        match self.module.globals.iter_mut().find(|g| g.name == name) {
            Some(global) => global.initializer = initializer,
            None => self.module.globals.push(Global {
                name: name.to_string(),
                initializer,
            }),
        }
        Location::Global(name.to_string())
    }

    /// Location of a global, if it exists.
    pub fn global(&self, name: &str) -> Option<Location> {
        self.module
            .global(name)
            .map(|global| Location::Global(global.name.clone()))
    }

    /// Append a block to the function under the cursor.
    pub fn append_block(&mut self, label: &str) -> Result<BlockId> {
        let (index, _) = self.position.ok_or(KilnError::NoInsertionPoint)?;
        let function = &mut self.module.functions[index];
        Ok(push_block(function, label))
    }

    /// Append a block to a named function without moving the cursor.
    pub fn append_block_to(&mut self, function: &str, label: &str) -> Result<BlockId> {
        let index = self
            .module
            .function_index(function)
            .ok_or_else(|| KilnError::UnknownFunction(function.to_string()))?;
        Ok(push_block(&mut self.module.functions[index], label))
    }

    /// Move the cursor to the end of `block` in `function`.
    pub fn position_at_end(&mut self, function: &str, block: BlockId) -> Result<()> {
        let index = self
            .module
            .function_index(function)
            .ok_or_else(|| KilnError::UnknownFunction(function.to_string()))?;
        if block.0 >= self.module.functions[index].blocks.len() {
            return Err(KilnError::InvalidIR(format!(
                "function '{}' has no block {}",
                function, block.0
            )));
        }
        self.position = Some((index, block));
        Ok(())
    }

    /// Move the cursor to another block of the function it is already in.
    pub fn switch_to_block(&mut self, block: BlockId) -> Result<()> {
        let (index, _) = self.position.ok_or(KilnError::NoInsertionPoint)?;
        let function = &self.module.functions[index];
        if block.0 >= function.blocks.len() {
            return Err(KilnError::InvalidIR(format!(
                "function '{}' has no block {}",
                function.name, block.0
            )));
        }
        self.position = Some((index, block));
        Ok(())
    }

    /// Drop the cursor.
    pub fn clear_position(&mut self) {
        self.position = None;
    }

    /// Function under the cursor.
    pub fn current_function(&self) -> Option<&Function> {
        self.position
            .and_then(|(index, _)| self.module.functions.get(index))
    }

    /// Block under the cursor.
    pub fn current_block(&self) -> Option<BlockId> {
        self.position.map(|(_, block)| block)
    }

    /// Whether the block under the cursor already ends in a terminator.
    pub fn is_terminated(&self) -> bool {
        match self.position {
            Some((index, block)) => self.module.functions[index].blocks[block.0]
                .terminator
                .is_some(),
            None => false,
        }
    }

    /// Integer constant.
    pub fn iconst(&self, value: i32) -> Value {
        Value::Const(value)
    }

    /// Allocate a stack slot in the frame of the current function.
    pub fn alloca(&mut self, name: &str) -> Result<Location> {
        let (index, _) = self.position.ok_or(KilnError::NoInsertionPoint)?;
        let function = &mut self.module.functions[index];
        function.slots.push(StackSlot {
            name: name.to_string(),
        });
        Ok(Location::Slot(function.slots.len() - 1))
    }

    /// Load the i32 stored at `from`.
    pub fn load(&mut self, from: &Location) -> Result<Value> {
        self.check_location(from)?;
        let from = from.clone();
        self.emit(Type::I32, |dest| Instruction::Load { dest, from })
    }

    /// Store `value` to `to`.
    pub fn store(&mut self, value: Value, to: &Location) -> Result<()> {
        self.check_location(to)?;
        let to = to.clone();
        let (function, block) = self.cursor()?;
        function.blocks[block.0]
            .instructions
            .push(Instruction::Store { value, to });
        Ok(())
    }

    /// Address of `location`, for passing storage by reference.
    pub fn address_of(&mut self, location: &Location) -> Result<Value> {
        self.check_location(location)?;
        let location = location.clone();
        self.emit(Type::Ptr, |dest| Instruction::AddressOf { dest, location })
    }

    /// Integer arithmetic.
    pub fn binop(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Result<Value> {
        self.emit(Type::I32, |dest| Instruction::BinOp { dest, op, lhs, rhs })
    }

    /// Signed comparison producing an i1.
    pub fn icmp(&mut self, op: CmpOp, lhs: Value, rhs: Value) -> Result<Value> {
        self.emit(Type::I1, |dest| Instruction::Icmp { dest, op, lhs, rhs })
    }

    /// Widen an i1 to a 0/1 i32.
    pub fn zext(&mut self, value: Value) -> Result<Value> {
        self.emit(Type::I32, |dest| Instruction::Zext { dest, value })
    }

    /// Call a function of the module; void callees produce no value.
    pub fn call(&mut self, callee: &str, args: Vec<Value>) -> Result<Option<Value>> {
        let function = self
            .module
            .function(callee)
            .ok_or_else(|| KilnError::UnknownFunction(callee.to_string()))?;
        if function.params.len() != args.len() {
            return Err(KilnError::InvalidIR(format!(
                "call to '{}' passes {} arguments, expected {}",
                callee,
                args.len(),
                function.params.len()
            )));
        }

        let return_type = function.return_type;
        let callee = callee.to_string();
        if return_type == Type::Void {
            let (function, block) = self.cursor()?;
            function.blocks[block.0].instructions.push(Instruction::Call {
                dest: None,
                callee,
                args,
            });
            return Ok(None);
        }

        self.emit(return_type, |dest| Instruction::Call {
            dest: Some(dest),
            callee,
            args,
        })
        .map(Some)
    }

    /// Join values arriving from predecessor blocks.
    pub fn phi(&mut self, incoming: Vec<(Value, BlockId)>) -> Result<Value> {
        self.emit(Type::I32, |dest| Instruction::Phi { dest, incoming })
    }

    /// Unconditional branch.
    pub fn jump(&mut self, target: BlockId) -> Result<()> {
        self.terminate(Terminator::Jump(target))
    }

    /// Conditional branch on an i1.
    pub fn branch(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) -> Result<()> {
        self.terminate(Terminator::Branch {
            cond,
            then_block,
            else_block,
        })
    }

    /// Return from the current function.
    pub fn ret(&mut self, value: Option<Value>) -> Result<()> {
        self.terminate(Terminator::Return(value))
    }

    fn terminate(&mut self, terminator: Terminator) -> Result<()> {
        let (function, block) = self.cursor()?;
        function.blocks[block.0].terminator = Some(terminator);
        Ok(())
    }

    fn emit(&mut self, ty: Type, build: impl FnOnce(usize) -> Instruction) -> Result<Value> {
        let (function, block) = self.cursor()?;
        let dest = function.new_temp(ty);
        function.blocks[block.0].instructions.push(build(dest));
        Ok(Value::Temp(dest))
    }

    fn cursor(&mut self) -> Result<(&mut Function, BlockId)> {
        let (index, block) = self.position.ok_or(KilnError::NoInsertionPoint)?;
        let function = &mut self.module.functions[index];
        let target = &function.blocks[block.0];
        if target.terminator.is_some() {
            return Err(KilnError::BlockTerminated(target.label.clone()));
        }
        Ok((function, block))
    }

    fn check_location(&self, location: &Location) -> Result<()> {
        match location {
            Location::Global(name) => {
                if self.module.global(name).is_none() {
                    return Err(KilnError::UnknownGlobal(name.clone()));
                }
            }
            Location::Slot(slot) => {
                let function = self.current_function().ok_or(KilnError::NoInsertionPoint)?;
                if *slot >= function.slots.len() {
                    return Err(KilnError::InvalidIR(format!(
                        "function '{}' has no slot {}",
                        function.name, slot
                    )));
                }
            }
        }
        Ok(())
    }
}

fn push_block(function: &mut Function, label: &str) -> BlockId {
    let id = BlockId(function.blocks.len());
    function
        .blocks
        .push(BasicBlock::new(format!("{}{}", label, id.0)));
    id
}

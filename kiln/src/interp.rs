//! Reference interpreter for kiln modules
//!
//! Executes IR directly, with `writeln`/`readln` routed through a [`Host`].
//! Used by the test suites and by `mila run` when no native backend is
//! requested.

use std::collections::{HashMap, VecDeque};
use std::io::BufRead;

use crate::ir::{BlockId, Function, Instruction, Location, Module, Terminator, Value};
use crate::{KilnError, Result};

/// Default number of executed blocks before execution is aborted.
pub const DEFAULT_STEP_LIMIT: u64 = 10_000_000;

const MAX_CALL_DEPTH: usize = 10_000;

/// The world the interpreted program talks to.
pub trait Host {
    /// Print one integer.
    fn writeln(&mut self, value: i32);

    /// Read one integer; `None` once input is exhausted or malformed.
    fn readln(&mut self) -> Option<i32>;
}

/// In-memory host: reads from a queue, records every printed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferedHost {
    /// Values still to be read
    pub input: VecDeque<i32>,
    /// Values printed so far
    pub output: Vec<i32>,
}

impl BufferedHost {
    /// Host whose `readln` yields `input` in order.
    pub fn with_input(input: impl IntoIterator<Item = i32>) -> Self {
        Self {
            input: input.into_iter().collect(),
            output: Vec::new(),
        }
    }
}

impl Host for BufferedHost {
    fn writeln(&mut self, value: i32) {
        self.output.push(value);
    }

    fn readln(&mut self) -> Option<i32> {
        self.input.pop_front()
    }
}

/// Host bound to the process stdin/stdout.
#[derive(Debug, Default)]
pub struct StdioHost;

impl Host for StdioHost {
    fn writeln(&mut self, value: i32) {
        println!("{}", value);
    }

    fn readln(&mut self) -> Option<i32> {
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => line.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Cell {
    Int(i32),
    Addr(Address),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Address {
    Slot { frame: usize, slot: usize },
    Global(usize),
}

/// Tree-walking executor over a verified [`Module`].
pub struct Interpreter<'m, H: Host> {
    module: &'m Module,
    host: H,
    global_index: HashMap<&'m str, usize>,
    globals: Vec<i32>,
    frames: Vec<Vec<i32>>,
    steps: u64,
    step_limit: u64,
}

impl<'m, H: Host> Interpreter<'m, H> {
    /// Prepare `module` for execution; globals take their initializers.
    pub fn new(module: &'m Module, host: H) -> Self {
        let global_index = module
            .globals
            .iter()
            .enumerate()
            .map(|(index, global)| (global.name.as_str(), index))
            .collect();
        Self {
            module,
            host,
            global_index,
            globals: module.globals.iter().map(|g| g.initializer).collect(),
            frames: Vec::new(),
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    /// Abort after executing `limit` blocks.
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Call a parameterless function and return its result (0 for void).
    pub fn run(&mut self, entry: &str) -> Result<i32> {
        match self.call(entry, Vec::new())? {
            Some(Cell::Int(value)) => Ok(value),
            Some(Cell::Addr(_)) => Err(KilnError::Execution(format!(
                "'{}' returned an address",
                entry
            ))),
            None => Ok(0),
        }
    }

    /// Current value of a global.
    pub fn global(&self, name: &str) -> Option<i32> {
        self.global_index.get(name).map(|index| self.globals[*index])
    }

    /// The host, for inspecting recorded output.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Give back the host.
    pub fn into_host(self) -> H {
        self.host
    }

    fn call(&mut self, name: &str, args: Vec<Cell>) -> Result<Option<Cell>> {
        let module = self.module;
        let function = module
            .function(name)
            .ok_or_else(|| KilnError::UnknownFunction(name.to_string()))?;
        if function.params.len() != args.len() {
            return Err(KilnError::Execution(format!(
                "'{}' called with {} arguments, expected {}",
                name,
                args.len(),
                function.params.len()
            )));
        }

        if function.is_declaration() {
            return self.call_builtin(function, &args);
        }
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(KilnError::Execution("call stack overflow".to_string()));
        }

        self.frames.push(vec![0; function.slots.len()]);
        let result = self.execute(function, &args);
        self.frames.pop();
        result
    }

    fn call_builtin(&mut self, function: &Function, args: &[Cell]) -> Result<Option<Cell>> {
        match (function.name.as_str(), args) {
            ("writeln", [Cell::Int(value)]) => {
                self.host.writeln(*value);
                Ok(Some(Cell::Int(0)))
            }
            ("readln", [Cell::Addr(address)]) => match self.host.readln() {
                Some(value) => {
                    self.write(*address, value)?;
                    Ok(Some(Cell::Int(1)))
                }
                None => Ok(Some(Cell::Int(0))),
            },
            _ => Err(KilnError::Execution(format!(
                "no body for external function '{}'",
                function.name
            ))),
        }
    }

    fn execute(&mut self, function: &Function, args: &[Cell]) -> Result<Option<Cell>> {
        let frame = self.frames.len() - 1;
        let mut temps: Vec<Option<Cell>> = vec![None; function.temp_count()];
        let mut block = BlockId(0);
        let mut previous: Option<BlockId> = None;

        loop {
            self.steps += 1;
            if self.steps > self.step_limit {
                return Err(KilnError::Execution(format!(
                    "step limit of {} exceeded",
                    self.step_limit
                )));
            }

            let current = function.blocks.get(block.0).ok_or_else(|| {
                KilnError::Execution(format!("jump to missing block {}", block.0))
            })?;

            // Phis read their inputs before any of them is written.
            let mut joined = Vec::new();
            for instruction in &current.instructions {
                let Instruction::Phi { dest, incoming } = instruction else {
                    break;
                };
                let (value, _) = incoming
                    .iter()
                    .find(|(_, pred)| Some(*pred) == previous)
                    .ok_or_else(|| {
                        KilnError::Execution(format!(
                            "phi in '{}' has no value for the incoming edge",
                            current.label
                        ))
                    })?;
                joined.push((*dest, read_value(&temps, args, *value)?));
            }
            for (dest, cell) in joined {
                temps[dest] = Some(cell);
            }

            for instruction in &current.instructions {
                self.step(instruction, frame, &mut temps, args)?;
            }

            let terminator = current.terminator.as_ref().ok_or_else(|| {
                KilnError::Execution(format!("fell off the end of '{}'", current.label))
            })?;
            previous = Some(block);
            block = match terminator {
                Terminator::Return(None) => return Ok(None),
                Terminator::Return(Some(value)) => {
                    return read_value(&temps, args, *value).map(Some)
                }
                Terminator::Jump(target) => *target,
                Terminator::Branch {
                    cond,
                    then_block,
                    else_block,
                } => {
                    if as_int(read_value(&temps, args, *cond)?)? != 0 {
                        *then_block
                    } else {
                        *else_block
                    }
                }
            };
        }
    }

    fn step(
        &mut self,
        instruction: &Instruction,
        frame: usize,
        temps: &mut [Option<Cell>],
        args: &[Cell],
    ) -> Result<()> {
        let int = |temps: &[Option<Cell>], value: Value| as_int(read_value(temps, args, value)?);

        match instruction {
            Instruction::BinOp { dest, op, lhs, rhs } => {
                let lhs = int(temps, *lhs)?;
                let rhs = int(temps, *rhs)?;
                let result = op
                    .apply(lhs, rhs)
                    .ok_or_else(|| KilnError::Execution("division by zero".to_string()))?;
                temps[*dest] = Some(Cell::Int(result));
            }
            Instruction::Icmp { dest, op, lhs, rhs } => {
                let result = op.apply(int(temps, *lhs)?, int(temps, *rhs)?);
                temps[*dest] = Some(Cell::Int(i32::from(result)));
            }
            Instruction::Zext { dest, value } => {
                temps[*dest] = Some(Cell::Int(int(temps, *value)?));
            }
            Instruction::Load { dest, from } => {
                let address = self.resolve(from, frame)?;
                temps[*dest] = Some(Cell::Int(self.read(address)?));
            }
            Instruction::Store { value, to } => {
                let value = int(temps, *value)?;
                let address = self.resolve(to, frame)?;
                self.write(address, value)?;
            }
            Instruction::AddressOf { dest, location } => {
                temps[*dest] = Some(Cell::Addr(self.resolve(location, frame)?));
            }
            Instruction::Call { dest, callee, args: call_args } => {
                let mut lowered = Vec::with_capacity(call_args.len());
                for arg in call_args {
                    lowered.push(read_value(temps, args, *arg)?);
                }
                let result = self.call(callee, lowered)?;
                if let Some(dest) = dest {
                    temps[*dest] = Some(result.ok_or_else(|| {
                        KilnError::Execution(format!("'{}' returned no value", callee))
                    })?);
                }
            }
            Instruction::Phi { .. } => {}
        }
        Ok(())
    }

    fn resolve(&self, location: &Location, frame: usize) -> Result<Address> {
        match location {
            Location::Slot(slot) => Ok(Address::Slot {
                frame,
                slot: *slot,
            }),
            Location::Global(name) => self
                .global_index
                .get(name.as_str())
                .map(|index| Address::Global(*index))
                .ok_or_else(|| KilnError::UnknownGlobal(name.clone())),
        }
    }

    fn read(&self, address: Address) -> Result<i32> {
        let cell = match address {
            Address::Slot { frame, slot } => self.frames.get(frame).and_then(|f| f.get(slot)),
            Address::Global(index) => self.globals.get(index),
        };
        cell.copied()
            .ok_or_else(|| KilnError::Execution(format!("dangling address {:?}", address)))
    }

    fn write(&mut self, address: Address, value: i32) -> Result<()> {
        let cell = match address {
            Address::Slot { frame, slot } => {
                self.frames.get_mut(frame).and_then(|f| f.get_mut(slot))
            }
            Address::Global(index) => self.globals.get_mut(index),
        };
        match cell {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(KilnError::Execution(format!(
                "dangling address {:?}",
                address
            ))),
        }
    }
}

/// Run `entry` of `module` against buffered input, returning the exit value
/// and everything the program printed.
pub fn run_buffered(
    module: &Module,
    entry: &str,
    input: impl IntoIterator<Item = i32>,
) -> Result<(i32, Vec<i32>)> {
    let mut interpreter = Interpreter::new(module, BufferedHost::with_input(input));
    let code = interpreter.run(entry)?;
    Ok((code, interpreter.into_host().output))
}

fn read_value(temps: &[Option<Cell>], args: &[Cell], value: Value) -> Result<Cell> {
    match value {
        Value::Const(value) => Ok(Cell::Int(value)),
        Value::Temp(id) => temps
            .get(id)
            .copied()
            .flatten()
            .ok_or_else(|| KilnError::Execution(format!("%{} read before it was set", id))),
        Value::Param(index) => args
            .get(index)
            .copied()
            .ok_or_else(|| KilnError::Execution(format!("missing argument {}", index))),
    }
}

fn as_int(cell: Cell) -> Result<i32> {
    match cell {
        Cell::Int(value) => Ok(value),
        Cell::Addr(_) => Err(KilnError::Execution(
            "address used as an integer".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, CmpOp, Param, Type};
    use crate::ModuleBuilder;

    fn int_param(name: &str) -> Param {
        Param {
            name: name.to_string(),
            ty: Type::I32,
        }
    }

    #[test]
    fn readln_writes_through_the_address() {
        let mut builder = ModuleBuilder::new("io");
        builder.declare_function(
            "readln",
            vec![Param {
                name: "target".to_string(),
                ty: Type::Ptr,
            }],
            Type::I32,
        );
        builder.declare_function("writeln", vec![int_param("value")], Type::I32);
        let n = builder.add_global("n", 0);
        builder.declare_function("main", vec![], Type::I32);
        let entry = builder.append_block_to("main", "entry").unwrap();
        builder.position_at_end("main", entry).unwrap();
        let addr = builder.address_of(&n).unwrap();
        builder.call("readln", vec![addr]).unwrap();
        let value = builder.load(&n).unwrap();
        let doubled = builder.binop(BinOp::Mul, value, Value::Const(2)).unwrap();
        builder.call("writeln", vec![doubled]).unwrap();
        builder.ret(Some(Value::Const(0))).unwrap();
        let module = builder.build();

        let (code, output) = run_buffered(&module, "main", [21]).unwrap();
        assert_eq!(code, 0);
        assert_eq!(output, vec![42]);
    }

    #[test]
    fn recursion_uses_fresh_frames() {
        let mut builder = ModuleBuilder::new("fact");
        builder.declare_function("fact", vec![int_param("n")], Type::I32);
        let entry = builder.append_block_to("fact", "entry").unwrap();
        let base = builder.append_block_to("fact", "base").unwrap();
        let recurse = builder.append_block_to("fact", "recurse").unwrap();

        builder.position_at_end("fact", entry).unwrap();
        let slot = builder.alloca("n").unwrap();
        builder.store(Value::Param(0), &slot).unwrap();
        let n = builder.load(&slot).unwrap();
        let small = builder.icmp(CmpOp::Sle, n, Value::Const(1)).unwrap();
        builder.branch(small, base, recurse).unwrap();

        builder.position_at_end("fact", base).unwrap();
        builder.ret(Some(Value::Const(1))).unwrap();

        builder.position_at_end("fact", recurse).unwrap();
        let n = builder.load(&slot).unwrap();
        let m = builder.binop(BinOp::Sub, n, Value::Const(1)).unwrap();
        let sub = builder.call("fact", vec![m]).unwrap().unwrap();
        let n = builder.load(&slot).unwrap();
        let product = builder.binop(BinOp::Mul, n, sub).unwrap();
        builder.ret(Some(product)).unwrap();

        builder.declare_function("main", vec![], Type::I32);
        let main_entry = builder.append_block_to("main", "entry").unwrap();
        builder.position_at_end("main", main_entry).unwrap();
        let result = builder.call("fact", vec![Value::Const(5)]).unwrap().unwrap();
        builder.ret(Some(result)).unwrap();

        let module = builder.build();
        module.verify().unwrap();
        let mut interpreter = Interpreter::new(&module, BufferedHost::default());
        assert_eq!(interpreter.run("main").unwrap(), 120);
    }

    #[test]
    fn infinite_loops_hit_the_step_limit() {
        let mut builder = ModuleBuilder::new("spin");
        builder.declare_function("main", vec![], Type::I32);
        let entry = builder.append_block_to("main", "entry").unwrap();
        builder.position_at_end("main", entry).unwrap();
        let body = builder.append_block("loop").unwrap();
        builder.jump(body).unwrap();
        builder.position_at_end("main", body).unwrap();
        builder.jump(body).unwrap();

        let module = builder.build();
        let mut interpreter = Interpreter::new(&module, BufferedHost::default()).with_step_limit(50);
        assert!(matches!(
            interpreter.run("main"),
            Err(KilnError::Execution(_))
        ));
    }

    #[test]
    fn division_by_zero_is_an_execution_error() {
        let mut builder = ModuleBuilder::new("div");
        builder.declare_function("main", vec![], Type::I32);
        let entry = builder.append_block_to("main", "entry").unwrap();
        builder.position_at_end("main", entry).unwrap();
        let q = builder
            .binop(BinOp::SDiv, Value::Const(1), Value::Const(0))
            .unwrap();
        builder.ret(Some(q)).unwrap();

        let module = builder.build();
        let err = run_buffered(&module, "main", std::iter::empty()).unwrap_err();
        assert_eq!(err, KilnError::Execution("division by zero".to_string()));
    }
}

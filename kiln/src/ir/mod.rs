//! Intermediate Representation for Kiln
//!
//! A small SSA-style IR over 32-bit integers. Values are either constants,
//! function parameters or temporaries produced by instructions; mutable
//! storage lives in stack slots or module globals and is addressed through
//! [`Location`].

pub mod builder;
pub mod printer;
mod verify;

/// A compiled module
#[derive(Debug, Clone)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Functions defined or declared in this module
    pub functions: Vec<Function>,
    /// Module-level integer globals
    pub globals: Vec<Global>,
}

/// A function definition or external declaration
#[derive(Debug, Clone)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Parameters
    pub params: Vec<Param>,
    /// Return type
    pub return_type: Type,
    /// Basic blocks; empty for declarations
    pub blocks: Vec<BasicBlock>,
    /// Stack slots allocated in the function frame
    pub slots: Vec<StackSlot>,
    pub(crate) value_types: Vec<Type>,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub ty: Type,
}

/// A named 32-bit stack slot.
#[derive(Debug, Clone, PartialEq)]
pub struct StackSlot {
    /// Source-level name, used for printing only
    pub name: String,
}

/// A module-level global with external linkage.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    /// Symbol name
    pub name: String,
    /// Initial value
    pub initializer: i32,
}

/// A basic block (straight-line code with no branches except at the end)
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Block label
    pub label: String,
    /// Instructions in this block
    pub instructions: Vec<Instruction>,
    /// Block terminator, once emitted
    pub terminator: Option<Terminator>,
}

/// Index of a block inside its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

/// IR value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// Signed 32-bit constant
    Const(i32),
    /// Result of an instruction
    Temp(usize),
    /// Incoming function parameter
    Param(usize),
}

/// Storage that can be loaded from, stored to, or passed by address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// Stack slot of the current function
    Slot(usize),
    /// Module global
    Global(String),
}

/// IR instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Integer arithmetic
    BinOp {
        dest: usize,
        op: BinOp,
        lhs: Value,
        rhs: Value,
    },
    /// Signed comparison producing an i1
    Icmp {
        dest: usize,
        op: CmpOp,
        lhs: Value,
        rhs: Value,
    },
    /// Zero-extend an i1 to i32
    Zext { dest: usize, value: Value },
    /// Load from memory
    Load { dest: usize, from: Location },
    /// Store to memory
    Store { value: Value, to: Location },
    /// Materialize the address of a location
    AddressOf { dest: usize, location: Location },
    /// Function call
    Call {
        dest: Option<usize>,
        callee: String,
        args: Vec<Value>,
    },
    /// Join of values flowing in from predecessor blocks
    Phi {
        dest: usize,
        incoming: Vec<(Value, BlockId)>,
    },
}

/// Block terminator (control flow)
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// Return from function
    Return(Option<Value>),
    /// Unconditional branch
    Jump(BlockId),
    /// Conditional branch on an i1
    Branch {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
}

/// Binary arithmetic operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
}

/// Signed integer comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

/// IR type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    /// Void (no value)
    Void,
    /// One-bit comparison result
    I1,
    /// Signed 32-bit integer
    I32,
    /// Address of an i32
    Ptr,
}

impl Module {
    /// Create a new empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            globals: Vec::new(),
        }
    }

    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Look up a global by name.
    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub(crate) fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }
}

impl Function {
    /// Create a new function declaration (no blocks yet)
    pub fn new(name: impl Into<String>, params: Vec<Param>, return_type: Type) -> Self {
        Self {
            name: name.into(),
            params,
            return_type,
            blocks: Vec::new(),
            slots: Vec::new(),
            value_types: Vec::new(),
        }
    }

    /// A function without blocks is an external declaration.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Type of a value as seen from inside this function.
    pub fn value_type(&self, value: Value) -> Type {
        match value {
            Value::Const(_) => Type::I32,
            Value::Temp(id) => self.value_types.get(id).copied().unwrap_or(Type::Void),
            Value::Param(index) => self
                .params
                .get(index)
                .map(|param| param.ty)
                .unwrap_or(Type::Void),
        }
    }

    /// Number of temporaries defined so far.
    pub fn temp_count(&self) -> usize {
        self.value_types.len()
    }

    /// Id of the last block, where re-entered functions continue appending.
    pub fn last_block(&self) -> Option<BlockId> {
        self.blocks.len().checked_sub(1).map(BlockId)
    }

    pub(crate) fn new_temp(&mut self, ty: Type) -> usize {
        self.value_types.push(ty);
        self.value_types.len() - 1
    }
}

impl BasicBlock {
    /// Create a new basic block
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
            terminator: None,
        }
    }

    /// Blocks this block may branch to.
    pub fn successors(&self) -> Vec<BlockId> {
        match &self.terminator {
            Some(Terminator::Jump(target)) => vec![*target],
            Some(Terminator::Branch {
                then_block,
                else_block,
                ..
            }) => vec![*then_block, *else_block],
            Some(Terminator::Return(_)) | None => Vec::new(),
        }
    }
}

impl BinOp {
    /// Evaluate with 32-bit wrapping semantics; `None` on division by zero.
    pub fn apply(self, lhs: i32, rhs: i32) -> Option<i32> {
        match self {
            BinOp::Add => Some(lhs.wrapping_add(rhs)),
            BinOp::Sub => Some(lhs.wrapping_sub(rhs)),
            BinOp::Mul => Some(lhs.wrapping_mul(rhs)),
            BinOp::SDiv => {
                if rhs == 0 {
                    None
                } else {
                    Some(lhs.wrapping_div(rhs))
                }
            }
        }
    }
}

impl CmpOp {
    /// Evaluate the comparison.
    pub fn apply(self, lhs: i32, rhs: i32) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Slt => lhs < rhs,
            CmpOp::Sle => lhs <= rhs,
            CmpOp::Sgt => lhs > rhs,
            CmpOp::Sge => lhs >= rhs,
        }
    }
}

impl Instruction {
    /// Temporary defined by this instruction, if any.
    pub fn dest(&self) -> Option<usize> {
        match self {
            Instruction::BinOp { dest, .. }
            | Instruction::Icmp { dest, .. }
            | Instruction::Zext { dest, .. }
            | Instruction::Load { dest, .. }
            | Instruction::AddressOf { dest, .. }
            | Instruction::Phi { dest, .. } => Some(*dest),
            Instruction::Call { dest, .. } => *dest,
            Instruction::Store { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_by_zero_does_not_fold() {
        assert_eq!(BinOp::SDiv.apply(7, 0), None);
        assert_eq!(BinOp::SDiv.apply(-7, 2), Some(-3));
        assert_eq!(BinOp::Add.apply(i32::MAX, 1), Some(i32::MIN));
    }

    #[test]
    fn declarations_have_no_blocks() {
        let func = Function::new("writeln", vec![], Type::I32);
        assert!(func.is_declaration());
        assert_eq!(func.last_block(), None);
        assert_eq!(func.value_type(Value::Const(3)), Type::I32);
    }
}

//! IR pretty-printing for debugging

use super::*;
use std::fmt;

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {} {{", self.name)?;

        for global in &self.globals {
            writeln!(f, "  global @{} = {}", global.name, global.initializer)?;
        }

        if !self.globals.is_empty() && !self.functions.is_empty() {
            writeln!(f)?;
        }

        for func in &self.functions {
            write!(f, "{}", func)?;
        }

        writeln!(f, "}}")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = if self.is_declaration() {
            "declare"
        } else {
            "define"
        };
        write!(f, "  {} {} @{}(", keyword, self.return_type, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} %{}", param.ty, param.name)?;
        }

        if self.is_declaration() {
            return writeln!(f, ")");
        }
        writeln!(f, ") {{")?;

        for (index, slot) in self.slots.iter().enumerate() {
            writeln!(f, "    ${} = slot i32 ; {}", index, slot.name)?;
        }

        for block in &self.blocks {
            writeln!(f, "  {}:", block.label)?;
            for inst in &block.instructions {
                writeln!(f, "    {}", DisplayInst { func: self, inst })?;
            }
            match &block.terminator {
                Some(term) => writeln!(f, "    {}", DisplayTerm { func: self, term })?,
                None => writeln!(f, "    <unterminated>")?,
            }
        }

        writeln!(f, "  }}")?;
        Ok(())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Void => "void",
            Type::I1 => "i1",
            Type::I32 => "i32",
            Type::Ptr => "ptr",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Slot(index) => write!(f, "${}", index),
            Location::Global(name) => write!(f, "@{}", name),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
        };
        f.write_str(name)
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Slt => "slt",
            CmpOp::Sle => "sle",
            CmpOp::Sgt => "sgt",
            CmpOp::Sge => "sge",
        };
        f.write_str(name)
    }
}

struct DisplayValue<'a> {
    func: &'a Function,
    value: Value,
}

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Const(value) => write!(f, "{}", value),
            Value::Temp(id) => write!(f, "%{}", id),
            Value::Param(index) => match self.func.params.get(index) {
                Some(param) => write!(f, "%{}", param.name),
                None => write!(f, "%arg{}", index),
            },
        }
    }
}

struct DisplayInst<'a> {
    func: &'a Function,
    inst: &'a Instruction,
}

impl fmt::Display for DisplayInst<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = |value: Value| DisplayValue {
            func: self.func,
            value,
        };
        match self.inst {
            Instruction::BinOp { dest, op, lhs, rhs } => {
                write!(f, "%{} = {} {}, {}", dest, op, v(*lhs), v(*rhs))
            }
            Instruction::Icmp { dest, op, lhs, rhs } => {
                write!(f, "%{} = icmp {} {}, {}", dest, op, v(*lhs), v(*rhs))
            }
            Instruction::Zext { dest, value } => write!(f, "%{} = zext {}", dest, v(*value)),
            Instruction::Load { dest, from } => write!(f, "%{} = load {}", dest, from),
            Instruction::Store { value, to } => write!(f, "store {}, {}", v(*value), to),
            Instruction::AddressOf { dest, location } => {
                write!(f, "%{} = addr {}", dest, location)
            }
            Instruction::Call { dest, callee, args } => {
                if let Some(dest) = dest {
                    write!(f, "%{} = ", dest)?;
                }
                write!(f, "call @{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v(*arg))?;
                }
                write!(f, ")")
            }
            Instruction::Phi { dest, incoming } => {
                write!(f, "%{} = phi ", dest)?;
                for (i, (value, block)) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let label = self
                        .func
                        .blocks
                        .get(block.0)
                        .map(|b| b.label.as_str())
                        .unwrap_or("?");
                    write!(f, "[{}, {}]", v(*value), label)?;
                }
                Ok(())
            }
        }
    }
}

struct DisplayTerm<'a> {
    func: &'a Function,
    term: &'a Terminator,
}

impl fmt::Display for DisplayTerm<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = |block: BlockId| {
            self.func
                .blocks
                .get(block.0)
                .map(|b| b.label.clone())
                .unwrap_or_else(|| format!("?{}", block.0))
        };
        match self.term {
            Terminator::Return(None) => write!(f, "ret"),
            Terminator::Return(Some(value)) => write!(
                f,
                "ret {}",
                DisplayValue {
                    func: self.func,
                    value: *value
                }
            ),
            Terminator::Jump(target) => write!(f, "br {}", label(*target)),
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => write!(
                f,
                "br {}, {}, {}",
                DisplayValue {
                    func: self.func,
                    value: *cond
                },
                label(*then_block),
                label(*else_block)
            ),
        }
    }
}

/// Print IR to stdout for debugging
pub fn print_ir(module: &Module) {
    println!("{}", module);
}

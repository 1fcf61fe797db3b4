//! Lowering of parsed items into the kiln module.
//!
//! Each top-level item is lowered as soon as it is parsed. Function
//! definitions that fail are rolled back completely; a failed top-level
//! statement leaves the entry function as it was before the statement.

mod context;
mod expr;
mod scope;

pub use context::{Context, ENTRY_FUNCTION};
pub use scope::Scope;

use kiln::{BinOp, CmpOp, Value};
use log::{debug, trace};

use crate::errors::CompileError;
use crate::lexer::token::Operator;
use crate::parser::ast::{ConstSection, Expr, Function, Item, VarSection};

impl Context {
    pub fn lower_item(&mut self, item: &Item) -> Result<(), CompileError> {
        match item {
            Item::Function(function) => self.lower_function(function),
            Item::Forward(proto) => {
                debug!("recording forward declaration of '{}'", proto.name);
                self.prototypes.insert(proto.name.clone(), proto.clone());
                Ok(())
            }
            Item::Var(section) => {
                self.lower_global_vars(section);
                Ok(())
            }
            Item::Const(section) => self.lower_const_section(section),
            Item::Statement(expr) => self.lower_statement(expr),
            Item::Eof => Ok(()),
        }
    }

    fn lower_function(&mut self, function: &Function) -> Result<(), CompileError> {
        let proto = &function.proto;
        let name = proto.name.as_str();
        debug!("lowering function '{}'", name);

        let previous = self.builder.function(name).cloned();
        let has_body = previous.as_ref().is_some_and(|f| !f.is_declaration());
        if name == ENTRY_FUNCTION || self.is_intrinsic(name) || has_body {
            return Err(CompileError::FunctionRedefinition(name.to_string()));
        }

        let previous_proto = self.prototypes.insert(name.to_string(), proto.clone());
        self.declare_prototype(proto);
        let registration = self.register_operator(proto);

        if let Err(err) = self.lower_function_body(function) {
            trace!("rolling back '{}'", name);
            match previous {
                Some(declaration) => self.builder.restore_function(declaration),
                None => {
                    self.builder.remove_function(name);
                }
            }
            match previous_proto {
                Some(proto) => {
                    self.prototypes.insert(name.to_string(), proto);
                }
                None => {
                    self.prototypes.remove(name);
                }
            }
            if let Some(registration) = registration {
                self.unregister_operator(registration);
            }
            self.scope.reset();
            return Err(err);
        }
        Ok(())
    }

    fn lower_function_body(&mut self, function: &Function) -> Result<(), CompileError> {
        let proto = &function.proto;
        let entry = self.builder.append_block_to(&proto.name, "entry")?;
        self.builder.position_at_end(&proto.name, entry)?;

        self.scope.reset();
        self.scope.push_frame();
        for (index, param) in proto.params.iter().enumerate() {
            let slot = self.builder.alloca(param)?;
            self.builder.store(Value::Param(index), &slot)?;
            self.scope.bind(param, slot);
        }

        let last = self.lower_sequence(&function.body)?;
        if proto.is_procedure {
            self.builder.ret(None)?;
        } else {
            self.builder.ret(Some(last.unwrap_or(Value::Const(0))))?;
        }
        self.scope.reset();
        Ok(())
    }

    /// Append a bare statement to the entry function.
    fn lower_statement(&mut self, expr: &Expr) -> Result<(), CompileError> {
        let block = self.entry_function()?.last_block().ok_or_else(|| {
            CompileError::Backend(kiln::KilnError::InvalidIR(
                "entry function has no blocks".to_string(),
            ))
        })?;
        let snapshot = self.builder.function(ENTRY_FUNCTION).cloned();
        self.builder.position_at_end(ENTRY_FUNCTION, block)?;

        self.scope.reset();
        self.scope.push_frame();
        let result = self.lower_expr(expr);
        self.scope.reset();

        if let Err(err) = result {
            if let Some(snapshot) = snapshot {
                self.builder.restore_function(snapshot);
            }
            return Err(err);
        }
        Ok(())
    }

    fn lower_global_vars(&mut self, section: &VarSection) {
        for name in &section.names {
            if self.builder.global(name).is_none() {
                debug!("declaring global '{}'", name);
                self.builder.add_global(name, 0);
            }
        }
    }

    /// Every initializer must fold to an integer before any global exists.
    pub(crate) fn lower_const_section(&mut self, section: &ConstSection) -> Result<(), CompileError> {
        let mut folded: Vec<(&str, i32)> = Vec::with_capacity(section.entries.len());
        for entry in &section.entries {
            let value = self
                .fold_constant(&entry.value, &folded)
                .ok_or_else(|| CompileError::NonConstantInitializer(entry.name.clone()))?;
            folded.push((entry.name.as_str(), value));
        }

        for (name, value) in folded {
            debug!("declaring constant '{}' = {}", name, value);
            self.builder.add_global(name, value);
            self.consts.insert(name.to_string());
        }
        Ok(())
    }

    fn fold_constant(&self, expr: &Expr, earlier: &[(&str, i32)]) -> Option<i32> {
        match expr {
            Expr::Number(value) => Some(*value),
            Expr::Variable(name) => {
                if let Some((_, value)) = earlier.iter().rev().find(|(n, _)| n == name) {
                    return Some(*value);
                }
                if !self.consts.contains(name) {
                    return None;
                }
                self.module().global(name).map(|global| global.initializer)
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.fold_constant(lhs, earlier)?;
                let rhs = self.fold_constant(rhs, earlier)?;
                if let Some(op) = arithmetic(*op) {
                    return op.apply(lhs, rhs);
                }
                comparison(*op).map(|op| i32::from(op.apply(lhs, rhs)))
            }
            _ => None,
        }
    }
}

fn arithmetic(op: Operator) -> Option<BinOp> {
    match op {
        Operator::Plus => Some(BinOp::Add),
        Operator::Minus => Some(BinOp::Sub),
        Operator::Star => Some(BinOp::Mul),
        Operator::Slash => Some(BinOp::SDiv),
        _ => None,
    }
}

fn comparison(op: Operator) -> Option<CmpOp> {
    match op {
        Operator::Less => Some(CmpOp::Slt),
        Operator::LessEqual => Some(CmpOp::Sle),
        Operator::Greater => Some(CmpOp::Sgt),
        Operator::GreaterEqual => Some(CmpOp::Sge),
        Operator::Equal => Some(CmpOp::Eq),
        Operator::NotEqual => Some(CmpOp::Ne),
        _ => None,
    }
}

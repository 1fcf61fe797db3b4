use kiln::{BinOp, BlockId, CmpOp, KilnError, Value};
use log::{error, trace};

use crate::errors::CompileError;
use crate::lexer::token::Operator;
use crate::parser::ast::{Direction, Expr, VarSection};

use super::{arithmetic, comparison, Context};

impl Context {
    /// Lower one expression at the builder's cursor. Sections and calls to
    /// procedures produce no value.
    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> Result<Option<Value>, CompileError> {
        match expr {
            Expr::Number(value) => Ok(Some(self.builder.iconst(*value))),
            Expr::Variable(name) => {
                let location = self.resolve(name)?;
                Ok(Some(self.builder.load(&location)?))
            }
            Expr::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs),
            Expr::Unary { op, operand } => self.lower_unary(*op, operand),
            Expr::Call { callee, args } => self.lower_call(callee, args),
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => self
                .lower_if(cond, then_branch, else_branch.as_deref())
                .map(Some),
            Expr::For {
                var,
                start,
                end,
                step,
                body,
                direction,
            } => {
                self.lower_for(var, start, end, step.as_deref(), body, *direction)?;
                Ok(Some(Value::Const(0)))
            }
            Expr::Var(section) => {
                self.lower_local_vars(section)?;
                Ok(None)
            }
            Expr::Const(section) => {
                self.lower_const_section(section)?;
                Ok(None)
            }
        }
    }

    /// Like [`Context::lower_expr`], for positions that need a value.
    fn value_of(&mut self, expr: &Expr) -> Result<Value, CompileError> {
        self.lower_expr(expr)?
            .ok_or_else(|| CompileError::VoidValue(describe(expr)))
    }

    /// Lower statements in order, yielding the value of the last one.
    pub(crate) fn lower_sequence(&mut self, body: &[Expr]) -> Result<Option<Value>, CompileError> {
        let mut last = None;
        for expr in body {
            last = self.lower_expr(expr)?;
        }
        Ok(last)
    }

    fn lower_binary(
        &mut self,
        op: Operator,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Option<Value>, CompileError> {
        if op == Operator::Assign {
            return self.lower_assignment(lhs, rhs).map(Some);
        }

        let lhs = self.value_of(lhs)?;
        let rhs = self.value_of(rhs)?;
        if let Some(op) = arithmetic(op) {
            return Ok(Some(self.builder.binop(op, lhs, rhs)?));
        }
        if let Some(op) = comparison(op) {
            let bit = self.builder.icmp(op, lhs, rhs)?;
            return Ok(Some(self.builder.zext(bit)?));
        }

        let Some(c) = op.as_char() else {
            return Err(CompileError::UnknownOperator('='));
        };
        let name = format!("binary{}", c);
        if self.lookup_function(&name).is_none() {
            error!("no definition for binary operator '{}'", c);
            return Err(CompileError::MissingBinaryOperator(c));
        }
        Ok(self.builder.call(&name, vec![lhs, rhs])?)
    }

    fn lower_assignment(&mut self, target: &Expr, value: &Expr) -> Result<Value, CompileError> {
        let Expr::Variable(name) = target else {
            error!("left side of ':=' is not a variable");
            return Err(CompileError::InvalidAssignmentTarget);
        };
        if self.consts.contains(name) {
            return Err(CompileError::AssignToConstant(name.clone()));
        }

        let location = self.resolve(name)?;
        let value = self.value_of(value)?;
        self.builder.store(value, &location)?;
        Ok(value)
    }

    fn lower_unary(&mut self, op: char, operand: &Expr) -> Result<Option<Value>, CompileError> {
        let operand = self.value_of(operand)?;
        let name = format!("unary{}", op);
        if self.lookup_function(&name).is_none() {
            return Err(CompileError::UnknownOperator(op));
        }
        Ok(self.builder.call(&name, vec![operand])?)
    }

    fn lower_call(&mut self, callee: &str, args: &[Expr]) -> Result<Option<Value>, CompileError> {
        let expected = self
            .lookup_function(callee)
            .map(|function| function.params.len())
            .ok_or_else(|| CompileError::UnknownFunction(callee.to_string()))?;
        if expected != args.len() {
            return Err(CompileError::ArityMismatch {
                name: callee.to_string(),
                expected,
                found: args.len(),
            });
        }

        let mut values = Vec::with_capacity(args.len());
        if self.is_input_intrinsic(callee) {
            for (index, arg) in args.iter().enumerate() {
                let Expr::Variable(name) = arg else {
                    return Err(CompileError::InvalidInputArgument {
                        callee: callee.to_string(),
                        position: index + 1,
                    });
                };
                if self.consts.contains(name) {
                    return Err(CompileError::AssignToConstant(name.clone()));
                }
                let location = self.resolve(name)?;
                values.push(self.builder.address_of(&location)?);
            }
        } else {
            for arg in args {
                values.push(self.value_of(arg)?);
            }
        }

        trace!("call to '{}' with {} argument(s)", callee, values.len());
        Ok(self.builder.call(callee, values)?)
    }

    /// Both arms are lowered before the join block is appended, so the join
    /// is always the last block of the function afterwards.
    fn lower_if(
        &mut self,
        cond: &Expr,
        then_branch: &[Expr],
        else_branch: Option<&Expr>,
    ) -> Result<Value, CompileError> {
        let cond = self.value_of(cond)?;
        let test = self.builder.icmp(CmpOp::Ne, cond, Value::Const(0))?;
        let cond_block = self.cursor_block()?;

        let then_block = self.builder.append_block("then")?;
        self.builder.switch_to_block(then_block)?;
        self.scope.push_frame();
        let then_value = self.lower_sequence(then_branch);
        self.scope.pop_frame();
        let then_value = then_value?.unwrap_or(Value::Const(0));
        let then_end = self.cursor_block()?;

        let else_arm = match else_branch {
            Some(expr) => {
                let else_block = self.builder.append_block("else")?;
                self.builder.switch_to_block(else_block)?;
                self.scope.push_frame();
                let else_value = self.lower_expr(expr);
                self.scope.pop_frame();
                let else_value = else_value?.unwrap_or(Value::Const(0));
                Some((else_block, else_value, self.cursor_block()?))
            }
            None => None,
        };

        let merge = self.builder.append_block("ifcont")?;
        self.builder.switch_to_block(then_end)?;
        self.builder.jump(merge)?;

        let (else_target, else_value, else_end) = match else_arm {
            Some((else_block, else_value, else_end)) => {
                self.builder.switch_to_block(else_end)?;
                self.builder.jump(merge)?;
                (else_block, else_value, else_end)
            }
            None => (merge, Value::Const(0), cond_block),
        };

        self.builder.switch_to_block(cond_block)?;
        self.builder.branch(test, then_block, else_target)?;

        self.builder.switch_to_block(merge)?;
        Ok(self
            .builder
            .phi(vec![(then_value, then_end), (else_value, else_end)])?)
    }

    /// Counted loop; the body runs once before the bound is first tested.
    fn lower_for(
        &mut self,
        var: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        body: &[Expr],
        direction: Direction,
    ) -> Result<(), CompileError> {
        let start = self.value_of(start)?;
        let slot = self.builder.alloca(var)?;
        self.builder.store(start, &slot)?;

        let loop_block = self.builder.append_block("loop")?;
        self.builder.jump(loop_block)?;
        self.builder.switch_to_block(loop_block)?;

        self.scope.push_frame();
        self.scope.bind(var, slot.clone());
        let result = self.lower_loop_body(&slot, end, step, body, direction, loop_block);
        self.scope.pop_frame();
        result
    }

    fn lower_loop_body(
        &mut self,
        slot: &kiln::Location,
        end: &Expr,
        step: Option<&Expr>,
        body: &[Expr],
        direction: Direction,
        loop_block: BlockId,
    ) -> Result<(), CompileError> {
        self.lower_sequence(body)?;

        let step = match step {
            Some(expr) => self.value_of(expr)?,
            None => Value::Const(1),
        };
        let (advance, keep_going) = match direction {
            Direction::Up => (BinOp::Add, CmpOp::Sle),
            Direction::Down => (BinOp::Sub, CmpOp::Sge),
        };
        let current = self.builder.load(slot)?;
        let next = self.builder.binop(advance, current, step)?;
        self.builder.store(next, slot)?;

        let end = self.value_of(end)?;
        let again = self.builder.icmp(keep_going, next, end)?;
        let after = self.builder.append_block("afterloop")?;
        self.builder.branch(again, loop_block, after)?;
        self.builder.switch_to_block(after)?;
        Ok(())
    }

    fn lower_local_vars(&mut self, section: &VarSection) -> Result<(), CompileError> {
        for name in &section.names {
            let slot = self.builder.alloca(name)?;
            self.builder.store(Value::Const(0), &slot)?;
            self.scope.bind(name, slot);
        }
        Ok(())
    }

    fn cursor_block(&self) -> Result<BlockId, CompileError> {
        self.builder
            .current_block()
            .ok_or(CompileError::Backend(KilnError::NoInsertionPoint))
    }
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Call { callee, .. } => format!("call to '{}'", callee),
        Expr::Unary { op, .. } => format!("unary operator '{}'", op),
        Expr::Binary { op, .. } => format!("binary operator '{}'", op),
        Expr::Var(_) => "var section".to_string(),
        Expr::Const(_) => "const section".to_string(),
        _ => "expression".to_string(),
    }
}

use super::*;
use crate::{KilnError, Result};

impl Module {
    /// Check structural well-formedness before code emission.
    pub fn verify(&self) -> Result<()> {
        for function in &self.functions {
            verify_function(self, function)?;
        }
        Ok(())
    }
}

fn verify_function(module: &Module, function: &Function) -> Result<()> {
    let invalid = |message: String| {
        Err(KilnError::InvalidIR(format!(
            "in function '{}': {}",
            function.name, message
        )))
    };

    for (index, block) in function.blocks.iter().enumerate() {
        let mut past_phis = false;
        for instruction in &block.instructions {
            match instruction {
                Instruction::Phi { incoming, .. } => {
                    if past_phis {
                        return invalid(format!("phi after non-phi in block '{}'", block.label));
                    }
                    for (_, pred) in incoming {
                        if pred.0 >= function.blocks.len() {
                            return invalid(format!("phi names missing block {}", pred.0));
                        }
                        if !function.blocks[pred.0]
                            .successors()
                            .contains(&BlockId(index))
                        {
                            return invalid(format!(
                                "phi in '{}' lists '{}' which is not a predecessor",
                                block.label, function.blocks[pred.0].label
                            ));
                        }
                    }
                }
                Instruction::Call { callee, args, .. } => {
                    past_phis = true;
                    let Some(target) = module.function(callee) else {
                        return invalid(format!("call to unknown function '{}'", callee));
                    };
                    if target.params.len() != args.len() {
                        return invalid(format!("call to '{}' has wrong arity", callee));
                    }
                }
                _ => past_phis = true,
            }
        }

        match &block.terminator {
            None => return invalid(format!("block '{}' has no terminator", block.label)),
            Some(Terminator::Return(value)) => {
                let returns_value = value.is_some();
                if returns_value != (function.return_type != Type::Void) {
                    return invalid(format!(
                        "return in '{}' does not match the return type",
                        block.label
                    ));
                }
            }
            Some(_) => {
                for target in block.successors() {
                    if target.0 >= function.blocks.len() {
                        return invalid(format!(
                            "block '{}' branches to missing block {}",
                            block.label, target.0
                        ));
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::ir::builder::ModuleBuilder;
    use crate::ir::{Type, Value};
    use crate::KilnError;

    #[test]
    fn unterminated_block_is_rejected() {
        let mut builder = ModuleBuilder::new("test");
        builder.declare_function("main", vec![], Type::I32);
        builder.append_block_to("main", "entry").unwrap();
        let module = builder.build();
        assert!(matches!(module.verify(), Err(KilnError::InvalidIR(_))));
    }

    #[test]
    fn procedure_must_return_nothing() {
        let mut builder = ModuleBuilder::new("test");
        builder.declare_function("p", vec![], Type::Void);
        let entry = builder.append_block_to("p", "entry").unwrap();
        builder.position_at_end("p", entry).unwrap();
        builder.ret(Some(Value::Const(1))).unwrap();
        assert!(builder.build().verify().is_err());
    }
}

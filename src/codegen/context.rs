use std::collections::{HashMap, HashSet};

use kiln::ir::Function as IrFunction;
use kiln::{Location, ModuleBuilder, Param, Type};
use log::{debug, trace};

use crate::errors::CompileError;
use crate::lexer::token::Operator;
use crate::parser::ast::Prototype;
use crate::parser::precedence::PrecedenceTable;

use super::scope::Scope;

/// Name of the implicit function that collects top-level statements.
pub const ENTRY_FUNCTION: &str = "main";

/// All mutable compiler state for one compilation run.
///
/// The parser reads the precedence table and fills the const set; lowering
/// owns everything else. Dropping the context ends the run.
pub struct Context {
    pub precedence: PrecedenceTable,
    pub consts: HashSet<String>,
    pub prototypes: HashMap<String, Prototype>,
    pub scope: Scope,
    pub builder: ModuleBuilder,
    intrinsics: HashSet<String>,
    input_intrinsic: Option<String>,
}

/// What a registered operator replaced, so a failed definition can undo it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OperatorRegistration {
    op: Operator,
    previous: Option<i32>,
}

impl Context {
    pub fn new(module_name: &str) -> Self {
        Self {
            precedence: PrecedenceTable::new(),
            consts: HashSet::new(),
            prototypes: HashMap::new(),
            scope: Scope::new(),
            builder: ModuleBuilder::new(module_name),
            intrinsics: HashSet::new(),
            input_intrinsic: None,
        }
    }

    /// Pre-register one of the I/O primitives.
    ///
    /// The input primitive receives the address of each argument variable;
    /// output primitives receive plain values. Both return an integer.
    pub fn declare_intrinsic(&mut self, name: &str, is_input: bool) {
        let ty = if is_input { Type::Ptr } else { Type::I32 };
        let param = Param {
            name: if is_input { "target" } else { "value" }.to_string(),
            ty,
        };
        self.builder.declare_function(name, vec![param], Type::I32);
        self.intrinsics.insert(name.to_string());
        if is_input {
            self.input_intrinsic = Some(name.to_string());
        }
        debug!("declared intrinsic '{}' (input: {})", name, is_input);
    }

    pub fn is_intrinsic(&self, name: &str) -> bool {
        self.intrinsics.contains(name)
    }

    pub fn is_input_intrinsic(&self, name: &str) -> bool {
        self.input_intrinsic.as_deref() == Some(name)
    }

    /// The implicit entry function, created with an entry block on first use.
    pub fn entry_function(&mut self) -> Result<&IrFunction, CompileError> {
        let missing_body = self
            .builder
            .function(ENTRY_FUNCTION)
            .map_or(true, |function| function.is_declaration());
        if missing_body {
            self.builder
                .declare_function(ENTRY_FUNCTION, Vec::new(), Type::I32);
            self.builder.append_block_to(ENTRY_FUNCTION, "entry")?;
        }
        self.builder
            .function(ENTRY_FUNCTION)
            .ok_or_else(|| CompileError::UnknownFunction(ENTRY_FUNCTION.to_string()))
    }

    /// Declare (or fetch) the module function described by `proto`.
    pub(crate) fn declare_prototype(&mut self, proto: &Prototype) -> &IrFunction {
        let params = proto
            .params
            .iter()
            .map(|name| Param {
                name: name.clone(),
                ty: Type::I32,
            })
            .collect();
        let return_type = if proto.is_procedure {
            Type::Void
        } else {
            Type::I32
        };
        self.builder
            .declare_function(&proto.name, params, return_type)
    }

    /// A function of the module, materialized from a recorded prototype if
    /// it has not been declared yet.
    pub(crate) fn lookup_function(&mut self, name: &str) -> Option<&IrFunction> {
        if self.builder.function(name).is_none() {
            let proto = self.prototypes.get(name)?.clone();
            trace!("materializing '{}' from its prototype", name);
            self.declare_prototype(&proto);
        }
        self.builder.function(name)
    }

    /// Make a `binary<op>` prototype's operator known to the parser.
    pub(crate) fn register_operator(&mut self, proto: &Prototype) -> Option<OperatorRegistration> {
        if !proto.is_binary_op() {
            return None;
        }
        let op = Operator::from_char(proto.operator_char()?);
        let previous = self.precedence.register(op, proto.precedence);
        Some(OperatorRegistration { op, previous })
    }

    pub(crate) fn unregister_operator(&mut self, registration: OperatorRegistration) {
        self.precedence
            .restore(registration.op, registration.previous);
    }

    /// Storage of `name`: a local slot, else a module global.
    pub(crate) fn resolve(&self, name: &str) -> Result<Location, CompileError> {
        if let Some(location) = self.scope.lookup(name) {
            return Ok(location.clone());
        }
        self.builder
            .global(name)
            .ok_or_else(|| CompileError::UnknownVariable(name.to_string()))
    }

    /// The module built so far.
    pub fn module(&self) -> &kiln::Module {
        self.builder.module()
    }
}

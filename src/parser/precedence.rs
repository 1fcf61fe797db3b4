use std::collections::HashMap;

use log::trace;

use crate::lexer::token::{Operator, TokenKind};

/// Binding strength given to a user binary operator declared without one.
pub const DEFAULT_USER_PRECEDENCE: i32 = 30;

/// Operator binding strengths, shared by the parser and by lowering.
///
/// Lowering a `binary<op>` function registers `op` here, which changes how
/// every later expression is parsed.
#[derive(Debug, Clone)]
pub struct PrecedenceTable {
    table: HashMap<Operator, i32>,
}

impl PrecedenceTable {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        table.insert(Operator::Assign, 2);
        for op in [
            Operator::Less,
            Operator::LessEqual,
            Operator::Greater,
            Operator::GreaterEqual,
            Operator::Equal,
            Operator::NotEqual,
        ] {
            table.insert(op, 10);
        }
        table.insert(Operator::Plus, 20);
        table.insert(Operator::Minus, 20);
        table.insert(Operator::Star, 40);
        table.insert(Operator::Slash, 40);
        Self { table }
    }

    /// Precedence of `op`, or -1 when it is not a binary operator.
    pub fn get(&self, op: Operator) -> i32 {
        self.table.get(&op).copied().unwrap_or(-1)
    }

    /// Precedence of the operator carried by `kind`, or -1.
    pub fn of_token(&self, kind: &TokenKind) -> i32 {
        match kind {
            TokenKind::Op(op) => self.get(*op),
            _ => -1,
        }
    }

    pub fn contains(&self, op: Operator) -> bool {
        self.table.contains_key(&op)
    }

    /// Install `op`, returning the precedence it replaced.
    pub fn register(&mut self, op: Operator, precedence: i32) -> Option<i32> {
        trace!("registering operator '{}' at precedence {}", op, precedence);
        self.table.insert(op, precedence)
    }

    /// Undo a [`register`](Self::register) call.
    pub fn restore(&mut self, op: Operator, previous: Option<i32>) {
        trace!("rolling back operator '{}'", op);
        match previous {
            Some(precedence) => {
                self.table.insert(op, precedence);
            }
            None => {
                self.table.remove(&op);
            }
        }
    }
}

impl Default for PrecedenceTable {
    fn default() -> Self {
        Self::new()
    }
}

use crate::lexer::token::Operator;

/// Counting direction of a `for` loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(i32),
    Variable(String),
    Binary {
        op: Operator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: char,
        operand: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_branch: Vec<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    For {
        var: String,
        start: Box<Expr>,
        end: Box<Expr>,
        step: Option<Box<Expr>>,
        body: Vec<Expr>,
        direction: Direction,
    },
    Var(VarSection),
    Const(ConstSection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarSection {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstEntry {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstSection {
    pub entries: Vec<ConstEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<String>,
    pub is_operator: bool,
    pub precedence: i32,
    pub is_procedure: bool,
}

impl Prototype {
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            name: name.into(),
            params,
            is_operator: false,
            precedence: 0,
            is_procedure: false,
        }
    }

    pub fn is_unary_op(&self) -> bool {
        self.is_operator && self.params.len() == 1
    }

    pub fn is_binary_op(&self) -> bool {
        self.is_operator && self.params.len() == 2
    }

    /// The operator character of a `binary`/`unary` prototype.
    pub fn operator_char(&self) -> Option<char> {
        if !self.is_operator {
            return None;
        }
        self.name.chars().last()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub proto: Prototype,
    pub body: Vec<Expr>,
}

/// One top-level construct, handed to lowering before the next is parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Function(Function),
    Forward(Prototype),
    Var(VarSection),
    Const(ConstSection),
    Statement(Expr),
    Eof,
}

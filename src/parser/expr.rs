use crate::codegen::Context;
use crate::lexer::token::{Operator, TokenKind};

use super::ast::{Direction, Expr};
use super::{ParseError, Parser};

impl Parser {
    pub(crate) fn expression(&mut self, ctx: &mut Context) -> Result<Expr, ParseError> {
        let lhs = self.unary(ctx)?;
        self.binary_rhs(ctx, 0, lhs)
    }

    /// Precedence climbing: fold operators binding at least `min_precedence`.
    fn binary_rhs(
        &mut self,
        ctx: &mut Context,
        min_precedence: i32,
        mut lhs: Expr,
    ) -> Result<Expr, ParseError> {
        loop {
            let precedence = ctx.precedence.of_token(self.peek_kind());
            if precedence < min_precedence {
                return Ok(lhs);
            }

            let TokenKind::Op(op) = *self.peek_kind() else {
                return Ok(lhs);
            };
            self.advance();

            let mut rhs = self.unary(ctx)?;
            let next_precedence = ctx.precedence.of_token(self.peek_kind());
            if precedence < next_precedence {
                rhs = self.binary_rhs(ctx, precedence + 1, rhs)?;
            }

            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self, ctx: &mut Context) -> Result<Expr, ParseError> {
        let Some(op) = self.peek_operator_char() else {
            return self.primary(ctx);
        };
        self.advance();
        let operand = self.unary(ctx)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn primary(&mut self, ctx: &mut Context) -> Result<Expr, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                if !self.matches_symbol(TokenKind::LeftParen) {
                    return Ok(Expr::Variable(name));
                }

                let mut args = Vec::new();
                if !self.check_kind(&TokenKind::RightParen) {
                    loop {
                        args.push(self.expression(ctx)?);
                        if !self.matches_symbol(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume_symbol(TokenKind::RightParen, "expected ')' after arguments")?;
                Ok(Expr::Call { callee: name, args })
            }
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expr::Number(value))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression(ctx)?;
                self.consume_symbol(TokenKind::RightParen, "expected ')' after expression")?;
                Ok(expr)
            }
            TokenKind::If => self.if_expression(ctx),
            TokenKind::For => self.for_expression(ctx),
            TokenKind::Var => {
                self.advance();
                Ok(Expr::Var(self.var_section()?))
            }
            TokenKind::Const => Err(ParseError::new(
                "constants can only be declared at module level",
                self.peek(),
            )),
            TokenKind::Eof => Err(ParseError::new(
                "unexpected end of input, expected an expression",
                self.peek(),
            )),
            _ => Err(ParseError::new(
                format!("unexpected '{}', expected an expression", self.peek().lexeme),
                self.peek(),
            )),
        }
    }

    fn if_expression(&mut self, ctx: &mut Context) -> Result<Expr, ParseError> {
        self.advance();
        let cond = self.expression(ctx)?;
        self.consume_symbol(TokenKind::Then, "expected 'then' after condition")?;

        let then_branch = if self.matches_keyword(TokenKind::Begin) {
            self.block_statements(ctx)?
        } else {
            vec![self.expression(ctx)?]
        };

        if self.check_kind(&TokenKind::Semicolon)
            && self.peek_kind_at_is(1, &TokenKind::Else)
        {
            self.advance();
        }

        let else_branch = if self.matches_keyword(TokenKind::Else) {
            Some(Box::new(self.expression(ctx)?))
        } else {
            None
        };

        Ok(Expr::If {
            cond: Box::new(cond),
            then_branch,
            else_branch,
        })
    }

    fn for_expression(&mut self, ctx: &mut Context) -> Result<Expr, ParseError> {
        self.advance();
        let var = self.consume_identifier("expected loop variable after 'for'")?;
        if !matches!(self.peek_kind(), TokenKind::Op(Operator::Assign)) {
            return Err(ParseError::new(
                "expected ':=' after loop variable",
                self.peek(),
            ));
        }
        self.advance();
        let start = self.expression(ctx)?;

        let direction = if self.matches_keyword(TokenKind::To) {
            Direction::Up
        } else if self.matches_keyword(TokenKind::Downto) {
            Direction::Down
        } else {
            return Err(ParseError::new("expected 'to' or 'downto'", self.peek()));
        };

        let end = self.expression(ctx)?;
        let step = if self.matches_identifier_literal("step") {
            Some(Box::new(self.expression(ctx)?))
        } else {
            None
        };

        self.consume_symbol(TokenKind::Do, "expected 'do' after loop bounds")?;
        self.consume_symbol(TokenKind::Begin, "expected 'begin' to open loop body")?;
        let body = self.block_statements(ctx)?;

        Ok(Expr::For {
            var,
            start: Box::new(start),
            end: Box::new(end),
            step,
            body,
            direction,
        })
    }

    fn peek_kind_at_is(&self, offset: usize, kind: &TokenKind) -> bool {
        self.tokens
            .get(self.current + offset)
            .is_some_and(|token| &token.kind == kind)
    }
}

//! Recursive-descent formula parser
//!
//! Precedence, loosest first: ternary, `||`, `&&`, comparisons, `+ -`,
//! `* / %`, `^` (right-associative), unary `- !`, primary. `PI`, `E`,
//! `TRUE` and `FALSE` are folded to constants at parse time.

use crate::ast::{Arg, BinaryOp, Expr, UnaryOp};
use crate::error::FormulaError;
use crate::token::{Token, tokenize};

pub fn parse(input: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.ternary()?;
    match parser.peek() {
        None => Ok(expr),
        Some(t) => Err(FormulaError::UnexpectedToken(t.to_string())),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), FormulaError> {
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(FormulaError::UnexpectedToken(t.to_string())),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn ternary(&mut self) -> Result<Expr, FormulaError> {
        let cond = self.or()?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        let then = self.ternary()?;
        self.expect(Token::Colon)?;
        let otherwise = self.ternary()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.and()?;
        while self.eat(&Token::OrOr) {
            let right = self.and()?;
            left = Expr::Binary { op: BinaryOp::Or, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.comparison()?;
        while self.eat(&Token::AndAnd) {
            let right = self.comparison()?;
            left = Expr::Binary { op: BinaryOp::And, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    /// At most one comparison: `a > b > c` does not chain and fails at the
    /// second operator.
    fn comparison(&mut self) -> Result<Expr, FormulaError> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        Ok(Expr::Binary { op, left: Box::new(left), right: Box::new(right) })
    }

    fn additive(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.power()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.power()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.unary()?;
        if self.eat(&Token::Caret) {
            // right-associative
            let exponent = self.power()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if self.eat(&Token::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::Unary { op: UnaryOp::Negate, operand: Box::new(operand) });
        }
        if self.eat(&Token::Not) {
            let operand = self.unary()?;
            return Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand) });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.ternary()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    return self.call(name);
                }
                Ok(match name.as_str() {
                    "PI" => Expr::Number(std::f64::consts::PI),
                    "E" => Expr::Number(std::f64::consts::E),
                    "TRUE" => Expr::Number(1.0),
                    "FALSE" => Expr::Number(0.0),
                    _ => Expr::Variable(name),
                })
            }
            Some(t) => Err(FormulaError::UnexpectedToken(t.to_string())),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr, FormulaError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(Expr::Call { name, args });
        }
        loop {
            args.push(self.argument(args.len())?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            return Ok(Expr::Call { name, args });
        }
    }

    /// In the first argument position a bare identifier followed by `,` or
    /// `)` is a symbol argument: `RSI(NSE.RELIANCE, 14)` names the
    /// instrument. Later positions evaluate normally.
    fn argument(&mut self, index: usize) -> Result<Arg, FormulaError> {
        if index == 0
            && let Some(Token::Ident(name)) = self.peek()
        {
            let next = self.tokens.get(self.pos + 1);
            let bare = matches!(next, Some(Token::Comma) | Some(Token::RParen));
            let constant = matches!(name.as_str(), "PI" | "E" | "TRUE" | "FALSE");
            if bare && !constant {
                let name = name.clone();
                self.pos += 1;
                return Ok(Arg::Symbol(name));
            }
        }
        Ok(Arg::Expr(self.ternary()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let e = parse("1 + 2 * 3").unwrap();
        match e {
            Expr::Binary { op: BinaryOp::Add, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_power_right_associative() {
        let e = parse("2 ^ 3 ^ 2").unwrap();
        match e {
            Expr::Binary { op: BinaryOp::Pow, left, right } => {
                assert_eq!(*left, Expr::Number(2.0));
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Pow, .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_constants_folded() {
        assert_eq!(parse("PI").unwrap(), Expr::Number(std::f64::consts::PI));
        assert_eq!(parse("TRUE").unwrap(), Expr::Number(1.0));
    }

    #[test]
    fn test_symbol_argument() {
        let e = parse("RSI(NSE.RELIANCE, 14)").unwrap();
        match e {
            Expr::Call { name, args } => {
                assert_eq!(name, "RSI");
                assert_eq!(args[0], Arg::Symbol("NSE.RELIANCE".to_string()));
                assert_eq!(args[1], Arg::Expr(Expr::Number(14.0)));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_nested_expression_argument() {
        let e = parse("MAX(a + 1, 2)").unwrap();
        match e {
            Expr::Call { args, .. } => {
                assert!(matches!(args[0], Arg::Expr(Expr::Binary { .. })));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_ternary_nests_right() {
        let e = parse("a > 1 ? 2 : b > 2 ? 3 : 4").unwrap();
        match e {
            Expr::Ternary { otherwise, .. } => {
                assert!(matches!(*otherwise, Expr::Ternary { .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_comparison_does_not_chain() {
        assert_eq!(parse("1 > 2 > 3"), Err(FormulaError::UnexpectedToken(">".to_string())));
        assert_eq!(parse("a <= b == c"), Err(FormulaError::UnexpectedToken("==".to_string())));
        // single comparisons and parenthesized chains still parse
        assert!(parse("a > b").is_ok());
        assert!(parse("(a > b) == c").is_ok());
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse("1 +"), Err(FormulaError::UnexpectedEnd));
        assert_eq!(parse("(1"), Err(FormulaError::UnexpectedEnd));
        assert_eq!(parse("1 2"), Err(FormulaError::UnexpectedToken("2".to_string())));
        assert_eq!(parse("a ? 1 2"), Err(FormulaError::UnexpectedToken("2".to_string())));
    }

    #[test]
    fn test_introspection() {
        let e = parse("a + RSI(NSE.X, b) * c").unwrap();
        let vars: Vec<String> = e.variables().into_iter().collect();
        assert_eq!(vars, vec!["a", "b", "c"]);
        assert!(e.functions().contains("RSI"));
    }
}

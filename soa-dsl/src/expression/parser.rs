use crate::expression::lexer::{Lexer, Token};
use crate::expression::ExpressionError;

/// Functions callable from limit expressions.
pub const FUNCTIONS: [&str; 11] = [
    "min", "max", "abs", "sqrt", "exp", "log", "log10", "sin", "cos", "tan", "pow",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Var(String),
    DeviceParam(String),
    /// `T` or `temp`; the spelling is kept for lookups.
    Temperature(String),
    Voltage(String, Option<String>),
    Current(String, bool),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Conditional(Box<Condition>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub lhs: Expr,
    pub comparison: Option<(CompareOp, Expr)>,
}

impl Expr {
    /// True when the expression references nothing outside itself.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Number(_) => true,
            Expr::Var(_)
            | Expr::DeviceParam(_)
            | Expr::Temperature(_)
            | Expr::Voltage(..)
            | Expr::Current(..) => false,
            Expr::Neg(e) => e.is_constant(),
            Expr::Binary(_, l, r) => l.is_constant() && r.is_constant(),
            Expr::Call(_, args) => args.iter().all(Expr::is_constant),
            Expr::Conditional(cond, a, b) => {
                cond.lhs.is_constant()
                    && cond.comparison.as_ref().map(|(_, e)| e.is_constant()).unwrap_or(true)
                    && a.is_constant()
                    && b.is_constant()
            }
        }
    }
}

pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = ExprParser::new(tokens);
    let expr = parser.parse_expr()?;
    if let Some(tok) = parser.peek() {
        return Err(ExpressionError::UnexpectedToken(format!("{:?}", tok)));
    }
    Ok(expr)
}

pub struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::If) {
            return self.parse_conditional();
        }
        self.parse_additive()
    }

    fn parse_conditional(&mut self) -> Result<Expr, ExpressionError> {
        self.expect(Token::If)?;
        let lhs = self.parse_additive()?;
        let comparison = match self.peek().and_then(compare_op) {
            Some(op) => {
                self.advance();
                Some((op, self.parse_additive()?))
            }
            None => None,
        };
        self.expect(Token::Then)?;
        let then_branch = self.parse_expr()?;
        self.expect(Token::Else)?;
        let else_branch = self.parse_expr()?;
        Ok(Expr::Conditional(
            Box::new(Condition { lhs, comparison }),
            Box::new(then_branch),
            Box::new(else_branch),
        ))
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Plus) => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // `^` binds tighter than unary minus on its left and is right-associative.
    fn parse_power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.parse_primary()?;
        if self.peek() == Some(&Token::Caret) {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let token = self.advance().ok_or(ExpressionError::UnexpectedEnd)?;
        match token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::DeviceParam(name) => Ok(Expr::DeviceParam(name)),
            Token::Voltage(a, b) => Ok(Expr::Voltage(a, b)),
            Token::Current(x, rms) => Ok(Expr::Current(x, rms)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    self.parse_call(name)
                } else if name == "T" || name == "temp" {
                    Ok(Expr::Temperature(name))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            other => Err(ExpressionError::UnexpectedToken(format!("{:?}", other))),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, ExpressionError> {
        if !FUNCTIONS.contains(&name.as_str()) {
            return Err(ExpressionError::UnknownFunction(name));
        }
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.peek() == Some(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        check_arity(&name, args.len())?;
        Ok(Expr::Call(name, args))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        match self.advance() {
            Some(ref tok) if *tok == expected => Ok(()),
            Some(tok) => Err(ExpressionError::UnexpectedToken(format!(
                "expected {:?}, found {:?}",
                expected, tok
            ))),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

fn compare_op(token: &Token) -> Option<CompareOp> {
    match token {
        Token::Lt => Some(CompareOp::Lt),
        Token::Le => Some(CompareOp::Le),
        Token::Gt => Some(CompareOp::Gt),
        Token::Ge => Some(CompareOp::Ge),
        Token::EqEq => Some(CompareOp::Eq),
        Token::Ne => Some(CompareOp::Ne),
        _ => None,
    }
}

fn check_arity(name: &str, count: usize) -> Result<(), ExpressionError> {
    let ok = match name {
        "min" | "max" => count >= 1,
        "pow" => count == 2,
        _ => count == 1,
    };
    if ok {
        Ok(())
    } else {
        Err(ExpressionError::Arity(name.to_string(), count))
    }
}

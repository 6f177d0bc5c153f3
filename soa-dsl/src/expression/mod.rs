//! Limit-expression sub-language.
//!
//! Expressions mix literals, global parameters, device parameters (`$w`),
//! electrical references (`v[d,s]`, `v[g]`, `i[r1]`, `i_rms[r1]`), the
//! temperature token (`T` / `temp`), a fixed function set, and a single
//! `if C then A else B` form.
//!
//! Evaluation is a best-effort constant fold: whatever cannot be resolved at
//! compile time is returned unchanged so the simulator can resolve it.
//!
//! ```rust
//! use soa_dsl::expression::{Evaluator, to_backend_syntax};
//! use soa_dsl::parser::ParamValue;
//! use std::collections::BTreeMap;
//!
//! let evaluator = Evaluator::default();
//! let mut ctx = BTreeMap::new();
//! ctx.insert("vgs".to_string(), ParamValue::Number(2.0));
//! ctx.insert("vth".to_string(), ParamValue::Number(0.5));
//! let value = evaluator.evaluate_str("if vgs > vth then 1.2 else 0.9", &ctx);
//! assert_eq!(value, ParamValue::Number(1.2));
//! assert_eq!(to_backend_syntax("if vgs > vth then 1.2 else 0.9"), "(vgs > vth) ? 1.2 : 0.9");
//! ```

pub mod lexer;
pub mod parser;
pub mod rewrite;

use crate::parser::schema::ParamValue;
use std::collections::BTreeMap;
use thiserror::Error;

pub use parser::{parse, BinaryOp, CompareOp, Condition, Expr, FUNCTIONS};
pub use rewrite::{
    free_identifiers, parse_conditional, substitute_globals, to_backend_syntax, Conditional,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("Invalid number '{0}' at position {1}")]
    InvalidNumber(String, usize),
    #[error("Invalid electrical reference: {0}")]
    InvalidReference(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Function {0} does not accept {1} argument(s)")]
    Arity(String, usize),
    #[error("Invalid conditional syntax: {0}")]
    InvalidConditional(String),
    #[error("Unresolved reference: {0}")]
    Unresolved(String),
    #[error("Cyclic parameter reference: {0}")]
    Cycle(String),
    #[error("Result is not a finite number")]
    NonFinite,
}

/// Evaluates expressions against a fixed table of global parameters.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    globals: BTreeMap<String, ParamValue>,
}

impl Evaluator {
    pub fn new(globals: BTreeMap<String, ParamValue>) -> Self {
        Self { globals }
    }

    /// Numeric result if `expr` fully resolves against the globals merged with
    /// `context` (context wins), otherwise `expr` unchanged.
    pub fn evaluate(&self, expr: &ParamValue, context: &BTreeMap<String, ParamValue>) -> ParamValue {
        match expr {
            ParamValue::Number(_) => expr.clone(),
            ParamValue::Expr(s) => self.evaluate_str(s, context),
        }
    }

    pub fn evaluate_str(&self, expr: &str, context: &BTreeMap<String, ParamValue>) -> ParamValue {
        match self.try_evaluate(expr, context) {
            Ok(n) => ParamValue::Number(n),
            Err(e) => {
                if let ExpressionError::Cycle(ref name) = e {
                    tracing::warn!("Cyclic global parameter '{}' in '{}'; left unresolved", name, expr);
                }
                ParamValue::Expr(expr.to_string())
            }
        }
    }

    /// Like [`Evaluator::evaluate_str`] but reports why evaluation stopped.
    pub fn try_evaluate(
        &self,
        expr: &str,
        context: &BTreeMap<String, ParamValue>,
    ) -> Result<f64, ExpressionError> {
        let ast = parse(expr)?;
        let scope = Scope {
            globals: &self.globals,
            context,
        };
        let mut resolving = Vec::new();
        let value = eval(&ast, &scope, &mut resolving)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ExpressionError::NonFinite)
        }
    }

    /// True iff the expression has no free identifiers, device parameters,
    /// electrical references or temperature references.
    pub fn can_evaluate(expr: &ParamValue) -> bool {
        match expr {
            ParamValue::Number(_) => true,
            ParamValue::Expr(s) => parse(s).map(|e| e.is_constant()).unwrap_or(false),
        }
    }

    /// Inline this evaluator's globals into `expr`.
    pub fn substitute_globals(&self, expr: &ParamValue) -> ParamValue {
        match expr {
            ParamValue::Number(_) => expr.clone(),
            ParamValue::Expr(s) => ParamValue::Expr(substitute_globals(s, &self.globals)),
        }
    }

    pub fn to_backend_syntax(expr: &ParamValue) -> String {
        match expr {
            ParamValue::Number(_) => expr.to_string(),
            ParamValue::Expr(s) => to_backend_syntax(s),
        }
    }
}

struct Scope<'a> {
    globals: &'a BTreeMap<String, ParamValue>,
    context: &'a BTreeMap<String, ParamValue>,
}

impl Scope<'_> {
    fn lookup(&self, name: &str) -> Option<&ParamValue> {
        self.context.get(name).or_else(|| self.globals.get(name))
    }
}

fn eval(expr: &Expr, scope: &Scope, resolving: &mut Vec<String>) -> Result<f64, ExpressionError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Var(name) | Expr::DeviceParam(name) | Expr::Temperature(name) => {
            resolve(name, scope, resolving)
        }
        Expr::Voltage(a, b) => Err(ExpressionError::Unresolved(match b {
            Some(b) => format!("v[{},{}]", a, b),
            None => format!("v[{}]", a),
        })),
        Expr::Current(x, rms) => Err(ExpressionError::Unresolved(if *rms {
            format!("i_rms[{}]", x)
        } else {
            format!("i[{}]", x)
        })),
        Expr::Neg(inner) => Ok(-eval(inner, scope, resolving)?),
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, scope, resolving)?;
            let r = eval(rhs, scope, resolving)?;
            Ok(match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                BinaryOp::Pow => l.powf(r),
            })
        }
        Expr::Call(name, args) => {
            let values = args
                .iter()
                .map(|a| eval(a, scope, resolving))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, &values)
        }
        Expr::Conditional(cond, then_branch, else_branch) => {
            let lhs = eval(&cond.lhs, scope, resolving)?;
            let holds = match &cond.comparison {
                Some((op, rhs)) => op.apply(lhs, eval(rhs, scope, resolving)?),
                None => lhs != 0.0,
            };
            if holds {
                eval(then_branch, scope, resolving)
            } else {
                eval(else_branch, scope, resolving)
            }
        }
    }
}

fn resolve(name: &str, scope: &Scope, resolving: &mut Vec<String>) -> Result<f64, ExpressionError> {
    match scope.lookup(name) {
        Some(ParamValue::Number(n)) => Ok(*n),
        Some(ParamValue::Expr(text)) => {
            if resolving.iter().any(|n| n == name) {
                return Err(ExpressionError::Cycle(name.to_string()));
            }
            resolving.push(name.to_string());
            let result = parse(text).and_then(|ast| eval(&ast, scope, resolving));
            resolving.pop();
            result
        }
        None => Err(ExpressionError::Unresolved(name.to_string())),
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, ExpressionError> {
    let first = args.first().copied().unwrap_or(f64::NAN);
    let value = match name {
        "min" => args.iter().copied().fold(f64::INFINITY, f64::min),
        "max" => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        "abs" => first.abs(),
        "sqrt" => first.sqrt(),
        "exp" => first.exp(),
        "log" => first.ln(),
        "log10" => first.log10(),
        "sin" => first.sin(),
        "cos" => first.cos(),
        "tan" => first.tan(),
        "pow" => first.powf(args.get(1).copied().unwrap_or(f64::NAN)),
        other => return Err(ExpressionError::UnknownFunction(other.to_string())),
    };
    Ok(value)
}

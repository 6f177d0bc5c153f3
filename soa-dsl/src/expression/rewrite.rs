//! Text-level rewrites. These never evaluate anything: the output keeps the
//! user's spelling except for the tokens being translated.

use crate::expression::ExpressionError;
use crate::parser::schema::{format_number, ParamValue};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:if|then|else)\b").expect("valid regex"));
static DEVICE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));
static VOLTAGE_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bv\[\s*([A-Za-z0-9_]+)\s*,\s*([A-Za-z0-9_]+)\s*\]").expect("valid regex")
});
static VOLTAGE_NODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bv\[\s*([A-Za-z0-9_]+)\s*\]").expect("valid regex"));
static CURRENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bi\[\s*([A-Za-z0-9_]+)\s*\]").expect("valid regex"));
static TEMPERATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bT\b").expect("valid regex"));
/// Electrical references first so their node names are never treated as
/// identifiers, then `$` markers, then bare identifiers.
static WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:v|i|i_rms)\[[^\]]*\]|\$[A-Za-z_][A-Za-z0-9_]*|\b[A-Za-z_][A-Za-z0-9_]*")
        .expect("valid regex")
});

/// The three parts of an `if C then A else B` expression, as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditional {
    pub condition: String,
    pub then_value: String,
    pub else_value: String,
}

/// Split a conditional into its parts. This is the only operation where a
/// malformed conditional is reported instead of passed through.
///
/// Nested conditionals are matched by depth: each inner `if` owns the next
/// `else`, so `if a then if b then 1 else 2 else 3` splits at the last `else`.
pub fn parse_conditional(expr: &str) -> Result<Conditional, ExpressionError> {
    let invalid = || ExpressionError::InvalidConditional(expr.to_string());
    let text = expr.trim();

    let mut keywords = KEYWORD.find_iter(text);
    let opening = keywords.next().ok_or_else(invalid)?;
    if opening.start() != 0 || !opening.as_str().eq_ignore_ascii_case("if") {
        return Err(invalid());
    }

    let mut depth = 0usize;
    let mut then_at: Option<(usize, usize)> = None;
    let mut else_at: Option<(usize, usize)> = None;
    for m in keywords {
        let word = m.as_str().to_ascii_lowercase();
        match word.as_str() {
            "if" => depth += 1,
            "then" if depth == 0 && then_at.is_none() => then_at = Some((m.start(), m.end())),
            "else" if depth == 0 => {
                if then_at.is_some() {
                    else_at = Some((m.start(), m.end()));
                }
                break;
            }
            "else" => depth -= 1,
            _ => {}
        }
    }

    let ((then_start, then_end), (else_start, else_end)) =
        then_at.zip(else_at).ok_or_else(invalid)?;
    let condition = text[opening.end()..then_start].trim();
    let then_value = text[then_end..else_start].trim();
    let else_value = text[else_end..].trim();
    if condition.is_empty() || then_value.is_empty() || else_value.is_empty() {
        return Err(invalid());
    }

    Ok(Conditional {
        condition: condition.to_string(),
        then_value: then_value.to_string(),
        else_value: else_value.to_string(),
    })
}

/// Translate DSL syntax into Spectre expression syntax.
pub fn to_backend_syntax(expr: &str) -> String {
    let mut result = expr.to_string();

    if let Ok(cond) = parse_conditional(&result) {
        result = format!(
            "({}) ? {} : {}",
            cond.condition,
            to_backend_syntax(&cond.then_value),
            to_backend_syntax(&cond.else_value)
        );
    }

    let result = DEVICE_PARAM.replace_all(&result, "$1");
    let result = VOLTAGE_PAIR.replace_all(&result, "V($1,$2)");
    let result = VOLTAGE_NODE.replace_all(&result, "V($1)");
    let result = CURRENT.replace_all(&result, "I($1)");
    let result = TEMPERATURE.replace_all(&result, "temp");
    result.into_owned()
}

/// Replace known global identifiers with their values. Expression-valued
/// globals are parenthesized so precedence survives the substitution.
pub fn substitute_globals(expr: &str, globals: &BTreeMap<String, ParamValue>) -> String {
    WORD.replace_all(expr, |caps: &Captures| {
        let word = &caps[0];
        if word.starts_with('$') || word.contains('[') {
            return word.to_string();
        }
        match globals.get(word) {
            Some(ParamValue::Number(n)) => format_number(*n),
            Some(ParamValue::Expr(s)) => format!("({})", s),
            None => word.to_string(),
        }
    })
    .into_owned()
}

/// Bare identifiers in order of first appearance, skipping electrical
/// references and device-parameter markers.
pub fn free_identifiers(expr: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in WORD.find_iter(expr) {
        let word = m.as_str();
        if word.starts_with('$') || word.contains('[') {
            continue;
        }
        if !out.iter().any(|w| w == word) {
            out.push(word.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditional_rewrite() {
        assert_eq!(
            to_backend_syntax("if vgs > vth then 1.2 else 0.9"),
            "(vgs > vth) ? 1.2 : 0.9"
        );
    }

    #[test]
    fn test_nested_conditional_rewrite() {
        assert_eq!(
            to_backend_syntax("if a > 1 then 2 else if a > 0 then 1 else 0"),
            "(a > 1) ? 2 : (a > 0) ? 1 : 0"
        );
    }

    #[test]
    fn test_conditional_in_then_branch() {
        let cond = parse_conditional("if a then if b then 1 else 2 else 3").unwrap();
        assert_eq!(cond.condition, "a");
        assert_eq!(cond.then_value, "if b then 1 else 2");
        assert_eq!(cond.else_value, "3");
        assert_eq!(
            to_backend_syntax("if a then if b then 1 else 2 else 3"),
            "(a) ? (b) ? 1 : 2 : 3"
        );
    }

    #[test]
    fn test_keywords_inside_identifiers() {
        let cond = parse_conditional("IF iffy > 0 Then else_v else thenx").unwrap();
        assert_eq!(cond.condition, "iffy > 0");
        assert_eq!(cond.then_value, "else_v");
        assert_eq!(cond.else_value, "thenx");
    }

    #[test]
    fn test_reference_rewrites() {
        assert_eq!(to_backend_syntax("$w"), "w");
        assert_eq!(to_backend_syntax("v[d,s]"), "V(d,s)");
        assert_eq!(to_backend_syntax("v[g]"), "V(g)");
        assert_eq!(to_backend_syntax("i[r1]"), "I(r1)");
        assert_eq!(to_backend_syntax("1.2 - 0.002 * (T - 25)"), "1.2 - 0.002 * (temp - 25)");
        assert_eq!(to_backend_syntax("$w * 1e-3 / $l"), "w * 1e-3 / l");
    }

    #[test]
    fn test_malformed_conditional() {
        assert!(matches!(
            parse_conditional("if a then b"),
            Err(ExpressionError::InvalidConditional(_))
        ));
        // Malformed conditionals pass through the rewrite untouched.
        assert_eq!(to_backend_syntax("if a then b"), "if a then b");
    }

    #[test]
    fn test_substitute_globals() {
        let mut globals = BTreeMap::new();
        globals.insert("vmax".to_string(), ParamValue::Number(1.2));
        globals.insert("d".to_string(), ParamValue::Number(9.0));
        globals.insert("vref".to_string(), ParamValue::expr("vmax * 0.5"));
        assert_eq!(
            substitute_globals("vmax * 1.1 + v[d,s] + $vmax + vref", &globals),
            "1.2 * 1.1 + v[d,s] + $vmax + (vmax * 0.5)"
        );
    }

    #[test]
    fn test_free_identifiers() {
        assert_eq!(
            free_identifiers("max(vmax, $w * k) + v[d,s] - vmax * T"),
            vec!["max", "vmax", "k", "T"]
        );
        assert!(free_identifiers("1e-3 * 2").is_empty());
    }
}

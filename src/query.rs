//! Filter predicate DSL: `field,op,value` or inline `field<op>value`, e.g. `id,<,10500` / `score>=3`.

use crate::error::{ConvectorError, ConvectorResult};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

fn inline_re() -> &'static Regex {
    static INLINE_RE: OnceLock<Regex> = OnceLock::new();
    INLINE_RE.get_or_init(|| {
        Regex::new(r"^\s*([^<>=!]+?)\s*([<>=!]+)\s*(.*?)\s*$").expect("valid inline filter regex")
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Ge),
            "=" => Some(Operator::Eq),
            "!=" => Some(Operator::Ne),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "=",
            Operator::Ne => "!=",
        }
    }

    /// `<`, `<=`, `>`, `>=` only make sense on numbers.
    pub fn is_ordering(self) -> bool {
        !matches!(self, Operator::Eq | Operator::Ne)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed `field op value` condition.
#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: Operator,
    pub value: String,
    /// `value` parsed as a number, when it is one.
    pub number: Option<f64>,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.field, self.op, self.value)
    }
}

pub(crate) fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn is_operator_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| matches!(c, '<' | '>' | '=' | '!'))
}

/// Parse one predicate spec. Unknown operators and ordering on non-numeric literals are rejected
/// here, before any record flows.
pub fn parse_predicate(spec: &str) -> ConvectorResult<Predicate> {
    let parts: Vec<&str> = spec.splitn(3, ',').collect();
    let (field, op_token, value) = if parts.len() == 3 && is_operator_token(parts[1].trim()) {
        (parts[0].trim(), parts[1].trim(), parts[2].trim())
    } else if let Some(caps) = inline_re().captures(spec) {
        let get = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("");
        (get(1), get(2), get(3))
    } else {
        return Err(ConvectorError::configuration(format!(
            "cannot parse filter '{spec}' (expected 'field,op,value' or 'field<op>value')"
        )));
    };

    if field.is_empty() {
        return Err(ConvectorError::configuration(format!("filter '{spec}' has no field name")));
    }
    let op = Operator::parse(op_token).ok_or_else(|| {
        ConvectorError::configuration(format!(
            "unknown operator '{op_token}' in filter '{spec}' (supported: <, <=, >, >=, =, !=)"
        ))
    })?;
    let number = parse_number(value);
    if op.is_ordering() && number.is_none() {
        return Err(ConvectorError::FilterType { predicate: spec.to_string(), value: value.to_string() });
    }

    Ok(Predicate { field: field.to_string(), op, value: value.to_string(), number })
}

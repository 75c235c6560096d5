//! Filter engine: compile predicate specs against a source's resolved fields, then keep/drop
//! canonical records. Predicates combine with logical AND.

use crate::error::{ConvectorError, ConvectorResult};
use crate::mapper::FieldRoleMap;
use crate::query::{parse_number, parse_predicate, Operator, Predicate};
use crate::record::{value_text, CanonicalRecord, FieldRef, CANONICAL_FIELDS};
use ahash::AHashSet;
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

#[derive(Clone, Debug, Default)]
pub struct CompiledFilter {
    predicates: Vec<Predicate>,
}

impl CompiledFilter {
    /// Parse every spec and check each field against the canonical names plus the retained set.
    pub fn compile<S: AsRef<str>>(specs: &[S], map: &FieldRoleMap) -> ConvectorResult<Self> {
        let mut known: AHashSet<&str> = CANONICAL_FIELDS.iter().copied().collect();
        known.extend(map.retained().iter().map(String::as_str));

        let mut predicates = Vec::with_capacity(specs.len());
        for spec in specs {
            let p = parse_predicate(spec.as_ref())?;
            if !known.contains(p.field.as_str()) {
                let mut names: Vec<&str> = known.iter().copied().collect();
                names.sort_unstable();
                return Err(ConvectorError::configuration(format!(
                    "filter '{}' references unknown field '{}' (known: {})",
                    spec.as_ref(),
                    p.field,
                    names.join(", ")
                )));
            }
            predicates.push(p);
        }
        Ok(Self { predicates })
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// True when the record passes every predicate.
    pub fn matches(&self, rec: &CanonicalRecord) -> bool {
        self.predicates.iter().all(|p| evaluate(p, rec))
    }
}

fn evaluate(p: &Predicate, rec: &CanonicalRecord) -> bool {
    let (text, number): (Cow<'_, str>, Option<f64>) = match rec.field(&p.field) {
        Some(FieldRef::Text(s)) => (Cow::Borrowed(s), parse_number(s)),
        Some(FieldRef::Value(Value::Number(n))) => (Cow::Owned(n.to_string()), n.as_f64()),
        Some(FieldRef::Value(Value::String(s))) => (Cow::Borrowed(s.as_str()), parse_number(s)),
        Some(FieldRef::Value(other)) => (Cow::Owned(value_text(other)), None),
        None => (Cow::Borrowed(""), None),
    };

    match (number, p.number) {
        (Some(lhs), Some(rhs)) => match lhs.partial_cmp(&rhs) {
            Some(ord) => holds(p.op, ord),
            None => false,
        },
        // a numeric literal against a non-numeric value can't be ordered
        _ if p.op.is_ordering() => false,
        _ => holds(p.op, text.as_ref().cmp(p.value.as_str())),
    }
}

fn holds(op: Operator, ord: Ordering) -> bool {
    match op {
        Operator::Lt => ord == Ordering::Less,
        Operator::Le => ord != Ordering::Greater,
        Operator::Gt => ord == Ordering::Greater,
        Operator::Ge => ord != Ordering::Less,
        Operator::Eq => ord == Ordering::Equal,
        Operator::Ne => ord != Ordering::Equal,
    }
}

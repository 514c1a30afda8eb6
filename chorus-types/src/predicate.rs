//! Predicate algebra (C2/§4.2) — composable boolean tests over a connection's
//! session attributes.
//!
//! Evaluation goes through [`AttributeSource`] rather than a concrete
//! `Connection` type, so this crate never depends on `chorus-net` — the
//! dependency points the other way (`chorus-net::Connection` implements
//! `AttributeSource`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Read-only view over a connection's session attributes, as seen by a
/// predicate. A missing attribute is not an error — predicates treat it as
/// absent (`Has` returns false, `Is` returns false).
pub trait AttributeSource {
    fn attr(&self, key: &str) -> Option<Value>;
}

/// A composable, side-effect-free boolean test over session attributes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Truthiness of `attrs[attr]`. Missing attribute evaluates to `false`.
    Is(String),
    /// Whether `attr` is present on the connection at all.
    Has(String),
    /// `attrs[attr] == value`. Missing attribute evaluates to `false`.
    IsEqual(String, Value),
    /// True if any child predicate is true (short-circuits on first `true`).
    Any(Vec<Predicate>),
    /// True if every child predicate is true (short-circuits on first `false`).
    All(Vec<Predicate>),
    /// Logical negation.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Evaluate this predicate against `attrs`. Never mutates `attrs` and
    /// never panics — an absent attribute simply reads as `false`/`None`.
    pub fn eval(&self, attrs: &dyn AttributeSource) -> bool {
        match self {
            Predicate::Is(attr) => attrs.attr(attr).map(is_truthy).unwrap_or(false),
            Predicate::Has(attr) => attrs.attr(attr).is_some(),
            Predicate::IsEqual(attr, value) => attrs.attr(attr).as_ref() == Some(value),
            Predicate::Any(preds) => preds.iter().any(|p| p.eval(attrs)),
            Predicate::All(preds) => preds.iter().all(|p| p.eval(attrs)),
            Predicate::Not(p) => !p.eval(attrs),
        }
    }

    pub fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

fn is_truthy(value: Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

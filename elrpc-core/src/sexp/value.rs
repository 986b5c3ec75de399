use std::fmt;
use std::num::IntErrorKind;

use thiserror::Error;

use super::ast::SExp;

/// Host-side value, the decoded form of an S-expression.
///
/// Sequence nodes apply homogeneity inference on construction: a list
/// mixing integers and floats is promoted to all-floats, everything else
/// keeps its per-element types.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// The string content when the value is a string, its display form
    /// otherwise. Used to surface remote error payloads as messages.
    pub fn into_message(self) -> String {
        match self {
            Value::String(s) => s,
            other => other.to_string(),
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(true) => write!(f, "t"),
            Value::Bool(false) => write!(f, "nil"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::List(elements) => {
                write!(f, "[")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Value {
        Value::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Value {
        match v {
            Some(inner) => inner.into(),
            None => Value::Nil,
        }
    }
}

impl SExp {
    /// Bridge the AST node to a host value.
    ///
    /// The symbol `t` becomes boolean true and `nil` becomes `Nil`;
    /// chars, strings and other symbols all become strings. Dotted pairs
    /// and improper lists flatten into plain sequences, and the
    /// quote/quasiquote/unquote wrappers are stripped.
    pub fn to_value(&self) -> Value {
        match self {
            SExp::Nil => Value::Nil,
            SExp::Int(lit) => Value::Int(parse_int_literal(lit)),
            SExp::Float(lit) => Value::Float(lit.parse().unwrap_or(f64::NAN)),
            SExp::Char(lit) => Value::String(char_content(lit)),
            SExp::String(s) => Value::String(s.clone()),
            SExp::Symbol(name) => match name.as_str() {
                "t" => Value::Bool(true),
                "nil" => Value::Nil,
                _ => Value::String(name.clone()),
            },
            SExp::Cons(car, cdr) => sequence_value(vec![car.to_value(), cdr.to_value()]),
            SExp::List(elements) => {
                sequence_value(elements.iter().map(|e| e.to_value()).collect())
            }
            SExp::ListDot(elements, last) => {
                let mut values: Vec<Value> = elements.iter().map(|e| e.to_value()).collect();
                values.push(last.to_value());
                sequence_value(values)
            }
            SExp::Vector(elements) => {
                sequence_value(elements.iter().map(|e| e.to_value()).collect())
            }
            SExp::Quoted { inner, .. } => inner.to_value(),
            SExp::QuasiQuoted(inner) => inner.to_value(),
            SExp::Unquote { inner, .. } => inner.to_value(),
            // wrappers carry opaque pre-encoded text, there is nothing to bridge
            SExp::Wrapper(_) => Value::Nil,
        }
    }
}

// Out-of-range literals saturate; the AST still holds the exact text.
fn parse_int_literal(lit: &str) -> i64 {
    match lit.parse::<i64>() {
        Ok(v) => v,
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => i64::MAX,
            IntErrorKind::NegOverflow => i64::MIN,
            _ => 0,
        },
    }
}

fn char_content(lit: &str) -> String {
    let mut chars = lit.chars();
    match chars.next() {
        Some('\\') => match chars.next() {
            Some('n') => "\n".to_string(),
            Some('t') => "\t".to_string(),
            Some('r') => "\r".to_string(),
            Some(c) => c.to_string(),
            None => String::new(),
        },
        Some(c) => c.to_string(),
        None => String::new(),
    }
}

// Homogeneity inference over a freshly built sequence: ints mixed with
// floats promote to floats, any other mixture stays untouched.
fn sequence_value(elements: Vec<Value>) -> Value {
    let mut saw_float = false;
    let mut all_numeric = true;
    for v in &elements {
        match v {
            Value::Int(_) => {}
            Value::Float(_) => saw_float = true,
            _ => all_numeric = false,
        }
    }
    if all_numeric && saw_float {
        let promoted = elements
            .into_iter()
            .map(|v| match v {
                Value::Int(i) => Value::Float(i as f64),
                other => other,
            })
            .collect();
        return Value::List(promoted);
    }
    Value::List(elements)
}

/// Declared shape of one method parameter, used for argument coercion at
/// dispatch time.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    /// Accepts any decoded value unchanged.
    Any,
    Bool,
    Int,
    Float,
    Str,
    /// A sequence whose elements coerce to the given type.
    List(Box<ParamType>),
}

impl ParamType {
    pub fn list(element: ParamType) -> ParamType {
        ParamType::List(Box::new(element))
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Any => write!(f, "any"),
            ParamType::Bool => write!(f, "bool"),
            ParamType::Int => write!(f, "int"),
            ParamType::Float => write!(f, "float"),
            ParamType::Str => write!(f, "string"),
            ParamType::List(inner) => write!(f, "[]{}", inner),
        }
    }
}

/// A decoded argument did not fit the declared parameter type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("can not convert type: [{value}] : type[{from}] -> type[{to}]")]
pub struct CoerceError {
    pub value: String,
    pub from: String,
    pub to: String,
}

fn mismatch(value: &Value, ty: &ParamType) -> CoerceError {
    CoerceError {
        value: value.to_string(),
        from: value.kind_name().to_string(),
        to: ty.to_string(),
    }
}

/// Coerce a decoded value to a declared parameter type. Numeric kinds
/// convert into each other, `nil` reads as the empty sequence or as
/// boolean false, sequences coerce element-wise.
pub fn coerce(value: Value, ty: &ParamType) -> Result<Value, CoerceError> {
    match ty {
        ParamType::Any => Ok(value),
        ParamType::Int => match value {
            Value::Int(_) => Ok(value),
            Value::Float(f) => Ok(Value::Int(f as i64)),
            other => Err(mismatch(&other, ty)),
        },
        ParamType::Float => match value {
            Value::Float(_) => Ok(value),
            Value::Int(i) => Ok(Value::Float(i as f64)),
            other => Err(mismatch(&other, ty)),
        },
        ParamType::Str => match value {
            Value::String(_) => Ok(value),
            other => Err(mismatch(&other, ty)),
        },
        ParamType::Bool => match value {
            Value::Bool(_) => Ok(value),
            Value::Nil => Ok(Value::Bool(false)),
            // anything non-nil is truthy
            _ => Ok(Value::Bool(true)),
        },
        ParamType::List(element) => match value {
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(coerce(item, element)?);
                }
                Ok(Value::List(out))
            }
            Value::Nil => Ok(Value::List(Vec::new())),
            other => Err(mismatch(&other, ty)),
        },
    }
}

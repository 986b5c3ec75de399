// The S-expression codec: Emacs-Lisp reader subset in, host values out,
// and back again.

pub mod ast;
pub mod encode;
pub mod lexer;
pub mod parser;
pub mod value;

use parser::ParseError;
use value::Value;

/// Parse a source string and bridge every top-level form to a host value.
pub fn decode(src: &str) -> Result<Vec<Value>, ParseError> {
    let forms = parser::parse(src)?;
    Ok(forms.iter().map(|s| s.to_value()).collect())
}

/// Parse a source string and bridge the first top-level form, `Nil` when
/// the input holds no forms at all.
pub fn decode1(src: &str) -> Result<Value, ParseError> {
    let forms = parser::parse(src)?;
    Ok(forms.first().map(|s| s.to_value()).unwrap_or(Value::Nil))
}

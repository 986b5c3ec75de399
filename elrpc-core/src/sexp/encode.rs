// Host-value serialization to S-expression text. Dispatch is an open
// trait with per-type implementations; unrepresentable host types carry
// explicit implementations that fail with their type name so the error
// surfaces before any frame is built.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use crate::error::EncodeError;
use crate::sexp::value::Value;

/// A host value with an S-expression form.
pub trait ToSexp {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError>;
}

/// Serialize a host value to S-expression text.
pub fn encode<T: ToSexp + ?Sized>(value: &T) -> Result<String, EncodeError> {
    let mut out = String::new();
    value.encode_sexp(&mut out)?;
    Ok(out)
}

/// Quote string content: `\n \r \t \" \\` are escaped, other control
/// bytes are dropped, astral codepoints are written as `\U000xxxxx`.
pub fn string_literal(content: &str) -> String {
    let mut buf = String::with_capacity(content.len() + 2);
    buf.push('"');
    for c in content.chars() {
        match c {
            '\\' | '"' => {
                buf.push('\\');
                buf.push(c);
            }
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            c if (c as u32) < 0x20 => {}
            c if (c as u32) >= 0x10000 => {
                let _ = write!(buf, "\\U000{:x}", c as u32);
            }
            c => buf.push(c),
        }
    }
    buf.push('"');
    buf
}

/// Quote a symbol name: backslash, double quote, question mark and space
/// are escaped, other control bytes are dropped. No surrounding quotes.
pub fn symbol_literal(name: &str) -> String {
    let mut buf = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '\\' | '"' | '?' | ' ' => {
                buf.push('\\');
                buf.push(c);
            }
            c if (c as u32) < 0x20 => {}
            c => buf.push(c),
        }
    }
    buf
}

/// Encode named fields as an association list in the given order, with
/// symbol keys: `((name1 . v1) (name2 . v2))`.
pub fn encode_record(fields: &[(&str, &dyn ToSexp)]) -> Result<String, EncodeError> {
    let mut out = String::new();
    out.push('(');
    for (i, (name, value)) in fields.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push('(');
        out.push_str(&symbol_literal(name));
        out.push_str(" . ");
        value.encode_sexp(&mut out)?;
        out.push(')');
    }
    out.push(')');
    Ok(out)
}

impl ToSexp for bool {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        out.push_str(if *self { "t" } else { "nil" });
        Ok(())
    }
}

macro_rules! impl_to_sexp_display_num {
    ($($ty:ty)*) => {
        $(
            impl ToSexp for $ty {
                fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
                    let _ = write!(out, "{}", self);
                    Ok(())
                }
            }
        )*
    };
}

impl_to_sexp_display_num!(i8 i16 i32 i64 isize u8 u16 u32 u64 usize);

impl ToSexp for f64 {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        encode_float(*self, out)
    }
}

impl ToSexp for f32 {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        if self.is_nan() || self.is_infinite() {
            return Err(unsupported_float(*self as f64));
        }
        let _ = write!(out, "{}", self);
        Ok(())
    }
}

fn unsupported_float(f: f64) -> EncodeError {
    let shown = if f.is_nan() {
        "NaN".to_string()
    } else if f > 0.0 {
        "+Inf".to_string()
    } else {
        "-Inf".to_string()
    };
    EncodeError::UnsupportedValue(shown)
}

fn encode_float(f: f64, out: &mut String) -> Result<(), EncodeError> {
    if f.is_nan() || f.is_infinite() {
        return Err(unsupported_float(f));
    }
    let _ = write!(out, "{}", f);
    Ok(())
}

impl ToSexp for str {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        out.push_str(&string_literal(self));
        Ok(())
    }
}

impl ToSexp for String {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        self.as_str().encode_sexp(out)
    }
}

impl ToSexp for char {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        let mut tmp = [0u8; 4];
        self.encode_utf8(&mut tmp).encode_sexp(out)
    }
}

impl<T: ToSexp + ?Sized> ToSexp for &T {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        (**self).encode_sexp(out)
    }
}

impl<T: ToSexp> ToSexp for Box<T> {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        (**self).encode_sexp(out)
    }
}

impl<T: ToSexp> ToSexp for Option<T> {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        match self {
            Some(inner) => inner.encode_sexp(out),
            None => {
                out.push_str("nil");
                Ok(())
            }
        }
    }
}

// An empty sequence has no representation distinct from absence, so it
// encodes as nil.
impl<T: ToSexp> ToSexp for [T] {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        if self.is_empty() {
            out.push_str("nil");
            return Ok(());
        }
        out.push('(');
        for (i, e) in self.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            e.encode_sexp(out)?;
        }
        out.push(')');
        Ok(())
    }
}

impl<T: ToSexp> ToSexp for Vec<T> {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        self.as_slice().encode_sexp(out)
    }
}

impl<T: ToSexp, const N: usize> ToSexp for [T; N] {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        self.as_slice().encode_sexp(out)
    }
}

fn encode_pairs<'a, T: ToSexp + 'a>(
    pairs: impl Iterator<Item = (&'a String, &'a T)>,
    len: usize,
    out: &mut String,
) -> Result<(), EncodeError> {
    if len == 0 {
        out.push_str("nil");
        return Ok(());
    }
    out.push('(');
    for (i, (key, value)) in pairs.enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push('(');
        out.push_str(&string_literal(key));
        out.push_str(" . ");
        value.encode_sexp(out)?;
        out.push(')');
    }
    out.push(')');
    Ok(())
}

impl<T: ToSexp> ToSexp for BTreeMap<String, T> {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        encode_pairs(self.iter(), self.len(), out)
    }
}

// HashMap keys are sorted before emission so the output is stable.
impl<T: ToSexp> ToSexp for HashMap<String, T> {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        let mut pairs: Vec<(&String, &T)> = self.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        encode_pairs(pairs.into_iter(), self.len(), out)
    }
}

impl ToSexp for Value {
    fn encode_sexp(&self, out: &mut String) -> Result<(), EncodeError> {
        match self {
            Value::Nil => {
                out.push_str("nil");
                Ok(())
            }
            Value::Bool(b) => b.encode_sexp(out),
            Value::Int(i) => i.encode_sexp(out),
            Value::Float(f) => encode_float(*f, out),
            Value::String(s) => s.as_str().encode_sexp(out),
            Value::List(elements) => elements.as_slice().encode_sexp(out),
        }
    }
}

// Channel endpoints are the canonical unencodable host resource; the
// explicit implementations make the failure carry the concrete type name.
impl<T> ToSexp for std::sync::mpsc::Sender<T> {
    fn encode_sexp(&self, _out: &mut String) -> Result<(), EncodeError> {
        Err(EncodeError::UnsupportedType(std::any::type_name::<Self>()))
    }
}

impl<T> ToSexp for std::sync::mpsc::Receiver<T> {
    fn encode_sexp(&self, _out: &mut String) -> Result<(), EncodeError> {
        Err(EncodeError::UnsupportedType(std::any::type_name::<Self>()))
    }
}

/// Argument tuple of an outgoing `call` frame, rendered as one
/// space-separated list.
pub trait CallArgs {
    fn encode_args(&self) -> Result<String, EncodeError>;
}

impl CallArgs for () {
    fn encode_args(&self) -> Result<String, EncodeError> {
        Ok("nil".to_string())
    }
}

impl CallArgs for Vec<Value> {
    fn encode_args(&self) -> Result<String, EncodeError> {
        self.as_slice().encode_args()
    }
}

impl CallArgs for &[Value] {
    fn encode_args(&self) -> Result<String, EncodeError> {
        if self.is_empty() {
            return Ok("nil".to_string());
        }
        let mut out = String::new();
        out.push('(');
        for (i, v) in self.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            v.encode_sexp(&mut out)?;
        }
        out.push(')');
        Ok(out)
    }
}

macro_rules! impl_call_args_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: ToSexp),+> CallArgs for ($($name,)+) {
            fn encode_args(&self) -> Result<String, EncodeError> {
                let mut out = String::new();
                out.push('(');
                let mut first = true;
                $(
                    if !first {
                        out.push(' ');
                    }
                    first = false;
                    self.$idx.encode_sexp(&mut out)?;
                )+
                let _ = first;
                out.push(')');
                Ok(out)
            }
        }
    };
}

impl_call_args_tuple!(A: 0);
impl_call_args_tuple!(A: 0, B: 1);
impl_call_args_tuple!(A: 0, B: 1, C: 2);
impl_call_args_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_call_args_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_call_args_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_call_args_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_call_args_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

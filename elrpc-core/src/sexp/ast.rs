use super::encode::{string_literal, symbol_literal};

/// One S-expression AST node.
///
/// Every variant except `Wrapper` is produced by the parser and can be
/// re-emitted with [`SExp::to_sexp_string`]; the round trip is stable up
/// to whitespace. `Wrapper` splices already-encoded payload text into a
/// frame and never comes out of the parser.
///
/// `Int` and `Float` keep the exact source literal; numeric conversion
/// happens lazily at the value boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum SExp {
    Nil,
    Int(String),
    Float(String),
    /// One logical character, stored without the leading `?` and with a
    /// possible escaping backslash (`\n`, `\(`, ...).
    Char(String),
    /// Decoded string content, stored without the surrounding quotes.
    String(String),
    /// Decoded symbol name (input backslash escapes already resolved).
    Symbol(String),
    /// Dotted pair `(a . b)`.
    Cons(Box<SExp>, Box<SExp>),
    /// Proper list `(a b c)`. The empty list parses as `Nil`, not as an
    /// empty `List`.
    List(Vec<SExp>),
    /// Improper list `(a b . c)` with at least two leading elements.
    ListDot(Vec<SExp>, Box<SExp>),
    /// Vector literal `[a b c]`.
    Vector(Vec<SExp>),
    /// `'x`, or `#'x` when `function` is set.
    Quoted { inner: Box<SExp>, function: bool },
    /// `` `x ``.
    QuasiQuoted(Box<SExp>),
    /// `,x`, or `,@x` when `splice` is set.
    Unquote { inner: Box<SExp>, splice: bool },
    /// Pre-encoded payload text, emitted verbatim.
    Wrapper(String),
}

impl SExp {
    pub fn int(literal: impl Into<String>) -> SExp {
        SExp::Int(literal.into())
    }

    pub fn symbol(name: impl Into<String>) -> SExp {
        SExp::Symbol(name.into())
    }

    pub fn string(content: impl Into<String>) -> SExp {
        SExp::String(content.into())
    }

    pub fn list(elements: Vec<SExp>) -> SExp {
        SExp::List(elements)
    }

    pub fn wrapper(encoded: impl Into<String>) -> SExp {
        SExp::Wrapper(encoded.into())
    }

    /// Render the node back to surface syntax.
    pub fn to_sexp_string(&self) -> String {
        let mut out = String::new();
        self.write_sexp(&mut out);
        out
    }

    fn write_sexp(&self, out: &mut String) {
        match self {
            SExp::Nil => out.push_str("nil"),
            SExp::Int(lit) | SExp::Float(lit) => out.push_str(lit),
            SExp::Char(lit) => {
                out.push('?');
                out.push_str(lit);
            }
            SExp::String(content) => out.push_str(&string_literal(content)),
            SExp::Symbol(name) => out.push_str(&symbol_literal(name)),
            SExp::Cons(car, cdr) => {
                out.push('(');
                car.write_sexp(out);
                out.push_str(" . ");
                cdr.write_sexp(out);
                out.push(')');
            }
            SExp::List(elements) => {
                out.push('(');
                write_seq(out, elements);
                out.push(')');
            }
            SExp::ListDot(elements, last) => {
                out.push('(');
                write_seq(out, elements);
                out.push_str(" . ");
                last.write_sexp(out);
                out.push(')');
            }
            SExp::Vector(elements) => {
                out.push('[');
                write_seq(out, elements);
                out.push(']');
            }
            SExp::Quoted { inner, function } => {
                out.push_str(if *function { "#'" } else { "'" });
                inner.write_sexp(out);
            }
            SExp::QuasiQuoted(inner) => {
                out.push('`');
                inner.write_sexp(out);
            }
            SExp::Unquote { inner, splice } => {
                out.push_str(if *splice { ",@" } else { "," });
                inner.write_sexp(out);
            }
            SExp::Wrapper(encoded) => out.push_str(encoded),
        }
    }
}

fn write_seq(out: &mut String, elements: &[SExp]) {
    for (i, e) in elements.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        e.write_sexp(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atoms_render_back_to_source() {
        assert_eq!(SExp::Nil.to_sexp_string(), "nil");
        assert_eq!(SExp::int("-12").to_sexp_string(), "-12");
        assert_eq!(SExp::Float("3.4e+4".into()).to_sexp_string(), "3.4e+4");
        assert_eq!(SExp::Char("x".into()).to_sexp_string(), "?x");
        assert_eq!(SExp::Char("\\n".into()).to_sexp_string(), "?\\n");
        assert_eq!(SExp::string("he said \"hi\"").to_sexp_string(), "\"he said \\\"hi\\\"\"");
        assert_eq!(SExp::symbol("a b").to_sexp_string(), "a\\ b");
    }

    #[test]
    fn compound_forms_render_back_to_source() {
        let cons = SExp::Cons(Box::new(SExp::int("1")), Box::new(SExp::int("2")));
        assert_eq!(cons.to_sexp_string(), "(1 . 2)");

        let dotted = SExp::ListDot(
            vec![SExp::int("1"), SExp::int("2")],
            Box::new(SExp::int("3")),
        );
        assert_eq!(dotted.to_sexp_string(), "(1 2 . 3)");

        let vector = SExp::Vector(vec![SExp::int("1"), SExp::int("2")]);
        assert_eq!(vector.to_sexp_string(), "[1 2]");

        let quoted = SExp::Quoted {
            inner: Box::new(SExp::symbol("f")),
            function: true,
        };
        assert_eq!(quoted.to_sexp_string(), "#'f");

        let unquote = SExp::Unquote {
            inner: Box::new(SExp::symbol("xs")),
            splice: true,
        };
        assert_eq!(
            SExp::QuasiQuoted(Box::new(SExp::list(vec![SExp::int("1"), unquote])))
                .to_sexp_string(),
            "`(1 ,@xs)"
        );
    }

    #[test]
    fn wrapper_is_spliced_verbatim() {
        let frame = SExp::list(vec![
            SExp::symbol("return"),
            SExp::int("7"),
            SExp::wrapper("(1 2 3)"),
        ]);
        assert_eq!(frame.to_sexp_string(), "(return 7 (1 2 3))");
    }
}

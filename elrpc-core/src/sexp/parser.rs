use thiserror::Error;

use super::ast::SExp;
use super::lexer::{Item, ItemKind, Lexer};

/// Position-annotated parse failure. `line` and `col` are 1-based;
/// `text` holds the offending source line with a caret under the column.
/// Parsing stops at the first error, no recovery is attempted.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{msg} (line {line}, column {col})")]
pub struct ParseError {
    pub msg: String,
    pub offset: usize,
    pub line: usize,
    pub col: usize,
    pub text: String,
}

impl ParseError {
    fn at(input: &str, offset: usize, msg: String) -> ParseError {
        let clamped = offset.min(input.len());
        let before = &input[..clamped];
        let line = 1 + before.matches('\n').count();
        let col = match before.rfind('\n') {
            Some(nl) => clamped - nl,
            None => clamped + 1,
        };
        let line_start = before.rfind('\n').map(|nl| nl + 1).unwrap_or(0);
        let line_end = input[clamped..]
            .find('\n')
            .map(|nl| clamped + nl)
            .unwrap_or(input.len());
        let mut text = input[line_start..line_end].to_string();
        text.push('\n');
        text.push_str(&" ".repeat(col.saturating_sub(1)));
        text.push('^');
        ParseError {
            msg,
            offset,
            line,
            col,
            text,
        }
    }
}

/// Parse a complete source string into its sequence of top-level forms.
pub fn parse(input: &str) -> Result<Vec<SExp>, ParseError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let item = lexer.next_item();
        match item.kind {
            ItemKind::Space | ItemKind::Comment => continue,
            ItemKind::Error => {
                return Err(ParseError::at(input, item.pos, item.text));
            }
            ItemKind::Eof => {
                tokens.push(item);
                break;
            }
            _ => tokens.push(item),
        }
    }
    Parser {
        input,
        tokens,
        idx: 0,
    }
    .program()
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Item>,
    idx: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Item {
        &self.tokens[self.idx]
    }

    fn bump(&mut self) -> Item {
        let item = self.tokens[self.idx].clone();
        if self.idx + 1 < self.tokens.len() {
            self.idx += 1;
        }
        item
    }

    fn unexpected(&self, item: &Item) -> ParseError {
        let what = match item.kind {
            ItemKind::Eof => "unexpected end of input".to_string(),
            _ => format!("unexpected {:?}", item.text),
        };
        ParseError::at(self.input, item.pos, format!("syntax error: {}", what))
    }

    fn program(mut self) -> Result<Vec<SExp>, ParseError> {
        let mut forms = Vec::new();
        while self.peek().kind != ItemKind::Eof {
            forms.push(self.expr()?);
        }
        Ok(forms)
    }

    fn expr(&mut self) -> Result<SExp, ParseError> {
        let item = self.peek().clone();
        match item.kind {
            ItemKind::Integer => {
                self.bump();
                Ok(SExp::Int(item.text))
            }
            ItemKind::Float => {
                self.bump();
                Ok(SExp::Float(item.text))
            }
            ItemKind::Symbol => {
                self.bump();
                Ok(SExp::Symbol(unescape_symbol(&item.text)))
            }
            ItemKind::String => {
                self.bump();
                let inner = &item.text[1..item.text.len() - 1];
                Ok(SExp::String(unescape_string(inner)))
            }
            ItemKind::CharLit => {
                self.bump();
                Ok(SExp::Char(item.text[1..].to_string()))
            }
            ItemKind::Char => match item.text.as_str() {
                "(" => self.list(),
                "[" => self.vector(),
                "'" => {
                    self.bump();
                    Ok(SExp::Quoted {
                        inner: Box::new(self.expr()?),
                        function: false,
                    })
                }
                "`" => {
                    self.bump();
                    Ok(SExp::QuasiQuoted(Box::new(self.expr()?)))
                }
                "," => {
                    self.bump();
                    let splice = self.peek().kind == ItemKind::Char && self.peek().text == "@";
                    if splice {
                        self.bump();
                    }
                    Ok(SExp::Unquote {
                        inner: Box::new(self.expr()?),
                        splice,
                    })
                }
                "#" => {
                    self.bump();
                    let quote = self.bump();
                    if quote.kind != ItemKind::Char || quote.text != "'" {
                        return Err(self.unexpected(&quote));
                    }
                    Ok(SExp::Quoted {
                        inner: Box::new(self.expr()?),
                        function: true,
                    })
                }
                _ => Err(self.unexpected(&item)),
            },
            _ => Err(self.unexpected(&item)),
        }
    }

    fn list(&mut self) -> Result<SExp, ParseError> {
        self.bump(); // "("
        if self.is_punct(")") {
            self.bump();
            return Ok(SExp::Nil);
        }
        let mut elements = Vec::new();
        loop {
            let item = self.peek().clone();
            match item.kind {
                ItemKind::Char if item.text == ")" => {
                    self.bump();
                    return Ok(SExp::List(elements));
                }
                ItemKind::Dot => {
                    self.bump();
                    let last = self.expr()?;
                    let close = self.bump();
                    if close.kind != ItemKind::Char || close.text != ")" {
                        return Err(self.unexpected(&close));
                    }
                    let mut elements = elements;
                    return match elements.pop() {
                        None => Err(self.unexpected(&item)),
                        Some(car) if elements.is_empty() => {
                            Ok(SExp::Cons(Box::new(car), Box::new(last)))
                        }
                        Some(car) => {
                            elements.push(car);
                            Ok(SExp::ListDot(elements, Box::new(last)))
                        }
                    };
                }
                ItemKind::Eof => return Err(self.unexpected(&item)),
                _ => elements.push(self.expr()?),
            }
        }
    }

    fn vector(&mut self) -> Result<SExp, ParseError> {
        self.bump(); // "["
        let mut elements = Vec::new();
        loop {
            let item = self.peek().clone();
            match item.kind {
                ItemKind::Char if item.text == "]" => {
                    self.bump();
                    return Ok(SExp::Vector(elements));
                }
                ItemKind::Eof => return Err(self.unexpected(&item)),
                _ => elements.push(self.expr()?),
            }
        }
    }

    fn is_punct(&self, text: &str) -> bool {
        let item = self.peek();
        item.kind == ItemKind::Char && item.text == text
    }
}

/// Resolve backslash escapes inside a symbol: the escaped character is
/// taken verbatim.
fn unescape_symbol(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Resolve string-literal escapes: `\n \r \t \" \\`, `\uXXXX`, and
/// `\U000xxxxx` for astral codepoints. Unknown escapes keep the escaped
/// character verbatim.
fn unescape_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => push_hex_escape(&mut out, &mut chars, 4),
            Some('U') => push_hex_escape(&mut out, &mut chars, 8),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn push_hex_escape(out: &mut String, chars: &mut std::iter::Peekable<std::str::Chars>, ndigits: usize) {
    let mut digits = String::with_capacity(ndigits);
    while digits.len() < ndigits {
        match chars.peek() {
            Some(c) if c.is_ascii_hexdigit() => {
                digits.push(*c);
                chars.next();
            }
            _ => break,
        }
    }
    if digits.len() == ndigits {
        if let Some(c) = u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
        {
            out.push(c);
            return;
        }
    }
    // not a well-formed escape, keep the text as written
    out.push(if ndigits == 4 { 'u' } else { 'U' });
    out.push_str(&digits);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse1(src: &str) -> SExp {
        parse(src).unwrap().into_iter().next().unwrap()
    }

    fn sym(s: &str) -> SExp {
        SExp::symbol(s)
    }

    fn int(s: &str) -> SExp {
        SExp::int(s)
    }

    fn list(elts: Vec<SExp>) -> SExp {
        SExp::List(elts)
    }

    #[test]
    fn multiple_top_level_forms() {
        let forms = parse("(1 2 ) (3 4)").unwrap();
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0], list(vec![int("1"), int("2")]));
        assert_eq!(forms[1], list(vec![int("3"), int("4")]));
    }

    #[test]
    fn list_structures() {
        assert_eq!(parse1("()"), SExp::Nil);
        assert_eq!(parse1("(1)"), list(vec![int("1")]));
        assert_eq!(parse1("(1 2)"), list(vec![int("1"), int("2")]));
        assert_eq!(
            parse1("(1 (2 3) 4)"),
            list(vec![int("1"), list(vec![int("2"), int("3")]), int("4")])
        );
        assert_eq!(
            parse1("(((1)))"),
            list(vec![list(vec![list(vec![int("1")])])])
        );
        assert_eq!(
            parse1("(+ 1 2 (- 2 (* 3 4)))"),
            list(vec![
                sym("+"),
                int("1"),
                int("2"),
                list(vec![
                    sym("-"),
                    int("2"),
                    list(vec![sym("*"), int("3"), int("4")]),
                ]),
            ])
        );
        assert_eq!(
            parse1("(((1.0) 0.2) 3.4e+4)"),
            list(vec![
                list(vec![
                    list(vec![SExp::Float("1.0".into())]),
                    SExp::Float("0.2".into()),
                ]),
                SExp::Float("3.4e+4".into()),
            ])
        );
    }

    #[test]
    fn mixed_atoms_in_a_list() {
        assert_eq!(
            parse1("(1 'a \"b\" ())"),
            list(vec![
                int("1"),
                SExp::Quoted {
                    inner: Box::new(sym("a")),
                    function: false
                },
                SExp::string("b"),
                SExp::Nil,
            ])
        );
    }

    #[test]
    fn dotted_pairs() {
        assert_eq!(
            parse1("(1 . 2)"),
            SExp::Cons(Box::new(int("1")), Box::new(int("2")))
        );
        assert_eq!(
            parse1("(1 2 . 3)"),
            SExp::ListDot(vec![int("1"), int("2")], Box::new(int("3")))
        );
    }

    #[test]
    fn vectors() {
        assert_eq!(parse1("[]"), SExp::Vector(vec![]));
        assert_eq!(
            parse1("[1 2 3]"),
            SExp::Vector(vec![int("1"), int("2"), int("3")])
        );
    }

    #[test]
    fn quasiquote_family() {
        assert_eq!(
            parse1("`(1 ,a)"),
            SExp::QuasiQuoted(Box::new(list(vec![
                int("1"),
                SExp::Unquote {
                    inner: Box::new(sym("a")),
                    splice: false
                },
            ])))
        );
        assert_eq!(
            parse1("`(1 ,@ab)"),
            SExp::QuasiQuoted(Box::new(list(vec![
                int("1"),
                SExp::Unquote {
                    inner: Box::new(sym("ab")),
                    splice: true
                },
            ])))
        );
        assert_eq!(
            parse1("`(1 ,(+ 1 2))"),
            SExp::QuasiQuoted(Box::new(list(vec![
                int("1"),
                SExp::Unquote {
                    inner: Box::new(list(vec![sym("+"), int("1"), int("2")])),
                    splice: false
                },
            ])))
        );
    }

    #[test]
    fn function_quote() {
        assert_eq!(
            parse1("(#'funcname)"),
            list(vec![SExp::Quoted {
                inner: Box::new(sym("funcname")),
                function: true
            }])
        );
    }

    #[test]
    fn symbols_with_punctuation() {
        assert_eq!(
            parse1("'(| (1 2) - (3 4))"),
            SExp::Quoted {
                inner: Box::new(list(vec![
                    sym("|"),
                    list(vec![int("1"), int("2")]),
                    sym("-"),
                    list(vec![int("3"), int("4")]),
                ])),
                function: false
            }
        );
    }

    #[test]
    fn char_literals() {
        assert_eq!(parse1("?x"), SExp::Char("x".into()));
        assert_eq!(parse1("? "), SExp::Char(" ".into()));
        assert_eq!(parse1("?\\n"), SExp::Char("\\n".into()));
        assert_eq!(parse1("?\\("), SExp::Char("\\(".into()));
        // question-backslash-space is the char literal space
        assert_eq!(parse1("?\\ "), SExp::Char("\\ ".into()));
    }

    #[test]
    fn string_escapes_are_decoded() {
        assert_eq!(parse1(r#""a\nb""#), SExp::string("a\nb"));
        assert_eq!(parse1(r#""a\"b\\c""#), SExp::string("a\"b\\c"));
        assert_eq!(parse1(r#""…""#), SExp::string("\u{2026}"));
        assert_eq!(parse1(r#""\U0001f607""#), SExp::string("\u{1f607}"));
    }

    #[test]
    fn multi_line_string() {
        let forms = parse("\"test\nstring\nliteral\"").unwrap();
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0], SExp::string("test\nstring\nliteral"));
    }

    #[test]
    fn symbol_escapes_are_decoded() {
        assert_eq!(parse1("\\.file"), sym(".file"));
        assert_eq!(parse1("a\\ b"), sym("a b"));
    }

    #[test]
    fn comments_are_skipped() {
        assert!(parse(";comment").unwrap().is_empty());
        assert_eq!(parse("(1 2) ;comment").unwrap().len(), 1);
        assert_eq!(
            parse("(1 2) ;comment\n;;; next comment\n(4 5)").unwrap().len(),
            2
        );
    }

    fn check_error(src: &str, line: usize, col: usize) {
        let err = parse(src).unwrap_err();
        assert_eq!((err.line, err.col), (line, col), "error was {:?}", err);
    }

    #[test]
    fn error_positions() {
        check_error(")(1 2", 1, 1);
        check_error("(1 2 3", 1, 7);
        check_error("(1 2 \n3 4\n5 )) 4", 3, 4);
    }

    #[test]
    fn error_carries_caret_line() {
        let err = parse("(1 2 \n3 4\n5 )) 4").unwrap_err();
        assert_eq!(err.text, "5 )) 4\n   ^");
    }

    #[test]
    fn dot_without_head_is_an_error() {
        assert!(parse("(. 2)").is_err());
        assert!(parse(".").is_err() || parse(".").unwrap().is_empty());
    }

    #[test]
    fn round_trip_re_parses_to_equal_ast() {
        let sources = [
            "(+ 1 2 (- 2 (* 3 4)))",
            "(1 . 2)",
            "(1 2 . 3)",
            "[1 2 3]",
            "`(1 ,a ,@bs)",
            "(#'f 'x \"str\\nline\" ?c)",
            "()",
            "(a\\ b)",
        ];
        for src in sources {
            let first = parse(src).unwrap();
            let emitted = first[0].to_sexp_string();
            let second = parse(&emitted).unwrap();
            assert_eq!(first[0], second[0], "round trip of {:?} via {:?}", src, emitted);
        }
    }
}

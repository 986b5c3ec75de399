// Hand-rolled scanner over the Emacs-Lisp reader subset. Items carry
// their byte offset so the parser can report exact positions.

/// Lexical category of one scanned item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Error,
    Space,
    Float,
    Integer,
    Symbol,
    String,
    Dot,
    CharLit,
    /// Any single punctuation character the reader cares about:
    /// `( ) [ ] ' ` , @ #` and anything else outside the other classes.
    Char,
    Comment,
    Eof,
}

/// One scanned item. `text` is the raw slice for ordinary items and the
/// error message for `Error` items.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    pub pos: usize,
    pub text: String,
}

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    start: usize,
    width: usize,
}

const SYMBOL_PUNCT: &str = "\\+-*/_~!$%^&=:<>{}.|";

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\u{c}')
}

fn is_symbol_head(c: char) -> bool {
    c.is_alphabetic() || SYMBOL_PUNCT.contains(c) || c as u32 > 255
}

fn is_symbol_rest(c: char) -> bool {
    c.is_alphabetic() || c.is_ascii_digit() || SYMBOL_PUNCT.contains(c) || c as u32 > 255
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            pos: 0,
            start: 0,
            width: 0,
        }
    }

    fn next(&mut self) -> Option<char> {
        let rest = &self.input[self.pos..];
        match rest.chars().next() {
            Some(c) => {
                self.width = c.len_utf8();
                self.pos += self.width;
                Some(c)
            }
            None => {
                self.width = 0;
                None
            }
        }
    }

    fn backup(&mut self) {
        self.pos -= self.width;
        self.width = 0;
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn accept(&mut self, valid: &str) -> bool {
        match self.next() {
            Some(c) if valid.contains(c) => true,
            Some(_) => {
                self.backup();
                false
            }
            None => false,
        }
    }

    fn accept_run(&mut self, valid: &str) {
        while self.accept(valid) {}
    }

    fn emit(&mut self, kind: ItemKind) -> Item {
        let item = Item {
            kind,
            pos: self.start,
            text: self.input[self.start..self.pos].to_string(),
        };
        self.start = self.pos;
        item
    }

    fn eof(&mut self) -> Item {
        self.start = self.pos;
        Item {
            kind: ItemKind::Eof,
            pos: self.pos,
            text: String::new(),
        }
    }

    fn error(&mut self, msg: &str) -> Item {
        Item {
            kind: ItemKind::Error,
            pos: self.start,
            text: msg.to_string(),
        }
    }

    /// Scan the next item. After `Eof` or `Error` the lexer yields `Eof`
    /// forever.
    pub fn next_item(&mut self) -> Item {
        let c = match self.next() {
            None => return self.eof(),
            Some(c) => c,
        };
        if is_space(c) {
            return self.scan_space();
        }
        match c {
            ';' => self.scan_comment(),
            '?' => self.scan_char_literal(),
            '.' | '-' | '+' => self.scan_number_or_symbol(c),
            '"' => self.scan_string(),
            c if c.is_ascii_digit() => {
                self.backup();
                self.scan_number()
            }
            c if is_symbol_head(c) => {
                self.backup();
                self.scan_symbol()
            }
            _ => self.emit(ItemKind::Char),
        }
    }

    fn scan_space(&mut self) -> Item {
        loop {
            match self.next() {
                Some(c) if is_space(c) => continue,
                Some(_) => {
                    self.backup();
                    break;
                }
                None => break,
            }
        }
        self.emit(ItemKind::Space)
    }

    fn scan_comment(&mut self) -> Item {
        loop {
            match self.next() {
                None | Some('\n') => break,
                Some(_) => continue,
            }
        }
        self.emit(ItemKind::Comment)
    }

    fn scan_char_literal(&mut self) -> Item {
        match self.next() {
            None => return self.eof(),
            Some('\\') => {
                if self.next().is_none() {
                    return self.eof();
                }
            }
            Some(_) => {}
        }
        self.emit(ItemKind::CharLit)
    }

    // `+` and `-` start a number only when a digit follows, otherwise
    // they are one-character symbols. A lone `.` is the dotted-pair
    // separator unless a digit follows.
    fn scan_number_or_symbol(&mut self, first: char) -> Item {
        match first {
            '+' | '-' => match self.peek() {
                None => self.eof(),
                Some(d) if d.is_ascii_digit() => {
                    self.backup();
                    self.scan_number()
                }
                Some(_) => self.emit(ItemKind::Symbol),
            },
            '.' => match self.peek() {
                None => self.eof(),
                Some(d) if d.is_ascii_digit() => {
                    self.backup();
                    self.scan_number()
                }
                Some(_) => self.emit(ItemKind::Dot),
            },
            _ => {
                self.backup();
                self.scan_number()
            }
        }
    }

    fn scan_number(&mut self) -> Item {
        let mut kind = ItemKind::Integer;
        let digits = "0123456789";
        self.accept("+-");
        self.accept_run(digits);
        if self.accept(".") {
            self.accept_run(digits);
            kind = ItemKind::Float;
        }
        if self.accept("eE") {
            self.accept("+-");
            self.accept_run(digits);
            kind = ItemKind::Float;
        }
        self.emit(kind)
    }

    fn scan_symbol(&mut self) -> Item {
        loop {
            match self.next() {
                Some('\\') => {
                    if self.next().is_none() {
                        break;
                    }
                }
                Some(c) if is_symbol_rest(c) => continue,
                Some(_) => {
                    self.backup();
                    break;
                }
                None => break,
            }
        }
        self.emit(ItemKind::Symbol)
    }

    fn scan_string(&mut self) -> Item {
        loop {
            match self.next() {
                Some('\\') => {
                    if self.next().is_none() {
                        return self.error("Unterminated string literal");
                    }
                }
                Some('"') => break,
                Some(_) => continue,
                None => return self.error("Unterminated string literal"),
            }
        }
        self.emit(ItemKind::String)
    }
}

//! Lexer: source text → tokens with source positions.

use super::error::{CompileError, CompileResult};

/// Line/column position (1-based) of a token in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    /// Unsigned; the parser applies a leading `-` and range-checks.
    Int(u64),
    Float(f64),
    Str(String),

    Fn,
    Let,
    Return,
    If,
    Else,
    While,
    True,
    False,
    Nil,

    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Assign,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,

    Eof,
}

impl Tok {
    /// Short human-readable form for "expected X, found Y" messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier `{name}`"),
            Self::Int(n) => format!("number `{n}`"),
            Self::Float(x) => format!("number `{x}`"),
            Self::Str(_) => "string literal".into(),
            Self::Eof => "end of input".into(),
            other => format!("`{}`", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Fn => "fn",
            Self::Let => "let",
            Self::Return => "return",
            Self::If => "if",
            Self::Else => "else",
            Self::While => "while",
            Self::True => "true",
            Self::False => "false",
            Self::Nil => "nil",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Semi => ";",
            Self::Assign => "=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Bang => "!",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Ident(_) | Self::Int(_) | Self::Float(_) | Self::Str(_) | Self::Eof => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub pos: Pos,
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    pos: Pos,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
            pos: Pos { line: 1, column: 1 },
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }
}

fn syntax(pos: Pos, message: impl Into<String>) -> CompileError {
    CompileError::Syntax {
        line: pos.line,
        column: pos.column,
        message: message.into(),
    }
}

/// Split source text into tokens. The last token is always [`Tok::Eof`].
pub fn tokenize(src: &str) -> CompileResult<Vec<Token>> {
    let mut cur = Cursor::new(src);
    let mut tokens = Vec::new();

    loop {
        // Whitespace and `#` comments.
        while let Some(c) = cur.peek() {
            if c.is_whitespace() {
                cur.bump();
            } else if c == '#' {
                while let Some(c) = cur.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }

        let pos = cur.pos;
        let Some(c) = cur.bump() else {
            tokens.push(Token { tok: Tok::Eof, pos });
            return Ok(tokens);
        };

        let tok = match c {
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            ',' => Tok::Comma,
            ';' => Tok::Semi,
            '+' => Tok::Plus,
            '-' => Tok::Minus,
            '*' => Tok::Star,
            '/' => Tok::Slash,
            '%' => Tok::Percent,
            '=' if cur.eat('=') => Tok::EqEq,
            '=' => Tok::Assign,
            '!' if cur.eat('=') => Tok::NotEq,
            '!' => Tok::Bang,
            '<' if cur.eat('=') => Tok::Le,
            '<' => Tok::Lt,
            '>' if cur.eat('=') => Tok::Ge,
            '>' => Tok::Gt,
            '&' if cur.eat('&') => Tok::AndAnd,
            '|' if cur.eat('|') => Tok::OrOr,
            '"' => Tok::Str(string_literal(&mut cur, pos)?),
            c if c.is_ascii_digit() => number(&mut cur, c, pos)?,
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(c) = cur.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        cur.bump();
                    } else {
                        break;
                    }
                }
                keyword(ident)
            }
            other => return Err(syntax(pos, format!("unexpected character `{other}`"))),
        };

        tokens.push(Token { tok, pos });
    }
}

fn keyword(ident: String) -> Tok {
    match ident.as_str() {
        "fn" => Tok::Fn,
        "let" => Tok::Let,
        "return" => Tok::Return,
        "if" => Tok::If,
        "else" => Tok::Else,
        "while" => Tok::While,
        "true" => Tok::True,
        "false" => Tok::False,
        "nil" => Tok::Nil,
        _ => Tok::Ident(ident),
    }
}

fn number(cur: &mut Cursor<'_>, first: char, pos: Pos) -> CompileResult<Tok> {
    let mut text = String::from(first);
    let mut is_float = false;
    while let Some(c) = cur.peek() {
        if c.is_ascii_digit() || c == '_' {
            if c != '_' {
                text.push(c);
            }
            cur.bump();
        } else if c == '.' && !is_float {
            is_float = true;
            text.push(c);
            cur.bump();
        } else {
            break;
        }
    }

    if is_float {
        text.parse::<f64>()
            .map(Tok::Float)
            .map_err(|_| syntax(pos, format!("malformed number `{text}`")))
    } else {
        text.parse::<u64>()
            .map(Tok::Int)
            .map_err(|_| syntax(pos, format!("integer literal `{text}` is out of range")))
    }
}

fn string_literal(cur: &mut Cursor<'_>, start: Pos) -> CompileResult<String> {
    let mut out = String::new();
    loop {
        let Some(c) = cur.bump() else {
            return Err(syntax(start, "unterminated string literal"));
        };
        match c {
            '"' => return Ok(out),
            '\\' => {
                let esc_pos = cur.pos;
                match cur.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        return Err(syntax(esc_pos, format!("unknown escape `\\{other}`")));
                    }
                    None => return Err(syntax(start, "unterminated string literal")),
                }
            }
            c => out.push(c),
        }
    }
}

/// Whether `src` ends inside an open `{ ... }` block or string literal.
///
/// The REPL uses this to keep reading continuation lines for a definition.
pub fn is_incomplete(src: &str) -> bool {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut in_comment = false;
    let mut chars = src.chars();
    while let Some(c) = chars.next() {
        if in_comment {
            in_comment = c != '\n';
            continue;
        }
        if in_string {
            match c {
                '\\' => {
                    chars.next();
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '#' => in_comment = true,
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
    }
    in_string || depth > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn function_header() {
        assert_eq!(
            toks("fn add(a, b)"),
            vec![
                Tok::Fn,
                Tok::Ident("add".into()),
                Tok::LParen,
                Tok::Ident("a".into()),
                Tok::Comma,
                Tok::Ident("b".into()),
                Tok::RParen,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(
            toks("a <= b == c && !d || e != f"),
            vec![
                Tok::Ident("a".into()),
                Tok::Le,
                Tok::Ident("b".into()),
                Tok::EqEq,
                Tok::Ident("c".into()),
                Tok::AndAnd,
                Tok::Bang,
                Tok::Ident("d".into()),
                Tok::OrOr,
                Tok::Ident("e".into()),
                Tok::NotEq,
                Tok::Ident("f".into()),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn numbers_and_strings() {
        assert_eq!(
            toks(r#"1_000 2.5 "hi\n\"there\"""#),
            vec![
                Tok::Int(1000),
                Tok::Float(2.5),
                Tok::Str("hi\n\"there\"".into()),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped_and_positions_tracked() {
        let tokens = tokenize("# header\n  let x").unwrap();
        assert_eq!(tokens[0].tok, Tok::Let);
        assert_eq!(tokens[0].pos, Pos { line: 2, column: 3 });
        assert_eq!(tokens[1].pos, Pos { line: 2, column: 7 });
    }

    #[test]
    fn stray_characters_are_rejected() {
        let err = tokenize("fn f() { import os }@").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { column: 21, .. }));
        assert!(tokenize("\"open").is_err());
        assert!(tokenize("a & b").is_err());
    }

    #[test]
    fn incomplete_input_detection() {
        assert!(is_incomplete("fn f(x) {"));
        assert!(is_incomplete("fn f(x) { print(\"}"));
        assert!(!is_incomplete("fn f(x) { return x; }"));
        assert!(!is_incomplete("fn f(x) = x # {"));
    }
}

//! Tokens of the C subset.

use logos::{Lexer, Logos};

use std::fmt;

/// Raw tokens as recognized by the generated state machine.
///
/// Identifiers are not split into keywords here, see [keyword].
#[derive(Logos, Debug, PartialEq, Clone)]
pub(crate) enum RawToken<'s> {
    #[error]
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    #[regex(r"//[^\n]*", logos::skip)]
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", logos::skip)]
    #[regex(r"#[^\n]*", logos::skip)]
    Error,

    #[regex("[A-Za-z_][A-Za-z0-9_]*", Lexer::slice)]
    Identifier(&'s str),

    #[regex("[1-9][0-9]*", decimal)]
    #[regex("0[xX][0-9a-fA-F]+", hexadecimal)]
    #[regex("0[0-7]*", octal)]
    Number(i64),

    /// A string literal including the quotes.
    #[regex(r#""([^"\\]|\\.)*""#, Lexer::slice)]
    Str(&'s str),

    /// A character literal including the quotes.
    #[regex(r"'([^'\\]|\\.)*'", Lexer::slice)]
    Char(&'s str),

    #[token("=")]
    Assign,
    #[token("?")]
    Cond,
    #[token("||")]
    Lor,
    #[token("&&")]
    Land,
    #[token("|")]
    Or,
    #[token("^")]
    Xor,
    #[token("&")]
    And,
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("+")]
    Add,
    #[token("-")]
    Sub,
    #[token("*")]
    Mul,
    #[token("/")]
    Div,
    #[token("%")]
    Mod,
    #[token("++")]
    Inc,
    #[token("--")]
    Dec,
    #[token("[")]
    Brak,
    #[token("]")]
    RightBracket,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("!")]
    Not,
    #[token("~")]
    Tilde,
}

fn decimal<'s>(lex: &mut Lexer<'s, RawToken<'s>>) -> Option<i64> {
    lex.slice().parse::<u64>().ok().map(|n| n as i64)
}

fn hexadecimal<'s>(lex: &mut Lexer<'s, RawToken<'s>>) -> Option<i64> {
    u64::from_str_radix(&lex.slice()[2..], 16).ok().map(|n| n as i64)
}

fn octal<'s>(lex: &mut Lexer<'s, RawToken<'s>>) -> Option<i64> {
    u64::from_str_radix(lex.slice(), 8).ok().map(|n| n as i64)
}

/// Kind of a [Token] without its payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Num,
    Str,
    Id,

    Char,
    Int,
    Enum,
    If,
    Else,
    Return,
    Sizeof,
    While,

    Assign,
    Cond,
    Lor,
    Land,
    Or,
    Xor,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Inc,
    Dec,
    Brak,

    Semicolon,
    Comma,
    Colon,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    RightBracket,
    Not,
    Tilde,

    Eof,
}

impl TokenKind {
    /// Returns true for `int` and `char` (which `void` lexes as).
    pub fn is_base_type(self) -> bool {
        match self {
            TokenKind::Int | TokenKind::Char => true,
            _ => false,
        }
    }

    pub fn symbol(self) -> Option<&'static str> {
        use TokenKind::*;

        let s = match self {
            Assign => "=",
            Cond => "?",
            Lor => "||",
            Land => "&&",
            Or => "|",
            Xor => "^",
            And => "&",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Gt => ">",
            Le => "<=",
            Ge => ">=",
            Shl => "<<",
            Shr => ">>",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
            Inc => "++",
            Dec => "--",
            Brak => "[",
            Semicolon => ";",
            Comma => ",",
            Colon => ":",
            LeftParen => "(",
            RightParen => ")",
            LeftBrace => "{",
            RightBrace => "}",
            RightBracket => "]",
            Not => "!",
            Tilde => "~",
            Char => "char",
            Int => "int",
            Enum => "enum",
            If => "if",
            Else => "else",
            Return => "return",
            Sizeof => "sizeof",
            While => "while",
            Num | Str | Id | Eof => return None,
        };

        Some(s)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.symbol() {
            Some(s) => write!(f, "`{}`", s),
            None => match self {
                TokenKind::Num => write!(f, "number"),
                TokenKind::Str => write!(f, "string literal"),
                TokenKind::Id => write!(f, "identifier"),
                _ => write!(f, "end of input"),
            },
        }
    }
}

/// Reserved words and the token kinds they lex as.
pub const KEYWORDS: &[(&str, TokenKind)] = &[
    ("char", TokenKind::Char),
    ("int", TokenKind::Int),
    ("enum", TokenKind::Enum),
    ("if", TokenKind::If),
    ("else", TokenKind::Else),
    ("return", TokenKind::Return),
    ("sizeof", TokenKind::Sizeof),
    ("while", TokenKind::While),
    ("void", TokenKind::Char),
];

/// Returns the token kind of a reserved word.
pub fn keyword(name: &str) -> Option<TokenKind> {
    KEYWORDS
        .iter()
        .find(|(word, _)| *word == name)
        .map(|(_, kind)| *kind)
}

/// Payload of a [Token].
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    None,
    Num(i64),
    /// Address of a string literal in the data segment.
    Str(usize),
    Name(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: Literal,
    pub line: usize,
    pub column: usize,
}

impl Token {
    /// Numeric payload, or zero for tokens without one.
    pub fn number(&self) -> i64 {
        match self.value {
            Literal::Num(n) => n,
            Literal::Str(addr) => addr as i64,
            _ => 0,
        }
    }

    pub fn name(&self) -> &str {
        match self.value {
            Literal::Name(ref name) => name,
            _ => "",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.value {
            Literal::Num(n) => write!(f, "{}", n),
            Literal::Str(addr) => write!(f, "<string @{}>", addr),
            Literal::Name(ref name) => write!(f, "{}", name),
            Literal::None => fmt::Display::fmt(&self.kind, f),
        }
    }
}

/// Resolves the escape sequences of a quoted literal. `raw` includes the quotes.
pub(crate) fn unescape(raw: &str) -> Vec<u8> {
    let body = &raw[1..raw.len() - 1];
    let mut out = Vec::with_capacity(body.len());
    let mut chars = body.chars();

    while let Some(ch) = chars.next() {
        let ch = match ch {
            '\\' => match chars.next() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some('r') => '\r',
                Some(other) => other,
                None => break,
            },
            ch => ch,
        };

        let mut buf = [0; 4];
        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
    }

    out
}

#[test]
fn test_unescape() {
    assert_eq!(unescape(r#""a\nb""#), b"a\nb");
    assert_eq!(unescape(r#""\t\r\\\"\'""#), b"\t\r\\\"'");
    assert_eq!(unescape(r#""\q""#), b"q");
    assert_eq!(unescape("''"), b"");
}

#[test]
fn test_keywords() {
    assert_eq!(keyword("void"), Some(TokenKind::Char));
    assert_eq!(keyword("while"), Some(TokenKind::While));
    assert_eq!(keyword("main"), None);
}

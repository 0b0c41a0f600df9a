//! Pull-based tokenizer that feeds the parser.
//!
//! Besides producing [Tokens](Token), the lexer owns the [DataSegment] of the program: string
//! literals are written into it when they are consumed with [Lexer::next_token]. Peeking never
//! writes anything, a peeked string literal reports the address it will receive once consumed.

use logos::Logos;
use slog::{o, trace, warn, Discard, Logger};

use crate::bytecode::{padded_len, DataSegment};
use crate::error::{CompileError, CompileErrorKind, LexError};
use crate::token::{keyword, unescape, Literal, RawToken, Token, TokenKind};

type RawLexer<'s> = logos::Lexer<'s, RawToken<'s>>;

pub struct Lexer<'s> {
    inner: RawLexer<'s>,
    source: &'s str,
    /// Byte offsets at which each line starts.
    line_starts: Vec<usize>,
    data: DataSegment,
    strict: bool,
    /// Set once an end-of-input token has been produced.
    finished: bool,
    stray: Option<char>,
    logger: Logger,
}

/// A scanned token whose string payload, if any, has not been committed yet.
struct Scanned {
    token: Token,
    string: Option<Vec<u8>>,
    stray: Option<char>,
}

impl<'s> Lexer<'s> {
    pub fn new(source: &'s str) -> Lexer<'s> {
        Lexer::with_logger(source, None)
    }

    pub fn with_logger<L>(source: &'s str, logger: L) -> Lexer<'s>
    where
        L: Into<Option<Logger>>,
    {
        let logger = logger
            .into()
            .unwrap_or(Logger::root(Discard, o!()))
            .new(o!("stage" => "lexing"));

        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Lexer {
            inner: RawToken::lexer(source),
            source,
            line_starts,
            data: DataSegment::new(),
            strict: false,
            finished: false,
            stray: None,
            logger,
        }
    }

    /// Makes unrecognized characters an error instead of an end of input.
    pub fn strict(mut self, strict: bool) -> Lexer<'s> {
        self.strict = strict;
        self
    }

    /// The data segment filled so far.
    pub fn data(&self) -> &DataSegment {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut DataSegment {
        &mut self.data
    }

    pub fn into_data(self) -> DataSegment {
        self.data
    }

    /// The character that ended tokenization early, if any.
    pub fn stray(&self) -> Option<char> {
        self.stray
    }

    /// Converts a byte offset into a 1-based line and column.
    pub fn location(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };

        let start = self.line_starts[line];
        let column = self.source[start..offset].chars().count() + 1;

        (line + 1, column)
    }

    /// Consumes the next token.
    pub fn next_token(&mut self) -> Result<Token, CompileError> {
        if self.finished {
            return Ok(self.end_of_input());
        }

        let mut inner = self.inner.clone();

        let scanned = match self.scan_token(&mut inner, self.data.len()) {
            Ok(scanned) => scanned,
            Err(err) => {
                self.finished = true;
                return Err(err);
            }
        };

        self.inner = inner;

        if let Some(ch) = scanned.stray {
            let token = &scanned.token;
            warn!(self.logger, "unrecognized character, treating it as the end of input";
                  "character" => ?ch, "line" => token.line, "column" => token.column);
            self.stray = Some(ch);
        }

        if let Some(bytes) = scanned.string {
            let addr = self.data.push_str(&bytes);
            trace!(self.logger, "string literal"; "address" => addr, "size" => bytes.len());
        }

        if scanned.token.kind == TokenKind::Eof {
            self.finished = true;
        }

        Ok(scanned.token)
    }

    /// Returns the next token without consuming it.
    pub fn peek_token(&self) -> Result<Token, CompileError> {
        self.peek_token_after(0)
    }

    /// Returns the token that follows the next `n` tokens, without consuming anything.
    pub fn peek_token_after(&self, n: usize) -> Result<Token, CompileError> {
        if self.finished {
            return Ok(self.end_of_input());
        }

        let mut inner = self.inner.clone();
        let mut data_len = self.data.len();

        for _ in 0..n {
            let scanned = self.scan_token(&mut inner, data_len)?;

            if scanned.token.kind == TokenKind::Eof {
                return Ok(scanned.token);
            }

            if let Some(bytes) = scanned.string {
                data_len = padded_len(data_len + bytes.len() + 1);
            }
        }

        self.scan_token(&mut inner, data_len).map(|scanned| scanned.token)
    }

    fn scan_token(&self, inner: &mut RawLexer<'s>, data_len: usize) -> Result<Scanned, CompileError> {
        let raw = match inner.next() {
            Some(raw) => raw,
            None => return Ok(self.plain(self.end_of_input())),
        };

        let (line, column) = self.location(inner.span().start);

        let token = |kind, value| Token {
            kind,
            value,
            line,
            column,
        };

        let kind = match raw {
            RawToken::Error => {
                let ch = inner.slice().chars().next().unwrap_or('\0');

                if self.strict {
                    return Err(CompileError::new(
                        CompileErrorKind::Lex(LexError::UnexpectedCharacter(ch)),
                        line,
                        column,
                    ));
                }

                return Ok(Scanned {
                    token: token(TokenKind::Eof, Literal::None),
                    string: None,
                    stray: Some(ch),
                });
            }
            RawToken::Identifier(name) => {
                let value = match keyword(name) {
                    Some(kind) => return Ok(self.plain(token(kind, Literal::None))),
                    None => Literal::Name(name.to_string()),
                };

                return Ok(self.plain(token(TokenKind::Id, value)));
            }
            RawToken::Number(n) => {
                return Ok(self.plain(token(TokenKind::Num, Literal::Num(n))));
            }
            RawToken::Char(raw) => {
                let bytes = unescape(raw);
                let code = String::from_utf8_lossy(&bytes)
                    .chars()
                    .next()
                    .map(|ch| ch as i64)
                    .unwrap_or(0);

                return Ok(self.plain(token(TokenKind::Num, Literal::Num(code))));
            }
            RawToken::Str(raw) => {
                return Ok(Scanned {
                    token: token(TokenKind::Str, Literal::Str(data_len)),
                    string: Some(unescape(raw)),
                    stray: None,
                });
            }
            RawToken::Assign => TokenKind::Assign,
            RawToken::Cond => TokenKind::Cond,
            RawToken::Lor => TokenKind::Lor,
            RawToken::Land => TokenKind::Land,
            RawToken::Or => TokenKind::Or,
            RawToken::Xor => TokenKind::Xor,
            RawToken::And => TokenKind::And,
            RawToken::Eq => TokenKind::Eq,
            RawToken::Ne => TokenKind::Ne,
            RawToken::Lt => TokenKind::Lt,
            RawToken::Gt => TokenKind::Gt,
            RawToken::Le => TokenKind::Le,
            RawToken::Ge => TokenKind::Ge,
            RawToken::Shl => TokenKind::Shl,
            RawToken::Shr => TokenKind::Shr,
            RawToken::Add => TokenKind::Add,
            RawToken::Sub => TokenKind::Sub,
            RawToken::Mul => TokenKind::Mul,
            RawToken::Div => TokenKind::Div,
            RawToken::Mod => TokenKind::Mod,
            RawToken::Inc => TokenKind::Inc,
            RawToken::Dec => TokenKind::Dec,
            RawToken::Brak => TokenKind::Brak,
            RawToken::RightBracket => TokenKind::RightBracket,
            RawToken::Semicolon => TokenKind::Semicolon,
            RawToken::Comma => TokenKind::Comma,
            RawToken::Colon => TokenKind::Colon,
            RawToken::LeftParen => TokenKind::LeftParen,
            RawToken::RightParen => TokenKind::RightParen,
            RawToken::LeftBrace => TokenKind::LeftBrace,
            RawToken::RightBrace => TokenKind::RightBrace,
            RawToken::Not => TokenKind::Not,
            RawToken::Tilde => TokenKind::Tilde,
        };

        Ok(self.plain(token(kind, Literal::None)))
    }

    fn plain(&self, token: Token) -> Scanned {
        Scanned {
            token,
            string: None,
            stray: None,
        }
    }

    fn end_of_input(&self) -> Token {
        let (line, column) = self.location(self.source.len());

        Token {
            kind: TokenKind::Eof,
            value: Literal::None,
            line,
            column,
        }
    }
}

impl<'s> Iterator for Lexer<'s> {
    type Item = Result<Token, CompileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        Some(self.next_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .map(|token| token.unwrap().kind)
            .collect()
    }

    #[test]
    fn test_operators() {
        use TokenKind::*;

        assert_eq!(
            kinds("a += b++ <= c << 2 && !d;"),
            vec![Id, Add, Assign, Id, Inc, Le, Id, Shl, Num, Land, Not, Id, Semicolon, Eof]
        );
    }

    #[test]
    fn test_numbers() {
        let mut lexer = Lexer::new("42 0x1F 0X10 017 0 08");
        let mut numbers = Vec::new();

        loop {
            let token = lexer.next_token().unwrap();

            if token.kind == TokenKind::Eof {
                break;
            }

            assert_eq!(token.kind, TokenKind::Num);
            numbers.push(token.number());
        }

        // `08` is the octal zero followed by the decimal eight.
        assert_eq!(numbers, vec![42, 31, 16, 15, 0, 0, 8]);
    }

    #[test]
    fn test_comments_and_directives() {
        use TokenKind::*;

        let source = "#include <stdio.h>\n// line comment\nint /* block\n * comment */ x;\n";

        assert_eq!(kinds(source), vec![Int, Id, Semicolon, Eof]);
    }

    #[test]
    fn test_keywords() {
        use TokenKind::*;

        assert_eq!(
            kinds("void int char enum if else return sizeof while main"),
            vec![Char, Int, Char, Enum, If, Else, Return, Sizeof, While, Id, Eof]
        );
    }

    #[test]
    fn test_positions() {
        let mut lexer = Lexer::new("int\n  x;");

        let int = lexer.next_token().unwrap();
        assert_eq!((int.line, int.column), (1, 1));

        let x = lexer.next_token().unwrap();
        assert_eq!((x.line, x.column), (2, 3));
        assert_eq!(x.name(), "x");
    }

    #[test]
    fn test_string_literals() {
        let mut lexer = Lexer::new(r#""Hi\n" "abcdefgh" 'A' '\n'"#);

        let first = lexer.next_token().unwrap();
        assert_eq!(first.value, Literal::Str(0));

        let second = lexer.next_token().unwrap();
        assert_eq!(second.value, Literal::Str(8));

        assert_eq!(lexer.next_token().unwrap().value, Literal::Num('A' as i64));
        assert_eq!(lexer.next_token().unwrap().value, Literal::Num('\n' as i64));

        let data = lexer.data().as_bytes();
        assert_eq!(data.len(), 24);
        assert_eq!(&data[..4], b"Hi\n\0");
        assert_eq!(&data[8..16], b"abcdefgh");
        assert_eq!(data[16], 0);
    }

    #[test]
    fn test_peek_has_no_side_effects() {
        let mut lexer = Lexer::new(r#"x "one" "two" ;"#);

        assert_eq!(lexer.peek_token().unwrap().kind, TokenKind::Id);
        assert_eq!(lexer.peek_token_after(1).unwrap().value, Literal::Str(0));
        assert_eq!(lexer.peek_token_after(2).unwrap().value, Literal::Str(8));
        assert_eq!(lexer.peek_token_after(3).unwrap().kind, TokenKind::Semicolon);
        assert!(lexer.data().is_empty());

        lexer.next_token().unwrap();
        assert_eq!(lexer.peek_token().unwrap().value, Literal::Str(0));
        assert_eq!(lexer.peek_token().unwrap().value, Literal::Str(0));
        assert!(lexer.data().is_empty());

        assert_eq!(lexer.next_token().unwrap().value, Literal::Str(0));
        assert_eq!(lexer.next_token().unwrap().value, Literal::Str(8));
        assert_eq!(lexer.data().len(), 16);
    }

    #[test]
    fn test_unrecognized_character() {
        let mut lexer = Lexer::new("x @ y");

        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Id);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
        assert_eq!(lexer.stray(), Some('@'));
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);

        let mut strict = Lexer::new("x @ y").strict(true);
        strict.next_token().unwrap();

        match strict.next_token() {
            Err(CompileError {
                kind: CompileErrorKind::Lex(LexError::UnexpectedCharacter('@')),
                line: 1,
                column: 3,
                ..
            }) => (),
            other => panic!("expected a lex error, got {:?}", other),
        }
    }
}

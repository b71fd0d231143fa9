//! Lexical analysis of template source.
//!
//! Splits source into text runs and action tokens. Delimiters are `{{` and
//! `}}`; `{{- ` trims whitespace before the action and ` -}}` trims it after.
//! Comments (`{{/* ... */}}`) are dropped here and never reach the parser.

use super::error::SyntaxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Text(String),
    Open,
    Close,
    Dot,
    Field(Vec<String>),
    Root(Vec<String>),
    Ident(String),
    Str(String),
    Int(i64),
    Bool(bool),
    Pipe,
    LParen,
    RParen,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const TRIM_RIGHT: &str = "-}}";
const COMMENT_OPEN: &str = "/*";
const COMMENT_CLOSE: &str = "*/";

pub(crate) fn lex(name: &str, source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer {
        name,
        source,
        pos: 0,
        line: 1,
        trim_next_text: false,
        tokens: Vec::new(),
    };
    lexer.lex_all()?;
    Ok(lexer.tokens)
}

struct Lexer<'a> {
    name: &'a str,
    source: &'a str,
    pos: usize,
    line: usize,
    trim_next_text: bool,
    tokens: Vec<Token>,
}

impl Lexer<'_> {
    fn lex_all(&mut self) -> Result<(), SyntaxError> {
        loop {
            let rest = &self.source[self.pos..];
            let open = rest.find(LEFT_DELIM);
            let raw_text = match open {
                Some(idx) => &rest[..idx],
                None => rest,
            };
            let trim_left = open.is_some_and(|idx| has_left_trim(&rest[idx + LEFT_DELIM.len()..]));

            let mut text = raw_text;
            if self.trim_next_text {
                text = text.trim_start();
            }
            if trim_left {
                text = text.trim_end();
            }
            if !text.is_empty() {
                self.push(TokenKind::Text(text.to_string()));
            }
            self.line += count_newlines(raw_text);

            let Some(idx) = open else {
                self.pos = self.source.len();
                self.push(TokenKind::Eof);
                return Ok(());
            };

            self.pos += idx + LEFT_DELIM.len();
            if trim_left {
                self.pos += 1;
            }

            if self.skip_comment()? {
                continue;
            }

            self.push(TokenKind::Open);
            self.lex_action()?;
        }
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.name, self.line, message)
    }

    fn rest(&self) -> &str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
            skipped = true;
        }
        skipped
    }

    /// Consume `/* ... */}}` if the action is a comment.
    fn skip_comment(&mut self) -> Result<bool, SyntaxError> {
        let start = self.pos;
        let start_line = self.line;
        self.skip_whitespace();
        if !self.rest().starts_with(COMMENT_OPEN) {
            self.pos = start;
            self.line = start_line;
            return Ok(false);
        }

        let body_start = self.pos + COMMENT_OPEN.len();
        let Some(end) = self.source[body_start..].find(COMMENT_CLOSE) else {
            return Err(self.error("unclosed comment"));
        };
        self.line += count_newlines(&self.source[self.pos..body_start + end]);
        self.pos = body_start + end + COMMENT_CLOSE.len();

        let had_space = self.skip_whitespace();
        if had_space && self.rest().starts_with(TRIM_RIGHT) {
            self.pos += TRIM_RIGHT.len();
            self.trim_next_text = true;
        } else if self.rest().starts_with(RIGHT_DELIM) {
            self.pos += RIGHT_DELIM.len();
            self.trim_next_text = false;
        } else {
            return Err(self.error("comment ends before closing delimiter"));
        }
        Ok(true)
    }

    fn lex_action(&mut self) -> Result<(), SyntaxError> {
        loop {
            let had_space = self.skip_whitespace();
            if had_space && self.rest().starts_with(TRIM_RIGHT) {
                self.pos += TRIM_RIGHT.len();
                self.push(TokenKind::Close);
                self.trim_next_text = true;
                return Ok(());
            }
            if self.rest().starts_with(RIGHT_DELIM) {
                self.pos += RIGHT_DELIM.len();
                self.push(TokenKind::Close);
                self.trim_next_text = false;
                return Ok(());
            }

            let Some(c) = self.peek() else {
                return Err(self.error("unclosed action"));
            };

            match c {
                '.' => self.lex_dot(),
                '$' => self.lex_root()?,
                '"' => self.lex_quoted()?,
                '`' => self.lex_raw_string()?,
                '|' => {
                    self.bump();
                    self.push(TokenKind::Pipe);
                }
                '(' => {
                    self.bump();
                    self.push(TokenKind::LParen);
                }
                ')' => {
                    self.bump();
                    self.push(TokenKind::RParen);
                }
                c if c.is_ascii_digit() => self.lex_number()?,
                '-' if self.peek_second().is_some_and(|d| d.is_ascii_digit()) => {
                    self.lex_number()?
                }
                c if is_ident_start(c) => {
                    let ident = self.take_ident();
                    let kind = match ident.as_str() {
                        "true" => TokenKind::Bool(true),
                        "false" => TokenKind::Bool(false),
                        _ => TokenKind::Ident(ident),
                    };
                    self.push(kind);
                }
                other => {
                    return Err(self.error(format!("unexpected {other:?} in command")));
                }
            }
        }
    }

    fn take_ident(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        self.source[start..self.pos].to_string()
    }

    fn take_field_chain(&mut self) -> Vec<String> {
        let mut fields = Vec::new();
        while self.peek() == Some('.') && self.peek_second().is_some_and(is_ident_start) {
            self.bump();
            fields.push(self.take_ident());
        }
        fields
    }

    fn lex_dot(&mut self) {
        let fields = self.take_field_chain();
        if fields.is_empty() {
            self.bump();
            self.push(TokenKind::Dot);
        } else {
            self.push(TokenKind::Field(fields));
        }
    }

    fn lex_root(&mut self) -> Result<(), SyntaxError> {
        self.bump();
        if self.peek().is_some_and(is_ident_continue) {
            return Err(self.error("template variables other than $ are not supported"));
        }
        let fields = self.take_field_chain();
        self.push(TokenKind::Root(fields));
        Ok(())
    }

    fn lex_number(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let literal = &self.source[start..self.pos];
        if self.peek().is_some_and(is_ident_continue) {
            return Err(self.error(format!("bad number syntax: {literal:?}")));
        }
        let value = literal
            .parse::<i64>()
            .map_err(|_| self.error(format!("bad number syntax: {literal:?}")))?;
        self.push(TokenKind::Int(value));
        Ok(())
    }

    fn lex_quoted(&mut self) -> Result<(), SyntaxError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("unterminated quoted string")),
                Some('"') => break,
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some(other) => {
                            return Err(self.error(format!("unknown escape sequence: \\{other}")));
                        }
                        None => return Err(self.error("unterminated quoted string")),
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
        self.push(TokenKind::Str(value));
        Ok(())
    }

    fn lex_raw_string(&mut self) -> Result<(), SyntaxError> {
        self.bump();
        let start = self.pos;
        let Some(end) = self.rest().find('`') else {
            return Err(self.error("unterminated raw quoted string"));
        };
        let value = self.source[start..start + end].to_string();
        self.line += count_newlines(&value);
        self.pos = start + end + 1;
        self.push(TokenKind::Str(value));
        Ok(())
    }
}

fn has_left_trim(after_open: &str) -> bool {
    let mut chars = after_open.chars();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

fn count_newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex("t", source)
            .expect("lexes")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn text_and_field() {
        assert_eq!(
            kinds("Hello {{.Name}}"),
            vec![
                TokenKind::Text("Hello ".into()),
                TokenKind::Open,
                TokenKind::Field(vec!["Name".into()]),
                TokenKind::Close,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn trim_markers_strip_surrounding_whitespace() {
        assert_eq!(
            kinds("a  {{- . -}}\n  b"),
            vec![
                TokenKind::Text("a".into()),
                TokenKind::Open,
                TokenKind::Dot,
                TokenKind::Close,
                TokenKind::Text("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(
            kinds("x{{/* note\nspanning */}}y"),
            vec![
                TokenKind::Text("x".into()),
                TokenKind::Text("y".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn literals_and_pipes() {
        assert_eq!(
            kinds(r#"{{ index $.Items -1 | print "a\"b" true }}"#),
            vec![
                TokenKind::Open,
                TokenKind::Ident("index".into()),
                TokenKind::Root(vec!["Items".into()]),
                TokenKind::Int(-1),
                TokenKind::Pipe,
                TokenKind::Ident("print".into()),
                TokenKind::Str("a\"b".into()),
                TokenKind::Bool(true),
                TokenKind::Close,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unclosed_action_is_a_syntax_error() {
        let err = lex("bad", "Hello {{").unwrap_err();
        assert_eq!(err.name, "bad");
        assert_eq!(err.line, 1);
        assert!(err.message.contains("unclosed action"));
    }

    #[test]
    fn line_numbers_track_newlines() {
        let err = lex("t", "one\ntwo\n{{ \"open").unwrap_err();
        assert_eq!(err.line, 3);
    }
}

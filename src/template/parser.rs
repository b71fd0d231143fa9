//! Parse tokens into a node tree.

use super::error::SyntaxError;
use super::lexer::{Token, TokenKind};

/// Deepest allowed nesting of control blocks and parenthesized pipelines.
pub const MAX_NESTING_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
    If {
        cond: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Range {
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    With {
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pipeline {
    pub line: usize,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Command {
    pub args: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Operand {
    Dot,
    Field(Vec<String>),
    Root(Vec<String>),
    Str(String),
    Int(i64),
    Bool(bool),
    Func(Builtin),
    Sub(Box<Pipeline>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    And,
    Eq,
    Index,
    Join,
    Len,
    Ne,
    Not,
    Or,
    Print,
}

impl Builtin {
    fn lookup(ident: &str) -> Option<Self> {
        Some(match ident {
            "and" => Self::And,
            "eq" => Self::Eq,
            "index" => Self::Index,
            "join" => Self::Join,
            "len" => Self::Len,
            "ne" => Self::Ne,
            "not" => Self::Not,
            "or" => Self::Or,
            "print" => Self::Print,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Eq => "eq",
            Self::Index => "index",
            Self::Join => "join",
            Self::Len => "len",
            Self::Ne => "ne",
            Self::Not => "not",
            Self::Or => "or",
            Self::Print => "print",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    If,
    Range,
    With,
}

impl Block {
    fn keyword(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Range => "range",
            Self::With => "with",
        }
    }

    fn node(self, pipe: Pipeline, body: Vec<Node>, otherwise: Vec<Node>) -> Node {
        match self {
            Self::If => Node::If {
                cond: pipe,
                body,
                otherwise,
            },
            Self::Range => Node::Range {
                pipe,
                body,
                otherwise,
            },
            Self::With => Node::With {
                pipe,
                body,
                otherwise,
            },
        }
    }
}

enum Terminator {
    End,
    Else,
    ElseIf,
}

pub(crate) fn parse(name: &str, tokens: Vec<Token>) -> Result<Vec<Node>, SyntaxError> {
    let mut parser = Parser {
        name,
        tokens,
        pos: 0,
        depth: 0,
    };
    let (nodes, terminator) = parser.parse_list()?;
    match terminator {
        None => Ok(nodes),
        Some(Terminator::End) => Err(parser.error("unexpected {{end}}")),
        Some(Terminator::Else | Terminator::ElseIf) => {
            Err(parser.error("unexpected {{else}}"))
        }
    }
}

struct Parser<'a> {
    name: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map_or(&TokenKind::Eof, |token| &token.kind)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |token| token.line)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.name, self.line(), message)
    }

    fn expect_close(&mut self, context: &str) -> Result<(), SyntaxError> {
        match self.peek() {
            TokenKind::Close => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof => Err(self.error("unclosed action")),
            other => Err(self.error(format!("unexpected {} in {context}", describe(other)))),
        }
    }

    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error(format!(
                "nesting depth exceeds {MAX_NESTING_DEPTH}"
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Parse nodes until EOF or a block terminator (`end`, `else`, `else if`).
    fn parse_list(&mut self) -> Result<(Vec<Node>, Option<Terminator>), SyntaxError> {
        let mut nodes = Vec::new();
        loop {
            match self.advance() {
                TokenKind::Eof => return Ok((nodes, None)),
                TokenKind::Text(text) => nodes.push(Node::Text(text)),
                TokenKind::Open => {
                    if let Some(terminator) = self.parse_action(&mut nodes)? {
                        return Ok((nodes, Some(terminator)));
                    }
                }
                other => {
                    return Err(self.error(format!("unexpected {} outside action", describe(&other))));
                }
            }
        }
    }

    fn parse_action(&mut self, nodes: &mut Vec<Node>) -> Result<Option<Terminator>, SyntaxError> {
        let keyword = match self.peek() {
            TokenKind::Ident(ident) => ident.clone(),
            _ => String::new(),
        };
        match keyword.as_str() {
            "end" => {
                self.advance();
                self.expect_close("end")?;
                Ok(Some(Terminator::End))
            }
            "else" => {
                self.advance();
                if matches!(self.peek(), TokenKind::Ident(ident) if ident == "if") {
                    self.advance();
                    return Ok(Some(Terminator::ElseIf));
                }
                self.expect_close("else")?;
                Ok(Some(Terminator::Else))
            }
            "if" => {
                self.advance();
                nodes.push(self.parse_block(Block::If)?);
                Ok(None)
            }
            "range" => {
                self.advance();
                nodes.push(self.parse_block(Block::Range)?);
                Ok(None)
            }
            "with" => {
                self.advance();
                nodes.push(self.parse_block(Block::With)?);
                Ok(None)
            }
            _ => {
                let pipe = self.parse_pipeline()?;
                self.expect_close("command")?;
                nodes.push(Node::Action(pipe));
                Ok(None)
            }
        }
    }

    /// Parse the rest of a block whose keyword has been consumed.
    ///
    /// An `else if` chain occupies one nesting level however long it is; its
    /// branches are folded into nested `If` nodes once the chain ends.
    fn parse_block(&mut self, block: Block) -> Result<Node, SyntaxError> {
        let keyword = block.keyword();
        self.enter()?;

        let mut branches = Vec::new();
        let mut otherwise = loop {
            let pipe = self.parse_pipeline()?;
            self.expect_close(keyword)?;
            let (body, terminator) = self.parse_list()?;
            branches.push((pipe, body));
            match terminator {
                Some(Terminator::End) => break Vec::new(),
                Some(Terminator::Else) => match self.parse_list()? {
                    (otherwise, Some(Terminator::End)) => break otherwise,
                    (_, Some(_)) => {
                        return Err(self.error(format!("expected end; found else in {keyword}")));
                    }
                    (_, None) => return Err(self.error(format!("unexpected EOF in {keyword}"))),
                },
                Some(Terminator::ElseIf) if block == Block::If => {}
                Some(Terminator::ElseIf) => {
                    return Err(self.error(format!("unexpected else if in {keyword}")));
                }
                None => return Err(self.error(format!("unexpected EOF in {keyword}"))),
            }
        };
        self.leave();

        let mut node = None;
        for (pipe, body) in branches.into_iter().rev() {
            let rest = match node.take() {
                Some(inner) => vec![inner],
                None => std::mem::take(&mut otherwise),
            };
            node = Some(block.node(pipe, body, rest));
        }
        node.ok_or_else(|| self.error(format!("missing condition in {keyword}")))
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline, SyntaxError> {
        let line = self.line();
        let mut commands = Vec::new();
        loop {
            let command = self.parse_command()?;
            if !commands.is_empty() && !matches!(command.args.first(), Some(Operand::Func(_))) {
                return Err(self.error(format!(
                    "non executable command in pipeline stage {}",
                    commands.len() + 1
                )));
            }
            commands.push(command);
            if matches!(self.peek(), TokenKind::Pipe) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(Pipeline { line, commands })
    }

    fn parse_command(&mut self) -> Result<Command, SyntaxError> {
        let mut args = Vec::new();
        while !matches!(
            self.peek(),
            TokenKind::Close | TokenKind::Pipe | TokenKind::RParen | TokenKind::Eof
        ) {
            args.push(self.parse_operand()?);
        }
        match args.first() {
            None => Err(self.error("missing value for command")),
            Some(Operand::Func(_)) => Ok(Command { args }),
            Some(_) if args.len() > 1 => Err(self.error("can't give argument to non-function")),
            Some(_) => Ok(Command { args }),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, SyntaxError> {
        match self.advance() {
            TokenKind::Dot => Ok(Operand::Dot),
            TokenKind::Field(path) => Ok(Operand::Field(path)),
            TokenKind::Root(path) => Ok(Operand::Root(path)),
            TokenKind::Str(value) => Ok(Operand::Str(value)),
            TokenKind::Int(value) => Ok(Operand::Int(value)),
            TokenKind::Bool(value) => Ok(Operand::Bool(value)),
            TokenKind::Ident(ident) => match ident.as_str() {
                "if" | "else" | "end" | "range" | "with" => {
                    Err(self.error(format!("unexpected keyword {ident:?} in operand")))
                }
                _ => Builtin::lookup(&ident)
                    .map(Operand::Func)
                    .ok_or_else(|| self.error(format!("function {ident:?} not defined"))),
            },
            TokenKind::LParen => {
                self.enter()?;
                let pipe = self.parse_pipeline()?;
                match self.advance() {
                    TokenKind::RParen => {}
                    other => {
                        return Err(self.error(format!(
                            "unclosed left paren: unexpected {}",
                            describe(&other)
                        )));
                    }
                }
                self.leave();
                Ok(Operand::Sub(Box::new(pipe)))
            }
            other => Err(self.error(format!("unexpected {} in operand", describe(&other)))),
        }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Text(_) => "text".to_string(),
        TokenKind::Open => "\"{{\"".to_string(),
        TokenKind::Close => "\"}}\"".to_string(),
        TokenKind::Dot => "\".\"".to_string(),
        TokenKind::Field(path) => format!("<.{}>", path.join(".")),
        TokenKind::Root(_) => "\"$\"".to_string(),
        TokenKind::Ident(ident) => format!("{ident:?}"),
        TokenKind::Str(value) => format!("{value:?}"),
        TokenKind::Int(value) => value.to_string(),
        TokenKind::Bool(value) => value.to_string(),
        TokenKind::Pipe => "\"|\"".to_string(),
        TokenKind::LParen => "\"(\"".to_string(),
        TokenKind::RParen => "\")\"".to_string(),
        TokenKind::Eof => "EOF".to_string(),
    }
}

//! Parser for Rill syntax
//!
//! Syntax:
//! ```text
//! (( a comment ))
//! : square dup *u8 ;
//! 3 square [| dup |] eval
//! ```
//!
//! Tokens are whitespace-separated. `[| ... |]` delimits a quotation
//! (nestable), `: name body ;` a definition (not nestable), `(( ... ))` a
//! comment. Bare integers are `U8` literals. Word names are not resolved
//! here; the typechecker performs the builtin/user scope lookup.

use crate::ast::{NodeId, Phrase, Program, Sequence, Term};
use crate::types::Base;

/// A token with the line it came from (0-indexed; displayed 1-indexed).
#[derive(Debug, Clone)]
pub struct Token {
    pub text: String,
    pub line: usize,
}

fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (line, content) in source.lines().enumerate() {
        for word in content.split_whitespace() {
            tokens.push(Token {
                text: word.to_string(),
                line,
            });
        }
    }
    tokens
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_node_id: NodeId,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Parser {
            tokens: tokenize(source),
            pos: 0,
            next_node_id: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Program, String> {
        let mut program = Program::new();
        let mut pending: Vec<Term> = Vec::new();

        while let Some(token) = self.advance() {
            match token.text.as_str() {
                "((" => self.skip_comment(token.line)?,
                ":" => {
                    self.flush(&mut pending, &mut program);
                    let definition = self.parse_definition(token.line)?;
                    program.phrases.push(definition);
                }
                ";" => {
                    return Err(format!(
                        "at line {}: ';' without a matching ':'",
                        token.line + 1
                    ));
                }
                _ => pending.push(self.parse_term(token)?),
            }
        }

        self.flush(&mut pending, &mut program);
        Ok(program)
    }

    /// Collect consecutive loose terms into an expression phrase.
    fn flush(&mut self, pending: &mut Vec<Term>, program: &mut Program) {
        if pending.is_empty() {
            return;
        }
        let id = self.next_id();
        program.phrases.push(Phrase::Expr(Sequence {
            id,
            terms: std::mem::take(pending),
        }));
    }

    fn parse_term(&mut self, token: Token) -> Result<Term, String> {
        match token.text.as_str() {
            "[|" => self.parse_quotation(token.line),
            "|]" => Err(format!(
                "at line {}: found '|]' without a matching '[|'",
                token.line + 1
            )),
            ":" => Err(format!(
                "at line {}: ':' is only valid at the top level (nested definitions are not allowed)",
                token.line + 1
            )),
            ";" => Err(format!(
                "at line {}: ';' is only valid at the end of a definition",
                token.line + 1
            )),
            "true" | "false" => Ok(Term::BoolLiteral {
                id: self.next_id(),
                value: token.text == "true",
            }),
            text if text.chars().all(|c| c.is_ascii_digit()) => {
                let value: u16 = text.parse().map_err(|_| {
                    format!(
                        "at line {}: numeric literal '{}' is out of range",
                        token.line + 1,
                        text
                    )
                })?;
                Ok(Term::IntLiteral {
                    id: self.next_id(),
                    value,
                    base: Base::U8,
                })
            }
            _ => Ok(Term::WordCall {
                id: self.next_id(),
                name: token.text,
            }),
        }
    }

    fn parse_quotation(&mut self, start_line: usize) -> Result<Term, String> {
        let mut terms = Vec::new();
        loop {
            let token = self.advance().ok_or_else(|| {
                format!(
                    "at line {}: unterminated quotation, missing '|]'",
                    start_line + 1
                )
            })?;
            match token.text.as_str() {
                "|]" => break,
                "((" => self.skip_comment(token.line)?,
                _ => terms.push(self.parse_term(token)?),
            }
        }
        let body_id = self.next_id();
        Ok(Term::Quotation {
            id: self.next_id(),
            body: Sequence { id: body_id, terms },
        })
    }

    fn parse_definition(&mut self, start_line: usize) -> Result<Phrase, String> {
        let name_token = self.advance().ok_or_else(|| {
            format!("at line {}: expected a name after ':'", start_line + 1)
        })?;
        let name = name_token.text;
        if matches!(name.as_str(), "((" | "))" | "[|" | "|]" | ":" | ";")
            || name == "true"
            || name == "false"
            || name.chars().all(|c| c.is_ascii_digit())
        {
            return Err(format!(
                "at line {}: '{}' cannot be used as a definition name",
                name_token.line + 1,
                name
            ));
        }

        let mut terms = Vec::new();
        loop {
            let token = self.advance().ok_or_else(|| {
                format!(
                    "at line {}: definition '{}' has no terminating ';'",
                    start_line + 1,
                    name
                )
            })?;
            match token.text.as_str() {
                ";" => break,
                "((" => self.skip_comment(token.line)?,
                _ => terms.push(self.parse_term(token)?),
            }
        }

        let id = self.next_id();
        Ok(Phrase::Definition {
            name,
            body: Sequence { id, terms },
        })
    }

    /// Consume everything up to the closing `))`.
    fn skip_comment(&mut self, start_line: usize) -> Result<(), String> {
        loop {
            let token = self.advance().ok_or_else(|| {
                format!(
                    "at line {}: comment opened with '((' but never closed",
                    start_line + 1
                )
            })?;
            if token.text == "))" {
                return Ok(());
            }
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn next_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }
}

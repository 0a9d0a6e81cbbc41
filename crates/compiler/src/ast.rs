//! Abstract syntax tree for Rill
//!
//! The parser produces `Program`s of top-level phrases; a phrase is either
//! an expression sequence or a `: name body ;` definition. Every node
//! carries a stable id assigned at parse time; inference caches each
//! node's type in the [`Context`](crate::context::Context) under that id,
//! and SSA lowering reads the finalized types back out. Nodes themselves
//! are read-only after parsing.

use crate::types::Base;
use std::fmt;

/// Stable node identity assigned by the parser.
pub type NodeId = usize;

/// A single word-like element of a sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Numeric literal. Bare integers are always `U8`.
    IntLiteral { id: NodeId, value: u16, base: Base },
    /// `true` / `false`
    BoolLiteral { id: NodeId, value: bool },
    /// Call of a builtin or user word, resolved during inference.
    WordCall { id: NodeId, name: String },
    /// `[| body |]`: a deferred sub-program pushed on the stack as a
    /// first-class value, invokable via `eval`.
    Quotation { id: NodeId, body: Sequence },
}

impl Term {
    pub fn id(&self) -> NodeId {
        match self {
            Term::IntLiteral { id, .. }
            | Term::BoolLiteral { id, .. }
            | Term::WordCall { id, .. }
            | Term::Quotation { id, .. } => *id,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::IntLiteral { value, .. } => write!(f, "{}", value),
            Term::BoolLiteral { value, .. } => {
                write!(f, "{}", if *value { "true" } else { "false" })
            }
            Term::WordCall { name, .. } => write!(f, "{}", name),
            Term::Quotation { body, .. } => write!(f, "[| {} |]", body),
        }
    }
}

/// An ordered run of terms, executed left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub id: NodeId,
    pub terms: Vec<Term>,
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.terms.iter().map(|t| t.to_string()).collect();
        write!(f, "{}", rendered.join(" "))
    }
}

/// A top-level phrase.
#[derive(Debug, Clone, PartialEq)]
pub enum Phrase {
    /// A bare expression sequence.
    Expr(Sequence),
    /// `: name body ;`: types the body at definition site and registers
    /// the name in the user scope.
    Definition { name: String, body: Sequence },
}

impl fmt::Display for Phrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phrase::Expr(seq) => write!(f, "{}", seq),
            Phrase::Definition { name, body } => write!(f, ": {} {} ;", name, body),
        }
    }
}

/// A parsed source file or input line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub phrases: Vec<Phrase>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }
}

//! Rill Compiler Library
//!
//! Front-end for the Rill programming language: a small statically typed
//! concatenative language. Provides parsing, row-polymorphic stack-effect
//! inference, and SSA lowering of phrases into register CFGs.
//!
//! ```rust,ignore
//! use rillc::{check_source, lower_source, CompilerConfig};
//!
//! for report in check_source(": square dup *u8 ;\n3 square")? {
//!     println!("{} :: {}", report.source, report.ty);
//! }
//!
//! for lowered in lower_source("1 2 +u8", &CompilerConfig::new())? {
//!     print!("{}", lowered.cfg.render());
//! }
//! ```

pub mod ast;
pub mod builtins;
pub mod config;
pub mod context;
pub mod graph;
pub mod parser;
pub mod ssa;
pub mod typechecker;
pub mod types;
pub mod unification;

pub use ast::{Phrase, Program};
pub use config::CompilerConfig;
pub use context::Context;
pub use parser::Parser;
pub use ssa::{Cfg, SsaError, constant_propagation, lower_sequence, lower_with_inputs};
pub use typechecker::{TypeChecker, compose};
pub use types::{Base, FuncType, Row, Type, TypeError, Var};

use std::path::Path;

/// One type-checked top-level phrase.
#[derive(Debug, Clone)]
pub struct PhraseReport {
    /// The phrase as written.
    pub source: String,
    /// Its inferred stack effect, rendered.
    pub ty: String,
}

/// One lowered top-level phrase.
#[derive(Debug, Clone)]
pub struct LoweredPhrase {
    pub source: String,
    pub ty: String,
    pub cfg: Cfg,
}

/// Parse and type-check a source string, reporting each phrase's type.
pub fn check_source(source: &str) -> Result<Vec<PhraseReport>, String> {
    let program = Parser::new(source).parse()?;
    let mut checker = TypeChecker::new();
    let types = checker
        .check_program(&program)
        .map_err(|e| e.to_string())?;

    Ok(program
        .phrases
        .iter()
        .zip(types)
        .map(|(phrase, ty)| PhraseReport {
            source: phrase.to_string(),
            ty: ty.to_string(),
        })
        .collect())
}

/// Parse, type-check, and lower every phrase to a CFG. Definitions are
/// lowered through their bodies.
pub fn lower_source(
    source: &str,
    config: &CompilerConfig,
) -> Result<Vec<LoweredPhrase>, String> {
    let program = Parser::new(source).parse()?;
    let mut checker = TypeChecker::new();
    let types = checker
        .check_program(&program)
        .map_err(|e| e.to_string())?;

    let mut lowered = Vec::with_capacity(program.phrases.len());
    for (phrase, ty) in program.phrases.iter().zip(types) {
        // A bare phrase starts from an empty stack; a definition body's
        // inputs become formal-parameter registers.
        let (body, inputs) = match phrase {
            Phrase::Expr(seq) => (seq, &[][..]),
            Phrase::Definition { body, .. } => (body, ty.left.items.as_slice()),
        };
        let (mut cfg, _vstack) =
            lower_with_inputs(body, checker.context(), inputs).map_err(|e| e.to_string())?;
        if config.optimize.constant_folding {
            constant_propagation(&mut cfg);
        }
        lowered.push(LoweredPhrase {
            source: phrase.to_string(),
            ty: ty.to_string(),
            cfg,
        });
    }
    Ok(lowered)
}

/// [`check_source`] over a file on disk.
pub fn check_file(path: &Path) -> Result<Vec<PhraseReport>, String> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read source file '{}': {}", path.display(), e))?;
    check_source(&source)
}

/// [`lower_source`] over a file on disk.
pub fn lower_file(path: &Path, config: &CompilerConfig) -> Result<Vec<LoweredPhrase>, String> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read source file '{}': {}", path.display(), e))?;
    lower_source(&source, config)
}

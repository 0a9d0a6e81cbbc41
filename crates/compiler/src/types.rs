//! Type system for Rill
//!
//! Rill words are typed by row-polymorphic stack effects. A function type
//! like `(''S U8 U8 -> ''S U8)` consumes two `U8` values from any stack
//! `''S` and produces one `U8` on the same stack.
//!
//! # Understanding the representation
//!
//! - **`Base`**: the machine-level atoms `U8`, `S8`, `U16`, `BOOL`.
//! - **`Var`**: a type variable with a human-readable name and a globally
//!   unique integer identity. Equality is by identity only; two variables
//!   both named `T` are unrelated unless their ids match. A variable is
//!   either *value-kinded* (`'T`, stands for a single value type) or
//!   *row-kinded* (`''S`, stands for the rest of the stack).
//! - **`Row`**: an unknown stack prefix (the row variable) followed by a
//!   list of value types, topmost at the right. `''S U8 BOOL` is a stack
//!   with a `BOOL` on top of a `U8` on top of anything.
//! - **`Composite`**: a named constructor applied to argument types, e.g.
//!   `LIST<U8>` or `MAYBE<'T>`.
//! - **`FuncType`**: a pair of rows, the stack effect `left -> right`.
//!
//! Types are immutable: `substitute` returns a rewritten copy rather than
//! mutating in place, so substitution stores never alias into live types.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counter backing [`Var::fresh`]. Atomic so identities stay
/// globally unique even if inference is ever driven from multiple threads.
static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(0);

/// Base types in the language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Base {
    /// Unsigned 8-bit integer
    U8,
    /// Signed 8-bit integer
    S8,
    /// Unsigned 16-bit integer
    U16,
    /// Boolean
    Bool,
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Base::U8 => write!(f, "U8"),
            Base::S8 => write!(f, "S8"),
            Base::U16 => write!(f, "U16"),
            Base::Bool => write!(f, "BOOL"),
        }
    }
}

/// Whether a variable stands for a single value or for a row (stack suffix)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    Value,
    Row,
}

/// A type variable: human name, unique identity, kind.
///
/// The name is display-only. Identity comparison uses the id alone, so
/// instantiating a scheme twice yields disjoint variables that happen to
/// print the same way.
#[derive(Debug, Clone)]
pub struct Var {
    pub name: String,
    pub id: u64,
    pub kind: VarKind,
}

impl Var {
    /// Create a fresh variable with a new globally unique identity.
    pub fn fresh(name: &str, kind: VarKind) -> Self {
        Var {
            name: name.to_string(),
            id: NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed),
            kind,
        }
    }

    /// Fresh value-level variable (`'T`)
    pub fn value(name: &str) -> Self {
        Var::fresh(name, VarKind::Value)
    }

    /// Fresh row-level variable (`''S`)
    pub fn row(name: &str) -> Self {
        Var::fresh(name, VarKind::Row)
    }

    /// A new variable with the same name and kind but a fresh identity.
    pub fn renamed(&self) -> Self {
        Var::fresh(&self.name, self.kind)
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Var {}

impl PartialOrd for Var {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Var {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl std::hash::Hash for Var {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            VarKind::Value => write!(f, "'{}", self.name),
            VarKind::Row => write!(f, "''{}", self.name),
        }
    }
}

/// A row: unknown stack prefix plus a fixed suffix of value types,
/// topmost at the right.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub var: Var,
    pub items: Vec<Type>,
}

impl Row {
    pub fn new(var: Var, items: Vec<Type>) -> Self {
        Row { var, items }
    }

    /// Number of known value types in the row.
    pub fn arity(&self) -> usize {
        self.items.len()
    }

    /// Drop all but the last `n` items. Used by the final annotation pass
    /// to narrow a node's type back to its own arity after substitution
    /// spread surrounding-stack items into the row.
    pub fn keep_last(&mut self, n: usize) {
        if self.items.len() > n {
            let cut = self.items.len() - n;
            self.items.drain(..cut);
        }
    }

    fn substitute(&self, var: &Var, replacement: &Type) -> Row {
        let items: Vec<Type> = self
            .items
            .iter()
            .map(|t| t.substitute(var, replacement))
            .collect();

        if &self.var == var {
            match replacement {
                // Replacing the row variable with a row splices the row's
                // items in as a prefix of ours.
                Type::Row(r) => {
                    let mut spliced = r.items.clone();
                    spliced.extend(items);
                    Row::new(r.var.clone(), spliced)
                }
                Type::Var(v) if v.kind == VarKind::Row => Row::new(v.clone(), items),
                // A row variable can only be bound to a row or another row
                // variable; add_sub enforces this before anything reaches
                // the store.
                _ => Row::new(self.var.clone(), items),
            }
        } else {
            Row::new(self.var.clone(), items)
        }
    }

    fn free_vars(&self, out: &mut BTreeSet<Var>) {
        for t in &self.items {
            t.free_vars(out);
        }
        out.insert(self.var.clone());
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.var)?;
        for t in &self.items {
            write!(f, " {}", t)?;
        }
        Ok(())
    }
}

/// A stack effect: consumes `left`, produces `right`.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncType {
    pub left: Row,
    pub right: Row,
}

impl FuncType {
    pub fn new(left: Row, right: Row) -> Self {
        FuncType { left, right }
    }

    /// Effect whose input and output share the same row variable:
    /// `(var left -> var right)`. This is the shape of almost every
    /// primitive word.
    pub fn balanced(var: Var, left: Vec<Type>, right: Vec<Type>) -> Self {
        FuncType {
            left: Row::new(var.clone(), left),
            right: Row::new(var, right),
        }
    }

    /// Effect with independent input and output row variables.
    pub fn spanning(left_var: Var, left: Vec<Type>, right_var: Var, right: Vec<Type>) -> Self {
        FuncType {
            left: Row::new(left_var, left),
            right: Row::new(right_var, right),
        }
    }

    pub fn substitute(&self, var: &Var, replacement: &Type) -> FuncType {
        FuncType {
            left: self.left.substitute(var, replacement),
            right: self.right.substitute(var, replacement),
        }
    }

    pub fn free_vars(&self, out: &mut BTreeSet<Var>) {
        self.left.free_vars(out);
        self.right.free_vars(out);
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} -> {})", self.left, self.right)
    }
}

/// A Rill type.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Base(Base),
    /// Value- or row-kinded variable, per [`Var::kind`]
    Var(Var),
    Row(Row),
    /// Named constructor with ordered arguments, e.g. `LIST<U8>`
    Composite { name: String, args: Vec<Type> },
    Function(Box<FuncType>),
}

impl Type {
    /// `LIST<T>`
    pub fn list(item: Type) -> Type {
        Type::Composite {
            name: "LIST".to_string(),
            args: vec![item],
        }
    }

    /// `MAYBE<T>`
    pub fn maybe(item: Type) -> Type {
        Type::Composite {
            name: "MAYBE".to_string(),
            args: vec![item],
        }
    }

    pub fn func(f: FuncType) -> Type {
        Type::Function(Box::new(f))
    }

    /// Replace every occurrence of `var` (matched by identity) with
    /// `replacement`, returning the rewritten type. Substituting a row
    /// into a row variable spreads the row's items onto the containing
    /// row.
    pub fn substitute(&self, var: &Var, replacement: &Type) -> Type {
        match self {
            Type::Base(_) => self.clone(),
            Type::Var(v) => {
                if v == var {
                    replacement.clone()
                } else {
                    self.clone()
                }
            }
            Type::Row(row) => Type::Row(row.substitute(var, replacement)),
            Type::Composite { name, args } => Type::Composite {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| a.substitute(var, replacement))
                    .collect(),
            },
            Type::Function(func) => Type::func(func.substitute(var, replacement)),
        }
    }

    /// Collect every variable (value- and row-kinded) reachable inside
    /// this type.
    pub fn free_vars(&self, out: &mut BTreeSet<Var>) {
        match self {
            Type::Base(_) => {}
            Type::Var(v) => {
                out.insert(v.clone());
            }
            Type::Row(row) => row.free_vars(out),
            Type::Composite { args, .. } => {
                for a in args {
                    a.free_vars(out);
                }
            }
            Type::Function(func) => func.free_vars(out),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Base(b) => write!(f, "{}", b),
            Type::Var(v) => write!(f, "{}", v),
            Type::Row(r) => write!(f, "{}", r),
            Type::Composite { name, args } => {
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}<{}>", name, rendered.join(" "))
            }
            Type::Function(func) => write!(f, "{}", func),
        }
    }
}

/// Error type for inference and unification.
///
/// Every failure aborts the current top-level phrase; nothing is retried.
#[derive(Debug)]
pub enum TypeError {
    /// Two types cannot be made equal. Carries the offending pair and a
    /// dump of the substitution store for diagnostics.
    Unification {
        left: String,
        right: String,
        store: String,
    },
    /// A variable occurs free in its own binding.
    OccurCheck { var: String, rhs: String },
    /// The substitution store's dependency graph has a cycle.
    CyclicSubstitution { trace: String },
    /// A word resolves in neither the builtin nor the user scope.
    UnknownWord(String),
    /// An empty sequence has no type.
    EmptySequence,
    /// A definition reuses a name already bound in the builtin or user
    /// scope.
    DuplicateDefinition(String),
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::Unification { left, right, store } => {
                write!(
                    f,
                    "cannot unify:\n\t{}\nwith:\n\t{}\n\nsubstitutions so far:\n{}",
                    left, right, store
                )
            }
            TypeError::OccurCheck { var, rhs } => {
                write!(
                    f,
                    "occur check failed: {} appears inside {} (would create an infinite type)",
                    var, rhs
                )
            }
            TypeError::CyclicSubstitution { trace } => {
                write!(f, "cyclic substitution dependency: {}", trace)
            }
            TypeError::UnknownWord(name) => write!(f, "unknown word: '{}'", name),
            TypeError::EmptySequence => write!(f, "empty sequence has no type"),
            TypeError::DuplicateDefinition(name) => {
                write!(f, "word '{}' is already defined", name)
            }
        }
    }
}

impl std::error::Error for TypeError {}

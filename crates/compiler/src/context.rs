//! Inference context: word scopes and the substitution solver
//!
//! The [`Context`] owns everything mutable during inference:
//!
//! - the builtin and user word scopes (name -> type scheme),
//! - the substitution store, the most-general unifier being built for the
//!   current top-level phrase,
//! - the per-node type cache consumed by the final annotation pass and by
//!   SSA lowering.
//!
//! The store stays *normalized*: whenever an equation is added, it is
//! first applied to every right-hand side already present, and a rebind
//! of an already-bound variable is resolved by unifying the old and new
//! right-hand sides. Together with the eager occur check this keeps every
//! binding free of its own key and makes substitution application
//! idempotent.

use crate::ast::NodeId;
use crate::graph::DependencyGraph;
use crate::types::{FuncType, Row, Type, TypeError, Var, VarKind};
use crate::unification::unify;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// A node's inferred type together with the arities recorded when the
/// node was instantiated. Substitution can spread surrounding-stack items
/// into the rows; the arities let the final annotation pass narrow the
/// type back to the node's own effect.
#[derive(Debug, Clone)]
pub struct NodeType {
    pub func: FuncType,
    pub arity_in: usize,
    pub arity_out: usize,
}

#[derive(Debug, Default)]
pub struct Context {
    builtins: HashMap<String, FuncType>,
    user_words: HashMap<String, FuncType>,
    substitutions: BTreeMap<Var, Type>,
    node_types: HashMap<NodeId, NodeType>,
}

impl Context {
    /// Empty context, no words in scope. Used internally as the scratch
    /// context of `add_sub`'s rebind merge and by unit tests.
    pub fn new() -> Self {
        Context::default()
    }

    /// Context seeded with the builtin word catalog.
    pub fn with_builtins() -> Self {
        Context {
            builtins: crate::builtins::builtin_signatures(),
            ..Context::default()
        }
    }

    /// Look up a word's scheme: builtin scope first, then user scope.
    pub fn lookup(&self, name: &str) -> Option<&FuncType> {
        self.builtins.get(name).or_else(|| self.user_words.get(name))
    }

    /// Register a user definition. Names are unique across both scopes.
    pub fn register_user_word(&mut self, name: &str, scheme: FuncType) -> Result<(), TypeError> {
        if self.builtins.contains_key(name) || self.user_words.contains_key(name) {
            return Err(TypeError::DuplicateDefinition(name.to_string()));
        }
        debug!("registered user word '{}' :: {}", name, scheme);
        self.user_words.insert(name.to_string(), scheme);
        Ok(())
    }

    /// Deep-copy a scheme, replacing every variable with a fresh one of
    /// the same name and kind. Called on every word lookup so call sites
    /// never share variable identities.
    pub fn instantiate(&self, scheme: &FuncType) -> FuncType {
        let mut rename: HashMap<u64, Var> = HashMap::new();
        freshen_func(scheme, &mut rename)
    }

    /// Record the equation `var := ty`.
    ///
    /// Trivial equations are elided, the occur check rejects self-mentions,
    /// and a rebind of an already-bound variable unifies the old and new
    /// right-hand sides and folds the resulting equations back in.
    pub fn add_sub(&mut self, var: Var, ty: Type) -> Result<(), TypeError> {
        // Trivial equations: 'T := 'T and ''S := (''S)
        if let Type::Var(v) = &ty {
            if *v == var {
                return Ok(());
            }
        }
        if let Type::Row(r) = &ty {
            if r.var == var && r.items.is_empty() {
                return Ok(());
            }
        }

        // A row variable only ever stands for a row; a value variable
        // never does.
        let rhs_is_rowish = matches!(&ty, Type::Row(_))
            || matches!(&ty, Type::Var(v) if v.kind == VarKind::Row);
        match var.kind {
            VarKind::Row if !rhs_is_rowish => {
                return Err(self.unification_error(&Type::Var(var), &ty));
            }
            VarKind::Value if rhs_is_rowish => {
                return Err(self.unification_error(&Type::Var(var), &ty));
            }
            _ => {}
        }

        let mut free = BTreeSet::new();
        ty.free_vars(&mut free);
        if free.contains(&var) {
            return Err(TypeError::OccurCheck {
                var: var.to_string(),
                rhs: ty.to_string(),
            });
        }

        if let Some(old) = self.substitutions.get(&var).cloned() {
            // Already bound: the old and new right-hand sides must agree.
            // Unify them in a scratch context and fold the resulting
            // equations into this store.
            debug!("rebinding {}: unifying {} with {}", var, old, ty);
            let mut scratch = Context::new();
            unify(&old, &ty, &mut scratch)?;
            for (k, v) in scratch.substitutions {
                self.apply_to_store(&k, &v);
                self.substitutions.entry(k).or_insert(v);
            }
        } else {
            debug!("new equation: {} := {}", var, ty);
            self.apply_to_store(&var, &ty);
            self.substitutions.insert(var, ty);
        }
        Ok(())
    }

    /// Rewrite every right-hand side in the store with `var := ty`.
    fn apply_to_store(&mut self, var: &Var, ty: &Type) {
        for rhs in self.substitutions.values_mut() {
            *rhs = rhs.substitute(var, ty);
        }
    }

    /// The order in which accumulated substitutions must be applied:
    /// a variable is rewritten before every variable its binding mentions.
    pub fn ordered_subs(&self) -> Result<Vec<Var>, TypeError> {
        let mut graph = DependencyGraph::new();
        for (var, ty) in &self.substitutions {
            graph.add_node(var.clone());
            let mut free = BTreeSet::new();
            ty.free_vars(&mut free);
            for dep in free {
                graph.add_edge(var.clone(), dep);
            }
        }
        graph
            .ordered_visit()
            .map_err(|cycle| TypeError::CyclicSubstitution {
                trace: cycle.to_string(),
            })
    }

    /// Apply the accumulated substitutions to `func` in dependency order,
    /// producing the most concrete form currently known.
    pub fn resolve(&self, func: &FuncType) -> Result<FuncType, TypeError> {
        let order = self.ordered_subs()?;
        let mut out = func.clone();
        for var in &order {
            if let Some(ty) = self.substitutions.get(var) {
                out = out.substitute(var, ty);
            }
        }
        Ok(out)
    }

    /// Cache a node's instantiated type. The arities recorded here are
    /// what the final annotation pass narrows back to.
    pub fn cache_node_type(&mut self, id: NodeId, func: FuncType) {
        let node = NodeType {
            arity_in: func.left.arity(),
            arity_out: func.right.arity(),
            func,
        };
        self.node_types.insert(id, node);
    }

    pub fn node_type(&self, id: NodeId) -> Option<&NodeType> {
        self.node_types.get(&id)
    }

    /// Final annotation pass: apply the accumulated substitutions to every
    /// cached node type, narrow each back to its recorded arities, then
    /// drop the substitution store. Called once per top-level phrase.
    pub fn finalize_phrase(&mut self) -> Result<(), TypeError> {
        let order = self.ordered_subs()?;
        for node in self.node_types.values_mut() {
            let mut func = node.func.clone();
            for var in &order {
                if let Some(ty) = self.substitutions.get(var) {
                    func = func.substitute(var, ty);
                }
            }
            func.left.keep_last(node.arity_in);
            func.right.keep_last(node.arity_out);
            node.func = func;
        }
        self.substitutions.clear();
        Ok(())
    }

    /// Drop the substitution store. Must be called before the next phrase
    /// after a failure, so stores never leak across phrases.
    pub fn reset(&mut self) {
        self.substitutions.clear();
    }

    /// Current substitution store (diagnostics and tests).
    pub fn substitutions(&self) -> &BTreeMap<Var, Type> {
        &self.substitutions
    }

    /// Render the store for error messages.
    pub fn store_dump(&self) -> String {
        if self.substitutions.is_empty() {
            return "\t(empty)".to_string();
        }
        let lines: Vec<String> = self
            .substitutions
            .iter()
            .map(|(var, ty)| format!("\t{} ~~> {}", var, ty))
            .collect();
        lines.join("\n")
    }

    /// Build a unification error carrying the offending pair and the
    /// current store.
    pub fn unification_error(&self, left: &Type, right: &Type) -> TypeError {
        TypeError::Unification {
            left: left.to_string(),
            right: right.to_string(),
            store: self.store_dump(),
        }
    }
}

fn freshen_var(var: &Var, rename: &mut HashMap<u64, Var>) -> Var {
    rename.entry(var.id).or_insert_with(|| var.renamed()).clone()
}

fn freshen_row(row: &Row, rename: &mut HashMap<u64, Var>) -> Row {
    Row::new(
        freshen_var(&row.var, rename),
        row.items.iter().map(|t| freshen_type(t, rename)).collect(),
    )
}

fn freshen_func(func: &FuncType, rename: &mut HashMap<u64, Var>) -> FuncType {
    FuncType::new(
        freshen_row(&func.left, rename),
        freshen_row(&func.right, rename),
    )
}

fn freshen_type(ty: &Type, rename: &mut HashMap<u64, Var>) -> Type {
    match ty {
        Type::Base(_) => ty.clone(),
        Type::Var(v) => Type::Var(freshen_var(v, rename)),
        Type::Row(r) => Type::Row(freshen_row(r, rename)),
        Type::Composite { name, args } => Type::Composite {
            name: name.clone(),
            args: args.iter().map(|a| freshen_type(a, rename)).collect(),
        },
        Type::Function(f) => Type::func(freshen_func(f, rename)),
    }
}

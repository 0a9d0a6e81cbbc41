//! Dependency graph for ordering substitution rewrites
//!
//! Applying accumulated substitutions in the wrong order loses rewrites.
//! With a store of
//!
//! ```text
//! 'a ~~> ('x -> U8)
//! 'x ~~> U16
//! ```
//!
//! rewriting `'x` before `'a` in a target type would leave the `'x` buried
//! inside `'a`'s replacement untouched. The store therefore forms a graph
//! `'a -> 'x` ("the rewrite of 'a mentions 'x") and rewrites are applied in
//! topological pre-order. A cycle in the graph is an occur failure that
//! slipped past the eager check and is reported as such.

use crate::types::Var;
use std::collections::{BTreeMap, BTreeSet};

/// A cycle discovered during the ordered visit. Carries the variables on
/// the offending path.
#[derive(Debug)]
pub struct CycleError(pub Vec<Var>);

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", path.join(" ~~> "))
    }
}

/// Directed dependency graph over type variables.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Outgoing edges, keyed by source. BTree keyed so visits are
    /// deterministic across runs.
    edges: BTreeMap<Var, Vec<Var>>,
    nodes: BTreeSet<Var>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph::default()
    }

    pub fn add_node(&mut self, v: Var) {
        self.nodes.insert(v);
    }

    pub fn add_edge(&mut self, from: Var, to: Var) {
        self.nodes.insert(from.clone());
        self.nodes.insert(to.clone());
        let out = self.edges.entry(from).or_default();
        if !out.contains(&to) {
            out.push(to);
        }
    }

    /// Visit all nodes in topological pre-order: every node is emitted
    /// before any node it points to. Fails on cycles.
    pub fn ordered_visit(&self) -> Result<Vec<Var>, CycleError> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut state: BTreeMap<Var, VisitState> = BTreeMap::new();

        for node in &self.nodes {
            if !state.contains_key(node) {
                self.visit(node, &mut state, &mut order, &mut Vec::new())?;
            }
        }

        // Post-order DFS emits dependencies first; the pre-order the
        // caller wants is the reverse.
        order.reverse();
        Ok(order)
    }

    fn visit(
        &self,
        node: &Var,
        state: &mut BTreeMap<Var, VisitState>,
        order: &mut Vec<Var>,
        path: &mut Vec<Var>,
    ) -> Result<(), CycleError> {
        match state.get(node) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::InProgress) => {
                let start = path.iter().position(|v| v == node).unwrap_or(0);
                let mut cycle: Vec<Var> = path[start..].to_vec();
                cycle.push(node.clone());
                return Err(CycleError(cycle));
            }
            None => {}
        }

        state.insert(node.clone(), VisitState::InProgress);
        path.push(node.clone());

        if let Some(succs) = self.edges.get(node) {
            for next in succs {
                self.visit(next, state, order, path)?;
            }
        }

        path.pop();
        state.insert(node.clone(), VisitState::Done);
        order.push(node.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum VisitState {
    InProgress,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Var {
        Var::value(name)
    }

    fn position(order: &[Var], v: &Var) -> usize {
        order.iter().position(|x| x == v).unwrap()
    }

    #[test]
    fn test_empty_graph() {
        let g = DependencyGraph::new();
        assert!(g.ordered_visit().unwrap().is_empty());
    }

    #[test]
    fn test_chain_orders_source_first() {
        let a = var("a");
        let x = var("x");
        let mut g = DependencyGraph::new();
        g.add_edge(a.clone(), x.clone());

        let order = g.ordered_visit().unwrap();
        assert!(position(&order, &a) < position(&order, &x));
    }

    #[test]
    fn test_diamond() {
        let a = var("a");
        let b = var("b");
        let c = var("c");
        let d = var("d");
        let mut g = DependencyGraph::new();
        g.add_edge(a.clone(), b.clone());
        g.add_edge(a.clone(), c.clone());
        g.add_edge(b.clone(), d.clone());
        g.add_edge(c.clone(), d.clone());

        let order = g.ordered_visit().unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(&order, &a) < position(&order, &b));
        assert!(position(&order, &a) < position(&order, &c));
        assert!(position(&order, &b) < position(&order, &d));
        assert!(position(&order, &c) < position(&order, &d));
    }

    #[test]
    fn test_isolated_nodes_are_emitted() {
        let a = var("a");
        let b = var("b");
        let mut g = DependencyGraph::new();
        g.add_node(a.clone());
        g.add_node(b.clone());

        let order = g.ordered_visit().unwrap();
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let a = var("a");
        let b = var("b");
        let mut g = DependencyGraph::new();
        g.add_edge(a.clone(), b.clone());
        g.add_edge(b.clone(), a.clone());

        assert!(g.ordered_visit().is_err());
    }

    #[test]
    fn test_self_loop_is_rejected() {
        let a = var("a");
        let mut g = DependencyGraph::new();
        g.add_edge(a.clone(), a.clone());

        assert!(g.ordered_visit().is_err());
    }
}

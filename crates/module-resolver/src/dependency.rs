//! Dependency ordering for a batch of module updates.
//!
//! Edges point from dependent to dependency: if `forum` depends on `auth`,
//! the edge is `forum -> auth` and the topological order puts `auth` first.
//! Only dependencies that are themselves part of the batch become edges;
//! everything else is irrelevant to ordering.
//!
//! # Example
//!
//! ```
//! use module_resolver::dependency::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_node("forum");
//! graph.add_node("auth");
//! graph.add_edge("forum", "auth");
//!
//! assert_eq!(graph.topological_order(), vec!["auth", "forum"]);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Directed graph of in-batch module dependencies.
///
/// Cycles are tolerated: the sort treats a back edge as already satisfied,
/// so every node appears exactly once in the output regardless of shape.
/// Nodes are visited in name order, which makes the output deterministic.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Adjacency list: key depends on each value. Every node has an entry.
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a batch.
    ///
    /// `dependencies_of` returns the full declared dependency list of a
    /// module; entries not in `names` are dropped.
    pub fn for_batch<I, S, F, D>(names: I, dependencies_of: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&str) -> D,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        let mut graph = Self::new();
        for name in names {
            graph.add_node(name.as_ref());
        }

        let batch: Vec<String> = graph.edges.keys().cloned().collect();
        for name in &batch {
            for dep in dependencies_of(name.as_str()) {
                let dep = dep.as_ref();
                if graph.edges.contains_key(dep) {
                    graph.add_edge(name, dep);
                }
            }
        }
        graph
    }

    /// Add a node. Adding an existing node is a no-op.
    pub fn add_node(&mut self, id: &str) {
        if !self.edges.contains_key(id) {
            self.edges.insert(id.to_string(), BTreeSet::new());
        }
    }

    /// Declare that `from` depends on `to`. Unknown endpoints are added.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(from);
        self.add_node(to);
        if let Some(deps) = self.edges.get_mut(from) {
            deps.insert(to.to_string());
        }
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|deps| deps.len()).sum()
    }

    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .get(id)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Depth-first topological order, dependencies first.
    ///
    /// Never fails. With no cycles every node follows all of its
    /// dependencies; with cycles the order is total but not strictly valid.
    pub fn topological_order(&self) -> Vec<String> {
        let mut visited = HashSet::with_capacity(self.edges.len());
        let mut visiting = HashSet::new();
        let mut order = Vec::with_capacity(self.edges.len());

        for node in self.edges.keys() {
            self.visit(node, &mut visited, &mut visiting, &mut order);
        }
        order
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        visiting: &mut HashSet<&'a str>,
        order: &mut Vec<String>,
    ) {
        if visited.contains(node) {
            return;
        }
        if visiting.contains(node) {
            tracing::debug!(module = node, "Dependency cycle detected, treating edge as satisfied");
            return;
        }

        visiting.insert(node);
        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                self.visit(dep, visited, visiting, order);
            }
        }
        visiting.remove(node);
        visited.insert(node);
        order.push(node.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|n| n == id).unwrap()
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::new();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.topological_order().is_empty());
    }

    #[test]
    fn test_linear_chain() {
        let mut graph = DependencyGraph::new();
        graph.add_node("forum");
        graph.add_node("auth");
        graph.add_edge("forum", "auth");

        assert_eq!(graph.topological_order(), vec!["auth", "forum"]);
    }

    #[test]
    fn test_diamond_dependency() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("top", "left");
        graph.add_edge("top", "right");
        graph.add_edge("left", "base");
        graph.add_edge("right", "base");

        let order = graph.topological_order();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], "base");
        assert_eq!(order[3], "top");
    }

    #[test]
    fn test_three_node_cycle_terminates() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        graph.add_edge("c", "a");

        let order = graph.topological_order();
        assert_eq!(order.len(), 3);
        let unique: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        assert_eq!(unique, BTreeSet::from(["a", "b", "c"]));
    }

    #[test]
    fn test_self_dependency_is_absorbed() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("loop", "loop");
        assert_eq!(graph.topological_order(), vec!["loop"]);
    }

    #[test]
    fn test_independent_nodes_sorted_by_name() {
        let mut graph = DependencyGraph::new();
        graph.add_node("zebra");
        graph.add_node("alpha");
        graph.add_node("mid");

        assert_eq!(graph.topological_order(), vec!["alpha", "mid", "zebra"]);
    }

    #[test]
    fn test_for_batch_drops_out_of_batch_dependencies() {
        let deps: BTreeMap<&str, Vec<&str>> = [
            ("forum", vec!["auth", "media"]),
            ("auth", vec!["users"]),
            ("gallery", vec![]),
        ]
        .into_iter()
        .collect();

        let graph = DependencyGraph::for_batch(["forum", "gallery", "auth"], |name| {
            deps.get(name).cloned().unwrap_or_default()
        });

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.dependencies_of("forum"), vec!["auth"]);
        assert!(graph.dependencies_of("auth").is_empty());

        let order = graph.topological_order();
        assert!(position(&order, "auth") < position(&order, "forum"));
    }

    #[test]
    fn test_duplicate_nodes_collapse() {
        let mut graph = DependencyGraph::new();
        graph.add_node("auth");
        graph.add_node("auth");
        graph.add_edge("auth", "users");
        graph.add_edge("auth", "users");
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }
}

//! Dependency graph between the statements of a model

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use indexmap::{IndexMap, IndexSet};
use petgraph::prelude::*;
use tracing::warn;
use uuid::Uuid;

use crate::statement::Statement;

/// Producer/consumer relation between statements.
///
/// Nodes are statement positions; an edge runs from the producer of a
/// name to each statement consuming it. The producer a consumer reads is
/// the last writer of the name before it, or the last writer overall when
/// none precedes it.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<Uuid, String>,
    nodes: Vec<NodeIndex>,
    writers: IndexMap<String, Vec<usize>>,
    readers: IndexMap<String, Vec<usize>>,
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Build the graph of `statements`.
    pub fn build(statements: &[Statement]) -> Self {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = statements.iter().map(|s| graph.add_node(s.uuid())).collect();

        let mut writers: IndexMap<String, Vec<usize>> = IndexMap::new();
        let mut readers: IndexMap<String, Vec<usize>> = IndexMap::new();
        let inputs: Vec<IndexSet<String>> = statements.iter().map(Statement::input_names).collect();
        for (i, stmt) in statements.iter().enumerate() {
            for name in stmt.output_names() {
                writers.entry(name).or_default().push(i);
            }
            for name in &inputs[i] {
                readers.entry(name.clone()).or_default().push(i);
            }
        }

        for (consumer, names) in inputs.iter().enumerate() {
            for name in names {
                let Some(positions) = writers.get(name) else {
                    continue;
                };
                let producer = positions
                    .iter()
                    .rev()
                    .find(|&&p| p < consumer)
                    .or_else(|| positions.iter().rev().find(|&&p| p != consumer));
                if let Some(&producer) = producer {
                    graph.update_edge(nodes[producer], nodes[consumer], name.clone());
                }
            }
        }

        let order = kahn_order(&graph, &nodes);
        Self {
            graph,
            nodes,
            writers,
            readers,
            order,
        }
    }

    /// Statement positions, producers before consumers.
    ///
    /// Independent statements keep their relative order. Statements on a
    /// cycle are appended in their original order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Position of the last statement writing `name`
    pub fn producer_of(&self, name: &str) -> Option<usize> {
        self.writers.get(name).and_then(|w| w.last().copied())
    }

    /// Positions of the statements reading `name`
    pub fn consumers_of(&self, name: &str) -> &[usize] {
        self.readers.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Last writer of every name
    pub fn producers(&self) -> IndexMap<String, Uuid> {
        self.writers
            .iter()
            .filter_map(|(name, w)| w.last().map(|&p| (name.clone(), self.graph[self.nodes[p]])))
            .collect()
    }

    /// Consumer uuid to the uuids of the statements it reads from
    pub fn dependencies(&self) -> IndexMap<Uuid, IndexSet<Uuid>> {
        self.nodes
            .iter()
            .map(|&node| {
                let producers = self
                    .graph
                    .neighbors_directed(node, Incoming)
                    .map(|p| self.graph[p])
                    .collect();
                (self.graph[node], producers)
            })
            .collect()
    }

    /// `start` and every statement that transitively consumes its outputs
    pub fn downstream(&self, start: impl IntoIterator<Item = usize>) -> IndexSet<usize> {
        self.reach(start, Outgoing)
    }

    /// `start` and every statement it transitively reads from
    pub fn upstream(&self, start: impl IntoIterator<Item = usize>) -> IndexSet<usize> {
        self.reach(start, Incoming)
    }

    fn reach(&self, start: impl IntoIterator<Item = usize>, dir: Direction) -> IndexSet<usize> {
        let mut seen = IndexSet::new();
        let mut stack: Vec<usize> = start.into_iter().collect();
        while let Some(pos) = stack.pop() {
            if !seen.insert(pos) {
                continue;
            }
            stack.extend(
                self.graph
                    .neighbors_directed(self.nodes[pos], dir)
                    .map(|n| n.index()),
            );
        }
        seen
    }
}

/// Kahn's algorithm, always releasing the earliest ready statement.
fn kahn_order(graph: &DiGraph<Uuid, String>, nodes: &[NodeIndex]) -> Vec<usize> {
    let mut pending: Vec<usize> = nodes
        .iter()
        .map(|&n| graph.neighbors_directed(n, Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = pending
        .iter()
        .enumerate()
        .filter(|(_, &count)| count == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    let mut placed = vec![false; nodes.len()];
    while let Some(Reverse(pos)) = ready.pop() {
        order.push(pos);
        placed[pos] = true;
        for next in graph.neighbors_directed(nodes[pos], Outgoing) {
            let i = next.index();
            pending[i] -= 1;
            if pending[i] == 0 {
                ready.push(Reverse(i));
            }
        }
    }

    if order.len() < nodes.len() {
        let cyclic: Vec<Uuid> = (0..nodes.len())
            .filter(|&i| !placed[i])
            .map(|i| graph[nodes[i]])
            .collect();
        warn!(statements = ?cyclic, "cyclic dependency, keeping original order");
        order.extend((0..nodes.len()).filter(|&i| !placed[i]));
    }
    order
}

//! Adjacency lists over workflow graph nodes.
//!
//! Nodes are the dense indices `0..N`, so both directions are plain
//! `Vec<Vec<usize>>` lookups.

use lineage_core::WorkflowEdge;

/// Children and parents of every node.
#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    /// `children[i]` = targets of edges leaving node `i`.
    pub children: Vec<Vec<usize>>,
    /// `parents[i]` = sources of edges entering node `i`.
    pub parents: Vec<Vec<usize>>,
}

impl Adjacency {
    /// Build from edges over `node_count` nodes. Edges naming a node outside
    /// the range are ignored.
    pub fn from_edges(node_count: usize, edges: &[WorkflowEdge]) -> Self {
        let mut children = vec![Vec::new(); node_count];
        let mut parents = vec![Vec::new(); node_count];

        for edge in edges {
            if edge.source >= node_count || edge.target >= node_count {
                tracing::warn!(
                    source = edge.source,
                    target = edge.target,
                    node_count,
                    "Edge references unknown node"
                );
                continue;
            }
            children[edge.source].push(edge.target);
            parents[edge.target].push(edge.source);
        }

        Self { children, parents }
    }

    pub fn node_count(&self) -> usize {
        self.children.len()
    }

    pub fn edge_count(&self) -> usize {
        self.children.iter().map(Vec::len).sum()
    }

    /// Nodes with no incoming edge.
    pub fn roots(&self) -> Vec<usize> {
        (0..self.node_count())
            .filter(|&i| self.parents[i].is_empty())
            .collect()
    }

    /// Nodes with no outgoing edge.
    pub fn leaves(&self) -> Vec<usize> {
        (0..self.node_count())
            .filter(|&i| self.children[i].is_empty())
            .collect()
    }
}

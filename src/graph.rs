//! Multigraph snapshot and the adjacency view the walker consumes.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GraphInputError;

/// A graph view that returns **borrowed** neighbor slices.
///
/// A node linked to `v` by two edges lists `v` twice, so multiplicity is the
/// sampling weight of a uniform draw from the slice.
pub trait GraphRef {
    fn node_count(&self) -> usize;
    fn neighbors_ref(&self, node: usize) -> &[usize];
    fn degree(&self, node: usize) -> usize {
        self.neighbors_ref(node).len()
    }
    /// Sum of degrees, counting parallel edges individually.
    fn total_degree(&self) -> usize {
        (0..self.node_count()).map(|u| self.degree(u)).sum()
    }
}

/// Node category. Informational only; the walk ignores it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Gene,
    OntologyTerm,
    Family,
    #[default]
    Other,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gene => "gene",
            Self::OntologyTerm => "ontology_term",
            Self::Family => "family",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// One undirected edge instance. Parallel edges are separate `Edge`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub relation: u32,
}

/// Immutable undirected multigraph with dense node indices `0..n`.
///
/// Built once through [`MultiGraphBuilder`] and shared read-only (usually
/// behind an `Arc`) by every replicate.
#[derive(Debug, Clone, Default)]
pub struct MultiGraph {
    ids: Vec<String>,
    kinds: Vec<NodeKind>,
    index: HashMap<String, usize>,
    adj: Vec<Vec<usize>>,
    edges: Vec<Edge>,
    relations: Vec<String>,
}

impl MultiGraph {
    pub fn builder() -> MultiGraphBuilder {
        MultiGraphBuilder::default()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn id(&self, node: usize) -> &str {
        &self.ids[node]
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn kind(&self, node: usize) -> NodeKind {
        self.kinds[node]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn relation(&self, relation: u32) -> &str {
        &self.relations[relation as usize]
    }

    /// Node counts per [`NodeKind`], in declaration order of the kinds.
    pub fn kind_counts(&self) -> Vec<(NodeKind, usize)> {
        [NodeKind::Gene, NodeKind::OntologyTerm, NodeKind::Family, NodeKind::Other]
            .into_iter()
            .map(|k| (k, self.kinds.iter().filter(|&&x| x == k).count()))
            .collect()
    }

    /// Nodes with no incident edge. They never start a walk.
    pub fn isolated_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.adj
            .iter()
            .enumerate()
            .filter(|(_, nbrs)| nbrs.is_empty())
            .map(|(u, _)| u)
    }
}

impl GraphRef for MultiGraph {
    fn node_count(&self) -> usize {
        self.ids.len()
    }

    fn neighbors_ref(&self, node: usize) -> &[usize] {
        self.adj.get(node).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Incremental construction of a [`MultiGraph`].
#[derive(Debug, Default)]
pub struct MultiGraphBuilder {
    graph: MultiGraph,
    relation_index: HashMap<String, u32>,
}

impl MultiGraphBuilder {
    /// Add a node; duplicate ids are rejected.
    pub fn add_node(&mut self, id: &str, kind: NodeKind) -> Result<usize, GraphInputError> {
        if self.graph.index.contains_key(id) {
            return Err(GraphInputError::DuplicateNode(id.to_string()));
        }
        Ok(self.insert_node(id, kind))
    }

    /// Index of `id`, inserting it with kind `Other` on first sight.
    pub fn node_or_insert(&mut self, id: &str) -> usize {
        match self.graph.index.get(id) {
            Some(&u) => u,
            None => self.insert_node(id, NodeKind::Other),
        }
    }

    fn insert_node(&mut self, id: &str, kind: NodeKind) -> usize {
        let u = self.graph.ids.len();
        self.graph.ids.push(id.to_string());
        self.graph.kinds.push(kind);
        self.graph.adj.push(Vec::new());
        self.graph.index.insert(id.to_string(), u);
        u
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.graph.index_of(id)
    }

    /// Add one undirected edge instance between existing nodes.
    ///
    /// A self-loop contributes a single adjacency entry.
    pub fn add_edge(&mut self, a: usize, b: usize, relation: &str) {
        debug_assert!(a < self.graph.ids.len() && b < self.graph.ids.len());
        let rel = match self.relation_index.get(relation) {
            Some(&r) => r,
            None => {
                let r = self.graph.relations.len() as u32;
                self.graph.relations.push(relation.to_string());
                self.relation_index.insert(relation.to_string(), r);
                r
            }
        };
        self.graph.edges.push(Edge { source: a, target: b, relation: rel });
        self.graph.adj[a].push(b);
        if a != b {
            self.graph.adj[b].push(a);
        }
    }

    pub fn build(self) -> MultiGraph {
        self.graph
    }
}

#[cfg(feature = "petgraph")]
impl MultiGraph {
    /// Convert an undirected petgraph graph; node weights become ids, edge weights relations.
    pub fn from_petgraph<N, E>(
        g: &petgraph::Graph<N, E, petgraph::Undirected>,
    ) -> Result<Self, GraphInputError>
    where
        N: fmt::Display,
        E: fmt::Display,
    {
        use petgraph::visit::EdgeRef;

        let mut builder = Self::builder();
        for idx in g.node_indices() {
            builder.add_node(&g[idx].to_string(), NodeKind::Other)?;
        }
        for e in g.edge_references() {
            builder.add_edge(e.source().index(), e.target().index(), &e.weight().to_string());
        }
        Ok(builder.build())
    }
}

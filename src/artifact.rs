//! Serialized graph artifacts: JSON documents and tab-separated edge lists.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::GraphInputError;
use crate::graph::{GraphRef, MultiGraph, NodeKind};

const DEFAULT_RELATION: &str = "related";

/// A node entry: a bare id or an id with its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    Id(String),
    Typed {
        id: String,
        #[serde(default)]
        kind: NodeKind,
    },
}

impl NodeSpec {
    fn parts(&self) -> (&str, NodeKind) {
        match self {
            Self::Id(id) => (id, NodeKind::Other),
            Self::Typed { id, kind } => (id, *kind),
        }
    }
}

/// An edge entry: `[a, b, relation]`, `[a, b]` or an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeSpec {
    Triple(String, String, String),
    Pair(String, String),
    Object {
        source: String,
        target: String,
        #[serde(default)]
        relation: Option<String>,
    },
}

impl EdgeSpec {
    fn parts(&self) -> (&str, &str, &str) {
        match self {
            Self::Triple(a, b, r) => (a, b, r),
            Self::Pair(a, b) => (a, b, DEFAULT_RELATION),
            Self::Object { source, target, relation } => {
                (source, target, relation.as_deref().unwrap_or(DEFAULT_RELATION))
            }
        }
    }
}

/// JSON form of a multigraph. Duplicate edges are meaningful.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphArtifact {
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

impl GraphArtifact {
    /// Build the graph. Every edge endpoint must be a declared node.
    pub fn into_graph(self) -> Result<MultiGraph, GraphInputError> {
        if self.nodes.is_empty() {
            return Err(GraphInputError::Empty);
        }
        let mut builder = MultiGraph::builder();
        for node in &self.nodes {
            let (id, kind) = node.parts();
            builder.add_node(id, kind)?;
        }
        for (i, edge) in self.edges.iter().enumerate() {
            let (a, b, rel) = edge.parts();
            let resolve = |id: &str| {
                builder.index_of(id).ok_or_else(|| GraphInputError::DanglingEdge {
                    edge: i,
                    node: id.to_string(),
                })
            };
            let (ua, ub) = (resolve(a)?, resolve(b)?);
            builder.add_edge(ua, ub, rel);
        }
        Ok(builder.build())
    }

    /// Snapshot of a built graph, typed nodes and triple edges.
    pub fn from_graph(graph: &MultiGraph) -> Self {
        let nodes = (0..graph.node_count())
            .map(|u| NodeSpec::Typed { id: graph.id(u).to_string(), kind: graph.kind(u) })
            .collect();
        let edges = graph
            .edges()
            .iter()
            .map(|e| {
                EdgeSpec::Triple(
                    graph.id(e.source).to_string(),
                    graph.id(e.target).to_string(),
                    graph.relation(e.relation).to_string(),
                )
            })
            .collect();
        Self { nodes, edges }
    }
}

pub fn parse_json(text: &str) -> Result<MultiGraph, GraphInputError> {
    let artifact: GraphArtifact =
        serde_json::from_str(text).map_err(|e| GraphInputError::Malformed(e.to_string()))?;
    artifact.into_graph()
}

/// Parse `a<TAB>b[<TAB>relation]` lines. Lines without a tab split on whitespace.
///
/// Nodes are inferred in order of first appearance.
pub fn parse_edge_list(text: &str) -> Result<MultiGraph, GraphInputError> {
    let mut builder = MultiGraph::builder();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = if line.contains('\t') {
            line.split('\t').map(str::trim).collect()
        } else {
            line.split_whitespace().collect()
        };
        let (a, b, rel) = match fields.as_slice() {
            [a, b] => (*a, *b, DEFAULT_RELATION),
            [a, b, r] => (*a, *b, *r),
            _ => {
                return Err(GraphInputError::MalformedLine {
                    line: lineno + 1,
                    message: format!("expected 2 or 3 fields, found {}", fields.len()),
                })
            }
        };
        if a.is_empty() || b.is_empty() {
            return Err(GraphInputError::MalformedLine {
                line: lineno + 1,
                message: "empty node id".to_string(),
            });
        }
        let ua = builder.node_or_insert(a);
        let ub = builder.node_or_insert(b);
        builder.add_edge(ua, ub, rel);
    }
    let graph = builder.build();
    if graph.node_count() == 0 {
        return Err(GraphInputError::Empty);
    }
    Ok(graph)
}

/// Load a graph artifact; `.json` files are JSON, anything else an edge list.
pub fn load_graph(path: &Path) -> Result<MultiGraph, GraphInputError> {
    let text = std::fs::read_to_string(path).map_err(|source| GraphInputError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let graph = if is_json { parse_json(&text)? } else { parse_edge_list(&text)? };
    info!(
        path = %path.display(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        isolated = graph.isolated_nodes().count(),
        "loaded graph"
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_accepts_mixed_node_and_edge_forms() {
        let text = r#"{
            "nodes": ["A", {"id": "GO:1", "kind": "ontology_term"}, {"id": "FPLX:X"}],
            "edges": [
                ["A", "GO:1", "annotation"],
                ["A", "GO:1"],
                {"source": "A", "target": "FPLX:X", "relation": "isa"}
            ]
        }"#;
        let g = parse_json(text).unwrap();
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.kind(1), NodeKind::OntologyTerm);
        assert_eq!(g.kind(2), NodeKind::Other);
        assert_eq!(g.neighbors_ref(0), &[1, 1, 2]);
        assert_eq!(g.relation(g.edges()[1].relation), DEFAULT_RELATION);
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let text = r#"{"nodes": ["A"], "edges": [["A", "B", "r"]]}"#;
        match parse_json(text) {
            Err(GraphInputError::DanglingEdge { edge, node }) => {
                assert_eq!(edge, 0);
                assert_eq!(node, "B");
            }
            other => panic!("expected dangling edge, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_and_empty_graph() {
        assert!(matches!(parse_json("{not json"), Err(GraphInputError::Malformed(_))));
        assert!(matches!(
            parse_json(r#"{"nodes": [], "edges": []}"#),
            Err(GraphInputError::Empty)
        ));
    }

    #[test]
    fn edge_list_infers_nodes_and_skips_comments() {
        let text = "# header\nA\tB\tbinds\n\nB C\nA\tB\tbinds\n";
        let g = parse_edge_list(text).unwrap();
        assert_eq!(g.ids(), ["A", "B", "C"]);
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.degree(1), 3);
    }

    #[test]
    fn edge_list_reports_line_numbers() {
        let err = parse_edge_list("A\tB\nA\n").unwrap_err();
        assert!(matches!(err, GraphInputError::MalformedLine { line: 2, .. }));
    }

    #[test]
    fn snapshot_round_trips_multiplicity() {
        let g = parse_edge_list("A\tB\tx\nA\tB\tx\nB\tC\ty\n").unwrap();
        let again = GraphArtifact::from_graph(&g).into_graph().unwrap();
        assert_eq!(again.ids(), g.ids());
        assert_eq!(again.neighbors_ref(0), g.neighbors_ref(0));
        assert_eq!(again.edge_count(), 3);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = load_graph(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, GraphInputError::Unreadable { .. }));
    }
}

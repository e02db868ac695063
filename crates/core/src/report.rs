/// Structural reports emitted by control-flow flattening.
///
/// A `FlatteningReport` records, for one flattened function or program, the block graph that was
/// folded into the dispatch switch: every block's label, state values and provenance, and the
/// edges its `goto`s encoded. The graph is what the `cfg` command renders and what the tests use
/// to prove that injected dead code is unreachable.
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeFiltered};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Where a block came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    /// Holds original statements.
    Real,
    /// Injected filler that is never dispatched to.
    Fake,
    /// A copy of a real block under a new label, never dispatched to.
    Clone,
    /// The terminal block; reaching its state exits the dispatch loop.
    End,
}

/// Kind of control transfer a `goto` encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Unconditional continuation.
    Jump,
    /// One arm of a flattened `if`.
    Branch,
    /// Guarded by a constant-false test; never taken.
    Dead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSummary {
    pub label: String,
    pub total_state: i64,
    pub state_values: Vec<i64>,
    pub kind: BlockKind,
    pub statements: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSummary {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// Names allocated by one lexical scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeSummary {
    pub id: usize,
    pub parent: Option<usize>,
    pub frame: usize,
    /// Original binding name to scope-object property.
    pub names: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatteningReport {
    /// Function name, or `<program>`.
    pub target: String,
    pub state_vars: Vec<String>,
    pub dispatch_name: String,
    pub start_label: String,
    pub end_label: String,
    /// Entry labels of nested functions relocated into the graph.
    pub relocated_entries: Vec<(String, String)>,
    pub blocks: Vec<BlockSummary>,
    pub edges: Vec<EdgeSummary>,
    pub scopes: Vec<ScopeSummary>,
}

impl FlatteningReport {
    /// Builds a petgraph view of the block graph.
    pub fn graph(&self) -> (DiGraph<BlockSummary, EdgeKind>, HashMap<String, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for block in &self.blocks {
            index.insert(block.label.clone(), graph.add_node(block.clone()));
        }
        for edge in &self.edges {
            if let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) {
                graph.add_edge(from, to, edge.kind);
            }
        }
        (graph, index)
    }

    /// Labels reachable from the start block or any relocated function entry without
    /// following dead edges.
    pub fn reachable_labels(&self) -> HashSet<String> {
        let (graph, index) = self.graph();
        let live = EdgeFiltered::from_fn(&graph, |e| *e.weight() != EdgeKind::Dead);
        let roots = std::iter::once(&self.start_label)
            .chain(self.relocated_entries.iter().map(|(_, label)| label));

        let mut reachable = HashSet::new();
        for root in roots {
            let Some(&start) = index.get(root) else {
                continue;
            };
            let mut bfs = Bfs::new(&live, start);
            while let Some(node) = bfs.next(&live) {
                reachable.insert(graph[node].label.clone());
            }
        }
        reachable
    }

    pub fn block(&self, label: &str) -> Option<&BlockSummary> {
        self.blocks.iter().find(|b| b.label == label)
    }

    /// Renders the block graph as Graphviz DOT.
    pub fn to_dot(&self) -> String {
        let mut dot = format!("digraph \"{}\" {{\n", self.target);
        for block in &self.blocks {
            let shape = match block.kind {
                BlockKind::Real => "box",
                BlockKind::Fake => "diamond",
                BlockKind::Clone => "octagon",
                BlockKind::End => "doublecircle",
            };
            dot.push_str(&format!(
                "    \"{}\" [shape={shape}, label=\"{}\\nstate {} {:?}\\n{} stmt(s)\"];\n",
                block.label, block.label, block.total_state, block.state_values, block.statements
            ));
        }
        for edge in &self.edges {
            let style = match edge.kind {
                EdgeKind::Jump => "solid",
                EdgeKind::Branch => "bold",
                EdgeKind::Dead => "dashed",
            };
            dot.push_str(&format!(
                "    \"{}\" -> \"{}\" [style={style}, label=\"{:?}\"];\n",
                edge.from, edge.to, edge.kind
            ));
        }
        dot.push_str("}\n");
        dot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(label: &str, kind: BlockKind) -> BlockSummary {
        BlockSummary {
            label: label.into(),
            total_state: 0,
            state_values: vec![0, 0],
            kind,
            statements: 1,
        }
    }

    fn edge(from: &str, to: &str, kind: EdgeKind) -> EdgeSummary {
        EdgeSummary {
            from: from.into(),
            to: to.into(),
            kind,
        }
    }

    fn sample() -> FlatteningReport {
        FlatteningReport {
            target: "f".into(),
            state_vars: vec!["s0".into(), "s1".into()],
            dispatch_name: "d".into(),
            start_label: "start".into(),
            end_label: "end".into(),
            relocated_entries: vec![("g".into(), "g_entry".into())],
            blocks: vec![
                block("start", BlockKind::Real),
                block("mid", BlockKind::Real),
                block("fake", BlockKind::Fake),
                block("g_entry", BlockKind::Real),
                block("end", BlockKind::End),
            ],
            edges: vec![
                edge("start", "mid", EdgeKind::Jump),
                edge("mid", "fake", EdgeKind::Dead),
                edge("mid", "end", EdgeKind::Jump),
                edge("fake", "mid", EdgeKind::Jump),
            ],
            scopes: vec![],
        }
    }

    #[test]
    fn test_reachability_skips_dead_edges() {
        let reachable = sample().reachable_labels();
        assert!(reachable.contains("mid"));
        assert!(reachable.contains("end"));
        assert!(reachable.contains("g_entry"), "relocated entries are roots");
        assert!(!reachable.contains("fake"), "fake block only has a dead in-edge");
    }

    #[test]
    fn test_dot_output_lists_nodes_and_edges() {
        let dot = sample().to_dot();
        assert!(dot.starts_with("digraph \"f\""));
        assert!(dot.contains("\"mid\" -> \"fake\" [style=dashed"));
        assert!(dot.contains("shape=doublecircle"));
    }
}

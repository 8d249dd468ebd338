//! Dependency graph over classified cells.
//!
//! Edges go from producer to consumer, recovered from each cell's
//! `cell_refs`. The graph exists to reject cycles at compile time and to
//! give the generated page a deterministic initial-compute order.

use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;

use super::ClassifiedCell;
use crate::document::{Cell, CellId};
use crate::error::{Error, Result};

/// The recovered producer-to-consumer edges of one document.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<CellId, ()>,
    node_indices: FxHashMap<CellId, NodeIndex>,
    /// Declared name to producing cell.
    producers: FxHashMap<String, CellId>,
}

impl DependencyGraph {
    /// Build the graph and reject cycles.
    pub fn build(cells: &[Cell], classified: &[ClassifiedCell]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut node_indices = FxHashMap::default();
        let mut producers = FxHashMap::default();

        for cell in cells {
            let idx = graph.add_node(cell.id);
            node_indices.insert(cell.id, idx);
        }
        for c in classified {
            for name in &c.declared_names {
                producers.insert(name.clone(), c.id);
            }
        }

        for c in classified {
            for name in &c.cell_refs {
                // cell_refs is a subset of the namespace universe, so the
                // producer lookup cannot miss.
                let Some(&producer) = producers.get(name) else {
                    return Err(Error::CellNotFound(format!(
                        "no cell produces '{}', referenced by {}",
                        name, c.id
                    )));
                };
                graph.add_edge(node_indices[&producer], node_indices[&c.id], ());
            }
        }

        let built = Self {
            graph,
            node_indices,
            producers,
        };
        built.detect_cycles()?;
        Ok(built)
    }

    /// Find strongly connected components larger than one cell.
    fn detect_cycles(&self) -> Result<()> {
        use petgraph::algo::kosaraju_scc;

        for scc in kosaraju_scc(&self.graph) {
            if scc.len() > 1 {
                let mut names: Vec<String> =
                    scc.iter().map(|&idx| self.graph[idx].to_string()).collect();
                names.sort();
                return Err(Error::CyclicDependency(names.join(" → ")));
            }
        }
        Ok(())
    }

    /// Cells in topological order.
    pub fn topological_order(&self) -> Result<Vec<CellId>> {
        use petgraph::algo::toposort;

        toposort(&self.graph, None)
            .map(|nodes| nodes.into_iter().map(|idx| self.graph[idx]).collect())
            .map_err(|cycle| {
                Error::CyclicDependency(format!("cycle at {}", self.graph[cycle.node_id()]))
            })
    }

    /// The cell producing a namespace name, if any.
    pub fn producer_of(&self, name: &str) -> Option<CellId> {
        self.producers.get(name).copied()
    }

    /// Direct consumers of a cell's declared names.
    pub fn dependents(&self, id: CellId) -> Vec<CellId> {
        self.node_indices
            .get(&id)
            .map(|&idx| self.graph.neighbors(idx).map(|n| self.graph[n]).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{classify, namespace_universe};
    use crate::document::Placement;

    fn make_cell(id: usize, declares: &[&str], references: &[&str]) -> Cell {
        Cell {
            id: CellId::new(id),
            source_text: String::new(),
            is_expression: false,
            is_async: false,
            placement: Placement::Block,
            declared_names: declares.iter().map(|s| s.to_string()).collect(),
            referenced_names: references.iter().map(|s| s.to_string()).collect(),
            import_specifiers: Vec::new(),
        }
    }

    fn build(cells: Vec<Cell>) -> Result<DependencyGraph> {
        let universe = namespace_universe(&cells);
        let classified: Vec<_> = cells.iter().map(|c| classify(c, &universe)).collect();
        DependencyGraph::build(&cells, &classified)
    }

    #[test]
    fn test_linear_order() {
        let graph = build(vec![
            make_cell(0, &["a"], &[]),
            make_cell(1, &["b"], &["a"]),
            make_cell(2, &["c"], &["b"]),
        ])
        .unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec![CellId::new(0), CellId::new(1), CellId::new(2)]);
    }

    #[test]
    fn test_diamond_order() {
        let graph = build(vec![
            make_cell(0, &["a"], &[]),
            make_cell(1, &["b"], &["a"]),
            make_cell(2, &["c"], &["a"]),
            make_cell(3, &["d"], &["b", "c"]),
        ])
        .unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(order[0], CellId::new(0));
        assert_eq!(order[3], CellId::new(3));
    }

    #[test]
    fn test_cycle_rejected() {
        let err = build(vec![
            make_cell(0, &["a"], &["c"]),
            make_cell(1, &["b"], &["a"]),
            make_cell(2, &["c"], &["b"]),
        ])
        .unwrap_err();

        assert!(matches!(err, Error::CyclicDependency(_)));
    }

    #[test]
    fn test_dependents() {
        let graph = build(vec![
            make_cell(0, &["a"], &[]),
            make_cell(1, &["b"], &["a"]),
            make_cell(2, &[], &["a"]),
        ])
        .unwrap();

        let mut deps = graph.dependents(CellId::new(0));
        deps.sort_by_key(|id| id.as_usize());
        assert_eq!(deps, vec![CellId::new(1), CellId::new(2)]);
        assert_eq!(graph.producer_of("b"), Some(CellId::new(1)));
    }
}

//! petgraph-based arena over a pipeline's nodes and edges.
//!
//! Building never fails: duplicate ids and edges with a missing endpoint are
//! recorded so the validator can report them, and the remaining structure is
//! still queryable.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::{Bfs, EdgeRef, Reversed};

use super::types::{Edge, Pipeline};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeLabel {
    pub source_port: String,
    pub target_port: String,
}

/// One endpoint-resolved edge, seen from the node being queried.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Link {
    /// The node on the other side of the edge.
    pub peer: String,
    pub local_port: String,
    pub peer_port: String,
}

/// The graph contains at least one directed cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("pipeline contains a cycle: {}", .nodes.join(" -> "))]
pub struct CycleError {
    /// One concrete cycle in edge direction, starting at its first-declared member.
    pub nodes: Vec<String>,
}

pub struct GraphModel {
    pub graph: DiGraph<String, EdgeLabel>,
    pub node_indices: HashMap<String, NodeIndex>,
    duplicates: Vec<String>,
    dangling: Vec<Edge>,
}

impl GraphModel {
    pub fn build(pipeline: &Pipeline) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();
        let mut duplicates = Vec::new();
        let mut dangling = Vec::new();

        for node in &pipeline.nodes {
            if node_indices.contains_key(&node.id) {
                if !duplicates.contains(&node.id) {
                    duplicates.push(node.id.clone());
                }
                continue;
            }
            let idx = graph.add_node(node.id.clone());
            node_indices.insert(node.id.clone(), idx);
        }

        for edge in &pipeline.edges {
            match (
                node_indices.get(&edge.source),
                node_indices.get(&edge.target),
            ) {
                (Some(&s), Some(&t)) => {
                    graph.add_edge(
                        s,
                        t,
                        EdgeLabel {
                            source_port: edge.source_port.clone(),
                            target_port: edge.target_port.clone(),
                        },
                    );
                }
                _ => dangling.push(edge.clone()),
            }
        }

        GraphModel {
            graph,
            node_indices,
            duplicates,
            dangling,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_indices.contains_key(id)
    }

    /// Ids declared more than once, in first-repeat order.
    pub fn duplicate_ids(&self) -> &[String] {
        &self.duplicates
    }

    /// Edges whose source or target does not exist, in declaration order.
    pub fn dangling_edges(&self) -> &[Edge] {
        &self.dangling
    }

    // =========================================================================
    // ORDERING
    // =========================================================================

    /// Kahn's algorithm with the ready set ordered by node id.
    pub fn topological_order(&self) -> Result<Vec<String>, CycleError> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.edges_directed(n, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<(&str, NodeIndex)>> = self
            .graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .map(|n| Reverse((self.graph[n].as_str(), n)))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((id, n))) = ready.pop() {
            order.push(id.to_string());
            for edge in self.graph.edges_directed(n, Direction::Outgoing) {
                let t = edge.target();
                in_degree[t.index()] -= 1;
                if in_degree[t.index()] == 0 {
                    ready.push(Reverse((self.graph[t].as_str(), t)));
                }
            }
        }

        if order.len() == self.graph.node_count() {
            Ok(order)
        } else {
            Err(self.extract_cycle(&in_degree))
        }
    }

    /// Every node left with a positive in-degree after Kahn has a residual
    /// predecessor, so walking predecessors must revisit a node.
    fn extract_cycle(&self, residual: &[usize]) -> CycleError {
        let in_residual = |n: NodeIndex| residual[n.index()] > 0;

        let Some(start) = self.graph.node_indices().find(|&n| in_residual(n)) else {
            return CycleError { nodes: Vec::new() };
        };

        let mut walk: Vec<NodeIndex> = Vec::new();
        let mut seen_at: HashMap<NodeIndex, usize> = HashMap::new();
        let mut current = start;
        loop {
            if let Some(&pos) = seen_at.get(&current) {
                walk.drain(..pos);
                break;
            }
            seen_at.insert(current, walk.len());
            walk.push(current);

            let next = self
                .graph
                .neighbors_directed(current, Direction::Incoming)
                .filter(|&p| in_residual(p))
                .min_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
            match next {
                Some(p) => current = p,
                None => break,
            }
        }

        // Walked against the edges; flip into edge direction.
        walk.reverse();
        if let Some(first) = walk
            .iter()
            .enumerate()
            .min_by_key(|(_, n)| n.index())
            .map(|(i, _)| i)
        {
            walk.rotate_left(first);
        }

        CycleError {
            nodes: walk.into_iter().map(|n| self.graph[n].clone()).collect(),
        }
    }

    // =========================================================================
    // REACHABILITY
    // =========================================================================

    /// Nodes reachable from `id` along edge direction, including `id`.
    pub fn reachable_from(&self, id: &str) -> BTreeSet<String> {
        let Some(&start) = self.node_indices.get(id) else {
            return BTreeSet::new();
        };
        let mut out = BTreeSet::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(n) = bfs.next(&self.graph) {
            out.insert(self.graph[n].clone());
        }
        out
    }

    /// Nodes from which `id` is reachable, including `id`.
    pub fn ancestors(&self, id: &str) -> BTreeSet<String> {
        let Some(&start) = self.node_indices.get(id) else {
            return BTreeSet::new();
        };
        let reversed = Reversed(&self.graph);
        let mut out = BTreeSet::new();
        let mut bfs = Bfs::new(reversed, start);
        while let Some(n) = bfs.next(reversed) {
            out.insert(self.graph[n].clone());
        }
        out
    }

    /// The nodes a run started at `trigger` evaluates: everything reachable
    /// from it plus the ancestors of those nodes, except ancestors for which
    /// `is_trigger` holds.
    pub fn trigger_scope(
        &self,
        trigger: &str,
        is_trigger: impl Fn(&str) -> bool,
    ) -> BTreeSet<String> {
        let reachable = self.reachable_from(trigger);
        let mut scope = reachable.clone();
        for id in &reachable {
            for ancestor in self.ancestors(id) {
                if !is_trigger(&ancestor) {
                    scope.insert(ancestor);
                }
            }
        }
        scope
    }

    /// Weakly-connected components, each sorted, ordered by their smallest id.
    pub fn components(&self) -> Vec<BTreeSet<String>> {
        let mut sets = UnionFind::new(self.graph.node_count());
        for edge in self.graph.edge_references() {
            sets.union(edge.source().index(), edge.target().index());
        }

        let mut grouped: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
        for n in self.graph.node_indices() {
            grouped
                .entry(sets.find(n.index()))
                .or_default()
                .insert(self.graph[n].clone());
        }

        let mut components: Vec<BTreeSet<String>> = grouped.into_values().collect();
        components.sort();
        components
    }

    // =========================================================================
    // ADJACENCY
    // =========================================================================

    /// Incoming edges of `id`, sorted by local port then peer.
    pub fn incoming(&self, id: &str) -> Vec<Link> {
        self.links(id, Direction::Incoming)
    }

    /// Outgoing edges of `id`, sorted by local port then peer.
    pub fn outgoing(&self, id: &str) -> Vec<Link> {
        self.links(id, Direction::Outgoing)
    }

    /// The single edge feeding `port` of `id`, if any.
    pub fn input(&self, id: &str, port: &str) -> Option<Link> {
        self.incoming(id).into_iter().find(|l| l.local_port == port)
    }

    fn links(&self, id: &str, dir: Direction) -> Vec<Link> {
        let Some(&idx) = self.node_indices.get(id) else {
            return Vec::new();
        };
        let mut links: Vec<Link> = self
            .graph
            .edges_directed(idx, dir)
            .map(|e| {
                let label = e.weight();
                match dir {
                    Direction::Incoming => Link {
                        peer: self.graph[e.source()].clone(),
                        local_port: label.target_port.clone(),
                        peer_port: label.source_port.clone(),
                    },
                    Direction::Outgoing => Link {
                        peer: self.graph[e.target()].clone(),
                        local_port: label.source_port.clone(),
                        peer_port: label.target_port.clone(),
                    },
                }
            })
            .collect();
        links.sort_by(|a, b| {
            (&a.local_port, &a.peer, &a.peer_port).cmp(&(&b.local_port, &b.peer, &b.peer_port))
        });
        links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::types::{Node, NodeCategory};

    fn pipeline(nodes: &[&str], edges: &[(&str, &str)]) -> Pipeline {
        let mut p = Pipeline::new("p", "");
        p.nodes = nodes
            .iter()
            .map(|id| Node::new(*id, NodeCategory::Logic, "log"))
            .collect();
        p.edges = edges
            .iter()
            .map(|(s, t)| Edge::new(*s, "out", *t, "in"))
            .collect();
        p
    }

    #[test]
    fn ties_break_by_id() {
        let g = GraphModel::build(&pipeline(&["c", "a", "b"], &[]));
        assert_eq!(g.topological_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn edges_constrain_order() {
        let g = GraphModel::build(&pipeline(&["a", "b", "z"], &[("z", "a"), ("a", "b")]));
        assert_eq!(g.topological_order().unwrap(), vec!["z", "a", "b"]);
    }

    #[test]
    fn cycle_is_rotated_to_first_declared() {
        let g = GraphModel::build(&pipeline(
            &["trigger", "A", "B"],
            &[("trigger", "A"), ("A", "B"), ("B", "trigger")],
        ));
        let err = g.topological_order().unwrap_err();
        assert_eq!(err.nodes, vec!["trigger", "A", "B"]);
    }

    #[test]
    fn cycle_behind_acyclic_prefix() {
        let g = GraphModel::build(&pipeline(
            &["root", "x", "y"],
            &[("root", "x"), ("x", "y"), ("y", "x")],
        ));
        let err = g.topological_order().unwrap_err();
        assert_eq!(err.nodes, vec!["x", "y"]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let g = GraphModel::build(&pipeline(&["a"], &[("a", "a")]));
        assert_eq!(g.topological_order().unwrap_err().nodes, vec!["a"]);
    }

    #[test]
    fn reachability_includes_start() {
        let g = GraphModel::build(&pipeline(&["a", "b", "c"], &[("a", "b")]));
        let r: Vec<_> = g.reachable_from("a").into_iter().collect();
        assert_eq!(r, vec!["a", "b"]);
        assert!(g.reachable_from("nope").is_empty());
    }

    #[test]
    fn dangling_and_duplicates_are_recorded() {
        let mut p = pipeline(&["a", "a", "b"], &[("a", "n99")]);
        p.edges.push(Edge::new("a", "out", "b", "in"));
        let g = GraphModel::build(&p);
        assert_eq!(g.duplicate_ids(), ["a".to_string()]);
        assert_eq!(g.dangling_edges().len(), 1);
        assert_eq!(g.dangling_edges()[0].target, "n99");
        assert_eq!(g.graph.node_count(), 2);
    }

    #[test]
    fn components_are_weak() {
        let g = GraphModel::build(&pipeline(&["a", "b", "c", "d"], &[("b", "a"), ("c", "d")]));
        let comps = g.components();
        assert_eq!(comps.len(), 2);
        assert!(comps[0].contains("a") && comps[0].contains("b"));
        assert!(comps[1].contains("c") && comps[1].contains("d"));
    }

    #[test]
    fn trigger_scope_pulls_in_feeders_but_not_siblings() {
        // t -> r <- tok -> d, r -> e
        let g = GraphModel::build(&pipeline(
            &["t", "tok", "r", "e", "d"],
            &[("t", "r"), ("tok", "r"), ("r", "e"), ("tok", "d")],
        ));
        let scope: Vec<_> = g.trigger_scope("t", |id| id == "t").into_iter().collect();
        assert_eq!(scope, vec!["e", "r", "t", "tok"]);
    }

    #[test]
    fn trigger_scope_skips_other_triggers() {
        let g = GraphModel::build(&pipeline(&["t1", "t2", "j"], &[("t1", "j"), ("t2", "j")]));
        let scope: Vec<_> = g
            .trigger_scope("t1", |id| id.starts_with('t'))
            .into_iter()
            .collect();
        assert_eq!(scope, vec!["j", "t1"]);
    }

    #[test]
    fn ancestors_walk_backwards() {
        let g = GraphModel::build(&pipeline(&["a", "b", "c"], &[("a", "b"), ("b", "c")]));
        assert_eq!(g.ancestors("c").len(), 3);
        assert_eq!(g.ancestors("a").len(), 1);
    }
}

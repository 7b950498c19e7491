use log::trace;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::graph::{EdgeId, Graph, NodeId};

/// A walk through the graph from one node to another.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub length: f64,
}

impl Path {
    fn empty(at: NodeId) -> Self {
        Self {
            nodes: vec![at],
            edges: Vec::new(),
            length: 0.0,
        }
    }

    pub fn start(&self) -> NodeId {
        self.nodes[0]
    }

    pub fn end(&self) -> NodeId {
        self.nodes[self.nodes.len() - 1]
    }
}

// Search frontier entry
#[derive(Clone, Debug, Eq, PartialEq)]
struct State {
    cost: OrderedFloat<f64>,
    node: NodeId,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap, then by node for stable expansion order
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Bans {
    nodes: HashSet<NodeId>,
    edges: HashSet<EdgeId>,
}

fn dijkstra(graph: &Graph, from: NodeId, to: NodeId, bans: &Bans) -> Option<Path> {
    if from == to {
        return Some(Path::empty(from));
    }

    let mut costs = vec![f64::INFINITY; graph.node_count()];
    let mut via: Vec<Option<(EdgeId, NodeId)>> = vec![None; graph.node_count()];
    let mut closed = vec![false; graph.node_count()];
    let mut open_set = BinaryHeap::new();

    costs[from.0] = 0.0;
    open_set.push(State {
        cost: OrderedFloat(0.0),
        node: from,
    });

    while let Some(State { cost, node }) = open_set.pop() {
        if closed[node.0] {
            continue;
        }
        closed[node.0] = true;

        if node == to {
            break;
        }

        for &edge_id in graph.incident(node) {
            if bans.edges.contains(&edge_id) {
                continue;
            }
            let edge = &graph[edge_id];
            let Some(neighbour) = edge.other_end(node) else {
                continue;
            };
            if closed[neighbour.0] || bans.nodes.contains(&neighbour) {
                continue;
            }

            let new_cost = cost.0 + edge.length;
            if new_cost < costs[neighbour.0] {
                costs[neighbour.0] = new_cost;
                via[neighbour.0] = Some((edge_id, node));
                open_set.push(State {
                    cost: OrderedFloat(new_cost),
                    node: neighbour,
                });
            }
        }
    }

    if !closed[to.0] {
        return None;
    }

    let mut nodes = vec![to];
    let mut edges = Vec::new();
    let mut current = to;
    while let Some((edge, previous)) = via[current.0] {
        edges.push(edge);
        nodes.push(previous);
        current = previous;
    }
    nodes.reverse();
    edges.reverse();

    Some(Path {
        nodes,
        edges,
        length: costs[to.0],
    })
}

/// Shortest path between two nodes by total edge length.
pub fn shortest_path(graph: &Graph, from: NodeId, to: NodeId) -> Option<Path> {
    dijkstra(graph, from, to, &Bans::default())
}

// Candidate ordering for Yen's algorithm: shortest first, ties by edge sequence
#[derive(Debug, Clone, PartialEq)]
struct Candidate(Path);

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        OrderedFloat(other.0.length)
            .cmp(&OrderedFloat(self.0.length))
            .then_with(|| other.0.edges.cmp(&self.0.edges))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Up to `k` loopless paths between two nodes in increasing length (Yen).
///
/// Parallel edges yield distinct paths.
pub fn k_shortest_paths(graph: &Graph, from: NodeId, to: NodeId, k: usize) -> Vec<Path> {
    let Some(first) = shortest_path(graph, from, to) else {
        return Vec::new();
    };
    if k == 0 {
        return Vec::new();
    }

    let mut found = vec![first];
    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();

    while found.len() < k {
        let Some(last) = found.last().cloned() else {
            break;
        };

        for i in 0..last.edges.len() {
            let spur = last.nodes[i];
            let root_edges = &last.edges[..i];

            let mut bans = Bans::default();
            for path in &found {
                if path.edges.len() > i && path.edges[..i] == *root_edges {
                    bans.edges.insert(path.edges[i]);
                }
            }
            bans.nodes.extend(last.nodes[..i].iter().copied());

            let Some(spur_path) = dijkstra(graph, spur, to, &bans) else {
                continue;
            };

            let root_length: f64 = root_edges.iter().map(|&e| graph[e].length).sum();
            let mut nodes = last.nodes[..i].to_vec();
            nodes.extend(spur_path.nodes);
            let mut edges = root_edges.to_vec();
            edges.extend(spur_path.edges);
            let total = Path {
                nodes,
                edges,
                length: root_length + spur_path.length,
            };

            let known = found.iter().any(|p| p.edges == total.edges)
                || candidates.iter().any(|c| c.0.edges == total.edges);
            if !known {
                candidates.push(Candidate(total));
            }
        }

        match candidates.pop() {
            Some(Candidate(next)) => found.push(next),
            None => break,
        }
    }

    trace!("Found {} paths from {} to {}", found.len(), from, to);
    found
}

/// Which endpoints of two edges a connecting path joins.
#[derive(Debug, Clone)]
pub struct EndpointPairing {
    /// The path leaves the first edge through its `to` node
    pub leaves_via_to: bool,
    /// The path enters the second edge through its `from` node
    pub enters_via_from: bool,
    pub path: Path,
}

/// Shortest connection between any endpoint of `a` and any endpoint of `b`.
///
/// Pairings are tried from-from, from-to, to-from, to-to. The first strictly shortest wins.
pub fn nearest_endpoint_pairing(graph: &Graph, a: EdgeId, b: EdgeId) -> Option<EndpointPairing> {
    let (ea, eb) = (&graph[a], &graph[b]);
    let pairings = [
        (ea.from, eb.from, false, true),
        (ea.from, eb.to, false, false),
        (ea.to, eb.from, true, true),
        (ea.to, eb.to, true, false),
    ];

    let mut best: Option<EndpointPairing> = None;
    for (start, end, leaves_via_to, enters_via_from) in pairings {
        let Some(path) = shortest_path(graph, start, end) else {
            continue;
        };
        if best.as_ref().is_none_or(|b| path.length < b.path.length) {
            best = Some(EndpointPairing {
                leaves_via_to,
                enters_via_from,
                path,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::displace;
    use crate::graph::fixtures::{origin, strip};
    use crate::graph::{EdgeRole, GraphBuilder, NodeRole};

    #[test]
    fn test_shortest_path_along_strip() {
        let s = strip();
        let path = shortest_path(&s.graph, s.nodes[0], s.nodes[4]).unwrap();
        assert_eq!(path.edges, s.edges.to_vec());
        assert_eq!(path.nodes, s.nodes.to_vec());
        assert!((path.length - 200.0).abs() < 0.5);
    }

    #[test]
    fn test_same_node_is_empty_path() {
        let s = strip();
        let path = shortest_path(&s.graph, s.nodes[2], s.nodes[2]).unwrap();
        assert!(path.edges.is_empty());
        assert_eq!(path.length, 0.0);
    }

    #[test]
    fn test_unreachable_is_none() {
        let mut b = GraphBuilder::new();
        let a = b.add_node(origin(), NodeRole::Intersection, None);
        let c = b.add_node(displace(origin(), 100.0, 0.0), NodeRole::Intersection, None);
        let graph = b.build();
        assert!(shortest_path(&graph, a, c).is_none());
        assert!(k_shortest_paths(&graph, a, c, 5).is_empty());
    }

    /// Square a-b-c-d with a diagonal a-c and a parallel a-b edge.
    fn square() -> (Graph, [NodeId; 4]) {
        let mut b = GraphBuilder::new();
        let o = origin();
        let a = b.add_node(o, NodeRole::Intersection, None);
        let bb = b.add_node(displace(o, 100.0, 0.0), NodeRole::Intersection, None);
        let c = b.add_node(displace(o, 100.0, 100.0), NodeRole::Intersection, None);
        let d = b.add_node(displace(o, 0.0, 100.0), NodeRole::Intersection, None);
        b.add_edge(a, bb, EdgeRole::Taxiway, None, None).unwrap();
        b.add_edge(bb, c, EdgeRole::Taxiway, None, None).unwrap();
        b.add_edge(c, d, EdgeRole::Taxiway, None, None).unwrap();
        b.add_edge(d, a, EdgeRole::Taxiway, None, None).unwrap();
        b.add_edge(a, c, EdgeRole::Taxiway, None, None).unwrap();
        b.add_edge(a, bb, EdgeRole::Taxiway, None, Some(130.0)).unwrap();
        (b.build(), [a, bb, c, d])
    }

    #[test]
    fn test_k_shortest_paths_ordered_and_loopless() {
        let (graph, [a, _, c, _]) = square();
        let paths = k_shortest_paths(&graph, a, c, 10);

        // Diagonal, two 200 m detours, the 230 m detour over the parallel edge
        assert_eq!(paths.len(), 4);
        assert_eq!(paths[0].edges, vec![EdgeId(4)]);
        for pair in paths.windows(2) {
            assert!(pair[0].length <= pair[1].length);
        }
        for path in &paths {
            let mut nodes = path.nodes.clone();
            nodes.sort();
            nodes.dedup();
            assert_eq!(nodes.len(), path.nodes.len(), "path revisits a node");
        }
        assert!(paths.iter().any(|p| p.edges == vec![EdgeId(5), EdgeId(1)]));
    }

    #[test]
    fn test_k_limits_result() {
        let (graph, [a, _, c, _]) = square();
        assert_eq!(k_shortest_paths(&graph, a, c, 2).len(), 2);
    }

    #[test]
    fn test_nearest_endpoint_pairing() {
        let s = strip();
        let pairing = nearest_endpoint_pairing(&s.graph, s.edges[0], s.edges[3]).unwrap();
        assert!(pairing.leaves_via_to);
        assert!(pairing.enters_via_from);
        assert_eq!(pairing.path.edges, vec![s.edges[1], s.edges[2]]);
    }
}

use anyhow::{Result, bail};
use geo::{BoundingRect, MultiPoint, Point, Rect};
use log::{debug, info};
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Index;

use crate::geometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Stand,
    Intersection,
    RunwayCrossing,
    Intermediate,
    Runway,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRole {
    Taxiway,
    Runway,
    StandConnection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Point<f64>,
    pub role: NodeRole,
    pub label: Option<String>,
}

impl Node {
    pub fn is_runway_or_crossing(&self) -> bool {
        matches!(self.role, NodeRole::Runway | NodeRole::RunwayCrossing)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    /// Length in metres
    pub length: f64,
    pub role: EdgeRole,
    pub label: Option<String>,
    /// Observed traversal times in seconds, if any were recorded
    pub time_samples: Vec<f64>,
}

impl Edge {
    pub fn has_node(&self, node: NodeId) -> bool {
        self.from == node || self.to == node
    }

    /// The endpoint opposite `node`, or `None` if `node` is not an endpoint.
    pub fn other_end(&self, node: NodeId) -> Option<NodeId> {
        if self.from == node {
            Some(self.to)
        } else if self.to == node {
            Some(self.from)
        } else {
            None
        }
    }

    /// Two edges are adjacent when they share a node. An edge is adjacent to itself.
    pub fn is_adjacent_to(&self, other: &Edge) -> bool {
        self.has_node(other.from) || self.has_node(other.to)
    }
}

/// Arena-indexed undirected multigraph of the airport surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<EdgeId>>,
}

impl Index<NodeId> for Graph {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

impl Index<EdgeId> for Graph {
    type Output = Edge;

    fn index(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0]
    }
}

impl Graph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Edges incident to a node, in creation order.
    pub fn incident(&self, node: NodeId) -> &[EdgeId] {
        self.adjacency.get(node.0).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn are_adjacent(&self, a: EdgeId, b: EdgeId) -> bool {
        self[a].is_adjacent_to(&self[b])
    }

    /// True when either endpoint is a runway or runway-crossing node.
    pub fn touches_runway(&self, edge: EdgeId) -> bool {
        let e = &self[edge];
        self[e.from].is_runway_or_crossing() || self[e.to].is_runway_or_crossing()
    }

    /// True when either endpoint is a runway-crossing node.
    pub fn touches_runway_crossing(&self, edge: EdgeId) -> bool {
        let e = &self[edge];
        self[e.from].role == NodeRole::RunwayCrossing || self[e.to].role == NodeRole::RunwayCrossing
    }

    pub fn role(&self, edge: EdgeId) -> EdgeRole {
        self[edge].role
    }

    /// Name of the stand an edge serves: its own label, else the label of its stand node.
    pub fn stand_name(&self, edge: EdgeId) -> Option<&str> {
        let e = &self[edge];
        if let Some(label) = e.label.as_deref().filter(|l| !l.is_empty()) {
            return Some(label);
        }
        [e.from, e.to]
            .into_iter()
            .map(|n| &self[n])
            .find(|n| n.role == NodeRole::Stand)
            .and_then(|n| n.label.as_deref())
    }

    /// The stand-role endpoint of a stand connection.
    pub fn stand_node(&self, edge: EdgeId) -> Option<NodeId> {
        let e = &self[edge];
        [e.from, e.to]
            .into_iter()
            .find(|&n| self[n].role == NodeRole::Stand)
    }

    /// Compass bearing of an edge travelled from→to.
    pub fn edge_bearing(&self, edge: EdgeId) -> f64 {
        let e = &self[edge];
        geometry::bearing(self[e.from].position, self[e.to].position)
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        let points: MultiPoint<f64> = self.nodes.iter().map(|n| n.position).collect();
        points.bounding_rect()
    }

    /// Keeps only the nodes and edges of the largest connected component.
    ///
    /// Ids are reassigned in the original creation order.
    pub fn retain_largest_component(&self) -> Result<Graph> {
        if self.nodes.is_empty() {
            bail!("Cannot prune an empty graph");
        }

        let mut components = UnionFind::<usize>::new(self.nodes.len());
        for edge in &self.edges {
            components.union(edge.from.0, edge.to.0);
        }

        let labels = components.into_labeling();
        let mut sizes: HashMap<usize, usize> = HashMap::new();
        for &label in &labels {
            *sizes.entry(label).or_default() += 1;
        }
        let Some((&largest, &size)) = sizes
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        else {
            bail!("Graph has no components");
        };

        if size == self.nodes.len() {
            debug!("Graph is already connected ({} nodes)", size);
            return Ok(self.clone());
        }

        let mut builder = GraphBuilder::new();
        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
        for node in &self.nodes {
            if labels[node.id.0] == largest {
                let new_id = builder.add_node(node.position, node.role, node.label.clone());
                remap.insert(node.id, new_id);
            }
        }
        for edge in &self.edges {
            if let (Some(&from), Some(&to)) = (remap.get(&edge.from), remap.get(&edge.to)) {
                let id = builder.add_edge(from, to, edge.role, edge.label.clone(), Some(edge.length))?;
                builder.set_time_samples(id, edge.time_samples.clone());
            }
        }

        let pruned = builder.build();
        info!(
            "Pruned graph to largest component: {} of {} nodes, {} of {} edges",
            pruned.node_count(),
            self.node_count(),
            pruned.edge_count(),
            self.edge_count()
        );
        Ok(pruned)
    }
}

/// Hands out node and edge ids in creation order.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_node: usize,
    next_edge: usize,
}

impl IdAllocator {
    pub fn node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub fn edge(&mut self) -> EdgeId {
        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        id
    }
}

#[derive(Debug, Default)]
pub struct GraphBuilder {
    ids: IdAllocator,
    graph: Graph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, position: Point<f64>, role: NodeRole, label: Option<String>) -> NodeId {
        let id = self.ids.node();
        self.graph.nodes.push(Node {
            id,
            position,
            role,
            label,
        });
        self.graph.adjacency.push(Vec::new());
        id
    }

    /// Adds an edge, measuring its length from the endpoints when none is given.
    ///
    /// A runway node touched by any non-runway edge becomes a runway crossing.
    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        role: EdgeRole,
        label: Option<String>,
        length: Option<f64>,
    ) -> Result<EdgeId> {
        let node_count = self.graph.nodes.len();
        if from.0 >= node_count || to.0 >= node_count {
            bail!("Edge {}-{} references a node outside the graph", from, to);
        }

        let length = match length {
            Some(l) if l < 0.0 || l.is_nan() => bail!("Edge {}-{} has invalid length {}", from, to, l),
            Some(l) => l,
            None => geometry::distance(self.graph[from].position, self.graph[to].position),
        };

        if role != EdgeRole::Runway {
            for node in [from, to] {
                let node = &mut self.graph.nodes[node.0];
                if node.role == NodeRole::Runway {
                    node.role = NodeRole::RunwayCrossing;
                }
            }
        }

        let id = self.ids.edge();
        self.graph.edges.push(Edge {
            id,
            from,
            to,
            length,
            role,
            label,
            time_samples: Vec::new(),
        });
        self.graph.adjacency[from.0].push(id);
        if to != from {
            self.graph.adjacency[to.0].push(id);
        }
        Ok(id)
    }

    pub fn set_time_samples(&mut self, edge: EdgeId, samples: Vec<f64>) {
        if let Some(e) = self.graph.edges.get_mut(edge.0) {
            e.time_samples = samples;
        }
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::displace;
    use fixtures::{origin, strip};

    #[test]
    fn test_ids_follow_creation_order() {
        let s = strip();
        for (i, edge) in s.edges.iter().enumerate() {
            assert_eq!(edge.0, i);
            assert_eq!(s.graph[*edge].id, *edge);
        }
        assert_eq!(s.graph.incident(s.nodes[1]), &[s.edges[0], s.edges[1]]);
    }

    #[test]
    fn test_runway_node_upgraded_by_taxiway() {
        let s = strip();
        assert_eq!(s.graph[s.nodes[3]].role, NodeRole::RunwayCrossing);
        assert_eq!(s.graph[s.nodes[4]].role, NodeRole::Runway);
        assert!(s.graph.touches_runway(s.edges[2]));
        assert!(!s.graph.touches_runway(s.edges[1]));
    }

    #[test]
    fn test_adjacency_and_stand_name() {
        let s = strip();
        let [sc, t1, t2, r] = s.edges;
        assert!(s.graph.are_adjacent(sc, t1));
        assert!(s.graph.are_adjacent(t1, t1));
        assert!(!s.graph.are_adjacent(sc, t2));
        assert!(s.graph.are_adjacent(t2, r));
        assert_eq!(s.graph.stand_name(sc), Some("A1"));
        assert_eq!(s.graph.stand_node(sc), Some(s.nodes[0]));
    }

    #[test]
    fn test_lengths_are_measured() {
        let s = strip();
        for edge in s.graph.edges() {
            assert!((edge.length - 50.0).abs() < 0.1);
        }
    }

    #[test]
    fn test_edge_to_unknown_node_rejected() {
        let mut b = GraphBuilder::new();
        let a = b.add_node(origin(), NodeRole::Intersection, None);
        assert!(b.add_edge(a, NodeId(7), EdgeRole::Taxiway, None, None).is_err());
        assert!(b.add_edge(a, a, EdgeRole::Taxiway, None, Some(-1.0)).is_err());
    }

    #[test]
    fn test_retain_largest_component() {
        let mut b = GraphBuilder::new();
        let o = origin();
        let a = b.add_node(o, NodeRole::Intersection, None);
        let c = b.add_node(displace(o, 30.0, 0.0), NodeRole::Intersection, None);
        let d = b.add_node(displace(o, 60.0, 0.0), NodeRole::Intersection, None);
        let island1 = b.add_node(displace(o, 500.0, 0.0), NodeRole::Intersection, None);
        let island2 = b.add_node(displace(o, 530.0, 0.0), NodeRole::Intersection, None);
        b.add_edge(a, c, EdgeRole::Taxiway, None, None).unwrap();
        b.add_edge(island1, island2, EdgeRole::Taxiway, None, None).unwrap();
        b.add_edge(c, d, EdgeRole::Taxiway, Some("B".into()), None).unwrap();

        let pruned = b.build().retain_largest_component().unwrap();
        assert_eq!(pruned.node_count(), 3);
        assert_eq!(pruned.edge_count(), 2);
        assert_eq!(pruned[EdgeId(1)].label.as_deref(), Some("B"));
        assert_eq!(pruned[EdgeId(1)].from, NodeId(1));
    }
}

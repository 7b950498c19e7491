use log::{debug, warn};
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

use crate::geometry;
use crate::graph::{EdgeId, EdgeRole, Graph, NodeId, NodeRole};

/// A runway-crossing node at which aircraft can join a runway direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Entrance {
    pub node: NodeId,
    /// Distance in metres from the runway end the direction starts at
    pub distance: f64,
}

#[derive(Debug, Clone)]
pub struct Runway {
    pub name: String,
    pub designators: [String; 2],
    pub edges: Vec<EdgeId>,
    /// End nodes matching `designators`, once derived
    pub ends: Option<[NodeId; 2]>,
    pub entrances: [Vec<Entrance>; 2],
}

/// Splits `09/27`, `05L-23R` or `18\36` into its two direction designators.
pub fn split_designators(name: &str) -> Option<[String; 2]> {
    let mut parts = name
        .split(['/', '\\', '-'])
        .map(str::trim)
        .filter(|p| !p.is_empty());
    let first = parts.next()?;
    let second = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some([first.to_string(), second.to_string()])
}

/// Magnetic heading a designator stands for: its digits times ten.
pub fn designator_heading(designator: &str) -> Option<f64> {
    let digits: String = designator.chars().filter(char::is_ascii_digit).collect();
    digits.parse::<u32>().ok().map(|n| f64::from(n) * 10.0)
}

/// Picks the designator of runway `name` whose heading is closest to `bearing`.
///
/// Ties go to the second designator.
pub fn direction_for_bearing(name: &str, bearing: f64) -> Option<String> {
    let [first, second] = split_designators(name)?;
    let diff_first = geometry::bearing_difference(bearing, designator_heading(&first)?);
    let diff_second = geometry::bearing_difference(bearing, designator_heading(&second)?);
    if diff_first < diff_second { Some(first) } else { Some(second) }
}

impl Runway {
    pub fn new(name: &str) -> Option<Self> {
        let designators = split_designators(name)?;
        Some(Self {
            name: name.to_string(),
            designators,
            edges: Vec::new(),
            ends: None,
            entrances: [Vec::new(), Vec::new()],
        })
    }

    /// Runways named for north/south headings are ordered by latitude, the rest by longitude.
    fn orders_by_latitude(&self) -> bool {
        self.name.contains("00") || self.name.contains("18")
    }

    /// Finds the two extreme nodes and assigns each runway-crossing node to the nearer end.
    pub fn derive(&mut self, graph: &Graph) {
        let mut nodes: Vec<NodeId> = self
            .edges
            .iter()
            .flat_map(|&e| [graph[e].from, graph[e].to])
            .collect();
        nodes.sort();
        nodes.dedup();

        let by_latitude = self.orders_by_latitude();
        let key = |n: &NodeId| {
            let p = graph[*n].position;
            OrderedFloat(if by_latitude { p.y() } else { p.x() })
        };

        let (Some(&low), Some(&high)) = (nodes.iter().min_by_key(|n| key(n)), nodes.iter().max_by_key(|n| key(n)))
        else {
            warn!("Runway {} has no nodes", self.name);
            return;
        };

        // The threshold of a designator is the end from which the runway heads its way
        let heading = geometry::bearing(graph[low].position, graph[high].position);
        let ends = match direction_for_bearing(&self.name, heading) {
            Some(d) if d == self.designators[1] => [high, low],
            _ => [low, high],
        };
        self.ends = Some(ends);
        self.entrances = [Vec::new(), Vec::new()];

        for node in nodes {
            if graph[node].role != NodeRole::RunwayCrossing {
                continue;
            }
            let position = graph[node].position;
            let to_first = geometry::distance(position, graph[ends[0]].position);
            let to_second = geometry::distance(position, graph[ends[1]].position);
            let (side, distance) = if to_first <= to_second { (0, to_first) } else { (1, to_second) };
            self.entrances[side].push(Entrance { node, distance });
        }

        for list in &mut self.entrances {
            list.sort_by_key(|e| OrderedFloat(e.distance));
        }

        debug!(
            "Runway {}: {} edges, entrances {}/{}",
            self.name,
            self.edges.len(),
            self.entrances[0].len(),
            self.entrances[1].len()
        );
    }
}

/// Groups runway edges by label and derives each runway's ends and entrances.
pub fn locate_runways(graph: &Graph) -> BTreeMap<String, Runway> {
    let mut runways: BTreeMap<String, Runway> = BTreeMap::new();
    for edge in graph.edges().filter(|e| e.role == EdgeRole::Runway) {
        let Some(label) = edge.label.as_deref().map(str::trim).filter(|l| !l.is_empty()) else {
            continue;
        };
        if !runways.contains_key(label) {
            match Runway::new(label) {
                Some(runway) => {
                    runways.insert(label.to_string(), runway);
                }
                None => {
                    warn!("Ignoring runway edge {} with unparsable name {:?}", edge.id, label);
                    continue;
                }
            }
        }
        if let Some(runway) = runways.get_mut(label) {
            runway.edges.push(edge.id);
        }
    }

    for runway in runways.values_mut() {
        runway.derive(graph);
    }
    runways
}

use anyhow::{Result, anyhow};
use geo::{Coord, Point};
use log::info;
use serde::Deserialize;

use crate::geometry;
use crate::graph::{EdgeId, Graph};

/// Configuration for the edge grid
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Cells per side of the square grid
    pub grid_size: usize,
    /// Padding around the graph, and proximity to a cell boundary that pulls in the neighbour, in metres.
    /// Must cover the snap distance.
    pub margin_m: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            grid_size: 10,
            margin_m: 10.0,
        }
    }
}

/// Uniform grid over the padded bounding box of the graph, mapping cells to the edges crossing them.
#[derive(Debug, Clone)]
pub struct EdgeGrid {
    size: usize,
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
    cell_lat: f64,
    cell_lon: f64,
    pad_lat: f64,
    pad_lon: f64,
    /// Row-major, indexed by `lat_cell * size + lon_cell`
    cells: Vec<Vec<EdgeId>>,
}

impl EdgeGrid {
    pub fn build(graph: &Graph, config: &IndexConfig) -> Result<Self> {
        let rect = graph
            .bounding_rect()
            .ok_or_else(|| anyhow!("Cannot index an empty graph"))?;
        let size = config.grid_size.max(1);

        // Fewest metres per degree over the box corners, so the padding holds everywhere in it
        let (min, max) = (rect.min(), rect.max());
        let corners = [
            min,
            max,
            Coord { x: min.x, y: max.y },
            Coord { x: max.x, y: min.y },
        ];
        let (m_per_deg_lat, m_per_deg_lon) = corners
            .into_iter()
            .map(|corner| geometry::metres_per_degree(corner.into()))
            .fold((f64::INFINITY, f64::INFINITY), |(lat, lon), (a, b)| (lat.min(a), lon.min(b)));
        let pad_lat = config.margin_m / m_per_deg_lat;
        let pad_lon = config.margin_m / m_per_deg_lon;

        let min_lat = min.y - pad_lat;
        let max_lat = max.y + pad_lat;
        let min_lon = min.x - pad_lon;
        let max_lon = max.x + pad_lon;

        let mut grid = Self {
            size,
            min_lat,
            min_lon,
            max_lat,
            max_lon,
            cell_lat: (max_lat - min_lat) / size as f64,
            cell_lon: (max_lon - min_lon) / size as f64,
            pad_lat,
            pad_lon,
            cells: vec![Vec::new(); size * size],
        };

        for edge in graph.edges() {
            let (a_lat, a_lon) = grid.home_cell(graph[edge.from].position);
            let (b_lat, b_lon) = grid.home_cell(graph[edge.to].position);
            for lat in a_lat.min(b_lat)..=a_lat.max(b_lat) {
                for lon in a_lon.min(b_lon)..=a_lon.max(b_lon) {
                    grid.cells[lat * size + lon].push(edge.id);
                }
            }
        }

        let populated = grid.cells.iter().filter(|c| !c.is_empty()).count();
        info!(
            "Built {}x{} edge grid over {} edges ({} populated cells)",
            size,
            size,
            graph.edge_count(),
            populated
        );
        Ok(grid)
    }

    fn contains(&self, p: Point<f64>) -> bool {
        (self.min_lat..=self.max_lat).contains(&p.y()) && (self.min_lon..=self.max_lon).contains(&p.x())
    }

    fn axis_cell(&self, offset: f64, cell: f64) -> usize {
        if cell <= 0.0 {
            return 0;
        }
        ((offset / cell).floor().max(0.0) as usize).min(self.size - 1)
    }

    /// Cell holding a point, clamped to the grid.
    fn home_cell(&self, p: Point<f64>) -> (usize, usize) {
        (
            self.axis_cell(p.y() - self.min_lat, self.cell_lat),
            self.axis_cell(p.x() - self.min_lon, self.cell_lon),
        )
    }

    /// The neighbouring cell index along one axis when the point sits within the padding of a boundary.
    fn neighbour(&self, cell_index: usize, offset: f64, cell: f64, pad: f64) -> Option<usize> {
        let within = offset - cell_index as f64 * cell;
        if within < pad {
            cell_index.checked_sub(1)
        } else if cell - within < pad && cell_index + 1 < self.size {
            Some(cell_index + 1)
        } else {
            None
        }
    }

    /// Edges that may lie within the margin of `p`, sorted by id and free of duplicates.
    pub fn edges_near(&self, p: Point<f64>) -> Vec<EdgeId> {
        if !self.contains(p) {
            return Vec::new();
        }

        let (lat, lon) = self.home_cell(p);
        let near_lat = self.neighbour(lat, p.y() - self.min_lat, self.cell_lat, self.pad_lat);
        let near_lon = self.neighbour(lon, p.x() - self.min_lon, self.cell_lon, self.pad_lon);

        let mut cells = vec![(lat, lon)];
        if let Some(l) = near_lat {
            cells.push((l, lon));
        }
        if let Some(l) = near_lon {
            cells.push((lat, l));
        }
        if let (Some(a), Some(b)) = (near_lat, near_lon) {
            cells.push((a, b));
        }

        let mut edges: Vec<EdgeId> = cells
            .into_iter()
            .flat_map(|(a, b)| self.cells[a * self.size + b].iter().copied())
            .collect();
        edges.sort();
        edges.dedup();
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{displace, nearest_on_segment};
    use crate::graph::fixtures::{origin, strip};
    use crate::graph::{EdgeRole, GraphBuilder, NodeRole};

    #[test]
    fn test_empty_graph_rejected() {
        let graph = GraphBuilder::new().build();
        assert!(EdgeGrid::build(&graph, &IndexConfig::default()).is_err());
    }

    #[test]
    fn test_out_of_bounds_is_empty() {
        let s = strip();
        let grid = EdgeGrid::build(&s.graph, &IndexConfig::default()).unwrap();
        assert!(grid.edges_near(displace(origin(), 0.0, 500.0)).is_empty());
        assert!(grid.edges_near(displace(origin(), -100.0, 0.0)).is_empty());
    }

    #[test]
    fn test_single_node_graph_has_extent() {
        let mut b = GraphBuilder::new();
        let a = b.add_node(origin(), NodeRole::Intersection, None);
        b.add_edge(a, a, EdgeRole::Taxiway, None, None).unwrap();
        let graph = b.build();
        let grid = EdgeGrid::build(&graph, &IndexConfig::default()).unwrap();
        assert_eq!(grid.edges_near(origin()).len(), 1);
    }

    #[test]
    fn test_wider_margin_reaches_across_cell_boundary() {
        // Meridian edges at 0, 502 and 1000 m east put a cell boundary near 500 m
        let mut b = GraphBuilder::new();
        let o = origin();
        let mut edges = Vec::new();
        for east in [0.0, 502.0, 1000.0] {
            let south = b.add_node(displace(o, east, 0.0), NodeRole::Intersection, None);
            let north = b.add_node(displace(o, east, 200.0), NodeRole::Intersection, None);
            edges.push(b.add_edge(south, north, EdgeRole::Taxiway, None, None).unwrap());
        }
        let graph = b.build();
        let config = IndexConfig {
            grid_size: 2,
            margin_m: 15.0,
        };
        let grid = EdgeGrid::build(&graph, &config).unwrap();

        let p = displace(o, 488.0, 100.0);
        let (_, d) = nearest_on_segment(p, graph[graph[edges[1]].from].position, graph[graph[edges[1]].to].position);
        assert!(d < config.margin_m);
        assert!(grid.edges_near(p).contains(&edges[1]));
    }

    #[test]
    fn test_no_false_negatives() {
        // A lattice of diagonal and straight edges spread over several cells
        let mut b = GraphBuilder::new();
        let o = origin();
        let mut nodes = Vec::new();
        for row in 0..6 {
            for col in 0..6 {
                let jitter = ((row * 7 + col * 3) % 5) as f64 * 11.0;
                let p = displace(o, col as f64 * 180.0 + jitter, row as f64 * 150.0 - jitter);
                nodes.push(b.add_node(p, NodeRole::Intersection, None));
            }
        }
        for row in 0..6 {
            for col in 0..6 {
                let here = nodes[row * 6 + col];
                if col + 1 < 6 {
                    b.add_edge(here, nodes[row * 6 + col + 1], EdgeRole::Taxiway, None, None).unwrap();
                }
                if row + 1 < 6 && col + 1 < 6 {
                    b.add_edge(here, nodes[(row + 1) * 6 + col + 1], EdgeRole::Taxiway, None, None)
                        .unwrap();
                }
                if row + 1 < 6 {
                    b.add_edge(here, nodes[(row + 1) * 6 + col], EdgeRole::Taxiway, None, None).unwrap();
                }
            }
        }
        let graph = b.build();
        let config = IndexConfig::default();
        let grid = EdgeGrid::build(&graph, &config).unwrap();

        for i in 0..40 {
            for j in 0..40 {
                let p = displace(o, -5.0 + i as f64 * 24.7, -5.0 + j as f64 * 19.3);
                let found = grid.edges_near(p);
                for edge in graph.edges() {
                    let (_, d) = nearest_on_segment(p, graph[edge.from].position, graph[edge.to].position);
                    if d < config.margin_m * 0.9 {
                        assert!(found.contains(&edge.id), "missed {} at {:?}", edge.id, p);
                    }
                }
            }
        }
    }
}

//! Map-matching of aircraft ground traces onto an airport taxiway graph.

pub mod cleaner;
pub mod config;
pub mod displacement;
pub mod geometry;
pub mod graph;
pub mod harness;
pub mod io;
pub mod matcher;
pub mod paths;
pub mod report;
pub mod route;
pub mod runway;
pub mod snapping;
pub mod spatial_index;
pub mod track;

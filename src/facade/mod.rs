//! Read-only views over the persisted tables.
//!
//! `DataFacade` is the capability the router and guidance consume; the
//! private in-process implementation owns its tables, the shared variant
//! swaps whole snapshots between queries.

pub mod internal;
pub mod shared;

pub use internal::InternalDataFacade;
pub use shared::SharedDataFacade;

use crate::extractor::edge_expander::TurnData;
use crate::extractor::guidance::lanes::LaneDescription;
use crate::formats::ebg_file::ComponentInfo;
use crate::geo::Coordinate;
use crate::profile::ProfileProperties;
use crate::router::phantom::PhantomCandidate;
use crate::router::query_graph::QueryGraph;
use crate::types::{
    EdgeId, EdgeWeight, GeometryId, NameId, NodeId, OsmNodeId, TravelMode,
};

/// Snapping options for phantom resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestOptions {
    /// Keep a candidate only if the segment bearing (or its reverse) lies
    /// within `bearing ± range` degrees.
    pub bearing: Option<(u16, u16)>,
    /// Maximum snap distance in meters.
    pub max_distance: Option<f64>,
    /// Restrict snapping to ways flagged as startpoints.
    pub startpoints_only: bool,
}

/// Uniform read-only view over the persisted tables.
pub trait DataFacade: Send + Sync {
    // graph adjacency
    fn query_graph(&self) -> &QueryGraph;

    // edge-based node data
    fn edge_based_node_count(&self) -> u32;
    fn name_id(&self, node: NodeId) -> NameId;
    fn travel_mode(&self, node: NodeId) -> TravelMode;
    fn node_weight(&self, node: NodeId) -> EdgeWeight;
    fn geometry_id(&self, node: NodeId) -> GeometryId;
    fn component(&self, node: NodeId) -> ComponentInfo;

    // turn data by original edge id
    fn turn_data(&self, edge: EdgeId) -> &TurnData;

    // name table, four strings per id
    fn name(&self, id: NameId) -> &str;
    fn reference(&self, id: NameId) -> &str;
    fn pronunciation(&self, id: NameId) -> &str;
    fn destinations(&self, id: NameId) -> &str;

    // geometry
    fn geometry_nodes(&self, id: GeometryId) -> &[NodeId];
    fn geometry_cumulative_weights(&self, id: GeometryId) -> &[EdgeWeight];
    fn node_coordinate(&self, node: NodeId) -> Coordinate;
    fn osm_node_id(&self, node: NodeId) -> OsmNodeId;

    // guidance side tables
    fn lane_description(&self, id: u32) -> Option<&LaneDescription>;
    fn bearing_class(&self, id: u32) -> &[u16];
    fn entry_class(&self, id: u32) -> u32;

    // spatial
    fn nearest_phantoms(
        &self,
        coordinate: Coordinate,
        count: usize,
        options: &NearestOptions,
    ) -> Vec<PhantomCandidate>;
    /// Nearest candidate plus, when the nearest sits on a tiny component,
    /// the nearest candidate on a big one.
    fn nearest_with_alternative(
        &self,
        coordinate: Coordinate,
        options: &NearestOptions,
    ) -> Option<(PhantomCandidate, Option<PhantomCandidate>)>;

    // cache validation
    fn properties(&self) -> &ProfileProperties;
    fn data_timestamp(&self) -> &str;
    fn data_checksum(&self) -> u32;
}

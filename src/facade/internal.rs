//! The private in-process facade: owns one loaded copy of every table.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{DataFacade, NearestOptions};
use crate::extractor::edge_expander::{EdgeBasedNodeData, EdgeBasedNodeSegment, TurnData};
use crate::extractor::graph_builder::InternalNode;
use crate::extractor::guidance::lanes::LaneDescription;
use crate::formats::ebg_file::ComponentInfo;
use crate::formats::geometry_file::PackedGeometryTable;
use crate::formats::names_file::NameTable;
use crate::formats::properties_file::DatasetProperties;
use crate::formats::{
    ebg_file, geometry_file, intersection_file, names_file, node_file, properties_file,
};
use crate::geo::{
    angular_deviation, bearing, haversine_distance, project_onto_segment, reverse_bearing,
    Coordinate,
};
use crate::profile::ProfileProperties;
use crate::router::phantom::{PhantomCandidate, PhantomNode};
use crate::router::query_graph::QueryGraph;
use crate::spatial::{SegmentEntry, StaticRTree};
use crate::types::{
    EdgeId, EdgeWeight, GeometryId, NameId, NodeId, OsmNodeId, TravelMode, INVALID_GEOMETRY_ID,
};

/// Append a table suffix to the `.osrm` base path.
pub fn table_path(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

pub struct InternalDataFacade {
    graph: QueryGraph,
    node_data: Vec<EdgeBasedNodeData>,
    components: Vec<ComponentInfo>,
    segments: Vec<EdgeBasedNodeSegment>,
    turn_data: Vec<TurnData>,
    geometry: PackedGeometryTable,
    names: NameTable,
    internal_nodes: Vec<InternalNode>,
    lane_descriptions: Vec<LaneDescription>,
    bearing_classes: Vec<Vec<u16>>,
    entry_classes: Vec<u32>,
    rtree: StaticRTree,
    dataset: DatasetProperties,
    timestamp: String,
}

impl InternalDataFacade {
    /// Load every table belonging to `<base>.osrm`.
    pub fn load(base: &Path) -> Result<Self> {
        let (internal_nodes, _node_based_edges) =
            node_file::read(base).context("loading node file")?;
        let names = names_file::read(table_path(base, ".names")).context("loading names")?;
        let geometry =
            geometry_file::read(table_path(base, ".geometry")).context("loading geometry")?;
        let nodes_data =
            ebg_file::read_nodes(table_path(base, ".nodes")).context("loading edge-based nodes")?;
        let turn_edges =
            ebg_file::read_edges(table_path(base, ".ebg")).context("loading edge-based graph")?;
        let turn_data =
            ebg_file::read_turn_data(table_path(base, ".edges")).context("loading turn data")?;
        let classes = intersection_file::read_classes(table_path(base, ".icd"))
            .context("loading intersection classes")?;
        let lane_descriptions =
            intersection_file::read_lane_descriptions(table_path(base, ".tld"))
                .context("loading lane descriptions")?;
        let dataset =
            properties_file::read(table_path(base, ".properties")).context("loading properties")?;
        let timestamp = properties_file::read_timestamp(table_path(base, ".timestamp"))
            .unwrap_or_else(|_| "unknown".to_string());

        let rtree = StaticRTree::read(
            table_path(base, ".fileIndex"),
            table_path(base, ".ramIndex"),
        )
        .context("loading spatial index")?;

        // no contracted hierarchy on disk: run the search over the flat
        // edge-based graph with every node in the core
        let graph =
            QueryGraph::from_edge_based_graph(nodes_data.node_data.len() as u32, &turn_edges);

        Ok(Self {
            graph,
            node_data: nodes_data.node_data,
            components: nodes_data.components,
            segments: nodes_data.segments,
            turn_data,
            geometry,
            names,
            internal_nodes,
            lane_descriptions,
            bearing_classes: classes.bearing_classes,
            entry_classes: classes.entry_classes,
            rtree,
            dataset,
            timestamp,
        })
    }

    /// Assemble a facade from freshly extracted tables, bypassing disk.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        graph: QueryGraph,
        node_data: Vec<EdgeBasedNodeData>,
        components: Vec<ComponentInfo>,
        segments: Vec<EdgeBasedNodeSegment>,
        turn_data: Vec<TurnData>,
        geometry: PackedGeometryTable,
        names: NameTable,
        internal_nodes: Vec<InternalNode>,
        lane_descriptions: Vec<LaneDescription>,
        bearing_classes: Vec<Vec<u16>>,
        entry_classes: Vec<u32>,
        dataset: DatasetProperties,
        timestamp: String,
    ) -> Self {
        let entries = build_rtree_entries(&segments, &internal_nodes);
        Self {
            graph,
            node_data,
            components,
            segments,
            turn_data,
            geometry,
            names,
            internal_nodes,
            lane_descriptions,
            bearing_classes,
            entry_classes,
            rtree: StaticRTree::build(entries),
            dataset,
            timestamp,
        }
    }

    pub fn segments(&self) -> &[EdgeBasedNodeSegment] {
        &self.segments
    }

    /// Resolve one candidate segment into a phantom, if it passes filters.
    fn resolve_candidate(
        &self,
        segment: &EdgeBasedNodeSegment,
        coordinate: Coordinate,
        options: &NearestOptions,
    ) -> Option<PhantomCandidate> {
        if options.startpoints_only && !segment.is_startpoint {
            return None;
        }

        let u = self.internal_nodes[segment.u as usize].coordinate;
        let v = self.internal_nodes[segment.v as usize].coordinate;
        let (ratio, location) = project_onto_segment(u, v, coordinate);
        let distance = haversine_distance(coordinate, location);
        if let Some(max) = options.max_distance {
            if distance > max {
                return None;
            }
        }

        let mut forward_id = segment.forward_segment_id;
        let mut reverse_id = segment.reverse_segment_id;
        if let Some((wanted, range)) = options.bearing {
            let segment_bearing = bearing(u, v);
            if forward_id.enabled
                && angular_deviation(segment_bearing, wanted as f64) > range as f64
            {
                forward_id.enabled = false;
            }
            if reverse_id.enabled
                && angular_deviation(reverse_bearing(segment_bearing), wanted as f64)
                    > range as f64
            {
                reverse_id.enabled = false;
            }
            if !forward_id.enabled && !reverse_id.enabled {
                return None;
            }
        }

        let position = segment.fwd_segment_position as usize;
        let (forward_weight, forward_offset) = if forward_id.enabled {
            let cumulative = self
                .geometry
                .cumulative_weights(segment.forward_packed_geometry_id);
            let segment_weight = cumulative[position + 1] - cumulative[position];
            (
                (ratio * segment_weight as f64).round() as EdgeWeight,
                cumulative[position],
            )
        } else {
            (0, 0)
        };
        let (reverse_weight, reverse_offset) = if reverse_id.enabled {
            let cumulative = self
                .geometry
                .cumulative_weights(segment.reverse_packed_geometry_id);
            let segment_count = cumulative.len() - 1;
            let reverse_position = segment_count - 1 - position;
            let segment_weight = cumulative[reverse_position + 1] - cumulative[reverse_position];
            (
                ((1.0 - ratio) * segment_weight as f64).round() as EdgeWeight,
                cumulative[reverse_position],
            )
        } else {
            (0, 0)
        };

        let component = if segment.forward_segment_id.enabled {
            self.components[segment.forward_segment_id.id as usize]
        } else {
            self.components[segment.reverse_segment_id.id as usize]
        };

        Some(PhantomCandidate {
            phantom: PhantomNode {
                forward_segment_id: forward_id,
                reverse_segment_id: reverse_id,
                name_id: segment.name_id,
                forward_weight,
                reverse_weight,
                forward_offset,
                reverse_offset,
                forward_packed_geometry_id: segment.forward_packed_geometry_id,
                reverse_packed_geometry_id: segment.reverse_packed_geometry_id,
                component_id: component.id,
                is_tiny_component: component.is_tiny,
                location,
                input_location: coordinate,
                fwd_segment_position: segment.fwd_segment_position,
                forward_travel_mode: segment.forward_travel_mode,
                backward_travel_mode: segment.backward_travel_mode,
            },
            distance,
        })
    }
}

/// Segment entries feeding the R-tree, endpoints in degrees.
pub fn build_rtree_entries(
    segments: &[EdgeBasedNodeSegment],
    internal_nodes: &[InternalNode],
) -> Vec<SegmentEntry> {
    segments
        .iter()
        .enumerate()
        .map(|(index, segment)| {
            let u = internal_nodes[segment.u as usize].coordinate;
            let v = internal_nodes[segment.v as usize].coordinate;
            SegmentEntry {
                start: [u.lon_degrees(), u.lat_degrees()],
                end: [v.lon_degrees(), v.lat_degrees()],
                segment_index: index as u32,
            }
        })
        .collect()
}

impl DataFacade for InternalDataFacade {
    fn query_graph(&self) -> &QueryGraph {
        &self.graph
    }

    fn edge_based_node_count(&self) -> u32 {
        self.node_data.len() as u32
    }

    fn name_id(&self, node: NodeId) -> NameId {
        self.node_data[node as usize].name_id
    }

    fn travel_mode(&self, node: NodeId) -> TravelMode {
        self.node_data[node as usize].travel_mode
    }

    fn node_weight(&self, node: NodeId) -> EdgeWeight {
        self.node_data[node as usize].weight
    }

    fn geometry_id(&self, node: NodeId) -> GeometryId {
        self.node_data[node as usize].geometry_id
    }

    fn component(&self, node: NodeId) -> ComponentInfo {
        self.components[node as usize]
    }

    fn turn_data(&self, edge: EdgeId) -> &TurnData {
        &self.turn_data[edge as usize]
    }

    fn name(&self, id: NameId) -> &str {
        self.names.name(id)
    }

    fn reference(&self, id: NameId) -> &str {
        self.names.reference(id)
    }

    fn pronunciation(&self, id: NameId) -> &str {
        self.names.pronunciation(id)
    }

    fn destinations(&self, id: NameId) -> &str {
        self.names.destinations(id)
    }

    fn geometry_nodes(&self, id: GeometryId) -> &[NodeId] {
        if id == INVALID_GEOMETRY_ID {
            return &[];
        }
        self.geometry.nodes(id)
    }

    fn geometry_cumulative_weights(&self, id: GeometryId) -> &[EdgeWeight] {
        if id == INVALID_GEOMETRY_ID {
            return &[];
        }
        self.geometry.cumulative_weights(id)
    }

    fn node_coordinate(&self, node: NodeId) -> Coordinate {
        self.internal_nodes[node as usize].coordinate
    }

    fn osm_node_id(&self, node: NodeId) -> OsmNodeId {
        self.internal_nodes[node as usize].osm_id
    }

    fn lane_description(&self, id: u32) -> Option<&LaneDescription> {
        self.lane_descriptions.get(id as usize)
    }

    fn bearing_class(&self, id: u32) -> &[u16] {
        self.bearing_classes
            .get(id as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn entry_class(&self, id: u32) -> u32 {
        self.entry_classes.get(id as usize).copied().unwrap_or(0)
    }

    fn nearest_phantoms(
        &self,
        coordinate: Coordinate,
        count: usize,
        options: &NearestOptions,
    ) -> Vec<PhantomCandidate> {
        let mut results = Vec::with_capacity(count);
        for entry in self.rtree.nearest_iter(coordinate) {
            if results.len() >= count {
                break;
            }
            let segment = &self.segments[entry.segment_index as usize];
            if let Some(candidate) = self.resolve_candidate(segment, coordinate, options) {
                results.push(candidate);
            } else if options.max_distance.is_some() {
                // candidates come back sorted by distance: once one is out
                // of radius, the rest are too
                let u = self.internal_nodes[segment.u as usize].coordinate;
                let v = self.internal_nodes[segment.v as usize].coordinate;
                let (_, location) = project_onto_segment(u, v, coordinate);
                if haversine_distance(coordinate, location) > options.max_distance.unwrap() {
                    break;
                }
            }
        }
        results
    }

    fn nearest_with_alternative(
        &self,
        coordinate: Coordinate,
        options: &NearestOptions,
    ) -> Option<(PhantomCandidate, Option<PhantomCandidate>)> {
        let mut primary: Option<PhantomCandidate> = None;
        for entry in self.rtree.nearest_iter(coordinate) {
            let segment = &self.segments[entry.segment_index as usize];
            let Some(candidate) = self.resolve_candidate(segment, coordinate, options) else {
                continue;
            };
            match primary.take() {
                None => {
                    if !candidate.phantom.is_tiny_component {
                        return Some((candidate, None));
                    }
                    primary = Some(candidate);
                }
                Some(tiny) => {
                    if !candidate.phantom.is_tiny_component {
                        // nearest big-component candidate backs up the tiny
                        // primary
                        return Some((tiny, Some(candidate)));
                    }
                    primary = Some(tiny);
                }
            }
        }
        primary.map(|candidate| (candidate, None))
    }

    fn properties(&self) -> &ProfileProperties {
        &self.dataset.properties
    }

    fn data_timestamp(&self) -> &str {
        &self.timestamp
    }

    fn data_checksum(&self) -> u32 {
        self.dataset.checksum
    }
}

//! Phantom nodes: projections of query coordinates onto graph edges.
//!
//! A phantom carries both directions of the segment it sits on, with split
//! weights sufficient to seed a search from mid-edge in either direction.

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;
use crate::types::{
    ComponentId, EdgeWeight, GeometryId, NameId, SegmentId, TravelMode, INVALID_EDGE_WEIGHT,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhantomNode {
    pub forward_segment_id: SegmentId,
    pub reverse_segment_id: SegmentId,
    pub name_id: NameId,
    /// Cost within the split sub-segment, from its start to the split point.
    pub forward_weight: EdgeWeight,
    /// Same for the reverse direction's sub-segment.
    pub reverse_weight: EdgeWeight,
    /// Cost of the sub-segments preceding the split one, forward direction;
    /// `forward_offset + forward_weight` is the cost from the edge start to
    /// the split point.
    pub forward_offset: EdgeWeight,
    pub reverse_offset: EdgeWeight,
    pub forward_packed_geometry_id: GeometryId,
    pub reverse_packed_geometry_id: GeometryId,
    pub component_id: ComponentId,
    pub is_tiny_component: bool,
    /// Projection of the input coordinate onto the segment.
    pub location: Coordinate,
    pub input_location: Coordinate,
    pub fwd_segment_position: u16,
    pub forward_travel_mode: TravelMode,
    pub backward_travel_mode: TravelMode,
}

impl PhantomNode {
    pub fn forward_weight_plus_offset(&self) -> EdgeWeight {
        debug_assert!(self.forward_segment_id.enabled);
        self.forward_offset + self.forward_weight
    }

    pub fn reverse_weight_plus_offset(&self) -> EdgeWeight {
        debug_assert!(self.reverse_segment_id.enabled);
        self.reverse_offset + self.reverse_weight
    }

    pub fn is_bidirected(&self) -> bool {
        self.forward_segment_id.enabled && self.reverse_segment_id.enabled
    }

    pub fn is_valid(&self, node_count: u32) -> bool {
        self.location.is_valid()
            && ((self.forward_segment_id.enabled && self.forward_segment_id.id < node_count)
                || (self.reverse_segment_id.enabled && self.reverse_segment_id.id < node_count))
            && (self.forward_weight != INVALID_EDGE_WEIGHT
                || self.reverse_weight != INVALID_EDGE_WEIGHT)
    }
}

/// A phantom with its snap distance, as returned by the resolver.
#[derive(Debug, Clone, Copy)]
pub struct PhantomCandidate {
    pub phantom: PhantomNode,
    /// Great-circle distance from the input location to the snap, meters.
    pub distance: f64,
}

/// The opaque hint blob a client can send back to skip re-snapping. The
/// checksum ties it to one dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhantomHint {
    pub checksum: u32,
    pub forward_id: u32,
    pub forward_enabled: bool,
    pub reverse_id: u32,
    pub reverse_enabled: bool,
    pub forward_weight: EdgeWeight,
    pub reverse_weight: EdgeWeight,
    pub forward_offset: EdgeWeight,
    pub reverse_offset: EdgeWeight,
    pub location: (i32, i32),
    pub input_location: (i32, i32),
}

impl PhantomHint {
    pub fn from_phantom(phantom: &PhantomNode, checksum: u32) -> Self {
        Self {
            checksum,
            forward_id: phantom.forward_segment_id.id,
            forward_enabled: phantom.forward_segment_id.enabled,
            reverse_id: phantom.reverse_segment_id.id,
            reverse_enabled: phantom.reverse_segment_id.enabled,
            forward_weight: phantom.forward_weight,
            reverse_weight: phantom.reverse_weight,
            forward_offset: phantom.forward_offset,
            reverse_offset: phantom.reverse_offset,
            location: (phantom.location.lon, phantom.location.lat),
            input_location: (phantom.input_location.lon, phantom.input_location.lat),
        }
    }
}

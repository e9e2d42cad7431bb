//! Core identifier and weight types shared across the pipeline and router.

/// OSM node identifier as found in the input file.
pub type OsmNodeId = i64;
/// OSM way identifier as found in the input file.
pub type OsmWayId = i64;

/// Internal node-based node id, dense 0..n after extraction.
pub type NodeId = u32;
/// Edge id, meaning depends on the graph it indexes into.
pub type EdgeId = u32;
/// Index into the name table (one block of four strings per id).
pub type NameId = u32;
/// Index into the turn lane description table.
pub type LaneDescriptionId = u32;
/// Connected-component id over edge-based nodes.
pub type ComponentId = u32;
/// Index into a packed geometry table.
pub type GeometryId = u32;

/// Signed edge weight in deciseconds. Signed so that phantom offsets can be
/// seeded negatively; `INVALID_EDGE_WEIGHT` is the unreachable sentinel.
pub type EdgeWeight = i32;

pub const INVALID_NODE_ID: NodeId = u32::MAX;
pub const INVALID_EDGE_ID: EdgeId = u32::MAX;
pub const INVALID_NAME_ID: NameId = u32::MAX;
pub const EMPTY_NAME_ID: NameId = 0;
pub const INVALID_LANE_DESCRIPTION_ID: LaneDescriptionId = u32::MAX;
pub const INVALID_COMPONENT_ID: ComponentId = u32::MAX;
pub const INVALID_GEOMETRY_ID: GeometryId = u32::MAX;
pub const INVALID_EDGE_WEIGHT: EdgeWeight = i32::MAX;

/// Travel mode carried on every directed edge.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum TravelMode {
    Inaccessible = 0,
    Driving = 1,
    Cycling = 2,
    Walking = 3,
    Ferry = 4,
    Train = 5,
}

impl TravelMode {
    pub fn from_u8(v: u8) -> TravelMode {
        match v {
            1 => TravelMode::Driving,
            2 => TravelMode::Cycling,
            3 => TravelMode::Walking,
            4 => TravelMode::Ferry,
            5 => TravelMode::Train,
            _ => TravelMode::Inaccessible,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TravelMode::Inaccessible => "inaccessible",
            TravelMode::Driving => "driving",
            TravelMode::Cycling => "cycling",
            TravelMode::Walking => "walking",
            TravelMode::Ferry => "ferry",
            TravelMode::Train => "train",
        }
    }
}

/// A directed segment reference with an enabled bit, as stored on snapping
/// candidates. A disabled side means the segment cannot be entered in that
/// direction (oneway, bearing filter, mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentId {
    pub id: NodeId,
    pub enabled: bool,
}

impl SegmentId {
    pub const INVALID: SegmentId = SegmentId {
        id: INVALID_NODE_ID,
        enabled: false,
    };
}

/// Functional road class, ordered so that a smaller discriminant means a more
/// important road. Used by the obvious-turn and fork detection.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoadPriority {
    Motorway = 0,
    Trunk = 2,
    Primary = 4,
    Secondary = 6,
    Tertiary = 8,
    MainResidential = 10,
    SideResidential = 11,
    Link = 12,
    Service = 14,
    Ferry = 16,
    Path = 18,
    Unknown = 31,
}

/// Road classification attached to every node-based edge by the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoadClassification {
    pub priority: RoadPriority,
    pub link: bool,
    pub motorway: bool,
    pub ramp: bool,
}

impl Default for RoadClassification {
    fn default() -> Self {
        Self {
            priority: RoadPriority::Unknown,
            link: false,
            motorway: false,
            ramp: false,
        }
    }
}

impl RoadClassification {
    /// True when `self` clearly outranks `other` in the road hierarchy.
    pub fn outranks(&self, other: &RoadClassification) -> bool {
        (self.priority as u8) + 2 < (other.priority as u8)
    }

    pub fn is_low_priority(&self) -> bool {
        matches!(self.priority, RoadPriority::Service | RoadPriority::Path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_travel_mode_round_trip() {
        for v in 0..=6u8 {
            let mode = TravelMode::from_u8(v);
            if v >= 1 && v <= 5 {
                assert_eq!(mode as u8, v);
            } else {
                assert_eq!(mode, TravelMode::Inaccessible);
            }
        }
    }

    #[test]
    fn test_priority_ordering() {
        assert!(RoadPriority::Motorway < RoadPriority::Primary);
        let motorway = RoadClassification {
            priority: RoadPriority::Motorway,
            link: false,
            motorway: true,
            ramp: false,
        };
        let residential = RoadClassification {
            priority: RoadPriority::MainResidential,
            ..Default::default()
        };
        assert!(motorway.outranks(&residential));
        assert!(!residential.outranks(&motorway));
    }
}

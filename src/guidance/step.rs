//! Route steps and leg geometry.
//!
//! A step describes the travel from one maneuver to the next. Depart and
//! Arrive are synthetic waypoint steps; everything in between maps to a turn
//! edge of the path.

use crate::extractor::guidance::lanes::{LaneDescription, LaneTuple};
use crate::extractor::guidance::turn_instruction::TurnInstruction;
use crate::geo::{haversine_distance, Coordinate};
use crate::types::{NameId, TravelMode, EMPTY_NAME_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaypointType {
    None,
    Depart,
    Arrive,
}

#[derive(Debug, Clone)]
pub struct StepManeuver {
    pub location: Coordinate,
    /// Bearing of travel immediately before the maneuver, degrees.
    pub bearing_before: f64,
    /// Bearing of travel immediately after the maneuver, degrees.
    pub bearing_after: f64,
    pub instruction: TurnInstruction,
    /// Roundabout exit number, counted by the post-processor.
    pub exit: usize,
    pub waypoint_type: WaypointType,
}

/// An intersection passed along a step; the first one is the maneuver
/// location itself.
#[derive(Debug, Clone, Default)]
pub struct StepIntersection {
    pub location: Coordinate,
    /// Outgoing road bearings, sorted ascending.
    pub bearings: Vec<u16>,
    /// Whether each road can be entered, parallel to `bearings`.
    pub entry: Vec<bool>,
    pub in_index: Option<usize>,
    pub out_index: Option<usize>,
    pub lanes: LaneTuple,
    pub lane_description: LaneDescription,
}

impl Default for StepManeuver {
    fn default() -> Self {
        Self {
            location: Coordinate::new(0, 0),
            bearing_before: 0.0,
            bearing_after: 0.0,
            instruction: TurnInstruction::NO_TURN,
            exit: 0,
            waypoint_type: WaypointType::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteStep {
    pub name_id: NameId,
    pub name: String,
    pub reference: String,
    pub pronunciation: String,
    pub destinations: String,
    pub rotary_name: String,
    pub rotary_pronunciation: String,
    /// Seconds from this maneuver to the next.
    pub duration: f64,
    /// Meters from this maneuver to the next.
    pub distance: f64,
    pub mode: TravelMode,
    pub maneuver: StepManeuver,
    /// Indices into the leg geometry; `geometry_end` of step k equals
    /// `geometry_begin` of step k+1 plus one.
    pub geometry_begin: usize,
    pub geometry_end: usize,
    pub intersections: Vec<StepIntersection>,
}

impl RouteStep {
    /// The cleared-out step the post-processor leaves behind before the
    /// removal sweep.
    pub fn invalid() -> Self {
        Self {
            name_id: EMPTY_NAME_ID,
            name: String::new(),
            reference: String::new(),
            pronunciation: String::new(),
            destinations: String::new(),
            rotary_name: String::new(),
            rotary_pronunciation: String::new(),
            duration: 0.0,
            distance: 0.0,
            mode: TravelMode::Inaccessible,
            maneuver: StepManeuver::default(),
            geometry_begin: 0,
            geometry_end: 0,
            intersections: vec![StepIntersection::default()],
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.maneuver.instruction == TurnInstruction::NO_TURN
            && self.maneuver.waypoint_type == WaypointType::None
    }

    /// Merge `by` into this step; the data is appended at the front or the
    /// back depending on which side is adjacent in the geometry.
    pub fn elongate(mut self, by: &RouteStep) -> RouteStep {
        self.duration += by.duration;
        self.distance += by.distance;
        debug_assert!(self.mode == by.mode || by.mode == TravelMode::Inaccessible);

        if self.geometry_end == by.geometry_begin + 1 {
            // `by` follows this step
            self.geometry_end = by.geometry_end;
            self.intersections.extend(by.intersections.iter().cloned());
        } else {
            debug_assert!(by.geometry_end == self.geometry_begin + 1);
            self.geometry_begin = by.geometry_begin;
            // elongating at the front moves the maneuver
            self.maneuver = by.maneuver.clone();
            let mut intersections = by.intersections.clone();
            intersections.extend(self.intersections);
            self.intersections = intersections;
        }
        self
    }
}

/// Copy all signage from `origin` onto `destination`.
pub fn forward_step_signage(destination: &mut RouteStep, origin: &RouteStep) {
    destination.name_id = origin.name_id;
    destination.name = origin.name.clone();
    destination.pronunciation = origin.pronunciation.clone();
    destination.destinations = origin.destinations.clone();
    destination.destinations = origin.destinations.clone();
    destination.reference = origin.reference.clone();
}

/// Whether a name change between two steps is worth announcing. A step onto
/// the same name and ref stays silent.
pub fn is_noticeable_name_change(from: &RouteStep, to: &RouteStep) -> bool {
    from.name != to.name || from.reference != to.reference
}

#[derive(Debug, Clone, Default)]
pub struct LegGeometry {
    pub locations: Vec<Coordinate>,
    /// First location index of each step.
    pub segment_offsets: Vec<usize>,
    /// Distance in meters per step segment.
    pub segment_distances: Vec<f64>,
}

impl LegGeometry {
    /// Distance along the geometry between two location indices.
    pub fn distance_between(&self, begin: usize, end: usize) -> f64 {
        self.locations[begin..end]
            .windows(2)
            .map(|pair| haversine_distance(pair[0], pair[1]))
            .sum()
    }

    /// Rebuild the per-step offsets and distances from a processed step
    /// list.
    pub fn resync(&mut self, steps: &[RouteStep]) {
        self.segment_offsets.clear();
        self.segment_distances.clear();
        for step in steps {
            self.segment_offsets.push(step.geometry_begin);
            self.segment_distances.push(step.distance);
        }
        // the arrive step covers no segment of its own
        self.segment_offsets.pop();
        self.segment_distances.pop();
    }
}

#[derive(Debug, Clone)]
pub struct Leg {
    pub geometry: LegGeometry,
    pub steps: Vec<RouteStep>,
    pub distance: f64,
    pub duration: f64,
    /// Names of the longest two distinct roads travelled.
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_step_detection() {
        let step = RouteStep::invalid();
        assert!(step.is_invalid());
    }

    #[test]
    fn test_elongate_appends_at_back() {
        let mut first = RouteStep::invalid();
        first.distance = 10.0;
        first.duration = 1.0;
        first.geometry_begin = 0;
        first.geometry_end = 3;
        first.mode = TravelMode::Driving;

        let mut second = RouteStep::invalid();
        second.distance = 20.0;
        second.duration = 2.0;
        second.geometry_begin = 2;
        second.geometry_end = 5;
        second.mode = TravelMode::Driving;

        let merged = first.elongate(&second);
        assert_eq!(merged.distance, 30.0);
        assert_eq!(merged.duration, 3.0);
        assert_eq!(merged.geometry_begin, 0);
        assert_eq!(merged.geometry_end, 5);
        assert_eq!(merged.intersections.len(), 2);
    }

    #[test]
    fn test_elongate_at_front_moves_maneuver() {
        let mut late = RouteStep::invalid();
        late.geometry_begin = 2;
        late.geometry_end = 5;
        late.mode = TravelMode::Driving;

        let mut early = RouteStep::invalid();
        early.geometry_begin = 0;
        early.geometry_end = 3;
        early.mode = TravelMode::Driving;
        early.maneuver.bearing_after = 123.0;

        let merged = late.elongate(&early);
        assert_eq!(merged.geometry_begin, 0);
        assert_eq!(merged.maneuver.bearing_after, 123.0);
    }

    #[test]
    fn test_signage_forwarding() {
        let mut destination = RouteStep::invalid();
        let mut origin = RouteStep::invalid();
        origin.name = "High Street".into();
        origin.reference = "A1".into();
        origin.name_id = 8;
        forward_step_signage(&mut destination, &origin);
        assert_eq!(destination.name, "High Street");
        assert_eq!(destination.reference, "A1");
        assert_eq!(destination.name_id, 8);
    }
}

//! Leg assembly: unpacked edge path to geometry and raw steps.

use crate::extractor::guidance::turn_instruction::TurnInstruction;
use crate::facade::DataFacade;
use crate::geo::{bearing, haversine_distance, reverse_bearing, Coordinate};
use crate::guidance::step::{
    Leg, LegGeometry, RouteStep, StepIntersection, StepManeuver, WaypointType,
};
use crate::router::phantom::PhantomNode;
use crate::router::search::RoutingResult;
use crate::types::NodeId;

/// Geometry chain of one edge-based node, as node-based ids.
fn edge_chain(facade: &dyn DataFacade, node: NodeId) -> Vec<NodeId> {
    facade.geometry_nodes(facade.geometry_id(node)).to_vec()
}

/// The split position of a phantom on the given path end node. Returns the
/// index within the edge's forward-order chain.
fn split_position(phantom: &PhantomNode, node: NodeId, chain_len: usize) -> usize {
    if phantom.forward_segment_id.enabled && phantom.forward_segment_id.id == node {
        phantom.fwd_segment_position as usize
    } else {
        // traversal runs along the reverse direction's geometry
        let segment_count = chain_len - 1;
        segment_count - 1 - phantom.fwd_segment_position as usize
    }
}

fn step_intersection(
    facade: &dyn DataFacade,
    turn: &crate::extractor::edge_expander::TurnData,
    location: Coordinate,
) -> StepIntersection {
    let bearings = facade.bearing_class(turn.bearing_class_id).to_vec();
    let entry_bits = facade.entry_class(turn.entry_class_id);
    let entry: Vec<bool> = (0..bearings.len()).map(|i| entry_bits & (1 << i) != 0).collect();

    let closest_index = |wanted: f64| -> Option<usize> {
        bearings
            .iter()
            .enumerate()
            .min_by(|(_, &a), (_, &b)| {
                crate::geo::angular_deviation(a as f64, wanted)
                    .partial_cmp(&crate::geo::angular_deviation(b as f64, wanted))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
    };

    let lane_description = facade
        .lane_description(turn.lane_description_id)
        .cloned()
        .unwrap_or_default();

    StepIntersection {
        location,
        in_index: closest_index(reverse_bearing(turn.pre_bearing as f64)),
        out_index: closest_index(turn.post_bearing as f64),
        bearings,
        entry,
        lanes: turn.lane_tuple,
        lane_description,
    }
}

fn base_step(facade: &dyn DataFacade, node: NodeId) -> RouteStep {
    let name_id = facade.name_id(node);
    let mut step = RouteStep::invalid();
    step.name_id = name_id;
    step.name = facade.name(name_id).to_string();
    step.reference = facade.reference(name_id).to_string();
    step.pronunciation = facade.pronunciation(name_id).to_string();
    step.destinations = facade.destinations(name_id).to_string();
    step.mode = facade.travel_mode(node);
    step
}

/// Assemble one leg from the unpacked search result.
///
/// The leg geometry runs from the source projection to the target
/// projection; one raw step is emitted per announced boundary plus the
/// Depart and Arrive waypoint steps. Distances are resynced from the
/// geometry at the end.
pub fn assemble_leg(
    facade: &dyn DataFacade,
    result: &RoutingResult,
    source: &PhantomNode,
    target: &PhantomNode,
) -> Leg {
    let path = &result.node_path;
    debug_assert!(!path.is_empty());

    // --- geometry ---
    let mut locations: Vec<Coordinate> = vec![source.location];

    let first_chain = edge_chain(facade, path[0]);
    let first_split = split_position(source, path[0], first_chain.len());
    let last_chain = if path.len() == 1 {
        first_chain.clone()
    } else {
        edge_chain(facade, path[path.len() - 1])
    };
    let last_split = split_position(target, path[path.len() - 1], last_chain.len());

    // boundary location index per path node transition
    let mut boundary_locations: Vec<usize> = Vec::new();

    if path.len() == 1 {
        // both phantoms on one edge: inner nodes between the two splits
        for &node in &first_chain[first_split + 1..=last_split] {
            locations.push(facade.node_coordinate(node));
        }
    } else {
        for &node in &first_chain[first_split + 1..] {
            locations.push(facade.node_coordinate(node));
        }
        for (index, &path_node) in path.iter().enumerate().skip(1) {
            boundary_locations.push(locations.len() - 1);
            let chain = if index == path.len() - 1 {
                last_chain.clone()
            } else {
                edge_chain(facade, path_node)
            };
            let upto = if index == path.len() - 1 {
                last_split + 1
            } else {
                chain.len()
            };
            for &node in &chain[1..upto] {
                locations.push(facade.node_coordinate(node));
            }
        }
    }
    locations.push(target.location);
    // splits landing exactly on a segment end leave zero-length stubs; the
    // trimming pass removes them together with their step

    let geometry = LegGeometry {
        locations,
        segment_offsets: Vec::new(),
        segment_distances: Vec::new(),
    };

    // --- steps ---
    let mut steps: Vec<RouteStep> = Vec::new();
    let first_bearing = if geometry.locations.len() >= 2 {
        bearing(geometry.locations[0], geometry.locations[1])
    } else {
        0.0
    };

    let mut depart = base_step(facade, path[0]);
    depart.maneuver = StepManeuver {
        location: source.location,
        bearing_before: 0.0,
        bearing_after: first_bearing,
        instruction: TurnInstruction::NO_TURN,
        exit: 0,
        waypoint_type: WaypointType::Depart,
    };
    depart.geometry_begin = 0;
    depart.intersections = vec![StepIntersection {
        location: source.location,
        bearings: vec![first_bearing.round() as u16 % 360],
        entry: vec![true],
        in_index: None,
        out_index: Some(0),
        ..Default::default()
    }];
    steps.push(depart);

    // durations accumulate between boundaries, in deciseconds
    let source_weight_used = if source.forward_segment_id.enabled
        && source.forward_segment_id.id == path[0]
    {
        source.forward_weight_plus_offset()
    } else {
        source.reverse_weight_plus_offset()
    };
    let mut pending_ds: i64 = -(source_weight_used as i64);

    for (index, &edge_id) in result.edge_path.iter().enumerate() {
        let turn = facade.turn_data(edge_id);
        pending_ds += facade
            .query_graph()
            .find_edge(path[index], path[index + 1])
            .map(|(_, data)| data.weight as i64)
            .unwrap_or(0);

        let entered = path[index + 1];
        let boundary_location_index = boundary_locations
            .get(index)
            .copied()
            .unwrap_or(geometry.locations.len() - 1)
            .min(geometry.locations.len() - 1);
        let location = geometry.locations[boundary_location_index];

        let name_changed = facade.name_id(entered) != facade.name_id(path[index]);
        let announced = turn.instruction.turn_type
            != crate::extractor::guidance::turn_instruction::TurnType::Suppressed
            || name_changed;

        if announced {
            // close the previous step
            let previous = steps.last_mut().expect("depart exists");
            previous.duration = (pending_ds.max(0) as f64) / 10.0;
            previous.geometry_end = boundary_location_index + 1;
            pending_ds = 0;

            let mut step = base_step(facade, entered);
            step.maneuver = StepManeuver {
                location,
                bearing_before: turn.pre_bearing as f64,
                bearing_after: turn.post_bearing as f64,
                instruction: turn.instruction,
                exit: 0,
                waypoint_type: WaypointType::None,
            };
            step.geometry_begin = boundary_location_index;
            step.intersections = vec![step_intersection(facade, turn, location)];
            steps.push(step);
        } else {
            // silently passed intersection: remember it on the open step
            let previous = steps.last_mut().expect("depart exists");
            previous
                .intersections
                .push(step_intersection(facade, turn, location));
        }
    }

    // target-side partial weight
    let target_weight_used = if target.forward_segment_id.enabled
        && target.forward_segment_id.id == path[path.len() - 1]
    {
        target.forward_weight_plus_offset()
    } else {
        target.reverse_weight_plus_offset()
    };
    pending_ds += target_weight_used as i64;
    {
        let previous = steps.last_mut().expect("depart exists");
        previous.duration = (pending_ds.max(0) as f64) / 10.0;
        previous.geometry_end = geometry.locations.len();
    }

    let last_bearing = if geometry.locations.len() >= 2 {
        bearing(
            geometry.locations[geometry.locations.len() - 2],
            geometry.locations[geometry.locations.len() - 1],
        )
    } else {
        0.0
    };
    let mut arrive = base_step(facade, path[path.len() - 1]);
    arrive.maneuver = StepManeuver {
        location: target.location,
        bearing_before: last_bearing,
        bearing_after: 0.0,
        instruction: TurnInstruction::NO_TURN,
        exit: 0,
        waypoint_type: WaypointType::Arrive,
    };
    arrive.geometry_begin = geometry.locations.len() - 1;
    arrive.geometry_end = geometry.locations.len();
    arrive.intersections = vec![StepIntersection {
        location: target.location,
        bearings: vec![last_bearing.round() as u16 % 360],
        entry: vec![true],
        in_index: Some(0),
        out_index: None,
        ..Default::default()
    }];
    steps.push(arrive);

    // distances from the geometry
    let mut geometry = geometry;
    let mut total_distance = 0.0;
    for step in &mut steps {
        let end = step.geometry_end.min(geometry.locations.len());
        if step.geometry_begin < end {
            step.distance = geometry.distance_between(step.geometry_begin, end);
        }
    }
    // the arrive step carries no distance of its own
    if let Some(last) = steps.last_mut() {
        last.distance = 0.0;
        last.duration = 0.0;
    }
    for step in &steps[..steps.len() - 1] {
        total_distance += step.distance;
    }
    geometry.resync(&steps);

    let total_duration = (result.weight.max(0) as f64) / 10.0;
    let summary = summarize(&steps);

    Leg {
        geometry,
        steps,
        distance: total_distance,
        duration: total_duration,
        summary,
    }
}

/// The two longest distinctly named stretches make the leg summary.
fn summarize(steps: &[RouteStep]) -> String {
    let mut named: Vec<(&str, f64)> = Vec::new();
    for step in steps {
        if step.name.is_empty() {
            continue;
        }
        match named.iter_mut().find(|(name, _)| *name == step.name) {
            Some((_, distance)) => *distance += step.distance,
            None => named.push((&step.name, step.distance)),
        }
    }
    named.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    named
        .iter()
        .take(2)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Waypoint hint distance: how far the raw input sits from the snapped
/// location.
pub fn waypoint_snap_distance(phantom: &PhantomNode) -> f64 {
    haversine_distance(phantom.input_location, phantom.location)
}

//! Intersection classification and turn instruction assignment.
//!
//! Every intersection is classified into a tagged case and handled by a
//! match on the result; each handler assigns a `TurnInstruction` to every
//! enterable road.

use crate::extractor::node_based_graph::EdgeData;
use crate::types::EMPTY_NAME_ID;

use super::intersection::{
    ConnectedRoad, Intersection, DISTINCTION_ANGLE, GROUP_ANGLE, NARROW_TURN_ANGLE, STRAIGHT_ANGLE,
};
use super::roundabouts::{handle_roundabout, RoundaboutTier};
use super::turn_instruction::{
    direction_from_angle, DirectionModifier, TurnInstruction, TurnType,
};

/// Maximum length of a connector that can read as a sliproad.
const MAX_SLIPROAD_LENGTH: f64 = 100.0;

/// The shape of an intersection, dispatched by degree and ring membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectionCase {
    /// Only the road back: turn around or stop.
    DeadEnd,
    /// One continuation: pass through, possibly changing name or mode.
    PassThrough,
    /// Two continuations: forks, T-intersections, obvious turns.
    ThreeWay,
    /// Three or more continuations.
    Complex,
    /// The node touches a roundabout ring.
    Roundabout(RoundaboutTier),
}

/// Classify the intersection seen from the incoming edge.
pub fn classify(
    in_data: &EdgeData,
    intersection: &Intersection,
    tier: impl FnOnce() -> RoundaboutTier,
) -> IntersectionCase {
    if in_data.roundabout || intersection.roads.iter().any(|road| road.roundabout) {
        return IntersectionCase::Roundabout(tier());
    }
    let continuations = intersection
        .roads
        .iter()
        .filter(|road| road.target != intersection.from_node)
        .count();
    match continuations {
        0 => IntersectionCase::DeadEnd,
        1 => IntersectionCase::PassThrough,
        2 => IntersectionCase::ThreeWay,
        _ => IntersectionCase::Complex,
    }
}

/// Assign instructions to all enterable roads of the intersection.
pub fn annotate_intersection(
    in_data: &EdgeData,
    case: IntersectionCase,
    intersection: Intersection,
) -> Intersection {
    let mut intersection = match case {
        IntersectionCase::Roundabout(tier) => {
            return handle_roundabout(in_data.roundabout, tier, intersection)
        }
        IntersectionCase::DeadEnd => handle_dead_end(intersection),
        IntersectionCase::PassThrough => handle_pass_through(in_data, intersection),
        IntersectionCase::ThreeWay => handle_three_way(in_data, intersection),
        IntersectionCase::Complex => handle_complex(in_data, intersection),
    };
    mark_sliproads(in_data, &mut intersection);
    intersection
}

fn handle_dead_end(mut intersection: Intersection) -> Intersection {
    for road in &mut intersection.roads {
        if road.entry_allowed {
            road.instruction = TurnInstruction::new(TurnType::Turn, DirectionModifier::UTurn);
        }
    }
    intersection
}

fn handle_pass_through(in_data: &EdgeData, mut intersection: Intersection) -> Intersection {
    let from_node = intersection.from_node;
    for road in &mut intersection.roads {
        if !road.entry_allowed {
            continue;
        }
        road.instruction = if road.target == from_node {
            TurnInstruction::new(TurnType::Turn, DirectionModifier::UTurn)
        } else {
            continuation_instruction(in_data, road)
        };
    }
    intersection
}

fn handle_three_way(in_data: &EdgeData, mut intersection: Intersection) -> Intersection {
    let from_node = intersection.from_node;

    if let Some((lo, hi)) = find_fork(&intersection) {
        assign_fork(&mut intersection.roads[lo..=hi]);
        for road in &mut intersection.roads {
            if road.entry_allowed && road.instruction == TurnInstruction::INVALID {
                road.instruction = if road.target == from_node {
                    TurnInstruction::new(TurnType::Turn, DirectionModifier::UTurn)
                } else {
                    TurnInstruction::from_angle(TurnType::Turn, road.angle)
                };
            }
        }
        return intersection;
    }

    let obvious = find_obvious_turn(in_data, &intersection);
    let is_t_intersection = intersection
        .roads
        .iter()
        .filter(|road| road.target != from_node)
        .all(|road| road.deviation_from_straight() > 2.0 * GROUP_ANGLE);

    for index in 0..intersection.roads.len() {
        if !intersection.roads[index].entry_allowed {
            continue;
        }
        let road = &intersection.roads[index];
        let instruction = if road.target == from_node {
            TurnInstruction::new(TurnType::Turn, DirectionModifier::UTurn)
        } else if obvious == Some(index) {
            continuation_instruction(in_data, road)
        } else if is_t_intersection && obvious.is_none() {
            // the road we are on ends; the turn is forced left or right
            TurnInstruction::from_angle(TurnType::EndOfRoad, road.angle)
        } else {
            TurnInstruction::from_angle(TurnType::Turn, road.angle)
        };
        intersection.roads[index].instruction = instruction;
    }
    intersection
}

fn handle_complex(in_data: &EdgeData, mut intersection: Intersection) -> Intersection {
    let from_node = intersection.from_node;

    let fork = find_fork(&intersection);
    if let Some((lo, hi)) = fork {
        assign_fork(&mut intersection.roads[lo..=hi]);
    }
    let obvious = if fork.is_none() {
        find_obvious_turn(in_data, &intersection)
    } else {
        None
    };

    for index in 0..intersection.roads.len() {
        if !intersection.roads[index].entry_allowed
            || intersection.roads[index].instruction != TurnInstruction::INVALID
        {
            continue;
        }
        let road = &intersection.roads[index];
        let instruction = if road.target == from_node {
            TurnInstruction::new(TurnType::Turn, DirectionModifier::UTurn)
        } else if obvious == Some(index) {
            continuation_instruction(in_data, road)
        } else {
            TurnInstruction::from_angle(TurnType::Turn, road.angle)
        };
        intersection.roads[index].instruction = instruction;
    }

    resolve_modifier_conflicts(&mut intersection.roads);
    intersection
}

/// Instruction for following the single (or obvious) continuation.
fn continuation_instruction(in_data: &EdgeData, road: &ConnectedRoad) -> TurnInstruction {
    let deviation = road.deviation_from_straight();

    // ramps onto and off motorways have dedicated vocabulary
    if road.classification.ramp && !in_data.classification.ramp {
        let turn_type = if in_data.classification.motorway {
            TurnType::OffRamp
        } else {
            TurnType::OnRamp
        };
        let modifier = if deviation <= NARROW_TURN_ANGLE {
            DirectionModifier::Straight
        } else if road.angle < STRAIGHT_ANGLE {
            DirectionModifier::Right
        } else {
            DirectionModifier::Left
        };
        return TurnInstruction::new(turn_type, modifier);
    }
    if in_data.classification.ramp && road.classification.motorway && !road.classification.ramp {
        // merging from a ramp onto the carriageway
        let modifier = if road.angle < STRAIGHT_ANGLE {
            DirectionModifier::SlightRight
        } else {
            DirectionModifier::SlightLeft
        };
        return TurnInstruction::new(TurnType::Merge, modifier);
    }

    let name_changes = road.name_id != in_data.name_id;
    if name_changes {
        return TurnInstruction::from_angle(TurnType::NewName, road.angle);
    }
    if deviation <= NARROW_TURN_ANGLE {
        TurnInstruction::suppressed(DirectionModifier::Straight)
    } else {
        TurnInstruction::from_angle(TurnType::Continue, road.angle)
    }
}

/// An obvious turn either dominates by road category, or is nearly straight
/// while every competitor clearly is not, with name continuity on its side.
pub fn find_obvious_turn(in_data: &EdgeData, intersection: &Intersection) -> Option<usize> {
    let candidates: Vec<usize> = intersection
        .roads
        .iter()
        .enumerate()
        .filter(|(_, road)| road.entry_allowed && road.target != intersection.from_node)
        .map(|(index, _)| index)
        .collect();

    match candidates.len() {
        0 => return None,
        1 => return Some(candidates[0]),
        _ => {}
    }

    // category domination
    let dominant: Vec<usize> = candidates
        .iter()
        .copied()
        .filter(|&index| {
            candidates.iter().all(|&other| {
                other == index
                    || intersection.roads[index]
                        .classification
                        .outranks(&intersection.roads[other].classification)
            })
        })
        .collect();
    if dominant.len() == 1 {
        return Some(dominant[0]);
    }

    // angular domination with name continuity
    let best = candidates
        .iter()
        .copied()
        .min_by(|&a, &b| {
            intersection.roads[a]
                .deviation_from_straight()
                .partial_cmp(&intersection.roads[b].deviation_from_straight())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
    let best_road = &intersection.roads[best];
    if best_road.deviation_from_straight() > NARROW_TURN_ANGLE {
        return None;
    }
    let others_deviate = candidates.iter().all(|&other| {
        other == best || intersection.roads[other].deviation_from_straight() > DISTINCTION_ANGLE
    });
    if !others_deviate {
        return None;
    }
    let name_continues = in_data.name_id == EMPTY_NAME_ID
        || best_road.name_id == in_data.name_id
        || candidates
            .iter()
            .all(|&other| other == best || intersection.roads[other].name_id != in_data.name_id);
    if name_continues {
        Some(best)
    } else {
        None
    }
}

/// A fork is a contiguous run of two or three enterable roads, mutually
/// within `GROUP_ANGLE`, covering a narrow wedge around straight.
pub fn find_fork(intersection: &Intersection) -> Option<(usize, usize)> {
    let straightmost = intersection.straightmost_road()?;
    let roads = &intersection.roads;
    if !roads[straightmost].entry_allowed
        || roads[straightmost].deviation_from_straight() > GROUP_ANGLE
    {
        return None;
    }

    // branches of one fork carry comparable roads
    let comparable = |a: &ConnectedRoad, b: &ConnectedRoad| {
        a.classification.link == b.classification.link
            && !a.classification.outranks(&b.classification)
            && !b.classification.outranks(&a.classification)
    };

    let mut lo = straightmost;
    let mut hi = straightmost;
    while lo > 0
        && roads[lo - 1].entry_allowed
        && roads[lo - 1].target != intersection.from_node
        && roads[lo].angle - roads[lo - 1].angle <= GROUP_ANGLE
        && comparable(&roads[lo - 1], &roads[straightmost])
    {
        lo -= 1;
    }
    while hi + 1 < roads.len()
        && roads[hi + 1].entry_allowed
        && roads[hi + 1].target != intersection.from_node
        && roads[hi + 1].angle - roads[hi].angle <= GROUP_ANGLE
        && comparable(&roads[hi + 1], &roads[straightmost])
    {
        hi += 1;
    }

    let size = hi - lo + 1;
    if !(2..=3).contains(&size) {
        return None;
    }
    // the wedge must sit around straight
    if roads[hi].angle - roads[lo].angle > 2.0 * GROUP_ANGLE {
        return None;
    }
    if (roads[lo].angle - STRAIGHT_ANGLE).abs() > 2.0 * GROUP_ANGLE
        || (roads[hi].angle - STRAIGHT_ANGLE).abs() > 2.0 * GROUP_ANGLE
    {
        return None;
    }
    Some((lo, hi))
}

/// Fork branches read right to left (roads are sorted by angle).
fn assign_fork(roads: &mut [ConnectedRoad]) {
    let modifiers: &[DirectionModifier] = match roads.len() {
        2 => &[DirectionModifier::SlightRight, DirectionModifier::SlightLeft],
        _ => &[
            DirectionModifier::SlightRight,
            DirectionModifier::Straight,
            DirectionModifier::SlightLeft,
        ],
    };
    for (road, &modifier) in roads.iter_mut().zip(modifiers) {
        if road.entry_allowed {
            road.instruction = TurnInstruction::new(TurnType::Fork, modifier);
        }
    }
}

/// Two roads on the same side that map to the same modifier are pushed
/// apart towards sharp/slight by angle order.
fn resolve_modifier_conflicts(roads: &mut [ConnectedRoad]) {
    for i in 1..roads.len() {
        let (head, tail) = roads.split_at_mut(i);
        let previous = head.last_mut().unwrap();
        let current = &mut tail[0];
        if !previous.entry_allowed || !current.entry_allowed {
            continue;
        }
        if previous.instruction.turn_type != TurnType::Turn
            || current.instruction.turn_type != TurnType::Turn
        {
            continue;
        }
        if previous.instruction.direction_modifier != current.instruction.direction_modifier {
            continue;
        }
        // `previous` has the smaller angle: push it towards sharp (right
        // side) or the current one towards sharp (left side)
        match current.instruction.direction_modifier {
            DirectionModifier::Right => {
                previous.instruction.direction_modifier = DirectionModifier::SharpRight;
            }
            DirectionModifier::SlightRight => {
                previous.instruction.direction_modifier = DirectionModifier::Right;
            }
            DirectionModifier::Left => {
                current.instruction.direction_modifier = DirectionModifier::SharpLeft;
            }
            DirectionModifier::SlightLeft => {
                current.instruction.direction_modifier = DirectionModifier::Left;
            }
            _ => {}
        }
    }
}

/// A short link road leaving a junction that also has a same-name
/// continuation is a sliproad; guidance later collapses it onto the turn at
/// its far end.
fn mark_sliproads(in_data: &EdgeData, intersection: &mut Intersection) {
    let has_continuation = intersection.roads.iter().any(|road| {
        road.entry_allowed
            && road.name_id == in_data.name_id
            && road.deviation_from_straight() <= DISTINCTION_ANGLE
            && !road.classification.link
    });
    if !has_continuation {
        return;
    }
    for road in &mut intersection.roads {
        if road.entry_allowed
            && road.classification.link
            && !in_data.classification.motorway
            && !in_data.classification.link
            && road.length <= MAX_SLIPROAD_LENGTH
            && road.instruction.turn_type == TurnType::Turn
        {
            road.instruction.turn_type = TurnType::Sliproad;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        NameId, NodeId, RoadClassification, RoadPriority, TravelMode,
        INVALID_LANE_DESCRIPTION_ID, INVALID_NODE_ID,
    };

    fn in_edge(name_id: NameId) -> EdgeData {
        EdgeData {
            forward_weight: 10,
            backward_weight: 10,
            name_id,
            travel_mode: TravelMode::Driving,
            lane_description_id: INVALID_LANE_DESCRIPTION_ID,
            roundabout: false,
            startpoint: true,
            is_split: false,
            classification: RoadClassification {
                priority: RoadPriority::Secondary,
                ..Default::default()
            },
            geometry_key: 0,
            edge_based_node_id: INVALID_NODE_ID,
        }
    }

    fn road(angle: f64, name_id: NameId, target: NodeId) -> ConnectedRoad {
        ConnectedRoad {
            slot_index: 0,
            target,
            entry_allowed: true,
            bearing: 0.0,
            angle,
            name_id,
            travel_mode: TravelMode::Driving,
            roundabout: false,
            classification: RoadClassification {
                priority: RoadPriority::Secondary,
                ..Default::default()
            },
            length: 200.0,
            instruction: TurnInstruction::INVALID,
        }
    }

    fn intersection(from: NodeId, roads: Vec<ConnectedRoad>) -> Intersection {
        Intersection {
            via: 100,
            from_node: from,
            in_bearing: 0.0,
            roads,
        }
    }

    #[test]
    fn test_pass_through_same_name_is_suppressed() {
        let in_data = in_edge(4);
        let i = intersection(9, vec![road(181.0, 4, 7)]);
        let annotated = annotate_intersection(&in_data, IntersectionCase::PassThrough, i);
        assert_eq!(
            annotated.roads[0].instruction,
            TurnInstruction::suppressed(DirectionModifier::Straight)
        );
    }

    #[test]
    fn test_pass_through_name_change() {
        let in_data = in_edge(4);
        let i = intersection(9, vec![road(178.0, 8, 7)]);
        let annotated = annotate_intersection(&in_data, IntersectionCase::PassThrough, i);
        assert_eq!(annotated.roads[0].instruction.turn_type, TurnType::NewName);
        assert_eq!(
            annotated.roads[0].instruction.direction_modifier,
            DirectionModifier::Straight
        );
    }

    #[test]
    fn test_three_way_obvious_straight_with_side_turn() {
        let in_data = in_edge(4);
        // straight continuation of the same name plus a right turn
        let i = intersection(9, vec![road(90.0, 8, 5), road(182.0, 4, 7)]);
        let annotated = annotate_intersection(&in_data, IntersectionCase::ThreeWay, i);
        let right = &annotated.roads[0];
        let straight = &annotated.roads[1];
        assert_eq!(straight.instruction.turn_type, TurnType::Suppressed);
        assert_eq!(right.instruction.turn_type, TurnType::Turn);
        assert_eq!(right.instruction.direction_modifier, DirectionModifier::Right);
    }

    #[test]
    fn test_t_intersection_end_of_road() {
        let in_data = in_edge(4);
        let i = intersection(9, vec![road(90.0, 8, 5), road(270.0, 8, 7)]);
        let annotated = annotate_intersection(&in_data, IntersectionCase::ThreeWay, i);
        assert_eq!(annotated.roads[0].instruction.turn_type, TurnType::EndOfRoad);
        assert_eq!(
            annotated.roads[0].instruction.direction_modifier,
            DirectionModifier::Right
        );
        assert_eq!(annotated.roads[1].instruction.turn_type, TurnType::EndOfRoad);
        assert_eq!(
            annotated.roads[1].instruction.direction_modifier,
            DirectionModifier::Left
        );
    }

    #[test]
    fn test_fork_detection() {
        let in_data = in_edge(4);
        let i = intersection(9, vec![road(165.0, 5, 5), road(195.0, 6, 7)]);
        assert_eq!(find_fork(&i), Some((0, 1)));
        let annotated = annotate_intersection(&in_data, IntersectionCase::ThreeWay, i);
        assert_eq!(annotated.roads[0].instruction.turn_type, TurnType::Fork);
        assert_eq!(
            annotated.roads[0].instruction.direction_modifier,
            DirectionModifier::SlightRight
        );
        assert_eq!(
            annotated.roads[1].instruction.direction_modifier,
            DirectionModifier::SlightLeft
        );
    }

    #[test]
    fn test_no_fork_when_wedge_too_wide() {
        let i = intersection(9, vec![road(120.0, 5, 5), road(240.0, 6, 7)]);
        assert_eq!(find_fork(&i), None);
    }

    #[test]
    fn test_obvious_by_category_domination() {
        let in_data = in_edge(4);
        let mut main = road(150.0, 4, 5);
        main.classification.priority = RoadPriority::Primary;
        let mut side = road(200.0, 9, 7);
        side.classification.priority = RoadPriority::Service;
        let i = intersection(9, vec![main, side]);
        assert_eq!(find_obvious_turn(&in_data, &i), Some(0));
    }

    #[test]
    fn test_merge_from_ramp() {
        let mut in_data = in_edge(4);
        in_data.classification = RoadClassification {
            priority: RoadPriority::Link,
            link: true,
            motorway: true,
            ramp: true,
        };
        let mut highway = road(170.0, 2, 5);
        highway.classification = RoadClassification {
            priority: RoadPriority::Motorway,
            link: false,
            motorway: true,
            ramp: false,
        };
        let i = intersection(9, vec![highway]);
        let annotated = annotate_intersection(&in_data, IntersectionCase::PassThrough, i);
        assert_eq!(annotated.roads[0].instruction.turn_type, TurnType::Merge);
        assert_eq!(
            annotated.roads[0].instruction.direction_modifier,
            DirectionModifier::SlightRight
        );
    }

    #[test]
    fn test_off_ramp_from_motorway() {
        let mut in_data = in_edge(2);
        in_data.classification = RoadClassification {
            priority: RoadPriority::Motorway,
            link: false,
            motorway: true,
            ramp: false,
        };
        let mut ramp = road(150.0, 9, 5);
        ramp.classification = RoadClassification {
            priority: RoadPriority::Link,
            link: true,
            motorway: true,
            ramp: true,
        };
        let mut highway = road(182.0, 2, 7);
        highway.classification = in_data.classification;
        let i = intersection(9, vec![ramp, highway]);
        let annotated = annotate_intersection(&in_data, IntersectionCase::ThreeWay, i);
        // the motorway continuation is obvious, the ramp is a turn off it
        assert_eq!(annotated.roads[1].instruction.turn_type, TurnType::Suppressed);
        assert_eq!(annotated.roads[0].instruction.turn_type, TurnType::Turn);
    }

    #[test]
    fn test_complex_conflict_resolution() {
        let in_data = in_edge(4);
        let i = intersection(
            9,
            vec![
                road(80.0, 5, 5),
                road(110.0, 6, 6),
                road(250.0, 7, 7),
            ],
        );
        let annotated = annotate_intersection(&in_data, IntersectionCase::Complex, i);
        let first = annotated.roads[0].instruction.direction_modifier;
        let second = annotated.roads[1].instruction.direction_modifier;
        assert_ne!(first, second, "same-side duplicate modifiers must be resolved");
        assert_eq!(first, DirectionModifier::SharpRight);
        assert_eq!(second, DirectionModifier::Right);
    }
}

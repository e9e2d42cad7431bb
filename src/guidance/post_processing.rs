//! Step list rewriting: roundabout accounting, collapsing, lane cleanup,
//! end-of-road refinement, waypoint modifiers and short-segment trimming.
//!
//! Runs as a pipeline of passes over the raw steps; after every pass, steps
//! cleared to `NoTurn` without a waypoint type are dropped. Depart and
//! Arrive always survive.

use crate::extractor::guidance::lanes::{lane_type, LaneTuple};
use crate::extractor::guidance::turn_instruction::{
    direction_from_angle, DirectionModifier, TurnInstruction, TurnType,
};
use crate::geo::{
    angular_deviation, compute_angle, haversine_distance, reverse_bearing, turn_angle, Coordinate,
};
use crate::guidance::step::{
    forward_step_signage, is_noticeable_name_change, Leg, LegGeometry, RouteStep, WaypointType,
};
use crate::router::phantom::PhantomNode;
use crate::types::EMPTY_NAME_ID;

/// Steps shorter than this collapse into their neighbours.
const MAX_COLLAPSE_DISTANCE: f64 = 30.0;
/// Tolerance around a perfect reversal when detecting u-turns.
const REVERSED_BEARING_TOLERANCE: f64 = 35.0;
/// Zig-zags shorter than this read as one staggered intersection.
const MAX_STAGGERED_DISTANCE: f64 = 3.0;
/// Name oscillations below this length are not announced.
const NAME_SEGMENT_CUTOFF_LENGTH: f64 = 100.0;
/// An end-of-road turn needs at least this many passed intersections.
const MIN_END_OF_ROAD_INTERSECTIONS: usize = 2;
/// Range in which depart/arrive get a left/right side modifier.
const MIN_RELATIVE_DISTANCE: f64 = 5.0;
const MAX_RELATIVE_DISTANCE: f64 = 300.0;

/// Full pipeline over one assembled leg.
pub fn post_process_leg(mut leg: Leg, source: &PhantomNode, target: &PhantomNode) -> Leg {
    let mut steps = leg.steps;
    if steps.len() > 2 {
        steps = process_roundabouts(steps);
        steps = collapse_turns(steps);
        steps = collapse_use_lane(steps);
        steps = refine_end_of_road(steps);
    }
    trim_short_segments(&mut steps, &mut leg.geometry);
    steps = assign_relative_locations(steps, &leg.geometry, source, target);
    leg.geometry.resync(&steps);
    leg.steps = steps;
    leg
}

fn invalidate(step: &mut RouteStep) {
    *step = RouteStep::invalid();
}

/// Drop steps cleared by the passes. Depart/Arrive are kept by definition.
fn remove_no_turn_instructions(mut steps: Vec<RouteStep>) -> Vec<RouteStep> {
    steps.retain(|step| !step.is_invalid());
    debug_assert!(steps.len() >= 2);
    debug_assert!(steps.first().map_or(false, |s| s.maneuver.waypoint_type == WaypointType::Depart));
    debug_assert!(steps.last().map_or(false, |s| s.maneuver.waypoint_type == WaypointType::Arrive));
    steps
}

/// Merge a silent step into an accumulating one without moving the maneuver.
fn forward_into(mut destination: RouteStep, source: &RouteStep) -> RouteStep {
    destination.duration += source.duration;
    destination.distance += source.distance;
    destination.maneuver.exit = source.maneuver.exit;
    if destination.geometry_begin < source.geometry_begin {
        destination
            .intersections
            .extend(source.intersections.iter().cloned());
    } else {
        let mut intersections = source.intersections.clone();
        intersections.extend(destination.intersections);
        destination.intersections = intersections;
    }
    destination.geometry_begin = destination.geometry_begin.min(source.geometry_begin);
    destination.geometry_end = destination.geometry_end.max(source.geometry_end);
    destination
}

// ---------------------------------------------------------------------------
// Pass A: roundabout accounting
// ---------------------------------------------------------------------------

/// Entry setup; returns whether the traversal stays on the ring afterwards.
fn set_up_roundabout(step: &mut RouteStep) -> bool {
    let instruction = step.maneuver.instruction;
    if matches!(
        instruction.turn_type,
        TurnType::EnterRotaryAtExit
            | TurnType::EnterRoundaboutAtExit
            | TurnType::EnterRoundaboutIntersectionAtExit
    ) {
        // the entry doubles as the first exit
        step.maneuver.exit = 1;
        step.maneuver.instruction.turn_type = match instruction.turn_type {
            TurnType::EnterRotaryAtExit => TurnType::EnterRotary,
            TurnType::EnterRoundaboutAtExit => TurnType::EnterRoundabout,
            _ => TurnType::EnterRoundaboutIntersection,
        };
    }

    if instruction.leaves_roundabout() {
        // entering and exiting at the same node
        step.maneuver.exit = 1;
        step.maneuver.instruction.turn_type = match instruction.turn_type {
            TurnType::EnterAndExitRotary => TurnType::EnterRotary,
            TurnType::EnterAndExitRoundabout => TurnType::EnterRoundabout,
            _ => TurnType::EnterRoundaboutIntersection,
        };
        false
    } else {
        true
    }
}

fn exit_to_enter(turn_type: TurnType) -> TurnType {
    match turn_type {
        TurnType::ExitRotary => TurnType::EnterRotary,
        _ => TurnType::EnterRoundabout,
    }
}

/// Fold the ring traversal into the entering step and attach the exit count.
fn close_off_roundabout(has_entered: bool, steps: &mut [RouteStep], step_index: usize) {
    steps[step_index].maneuver.exit += 1;

    if !has_entered {
        // the leg started on the ring: announce the exit right at the start
        let depart = steps[0].clone();
        steps[0].duration = 0.0;
        steps[0].distance = 0.0;
        steps[0].geometry_end = 1;

        let mut first = steps[1].clone();
        first.geometry_begin = 0;
        first.duration += depart.duration;
        first.distance += depart.distance;
        first.maneuver.instruction.turn_type =
            exit_to_enter(steps[step_index].maneuver.instruction.turn_type);
        if first.maneuver.instruction.turn_type == TurnType::EnterRotary {
            first.rotary_name = depart.name.clone();
            first.rotary_pronunciation = depart.pronunciation.clone();
        }
        if first.maneuver.instruction.leaves_roundabout() {
            first.maneuver.exit = 1;
        }
        steps[1] = first;
    }

    let exit_step = steps[step_index].clone();
    let exit_bearing = exit_step.maneuver.bearing_after;

    if step_index > 1 {
        for propagation_index in (1..step_index).rev() {
            steps[propagation_index] = forward_into(
                steps[propagation_index].clone(),
                &steps[propagation_index + 1],
            );
            let instruction = steps[propagation_index].maneuver.instruction;
            if instruction.enters_roundabout() {
                if matches!(
                    instruction.turn_type,
                    TurnType::EnterRotary | TurnType::EnterRotaryAtExit
                ) {
                    steps[propagation_index].rotary_name = steps[propagation_index].name.clone();
                    steps[propagation_index].rotary_pronunciation =
                        steps[propagation_index].pronunciation.clone();
                } else if matches!(
                    instruction.turn_type,
                    TurnType::EnterRoundaboutIntersection
                        | TurnType::EnterRoundaboutIntersectionAtExit
                ) {
                    let entry_bearing = steps[propagation_index].maneuver.bearing_before;
                    let angle = turn_angle(reverse_bearing(entry_bearing), exit_bearing);
                    steps[propagation_index].maneuver.instruction.direction_modifier =
                        direction_from_angle(angle);
                }
                forward_step_signage(&mut steps[propagation_index], &exit_step);
                invalidate(&mut steps[propagation_index + 1]);
                break;
            } else {
                invalidate(&mut steps[propagation_index + 1]);
            }
        }
    }
}

/// A roundabout the leg never leaves turns into a plain enter instruction.
fn fix_final_roundabout(steps: &mut [RouteStep]) {
    for index in (1..steps.len()).rev() {
        let instruction = steps[index].maneuver.instruction;
        if instruction.enters_roundabout() {
            steps[index].maneuver.exit = 0;
            if matches!(
                instruction.turn_type,
                TurnType::EnterRotary | TurnType::EnterRotaryAtExit
            ) {
                steps[index].rotary_name = steps[index].name.clone();
                steps[index].rotary_pronunciation = steps[index].pronunciation.clone();
            } else if matches!(
                instruction.turn_type,
                TurnType::EnterRoundaboutIntersection
                    | TurnType::EnterRoundaboutIntersectionAtExit
            ) {
                steps[index].maneuver.instruction.turn_type = TurnType::EnterRoundabout;
            }
            return;
        } else if instruction.turn_type == TurnType::StayOnRoundabout {
            steps[index - 1] = forward_into(steps[index - 1].clone(), &steps[index]);
            invalidate(&mut steps[index]);
        }
    }
}

/// Walk forward counting exits; the count lands on the entering step (I7:
/// the number of stay transitions since the enter, plus one).
pub fn process_roundabouts(mut steps: Vec<RouteStep>) -> Vec<RouteStep> {
    let mut on_roundabout = false;
    let mut has_entered = false;

    for index in 0..steps.len() {
        let instruction = steps[index].maneuver.instruction;
        if instruction.enters_roundabout() {
            has_entered = set_up_roundabout(&mut steps[index]);
            if has_entered && index + 1 < steps.len() {
                steps[index + 1].maneuver.exit = steps[index].maneuver.exit;
            }
        } else if instruction.turn_type == TurnType::StayOnRoundabout {
            on_roundabout = true;
            steps[index].maneuver.exit += 1;
            if index + 1 < steps.len() {
                steps[index + 1].maneuver.exit = steps[index].maneuver.exit;
            }
        } else if instruction.leaves_roundabout() {
            close_off_roundabout(has_entered, &mut steps, index);
            has_entered = false;
            on_roundabout = false;
        } else if on_roundabout && index + 1 < steps.len() {
            steps[index + 1].maneuver.exit = steps[index].maneuver.exit;
        }
    }

    if has_entered || on_roundabout {
        fix_final_roundabout(&mut steps);
    }

    remove_no_turn_instructions(steps)
}

// ---------------------------------------------------------------------------
// Pass B: step collapse
// ---------------------------------------------------------------------------

fn is_collapsable_instruction(instruction: TurnInstruction) -> bool {
    instruction.turn_type == TurnType::NewName
        || (instruction.turn_type == TurnType::Suppressed
            && instruction.direction_modifier == DirectionModifier::Straight)
        || (instruction.turn_type == TurnType::Turn
            && instruction.direction_modifier == DirectionModifier::Straight)
        || (instruction.turn_type == TurnType::Continue
            && instruction.direction_modifier == DirectionModifier::Straight)
        || instruction.turn_type == TurnType::Merge
}

fn compatible(lhs: &RouteStep, rhs: &RouteStep) -> bool {
    lhs.mode == rhs.mode
}

fn has_maneuver(first: &RouteStep, second: &RouteStep) -> bool {
    first.maneuver.instruction.turn_type != TurnType::Suppressed
        || second.maneuver.instruction.turn_type != TurnType::Suppressed
}

/// The following turn offers no choice: longer steps still collapse.
fn choiceless(step: &RouteStep, previous: &RouteStep) -> bool {
    previous.distance < 4.0 * MAX_COLLAPSE_DISTANCE
        && step
            .intersections
            .first()
            .map_or(false, |i| i.entry.iter().filter(|&&e| e).count() <= 1)
}

fn collapsable(step: &RouteStep, next: &RouteStep) -> bool {
    let is_short = step.distance < MAX_COLLAPSE_DISTANCE;
    if is_short && is_collapsable_instruction(step.maneuver.instruction) {
        return true;
    }
    let is_use_lane = step.maneuver.instruction.turn_type == TurnType::UseLane;
    let lanes_unchanged = step.intersections.first().map(|i| i.lanes)
        == next.intersections.first().map(|i| i.lanes);
    is_short && is_use_lane && lanes_unchanged
}

/// Nearly perfectly reversed bearings differ by ~180 degrees.
fn bearings_are_reversed(bearing_in: f64, bearing_out: f64) -> bool {
    let left_turn_angle = if 0.0 <= bearing_out && bearing_out <= bearing_in {
        bearing_in - bearing_out
    } else {
        bearing_in + 360.0 - bearing_out
    };
    angular_deviation(left_turn_angle, 180.0) <= REVERSED_BEARING_TOLERANCE
}

fn step_turn_angle(step: &RouteStep) -> f64 {
    turn_angle(step.maneuver.bearing_before, step.maneuver.bearing_after)
}

/// Short right-left or left-right zig-zags announce as one continue.
fn is_staggered_intersection(previous: &RouteStep, current: &RouteStep) -> bool {
    let is_right = |angle: f64| angle > 45.0 && angle < 135.0;
    let is_left = |angle: f64| angle > 225.0 && angle < 315.0;

    let previous_angle = step_turn_angle(previous);
    let current_angle = step_turn_angle(current);

    let left_right = is_left(previous_angle) && is_right(current_angle);
    let right_left = is_right(previous_angle) && is_left(current_angle);
    previous.distance < MAX_STAGGERED_DISTANCE && (left_right || right_left)
}

fn name_segment_length(mut at: usize, steps: &[RouteStep]) -> f64 {
    let mut result = steps[at].distance;
    while at + 1 < steps.len() && !is_noticeable_name_change(&steps[at], &steps[at + 1]) {
        at += 1;
        result += steps[at].distance;
    }
    result
}

fn get_previous_index(steps: &[RouteStep], mut index: usize) -> usize {
    debug_assert!(index > 0);
    index -= 1;
    while index > 0 && steps[index].maneuver.instruction.turn_type == TurnType::NoTurn {
        index -= 1;
    }
    index
}

fn get_previous_name_index(steps: &[RouteStep], mut index: usize) -> usize {
    debug_assert!(index > 0);
    index -= 1;
    while index > 0 && steps[index].name_id == EMPTY_NAME_ID {
        index -= 1;
    }
    index
}

fn in_bearing(step: &RouteStep) -> f64 {
    step.maneuver.bearing_before
}

fn out_bearing(step: &RouteStep) -> f64 {
    step.maneuver.bearing_after
}

/// The two/three-step collapse scenarios around one short segment.
fn collapse_turn_at(
    steps: &mut [RouteStep],
    two_back_index: usize,
    one_back_index: usize,
    step_index: usize,
) {
    let current_step = steps[step_index].clone();
    let one_back_step = steps[one_back_index].clone();

    if !has_maneuver(&one_back_step, &current_step) {
        return;
    }

    // very short new name
    if (collapsable(&one_back_step, &current_step)
        || (is_collapsable_instruction(one_back_step.maneuver.instruction)
            && choiceless(&current_step, &one_back_step)))
        && one_back_step.maneuver.instruction.turn_type != TurnType::Merge
    {
        if compatible(&one_back_step, &steps[two_back_index]) {
            let current_type = current_step.maneuver.instruction.turn_type;
            let current_modifier = current_step.maneuver.instruction.direction_modifier;
            if current_type == TurnType::Continue
                || (current_type == TurnType::Suppressed
                    && current_modifier != DirectionModifier::Straight)
            {
                steps[step_index].maneuver.instruction.turn_type = TurnType::Turn;
            } else if current_type == TurnType::Merge {
                steps[step_index].maneuver.instruction.direction_modifier =
                    current_modifier.mirror();
                steps[step_index].maneuver.instruction.turn_type = TurnType::Turn;
            } else if (current_type == TurnType::NewName || current_type == TurnType::UseLane)
                && current_modifier != DirectionModifier::Straight
                && one_back_step
                    .intersections
                    .first()
                    .map_or(false, |i| i.bearings.len() > 2)
            {
                steps[step_index].maneuver.instruction.turn_type = TurnType::Turn;
            }
            steps[two_back_index] = steps[two_back_index].clone().elongate(&one_back_step);
            invalidate(&mut steps[one_back_index]);
        }
    }
    // very short segment after a turn
    else if one_back_step.distance <= MAX_COLLAPSE_DISTANCE
        && is_collapsable_instruction(current_step.maneuver.instruction)
    {
        if compatible(&one_back_step, &current_step) {
            steps[one_back_index] = steps[one_back_index].clone().elongate(&current_step);

            let one_back_type = one_back_step.maneuver.instruction.turn_type;
            if (one_back_type == TurnType::Continue || one_back_type == TurnType::Suppressed)
                && is_noticeable_name_change(&steps[two_back_index], &current_step)
            {
                steps[one_back_index].maneuver.instruction.turn_type = TurnType::Turn;
            } else if one_back_type == TurnType::Turn
                && !is_noticeable_name_change(&steps[two_back_index], &current_step)
            {
                steps[one_back_index].maneuver.instruction.turn_type = TurnType::Continue;
                // merging back onto the road we came from is a u-turn
                if bearings_are_reversed(
                    reverse_bearing(in_bearing(&one_back_step)),
                    out_bearing(&current_step),
                ) {
                    steps[one_back_index].maneuver.instruction.direction_modifier =
                        DirectionModifier::UTurn;
                }
            } else if one_back_type == TurnType::Merge
                && current_step.maneuver.instruction.turn_type != TurnType::Suppressed
            {
                steps[one_back_index].maneuver.instruction.direction_modifier =
                    one_back_step.maneuver.instruction.direction_modifier.mirror();
            }
            forward_step_signage(&mut steps[one_back_index], &current_step);
            invalidate(&mut steps[step_index]);
        }
    }
    // potential u-turn over a staggered short segment
    else if (one_back_step.distance <= MAX_COLLAPSE_DISTANCE
        || choiceless(&current_step, &one_back_step))
        && bearings_are_reversed(
            reverse_bearing(in_bearing(&one_back_step)),
            out_bearing(&current_step),
        )
        && compatible(&one_back_step, &current_step)
    {
        let direct_u_turn = !is_noticeable_name_change(&steps[two_back_index], &current_step);
        let next_step_index = step_index + 1;
        let continues_with_name_change = next_step_index < steps.len()
            && (steps[next_step_index].maneuver.instruction.turn_type == TurnType::UseLane
                || is_collapsable_instruction(steps[next_step_index].maneuver.instruction));
        let u_turn_with_name_change = continues_with_name_change
            && !is_noticeable_name_change(&steps[two_back_index], &steps[next_step_index]);

        if direct_u_turn || u_turn_with_name_change {
            steps[one_back_index] = steps[one_back_index].clone().elongate(&current_step);
            invalidate(&mut steps[step_index]);
            if u_turn_with_name_change
                && compatible(&steps[one_back_index], &steps[next_step_index])
            {
                let next = steps[next_step_index].clone();
                steps[one_back_index] = steps[one_back_index].clone().elongate(&next);
                invalidate(&mut steps[next_step_index]);
                let two_back = steps[two_back_index].clone();
                forward_step_signage(&mut steps[one_back_index], &two_back);
            }
            if direct_u_turn {
                let two_back = steps[two_back_index].clone();
                forward_step_signage(&mut steps[one_back_index], &two_back);
            }
            steps[one_back_index].maneuver.instruction.turn_type = TurnType::Continue;
            steps[one_back_index].maneuver.instruction.direction_modifier =
                DirectionModifier::UTurn;
        }
    }
}

/// Collapse and merge neighbouring steps: short name changes, sliproads,
/// u-turns, name oscillations and staggered intersections.
pub fn collapse_turns(mut steps: Vec<RouteStep>) -> Vec<RouteStep> {
    if steps.len() <= 2 {
        return steps;
    }

    let can_collapse_all = |steps: &[RouteStep], mut index: usize, end_index: usize| -> bool {
        while index < end_index {
            let turn_type = steps[index].maneuver.instruction.turn_type;
            if turn_type != TurnType::Suppressed && turn_type != TurnType::NewName {
                return false;
            }
            if index + 1 < end_index && !compatible(&steps[index], &steps[index + 1]) {
                return false;
            }
            index += 1;
        }
        true
    };

    let is_basic_name_change = |step: &RouteStep| -> bool {
        step.intersections.len() == 1
            && step.intersections[0].bearings.len() == 2
            && step.maneuver.instruction.direction_modifier == DirectionModifier::Straight
    };

    for step_index in 1..steps.len().saturating_sub(1) {
        let current_step = steps[step_index].clone();
        let next_step_index = step_index + 1;
        if current_step.maneuver.instruction.turn_type == TurnType::NoTurn {
            continue;
        }
        let one_back_index = get_previous_index(&steps, step_index);
        let one_back_step = steps[one_back_index].clone();

        if !has_maneuver(&one_back_step, &current_step) {
            continue;
        }

        if one_back_step.maneuver.instruction.turn_type == TurnType::Sliproad {
            // sliproads fold into the turn at their far end
            if current_step.maneuver.instruction.turn_type == TurnType::Suppressed
                && compatible(&one_back_step, &current_step)
            {
                // a traffic light on the sliproad itself
                steps[one_back_index] = steps[one_back_index].clone().elongate(&current_step);
                invalidate(&mut steps[step_index]);
            } else if compatible(&one_back_step, &current_step) {
                let before_sliproad_index = get_previous_index(&steps, one_back_index);
                if !is_noticeable_name_change(&steps[before_sliproad_index], &current_step) {
                    steps[one_back_index].maneuver.instruction.turn_type = TurnType::Continue;
                } else {
                    steps[one_back_index].maneuver.instruction.turn_type = TurnType::Turn;
                }
                steps[one_back_index] = steps[one_back_index].clone().elongate(&current_step);
                forward_step_signage(&mut steps[one_back_index], &current_step);
                // the lanes for the turn sit on the sliproad itself
                if let (Some(own), Some(from)) = (
                    steps[one_back_index].intersections.first().cloned(),
                    current_step.intersections.first(),
                ) {
                    let mut merged = own;
                    merged.lanes = from.lanes;
                    merged.lane_description = from.lane_description.clone();
                    steps[one_back_index].intersections[0] = merged;
                }
                let angle = turn_angle(
                    reverse_bearing(in_bearing(&steps[one_back_index])),
                    out_bearing(&current_step),
                );
                steps[one_back_index].maneuver.instruction.direction_modifier =
                    direction_from_angle(angle);
                invalidate(&mut steps[step_index]);
            } else {
                steps[one_back_index].maneuver.instruction.turn_type = TurnType::Turn;
            }
        } else if is_collapsable_instruction(current_step.maneuver.instruction)
            && current_step.maneuver.instruction.turn_type != TurnType::Suppressed
            && !is_noticeable_name_change(
                &steps[get_previous_name_index(&steps, step_index)],
                &current_step,
            )
            && can_collapse_all(
                &steps,
                get_previous_name_index(&steps, step_index) + 1,
                next_step_index,
            )
        {
            // a name change that ends up back at the original name
            let last_available_name_index = get_previous_name_index(&steps, step_index);
            for index in last_available_name_index + 1..=step_index {
                let step = steps[index].clone();
                steps[last_available_name_index] =
                    steps[last_available_name_index].clone().elongate(&step);
                invalidate(&mut steps[index]);
            }
        } else if one_back_index > 0
            && compatible(&current_step, &one_back_step)
            && ((is_collapsable_instruction(current_step.maneuver.instruction)
                && is_collapsable_instruction(one_back_step.maneuver.instruction))
                || is_staggered_intersection(&one_back_step, &current_step))
        {
            let two_back_index = get_previous_index(&steps, one_back_index);
            if !is_noticeable_name_change(&steps[two_back_index], &current_step) {
                if compatible(&one_back_step, &steps[two_back_index]) {
                    let one_back = steps[one_back_index].clone();
                    steps[two_back_index] = steps[two_back_index]
                        .clone()
                        .elongate(&one_back)
                        .elongate(&current_step);
                    invalidate(&mut steps[one_back_index]);
                    invalidate(&mut steps[step_index]);
                }
            } else if name_segment_length(one_back_index, &steps) < NAME_SEGMENT_CUTOFF_LENGTH
                && is_basic_name_change(&one_back_step)
                && is_basic_name_change(&current_step)
            {
                // name oscillation A -> B -> A over a short stretch
                if compatible(&steps[two_back_index], &steps[one_back_index]) {
                    let one_back = steps[one_back_index].clone();
                    steps[two_back_index] = steps[two_back_index].clone().elongate(&one_back);
                    invalidate(&mut steps[one_back_index]);
                    if name_segment_length(step_index, &steps) < NAME_SEGMENT_CUTOFF_LENGTH {
                        let current = steps[step_index].clone();
                        steps[two_back_index] = steps[two_back_index].clone().elongate(&current);
                        invalidate(&mut steps[step_index]);
                    }
                }
            } else if step_index + 2 < steps.len()
                && current_step.maneuver.instruction.turn_type == TurnType::NewName
                && steps[next_step_index].maneuver.instruction.turn_type == TurnType::NewName
                && !is_noticeable_name_change(&one_back_step, &steps[next_step_index])
            {
                // a bridge or similar: name briefly changes and changes back
                if compatible(&steps[step_index], &steps[next_step_index]) {
                    let next = steps[next_step_index].clone();
                    let merged = steps[step_index].clone().elongate(&next);
                    steps[one_back_index] = steps[one_back_index].clone().elongate(&merged);
                    invalidate(&mut steps[step_index]);
                    invalidate(&mut steps[next_step_index]);
                }
            } else if choiceless(&current_step, &one_back_step)
                || one_back_step.distance <= MAX_COLLAPSE_DISTANCE
            {
                collapse_turn_at(&mut steps, two_back_index, one_back_index, step_index);
            }
        } else if one_back_index > 0
            && (one_back_step.distance <= MAX_COLLAPSE_DISTANCE
                || choiceless(&current_step, &one_back_step))
        {
            let two_back_index = get_previous_index(&steps, one_back_index);
            collapse_turn_at(&mut steps, two_back_index, one_back_index, step_index);
        }
    }

    // a trailing sliproad has no turn to collapse into
    if steps.len() >= 3 {
        let last_turn = get_previous_index(&steps, steps.len() - 1);
        if steps[last_turn].maneuver.instruction.turn_type == TurnType::Sliproad {
            steps[last_turn].maneuver.instruction.turn_type = TurnType::Turn;
        }
    }

    remove_no_turn_instructions(steps)
}

// ---------------------------------------------------------------------------
// Use-lane collapse
// ---------------------------------------------------------------------------

/// A `UseLane` step survives only when the lane setup actually changes at
/// the announced intersection; otherwise there is no choice to announce.
pub fn collapse_use_lane(mut steps: Vec<RouteStep>) -> Vec<RouteStep> {
    for step_index in 1..steps.len() {
        if steps[step_index].maneuver.instruction.turn_type != TurnType::UseLane {
            continue;
        }

        let own_description = steps[step_index]
            .intersections
            .first()
            .map(|i| i.lane_description.clone())
            .unwrap_or_default();
        // the approach of the next announced maneuver shows whether the
        // lanes change downstream
        let next_description = steps[step_index + 1..]
            .iter()
            .find(|step| !step.is_invalid())
            .and_then(|step| step.intersections.first())
            .map(|i| i.lane_description.clone())
            .unwrap_or_default();

        let no_real_choice = next_description.is_empty()
            || own_description == next_description
            || own_description
                .iter()
                .all(|&mask| mask & (lane_type::STRAIGHT | lane_type::NONE) != 0);

        if no_real_choice {
            let previous = get_previous_index(&steps, step_index);
            let current = steps[step_index].clone();
            steps[previous] = steps[previous].clone().elongate(&current);
            invalidate(&mut steps[step_index]);
        }
    }
    remove_no_turn_instructions(steps)
}

// ---------------------------------------------------------------------------
// Pass C: end-of-road refinement
// ---------------------------------------------------------------------------

/// An end-of-road announcement only helps when intersections were passed
/// since the last audible instruction.
pub fn refine_end_of_road(mut steps: Vec<RouteStep>) -> Vec<RouteStep> {
    let mut last_valid_instruction = 0usize;
    for step_index in 0..steps.len() {
        let instruction = steps[step_index].maneuver.instruction;
        if !instruction.is_silent() {
            if instruction.turn_type == TurnType::EndOfRoad {
                debug_assert!(step_index > 0);
                if steps[last_valid_instruction].intersections.len() < MIN_END_OF_ROAD_INTERSECTIONS
                {
                    steps[step_index].maneuver.instruction.turn_type = TurnType::Turn;
                }
            }
            last_valid_instruction = step_index;
        }
    }
    steps
}

// ---------------------------------------------------------------------------
// Pass D: relative departure / arrival modifiers
// ---------------------------------------------------------------------------

fn relative_modifier(
    from: Coordinate,
    via: Coordinate,
    towards: Coordinate,
    distance: f64,
) -> DirectionModifier {
    if (MIN_RELATIVE_DISTANCE..=MAX_RELATIVE_DISTANCE).contains(&distance) {
        direction_from_angle(compute_angle(from, via, towards))
    } else {
        DirectionModifier::UTurn
    }
}

/// Tell the user which side of the road depart and arrive happen on, when
/// the input coordinate is meaningfully off the road.
pub fn assign_relative_locations(
    mut steps: Vec<RouteStep>,
    geometry: &LegGeometry,
    source: &PhantomNode,
    target: &PhantomNode,
) -> Vec<RouteStep> {
    debug_assert!(steps.len() >= 2);
    if geometry.locations.len() < 2 {
        return steps;
    }

    let distance_to_start = haversine_distance(source.input_location, geometry.locations[0]);
    steps[0].maneuver.instruction.direction_modifier = relative_modifier(
        source.input_location,
        geometry.locations[0],
        geometry.locations[1],
        distance_to_start,
    );

    let last = geometry.locations.len() - 1;
    let distance_from_end = haversine_distance(target.input_location, geometry.locations[last]);
    let arrive_modifier = relative_modifier(
        geometry.locations[last - 1],
        geometry.locations[last],
        target.input_location,
        distance_from_end,
    );
    if let Some(arrive) = steps.last_mut() {
        arrive.maneuver.instruction.direction_modifier = arrive_modifier;
    }
    steps
}

// ---------------------------------------------------------------------------
// Pass E: trim short segments
// ---------------------------------------------------------------------------

/// Remove sub-meter first/last steps caused by phantom splits landing on
/// segment boundaries, fixing up geometry indices and bearings.
pub fn trim_short_segments(steps: &mut Vec<RouteStep>, geometry: &mut LegGeometry) {
    if steps.len() < 2 || geometry.locations.len() <= 2 {
        return;
    }

    let zero_length_step = steps[0].distance <= 1.0 && steps.len() > 2;
    let duplicated_coordinate =
        haversine_distance(geometry.locations[0], geometry.locations[1]) <= 1.0;
    if zero_length_step || duplicated_coordinate {
        let offset = if zero_length_step {
            steps[1].geometry_begin.max(1)
        } else {
            1
        };
        geometry.locations.drain(0..offset);

        if zero_length_step {
            let removed = steps.remove(0);
            let depart = &mut steps[0];
            depart.duration += removed.duration;
            depart.maneuver.waypoint_type = WaypointType::Depart;
            depart.maneuver.bearing_before = 0.0;
            depart.maneuver.instruction = TurnInstruction::NO_TURN;
            depart.intersections.truncate(1);
            depart.intersections[0].in_index = None;
            depart.intersections[0].out_index = Some(0);
            depart.intersections[0].lanes = LaneTuple::NONE;
            depart.intersections[0].lane_description.clear();
        } else {
            steps[0].geometry_begin = 1;
        }

        for step in steps.iter_mut() {
            step.geometry_begin = step.geometry_begin.saturating_sub(offset);
            step.geometry_end = step.geometry_end.saturating_sub(offset);
        }
        // geometry indices must stay well formed
        if let Some(first) = steps.first_mut() {
            first.geometry_begin = 0;
            if first.geometry_end == 0 {
                first.geometry_end = 1;
            }
        }

        if geometry.locations.len() >= 2 {
            let new_bearing =
                crate::geo::bearing(geometry.locations[0], geometry.locations[1]);
            steps[0].maneuver.bearing_after = new_bearing;
            if let Some(intersection) = steps[0].intersections.first_mut() {
                intersection.bearings = vec![new_bearing.round() as u16 % 360];
                intersection.entry = vec![true];
            }
            steps[0].distance =
                geometry.distance_between(0, steps[0].geometry_end.min(geometry.locations.len()));
        }
    }

    if steps.len() < 3 || geometry.locations.len() <= 2 {
        return;
    }

    // trailing sub-meter step
    let next_to_last = steps.len() - 2;
    if steps[next_to_last].distance <= 1.0 {
        geometry.locations.pop();
        steps.pop();
        let new_last_index = steps.len() - 1;

        let signage_source = if new_last_index > 0 {
            Some(steps[new_last_index - 1].clone())
        } else {
            None
        };
        let last = &mut steps[new_last_index];
        last.maneuver.waypoint_type = WaypointType::Arrive;
        last.maneuver.instruction = TurnInstruction::NO_TURN;
        last.maneuver.bearing_after = 0.0;
        last.distance = 0.0;
        last.duration = 0.0;
        last.geometry_begin = geometry.locations.len() - 1;
        last.geometry_end = geometry.locations.len();
        last.intersections.truncate(1);
        last.intersections[0].out_index = None;
        last.intersections[0].in_index = Some(0);
        last.intersections[0].lanes = LaneTuple::NONE;
        last.intersections[0].lane_description.clear();
        if let Some(source_step) = signage_source {
            forward_step_signage(last, &source_step);
            last.mode = source_step.mode;
        }

        // the step before the new arrive ends at the new final location
        if new_last_index > 0 {
            let previous = &mut steps[new_last_index - 1];
            previous.geometry_end = geometry.locations.len();
        }

        if geometry.locations.len() >= 2 {
            let last_location = geometry.locations.len() - 1;
            let new_bearing = crate::geo::bearing(
                geometry.locations[last_location - 1],
                geometry.locations[last_location],
            );
            steps[new_last_index].maneuver.bearing_before = new_bearing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guidance::step::StepIntersection;
    use crate::types::TravelMode;

    fn waypoint_step(waypoint_type: WaypointType) -> RouteStep {
        let mut step = RouteStep::invalid();
        step.maneuver.waypoint_type = waypoint_type;
        step.mode = TravelMode::Driving;
        step
    }

    fn turn_step(
        turn_type: TurnType,
        modifier: DirectionModifier,
        name: &str,
        name_id: u32,
        distance: f64,
    ) -> RouteStep {
        let mut step = RouteStep::invalid();
        step.maneuver.instruction = TurnInstruction::new(turn_type, modifier);
        step.name = name.to_string();
        step.name_id = name_id;
        step.distance = distance;
        step.mode = TravelMode::Driving;
        step
    }

    /// Build a step list with consistent geometry indices.
    fn with_geometry(mut steps: Vec<RouteStep>) -> Vec<RouteStep> {
        let mut begin = 0;
        let last = steps.len() - 1;
        for (index, step) in steps.iter_mut().enumerate() {
            step.geometry_begin = begin;
            step.geometry_end = if index == last { begin + 1 } else { begin + 2 };
            begin += 1;
        }
        steps
    }

    #[test]
    fn test_roundabout_exit_counting() {
        // depart, enter, stay, stay, exit, arrive: the exit count is the
        // number of stays since entering plus one (I7)
        let steps = with_geometry(vec![
            waypoint_step(WaypointType::Depart),
            turn_step(TurnType::EnterRoundabout, DirectionModifier::Right, "ring", 4, 20.0),
            turn_step(TurnType::StayOnRoundabout, DirectionModifier::Straight, "ring", 4, 15.0),
            turn_step(TurnType::StayOnRoundabout, DirectionModifier::Straight, "ring", 4, 15.0),
            turn_step(TurnType::ExitRoundabout, DirectionModifier::Right, "out", 8, 100.0),
            waypoint_step(WaypointType::Arrive),
        ]);
        let processed = process_roundabouts(steps);

        let enter = processed
            .iter()
            .find(|s| s.maneuver.instruction.enters_roundabout())
            .expect("enter survives");
        assert_eq!(enter.maneuver.exit, 3);
        // the stays and the separate exit step are folded away
        assert!(!processed
            .iter()
            .any(|s| s.maneuver.instruction.turn_type == TurnType::StayOnRoundabout));
        assert!(!processed
            .iter()
            .any(|s| s.maneuver.instruction.turn_type == TurnType::ExitRoundabout));
        // signage of the exit road lands on the announcement
        assert_eq!(enter.name, "out");
    }

    #[test]
    fn test_enter_at_exit_starts_at_one() {
        let steps = with_geometry(vec![
            waypoint_step(WaypointType::Depart),
            turn_step(TurnType::EnterRoundaboutAtExit, DirectionModifier::Right, "ring", 4, 20.0),
            turn_step(TurnType::ExitRoundabout, DirectionModifier::Right, "out", 8, 50.0),
            waypoint_step(WaypointType::Arrive),
        ]);
        let processed = process_roundabouts(steps);
        let enter = processed
            .iter()
            .find(|s| s.maneuver.instruction.enters_roundabout())
            .unwrap();
        assert_eq!(enter.maneuver.exit, 2);
    }

    #[test]
    fn test_unterminated_roundabout() {
        let steps = with_geometry(vec![
            waypoint_step(WaypointType::Depart),
            turn_step(TurnType::EnterRoundabout, DirectionModifier::Right, "ring", 4, 20.0),
            turn_step(TurnType::StayOnRoundabout, DirectionModifier::Straight, "ring", 4, 15.0),
            waypoint_step(WaypointType::Arrive),
        ]);
        let processed = process_roundabouts(steps);
        let enter = processed
            .iter()
            .find(|s| s.maneuver.instruction.enters_roundabout())
            .unwrap();
        assert_eq!(enter.maneuver.exit, 0);
    }

    #[test]
    fn test_short_new_name_collapses() {
        // a 10 m stretch followed by a name change is announced as one step
        let mut steps = with_geometry(vec![
            waypoint_step(WaypointType::Depart),
            turn_step(TurnType::NewName, DirectionModifier::Straight, "brief", 4, 10.0),
            turn_step(TurnType::NewName, DirectionModifier::Straight, "main", 8, 500.0),
            waypoint_step(WaypointType::Arrive),
        ]);
        steps[0].distance = 200.0;
        let processed = collapse_turns(steps);
        // the brief name never surfaces
        assert!(!processed.iter().any(|s| s.name == "brief"));
    }

    #[test]
    fn test_name_oscillation_collapses() {
        // A -> B -> A over a short bridge segment reads as A throughout
        let mut steps = with_geometry(vec![
            waypoint_step(WaypointType::Depart),
            turn_step(TurnType::NewName, DirectionModifier::Straight, "bridge", 8, 40.0),
            turn_step(TurnType::NewName, DirectionModifier::Straight, "main", 4, 400.0),
            waypoint_step(WaypointType::Arrive),
        ]);
        steps[0].name = "main".to_string();
        steps[0].name_id = 4;
        steps[0].distance = 300.0;
        // both name changes pass through simple two-road intersections
        for step in steps.iter_mut() {
            step.intersections = vec![StepIntersection {
                bearings: vec![0, 180],
                entry: vec![true, true],
                ..Default::default()
            }];
        }
        let processed = collapse_turns(steps);
        assert!(
            !processed.iter().any(|s| s.name == "bridge"),
            "oscillating name must not be announced: {:?}",
            processed.iter().map(|s| s.name.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_use_lane_removed_when_lanes_do_not_change() {
        let description = crate::extractor::guidance::lanes::parse_lane_string(
            "left|through|through|through|right",
        );
        let mut use_lane = turn_step(
            TurnType::UseLane,
            DirectionModifier::Straight,
            "main",
            4,
            100.0,
        );
        use_lane.intersections = vec![StepIntersection {
            lane_description: description.clone(),
            lanes: LaneTuple {
                lanes_in_turn: 3,
                first_lane_from_the_right: 1,
            },
            ..Default::default()
        }];
        let mut second = use_lane.clone();
        second.name_id = 4;

        let steps = with_geometry(vec![
            waypoint_step(WaypointType::Depart),
            use_lane,
            second,
            waypoint_step(WaypointType::Arrive),
        ]);
        let processed = collapse_use_lane(steps);
        assert!(
            !processed
                .iter()
                .any(|s| s.maneuver.instruction.turn_type == TurnType::UseLane),
            "identical lane setups offer no choice"
        );
    }

    #[test]
    fn test_use_lane_kept_when_lanes_change() {
        let five = crate::extractor::guidance::lanes::parse_lane_string(
            "left|through|through|through|right",
        );
        let three = crate::extractor::guidance::lanes::parse_lane_string("left|through|right");

        let mut first = turn_step(
            TurnType::UseLane,
            DirectionModifier::Straight,
            "main",
            4,
            100.0,
        );
        first.intersections = vec![StepIntersection {
            lane_description: five,
            ..Default::default()
        }];
        let mut second = turn_step(
            TurnType::UseLane,
            DirectionModifier::Straight,
            "main",
            4,
            100.0,
        );
        second.intersections = vec![StepIntersection {
            lane_description: three,
            ..Default::default()
        }];

        let steps = with_geometry(vec![
            waypoint_step(WaypointType::Depart),
            first,
            second,
            waypoint_step(WaypointType::Arrive),
        ]);
        let processed = collapse_use_lane(steps);
        let use_lanes = processed
            .iter()
            .filter(|s| s.maneuver.instruction.turn_type == TurnType::UseLane)
            .count();
        assert_eq!(use_lanes, 1, "only the lane change with a real choice survives");
    }

    #[test]
    fn test_end_of_road_downgrade() {
        let mut steps = with_geometry(vec![
            waypoint_step(WaypointType::Depart),
            turn_step(TurnType::EndOfRoad, DirectionModifier::Right, "side", 8, 100.0),
            waypoint_step(WaypointType::Arrive),
        ]);
        // the depart step passed no intersections
        steps[0].intersections = vec![StepIntersection::default()];
        let refined = refine_end_of_road(steps);
        assert_eq!(refined[1].maneuver.instruction.turn_type, TurnType::Turn);
    }

    #[test]
    fn test_relative_departure_modifier() {
        let geometry = LegGeometry {
            locations: vec![
                Coordinate::from_degrees(0.0, 0.0),
                Coordinate::from_degrees(0.001, 0.0),
            ],
            segment_offsets: vec![],
            segment_distances: vec![],
        };
        let mut source = crate::router::phantom::PhantomNode {
            forward_segment_id: crate::types::SegmentId {
                id: 0,
                enabled: true,
            },
            reverse_segment_id: crate::types::SegmentId::INVALID,
            name_id: 0,
            forward_weight: 0,
            reverse_weight: 0,
            forward_offset: 0,
            reverse_offset: 0,
            forward_packed_geometry_id: 0,
            reverse_packed_geometry_id: 0,
            component_id: 0,
            is_tiny_component: false,
            location: Coordinate::from_degrees(0.0, 0.0),
            // ~20 m north of the road start
            input_location: Coordinate::from_degrees(0.0, 0.00018),
            fwd_segment_position: 0,
            forward_travel_mode: TravelMode::Driving,
            backward_travel_mode: TravelMode::Inaccessible,
        };
        let target = source;

        let steps = vec![
            waypoint_step(WaypointType::Depart),
            waypoint_step(WaypointType::Arrive),
        ];
        let assigned = assign_relative_locations(steps, &geometry, &source, &target);
        // approaching the road from the north and heading east is a left
        // departure
        assert_eq!(
            assigned[0].maneuver.instruction.direction_modifier,
            DirectionModifier::Left
        );

        // too close to the road: no side is announced
        source.input_location = Coordinate::from_degrees(0.0, 0.00001);
        let steps = vec![
            waypoint_step(WaypointType::Depart),
            waypoint_step(WaypointType::Arrive),
        ];
        let assigned = assign_relative_locations(steps, &geometry, &source, &target);
        assert_eq!(
            assigned[0].maneuver.instruction.direction_modifier,
            DirectionModifier::UTurn
        );
    }

    #[test]
    fn test_trim_zero_length_first_step() {
        let mut geometry = LegGeometry {
            locations: vec![
                Coordinate::from_degrees(0.0, 0.0),
                Coordinate::from_degrees(0.0, 0.0),
                Coordinate::from_degrees(0.001, 0.0),
                Coordinate::from_degrees(0.002, 0.0),
            ],
            segment_offsets: vec![],
            segment_distances: vec![],
        };
        let mut depart = waypoint_step(WaypointType::Depart);
        depart.distance = 0.0;
        depart.geometry_begin = 0;
        depart.geometry_end = 2;
        let mut turn = turn_step(TurnType::Turn, DirectionModifier::Right, "main", 4, 200.0);
        turn.geometry_begin = 1;
        turn.geometry_end = 4;
        let mut arrive = waypoint_step(WaypointType::Arrive);
        arrive.geometry_begin = 3;
        arrive.geometry_end = 4;

        let mut steps = vec![depart, turn, arrive];
        trim_short_segments(&mut steps, &mut geometry);

        assert_eq!(steps.len(), 2, "the zero-length depart merges away");
        assert_eq!(steps[0].maneuver.waypoint_type, WaypointType::Depart);
        assert_eq!(steps[0].geometry_begin, 0);
        assert_eq!(geometry.locations.len(), 3);
        assert_eq!(steps[0].name, "main");
    }

    #[test]
    fn test_pipeline_idempotent_on_clean_steps() {
        // P5: a list that needs no rewriting passes through unchanged
        let make = || {
            let mut steps = with_geometry(vec![
                waypoint_step(WaypointType::Depart),
                turn_step(TurnType::Turn, DirectionModifier::Right, "main", 4, 500.0),
                waypoint_step(WaypointType::Arrive),
            ]);
            steps[0].distance = 400.0;
            for step in steps.iter_mut() {
                step.intersections = vec![
                    StepIntersection {
                        bearings: vec![0, 90, 180, 270],
                        entry: vec![true; 4],
                        ..Default::default()
                    };
                    2
                ];
            }
            steps
        };

        let once = refine_end_of_road(collapse_use_lane(collapse_turns(process_roundabouts(
            make(),
        ))));
        let twice = refine_end_of_road(collapse_use_lane(collapse_turns(process_roundabouts(
            once.clone(),
        ))));
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.maneuver.instruction, b.maneuver.instruction);
            assert_eq!(a.name, b.name);
            assert!((a.distance - b.distance).abs() < 1e-9);
        }
    }
}

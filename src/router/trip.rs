//! Trip optimization: visit a set of waypoints in a good order.
//!
//! The duration matrix comes from the bucket many-to-many; the tour is
//! nearest-neighbor greedy from every start, improved with 2-opt, which is
//! exact enough at waypoint counts the API accepts.

use super::many_to_many::many_to_many;
use super::phantom::PhantomNode;
use super::query_graph::QueryGraph;
use super::search::{shortest_path, RoutingResult, SearchContext};
use crate::types::EdgeWeight;

#[derive(Debug, Clone)]
pub struct TripSolution {
    /// Waypoint indices in optimized visit order.
    pub order: Vec<usize>,
    /// Total tour cost in deciseconds.
    pub total_cost: u64,
    /// Routed legs between consecutive tour stops (and back to the start
    /// for round trips).
    pub legs: Vec<RoutingResult>,
}

#[inline]
fn cost(matrix: &[Option<EdgeWeight>], n: usize, from: usize, to: usize) -> Option<u64> {
    matrix[from * n + to].map(|w| w.max(0) as u64)
}

fn tour_cost(matrix: &[Option<EdgeWeight>], n: usize, order: &[usize], round_trip: bool) -> Option<u64> {
    let mut total = 0u64;
    for pair in order.windows(2) {
        total += cost(matrix, n, pair[0], pair[1])?;
    }
    if round_trip && order.len() > 1 {
        total += cost(matrix, n, order[order.len() - 1], order[0])?;
    }
    Some(total)
}

fn nearest_neighbor_tour(
    matrix: &[Option<EdgeWeight>],
    n: usize,
    start: usize,
) -> Option<Vec<usize>> {
    let mut order = vec![start];
    let mut visited = vec![false; n];
    visited[start] = true;
    while order.len() < n {
        let current = *order.last().unwrap();
        let next = (0..n)
            .filter(|&candidate| !visited[candidate])
            .filter_map(|candidate| cost(matrix, n, current, candidate).map(|c| (candidate, c)))
            .min_by_key(|&(candidate, c)| (c, candidate))?;
        visited[next.0] = true;
        order.push(next.0);
    }
    Some(order)
}

fn two_opt(
    matrix: &[Option<EdgeWeight>],
    n: usize,
    mut order: Vec<usize>,
    round_trip: bool,
) -> Vec<usize> {
    let mut best_cost = match tour_cost(matrix, n, &order, round_trip) {
        Some(cost) => cost,
        None => return order,
    };
    let mut improved = true;
    while improved {
        improved = false;
        for i in 1..order.len().saturating_sub(1) {
            for j in i + 1..order.len() {
                order[i..=j].reverse();
                match tour_cost(matrix, n, &order, round_trip) {
                    Some(candidate) if candidate < best_cost => {
                        best_cost = candidate;
                        improved = true;
                    }
                    _ => order[i..=j].reverse(), // undo
                }
            }
        }
    }
    order
}

/// Pure tour optimization over a duration matrix.
pub fn solve_trip(
    matrix: &[Option<EdgeWeight>],
    n: usize,
    round_trip: bool,
) -> Option<(Vec<usize>, u64)> {
    match n {
        0 => return Some((Vec::new(), 0)),
        1 => return Some((vec![0], 0)),
        _ => {}
    }

    let mut best: Option<(Vec<usize>, u64)> = None;
    for start in 0..n {
        let Some(tour) = nearest_neighbor_tour(matrix, n, start) else {
            continue;
        };
        let improved = two_opt(matrix, n, tour, round_trip);
        if let Some(candidate_cost) = tour_cost(matrix, n, &improved, round_trip) {
            if best.as_ref().map_or(true, |(_, c)| candidate_cost < *c) {
                best = Some((improved, candidate_cost));
            }
        }
    }
    best
}

/// Optimize the visiting order of `waypoints` and route the tour legs.
pub fn trip(
    graph: &QueryGraph,
    waypoints: &[PhantomNode],
    round_trip: bool,
) -> Option<TripSolution> {
    let matrix = many_to_many(graph, waypoints, waypoints);
    let (order, total_cost) = solve_trip(&matrix, waypoints.len(), round_trip)?;

    let mut context = SearchContext::new(graph.node_count() as usize);
    let mut legs = Vec::new();
    for pair in order.windows(2) {
        legs.push(shortest_path(
            graph,
            &mut context,
            &waypoints[pair[0]],
            &waypoints[pair[1]],
            None,
        )?);
    }
    if round_trip && order.len() > 1 {
        legs.push(shortest_path(
            graph,
            &mut context,
            &waypoints[order[order.len() - 1]],
            &waypoints[order[0]],
            None,
        )?);
    }

    Some(TripSolution {
        order,
        total_cost,
        legs,
    })
}

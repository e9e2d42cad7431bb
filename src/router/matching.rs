//! Map matching: snap a GPS trace to the road network.
//!
//! Hidden Markov Model with Viterbi decoding (Newson & Krumm): emission
//! probability is Gaussian in the snap distance, transition probability is
//! exponential in the mismatch between the routed cost and the straight-line
//! expectation. Traces split at large gaps or when no transition survives.

use super::many_to_many::many_to_many;
use super::phantom::PhantomNode;
use super::query_graph::QueryGraph;
use super::search::{shortest_path, RoutingResult, SearchContext};
use crate::facade::{DataFacade, NearestOptions};
use crate::geo::{haversine_distance, Coordinate};

/// Candidates considered per trace point.
const MAX_CANDIDATES: usize = 8;
/// Default GPS noise standard deviation, meters.
const DEFAULT_GPS_SIGMA: f64 = 10.0;
/// Scale of tolerated routed-vs-straight-line mismatch, deciseconds.
const BETA_DS: f64 = 300.0;
/// Consecutive points further apart than this split the trace, meters.
const GAP_THRESHOLD: f64 = 2000.0;
/// Straight-line travel cost assumption, meters per decisecond.
const EXPECTED_SPEED: f64 = 1.4;

#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    pub gps_sigma: f64,
    pub gap_threshold: f64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            gps_sigma: DEFAULT_GPS_SIGMA,
            gap_threshold: GAP_THRESHOLD,
        }
    }
}

/// One continuous matched sub-route.
#[derive(Debug)]
pub struct SubMatching {
    /// Matched phantom per covered trace point, in order.
    pub phantoms: Vec<PhantomNode>,
    /// Indices of the covered trace points.
    pub point_indices: Vec<usize>,
    /// Routed legs between consecutive matched points.
    pub legs: Vec<RoutingResult>,
    /// Mean emission probability over the covered points, 0..1.
    pub confidence: f64,
}

#[derive(Debug)]
pub struct MatchResult {
    pub matchings: Vec<SubMatching>,
    /// Per input point: (matching index, index within matching), or `None`
    /// for outliers.
    pub tracepoints: Vec<Option<(usize, usize)>>,
}

struct Candidate {
    phantom: PhantomNode,
    emission_log: f64,
}

fn candidates_for(
    facade: &dyn DataFacade,
    coordinate: Coordinate,
    sigma: f64,
) -> Vec<Candidate> {
    let options = NearestOptions {
        max_distance: Some(sigma * 10.0),
        ..Default::default()
    };
    facade
        .nearest_phantoms(coordinate, MAX_CANDIDATES, &options)
        .into_iter()
        .map(|candidate| {
            let normalized = candidate.distance / sigma;
            Candidate {
                phantom: candidate.phantom,
                emission_log: -0.5 * normalized * normalized,
            }
        })
        .collect()
}

/// Transition log-probability between consecutive candidates.
fn transition_log(routed_weight: Option<i32>, great_circle: f64) -> f64 {
    match routed_weight {
        Some(weight) => {
            let expected = great_circle / EXPECTED_SPEED;
            -((weight as f64) - expected).abs() / BETA_DS
        }
        None => f64::NEG_INFINITY,
    }
}

/// Match a coordinate trace onto the network.
pub fn map_match(
    facade: &dyn DataFacade,
    graph: &QueryGraph,
    trace: &[Coordinate],
    options: &MatchOptions,
) -> MatchResult {
    let mut tracepoints: Vec<Option<(usize, usize)>> = vec![None; trace.len()];
    let mut matchings: Vec<SubMatching> = Vec::new();

    // layers of candidates; an empty layer makes its point an outlier
    let layers: Vec<Vec<Candidate>> = trace
        .iter()
        .map(|&coordinate| candidates_for(facade, coordinate, options.gps_sigma))
        .collect();

    let mut context = SearchContext::new(graph.node_count() as usize);

    // Viterbi state for the open sub-matching
    let mut scores: Vec<f64> = Vec::new();
    let mut parents: Vec<Vec<Option<usize>>> = Vec::new(); // per chain layer
    let mut chain_points: Vec<usize> = Vec::new();

    let mut flush = |chain_points: &mut Vec<usize>,
                     scores: &mut Vec<f64>,
                     parents: &mut Vec<Vec<Option<usize>>>,
                     matchings: &mut Vec<SubMatching>,
                     tracepoints: &mut Vec<Option<(usize, usize)>>,
                     context: &mut SearchContext| {
        if chain_points.is_empty() {
            scores.clear();
            parents.clear();
            return;
        }
        // backtrack the best final candidate
        let mut best = 0usize;
        for (index, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = index;
            }
        }
        let mut picked: Vec<usize> = Vec::with_capacity(chain_points.len());
        let mut cursor = Some(best);
        for layer in parents.iter().rev() {
            let Some(current) = cursor else { break };
            picked.push(current);
            cursor = layer[current];
        }
        picked.reverse();

        let mut phantoms = Vec::with_capacity(picked.len());
        let mut emission_sum = 0.0;
        for (&point, &candidate_index) in chain_points.iter().zip(&picked) {
            let candidate = &layers[point][candidate_index];
            phantoms.push(candidate.phantom);
            emission_sum += candidate.emission_log.exp();
        }

        let mut legs = Vec::new();
        for pair in phantoms.windows(2) {
            if let Some(result) = shortest_path(graph, context, &pair[0], &pair[1], None) {
                legs.push(result);
            }
        }

        let matching_index = matchings.len();
        for (position, &point) in chain_points.iter().enumerate() {
            tracepoints[point] = Some((matching_index, position));
        }
        matchings.push(SubMatching {
            confidence: emission_sum / chain_points.len() as f64,
            phantoms,
            point_indices: chain_points.clone(),
            legs,
        });

        chain_points.clear();
        scores.clear();
        parents.clear();
    };

    let mut previous_point: Option<usize> = None;
    for (point, layer) in layers.iter().enumerate() {
        if layer.is_empty() {
            continue; // outlier, tracepoint stays None
        }

        let gap_break = previous_point.map_or(false, |previous| {
            haversine_distance(trace[previous], trace[point]) > options.gap_threshold
        });
        if gap_break || chain_points.is_empty() {
            if gap_break {
                flush(
                    &mut chain_points,
                    &mut scores,
                    &mut parents,
                    &mut matchings,
                    &mut tracepoints,
                    &mut context,
                );
            }
            if chain_points.is_empty() {
                chain_points.push(point);
                scores.clear();
                scores.extend(layer.iter().map(|c| c.emission_log));
                parents.push(vec![None; layer.len()]);
                previous_point = Some(point);
                continue;
            }
        }

        let previous = previous_point.expect("chain is non-empty");
        let previous_layer = &layers[previous];
        let great_circle = haversine_distance(trace[previous], trace[point]);

        // routed costs between all candidate pairs of the two layers
        let from: Vec<PhantomNode> = previous_layer.iter().map(|c| c.phantom).collect();
        let to: Vec<PhantomNode> = layer.iter().map(|c| c.phantom).collect();
        let table = many_to_many(graph, &from, &to);

        let mut new_scores = vec![f64::NEG_INFINITY; layer.len()];
        let mut new_parents: Vec<Option<usize>> = vec![None; layer.len()];
        for (to_index, candidate) in layer.iter().enumerate() {
            for (from_index, &from_score) in scores.iter().enumerate() {
                if from_score == f64::NEG_INFINITY {
                    continue;
                }
                let routed = table[from_index * layer.len() + to_index];
                let score = from_score
                    + transition_log(routed, great_circle)
                    + candidate.emission_log;
                if score > new_scores[to_index] {
                    new_scores[to_index] = score;
                    new_parents[to_index] = Some(from_index);
                }
            }
        }

        if new_scores.iter().all(|&s| s == f64::NEG_INFINITY) {
            // nothing connects: close the current matching, restart here
            flush(
                &mut chain_points,
                &mut scores,
                &mut parents,
                &mut matchings,
                &mut tracepoints,
                &mut context,
            );
            chain_points.push(point);
            scores.extend(layer.iter().map(|c| c.emission_log));
            parents.push(vec![None; layer.len()]);
        } else {
            chain_points.push(point);
            scores = new_scores;
            parents.push(new_parents);
        }
        previous_point = Some(point);
    }

    flush(
        &mut chain_points,
        &mut scores,
        &mut parents,
        &mut matchings,
        &mut tracepoints,
        &mut context,
    );

    MatchResult {
        matchings,
        tracepoints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_prefers_direct_routes() {
        // a routed cost close to the straight-line expectation scores higher
        let direct = transition_log(Some(100), 140.0);
        let detour = transition_log(Some(500), 140.0);
        assert!(direct > detour);
        assert_eq!(transition_log(None, 140.0), f64::NEG_INFINITY);
    }

    #[test]
    fn test_default_options() {
        let options = MatchOptions::default();
        assert_eq!(options.gps_sigma, DEFAULT_GPS_SIGMA);
        assert_eq!(options.gap_threshold, GAP_THRESHOLD);
    }
}

//! Service endpoints: route, nearest, table, match, trip.
//!
//! Responses follow the common routing JSON envelope: a `code` field,
//! `waypoints`, and the endpoint payload. Client errors map to 400, data
//! errors to 500.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use waymark_common::{EngineError, Status};

use crate::facade::{DataFacade, InternalDataFacade, NearestOptions, SharedDataFacade};
use crate::geo::{haversine_distance, Coordinate};
use crate::guidance::step::WaypointType;
use crate::guidance::{assemble_leg, post_process_leg, Leg};
use crate::router::matching::{map_match, MatchOptions};
use crate::router::phantom::{PhantomHint, PhantomNode};
use crate::router::search::{shortest_path, SearchContext};
use crate::router::trip::trip as optimize_trip;
use crate::router::{many_to_many, RoutingResult};
use crate::types::SegmentId;

use super::params;

/// Shared service state.
pub struct AppState {
    pub facade: Arc<SharedDataFacade>,
    pub limits: RequestLimits,
}

#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub max_locations_route: usize,
    pub max_locations_table: usize,
    pub max_locations_matching: usize,
    pub max_locations_trip: usize,
    pub max_results_nearest: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_locations_route: 500,
            max_locations_table: 100,
            max_locations_matching: 100,
            max_locations_trip: 100,
            max_results_nearest: 100,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

pub fn error_response(error: EngineError) -> Response {
    let status = StatusCode::from_u16(error.status.http_code()).unwrap_or(StatusCode::BAD_REQUEST);
    (
        status,
        Json(ErrorBody {
            code: error.status.code(),
            message: error.message,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Shared request plumbing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryFormat {
    Polyline,
    Polyline6,
    GeoJson,
}

impl GeometryFormat {
    fn parse(value: &str) -> Result<Self, EngineError> {
        match value {
            "polyline" => Ok(GeometryFormat::Polyline),
            "polyline6" => Ok(GeometryFormat::Polyline6),
            "geojson" => Ok(GeometryFormat::GeoJson),
            _ => Err(EngineError::new(
                Status::InvalidOptions,
                format!("unknown geometries value '{value}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverviewMode {
    False,
    Simplified,
    Full,
}

impl OverviewMode {
    fn parse(value: &str) -> Result<Self, EngineError> {
        match value {
            "false" => Ok(OverviewMode::False),
            "simplified" => Ok(OverviewMode::Simplified),
            "full" => Ok(OverviewMode::Full),
            _ => Err(EngineError::new(
                Status::InvalidOptions,
                format!("unknown overview value '{value}'"),
            )),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum GeometryPayload {
    Encoded(String),
    GeoJson {
        #[serde(rename = "type")]
        geometry_type: &'static str,
        coordinates: Vec<[f64; 2]>,
    },
}

fn encode_geometry(locations: &[Coordinate], format: GeometryFormat) -> GeometryPayload {
    match format {
        GeometryFormat::Polyline => {
            GeometryPayload::Encoded(super::polyline::encode(locations, 5))
        }
        GeometryFormat::Polyline6 => {
            GeometryPayload::Encoded(super::polyline::encode(locations, 6))
        }
        GeometryFormat::GeoJson => GeometryPayload::GeoJson {
            geometry_type: "LineString",
            coordinates: locations
                .iter()
                .map(|c| [c.lon_degrees(), c.lat_degrees()])
                .collect(),
        },
    }
}

/// Perpendicular-distance line simplification for the `simplified` overview.
fn douglas_peucker(locations: &[Coordinate], epsilon_degrees: f64) -> Vec<Coordinate> {
    if locations.len() <= 2 {
        return locations.to_vec();
    }
    let first = locations[0];
    let last = locations[locations.len() - 1];

    let mut max_distance = 0.0;
    let mut max_index = 0;
    for (index, &point) in locations.iter().enumerate().skip(1).take(locations.len() - 2) {
        let (_, projected) = crate::geo::project_onto_segment(first, last, point);
        let dx = projected.lon_degrees() - point.lon_degrees();
        let dy = projected.lat_degrees() - point.lat_degrees();
        let distance = (dx * dx + dy * dy).sqrt();
        if distance > max_distance {
            max_distance = distance;
            max_index = index;
        }
    }

    if max_distance > epsilon_degrees {
        let mut left = douglas_peucker(&locations[..=max_index], epsilon_degrees);
        let right = douglas_peucker(&locations[max_index..], epsilon_degrees);
        left.pop();
        left.extend(right);
        left
    } else {
        vec![first, last]
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Waypoint {
    pub location: [f64; 2],
    pub name: String,
    pub distance: f64,
    pub hint: String,
}

fn waypoint_json(facade: &InternalDataFacade, phantom: &PhantomNode) -> Waypoint {
    let hint = PhantomHint::from_phantom(phantom, facade.data_checksum());
    Waypoint {
        location: [
            phantom.location.lon_degrees(),
            phantom.location.lat_degrees(),
        ],
        name: facade.name(phantom.name_id).to_string(),
        distance: haversine_distance(phantom.input_location, phantom.location),
        hint: params::encode_hint(&hint),
    }
}

/// Rebuild a phantom from a hint previously handed to the client.
fn phantom_from_hint(
    facade: &InternalDataFacade,
    hint: &PhantomHint,
    input: Coordinate,
) -> Option<PhantomNode> {
    if hint.checksum != facade.data_checksum() {
        return None;
    }
    let node_count = facade.edge_based_node_count();
    let reference = if hint.forward_enabled {
        hint.forward_id
    } else {
        hint.reverse_id
    };
    if reference >= node_count {
        return None;
    }
    let component = facade.component(reference);
    Some(PhantomNode {
        forward_segment_id: SegmentId {
            id: hint.forward_id,
            enabled: hint.forward_enabled,
        },
        reverse_segment_id: SegmentId {
            id: hint.reverse_id,
            enabled: hint.reverse_enabled,
        },
        name_id: facade.name_id(reference),
        forward_weight: hint.forward_weight,
        reverse_weight: hint.reverse_weight,
        forward_offset: hint.forward_offset,
        reverse_offset: hint.reverse_offset,
        forward_packed_geometry_id: if hint.forward_enabled {
            facade.geometry_id(hint.forward_id)
        } else {
            crate::types::INVALID_GEOMETRY_ID
        },
        reverse_packed_geometry_id: if hint.reverse_enabled {
            facade.geometry_id(hint.reverse_id)
        } else {
            crate::types::INVALID_GEOMETRY_ID
        },
        component_id: component.id,
        is_tiny_component: component.is_tiny,
        location: Coordinate::new(hint.location.0, hint.location.1),
        input_location: input,
        fwd_segment_position: 0,
        forward_travel_mode: facade.travel_mode(reference),
        backward_travel_mode: facade.travel_mode(reference),
    })
}

/// Snap every input coordinate, honoring bearings, radiuses and hints.
fn resolve_waypoints(
    facade: &InternalDataFacade,
    coordinates: &[Coordinate],
    bearings: &[Option<(u16, u16)>],
    radiuses: &[Option<f64>],
    hints: &[Option<PhantomHint>],
) -> Result<Vec<PhantomNode>, EngineError> {
    let mut phantoms = Vec::with_capacity(coordinates.len());
    for (index, &coordinate) in coordinates.iter().enumerate() {
        if let Some(Some(hint)) = hints.get(index) {
            if let Some(phantom) = phantom_from_hint(facade, hint, coordinate) {
                phantoms.push(phantom);
                continue;
            }
        }
        let options = NearestOptions {
            bearing: bearings.get(index).copied().flatten(),
            max_distance: radiuses.get(index).copied().flatten(),
            startpoints_only: true,
        };
        let Some((primary, alternative)) = facade.nearest_with_alternative(coordinate, &options)
        else {
            return Err(EngineError::no_segment(format!(
                "no snappable segment for coordinate {index}"
            )));
        };
        // avoid trapping the query in a disconnected island
        let chosen = match alternative {
            Some(big) if primary.phantom.is_tiny_component => big,
            _ => primary,
        };
        phantoms.push(chosen.phantom);
    }
    Ok(phantoms)
}

fn route_between(
    facade: &InternalDataFacade,
    context: &mut SearchContext,
    source: &PhantomNode,
    target: &PhantomNode,
) -> Result<RoutingResult, EngineError> {
    shortest_path(facade.query_graph(), context, source, target, None)
        .ok_or_else(EngineError::no_route)
}

// ---------------------------------------------------------------------------
// /route
// ---------------------------------------------------------------------------

fn default_geometries() -> String {
    "polyline".to_string()
}

fn default_overview() -> String {
    "simplified".to_string()
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RouteQuery {
    #[serde(default)]
    pub steps: bool,
    #[serde(default)]
    pub alternatives: bool,
    #[serde(default = "default_geometries")]
    pub geometries: String,
    #[serde(default = "default_overview")]
    pub overview: String,
    #[serde(default)]
    pub continue_straight: Option<String>,
    #[serde(default)]
    pub bearings: Option<String>,
    #[serde(default)]
    pub radiuses: Option<String>,
    #[serde(default)]
    pub hints: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StepManeuverJson {
    pub location: [f64; 2],
    pub bearing_before: u16,
    pub bearing_after: u16,
    #[serde(rename = "type")]
    pub maneuver_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LaneJson {
    pub indications: Vec<String>,
    pub valid: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IntersectionJson {
    pub location: [f64; 2],
    pub bearings: Vec<u16>,
    pub entry: Vec<bool>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "in")]
    pub in_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "out")]
    pub out_index: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lanes: Vec<LaneJson>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RouteStepJson {
    pub distance: f64,
    pub duration: f64,
    pub geometry: GeometryPayload,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty", rename = "ref")]
    pub reference: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pronunciation: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub destinations: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rotary_name: String,
    pub mode: String,
    pub maneuver: StepManeuverJson,
    pub intersections: Vec<IntersectionJson>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RouteLegJson {
    pub distance: f64,
    pub duration: f64,
    pub summary: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<RouteStepJson>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RouteJson {
    pub distance: f64,
    pub duration: f64,
    pub weight: f64,
    pub weight_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<GeometryPayload>,
    pub legs: Vec<RouteLegJson>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RouteResponse {
    pub code: &'static str,
    pub routes: Vec<RouteJson>,
    pub waypoints: Vec<Waypoint>,
}

fn maneuver_type_text(step: &crate::guidance::RouteStep) -> String {
    match step.maneuver.waypoint_type {
        WaypointType::Depart => "depart".to_string(),
        WaypointType::Arrive => "arrive".to_string(),
        WaypointType::None => step.maneuver.instruction.text().to_string(),
    }
}

fn lane_indication_names(mask: u16) -> Vec<String> {
    use crate::extractor::guidance::lanes::lane_type;
    let table = [
        (lane_type::NONE, "none"),
        (lane_type::STRAIGHT, "straight"),
        (lane_type::SHARP_LEFT, "sharp left"),
        (lane_type::LEFT, "left"),
        (lane_type::SLIGHT_LEFT, "slight left"),
        (lane_type::SLIGHT_RIGHT, "slight right"),
        (lane_type::RIGHT, "right"),
        (lane_type::SHARP_RIGHT, "sharp right"),
        (lane_type::UTURN, "uturn"),
    ];
    table
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .map(|(_, name)| name.to_string())
        .collect()
}

fn step_json(leg: &Leg, step: &crate::guidance::RouteStep, format: GeometryFormat) -> RouteStepJson {
    let end = step.geometry_end.min(leg.geometry.locations.len());
    let begin = step.geometry_begin.min(end.saturating_sub(1));
    let locations = &leg.geometry.locations[begin..end];

    let intersections = step
        .intersections
        .iter()
        .map(|intersection| {
            let lanes = intersection
                .lane_description
                .iter()
                .rev()
                .enumerate()
                .map(|(from_right, &mask)| {
                    let from_right = from_right as u8;
                    let valid = intersection.lanes.is_assigned()
                        && from_right >= intersection.lanes.first_lane_from_the_right
                        && from_right
                            < intersection.lanes.first_lane_from_the_right
                                + intersection.lanes.lanes_in_turn;
                    LaneJson {
                        indications: lane_indication_names(mask),
                        valid,
                    }
                })
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            IntersectionJson {
                location: [
                    intersection.location.lon_degrees(),
                    intersection.location.lat_degrees(),
                ],
                bearings: intersection.bearings.clone(),
                entry: intersection.entry.clone(),
                in_index: intersection.in_index,
                out_index: intersection.out_index,
                lanes,
            }
        })
        .collect();

    let is_waypoint = step.maneuver.waypoint_type != WaypointType::None;
    RouteStepJson {
        distance: step.distance,
        duration: step.duration,
        geometry: encode_geometry(locations, format),
        name: step.name.clone(),
        reference: step.reference.clone(),
        pronunciation: step.pronunciation.clone(),
        destinations: step.destinations.clone(),
        rotary_name: step.rotary_name.clone(),
        mode: step.mode.name().to_string(),
        maneuver: StepManeuverJson {
            location: [
                step.maneuver.location.lon_degrees(),
                step.maneuver.location.lat_degrees(),
            ],
            bearing_before: step.maneuver.bearing_before.round() as u16 % 360,
            bearing_after: step.maneuver.bearing_after.round() as u16 % 360,
            maneuver_type: maneuver_type_text(step),
            modifier: (!is_waypoint
                || step.maneuver.instruction.direction_modifier
                    != crate::extractor::guidance::turn_instruction::DirectionModifier::UTurn)
                .then(|| step.maneuver.instruction.direction_modifier.text().to_string()),
            exit: (step.maneuver.exit > 0).then_some(step.maneuver.exit),
        },
        intersections,
    }
}

fn legs_to_route_json(
    legs: &[Leg],
    want_steps: bool,
    format: GeometryFormat,
    overview: OverviewMode,
    weight: f64,
) -> RouteJson {
    let mut overview_locations: Vec<Coordinate> = Vec::new();
    for leg in legs {
        if overview_locations.is_empty() {
            overview_locations.extend(&leg.geometry.locations);
        } else {
            overview_locations.extend(&leg.geometry.locations[1..]);
        }
    }
    let geometry = match overview {
        OverviewMode::False => None,
        OverviewMode::Full => Some(encode_geometry(&overview_locations, format)),
        OverviewMode::Simplified => {
            let simplified = douglas_peucker(&overview_locations, 1e-5);
            Some(encode_geometry(&simplified, format))
        }
    };

    RouteJson {
        distance: legs.iter().map(|leg| leg.distance).sum(),
        duration: legs.iter().map(|leg| leg.duration).sum(),
        weight,
        weight_name: "routability",
        geometry,
        legs: legs
            .iter()
            .map(|leg| RouteLegJson {
                distance: leg.distance,
                duration: leg.duration,
                summary: leg.summary.clone(),
                steps: if want_steps {
                    leg.steps.iter().map(|step| step_json(leg, step, format)).collect()
                } else {
                    Vec::new()
                },
            })
            .collect(),
    }
}

#[utoipa::path(
    get,
    path = "/route/v1/{profile}/{coordinates}",
    params(
        ("profile" = String, Path, description = "Profile name, as extracted"),
        ("coordinates" = String, Path, description = "lon,lat;lon,lat… or polyline(...)"),
    ),
    responses(
        (status = 200, description = "Route found", body = RouteResponse),
        (status = 400, description = "Invalid request or no route", body = ErrorBody),
    )
)]
pub async fn route(
    State(state): State<Arc<AppState>>,
    Path((_profile, coordinates)): Path<(String, String)>,
    Query(query): Query<RouteQuery>,
) -> Response {
    let facade = state.facade.snapshot();
    match handle_route(&facade, &state.limits, &coordinates, &query) {
        Ok(response) => Json(response).into_response(),
        Err(error) => error_response(error),
    }
}

fn handle_route(
    facade: &InternalDataFacade,
    limits: &RequestLimits,
    coordinates: &str,
    query: &RouteQuery,
) -> Result<RouteResponse, EngineError> {
    let coordinates = params::parse_coordinates(coordinates)?;
    if coordinates.len() < 2 {
        return Err(EngineError::new(
            Status::InvalidOptions,
            "a route needs at least two coordinates",
        ));
    }
    if coordinates.len() > limits.max_locations_route {
        return Err(EngineError::too_big(
            limits.max_locations_route,
            coordinates.len(),
        ));
    }
    let format = GeometryFormat::parse(&query.geometries)?;
    let overview = OverviewMode::parse(&query.overview)?;
    let bearings = match &query.bearings {
        Some(value) => params::parse_bearings(value, coordinates.len())?,
        None => vec![None; coordinates.len()],
    };
    let radiuses = match &query.radiuses {
        Some(value) => params::parse_radiuses(value, coordinates.len())?,
        None => vec![None; coordinates.len()],
    };
    let hints = match &query.hints {
        Some(value) => params::parse_hints(value, coordinates.len())?,
        None => vec![None; coordinates.len()],
    };

    let phantoms = resolve_waypoints(facade, &coordinates, &bearings, &radiuses, &hints)?;

    let mut context = SearchContext::new(facade.query_graph().node_count() as usize);
    let mut legs = Vec::new();
    let mut total_weight = 0i64;
    for pair in phantoms.windows(2) {
        let result = route_between(facade, &mut context, &pair[0], &pair[1])?;
        total_weight += result.weight as i64;
        let leg = assemble_leg(facade, &result, &pair[0], &pair[1]);
        legs.push(post_process_leg(leg, &pair[0], &pair[1]));
    }

    Ok(RouteResponse {
        code: "Ok",
        routes: vec![legs_to_route_json(
            &legs,
            query.steps,
            format,
            overview,
            total_weight as f64 / 10.0,
        )],
        waypoints: phantoms
            .iter()
            .map(|phantom| waypoint_json(facade, phantom))
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// /nearest
// ---------------------------------------------------------------------------

fn default_number() -> usize {
    1
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NearestQuery {
    #[serde(default = "default_number")]
    pub number: usize,
    #[serde(default)]
    pub bearings: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NearestResponse {
    pub code: &'static str,
    pub waypoints: Vec<Waypoint>,
}

pub async fn nearest(
    State(state): State<Arc<AppState>>,
    Path((_profile, coordinates)): Path<(String, String)>,
    Query(query): Query<NearestQuery>,
) -> Response {
    let facade = state.facade.snapshot();
    let result = (|| -> Result<NearestResponse, EngineError> {
        let coordinates = params::parse_coordinates(&coordinates)?;
        if coordinates.len() != 1 {
            return Err(EngineError::new(
                Status::InvalidOptions,
                "nearest takes exactly one coordinate",
            ));
        }
        if query.number > state.limits.max_results_nearest {
            return Err(EngineError::too_big(
                state.limits.max_results_nearest,
                query.number,
            ));
        }
        let bearing = match &query.bearings {
            Some(value) => params::parse_bearings(value, 1)?[0],
            None => None,
        };
        let options = NearestOptions {
            bearing,
            ..Default::default()
        };
        let candidates = facade.nearest_phantoms(coordinates[0], query.number, &options);
        if candidates.is_empty() {
            return Err(EngineError::no_segment("no street within range"));
        }
        Ok(NearestResponse {
            code: "Ok",
            waypoints: candidates
                .iter()
                .map(|candidate| waypoint_json(&facade, &candidate.phantom))
                .collect(),
        })
    })();
    match result {
        Ok(response) => Json(response).into_response(),
        Err(error) => error_response(error),
    }
}

// ---------------------------------------------------------------------------
// /table
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct TableQuery {
    #[serde(default)]
    pub sources: Option<String>,
    #[serde(default)]
    pub destinations: Option<String>,
    #[serde(default)]
    pub bearings: Option<String>,
    #[serde(default)]
    pub radiuses: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TableResponse {
    pub code: &'static str,
    /// Seconds; `null` marks unreachable pairs.
    pub durations: Vec<Vec<Option<f64>>>,
    pub sources: Vec<Waypoint>,
    pub destinations: Vec<Waypoint>,
}

pub async fn table(
    State(state): State<Arc<AppState>>,
    Path((_profile, coordinates)): Path<(String, String)>,
    Query(query): Query<TableQuery>,
) -> Response {
    let facade = state.facade.snapshot();
    let result = (|| -> Result<TableResponse, EngineError> {
        let coordinates = params::parse_coordinates(&coordinates)?;
        if coordinates.len() > state.limits.max_locations_table {
            return Err(EngineError::too_big(
                state.limits.max_locations_table,
                coordinates.len(),
            ));
        }
        let bearings = match &query.bearings {
            Some(value) => params::parse_bearings(value, coordinates.len())?,
            None => vec![None; coordinates.len()],
        };
        let radiuses = match &query.radiuses {
            Some(value) => params::parse_radiuses(value, coordinates.len())?,
            None => vec![None; coordinates.len()],
        };
        let phantoms = resolve_waypoints(facade.as_ref(), &coordinates, &bearings, &radiuses, &[])?;

        let source_indices = match &query.sources {
            Some(value) => params::parse_index_list(value, coordinates.len())?,
            None => (0..coordinates.len()).collect(),
        };
        let destination_indices = match &query.destinations {
            Some(value) => params::parse_index_list(value, coordinates.len())?,
            None => (0..coordinates.len()).collect(),
        };

        let sources: Vec<PhantomNode> =
            source_indices.iter().map(|&i| phantoms[i]).collect();
        let destinations: Vec<PhantomNode> =
            destination_indices.iter().map(|&i| phantoms[i]).collect();

        let matrix = many_to_many::many_to_many(facade.query_graph(), &sources, &destinations);
        let durations: Vec<Vec<Option<f64>>> = matrix
            .chunks(destinations.len().max(1))
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map(|weight| weight.max(0) as f64 / 10.0))
                    .collect()
            })
            .collect();

        Ok(TableResponse {
            code: "Ok",
            durations,
            sources: sources
                .iter()
                .map(|phantom| waypoint_json(&facade, phantom))
                .collect(),
            destinations: destinations
                .iter()
                .map(|phantom| waypoint_json(&facade, phantom))
                .collect(),
        })
    })();
    match result {
        Ok(response) => Json(response).into_response(),
        Err(error) => error_response(error),
    }
}

// ---------------------------------------------------------------------------
// /match
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct MatchQuery {
    #[serde(default = "default_geometries")]
    pub geometries: String,
    #[serde(default)]
    pub steps: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TracepointJson {
    pub location: [f64; 2],
    pub matchings_index: usize,
    pub waypoint_index: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MatchingJson {
    pub confidence: f64,
    pub distance: f64,
    pub duration: f64,
    pub geometry: GeometryPayload,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MatchResponse {
    pub code: &'static str,
    pub matchings: Vec<MatchingJson>,
    pub tracepoints: Vec<Option<TracepointJson>>,
}

pub async fn match_trace(
    State(state): State<Arc<AppState>>,
    Path((_profile, coordinates)): Path<(String, String)>,
    Query(query): Query<MatchQuery>,
) -> Response {
    let facade = state.facade.snapshot();
    let result = (|| -> Result<MatchResponse, EngineError> {
        let trace = params::parse_coordinates(&coordinates)?;
        if trace.len() > state.limits.max_locations_matching {
            return Err(EngineError::too_big(
                state.limits.max_locations_matching,
                trace.len(),
            ));
        }
        let format = GeometryFormat::parse(&query.geometries)?;

        let matched = map_match(
            facade.as_ref(),
            facade.query_graph(),
            &trace,
            &MatchOptions::default(),
        );
        if matched.matchings.is_empty() {
            return Err(EngineError::new(
                Status::NoMatch,
                "could not match the trace to the road network",
            ));
        }

        let matchings = matched
            .matchings
            .iter()
            .map(|matching| {
                let mut locations: Vec<Coordinate> = Vec::new();
                let mut duration_ds = 0i64;
                for (leg, pair) in matching.legs.iter().zip(matching.phantoms.windows(2)) {
                    duration_ds += leg.weight as i64;
                    let assembled = assemble_leg(facade.as_ref(), leg, &pair[0], &pair[1]);
                    if locations.is_empty() {
                        locations.extend(&assembled.geometry.locations);
                    } else {
                        locations.extend(&assembled.geometry.locations[1..]);
                    }
                }
                let distance = locations
                    .windows(2)
                    .map(|pair| haversine_distance(pair[0], pair[1]))
                    .sum();
                MatchingJson {
                    confidence: matching.confidence,
                    distance,
                    duration: duration_ds.max(0) as f64 / 10.0,
                    geometry: encode_geometry(&locations, format),
                }
            })
            .collect();

        let tracepoints = matched
            .tracepoints
            .iter()
            .map(|assignment| {
                assignment.map(|(matching_index, waypoint_index)| {
                    let phantom =
                        &matched.matchings[matching_index].phantoms[waypoint_index];
                    TracepointJson {
                        location: [
                            phantom.location.lon_degrees(),
                            phantom.location.lat_degrees(),
                        ],
                        matchings_index: matching_index,
                        waypoint_index,
                    }
                })
            })
            .collect();

        Ok(MatchResponse {
            code: "Ok",
            matchings,
            tracepoints,
        })
    })();
    match result {
        Ok(response) => Json(response).into_response(),
        Err(error) => error_response(error),
    }
}

// ---------------------------------------------------------------------------
// /trip
// ---------------------------------------------------------------------------

fn default_roundtrip() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TripQuery {
    #[serde(default = "default_roundtrip")]
    pub roundtrip: bool,
    #[serde(default = "default_geometries")]
    pub geometries: String,
    #[serde(default)]
    pub steps: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TripWaypointJson {
    #[serde(flatten)]
    pub waypoint: Waypoint,
    pub trips_index: usize,
    pub waypoint_index: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TripResponse {
    pub code: &'static str,
    pub trips: Vec<RouteJson>,
    pub waypoints: Vec<TripWaypointJson>,
}

pub async fn trip(
    State(state): State<Arc<AppState>>,
    Path((_profile, coordinates)): Path<(String, String)>,
    Query(query): Query<TripQuery>,
) -> Response {
    let facade = state.facade.snapshot();
    let result = (|| -> Result<TripResponse, EngineError> {
        let coordinates = params::parse_coordinates(&coordinates)?;
        if coordinates.len() > state.limits.max_locations_trip {
            return Err(EngineError::too_big(
                state.limits.max_locations_trip,
                coordinates.len(),
            ));
        }
        let format = GeometryFormat::parse(&query.geometries)?;
        let phantoms = resolve_waypoints(
            facade.as_ref(),
            &coordinates,
            &vec![None; coordinates.len()],
            &vec![None; coordinates.len()],
            &[],
        )?;

        let solution = optimize_trip(facade.query_graph(), &phantoms, query.roundtrip)
            .ok_or_else(|| {
                EngineError::new(Status::NoTrips, "waypoints are not mutually reachable")
            })?;

        let mut legs = Vec::new();
        for (leg_index, leg) in solution.legs.iter().enumerate() {
            let from = solution.order[leg_index];
            let to = solution.order[(leg_index + 1) % solution.order.len()];
            let assembled = assemble_leg(facade.as_ref(), leg, &phantoms[from], &phantoms[to]);
            legs.push(post_process_leg(assembled, &phantoms[from], &phantoms[to]));
        }

        let trip_json = legs_to_route_json(
            &legs,
            query.steps,
            format,
            OverviewMode::Full,
            solution.total_cost as f64 / 10.0,
        );

        let waypoints = phantoms
            .iter()
            .enumerate()
            .map(|(index, phantom)| {
                let waypoint_index = solution
                    .order
                    .iter()
                    .position(|&p| p == index)
                    .unwrap_or(0);
                TripWaypointJson {
                    waypoint: waypoint_json(&facade, phantom),
                    trips_index: 0,
                    waypoint_index,
                }
            })
            .collect();

        Ok(TripResponse {
            code: "Ok",
            trips: vec![trip_json],
            waypoints,
        })
    })();
    match result {
        Ok(response) => Json(response).into_response(),
        Err(error) => error_response(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_douglas_peucker_keeps_corners() {
        let locations = vec![
            Coordinate::from_degrees(0.0, 0.0),
            Coordinate::from_degrees(0.001, 0.00001), // nearly collinear
            Coordinate::from_degrees(0.002, 0.0),
            Coordinate::from_degrees(0.002, 0.002), // sharp corner
            Coordinate::from_degrees(0.003, 0.002),
        ];
        let simplified = douglas_peucker(&locations, 1e-4);
        assert!(simplified.len() < locations.len());
        assert_eq!(simplified.first(), locations.first());
        assert_eq!(simplified.last(), locations.last());
        assert!(simplified.contains(&Coordinate::from_degrees(0.002, 0.002)));
    }

    #[test]
    fn test_geometry_format_parsing() {
        assert_eq!(GeometryFormat::parse("polyline").unwrap(), GeometryFormat::Polyline);
        assert_eq!(GeometryFormat::parse("polyline6").unwrap(), GeometryFormat::Polyline6);
        assert_eq!(GeometryFormat::parse("geojson").unwrap(), GeometryFormat::GeoJson);
        assert!(GeometryFormat::parse("wkt").is_err());
    }

    #[test]
    fn test_overview_parsing() {
        assert_eq!(OverviewMode::parse("false").unwrap(), OverviewMode::False);
        assert_eq!(OverviewMode::parse("full").unwrap(), OverviewMode::Full);
        assert!(OverviewMode::parse("partial").is_err());
    }

    #[test]
    fn test_lane_indication_names() {
        use crate::extractor::guidance::lanes::lane_type;
        let names = lane_indication_names(lane_type::LEFT | lane_type::STRAIGHT);
        assert!(names.contains(&"left".to_string()));
        assert!(names.contains(&"straight".to_string()));
        assert_eq!(lane_indication_names(0).len(), 0);
    }
}

//! End-to-end pipeline tests over synthetic maps: extraction, snapping,
//! routing and guidance in one process.

use waymark::extractor::raw::{RawDataset, RawNode, RawRestriction, RawWay};
use waymark::extractor::{build_facade, extract_tables};
use waymark::facade::{DataFacade, InternalDataFacade, NearestOptions};
use waymark::geo::Coordinate;
use waymark::guidance::step::WaypointType;
use waymark::guidance::{assemble_leg, post_process_leg, Leg};
use waymark::profile::{CarProfile, NodeAnnotation, WayAnnotation};
use waymark::router::search::{shortest_path, SearchContext};
use waymark::router::{table, PhantomNode};
use waymark::types::{RoadClassification, RoadPriority, TravelMode};

/// Roughly 20 meters in degrees at the equator.
const GRID: f64 = 0.00018;

struct TestMap {
    dataset: RawDataset,
}

impl TestMap {
    fn new() -> Self {
        Self {
            dataset: RawDataset::default(),
        }
    }

    /// Place a node on the grid; `name` doubles as the OSM id.
    fn node(&mut self, name: char, col: f64, row: f64) -> &mut Self {
        self.dataset.nodes.push(RawNode {
            osm_id: name as i64,
            coordinate: Coordinate::from_degrees(col * GRID, row * GRID),
            annotation: NodeAnnotation::default(),
        });
        self
    }

    fn way(&mut self, id: i64, nodes: &str, name: &str) -> &mut Self {
        self.way_with(id, nodes, name, |_| {})
    }

    fn way_with(
        &mut self,
        id: i64,
        nodes: &str,
        name: &str,
        tweak: impl FnOnce(&mut WayAnnotation),
    ) -> &mut Self {
        let mut annotation = WayAnnotation {
            forward_speed: 50.0,
            backward_speed: 50.0,
            duration: None,
            name: name.to_string(),
            reference: String::new(),
            pronunciation: String::new(),
            destinations: String::new(),
            roundabout: false,
            startpoint: true,
            forward_mode: TravelMode::Driving,
            backward_mode: TravelMode::Driving,
            lane_string: String::new(),
            classification: RoadClassification {
                priority: RoadPriority::Secondary,
                ..Default::default()
            },
        };
        tweak(&mut annotation);
        self.dataset.ways.push(RawWay {
            osm_id: id,
            nodes: nodes.chars().map(|c| c as i64).collect(),
            annotation,
        });
        self
    }

    fn restriction(&mut self, from_way: i64, via: char, to_way: i64, only: bool) -> &mut Self {
        self.dataset.restrictions.push(RawRestriction {
            from_way,
            via_node: via as i64,
            to_way,
            only,
        });
        self
    }

    fn facade(self) -> InternalDataFacade {
        let profile = CarProfile::new();
        let tables = extract_tables(&self.dataset, &profile, 1).expect("extraction succeeds");
        build_facade(tables, "test".to_string())
    }
}

fn coordinate_of(col: f64, row: f64) -> Coordinate {
    Coordinate::from_degrees(col * GRID, row * GRID)
}

fn snap(facade: &InternalDataFacade, col: f64, row: f64) -> PhantomNode {
    facade
        .nearest_phantoms(coordinate_of(col, row), 1, &NearestOptions::default())
        .first()
        .expect("coordinate snaps")
        .phantom
}

fn route_leg(facade: &InternalDataFacade, from: (f64, f64), to: (f64, f64)) -> Leg {
    let source = snap(facade, from.0, from.1);
    let target = snap(facade, to.0, to.1);
    let mut context = SearchContext::new(facade.query_graph().node_count() as usize);
    let result = shortest_path(facade.query_graph(), &mut context, &source, &target, None)
        .expect("route exists");
    let leg = assemble_leg(facade, &result, &source, &target);
    post_process_leg(leg, &source, &target)
}

fn step_summary(leg: &Leg) -> Vec<(String, String)> {
    leg.steps
        .iter()
        .map(|step| {
            let kind = match step.maneuver.waypoint_type {
                WaypointType::Depart => "depart".to_string(),
                WaypointType::Arrive => "arrive".to_string(),
                WaypointType::None => step.maneuver.instruction.text().to_string(),
            };
            (kind, step.name.clone())
        })
        .collect()
}

/// A plain street with a pass-through node: the chain compresses away and
/// the route is a single depart/arrive pair.
#[test]
fn test_straight_road_has_no_turns() {
    let mut map = TestMap::new();
    map.node('a', 0.0, 0.0)
        .node('b', 1.0, 0.0)
        .node('c', 2.0, 0.0)
        .way(1, "abc", "first");
    let facade = map.facade();

    let leg = route_leg(&facade, (0.0, 0.0), (2.0, 0.0));
    let steps = step_summary(&leg);
    assert_eq!(steps.len(), 2, "got {steps:?}");
    assert_eq!(steps[0].0, "depart");
    assert_eq!(steps[1].0, "arrive");
    assert_eq!(steps[0].1, "first");
    assert!(leg.distance > 35.0 && leg.distance < 45.0, "distance {}", leg.distance);
}

/// P6: every produced step list starts with Depart, ends with Arrive, and
/// has no waypoint steps in between.
#[test]
fn test_waypoint_invariant_on_cross() {
    let mut map = TestMap::new();
    map.node('a', 0.0, 0.0)
        .node('b', 2.0, 0.0)
        .node('c', 4.0, 0.0)
        .node('d', 2.0, 2.0)
        .node('e', 2.0, -2.0)
        .way(1, "abc", "first")
        .way(2, "dbe", "second");
    let facade = map.facade();

    for destination in [(4.0, 0.0), (2.0, 2.0), (2.0, -2.0)] {
        let leg = route_leg(&facade, (0.0, 0.0), destination);
        assert_eq!(leg.steps.first().unwrap().maneuver.waypoint_type, WaypointType::Depart);
        assert_eq!(leg.steps.last().unwrap().maneuver.waypoint_type, WaypointType::Arrive);
        for step in &leg.steps[1..leg.steps.len() - 1] {
            assert_eq!(step.maneuver.waypoint_type, WaypointType::None);
        }
    }
}

/// Turning off one street onto another announces the turn with the new
/// name; heading east and leaving north is a left turn.
#[test]
fn test_turn_at_cross_intersection() {
    let mut map = TestMap::new();
    map.node('a', 0.0, 0.0)
        .node('b', 2.0, 0.0)
        .node('c', 4.0, 0.0)
        .node('d', 2.0, 2.0)
        .node('e', 2.0, -2.0)
        .way(1, "abc", "first")
        .way(2, "dbe", "second");
    let facade = map.facade();

    let leg = route_leg(&facade, (0.0, 0.0), (2.0, 2.0));
    let steps = step_summary(&leg);
    assert_eq!(steps.len(), 3, "got {steps:?}");
    assert_eq!(steps[0], ("depart".to_string(), "first".to_string()));
    assert_eq!(steps[1].0, "turn", "got {steps:?}");
    assert_eq!(steps[1].1, "second");
    let turn = &leg.steps[1];
    assert_eq!(
        turn.maneuver.instruction.direction_modifier.text(),
        "left",
        "heading east, the north arm is to the left"
    );
}

/// P2: on a fully bidirectional map, both directions cost the same.
#[test]
fn test_symmetric_route_weights() {
    let mut map = TestMap::new();
    map.node('a', 0.0, 0.0)
        .node('b', 2.0, 0.0)
        .node('c', 2.0, 2.0)
        .node('d', 4.0, 2.0)
        .way(1, "ab", "one")
        .way(2, "bc", "two")
        .way(3, "cd", "three");
    let facade = map.facade();

    let source = snap(&facade, 0.0, 0.0);
    let target = snap(&facade, 4.0, 2.0);
    let mut context = SearchContext::new(facade.query_graph().node_count() as usize);
    let forward = shortest_path(facade.query_graph(), &mut context, &source, &target, None)
        .expect("forward route");
    let backward = shortest_path(facade.query_graph(), &mut context, &target, &source, None)
        .expect("backward route");
    assert_eq!(forward.weight, backward.weight);
}

/// P4: the 1x1 many-to-many matrix matches the one-to-one route weight.
#[test]
fn test_table_matches_route() {
    let mut map = TestMap::new();
    map.node('a', 0.0, 0.0)
        .node('b', 2.0, 0.0)
        .node('c', 4.0, 0.0)
        .way(1, "abc", "first");
    let facade = map.facade();

    let source = snap(&facade, 0.0, 0.0);
    let target = snap(&facade, 4.0, 0.0);
    let mut context = SearchContext::new(facade.query_graph().node_count() as usize);
    let route = shortest_path(facade.query_graph(), &mut context, &source, &target, None)
        .expect("route exists");
    let matrix = table(facade.query_graph(), &[source], &[target]);
    assert_eq!(matrix, vec![Some(route.weight)]);
}

/// P7: unpacked paths contain only original edges; with the flat graph the
/// edge path maps one turn per node transition.
#[test]
fn test_unpacked_path_is_shortcut_free() {
    let mut map = TestMap::new();
    map.node('a', 0.0, 0.0)
        .node('b', 2.0, 0.0)
        .node('c', 2.0, 2.0)
        .way(1, "ab", "one")
        .way(2, "bc", "two");
    let facade = map.facade();

    let source = snap(&facade, 0.0, 0.0);
    let target = snap(&facade, 2.0, 2.0);
    let mut context = SearchContext::new(facade.query_graph().node_count() as usize);
    let result = shortest_path(facade.query_graph(), &mut context, &source, &target, None)
        .expect("route exists");
    assert_eq!(result.edge_path.len(), result.node_path.len() - 1);
    for &edge in &result.edge_path {
        // original turn ids index the turn data table
        let _ = facade.turn_data(edge);
    }
}

/// An only_* restriction forces the detour through its mandated arm.
#[test]
fn test_only_restriction_forces_detour() {
    let mut map = TestMap::new();
    map.node('a', 0.0, 0.0)
        .node('b', 2.0, 0.0)
        .node('c', 4.0, 0.0)
        .node('d', 2.0, 2.0)
        .way(1, "ab", "west")
        .way(2, "bc", "east")
        .way(3, "bd", "north")
        // arriving from the west you may only turn north
        .restriction(1, 'b', 3, true);
    let facade = map.facade();

    let direct_distance = 4.0 * 20.0; // meters, roughly

    let leg = route_leg(&facade, (0.0, 0.0), (4.0, 0.0));
    // the route must detour via the north arm and come back
    assert!(
        leg.distance > direct_distance * 1.5,
        "restricted route should detour, got {}m",
        leg.distance
    );
}

/// A no_* restriction on the only connection makes the route impossible.
#[test]
fn test_no_restriction_disconnects() {
    let mut map = TestMap::new();
    map.node('a', 0.0, 0.0)
        .node('b', 2.0, 0.0)
        .node('c', 4.0, 0.0)
        // oneway streets so there is no way around the ban
        .way_with(1, "ab", "west", |a| a.backward_speed = 0.0)
        .way_with(2, "bc", "east", |a| a.backward_speed = 0.0)
        .restriction(1, 'b', 2, false);
    let facade = map.facade();

    let source = snap(&facade, 0.0, 0.0);
    let target = snap(&facade, 4.0, 0.0);
    let mut context = SearchContext::new(facade.query_graph().node_count() as usize);
    let result = shortest_path(facade.query_graph(), &mut context, &source, &target, None);
    assert!(result.is_none(), "the banned turn was the only connection");
}

/// Mid-edge snapping: a coordinate deep inside a compressed chain splits
/// the edge and the geometry starts at the projection.
#[test]
fn test_mid_chain_phantom_split() {
    let mut map = TestMap::new();
    map.node('a', 0.0, 0.0)
        .node('b', 1.0, 0.0)
        .node('c', 2.0, 0.0)
        .node('d', 3.0, 0.0)
        .way(1, "abcd", "long road");
    let facade = map.facade();

    // between b and c, slightly off the line
    let query = Coordinate::from_degrees(1.5 * GRID, 0.1 * GRID);
    let candidates = facade.nearest_phantoms(query, 1, &NearestOptions::default());
    let phantom = candidates.first().expect("snaps onto the chain").phantom;
    assert!(phantom.location.lat.abs() < 2, "projection lands on the line");
    assert!(phantom.forward_weight > 0, "split carries partial weight");

    let leg = route_leg(&facade, (1.5, 0.1), (3.0, 0.0));
    assert!(leg.distance > 25.0 && leg.distance < 35.0, "got {}", leg.distance);
}

/// Bearing filters disable the direction pointing the wrong way.
#[test]
fn test_bearing_filter() {
    let mut map = TestMap::new();
    map.node('a', 0.0, 0.0).node('b', 2.0, 0.0).way(1, "ab", "road");
    let facade = map.facade();

    // the road runs east-west; ask for a northbound segment
    let north = NearestOptions {
        bearing: Some((0, 30)),
        ..Default::default()
    };
    let none = facade.nearest_phantoms(coordinate_of(1.0, 0.0), 1, &north);
    assert!(none.is_empty());

    // eastbound keeps only the forward direction
    let east = NearestOptions {
        bearing: Some((90, 30)),
        ..Default::default()
    };
    let candidates = facade.nearest_phantoms(coordinate_of(1.0, 0.0), 1, &east);
    let phantom = candidates.first().expect("eastbound matches").phantom;
    assert!(phantom.forward_segment_id.enabled ^ phantom.reverse_segment_id.enabled);
}

/// Snapping prefers big components when the nearest candidate sits on a
/// tiny disconnected island.
#[test]
fn test_big_component_alternative() {
    let mut map = TestMap::new();
    // a two-node island next to a long connected street; the mainland ways
    // carry different names so the junction node survives compression
    map.node('a', 0.0, 0.1)
        .node('b', 1.0, 0.1)
        .node('x', 0.0, 3.0)
        .node('y', 20.0, 3.0)
        .node('z', 40.0, 3.0)
        .way(1, "ab", "island")
        .way(2, "xy", "mainland west")
        .way(3, "yz", "mainland east");
    let profile = CarProfile::new();
    // threshold above the island size, below the mainland size
    let tables = extract_tables(&map.dataset, &profile, 3).expect("extraction succeeds");
    let facade = build_facade(tables, "test".to_string());

    let query = coordinate_of(0.5, 0.0);
    let (primary, alternative) = facade
        .nearest_with_alternative(query, &NearestOptions::default())
        .expect("candidates exist");
    assert!(primary.phantom.is_tiny_component);
    let alternative = alternative.expect("a big-component alternative exists");
    assert!(!alternative.phantom.is_tiny_component);
    assert!(alternative.distance > primary.distance);
}

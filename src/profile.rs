//! Routing profiles - tag semantics and cost shaping.
//!
//! The extractor is profile-agnostic: everything mode-specific flows through
//! the `Profile` trait. `CarProfile` is the built-in default; alternative
//! profiles implement the same seam.

use std::collections::HashMap;

use crate::geo::Coordinate;
use crate::types::{RoadClassification, RoadPriority, TravelMode};

/// Key/value tags of one OSM element.
#[derive(Debug, Default, Clone)]
pub struct TagMap {
    tags: HashMap<String, String>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl FromIterator<(String, String)> for TagMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().collect(),
        }
    }
}

/// Node-level results: barriers block traversal, signals add delay.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeAnnotation {
    pub barrier: bool,
    pub traffic_signal: bool,
}

/// Way-level results produced by `Profile::process_way`.
#[derive(Debug, Clone)]
pub struct WayAnnotation {
    /// Forward speed in km/h; 0 disables the direction.
    pub forward_speed: f64,
    /// Backward speed in km/h; 0 disables the direction.
    pub backward_speed: f64,
    /// Fixed traversal duration in seconds (ferries); overrides speeds.
    pub duration: Option<f64>,
    pub name: String,
    pub reference: String,
    pub pronunciation: String,
    pub destinations: String,
    pub roundabout: bool,
    /// Whether queries may snap onto this way.
    pub startpoint: bool,
    pub forward_mode: TravelMode,
    pub backward_mode: TravelMode,
    /// Raw `turn:lanes` value, parsed later by the guidance annotator.
    pub lane_string: String,
    pub classification: RoadClassification,
}

/// Per-segment weight data handed to `process_segment` for adjustment.
#[derive(Debug, Clone, Copy)]
pub struct SegmentWeight {
    /// Speed in km/h, or unused when `duration` is set.
    pub speed: f64,
    /// Fixed duration in seconds for the whole way, split per segment.
    pub duration: Option<f64>,
}

/// Global knobs the router and guidance read back from the dataset.
#[derive(Debug, Clone, Copy)]
pub struct ProfileProperties {
    /// Penalty for turning around at a via waypoint, deciseconds.
    pub u_turn_penalty: i32,
    /// Delay added when crossing a traffic signal, deciseconds.
    pub traffic_signal_penalty: i32,
    /// Default for the `continue_straight` query parameter.
    pub continue_straight_at_waypoint: bool,
    pub use_turn_restrictions: bool,
}

impl Default for ProfileProperties {
    fn default() -> Self {
        Self {
            u_turn_penalty: 200,
            traffic_signal_penalty: 20,
            continue_straight_at_waypoint: true,
            use_turn_restrictions: true,
        }
    }
}

/// The capability the extractor consumes. Implementations tag edges with
/// speeds and travel modes and shape turn costs.
pub trait Profile: Send + Sync {
    fn name(&self) -> &str;

    /// Annotate a node; `None` tags (no barrier, no signal) are the default.
    fn process_node(&self, tags: &TagMap) -> NodeAnnotation;

    /// Annotate a way; `None` excludes the way from the graph.
    fn process_way(&self, tags: &TagMap) -> Option<WayAnnotation>;

    /// Adjust the weight of a single segment after distance is known.
    fn process_segment(&self, from: Coordinate, to: Coordinate, distance: f64, weight: &mut SegmentWeight) {
        let _ = (from, to, distance, weight);
    }

    /// Penalty in seconds for a turn through `angle` degrees, where 0 is
    /// straight ahead, positive is right, negative is left.
    fn turn_penalty(&self, angle: f64) -> f64;

    fn properties(&self) -> ProfileProperties;
}

/// Turn cost configuration using a sigmoid over the turn angle, biased so
/// that crossing traffic (left turns in right-hand traffic) costs more.
#[derive(Debug, Clone, Copy)]
pub struct TurnPenaltyConfig {
    /// Maximum turn penalty in seconds.
    pub turn_penalty: f64,
    /// > 1.0 prefers right turns.
    pub turn_bias: f64,
}

impl TurnPenaltyConfig {
    pub fn car() -> Self {
        Self {
            turn_penalty: 7.5,
            turn_bias: 1.075,
        }
    }

    /// Penalty in seconds for a signed turn angle (0 straight, +right, -left).
    pub fn penalty(&self, angle: f64) -> f64 {
        if angle.abs() < 1e-9 {
            return 0.0;
        }
        let bias = if angle >= 0.0 {
            self.turn_bias
        } else {
            1.0 / self.turn_bias
        };
        self.turn_penalty / (1.0 + (-((13.0 / bias) * angle.abs() / 180.0 - 6.5 * bias)).exp())
    }
}

/// Default automobile profile.
pub struct CarProfile {
    penalties: TurnPenaltyConfig,
}

impl CarProfile {
    pub fn new() -> Self {
        Self {
            penalties: TurnPenaltyConfig::car(),
        }
    }

    /// Base speed and classification per highway value.
    fn highway_defaults(highway: &str) -> Option<(f64, RoadPriority)> {
        let entry = match highway {
            "motorway" => (90.0, RoadPriority::Motorway),
            "motorway_link" => (45.0, RoadPriority::Link),
            "trunk" => (85.0, RoadPriority::Trunk),
            "trunk_link" => (40.0, RoadPriority::Link),
            "primary" => (65.0, RoadPriority::Primary),
            "primary_link" => (30.0, RoadPriority::Link),
            "secondary" => (55.0, RoadPriority::Secondary),
            "secondary_link" => (25.0, RoadPriority::Link),
            "tertiary" => (40.0, RoadPriority::Tertiary),
            "tertiary_link" => (20.0, RoadPriority::Link),
            "unclassified" => (25.0, RoadPriority::MainResidential),
            "residential" => (25.0, RoadPriority::MainResidential),
            "living_street" => (10.0, RoadPriority::SideResidential),
            "service" => (15.0, RoadPriority::Service),
            _ => return None,
        };
        Some(entry)
    }
}

impl Default for CarProfile {
    fn default() -> Self {
        Self::new()
    }
}

fn is_denied(value: Option<&str>) -> bool {
    matches!(value, Some("no") | Some("private") | Some("delivery") | Some("agricultural") | Some("forestry"))
}

fn parse_maxspeed(value: &str) -> Option<f64> {
    if let Some(mph) = value.strip_suffix(" mph").or_else(|| value.strip_suffix("mph")) {
        return mph.trim().parse::<f64>().ok().map(|v| v * 1.609_344);
    }
    value.trim().parse::<f64>().ok()
}

fn parse_duration(value: &str) -> Option<f64> {
    // "hh:mm:ss", "mm:ss", "mm"
    let parts: Vec<&str> = value.split(':').collect();
    let nums: Option<Vec<f64>> = parts.iter().map(|p| p.trim().parse::<f64>().ok()).collect();
    let nums = nums?;
    match nums.as_slice() {
        [m] => Some(m * 60.0),
        [m, s] => Some(m * 60.0 + s),
        [h, m, s] => Some(h * 3600.0 + m * 60.0 + s),
        _ => None,
    }
}

impl Profile for CarProfile {
    fn name(&self) -> &str {
        "car"
    }

    fn process_node(&self, tags: &TagMap) -> NodeAnnotation {
        let barrier = match tags.get("barrier") {
            Some("gate") | Some("lift_gate") | Some("no") | Some("entrance") | Some("border_control") | Some("toll_booth") | None => false,
            Some(_) => !matches!(tags.get("access"), Some("yes") | Some("permissive") | Some("designated")),
        };
        let traffic_signal = tags.get("highway") == Some("traffic_signals");
        NodeAnnotation {
            barrier,
            traffic_signal,
        }
    }

    fn process_way(&self, tags: &TagMap) -> Option<WayAnnotation> {
        let highway = tags.get("highway");
        let route = tags.get("route");

        if is_denied(tags.get("access"))
            || is_denied(tags.get("vehicle"))
            || is_denied(tags.get("motor_vehicle"))
            || is_denied(tags.get("motorcar"))
        {
            return None;
        }

        let mut annotation = WayAnnotation {
            forward_speed: 0.0,
            backward_speed: 0.0,
            duration: None,
            name: tags.get("name").unwrap_or_default().to_string(),
            reference: tags.get("ref").unwrap_or_default().to_string(),
            pronunciation: tags.get("name:pronunciation").unwrap_or_default().to_string(),
            destinations: tags.get("destination").unwrap_or_default().to_string(),
            roundabout: matches!(tags.get("junction"), Some("roundabout") | Some("circular")),
            startpoint: true,
            forward_mode: TravelMode::Driving,
            backward_mode: TravelMode::Driving,
            lane_string: tags
                .get("turn:lanes")
                .or_else(|| tags.get("turn:lanes:forward"))
                .unwrap_or_default()
                .to_string(),
            classification: RoadClassification::default(),
        };

        if route == Some("ferry") || route == Some("shuttle_train") {
            annotation.forward_mode = if route == Some("ferry") {
                TravelMode::Ferry
            } else {
                TravelMode::Train
            };
            annotation.backward_mode = annotation.forward_mode;
            annotation.forward_speed = 5.0;
            annotation.backward_speed = 5.0;
            annotation.duration = tags.get("duration").and_then(parse_duration);
            annotation.classification.priority = RoadPriority::Ferry;
            annotation.startpoint = false;
            return Some(annotation);
        }

        let highway = highway?;
        let (mut speed, priority) = Self::highway_defaults(highway)?;

        if let Some(maxspeed) = tags.get("maxspeed").and_then(parse_maxspeed) {
            // drivers rarely hold the exact limit on small roads
            speed = speed.min(maxspeed * 0.9).max(5.0);
        }

        annotation.forward_speed = speed;
        annotation.backward_speed = speed;
        annotation.classification = RoadClassification {
            priority,
            link: highway.ends_with("_link"),
            motorway: highway == "motorway" || highway == "motorway_link",
            ramp: highway.ends_with("_link"),
        };

        let oneway = tags.get("oneway");
        let implied_oneway =
            annotation.roundabout || highway == "motorway" || highway == "motorway_link";
        match oneway {
            Some("yes") | Some("1") | Some("true") => annotation.backward_speed = 0.0,
            Some("-1") | Some("reverse") => {
                annotation.forward_speed = 0.0;
            }
            Some("no") | Some("0") | Some("false") => {}
            _ if implied_oneway => annotation.backward_speed = 0.0,
            _ => {}
        }

        if tags.get("access") == Some("destination") {
            annotation.startpoint = true;
            annotation.forward_speed = annotation.forward_speed.min(15.0);
            annotation.backward_speed = annotation.backward_speed.min(15.0);
        }

        if annotation.forward_speed <= 0.0 && annotation.backward_speed <= 0.0 {
            return None;
        }

        Some(annotation)
    }

    fn turn_penalty(&self, angle: f64) -> f64 {
        self.penalties.penalty(angle)
    }

    fn properties(&self) -> ProfileProperties {
        ProfileProperties {
            u_turn_penalty: 200,
            traffic_signal_penalty: 20,
            continue_straight_at_waypoint: true,
            use_turn_restrictions: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> TagMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_residential_is_bidirectional() {
        let profile = CarProfile::new();
        let way = profile
            .process_way(&tags(&[("highway", "residential"), ("name", "Elm Street")]))
            .unwrap();
        assert!(way.forward_speed > 0.0);
        assert!(way.backward_speed > 0.0);
        assert_eq!(way.name, "Elm Street");
    }

    #[test]
    fn test_motorway_implies_oneway() {
        let profile = CarProfile::new();
        let way = profile.process_way(&tags(&[("highway", "motorway")])).unwrap();
        assert!(way.forward_speed > 0.0);
        assert_eq!(way.backward_speed, 0.0);
        assert!(way.classification.motorway);
    }

    #[test]
    fn test_reverse_oneway() {
        let profile = CarProfile::new();
        let way = profile
            .process_way(&tags(&[("highway", "primary"), ("oneway", "-1")]))
            .unwrap();
        assert_eq!(way.forward_speed, 0.0);
        assert!(way.backward_speed > 0.0);
    }

    #[test]
    fn test_footway_is_excluded() {
        let profile = CarProfile::new();
        assert!(profile.process_way(&tags(&[("highway", "footway")])).is_none());
        assert!(profile
            .process_way(&tags(&[("highway", "primary"), ("access", "no")]))
            .is_none());
    }

    #[test]
    fn test_ferry_uses_duration() {
        let profile = CarProfile::new();
        let way = profile
            .process_way(&tags(&[("route", "ferry"), ("duration", "00:30:00")]))
            .unwrap();
        assert_eq!(way.forward_mode, TravelMode::Ferry);
        assert_eq!(way.duration, Some(1800.0));
        assert!(!way.startpoint);
    }

    #[test]
    fn test_turn_penalty_shape() {
        let config = TurnPenaltyConfig::car();
        let straight = config.penalty(0.0);
        let right = config.penalty(90.0);
        let left = config.penalty(-90.0);
        let reversal = config.penalty(180.0);

        assert!(straight < 0.5, "straight should be ~free, got {straight}");
        assert!(left > right, "left {left} should cost more than right {right}");
        assert!(reversal > left);
        assert!(reversal <= config.turn_penalty + 1e-9);
    }

    #[test]
    fn test_maxspeed_mph() {
        assert!((parse_maxspeed("30 mph").unwrap() - 48.28).abs() < 0.01);
        assert_eq!(parse_maxspeed("50").unwrap(), 50.0);
        assert!(parse_maxspeed("none").is_none());
    }
}

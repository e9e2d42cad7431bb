//! Raw input model: profile-annotated nodes, ways and turn restrictions.
//!
//! The PBF reader fills a `RawDataset`; tests construct one directly. From
//! here on the pipeline never touches OSM tags again.

use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use osmpbf::{Element, ElementReader};
use rayon::prelude::*;

use crate::geo::Coordinate;
use crate::profile::{NodeAnnotation, Profile, TagMap, WayAnnotation};
use crate::types::{OsmNodeId, OsmWayId};

/// A node that survived tag filtering, with its profile annotation.
#[derive(Debug, Clone, Copy)]
pub struct RawNode {
    pub osm_id: OsmNodeId,
    pub coordinate: Coordinate,
    pub annotation: NodeAnnotation,
}

/// A routable way with its node references and profile annotation.
#[derive(Debug, Clone)]
pub struct RawWay {
    pub osm_id: OsmWayId,
    pub nodes: Vec<OsmNodeId>,
    pub annotation: WayAnnotation,
}

/// A via-node turn restriction, still keyed by OSM ids.
#[derive(Debug, Clone, Copy)]
pub struct RawRestriction {
    pub from_way: OsmWayId,
    pub via_node: OsmNodeId,
    pub to_way: OsmWayId,
    /// true for `only_*`, false for `no_*`.
    pub only: bool,
}

/// Everything the graph builder consumes.
#[derive(Debug, Default)]
pub struct RawDataset {
    pub nodes: Vec<RawNode>,
    pub ways: Vec<RawWay>,
    pub restrictions: Vec<RawRestriction>,
}

fn element_tags<'a>(tags: impl Iterator<Item = (&'a str, &'a str)>) -> TagMap {
    tags.map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn parse_restriction(tags: &TagMap, members: &[(String, i64, String)]) -> Option<RawRestriction> {
    let restriction = tags.get("restriction")?;
    let only = restriction.starts_with("only_");
    if !only && !restriction.starts_with("no_") {
        return None;
    }
    // conditional restrictions are not modelled
    if tags.get("restriction:conditional").is_some() {
        return None;
    }

    let mut from_way = None;
    let mut via_node = None;
    let mut to_way = None;
    for (role, id, member_type) in members {
        match (role.as_str(), member_type.as_str()) {
            ("from", "way") => from_way = Some(*id),
            ("via", "node") => via_node = Some(*id),
            ("to", "way") => to_way = Some(*id),
            _ => {}
        }
    }

    Some(RawRestriction {
        from_way: from_way?,
        via_node: via_node?,
        to_way: to_way?,
        only,
    })
}

/// Read and annotate an OSM PBF file.
///
/// Ways are collected per input block and annotated in parallel with rayon;
/// order within a block is preserved by the indexed collect.
pub fn read_pbf(path: &Path, profile: &dyn Profile) -> Result<RawDataset> {
    let reader = ElementReader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .expect("valid progress template"),
    );
    spinner.set_message("reading elements");

    let mut nodes = Vec::new();
    let mut pending_ways: Vec<(OsmWayId, Vec<OsmNodeId>, TagMap)> = Vec::new();
    let mut restrictions = Vec::new();
    let mut read = 0u64;

    reader.for_each(|element| {
        read += 1;
        if read % 1_000_000 == 0 {
            spinner.set_message(format!("{}M elements", read / 1_000_000));
            spinner.tick();
        }
        match element {
            Element::Node(node) => {
                let tags = element_tags(node.tags());
                nodes.push(RawNode {
                    osm_id: node.id(),
                    coordinate: Coordinate::from_degrees(node.lon(), node.lat()),
                    annotation: profile.process_node(&tags),
                });
            }
            Element::DenseNode(node) => {
                let tags = element_tags(node.tags());
                nodes.push(RawNode {
                    osm_id: node.id(),
                    coordinate: Coordinate::from_degrees(node.lon(), node.lat()),
                    annotation: profile.process_node(&tags),
                });
            }
            Element::Way(way) => {
                if way.tags().next().is_some() {
                    pending_ways.push((
                        way.id(),
                        way.refs().collect(),
                        element_tags(way.tags()),
                    ));
                }
            }
            Element::Relation(relation) => {
                let tags = element_tags(relation.tags());
                if tags.get("type") == Some("restriction") {
                    let members: Vec<(String, i64, String)> = relation
                        .members()
                        .map(|m| {
                            let role = m.role().unwrap_or_default().to_string();
                            let member_type = match m.member_type {
                                osmpbf::RelMemberType::Node => "node",
                                osmpbf::RelMemberType::Way => "way",
                                osmpbf::RelMemberType::Relation => "relation",
                            };
                            (role, m.member_id, member_type.to_string())
                        })
                        .collect();
                    if let Some(restriction) = parse_restriction(&tags, &members) {
                        restrictions.push(restriction);
                    }
                }
            }
        }
    })?;
    spinner.finish_with_message(format!("{read} elements read"));

    // Annotate ways in parallel; the indexed collect keeps input order.
    let ways: Vec<RawWay> = pending_ways
        .into_par_iter()
        .filter_map(|(osm_id, node_refs, tags)| {
            if node_refs.len() < 2 {
                return None;
            }
            profile.process_way(&tags).map(|annotation| RawWay {
                osm_id,
                nodes: node_refs,
                annotation,
            })
        })
        .collect();

    println!(
        "  parsed {} nodes, {} routable ways, {} restrictions",
        nodes.len(),
        ways.len(),
        restrictions.len()
    );

    Ok(RawDataset {
        nodes,
        ways,
        restrictions,
    })
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
    fn test_parse_only_restriction() {
        let t = tags(&[("type", "restriction"), ("restriction", "only_right_turn")]);
        let members = vec![
            ("from".to_string(), 10, "way".to_string()),
            ("via".to_string(), 5, "node".to_string()),
            ("to".to_string(), 11, "way".to_string()),
        ];
        let r = parse_restriction(&t, &members).unwrap();
        assert!(r.only);
        assert_eq!((r.from_way, r.via_node, r.to_way), (10, 5, 11));
    }

    #[test]
    fn test_parse_rejects_unknown_and_conditional() {
        let members = vec![
            ("from".to_string(), 1, "way".to_string()),
            ("via".to_string(), 2, "node".to_string()),
            ("to".to_string(), 3, "way".to_string()),
        ];
        assert!(parse_restriction(&tags(&[("restriction", "give_way")]), &members).is_none());
        assert!(parse_restriction(
            &tags(&[
                ("restriction", "no_left_turn"),
                ("restriction:conditional", "no_left_turn @ (Mo-Fr)"),
            ]),
            &members
        )
        .is_none());
    }

    #[test]
    fn test_parse_requires_via_node() {
        let t = tags(&[("restriction", "no_left_turn")]);
        let members = vec![
            ("from".to_string(), 1, "way".to_string()),
            ("via".to_string(), 2, "way".to_string()),
            ("to".to_string(), 3, "way".to_string()),
        ];
        assert!(parse_restriction(&t, &members).is_none());
    }
}

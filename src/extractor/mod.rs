//! Offline extraction: raw OSM data to the routing-ready table set.
//!
//! The pipeline builds the compact internal graph, compresses degree-two
//! chains, expands edges into the turn graph with guidance annotation,
//! assigns components and builds the spatial index, then persists every
//! table.

pub mod compressor;
pub mod edge_expander;
pub mod graph_builder;
pub mod guidance;
pub mod node_based_graph;
pub mod raw;
pub mod restriction_map;
pub mod scc;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::facade::internal::{build_rtree_entries, table_path, InternalDataFacade};
use crate::formats::ebg_file::{ComponentInfo, EdgeBasedNodesData};
use crate::formats::fingerprint::CRC64;
use crate::formats::names_file::NameTable;
use crate::formats::properties_file::DatasetProperties;
use crate::formats::{
    ebg_file, geometry_file, intersection_file, names_file, node_file, properties_file,
};
use crate::profile::Profile;
use crate::router::query_graph::QueryGraph;
use crate::spatial::StaticRTree;

use compressor::{compress_graph, CompressedEdgeContainer};
use edge_expander::{expand_edges, EdgeExpanderConfig, EdgeExpanderOutput};
use graph_builder::{build_graph, GraphBuilderOutput};
use guidance::lanes::LaneDescriptionRegistry;
use node_based_graph::NodeBasedGraph;
use raw::RawDataset;
use restriction_map::RestrictionMap;

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub input: PathBuf,
    /// Path of the `.osrm` base file; sibling tables get appended suffixes.
    pub output: PathBuf,
    pub small_component_size: usize,
}

/// Everything the extraction produces, before persistence.
pub struct ExtractedTables {
    pub builder: GraphBuilderOutput,
    pub expander: EdgeExpanderOutput,
    pub components: Vec<ComponentInfo>,
    pub names: NameTable,
    pub lane_descriptions: Vec<guidance::lanes::LaneDescription>,
    pub properties: DatasetProperties,
    pub compressed_chain_nodes: usize,
}

#[derive(Debug)]
pub struct ExtractSummary {
    pub node_count: usize,
    pub edge_based_node_count: u32,
    pub turn_edge_count: usize,
    pub compressed_chain_nodes: usize,
}

/// Run the in-memory part of the pipeline over an already-read dataset.
pub fn extract_tables(
    dataset: &RawDataset,
    profile: &dyn Profile,
    small_component_size: usize,
) -> Result<ExtractedTables> {
    let mut names = crate::formats::names_file::NameTableBuilder::new();
    let mut lanes = LaneDescriptionRegistry::new();

    println!("Building node-based graph...");
    let builder = build_graph(dataset, profile, &mut names, &mut lanes)?;
    println!(
        "  {} nodes, {} edges, {} restrictions ({} invalid, {} segments dropped)",
        builder.nodes.len(),
        builder.edges.len(),
        builder.restrictions.len(),
        builder.invalid_restriction_count,
        builder.dropped_edge_count,
    );

    println!("Compressing geometry chains...");
    let mut graph = NodeBasedGraph::new(builder.nodes.len(), &builder.edges);
    let mut restrictions = RestrictionMap::new(&builder.restrictions);
    let mut container = CompressedEdgeContainer::new();
    let compressed = compress_graph(&mut graph, &builder.nodes, &mut restrictions, &mut container);
    println!("  collapsed {compressed} chain nodes");

    println!("Expanding edges and annotating turns...");
    let expander = expand_edges(
        &mut graph,
        &builder.nodes,
        &container,
        &restrictions,
        &lanes,
        profile,
        &EdgeExpanderConfig {
            small_component_size,
        },
    );
    println!(
        "  {} edge-based nodes, {} turn edges, {} components",
        expander.node_count,
        expander.edges.len(),
        expander.components.component_sizes.len(),
    );

    let components: Vec<ComponentInfo> = (0..expander.node_count)
        .map(|node| ComponentInfo {
            id: expander.components.component_ids[node as usize],
            is_tiny: expander.components.is_tiny(node),
        })
        .collect();

    // dataset checksum ties hints to this exact graph
    let mut digest = CRC64.digest();
    digest.update(&expander.node_count.to_le_bytes());
    for edge in &expander.edges {
        digest.update(&edge.source.to_le_bytes());
        digest.update(&edge.target.to_le_bytes());
        digest.update(&edge.weight.to_le_bytes());
    }
    let checksum = (digest.finalize() & 0xFFFF_FFFF) as u32;

    Ok(ExtractedTables {
        properties: DatasetProperties {
            profile_name: profile.name().to_string(),
            properties: profile.properties(),
            checksum,
        },
        names: names.build(),
        lane_descriptions: lanes.descriptions().to_vec(),
        builder,
        expander,
        components,
        compressed_chain_nodes: compressed,
    })
}

/// Persist every table of an extraction under the `.osrm` base path.
pub fn write_tables(output: &PathBuf, tables: &ExtractedTables, timestamp: &str) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    node_file::write(output, &tables.builder.nodes, &tables.builder.edges)?;
    crate::formats::restrictions_file::write(
        table_path(output, ".restrictions"),
        &tables.builder.restrictions,
    )?;
    names_file::write(table_path(output, ".names"), &tables.names)?;
    geometry_file::write(table_path(output, ".geometry"), &tables.expander.geometry)?;
    ebg_file::write_nodes(
        table_path(output, ".nodes"),
        &EdgeBasedNodesData {
            node_data: tables.expander.node_data.clone(),
            components: tables.components.clone(),
            segments: tables.expander.segments.clone(),
        },
    )?;
    ebg_file::write_edges(table_path(output, ".ebg"), &tables.expander.edges)?;
    ebg_file::write_turn_data(table_path(output, ".edges"), &tables.expander.turn_data)?;
    intersection_file::write_classes(
        table_path(output, ".icd"),
        &intersection_file::IntersectionClasses {
            bearing_classes: tables.expander.bearing_classes.clone(),
            entry_classes: tables.expander.entry_classes.clone(),
        },
    )?;
    intersection_file::write_lane_descriptions(
        table_path(output, ".tld"),
        &tables.lane_descriptions,
    )?;

    let rtree = StaticRTree::build(build_rtree_entries(
        &tables.expander.segments,
        &tables.builder.nodes,
    ));
    rtree.write(
        table_path(output, ".fileIndex"),
        table_path(output, ".ramIndex"),
    )?;

    properties_file::write(table_path(output, ".properties"), &tables.properties)?;
    properties_file::write_timestamp(table_path(output, ".timestamp"), timestamp)?;
    Ok(())
}

/// The `extract` command: read, transform, persist.
pub fn run_extract(config: &ExtractorConfig, profile: &dyn Profile) -> Result<ExtractSummary> {
    let start = Instant::now();

    println!("Reading {}...", config.input.display());
    let dataset = raw::read_pbf(&config.input, profile)
        .with_context(|| format!("reading {}", config.input.display()))?;

    let tables = extract_tables(&dataset, profile, config.small_component_size)?;

    println!("Writing tables to {}...", config.output.display());
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs()
        .to_string();
    write_tables(&config.output, &tables, &timestamp)?;

    let summary = ExtractSummary {
        node_count: tables.builder.nodes.len(),
        edge_based_node_count: tables.expander.node_count,
        turn_edge_count: tables.expander.edges.len(),
        compressed_chain_nodes: tables.compressed_chain_nodes,
    };
    println!(
        "Extraction finished in {:.2}s: {} nodes, {} edge-based nodes, {} turns",
        start.elapsed().as_secs_f64(),
        summary.node_count,
        summary.edge_based_node_count,
        summary.turn_edge_count,
    );
    Ok(summary)
}

/// Assemble an in-process facade straight from extracted tables; used by
/// tests and by `routed` when pointed at a dataset that was just extracted
/// in the same process.
pub fn build_facade(tables: ExtractedTables, timestamp: String) -> InternalDataFacade {
    let graph = QueryGraph::from_edge_based_graph(
        tables.expander.node_count,
        &tables.expander.edges,
    );
    InternalDataFacade::from_parts(
        graph,
        tables.expander.node_data,
        tables.components,
        tables.expander.segments,
        tables.expander.turn_data,
        tables.expander.geometry,
        tables.names,
        tables.builder.nodes,
        tables.lane_descriptions,
        tables.expander.bearing_classes,
        tables.expander.entry_classes,
        tables.properties,
        timestamp,
    )
}

//! Command line interface: extract, datastore, routed.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::extractor::{run_extract, ExtractorConfig};
use crate::facade::internal::{table_path, InternalDataFacade};
use crate::profile::CarProfile;
use crate::server::{run_server, ServerConfig};

#[derive(Parser)]
#[command(name = "waymark")]
#[command(about = "Edge-expanded OSM routing engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Worker threads for parallel stages (default: hardware concurrency)
    #[arg(long, global = true)]
    pub threads: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transform an OSM PBF file into the routing table set
    Extract {
        /// Input .osm.pbf file
        input: PathBuf,

        /// Routing profile (currently: car)
        #[arg(long, default_value = "car")]
        profile: String,

        /// Output base path; defaults to the input with an .osrm extension
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Components smaller than this are avoided when snapping
        #[arg(long, default_value_t = crate::extractor::scc::DEFAULT_SMALL_COMPONENT_SIZE)]
        small_component_size: usize,
    },

    /// Validate a dataset and publish it for running services
    Datastore {
        /// Path to the .osrm base file
        base: PathBuf,

        /// Publish into this directory instead of validating in place
        #[arg(long)]
        target: Option<PathBuf>,
    },

    /// Serve routing queries over HTTP
    Routed {
        /// Path to the .osrm base file
        base: PathBuf,

        #[arg(long, default_value = "0.0.0.0")]
        ip: String,

        #[arg(long, default_value_t = 5000)]
        port: u16,

        /// Per-request wall clock bound in seconds
        #[arg(long, default_value_t = 60)]
        request_timeout: u64,
    },
}

/// The table suffixes a complete dataset consists of.
const DATASET_SUFFIXES: &[&str] = &[
    "",
    ".restrictions",
    ".names",
    ".geometry",
    ".nodes",
    ".ebg",
    ".edges",
    ".icd",
    ".tld",
    ".fileIndex",
    ".ramIndex",
    ".properties",
    ".timestamp",
];

fn run_datastore(base: &PathBuf, target: Option<&PathBuf>) -> Result<()> {
    println!("Validating dataset {}...", base.display());
    let facade = InternalDataFacade::load(base).context("dataset failed validation")?;
    println!(
        "  ok: {} edge-based nodes, checksum {:08x}",
        crate::facade::DataFacade::edge_based_node_count(&facade),
        crate::facade::DataFacade::data_checksum(&facade),
    );

    let Some(target) = target else {
        return Ok(());
    };
    std::fs::create_dir_all(target)?;
    let file_name = base
        .file_name()
        .context("dataset path has no file name")?
        .to_string_lossy()
        .to_string();
    let published_base = target.join(&file_name);

    // copy every table under a temporary name, then rename; the timestamp
    // goes last so a polling reader never sees a half-published set
    for &suffix in DATASET_SUFFIXES {
        if suffix == ".timestamp" {
            continue;
        }
        let source = table_path(base, suffix);
        let staged = table_path(&target.join(format!(".{file_name}.staged")), suffix);
        let destination = table_path(&published_base, suffix);
        std::fs::copy(&source, &staged)
            .with_context(|| format!("staging {}", source.display()))?;
        std::fs::rename(&staged, &destination)
            .with_context(|| format!("publishing {}", destination.display()))?;
    }
    std::fs::copy(
        table_path(base, ".timestamp"),
        table_path(&published_base, ".timestamp"),
    )?;
    println!("Published to {}", published_base.display());
    Ok(())
}

pub fn run(cli: Cli) -> Result<()> {
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure the thread pool")?;
    }

    match cli.command {
        Commands::Extract {
            input,
            profile,
            output,
            small_component_size,
        } => {
            if profile != "car" {
                bail!("unknown profile '{profile}'");
            }
            let output = output.unwrap_or_else(|| {
                let mut base = input.clone();
                // "map.osm.pbf" -> "map.osrm"
                let stem = base
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let stem = stem
                    .trim_end_matches(".pbf")
                    .trim_end_matches(".bz2")
                    .trim_end_matches(".osm")
                    .to_string();
                base.set_file_name(format!("{stem}.osrm"));
                base
            });
            let profile = CarProfile::new();
            run_extract(
                &ExtractorConfig {
                    input,
                    output,
                    small_component_size,
                },
                &profile,
            )?;
            Ok(())
        }
        Commands::Datastore { base, target } => run_datastore(&base, target.as_ref()),
        Commands::Routed {
            base,
            ip,
            port,
            request_timeout,
        } => {
            let config = ServerConfig {
                ip,
                port,
                request_timeout: Duration::from_secs(request_timeout),
                ..Default::default()
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start the async runtime")?;
            runtime.block_on(run_server(&base, config))
        }
    }
}

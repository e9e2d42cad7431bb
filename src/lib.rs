//! waymark: an edge-expanded OSM routing engine.
//!
//! Pipeline:
//! - Extraction - raw nodes/ways/restrictions to a compact internal graph
//! - Compression - degree-two chains fold into packed geometries
//! - Edge expansion - directed edges become nodes, legal turns become edges
//! - Guidance annotation - every turn edge gets an instruction and lanes
//! - Spatial index - paged R-tree over snappable segments
//! - Query - bidirectional search with stall-on-demand over the turn graph,
//!   tables, map matching and trips, served over HTTP with turn-by-turn
//!   steps
//!
//! The edge-based graph is the single source of truth for routing; guidance
//! reads its own side tables keyed by the same ids.

pub mod cli;
pub mod extractor;
pub mod facade;
pub mod formats;
pub mod geo;
pub mod guidance;
pub mod profile;
pub mod router;
pub mod server;
pub mod spatial;
pub mod types;

pub use extractor::{run_extract, ExtractorConfig};
pub use facade::{DataFacade, InternalDataFacade, SharedDataFacade};
pub use profile::{CarProfile, Profile};
pub use router::{PhantomNode, QueryGraph, RoutingResult};

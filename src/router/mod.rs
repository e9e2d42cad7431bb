//! Online query engine: phantom resolution, bidirectional search, tables,
//! map matching and trip optimization over the edge-based graph.

pub mod many_to_many;
pub mod matching;
pub mod phantom;
pub mod query_graph;
pub mod search;
pub mod trip;

pub use many_to_many::many_to_many as table;
pub use phantom::{PhantomCandidate, PhantomNode};
pub use query_graph::{QueryEdgeData, QueryGraph};
pub use search::{shortest_path, RoutingResult, SearchContext};

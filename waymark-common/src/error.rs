//! Error taxonomy for waymark queries and data loading.
//!
//! Every failure that can cross the engine boundary is a `(Status, message)`
//! pair. The HTTP layer maps `Status` to a response code; the offline
//! pipeline only ever sees `DataMissing` and `Exception`.

use std::fmt;

use serde::Serialize;

/// Machine-readable status code attached to every engine error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    /// Malformed URL or invalid parameter combination.
    InvalidOptions,
    /// No snappable segment within the search radius.
    NoSegment,
    /// Source and target are not connected.
    NoRoute,
    /// No matching found for the input trace.
    NoMatch,
    /// No trip visiting all waypoints exists.
    NoTrips,
    /// Request exceeds a configured size limit.
    TooBig,
    /// A persisted table is missing or failed its checksum.
    DataMissing,
    /// Allocation failure, IO error, or another internal fault.
    Exception,
}

impl Status {
    /// HTTP status the front-end should answer with.
    pub fn http_code(self) -> u16 {
        match self {
            Status::InvalidOptions
            | Status::NoSegment
            | Status::NoRoute
            | Status::NoMatch
            | Status::NoTrips
            | Status::TooBig => 400,
            Status::DataMissing | Status::Exception => 500,
        }
    }

    /// Wire name used in the JSON `code` field.
    pub fn code(self) -> &'static str {
        match self {
            Status::InvalidOptions => "InvalidOptions",
            Status::NoSegment => "NoSegment",
            Status::NoRoute => "NoRoute",
            Status::NoMatch => "NoMatch",
            Status::NoTrips => "NoTrips",
            Status::TooBig => "TooBig",
            Status::DataMissing => "DataMissing",
            Status::Exception => "Exception",
        }
    }
}

/// An engine-level failure: status code plus a human-readable message.
#[derive(Debug)]
pub struct EngineError {
    pub status: Status,
    pub message: String,
}

impl EngineError {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Malformed request input, reporting the byte position of the first
    /// character that could not be parsed.
    pub fn invalid_options_at(position: usize, detail: impl fmt::Display) -> Self {
        Self::new(
            Status::InvalidOptions,
            format!("invalid input at position {position}: {detail}"),
        )
    }

    pub fn no_segment(detail: impl Into<String>) -> Self {
        Self::new(Status::NoSegment, detail)
    }

    pub fn no_route() -> Self {
        Self::new(Status::NoRoute, "no route between the given coordinates")
    }

    pub fn too_big(limit: usize, got: usize) -> Self {
        Self::new(
            Status::TooBig,
            format!("request exceeds the limit of {limit} locations (got {got})"),
        )
    }

    pub fn data_missing(detail: impl Into<String>) -> Self {
        Self::new(Status::DataMissing, detail)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.code(), self.message)
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::new(Status::Exception, err.to_string())
    }
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

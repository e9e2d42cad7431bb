//! Turn-by-turn guidance: assembling raw steps from an unpacked path and
//! rewriting them into the final instruction list.

pub mod assemble;
pub mod post_processing;
pub mod step;

pub use assemble::assemble_leg;
pub use post_processing::post_process_leg;
pub use step::{Leg, LegGeometry, RouteStep, StepIntersection, StepManeuver, WaypointType};

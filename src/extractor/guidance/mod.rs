//! Guidance annotation: intersection classification, turn instructions,
//! roundabouts and lane assignment, run per intersection during edge
//! expansion.

pub mod classify;
pub mod intersection;
pub mod lanes;
pub mod roundabouts;
pub mod turn_instruction;

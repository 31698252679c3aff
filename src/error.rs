// src/error.rs
use thiserror::Error;

/// Errors surfaced by the motion planning core.
///
/// Fatal planner conditions abort the current plan; the queue should be
/// reset before further use. Filter configuration errors leave the filter in
/// its previous state.
#[derive(Debug, Error, PartialEq)]
pub enum MotionError {
    #[error("invalid move parameters: {reason}")]
    BadMoveParams { reason: String },

    #[error("smoothed pass exhausted with {deferred} moves still deferred")]
    SmoothedPassExhaustion { deferred: usize },

    #[error("velocity discontinuity at move boundary: prev {prev_end_v} vs next {start_v}")]
    VelocityDiscontinuity { prev_end_v: f64, start_v: f64 },

    #[error("impossible move: ramps overrun {move_d}mm move by {overrun}mm")]
    ImpossibleMove { move_d: f64, overrun: f64 },

    #[error("no planned move available")]
    EmptyQueue,

    #[error("unknown input shaper type: {name}")]
    InvalidShaper { name: String },

    #[error("axis {axis} is not active for this stepper")]
    InactiveAxis { axis: char },
}

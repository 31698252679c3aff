// src/lib.rs - Look-ahead motion planning core
//!
//! Host-side motion planning for 3D printing: a look-ahead move queue that
//! turns geometric moves into jerk-limited Bezier S-curve trapezoids, a
//! time-indexed trajectory queue, and the convolution filters (axis
//! smoothing, pressure advance, input shaping) that compute per-stepper
//! positions at arbitrary times.
//!
//! The planner is synchronous and single-threaded; callers drive it with
//! `MoveQueue::add` / `plan` / `getmove` (or through `LookaheadPipeline`)
//! and must serialise access to a queue pair themselves.

pub mod config;
pub mod error;
pub mod motion;

pub use config::MotionConfig;
pub use error::MotionError;
pub use motion::{
    Coord, LookaheadPipeline, MoveParams, MoveQueue, TrapAccelDecel, TrapQueue,
};

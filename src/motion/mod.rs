// src/motion/mod.rs

// --- Submodules ---
pub mod accel_combine;
pub mod accel_group;
pub mod kinematics;
pub mod moveq;
pub mod scurve;
pub mod smoother;
pub mod trapq;
pub mod vtrap;


// --- Re-exports for external use ---
pub use accel_group::{AccelGroup, RampSide};
pub use kinematics::{
    extruder::ExtruderKinematics, shaper::InputShaper, shaper::ShaperType,
    smooth_axis::SmoothAxis, CartesianAxis, PositionHook, StepperKinematics,
};
pub use moveq::{MoveParams, MoveQueue, TrapAccelDecel};
pub use scurve::SCurve;
pub use smoother::Smoother;
pub use trapq::{Coord, PullMove, TrajMove, TrapQueue};

use crate::error::MotionError;

/// Convenience wiring of a move queue onto a trajectory queue.
///
/// Owns the running print time and toolhead position so callers can feed
/// geometric moves on one side and query stepper positions on the other.
#[derive(Debug)]
pub struct LookaheadPipeline {
    pub moveq: MoveQueue,
    pub trapq: TrapQueue,
    print_time: f64,
    position: Coord,
}

impl Default for LookaheadPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl LookaheadPipeline {
    pub fn new() -> LookaheadPipeline {
        LookaheadPipeline {
            moveq: MoveQueue::new(),
            trapq: TrapQueue::new(),
            print_time: 0.0,
            position: Coord::default(),
        }
    }

    pub fn with_config(config: &crate::config::MotionConfig) -> LookaheadPipeline {
        LookaheadPipeline {
            moveq: MoveQueue::with_queue_bound(config.lookahead_bound),
            ..LookaheadPipeline::new()
        }
    }

    pub fn print_time(&self) -> f64 {
        self.print_time
    }

    pub fn position(&self) -> Coord {
        self.position
    }

    /// Queue a straight-line move with the given limits.
    pub fn queue_move(&mut self, params: &MoveParams) -> Result<(), MotionError> {
        tracing::debug!(move_d = params.move_d, "queueing move");
        self.moveq.add(params)
    }

    /// Plan and materialise everything flushable along `axes_r`; returns
    /// the count of moves appended to the trajectory.
    pub fn flush(&mut self, lazy: bool, axes_r: Coord) -> Result<usize, MotionError> {
        self.moveq.plan(lazy)?;
        let mut emitted = 0;
        while self.moveq.flushed() > 0 {
            let (ad, duration) = self.moveq.getmove()?;
            self.trapq
                .append(self.print_time, self.position, axes_r, &ad);
            let dist = ad.accel_scurve().map_or(0.0, |s| s.eval(ad.accel_t))
                + ad.cruise_v * ad.cruise_t
                + ad.decel_scurve().map_or(0.0, |s| s.eval(ad.decel_t));
            self.position = Coord::new(
                self.position.x + axes_r.x * dist,
                self.position.y + axes_r.y * dist,
                self.position.z + axes_r.z * dist,
            );
            self.print_time += duration;
            emitted += 1;
        }
        Ok(emitted)
    }

    /// Drop trajectory segments ending at or before `print_time`.
    pub fn retire(&mut self, print_time: f64) {
        self.trapq.free_moves(print_time);
    }
}

// src/motion/kinematics/mod.rs
//! Stepper position hooks and the convolution filters that wrap them.
//!
//! A hook answers one question: where is this stepper at a given time within
//! a trajectory segment. Filters wrap a base hook, rewrite the coordinates
//! (smoothing, pressure advance, input shaping) and delegate through a
//! synthesised scratch segment, so arbitrary kinematics compose with any
//! filter stack.

pub mod extruder;
pub mod shaper;
pub mod smooth_axis;

use super::scurve::SCurve;
use super::smoother::Smoother;
use super::trapq::{Coord, TrajMove, TrapQueue};

/// Local time used when delegating through a synthesised scratch segment.
pub const DUMMY_T: f64 = 500.0;

pub const AXIS_X: u8 = 1 << 0;
pub const AXIS_Y: u8 = 1 << 1;
pub const AXIS_Z: u8 = 1 << 2;

/// Bitset of axes a stepper's position depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisFlags(pub u8);

impl AxisFlags {
    pub fn has(self, axis: usize) -> bool {
        self.0 & (1 << axis) != 0
    }
}

/// Per-stepper position calculation with optional look-around windows.
pub trait PositionHook {
    /// Stepper position at `move_time` within segment `idx` of `tq`.
    fn calc_position(&mut self, tq: &TrapQueue, idx: usize, move_time: f64) -> f64;

    /// Position from a standalone synthesised segment; filter wrappers call
    /// this on their inner hook with smoothed coordinates.
    fn calc_scratch(&mut self, m: &TrajMove, move_time: f64) -> f64;

    fn active_flags(&self) -> AxisFlags;

    /// How far before a segment the hook may read when generating steps.
    fn gen_steps_pre_active(&self) -> f64 {
        0.0
    }

    /// How far after a segment the hook may read.
    fn gen_steps_post_active(&self) -> f64 {
        0.0
    }
}

/// Boxed hook, the unit the step generator works with.
pub type StepperKinematics = Box<dyn PositionHook + Send>;

/// Plain Cartesian hook: the stepper follows one axis directly.
#[derive(Debug, Clone, Copy)]
pub struct CartesianAxis {
    axis: usize,
}

impl CartesianAxis {
    pub fn new(axis: usize) -> CartesianAxis {
        CartesianAxis { axis }
    }
}

impl PositionHook for CartesianAxis {
    fn calc_position(&mut self, tq: &TrapQueue, idx: usize, move_time: f64) -> f64 {
        self.calc_scratch(tq.get(idx), move_time)
    }

    fn calc_scratch(&mut self, m: &TrajMove, move_time: f64) -> f64 {
        m.get_coord(move_time).axis(self.axis)
    }

    fn active_flags(&self) -> AxisFlags {
        AxisFlags(1 << self.axis)
    }
}

/// Synthesise a stationary scratch segment at the given coordinates.
pub(crate) fn scratch_move(pos: Coord) -> TrajMove {
    TrajMove {
        print_time: 0.0,
        move_t: 2.0 * DUMMY_T,
        start_pos: pos,
        axes_r: Coord::default(),
        s: SCurve::default(),
        accel_comp: 0.0,
    }
}

/// Smoothed axis position: the weighted integral of the trajectory over the
/// kernel window centred at absolute time `time`, with optional first and
/// second derivative terms folded into each segment's polynomial.
pub(crate) fn range_integrate(
    tq: &TrapQueue,
    hint: usize,
    axis: usize,
    time: f64,
    sm: &Smoother,
    deriv_r: f64,
    deriv2_r: f64,
) -> f64 {
    let start = time - sm.hst;
    let end = time + sm.hst;
    let (mut idx, _) = tq.find_move(hint, start);
    let mut res = 0.0;
    let mut t_abs = start;
    while t_abs < end {
        let m = tq.get(idx);
        let seg_end = (m.print_time + m.move_t).min(end);
        let lo = t_abs - m.print_time;
        let hi = seg_end - m.print_time;
        let r = m.axes_r.axis(axis);
        let base = m.s.copy_scaled(r);
        let mut sa = base;
        let mut pos = m.start_pos.axis(axis);
        if deriv_r != 0.0 {
            pos += sa.add_deriv(&base, deriv_r);
        }
        if deriv2_r != 0.0 {
            // Larger compensation would drive velocity negative inside the
            // ramp; clamp to the admissible bound for this segment.
            let bound = super::scurve::max_accel_comp(6, m.s.total_accel_t);
            pos += sa.add_2nd_deriv(&base, deriv2_r.clamp(-bound, bound));
        }
        let toff = m.print_time - time;
        res += sm.integrate_weighted(pos, &sa, lo, hi, toff);
        t_abs = seg_end;
        if idx < tq.tail_index() {
            idx += 1;
        } else {
            break;
        }
    }
    res * sm.inv_norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::moveq::TrapAccelDecel;

    #[test]
    fn cartesian_axis_reads_segment_coordinates() {
        let mut tq = TrapQueue::new();
        let ad = TrapAccelDecel {
            cruise_t: 1.0,
            cruise_v: 10.0,
            accel_order: 2,
            ..TrapAccelDecel::default()
        };
        tq.append(0.0, Coord::new(1.0, 2.0, 3.0), Coord::new(1.0, 0.0, 0.0), &ad);
        let mut x = CartesianAxis::new(0);
        let mut y = CartesianAxis::new(1);
        let idx = tq.first_index().unwrap();
        assert!((x.calc_position(&tq, idx, 0.5) - 6.0).abs() < 1e-12);
        assert!((y.calc_position(&tq, idx, 0.5) - 2.0).abs() < 1e-12);
        assert!(x.active_flags().has(0));
        assert!(!x.active_flags().has(1));
    }

    #[test]
    fn range_integrate_reproduces_linear_trajectories() {
        let mut tq = TrapQueue::new();
        let ad = TrapAccelDecel {
            cruise_t: 1.0,
            cruise_v: 50.0,
            accel_order: 2,
            ..TrapAccelDecel::default()
        };
        tq.append(0.0, Coord::default(), Coord::new(1.0, 0.0, 0.0), &ad);
        let sm = Smoother::new(0.01);
        // Interior times of a constant-velocity trajectory are fixed points.
        for &t in &[0.05, 0.3, 0.77] {
            let got = range_integrate(&tq, 1, 0, t, &sm, 0.0, 0.0);
            assert!((got - 50.0 * t).abs() < 1e-9, "t={} got={}", t, got);
        }
    }
}

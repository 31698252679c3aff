// src/motion/kinematics/smooth_axis.rs
//! X/Y axis smoothing filter.
//!
//! Replaces the commanded toolhead position with its weighted average over a
//! short window, independently per axis, before handing the coordinates to
//! the wrapped kinematics. Optional damping and acceleration compensation
//! terms are folded into each segment polynomial prior to integration.

use super::super::smoother::Smoother;
use super::super::trapq::{Coord, TrapQueue};
use super::{range_integrate, scratch_move, AxisFlags, PositionHook, DUMMY_T};
use crate::error::MotionError;

pub struct SmoothAxis {
    orig: Box<dyn PositionHook + Send>,
    smoothers: [Smoother; 2],
    damping_comp: [f64; 2],
    accel_comp: [f64; 2],
}

impl SmoothAxis {
    pub fn new(orig: Box<dyn PositionHook + Send>) -> SmoothAxis {
        SmoothAxis {
            orig,
            smoothers: [Smoother::default(); 2],
            damping_comp: [0.0; 2],
            accel_comp: [0.0; 2],
        }
    }

    /// Configure the smoothing window per axis; the window half-width is
    /// half the given smooth time. Zero disables smoothing on that axis.
    pub fn set_smooth_time(&mut self, smooth_x: f64, smooth_y: f64) {
        self.smoothers[0] = Smoother::new(0.5 * smooth_x);
        self.smoothers[1] = Smoother::new(0.5 * smooth_y);
    }

    pub fn set_damping_comp(&mut self, axis: usize, comp: f64) -> Result<(), MotionError> {
        self.check_axis(axis)?;
        self.damping_comp[axis] = comp;
        Ok(())
    }

    pub fn set_accel_comp(&mut self, axis: usize, comp: f64) -> Result<(), MotionError> {
        self.check_axis(axis)?;
        self.accel_comp[axis] = comp;
        Ok(())
    }

    fn check_axis(&self, axis: usize) -> Result<(), MotionError> {
        if axis > 1 || !self.orig.active_flags().has(axis) {
            return Err(MotionError::InactiveAxis {
                axis: if axis == 0 { 'x' } else { 'y' },
            });
        }
        Ok(())
    }

    fn smoothed_axis(&self, tq: &TrapQueue, idx: usize, time: f64, axis: usize) -> f64 {
        let sm = &self.smoothers[axis];
        // Per-move acceleration compensation takes precedence over the
        // filter-wide setting.
        let move_comp = tq.get(idx).accel_comp;
        let comp = if move_comp != 0.0 {
            move_comp
        } else {
            self.accel_comp[axis]
        };
        range_integrate(tq, idx, axis, time, sm, self.damping_comp[axis], comp)
    }
}

impl PositionHook for SmoothAxis {
    fn calc_position(&mut self, tq: &TrapQueue, idx: usize, move_time: f64) -> f64 {
        let m = tq.get(idx);
        let time = m.print_time + move_time;
        let raw = m.get_coord(move_time);
        let flags = self.orig.active_flags();
        let mut pos = raw;
        for axis in 0..2 {
            if self.smoothers[axis].enabled() && flags.has(axis) {
                let v = self.smoothed_axis(tq, idx, time, axis);
                match axis {
                    0 => pos.x = v,
                    _ => pos.y = v,
                }
            }
        }
        let scratch = scratch_move(Coord::new(pos.x, pos.y, raw.z));
        self.orig.calc_scratch(&scratch, DUMMY_T)
    }

    fn calc_scratch(&mut self, m: &super::super::trapq::TrajMove, move_time: f64) -> f64 {
        self.orig.calc_scratch(m, move_time)
    }

    fn active_flags(&self) -> AxisFlags {
        self.orig.active_flags()
    }

    fn gen_steps_pre_active(&self) -> f64 {
        let hst = self.smoothers[0].hst.max(self.smoothers[1].hst);
        hst + self.orig.gen_steps_pre_active()
    }

    fn gen_steps_post_active(&self) -> f64 {
        let hst = self.smoothers[0].hst.max(self.smoothers[1].hst);
        hst + self.orig.gen_steps_post_active()
    }
}

#[cfg(test)]
mod tests {
    use super::super::CartesianAxis;
    use super::*;
    use crate::motion::moveq::TrapAccelDecel;
    use crate::motion::trapq::Coord;

    fn cruise_queue(v: f64, t: f64) -> TrapQueue {
        let mut tq = TrapQueue::new();
        let ad = TrapAccelDecel {
            cruise_t: t,
            cruise_v: v,
            accel_order: 2,
            ..TrapAccelDecel::default()
        };
        tq.append(0.0, Coord::default(), Coord::new(1.0, 0.0, 0.0), &ad);
        tq
    }

    #[test]
    fn linear_trajectory_is_unchanged_by_smoothing() {
        let tq = cruise_queue(50.0, 1.0);
        let mut sa = SmoothAxis::new(Box::new(CartesianAxis::new(0)));
        sa.set_smooth_time(0.02, 0.02);
        let idx = tq.first_index().unwrap();
        for &t in &[0.1, 0.5, 0.9] {
            let got = sa.calc_position(&tq, idx, t);
            assert!((got - 50.0 * t).abs() < 1e-12, "t={} got={}", t, got);
        }
    }

    #[test]
    fn disabled_axis_passes_through() {
        let tq = cruise_queue(50.0, 1.0);
        let mut sa = SmoothAxis::new(Box::new(CartesianAxis::new(0)));
        let idx = tq.first_index().unwrap();
        let got = sa.calc_position(&tq, idx, 0.5);
        assert!((got - 25.0).abs() < 1e-12);
    }

    #[test]
    fn inactive_axis_configuration_is_rejected() {
        let mut sa = SmoothAxis::new(Box::new(CartesianAxis::new(0)));
        assert!(sa.set_damping_comp(1, 0.01).is_err());
        assert!(sa.set_accel_comp(0, 0.01).is_ok());
    }

    #[test]
    fn smoothing_rounds_a_velocity_corner() {
        // Corner between accel and cruise: averaging the convex accel side
        // pulls the smoothed position slightly ahead of the commanded one.
        let mut tq = TrapQueue::new();
        let accel_t = 0.1;
        let ad = TrapAccelDecel {
            accel_t,
            total_accel_t: accel_t,
            cruise_t: 0.5,
            cruise_v: 100.0,
            effective_accel: 1000.0,
            accel_order: 2,
            ..TrapAccelDecel::default()
        };
        tq.append(0.0, Coord::default(), Coord::new(1.0, 0.0, 0.0), &ad);
        let mut sa = SmoothAxis::new(Box::new(CartesianAxis::new(0)));
        sa.set_smooth_time(0.04, 0.04);
        let idx = tq.first_index().unwrap();
        let commanded = tq.get(idx).get_coord(accel_t).x;
        let smoothed = sa.calc_position(&tq, idx, accel_t);
        assert!(smoothed > commanded);
        assert!((smoothed - commanded).abs() < 0.5);
    }
}

// src/motion/kinematics/extruder.rs
//! Extruder pressure-advance filter.
//!
//! The extruder follows the nominal filament position plus a term
//! proportional to extrusion velocity, smoothed over a short window so the
//! velocity term cannot demand step rates the motor cannot deliver. With a
//! zero smooth time the stepper follows the raw trajectory.

use super::super::smoother::Smoother;
use super::super::trapq::{TrajMove, TrapQueue};
use super::{range_integrate, AxisFlags, PositionHook, AXIS_X};

pub struct ExtruderKinematics {
    pressure_advance: f64,
    smoother: Smoother,
}

impl Default for ExtruderKinematics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtruderKinematics {
    pub fn new() -> ExtruderKinematics {
        ExtruderKinematics {
            pressure_advance: 0.0,
            smoother: Smoother::default(),
        }
    }

    /// Configure the advance coefficient (seconds of velocity lead) and the
    /// smoothing window. A zero `smooth_time` disables both.
    pub fn set_pressure_advance(&mut self, pressure_advance: f64, smooth_time: f64) {
        self.pressure_advance = pressure_advance;
        self.smoother = Smoother::new(0.5 * smooth_time);
    }
}

impl PositionHook for ExtruderKinematics {
    fn calc_position(&mut self, tq: &TrapQueue, idx: usize, move_time: f64) -> f64 {
        let m = tq.get(idx);
        if !self.smoother.enabled() {
            return m.start_pos.x + m.axes_r.x * m.get_distance(move_time);
        }
        let time = m.print_time + move_time;
        range_integrate(tq, idx, 0, time, &self.smoother, self.pressure_advance, 0.0)
    }

    fn calc_scratch(&mut self, m: &TrajMove, move_time: f64) -> f64 {
        m.get_coord(move_time).x
    }

    fn active_flags(&self) -> AxisFlags {
        AxisFlags(AXIS_X)
    }

    fn gen_steps_pre_active(&self) -> f64 {
        self.smoother.hst
    }

    fn gen_steps_post_active(&self) -> f64 {
        self.smoother.hst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::moveq::TrapAccelDecel;
    use crate::motion::trapq::Coord;

    fn extrude_queue(v: f64, t: f64) -> TrapQueue {
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
    fn disabled_filter_follows_raw_position() {
        let tq = extrude_queue(5.0, 1.0);
        let mut ek = ExtruderKinematics::new();
        let idx = tq.first_index().unwrap();
        assert!((ek.calc_position(&tq, idx, 0.4) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn steady_extrusion_gets_a_constant_velocity_lead() {
        let tq = extrude_queue(5.0, 1.0);
        let mut ek = ExtruderKinematics::new();
        ek.set_pressure_advance(0.05, 0.04);
        let idx = tq.first_index().unwrap();
        // In steady state the advance is exactly pa * v.
        let got = ek.calc_position(&tq, idx, 0.5);
        assert!((got - (2.5 + 0.05 * 5.0)).abs() < 1e-9, "got {}", got);
    }

    #[test]
    fn advance_fades_at_the_end_of_extrusion() {
        let tq = extrude_queue(5.0, 1.0);
        let mut ek = ExtruderKinematics::new();
        ek.set_pressure_advance(0.05, 0.04);
        let idx = tq.first_index().unwrap();
        // Past the end of the move the velocity term dies off; the filter
        // settles on the final filament position.
        let settled = ek.calc_position(&tq, idx, 0.999);
        assert!(settled < 5.0 + 0.05 * 5.0);
        assert!(settled > 4.9);
    }
}

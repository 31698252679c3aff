// src/motion/accel_group.rs
//! Acceleration groups: the limits and derived quantities of one ramp.
//!
//! A ramp may span several queued moves combined at a junction. The group
//! tracks the combined distance covered so far, the accel/jerk limits still
//! in force, and once a trapezoid is closed, the per-move slice of the ramp
//! timing.

use super::scurve::SCurve;

/// Comparison slack used throughout the planner.
pub const EPSILON: f64 = 1e-9;

/// Which of a move's two ramps a chain reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampSide {
    Accel,
    Decel,
}

/// Reference to the ramp group of another queued move.
///
/// Combined ramps always cover a contiguous run of queue slots, so the chain
/// is fully described by the index of its origin move; no per-link pointers
/// are needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampRef {
    pub idx: usize,
    pub side: RampSide,
}

/// One ramp's limits and derived state.
#[derive(Debug, Clone, Copy)]
pub struct AccelGroup {
    pub accel_order: u8,
    pub max_accel: f64,
    pub min_accel: f64,
    pub max_jerk: f64,
    pub min_jerk_limit_time: f64,
    pub accel_comp: f64,

    /// Total distance covered by the combined ramp so far.
    pub combined_d: f64,
    /// Ramp distance consumed inside the owning move.
    pub accel_d: f64,

    /// Ramp timing of the owning move's slice.
    pub accel_t: f64,
    pub accel_offset_t: f64,
    pub total_accel_t: f64,

    /// Velocity at the slow end of the full ramp.
    pub start_accel_v: f64,
    /// Mean acceleration of the materialised ramp.
    pub effective_accel: f64,

    /// Velocity cap at the ramp's slow end (junction entry).
    pub max_start_v: f64,
    pub max_start_v2: f64,
    /// Velocity squared reachable at the fast end over `combined_d`.
    pub max_end_v2: f64,

    /// Origin move of the combined ramp this group belongs to.
    pub start_accel: Option<RampRef>,
}

impl AccelGroup {
    /// Default group for a freshly queued move.
    pub fn fill(
        accel_order: u8,
        accel: f64,
        jerk: f64,
        min_jerk_limit_time: f64,
        accel_comp: f64,
    ) -> AccelGroup {
        let min_accel = (jerk * min_jerk_limit_time / 6.0).min(accel);
        AccelGroup {
            accel_order,
            max_accel: accel,
            min_accel,
            max_jerk: jerk,
            min_jerk_limit_time,
            accel_comp,
            combined_d: 0.0,
            accel_d: 0.0,
            accel_t: 0.0,
            accel_offset_t: 0.0,
            total_accel_t: 0.0,
            start_accel_v: 0.0,
            effective_accel: 0.0,
            max_start_v: 0.0,
            max_start_v2: 0.0,
            max_end_v2: 0.0,
            start_accel: None,
        }
    }

    /// Monotonically lower the group's acceleration and jerk limits.
    pub fn limit_accel(&mut self, accel: f64, jerk: f64) {
        if accel < self.max_accel {
            self.max_accel = accel;
        }
        if jerk < self.max_jerk {
            self.max_jerk = jerk;
        }
        self.min_accel = (self.max_jerk * self.min_jerk_limit_time / 6.0).min(self.max_accel);
    }

    pub fn set_max_start_v2(&mut self, v2: f64) {
        self.max_start_v2 = v2;
        self.max_start_v = v2.max(0.0).sqrt();
    }

    /// Velocity squared reachable at the end of `combined_d`, starting from
    /// `max_start_v` and honouring the accel and jerk limits.
    pub fn calc_max_v2(&self) -> f64 {
        let d = self.combined_d;
        let start_v2 = self.max_start_v2;
        let order2_v2 = start_v2 + 2.0 * d * self.max_accel;
        if self.accel_order == 2 {
            return order2_v2;
        }
        // Full-jerk ramp over d from start_v: (v - v0) * (v + v0)^2 = 2*d^2*j/3.
        let v = cubic_max_v(self.max_start_v, 2.0 * d * d * self.max_jerk / 3.0);
        let jerk_v2 = v * v;
        let floor_v2 = start_v2 + 2.0 * d * self.min_accel;
        jerk_v2.min(order2_v2).max(floor_v2)
    }

    /// Mean acceleration of a ramp from `start_accel_v` to `cruise_v`,
    /// clamped to the group's limits. Order 2 ramps always run at the full
    /// acceleration limit.
    pub fn calc_effective_accel(&self, cruise_v: f64) -> f64 {
        if self.accel_order == 2 {
            return self.max_accel;
        }
        let dv = cruise_v - self.max_start_v;
        if dv <= 0.0 {
            return 0.0;
        }
        (self.max_jerk * dv / 6.0)
            .sqrt()
            .clamp(self.min_accel, self.max_accel)
    }

    /// Shortest admissible duration of a ramp from `max_start_v` to
    /// `cruise_v`.
    pub fn calc_min_accel_time(&self, cruise_v: f64) -> f64 {
        let dv = cruise_v - self.max_start_v;
        if dv <= 0.0 {
            return 0.0;
        }
        let mut t = dv / self.max_accel;
        if self.accel_order != 2 {
            t = t.max((6.0 * dv / self.max_jerk).sqrt());
            t = t.max(min_comp_time(self.accel_order, self.accel_comp));
            if self.min_accel > 0.0 {
                t = t.min(dv / self.min_accel);
            }
        }
        t
    }

    /// Distance covered by the shortest admissible ramp to `cruise_v`.
    pub fn calc_min_accel_dist(&self, cruise_v: f64) -> f64 {
        0.5 * (self.max_start_v + cruise_v) * self.calc_min_accel_time(cruise_v)
    }

    /// Highest end-velocity squared from which this group can still brake to
    /// *any* slower velocity over `combined_d`.
    pub fn calc_max_safe_v2(&self) -> f64 {
        let max_v2 = self.calc_max_v2();
        if self.accel_order == 2 {
            return max_v2;
        }
        // Worst-case target is v_end = v/3; solving for v gives
        // v^3 = 9/16 * d^2 * jerk.
        let safe_v2 = (9.0 / 16.0 * self.combined_d * self.combined_d * self.max_jerk)
            .cbrt()
            .powi(2);
        // A slow enough start cannot even reach the safe bound.
        safe_v2.min(max_v2)
    }

    /// Velocity on the materialised full ramp at ramp time `t`, measured
    /// from the slow end.
    pub fn ramp_velocity(&self, t: f64) -> f64 {
        let s = SCurve::fill(
            self.accel_order,
            self.total_accel_t,
            0.0,
            self.total_accel_t,
            self.start_accel_v,
            self.effective_accel,
        );
        s.velocity(t.clamp(0.0, self.total_accel_t))
    }

    /// Distance needed to safely shed velocity `v2` (inverse of
    /// `calc_max_safe_v2` in the distance variable).
    pub fn calc_min_safe_dist(&self, v2: f64) -> f64 {
        if v2 <= 0.0 {
            return 0.0;
        }
        if self.accel_order == 2 {
            return 0.5 * v2 / self.max_accel;
        }
        let v = v2.sqrt();
        let jerk_d = (16.0 / 9.0 * v2 * v / self.max_jerk).sqrt();
        let accel_d = 0.5 * v2 / self.max_accel;
        jerk_d.max(accel_d)
    }
}

/// Minimum ramp duration keeping the configured acceleration compensation
/// admissible for the profile order.
fn min_comp_time(accel_order: u8, accel_comp: f64) -> f64 {
    if accel_comp == 0.0 {
        return 0.0;
    }
    match accel_order {
        4 => (6.0 * accel_comp.abs()).sqrt(),
        6 => (accel_comp.abs() / 0.159).sqrt(),
        _ => 0.0,
    }
}

/// Largest real root of `x^3 - 2*b*x^2 = c` shifted back to the end
/// velocity: returns `v` where `x = v + b` and `b` is the start velocity.
///
/// `c` is `2*d^2*jerk/3`. For a jerk-dominated ramp (tiny start velocity)
/// the Cardano expression loses precision; an overrelaxed closed form is
/// returned instead, which downstream callers cap with the order-2 bound.
fn cubic_max_v(start_v: f64, c: f64) -> f64 {
    if c <= 0.0 {
        return start_v;
    }
    let b = start_v;
    if 54.0 * b * b * b < c {
        return 1.5 * (0.5 * c).cbrt();
    }
    let b3 = b * b * b;
    let u = 8.0 * b3 / 27.0 + 0.5 * c + (0.25 * c * c + 8.0 * b3 * c / 27.0).sqrt();
    let e = u.cbrt();
    if e < EPSILON {
        return start_v;
    }
    let x = 2.0 * b / 3.0 + e + 4.0 * b * b / (9.0 * e);
    x - b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(order: u8, accel: f64, jerk: f64, mjlt: f64) -> AccelGroup {
        AccelGroup::fill(order, accel, jerk, mjlt, 0.0)
    }

    #[test]
    fn order2_max_v2_is_the_closed_form() {
        let mut g = group(2, 3000.0, f64::INFINITY, 0.0);
        g.combined_d = 10.0;
        g.set_max_start_v2(0.0);
        assert!((g.calc_max_v2() - 60000.0).abs() < 1e-6);
    }

    #[test]
    fn cubic_root_satisfies_the_ramp_equation() {
        // (v - v0) * (v + v0)^2 == 2*d^2*j/3 must hold at the returned root.
        for &(v0, d, jerk) in &[(20.0, 1.0, 60000.0), (50.0, 4.0, 100000.0), (5.0, 0.3, 20000.0)]
        {
            let c: f64 = 2.0 * d * d * jerk / 3.0;
            let b3 = v0 * v0 * v0;
            if 54.0 * b3 < c {
                continue; // overrelaxed branch is approximate by design
            }
            let v = cubic_max_v(v0, c);
            let lhs = (v - v0) * (v + v0) * (v + v0);
            assert!(
                (lhs - c).abs() < 1e-6 * c.max(1.0),
                "v0={} d={} lhs={} c={}",
                v0,
                d,
                lhs,
                c
            );
        }
    }

    #[test]
    fn jerk_limited_max_v2_stays_between_floor_and_order2() {
        let mut g = group(4, 3000.0, 60000.0, 0.02);
        g.combined_d = 1.0;
        g.set_max_start_v2(0.0);
        let v2 = g.calc_max_v2();
        let floor = 2.0 * g.combined_d * g.min_accel;
        let cap = 2.0 * g.combined_d * g.max_accel;
        assert!(v2 >= floor - 1e-9 && v2 <= cap + 1e-9, "v2={}", v2);
    }

    #[test]
    fn effective_accel_is_clamped() {
        let g = group(6, 3000.0, 60000.0, 0.02);
        // min_accel = 60000 * 0.02 / 6 = 200
        assert!((g.min_accel - 200.0).abs() < 1e-12);
        assert!((g.calc_effective_accel(0.5) - 200.0).abs() < 1e-9);
        assert!((g.calc_effective_accel(4000.0) - 3000.0).abs() < 1e-9);
        let mid = g.calc_effective_accel(20.0);
        assert!((mid - (60000.0_f64 * 20.0 / 6.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn min_time_and_dist_are_consistent() {
        let g = group(4, 3000.0, 60000.0, 0.02);
        let t = g.calc_min_accel_time(20.0);
        // Jerk-limited: sqrt(6*20/60000) = 0.0447..., under the min-accel cap.
        assert!((t - (6.0_f64 * 20.0 / 60000.0).sqrt()).abs() < 1e-12);
        assert!((g.calc_min_accel_dist(20.0) - 10.0 * t).abs() < 1e-12);
    }

    #[test]
    fn min_accel_floor_caps_ramp_time() {
        let g = group(4, 3000.0, 60000.0, 0.2);
        // min_accel = 2000; a 20 mm/s ramp may take at most 0.01 s.
        assert!((g.calc_min_accel_time(20.0) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn limit_accel_only_lowers() {
        let mut g = group(6, 3000.0, 100000.0, 0.02);
        g.limit_accel(500.0, 200000.0);
        assert_eq!(g.max_accel, 500.0);
        assert_eq!(g.max_jerk, 100000.0);
        g.limit_accel(9000.0, 50000.0);
        assert_eq!(g.max_accel, 500.0);
        assert_eq!(g.max_jerk, 50000.0);
        assert!((g.min_accel - 50000.0 * 0.02 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn safe_v2_round_trips_safe_dist() {
        let mut g = group(6, 3000.0, 100000.0, 0.0);
        g.combined_d = 8.0;
        g.set_max_start_v2(0.0);
        let v2 = g.calc_max_safe_v2();
        let d = g.calc_min_safe_dist(v2);
        assert!(d <= g.combined_d + 1e-6, "d={} combined={}", d, g.combined_d);
    }
}

// src/motion/vtrap.rs
//! Velocity-trapezoid assembly.
//!
//! The forward planning pass feeds one accelerating stretch and the
//! deceleration stretch that follows it into the assembler. `flush` fixes the
//! peak cruise velocity, materialises every combined ramp through the shared
//! ramp polynomial and leaves per-move timing on the moves themselves.

use super::accel_group::{RampSide, EPSILON};
use super::moveq::QMove;
use super::scurve::SCurve;
use crate::error::MotionError;

/// Peak-search convergence bound (on velocity squared).
const PEAK_BISECT_TOL: f64 = 1e-9;

#[derive(Debug, Default)]
pub struct VTrap {
    accel_members: Vec<usize>,
    decel_members: Vec<usize>,
}

/// Result of materialising one trapezoid.
#[derive(Debug, Clone, Copy)]
pub struct TrapSummary {
    pub peak_cruise_v2: f64,
    /// Velocity squared at the slow end of the final deceleration ramp; the
    /// next trapezoid starts from it.
    pub end_v2: f64,
}

impl VTrap {
    pub fn new() -> VTrap {
        VTrap::default()
    }

    pub fn is_empty(&self) -> bool {
        self.accel_members.is_empty() && self.decel_members.is_empty()
    }

    pub fn has_decel(&self) -> bool {
        !self.decel_members.is_empty()
    }

    pub fn accel_head(&self) -> Option<usize> {
        self.accel_members.last().copied()
    }

    pub fn add_as_accel(&mut self, midx: usize) {
        self.accel_members.push(midx);
    }

    pub fn add_as_decel(&mut self, midx: usize) {
        self.decel_members.push(midx);
    }

    /// Close the trapezoid: pick the peak cruise velocity (never above
    /// `peak_cap_v2`), materialise the accel and decel ramps onto their
    /// member moves and fill per-move cruise timing.
    pub fn flush(
        &mut self,
        moves: &mut [QMove],
        start_v2: f64,
        peak_cap_v2: f64,
    ) -> Result<TrapSummary, MotionError> {
        debug_assert!(!self.is_empty());
        let head = self.accel_head();
        let decel_head = self.decel_members.first().copied();

        let peak_cruise_v2 =
            self.calc_trap_peak_v2(moves, start_v2, peak_cap_v2, head, decel_head);

        // Materialise deceleration chains in time order; each chain hands the
        // velocity at its slow end to the one after it.
        let mut running_v2 = peak_cruise_v2;
        for chain in chains(moves, &self.decel_members, RampSide::Decel) {
            let anchor = chain.1;
            set_accel(moves, &chain.0, RampSide::Decel, running_v2)?;
            let slow_v2 = moves[anchor].decel.max_start_v2;
            running_v2 = running_v2.min(slow_v2);
        }
        let end_v2 = if decel_head.is_some() {
            running_v2
        } else {
            peak_cruise_v2
        };

        // Accel chains, walked backward so each one targets the entry
        // velocity of its successor; the last chain reaches the peak.
        let accel_chains = chains(moves, &self.accel_members, RampSide::Accel);
        let mut target_v2 = peak_cruise_v2;
        for chain in accel_chains.iter().rev() {
            set_accel(moves, &chain.0, RampSide::Accel, target_v2)?;
            target_v2 = moves[chain.1].accel.max_start_v2;
        }

        // Cruise timing per member.
        let mut members: Vec<usize> = self.accel_members.clone();
        for &d in &self.decel_members {
            if Some(d) != head {
                members.push(d);
            }
        }
        members.sort_unstable();
        for &mi in &members {
            let m = &mut moves[mi];
            let cruise_d = m.move_d - m.accel.accel_d - m.decel.accel_d;
            if cruise_d < -EPSILON {
                return Err(MotionError::ImpossibleMove {
                    move_d: m.move_d,
                    overrun: -cruise_d,
                });
            }
            let cruise_d = cruise_d.max(0.0);
            if m.cruise_v < EPSILON {
                if cruise_d > EPSILON {
                    return Err(MotionError::ImpossibleMove {
                        move_d: m.move_d,
                        overrun: cruise_d,
                    });
                }
                m.cruise_t = 0.0;
            } else {
                m.cruise_t = cruise_d / m.cruise_v;
            }
            m.start_v = m.boundary_velocity(true);
            m.end_v = m.boundary_velocity(false);
        }

        self.accel_members.clear();
        self.decel_members.clear();
        Ok(TrapSummary {
            peak_cruise_v2,
            end_v2,
        })
    }

    /// Highest cruise velocity squared that fits both ramps and a
    /// non-negative cruise stretch inside the trapezoid.
    fn calc_trap_peak_v2(
        &self,
        moves: &mut [QMove],
        start_v2: f64,
        peak_cap_v2: f64,
        head: Option<usize>,
        decel_head: Option<usize>,
    ) -> f64 {
        let mut cap = peak_cap_v2.max(start_v2);
        for &mi in self.accel_members.iter().chain(self.decel_members.iter()) {
            cap = cap.min(moves[mi].pcruise_v2);
        }
        if let Some(h) = head {
            cap = cap.min(moves[h].accel.max_end_v2);
        }
        if let Some(dh) = decel_head {
            cap = cap.min(moves[dh].decel.max_end_v2);
            if head != Some(dh) && head.is_some() {
                cap = cap.min(moves[dh].junction_max_v2);
            }
        }
        if head.is_none() {
            // No accelerating stretch: the trapezoid opens at its entry
            // velocity.
            if let Some(dh) = decel_head {
                cap = cap.min(moves[dh].accel.max_start_v2.max(start_v2));
            }
        }

        if self.overlapping_ramps(head, decel_head) {
            // Both ramps share distance: bisect for the largest peak whose
            // ramp distances still fit the member moves.
            let total_d: f64 = self.member_distance(moves);
            let decel_slow_v2 = decel_head.map_or(0.0, |dh| {
                let anchor = moves[dh].decel.start_accel.map_or(dh, |r| r.idx);
                moves[anchor].decel.max_start_v2
            });
            let mut lo = start_v2.max(decel_slow_v2).min(cap);
            let mut hi = cap;
            if self.ramp_fit(moves, hi, total_d) {
                return hi;
            }
            while hi - lo > PEAK_BISECT_TOL.max(1e-12 * hi) {
                let mid = 0.5 * (lo + hi);
                if self.ramp_fit(moves, mid, total_d) {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            return lo;
        }
        cap
    }

    fn overlapping_ramps(&self, head: Option<usize>, decel_head: Option<usize>) -> bool {
        match (head, decel_head) {
            // A decel chain reaching back into the accelerating members means
            // the ramps compete for the same distance.
            (Some(h), Some(dh)) => dh <= h,
            _ => false,
        }
    }

    fn member_distance(&self, moves: &[QMove]) -> f64 {
        let mut seen: Vec<usize> = self.accel_members.clone();
        for &d in &self.decel_members {
            if !seen.contains(&d) {
                seen.push(d);
            }
        }
        seen.iter().map(|&i| moves[i].move_d).sum()
    }

    /// Would a peak of `cruise_v2` leave the two ramps within `total_d`?
    fn ramp_fit(&self, moves: &[QMove], cruise_v2: f64, total_d: f64) -> bool {
        let cruise_v = cruise_v2.max(0.0).sqrt();
        let mut need = 0.0;
        if let Some(h) = self.accel_head() {
            let g = &moves[h].accel;
            let anchor = g.start_accel.map_or(h, |r| r.idx);
            let mut wg = *g;
            wg.set_max_start_v2(moves[anchor].accel.max_start_v2);
            need += wg.calc_min_accel_dist(cruise_v);
        }
        if let Some(&dh) = self.decel_members.first() {
            let g = &moves[dh].decel;
            let anchor = g.start_accel.map_or(dh, |r| r.idx);
            let mut wg = *g;
            wg.set_max_start_v2(moves[anchor].decel.max_start_v2);
            need += wg.calc_min_accel_dist(cruise_v);
        }
        need <= total_d
    }
}

/// Split the member list into maximal runs sharing one combined-ramp origin.
/// Returns `(members_in_time_order, anchor_idx)` per chain, in time order.
fn chains(moves: &[QMove], members: &[usize], side: RampSide) -> Vec<(Vec<usize>, usize)> {
    let mut out: Vec<(Vec<usize>, usize)> = Vec::new();
    for &mi in members {
        let g = match side {
            RampSide::Accel => &moves[mi].accel,
            RampSide::Decel => &moves[mi].decel,
        };
        let anchor = g.start_accel.map_or(mi, |r| r.idx);
        match out.last_mut() {
            Some(last) if last.1 == anchor => last.0.push(mi),
            _ => out.push((vec![mi], anchor)),
        }
    }
    out
}

/// Materialise one combined ramp onto its member moves.
///
/// The ramp polynomial runs from its slow end; deceleration chains traverse
/// it in reverse, so their per-move offsets are measured from the fast end.
fn set_accel(
    moves: &mut [QMove],
    chain: &[usize],
    side: RampSide,
    cruise_v2: f64,
) -> Result<(), MotionError> {
    if chain.is_empty() {
        return Ok(());
    }
    // Slow end first: accel chains already run slow-to-fast in time order,
    // decel chains are reversed.
    let slow_to_fast: Vec<usize> = match side {
        RampSide::Accel => chain.to_vec(),
        RampSide::Decel => chain.iter().rev().copied().collect(),
    };
    let fast_idx = *slow_to_fast.last().expect("non-empty chain");
    let anchor_idx = slow_to_fast[0];

    let g = match side {
        RampSide::Accel => moves[fast_idx].accel,
        RampSide::Decel => moves[fast_idx].decel,
    };
    let v0 = match side {
        RampSide::Accel => moves[anchor_idx].accel.max_start_v,
        RampSide::Decel => moves[anchor_idx].decel.max_start_v,
    };
    let cruise_v = cruise_v2.max(0.0).sqrt();
    let dv = (cruise_v - v0).max(0.0);

    let mut wg = g;
    wg.set_max_start_v2(v0 * v0);
    let eff = wg.calc_effective_accel(cruise_v);
    let total_t = if eff > 0.0 { dv / eff } else { 0.0 };
    let ramp_d = 0.5 * (v0 + cruise_v) * total_t;
    let full = SCurve::fill(g.accel_order, total_t, 0.0, total_t, v0, eff);

    let mut cd: f64 = 0.0;
    for &mi in &slow_to_fast {
        let move_d = moves[mi].move_d;
        let start_d = cd.min(ramp_d);
        let end_d = (cd + move_d).min(ramp_d);
        let t0 = if total_t > 0.0 { full.get_time(start_d) } else { 0.0 };
        let t1 = if total_t > 0.0 { full.get_time(end_d) } else { 0.0 };
        {
            let gm = match side {
                RampSide::Accel => &mut moves[mi].accel,
                RampSide::Decel => &mut moves[mi].decel,
            };
            gm.accel_d = end_d - start_d;
            gm.accel_t = t1 - t0;
            gm.total_accel_t = total_t;
            gm.start_accel_v = v0;
            gm.effective_accel = eff;
            gm.accel_offset_t = match side {
                RampSide::Accel => t0,
                RampSide::Decel => total_t - t1,
            };
        }
        moves[mi].cruise_v = cruise_v;
        cd += move_d;
    }
    if ramp_d > cd + EPSILON {
        return Err(MotionError::ImpossibleMove {
            move_d: cd,
            overrun: ramp_d - cd,
        });
    }
    Ok(())
}

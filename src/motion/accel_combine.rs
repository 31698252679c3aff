// src/motion/accel_combine.rs
//! Junction-point bookkeeping: choosing the best multi-move combined ramp.
//!
//! Every queued move embeds one junction-point record. While a planning pass
//! walks the queue, the combiner keeps the indices of moves whose junctions
//! are still viable ramp origins, advances each candidate over the next move
//! and picks the origin that reaches the far end of the move soonest. The
//! winning candidate's state is copied back into the move's real ramp group,
//! which is all later stages look at.

use std::collections::VecDeque;

use super::accel_group::{AccelGroup, RampRef, RampSide, EPSILON};
use super::moveq::QMove;

/// Per-move candidate state: the ramp as if it started at this move's
/// junction. Embedded in the owning move so candidate churn never allocates.
#[derive(Debug, Clone, Copy)]
pub struct JunctionPoint {
    pub ag: AccelGroup,
    pub min_start_time: f64,
    pub min_end_time: f64,
}

impl JunctionPoint {
    pub fn idle(ag: AccelGroup) -> JunctionPoint {
        JunctionPoint {
            ag,
            min_start_time: 0.0,
            min_end_time: 0.0,
        }
    }
}

/// Active candidate list for one planning direction.
#[derive(Debug, Default)]
pub struct AccelCombiner {
    candidates: VecDeque<usize>,
    /// Reachable velocity squared at the junction the scan has advanced to.
    prev_end_v2: f64,
    /// Earliest time the scan can have reached that junction.
    prev_min_time: f64,
    /// Distance accumulated by the fallback-decel scan.
    fallback_d: f64,
}

impl AccelCombiner {
    pub fn new() -> AccelCombiner {
        AccelCombiner::default()
    }

    /// Restart the scan from a boundary with known velocity squared.
    pub fn reset(&mut self, start_v2: f64) {
        self.candidates.clear();
        self.prev_end_v2 = start_v2;
        self.prev_min_time = 0.0;
        self.fallback_d = 0.0;
    }

    /// Extend the scan over the move at `midx`, writing the winning combined
    /// ramp into that move's group on `side`. `junction_max_v2` caps the
    /// velocity at the junction the ramp enters this move through.
    pub fn process_next_accel(
        &mut self,
        moves: &mut [QMove],
        midx: usize,
        side: RampSide,
        junction_max_v2: f64,
    ) {
        let base = match side {
            RampSide::Accel => moves[midx].accel,
            RampSide::Decel => moves[midx].decel,
        };
        let new_start_v2 = junction_max_v2.min(self.prev_end_v2);

        // A new ramp may only extend a previous chain when the profiles are
        // combinable: equal non-trivial order and equal compensation.
        let combinable = match self.candidates.back() {
            Some(&prev_idx) => {
                let pg = &moves[prev_idx].jp.ag;
                base.accel_order == pg.accel_order
                    && base.accel_order != 2
                    && (base.accel_comp - pg.accel_comp).abs() <= EPSILON
            }
            None => false,
        };
        if !combinable {
            self.candidates.clear();
        }

        // Candidates already at or above the new junction velocity can only
        // decelerate into this move; drop them.
        while let Some(&tail) = self.candidates.back() {
            if moves[tail].jp.ag.max_start_v2 + EPSILON >= new_start_v2.min(junction_max_v2) {
                self.candidates.pop_back();
            } else {
                break;
            }
        }

        // Lower the retained candidates' limits so their ramps pass through
        // this junction at or under its velocity cap.
        let retained: Vec<usize> = self.candidates.iter().copied().collect();
        for ci in retained {
            let jp_ag = &mut moves[ci].jp.ag;
            let mut cap_accel = base.max_accel;
            if jp_ag.combined_d > 0.0 {
                let junction_cap =
                    0.5 * (junction_max_v2 - jp_ag.max_start_v2).max(0.0) / jp_ag.combined_d;
                cap_accel = cap_accel.min(junction_cap);
            }
            jp_ag.limit_accel(cap_accel, base.max_jerk);
        }

        // New candidate anchored at this junction.
        {
            let mut ag = base;
            ag.combined_d = 0.0;
            ag.set_max_start_v2(new_start_v2);
            ag.start_accel = Some(RampRef { idx: midx, side });
            moves[midx].jp = JunctionPoint {
                ag,
                min_start_time: self.prev_min_time,
                min_end_time: 0.0,
            };
        }
        self.candidates.push_back(midx);

        // Advance every candidate over this move and score it by the time it
        // needs to clear the move's far end.
        let move_d = moves[midx].move_d;
        let all: Vec<usize> = self.candidates.iter().copied().collect();
        let mut winner = midx;
        let mut winner_time = f64::INFINITY;
        for ci in all {
            let jp = &mut moves[ci].jp;
            jp.ag.combined_d += move_d;
            jp.ag.max_end_v2 = jp.ag.calc_max_v2();
            let reached_v = jp.ag.max_end_v2.max(0.0).sqrt();
            let ramp_t = jp.ag.calc_min_accel_time(reached_v);
            let ramp_d = jp.ag.calc_min_accel_dist(reached_v);
            let tail_d = (jp.ag.combined_d - ramp_d).max(0.0);
            let tail_t = if reached_v > EPSILON {
                tail_d / reached_v
            } else if tail_d > EPSILON {
                f64::INFINITY
            } else {
                0.0
            };
            jp.min_end_time = jp.min_start_time + ramp_t + tail_t;
            if jp.min_end_time + EPSILON < winner_time {
                winner_time = jp.min_end_time;
                winner = ci;
            }
        }

        // Publish the winner into the move's real ramp group.
        let wag = moves[winner].jp.ag;
        let g = match side {
            RampSide::Accel => &mut moves[midx].accel,
            RampSide::Decel => &mut moves[midx].decel,
        };
        g.max_end_v2 = wag.max_end_v2;
        g.combined_d = wag.combined_d;
        g.max_accel = wag.max_accel;
        g.max_jerk = wag.max_jerk;
        g.min_accel = wag.min_accel;
        g.set_max_start_v2(new_start_v2);
        g.start_accel = wag.start_accel;

        self.prev_end_v2 = wag.max_end_v2;
        self.prev_min_time = winner_time;
    }

    /// Reverse-direction bookkeeping for the forward pass: keep a ramp able
    /// to brake to zero using all distance scanned so far, anchored at the
    /// scan boundary. The result is stored as the move's fallback plan.
    pub fn process_fallback_decel(
        &mut self,
        moves: &mut [QMove],
        midx: usize,
        next_junction_max_v2: f64,
    ) {
        self.fallback_d += moves[midx].move_d;
        let mut g = moves[midx].default_accel;
        g.set_max_start_v2(0.0);
        g.combined_d = self.fallback_d;
        g.max_end_v2 = g.calc_max_safe_v2().min(next_junction_max_v2);
        g.start_accel = Some(RampRef {
            idx: midx,
            side: RampSide::Decel,
        });
        moves[midx].fallback_decel = Some(g);
    }
}

// src/motion/moveq.rs
//! Look-ahead move queue and three-pass planner.
//!
//! Geometric moves are queued with their kinematic limits and planned in
//! three passes: a backward pass over softened acceleration limits that
//! locks in cruise peaks and a flushable prefix, a backward full-jerk pass
//! that builds deceleration chains through the combiner, and a forward pass
//! that assembles velocity trapezoids and materialises per-move ramp
//! timing. Lazy planning only emits moves whose plan can no longer change
//! when the queue grows.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::accel_combine::{AccelCombiner, JunctionPoint};
use super::accel_group::{AccelGroup, RampSide, EPSILON};
use super::scurve::SCurve;
use super::vtrap::VTrap;
use crate::error::MotionError;

/// Queue depth past which lazy planning must force partial progress.
pub const DEFAULT_MAX_QSIZE: usize = 400;

/// Velocity continuity tolerance between consecutive emitted moves.
const CONTINUITY_TOL: f64 = 1e-4;

/// Input limits of one geometric move.
#[derive(Debug, Clone, Copy)]
pub struct MoveParams {
    /// Euclidean length of the move; must be positive.
    pub move_d: f64,
    /// Cornering cap on the velocity squared at the move's start junction.
    pub junction_max_v2: f64,
    /// Requested cruise velocity.
    pub velocity: f64,
    /// Bezier profile order: 2, 4 or 6.
    pub accel_order: u8,
    pub accel: f64,
    /// Softer acceleration driving the smoothed pass.
    pub smoothed_accel: f64,
    pub jerk: f64,
    pub min_jerk_limit_time: f64,
    pub accel_comp: f64,
}

/// One queued move with its planner-mutable state.
#[derive(Debug, Clone)]
pub struct QMove {
    pub move_d: f64,
    pub junction_max_v2: f64,
    pub max_cruise_v2: f64,
    pub max_smoothed_v2: f64,
    pub smooth_delta_v2: f64,
    /// Peak cap established by the smoothed pass.
    pub pcruise_v2: f64,

    pub accel: AccelGroup,
    pub decel: AccelGroup,
    /// Limits the move was queued with; ramp groups reseed from this.
    pub default_accel: AccelGroup,
    /// Brake-to-zero plan captured for safety analysis and recovery.
    pub fallback_decel: Option<AccelGroup>,
    /// Embedded combiner candidate state.
    pub jp: JunctionPoint,

    /// Materialised trapezoid state.
    pub cruise_v: f64,
    pub cruise_t: f64,
    pub start_v: f64,
    pub end_v: f64,
}

impl QMove {
    pub fn new(params: &MoveParams) -> QMove {
        let default_accel = AccelGroup::fill(
            params.accel_order,
            params.accel,
            params.jerk,
            params.min_jerk_limit_time,
            params.accel_comp,
        );
        let max_cruise_v2 = params.velocity * params.velocity;
        QMove {
            move_d: params.move_d,
            junction_max_v2: params.junction_max_v2.min(max_cruise_v2),
            max_cruise_v2,
            max_smoothed_v2: params.junction_max_v2.min(max_cruise_v2),
            smooth_delta_v2: 2.0 * params.smoothed_accel * params.move_d,
            pcruise_v2: max_cruise_v2,
            accel: default_accel,
            decel: default_accel,
            default_accel,
            fallback_decel: None,
            jp: JunctionPoint::idle(default_accel),
            cruise_v: 0.0,
            cruise_t: 0.0,
            start_v: 0.0,
            end_v: 0.0,
        }
    }

    /// Velocity at the move's start (`true`) or end (`false`) boundary, read
    /// off the materialised ramps.
    pub fn boundary_velocity(&self, at_start: bool) -> f64 {
        if at_start {
            if self.accel.accel_t > EPSILON {
                return self.accel.ramp_velocity(self.accel.accel_offset_t);
            }
            if self.cruise_t > EPSILON {
                return self.cruise_v;
            }
            if self.decel.accel_t > EPSILON {
                let g = &self.decel;
                return g.ramp_velocity(g.total_accel_t - g.accel_offset_t);
            }
            self.cruise_v
        } else {
            if self.decel.accel_t > EPSILON {
                let g = &self.decel;
                return g.ramp_velocity(g.total_accel_t - g.accel_offset_t - g.accel_t);
            }
            if self.cruise_t > EPSILON {
                return self.cruise_v;
            }
            if self.accel.accel_t > EPSILON {
                let g = &self.accel;
                return g.ramp_velocity(g.accel_offset_t + g.accel_t);
            }
            self.cruise_v
        }
    }
}

/// Fully planned ramp timing of one emitted move, ready for trajectory
/// materialisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrapAccelDecel {
    pub accel_t: f64,
    pub accel_offset_t: f64,
    pub total_accel_t: f64,
    pub cruise_t: f64,
    pub decel_t: f64,
    pub decel_offset_t: f64,
    pub total_decel_t: f64,
    pub start_accel_v: f64,
    pub cruise_v: f64,
    pub effective_accel: f64,
    pub effective_decel: f64,
    pub accel_order: u8,
    pub accel_comp: f64,
}

impl TrapAccelDecel {
    pub fn total_time(&self) -> f64 {
        self.accel_t + self.cruise_t + self.decel_t
    }

    /// Velocity at the very start of the move.
    pub fn start_velocity(&self) -> f64 {
        if self.accel_t > 0.0 {
            return self
                .accel_scurve()
                .map_or(self.cruise_v, |s| s.velocity(0.0));
        }
        if self.cruise_t > 0.0 {
            return self.cruise_v;
        }
        self.decel_scurve().map_or(self.cruise_v, |s| s.velocity(0.0))
    }

    /// Velocity at the very end of the move.
    pub fn end_velocity(&self) -> f64 {
        if self.decel_t > 0.0 {
            return self
                .decel_scurve()
                .map_or(self.cruise_v, |s| s.velocity(self.decel_t));
        }
        if self.cruise_t > 0.0 {
            return self.cruise_v;
        }
        self.accel_scurve()
            .map_or(self.cruise_v, |s| s.velocity(self.accel_t))
    }

    /// Ramp polynomial of the acceleration slice, if any.
    pub fn accel_scurve(&self) -> Option<SCurve> {
        if self.accel_t <= 0.0 {
            return None;
        }
        Some(SCurve::fill(
            self.accel_order,
            self.accel_t,
            self.accel_offset_t,
            self.total_accel_t,
            self.start_accel_v,
            self.effective_accel,
        ))
    }

    /// Ramp polynomial of the deceleration slice, if any.
    pub fn decel_scurve(&self) -> Option<SCurve> {
        if self.decel_t <= 0.0 {
            return None;
        }
        Some(SCurve::fill(
            self.accel_order,
            self.decel_t,
            self.decel_offset_t,
            self.total_decel_t,
            self.cruise_v,
            -self.effective_decel,
        ))
    }
}

/// The look-ahead move queue.
#[derive(Debug)]
pub struct MoveQueue {
    moves: VecDeque<QMove>,
    combiner: AccelCombiner,
    /// Count of leading moves fully planned and ready for `getmove`.
    flush_count: usize,
    /// Moves below this index keep their smoothed-pass caps on re-entry.
    smoothed_pass_limit: usize,
    /// Committed velocity of the last emitted move's end.
    prev_move_end_v: f64,
    /// Committed velocity squared at the flushed/unflushed boundary.
    prev_end_v2: f64,
    /// Running smoothed-junction cap for newly queued moves.
    tail_smoothed_cap: f64,
    tail_cruise_v2: f64,
    max_qsize: usize,
}

impl Default for MoveQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveQueue {
    pub fn new() -> MoveQueue {
        MoveQueue {
            moves: VecDeque::new(),
            combiner: AccelCombiner::new(),
            flush_count: 0,
            smoothed_pass_limit: 0,
            prev_move_end_v: 0.0,
            prev_end_v2: 0.0,
            tail_smoothed_cap: 0.0,
            tail_cruise_v2: 0.0,
            max_qsize: DEFAULT_MAX_QSIZE,
        }
    }

    /// Queue bound before the starvation fallback forces partial flushes.
    pub fn with_queue_bound(max_qsize: usize) -> MoveQueue {
        MoveQueue {
            max_qsize,
            ..MoveQueue::new()
        }
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Count of planned moves waiting to be read out.
    pub fn flushed(&self) -> usize {
        self.flush_count
    }

    /// Enqueue a geometric move. Planning is deferred to `plan`.
    pub fn add(&mut self, params: &MoveParams) -> Result<(), MotionError> {
        if !(params.move_d > 0.0) {
            return Err(MotionError::BadMoveParams {
                reason: format!("move_d {} must be positive", params.move_d),
            });
        }
        if !matches!(params.accel_order, 2 | 4 | 6) {
            return Err(MotionError::BadMoveParams {
                reason: format!("accel_order {} not one of 2, 4, 6", params.accel_order),
            });
        }
        if !(params.accel > 0.0) || !(params.velocity > 0.0) {
            return Err(MotionError::BadMoveParams {
                reason: "accel and velocity must be positive".to_string(),
            });
        }
        let mut m = QMove::new(params);
        if self.moves.is_empty() {
            // Session boundary: the first move starts at the committed
            // velocity regardless of its nominal junction cap.
            m.junction_max_v2 = m.junction_max_v2.min(self.prev_end_v2);
            self.tail_smoothed_cap = self.prev_end_v2;
        } else {
            m.junction_max_v2 = m.junction_max_v2.min(self.tail_cruise_v2);
        }
        m.max_smoothed_v2 = m.junction_max_v2.min(self.tail_smoothed_cap);
        self.tail_smoothed_cap = m.max_smoothed_v2 + m.smooth_delta_v2;
        self.tail_cruise_v2 = m.max_cruise_v2;
        self.moves.push_back(m);
        Ok(())
    }

    /// Discard every queued move and return to the zero-velocity state.
    pub fn reset(&mut self) {
        self.moves.clear();
        self.combiner.reset(0.0);
        self.flush_count = 0;
        self.smoothed_pass_limit = 0;
        self.prev_move_end_v = 0.0;
        self.prev_end_v2 = 0.0;
        self.tail_smoothed_cap = 0.0;
        self.tail_cruise_v2 = 0.0;
    }

    /// Run the planning passes. Returns the number of moves flushed to the
    /// head of the queue and readable through `getmove`. In lazy mode the
    /// count may be zero.
    pub fn plan(&mut self, lazy: bool) -> Result<usize, MotionError> {
        let n = self.moves.len();
        if n == 0 {
            return Ok(self.flush_count);
        }
        self.moves.make_contiguous();

        let mut flush_limit = self.backward_smoothed_pass(lazy)?;
        if lazy && flush_limit <= self.flush_count {
            if n > self.max_qsize {
                return self.starvation_flush();
            }
            return Ok(self.flush_count);
        }

        // Full-jerk backward pass over the flushable prefix.
        let boundary_v2 = if lazy && flush_limit < n {
            let b = &self.moves[flush_limit];
            b.junction_max_v2.min(b.pcruise_v2)
        } else {
            0.0
        };
        self.backward_pass(flush_limit, boundary_v2);
        self.capture_fallback_plans();

        if lazy {
            flush_limit = self.find_safe_flush_limit(flush_limit);
            if flush_limit <= self.flush_count {
                if n > self.max_qsize {
                    return self.starvation_flush();
                }
                return Ok(self.flush_count);
            }
        }

        self.forward_pass(flush_limit)?;
        self.flush_count = flush_limit;
        self.smoothed_pass_limit = flush_limit;
        Ok(self.flush_count)
    }

    /// Pop one planned move. Returns its ramp descriptor and total duration.
    pub fn getmove(&mut self) -> Result<(TrapAccelDecel, f64), MotionError> {
        if self.flush_count == 0 || self.moves.is_empty() {
            return Err(MotionError::EmptyQueue);
        }
        let m = self.moves.pop_front().expect("flushed move present");
        self.flush_count -= 1;
        self.smoothed_pass_limit = self.smoothed_pass_limit.saturating_sub(1);

        if (self.prev_move_end_v - m.start_v).abs() > CONTINUITY_TOL {
            tracing::error!(
                prev = self.prev_move_end_v,
                next = m.start_v,
                "velocity discontinuity between planned moves"
            );
            return Err(MotionError::VelocityDiscontinuity {
                prev_end_v: self.prev_move_end_v,
                start_v: m.start_v,
            });
        }
        self.prev_move_end_v = m.end_v;

        let ad = TrapAccelDecel {
            accel_t: m.accel.accel_t,
            accel_offset_t: m.accel.accel_offset_t,
            total_accel_t: m.accel.total_accel_t,
            cruise_t: m.cruise_t.max(0.0),
            decel_t: m.decel.accel_t,
            decel_offset_t: m.decel.accel_offset_t,
            total_decel_t: m.decel.total_accel_t,
            start_accel_v: m.accel.start_accel_v,
            cruise_v: m.cruise_v,
            effective_accel: m.accel.effective_accel,
            effective_decel: m.decel.effective_accel,
            accel_order: m.default_accel.accel_order,
            accel_comp: m.default_accel.accel_comp,
        };
        Ok((ad, ad.total_time()))
    }

    // ----- pass 1: backward smoothed pass -----

    /// Walk the queue backward over the softened acceleration limits,
    /// locking in peak-cruise caps and the flushable prefix.
    fn backward_smoothed_pass(&mut self, lazy: bool) -> Result<usize, MotionError> {
        let n = self.moves.len();
        let stop = self.smoothed_pass_limit.min(n);
        let moves = self.moves.make_contiguous();

        let mut delayed: Vec<(usize, f64)> = Vec::new();
        let mut next_smoothed_v2 = 0.0;
        let mut peak_cruise_v2 = 0.0;
        let mut peak_valid = false;
        let mut update_flush = lazy;
        let mut flush_count = n;

        let mut front_reachable_v2 = f64::MAX;
        for i in (stop..n).rev() {
            let max_smoothed_v2 = if i == 0 {
                moves[i].max_smoothed_v2.min(self.prev_end_v2)
            } else {
                moves[i].max_smoothed_v2
            };
            let reachable_v2 = next_smoothed_v2 + moves[i].smooth_delta_v2;
            if i == 0 {
                front_reachable_v2 = reachable_v2;
            }
            let smoothed_v2 = max_smoothed_v2.min(reachable_v2);
            if smoothed_v2 < reachable_v2 {
                // The move sheds speed; a trapezoid peak lives here or just
                // after it.
                if smoothed_v2 + moves[i].smooth_delta_v2 > next_smoothed_v2
                    || !delayed.is_empty()
                {
                    if update_flush && peak_valid {
                        flush_count = i;
                        update_flush = false;
                    }
                    peak_cruise_v2 = moves[i]
                        .max_cruise_v2
                        .min(0.5 * (smoothed_v2 + reachable_v2));
                    peak_valid = true;
                    if !delayed.is_empty() {
                        if !update_flush && i < flush_count {
                            let mut mc_v2 = peak_cruise_v2;
                            for &(j, start_v2) in delayed.iter().rev() {
                                mc_v2 = mc_v2.min(start_v2);
                                moves[j].pcruise_v2 = moves[j].max_cruise_v2.min(mc_v2);
                            }
                        }
                        delayed.clear();
                    }
                }
                // The boundary move itself carries the locked peak: it is
                // what the flushed prefix's exit junction is planned against.
                if !update_flush && i <= flush_count {
                    moves[i].pcruise_v2 = moves[i].max_cruise_v2.min(peak_cruise_v2);
                    if i + 1 < n {
                        moves[i + 1].pcruise_v2 = moves[i + 1].pcruise_v2.min(peak_cruise_v2);
                    }
                }
            } else {
                // Pure acceleration; defer until the governing peak is known.
                delayed.push((i, smoothed_v2));
            }
            next_smoothed_v2 = smoothed_v2;
        }

        if !delayed.is_empty() && stop == 0 {
            // Deferred moves reached the queue front: the prefix is one
            // monotone deceleration from the committed entry velocity. That
            // plans fine as long as the entry velocity is actually
            // brakeable; beyond it the pass is exhausted.
            if !lazy && self.prev_end_v2 > front_reachable_v2 + EPSILON {
                return Err(MotionError::SmoothedPassExhaustion {
                    deferred: delayed.len(),
                });
            }
            if !update_flush {
                let mut mc_v2 = self.prev_end_v2;
                for &(j, start_v2) in delayed.iter().rev() {
                    mc_v2 = mc_v2.min(start_v2);
                    moves[j].pcruise_v2 = moves[j].max_cruise_v2.min(mc_v2);
                }
            }
            delayed.clear();
        }
        if lazy {
            if update_flush {
                flush_count = 0;
            }
            Ok(flush_count.max(self.flush_count))
        } else {
            Ok(n)
        }
    }

    // ----- pass 2: backward full-jerk pass -----

    /// Reseed every ramp group and build deceleration chains backward from
    /// the flush boundary.
    fn backward_pass(&mut self, limit: usize, boundary_v2: f64) {
        let moves = self.moves.make_contiguous();
        self.combiner.reset(boundary_v2);
        for i in (0..limit).rev() {
            moves[i].accel = moves[i].default_accel;
            moves[i].decel = moves[i].default_accel;
            let jcap_end = if i + 1 < limit {
                moves[i + 1].junction_max_v2.min(moves[i + 1].pcruise_v2)
            } else {
                boundary_v2
            };
            self.combiner
                .process_next_accel(moves, i, RampSide::Decel, jcap_end);
        }
    }

    /// Record, for every queued move, a plan able to brake to zero using
    /// only the distance queued after it.
    fn capture_fallback_plans(&mut self) {
        let n = self.moves.len();
        let moves = self.moves.make_contiguous();
        self.combiner.reset(0.0);
        for i in (0..n).rev() {
            let jcap_end = if i + 1 < n {
                moves[i + 1].junction_max_v2
            } else {
                0.0
            };
            self.combiner.process_fallback_decel(moves, i, jcap_end);
        }
    }

    // ----- pass 3: safe flush limit -----

    /// Shrink the lazy flush limit to the earliest chain boundary whose
    /// junction velocity can be safely committed: the future queue, even if
    /// never extended, can always brake from it.
    fn find_safe_flush_limit(&mut self, flush_limit: usize) -> usize {
        let n = self.moves.len();
        let moves = self.moves.make_contiguous();
        let mut p = 0;
        while p < flush_limit {
            // The decel chain containing move p ends at its anchor; the cut
            // must happen after the whole chain.
            let anchor = moves[p].decel.start_accel.map_or(p, |r| r.idx);
            let cut = anchor + 1;
            if cut > flush_limit {
                break;
            }
            let junction_v2 = moves[anchor].decel.max_start_v2;
            let safe_v2 = moves[anchor]
                .fallback_decel
                .map_or(0.0, |g| g.calc_max_safe_v2());
            if junction_v2 <= safe_v2 + EPSILON && cut < n {
                return cut;
            }
            if cut == n {
                // Queue end: only a full flush is meaningful here.
                break;
            }
            p = cut;
        }
        if flush_limit >= n {
            flush_limit
        } else {
            0
        }
    }

    // ----- pass 4: forward pass -----

    /// Assemble velocity trapezoids over the flushable prefix and
    /// materialise per-move timing.
    fn forward_pass(&mut self, limit: usize) -> Result<(), MotionError> {
        let prev_end_v2 = self.prev_end_v2;
        let n = self.moves.len();
        let moves = self.moves.make_contiguous();
        // Velocity cap at the junction the flushed prefix hands over to.
        let exit_cap_v2 = if limit < n {
            moves[limit].junction_max_v2
        } else {
            0.0
        };
        self.combiner.reset(prev_end_v2);
        let mut vtrap = VTrap::new();
        let mut prev_cruise_v2 = f64::MAX;
        let mut trap_start_v2 = prev_end_v2;
        let mut final_end_v2 = prev_end_v2;

        let mut i = 0;
        while i < limit {
            let jcap = moves[i].junction_max_v2.min(prev_cruise_v2);
            self.combiner
                .process_next_accel(moves, i, RampSide::Accel, jcap);

            if i == 0 && moves[i].decel.max_end_v2 + EPSILON < prev_end_v2 {
                // The committed velocity can no longer be planned normally;
                // clamp onto the pre-recorded fallback plan and continue.
                tracing::warn!(
                    committed_v2 = prev_end_v2,
                    reachable_v2 = moves[i].decel.max_end_v2,
                    "committed velocity unreachable, braking on fallback plan"
                );
                if let Some(fb) = moves[i].fallback_decel {
                    let mut g = fb;
                    g.combined_d = moves[i].move_d;
                    g.set_max_start_v2(moves[i].decel.max_start_v2.min(prev_end_v2));
                    g.start_accel = Some(super::accel_group::RampRef {
                        idx: i,
                        side: RampSide::Decel,
                    });
                    g.max_end_v2 = prev_end_v2;
                    moves[i].decel = g;
                }
                moves[i].accel.set_max_start_v2(prev_end_v2);
            }

            let can_accelerate =
                moves[i].decel.max_end_v2 > moves[i].accel.max_start_v2 + EPSILON;
            let must_decelerate =
                moves[i].accel.max_end_v2 + EPSILON > moves[i].decel.max_start_v2;

            if can_accelerate {
                let chain_start = moves[i].accel.start_accel.map_or(i, |r| r.idx);
                let continues = vtrap
                    .accel_head()
                    .map_or(false, |h| !vtrap.has_decel() && chain_start <= h);
                if !vtrap.is_empty() && !continues {
                    // The pending trapezoid cruises out; the new ramp must
                    // restart from its end velocity.
                    let summary = vtrap.flush(moves, trap_start_v2, f64::MAX)?;
                    prev_cruise_v2 = summary.peak_cruise_v2;
                    trap_start_v2 = summary.end_v2;
                    final_end_v2 = summary.end_v2;
                    self.combiner.reset(summary.end_v2);
                    let jcap = moves[i].junction_max_v2.min(prev_cruise_v2);
                    self.combiner
                        .process_next_accel(moves, i, RampSide::Accel, jcap);
                }
                vtrap.add_as_accel(i);
            }
            if must_decelerate || !can_accelerate {
                // Chain the whole deceleration ramp, then restart the scan
                // from its slow end.
                let anchor = moves[i].decel.start_accel.map_or(i, |r| r.idx).min(limit - 1);
                for j in i..=anchor {
                    vtrap.add_as_decel(j);
                }
                let summary = vtrap.flush(moves, trap_start_v2, f64::MAX)?;
                prev_cruise_v2 = summary.peak_cruise_v2;
                trap_start_v2 = summary.end_v2;
                final_end_v2 = summary.end_v2;
                self.combiner.reset(summary.end_v2);
                i = anchor + 1;
                continue;
            }
            i += 1;
        }
        if !vtrap.is_empty() {
            // The prefix ends while still cruising; keep the committed end
            // velocity under the hand-over junction's cap.
            let cap = if limit < n { exit_cap_v2 } else { f64::MAX };
            let summary = vtrap.flush(moves, trap_start_v2, cap)?;
            final_end_v2 = summary.end_v2;
        }
        self.prev_end_v2 = final_end_v2;
        Ok(())
    }

    // ----- starvation fallback -----

    /// Lazy planning found no flush limit but the queue is past its bound:
    /// commit a locally suboptimal partial flush to guarantee progress.
    fn starvation_flush(&mut self) -> Result<usize, MotionError> {
        let n = self.moves.len();
        self.capture_fallback_plans();
        let moves = self.moves.make_contiguous();

        // First junction that forces deceleration after an accelerating run.
        let mut reachable_v2 = self.prev_end_v2;
        let mut p = n - 1;
        for i in 0..n {
            if i > 0 && moves[i].junction_max_v2 + EPSILON < reachable_v2 {
                p = i;
                break;
            }
            let mut g = moves[i].default_accel;
            g.set_max_start_v2(reachable_v2.min(moves[i].junction_max_v2));
            g.combined_d = moves[i].move_d;
            reachable_v2 = g.calc_max_v2().min(moves[i].pcruise_v2);
        }
        if p == 0 {
            p = 1;
        }

        // Respect the softer smoothed-accel braking capacity of the tail as
        // well, so the next planning round cannot be left with an
        // unbrakeable committed velocity.
        let tail_smooth_cap: f64 = moves[p..].iter().map(|m| m.smooth_delta_v2).sum();
        let end_v2 = moves[p - 1]
            .fallback_decel
            .map_or(0.0, |g| g.calc_max_safe_v2())
            .min(moves[p.min(n - 1)].junction_max_v2)
            .min(moves[p - 1].pcruise_v2)
            .min(tail_smooth_cap);

        tracing::warn!(
            queued = n,
            flushing = p,
            end_v2,
            "lookahead starvation, committing partial flush"
        );

        self.backward_pass(p, end_v2);
        self.forward_pass(p)?;
        self.flush_count = p;
        self.smoothed_pass_limit = p;
        Ok(self.flush_count)
    }
}

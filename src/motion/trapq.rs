// src/motion/trapq.rs
//! Time-indexed trajectory queue.
//!
//! Planned moves are materialised onto an absolute timeline as up to three
//! segments each (accel, cruise, decel), every segment carrying its own
//! position polynomial. The queue keeps head and tail sentinels so temporal
//! queries just before the live window and just after the last segment stay
//! well defined, fills timeline gaps with null moves, and retains expired
//! segments in a bounded history for diagnostics.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::moveq::TrapAccelDecel;
use super::scurve::SCurve;

/// Sentinel timestamp far past any realistic print time.
pub const NEVER_TIME: f64 = 9_999_999_999_999_999.9;

/// Length cap on the first gap-filling null move.
const MAX_NULL_MOVE: f64 = 1.0;

/// Cartesian coordinate triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64, z: f64) -> Coord {
        Coord { x, y, z }
    }

    pub fn axis(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }
}

/// One trajectory segment on the timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrajMove {
    pub print_time: f64,
    pub move_t: f64,
    pub start_pos: Coord,
    /// Direction cosines; position is `start_pos + axes_r * s(t)`.
    pub axes_r: Coord,
    pub s: SCurve,
    pub accel_comp: f64,
}

impl TrajMove {
    /// Distance along the move at time `t` from the segment start.
    pub fn get_distance(&self, move_time: f64) -> f64 {
        self.s.eval(move_time)
    }

    /// Cartesian position at time `t` from the segment start.
    pub fn get_coord(&self, move_time: f64) -> Coord {
        let d = self.get_distance(move_time);
        Coord {
            x: self.start_pos.x + self.axes_r.x * d,
            y: self.start_pos.y + self.axes_r.y * d,
            z: self.start_pos.z + self.axes_r.z * d,
        }
    }
}

/// Historical segment in the flat pull format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PullMove {
    pub print_time: f64,
    pub move_t: f64,
    pub start_v: f64,
    pub start_x: f64,
    pub start_y: f64,
    pub start_z: f64,
    pub x_r: f64,
    pub y_r: f64,
    pub z_r: f64,
}

/// The trajectory queue. Index 0 is the head sentinel, the last index the
/// tail sentinel; live segments sit in between in time order.
#[derive(Debug)]
pub struct TrapQueue {
    moves: VecDeque<TrajMove>,
    history: VecDeque<TrajMove>,
}

impl Default for TrapQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TrapQueue {
    pub fn new() -> TrapQueue {
        let mut moves = VecDeque::new();
        moves.push_back(TrajMove::default());
        moves.push_back(TrajMove {
            print_time: NEVER_TIME,
            move_t: NEVER_TIME,
            ..TrajMove::default()
        });
        TrapQueue {
            moves,
            history: VecDeque::new(),
        }
    }

    /// Index of the tail sentinel.
    pub fn tail_index(&self) -> usize {
        self.moves.len() - 1
    }

    /// Count of live segments (sentinels excluded).
    pub fn len(&self) -> usize {
        self.moves.len() - 2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: usize) -> &TrajMove {
        &self.moves[idx]
    }

    /// Index of the first live segment, if any.
    pub fn first_index(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(1)
        }
    }

    /// Refresh the tail sentinel if a recent `add_move` left it stale.
    pub fn check_sentinels(&mut self) {
        let tail_idx = self.tail_index();
        if self.moves[tail_idx].print_time != 0.0 {
            return;
        }
        if tail_idx == 1 {
            self.moves[tail_idx].print_time = NEVER_TIME;
            self.moves[tail_idx].move_t = NEVER_TIME;
            return;
        }
        let prev = self.moves[tail_idx - 1];
        let tail = &mut self.moves[tail_idx];
        tail.print_time = prev.print_time + prev.move_t;
        tail.move_t = 0.0;
        tail.start_pos = prev.get_coord(prev.move_t);
    }

    /// Insert a segment before the tail sentinel, filling any timeline gap
    /// with a stationary null move.
    pub fn add_move(&mut self, m: TrajMove) {
        let prev = self.moves[self.tail_index() - 1];
        if prev.print_time + prev.move_t < m.print_time {
            let mut null_move = TrajMove {
                start_pos: m.start_pos,
                ..TrajMove::default()
            };
            if prev.print_time <= 0.0 && m.print_time > MAX_NULL_MOVE {
                null_move.print_time = m.print_time - MAX_NULL_MOVE;
            } else {
                null_move.print_time = prev.print_time + prev.move_t;
            }
            null_move.move_t = m.print_time - null_move.print_time;
            let at = self.tail_index();
            self.moves.insert(at, null_move);
        }
        let at = self.tail_index();
        self.moves.insert(at, m);
        // Mark the tail stale; check_sentinels recomputes it on demand.
        let tail_idx = self.tail_index();
        self.moves[tail_idx].print_time = 0.0;
        self.moves[tail_idx].move_t = 0.0;
    }

    /// Materialise a planned move starting at `print_time`: up to three
    /// segments sharing the direction cosines `axes_r`.
    pub fn append(
        &mut self,
        print_time: f64,
        start_pos: Coord,
        axes_r: Coord,
        ad: &TrapAccelDecel,
    ) {
        let mut time = print_time;
        let mut pos = start_pos;
        if ad.accel_t > 0.0 {
            let m = TrajMove {
                print_time: time,
                move_t: ad.accel_t,
                start_pos: pos,
                axes_r,
                s: ad.accel_scurve().unwrap_or_default(),
                accel_comp: ad.accel_comp,
            };
            self.add_move(m);
            time += ad.accel_t;
            pos = m.get_coord(ad.accel_t);
        }
        if ad.cruise_t > 0.0 {
            let m = TrajMove {
                print_time: time,
                move_t: ad.cruise_t,
                start_pos: pos,
                axes_r,
                s: SCurve {
                    c1: ad.cruise_v,
                    total_accel_t: ad.cruise_t,
                    ..SCurve::default()
                },
                accel_comp: ad.accel_comp,
            };
            self.add_move(m);
            time += ad.cruise_t;
            pos = m.get_coord(ad.cruise_t);
        }
        if ad.decel_t > 0.0 {
            let m = TrajMove {
                print_time: time,
                move_t: ad.decel_t,
                start_pos: pos,
                axes_r,
                s: ad.decel_scurve().unwrap_or_default(),
                accel_comp: ad.accel_comp,
            };
            self.add_move(m);
        }
        self.check_sentinels();
    }

    /// Drop live segments ending at or before `print_time`, retaining them
    /// in history; keep the head sentinel consistent for pre-window queries.
    pub fn free_moves(&mut self, print_time: f64) {
        self.finalize_moves(print_time, print_time - 30.0)
    }

    /// As `free_moves`, with an explicit horizon for trimming history.
    pub fn finalize_moves(&mut self, print_time: f64, clear_history_time: f64) {
        while self.moves.len() > 2 {
            let m = self.moves[1];
            if m.print_time + m.move_t > print_time {
                break;
            }
            let expired = self.moves.remove(1).expect("live segment");
            if expired.s != SCurve::default() {
                self.history.push_front(expired);
            }
        }
        if self.moves.len() == 2 {
            let tail_idx = self.tail_index();
            self.moves[tail_idx].print_time = NEVER_TIME;
            self.moves[tail_idx].move_t = NEVER_TIME;
        } else {
            // Keep queries just before the live window working: the head
            // sentinel holds the first surviving position over [0, first).
            let first = self.moves[1];
            let head = &mut self.moves[0];
            head.print_time = 0.0;
            head.move_t = first.print_time;
            head.start_pos = first.start_pos;
        }
        while let Some(last) = self.history.back() {
            if self.history.len() <= 1 || last.print_time + last.move_t > clear_history_time {
                break;
            }
            self.history.pop_back();
        }
    }

    /// Note an instantaneous position change at `print_time`.
    pub fn set_position(&mut self, print_time: f64, pos: Coord) {
        self.finalize_moves(NEVER_TIME, print_time - 30.0);
        while let Some(first) = self.history.front_mut() {
            if first.print_time < print_time {
                if first.print_time + first.move_t > print_time {
                    first.move_t = print_time - first.print_time;
                }
                break;
            }
            self.history.pop_front();
        }
        self.history.push_front(TrajMove {
            print_time,
            start_pos: pos,
            ..TrajMove::default()
        });
    }

    /// Walk from the hinted segment until `time` falls inside one; returns
    /// the segment index and the time local to it. Times outside the live
    /// window land on the nearest sentinel.
    pub fn find_move(&self, hint: usize, time: f64) -> (usize, f64) {
        let mut idx = hint.clamp(0, self.tail_index());
        while idx > 0 && time < self.moves[idx].print_time {
            idx -= 1;
        }
        while idx < self.tail_index()
            && time >= self.moves[idx].print_time + self.moves[idx].move_t
        {
            idx += 1;
        }
        (idx, time - self.moves[idx].print_time)
    }

    /// Integral of the axis position over `[start, end]` in absolute time,
    /// split across as many segments as the range covers.
    pub fn integrate(&self, hint: usize, axis: usize, start: f64, end: f64) -> f64 {
        if end <= start {
            return 0.0;
        }
        let (mut idx, _) = self.find_move(hint, start);
        let mut total = 0.0;
        let mut t = start;
        while t < end {
            let m = &self.moves[idx];
            let seg_end = if idx == self.tail_index() {
                end
            } else {
                (m.print_time + m.move_t).min(end)
            };
            let lo = t - m.print_time;
            let hi = seg_end - m.print_time;
            let base = m.start_pos.axis(axis);
            let r = m.axes_r.axis(axis);
            total += base * (hi - lo)
                + r * (m.s.tn_antiderivative(0, hi) - m.s.tn_antiderivative(0, lo));
            t = seg_end;
            if idx < self.tail_index() {
                idx += 1;
            }
        }
        total
    }

    /// In-flight and historical segments overlapping `[start_time,
    /// end_time]`, newest first, at most `max` entries.
    pub fn extract_old(&self, max: usize, start_time: f64, end_time: f64) -> Vec<PullMove> {
        let mut out = Vec::new();
        for i in (1..self.tail_index()).rev() {
            let m = &self.moves[i];
            if m.print_time > end_time {
                continue;
            }
            if m.print_time + m.move_t < start_time {
                break;
            }
            out.push(pull(m));
            if out.len() >= max {
                return out;
            }
        }
        for m in self.history.iter() {
            if m.print_time > end_time {
                continue;
            }
            if m.print_time + m.move_t < start_time && m.move_t > 0.0 {
                break;
            }
            out.push(pull(m));
            if out.len() >= max {
                break;
            }
        }
        out
    }
}

fn pull(m: &TrajMove) -> PullMove {
    PullMove {
        print_time: m.print_time,
        move_t: m.move_t,
        start_v: m.s.c1,
        start_x: m.start_pos.x,
        start_y: m.start_pos.y,
        start_z: m.start_pos.z,
        x_r: m.axes_r.x,
        y_r: m.axes_r.y,
        z_r: m.axes_r.z,
    }
}

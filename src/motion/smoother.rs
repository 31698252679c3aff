// src/motion/smoother.rs
//! Finite-support weighted-integral kernel for trajectory smoothing.
//!
//! The weight is `w(t) = (t^2 - h^2)^2` over `[-h, h]` and zero outside,
//! normalised by `15 / (16 h^5)` so a constant trajectory is reproduced
//! exactly. Integrals of segment polynomials against the weight reduce to
//! the segments' `t^n` antiderivatives.

use super::scurve::SCurve;

#[derive(Debug, Clone, Copy, Default)]
pub struct Smoother {
    /// Window half-width; zero disables the kernel.
    pub hst: f64,
    h2: f64,
    h4: f64,
    pub inv_norm: f64,
}

impl Smoother {
    pub fn new(hst: f64) -> Smoother {
        if hst <= 0.0 {
            return Smoother::default();
        }
        let h2 = hst * hst;
        Smoother {
            hst,
            h2,
            h4: h2 * h2,
            inv_norm: 15.0 / (16.0 * h2 * h2 * hst),
        }
    }

    pub fn enabled(&self) -> bool {
        self.hst > 0.0
    }

    /// The (unnormalised) weight at `t`.
    pub fn weight(&self, t: f64) -> f64 {
        if t.abs() >= self.hst {
            return 0.0;
        }
        let d = t * t - self.h2;
        d * d
    }

    /// Unnormalised integral of `(pos_offset + s(t)) * w(t + toff)` over
    /// `[start, end]` in the segment's local time.
    ///
    /// Two algebraically equal expansions are used: around the segment's
    /// own time when the window centre is close, and around the window
    /// centre (with the polynomial rebased) when it is far, which keeps the
    /// power sums small in both regimes.
    pub fn integrate_weighted(
        &self,
        pos_offset: f64,
        s: &SCurve,
        start: f64,
        end: f64,
        toff: f64,
    ) -> f64 {
        if end <= start {
            return 0.0;
        }
        if toff.abs() > self.hst {
            let mut shifted = *s;
            shifted.offset(-toff);
            let const_term = s.eval(-toff);
            return self.integrate_window(
                pos_offset + const_term,
                &shifted,
                start + toff,
                end + toff,
            );
        }
        // Expand w(t + toff) in powers of t; the support is |t + toff| < h.
        let t2 = toff * toff;
        let w = [
            t2 * t2 - 2.0 * self.h2 * t2 + self.h4,
            4.0 * toff * t2 - 4.0 * self.h2 * toff,
            6.0 * t2 - 2.0 * self.h2,
            4.0 * toff,
            1.0,
        ];
        let lo = start.max(-self.hst - toff);
        let hi = end.min(self.hst - toff);
        self.weighted_sum(pos_offset, s, lo, hi, &w)
    }

    /// As `integrate_weighted` with the weight already centred: integrates
    /// `(pos_offset + s(t)) * w(t)` over `[start, end]`.
    fn integrate_window(&self, pos_offset: f64, s: &SCurve, start: f64, end: f64) -> f64 {
        let w = [self.h4, 0.0, -2.0 * self.h2, 0.0, 1.0];
        let lo = start.max(-self.hst);
        let hi = end.min(self.hst);
        self.weighted_sum(pos_offset, s, lo, hi, &w)
    }

    fn weighted_sum(
        &self,
        pos_offset: f64,
        s: &SCurve,
        lo: f64,
        hi: f64,
        w: &[f64; 5],
    ) -> f64 {
        if hi <= lo {
            return 0.0;
        }
        let mut total = 0.0;
        let mut lo_pow = lo;
        let mut hi_pow = hi;
        for (n, &wn) in w.iter().enumerate() {
            if wn != 0.0 {
                let poly = s.tn_antiderivative(n as u32, hi) - s.tn_antiderivative(n as u32, lo);
                let base = pos_offset * (hi_pow - lo_pow) / (n as f64 + 1.0);
                total += wn * (poly + base);
            }
            lo_pow *= lo;
            hi_pow *= hi;
        }
        total
    }

    /// Boundary correction for velocity discontinuities when adjacent
    /// segments are chained: `v(start) * w(start + toff) - v(end) *
    /// w(end + toff)`.
    pub fn integrate_velocity_jumps(
        &self,
        s: &SCurve,
        start: f64,
        end: f64,
        toff: f64,
    ) -> f64 {
        s.velocity(start) * self.weight(start + toff)
            - s.velocity(end) * self.weight(end + toff)
    }
}

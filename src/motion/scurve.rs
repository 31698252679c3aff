// src/motion/scurve.rs
//! Bezier-polynomial S-curve segments.
//!
//! A segment stores the position polynomial of one acceleration (or
//! deceleration) ramp slice as six coefficients over local time, with no
//! constant term: position is always 0 at t=0. The profile order selects the
//! smoothness of the ramp: order 2 is constant acceleration, order 4 removes
//! acceleration steps, order 6 additionally removes snap and crackle steps.

/// Convergence bound for the distance -> time bisection.
const BISECT_TOL: f64 = 1e-9;

/// Position polynomial of one ramp slice.
///
/// Coefficients are for `d(t) = c1*t + c2*t^2 + ... + c6*t^6` with `t` local
/// to the slice. `total_accel_t` is the duration of the full ramp this slice
/// belongs to; it bounds the inverse (distance -> time) search.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SCurve {
    pub c1: f64,
    pub c2: f64,
    pub c3: f64,
    pub c4: f64,
    pub c5: f64,
    pub c6: f64,
    pub total_accel_t: f64,
}

impl SCurve {
    /// Build the ramp polynomial for one move's slice of a (possibly
    /// multi-move) ramp.
    ///
    /// The base polynomial is anchored at the ramp start, where velocity is
    /// `start_accel_v`; `accel_offset_t` then rebases it so local t=0 is the
    /// start of this slice. `effective_accel` is the mean acceleration over
    /// the full ramp (signed; negative for deceleration slices).
    pub fn fill(
        accel_order: u8,
        _accel_t: f64,
        accel_offset_t: f64,
        total_accel_t: f64,
        start_accel_v: f64,
        effective_accel: f64,
    ) -> SCurve {
        let mut s = SCurve {
            total_accel_t,
            ..SCurve::default()
        };
        match accel_order {
            4 if total_accel_t > 0.0 => {
                // v(t) = start_v + a*T * (3u^2 - 2u^3), u = t/T
                let inv_t = 1.0 / total_accel_t;
                s.c4 = -0.5 * effective_accel * inv_t * inv_t;
                s.c3 = effective_accel * inv_t;
                s.c1 = start_accel_v;
            }
            6 if total_accel_t > 0.0 => {
                // v(t) = start_v + a*T * (10u^3 - 15u^4 + 6u^5)
                let inv_t = 1.0 / total_accel_t;
                let inv_t2 = inv_t * inv_t;
                s.c6 = effective_accel * inv_t2 * inv_t2;
                s.c5 = -3.0 * effective_accel * inv_t2 * inv_t;
                s.c4 = 2.5 * effective_accel * inv_t2;
                s.c1 = start_accel_v;
            }
            _ => {
                s.c2 = 0.5 * effective_accel;
                s.c1 = start_accel_v;
            }
        }
        s.offset(accel_offset_t);
        s
    }

    /// Rebase the polynomial to be evaluated at `t + offset_t`, dropping the
    /// constant term so position stays 0 at local t=0.
    pub fn offset(&mut self, offset_t: f64) {
        if offset_t == 0.0 {
            return;
        }
        let o = offset_t;
        self.c1 += (((((6.0 * self.c6 * o) + 5.0 * self.c5) * o + 4.0 * self.c4) * o
            + 3.0 * self.c3)
            * o
            + 2.0 * self.c2)
            * o;
        self.c2 += (((15.0 * self.c6 * o + 10.0 * self.c5) * o + 6.0 * self.c4) * o
            + 3.0 * self.c3)
            * o;
        self.c3 += ((20.0 * self.c6 * o + 10.0 * self.c5) * o + 4.0 * self.c4) * o;
        self.c4 += (15.0 * self.c6 * o + 5.0 * self.c5) * o;
        self.c5 += 6.0 * self.c6 * o;
    }

    /// Distance travelled at local time `t`.
    pub fn eval(&self, t: f64) -> f64 {
        t * (self.c1
            + t * (self.c2 + t * (self.c3 + t * (self.c4 + t * (self.c5 + t * self.c6)))))
    }

    /// Velocity (formal derivative) at local time `t`.
    pub fn velocity(&self, t: f64) -> f64 {
        self.c1
            + t * (2.0 * self.c2
                + t * (3.0 * self.c3
                    + t * (4.0 * self.c4 + t * (5.0 * self.c5 + t * 6.0 * self.c6))))
    }

    /// Acceleration (second derivative) at local time `t`.
    pub fn accel(&self, t: f64) -> f64 {
        2.0 * self.c2
            + t * (6.0 * self.c3
                + t * (12.0 * self.c4 + t * (20.0 * self.c5 + t * 30.0 * self.c6)))
    }

    /// Invert the (monotone) position polynomial: local time at which
    /// `distance` is reached, searched over `[0, total_accel_t]`.
    pub fn get_time(&self, distance: f64) -> f64 {
        let mut low = 0.0;
        let mut high = self.total_accel_t;
        if self.eval(high) <= distance {
            return high;
        }
        while high - low > BISECT_TOL {
            let mid = 0.5 * (low + high);
            if self.eval(mid) < distance {
                low = mid;
            } else {
                high = mid;
            }
        }
        0.5 * (low + high)
    }

    /// Copy with every coefficient scaled by `r`; `total_accel_t` is kept.
    pub fn copy_scaled(&self, r: f64) -> SCurve {
        SCurve {
            c1: r * self.c1,
            c2: r * self.c2,
            c3: r * self.c3,
            c4: r * self.c4,
            c5: r * self.c5,
            c6: r * self.c6,
            total_accel_t: self.total_accel_t,
        }
    }

    /// Add `r * src'(t)` into this polynomial. The derivative's constant term
    /// (`r * src.c1`) cannot be represented and is returned for the caller to
    /// fold into its position offset.
    pub fn add_deriv(&mut self, src: &SCurve, r: f64) -> f64 {
        self.c1 += 2.0 * r * src.c2;
        self.c2 += 3.0 * r * src.c3;
        self.c3 += 4.0 * r * src.c4;
        self.c4 += 5.0 * r * src.c5;
        self.c5 += 6.0 * r * src.c6;
        r * src.c1
    }

    /// Add `r * src''(t)` into this polynomial; returns the dropped constant
    /// term `r * 2 * src.c2`.
    pub fn add_2nd_deriv(&mut self, src: &SCurve, r: f64) -> f64 {
        self.c1 += 6.0 * r * src.c3;
        self.c2 += 12.0 * r * src.c4;
        self.c3 += 20.0 * r * src.c5;
        self.c4 += 30.0 * r * src.c6;
        2.0 * r * src.c2
    }

    /// Antiderivative of `t^n * s(t)` evaluated at `t` (integration constant
    /// zero). `n` must be at most 4; the weight kernels never need more.
    pub fn tn_antiderivative(&self, n: u32, t: f64) -> f64 {
        debug_assert!(n <= 4);
        let n = n as f64;
        // Horner over t^(n+1) * (c1*t/(n+2) + c2*t^2/(n+3) + ...)
        let mut acc = self.c6 * t / (n + 7.0);
        acc = (acc + self.c5 / (n + 6.0)) * t;
        acc = (acc + self.c4 / (n + 5.0)) * t;
        acc = (acc + self.c3 / (n + 4.0)) * t;
        acc = (acc + self.c2 / (n + 3.0)) * t;
        acc = (acc + self.c1 / (n + 2.0)) * t;
        acc * t.powi(n as i32 + 1)
    }
}

/// Largest admissible acceleration-compensation coefficient for a ramp of
/// duration `accel_t`: larger values make velocity go negative inside the
/// ramp for the given profile order.
pub fn max_accel_comp(accel_order: u8, accel_t: f64) -> f64 {
    match accel_order {
        4 => accel_t * accel_t / 6.0,
        6 => 0.159 * accel_t * accel_t,
        _ => f64::INFINITY,
    }
}

// src/motion/kinematics/shaper.rs
//! Input-shaper convolution filter.
//!
//! Each shaped axis replaces its commanded position with a sum of delayed,
//! amplitude-weighted copies of the trajectory tuned to cancel the machine's
//! dominant resonance. Impulse trains are the classical ZV family plus the
//! extra-insensitive shapers; amplitudes always sum to one and the train is
//! centred so the filter adds no net transport delay.

use super::super::trapq::{Coord, TrajMove, TrapQueue};
use super::{scratch_move, AxisFlags, PositionHook, DUMMY_T};
use crate::error::MotionError;

/// Vibration tolerance of the EI shaper family.
const EI_VIBRATION_TOL: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaperType {
    Zv,
    Zvd,
    Zvdd,
    Zvddd,
    Ei,
    TwoHumpEi,
}

impl ShaperType {
    pub fn from_name(name: &str) -> Result<ShaperType, MotionError> {
        match name {
            "zv" => Ok(ShaperType::Zv),
            "zvd" => Ok(ShaperType::Zvd),
            "zvdd" => Ok(ShaperType::Zvdd),
            "zvddd" => Ok(ShaperType::Zvddd),
            "ei" => Ok(ShaperType::Ei),
            "2hump_ei" => Ok(ShaperType::TwoHumpEi),
            other => Err(MotionError::InvalidShaper {
                name: other.to_string(),
            }),
        }
    }
}

/// One impulse of a shaper train.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pulse {
    pub t: f64,
    pub a: f64,
}

/// Build the impulse train for a shaper over the damped resonance period.
/// Amplitudes are normalised to sum to one and the train is shifted to be
/// symmetric around zero time.
pub fn shaper_pulses(
    shaper: ShaperType,
    damped_period: f64,
    damping_ratio: f64,
) -> Vec<Pulse> {
    let df = (1.0 - damping_ratio * damping_ratio).sqrt();
    let k = (-damping_ratio * std::f64::consts::PI / df).exp();
    let t_d = damped_period;
    let half = 0.5 * t_d;
    let (amps, times): (Vec<f64>, Vec<f64>) = match shaper {
        ShaperType::Zv => (vec![1.0, k], vec![0.0, half]),
        ShaperType::Zvd => (vec![1.0, 2.0 * k, k * k], vec![0.0, half, t_d]),
        ShaperType::Zvdd => (
            vec![1.0, 3.0 * k, 3.0 * k * k, k * k * k],
            vec![0.0, half, t_d, 1.5 * t_d],
        ),
        ShaperType::Zvddd => (
            vec![1.0, 4.0 * k, 6.0 * k * k, 4.0 * k * k * k, k * k * k * k],
            vec![0.0, half, t_d, 1.5 * t_d, 2.0 * t_d],
        ),
        ShaperType::Ei => {
            let v = EI_VIBRATION_TOL;
            let a1 = 0.25 * (1.0 + v);
            let a2 = 0.5 * (1.0 - v) * k;
            let a3 = a1 * k * k;
            (vec![a1, a2, a3], vec![0.0, half, t_d])
        }
        ShaperType::TwoHumpEi => {
            // Polynomial expansion in the damping ratio; times are in units
            // of the undamped resonance period.
            let z = damping_ratio;
            let z2 = z * z;
            let z3 = z2 * z;
            let a1 = 0.16054 + 0.76699 * z + 2.26560 * z2 - 1.22750 * z3;
            let a2 = 0.33911 + 0.45081 * z - 2.58080 * z2 + 1.73650 * z3;
            let a3 = 0.34089 - 0.61533 * z - 0.68765 * z2 + 0.42261 * z3;
            let a4 = 0.15997 - 0.60246 * z + 1.00280 * z2 - 0.93145 * z3;
            let t_u = t_d * df;
            let t2 = (0.49890 + 0.16270 * z + 0.54262 * z2 + 6.16180 * z3) * t_u;
            let t3 = (0.99748 + 0.18382 * z - 1.58270 * z2 + 8.17120 * z3) * t_u;
            let t4 = (1.49920 - 0.09297 * z - 0.28338 * z2 + 1.85710 * z3) * t_u;
            (vec![a1, a2, a3, a4], vec![0.0, t2, t3, t4])
        }
    };

    let inv_d: f64 = amps.iter().sum();
    let n = amps.len();
    // Store reversed against the traditional definition: the convolution
    // reads the trajectory at t + t_i.
    let mut pulses: Vec<Pulse> = (0..n)
        .map(|i| Pulse {
            t: -times[i],
            a: amps[i] / inv_d,
        })
        .rev()
        .collect();
    // Centre the train on its window midpoint.
    let shift = 0.5 * (pulses[0].t + pulses[n - 1].t);
    for p in pulses.iter_mut() {
        p.t -= shift;
    }
    pulses
}

pub struct InputShaper {
    orig: Box<dyn PositionHook + Send>,
    pulses: [Option<Vec<Pulse>>; 2],
}

impl InputShaper {
    pub fn new(orig: Box<dyn PositionHook + Send>) -> InputShaper {
        InputShaper {
            orig,
            pulses: [None, None],
        }
    }

    /// Configure shaping for one axis (0 = x, 1 = y). On error the previous
    /// configuration is left untouched.
    pub fn set_shaper_params(
        &mut self,
        axis: usize,
        shaper: ShaperType,
        damped_period: f64,
        damping_ratio: f64,
    ) -> Result<(), MotionError> {
        if axis > 1 || !self.orig.active_flags().has(axis) {
            return Err(MotionError::InactiveAxis {
                axis: if axis == 0 { 'x' } else { 'y' },
            });
        }
        if !(damped_period > 0.0) || !(0.0..1.0).contains(&damping_ratio) {
            return Err(MotionError::InvalidShaper {
                name: format!(
                    "period {} / damping_ratio {}",
                    damped_period, damping_ratio
                ),
            });
        }
        self.pulses[axis] = Some(shaper_pulses(shaper, damped_period, damping_ratio));
        Ok(())
    }

    pub fn disable_shaping(&mut self, axis: usize) {
        if axis <= 1 {
            self.pulses[axis] = None;
        }
    }

    fn shaped_axis(&self, tq: &TrapQueue, hint: usize, time: f64, axis: usize) -> f64 {
        let pulses = self.pulses[axis].as_ref().expect("configured axis");
        let mut pos = 0.0;
        let mut idx = hint;
        for p in pulses {
            let (i, lt) = tq.find_move(idx, time + p.t);
            pos += p.a * tq.get(i).get_coord(lt).axis(axis);
            idx = i;
        }
        pos
    }
}

impl PositionHook for InputShaper {
    fn calc_position(&mut self, tq: &TrapQueue, idx: usize, move_time: f64) -> f64 {
        let m = tq.get(idx);
        let time = m.print_time + move_time;
        let raw = m.get_coord(move_time);
        let flags = self.orig.active_flags();
        let mut pos = raw;
        for axis in 0..2 {
            if self.pulses[axis].is_some() && flags.has(axis) {
                let v = self.shaped_axis(tq, idx, time, axis);
                match axis {
                    0 => pos.x = v,
                    _ => pos.y = v,
                }
            }
        }
        let scratch = scratch_move(Coord::new(pos.x, pos.y, raw.z));
        self.orig.calc_scratch(&scratch, DUMMY_T)
    }

    fn calc_scratch(&mut self, m: &TrajMove, move_time: f64) -> f64 {
        self.orig.calc_scratch(m, move_time)
    }

    fn active_flags(&self) -> AxisFlags {
        self.orig.active_flags()
    }

    fn gen_steps_pre_active(&self) -> f64 {
        let w = self
            .pulses
            .iter()
            .flatten()
            .map(|p| -p[0].t)
            .fold(0.0, f64::max);
        w + self.orig.gen_steps_pre_active()
    }

    fn gen_steps_post_active(&self) -> f64 {
        let w = self
            .pulses
            .iter()
            .flatten()
            .map(|p| p[p.len() - 1].t)
            .fold(0.0, f64::max);
        w + self.orig.gen_steps_post_active()
    }
}

#[cfg(test)]
mod tests {
    use super::super::CartesianAxis;
    use super::*;
    use crate::motion::moveq::TrapAccelDecel;

    #[test]
    fn every_shaper_normalises_to_unit_gain() {
        for shaper in [
            ShaperType::Zv,
            ShaperType::Zvd,
            ShaperType::Zvdd,
            ShaperType::Zvddd,
            ShaperType::Ei,
            ShaperType::TwoHumpEi,
        ] {
            let pulses = shaper_pulses(shaper, 0.04, 0.1);
            let sum: f64 = pulses.iter().map(|p| p.a).sum();
            assert!((sum - 1.0).abs() < 1e-12, "{:?} sum {}", shaper, sum);
            for w in pulses.windows(2) {
                assert!(w[0].t < w[1].t, "{:?} pulses out of order", shaper);
            }
        }
    }

    #[test]
    fn zv_pulses_match_the_damped_spring_model() {
        // damping 0.1, damped period 0.04: impulses at +/-10ms with
        // amplitudes K/(1+K) and 1/(1+K).
        let pulses = shaper_pulses(ShaperType::Zv, 0.04, 0.1);
        assert_eq!(pulses.len(), 2);
        let df = (1.0_f64 - 0.01).sqrt();
        let k = (-0.1 * std::f64::consts::PI / df).exp();
        assert!((pulses[0].t + 0.01).abs() < 1e-12);
        assert!((pulses[1].t - 0.01).abs() < 1e-12);
        assert!((pulses[0].a - k / (1.0 + k)).abs() < 1e-12);
        assert!((pulses[1].a - 1.0 / (1.0 + k)).abs() < 1e-12);
        assert!((pulses[0].a - 0.4223).abs() < 1e-3);
        assert!((pulses[1].a - 0.5777).abs() < 1e-3);
    }

    #[test]
    fn shaper_counts_match_their_definitions() {
        assert_eq!(shaper_pulses(ShaperType::Zv, 0.04, 0.1).len(), 2);
        assert_eq!(shaper_pulses(ShaperType::Zvd, 0.04, 0.1).len(), 3);
        assert_eq!(shaper_pulses(ShaperType::Zvdd, 0.04, 0.1).len(), 4);
        assert_eq!(shaper_pulses(ShaperType::Zvddd, 0.04, 0.1).len(), 5);
        assert_eq!(shaper_pulses(ShaperType::Ei, 0.04, 0.1).len(), 3);
        assert_eq!(shaper_pulses(ShaperType::TwoHumpEi, 0.04, 0.1).len(), 4);
    }

    #[test]
    fn invalid_configuration_keeps_previous_state() {
        let mut is = InputShaper::new(Box::new(CartesianAxis::new(0)));
        is.set_shaper_params(0, ShaperType::Zv, 0.04, 0.1).unwrap();
        assert!(is.set_shaper_params(1, ShaperType::Zv, 0.04, 0.1).is_err());
        assert!(is.set_shaper_params(0, ShaperType::Zv, -1.0, 0.1).is_err());
        assert!(ShaperType::from_name("nope").is_err());
        // The x axis keeps its valid configuration.
        assert!(is.pulses[0].is_some());
        assert!(is.pulses[1].is_none());
    }

    #[test]
    fn step_trajectory_yields_the_impulse_train_response() {
        // A fast position step shaped by ZV turns into two delayed steps
        // scaled by the impulse amplitudes.
        let mut tq = TrapQueue::new();
        let step_t = 1e-4;
        let ad = TrapAccelDecel {
            cruise_t: step_t,
            cruise_v: 10.0 / step_t,
            accel_order: 2,
            ..TrapAccelDecel::default()
        };
        tq.append(1.0, Coord::default(), Coord::new(1.0, 0.0, 0.0), &ad);
        let mut is = InputShaper::new(Box::new(CartesianAxis::new(0)));
        is.set_shaper_params(0, ShaperType::Zv, 0.04, 0.1).unwrap();
        let pulses = shaper_pulses(ShaperType::Zv, 0.04, 0.1);
        let idx = tq.first_index().unwrap();

        // Before either impulse window reaches the step: position 0.
        let (b_idx, b_t) = tq.find_move(idx, 0.95);
        let before = is.calc_position(&tq, b_idx, b_t);
        assert!(before.abs() < 1e-9);
        // Between the two responses only the look-ahead impulse sees the
        // step, scaling it by its amplitude.
        let (mid_idx, mid_t) = tq.find_move(idx, 1.005);
        let mid = is.calc_position(&tq, mid_idx, mid_t);
        assert!((mid - pulses[1].a * 10.0).abs() < 1e-6, "mid {}", mid);
        // Past both: the full step.
        let (late_idx, late_t) = tq.find_move(idx, 1.05);
        let late = is.calc_position(&tq, late_idx, late_t);
        assert!((late - 10.0).abs() < 1e-9);
    }
}

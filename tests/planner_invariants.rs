// Integration tests: universal invariants of the look-ahead planner.
// Every planning run, whatever the move mix, must respect these.

use motion_host::motion::moveq::{MoveParams, MoveQueue, TrapAccelDecel};
use motion_host::motion::trapq::{Coord, TrapQueue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EPS: f64 = 1e-9;

fn random_params(rng: &mut StdRng) -> MoveParams {
    let accel_order = [2u8, 4, 6][rng.random_range(0..3)];
    MoveParams {
        move_d: rng.random_range(0.5..30.0),
        junction_max_v2: rng.random_range(0.0..10000.0),
        velocity: rng.random_range(20.0..150.0),
        accel_order,
        accel: rng.random_range(1000.0..5000.0),
        smoothed_accel: rng.random_range(800.0..3000.0),
        jerk: rng.random_range(20000.0..200000.0),
        min_jerk_limit_time: 0.02,
        accel_comp: 0.0,
    }
}

fn plan_and_drain(params: &[MoveParams]) -> Vec<(MoveParams, TrapAccelDecel)> {
    let mut mq = MoveQueue::new();
    for p in params {
        mq.add(p).unwrap();
    }
    let n = mq.plan(false).unwrap();
    assert_eq!(n, params.len());
    let mut out = Vec::new();
    for p in params {
        let (ad, _) = mq.getmove().unwrap();
        out.push((*p, ad));
    }
    out
}

fn check_invariants(emitted: &[(MoveParams, TrapAccelDecel)]) {
    let mut prev_end_v = 0.0;
    for (i, (p, ad)) in emitted.iter().enumerate() {
        // Velocity continuity across every junction.
        let start_v = ad.start_velocity();
        assert!(
            (start_v - prev_end_v).abs() <= 1e-4,
            "move {}: start {} vs prev end {}",
            i,
            start_v,
            prev_end_v
        );
        prev_end_v = ad.end_velocity();

        // Per-move distance closure.
        let accel_d = ad.accel_scurve().map_or(0.0, |s| s.eval(ad.accel_t));
        let decel_d = ad.decel_scurve().map_or(0.0, |s| s.eval(ad.decel_t));
        let total = accel_d + ad.cruise_v * ad.cruise_t + decel_d;
        assert!(
            (total - p.move_d).abs() < 1e-6,
            "move {}: distance {} vs {}",
            i,
            total,
            p.move_d
        );

        // Cap compliance.
        assert!(ad.cruise_v * ad.cruise_v <= p.velocity * p.velocity + 1e-6);
        if i > 0 {
            assert!(
                start_v * start_v <= p.junction_max_v2 + 1e-6,
                "move {}: start_v^2 {} above junction cap {}",
                i,
                start_v * start_v,
                p.junction_max_v2
            );
        }

        // Jerk limit on jerk-limited ramps longer than the floor window.
        if p.accel_order != 2 {
            for (eff, total_t) in [
                (ad.effective_accel, ad.total_accel_t),
                (ad.effective_decel, ad.total_decel_t),
            ] {
                if total_t >= p.min_jerk_limit_time {
                    assert!(
                        6.0 * eff / total_t <= p.jerk + 1e-6,
                        "move {}: ramp jerk {} above {}",
                        i,
                        6.0 * eff / total_t,
                        p.jerk
                    );
                }
            }
        }

        // Monotone position and distance/time round trip on each ramp.
        for s in [ad.accel_scurve(), ad.decel_scurve()].into_iter().flatten() {
            let span = s.total_accel_t;
            let mut prev_d = -EPS;
            for k in 0..=50 {
                let t = span * k as f64 / 50.0;
                let d = s.eval(t);
                assert!(d >= prev_d - 1e-9, "position not monotone");
                prev_d = d;
                let back = s.get_time(d);
                assert!((s.eval(back) - d).abs() < 1e-8, "round trip drift");
            }
        }
    }
    assert!(prev_end_v.abs() < 1e-4, "queue must end at rest");
}

#[test]
fn invariants_hold_for_random_order2_queues() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..20 {
        let n = rng.random_range(1..12);
        let params: Vec<MoveParams> = (0..n)
            .map(|_| {
                let mut p = random_params(&mut rng);
                p.accel_order = 2;
                p.jerk = f64::INFINITY;
                p.min_jerk_limit_time = 0.0;
                p
            })
            .collect();
        check_invariants(&plan_and_drain(&params));
    }
}

#[test]
fn invariants_hold_for_random_jerk_limited_queues() {
    let mut rng = StdRng::seed_from_u64(0xc0ffee);
    for _ in 0..20 {
        let n = rng.random_range(1..12);
        let params: Vec<MoveParams> = (0..n).map(|_| random_params(&mut rng)).collect();
        check_invariants(&plan_and_drain(&params));
    }
}

#[test]
fn trajectory_queue_stays_time_ordered() {
    let mut rng = StdRng::seed_from_u64(7);
    let params: Vec<MoveParams> = (0..8).map(|_| random_params(&mut rng)).collect();
    let emitted = plan_and_drain(&params);

    let mut tq = TrapQueue::new();
    let mut time = 0.0;
    let mut pos = Coord::default();
    for (_, ad) in &emitted {
        tq.append(time, pos, Coord::new(1.0, 0.0, 0.0), ad);
        let dist = ad.accel_scurve().map_or(0.0, |s| s.eval(ad.accel_t))
            + ad.cruise_v * ad.cruise_t
            + ad.decel_scurve().map_or(0.0, |s| s.eval(ad.decel_t));
        pos.x += dist;
        time += ad.total_time();
    }
    for i in 1..=tq.tail_index() {
        let prev = tq.get(i - 1);
        let next = tq.get(i);
        assert!(
            prev.print_time + prev.move_t <= next.print_time + EPS,
            "segment {} out of order",
            i
        );
    }
}

#[test]
fn planning_twice_emits_identical_descriptors() {
    let mut rng = StdRng::seed_from_u64(42);
    let params: Vec<MoveParams> = (0..6).map(|_| random_params(&mut rng)).collect();

    let mut once = MoveQueue::new();
    let mut twice = MoveQueue::new();
    for p in &params {
        once.add(p).unwrap();
        twice.add(p).unwrap();
    }
    once.plan(false).unwrap();
    twice.plan(false).unwrap();
    twice.plan(false).unwrap();
    for _ in 0..params.len() {
        let (a, _) = once.getmove().unwrap();
        let (b, _) = twice.getmove().unwrap();
        assert_eq!(a, b);
    }
}

#[test]
fn starvation_fallback_guarantees_progress() {
    let mut mq = MoveQueue::with_queue_bound(16);
    // A long monotone queue whose cruise cap is never reachable never locks
    // a peak on its own.
    for _ in 0..20 {
        let p = MoveParams {
            move_d: 2.0,
            junction_max_v2: 1e9,
            velocity: 1000.0,
            accel_order: 2,
            accel: 3000.0,
            smoothed_accel: 3000.0,
            jerk: f64::INFINITY,
            min_jerk_limit_time: 0.0,
            accel_comp: 0.0,
        };
        mq.add(&p).unwrap();
    }
    let flushed = mq.plan(true).unwrap();
    assert!(flushed >= 1, "starvation fallback must make progress");
    let mut prev_end = 0.0;
    for _ in 0..flushed {
        let (ad, _) = mq.getmove().unwrap();
        assert!((ad.start_velocity() - prev_end).abs() < 1e-4);
        prev_end = ad.end_velocity();
    }
    // The committed tail velocity remains brakeable by the rest.
    let rest = mq.plan(false).unwrap();
    for _ in 0..rest {
        let (ad, _) = mq.getmove().unwrap();
        assert!((ad.start_velocity() - prev_end).abs() < 1e-4);
        prev_end = ad.end_velocity();
    }
    assert!(prev_end.abs() < 1e-4);
}

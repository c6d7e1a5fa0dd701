use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geom::{ParPos, ParTransform, ParamAxis, Tolerance};

fn all_transforms() -> Vec<ParTransform> {
    vec![
        ParTransform::Identity,
        ParTransform::FlipU,
        ParTransform::FlipV,
        ParTransform::Swap,
        ParTransform::Rotate90,
        ParTransform::Rotate180,
        ParTransform::Rotate270,
        ParTransform::scale(2.5, -0.4).unwrap(),
        ParTransform::scale(-1e-3, 7.0).unwrap(),
    ]
}

#[test]
fn every_transform_round_trips_random_points() {
    let mut rng = StdRng::seed_from_u64(0x5eed_f00d);
    let tol = Tolerance::new(1e-12);
    for t in all_transforms() {
        for _ in 0..10_000 {
            let p = ParPos::new(rng.random_range(-100.0..100.0), rng.random_range(-100.0..100.0));
            assert!(t.round_trips(p, tol), "{t:?} failed at {p:?}");
            let back = t.inverse().invert(t.invert(t.forward(t.inverse().forward(p))));
            let same = tol.approx_eq_f64(back.u, p.u) && tol.approx_eq_f64(back.v, p.v);
            assert!(same, "{t:?} inverse at {p:?}");
        }
    }
}

#[test]
fn local_altitude_follows_altitude_direction() {
    let mut rng = StdRng::seed_from_u64(42);
    for t in all_transforms() {
        let axis = t.altitude_direction();
        let cross = axis.other();
        for _ in 0..256 {
            let p = ParPos::new(rng.random_range(-100.0..100.0), rng.random_range(-100.0..100.0));
            let q = t.forward(p);
            let expected_alt = t.altitude_scale() * axis.of(p).abs();
            let expected_cross = t.cross_scale() * cross.of(p).abs();
            assert!((q.u.abs() - expected_alt).abs() <= 1e-9 * expected_alt.max(1.0), "{t:?}");
            assert!((q.v.abs() - expected_cross).abs() <= 1e-9 * expected_cross.max(1.0), "{t:?}");
        }
    }
}

#[test]
fn reflections_are_flagged() {
    let flagged: Vec<bool> = all_transforms().iter().map(ParTransform::is_reflection).collect();
    assert_eq!(flagged, vec![false, true, true, true, false, false, false, true, true]);
    assert_eq!(ParTransform::Swap.altitude_direction(), ParamAxis::V);
}

use campusgraph_model::{
    euclidean_distance, planar_distance, vertical_separation, Position, Thresholds,
};
use proptest::prelude::*;

fn coord() -> impl Strategy<Value = f64> {
    -1.0e4f64..1.0e4f64
}

fn position() -> impl Strategy<Value = Position> {
    (coord(), coord(), coord()).prop_map(|(x, y, z)| Position::new(x, y, z))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn planar_distance_is_symmetric_and_non_negative(a in position(), b in position()) {
        let ab = planar_distance(&a, &b).unwrap();
        let ba = planar_distance(&b, &a).unwrap();
        prop_assert!(ab >= 0.0);
        prop_assert!((ab - ba).abs() <= 1e-9 * ab.max(1.0));
    }

    #[test]
    fn planar_distance_never_exceeds_euclidean(a in position(), b in position()) {
        let planar = planar_distance(&a, &b).unwrap();
        prop_assert!(planar <= euclidean_distance(&a, &b) + 1e-6);
    }

    #[test]
    fn planar_distance_scales_linearly(a in position(), b in position(), factor in 0.01f64..100.0) {
        let raw = planar_distance(&a, &b).unwrap();
        let scaled = planar_distance(&a.scaled(factor), &b.scaled(factor)).unwrap();
        prop_assert!((scaled - raw * factor).abs() <= 1e-6 * scaled.max(1.0));
    }

    #[test]
    fn euclidean_splits_into_planar_and_vertical(a in position(), b in position()) {
        let planar = planar_distance(&a, &b).unwrap();
        let vertical = vertical_separation(&a, &b);
        let full = euclidean_distance(&a, &b);
        prop_assert!((full * full - (planar * planar + vertical * vertical)).abs() <= 1e-3 * full.max(1.0) * full.max(1.0));
    }

    #[test]
    fn must_merge_implies_close(planar in 0.0f64..10.0) {
        let t = Thresholds::INDOOR;
        if t.must_merge(planar) {
            prop_assert!(t.is_close(planar));
        }
    }
}

//! Clustering of alpha histograms into segments.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zenvp8::encoder::segment::{assign_segments, kmeans, segment_alphas};

// Up to four lumps of alphas, at least 40 apart.
fn lumpy_histogram(rng: &mut StdRng) -> [u32; 256] {
    let mut alphas = [0u32; 256];
    let lumps = rng.gen_range(1..=4);
    for i in 0..lumps {
        let center = 20 + i * 60 + rng.gen_range(0..20);
        for _ in 0..rng.gen_range(1..6) {
            let a = center + rng.gen_range(0..8) - 4;
            alphas[a] += rng.gen_range(1..50);
        }
    }
    alphas
}

#[test]
fn reseeding_with_settled_centers_is_a_fixed_point() {
    let mut rng = StdRng::seed_from_u64(0x5e6);
    for round in 0..200 {
        let alphas = lumpy_histogram(&mut rng);
        let nb = rng.gen_range(1..=4);
        let mut clustering = assign_segments(&alphas, nb);
        let mut settled = false;
        for _ in 0..10 {
            let next = kmeans(&alphas, nb, clustering.centers);
            let unchanged = next.centers == clustering.centers;
            clustering = next;
            if unchanged {
                settled = true;
                break;
            }
        }
        assert!(settled, "round {round}");
        let again = kmeans(&alphas, nb, clustering.centers);
        assert_eq!(again.centers, clustering.centers, "round {round}");
        assert_eq!(again.map, clustering.map, "round {round}");
        assert_eq!(again.iterations, 1);
    }
}

#[test]
fn populated_segments_never_exceed_the_request() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..200 {
        let alphas: [u32; 256] = core::array::from_fn(|_| {
            if rng.gen_bool(0.1) {
                rng.gen_range(1..100)
            } else {
                0
            }
        });
        let nb = rng.gen_range(1..=4);
        let clustering = assign_segments(&alphas, nb);
        let mut used = [false; 4];
        for (a, &count) in alphas.iter().enumerate() {
            if count > 0 {
                used[usize::from(clustering.map[a])] = true;
            }
        }
        assert!(used.iter().filter(|&&u| u).count() <= nb);
        assert!(clustering.map.iter().all(|&s| usize::from(s) < nb));
    }
}

#[test]
fn segment_alphas_stay_in_range() {
    let mut rng = StdRng::seed_from_u64(9);
    for _ in 0..100 {
        let centers: Vec<i32> = (0..4).map(|_| rng.gen_range(0..=255)).collect();
        let mid = rng.gen_range(0..=255);
        for (alpha, beta) in segment_alphas(&centers, mid) {
            assert!((-127..=127).contains(&alpha));
            assert!((0..=255).contains(&beta));
        }
    }
}

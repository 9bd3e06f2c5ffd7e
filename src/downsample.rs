//! Largest-Triangle-Three-Buckets reduction for the live display stream.
//!
//! Shape is judged on `(time_stamp_ms, displacement)`; every other channel of
//! a selected sample travels with it unchanged.

use crate::kinematics::KinematicSample;

/// Reduce `samples` to at most `target` samples, keeping first and last
pub fn downsample(samples: &[KinematicSample], target: usize) -> Vec<KinematicSample> {
    lttb(samples, target, |s| (s.time_stamp_ms as f64, s.displacement))
}

/// Generic LTTB over any point type with a 2-D coordinate projection.
///
/// Output length is `min(points.len(), target)` and order is preserved.
pub fn lttb<T, F>(points: &[T], target: usize, coord: F) -> Vec<T>
where
    T: Clone,
    F: Fn(&T) -> (f64, f64),
{
    let n = points.len();
    if n <= target {
        return points.to_vec();
    }

    match target {
        0 => return Vec::new(),
        1 => return vec![points[0].clone()],
        2 => return vec![points[0].clone(), points[n - 1].clone()],
        _ => {}
    }

    let mut sampled = Vec::with_capacity(target);
    sampled.push(points[0].clone());

    if target == 3 {
        let best = max_area_index(points, 1, n - 1, coord(&points[0]), coord(&points[n - 1]), &coord);
        sampled.push(points[best].clone());
    } else {
        let buckets = target - 2;
        let bucket_size = (n - 2) as f64 / buckets as f64;
        let mut prev = 0usize;

        for i in 0..buckets {
            let start = (i as f64 * bucket_size).floor() as usize + 1;
            let end = if i + 1 == buckets {
                n - 1
            } else {
                ((i + 1) as f64 * bucket_size).floor() as usize + 1
            };
            // `end` is also the first point of the next bucket (or the last point)
            let best = max_area_index(points, start, end, coord(&points[prev]), coord(&points[end]), &coord);
            sampled.push(points[best].clone());
            prev = best;
        }
    }

    sampled.push(points[n - 1].clone());
    sampled
}

fn max_area_index<T, F>(points: &[T], start: usize, end: usize, a: (f64, f64), c: (f64, f64), coord: &F) -> usize
where
    F: Fn(&T) -> (f64, f64),
{
    let mut max_area = -1.0;
    let mut max_index = start;

    for (offset, point) in points[start..end].iter().enumerate() {
        let b = coord(point);
        let area = ((a.0 - c.0) * (b.1 - a.1) - (a.0 - b.0) * (c.1 - a.1)).abs();
        if area > max_area {
            max_area = area;
            max_index = start + offset;
        }
    }

    max_index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::PairedSample;

    fn series(displacements: &[f64]) -> Vec<KinematicSample> {
        displacements
            .iter()
            .enumerate()
            .map(|(i, &d)| KinematicSample {
                velocity: i as f64 * 0.1,
                displacement: d,
                heading: 0.0,
                traj_x: d,
                traj_y: 0.0,
                time_stamp_ms: i as i64 * 58,
                pair: PairedSample::default(),
            })
            .collect()
    }

    fn wavy(n: usize) -> Vec<KinematicSample> {
        let d: Vec<f64> = (0..n).map(|i| (i as f64 * 0.7).sin() * 3.0 + i as f64 * 0.2).collect();
        series(&d)
    }

    #[test]
    fn test_length_and_endpoints_invariants() {
        for n in 3..40 {
            let input = wavy(n);
            for target in 3..=n {
                let out = downsample(&input, target);
                assert_eq!(out.len(), target, "n={} target={}", n, target);
                assert_eq!(out[0], input[0]);
                assert_eq!(out[target - 1], input[n - 1]);
                for pair in out.windows(2) {
                    assert!(pair[0].time_stamp_ms < pair[1].time_stamp_ms);
                }
            }
        }
    }

    #[test]
    fn test_target_equal_to_len_is_identity() {
        let input = wavy(5);
        assert_eq!(downsample(&input, 5), input);
        assert_eq!(downsample(&input, 9), input);
    }

    #[test]
    fn test_three_point_fast_path_keeps_spike() {
        let input = series(&[0.0, 0.1, 0.2, 5.0, 0.4]);
        let out = downsample(&input, 3);

        assert_eq!(out.len(), 3);
        assert_eq!(out[1].displacement, 5.0);
        assert_eq!(out[1].velocity, input[3].velocity);
    }

    #[test]
    fn test_three_point_matches_general_bucket() {
        // The single-bucket general pass must agree with the fast path
        let input = wavy(11);
        let fast = downsample(&input, 3);
        let general = lttb(&input, 3, |s| (s.time_stamp_ms as f64, s.displacement));
        assert_eq!(fast, general);
    }

    #[test]
    fn test_general_buckets_keep_peaks() {
        let mut d = vec![0.0; 20];
        d[4] = 8.0;
        d[15] = -8.0;
        let out = downsample(&series(&d), 4);

        let kept: Vec<f64> = out.iter().map(|s| s.displacement).collect();
        assert!(kept.contains(&8.0));
        assert!(kept.contains(&-8.0));
    }

    #[test]
    fn test_small_targets() {
        let input = wavy(6);

        assert!(downsample(&input, 0).is_empty());
        assert_eq!(downsample(&input, 1), vec![input[0]]);
        assert_eq!(downsample(&input, 2), vec![input[0], input[5]]);
        assert!(downsample(&[], 3).is_empty());
    }

    #[test]
    fn test_collinear_points_pick_first_interior() {
        let input = series(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let out = downsample(&input, 3);
        assert_eq!(out[1], input[1]);
    }
}

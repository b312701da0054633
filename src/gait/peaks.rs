//! Local extremum detection with minimum spacing and prominence.

/// Local maxima. Flat tops report their midpoint (left-biased on even widths).
fn local_maxima(x: &[f64]) -> Vec<usize> {
    let n = x.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }
    let mut i = 1;
    while i < n - 1 {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

/// 高いピークを優先し、`distance` 未満で隣接する低いピークを除外
fn select_by_distance(x: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    let mut keep = vec![true; peaks.len()];
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        for k in (0..j).rev() {
            if peaks[j] - peaks[k] >= distance {
                break;
            }
            keep[k] = false;
        }
        for k in j + 1..peaks.len() {
            if peaks[k] - peaks[j] >= distance {
                break;
            }
            keep[k] = false;
        }
    }
    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

/// Height of a peak above the higher of the two lowest points reachable
/// on either side without climbing above the peak.
pub fn prominence(x: &[f64], peak: usize) -> f64 {
    let height = x[peak];
    let left_min = x[..=peak]
        .iter()
        .rev()
        .take_while(|&&v| v <= height)
        .fold(height, |m, &v| m.min(v));
    let right_min = x[peak..]
        .iter()
        .take_while(|&&v| v <= height)
        .fold(height, |m, &v| m.min(v));
    height - left_min.max(right_min)
}

/// 極大値検出。間隔フィルタ → プロミネンスフィルタの順に適用
pub fn find_peaks(x: &[f64], min_distance: usize, min_prominence: f64) -> Vec<usize> {
    let peaks = local_maxima(x);
    let peaks = if min_distance > 1 {
        select_by_distance(x, &peaks, min_distance)
    } else {
        peaks
    };
    peaks
        .into_iter()
        .filter(|&p| prominence(x, p) >= min_prominence)
        .collect()
}

/// Local minima, found as maxima of the negated signal.
pub fn find_minima(x: &[f64], min_distance: usize, min_prominence: f64) -> Vec<usize> {
    let inverted: Vec<f64> = x.iter().map(|v| -v).collect();
    find_peaks(&inverted, min_distance, min_prominence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_local_maxima_basic() {
        let x = [0.0, 2.0, 1.0, 3.0, 0.0];
        assert_eq!(find_peaks(&x, 1, 0.0), vec![1, 3]);
    }

    #[test]
    fn test_endpoints_are_never_peaks() {
        let x = [5.0, 1.0, 2.0, 1.0, 5.0];
        assert_eq!(find_peaks(&x, 1, 0.0), vec![2]);
        assert!(find_peaks(&[1.0, 2.0], 1, 0.0).is_empty());
    }

    #[test]
    fn test_plateau_midpoint() {
        let x = [0.0, 1.0, 3.0, 3.0, 3.0, 1.0, 0.0];
        assert_eq!(find_peaks(&x, 1, 0.0), vec![3]);
        let x = [0.0, 3.0, 3.0, 0.0];
        assert_eq!(find_peaks(&x, 1, 0.0), vec![1]);
        // Plateau that rises again is not a peak
        let x = [0.0, 3.0, 3.0, 4.0, 0.0];
        assert_eq!(find_peaks(&x, 1, 0.0), vec![3]);
    }

    #[test]
    fn test_prominence() {
        let x = [0.0, 5.0, 2.0, 8.0, 1.0];
        assert_abs_diff_eq!(prominence(&x, 1), 3.0);
        assert_abs_diff_eq!(prominence(&x, 3), 7.0);
        assert_eq!(find_peaks(&x, 1, 4.0), vec![3]);
    }

    #[test]
    fn test_distance_keeps_highest() {
        let x = [0.0, 4.0, 0.0, 6.0, 0.0, 5.0, 0.0, 0.0, 0.0, 3.0, 0.0];
        assert_eq!(find_peaks(&x, 3, 0.0), vec![3, 9]);
        assert_eq!(find_peaks(&x, 1, 0.0), vec![1, 3, 5, 9]);
    }

    #[test]
    fn test_distance_applied_before_prominence() {
        // The tall peak suppresses its neighbour even though the neighbour
        // alone would pass the prominence test.
        let x = [0.0, 10.0, 0.0, 9.0, 0.0];
        assert_eq!(find_peaks(&x, 3, 1.0), vec![1]);
    }

    #[test]
    fn test_find_minima() {
        let x: Vec<f64> = (0..90)
            .map(|i| (2.0 * std::f64::consts::PI * i as f64 / 30.0).cos() * 20.0)
            .collect();
        // cos minima at 15, 45, 75
        assert_eq!(find_minima(&x, 7, 5.0), vec![15, 45, 75]);
        assert!(find_minima(&x, 7, 100.0).is_empty());
    }

    #[test]
    fn test_flat_signal_has_no_extrema() {
        assert!(find_minima(&[3.0; 40], 1, 0.0).is_empty());
    }
}

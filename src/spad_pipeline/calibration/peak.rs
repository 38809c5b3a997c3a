/// Centroid of the five bins around the first maximum of `transient`, in bins.
///
/// A maximum within two bins of either end returns its integer index, since no
/// centred window fits there. An all-zero window (only possible for an all-zero
/// transient) returns the window start.
pub fn find_peak<T: Copy + Into<f64>>(transient: &[T]) -> f64 {
    let nbins = transient.len();
    if nbins == 0 {
        return 0.0;
    }

    let mut peak_bin = 0;
    let mut max = transient[0].into();
    for (i, &count) in transient.iter().enumerate().skip(1) {
        let count = count.into();
        if count > max {
            max = count;
            peak_bin = i;
        }
    }

    if peak_bin < 2 || peak_bin + 3 > nbins {
        return peak_bin as f64;
    }

    let start = peak_bin - 2;
    let (sum_fx, sum_f) = transient[start..start + 5]
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sfx, sf), (i, &count)| {
            let f: f64 = count.into();
            (sfx + i as f64 * f, sf + f)
        });

    if sum_f == 0.0 {
        return start as f64;
    }

    sum_fx / sum_f + start as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(nbins: usize, centre: usize) -> Vec<u16> {
        (0..nbins)
            .map(|i| 40u16.saturating_sub(10 * i.abs_diff(centre) as u16))
            .collect()
    }

    #[test]
    fn test_symmetric_pulse_is_exact() {
        assert_eq!(find_peak(&[0u16, 0, 5, 10, 5, 0, 0, 0]), 3.0);
        for centre in 2..=13 {
            assert_eq!(find_peak(&triangle(16, centre)), centre as f64);
        }
    }

    #[test]
    fn test_asymmetric_window_centroid() {
        // window 2..=6 holds [0, 10, 20, 10, 10]
        let transient = [0u32, 0, 0, 10, 20, 10, 10, 0];
        let expected = (10.0 + 40.0 + 30.0 + 40.0) / 50.0 + 2.0;
        assert!((find_peak(&transient) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_edge_peaks_return_index() {
        assert_eq!(find_peak(&[9u16, 1, 1, 1, 1, 1]), 0.0);
        assert_eq!(find_peak(&[1u16, 9, 1, 1, 1, 1]), 1.0);
        assert_eq!(find_peak(&[1u16, 1, 1, 1, 9, 1]), 4.0);
        assert_eq!(find_peak(&[1u16, 1, 1, 1, 1, 9]), 5.0);
    }

    #[test]
    fn test_first_maximum_wins_ties() {
        assert_eq!(find_peak(&[0u16, 0, 0, 7, 0, 0, 7, 0, 0, 0]), 3.0);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(find_peak::<u16>(&[]), 0.0);
        assert_eq!(find_peak(&[0u16; 8]), 0.0);
        assert_eq!(find_peak(&[3u16, 4]), 1.0);
    }
}

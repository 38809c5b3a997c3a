//! Count-preserving redistribution of one transient onto remapped bins.
//!
//! Each input bin's photons are split across the output bins its remapped span
//! overlaps. Partial overlaps are resolved by binomial sampling so every output
//! stays an integer while the expected count follows the overlap fraction; the
//! last touched bin receives whatever is left, so an input bin's photons are only
//! ever lost when they land outside the transient.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Binomial, Distribution};

use crate::spad_pipeline::correction::borders::BinBorders;

/// Counts at or below this are sampled photon by photon.
const BERNOULLI_LIMIT: u32 = 100;

/// Binomial sampler owned by a single worker.
#[derive(Debug, Clone)]
pub struct PhotonSampler {
    rng: StdRng,
}

impl PhotonSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sampler for worker `worker`, decorrelated from its siblings sharing `base`.
    pub fn for_worker(base: u64, worker: usize) -> Self {
        Self::new(base.wrapping_add((worker as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)))
    }

    /// Draws from Binomial(n, p), always within `0..=n`.
    pub fn sample(&mut self, n: u32, p: f64) -> u32 {
        if n == 0 || p <= 0.0 || p.is_nan() {
            return 0;
        }
        if p >= 1.0 {
            return n;
        }

        if n <= BERNOULLI_LIMIT {
            return (0..n).filter(|_| self.rng.random::<f64>() < p).count() as u32;
        }

        match Binomial::new(n as u64, p) {
            Ok(binomial) => binomial.sample(&mut self.rng).min(n as u64) as u32,
            Err(_) => 0,
        }
    }
}

/// Writes the redistributed counts of `transient` into `output`, which must have
/// the same length and is cleared first.
pub fn redistribute(
    transient: &[u16],
    borders: &BinBorders,
    sampler: &mut PhotonSampler,
    output: &mut [u16],
) {
    debug_assert_eq!(transient.len(), borders.bins());
    debug_assert_eq!(transient.len(), output.len());

    output.fill(0);
    let nbins = output.len() as i64;
    let times = borders.times();
    let jindexes = borders.jindexes();

    for (i, &count) in transient.iter().enumerate() {
        let b1 = times[i];
        let mut t = times[i + 1] - b1;
        if count == 0 || t.is_nan() || t <= 0.0 {
            continue;
        }
        let mut n = count as u32;

        let bj1 = jindexes[i];
        let bj2 = jindexes[i + 1];

        // part of the span inside the first output bin
        let mut j = bj1;
        let f = (1.0 - (b1 - bj1 as f64)).min(t);
        let taken = sampler.sample(n, f / t);
        deposit(output, j, taken);
        j += 1;
        t -= f;
        n -= taken;

        // whole output bins; skipped when the span lies entirely off the transient
        if bj1 < nbins && bj2 >= 0 {
            // every bin below the transient in one draw
            if j < 0 {
                let below = -j;
                let taken = sampler.sample(n, below as f64 / t);
                j = 0;
                t -= below as f64;
                n -= taken;
            }
            // past the end only the dropped remainder is left
            while j < bj2.min(nbins) {
                let taken = sampler.sample(n, 1.0 / t);
                deposit(output, j, taken);
                j += 1;
                t -= 1.0;
                n -= taken;
            }
        }

        deposit(output, j, n);
    }
}

/// Adds `count` to output bin `j`; bins off the transient are dropped.
fn deposit(output: &mut [u16], j: i64, count: u32) {
    if j >= 0 && (j as usize) < output.len() {
        let bin = &mut output[j as usize];
        *bin = bin.saturating_add(count.min(u16::MAX as u32) as u16);
    }
}

/// Corrects `transient` in place, using `scratch` as the output buffer.
pub fn correct_transient(
    transient: &mut [u16],
    borders: &BinBorders,
    sampler: &mut PhotonSampler,
    scratch: &mut Vec<u16>,
) {
    scratch.resize(transient.len(), 0);
    redistribute(transient, borders, sampler, scratch);
    transient.copy_from_slice(scratch);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn borders(factors: &[f64], shift: f64, scale: f64) -> BinBorders {
        let mut borders = BinBorders::new(factors.len());
        borders.compute(factors, shift, scale);
        borders
    }

    fn corrected(transient: &[u16], borders: &BinBorders, seed: u64) -> Vec<u16> {
        let mut output = vec![0u16; transient.len()];
        redistribute(transient, borders, &mut PhotonSampler::new(seed), &mut output);
        output
    }

    #[test]
    fn test_sampler_bounds() {
        let mut sampler = PhotonSampler::new(7);
        assert_eq!(sampler.sample(0, 0.5), 0);
        assert_eq!(sampler.sample(50, 0.0), 0);
        assert_eq!(sampler.sample(50, -0.3), 0);
        assert_eq!(sampler.sample(50, 1.0), 50);
        assert_eq!(sampler.sample(500, 1.7), 500);
        for n in [1u32, 10, 100, 101, 5000] {
            for _ in 0..20 {
                assert!(sampler.sample(n, 0.4) <= n);
            }
        }
    }

    #[test]
    fn test_sampler_mean_on_both_paths() {
        let mut sampler = PhotonSampler::new(11);
        for n in [80u32, 4000] {
            let draws = 400;
            let total: u64 = (0..draws).map(|_| sampler.sample(n, 0.25) as u64).sum();
            let mean = total as f64 / draws as f64;
            let expected = n as f64 * 0.25;
            let sd = (n as f64 * 0.25 * 0.75).sqrt() / (draws as f64).sqrt();
            assert!((mean - expected).abs() < 6.0 * sd, "n={} mean={}", n, mean);
        }
    }

    #[test]
    fn test_identity_is_exact() {
        let transient = [0u16, 0, 5, 10, 5, 0, 0, 0];
        let identity = borders(&[1.0; 8], 0.0, 1.0);
        for seed in 0..10 {
            assert_eq!(corrected(&transient, &identity, seed), transient);
        }
    }

    #[test]
    fn test_whole_bin_shift_is_deterministic() {
        let transient = [3u16, 9, 27, 81, 0, 0];
        let shifted = borders(&[1.0; 6], -2.0, 1.0);
        assert_eq!(corrected(&transient, &shifted, 1), vec![0, 0, 3, 9, 27, 81]);
    }

    #[test]
    fn test_conservation_inside_transient() {
        let transient = [0u16, 40, 250, 180, 90, 40, 10, 0, 0, 0, 0, 0];
        let factors = [1.1, 0.9, 1.2, 0.8, 1.05, 0.95, 1.0, 1.0, 0.7, 1.3, 1.0, 1.0];
        // last border at 0.3 + 0.9 * 12.0 = 11.1, still inside the grid
        let remapped = borders(&factors, -0.3, 0.9);
        let total: u32 = transient.iter().map(|&c| c as u32).sum();
        for seed in 0..25 {
            let output = corrected(&transient, &remapped, seed);
            assert_eq!(output.iter().map(|&c| c as u32).sum::<u32>(), total);
        }
    }

    #[test]
    fn test_edge_leakage_never_adds() {
        let transient = [100u16, 50, 25, 0, 0, 25, 50, 100];
        let total: u32 = transient.iter().map(|&c| c as u32).sum();
        for (shift, scale) in [(1.5, 1.0), (-2.5, 1.0), (0.0, 1.6), (3.0, 0.5)] {
            let remapped = borders(&[1.0; 8], shift, scale);
            for seed in 0..10 {
                let sum: u32 = corrected(&transient, &remapped, seed)
                    .iter()
                    .map(|&c| c as u32)
                    .sum();
                assert!(sum <= total);
            }
        }
    }

    #[test]
    fn test_zero_width_and_empty_bins_contribute_nothing() {
        let mut factors = [1.0; 6];
        factors[2] = 0.0;
        let remapped = borders(&factors, 0.0, 1.0);
        let transient = [0u16, 0, 500, 0, 0, 0];
        for seed in 0..5 {
            assert_eq!(corrected(&transient, &remapped, seed), vec![0; 6]);
        }
    }

    #[test]
    fn test_span_entirely_outside_is_dropped() {
        let remapped = borders(&[1.0; 4], 20.0, 1.0);
        assert_eq!(corrected(&[7, 7, 7, 7], &remapped, 3), vec![0; 4]);
    }

    #[test]
    fn test_huge_scale_stays_bounded() {
        let mut transient = [0u16; 8];
        transient[0] = 1000;
        transient[5] = 1000;
        let start = std::time::Instant::now();

        // bin 0 spans [-5e5, 5e5), so the run below zero is long too
        let stretched = borders(&[1.0; 8], 5.0e5, 1.0e6);
        for seed in 0..5 {
            let sum: u32 = corrected(&transient, &stretched, seed)
                .iter()
                .map(|&c| c as u32)
                .sum();
            assert!(sum <= 1000);
        }

        // bin 0 spans [-1e7, 2), the remainder lands in bin 1
        let mut factors = [1.0; 8];
        factors[0] = 1.0e7 + 2.0;
        let wide_first = borders(&factors, 1.0e7, 1.0);
        let output = corrected(&transient, &wide_first, 1);
        assert_eq!(&output[2..6], &[0, 0, 0, 0]);
        assert!(output[0] as u32 + output[1] as u32 <= 1000);
        assert_eq!(&output[6..], &[1000, 0]);

        let infinite = borders(&[1.0; 8], 0.0, f64::INFINITY);
        assert_eq!(corrected(&transient, &infinite, 2), vec![0; 8]);

        assert!(start.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let transient = [10u16, 200, 3000, 150, 20, 5];
        let remapped = borders(&[0.9, 1.1, 1.0, 0.95, 1.05, 1.0], 0.37, 0.97);
        assert_eq!(
            corrected(&transient, &remapped, 99),
            corrected(&transient, &remapped, 99)
        );
    }

    #[test]
    fn test_correct_transient_in_place() {
        let mut transient = vec![4u16, 0, 0, 0];
        let mut scratch = Vec::new();
        let shifted = borders(&[1.0; 4], -1.0, 1.0);
        correct_transient(
            &mut transient,
            &shifted,
            &mut PhotonSampler::new(0),
            &mut scratch,
        );
        assert_eq!(transient, vec![0, 4, 0, 0]);
        assert_eq!(scratch.len(), 4);
    }
}

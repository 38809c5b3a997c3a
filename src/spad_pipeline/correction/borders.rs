/// Remapped bin boundaries of one pixel on the common time grid.
///
/// Input bin `i` spans `times[i]..times[i + 1]` in output-bin units, and
/// `jindexes[i]` is the output bin containing boundary `i`. Buffers are sized once
/// per worker and reused for every pixel.
#[derive(Debug, Clone)]
pub struct BinBorders {
    times: Vec<f64>,
    jindexes: Vec<i64>,
}

impl BinBorders {
    pub fn new(timebins: usize) -> Self {
        Self {
            times: vec![0.0; timebins + 1],
            jindexes: vec![0; timebins + 1],
        }
    }

    /// Rebuilds the borders from one pixel's bin-width factors, shift and scale.
    pub fn compute(&mut self, factors: &[f64], shift: f64, scale: f64) {
        let len = factors.len() + 1;
        self.times.resize(len, 0.0);
        self.jindexes.resize(len, 0);

        let mut border = -shift;
        self.times[0] = border;
        for (time, &factor) in self.times[1..].iter_mut().zip(factors) {
            border += factor * scale;
            *time = border;
        }

        for (jindex, &time) in self.jindexes.iter_mut().zip(&self.times) {
            *jindex = (time.ceil() as i64).saturating_sub(1);
        }
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn jindexes(&self) -> &[i64] {
        &self.jindexes
    }

    /// Number of input bins described.
    pub fn bins(&self) -> usize {
        self.times.len() - 1
    }
}

//! Offline signal conditioning: gap filling and zero-phase low-pass.

use tracing::warn;

/// Edge padding length of the forward/backward pass.
const PAD_LEN: usize = 6;

/// 欠測を補間する。内部は線形補間、両端は最も近い実測値。
/// 実測値が1つもなければ None
pub fn fill_gaps(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let measured: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.filter(|v| v.is_finite()).map(|v| (i, v)))
        .collect();
    let (&(first_i, first_v), &(last_i, last_v)) = (measured.first()?, measured.last()?);

    let mut out = vec![0.0; values.len()];
    out[..=first_i].fill(first_v);
    out[last_i..].fill(last_v);
    for pair in measured.windows(2) {
        let ((i0, v0), (i1, v1)) = (pair[0], pair[1]);
        let span = (i1 - i0) as f64;
        for (k, slot) in out[i0..=i1].iter_mut().enumerate() {
            *slot = v0 + (v1 - v0) * k as f64 / span;
        }
    }
    Some(out)
}

/// 1次バターワース・ローパス（双一次変換, プリワープ付き）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowPass {
    b0: f64,
    b1: f64,
    a1: f64,
}

impl LowPass {
    /// None when the cutoff is not below Nyquist or either rate is invalid.
    pub fn butterworth(cutoff_hz: f64, fs: f64) -> Option<Self> {
        if !(cutoff_hz > 0.0 && fs > 0.0 && cutoff_hz.is_finite() && fs.is_finite()) {
            return None;
        }
        if cutoff_hz >= fs / 2.0 {
            return None;
        }
        let k = (std::f64::consts::PI * cutoff_hz / fs).tan();
        let b = k / (1.0 + k);
        Some(Self {
            b0: b,
            b1: b,
            a1: (k - 1.0) / (k + 1.0),
        })
    }

    /// `([b0, b1], [1, a1])`
    pub fn coefficients(&self) -> ([f64; 2], [f64; 2]) {
        ([self.b0, self.b1], [1.0, self.a1])
    }

    /// Steady-state delay value for a unit step.
    fn step_state(&self) -> f64 {
        (self.b1 - self.a1 * self.b0) / (1.0 + self.a1)
    }

    /// Direct form II transposed, starting from delay state `z`.
    fn run(&self, x: &[f64], mut z: f64) -> Vec<f64> {
        x.iter()
            .map(|&xn| {
                let yn = self.b0 * xn + z;
                z = self.b1 * xn - self.a1 * yn;
                yn
            })
            .collect()
    }

    /// 順方向・逆方向の2回適用で位相遅れなし。端は奇対称拡張でパディング
    pub fn filtfilt(&self, x: &[f64]) -> Vec<f64> {
        let n = x.len();
        if n < 2 {
            return x.to_vec();
        }
        let pad = PAD_LEN.min(n - 1);
        let (first, last) = (x[0], x[n - 1]);

        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - x[i]));
        ext.extend_from_slice(x);
        ext.extend((1..=pad).map(|i| 2.0 * last - x[n - 1 - i]));

        let zi = self.step_state();
        let mut forward = self.run(&ext, zi * ext[0]);
        forward.reverse();
        let mut backward = self.run(&forward, zi * forward[0]);
        backward.reverse();

        backward[pad..pad + n].to_vec()
    }
}

/// Zero-phase low-pass of a whole series. Returned unchanged when the cutoff
/// cannot be realised at this sampling rate.
pub fn lowpass_zero_phase(x: &[f64], cutoff_hz: f64, fs: f64) -> Vec<f64> {
    match LowPass::butterworth(cutoff_hz, fs) {
        Some(filter) => filter.filtfilt(x),
        None => {
            warn!(
                "low-pass bypassed: cutoff {:.2} Hz not below Nyquist of {:.2} Hz",
                cutoff_hz,
                fs / 2.0
            );
            x.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_fill_gaps_interior_and_edges() {
        let filled = fill_gaps(&[None, Some(1.0), None, None, Some(4.0), None]).unwrap();
        assert_eq!(filled, vec![1.0, 1.0, 2.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn test_fill_gaps_all_missing() {
        assert_eq!(fill_gaps(&[None, None]), None);
        assert_eq!(fill_gaps(&[]), None);
        assert_eq!(fill_gaps(&[Some(f64::NAN)]), None);
    }

    #[test]
    fn test_fill_gaps_no_gaps_is_identity() {
        let v = [Some(3.0), Some(-1.0), Some(2.5)];
        assert_eq!(fill_gaps(&v).unwrap(), vec![3.0, -1.0, 2.5]);
    }

    #[test]
    fn test_butterworth_coefficients() {
        // fc = fs/4 -> K = tan(pi/4) = 1 -> b = [0.5, 0.5], a1 = 0
        let f = LowPass::butterworth(7.5, 30.0).unwrap();
        let (b, a) = f.coefficients();
        assert_abs_diff_eq!(b[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(b[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(a[1], 0.0, epsilon = 1e-12);

        // Unity DC gain
        let f = LowPass::butterworth(10.0, 30.0).unwrap();
        let (b, a) = f.coefficients();
        assert_abs_diff_eq!((b[0] + b[1]) / (a[0] + a[1]), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_butterworth_rejects_cutoff_above_nyquist() {
        assert!(LowPass::butterworth(15.0, 30.0).is_none());
        assert!(LowPass::butterworth(0.0, 30.0).is_none());
        assert!(LowPass::butterworth(5.0, 0.0).is_none());
    }

    #[test]
    fn test_filtfilt_preserves_constant() {
        let f = LowPass::butterworth(10.0, 30.0).unwrap();
        let y = f.filtfilt(&[42.0; 50]);
        assert_eq!(y.len(), 50);
        for v in y {
            assert_abs_diff_eq!(v, 42.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_filtfilt_preserves_linear_ramp() {
        let f = LowPass::butterworth(3.0, 30.0).unwrap();
        let x: Vec<f64> = (0..80).map(|i| 2.0 * i as f64 - 5.0).collect();
        let y = f.filtfilt(&x);
        for i in 20..60 {
            assert_abs_diff_eq!(x[i], y[i], epsilon = 1e-6);
        }
        // Edges stay close thanks to the odd extension
        assert_abs_diff_eq!(x[0], y[0], epsilon = 0.5);
    }

    #[test]
    fn test_filtfilt_no_phase_shift() {
        // Slow sinusoid: peak position must not move
        let f = LowPass::butterworth(10.0, 30.0).unwrap();
        let x: Vec<f64> = (0..120)
            .map(|i| (2.0 * std::f64::consts::PI * i as f64 / 60.0).sin())
            .collect();
        let y = f.filtfilt(&x);
        let argmax = |s: &[f64]| {
            s[..60]
                .iter()
                .enumerate()
                .fold((0, f64::MIN), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc })
                .0
        };
        assert_eq!(argmax(&x), argmax(&y));
    }

    #[test]
    fn test_filtfilt_attenuates_jitter() {
        let f = LowPass::butterworth(2.0, 30.0).unwrap();
        let x: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let y = f.filtfilt(&x);
        let peak = y[20..80].iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(peak < 0.05, "peak {peak}");
    }

    #[test]
    fn test_filtfilt_short_inputs() {
        let f = LowPass::butterworth(10.0, 30.0).unwrap();
        assert!(f.filtfilt(&[]).is_empty());
        assert_eq!(f.filtfilt(&[3.0]), vec![3.0]);
        assert_eq!(f.filtfilt(&[1.0, 2.0, 3.0]).len(), 3);
    }

    #[test]
    fn test_bypass_when_cutoff_too_high() {
        let x = vec![1.0, 5.0, 2.0];
        assert_eq!(lowpass_zero_phase(&x, 20.0, 30.0), x);
    }

    #[test]
    fn test_filtfilt_is_deterministic() {
        let f = LowPass::butterworth(10.0, 30.0).unwrap();
        let x: Vec<f64> = (0..64).map(|i| ((i * 7919) % 31) as f64).collect();
        assert_eq!(f.filtfilt(&x), f.filtfilt(&x));
    }
}

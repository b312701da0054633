//! Cubic resampling of stride sub-series onto a 0–100 % grid.

/// Not-a-knot 3次スプライン（4点以上）
#[derive(Debug, Clone)]
pub struct CubicSpline {
    t: Vec<f64>,
    y: Vec<f64>,
    /// 各節点の2階微分
    m: Vec<f64>,
}

impl CubicSpline {
    /// `t` must be strictly increasing and at least 4 long.
    pub fn new(t: &[f64], y: &[f64]) -> Option<Self> {
        let n = t.len();
        if n < 4 || y.len() != n || t.windows(2).any(|w| !(w[1] > w[0])) {
            return None;
        }
        let h: Vec<f64> = t.windows(2).map(|w| w[1] - w[0]).collect();

        // Unknowns m[1..n-1]. The not-a-knot conditions (third derivative
        // continuous at t[1] and t[n-2]) express m[0] and m[n-1] through
        // their neighbours and are folded into the first and last rows.
        let k = n - 2;
        let mut lower = vec![0.0; k];
        let mut diag = vec![0.0; k];
        let mut upper = vec![0.0; k];
        let mut rhs = vec![0.0; k];
        for i in 1..n - 1 {
            let r = i - 1;
            lower[r] = h[i - 1];
            diag[r] = 2.0 * (h[i - 1] + h[i]);
            upper[r] = h[i];
            rhs[r] = 6.0 * ((y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1]);
        }
        let (h0, h1) = (h[0], h[1]);
        diag[0] = (h0 + h1) * (h0 + 2.0 * h1) / h1;
        upper[0] = (h1 - h0) * (h1 + h0) / h1;
        let (ha, hb) = (h[n - 3], h[n - 2]);
        lower[k - 1] = (ha - hb) * (ha + hb) / ha;
        diag[k - 1] = (ha + hb) * (2.0 * ha + hb) / ha;

        let inner = solve_tridiagonal(&lower, &diag, &upper, &rhs)?;
        let mut m = Vec::with_capacity(n);
        m.push(((h0 + h1) * inner[0] - h0 * inner[1]) / h1);
        m.extend_from_slice(&inner);
        m.push(((ha + hb) * inner[k - 1] - hb * inner[k - 2]) / ha);

        Some(Self {
            t: t.to_vec(),
            y: y.to_vec(),
            m,
        })
    }

    /// Outside the knot range the end polynomials are extended.
    pub fn eval(&self, x: f64) -> f64 {
        let n = self.t.len();
        let i = self.t.partition_point(|&v| v <= x).saturating_sub(1).min(n - 2);
        let (t0, t1) = (self.t[i], self.t[i + 1]);
        let (y0, y1) = (self.y[i], self.y[i + 1]);
        let (m0, m1) = (self.m[i], self.m[i + 1]);
        let h = t1 - t0;
        let (a, b) = (t1 - x, x - t0);
        m0 * a.powi(3) / (6.0 * h)
            + m1 * b.powi(3) / (6.0 * h)
            + (y0 / h - m0 * h / 6.0) * a
            + (y1 / h - m1 * h / 6.0) * b
    }
}

/// Thomas algorithm. The spline system is strictly diagonally dominant, so no
/// pivoting; `None` only if a pivot degenerates.
fn solve_tridiagonal(
    lower: &[f64],
    diag: &[f64],
    upper: &[f64],
    rhs: &[f64],
) -> Option<Vec<f64>> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut d = vec![0.0; n];
    let mut pivot = diag[0];
    if !pivot.is_normal() {
        return None;
    }
    c[0] = upper[0] / pivot;
    d[0] = rhs[0] / pivot;
    for i in 1..n {
        pivot = diag[i] - lower[i] * c[i - 1];
        if !pivot.is_normal() {
            return None;
        }
        c[i] = upper[i] / pivot;
        d[i] = (rhs[i] - lower[i] * d[i - 1]) / pivot;
    }
    for i in (0..n - 1).rev() {
        d[i] -= c[i] * d[i + 1];
    }
    Some(d)
}

/// 3点: 補間放物線, 2点: 線形
fn eval_low_order(t: &[f64], y: &[f64], x: f64) -> f64 {
    match (t, y) {
        ([t0, t1], [y0, y1]) => y0 + (y1 - y0) * (x - t0) / (t1 - t0),
        ([t0, t1, t2], [y0, y1, y2]) => {
            y0 * (x - t1) * (x - t2) / ((t0 - t1) * (t0 - t2))
                + y1 * (x - t0) * (x - t2) / ((t1 - t0) * (t1 - t2))
                + y2 * (x - t0) * (x - t1) / ((t2 - t0) * (t2 - t1))
        }
        _ => f64::NAN,
    }
}

/// `points` evenly spaced values from 0 to 100 inclusive.
pub fn percent_grid(points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..points)
            .map(|k| 100.0 * k as f64 / (points - 1) as f64)
            .collect(),
    }
}

/// Stride-relative time of each sample in percent. Uses timestamps when they
/// strictly increase, otherwise assumes even spacing.
pub fn stride_percent(timestamps: &[f64]) -> Vec<f64> {
    let n = timestamps.len();
    let increasing = n >= 2 && timestamps.windows(2).all(|w| w[1] > w[0]);
    if !increasing {
        return percent_grid(n);
    }
    let (start, span) = (timestamps[0], timestamps[n - 1] - timestamps[0]);
    let mut pct: Vec<f64> = timestamps.iter().map(|t| 100.0 * (t - start) / span).collect();
    pct[0] = 0.0;
    pct[n - 1] = 100.0;
    pct
}

/// ストライドを `points` 点の 0〜100% 格子にリサンプリング。2点未満なら None
pub fn normalize_stride(timestamps: &[f64], values: &[f64], points: usize) -> Option<Vec<f64>> {
    let n = values.len();
    if n < 2 || timestamps.len() != n {
        return None;
    }
    let t = stride_percent(timestamps);
    let grid = percent_grid(points);
    if n >= 4 {
        let spline = CubicSpline::new(&t, values)?;
        Some(grid.iter().map(|&x| spline.eval(x)).collect())
    } else {
        Some(grid.iter().map(|&x| eval_low_order(&t, values, x)).collect())
    }
}

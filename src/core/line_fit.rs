//! Least-squares line fitting.
//!
//! Used for straightness checks on detected axis lines and for the scale-type
//! hypothesis test on price labels.

use serde::Serialize;

/// `y = slope * x + intercept`, with the coefficient of determination of the fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    /// 1.0 for a perfect fit. A constant `y` series counts as perfect.
    pub r_squared: f64,
}

impl LineFit {
    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Ordinary least squares over `(x, y)` points.
///
/// Returns `None` for fewer than two points or when every `x` is identical
/// (the line would be vertical in this parameterization).
pub fn fit_line(points: &[(f64, f64)]) -> Option<LineFit> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for &(x, y) in points {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    if sxx < 1e-12 {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let r_squared = if syy < 1e-12 {
        1.0
    } else {
        let ss_res: f64 = points
            .iter()
            .map(|&(x, y)| {
                let r = y - (slope * x + intercept);
                r * r
            })
            .sum();
        (1.0 - ss_res / syy).clamp(0.0, 1.0)
    };

    Some(LineFit {
        slope,
        intercept,
        r_squared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_line() {
        let pts: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 2.0 * i as f64 + 1.0)).collect();
        let fit = fit_line(&pts).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-9);
        assert!((fit.intercept - 1.0).abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
        assert!((fit.eval(20.0) - 41.0).abs() < 1e-9);
    }

    #[test]
    fn test_noisy_line_lower_r_squared() {
        let pts = [(0.0, 0.0), (1.0, 3.0), (2.0, 1.0), (3.0, 4.0), (4.0, 2.0)];
        let fit = fit_line(&pts).unwrap();
        assert!(fit.r_squared < 0.9);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(fit_line(&[(1.0, 1.0)]).is_none());
        assert!(fit_line(&[(3.0, 1.0), (3.0, 5.0)]).is_none());
        let flat = fit_line(&[(0.0, 5.0), (1.0, 5.0), (2.0, 5.0)]).unwrap();
        assert_eq!(flat.r_squared, 1.0);
        assert!(flat.slope.abs() < 1e-12);
    }
}

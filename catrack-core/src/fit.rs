//! Least-squares trajectory fits.
//!
//! Trajectories are described in the bending plane as
//! `y(x) = y0 + t·(x − x0) + κ/2·(x − x0)²`, with parameters
//! `(y0, t, κ)` at a reference plane `x0`.
#![allow(clippy::cast_precision_loss, clippy::many_single_char_names)]

use crate::error::NumericError;
use crate::hit::TrackPoint;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Fitted trajectory parameters with covariance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryFit {
    /// Reference plane.
    pub x0: f64,
    /// `(y0, t, κ)` at `x0`.
    pub params: Vector3<f64>,
    /// Parameter covariance.
    pub covariance: Matrix3<f64>,
    /// Sum of squared pulls.
    pub chi2: f64,
    /// Degrees of freedom.
    pub ndf: usize,
}

impl TrajectoryFit {
    /// Chi2 per degree of freedom, 0 for exactly determined fits.
    #[must_use]
    pub fn reduced_chi2(&self) -> f64 {
        if self.ndf == 0 {
            0.0
        } else {
            self.chi2 / self.ndf as f64
        }
    }

    /// Predicted coordinate at plane `x`.
    #[must_use]
    pub fn y_at(&self, x: f64) -> f64 {
        let dx = x - self.x0;
        self.params[0] + self.params[1] * dx + 0.5 * self.params[2] * dx * dx
    }

    /// Slope at plane `x`.
    #[must_use]
    pub fn slope_at(&self, x: f64) -> f64 {
        self.params[1] + self.params[2] * (x - self.x0)
    }

    /// Curvature.
    #[must_use]
    pub fn curvature(&self) -> f64 {
        self.params[2]
    }

    /// Parameters and covariance transported to plane `x`.
    #[must_use]
    pub fn state_at(&self, x: f64) -> (Vector3<f64>, Matrix3<f64>) {
        let f = transport_matrix(x - self.x0);
        (f * self.params, f * self.covariance * f.transpose())
    }

    /// Residual of a measurement.
    #[must_use]
    pub fn residual(&self, point: &TrackPoint) -> f64 {
        point.y - self.y_at(point.x)
    }

    /// Residual divided by the measurement uncertainty.
    #[must_use]
    pub fn pull(&self, point: &TrackPoint) -> f64 {
        self.residual(point) / point.variance.sqrt()
    }
}

/// Linear transport of `(y, t, κ)` over a distance `dx`.
#[must_use]
pub fn transport_matrix(dx: f64) -> Matrix3<f64> {
    Matrix3::new(1.0, dx, 0.5 * dx * dx, 0.0, 1.0, dx, 0.0, 0.0, 1.0)
}

/// Fits a parabola through the points, referenced at `x0`.
///
/// # Errors
/// Returns [`NumericError::DegenerateFit`] with fewer than three distinct
/// planes and [`NumericError::SingularMatrix`] for a singular normal matrix.
pub fn fit_parabola(points: &[TrackPoint], x0: f64) -> Result<TrajectoryFit, NumericError> {
    fit_polynomial(points, x0, 3)
}

/// Fits a straight line (κ fixed to zero), referenced at `x0`.
///
/// # Errors
/// Same conditions as [`fit_parabola`] with two parameters.
pub fn fit_line(points: &[TrackPoint], x0: f64) -> Result<TrajectoryFit, NumericError> {
    fit_polynomial(points, x0, 2)
}

fn fit_polynomial(
    points: &[TrackPoint],
    x0: f64,
    n_params: usize,
) -> Result<TrajectoryFit, NumericError> {
    let distinct = count_distinct_planes(points);
    if distinct < n_params {
        return Err(NumericError::DegenerateFit {
            points: points.len(),
            distinct,
            parameters: n_params,
        });
    }

    let n = points.len();
    let mut design = DMatrix::<f64>::zeros(n, n_params);
    let mut weights = DVector::<f64>::zeros(n);
    let mut values = DVector::<f64>::zeros(n);
    for (row, point) in points.iter().enumerate() {
        if !(point.variance.is_finite() && point.variance > 0.0) {
            return Err(NumericError::NonFinite("measurement variance"));
        }
        let dx = point.x - x0;
        design[(row, 0)] = 1.0;
        design[(row, 1)] = dx;
        if n_params > 2 {
            design[(row, 2)] = 0.5 * dx * dx;
        }
        weights[row] = 1.0 / point.variance;
        values[row] = point.y;
    }

    let weighted_design = DMatrix::from_fn(n, n_params, |r, c| design[(r, c)] * weights[r]);
    let normal = design.transpose() * &weighted_design;
    let rhs = weighted_design.transpose() * &values;
    let inverse = normal
        .try_inverse()
        .ok_or(NumericError::SingularMatrix("trajectory fit"))?;
    let solution = &inverse * rhs;

    let residuals = &values - &design * &solution;
    let chi2: f64 = residuals
        .iter()
        .zip(weights.iter())
        .map(|(r, w)| r * r * w)
        .sum();

    let mut params = Vector3::zeros();
    let mut covariance = Matrix3::zeros();
    for i in 0..n_params {
        params[i] = solution[i];
        for j in 0..n_params {
            covariance[(i, j)] = inverse[(i, j)];
        }
    }
    if !(chi2.is_finite() && params.iter().all(|p| p.is_finite())) {
        return Err(NumericError::NonFinite("trajectory fit"));
    }

    Ok(TrajectoryFit {
        x0,
        params,
        covariance,
        chi2,
        ndf: n - n_params,
    })
}

fn count_distinct_planes(points: &[TrackPoint]) -> usize {
    let mut xs: Vec<f64> = points.iter().map(|p| p.x).collect();
    xs.sort_by(f64::total_cmp);
    xs.dedup_by(|a, b| (*a - *b).abs() <= 1e-9);
    xs.len()
}

/// Signed curvature of the circle through three points.
///
/// Positive when the points turn counter-clockwise. `None` if two points
/// coincide.
#[must_use]
pub fn three_point_curvature(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> Option<f64> {
    let ab = (b[0] - a[0]).hypot(b[1] - a[1]);
    let bc = (c[0] - b[0]).hypot(c[1] - b[1]);
    let ca = (a[0] - c[0]).hypot(a[1] - c[1]);
    let denominator = ab * bc * ca;
    if denominator <= f64::EPSILON {
        return None;
    }
    let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
    Some(2.0 * cross / denominator)
}

/// Cosine of the angle between the directions `a→b` and `b→c`.
#[must_use]
pub fn opening_cosine(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> Option<f64> {
    let u = [b[0] - a[0], b[1] - a[1]];
    let v = [c[0] - b[0], c[1] - b[1]];
    let norm = u[0].hypot(u[1]) * v[0].hypot(v[1]);
    (norm > f64::EPSILON).then(|| (u[0] * v[0] + u[1] * v[1]) / norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(x: f64, y: f64) -> TrackPoint {
        TrackPoint {
            hit: 0,
            layer: 0,
            x,
            y,
            variance: 0.01,
            drift_length: 0.0,
            mc_particle: None,
        }
    }

    #[test]
    fn test_parabola_exact() {
        // y = 1 + 0.5 x + 0.1 x^2  => κ = 0.2
        let points: Vec<_> = (0..5)
            .map(|i| {
                let x = f64::from(i);
                point(x, 1.0 + 0.5 * x + 0.1 * x * x)
            })
            .collect();
        let fit = fit_parabola(&points, 0.0).unwrap();
        assert_relative_eq!(fit.params[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(fit.params[1], 0.5, epsilon = 1e-9);
        assert_relative_eq!(fit.curvature(), 0.2, epsilon = 1e-9);
        assert_relative_eq!(fit.chi2, 0.0, epsilon = 1e-9);
        assert_eq!(fit.ndf, 2);
        assert_relative_eq!(fit.y_at(10.0), 1.0 + 5.0 + 10.0, epsilon = 1e-8);
    }

    #[test]
    fn test_line_chi2() {
        let points = vec![point(0.0, 0.0), point(1.0, 0.1), point(2.0, 0.0)];
        let fit = fit_line(&points, 0.0).unwrap();
        assert_eq!(fit.ndf, 1);
        // residuals 1/30, -2/30... weighted by 100
        assert!(fit.chi2 > 0.5 && fit.chi2 < 1.0);
        assert_relative_eq!(fit.curvature(), 0.0);
    }

    #[test]
    fn test_degenerate_fit() {
        let points = vec![point(1.0, 0.0), point(1.0, 1.0), point(2.0, 0.0)];
        assert!(matches!(
            fit_parabola(&points, 0.0),
            Err(NumericError::DegenerateFit { distinct: 2, .. })
        ));
        assert!(fit_line(&points, 0.0).is_ok());
    }

    #[test]
    fn test_state_transport_matches_prediction() {
        let points: Vec<_> = (0..4)
            .map(|i| {
                let x = f64::from(i);
                point(x, 2.0 - 0.3 * x + 0.05 * x * x)
            })
            .collect();
        let fit = fit_parabola(&points, 0.0).unwrap();
        let (state, _) = fit.state_at(7.0);
        assert_relative_eq!(state[0], fit.y_at(7.0), epsilon = 1e-9);
        assert_relative_eq!(state[1], fit.slope_at(7.0), epsilon = 1e-9);
    }

    #[test]
    fn test_three_point_curvature() {
        let k = three_point_curvature([1.0, 0.0], [0.0, 1.0], [-1.0, 0.0]).unwrap();
        assert_relative_eq!(k, 1.0, epsilon = 1e-12);
        let straight = three_point_curvature([0.0, 0.0], [1.0, 1.0], [2.0, 2.0]).unwrap();
        assert_relative_eq!(straight, 0.0);
        assert!(three_point_curvature([0.0, 0.0], [0.0, 0.0], [1.0, 1.0]).is_none());
    }
}

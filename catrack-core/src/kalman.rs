//! Kalman filter on the planar trajectory state `(y, t, κ)`.

use crate::error::NumericError;
use crate::fit::{transport_matrix, TrajectoryFit};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Trajectory state at a detector plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KalmanState {
    /// Plane position.
    pub x: f64,
    /// `(y, t, κ)`.
    pub params: Vector3<f64>,
    /// State covariance.
    pub covariance: Matrix3<f64>,
}

impl KalmanState {
    /// Creates a state.
    #[must_use]
    pub fn new(x: f64, params: Vector3<f64>, covariance: Matrix3<f64>) -> Self {
        Self {
            x,
            params,
            covariance,
        }
    }

    /// Seeds a state from a trajectory fit, transported to plane `x`, with
    /// the covariance inflated by `scale`.
    #[must_use]
    pub fn from_fit(fit: &TrajectoryFit, x: f64, scale: f64) -> Self {
        let (params, covariance) = fit.state_at(x);
        Self::new(x, params, covariance * scale)
    }

    /// Predicted coordinate.
    #[inline]
    #[must_use]
    pub fn y(&self) -> f64 {
        self.params[0]
    }

    /// Slope.
    #[inline]
    #[must_use]
    pub fn slope(&self) -> f64 {
        self.params[1]
    }

    /// Curvature.
    #[inline]
    #[must_use]
    pub fn curvature(&self) -> f64 {
        self.params[2]
    }

    /// Variance of the predicted coordinate.
    #[inline]
    #[must_use]
    pub fn variance_y(&self) -> f64 {
        self.covariance[(0, 0)]
    }

    /// Propagates the state to plane `x_target`.
    ///
    /// `scattering_variance` is the slope variance added per unit length
    /// travelled.
    ///
    /// # Errors
    /// Returns [`NumericError::NonFinite`] if the propagated state is not finite.
    pub fn propagate(
        &self,
        x_target: f64,
        scattering_variance: f64,
    ) -> Result<Self, NumericError> {
        let dx = x_target - self.x;
        let f = transport_matrix(dx);
        let mut noise = Matrix3::zeros();
        noise[(1, 1)] = scattering_variance * dx.abs();

        let propagated = Self::new(
            x_target,
            f * self.params,
            f * self.covariance * f.transpose() + noise,
        );
        propagated.check_finite("propagation")?;
        Ok(propagated)
    }

    /// Chi2 of a measurement against the current state, without updating.
    ///
    /// # Errors
    /// Returns [`NumericError::SingularMatrix`] if the innovation variance is
    /// not positive.
    pub fn residual_chi2(&self, y: f64, variance: f64) -> Result<f64, NumericError> {
        let (residual, innovation_variance) = self.innovation(y, variance)?;
        Ok(residual * residual / innovation_variance)
    }

    /// Measurement update with a coordinate measurement.
    ///
    /// Returns the filtered state and the chi2 increment. The covariance is
    /// updated in Joseph form.
    ///
    /// # Errors
    /// Returns [`NumericError::SingularMatrix`] for a non-positive innovation
    /// variance and [`NumericError::NonFinite`] for a non-finite result.
    pub fn update(&self, y: f64, variance: f64) -> Result<(Self, f64), NumericError> {
        let (residual, innovation_variance) = self.innovation(y, variance)?;

        let gain: Vector3<f64> = self.covariance.column(0).into_owned() / innovation_variance;
        let mut kh = Matrix3::zeros();
        kh.set_column(0, &gain);
        let i_minus_kh = Matrix3::identity() - kh;
        let covariance = i_minus_kh * self.covariance * i_minus_kh.transpose()
            + gain * gain.transpose() * variance;

        let updated = Self::new(self.x, self.params + gain * residual, covariance);
        updated.check_finite("kalman update")?;
        Ok((updated, residual * residual / innovation_variance))
    }

    fn innovation(&self, y: f64, variance: f64) -> Result<(f64, f64), NumericError> {
        let residual = y - self.y();
        let innovation_variance = self.variance_y() + variance;
        if !residual.is_finite() || !innovation_variance.is_finite() {
            return Err(NumericError::NonFinite("innovation"));
        }
        if innovation_variance <= 0.0 {
            return Err(NumericError::SingularMatrix("innovation covariance"));
        }
        Ok((residual, innovation_variance))
    }

    fn check_finite(&self, context: &'static str) -> Result<(), NumericError> {
        if self.params.iter().all(|v| v.is_finite())
            && self.covariance.iter().all(|v| v.is_finite())
        {
            Ok(())
        } else {
            Err(NumericError::NonFinite(context))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state() -> KalmanState {
        KalmanState::new(
            0.0,
            Vector3::new(1.0, 0.5, 0.0),
            Matrix3::from_diagonal(&Vector3::new(0.04, 0.01, 1e-4)),
        )
    }

    #[test]
    fn test_propagation_is_linear() {
        let propagated = state().propagate(2.0, 0.0).unwrap();
        assert_relative_eq!(propagated.y(), 2.0);
        assert_relative_eq!(propagated.slope(), 0.5);
        // var(y) = 0.04 + 4 * 0.01 + (2^2/2)^2 * 1e-4
        assert_relative_eq!(propagated.variance_y(), 0.04 + 0.04 + 4.0e-4, epsilon = 1e-12);
    }

    #[test]
    fn test_scattering_inflates_slope_variance() {
        let propagated = state().propagate(-3.0, 0.001).unwrap();
        assert_relative_eq!(
            propagated.covariance[(1, 1)],
            0.01 + 9.0 * 1e-4 + 0.003,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_update_pulls_towards_measurement() {
        let (updated, chi2) = state().update(1.2, 0.04).unwrap();
        // equal variances: halfway
        assert_relative_eq!(updated.y(), 1.1, epsilon = 1e-12);
        assert_relative_eq!(updated.variance_y(), 0.02, epsilon = 1e-12);
        assert_relative_eq!(chi2, 0.04 / 0.08, epsilon = 1e-12);
        assert_relative_eq!(state().residual_chi2(1.2, 0.04).unwrap(), chi2);
    }

    #[test]
    fn test_singular_innovation() {
        let degenerate = KalmanState::new(0.0, Vector3::zeros(), Matrix3::zeros());
        assert_eq!(
            degenerate.update(1.0, 0.0),
            Err(NumericError::SingularMatrix("innovation covariance"))
        );
        assert!(degenerate.update(f64::NAN, 1.0).is_err());
    }
}

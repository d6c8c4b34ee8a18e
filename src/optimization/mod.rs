//! The `optimization` module recovers a camera's pose and plumb bob parameters
//! from 3D-2D correspondences.
//!
//! The pipeline has three stages:
//! 1. A linear estimation ([`linear`]) of the pinhole parameters and pose via a
//!    normalized DLT and RQ decomposition.
//! 2. A non-linear refinement with `tiny_solver`'s Levenberg-Marquardt
//!    ([`solver`]) of the pose and the model's free parameters, with the pinhole
//!    parameters re-solved in closed form at every step.
//! 3. An observability check ([`diagnostics`]) that eigen-decomposes the
//!    curvature of the [`objective`] at the solution.
//!
//! [`estimate_camera_parameters`] runs all three.

use serde::{Deserialize, Serialize};
use std::{fmt, fs};

pub mod diagnostics;
pub mod linear;
pub mod objective;
pub mod solver;

#[cfg(test)]
mod test_data;

pub use diagnostics::CalibrationStatistics;
pub use objective::{DependentParameters, PointFrame, ReprojectionObjective};
pub use solver::{
    estimate_camera_intrinsics, estimate_camera_parameters, CalibrationReport, CalibrationResult,
    ReprojectionOptimizationCost,
};

use crate::camera::{CameraModel, CameraModelError, Intrinsics, Resolution};
use crate::geometry::Pose;
use nalgebra::{Vector2, Vector3};

/// Settings for [`estimate_camera_parameters`].
///
/// Every field has a default, so a YAML file only needs the keys it changes:
///
/// ```yaml
/// max_iterations: 200
/// convergence_tolerance: 1.0e-9
/// verbose: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Levenberg-Marquardt iterations per round.
    pub max_iterations: usize,
    /// Upper bound on solver restarts before giving up on convergence.
    pub max_rounds: usize,
    pub min_abs_error_decrease: f64,
    pub min_rel_error_decrease: f64,
    pub min_error: f64,
    /// Converged once the Gauss-Newton step satisfies `|dx| <= tol * (1 + |x|)`.
    pub convergence_tolerance: f64,
    /// Relative step for central differences.
    pub finite_difference_step: f64,
    /// Weight of the quaternion unit-norm residual. `None` uses `sqrt(n)` for `n` correspondences.
    pub gauge_weight: Option<f64>,
    pub condition_warning_threshold: f64,
    pub verbose: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            max_iterations: 200,
            max_rounds: 5,
            min_abs_error_decrease: 1e-20,
            min_rel_error_decrease: 1e-14,
            min_error: 1e-24,
            convergence_tolerance: 1e-8,
            finite_difference_step: 1e-6,
            gauge_weight: None,
            condition_warning_threshold: 1e8,
            verbose: false,
        }
    }
}

impl SolverOptions {
    pub fn from_yaml_str(contents: &str) -> Result<Self, CameraModelError> {
        let options: SolverOptions = serde_yaml::from_str(contents)
            .map_err(|e| CameraModelError::YamlError(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), CameraModelError> {
        if self.max_iterations == 0 || self.max_rounds == 0 {
            return Err(CameraModelError::InvalidParams(
                "max_iterations and max_rounds must be at least 1".to_string(),
            ));
        }
        if !(self.finite_difference_step > 0.0) || !(self.convergence_tolerance > 0.0) {
            return Err(CameraModelError::InvalidParams(
                "finite_difference_step and convergence_tolerance must be positive".to_string(),
            ));
        }
        if let Some(weight) = self.gauge_weight {
            if !(weight > 0.0) || !weight.is_finite() {
                return Err(CameraModelError::InvalidParams(format!(
                    "gauge_weight must be positive, got {}",
                    weight
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionError {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
}

impl fmt::Debug for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Projection Error [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {} ]",
            self.rmse, self.min, self.max, self.mean, self.stddev, self.median
        )
    }
}

/// Pixel reprojection error statistics over all correspondences that project.
///
/// With `pose == None` the 3D points are taken to be in camera coordinates.
/// Points that fail to project (behind the camera) are skipped.
pub fn compute_reprojection_error<M: CameraModel>(
    model: &M,
    pose: Option<&Pose>,
    points3d: &[Vector3<f64>],
    points2d: &[Vector2<f64>],
) -> Result<ProjectionError, CameraModelError> {
    if points3d.len() != points2d.len() {
        return Err(CameraModelError::InvalidParams(
            "Number of 2D and 3D points must match".to_string(),
        ));
    }

    let errors: Vec<f64> = points3d
        .iter()
        .zip(points2d)
        .filter_map(|(point3d, point2d)| {
            let camera_point = pose.map_or(*point3d, |pose| pose.transform_point(point3d));
            model
                .project(&camera_point)
                .ok()
                .map(|projected| (projected - point2d).norm())
        })
        .collect();

    if errors.is_empty() {
        return Err(CameraModelError::InvalidParams(
            "No point could be projected".to_string(),
        ));
    }

    let n = errors.len() as f64;
    let mean = errors.iter().sum::<f64>() / n;
    let variance = errors.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let rmse = (errors.iter().map(|x| x.powi(2)).sum::<f64>() / n).sqrt();
    let min = errors.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = errors.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

    let mut sorted_errors = errors;
    sorted_errors.sort_by(f64::total_cmp);
    let mid = sorted_errors.len() / 2;
    let median = if sorted_errors.len() % 2 == 0 {
        (sorted_errors[mid - 1] + sorted_errors[mid]) / 2.0
    } else {
        sorted_errors[mid]
    };

    Ok(ProjectionError {
        rmse,
        min,
        max,
        mean,
        stddev: variance.sqrt(),
        median,
    })
}

/// A trait for camera model optimization tasks.
///
/// Types implementing `Optimizer` refine the parameters of a camera model by
/// minimizing the reprojection error of a set of 3D-2D correspondences.
pub trait Optimizer {
    /// Performs non-linear optimization to refine the camera model parameters.
    ///
    /// # Arguments
    ///
    /// * `verbose` - If `true`, progress is logged at `info` level.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The model parameters have been updated with the best point
    ///   found. Whether that point is converged is reported separately.
    /// * `Err(CameraModelError)` - Invalid input or a numerical failure.
    fn optimize(&mut self, verbose: bool) -> Result<(), CameraModelError>;

    /// Performs a linear estimation that initializes the non-linear step.
    fn linear_estimation(&mut self) -> Result<(), CameraModelError>
    where
        Self: Sized;

    /// Retrieves the current intrinsic parameters from the underlying camera model.
    fn get_intrinsics(&self) -> Intrinsics;

    /// Retrieves the current resolution from the underlying camera model.
    fn get_resolution(&self) -> Resolution;

    /// Retrieves the current distortion parameters from the underlying camera model.
    fn get_distortion(&self) -> Vec<f64>;
}

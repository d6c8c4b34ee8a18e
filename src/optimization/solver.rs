//! This module refines a camera pose and the free parameters of a camera
//! model against 3D-2D correspondences.
//!
//! The residuals are evaluated by a `tiny_solver` factor that is generic over
//! the scalar type, so the Levenberg-Marquardt optimizer differentiates it
//! automatically. Focal lengths and principal point are not optimized
//! directly: every evaluation re-solves them in closed form from the current
//! distorted image-plane points. Around the solver sits a loop of rounds that
//! restarts from the best point found and stops once a Gauss-Newton step on
//! the central-difference Jacobian is negligible.

use crate::camera::{CameraModel, CameraModelError, Intrinsics, Resolution};
use crate::geometry::Pose;
use crate::optimization::diagnostics::{gauss_newton_step, numeric_jacobian, CalibrationStatistics};
use crate::optimization::linear::estimate_pinhole_pose;
use crate::optimization::objective::{
    fit_pinhole, gauge_residual, image_plane_points, DependentParameters, PointFrame,
    ReprojectionObjective,
};
use crate::optimization::{compute_reprojection_error, Optimizer, ProjectionError, SolverOptions};

use log::{debug, info, warn};
use nalgebra::{convert, DVector, RealField, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tiny_solver::factors::Factor;
use tiny_solver::optimizer::OptimizerOptions;
use tiny_solver::{LevenbergMarquardtOptimizer, Optimizer as TinySolverOptimizer};

const POSE_BLOCK: &str = "pose";
const INTRINSICS_BLOCK: &str = "intrinsics";
/// Residual reported for every entry when a point is not in front of the
/// camera or the pinhole parameters cannot be solved.
const INVALID_RESIDUAL: f64 = 1e6;

/// Reprojection residuals for `tiny_solver`.
///
/// Parameter blocks are `[pose, intrinsics]` for world points and
/// `[intrinsics]` for camera points, where `intrinsics` holds the model's free
/// parameters.
#[derive(Debug, Clone)]
struct ReprojectionFactor<M> {
    /// Supplies the distortion model and its gates.
    model: M,
    points3d: Vec<Vector3<f64>>,
    points2d: Vec<Vector2<f64>>,
    frame: PointFrame,
    gauge_weight: f64,
}

impl<M> ReprojectionFactor<M> {
    fn num_residuals(&self) -> usize {
        2 * self.points2d.len() + usize::from(self.frame == PointFrame::World)
    }
}

impl<M: CameraModel + Send + Sync, T: RealField> Factor<T> for ReprojectionFactor<M> {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let (pose, free) = match self.frame {
            PointFrame::World => (Some(params[0].as_slice()), params[1].as_slice()),
            PointFrame::Camera => (None, params[0].as_slice()),
        };

        let mut residuals =
            DVector::from_element(self.num_residuals(), convert::<f64, T>(INVALID_RESIDUAL));

        let points = match image_plane_points(&self.model, pose, free, &self.points3d) {
            Ok(points) => points,
            Err(_) => return residuals,
        };

        let [fx, fy, cx, cy] = match fit_pinhole(&points, &self.points2d) {
            Some(intrinsics) => intrinsics,
            None => return residuals,
        };

        for (i, (point, observed)) in points.iter().zip(&self.points2d).enumerate() {
            let (u, v) = point.to_pixel(fx.clone(), fy.clone(), cx.clone(), cy.clone());
            residuals[2 * i] = u - convert::<f64, T>(observed.x);
            residuals[2 * i + 1] = v - convert::<f64, T>(observed.y);
        }

        if let Some(pose) = pose {
            residuals[2 * self.points2d.len()] = gauge_residual(pose, convert(self.gauge_weight));
        }

        residuals
    }
}

fn optimizer_options(options: &SolverOptions) -> OptimizerOptions {
    OptimizerOptions {
        max_iteration: options.max_iterations,
        min_abs_error_decrease_threshold: options.min_abs_error_decrease,
        min_rel_error_decrease_threshold: options.min_rel_error_decrease,
        min_error_threshold: options.min_error,
        ..OptimizerOptions::default()
    }
}

fn split_blocks(parameters: &DVector<f64>, frame: PointFrame) -> HashMap<String, DVector<f64>> {
    let (pose, free) = parameters.as_slice().split_at(frame.pose_len());
    let mut blocks = HashMap::new();
    if frame == PointFrame::World {
        blocks.insert(POSE_BLOCK.to_string(), DVector::from_column_slice(pose));
    }
    blocks.insert(INTRINSICS_BLOCK.to_string(), DVector::from_column_slice(free));
    blocks
}

fn join_blocks(
    blocks: &HashMap<String, DVector<f64>>,
    frame: PointFrame,
) -> Result<DVector<f64>, CameraModelError> {
    let block = |name: &str| {
        blocks.get(name).ok_or_else(|| {
            CameraModelError::NumericalError(format!("Solver returned no '{}' block", name))
        })
    };
    let free = block(INTRINSICS_BLOCK)?;
    match frame {
        PointFrame::World => {
            let pose = block(POSE_BLOCK)?;
            Ok(DVector::from_iterator(
                pose.len() + free.len(),
                pose.iter().chain(free.iter()).copied(),
            ))
        }
        PointFrame::Camera => Ok(free.clone()),
    }
}

/// Cost function and state for calibrating any [`CameraModel`] from
/// correspondences.
///
/// It implements the [`Optimizer`] trait: [`Optimizer::linear_estimation`]
/// seeds the pose and pinhole parameters, [`Optimizer::optimize`] refines
/// them together with the model's free parameters.
#[derive(Clone)]
pub struct ReprojectionOptimizationCost<M> {
    model: M,
    pose: Pose,
    points3d: Vec<Vector3<f64>>,
    points2d: Vec<Vector2<f64>>,
    frame: PointFrame,
    options: SolverOptions,
    statistics: Option<CalibrationStatistics>,
    converged: bool,
    rounds: usize,
    final_cost: f64,
}

impl<M: CameraModel + Clone> ReprojectionOptimizationCost<M> {
    /// Creates a cost over owned correspondences.
    ///
    /// Fails if the point counts differ or if there are fewer residuals than
    /// unknowns, counting the four pinhole parameters.
    pub fn new(
        model: M,
        points3d: Vec<Vector3<f64>>,
        points2d: Vec<Vector2<f64>>,
        frame: PointFrame,
        options: SolverOptions,
    ) -> Result<Self, CameraModelError> {
        if points3d.len() != points2d.len() {
            return Err(CameraModelError::InvalidParams(
                "Number of 2D and 3D points must match".to_string(),
            ));
        }
        let unknowns = frame.pose_len() + model.num_free_parameters() + 4;
        if 2 * points2d.len() < unknowns {
            return Err(CameraModelError::InvalidParams(format!(
                "{} correspondences cannot constrain {} unknowns",
                points2d.len(),
                unknowns
            )));
        }
        options.validate()?;

        Ok(ReprojectionOptimizationCost {
            model,
            pose: Pose::identity(),
            points3d,
            points2d,
            frame,
            options,
            statistics: None,
            converged: false,
            rounds: 0,
            final_cost: f64::INFINITY,
        })
    }

    /// Starts from `pose` instead of the identity. Ignored for camera points.
    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    /// Returns the camera model, refined once [`Optimizer::optimize`] has run.
    pub fn get_model(&self) -> &M {
        &self.model
    }

    pub fn get_pose(&self) -> &Pose {
        &self.pose
    }

    pub fn statistics(&self) -> Option<&CalibrationStatistics> {
        self.statistics.as_ref()
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Pixel error statistics for the current model and pose.
    pub fn reprojection_error(&self) -> Result<ProjectionError, CameraModelError> {
        let pose = (self.frame == PointFrame::World).then_some(&self.pose);
        compute_reprojection_error(&self.model, pose, &self.points3d, &self.points2d)
    }

    fn gauge_weight(&self) -> f64 {
        self.options
            .gauge_weight
            .unwrap_or_else(|| (self.points2d.len() as f64).sqrt())
    }

    fn objective(&self) -> Result<ReprojectionObjective<'_, M>, CameraModelError> {
        Ok(ReprojectionObjective::new(
            self.model.clone(),
            &self.points3d,
            &self.points2d,
            self.frame,
        )?
        .with_pose(self.pose)
        .with_dependent_parameters(DependentParameters::ClosedForm)
        .with_gauge_weight(self.gauge_weight()))
    }

    /// Packages the outcome of [`Optimizer::optimize`].
    pub fn into_result(self) -> Result<CalibrationResult<M>, CameraModelError> {
        let statistics = self.statistics.ok_or_else(|| {
            CameraModelError::InvalidParams("optimize() has not been run".to_string())
        })?;
        Ok(CalibrationResult {
            model: self.model,
            pose: self.pose,
            statistics,
            converged: self.converged,
            rounds: self.rounds,
            final_cost: self.final_cost,
        })
    }
}

impl<M: CameraModel + fmt::Debug> fmt::Debug for ReprojectionOptimizationCost<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReprojectionOptimizationCost Summary:\n model: {:?}\n pose: {:?}\n frame: {:?}, points: {}",
            self.model,
            self.pose.to_flat(),
            self.frame,
            self.points3d.len(),
        )
    }
}

impl<M> Optimizer for ReprojectionOptimizationCost<M>
where
    M: CameraModel + Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Refines pose and free parameters with `tiny_solver` Levenberg-Marquardt.
    ///
    /// Up to `max_rounds` solver runs are made, each restarting from the best
    /// point so far. The run counts as converged once the Gauss-Newton step
    /// at that point satisfies `|dx| <= tol * (1 + |x|)`. Not converging is
    /// logged, not an error; see [`CalibrationResult::ensure_converged`].
    fn optimize(&mut self, verbose: bool) -> Result<(), CameraModelError> {
        let frame = self.frame;
        let step = self.options.finite_difference_step;
        let tolerance = self.options.convergence_tolerance;

        if verbose {
            info!("Starting camera model optimization...");
            info!("Initial model: {:?}", self.model);
            info!("Number of point correspondences: {}", self.points3d.len());
        }

        let factor = ReprojectionFactor {
            model: self.model.clone(),
            points3d: self.points3d.clone(),
            points2d: self.points2d.clone(),
            frame,
            gauge_weight: self.gauge_weight(),
        };
        let num_residuals = factor.num_residuals();
        let blocks: &[&str] = match frame {
            PointFrame::World => &[POSE_BLOCK, INTRINSICS_BLOCK],
            PointFrame::Camera => &[INTRINSICS_BLOCK],
        };
        let mut problem = tiny_solver::Problem::new();
        problem.add_residual_block(num_residuals, blocks, Box::new(factor), None);

        let mut objective = self.objective()?;
        let mut best = objective.parameters();
        objective.set_parameters(&best)?;
        let mut best_cost = objective.evaluate()?;
        let mut start = best.clone();
        debug!("Initial cost: {:.6e}", best_cost);

        let optimizer = LevenbergMarquardtOptimizer::default();
        let mut converged = false;
        let mut rounds = 0;

        while rounds < self.options.max_rounds {
            rounds += 1;

            let result = optimizer
                .optimize(
                    &problem,
                    &split_blocks(&start, frame),
                    Some(optimizer_options(&self.options)),
                )
                .ok_or_else(|| {
                    CameraModelError::NumericalError("Optimization failed".to_string())
                })?;
            let candidate = join_blocks(&result, frame)?;

            match objective
                .set_parameters(&candidate)
                .and_then(|_| objective.evaluate())
            {
                Ok(cost) if cost <= best_cost => {
                    best = candidate;
                    best_cost = cost;
                }
                Ok(cost) => debug!(
                    "Round {} ended at cost {:.6e}, keeping {:.6e}",
                    rounds, cost, best_cost
                ),
                Err(e) => debug!("Round {} ended at an unusable point: {}", rounds, e),
            }

            let (residuals, jacobian) = numeric_jacobian(&mut objective, &best, step)?;
            let update = gauss_newton_step(&jacobian, &residuals)?;
            let threshold = tolerance * (1.0 + best.norm());

            if verbose {
                info!(
                    "Round {}: cost {:.6e}, Gauss-Newton step {:.3e} (threshold {:.3e})",
                    rounds,
                    best_cost,
                    update.norm(),
                    threshold
                );
            }

            if update.norm() <= threshold {
                converged = true;
                break;
            }

            // Restart from the Gauss-Newton point when it improves on the best.
            let polished = &best + &update;
            start = match objective
                .set_parameters(&polished)
                .and_then(|_| objective.evaluate())
            {
                Ok(cost) if cost < best_cost => {
                    best = polished.clone();
                    best_cost = cost;
                    polished
                }
                _ => best.clone(),
            };
        }

        let statistics = CalibrationStatistics::compute(&mut objective, &best, step)?;
        let model = objective.model().clone();
        let pose = *objective.pose();

        if !statistics.is_well_conditioned(self.options.condition_warning_threshold) {
            warn!(
                "Calibration is poorly constrained: condition number {:.3e} exceeds {:.3e}",
                statistics.condition_number(),
                self.options.condition_warning_threshold
            );
        }
        if !converged {
            warn!(
                "Optimization did not converge after {} rounds (cost {:.6e})",
                rounds, best_cost
            );
        }

        model.validate_params()?;

        if verbose {
            info!("Optimization finished after {} rounds", rounds);
            info!("Optimized model: {:?}", model);
        }

        self.model = model;
        self.pose = pose;
        self.statistics = Some(statistics);
        self.converged = converged;
        self.rounds = rounds;
        self.final_cost = best_cost;

        Ok(())
    }

    /// Seeds the non-linear step.
    ///
    /// For world points a normalized DLT gives the pose and pinhole
    /// parameters. The free parameters are reset to their nominal values and
    /// the pinhole parameters are then re-solved in closed form.
    fn linear_estimation(&mut self) -> Result<(), CameraModelError> {
        let nominal = self.model.nominal_free_parameters();

        match self.frame {
            PointFrame::World => {
                let estimate = estimate_pinhole_pose(&self.points3d, &self.points2d)?;
                info!(
                    "Linear estimation: fx = {:.4}, fy = {:.4}, cx = {:.4}, cy = {:.4}, skew = {:.4e}",
                    estimate.intrinsics.fx,
                    estimate.intrinsics.fy,
                    estimate.intrinsics.cx,
                    estimate.intrinsics.cy,
                    estimate.skew
                );
                self.model
                    .set_dependent_parameters(self.model.get_resolution(), estimate.intrinsics);
                self.pose = estimate.pose;
            }
            PointFrame::Camera => self.pose = Pose::identity(),
        }
        self.model.set_free_parameters(&nominal)?;

        let model = {
            let mut objective = self.objective()?;
            let initial = objective.parameters();
            objective.set_parameters(&initial)?;
            objective.model().clone()
        };
        self.model = model;

        debug!("Initial model: {:?}", self.model.get_intrinsics());
        Ok(())
    }

    fn get_intrinsics(&self) -> Intrinsics {
        self.model.get_intrinsics()
    }

    fn get_resolution(&self) -> Resolution {
        self.model.get_resolution()
    }

    fn get_distortion(&self) -> Vec<f64> {
        self.model.get_distortion()
    }
}

/// Refined camera, pose and diagnostics.
#[derive(Debug, Clone)]
pub struct CalibrationResult<M> {
    pub model: M,
    /// Camera-from-world pose, identity when calibrating from camera points.
    pub pose: Pose,
    pub statistics: CalibrationStatistics,
    pub converged: bool,
    pub rounds: usize,
    /// Sum of squared pixel residuals at the solution.
    pub final_cost: f64,
}

impl<M: CameraModel> CalibrationResult<M> {
    /// Turns a non-converged result into [`CameraModelError::DidNotConverge`].
    pub fn ensure_converged(self) -> Result<Self, CameraModelError> {
        if self.converged {
            Ok(self)
        } else {
            Err(CameraModelError::DidNotConverge {
                iterations: self.rounds,
            })
        }
    }

    pub fn report(&self) -> CalibrationReport {
        CalibrationReport {
            resolution: self.model.get_resolution(),
            intrinsics: self.model.get_intrinsics(),
            distortion: self.model.get_distortion(),
            free_parameters: self.model.free_parameters().iter().copied().collect(),
            pose: self.pose.to_flat().to_vec(),
            converged: self.converged,
            rounds: self.rounds,
            final_cost: self.final_cost,
            statistics: self.statistics.clone(),
        }
    }
}

/// Serializable summary of a [`CalibrationResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub resolution: Resolution,
    pub intrinsics: Intrinsics,
    pub distortion: Vec<f64>,
    pub free_parameters: Vec<f64>,
    /// `[qs, qi, qj, qk, tx, ty, tz]`
    pub pose: Vec<f64>,
    pub converged: bool,
    pub rounds: usize,
    pub final_cost: f64,
    pub statistics: CalibrationStatistics,
}

impl CalibrationReport {
    pub fn to_json(&self) -> Result<String, CameraModelError> {
        serde_json::to_string_pretty(self).map_err(|e| CameraModelError::JsonError(e.to_string()))
    }
}

fn calibrate<M>(
    template: &M,
    points3d: &[Vector3<f64>],
    points2d: &[Vector2<f64>],
    frame: PointFrame,
    options: &SolverOptions,
) -> Result<CalibrationResult<M>, CameraModelError>
where
    M: CameraModel + Clone + fmt::Debug + Send + Sync + 'static,
{
    let mut cost = ReprojectionOptimizationCost::new(
        template.clone(),
        points3d.to_vec(),
        points2d.to_vec(),
        frame,
        options.clone(),
    )?;
    cost.linear_estimation()?;
    cost.optimize(options.verbose)?;
    cost.into_result()
}

/// Estimates the camera-from-world pose and the parameters of `template`.
///
/// `template` supplies the resolution and the set of free parameters (for
/// example which coefficients are gated off); its current values are
/// ignored. The result is returned even if the solver did not converge.
pub fn estimate_camera_parameters<M>(
    template: &M,
    points3d_world: &[Vector3<f64>],
    points2d: &[Vector2<f64>],
    options: &SolverOptions,
) -> Result<CalibrationResult<M>, CameraModelError>
where
    M: CameraModel + Clone + fmt::Debug + Send + Sync + 'static,
{
    calibrate(template, points3d_world, points2d, PointFrame::World, options)
}

/// Like [`estimate_camera_parameters`] for points already in camera
/// coordinates; only the model parameters are estimated.
pub fn estimate_camera_intrinsics<M>(
    template: &M,
    points3d_camera: &[Vector3<f64>],
    points2d: &[Vector2<f64>],
    options: &SolverOptions,
) -> Result<CalibrationResult<M>, CameraModelError>
where
    M: CameraModel + Clone + fmt::Debug + Send + Sync + 'static,
{
    calibrate(template, points3d_camera, points2d, PointFrame::Camera, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PlumbBobModel;
    use crate::optimization::test_data::{reference_model, reference_pose, synthetic_data};
    use approx::assert_relative_eq;

    fn template() -> PlumbBobModel {
        let mut template = PlumbBobModel::default();
        template.set_dependent_parameters(
            Resolution {
                width: 320,
                height: 240,
            },
            Intrinsics {
                fx: 1.0,
                fy: 1.0,
                cx: 0.0,
                cy: 0.0,
            },
        );
        template
    }

    fn assert_models_match(estimated: &PlumbBobModel, truth: &PlumbBobModel) {
        let (e, t) = (estimated.get_intrinsics(), truth.get_intrinsics());
        assert_relative_eq!(e.fx, t.fx, epsilon = 5e-5, max_relative = 5e-5);
        assert_relative_eq!(e.fy, t.fy, epsilon = 5e-5, max_relative = 5e-5);
        assert_relative_eq!(e.cx, t.cx, epsilon = 5e-5, max_relative = 5e-5);
        assert_relative_eq!(e.cy, t.cy, epsilon = 5e-5, max_relative = 5e-5);
        assert_relative_eq!(estimated.skew(), truth.skew(), epsilon = 5e-5);
        for (e, t) in estimated.radial().iter().zip(truth.radial()) {
            assert_relative_eq!(*e, t, epsilon = 5e-5);
        }
        for (e, t) in estimated.tangential().iter().zip(truth.tangential()) {
            assert_relative_eq!(*e, t, epsilon = 5e-5);
        }
    }

    #[test]
    fn test_estimate_camera_parameters() {
        let truth = reference_model();
        let pose = reference_pose();
        let data = synthetic_data(&truth, &pose);

        let result = estimate_camera_parameters(
            &template(),
            &data.points3d_world,
            &data.points2d,
            &SolverOptions::default(),
        )
        .unwrap()
        .ensure_converged()
        .unwrap();

        assert_models_match(&result.model, &truth);
        assert_relative_eq!(
            result.pose.to_homogeneous(),
            pose.to_homogeneous(),
            epsilon = 5e-5
        );
        assert!(result.statistics.condition_number() < 1e8);
        assert_eq!(result.statistics.parameters().len(), 13);
        assert!(result.final_cost < 1e-6);

        let error = compute_reprojection_error(
            &result.model,
            Some(&result.pose),
            &data.points3d_world,
            &data.points2d,
        )
        .unwrap();
        assert!(error.max < 1e-3);
    }

    #[test]
    fn test_gated_coefficients_stay_zero() {
        let mut truth = PlumbBobModel::new(
            Resolution {
                width: 320,
                height: 240,
            },
            Intrinsics {
                fx: 30.0,
                fy: 15.0,
                cx: 100.0,
                cy: 125.0,
            },
            0.0,
            [0.02, 1e-4, 0.0],
            [-0.01, 0.005],
        )
        .unwrap();
        truth.allow_skew(false);
        truth.allow_sixth_order_radial(false);
        let pose = reference_pose();
        let data = synthetic_data(&truth, &pose);

        let mut gated = template();
        gated.allow_skew(false);
        gated.allow_sixth_order_radial(false);

        let result = estimate_camera_parameters(
            &gated,
            &data.points3d_world,
            &data.points2d,
            &SolverOptions::default(),
        )
        .unwrap();

        assert!(result.converged);
        assert_eq!(result.model.skew(), 0.0);
        assert_eq!(result.model.radial()[2], 0.0);
        assert_eq!(result.statistics.parameters().len(), 11);
        assert_models_match(&result.model, &truth);
    }

    #[test]
    fn test_estimate_camera_intrinsics_from_camera_points() {
        let truth = reference_model();
        let data = synthetic_data(&truth, &reference_pose());

        let result = estimate_camera_intrinsics(
            &template(),
            &data.points3d_camera,
            &data.points2d,
            &SolverOptions::default(),
        )
        .unwrap();

        assert!(result.converged);
        assert_models_match(&result.model, &truth);
        assert_eq!(result.pose, Pose::identity());
        assert_eq!(result.statistics.parameters().len(), 6);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let truth = reference_model();
        let data = synthetic_data(&truth, &reference_pose());
        let result = estimate_camera_intrinsics(
            &template(),
            &data.points3d_camera,
            &data.points2d,
            &SolverOptions::default(),
        )
        .unwrap();

        let report = result.report();
        assert_eq!(report.free_parameters.len(), 6);
        assert_eq!(report.pose, Pose::identity().to_flat().to_vec());

        let json = report.to_json().unwrap();
        assert!(json.contains("\"condition_number\""));
        assert!(json.contains("\"intrinsics\""));
    }

    #[test]
    fn test_round_budget_exhausted_is_reported() {
        let truth = reference_model();
        let pose = reference_pose();
        let data = synthetic_data(&truth, &pose);
        let options = SolverOptions {
            max_iterations: 1,
            max_rounds: 1,
            ..SolverOptions::default()
        };

        let mut seed = ReprojectionOptimizationCost::new(
            template(),
            data.points3d_world.clone(),
            data.points2d.clone(),
            PointFrame::World,
            options.clone(),
        )
        .unwrap();
        seed.linear_estimation().unwrap();
        let mut objective = seed.objective().unwrap();
        objective.set_parameters(&objective.parameters()).unwrap();
        let seed_cost = objective.evaluate().unwrap();

        let result =
            estimate_camera_parameters(&template(), &data.points3d_world, &data.points2d, &options)
                .unwrap();

        assert!(!result.converged);
        assert_eq!(result.rounds, 1);
        assert!(result.final_cost.is_finite());
        assert!(result.final_cost <= seed_cost);
        assert_eq!(result.statistics.parameters().len(), 13);
        assert!(matches!(
            result.ensure_converged(),
            Err(CameraModelError::DidNotConverge { iterations: 1 })
        ));
    }

    #[test]
    fn test_degenerate_image_plane_gives_invalid_residuals() {
        let model = reference_model();
        // Every point lies on the same viewing ray.
        let points3d: Vec<Vector3<f64>> = (1..=8)
            .map(|i| Vector3::new(0.5, 0.25, 1.0) * i as f64)
            .collect();
        let points2d = vec![Vector2::new(115.0, 128.75); points3d.len()];

        let factor = ReprojectionFactor {
            model: model.clone(),
            points3d: points3d.clone(),
            points2d: points2d.clone(),
            frame: PointFrame::Camera,
            gauge_weight: 1.0,
        };
        let free = model.free_parameters();
        let residuals = Factor::<f64>::residual_func(&factor, &[free.clone()]);
        assert_eq!(residuals.len(), 2 * points3d.len());
        assert!(residuals.iter().all(|r| *r == INVALID_RESIDUAL));

        let mut objective =
            ReprojectionObjective::new(model, &points3d, &points2d, PointFrame::Camera)
                .unwrap()
                .with_dependent_parameters(DependentParameters::ClosedForm);
        assert!(matches!(
            objective.set_parameters(&free),
            Err(CameraModelError::NumericalError(_))
        ));
    }

    #[test]
    fn test_rejects_underdetermined_input() {
        let points3d = vec![Vector3::new(0.0, 0.0, 1.0); 5];
        let points2d = vec![Vector2::new(0.0, 0.0); 5];
        assert!(matches!(
            estimate_camera_parameters(
                &template(),
                &points3d,
                &points2d,
                &SolverOptions::default()
            ),
            Err(CameraModelError::InvalidParams(_))
        ));
        assert!(matches!(
            estimate_camera_intrinsics(
                &template(),
                &points3d[..4],
                &points2d,
                &SolverOptions::default()
            ),
            Err(CameraModelError::InvalidParams(_))
        ));
    }
}

//! Reprojection error as a function of a flat parameter vector.
//!
//! [`ReprojectionObjective`] decodes `[pose | free parameters]`, projects every
//! 3D point through the camera model and compares against the observed pixels.
//! The generic helpers in this module are shared with the `tiny_solver` factor
//! so that both evaluate the same model.

use crate::camera::{CameraModel, CameraModelError, ImagePlanePoint, Intrinsics};
use crate::geometry::{transform_flat, Pose};
use nalgebra::{convert, DVector, RealField, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Coordinate frame of the 3D points handed to the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointFrame {
    /// Points are mapped through the estimated pose before projection.
    World,
    /// Points are already in camera coordinates; no pose is estimated.
    Camera,
}

impl PointFrame {
    /// Number of leading pose entries in the flat parameter vector.
    pub fn pose_len(self) -> usize {
        match self {
            PointFrame::World => Pose::FLAT_LEN,
            PointFrame::Camera => 0,
        }
    }
}

/// How the focal lengths and principal point are handled while the flat
/// parameter vector changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependentParameters {
    /// Keep the values the model was constructed with.
    Fixed,
    /// Re-solve `fx, cx` and `fy, cy` by linear least squares on every update.
    ClosedForm,
}

/// Distorted image-plane points for every correspondence.
///
/// Returns the offending depth as the error when a point is not in front of the camera.
pub(crate) fn image_plane_points<T: RealField, M: CameraModel>(
    model: &M,
    pose: Option<&[T]>,
    free: &[T],
    points3d: &[Vector3<f64>],
) -> Result<Vec<ImagePlanePoint<T>>, T> {
    let zero: T = convert(0.0);
    points3d
        .iter()
        .map(|point| {
            let [x, y, z] = match pose {
                Some(pose) => transform_flat(pose, point),
                None => [convert(point.x), convert(point.y), convert(point.z)],
            };
            if !(z > zero) {
                return Err(z);
            }
            let xn = x / z.clone();
            let yn = y / z;
            Ok(model.distort_normalized(free, xn, yn))
        })
        .collect()
}

/// Least-squares fit of `target = slope * x + intercept`.
fn fit_line<T: RealField>(samples: Vec<(T, T)>) -> Option<(T, T)> {
    let zero: T = convert(0.0);
    let n: T = convert(samples.len() as f64);

    let (sum_x, sum_t) = samples
        .iter()
        .fold((zero.clone(), zero.clone()), |(sx, st), (x, t)| {
            (sx + x.clone(), st + t.clone())
        });
    let mean_x = sum_x / n.clone();
    let mean_t = sum_t / n;

    let (sxx, sxt) = samples
        .iter()
        .fold((zero.clone(), zero.clone()), |(sxx, sxt), (x, t)| {
            let dx = x.clone() - mean_x.clone();
            let dt = t.clone() - mean_t.clone();
            (sxx + dx.clone() * dx.clone(), sxt + dx * dt)
        });
    if !(sxx > zero) {
        return None;
    }

    let slope = sxt / sxx;
    let intercept = mean_t - slope.clone() * mean_x;
    Some((slope, intercept))
}

/// Solves `[fx, fy, cx, cy]` given distorted image-plane points and observations.
///
/// Pixels are affine in these four values, so the fit is exact for noiseless data.
pub(crate) fn fit_pinhole<T: RealField>(
    points: &[ImagePlanePoint<T>],
    observations: &[Vector2<f64>],
) -> Option<[T; 4]> {
    if points.is_empty() || points.len() != observations.len() {
        return None;
    }

    let horizontal = points
        .iter()
        .zip(observations)
        .map(|(p, o)| (p.x.clone(), convert::<f64, T>(o.x) - p.offset_u.clone()))
        .collect();
    let vertical = points
        .iter()
        .zip(observations)
        .map(|(p, o)| (p.y.clone(), convert::<f64, T>(o.y) - p.offset_v.clone()))
        .collect();

    let (fx, cx) = fit_line(horizontal)?;
    let (fy, cy) = fit_line(vertical)?;
    Some([fx, fy, cx, cy])
}

/// `weight * (|q|^2 - 1)` for the raw quaternion at the front of `pose`.
pub(crate) fn gauge_residual<T: RealField>(pose: &[T], weight: T) -> T {
    let norm_sq = pose[..4]
        .iter()
        .fold(convert::<f64, T>(0.0), |acc, q| acc + q.clone() * q.clone());
    weight * (norm_sq - convert(1.0))
}

/// Sum of squared reprojection errors over borrowed correspondences.
///
/// The flat parameter layout is `[qs, qi, qj, qk, tx, ty, tz, free...]` for
/// [`PointFrame::World`] and just `[free...]` for [`PointFrame::Camera`].
#[derive(Debug, Clone)]
pub struct ReprojectionObjective<'a, M> {
    model: M,
    pose: Pose,
    points3d: &'a [Vector3<f64>],
    points2d: &'a [Vector2<f64>],
    frame: PointFrame,
    dependent: DependentParameters,
    gauge_weight: f64,
    quaternion_norm_sq: f64,
}

impl<'a, M: CameraModel + Clone> ReprojectionObjective<'a, M> {
    /// Creates an objective with identity pose, fixed dependent parameters and
    /// a gauge weight of `sqrt(n)`.
    pub fn new(
        model: M,
        points3d: &'a [Vector3<f64>],
        points2d: &'a [Vector2<f64>],
        frame: PointFrame,
    ) -> Result<Self, CameraModelError> {
        if points3d.len() != points2d.len() {
            return Err(CameraModelError::InvalidParams(
                "Number of 2D and 3D points must match".to_string(),
            ));
        }
        if points3d.is_empty() {
            return Err(CameraModelError::InvalidParams(
                "Points arrays cannot be empty".to_string(),
            ));
        }

        Ok(ReprojectionObjective {
            model,
            pose: Pose::identity(),
            points3d,
            points2d,
            frame,
            dependent: DependentParameters::Fixed,
            gauge_weight: (points3d.len() as f64).sqrt(),
            quaternion_norm_sq: 1.0,
        })
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self.quaternion_norm_sq = 1.0;
        self
    }

    pub fn with_dependent_parameters(mut self, dependent: DependentParameters) -> Self {
        self.dependent = dependent;
        self
    }

    pub fn with_gauge_weight(mut self, gauge_weight: f64) -> Self {
        self.gauge_weight = gauge_weight;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn frame(&self) -> PointFrame {
        self.frame
    }

    pub fn gauge_weight(&self) -> f64 {
        self.gauge_weight
    }

    pub fn num_parameters(&self) -> usize {
        self.frame.pose_len() + self.model.num_free_parameters()
    }

    /// Length of [`ReprojectionObjective::residuals`].
    pub fn num_residuals(&self) -> usize {
        2 * self.points2d.len()
    }

    /// Length of [`ReprojectionObjective::solver_residuals`].
    pub fn num_solver_residuals(&self) -> usize {
        self.num_residuals() + usize::from(self.frame == PointFrame::World)
    }

    /// Flat encoding of the current pose and free parameters.
    pub fn parameters(&self) -> DVector<f64> {
        let pose = self.pose.to_flat();
        let pose = &pose[..self.frame.pose_len()];
        let free = self.model.free_parameters();
        DVector::from_iterator(
            pose.len() + free.len(),
            pose.iter().copied().chain(free.iter().copied()),
        )
    }

    /// Decodes `parameters` into the working pose and model.
    ///
    /// Either the whole vector is applied or, on error, nothing is.
    pub fn set_parameters(&mut self, parameters: &DVector<f64>) -> Result<(), CameraModelError> {
        let expected = self.num_parameters();
        if parameters.len() != expected {
            return Err(CameraModelError::SizeMismatch {
                expected,
                actual: parameters.len(),
            });
        }

        let (pose_values, free_values) = parameters.as_slice().split_at(self.frame.pose_len());
        let (pose, quaternion_norm_sq) = match self.frame {
            PointFrame::World => (
                Pose::from_flat(pose_values)?,
                pose_values[..4].iter().map(|q| q * q).sum(),
            ),
            PointFrame::Camera => (self.pose, 1.0),
        };

        let mut model = self.model.clone();
        model.set_free_parameters(&DVector::from_column_slice(free_values))?;

        if self.dependent == DependentParameters::ClosedForm {
            let pose_values = (self.frame == PointFrame::World).then_some(pose_values);
            let points = image_plane_points(&model, pose_values, free_values, self.points3d)
                .map_err(CameraModelError::InvalidGeometry)?;
            let [fx, fy, cx, cy] = fit_pinhole(&points, self.points2d).ok_or_else(|| {
                CameraModelError::NumericalError(
                    "Image plane points are degenerate, cannot solve for focal lengths"
                        .to_string(),
                )
            })?;
            model.set_dependent_parameters(model.get_resolution(), Intrinsics { fx, fy, cx, cy });
        }

        self.pose = pose;
        self.model = model;
        self.quaternion_norm_sq = quaternion_norm_sq;
        Ok(())
    }

    /// Per-axis pixel residuals `project(pose * p) - observed`.
    ///
    /// The pose is used with its unit quaternion, so the scale of the raw
    /// quaternion handed to [`ReprojectionObjective::set_parameters`] has no effect.
    pub fn residuals(&self) -> Result<DVector<f64>, CameraModelError> {
        let mut residuals = DVector::zeros(self.num_residuals());

        for (i, (point3d, point2d)) in self.points3d.iter().zip(self.points2d).enumerate() {
            let camera_point = match self.frame {
                PointFrame::World => self.pose.transform_point(point3d),
                PointFrame::Camera => *point3d,
            };
            let projected = self.model.project(&camera_point)?;
            residuals[2 * i] = projected.x - point2d.x;
            residuals[2 * i + 1] = projected.y - point2d.y;
        }

        Ok(residuals)
    }

    /// Pixel residuals followed, in [`PointFrame::World`], by the quaternion
    /// gauge residual `w * (|q|^2 - 1)`.
    ///
    /// This is the vector the solver and the diagnostics differentiate.
    pub fn solver_residuals(&self) -> Result<DVector<f64>, CameraModelError> {
        let pixels = self.residuals()?;
        if self.frame == PointFrame::Camera {
            return Ok(pixels);
        }

        let gauge = self.gauge_weight * (self.quaternion_norm_sq - 1.0);
        Ok(DVector::from_iterator(
            self.num_solver_residuals(),
            pixels.iter().copied().chain(std::iter::once(gauge)),
        ))
    }

    /// Sum of squared pixel residuals.
    pub fn evaluate(&self) -> Result<f64, CameraModelError> {
        Ok(self.residuals()?.norm_squared())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::test_data::{reference_model, reference_pose, synthetic_data};
    use approx::assert_relative_eq;

    #[test]
    fn test_objective_is_zero_at_truth() {
        let model = reference_model();
        let pose = reference_pose();
        let data = synthetic_data(&model, &pose);

        for dependent in [DependentParameters::Fixed, DependentParameters::ClosedForm] {
            let mut objective = ReprojectionObjective::new(
                model.clone(),
                &data.points3d_world,
                &data.points2d,
                PointFrame::World,
            )
            .unwrap()
            .with_dependent_parameters(dependent);

            let truth = objective.clone().with_pose(pose).parameters();
            objective.set_parameters(&truth).unwrap();

            assert!(objective.evaluate().unwrap() <= 1e-13);
            assert_relative_eq!(
                objective.model().free_parameters(),
                model.free_parameters(),
                epsilon = 1e-13
            );
            assert_relative_eq!(
                objective.pose().to_homogeneous(),
                pose.to_homogeneous(),
                epsilon = 1e-13
            );
            let recovered = objective.model().get_intrinsics();
            assert_relative_eq!(recovered.fx, 30.0, max_relative = 5e-5);
            assert_relative_eq!(recovered.fy, 15.0, max_relative = 5e-5);
            assert_relative_eq!(recovered.cx, 100.0, max_relative = 5e-5);
            assert_relative_eq!(recovered.cy, 125.0, max_relative = 5e-5);
        }
    }

    #[test]
    fn test_objective_grows_away_from_truth() {
        let model = reference_model();
        let pose = reference_pose();
        let data = synthetic_data(&model, &pose);

        let mut objective = ReprojectionObjective::new(
            model,
            &data.points3d_world,
            &data.points2d,
            PointFrame::World,
        )
        .unwrap()
        .with_dependent_parameters(DependentParameters::ClosedForm)
        .with_pose(pose);
        let truth = objective.parameters();
        assert_eq!(truth.len(), 13);

        for i in 0..truth.len() {
            for delta in [0.01, -0.01] {
                let mut perturbed = truth.clone();
                perturbed[i] += delta;
                objective.set_parameters(&perturbed).unwrap();
                let value = objective.evaluate().unwrap();
                assert!(
                    value > 1e-10,
                    "parameter {} offset by {} gives {}",
                    i,
                    delta,
                    value
                );
            }
        }
    }

    #[test]
    fn test_quaternion_scale_only_affects_gauge_residual() {
        let model = reference_model();
        let pose = reference_pose();
        let data = synthetic_data(&model, &pose);

        let mut objective = ReprojectionObjective::new(
            model,
            &data.points3d_world,
            &data.points2d,
            PointFrame::World,
        )
        .unwrap()
        .with_gauge_weight(2.0)
        .with_pose(pose);

        let mut scaled = objective.parameters();
        for i in 0..4 {
            scaled[i] *= 1.1;
        }
        objective.set_parameters(&scaled).unwrap();

        // The rotation itself is unchanged, so the pixels still match.
        assert!(objective.evaluate().unwrap() <= 1e-13);
        assert_eq!(objective.residuals().unwrap().len(), objective.num_residuals());

        let residuals = objective.solver_residuals().unwrap();
        assert_eq!(residuals.len(), objective.num_solver_residuals());
        assert_eq!(residuals.len(), 2 * data.points2d.len() + 1);
        assert_relative_eq!(
            residuals[residuals.len() - 1],
            2.0 * (1.21 - 1.0),
            max_relative = 1e-9
        );
        assert!(residuals.rows(0, objective.num_residuals()).norm() < 1e-6);
    }

    #[test]
    fn test_camera_frame_has_no_pose() {
        let model = reference_model();
        let pose = reference_pose();
        let data = synthetic_data(&model, &pose);

        let mut objective = ReprojectionObjective::new(
            model.clone(),
            &data.points3d_camera,
            &data.points2d,
            PointFrame::Camera,
        )
        .unwrap()
        .with_dependent_parameters(DependentParameters::ClosedForm);

        assert_eq!(objective.num_parameters(), 6);
        assert_eq!(objective.num_residuals(), 2 * data.points2d.len());
        assert_eq!(objective.num_solver_residuals(), objective.num_residuals());

        objective.set_parameters(&model.free_parameters()).unwrap();
        assert!(objective.evaluate().unwrap() <= 1e-13);
        assert_eq!(*objective.pose(), Pose::identity());
    }

    #[test]
    fn test_set_parameters_is_atomic() {
        let model = reference_model();
        let pose = reference_pose();
        let data = synthetic_data(&model, &pose);

        let mut objective = ReprojectionObjective::new(
            model,
            &data.points3d_world,
            &data.points2d,
            PointFrame::World,
        )
        .unwrap()
        .with_pose(pose);
        let before = objective.parameters();

        let short = DVector::zeros(12);
        assert!(matches!(
            objective.set_parameters(&short),
            Err(CameraModelError::SizeMismatch {
                expected: 13,
                actual: 12
            })
        ));

        // A pose that puts the whole grid behind the camera.
        let mut behind = before.clone();
        behind[6] = -100.0;
        let mut closed_form = objective
            .clone()
            .with_dependent_parameters(DependentParameters::ClosedForm);
        assert!(matches!(
            closed_form.set_parameters(&behind),
            Err(CameraModelError::InvalidGeometry(_))
        ));
        assert_eq!(closed_form.parameters(), before);

        objective.set_parameters(&behind).unwrap();
        assert!(matches!(
            objective.evaluate(),
            Err(CameraModelError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_fit_pinhole_recovers_line() {
        let points: Vec<ImagePlanePoint<f64>> = (0..5)
            .map(|i| {
                let x = i as f64 * 0.1 - 0.2;
                let y = 0.3 - i as f64 * 0.05;
                ImagePlanePoint {
                    x,
                    y,
                    offset_u: 0.5 * y,
                    offset_v: 0.0,
                }
            })
            .collect();
        let observations: Vec<Vector2<f64>> = points
            .iter()
            .map(|p| {
                let (u, v) = p.to_pixel(200.0, 180.0, 320.0, 240.0);
                Vector2::new(u, v)
            })
            .collect();

        let [fx, fy, cx, cy] = fit_pinhole(&points, &observations).unwrap();
        assert_relative_eq!(fx, 200.0, epsilon = 1e-9);
        assert_relative_eq!(fy, 180.0, epsilon = 1e-9);
        assert_relative_eq!(cx, 320.0, epsilon = 1e-9);
        assert_relative_eq!(cy, 240.0, epsilon = 1e-9);

        let flat = vec![ImagePlanePoint {
            x: 0.5,
            y: 0.25,
            offset_u: 0.0,
            offset_v: 0.0,
        }; 3];
        assert!(fit_pinhole(&flat, &observations[..3]).is_none());
    }
}

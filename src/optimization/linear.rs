//! Closed-form pinhole initialization from 3D-2D correspondences.
//!
//! A projection matrix is estimated with the Hartley-normalized direct linear
//! transform and split into intrinsics, rotation and translation by an RQ
//! decomposition. Lens distortion is ignored at this stage; the result only
//! seeds the non-linear refinement.

use crate::camera::{CameraModelError, Intrinsics};
use crate::geometry::Pose;
use nalgebra::{
    DMatrix, Matrix3, Matrix3x4, Matrix4, Rotation3, UnitQuaternion, Vector2, Vector3, Vector4,
};
use std::f64::consts::SQRT_2;

/// Fewest correspondences that determine a projection matrix.
pub const MIN_DLT_POINTS: usize = 6;

/// Pinhole camera recovered by [`estimate_pinhole_pose`].
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeEstimate {
    pub intrinsics: Intrinsics,
    /// Upper-right off-diagonal entry of the calibration matrix, in pixels.
    pub skew: f64,
    pub pose: Pose,
}

/// Similarity that moves the centroid to the origin with mean distance `sqrt(2)`.
fn normalize_2d(points: &[Vector2<f64>]) -> Option<Matrix3<f64>> {
    let n = points.len() as f64;
    let centroid = points.iter().sum::<Vector2<f64>>() / n;
    let mean_distance = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if !(mean_distance > 0.0) || !mean_distance.is_finite() {
        return None;
    }
    let s = SQRT_2 / mean_distance;
    Some(Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    ))
}

/// Similarity that moves the centroid to the origin with mean distance `sqrt(3)`.
fn normalize_3d(points: &[Vector3<f64>]) -> Option<Matrix4<f64>> {
    let n = points.len() as f64;
    let centroid = points.iter().sum::<Vector3<f64>>() / n;
    let mean_distance = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if !(mean_distance > 0.0) || !mean_distance.is_finite() {
        return None;
    }
    let s = 3.0f64.sqrt() / mean_distance;
    let mut transform = Matrix4::identity() * s;
    transform[(3, 3)] = 1.0;
    transform
        .fixed_view_mut::<3, 1>(0, 3)
        .copy_from(&(-s * centroid));
    Some(transform)
}

fn check_correspondences(
    points3d: &[Vector3<f64>],
    points2d: &[Vector2<f64>],
) -> Result<(), CameraModelError> {
    if points3d.len() != points2d.len() {
        return Err(CameraModelError::InvalidParams(
            "Number of 2D and 3D points must match".to_string(),
        ));
    }
    if points3d.len() < MIN_DLT_POINTS {
        return Err(CameraModelError::InvalidParams(format!(
            "At least {} correspondences are needed, got {}",
            MIN_DLT_POINTS,
            points3d.len()
        )));
    }
    Ok(())
}

/// Estimates the 3x4 projection matrix `P ~ K [R | t]` by normalized DLT.
///
/// The result is defined up to scale.
pub fn estimate_projection_matrix(
    points3d: &[Vector3<f64>],
    points2d: &[Vector2<f64>],
) -> Result<Matrix3x4<f64>, CameraModelError> {
    check_correspondences(points3d, points2d)?;

    let degenerate =
        || CameraModelError::NumericalError("Correspondences are degenerate".to_string());
    let transform_2d = normalize_2d(points2d).ok_or_else(degenerate)?;
    let transform_3d = normalize_3d(points3d).ok_or_else(degenerate)?;

    let mut system = DMatrix::<f64>::zeros(2 * points3d.len(), 12);
    for (i, (point3d, point2d)) in points3d.iter().zip(points2d).enumerate() {
        let world = transform_3d * Vector4::new(point3d.x, point3d.y, point3d.z, 1.0);
        let pixel = transform_2d * Vector3::new(point2d.x, point2d.y, 1.0);
        let world_t = world.transpose();

        system
            .fixed_view_mut::<1, 4>(2 * i, 0)
            .copy_from(&world_t);
        system
            .fixed_view_mut::<1, 4>(2 * i, 8)
            .copy_from(&(world_t * -pixel.x));
        system
            .fixed_view_mut::<1, 4>(2 * i + 1, 4)
            .copy_from(&world_t);
        system
            .fixed_view_mut::<1, 4>(2 * i + 1, 8)
            .copy_from(&(world_t * -pixel.y));
    }

    let svd = system.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| CameraModelError::NumericalError("SVD failed".to_string()))?;
    // nalgebra does not order singular values
    let (smallest, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .ok_or_else(degenerate)?;

    let normalized = Matrix3x4::from_fn(|r, c| v_t[(smallest, 4 * r + c)]);
    let inverse_2d = transform_2d.try_inverse().ok_or_else(degenerate)?;
    Ok(inverse_2d * normalized * transform_3d)
}

/// Splits `P` into an upper-triangular `K` with positive diagonal and
/// `K[2][2] == 1`, a proper rotation `R` and a translation `t` so that
/// `P ~ K [R | t]` with a positive scale factor.
pub fn decompose_projection_matrix(
    projection: &Matrix3x4<f64>,
) -> Result<(Matrix3<f64>, Rotation3<f64>, Vector3<f64>), CameraModelError> {
    let mut projection = *projection;
    let mut left: Matrix3<f64> = projection.fixed_view::<3, 3>(0, 0).into_owned();

    let det = left.determinant();
    if !det.is_finite() || det.abs() <= f64::EPSILON * left.norm().powi(3) {
        return Err(CameraModelError::NumericalError(
            "Projection matrix is singular".to_string(),
        ));
    }
    if det < 0.0 {
        projection = -projection;
        left = -left;
    }

    // RQ decomposition through QR of the row-reversed transpose.
    let flip = Matrix3::new(0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0);
    let qr = (flip * left).transpose().qr();
    let mut calibration = flip * qr.r().transpose() * flip;
    let mut rotation = flip * qr.q().transpose();

    for i in 0..3 {
        if calibration[(i, i)] < 0.0 {
            let mut column = calibration.column_mut(i);
            column *= -1.0;
            let mut row = rotation.row_mut(i);
            row *= -1.0;
        }
    }

    let inverse = calibration.try_inverse().ok_or_else(|| {
        CameraModelError::NumericalError("Calibration matrix is singular".to_string())
    })?;
    let translation = inverse * projection.column(3);

    let scale = calibration[(2, 2)];
    calibration /= scale;

    Ok((
        calibration,
        Rotation3::from_matrix_unchecked(rotation),
        translation,
    ))
}

/// Estimates pinhole intrinsics, skew and camera-from-world pose.
pub fn estimate_pinhole_pose(
    points3d: &[Vector3<f64>],
    points2d: &[Vector2<f64>],
) -> Result<PinholeEstimate, CameraModelError> {
    let projection = estimate_projection_matrix(points3d, points2d)?;
    let (calibration, rotation, translation) = decompose_projection_matrix(&projection)?;

    Ok(PinholeEstimate {
        intrinsics: Intrinsics {
            fx: calibration[(0, 0)],
            fy: calibration[(1, 1)],
            cx: calibration[(0, 2)],
            cy: calibration[(1, 2)],
        },
        skew: calibration[(0, 1)],
        pose: Pose::new(UnitQuaternion::from_rotation_matrix(&rotation), translation),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraModel, PlumbBobModel, Resolution};
    use crate::optimization::test_data::{reference_pose, synthetic_data};
    use approx::assert_relative_eq;

    #[test]
    fn test_decompose_known_projection() {
        let calibration = Matrix3::new(500.0, 2.0, 320.0, 0.0, 480.0, 240.0, 0.0, 0.0, 1.0);
        let rotation = Rotation3::from_euler_angles(0.3, -0.1, 0.7);
        let translation = Vector3::new(0.5, -0.2, 3.0);

        let mut extrinsics = Matrix3x4::zeros();
        extrinsics
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(rotation.matrix());
        extrinsics.set_column(3, &translation);
        // Arbitrary negative scale, as a DLT may return.
        let projection = calibration * extrinsics * -0.02;

        let (k, r, t) = decompose_projection_matrix(&projection).unwrap();
        assert_relative_eq!(k, calibration, epsilon = 1e-9);
        assert_relative_eq!(r.matrix(), rotation.matrix(), epsilon = 1e-12);
        assert_relative_eq!(t, translation, epsilon = 1e-9);
    }

    #[test]
    fn test_estimate_pinhole_pose_from_synthetic_grid() {
        let model = PlumbBobModel::new(
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
            0.25,
            [0.0; 3],
            [0.0; 2],
        )
        .unwrap();
        let pose = reference_pose();
        let data = synthetic_data(&model, &pose);

        let estimate = estimate_pinhole_pose(&data.points3d_world, &data.points2d).unwrap();

        assert_relative_eq!(estimate.intrinsics.fx, 30.0, epsilon = 1e-7);
        assert_relative_eq!(estimate.intrinsics.fy, 15.0, epsilon = 1e-7);
        assert_relative_eq!(estimate.intrinsics.cx, 100.0, epsilon = 1e-7);
        assert_relative_eq!(estimate.intrinsics.cy, 125.0, epsilon = 1e-7);
        assert_relative_eq!(estimate.skew, 0.25, epsilon = 1e-7);
        assert_relative_eq!(
            estimate.pose.to_homogeneous(),
            pose.to_homogeneous(),
            epsilon = 1e-8
        );

        // The recovered pinhole reproduces the observations.
        let recovered = PlumbBobModel::new(
            model.get_resolution(),
            estimate.intrinsics.clone(),
            estimate.skew,
            [0.0; 3],
            [0.0; 2],
        )
        .unwrap();
        for (point3d, point2d) in data.points3d_world.iter().zip(&data.points2d) {
            let pixel = recovered
                .project(&estimate.pose.transform_point(point3d))
                .unwrap();
            assert_relative_eq!(pixel, *point2d, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_rejects_too_few_points() {
        let points3d = vec![Vector3::new(0.0, 0.0, 1.0); 5];
        let points2d = vec![Vector2::new(0.0, 0.0); 5];
        assert!(matches!(
            estimate_pinhole_pose(&points3d, &points2d),
            Err(CameraModelError::InvalidParams(_))
        ));
        assert!(matches!(
            estimate_pinhole_pose(&points3d, &points2d[..4]),
            Err(CameraModelError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_rejects_degenerate_points() {
        let points3d = vec![Vector3::new(1.0, 2.0, 3.0); 8];
        let points2d = vec![Vector2::new(10.0, 20.0); 8];
        assert!(estimate_pinhole_pose(&points3d, &points2d).is_err());
    }
}

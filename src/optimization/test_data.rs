//! Synthetic correspondences shared by the optimization tests.

use crate::camera::{CameraModel, Intrinsics, PlumbBobModel, Resolution};
use crate::geometry::{grid_points_3d, AxisRange, Pose};
use nalgebra::{Vector2, Vector3};

pub(crate) fn reference_model() -> PlumbBobModel {
    PlumbBobModel::new(
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
        0.001,
        [0.02, 1e-4, 7e-6],
        [-0.01, 0.005],
    )
    .unwrap()
}

pub(crate) fn reference_pose() -> Pose {
    Pose::from_euler_angles(0.1, -0.2, 0.3, Vector3::new(0.2, -0.7, -0.2))
}

pub(crate) struct SyntheticData {
    pub points3d_world: Vec<Vector3<f64>>,
    pub points3d_camera: Vec<Vector3<f64>>,
    pub points2d: Vec<Vector2<f64>>,
}

pub(crate) fn synthetic_data(model: &PlumbBobModel, pose: &Pose) -> SyntheticData {
    let points3d_world = grid_points_3d(
        AxisRange::new(-1.0, 1.0, 0.31),
        AxisRange::new(-1.0, 1.0, 0.2),
        AxisRange::new(1.0, 10.0, 2.4),
    );
    let points3d_camera: Vec<_> = points3d_world
        .iter()
        .map(|point| pose.transform_point(point))
        .collect();
    let points2d = points3d_camera
        .iter()
        .map(|point| model.project(point).unwrap())
        .collect();

    SyntheticData {
        points3d_world,
        points3d_camera,
        points2d,
    }
}

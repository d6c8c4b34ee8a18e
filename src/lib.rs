//! Plumb Bob Tools Library
//!
//! A Rust library for the Brown-Conrady ("plumb bob") camera model and its
//! calibration. It provides:
//! - Forward projection with radial and tangential distortion, plus analytic
//!   partial derivatives
//! - Newton-based reverse projection from pixels to viewing rays
//! - YAML and single-line text formats for camera intrinsics
//! - Pose and intrinsics estimation from 3D-2D correspondences using a
//!   linear initialization and the tiny-solver optimization framework
//! - Observability diagnostics (curvature eigenvalues and condition number)
//! - Projected area and centroid of circular fiducials

pub mod camera;
pub mod geometry;
pub mod optimization;

// Re-export commonly used types
pub use camera::{
    CameraModel, CameraModelError, Intrinsics, PlumbBobModel, Resolution, ReverseProjection,
};

pub use geometry::{estimate_projected_area_and_centroid, Circle3, Plane3, Pose, Ray3};

pub use optimization::{
    estimate_camera_intrinsics, estimate_camera_parameters, CalibrationResult,
    CalibrationStatistics, Optimizer, ReprojectionOptimizationCost, SolverOptions,
};

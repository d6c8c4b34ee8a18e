use crate::geometry::Ray3;
use nalgebra::{DVector, RealField, Vector2, Vector3};
use serde::{Deserialize, Serialize};

pub mod plumb_bob;
pub mod text_format;

pub use plumb_bob::{PlumbBobModel, ReverseProjection};

/// Pinhole ("dependent") parameters: focal lengths and principal point in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(thiserror::Error, Debug)]
pub enum CameraModelError {
    #[error("Point is at or behind the camera (z = {0})")]
    InvalidGeometry(f64),
    #[error("Reverse projection Jacobian is singular")]
    DegenerateJacobian,
    #[error("Did not converge after {iterations} iterations")]
    DidNotConverge { iterations: usize },
    #[error("Parameter vector has {actual} elements, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("Malformed camera intrinsics record: {0}")]
    MalformedStream(String),
    #[error("Focal length must be positive")]
    FocalLengthMustBePositive,
    #[error("Principal point must be finite")]
    PrincipalPointMustBeFinite,
    #[error("Invalid camera parameters: {0}")]
    InvalidParams(String),
    #[error("Numerical error in computation: {0}")]
    NumericalError(String),
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("Failed to write JSON: {0}")]
    JsonError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for CameraModelError {
    fn from(err: std::io::Error) -> Self {
        CameraModelError::IOError(err.to_string())
    }
}

impl From<yaml_rust::ScanError> for CameraModelError {
    fn from(err: yaml_rust::ScanError) -> Self {
        CameraModelError::YamlError(err.to_string())
    }
}

/// A normalized camera point after lens distortion, split so that the pixel
/// coordinates are affine in the pinhole parameters:
///
/// `u = fx * x + offset_u + cx`, `v = fy * y + offset_v + cy`.
///
/// Keeping the pinhole parameters out of this representation is what lets the
/// estimator solve for them in closed form.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlanePoint<T> {
    pub x: T,
    pub y: T,
    pub offset_u: T,
    pub offset_v: T,
}

impl<T: RealField> ImagePlanePoint<T> {
    /// Maps the point to pixel coordinates with the given pinhole parameters.
    pub fn to_pixel(&self, fx: T, fy: T, cx: T, cy: T) -> (T, T) {
        let u = fx * self.x.clone() + self.offset_u.clone() + cx;
        let v = fy * self.y.clone() + self.offset_v.clone() + cy;
        (u, v)
    }
}

/// Trait defining the core functionality for camera models
pub trait CameraModel {
    /// Project a 3D point in camera coordinates to 2D pixel coordinates
    fn project(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError>;

    /// Reverse project pixel coordinates to a viewing ray through the optical center
    fn reverse_project(
        &self,
        point_2d: &Vector2<f64>,
        normalize: bool,
    ) -> Result<Ray3, CameraModelError>;

    /// Applies the lens model to normalized coordinates `(xn, yn)` using an
    /// arbitrary free-parameter vector.
    ///
    /// The scalar type is generic so the solver can differentiate through it.
    /// For `T = f64` and `free_parameters == self.free_parameters()` the result
    /// must match what [`CameraModel::project`] computes.
    fn distort_normalized<T: RealField>(
        &self,
        free_parameters: &[T],
        xn: T,
        yn: T,
    ) -> ImagePlanePoint<T>
    where
        Self: Sized;

    /// Parameters normally estimated by nonlinear optimization
    fn free_parameters(&self) -> DVector<f64>;

    /// A conservative starting point for [`CameraModel::set_free_parameters`]
    fn nominal_free_parameters(&self) -> DVector<f64>;

    /// Length of the free-parameter vector under the current settings
    fn num_free_parameters(&self) -> usize;

    /// Write a free-parameter vector back into the model
    fn set_free_parameters(&mut self, parameters: &DVector<f64>) -> Result<(), CameraModelError>;

    /// Set the parameters that are normally solved in closed form
    fn set_dependent_parameters(&mut self, resolution: Resolution, intrinsics: Intrinsics);

    /// Load camera parameters from a YAML file
    fn load_from_yaml(path: &str) -> Result<Self, CameraModelError>
    where
        Self: Sized;

    /// Save camera parameters to a YAML file
    fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError>;

    /// Validate camera parameters
    fn validate_params(&self) -> Result<(), CameraModelError>;

    fn get_resolution(&self) -> Resolution;

    fn get_intrinsics(&self) -> Intrinsics;

    fn get_distortion(&self) -> Vec<f64>;
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    pub fn validate_intrinsics(intrinsics: &Intrinsics) -> Result<(), CameraModelError> {
        let positive = |f: f64| f > 0.0 && f.is_finite();
        if !(positive(intrinsics.fx) && positive(intrinsics.fy)) {
            return Err(CameraModelError::FocalLengthMustBePositive);
        }
        if !intrinsics.cx.is_finite() || !intrinsics.cy.is_finite() {
            return Err(CameraModelError::PrincipalPointMustBeFinite);
        }
        Ok(())
    }
}

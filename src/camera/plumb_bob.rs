//! Implements the Brown-Conrady ("plumb bob") camera model.
//!
//! This module provides the [`PlumbBobModel`] struct, which combines a pinhole
//! projection (focal lengths, principal point and an optional skew term) with
//! polynomial radial distortion up to sixth order and two tangential
//! (decentering) coefficients. It implements the [`CameraModel`] trait from the
//! parent [`crate::camera`] module.
//!
//! Forward projection is closed form. Reverse projection has no closed form and
//! is solved with a two-dimensional Newton iteration on the normalized image
//! plane, see [`PlumbBobModel::reverse_project_detailed`].

use crate::camera::{
    validation, CameraModel, CameraModelError, ImagePlanePoint, Intrinsics, Resolution,
};
use crate::geometry::Ray3;
use log::warn;
use nalgebra::{convert, DVector, Matrix2, RealField, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::{fmt, fs, io::Write};
use yaml_rust::YamlLoader;

/// Newton iterations stop once the update in normalized coordinates is smaller
/// than this times `1 + |(xn, yn)|`.
pub const REVERSE_PROJECTION_TOLERANCE: f64 = 1e-12;

/// Upper bound on Newton iterations in [`PlumbBobModel::reverse_project_detailed`].
pub const REVERSE_PROJECTION_MAX_ITERATIONS: usize = 50;

/// `|det J|` below this fraction of `|fx * fy|` is treated as singular.
const DEGENERACY_THRESHOLD: f64 = 1e-12;

/// Represents a Brown-Conrady ("plumb bob") camera model.
///
/// The model holds the pinhole intrinsics, image resolution, a skew term, three
/// radial coefficients `k0, k1, k2` (for `r^2`, `r^4` and `r^6`) and two
/// tangential coefficients `t0, t1`.
///
/// Two gates control which coefficients take part in estimation. When
/// `allow_sixth_order_radial` is false, `k2` is held at exactly zero and left out
/// of the free-parameter vector; `allow_skew` does the same for `skew`.
///
/// # Examples
///
/// ```rust
/// use plumbbob_tools::camera::plumb_bob::PlumbBobModel;
/// use plumbbob_tools::camera::{CameraModel, Intrinsics, Resolution};
///
/// let model = PlumbBobModel::new(
///     Resolution { width: 320, height: 240 },
///     Intrinsics { fx: 30.0, fy: 15.0, cx: 100.0, cy: 125.0 },
///     0.001,
///     [0.02, 1e-4, 7e-6],
///     [-0.01, 0.005],
/// )
/// .unwrap();
///
/// assert_eq!(model.free_parameters().len(), 6);
/// assert_eq!(model.radial()[0], 0.02);
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PlumbBobModel {
    /// The intrinsic parameters of the camera, [`Intrinsics`] (fx, fy, cx, cy).
    pub intrinsics: Intrinsics,
    /// The resolution of the camera image, [`Resolution`] (width, height).
    pub resolution: Resolution,
    skew: f64,
    radial: [f64; 3],
    tangential: [f64; 2],
    allow_sixth_order_radial: bool,
    allow_skew: bool,
}

/// Outcome of a Newton reverse projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReverseProjection {
    /// Viewing ray through the optical center.
    pub ray: Ray3,
    /// Newton iterations performed.
    pub iterations: usize,
    /// Pixel distance between the requested point and the projection of the returned ray.
    pub residual: f64,
    /// Whether the update fell below [`REVERSE_PROJECTION_TOLERANCE`] within the iteration cap.
    pub converged: bool,
}

impl ReverseProjection {
    /// Turns a soft convergence failure into [`CameraModelError::DidNotConverge`].
    pub fn ensure_converged(self) -> Result<Self, CameraModelError> {
        if self.converged {
            Ok(self)
        } else {
            Err(CameraModelError::DidNotConverge {
                iterations: self.iterations,
            })
        }
    }
}

/// Free coefficients in structured form, in any scalar type.
struct FreeCoefficients<T> {
    radial: [T; 3],
    skew: T,
    tangential: [T; 2],
}

/// Applies the plumb bob lens model to normalized coordinates.
///
/// Both [`PlumbBobModel::project`] and the solver's generic residuals run through
/// this one function.
fn distort<T: RealField>(xn: T, yn: T, coefficients: FreeCoefficients<T>) -> ImagePlanePoint<T> {
    let one: T = convert(1.0);
    let two: T = convert(2.0);
    let FreeCoefficients {
        radial: [k0, k1, k2],
        skew,
        tangential: [t0, t1],
    } = coefficients;

    let xx = xn.clone() * xn.clone();
    let yy = yn.clone() * yn.clone();
    let xy = xn.clone() * yn.clone();
    let r2 = xx.clone() + yy.clone();
    let radial_factor = one + r2.clone() * (k0 + r2.clone() * (k1 + r2.clone() * k2));

    let x = xn * radial_factor.clone()
        + two.clone() * t0.clone() * xy.clone()
        + t1.clone() * (r2.clone() + two.clone() * xx);
    let y = yn * radial_factor + t0 * (r2 + two.clone() * yy) + two * t1 * xy;

    let offset_u = skew * y.clone();
    ImagePlanePoint {
        x,
        y,
        offset_u,
        offset_v: convert(0.0),
    }
}

impl PlumbBobModel {
    /// Creates a new [`PlumbBobModel`] with both gates enabled.
    ///
    /// # Errors
    ///
    /// Fails with [`CameraModelError::FocalLengthMustBePositive`],
    /// [`CameraModelError::PrincipalPointMustBeFinite`] or
    /// [`CameraModelError::InvalidParams`] when the parameters do not pass
    /// [`CameraModel::validate_params`].
    pub fn new(
        resolution: Resolution,
        intrinsics: Intrinsics,
        skew: f64,
        radial: [f64; 3],
        tangential: [f64; 2],
    ) -> Result<Self, CameraModelError> {
        let model = PlumbBobModel {
            intrinsics,
            resolution,
            skew,
            radial,
            tangential,
            allow_sixth_order_radial: true,
            allow_skew: true,
        };

        model.validate_params()?;
        Ok(model)
    }

    pub fn skew(&self) -> f64 {
        self.skew
    }

    /// Radial coefficients `[k0, k1, k2]`.
    pub fn radial(&self) -> [f64; 3] {
        self.radial
    }

    /// Tangential coefficients `[t0, t1]`.
    pub fn tangential(&self) -> [f64; 2] {
        self.tangential
    }

    pub fn allows_sixth_order_radial(&self) -> bool {
        self.allow_sixth_order_radial
    }

    pub fn allows_skew(&self) -> bool {
        self.allow_skew
    }

    /// Enables or disables estimation of `k2`. Disabling sets `k2` to zero.
    pub fn allow_sixth_order_radial(&mut self, allow: bool) {
        self.allow_sixth_order_radial = allow;
        if !allow {
            self.radial[2] = 0.0;
        }
    }

    /// Enables or disables estimation of `skew`. Disabling sets `skew` to zero.
    pub fn allow_skew(&mut self, allow: bool) {
        self.allow_skew = allow;
        if !allow {
            self.skew = 0.0;
        }
    }

    /// Returns a copy of the model with the free parameters replaced.
    pub fn with_free_parameters(&self, parameters: &DVector<f64>) -> Result<Self, CameraModelError> {
        let mut model = self.clone();
        model.set_free_parameters(parameters)?;
        Ok(model)
    }

    fn coefficients(&self) -> FreeCoefficients<f64> {
        FreeCoefficients {
            radial: self.radial,
            skew: self.skew,
            tangential: self.tangential,
        }
    }

    /// Reads a free-parameter slice according to the current gates. Missing
    /// trailing entries read as zero; callers check the length beforehand.
    fn unpack_free<T: RealField>(&self, free: &[T]) -> FreeCoefficients<T> {
        let zero: T = convert(0.0);
        let mut values = free.iter().cloned();
        let mut next = || values.next().unwrap_or_else(|| zero.clone());

        let k0 = next();
        let k1 = next();
        let k2 = if self.allow_sixth_order_radial {
            next()
        } else {
            zero.clone()
        };
        let skew = if self.allow_skew { next() } else { zero.clone() };
        let t0 = next();
        let t1 = next();

        FreeCoefficients {
            radial: [k0, k1, k2],
            skew,
            tangential: [t0, t1],
        }
    }

    fn to_pixel(&self, point: &ImagePlanePoint<f64>) -> Vector2<f64> {
        let (u, v) = point.to_pixel(
            self.intrinsics.fx,
            self.intrinsics.fy,
            self.intrinsics.cx,
            self.intrinsics.cy,
        );
        Vector2::new(u, v)
    }

    /// Projects normalized coordinates `(xn, yn)` and returns the pixel together
    /// with the Jacobian `[[du/dxn, du/dyn], [dv/dxn, dv/dyn]]`.
    ///
    /// The pixel is computed exactly as in [`CameraModel::project`].
    pub fn project_with_partials(&self, xn: f64, yn: f64) -> (Vector2<f64>, Matrix2<f64>) {
        let pixel = self.to_pixel(&distort(xn, yn, self.coefficients()));

        let [k0, k1, k2] = self.radial;
        let [t0, t1] = self.tangential;
        let r2 = xn * xn + yn * yn;
        let radial_factor = 1.0 + r2 * (k0 + r2 * (k1 + r2 * k2));
        // d(radial_factor) / d(r2)
        let slope = k0 + r2 * (2.0 * k1 + 3.0 * k2 * r2);

        let dxd_dxn = radial_factor + 2.0 * slope * xn * xn + 2.0 * t0 * yn + 6.0 * t1 * xn;
        let dxd_dyn = 2.0 * slope * xn * yn + 2.0 * t0 * xn + 2.0 * t1 * yn;
        let dyd_dxn = dxd_dyn;
        let dyd_dyn = radial_factor + 2.0 * slope * yn * yn + 6.0 * t0 * yn + 2.0 * t1 * xn;

        let fx = self.intrinsics.fx;
        let fy = self.intrinsics.fy;
        let jacobian = Matrix2::new(
            fx * dxd_dxn + self.skew * dyd_dxn,
            fx * dxd_dyn + self.skew * dyd_dyn,
            fy * dyd_dxn,
            fy * dyd_dyn,
        );

        (pixel, jacobian)
    }

    /// Reverse projects a pixel and reports how the Newton iteration went.
    ///
    /// The iteration starts at the undistorted pinhole inverse and stops when
    /// the update drops below [`REVERSE_PROJECTION_TOLERANCE`], relative to the
    /// size of the estimate, or after
    /// [`REVERSE_PROJECTION_MAX_ITERATIONS`]. If the cap is reached, the estimate
    /// with the smallest pixel residual is returned with `converged == false`.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::InvalidParams`] if the pixel is not finite.
    /// * [`CameraModelError::DegenerateJacobian`] if the projection Jacobian
    ///   becomes singular, which happens for extreme distortion coefficients.
    pub fn reverse_project_detailed(
        &self,
        point_2d: &Vector2<f64>,
        normalize: bool,
    ) -> Result<ReverseProjection, CameraModelError> {
        if !point_2d.x.is_finite() || !point_2d.y.is_finite() {
            return Err(CameraModelError::InvalidParams(format!(
                "Pixel ({}, {}) is not finite",
                point_2d.x, point_2d.y
            )));
        }

        let fx = self.intrinsics.fx;
        let fy = self.intrinsics.fy;
        let singular_below = DEGENERACY_THRESHOLD * (fx * fy).abs();

        let mut yn = (point_2d.y - self.intrinsics.cy) / fy;
        let mut xn = (point_2d.x - self.intrinsics.cx - self.skew * yn) / fx;

        let mut best = (xn, yn, f64::INFINITY);
        let mut iterations = 0;
        let mut converged = false;

        while iterations < REVERSE_PROJECTION_MAX_ITERATIONS {
            iterations += 1;

            let (predicted, jacobian) = self.project_with_partials(xn, yn);
            let error = point_2d - predicted;
            let residual = error.norm();
            if residual < best.2 {
                best = (xn, yn, residual);
            }

            let det = jacobian.determinant();
            if !det.is_finite() || det.abs() <= singular_below {
                return Err(CameraModelError::DegenerateJacobian);
            }

            // Cramer's rule on the 2x2 system J * delta = error
            let delta_x = (jacobian[(1, 1)] * error.x - jacobian[(0, 1)] * error.y) / det;
            let delta_y = (jacobian[(0, 0)] * error.y - jacobian[(1, 0)] * error.x) / det;
            xn += delta_x;
            yn += delta_y;

            if delta_x.hypot(delta_y) < REVERSE_PROJECTION_TOLERANCE * (1.0 + xn.hypot(yn)) {
                converged = true;
                break;
            }
        }

        // The last update has not been scored yet.
        let (predicted, _) = self.project_with_partials(xn, yn);
        let residual = (point_2d - predicted).norm();
        if residual <= best.2 {
            best = (xn, yn, residual);
        }

        let (xn, yn, residual) = best;
        let direction = Vector3::new(xn, yn, 1.0);
        let direction = if normalize {
            direction.normalize()
        } else {
            direction
        };

        Ok(ReverseProjection {
            ray: Ray3::new(Vector3::zeros(), direction),
            iterations,
            residual,
            converged,
        })
    }

    /// Returns the point that projects through the ideal pinhole (including
    /// skew) onto the same pixel as `point_3d` does through the full model.
    pub fn project_through_distortion(
        &self,
        point_3d: &Vector3<f64>,
    ) -> Result<Vector3<f64>, CameraModelError> {
        check_depth(point_3d)?;
        let z = point_3d.z;
        let distorted = distort(point_3d.x / z, point_3d.y / z, self.coefficients());
        Ok(Vector3::new(distorted.x * z, distorted.y * z, z))
    }
}

fn check_depth(point_3d: &Vector3<f64>) -> Result<(), CameraModelError> {
    if !(point_3d.z > 0.0) || !point_3d.z.is_finite() {
        return Err(CameraModelError::InvalidGeometry(point_3d.z));
    }
    Ok(())
}

impl Default for PlumbBobModel {
    /// A unit-focal-length camera with no distortion and an empty image.
    fn default() -> Self {
        PlumbBobModel {
            intrinsics: Intrinsics {
                fx: 1.0,
                fy: 1.0,
                cx: 0.0,
                cy: 0.0,
            },
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            skew: 0.0,
            radial: [0.0; 3],
            tangential: [0.0; 2],
            allow_sixth_order_radial: true,
            allow_skew: true,
        }
    }
}

impl fmt::Debug for PlumbBobModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PlumbBobModel [fx: {} fy: {} cx: {} cy: {} skew: {} radial: {:?} tangential: {:?}]",
            self.intrinsics.fx,
            self.intrinsics.fy,
            self.intrinsics.cx,
            self.intrinsics.cy,
            self.skew,
            self.radial,
            self.tangential,
        )
    }
}

impl CameraModel for PlumbBobModel {
    /// Projects a 3D point from camera coordinates to pixel coordinates.
    ///
    /// No image-bounds check is applied; points projecting outside the sensor
    /// still yield their pixel coordinates.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::InvalidGeometry`]: if `z <= 0` or `z` is not finite.
    fn project(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError> {
        check_depth(point_3d)?;
        let xn = point_3d.x / point_3d.z;
        let yn = point_3d.y / point_3d.z;
        Ok(self.to_pixel(&distort(xn, yn, self.coefficients())))
    }

    /// Reverse projects a pixel to a ray through the optical center.
    ///
    /// Non-convergence of the Newton iteration is logged and the best estimate
    /// is returned; use [`PlumbBobModel::reverse_project_detailed`] to inspect it.
    fn reverse_project(
        &self,
        point_2d: &Vector2<f64>,
        normalize: bool,
    ) -> Result<Ray3, CameraModelError> {
        let result = self.reverse_project_detailed(point_2d, normalize)?;
        if !result.converged {
            warn!(
                "Reverse projection of ({}, {}) did not converge after {} iterations, residual {:.3e} px",
                point_2d.x, point_2d.y, result.iterations, result.residual
            );
        }
        Ok(result.ray)
    }

    fn distort_normalized<T: RealField>(
        &self,
        free_parameters: &[T],
        xn: T,
        yn: T,
    ) -> ImagePlanePoint<T> {
        distort(xn, yn, self.unpack_free(free_parameters))
    }

    /// Packs `[k0, k1, (k2), (skew), t0, t1]`, skipping gated-off entries.
    fn free_parameters(&self) -> DVector<f64> {
        let mut values = Vec::with_capacity(6);
        values.extend_from_slice(&self.radial[..2]);
        if self.allow_sixth_order_radial {
            values.push(self.radial[2]);
        }
        if self.allow_skew {
            values.push(self.skew);
        }
        values.extend_from_slice(&self.tangential);
        DVector::from_vec(values)
    }

    fn nominal_free_parameters(&self) -> DVector<f64> {
        DVector::zeros(self.num_free_parameters())
    }

    fn num_free_parameters(&self) -> usize {
        4 + usize::from(self.allow_sixth_order_radial) + usize::from(self.allow_skew)
    }

    /// Unpacks a free-parameter vector. The length is checked before anything
    /// is written, so on error the model is unchanged.
    fn set_free_parameters(&mut self, parameters: &DVector<f64>) -> Result<(), CameraModelError> {
        let expected = self.num_free_parameters();
        if parameters.len() != expected {
            return Err(CameraModelError::SizeMismatch {
                expected,
                actual: parameters.len(),
            });
        }

        let coefficients = self.unpack_free(parameters.as_slice());
        self.radial = coefficients.radial;
        self.skew = coefficients.skew;
        self.tangential = coefficients.tangential;
        Ok(())
    }

    fn set_dependent_parameters(&mut self, resolution: Resolution, intrinsics: Intrinsics) {
        self.resolution = resolution;
        self.intrinsics = intrinsics;
    }

    /// Loads plumb bob parameters from a YAML file.
    ///
    /// Expected layout (the gate keys are optional and default to `true`):
    ///
    /// ```yaml
    /// cam0:
    ///   camera_model: plumb_bob
    ///   intrinsics: [fx, fy, cx, cy]
    ///   distortion: [k0, k1, k2, t0, t1]
    ///   skew: 0.0
    ///   allow_sixth_order_radial: true
    ///   allow_skew: true
    ///   resolution: [width, height]
    /// ```
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::IOError`] if the file cannot be read.
    /// * [`CameraModelError::YamlError`] if the content is not valid YAML.
    /// * [`CameraModelError::InvalidParams`] for missing or mistyped fields, or a
    ///   nonzero coefficient whose gate is disabled.
    fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        let docs = YamlLoader::load_from_str(&contents)?;

        if docs.is_empty() {
            return Err(CameraModelError::InvalidParams(
                "Empty YAML document".to_string(),
            ));
        }

        let cam = &docs[0]["cam0"];

        let intrinsics_yaml = cam["intrinsics"]
            .as_vec()
            .ok_or_else(|| CameraModelError::InvalidParams("Invalid intrinsics".to_string()))?;
        let resolution_yaml = cam["resolution"]
            .as_vec()
            .ok_or_else(|| CameraModelError::InvalidParams("Invalid resolution".to_string()))?;
        let distortion_yaml = cam["distortion"].as_vec().ok_or_else(|| {
            CameraModelError::InvalidParams("Missing distortion parameters".to_string())
        })?;

        if intrinsics_yaml.len() != 4 || resolution_yaml.len() != 2 {
            return Err(CameraModelError::InvalidParams(
                "Expected 4 intrinsics and 2 resolution entries".to_string(),
            ));
        }
        if distortion_yaml.len() != 5 {
            return Err(CameraModelError::InvalidParams(format!(
                "Expected 5 distortion parameters in YAML, found {}",
                distortion_yaml.len()
            )));
        }

        // yaml-rust keeps `1` as an integer, so accept both forms.
        let number = |node: &yaml_rust::Yaml, name: &str| {
            node.as_f64()
                .or_else(|| node.as_i64().map(|value| value as f64))
                .ok_or_else(|| CameraModelError::InvalidParams(format!("Invalid {}", name)))
        };
        let dimension = |node: &yaml_rust::Yaml, name: &str| {
            node.as_i64()
                .and_then(|value| u32::try_from(value).ok())
                .ok_or_else(|| CameraModelError::InvalidParams(format!("Invalid {}", name)))
        };

        let intrinsics = Intrinsics {
            fx: number(&intrinsics_yaml[0], "fx")?,
            fy: number(&intrinsics_yaml[1], "fy")?,
            cx: number(&intrinsics_yaml[2], "cx")?,
            cy: number(&intrinsics_yaml[3], "cy")?,
        };
        let resolution = Resolution {
            width: dimension(&resolution_yaml[0], "width")?,
            height: dimension(&resolution_yaml[1], "height")?,
        };

        let mut distortion = [0.0; 5];
        for (i, node) in distortion_yaml.iter().enumerate() {
            distortion[i] = number(node, format!("distortion parameter at index {}", i).as_str())?;
        }

        let skew = if cam["skew"].is_badvalue() {
            0.0
        } else {
            number(&cam["skew"], "skew")?
        };
        let gate = |key: &str| cam[key].as_bool().unwrap_or(true);

        let model = PlumbBobModel {
            intrinsics,
            resolution,
            skew,
            radial: [distortion[0], distortion[1], distortion[2]],
            tangential: [distortion[3], distortion[4]],
            allow_sixth_order_radial: gate("allow_sixth_order_radial"),
            allow_skew: gate("allow_skew"),
        };

        model.validate_params()?;
        Ok(model)
    }

    /// Saves the model to a YAML file readable by [`CameraModel::load_from_yaml`].
    fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        let yaml_error = |e: serde_yaml::Error| CameraModelError::YamlError(e.to_string());
        let key = |name: &str| serde_yaml::Value::String(name.to_string());

        let camera = serde_yaml::Mapping::from_iter([
            (
                key("camera_model"),
                serde_yaml::Value::String("plumb_bob".to_string()),
            ),
            (
                key("intrinsics"),
                serde_yaml::to_value(vec![
                    self.intrinsics.fx,
                    self.intrinsics.fy,
                    self.intrinsics.cx,
                    self.intrinsics.cy,
                ])
                .map_err(yaml_error)?,
            ),
            (
                key("distortion"),
                serde_yaml::to_value(self.get_distortion()).map_err(yaml_error)?,
            ),
            (
                key("skew"),
                serde_yaml::to_value(self.skew).map_err(yaml_error)?,
            ),
            (
                key("allow_sixth_order_radial"),
                serde_yaml::Value::Bool(self.allow_sixth_order_radial),
            ),
            (key("allow_skew"), serde_yaml::Value::Bool(self.allow_skew)),
            (
                key("resolution"),
                serde_yaml::to_value(vec![self.resolution.width, self.resolution.height])
                    .map_err(yaml_error)?,
            ),
        ]);
        let yaml = serde_yaml::Mapping::from_iter([(
            key("cam0"),
            serde_yaml::Value::Mapping(camera),
        )]);

        let yaml_string = serde_yaml::to_string(&yaml).map_err(yaml_error)?;

        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;

        Ok(())
    }

    /// Checks the pinhole intrinsics, that every coefficient is finite, and that
    /// gated-off coefficients are exactly zero.
    fn validate_params(&self) -> Result<(), CameraModelError> {
        validation::validate_intrinsics(&self.intrinsics)?;

        let all_finite = self.skew.is_finite()
            && self.radial.iter().all(|k| k.is_finite())
            && self.tangential.iter().all(|t| t.is_finite());
        if !all_finite {
            return Err(CameraModelError::InvalidParams(
                "Distortion coefficients must be finite".to_string(),
            ));
        }
        if !self.allow_sixth_order_radial && self.radial[2] != 0.0 {
            return Err(CameraModelError::InvalidParams(
                "k2 must be zero when sixth order radial distortion is disabled".to_string(),
            ));
        }
        if !self.allow_skew && self.skew != 0.0 {
            return Err(CameraModelError::InvalidParams(
                "skew must be zero when skew is disabled".to_string(),
            ));
        }
        Ok(())
    }

    fn get_resolution(&self) -> Resolution {
        self.resolution.clone()
    }

    fn get_intrinsics(&self) -> Intrinsics {
        self.intrinsics.clone()
    }

    /// Returns `[k0, k1, k2, t0, t1]`.
    fn get_distortion(&self) -> Vec<f64> {
        vec![
            self.radial[0],
            self.radial[1],
            self.radial[2],
            self.tangential[0],
            self.tangential[1],
        ]
    }
}

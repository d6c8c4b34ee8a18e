//! Rigid poses, rays, planes and circular fiducials, plus helpers for
//! generating test geometry.

use crate::camera::{CameraModel, CameraModelError, Resolution};
use nalgebra::{
    convert, Matrix4, Quaternion, RealField, UnitQuaternion, Vector2, Vector3,
};
use std::f64::consts::TAU;

/// Camera-from-world rigid transform: `p_camera = rotation * p_world + translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Pose::identity()
    }
}

impl Pose {
    /// Length of the flat encoding `[qs, qi, qj, qk, tx, ty, tz]`.
    pub const FLAT_LEN: usize = 7;

    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Pose {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Pose::new(UnitQuaternion::identity(), Vector3::zeros())
    }

    /// Builds a pose from roll, pitch and yaw angles in radians.
    pub fn from_euler_angles(roll: f64, pitch: f64, yaw: f64, translation: Vector3<f64>) -> Self {
        Pose::new(UnitQuaternion::from_euler_angles(roll, pitch, yaw), translation)
    }

    /// Decodes the first [`Pose::FLAT_LEN`] values. The quaternion need not be
    /// unit length; it is normalized here.
    pub fn from_flat(values: &[f64]) -> Result<Self, CameraModelError> {
        if values.len() < Self::FLAT_LEN {
            return Err(CameraModelError::SizeMismatch {
                expected: Self::FLAT_LEN,
                actual: values.len(),
            });
        }

        let quaternion = Quaternion::new(values[0], values[1], values[2], values[3]);
        let norm = quaternion.norm();
        if !(norm > 0.0) || !norm.is_finite() {
            return Err(CameraModelError::InvalidParams(format!(
                "Quaternion with norm {} cannot encode a rotation",
                norm
            )));
        }

        Ok(Pose::new(
            UnitQuaternion::from_quaternion(quaternion),
            Vector3::new(values[4], values[5], values[6]),
        ))
    }

    pub fn to_flat(&self) -> [f64; 7] {
        let q = self.rotation.quaternion();
        [
            q.w,
            q.i,
            q.j,
            q.k,
            self.translation.x,
            self.translation.y,
            self.translation.z,
        ]
    }

    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Pose::new(rotation, -(rotation * self.translation))
    }

    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut matrix = self.rotation.to_homogeneous();
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        matrix
    }
}

/// Applies a flat-encoded pose to a point in any scalar type.
///
/// The quaternion is normalized on the fly, so this agrees with
/// [`Pose::from_flat`] followed by [`Pose::transform_point`].
pub(crate) fn transform_flat<T: RealField>(flat: &[T], point: &Vector3<f64>) -> [T; 3] {
    let (s, i, j, k) = (
        flat[0].clone(),
        flat[1].clone(),
        flat[2].clone(),
        flat[3].clone(),
    );
    let norm_sq = s.clone() * s.clone() + i.clone() * i.clone() + j.clone() * j.clone()
        + k.clone() * k.clone();
    let two: T = convert(2.0);
    let px: T = convert(point.x);
    let py: T = convert(point.y);
    let pz: T = convert(point.z);

    // v' = v + 2 s (q x v) + 2 q x (q x v), divided through by |q|^2
    let cx = j.clone() * pz.clone() - k.clone() * py.clone();
    let cy = k.clone() * px.clone() - i.clone() * pz.clone();
    let cz = i.clone() * py.clone() - j.clone() * px.clone();
    let ccx = j.clone() * cz.clone() - k.clone() * cy.clone();
    let ccy = k * cx.clone() - i.clone() * cz.clone();
    let ccz = i * cy.clone() - j * cx.clone();

    let scale = two / norm_sq;
    [
        px + scale.clone() * (s.clone() * cx + ccx) + flat[4].clone(),
        py + scale.clone() * (s.clone() * cy + ccy) + flat[5].clone(),
        pz + scale * (s * cz + ccz) + flat[6].clone(),
    ]
}

/// A half-line `origin + t * direction`, `t >= 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ray3 {
    pub origin: Vector3<f64>,
    pub direction: Vector3<f64>,
}

impl Ray3 {
    pub fn new(origin: Vector3<f64>, direction: Vector3<f64>) -> Self {
        Ray3 { origin, direction }
    }

    pub fn point_at(&self, t: f64) -> Vector3<f64> {
        self.origin + self.direction * t
    }

    /// The point on the ray's line with `z == 1`, if the ray is not parallel to that plane.
    pub fn point_at_unit_depth(&self) -> Option<Vector3<f64>> {
        if self.direction.z == 0.0 {
            return None;
        }
        Some(self.point_at((1.0 - self.origin.z) / self.direction.z))
    }

    /// Intersects the ray with a plane. Returns `None` when the ray is parallel
    /// to the plane or the plane lies behind the origin.
    pub fn intersect_plane(&self, plane: &Plane3) -> Option<Vector3<f64>> {
        let denominator = plane.normal.dot(&self.direction);
        if denominator.abs() <= f64::EPSILON * self.direction.norm() {
            return None;
        }
        let t = plane.normal.dot(&(plane.point - self.origin)) / denominator;
        if t < 0.0 {
            return None;
        }
        Some(self.point_at(t))
    }
}

/// A plane through `point` with unit `normal`.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane3 {
    pub point: Vector3<f64>,
    pub normal: Vector3<f64>,
}

impl Plane3 {
    pub fn new(point: Vector3<f64>, normal: Vector3<f64>) -> Result<Self, CameraModelError> {
        let normal = normal.try_normalize(f64::EPSILON).ok_or_else(|| {
            CameraModelError::InvalidParams("Plane normal must be nonzero".to_string())
        })?;
        Ok(Plane3 { point, normal })
    }

    /// Plane through three points, normal oriented by the right-hand rule `(b - a) x (c - a)`.
    pub fn from_points(
        a: &Vector3<f64>,
        b: &Vector3<f64>,
        c: &Vector3<f64>,
    ) -> Result<Self, CameraModelError> {
        let normal = (b - a).cross(&(c - a));
        Plane3::new(*a, normal)
            .map_err(|_| CameraModelError::InvalidParams("Plane points are collinear".to_string()))
    }

    pub fn signed_distance(&self, point: &Vector3<f64>) -> f64 {
        self.normal.dot(&(point - self.point))
    }
}

/// A circle in 3D, `origin + cos(a) * axis0 + sin(a) * axis1`.
///
/// The two axes are orthogonal and both as long as the radius.
#[derive(Debug, Clone, PartialEq)]
pub struct Circle3 {
    pub origin: Vector3<f64>,
    pub axis0: Vector3<f64>,
    pub axis1: Vector3<f64>,
}

impl Circle3 {
    /// Circle of radius `|axis0|` in the plane spanned by `axis0` and `axis1`.
    ///
    /// `axis1` only picks the plane: its component along `axis0` is removed
    /// and it is rescaled to the radius.
    pub fn new(
        origin: Vector3<f64>,
        axis0: Vector3<f64>,
        axis1: Vector3<f64>,
    ) -> Result<Self, CameraModelError> {
        let radius = axis0.norm();
        if !(radius > 0.0) || !radius.is_finite() {
            return Err(CameraModelError::InvalidParams(
                "Circle radius must be positive and finite".to_string(),
            ));
        }
        let in_plane = axis1 - axis0 * (axis1.dot(&axis0) / (radius * radius));
        let axis1 = in_plane
            .try_normalize(f64::EPSILON * axis1.norm())
            .ok_or_else(|| {
                CameraModelError::InvalidParams("Circle axes must not be parallel".to_string())
            })?
            * radius;

        Ok(Circle3 {
            origin,
            axis0,
            axis1,
        })
    }

    pub fn radius(&self) -> f64 {
        self.axis0.norm()
    }

    pub fn plane(&self) -> Result<Plane3, CameraModelError> {
        Plane3::new(self.origin, self.axis0.cross(&self.axis1))
    }

    pub fn perimeter_point(&self, angle: f64) -> Vector3<f64> {
        self.origin + self.axis0 * angle.cos() + self.axis1 * angle.sin()
    }
}

/// Pixel area and centroid of the image of `circle`, given in camera coordinates.
///
/// The perimeter is sampled at `n_triangles` evenly spaced angles and the
/// projected polygon is split into a fan of triangles around the projected
/// origin. The centroid is the area-weighted mean of the triangle centroids,
/// which under perspective and lens distortion differs from the projection of
/// the circle's origin.
pub fn estimate_projected_area_and_centroid<M: CameraModel>(
    circle: &Circle3,
    model: &M,
    n_triangles: usize,
) -> Result<(f64, Vector2<f64>), CameraModelError> {
    if n_triangles < 3 {
        return Err(CameraModelError::InvalidParams(format!(
            "At least 3 triangles are needed, got {}",
            n_triangles
        )));
    }

    let apex = model.project(&circle.origin)?;
    let perimeter = (0..n_triangles)
        .map(|i| model.project(&circle.perimeter_point(TAU * i as f64 / n_triangles as f64)))
        .collect::<Result<Vec<_>, _>>()?;

    // Signed areas, so the fan does not need to be convex around the apex.
    let mut area = 0.0;
    let mut moment = Vector2::zeros();
    for (i, start) in perimeter.iter().enumerate() {
        let end = &perimeter[(i + 1) % n_triangles];
        let (a, b) = (start - apex, end - apex);
        let triangle_area = 0.5 * (a.x * b.y - a.y * b.x);
        area += triangle_area;
        moment += (apex + start + end) * (triangle_area / 3.0);
    }

    if !(area.abs() > 0.0) || !area.is_finite() {
        return Err(CameraModelError::NumericalError(
            "Projected circle has no area".to_string(),
        ));
    }
    Ok((area.abs(), moment / area))
}

/// Generate a grid of sample points that are evenly distributed across the image
///
/// # Arguments
///
/// * `resolution` - The image size in pixels
/// * `n` - The approximate number of points to generate
///
/// # Returns
///
/// A vector of pixel coordinates at the centers of the grid cells
pub fn sample_pixel_grid(resolution: &Resolution, n: usize) -> Vec<Vector2<f64>> {
    let width = resolution.width as f64;
    let height = resolution.height as f64;
    if n == 0 || resolution.width == 0 || resolution.height == 0 {
        return Vec::new();
    }

    let num_cells_x = ((n as f64 * (width / height)).sqrt().round() as usize).max(1);
    let num_cells_y = ((n as f64 * (height / width)).sqrt().round() as usize).max(1);

    let cell_width = width / num_cells_x as f64;
    let cell_height = height / num_cells_y as f64;

    let mut points = Vec::with_capacity(num_cells_x * num_cells_y);
    for i in 0..num_cells_y {
        for j in 0..num_cells_x {
            let x = (j as f64 + 0.5) * cell_width;
            let y = (i as f64 + 0.5) * cell_height;
            points.push(Vector2::new(x, y));
        }
    }

    points
}

/// Half-open range of samples `start, start + step, ...` strictly below `stop`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl AxisRange {
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        AxisRange { start, stop, step }
    }

    pub fn values(&self) -> Vec<f64> {
        if !(self.step > 0.0) {
            return Vec::new();
        }
        (0..)
            .map(|i| self.start + i as f64 * self.step)
            .take_while(|value| *value < self.stop)
            .collect()
    }
}

/// All points of the lattice `x × y × z`, ordered with `x` varying fastest.
pub fn grid_points_3d(x: AxisRange, y: AxisRange, z: AxisRange) -> Vec<Vector3<f64>> {
    let (xs, ys, zs) = (x.values(), y.values(), z.values());
    let mut points = Vec::with_capacity(xs.len() * ys.len() * zs.len());
    for &pz in &zs {
        for &py in &ys {
            for &px in &xs {
                points.push(Vector3::new(px, py, pz));
            }
        }
    }
    points
}

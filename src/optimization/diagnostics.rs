//! Observability diagnostics for a calibration.
//!
//! The curvature `J^T J` of the reprojection objective at the solution tells
//! how well the data constrains each direction in parameter space. Its
//! eigenvalues, sorted from largest to smallest, and the ratio between the two
//! extremes are collected in [`CalibrationStatistics`].

use crate::camera::{CameraModel, CameraModelError};
use crate::optimization::objective::ReprojectionObjective;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};

fn central_differences<M: CameraModel + Clone>(
    objective: &mut ReprojectionObjective<'_, M>,
    parameters: &DVector<f64>,
    step: f64,
) -> Result<DMatrix<f64>, CameraModelError> {
    let mut jacobian = DMatrix::zeros(objective.num_solver_residuals(), parameters.len());

    for i in 0..parameters.len() {
        let h = step * (1.0 + parameters[i].abs());

        let mut shifted = parameters.clone();
        shifted[i] = parameters[i] + h;
        objective.set_parameters(&shifted)?;
        let forward = objective.solver_residuals()?;

        shifted[i] = parameters[i] - h;
        objective.set_parameters(&shifted)?;
        let backward = objective.solver_residuals()?;

        jacobian.set_column(i, &((forward - backward) / (2.0 * h)));
    }

    Ok(jacobian)
}

/// Solver residuals at `parameters` and their central-difference Jacobian.
///
/// The step for parameter `i` is `step * (1 + |x_i|)`. The objective is left
/// set to `parameters` afterwards.
pub fn numeric_jacobian<M: CameraModel + Clone>(
    objective: &mut ReprojectionObjective<'_, M>,
    parameters: &DVector<f64>,
    step: f64,
) -> Result<(DVector<f64>, DMatrix<f64>), CameraModelError> {
    let jacobian = central_differences(objective, parameters, step);
    objective.set_parameters(parameters)?;
    let residuals = objective.solver_residuals()?;
    Ok((residuals, jacobian?))
}

/// Least-squares solution of `J * dx = -r`, with singular directions dropped.
pub fn gauss_newton_step(
    jacobian: &DMatrix<f64>,
    residuals: &DVector<f64>,
) -> Result<DVector<f64>, CameraModelError> {
    let svd = jacobian.clone().svd(true, true);
    let largest = svd.singular_values.iter().copied().fold(0.0, f64::max);
    let cutoff = f64::EPSILON * largest * jacobian.nrows().max(jacobian.ncols()) as f64;
    svd.solve(&(-residuals), cutoff)
        .map_err(|e| CameraModelError::NumericalError(e.to_string()))
}

/// Parameters, curvature spectrum and condition number at a solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStatistics {
    parameters: Vec<f64>,
    eigenvalues: Vec<f64>,
    eigenvectors: Vec<Vec<f64>>,
    condition_number: f64,
}

impl CalibrationStatistics {
    /// Eigen-decomposes `J^T J` and sorts the spectrum in descending order.
    pub fn from_jacobian(parameters: &DVector<f64>, jacobian: &DMatrix<f64>) -> Self {
        let curvature = jacobian.transpose() * jacobian;
        let eigen = SymmetricEigen::new(curvature);

        let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let eigenvalues: Vec<f64> = order.iter().map(|&i| eigen.eigenvalues[i]).collect();
        let eigenvectors = order
            .iter()
            .map(|&i| eigen.eigenvectors.column(i).iter().copied().collect())
            .collect();

        let condition_number = match (eigenvalues.first(), eigenvalues.last()) {
            (Some(&largest), Some(&smallest)) if smallest > 0.0 => largest / smallest,
            _ => f64::INFINITY,
        };

        CalibrationStatistics {
            parameters: parameters.iter().copied().collect(),
            eigenvalues,
            eigenvectors,
            condition_number,
        }
    }

    /// Statistics of `objective` at `parameters`, see [`numeric_jacobian`].
    pub fn compute<M: CameraModel + Clone>(
        objective: &mut ReprojectionObjective<'_, M>,
        parameters: &DVector<f64>,
        step: f64,
    ) -> Result<Self, CameraModelError> {
        let (_, jacobian) = numeric_jacobian(objective, parameters, step)?;
        Ok(Self::from_jacobian(parameters, &jacobian))
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    /// Eigenvalues of the curvature matrix, largest first.
    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }

    /// Unit eigenvectors, one per entry of [`CalibrationStatistics::eigenvalues`].
    pub fn eigenvectors(&self) -> &[Vec<f64>] {
        &self.eigenvectors
    }

    /// Largest over smallest eigenvalue, `+inf` if the smallest is not positive.
    pub fn condition_number(&self) -> f64 {
        self.condition_number
    }

    pub fn is_well_conditioned(&self, threshold: f64) -> bool {
        self.condition_number < threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::objective::{DependentParameters, PointFrame};
    use crate::optimization::test_data::{reference_model, reference_pose, synthetic_data};
    use approx::assert_relative_eq;

    #[test]
    fn test_statistics_sorted_descending() {
        let jacobian = DMatrix::from_row_slice(4, 3, &[
            1.0, 0.0, 0.0, //
            0.0, 3.0, 0.0, //
            0.0, 0.0, 2.0, //
            0.0, 0.0, 0.0,
        ]);
        let parameters = DVector::from_vec(vec![0.5, -1.0, 2.0]);
        let statistics = CalibrationStatistics::from_jacobian(&parameters, &jacobian);

        assert_eq!(statistics.parameters(), &[0.5, -1.0, 2.0]);
        assert_relative_eq!(statistics.eigenvalues()[0], 9.0, epsilon = 1e-12);
        assert_relative_eq!(statistics.eigenvalues()[1], 4.0, epsilon = 1e-12);
        assert_relative_eq!(statistics.eigenvalues()[2], 1.0, epsilon = 1e-12);
        assert_relative_eq!(statistics.condition_number(), 9.0, epsilon = 1e-10);
        assert!(statistics.is_well_conditioned(10.0));

        // Eigenvector of the largest eigenvalue is the second axis, up to sign.
        assert_relative_eq!(statistics.eigenvectors()[0][1].abs(), 1.0, epsilon = 1e-12);
        assert_eq!(statistics.eigenvectors().len(), 3);
    }

    #[test]
    fn test_rank_deficient_curvature_is_ill_conditioned() {
        let jacobian = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 2.0, 2.0]);
        let statistics =
            CalibrationStatistics::from_jacobian(&DVector::zeros(2), &jacobian);
        assert!(!statistics.is_well_conditioned(1e8));
    }

    #[test]
    fn test_numeric_jacobian_matches_perturbation() {
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

        let (residuals, jacobian) = numeric_jacobian(&mut objective, &truth, 1e-6).unwrap();
        assert_eq!(jacobian.nrows(), objective.num_solver_residuals());
        assert_eq!(jacobian.ncols(), truth.len());
        assert!(residuals.norm() < 1e-6);
        // The objective is restored to the requested point.
        assert_relative_eq!(objective.parameters(), truth, epsilon = 1e-14);

        // Moving tz changes depth, which must show up in the pixels.
        let column = jacobian.column(6);
        assert!(column.norm() > 1.0);

        let step = gauss_newton_step(&jacobian, &residuals).unwrap();
        assert!(step.norm() < 1e-6);
    }
}

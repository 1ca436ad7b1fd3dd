/*!
 * # Gaussian Process Surrogate
 *
 * Regression model over observed (policy parameters, objective) pairs
 * used by strategic policy search to avoid a full simulator replay for
 * every candidate. Inputs are expected in the normalized unit box;
 * objectives are standardized to zero mean and unit variance at fit
 * time and denormalized on prediction. The acquisition function is
 * expected improvement for minimization, maximized by random-restart
 * pattern search inside the unit box.
 */

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rand::rngs::SmallRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// RBF kernel lengthscale over unit-box inputs.
pub const DEFAULT_LENGTHSCALE: f64 = 1.0;

/// Observation noise added to the kernel diagonal.
pub const DEFAULT_NOISE: f64 = 0.01;

/// Exploration margin for expected improvement, in standardized units.
const EI_XI: f64 = 0.01;

/// Axis-aligned search box for the three policy parameters
/// (reorder_point, safety_stock, order_quantity).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub lower: [f64; 3],
    pub upper: [f64; 3],
}

impl ParameterBounds {
    pub fn new(lower: [f64; 3], upper: [f64; 3]) -> Self {
        // Degenerate boxes are tolerated; span() guards the division.
        Self { lower, upper }
    }

    fn span(&self, axis: usize) -> f64 {
        (self.upper[axis] - self.lower[axis]).max(1e-9)
    }

    /// Maps a point in bounded space into [0, 1]^3.
    pub fn normalize(&self, point: &[f64; 3]) -> [f64; 3] {
        let mut unit = [0.0; 3];
        for axis in 0..3 {
            unit[axis] = ((point[axis] - self.lower[axis]) / self.span(axis)).clamp(0.0, 1.0);
        }
        unit
    }

    /// Maps a point in [0, 1]^3 back into bounded space.
    pub fn denormalize(&self, unit: &[f64; 3]) -> [f64; 3] {
        let mut point = [0.0; 3];
        for axis in 0..3 {
            point[axis] = self.lower[axis] + unit[axis] * (self.upper[axis] - self.lower[axis]);
        }
        point
    }

    /// Clips a point into the box.
    pub fn clamp(&self, point: &[f64; 3]) -> [f64; 3] {
        let mut clipped = [0.0; 3];
        for axis in 0..3 {
            clipped[axis] = point[axis].clamp(self.lower[axis], self.upper[axis]);
        }
        clipped
    }

    /// Draws a uniform random point inside the box.
    pub fn sample(&self, rng: &mut SmallRng) -> [f64; 3] {
        let mut point = [0.0; 3];
        for axis in 0..3 {
            point[axis] = self.lower[axis] + rng.gen::<f64>() * (self.upper[axis] - self.lower[axis]);
        }
        point
    }
}

/// Posterior prediction in original objective units.
#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    pub mean: f64,
    pub std_dev: f64,
}

impl Prediction {
    pub fn variance(&self) -> f64 {
        self.std_dev * self.std_dev
    }
}

/// Gaussian process with an RBF kernel over unit-box inputs.
pub struct SurrogateModel {
    x_train: DMatrix<f64>,
    chol: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
    lengthscale: f64,
    y_mean: f64,
    y_std: f64,
}

impl SurrogateModel {
    /// Fits the process to `n` observations.
    ///
    /// `x` is an n-by-3 matrix of normalized parameter vectors and `y`
    /// the matching objective values in original units. Fitting fails
    /// when the kernel matrix is not positive definite, which the
    /// caller treats as a recoverable instability.
    pub fn fit(
        x: DMatrix<f64>,
        y: &[f64],
        lengthscale: f64,
        noise: f64,
    ) -> Result<Self, EngineError> {
        let n = x.nrows();
        if n == 0 {
            return Err(EngineError::SurrogateError(
                "cannot fit surrogate with no observations".to_string(),
            ));
        }
        if y.len() != n {
            return Err(EngineError::SurrogateError(format!(
                "observation count mismatch: {} inputs vs {} objectives",
                n,
                y.len()
            )));
        }

        let y_mean = y.iter().sum::<f64>() / n as f64;
        let y_var = y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>() / n as f64;
        let y_std = y_var.sqrt().max(1e-9);
        let y_norm = DVector::from_iterator(n, y.iter().map(|v| (v - y_mean) / y_std));

        let mut kernel = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                kernel[(i, j)] = rbf_kernel(&row(&x, i), &row(&x, j), lengthscale);
            }
            kernel[(i, i)] += noise;
        }

        let chol = Cholesky::new(kernel).ok_or_else(|| {
            EngineError::SurrogateError(
                "kernel matrix is not positive definite".to_string(),
            )
        })?;
        let alpha = chol.solve(&y_norm);

        Ok(Self {
            x_train: x,
            chol,
            alpha,
            lengthscale,
            y_mean,
            y_std,
        })
    }

    pub fn observation_count(&self) -> usize {
        self.x_train.nrows()
    }

    /// Posterior mean and standard deviation at a normalized point,
    /// denormalized back into objective units.
    pub fn predict(&self, point: &[f64; 3]) -> Prediction {
        let n = self.x_train.nrows();
        let k_star = DVector::from_iterator(
            n,
            (0..n).map(|i| rbf_kernel(&row(&self.x_train, i), point, self.lengthscale)),
        );

        let mean_norm = k_star.dot(&self.alpha);
        let v = self.chol.solve(&k_star);
        let var_norm = (1.0 - k_star.dot(&v)).max(1e-12);

        Prediction {
            mean: mean_norm * self.y_std + self.y_mean,
            std_dev: var_norm.sqrt() * self.y_std,
        }
    }

    /// Expected improvement over `best_objective` at a normalized point.
    ///
    /// Computed for minimization in standardized units so the `EI_XI`
    /// exploration margin keeps a consistent scale across products.
    pub fn expected_improvement(&self, point: &[f64; 3], best_objective: f64) -> f64 {
        let prediction = self.predict(point);
        let mean_norm = (prediction.mean - self.y_mean) / self.y_std;
        let std_norm = prediction.std_dev / self.y_std;
        let best_norm = (best_objective - self.y_mean) / self.y_std;

        if std_norm <= 1e-12 {
            return 0.0;
        }

        let improvement = best_norm - mean_norm - EI_XI;
        let z = improvement / std_norm;
        (improvement * normal_cdf(z) + std_norm * normal_pdf(z)).max(0.0)
    }
}

/// Maximizes expected improvement over the unit box with
/// `n_restarts` random-restart pattern searches.
///
/// Returns the best point found and its acquisition value.
pub fn maximize_expected_improvement(
    model: &SurrogateModel,
    best_objective: f64,
    n_restarts: usize,
    rng: &mut SmallRng,
) -> ([f64; 3], f64) {
    let mut best_point = [0.5; 3];
    let mut best_ei = f64::NEG_INFINITY;

    for _ in 0..n_restarts.max(1) {
        let mut point = [rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()];
        let mut ei = model.expected_improvement(&point, best_objective);

        // Axis-wise pattern search with step halving.
        let mut step = 0.25;
        while step > 1e-3 {
            let mut improved = false;
            for axis in 0..3 {
                for direction in [-1.0, 1.0] {
                    let mut candidate = point;
                    candidate[axis] = (candidate[axis] + direction * step).clamp(0.0, 1.0);
                    let candidate_ei = model.expected_improvement(&candidate, best_objective);
                    if candidate_ei > ei {
                        point = candidate;
                        ei = candidate_ei;
                        improved = true;
                    }
                }
            }
            if !improved {
                step *= 0.5;
            }
        }

        if ei > best_ei {
            best_ei = ei;
            best_point = point;
        }
    }

    (best_point, best_ei)
}

fn row(matrix: &DMatrix<f64>, index: usize) -> [f64; 3] {
    [matrix[(index, 0)], matrix[(index, 1)], matrix[(index, 2)]]
}

fn rbf_kernel(a: &[f64; 3], b: &[f64; 3], lengthscale: f64) -> f64 {
    let squared_distance: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    (-squared_distance / (2.0 * lengthscale * lengthscale)).exp()
}

/// Standard normal CDF approximation.
/// Uses Abramowitz and Stegun approximation (error < 7.5e-8).
fn normal_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }

    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x_abs = x.abs();

    let t = 1.0 / (1.0 + p * x_abs);
    let y = 1.0
        - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1)
            * t
            * (-x_abs * x_abs / 2.0).exp();

    0.5 * (1.0 + sign * y)
}

fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

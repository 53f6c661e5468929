//! Weighted least squares for a single regressor with intercept.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

/// Reasons a fit cannot be produced.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("{0} observation(s), at least 3 are needed for a standard error")]
    TooFewObservations(usize),
    #[error("inputs have different lengths ({x}, {y}, {weights})")]
    LengthMismatch { x: usize, y: usize, weights: usize },
    #[error("weights must be finite and non-negative")]
    InvalidWeights,
    #[error("design matrix is singular")]
    Singular,
    #[error("dependent variable has no weighted variation")]
    NoVariation,
}

/// Result of `y ~ 1 + x` fitted by WLS.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct WlsFit {
    pub intercept: f64,
    pub slope: f64,
    pub intercept_se: f64,
    pub slope_se: f64,
    /// Weighted, centred R².
    pub r_squared: f64,
    pub observations: usize,
}

impl WlsFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

const PARAMETERS: usize = 2;

/// Fits `y = a + b x` minimising `sum w_i (y_i - a - b x_i)^2`.
///
/// Standard errors use the residual variance `ssr / (n - 2)` where `ssr` is the weighted sum of
/// squared residuals.
pub fn fit_wls(x: &[f64], y: &[f64], weights: &[f64]) -> Result<WlsFit, FitError> {
    let n = x.len();
    if y.len() != n || weights.len() != n {
        return Err(FitError::LengthMismatch {
            x: n,
            y: y.len(),
            weights: weights.len(),
        });
    }
    if n <= PARAMETERS {
        return Err(FitError::TooFewObservations(n));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(FitError::InvalidWeights);
    }

    // Rows scaled by sqrt(w) turn WLS into OLS
    let root_w: Vec<f64> = weights.iter().map(|w| w.sqrt()).collect();
    let design = DMatrix::from_fn(n, PARAMETERS, |row, column| match column {
        0 => root_w[row],
        _ => root_w[row] * x[row],
    });
    let response = DVector::from_iterator(n, y.iter().zip(&root_w).map(|(y, w)| y * w));

    let gram = design.transpose() * &design;
    let gram_inverse = gram.try_inverse().ok_or(FitError::Singular)?;
    let params = &gram_inverse * design.transpose() * &response;
    let residuals = &response - &design * &params;
    let ssr = residuals.dot(&residuals);

    let total_weight: f64 = weights.iter().sum();
    if total_weight <= 0.0 {
        return Err(FitError::Singular);
    }
    let weighted_mean = y.iter().zip(weights).map(|(y, w)| y * w).sum::<f64>() / total_weight;
    let centred_tss: f64 = y
        .iter()
        .zip(weights)
        .map(|(y, w)| w * (y - weighted_mean).powi(2))
        .sum();
    if centred_tss <= 0.0 {
        return Err(FitError::NoVariation);
    }

    let scale = ssr / (n - PARAMETERS) as f64;
    let covariance = gram_inverse * scale;
    Ok(WlsFit {
        intercept: params[0],
        slope: params[1],
        intercept_se: covariance[(0, 0)].sqrt(),
        slope_se: covariance[(1, 1)].sqrt(),
        r_squared: 1.0 - ssr / centred_tss,
        observations: n,
    })
}

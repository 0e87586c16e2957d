//! Penalty operators for the linear subproblem and the selection of the
//! regularization strength.
//!
//! An ill-conditioned linear subproblem `$\min_{\vec{x}} ||\boldsymbol{A}\vec{x}-\vec{y}||^2$`
//! is replaced by the penalized problem
//!
//! ```math
//! \min_{\vec{x}} ||\boldsymbol{A}\vec{x}-\vec{y}||^2 + \alpha^2 ||\boldsymbol{W}\boldsymbol{L}\vec{x}||^2,
//! ```
//!
//! where `$\boldsymbol{L}$` is a finite difference operator of order `$d$` (see
//! [regularization_operator]), `$\boldsymbol{W}$` is a diagonal weight matrix determined by the
//! [RegType] and `$\alpha$` is the regularization parameter, which is chosen by one of the
//! criteria in the [selection] module.
use crate::error::ConfigurationError;
use nalgebra::{DMatrix, DVector};
use std::str::FromStr;

pub mod selection;


/// smoothing constant of the total variation weights
pub const TOTAL_VARIATION_SMOOTHING: f64 = 1e-3;

/// threshold between the quadratic and linear part of the huber penalty
pub const HUBER_THRESHOLD: f64 = 1.35;

/// The kind of penalty applied to `$\boldsymbol{L}\vec{x}$`.
///
/// The nonquadratic penalties are realized as iteratively reweighted quadratic
/// penalties `$\sum_i w_i (\boldsymbol{L}\vec{x})_i^2$`, where the weights are computed
/// from the linear coefficients of the previous residual evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RegType {
    /// quadratic penalty `$||\boldsymbol{L}\vec{x}||^2$`, all weights are one
    #[default]
    Tikhonov,
    /// smoothed total variation, weights `$w_i = 1/\sqrt{(\boldsymbol{L}\vec{x})_i^2 + \beta}$`
    /// with `$\beta$` = [TOTAL_VARIATION_SMOOTHING]
    TotalVariation,
    /// huber penalty, weights `$w_i = 1$` for `$|(\boldsymbol{L}\vec{x})_i| \leq \eta$` and
    /// `$w_i = \eta/|(\boldsymbol{L}\vec{x})_i|$` otherwise, with `$\eta$` = [HUBER_THRESHOLD]
    Huber,
}

impl RegType {
    /// the canonical name of the penalty
    pub fn name(&self) -> &'static str {
        match self {
            RegType::Tikhonov => "tikhonov",
            RegType::TotalVariation => "tv",
            RegType::Huber => "huber",
        }
    }

    /// Calculate the penalty weights for the given operator from the linear
    /// coefficients `x_prev` of the previous evaluation.
    pub fn weights(&self, operator: &DMatrix<f64>, x_prev: &DVector<f64>) -> DVector<f64> {
        match self {
            RegType::Tikhonov => DVector::from_element(operator.nrows(), 1.),
            RegType::TotalVariation => {
                (operator * x_prev).map(|lx| (lx * lx + TOTAL_VARIATION_SMOOTHING).sqrt().recip())
            }
            RegType::Huber => (operator * x_prev).map(|lx| {
                if lx.abs() <= HUBER_THRESHOLD {
                    1.
                } else {
                    HUBER_THRESHOLD / lx.abs()
                }
            }),
        }
    }

    /// The operator `$\boldsymbol{W}\boldsymbol{L}$` with the rows of `$\boldsymbol{L}$`
    /// scaled by the square roots of the penalty weights, so that
    /// `$(\boldsymbol{W}\boldsymbol{L})^T\boldsymbol{W}\boldsymbol{L} = \boldsymbol{L}^T\text{diag}(\vec{w})\boldsymbol{L}$`.
    pub fn weighted_operator(&self, operator: &DMatrix<f64>, x_prev: &DVector<f64>) -> DMatrix<f64> {
        if *self == RegType::Tikhonov {
            return operator.clone();
        }
        let weights = self.weights(operator, x_prev);
        let mut weighted = operator.clone();
        for (mut row, w) in weighted.row_iter_mut().zip(weights.iter()) {
            row *= w.sqrt();
        }
        weighted
    }
}

impl FromStr for RegType {
    type Err = ConfigurationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "tikhonov" => Ok(RegType::Tikhonov),
            "tv" | "total-variation" => Ok(RegType::TotalVariation),
            "huber" => Ok(RegType::Huber),
            _ => Err(ConfigurationError::UnknownName {
                option: "regularization type",
                name: name.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for RegType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Build the finite difference operator `$\boldsymbol{L} \in \mathbb{R}^{(M-d)\times M}$`
/// of order `$d$` over an equidistant abscissa with unit spacing.
///
/// Row `$i$` holds the coefficients of the `$d$`-th forward difference starting at
/// element `$i$`, i.e. the signed binomial coefficients `$(-1)^{d-j}\binom{d}{j}$`
/// at columns `$i+j$`. Order zero gives the identity.
///
/// # Errors
///
/// The order must be less than `$M$`, otherwise the operator has no rows.
pub fn regularization_operator(
    order: usize,
    linear_count: usize,
) -> Result<DMatrix<f64>, ConfigurationError> {
    if order == 0 {
        return Ok(DMatrix::identity(linear_count, linear_count));
    }
    if order >= linear_count {
        return Err(ConfigurationError::RegularizationOrderTooLarge {
            order,
            linear_count,
        });
    }
    let stencil = difference_stencil(order);
    let rows = linear_count - order;
    let mut operator = DMatrix::zeros(rows, linear_count);
    for i in 0..rows {
        for (j, c) in stencil.iter().enumerate() {
            operator[(i, i + j)] = *c;
        }
    }
    Ok(operator)
}

// signed binomial coefficients of the forward difference of given order
fn difference_stencil(order: usize) -> Vec<f64> {
    let mut binomial = 1.;
    let mut stencil = Vec::with_capacity(order + 1);
    for j in 0..=order {
        let sign = if (order - j) % 2 == 0 { 1. } else { -1. };
        stencil.push(sign * binomial);
        binomial = binomial * (order - j) as f64 / (j + 1) as f64;
    }
    stencil
}

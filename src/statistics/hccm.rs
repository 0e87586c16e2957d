//! Heteroscedasticity consistent covariance matrix (HCCM) estimators.
//!
//! For a least squares fit with jacobian `$\boldsymbol{J} \in \mathbb{R}^{n\times k}$` and
//! residual `$\vec{e}$` the estimators have the sandwich form
//!
//! ```math
//! \text{Cov} = \boldsymbol{B}\boldsymbol{J}^T \text{diag}(\vec{\omega})\boldsymbol{J}\boldsymbol{B},
//! \quad \boldsymbol{B} = (\boldsymbol{J}^T\boldsymbol{J})^{-1},
//! ```
//!
//! where the weights `$\omega_i$` depend on the squared residuals and on the leverages
//! `$h_i = (\boldsymbol{J}\boldsymbol{B}\boldsymbol{J}^T)_{ii}$`. The routine is independent
//! of the fitting engine and can be used for any least squares fit.
//!
//! # References
//!
//! * MacKinnon and White (1985) for HC0 to HC3
//! * Cribari-Neto (2004) for HC4
//! * Cribari-Neto, Souza and Vasconcellos (2007) for HC5
use crate::error::{ConfigurationError, InputError, SnllsError};
use crate::linalg_helpers::{inverse_or_pseudo_inverse, Inversion};
use crate::statistics::check_finite;
use nalgebra::{DMatrix, DVector};
use std::str::FromStr;

/// constant of the HC5 estimator that bounds the leverage exponent from below
pub const HC5_LEVERAGE_CONSTANT: f64 = 0.7;

/// The weighting scheme of an HCCM estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HcEstimator {
    /// `$\omega_i = e_i^2$`
    Hc0,
    /// `$\omega_i = \frac{n}{n-k} e_i^2$`
    Hc1,
    /// `$\omega_i = e_i^2/(1-h_i)$`
    Hc2,
    /// `$\omega_i = e_i^2/(1-h_i)^2$`
    #[default]
    Hc3,
    /// `$\omega_i = e_i^2/(1-h_i)^{\delta_i}$` with `$\delta_i = \min(4, n h_i/k)$`
    Hc4,
    /// `$\omega_i = e_i^2/(1-h_i)^{\alpha_i/2}$` with
    /// `$\alpha_i = \min(n h_i/k, \max(4, 0.7\, n h_{max}/k))$`
    Hc5,
}

impl HcEstimator {
    /// all estimators
    pub const ALL: [HcEstimator; 6] = [
        HcEstimator::Hc0,
        HcEstimator::Hc1,
        HcEstimator::Hc2,
        HcEstimator::Hc3,
        HcEstimator::Hc4,
        HcEstimator::Hc5,
    ];

    /// the name of the estimator
    pub fn name(&self) -> &'static str {
        match self {
            HcEstimator::Hc0 => "hc0",
            HcEstimator::Hc1 => "hc1",
            HcEstimator::Hc2 => "hc2",
            HcEstimator::Hc3 => "hc3",
            HcEstimator::Hc4 => "hc4",
            HcEstimator::Hc5 => "hc5",
        }
    }

    fn weights(&self, residuals: &DVector<f64>, leverages: &DVector<f64>, k: usize) -> DVector<f64> {
        let n = residuals.len() as f64;
        let k = k as f64;
        let h_max = leverages.max();
        DVector::from_iterator(
            residuals.len(),
            residuals.iter().zip(leverages.iter()).map(|(&e, &h)| {
                let e2 = e * e;
                // a leverage of one would divide by zero
                let complement = (1. - h).max(f64::EPSILON);
                match self {
                    HcEstimator::Hc0 => e2,
                    HcEstimator::Hc1 => n / (n - k) * e2,
                    HcEstimator::Hc2 => e2 / complement,
                    HcEstimator::Hc3 => e2 / complement.powi(2),
                    HcEstimator::Hc4 => {
                        let delta = (n * h / k).min(4.);
                        e2 / complement.powf(delta)
                    }
                    HcEstimator::Hc5 => {
                        let alpha = (n * h / k).min((HC5_LEVERAGE_CONSTANT * n * h_max / k).max(4.));
                        e2 / complement.powf(alpha / 2.)
                    }
                }
            }),
        )
    }
}

impl FromStr for HcEstimator {
    type Err = ConfigurationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        HcEstimator::ALL
            .into_iter()
            .find(|estimator| estimator.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ConfigurationError::UnknownName {
                option: "hccm estimator",
                name: name.to_string(),
            })
    }
}

impl std::fmt::Display for HcEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The result of an HCCM estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct HccmEstimate {
    /// the covariance matrix of the parameters
    pub covariance: DMatrix<f64>,
    /// the leverages `$h_i$` of the observations
    pub leverages: DVector<f64>,
    /// how `$\boldsymbol{J}^T\boldsymbol{J}$` was inverted
    pub inversion: Inversion,
}

/// Calculate the heteroscedasticity consistent covariance of a least squares fit from its
/// jacobian (one row per observation, one column per parameter) and its residual.
///
/// # Errors
///
/// An [InputError] if the jacobian and the residual have a different number of rows, if
/// there are not more observations than parameters or if either contains non-finite values.
#[allow(non_snake_case)]
pub fn hccm(
    jacobian: &DMatrix<f64>,
    residuals: &DVector<f64>,
    estimator: HcEstimator,
) -> Result<HccmEstimate, SnllsError> {
    let (n, k) = jacobian.shape();
    if n != residuals.len() {
        return Err(InputError::RowCountMismatch {
            rows: n,
            observations: residuals.len(),
        }
        .into());
    }
    if n <= k || k == 0 {
        return Err(InputError::Underdetermined {
            observations: n,
            parameters: k,
        }
        .into());
    }
    check_finite(jacobian, residuals)?;

    let (B, inversion) = inverse_or_pseudo_inverse(&jacobian.tr_mul(jacobian));
    let JB = jacobian * &B;
    let leverages = DVector::from_iterator(
        n,
        JB.row_iter()
            .zip(jacobian.row_iter())
            .map(|(jb, j)| jb.dot(&j)),
    );
    let omega = estimator.weights(residuals, &leverages, k);

    // J^T diag(omega) J without forming the diagonal matrix
    let mut weighted = jacobian.clone();
    for (mut row, w) in weighted.row_iter_mut().zip(omega.iter()) {
        row *= *w;
    }
    let meat = jacobian.tr_mul(&weighted);
    let covariance = &B * meat * &B;

    Ok(HccmEstimate {
        covariance,
        leverages,
        inversion,
    })
}

use crate::error::{ConfigurationError, InputError, SnllsError};
use crate::fit::FitResult;
use crate::linalg_helpers::{
    concat_colwise, concat_rowwise, concat_vectors, inverse_or_pseudo_inverse,
    numerical_derivative_within, Inversion,
};
use crate::model::ForwardOperator;
use crate::problem::SnllsProblem;
use nalgebra::{DMatrix, DVector};

pub mod hccm;


/// The covariance based uncertainty of the fitted parameters.
///
/// The parameters are ordered as the joint vector `$(\vec{p}^*, \vec{x}^*)^T$`, i.e. the
/// nonlinear parameters come first, followed by the linear coefficients.
///
/// # Calculation
///
/// The covariance is estimated as
///
/// ```math
/// \text{Cov} = \sigma^2 (\boldsymbol{J}^T\boldsymbol{J})^{-1},
/// ```
///
/// where `$\sigma^2 = ||\vec{r}||^2/(n-k)$` is estimated from the residual `$\vec{r}$` at
/// the optimum, with `$n$` rows and `$k$` columns of the augmented jacobian
///
/// ```math
/// \boldsymbol{J} = \left(\begin{matrix}
/// \partial(\boldsymbol{A}(\vec{p})\vec{x}^*)/\partial\vec{p} & \boldsymbol{A}(\vec{p}^*) \\
/// \boldsymbol{0} & \alpha\boldsymbol{W}\boldsymbol{L}
/// \end{matrix}\right).
/// ```
///
/// The penalty rows are only present if the fit was regularized. The derivatives with
/// respect to the nonlinear parameters are calculated by finite differences that never
/// evaluate the forward operator outside the bounds of the nonlinear parameters. If
/// `$\boldsymbol{J}^T\boldsymbol{J}$` is (numerically) singular, its pseudo inverse is used,
/// which is reported by [UncertaintyQuantification::inversion].
///
/// # References
///
/// See [O'Leary and Rust 2012](https://www.nist.gov/publications/variable-projection-nonlinear-least-squares-problems)
/// for the covariance of variable projection estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct UncertaintyQuantification {
    covariance: DMatrix<f64>,
    mean: DVector<f64>,
    lower: DVector<f64>,
    upper: DVector<f64>,
    noise_variance: f64,
    degrees_of_freedom: usize,
    inversion: Inversion,
    nonlinear_count: usize,
}

impl UncertaintyQuantification {
    /// Calculate the uncertainty at the optimum of a fit of the given problem.
    pub(crate) fn try_calculate<Model>(
        problem: &SnllsProblem<Model>,
        fit: &FitResult,
    ) -> Result<Self, SnllsError>
    where
        Model: ForwardOperator,
    {
        let jacobian = augmented_jacobian(problem, fit)?;
        let mean = concat_vectors(fit.nonlinear_parameters(), fit.linear_coefficients());
        let lower = concat_vectors(
            problem.nonlinear_bounds().lower(),
            problem.linear_bounds().lower(),
        );
        let upper = concat_vectors(
            problem.nonlinear_bounds().upper(),
            problem.linear_bounds().upper(),
        );
        let mut uncertainty =
            Self::from_jacobian(&jacobian, &fit.residuals(), mean, lower, upper)?;
        uncertainty.nonlinear_count = problem.nonlinear_count();
        Ok(uncertainty)
    }

    /// Calculate the uncertainty of least squares estimates `mean` from the jacobian of the
    /// residual and the residual at the estimates. The bounds clip the confidence intervals
    /// and may be infinite.
    ///
    /// # Errors
    ///
    /// An [InputError] if the dimensions of the arguments are inconsistent, if the jacobian
    /// or the residual are not finite or if there are not more residuals than parameters.
    pub fn from_jacobian(
        jacobian: &DMatrix<f64>,
        residuals: &DVector<f64>,
        mean: DVector<f64>,
        lower: DVector<f64>,
        upper: DVector<f64>,
    ) -> Result<Self, SnllsError> {
        if jacobian.nrows() != residuals.len() {
            return Err(InputError::RowCountMismatch {
                rows: jacobian.nrows(),
                observations: residuals.len(),
            }
            .into());
        }
        let parameters = jacobian.ncols();
        for vector in [&mean, &lower, &upper] {
            if vector.len() != parameters {
                return Err(InputError::ParameterCountMismatch {
                    expected: parameters,
                    actual: vector.len(),
                }
                .into());
            }
        }

        if parameters == 0 || residuals.len() <= parameters {
            return Err(InputError::Underdetermined {
                observations: residuals.len(),
                parameters,
            }
            .into());
        }
        check_finite(jacobian, residuals)?;

        let degrees_of_freedom = residuals.len() - parameters;
        let noise_variance = residuals.norm_squared() / degrees_of_freedom as f64;
        let (inverse, inversion) = inverse_or_pseudo_inverse(&jacobian.tr_mul(jacobian));
        if inversion == Inversion::PseudoInverse {
            log::debug!("covariance calculated with the pseudo inverse of a singular JᵀJ");
        }
        Ok(Self {
            covariance: inverse * noise_variance,
            mean,
            lower,
            upper,
            noise_variance,
            degrees_of_freedom,
            inversion,
            nonlinear_count: 0,
        })
    }

    /// the covariance matrix of the joint parameter vector
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// the estimates `$(\vec{p}^*, \vec{x}^*)^T$`
    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    /// the lower bounds of the joint parameter vector
    pub fn lower(&self) -> &DVector<f64> {
        &self.lower
    }

    /// the upper bounds of the joint parameter vector
    pub fn upper(&self) -> &DVector<f64> {
        &self.upper
    }

    /// the estimated noise variance `$\sigma^2$`
    pub fn noise_variance(&self) -> f64 {
        self.noise_variance
    }

    /// the degrees of freedom `$n-k$` of the residual
    pub fn degrees_of_freedom(&self) -> usize {
        self.degrees_of_freedom
    }

    /// whether `$\boldsymbol{J}^T\boldsymbol{J}$` was inverted regularly or pseudo inverted
    pub fn inversion(&self) -> Inversion {
        self.inversion
    }

    /// number of leading nonlinear parameters in the joint parameter vector
    pub fn nonlinear_count(&self) -> usize {
        self.nonlinear_count
    }

    /// the standard errors `$\sqrt{\text{Cov}_{ii}}$`
    pub fn standard_errors(&self) -> DVector<f64> {
        self.covariance.diagonal().map(|variance| variance.max(0.).sqrt())
    }

    /// The correlation matrix `$\text{Cov}_{ij}/\sqrt{\text{Cov}_{ii}\text{Cov}_{jj}}$`.
    /// Parameters with vanishing variance have zero correlation with all others.
    pub fn correlation_matrix(&self) -> DMatrix<f64> {
        let errors = self.standard_errors();
        DMatrix::from_fn(self.covariance.nrows(), self.covariance.ncols(), |i, j| {
            let scale = errors[i] * errors[j];
            if scale > 0. {
                self.covariance[(i, j)] / scale
            } else {
                0.
            }
        })
    }

    /// Calculate the confidence interval `$\mu_i \pm t\,\sqrt{\text{Cov}_{ii}}$` with the given
    /// coverage in percent, where `$t$` is the corresponding quantile of Student's t
    /// distribution with [UncertaintyQuantification::degrees_of_freedom]. The interval is
    /// clipped to the bounds of the parameters.
    ///
    /// Returns the lower and upper ends of the intervals.
    ///
    /// # Errors
    ///
    /// A [ConfigurationError::InvalidValue] if the coverage is not strictly between 0 and 100.
    pub fn confidence_interval(
        &self,
        coverage: f64,
    ) -> Result<(DVector<f64>, DVector<f64>), ConfigurationError> {
        if !(coverage > 0. && coverage < 100.) {
            return Err(ConfigurationError::InvalidValue {
                option: "coverage",
                requirement: "strictly between 0 and 100 percent",
                value: coverage,
            });
        }
        let t = distrs::StudentsT::ppf(0.5 + coverage / 200., self.degrees_of_freedom as f64);
        let half_width = self.standard_errors() * t;
        let lower = (&self.mean - &half_width).zip_map(&self.lower, f64::max);
        let upper = (&self.mean + &half_width).zip_map(&self.upper, f64::min);
        Ok((lower, upper))
    }
}

/// The jacobian of the residual with respect to the joint parameter vector at the optimum.
#[allow(non_snake_case)]
pub(crate) fn augmented_jacobian<Model>(
    problem: &SnllsProblem<Model>,
    fit: &FitResult,
) -> Result<DMatrix<f64>, SnllsError>
where
    Model: ForwardOperator,
{
    let evaluation = fit.evaluation();
    let bounds = problem.nonlinear_bounds();
    let p = evaluation.params();
    let x = evaluation.linear();
    let A = evaluation.operator();

    let mut nonlinear_columns = DMatrix::zeros(A.nrows(), p.len());
    for (k, mut column) in nonlinear_columns.column_iter_mut().enumerate() {
        let derivative = numerical_derivative_within(
            |pk| {
                let mut params = p.clone();
                params[k] = pk;
                problem.operator(&params).map(|A| A * x)
            },
            p[k],
            bounds.lower()[k],
            bounds.upper()[k],
        )?;
        column.copy_from(&derivative);
    }
    let jacobian = concat_colwise(&nonlinear_columns, A);

    match (evaluation.alpha(), evaluation.weighted_operator()) {
        (Some(alpha), Some(WL)) => {
            let penalty = concat_colwise(&DMatrix::zeros(WL.nrows(), p.len()), &(WL * alpha));
            Ok(concat_rowwise(&jacobian, &penalty))
        }
        _ => Ok(jacobian),
    }
}

/// Reject non-finite input before it reaches a singular value decomposition.
pub(crate) fn check_finite(
    jacobian: &DMatrix<f64>,
    residuals: &DVector<f64>,
) -> Result<(), InputError> {
    if jacobian.iter().any(|j| !j.is_finite()) {
        return Err(InputError::NonFiniteJacobian);
    }
    match residuals.iter().position(|r| !r.is_finite()) {
        Some(index) => Err(InputError::NonFiniteResidual { index }),
        None => Ok(()),
    }
}

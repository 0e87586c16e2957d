use crate::error::ConfigurationError;
use crate::regularization::selection::RegParam;
use crate::regularization::RegType;
use crate::solvers::levmar::NonlinearSolverStrategy;
use crate::solvers::linear::{LinearSolverSettings, LinearSolverStrategy};


/// Configuration of the [`SnllsSolver`](crate::solvers::levmar::SnllsSolver).
///
/// All fields are public and each one has a consuming setter of the same name, so that
/// the options can be assembled builder style:
///
/// ```rust
/// use snlls::prelude::*;
/// # fn main() -> Result<(), SnllsError> {
/// let options = SnllsOptions::default()
///     .reg_type("huber".parse()?)
///     .reg_param("gcv".parse::<RegParam>()?)
///     .reg_order(1)
///     .multistart(5)
///     .seed(42);
/// assert!(options.validate().is_ok());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SnllsOptions {
    /// penalize the linear subproblem even if it is well conditioned (default `false`)
    pub force_penalty: bool,
    /// the kind of penalty (default tikhonov)
    pub reg_type: RegType,
    /// order of the finite difference penalty operator (default `2`). If the order is not
    /// smaller than the number of linear coefficients, the largest possible order is used.
    pub reg_order: usize,
    /// the selection criterion or a literal value for the regularization parameter
    /// (default aic)
    pub reg_param: RegParam,
    /// relative change of the nonlinear parameters below which the previously selected
    /// regularization parameter is reused (default `1e-3`)
    pub alpha_opt_threshold: f64,
    /// number of optimizer runs from different starting points (default `1`)
    pub multistart: usize,
    /// seed of the random number generator for the starting points of multi-start runs
    pub seed: u64,
    /// the strategy for the linear subproblem. If `None`, the default strategy for the
    /// constraint pattern of the linear coefficients is used.
    pub lin_solver: Option<LinearSolverStrategy>,
    /// the strategy for the nonlinear problem
    pub nonlin_solver: NonlinearSolverStrategy,
    /// iteration budget of the constrained linear solvers (default `1000`)
    pub lin_max_iter: usize,
    /// optimality tolerance of the constrained linear solvers (default `1e-10`)
    pub lin_tol_fun: f64,
    /// iteration budget of the nonlinear solver. For levenberg-marquardt this is the
    /// patience, i.e. the maximum number of residual evaluations is
    /// `nonlin_max_iter * (W+1)` for `W` nonlinear parameters (default `100`).
    pub nonlin_max_iter: usize,
    /// relative reduction of the objective below which the nonlinear solver
    /// terminates (default `1e-10`)
    pub nonlin_tol_fun: f64,
}

impl Default for SnllsOptions {
    fn default() -> Self {
        let linear = LinearSolverSettings::default();
        Self {
            force_penalty: false,
            reg_type: RegType::default(),
            reg_order: 2,
            reg_param: RegParam::default(),
            alpha_opt_threshold: 1e-3,
            multistart: 1,
            seed: 0,
            lin_solver: None,
            nonlin_solver: NonlinearSolverStrategy::default(),
            lin_max_iter: linear.max_iter,
            lin_tol_fun: linear.tolerance,
            nonlin_max_iter: 100,
            nonlin_tol_fun: 1e-10,
        }
    }
}

impl SnllsOptions {
    /// set whether the penalty is applied regardless of the conditioning
    #[must_use]
    pub fn force_penalty(self, force_penalty: bool) -> Self {
        Self {
            force_penalty,
            ..self
        }
    }

    /// set the kind of penalty
    #[must_use]
    pub fn reg_type(self, reg_type: RegType) -> Self {
        Self { reg_type, ..self }
    }

    /// set the order of the penalty operator
    #[must_use]
    pub fn reg_order(self, reg_order: usize) -> Self {
        Self { reg_order, ..self }
    }

    /// set the selection criterion or literal value of the regularization parameter
    #[must_use]
    pub fn reg_param(self, reg_param: impl Into<RegParam>) -> Self {
        Self {
            reg_param: reg_param.into(),
            ..self
        }
    }

    /// set the relative threshold for reusing the regularization parameter
    #[must_use]
    pub fn alpha_opt_threshold(self, alpha_opt_threshold: f64) -> Self {
        Self {
            alpha_opt_threshold,
            ..self
        }
    }

    /// set the number of multi-start runs
    #[must_use]
    pub fn multistart(self, multistart: usize) -> Self {
        Self { multistart, ..self }
    }

    /// set the seed for the starting points of multi-start runs
    #[must_use]
    pub fn seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }

    /// override the default strategy for the linear subproblem
    #[must_use]
    pub fn lin_solver(self, lin_solver: LinearSolverStrategy) -> Self {
        Self {
            lin_solver: Some(lin_solver),
            ..self
        }
    }

    /// set the strategy for the nonlinear problem
    #[must_use]
    pub fn nonlin_solver(self, nonlin_solver: NonlinearSolverStrategy) -> Self {
        Self {
            nonlin_solver,
            ..self
        }
    }

    /// set the iteration budget of the constrained linear solvers
    #[must_use]
    pub fn lin_max_iter(self, lin_max_iter: usize) -> Self {
        Self {
            lin_max_iter,
            ..self
        }
    }

    /// set the optimality tolerance of the constrained linear solvers
    #[must_use]
    pub fn lin_tol_fun(self, lin_tol_fun: f64) -> Self {
        Self {
            lin_tol_fun,
            ..self
        }
    }

    /// set the iteration budget of the nonlinear solver
    #[must_use]
    pub fn nonlin_max_iter(self, nonlin_max_iter: usize) -> Self {
        Self {
            nonlin_max_iter,
            ..self
        }
    }

    /// set the function tolerance of the nonlinear solver
    #[must_use]
    pub fn nonlin_tol_fun(self, nonlin_tol_fun: f64) -> Self {
        Self {
            nonlin_tol_fun,
            ..self
        }
    }

    /// the settings handed to the constrained linear solvers
    pub fn linear_solver_settings(&self) -> LinearSolverSettings {
        LinearSolverSettings {
            max_iter: self.lin_max_iter,
            tolerance: self.lin_tol_fun,
        }
    }

    /// Check the options for values that can never be valid, independent of the problem.
    ///
    /// # Errors
    ///
    /// * [ConfigurationError::ZeroStarts] if `multistart` is zero
    /// * [ConfigurationError::InvalidValue] for negative or NaN thresholds and tolerances,
    ///   a zero iteration budget, or a negative literal regularization parameter
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.multistart == 0 {
            return Err(ConfigurationError::ZeroStarts);
        }
        non_negative("alpha_opt_threshold", self.alpha_opt_threshold)?;
        non_negative("lin_tol_fun", self.lin_tol_fun)?;
        non_negative("nonlin_tol_fun", self.nonlin_tol_fun)?;
        positive_budget("lin_max_iter", self.lin_max_iter)?;
        positive_budget("nonlin_max_iter", self.nonlin_max_iter)?;
        if let RegParam::Value(alpha) = self.reg_param {
            if !alpha.is_finite() || alpha < 0. {
                return Err(ConfigurationError::InvalidValue {
                    option: "reg_param",
                    requirement: "finite and non-negative",
                    value: alpha,
                });
            }
        }
        Ok(())
    }
}

fn non_negative(option: &'static str, value: f64) -> Result<(), ConfigurationError> {
    // NaN fails the comparison as well
    if value >= 0. {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidValue {
            option,
            requirement: "non-negative",
            value,
        })
    }
}

fn positive_budget(option: &'static str, value: usize) -> Result<(), ConfigurationError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidValue {
            option,
            requirement: "positive",
            value: value as f64,
        })
    }
}

use crate::solvers::levmar::Evaluation;
use levenberg_marquardt::MinimizationReport;
use nalgebra::DVector;

/// The accepted result of a fit, together with the report of the run that
/// produced it.
///
/// This structure is returned by the [`SnllsSolver::fit`](crate::solvers::levmar::SnllsSolver::fit)
/// and [`SnllsSolver::fit_with_uncertainty`](crate::solvers::levmar::SnllsSolver::fit_with_uncertainty)
/// methods. For multi-start fits it holds the run with the smallest objective.
#[derive(Debug)]
pub struct FitResult {
    /// the evaluation at the accepted nonlinear parameters
    pub(crate) evaluation: Evaluation,

    /// The minimization report of the underlying solver for the accepted run.
    /// It contains information about the minimization process
    /// and should be queried to see whether the minimization
    /// was considered successful.
    pub minimization_report: MinimizationReport<f64>,

    /// number of runs that did not diverge
    converged_runs: usize,

    /// index of the accepted run, where run zero started at the initial guess
    best_run: usize,
}

impl FitResult {
    /// internal helper for constructing an instance
    pub(crate) fn new(
        evaluation: Evaluation,
        minimization_report: MinimizationReport<f64>,
        converged_runs: usize,
        best_run: usize,
    ) -> Self {
        Self {
            evaluation,
            minimization_report,
            converged_runs,
            best_run,
        }
    }

    /// the fitted nonlinear parameters `$\vec{p}^*$`
    pub fn nonlinear_parameters(&self) -> &DVector<f64> {
        self.evaluation.params()
    }

    /// the fitted linear coefficients `$\vec{x}^*$`
    pub fn linear_coefficients(&self) -> &DVector<f64> {
        self.evaluation.linear()
    }

    /// the sum of squares of the residual at the optimum
    pub fn objective(&self) -> f64 {
        self.evaluation.objective()
    }

    /// the amplitude factor `$s$` that rescaled `$\boldsymbol{A}(\vec{p}^*)\vec{x}^*$` to the data
    pub fn amplitude_scale(&self) -> f64 {
        self.evaluation.scale()
    }

    /// the regularization parameter at the optimum, or `None` if the linear
    /// subproblem was not penalized there
    pub fn regularization_parameter(&self) -> Option<f64> {
        self.evaluation.alpha()
    }

    /// the residual at the optimum, including the penalty part if the fit was penalized
    pub fn residuals(&self) -> DVector<f64> {
        self.evaluation.residuals()
    }

    /// the model `$s\boldsymbol{A}(\vec{p}^*)\vec{x}^*$` at the optimum
    pub fn best_fit(&self) -> DVector<f64> {
        self.evaluation.fitted()
    }

    /// the full evaluation at the optimum
    pub fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }

    /// number of optimizer runs that did not diverge
    pub fn converged_runs(&self) -> usize {
        self.converged_runs
    }

    /// index of the run that produced this result
    pub fn best_run(&self) -> usize {
        self.best_run
    }

    /// whether the optimizer considered the accepted run successful. The result
    /// is the best point of the run even if this is false, e.g. because the
    /// iteration budget was exhausted.
    pub fn was_successful(&self) -> bool {
        self.minimization_report.termination.was_successful()
    }
}

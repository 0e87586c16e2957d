use crate::bounds::BoundTransform;
use crate::error::{DivergenceError, SnllsError};
use crate::linalg_helpers::{concat_vectors, numerical_derivative, Conditioning};
use crate::model::ForwardOperator;
use crate::options::SnllsOptions;
use crate::problem::SnllsProblem;
use crate::regularization::selection::{select_regularization_parameter, RegParam, RegParamCache};
use crate::regularization::{regularization_operator, RegType};
use crate::solvers::linear::{
    solve_linear_subproblem, LinearSolverSettings, LinearSolverStrategy, LinearSubproblem,
};
use levenberg_marquardt::LeastSquaresProblem;
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn, Matrix, Vector};

/// The state that connects consecutive residual evaluations of one optimizer run:
/// the regularization parameter cache and the linear coefficients and regularization
/// parameter of the previous evaluation.
///
/// The state is only changed by [SolverState::record], so every data dependency between
/// two evaluations is explicit.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverState {
    cache: RegParamCache,
    last_linear: DVector<f64>,
    last_alpha: Option<f64>,
}

impl SolverState {
    /// the initial state for a problem with `linear_count` coefficients: an empty
    /// cache and vanishing previous coefficients
    pub fn new(linear_count: usize) -> Self {
        Self {
            cache: RegParamCache::new(),
            last_linear: DVector::zeros(linear_count),
            last_alpha: None,
        }
    }

    /// the regularization parameter cache
    pub fn cache(&self) -> &RegParamCache {
        &self.cache
    }

    /// the linear coefficients of the previous evaluation
    pub fn last_linear(&self) -> &DVector<f64> {
        &self.last_linear
    }

    /// the regularization parameter of the previous evaluation, if it was penalized
    pub fn last_alpha(&self) -> Option<f64> {
        self.last_alpha
    }

    /// Make the given evaluation the previous one. A freshly selected regularization
    /// parameter is stored in the cache.
    pub fn record(&mut self, evaluation: &Evaluation) {
        if let (true, Some(alpha)) = (evaluation.selected, evaluation.alpha) {
            self.cache.update(&evaluation.params, alpha);
        }
        self.last_linear.clone_from(&evaluation.linear);
        self.last_alpha = evaluation.alpha;
    }
}

/// How the penalty of an evaluation is determined.
#[derive(Debug, Clone, Copy)]
pub enum PenaltyMode<'s> {
    /// Decide from the conditioning of the operator whether to penalize and select
    /// (or reuse) the regularization parameter. The previous coefficients of the state
    /// enter the penalty.
    Adaptive(&'s SolverState),
    /// Use the given regularization parameter (no penalty for `None`) and previous
    /// coefficients, regardless of the conditioning. This is used for finite difference
    /// probes around an iterate, so that the probes see the same penalty as the iterate.
    Frozen {
        /// the regularization parameter of the iterate
        alpha: Option<f64>,
        /// the previous coefficients of the iterate
        x_prev: &'s DVector<f64>,
    },
}

/// The result of one residual evaluation at nonlinear parameters `$\vec{p}$`.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    params: DVector<f64>,
    operator: DMatrix<f64>,
    linear: DVector<f64>,
    scale: f64,
    alpha: Option<f64>,
    selected: bool,
    x_prev: DVector<f64>,
    weighted_operator: Option<DMatrix<f64>>,
    data_residuals: DVector<f64>,
    penalty_residuals: Option<DVector<f64>>,
    penalty_rows: usize,
}

impl Evaluation {
    /// the nonlinear parameters `$\vec{p}$` of this evaluation
    pub fn params(&self) -> &DVector<f64> {
        &self.params
    }

    /// the forward operator `$\boldsymbol{A}(\vec{p})$`
    pub fn operator(&self) -> &DMatrix<f64> {
        &self.operator
    }

    /// the solution `$\vec{x}$` of the linear subproblem
    pub fn linear(&self) -> &DVector<f64> {
        &self.linear
    }

    /// the factor `$s = \hat{y}^T\vec{y}/\hat{y}^T\hat{y}$` that rescales the fit
    /// `$\hat{y} = \boldsymbol{A}\vec{x}$` to the data
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// the regularization parameter, if the linear subproblem was penalized
    pub fn alpha(&self) -> Option<f64> {
        self.alpha
    }

    /// whether the regularization parameter was freshly selected for this evaluation,
    /// as opposed to taken from the cache, given literally or frozen
    pub fn selected(&self) -> bool {
        self.selected
    }

    /// the coefficients of the previous evaluation that entered the penalty
    pub fn x_prev(&self) -> &DVector<f64> {
        &self.x_prev
    }

    /// the weighted penalty operator `$\boldsymbol{W}\boldsymbol{L}$`, if penalized
    pub fn weighted_operator(&self) -> Option<&DMatrix<f64>> {
        self.weighted_operator.as_ref()
    }

    /// the rescaled fit `$s\boldsymbol{A}\vec{x}$`
    pub fn fitted(&self) -> DVector<f64> {
        &self.operator * &self.linear * self.scale
    }

    /// The residual `$[s\hat{y}-\vec{y};\alpha\boldsymbol{W}\boldsymbol{L}\vec{x}_{prev}]$`,
    /// where the penalty part is absent if the evaluation is not penalized.
    pub fn residuals(&self) -> DVector<f64> {
        match &self.penalty_residuals {
            Some(penalty) => concat_vectors(&self.data_residuals, penalty),
            None => self.data_residuals.clone(),
        }
    }

    /// the part `$s\hat{y}-\vec{y}$` of the residual
    pub fn data_residuals(&self) -> &DVector<f64> {
        &self.data_residuals
    }

    /// the sum of squared residuals
    pub fn objective(&self) -> f64 {
        self.data_residuals.norm_squared()
            + self
                .penalty_residuals
                .as_ref()
                .map_or(0., |penalty| penalty.norm_squared())
    }

    /// The residual with the penalty part padded by zeros if it is absent, so that its
    /// length does not depend on whether the evaluation was penalized.
    pub(crate) fn padded_residuals(&self) -> DVector<f64> {
        let penalty = self
            .penalty_residuals
            .clone()
            .unwrap_or_else(|| DVector::zeros(self.penalty_rows));
        concat_vectors(&self.data_residuals, &penalty)
    }
}

/// Evaluates the residual of a separable problem for given nonlinear parameters.
///
/// Each evaluation builds the forward operator, checks its conditioning, penalizes
/// the linear subproblem if it is ill conditioned (or the penalty is forced), solves
/// the linear subproblem under the constraints of the linear coefficients, rescales
/// the fit to the data and assembles the residual.
#[derive(Debug)]
pub struct ResidualEvaluator<'a, Model>
where
    Model: ForwardOperator,
{
    problem: &'a SnllsProblem<Model>,
    penalty_operator: DMatrix<f64>,
    reg_type: RegType,
    reg_param: RegParam,
    force_penalty: bool,
    alpha_opt_threshold: f64,
    strategy: LinearSolverStrategy,
    settings: LinearSolverSettings,
}

impl<'a, Model> ResidualEvaluator<'a, Model>
where
    Model: ForwardOperator,
{
    /// Create the evaluator for the given problem and options.
    ///
    /// # Errors
    ///
    /// Returns a [ConfigurationError](crate::error::ConfigurationError) if the
    /// configured linear solver cannot handle the constraints of the linear coefficients.
    pub fn new(problem: &'a SnllsProblem<Model>, options: &SnllsOptions) -> Result<Self, SnllsError> {
        let strategy =
            LinearSolverStrategy::resolve(options.lin_solver, problem.constraints().linear())?;
        let linear_count = problem.linear_count();
        let order = options.reg_order.min(linear_count.saturating_sub(1));
        if order != options.reg_order {
            log::debug!(
                "regularization order {} reduced to {order} for {linear_count} linear coefficients",
                options.reg_order
            );
        }
        let penalty_operator = regularization_operator(order, linear_count)?;
        Ok(Self {
            problem,
            penalty_operator,
            reg_type: options.reg_type,
            reg_param: options.reg_param,
            force_penalty: options.force_penalty,
            alpha_opt_threshold: options.alpha_opt_threshold,
            strategy,
            settings: options.linear_solver_settings(),
        })
    }

    /// the problem this evaluator belongs to
    pub fn problem(&self) -> &'a SnllsProblem<Model> {
        self.problem
    }

    /// the (unweighted) finite difference operator `$\boldsymbol{L}$`
    pub fn penalty_operator(&self) -> &DMatrix<f64> {
        &self.penalty_operator
    }

    /// the strategy used for the linear subproblem
    pub fn strategy(&self) -> LinearSolverStrategy {
        self.strategy
    }

    /// Evaluate the residual at the nonlinear parameters `params`. The state is only read;
    /// use [SolverState::record] to make the evaluation the previous one.
    ///
    /// # Errors
    ///
    /// Errors of the forward operator, of the regularization parameter selection and of
    /// the linear solver are propagated.
    #[allow(non_snake_case)]
    pub fn evaluate(
        &self,
        params: &DVector<f64>,
        mode: PenaltyMode<'_>,
    ) -> Result<Evaluation, SnllsError> {
        let A = self.problem.operator(params)?;
        let y = self.problem.observations();

        let (alpha, selected, x_prev) = match mode {
            PenaltyMode::Frozen { alpha, x_prev } => (alpha, false, x_prev),
            PenaltyMode::Adaptive(state) => {
                let x_prev = state.last_linear();
                if self.force_penalty || Conditioning::of(&A).is_ill_conditioned() {
                    let (alpha, selected) = self.regularization_parameter(&A, params, state)?;
                    (Some(alpha), selected, x_prev)
                } else {
                    (None, false, x_prev)
                }
            }
        };

        let weighted_operator =
            alpha.map(|_| self.reg_type.weighted_operator(&self.penalty_operator, x_prev));
        let subproblem = match (alpha, weighted_operator.as_ref()) {
            (Some(alpha), Some(WL)) => LinearSubproblem::new(&A, y).with_penalty(alpha, WL),
            _ => LinearSubproblem::new(&A, y),
        };
        let linear = solve_linear_subproblem(
            self.strategy,
            &subproblem,
            self.problem.linear_bounds(),
            &self.settings,
        )?;

        let y_hat = &A * &linear;
        let norm_squared = y_hat.norm_squared();
        let scale = if norm_squared > 0. {
            y_hat.dot(y) / norm_squared
        } else {
            1.
        };
        let data_residuals = y_hat * scale - y;
        let penalty_residuals = match (alpha, weighted_operator.as_ref()) {
            (Some(alpha), Some(WL)) => Some(WL * x_prev * alpha),
            _ => None,
        };

        Ok(Evaluation {
            params: params.clone(),
            operator: A,
            linear,
            scale,
            alpha,
            selected,
            x_prev: x_prev.clone(),
            weighted_operator,
            data_residuals,
            penalty_residuals,
            penalty_rows: self.penalty_operator.nrows(),
        })
    }

    // the regularization parameter and whether it was freshly selected
    #[allow(non_snake_case)]
    fn regularization_parameter(
        &self,
        A: &DMatrix<f64>,
        params: &DVector<f64>,
        state: &SolverState,
    ) -> Result<(f64, bool), SnllsError> {
        match self.reg_param {
            RegParam::Value(alpha) => Ok((alpha, false)),
            RegParam::Criterion(criterion) => {
                if let Some(alpha) = state.cache().reusable(params, self.alpha_opt_threshold) {
                    return Ok((alpha, false));
                }
                let WL = self
                    .reg_type
                    .weighted_operator(&self.penalty_operator, state.last_linear());
                let alpha =
                    select_regularization_parameter(criterion, A, self.problem.observations(), &WL)?;
                Ok((alpha, true))
            }
        }
    }
}

/// The residual of a separable problem in the unbounded internal coordinates of the
/// nonlinear parameters, as a problem for the [levenberg_marquardt] crate.
///
/// Every call to `set_params` is an adaptive evaluation that is recorded in the solver
/// state. The jacobian is calculated by finite differences in the internal coordinates,
/// where every probe is a frozen evaluation with the penalty of the current iterate.
/// The best evaluation over the lifetime of the problem is retained, so that a run that
/// stops early still provides its best point.
pub(crate) struct SeparableResidual<'e, 'a, Model>
where
    Model: ForwardOperator,
{
    evaluator: &'e ResidualEvaluator<'a, Model>,
    transform: BoundTransform,
    internal: DVector<f64>,
    state: SolverState,
    current: Result<Evaluation, SnllsError>,
    best: Option<Evaluation>,
}

impl<'e, 'a, Model> SeparableResidual<'e, 'a, Model>
where
    Model: ForwardOperator,
{
    /// create the residual for a run starting at the (bounded) nonlinear parameters `start`
    pub fn new(evaluator: &'e ResidualEvaluator<'a, Model>, start: &DVector<f64>) -> Self {
        let problem = evaluator.problem();
        let transform = BoundTransform::new(problem.nonlinear_bounds());
        let internal = transform.to_internal(start);
        let mut state = SolverState::new(problem.linear_count());
        let current = adaptive_evaluation(evaluator, &transform, &internal, &mut state);
        let best = current.as_ref().ok().cloned();
        Self {
            evaluator,
            transform,
            internal,
            state,
            current,
            best,
        }
    }

    /// Consume the residual and return the best evaluation, or the error of the last
    /// evaluation if no evaluation succeeded.
    pub fn into_best(self) -> Result<Evaluation, SnllsError> {
        match (self.best, self.current) {
            (Some(best), _) => Ok(best),
            (None, Err(err)) => Err(err),
            (None, Ok(evaluation)) => Ok(evaluation),
        }
    }
}

impl<Model> LeastSquaresProblem<f64, Dyn, Dyn> for SeparableResidual<'_, '_, Model>
where
    Model: ForwardOperator,
{
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, internal: &Vector<f64, Dyn, Self::ParameterStorage>) {
        self.internal.clone_from(internal);
        self.current = adaptive_evaluation(
            self.evaluator,
            &self.transform,
            &self.internal,
            &mut self.state,
        );
        if let Ok(evaluation) = &self.current {
            let improved = self
                .best
                .as_ref()
                .map_or(true, |best| evaluation.objective() < best.objective());
            if improved {
                self.best = Some(evaluation.clone());
            }
        }
    }

    fn params(&self) -> Vector<f64, Dyn, Self::ParameterStorage> {
        self.internal.clone()
    }

    fn residuals(&self) -> Option<Vector<f64, Dyn, Self::ResidualStorage>> {
        self.current
            .as_ref()
            .ok()
            .map(|evaluation| evaluation.padded_residuals())
    }

    fn jacobian(&self) -> Option<Matrix<f64, Dyn, Dyn, Self::JacobianStorage>> {
        let evaluation = self.current.as_ref().ok()?;
        let rows = evaluation.data_residuals.len() + evaluation.penalty_rows;
        let mut jacobian = DMatrix::zeros(rows, self.internal.len());
        for (k, mut column) in jacobian.column_iter_mut().enumerate() {
            let derivative = numerical_derivative(
                |qk| {
                    let mut internal = self.internal.clone();
                    internal[k] = qk;
                    let params = self.transform.to_external(&internal);
                    self.evaluator
                        .evaluate(
                            &params,
                            PenaltyMode::Frozen {
                                alpha: evaluation.alpha,
                                x_prev: &evaluation.x_prev,
                            },
                        )
                        .map(|probe| probe.padded_residuals())
                },
                self.internal[k],
            )
            .ok()?;
            column.copy_from(&derivative);
        }
        Some(jacobian)
    }
}

// evaluate at the internal coordinates and record a successful evaluation in the state
fn adaptive_evaluation<Model>(
    evaluator: &ResidualEvaluator<'_, Model>,
    transform: &BoundTransform,
    internal: &DVector<f64>,
    state: &mut SolverState,
) -> Result<Evaluation, SnllsError>
where
    Model: ForwardOperator,
{
    let params = transform.to_external(internal);
    let evaluation = evaluator.evaluate(&params, PenaltyMode::Adaptive(&*state))?;
    if !evaluation.objective().is_finite() {
        return Err(DivergenceError::NonFiniteSolution.into());
    }
    state.record(&evaluation);
    Ok(evaluation)
}

use crate::error::{ConfigurationError, DivergenceError, SnllsError};
use crate::fit::FitResult;
use crate::model::ForwardOperator;
use crate::options::SnllsOptions;
use crate::problem::SnllsProblem;
use crate::statistics::UncertaintyQuantification;
use levenberg_marquardt::{LevenbergMarquardt, MinimizationReport};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::str::FromStr;

mod residual;

pub(crate) use residual::SeparableResidual;
pub use residual::{Evaluation, PenaltyMode, ResidualEvaluator, SolverState};


/// Strategy for the bound constrained nonlinear least squares problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NonlinearSolverStrategy {
    /// the Levenberg-Marquardt algorithm of the [levenberg_marquardt] crate, applied in
    /// unbounded internal coordinates of the nonlinear parameters
    #[default]
    LevenbergMarquardt,
}

impl NonlinearSolverStrategy {
    /// the canonical name of the strategy
    pub fn name(&self) -> &'static str {
        match self {
            NonlinearSolverStrategy::LevenbergMarquardt => "levenberg-marquardt",
        }
    }
}

impl FromStr for NonlinearSolverStrategy {
    type Err = ConfigurationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lm" | "levmar" | "levenberg-marquardt" => Ok(NonlinearSolverStrategy::LevenbergMarquardt),
            "trust-region-reflective" | "trf" | "interior-point" => {
                Err(ConfigurationError::Unavailable {
                    option: "nonlinear solver",
                    name: name.to_string(),
                })
            }
            _ => Err(ConfigurationError::UnknownName {
                option: "nonlinear solver",
                name: name.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for NonlinearSolverStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The solver for separable nonlinear least squares problems.
///
/// The nonlinear parameters are optimized with the configured nonlinear strategy, while
/// the linear coefficients are the solution of the (possibly penalized and constrained)
/// linear subproblem at every iterate. See [ResidualEvaluator] for the details of one
/// evaluation.
///
/// # Usage
///
/// ```rust
/// use nalgebra::{dvector, DMatrix, DVector};
/// use snlls::prelude::*;
/// # fn main() -> Result<(), SnllsError> {
/// let t = DVector::from_fn(50, |i, _| 2. * i as f64 / 49.);
/// let tt = t.clone();
/// let operator = move |p: &DVector<f64>| {
///     let mut a = DMatrix::zeros(tt.len(), 2);
///     a.set_column(0, &tt.map(|t| (-p[0] * t).exp()));
///     a.set_column(1, &tt);
///     a
/// };
/// let y = t.map(|t| 2. * (-t).exp() + 0.5 * t);
/// let problem = SnllsProblemBuilder::new(operator)
///     .observations(y)
///     .initial_guess(dvector![1.3])
///     .build()?;
/// let fit = SnllsSolver::default().fit(&problem)?;
/// assert!((fit.nonlinear_parameters()[0] - 1.).abs() < 1e-3);
/// # Ok(())
/// # }
/// ```
///
/// # Multi-start
///
/// If more than one start is configured, the first run starts at the initial guess of the
/// problem and the others at points drawn uniformly from the bounds of the nonlinear
/// parameters. The runs are independent and the one with the smallest objective is
/// accepted. Runs that diverge are skipped.
#[derive(Debug, Clone, Default)]
pub struct SnllsSolver {
    options: SnllsOptions,
}

impl SnllsSolver {
    /// create a solver with the given options
    pub fn new(options: SnllsOptions) -> Self {
        Self { options }
    }

    /// the options of this solver
    pub fn options(&self) -> &SnllsOptions {
        &self.options
    }

    /// Fit the problem.
    ///
    /// # Errors
    ///
    /// * [SnllsError::Configuration] if the options are invalid or incompatible with the
    ///   problem, which is checked before any iteration runs
    /// * [SnllsError::Divergence] if all runs diverge. For a single run, the error of
    ///   that run is returned.
    pub fn fit<Model>(&self, problem: &SnllsProblem<Model>) -> Result<FitResult, SnllsError>
    where
        Model: ForwardOperator,
    {
        self.options.validate()?;
        let starts = self.starting_points(problem)?;
        let evaluator = ResidualEvaluator::new(problem, &self.options)?;
        let solver = self.nonlinear_solver();

        let mut best: Option<(usize, Evaluation, MinimizationReport<f64>)> = None;
        let mut converged_runs = 0;
        let mut last_error = None;
        for (run, start) in starts.iter().enumerate() {
            match minimize(&solver, &evaluator, start) {
                Ok((evaluation, report)) => {
                    converged_runs += 1;
                    log::debug!(
                        "run {run} terminated with objective {:e} after {} evaluations: {:?}",
                        evaluation.objective(),
                        report.number_of_evaluations,
                        report.termination
                    );
                    let improves = best
                        .as_ref()
                        .map_or(true, |(_, current, _)| evaluation.objective() < current.objective());
                    if improves {
                        best = Some((run, evaluation, report));
                    }
                }
                Err(err) => {
                    log::warn!("run {run} diverged: {err}");
                    last_error = Some(err);
                }
            }
        }

        match (best, last_error) {
            (Some((run, evaluation, report)), _) => {
                Ok(FitResult::new(evaluation, report, converged_runs, run))
            }
            (None, Some(err)) if starts.len() == 1 => Err(err),
            (None, _) => Err(DivergenceError::AllRunsDiverged { runs: starts.len() }.into()),
        }
    }

    /// Fit the problem and calculate the uncertainty of the fitted parameters at the
    /// optimum.
    ///
    /// # Errors
    ///
    /// The errors of [SnllsSolver::fit] and of the forward operator when calculating the
    /// jacobian at the optimum.
    pub fn fit_with_uncertainty<Model>(
        &self,
        problem: &SnllsProblem<Model>,
    ) -> Result<(FitResult, UncertaintyQuantification), SnllsError>
    where
        Model: ForwardOperator,
    {
        let fit = self.fit(problem)?;
        let uncertainty = UncertaintyQuantification::try_calculate(problem, &fit)?;
        Ok((fit, uncertainty))
    }

    /// The starting points of all runs. The first one is the initial guess of the problem.
    ///
    /// # Errors
    ///
    /// A [ConfigurationError::MultiStartUnbounded] if more than one start is requested and
    /// some nonlinear bound is infinite.
    pub fn starting_points<Model>(
        &self,
        problem: &SnllsProblem<Model>,
    ) -> Result<Vec<DVector<f64>>, ConfigurationError>
    where
        Model: ForwardOperator,
    {
        let starts = self.options.multistart;
        if starts == 0 {
            return Err(ConfigurationError::ZeroStarts);
        }
        let initial_guess = problem.initial_guess().clone();
        if starts == 1 {
            return Ok(vec![initial_guess]);
        }
        let bounds = problem.nonlinear_bounds();
        if !bounds.is_finite() {
            return Err(ConfigurationError::MultiStartUnbounded { starts });
        }

        let mut rng = StdRng::seed_from_u64(self.options.seed);
        let mut points = Vec::with_capacity(starts);
        points.push(initial_guess);
        for _ in 1..starts {
            let point = DVector::from_iterator(
                bounds.len(),
                bounds
                    .lower()
                    .iter()
                    .zip(bounds.upper().iter())
                    .map(|(&lower, &upper)| rng.gen_range(lower..=upper)),
            );
            points.push(point);
        }
        Ok(points)
    }

    fn nonlinear_solver(&self) -> LevenbergMarquardt<f64> {
        match self.options.nonlin_solver {
            NonlinearSolverStrategy::LevenbergMarquardt => LevenbergMarquardt::new()
                .with_ftol(self.options.nonlin_tol_fun)
                .with_patience(self.options.nonlin_max_iter),
        }
    }
}

// one optimizer run, which yields the best evaluation of the run
fn minimize<Model>(
    solver: &LevenbergMarquardt<f64>,
    evaluator: &ResidualEvaluator<'_, Model>,
    start: &DVector<f64>,
) -> Result<(Evaluation, MinimizationReport<f64>), SnllsError>
where
    Model: ForwardOperator,
{
    let residual = SeparableResidual::new(evaluator, start);
    let (residual, report) = solver.minimize(residual);
    let evaluation = residual.into_best()?;
    Ok((evaluation, report))
}

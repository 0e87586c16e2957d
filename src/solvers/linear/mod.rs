//! Solvers for the linear subproblem
//!
//! ```math
//! \min_{\vec{l} \leq \vec{x} \leq \vec{u}} ||\boldsymbol{A}\vec{x}-\vec{y}||^2 + \alpha^2 ||\boldsymbol{L}\vec{x}||^2,
//! ```
//!
//! which is the least squares problem for the augmented design `$[\boldsymbol{A};\alpha\boldsymbol{L}]$`
//! and data `$[\vec{y};\vec{0}]$`, or equivalently the quadratic program with the normal
//! equation components `$\boldsymbol{K} = \boldsymbol{A}^T\boldsymbol{A}+\alpha^2\boldsymbol{L}^T\boldsymbol{L}$`
//! and `$\vec{f} = \boldsymbol{A}^T\vec{y}$`. The penalty is absent for well conditioned problems.
use crate::bounds::{Bounds, LinearConstraint};
use crate::error::{ConfigurationError, DivergenceError};
use crate::linalg_helpers::{concat_rowwise, concat_vectors, solve_least_squares};
use nalgebra::{DMatrix, DVector};
use std::str::FromStr;


/// Strategy for solving the linear subproblem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinearSolverStrategy {
    /// unconstrained least squares using an SVD truncated at machine precision
    Lsq,
    /// bounded variable least squares: a primal active set method for the box
    /// constrained quadratic program given by the normal equations
    Bvls,
    /// the fast non-negative least squares method of Bro and de Jong, which
    /// works with the normal equations
    Fnnls,
    /// the active set non-negative least squares method of Lawson and Hanson,
    /// which works with the (augmented) design matrix
    Nnls,
}

impl LinearSolverStrategy {
    /// the name by which the strategy is parsed
    pub fn name(&self) -> &'static str {
        match self {
            LinearSolverStrategy::Lsq => "lsq",
            LinearSolverStrategy::Bvls => "bvls",
            LinearSolverStrategy::Fnnls => "fnnls",
            LinearSolverStrategy::Nnls => "nnls",
        }
    }

    /// the strategy that is used if none was configured
    pub const fn default_for(constraint: LinearConstraint) -> Self {
        match constraint {
            LinearConstraint::Unconstrained => LinearSolverStrategy::Lsq,
            LinearConstraint::Box => LinearSolverStrategy::Bvls,
            LinearConstraint::NonNegative => LinearSolverStrategy::Fnnls,
        }
    }

    /// whether this strategy can solve problems with the given constraint pattern
    pub fn supports(&self, constraint: LinearConstraint) -> bool {
        match self {
            LinearSolverStrategy::Lsq => constraint == LinearConstraint::Unconstrained,
            LinearSolverStrategy::Bvls => true,
            LinearSolverStrategy::Fnnls | LinearSolverStrategy::Nnls => {
                constraint == LinearConstraint::NonNegative
            }
        }
    }

    /// Resolve the configured strategy (if any) against the constraint pattern of the problem.
    ///
    /// # Errors
    ///
    /// A [ConfigurationError::IncompatibleLinearSolver] if the configured strategy does not
    /// support the constraint pattern.
    pub fn resolve(
        configured: Option<Self>,
        constraint: LinearConstraint,
    ) -> Result<Self, ConfigurationError> {
        let strategy = configured.unwrap_or(Self::default_for(constraint));
        if strategy.supports(constraint) {
            Ok(strategy)
        } else {
            Err(ConfigurationError::IncompatibleLinearSolver {
                strategy: strategy.name(),
                class: constraint.name(),
            })
        }
    }
}

impl FromStr for LinearSolverStrategy {
    type Err = ConfigurationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lsq" => Ok(LinearSolverStrategy::Lsq),
            "bvls" => Ok(LinearSolverStrategy::Bvls),
            "fnnls" => Ok(LinearSolverStrategy::Fnnls),
            "nnls" => Ok(LinearSolverStrategy::Nnls),
            "lsqlin" | "interior-point" => Err(ConfigurationError::Unavailable {
                option: "linear solver",
                name: name.to_string(),
            }),
            _ => Err(ConfigurationError::UnknownName {
                option: "linear solver",
                name: name.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for LinearSolverStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Iteration budget and tolerance of the constrained linear solvers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearSolverSettings {
    /// maximum number of active set changes
    pub max_iter: usize,
    /// relative tolerance on the gradient of the objective for the optimality check
    pub tolerance: f64,
}

impl Default for LinearSolverSettings {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            tolerance: 1e-10,
        }
    }
}

/// A (possibly penalized) linear least squares problem.
#[derive(Debug, Clone, Copy)]
pub struct LinearSubproblem<'a> {
    /// the matrix `$\boldsymbol{A}$`
    pub design: &'a DMatrix<f64>,
    /// the data `$\vec{y}$`
    pub data: &'a DVector<f64>,
    /// the regularization parameter and the (weighted) penalty operator, if penalized
    pub penalty: Option<(f64, &'a DMatrix<f64>)>,
}

impl<'a> LinearSubproblem<'a> {
    /// an unpenalized problem
    pub fn new(design: &'a DMatrix<f64>, data: &'a DVector<f64>) -> Self {
        Self {
            design,
            data,
            penalty: None,
        }
    }

    /// add the penalty `$\alpha^2||\boldsymbol{L}\vec{x}||^2$`
    pub fn with_penalty(self, alpha: f64, operator: &'a DMatrix<f64>) -> Self {
        Self {
            penalty: Some((alpha, operator)),
            ..self
        }
    }

    /// the augmented design `$[\boldsymbol{A};\alpha\boldsymbol{L}]$` and data `$[\vec{y};\vec{0}]$`
    pub fn augmented(&self) -> (DMatrix<f64>, DVector<f64>) {
        match self.penalty {
            None => (self.design.clone(), self.data.clone()),
            Some((alpha, operator)) => (
                concat_rowwise(self.design, &(operator * alpha)),
                concat_vectors(self.data, &DVector::zeros(operator.nrows())),
            ),
        }
    }

    /// the normal equation components `$(\boldsymbol{K},\vec{f})$`
    #[allow(non_snake_case)]
    pub fn normal_equations(&self) -> (DMatrix<f64>, DVector<f64>) {
        let At = self.design.transpose();
        let mut K = &At * self.design;
        if let Some((alpha, operator)) = self.penalty {
            K += operator.transpose() * operator * (alpha * alpha);
        }
        (K, At * self.data)
    }
}

/// Solve the linear subproblem with the given strategy. The result is projected onto
/// the bounds, so it is feasible even if the solver stops within its tolerance
/// outside of the box.
///
/// # Errors
///
/// * [DivergenceError::LinearSolver] if an active set method exceeds its iteration budget
/// * [DivergenceError::NonFiniteSolution] if the solution is not finite
pub fn solve_linear_subproblem(
    strategy: LinearSolverStrategy,
    subproblem: &LinearSubproblem<'_>,
    bounds: &Bounds,
    settings: &LinearSolverSettings,
) -> Result<DVector<f64>, DivergenceError> {
    let solution = match strategy {
        LinearSolverStrategy::Lsq => {
            let (design, data) = subproblem.augmented();
            solve_least_squares(&design, &data)
        }
        LinearSolverStrategy::Nnls => {
            let (design, data) = subproblem.augmented();
            active_set_nnls(NnlsSystem::Design(&design, &data), settings, strategy)?
        }
        LinearSolverStrategy::Fnnls => {
            let (normal, rhs) = subproblem.normal_equations();
            active_set_nnls(NnlsSystem::Normal(&normal, &rhs), settings, strategy)?
        }
        LinearSolverStrategy::Bvls => {
            let (normal, rhs) = subproblem.normal_equations();
            bounded_variable_least_squares(&normal, &rhs, bounds, settings)?
        }
    };
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(DivergenceError::NonFiniteSolution);
    }
    Ok(bounds.project(&solution))
}

/// The system a non-negative least squares problem is formulated with.
enum NnlsSystem<'a> {
    /// design matrix `$\boldsymbol{C}$` and data `$\vec{d}$`
    Design(&'a DMatrix<f64>, &'a DVector<f64>),
    /// cross products `$\boldsymbol{C}^T\boldsymbol{C}$` and `$\boldsymbol{C}^T\vec{d}$`
    Normal(&'a DMatrix<f64>, &'a DVector<f64>),
}

impl NnlsSystem<'_> {
    fn ncols(&self) -> usize {
        match self {
            NnlsSystem::Design(design, _) => design.ncols(),
            NnlsSystem::Normal(normal, _) => normal.ncols(),
        }
    }

    /// the negative gradient `$\boldsymbol{C}^T(\vec{d}-\boldsymbol{C}\vec{x})$`
    fn negative_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        match self {
            NnlsSystem::Design(design, data) => design.tr_mul(&(*data - *design * x)),
            NnlsSystem::Normal(normal, rhs) => *rhs - *normal * x,
        }
    }

    /// the unconstrained least squares solution using only the passive columns
    fn solve_passive(&self, passive: &[usize]) -> DVector<f64> {
        match self {
            NnlsSystem::Design(design, data) => {
                solve_least_squares(&design.select_columns(passive), data)
            }
            NnlsSystem::Normal(normal, rhs) => solve_least_squares(
                &normal.select_rows(passive).select_columns(passive),
                &rhs.select_rows(passive),
            ),
        }
    }
}

/// The active set algorithm of Lawson and Hanson. Formulated with the normal
/// equations, this is the algorithm of Bro and de Jong.
fn active_set_nnls(
    system: NnlsSystem<'_>,
    settings: &LinearSolverSettings,
    strategy: LinearSolverStrategy,
) -> Result<DVector<f64>, DivergenceError> {
    let n = system.ncols();
    let mut x = DVector::<f64>::zeros(n);
    let mut passive = vec![false; n];
    let mut w = system.negative_gradient(&x);
    let tolerance = settings.tolerance * w.amax().max(1.);
    let mut iterations = 0;
    let diverged = || DivergenceError::LinearSolver {
        strategy: strategy.name(),
        iterations: settings.max_iter,
    };

    loop {
        // the most promising active variable
        let entering = (0..n)
            .filter(|&j| !passive[j] && w[j] > tolerance)
            .max_by(|&a, &b| w[a].total_cmp(&w[b]));
        let Some(entering) = entering else {
            break;
        };
        passive[entering] = true;

        loop {
            iterations += 1;
            if iterations > settings.max_iter {
                return Err(diverged());
            }
            let indices: Vec<usize> = (0..n).filter(|&j| passive[j]).collect();
            let s_passive = system.solve_passive(&indices);
            if s_passive.iter().all(|&s| s > 0.) {
                x.fill(0.);
                for (&j, &s) in indices.iter().zip(s_passive.iter()) {
                    x[j] = s;
                }
                break;
            }
            // step towards s until the first passive variable hits zero
            let step = indices
                .iter()
                .zip(s_passive.iter())
                .filter(|(_, &s)| s <= 0.)
                .map(|(&j, &s)| if x[j] > s { x[j] / (x[j] - s) } else { 0. })
                .fold(f64::INFINITY, f64::min);
            for (&j, &s) in indices.iter().zip(s_passive.iter()) {
                x[j] += step * (s - x[j]);
            }
            let zero_threshold = f64::EPSILON * x.amax().max(1.);
            for &j in &indices {
                if x[j] <= zero_threshold {
                    x[j] = 0.;
                    passive[j] = false;
                }
            }
            if !passive.iter().any(|&p| p) {
                break;
            }
        }
        w = system.negative_gradient(&x);
        // the entering variable must not immediately re-enter if it was dropped again
        if !passive[entering] {
            w[entering] = w[entering].min(0.);
        }
    }
    log::trace!("{strategy} converged after {iterations} iterations");
    Ok(x)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VariableState {
    Free,
    AtLower,
    AtUpper,
}

/// Bounded variable least squares after Stark and Parker, formulated as an active set
/// method for the quadratic program `$\min \frac{1}{2}\vec{x}^T\boldsymbol{K}\vec{x}-\vec{f}^T\vec{x}$`
/// subject to the box constraints.
#[allow(non_snake_case)]
fn bounded_variable_least_squares(
    K: &DMatrix<f64>,
    f: &DVector<f64>,
    bounds: &Bounds,
    settings: &LinearSolverSettings,
) -> Result<DVector<f64>, DivergenceError> {
    let n = f.len();
    let (lower, upper) = (bounds.lower(), bounds.upper());
    let mut state = Vec::with_capacity(n);
    let mut x = DVector::<f64>::zeros(n);
    for j in 0..n {
        if lower[j].is_finite() {
            state.push(VariableState::AtLower);
            x[j] = lower[j];
        } else if upper[j].is_finite() {
            state.push(VariableState::AtUpper);
            x[j] = upper[j];
        } else {
            state.push(VariableState::Free);
        }
    }
    let tolerance = settings.tolerance * f.amax().max(1.);
    let mut iterations = 0;
    // an entering variable that is pushed straight back to its bound is not
    // selected again until some other step makes progress
    let mut excluded: Option<usize> = None;

    loop {
        // make the free variables optimal while staying feasible
        loop {
            iterations += 1;
            if iterations > settings.max_iter {
                return Err(DivergenceError::LinearSolver {
                    strategy: LinearSolverStrategy::Bvls.name(),
                    iterations: settings.max_iter,
                });
            }
            let free: Vec<usize> = (0..n)
                .filter(|&j| state[j] == VariableState::Free)
                .collect();
            if free.is_empty() {
                break;
            }
            let bound: Vec<usize> = (0..n)
                .filter(|&j| state[j] != VariableState::Free)
                .collect();
            let mut rhs = f.select_rows(&free);
            if !bound.is_empty() {
                rhs -= K.select_rows(&free).select_columns(&bound) * x.select_rows(&bound);
            }
            let z = solve_least_squares(&K.select_rows(&free).select_columns(&free), &rhs);

            let mut step: f64 = 1.;
            for (&j, &zj) in free.iter().zip(z.iter()) {
                if zj < lower[j] {
                    step = step.min((x[j] - lower[j]) / (x[j] - zj));
                } else if zj > upper[j] {
                    step = step.min((upper[j] - x[j]) / (zj - x[j]));
                }
            }
            let step = step.max(0.);
            if step > 0. {
                excluded = None;
            }
            for (&j, &zj) in free.iter().zip(z.iter()) {
                x[j] += step * (zj - x[j]);
                let slack = |bound: f64| f64::EPSILON.sqrt() * bound.abs().max(1.);
                if zj < lower[j] && x[j] <= lower[j] + slack(lower[j]) {
                    x[j] = lower[j];
                    state[j] = VariableState::AtLower;
                } else if zj > upper[j] && x[j] >= upper[j] - slack(upper[j]) {
                    x[j] = upper[j];
                    state[j] = VariableState::AtUpper;
                }
            }
            if step >= 1. {
                break;
            }
        }

        let w = f - K * &x;
        let entering = (0..n)
            .filter(|&j| Some(j) != excluded)
            .filter_map(|j| match state[j] {
                VariableState::AtLower if w[j] > tolerance => Some((j, w[j])),
                VariableState::AtUpper if w[j] < -tolerance => Some((j, -w[j])),
                _ => None,
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(j, _)| j);
        let Some(entering) = entering else {
            break;
        };
        state[entering] = VariableState::Free;
        excluded = Some(entering);
    }
    log::trace!("bvls converged after {iterations} iterations");
    Ok(x)
}

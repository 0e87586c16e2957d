use crate::bounds::{Bounds, ConstraintClass};
use crate::error::{InputError, SnllsError};
use crate::model::ForwardOperator;
use nalgebra::{DMatrix, DVector};

mod builder;

pub use builder::SnllsProblemBuilder;

/// A separable nonlinear least squares problem
///
/// ```math
/// \min_{\vec{p},\vec{x}} ||\boldsymbol{A}(\vec{p})\vec{x}-\vec{y}||^2
/// \quad \text{s.t.} \quad \vec{l}_p \leq \vec{p} \leq \vec{u}_p,\;\vec{l}_x \leq \vec{x} \leq \vec{u}_x
/// ```
///
/// consisting of the forward operator `$\boldsymbol{A}(\vec{p})$`, the observations
/// `$\vec{y}$`, an initial guess for the nonlinear parameters and the (validated) bounds
/// of both parameter groups.
///
/// # Construction
///
/// Use the [SnllsProblemBuilder] to create an instance. All data are validated
/// when the problem is built, so a problem is always consistent.
///
/// # Usage
///
/// Pass the problem to [`SnllsSolver::fit`](crate::solvers::levmar::SnllsSolver::fit).
/// The problem is not modified by fitting, so it can be fitted repeatedly, for example
/// with different options.
#[derive(Debug, Clone)]
pub struct SnllsProblem<Model>
where
    Model: ForwardOperator,
{
    pub(crate) model: Model,
    pub(crate) observations: DVector<f64>,
    pub(crate) initial_guess: DVector<f64>,
    pub(crate) nonlinear_bounds: Bounds,
    pub(crate) linear_bounds: Bounds,
    /// the constraint pattern, frozen when the problem is built
    pub(crate) constraints: ConstraintClass,
    /// shape of the operator at the initial guess
    pub(crate) operator_shape: (usize, usize),
}

impl<Model> SnllsProblem<Model>
where
    Model: ForwardOperator,
{
    /// the forward operator of this problem
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// the observations `$\vec{y}$`
    pub fn observations(&self) -> &DVector<f64> {
        &self.observations
    }

    /// the initial guess for the nonlinear parameters
    pub fn initial_guess(&self) -> &DVector<f64> {
        &self.initial_guess
    }

    /// the bounds of the nonlinear parameters, where missing bounds are infinite
    pub fn nonlinear_bounds(&self) -> &Bounds {
        &self.nonlinear_bounds
    }

    /// the bounds of the linear coefficients, where missing bounds are infinite
    pub fn linear_bounds(&self) -> &Bounds {
        &self.linear_bounds
    }

    /// the constraint classification of both parameter groups
    pub fn constraints(&self) -> ConstraintClass {
        self.constraints
    }

    /// number of nonlinear parameters `$W$`
    pub fn nonlinear_count(&self) -> usize {
        self.initial_guess.len()
    }

    /// number of linear coefficients `$M$`
    pub fn linear_count(&self) -> usize {
        self.operator_shape.1
    }

    /// number of observations `$N$`
    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    /// Evaluate the forward operator and check that it keeps its shape and stays finite.
    pub(crate) fn operator(&self, params: &DVector<f64>) -> Result<DMatrix<f64>, SnllsError> {
        let operator = self
            .model
            .eval(params)
            .map_err(|err| SnllsError::Model(err.to_string()))?;
        if operator.shape() != self.operator_shape {
            return Err(InputError::ShapeChanged {
                expected: self.operator_shape,
                actual: operator.shape(),
            }
            .into());
        }
        if operator.iter().any(|v| !v.is_finite()) {
            log::debug!("forward operator is not finite at {:?}", params.as_slice());
            return Err(InputError::NonFiniteOperator.into());
        }
        Ok(operator)
    }
}

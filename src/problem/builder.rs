use crate::bounds::{Bounds, ConstraintClass};
use crate::error::{InputError, ParameterGroup, SnllsError};
use crate::model::ForwardOperator;
use crate::problem::SnllsProblem;
use nalgebra::DVector;


/// A builder structure to create a [SnllsProblem].
///
/// # Example
///
/// ```rust
/// use nalgebra::{DMatrix, DVector};
/// use snlls::prelude::*;
/// # fn main() -> Result<(), SnllsError> {
/// let t = DVector::from_fn(20, |i, _| i as f64 / 10.);
/// let operator = move |p: &DVector<f64>| {
///     let mut a = DMatrix::zeros(t.len(), 2);
///     a.set_column(0, &t.map(|t| (-p[0] * t).exp()));
///     a.set_column(1, &t);
///     a
/// };
/// let y = DVector::from_element(20, 1.);
/// let problem = SnllsProblemBuilder::new(operator)
///     .observations(y)
///     .initial_guess(DVector::from_element(1, 0.5))
///     .nonlinear_bounds(DVector::from_element(1, 0.), DVector::from_element(1, 5.))
///     .build()?;
/// assert_eq!(problem.linear_count(), 2);
/// # Ok(())
/// # }
/// ```
///
/// # Building a Problem
///
/// The observations and the initial guess are mandatory. Bounds are optional, and an
/// empty vector for either side of the bounds means that side is unbounded. The
/// [build](SnllsProblemBuilder::build) method validates all data and evaluates the
/// forward operator once at the initial guess to determine the number of linear
/// coefficients.
#[derive(Clone)]
pub struct SnllsProblemBuilder<Model>
where
    Model: ForwardOperator,
{
    /// Required: the forward operator
    model: Model,
    /// Required: the data `$\vec{y}$` that we want to fit
    observations: Option<DVector<f64>>,
    /// Required: the starting point for the nonlinear parameters
    initial_guess: Option<DVector<f64>>,
    /// Optional: lower and upper bounds of the nonlinear parameters
    nonlinear_bounds: (DVector<f64>, DVector<f64>),
    /// Optional: lower and upper bounds of the linear coefficients
    linear_bounds: (DVector<f64>, DVector<f64>),
}

impl<Model> SnllsProblemBuilder<Model>
where
    Model: ForwardOperator,
{
    /// Create a new builder for the given forward operator.
    pub fn new(model: Model) -> Self {
        Self {
            model,
            observations: None,
            initial_guess: None,
            nonlinear_bounds: (DVector::zeros(0), DVector::zeros(0)),
            linear_bounds: (DVector::zeros(0), DVector::zeros(0)),
        }
    }

    /// **Mandatory**: Set the data `$\vec{y}$` which we want to fit. The length must
    /// equal the number of rows of the forward operator.
    pub fn observations(self, observations: DVector<f64>) -> Self {
        Self {
            observations: Some(observations),
            ..self
        }
    }

    /// **Mandatory**: Set the initial guess for the nonlinear parameters `$\vec{p}$`.
    pub fn initial_guess(self, initial_guess: DVector<f64>) -> Self {
        Self {
            initial_guess: Some(initial_guess),
            ..self
        }
    }

    /// **Optional**: Set lower and upper bounds for the nonlinear parameters. Use infinite
    /// values for unbounded parameters, or an empty vector for an unbounded side.
    pub fn nonlinear_bounds(self, lower: DVector<f64>, upper: DVector<f64>) -> Self {
        Self {
            nonlinear_bounds: (lower, upper),
            ..self
        }
    }

    /// **Optional**: Set lower and upper bounds for the linear coefficients. Use infinite
    /// values for unbounded coefficients, or an empty vector for an unbounded side.
    pub fn linear_bounds(self, lower: DVector<f64>, upper: DVector<f64>) -> Self {
        Self {
            linear_bounds: (lower, upper),
            ..self
        }
    }

    /// Build the problem.
    ///
    /// # Errors
    ///
    /// * [SnllsError::InvalidInput] if mandatory data are missing, empty, not finite, or
    ///   the forward operator does not fit the observations
    /// * [SnllsError::Bounds] if bounds are inconsistent or the initial guess violates them
    /// * [SnllsError::Model] if the forward operator fails at the initial guess
    pub fn build(self) -> Result<SnllsProblem<Model>, SnllsError> {
        let Self {
            model,
            observations,
            initial_guess,
            nonlinear_bounds: (lb, ub),
            linear_bounds: (lbl, ubl),
        } = self;

        let observations = observations.ok_or(InputError::MissingObservations)?;
        let initial_guess = initial_guess.ok_or(InputError::MissingInitialGuess)?;
        if observations.is_empty() {
            return Err(InputError::EmptyObservations.into());
        }
        if initial_guess.is_empty() {
            return Err(InputError::EmptyInitialGuess.into());
        }
        if let Some(index) = observations.iter().position(|y| !y.is_finite()) {
            return Err(InputError::NonFiniteObservation { index }.into());
        }
        if let Some(index) = initial_guess.iter().position(|p| !p.is_finite()) {
            return Err(InputError::NonFiniteInitialGuess { index }.into());
        }

        let nonlinear_bounds =
            Bounds::try_new(ParameterGroup::Nonlinear, lb, ub, initial_guess.len())?;
        nonlinear_bounds.check_initial_guess(&initial_guess)?;

        let operator = model
            .eval(&initial_guess)
            .map_err(|err| SnllsError::Model(err.to_string()))?;
        if operator.nrows() != observations.len() {
            return Err(InputError::RowCountMismatch {
                rows: operator.nrows(),
                observations: observations.len(),
            }
            .into());
        }
        if operator.ncols() == 0 {
            return Err(InputError::NoLinearParameters.into());
        }
        if operator.iter().any(|a| !a.is_finite()) {
            return Err(InputError::NonFiniteOperator.into());
        }

        let linear_bounds = Bounds::try_new(ParameterGroup::Linear, lbl, ubl, operator.ncols())?;
        let constraints = ConstraintClass::classify(&nonlinear_bounds, &linear_bounds);

        Ok(SnllsProblem {
            model,
            observations,
            initial_guess,
            nonlinear_bounds,
            linear_bounds,
            constraints,
            operator_shape: operator.shape(),
        })
    }
}

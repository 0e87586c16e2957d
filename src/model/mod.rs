use nalgebra::{DMatrix, DVector};
use std::convert::Infallible;

#[cfg(test)]
pub mod test;

/// Represents the forward operator `$\boldsymbol{A}(\vec{p})$` of a separable model
///
/// # Introduction
///
/// A separable model writes the predicted signal as
/// ```math
/// \vec{y} \approx \boldsymbol{A}(\vec{p})\,\vec{x},
/// ```
/// where `$\vec{p}$` are the *nonlinear* parameters and `$\vec{x}$` are the *linear*
/// coefficients. The forward operator maps the nonlinear parameters onto a matrix with
/// one row per data point and one column per linear coefficient. What the columns mean
/// (kernels, basis functions, dictionary atoms) is of no concern to this crate.
///
/// # Contract
///
/// * The operator must be pure and deterministic: the same parameters produce the
///   same matrix. The solver calls it once per residual evaluation, a couple of times
///   per finite difference probe and once more per nonlinear parameter when estimating
///   the uncertainty at the optimum.
/// * The number of rows must equal the number of observations and the number of columns
///   must not change between calls.
/// * No derivatives are required. Derivatives with respect to the nonlinear parameters are
///   obtained numerically.
///
/// # Closures
///
/// Every function or closure `Fn(&DVector<f64>) -> DMatrix<f64>` is a forward operator
/// that cannot fail:
///
/// ```rust
/// use nalgebra::{DMatrix, DVector};
/// use snlls::model::ForwardOperator;
/// let t = DVector::from_vec(vec![0., 1., 2.]);
/// let operator = move |p: &DVector<f64>| {
///     let mut a = DMatrix::zeros(t.len(), 2);
///     a.set_column(0, &t.map(|t| (-p[0] * t).exp()));
///     a.set_column(1, &t);
///     a
/// };
/// let a = operator.eval(&DVector::from_element(1, 0.5)).unwrap();
/// assert_eq!(a.shape(), (3, 2));
/// ```
///
/// Fallible operators implement the trait by hand and specify their error type.
pub trait ForwardOperator {
    /// the associated error type that can occur when the operator is evaluated.
    /// Use [`std::convert::Infallible`] if the evaluation cannot fail.
    type Error: std::error::Error;

    /// evaluate the operator `$\boldsymbol{A}(\vec{p})$` at the given nonlinear parameters
    fn eval(&self, params: &DVector<f64>) -> Result<DMatrix<f64>, Self::Error>;
}

impl<F> ForwardOperator for F
where
    F: Fn(&DVector<f64>) -> DMatrix<f64>,
{
    type Error = Infallible;

    fn eval(&self, params: &DVector<f64>) -> Result<DMatrix<f64>, Self::Error> {
        Ok(self(params))
    }
}

use nalgebra::{DMatrix, DVector};
use snlls::model::ForwardOperator;
use std::convert::Infallible;

/// The forward operator `$\boldsymbol{A}(p) = [\exp(-p\,\vec{t}), \vec{t}]$` of an exponential
/// decay plus a linear term. It has one nonlinear parameter and two linear coefficients
/// and is well conditioned for moderate decay rates.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialWithLinearTerm {
    t: DVector<f64>,
}

impl ExponentialWithLinearTerm {
    /// create the operator on the given time grid
    pub fn new(t: DVector<f64>) -> Self {
        Self { t }
    }

    /// the time grid
    pub fn t(&self) -> &DVector<f64> {
        &self.t
    }
}

impl ForwardOperator for ExponentialWithLinearTerm {
    type Error = Infallible;

    fn eval(&self, params: &DVector<f64>) -> Result<DMatrix<f64>, Self::Error> {
        let rate = params[0];
        let mut operator = DMatrix::zeros(self.t.len(), 2);
        operator.set_column(0, &self.t.map(|t| (-rate * t).exp()));
        operator.set_column(1, &self.t);
        Ok(operator)
    }
}

/// A gaussian blur `$A_{ij} = \exp(-(t_i-c_j)^2/(2p^2))$` that maps the intensities at
/// equidistant centers `$c_j$` onto the grid `$t_i$`. The width `$p$` is the only
/// nonlinear parameter. For widths larger than the spacing of the centers the operator
/// is severely ill-conditioned.
#[derive(Clone, Debug, PartialEq)]
pub struct GaussianBlur {
    t: DVector<f64>,
    centers: DVector<f64>,
}

impl GaussianBlur {
    /// create the blur from the grid onto the given centers
    pub fn new(t: DVector<f64>, centers: DVector<f64>) -> Self {
        Self { t, centers }
    }

    /// the centers of the blurred intensities
    pub fn centers(&self) -> &DVector<f64> {
        &self.centers
    }
}

impl ForwardOperator for GaussianBlur {
    type Error = Infallible;

    fn eval(&self, params: &DVector<f64>) -> Result<DMatrix<f64>, Self::Error> {
        let width = params[0];
        Ok(DMatrix::from_fn(self.t.len(), self.centers.len(), |i, j| {
            let distance = self.t[i] - self.centers[j];
            (-distance * distance / (2. * width * width)).exp()
        }))
    }
}

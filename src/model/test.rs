use super::ForwardOperator;
use mockall::mock;
use nalgebra::{DMatrix, DVector};
use std::convert::Infallible;

mock! {
    pub Operator {}
    impl ForwardOperator for Operator {
        type Error = Infallible;
        fn eval(&self, params: &DVector<f64>) -> Result<DMatrix<f64>, Infallible>;
    }
}

/// a forward operator that always fails
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingOperator;

/// the error of the [FailingOperator]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorFailure;

impl std::fmt::Display for OperatorFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operator failure")
    }
}

impl std::error::Error for OperatorFailure {}

impl ForwardOperator for FailingOperator {
    type Error = OperatorFailure;

    fn eval(&self, _params: &DVector<f64>) -> Result<DMatrix<f64>, Self::Error> {
        Err(OperatorFailure)
    }
}

#[test]
fn closures_are_infallible_forward_operators() {
    let t = DVector::from_vec(vec![0., 1., 2., 3.]);
    let operator = |p: &DVector<f64>| {
        let mut a = DMatrix::zeros(t.len(), 2);
        a.set_column(0, &t.map(|t| (-p[0] * t).exp()));
        a.set_column(1, &t);
        a
    };
    let a = operator
        .eval(&DVector::from_element(1, 0.))
        .expect("closure evaluation must not fail");
    assert_eq!(a.column(0), DVector::from_element(4, 1.));
    assert_eq!(a.column(1), t);
}

#[test]
fn mocked_operator_returns_scripted_matrix() {
    let mut operator = MockOperator::new();
    operator
        .expect_eval()
        .times(1)
        .returning(|p| Ok(DMatrix::from_element(2, 2, p[0])));
    let a = operator.eval(&DVector::from_element(1, 3.)).unwrap();
    assert_eq!(a, DMatrix::from_element(2, 2, 3.));
}

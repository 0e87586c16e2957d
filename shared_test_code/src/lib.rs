#![warn(missing_docs)]
//! a helper crate which carries common code used by the benchtests and the
//! integration tests.
use nalgebra::{DVector, Scalar};
use num_traits::Float;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use snlls::model::ForwardOperator;

/// forward operators used in the tests and benchmarks
pub mod models;

/// create holding `count` the elements from range [first,last] with linear spacing. (equivalent to matlabs linspace)
pub fn linspace<ScalarType: Float + Scalar>(
    first: ScalarType,
    last: ScalarType,
    count: usize,
) -> DVector<ScalarType> {
    if count < 2 {
        return DVector::from_element(count, first);
    }
    let n_minus_one = ScalarType::from(count - 1).expect("Could not convert usize to Float");
    let lin: Vec<ScalarType> = (0..count)
        .map(|n| {
            first
                + (last - first) / (n_minus_one)
                    * ScalarType::from(n).expect("Could not convert usize to Float")
        })
        .collect();
    DVector::from(lin)
}

/// evaluate the signal `$\boldsymbol{A}(\vec{p})\vec{x}$` of a forward operator with
/// (nonlinear) parameters `params` and linear coefficients `linear_coeffs`.
pub fn evaluate_complete_model<Model>(
    model: &Model,
    params: &DVector<f64>,
    linear_coeffs: &DVector<f64>,
) -> DVector<f64>
where
    Model: ForwardOperator,
{
    let operator = model.eval(params).expect("model evaluation must succeed");
    operator * linear_coeffs
}

/// add independent gaussian noise with standard deviation `sigma` to the data. The noise
/// only depends on the seed.
pub fn add_gaussian_noise(data: &DVector<f64>, sigma: f64, seed: u64) -> DVector<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0., sigma).expect("standard deviation must be valid");
    data.map(|value| value + normal.sample(&mut rng))
}

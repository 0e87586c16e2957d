use super::{exponential_data, exponential_model};
use approx::assert_relative_eq;
use nalgebra::{dvector, DMatrix, DVector};
use shared_test_code::{add_gaussian_noise, linspace};
use snlls::prelude::*;

#[test]
fn uncertainty_is_ordered_nonlinear_first() {
    let model = exponential_model();
    let y = add_gaussian_noise(&exponential_data(&model), 0.05, 1);
    let problem = SnllsProblemBuilder::new(model)
        .observations(y)
        .initial_guess(dvector![1.3])
        .nonlinear_bounds(dvector![0.01], dvector![10.])
        .build()
        .unwrap();
    let (fit, uncertainty) = SnllsSolver::default()
        .fit_with_uncertainty(&problem)
        .unwrap();
    assert_eq!(uncertainty.nonlinear_count(), 1);
    assert_eq!(uncertainty.covariance().shape(), (3, 3));
    assert_eq!(uncertainty.mean()[0], fit.nonlinear_parameters()[0]);
    assert_eq!(uncertainty.mean().rows(1, 2), fit.linear_coefficients().rows(0, 2));
    assert_eq!(uncertainty.lower()[0], 0.01);
    assert_eq!(uncertainty.upper()[0], 10.);
    assert_eq!(uncertainty.inversion(), Inversion::Regular);
    assert_relative_eq!(uncertainty.noise_variance(), 0.0025, max_relative = 0.5);
    let correlation = uncertainty.correlation_matrix();
    assert!(correlation.iter().all(|c| c.abs() <= 1. + 1e-12));
}

#[test]
fn confidence_intervals_cover_every_true_parameter() {
    let model = exponential_model();
    let clean = exponential_data(&model);
    let truth = [1., 2., 0.5];
    let mut covered = [0; 3];
    for seed in 0..100 {
        let problem = SnllsProblemBuilder::new(model.clone())
            .observations(add_gaussian_noise(&clean, 0.05, seed))
            .initial_guess(dvector![1.3])
            .nonlinear_bounds(dvector![0.01], dvector![10.])
            .build()
            .unwrap();
        let (_, uncertainty) = SnllsSolver::default()
            .fit_with_uncertainty(&problem)
            .unwrap();
        let (lower, upper) = uncertainty.confidence_interval(95.).unwrap();
        for (i, &value) in truth.iter().enumerate() {
            if lower[i] <= value && value <= upper[i] {
                covered[i] += 1;
            }
        }
    }
    for (i, count) in covered.iter().enumerate() {
        assert!(
            *count >= 90,
            "only {count} of 100 intervals cover parameter {i}"
        );
    }
}

#[test]
fn uncertainty_of_an_optimum_on_a_bound_stays_within_the_domain() {
    // the model is undefined for negative decay rates and the data have decay rate zero
    let t = linspace(0., 2., 50);
    let tt = t.clone();
    let operator = move |p: &DVector<f64>| {
        let mut a = DMatrix::zeros(tt.len(), 2);
        a.set_column(0, &tt.map(|t| (-p[0].sqrt() * t).exp()));
        a.set_column(1, &tt);
        a
    };
    let y = add_gaussian_noise(&t.map(|t| 2. + 0.5 * t), 0.01, 23);
    let problem = SnllsProblemBuilder::new(operator)
        .observations(y)
        .initial_guess(dvector![1.])
        .nonlinear_bounds(dvector![0.], dvector![f64::INFINITY])
        .build()
        .unwrap();
    let (fit, uncertainty) = SnllsSolver::default()
        .fit_with_uncertainty(&problem)
        .unwrap();
    assert!(fit.nonlinear_parameters()[0] >= 0.);
    assert!(uncertainty.covariance().iter().all(|c| c.is_finite()));
    let (lower, upper) = uncertainty.confidence_interval(95.).unwrap();
    assert!(lower[0] >= 0.);
    assert!(lower.iter().zip(upper.iter()).all(|(l, u)| l <= u));
}

#[test]
fn parameter_without_influence_gives_pseudo_inverse_covariance() {
    // the operator does not depend on its nonlinear parameter
    let t = linspace(0., 2., 50);
    let tt = t.clone();
    let operator = move |_: &DVector<f64>| {
        let mut a = DMatrix::from_element(tt.len(), 2, 1.);
        a.set_column(0, &tt);
        a
    };
    let y = add_gaussian_noise(&t.map(|t| 0.5 * t + 1.), 0.05, 5);
    let problem = SnllsProblemBuilder::new(operator)
        .observations(y)
        .initial_guess(dvector![1.])
        .build()
        .unwrap();
    let (fit, uncertainty) = SnllsSolver::default()
        .fit_with_uncertainty(&problem)
        .unwrap();
    assert_eq!(fit.nonlinear_parameters(), &dvector![1.]);
    assert_eq!(uncertainty.inversion(), Inversion::PseudoInverse);
    assert!(uncertainty.covariance().iter().all(|c| c.is_finite()));
    assert!(uncertainty.covariance()[(0, 0)].abs() < 1e-12);
}

#[test]
fn hccm_estimators_agree_with_classical_covariance_for_homoscedastic_noise() {
    // a balanced two point design, so all leverages are equal
    let n = 400;
    let jacobian = DMatrix::from_fn(n, 2, |i, j| match (j, i % 2) {
        (0, _) => 1.,
        (_, 0) => -1.,
        _ => 1.,
    });
    let clean = &jacobian * dvector![1., 2.];
    let y = add_gaussian_noise(&clean, 0.3, 17);
    let estimate = jacobian
        .clone()
        .svd(true, true)
        .solve(&y, 1e-12)
        .unwrap();
    let residuals = &y - &jacobian * &estimate;

    let classical = UncertaintyQuantification::from_jacobian(
        &jacobian,
        &residuals,
        estimate,
        DVector::from_element(2, f64::NEG_INFINITY),
        DVector::from_element(2, f64::INFINITY),
    )
    .unwrap();
    for estimator in HcEstimator::ALL {
        let robust = hccm(&jacobian, &residuals, estimator).unwrap();
        for i in 0..2 {
            assert_relative_eq!(
                robust.covariance[(i, i)],
                classical.covariance()[(i, i)],
                max_relative = 0.05
            );
        }
        assert_relative_eq!(robust.leverages.sum(), 2., epsilon = 1e-10);
    }
}

#[test]
fn hccm_weights_high_leverage_observations_more_strongly() {
    // thirty points in [0, 1] and one far outlier
    let x = DVector::from_fn(31, |i, _| if i < 30 { i as f64 / 29. } else { 10. });
    let jacobian = DMatrix::from_fn(x.len(), 2, |i, j| if j == 0 { 1. } else { x[i] });
    let residuals = DVector::from_fn(x.len(), |i, _| if i % 2 == 0 { 0.1 } else { -0.1 });
    let hc0 = hccm(&jacobian, &residuals, HcEstimator::Hc0).unwrap();
    let hc2 = hccm(&jacobian, &residuals, HcEstimator::Hc2).unwrap();
    let hc3 = hccm(&jacobian, &residuals, HcEstimator::Hc3).unwrap();
    let hc4 = hccm(&jacobian, &residuals, HcEstimator::Hc4).unwrap();
    let slope = (1, 1);
    assert!(hc0.covariance[slope] < hc2.covariance[slope]);
    assert!(hc2.covariance[slope] < hc3.covariance[slope]);
    assert!(hc3.covariance[slope] < hc4.covariance[slope]);
    assert!(hc0.leverages[30] > 0.9);
}

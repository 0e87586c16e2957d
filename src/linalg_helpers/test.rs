use super::*;
use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};

#[test]
fn condition_number_of_diagonal_matrix_is_ratio_of_extreme_entries() {
    let a = DMatrix::from_diagonal(&DVector::from_vec(vec![8., 2., 0.5]));
    assert_relative_eq!(condition_number(&a), 16., epsilon = 1e-12);
}

#[test]
fn rank_deficient_and_wide_matrices_have_infinite_condition_number() {
    let rank_deficient = DMatrix::from_row_slice(3, 2, &[1., 2., 2., 4., 3., 6.]);
    assert!(condition_number(&rank_deficient).is_infinite());
    let wide = DMatrix::from_row_slice(2, 3, &[1., 0., 0., 0., 1., 0.]);
    assert!(condition_number(&wide).is_infinite());
}

#[test]
fn conditioning_detector_uses_threshold_of_ten() {
    let well = DMatrix::from_diagonal(&DVector::from_vec(vec![10., 1.]));
    assert_eq!(Conditioning::of(&well), Conditioning::WellConditioned);
    let ill = DMatrix::from_diagonal(&DVector::from_vec(vec![10.5, 1.]));
    assert_eq!(Conditioning::of(&ill), Conditioning::IllConditioned);
    assert!(Conditioning::of(&ill).is_ill_conditioned());
}

#[test]
fn regular_matrix_is_inverted_exactly() {
    let a = DMatrix::from_row_slice(2, 2, &[4., 1., 1., 3.]);
    let (inverse, inversion) = inverse_or_pseudo_inverse(&a);
    assert_eq!(inversion, Inversion::Regular);
    assert_relative_eq!(&a * inverse, DMatrix::identity(2, 2), epsilon = 1e-12);
}

#[test]
fn singular_matrix_falls_back_to_pseudo_inverse() {
    let a = DMatrix::from_row_slice(2, 2, &[1., 2., 2., 4.]);
    let (pinv, inversion) = inverse_or_pseudo_inverse(&a);
    assert_eq!(inversion, Inversion::PseudoInverse);
    // moore-penrose conditions
    assert_relative_eq!(&a * &pinv * &a, a, epsilon = 1e-12);
    assert_relative_eq!(&pinv * &a * &pinv, pinv, epsilon = 1e-12);
    assert!(pinv.iter().all(|v| v.is_finite()));
}

#[test]
fn least_squares_solution_matches_normal_equations_for_full_rank() {
    let a = DMatrix::from_row_slice(4, 2, &[1., 0., 1., 1., 1., 2., 1., 3.]);
    let b = DVector::from_vec(vec![1., 2.9, 5.1, 7.]);
    let x = solve_least_squares(&a, &b);
    let x_normal = (a.transpose() * &a)
        .try_inverse()
        .expect("normal matrix is regular")
        * a.transpose()
        * &b;
    assert_relative_eq!(x, x_normal, epsilon = 1e-10);
}

#[test]
fn least_squares_gives_minimum_norm_solution_for_rank_deficient_matrix() {
    let a = DMatrix::from_row_slice(2, 2, &[1., 1., 1., 1.]);
    let b = DVector::from_vec(vec![2., 2.]);
    let x = solve_least_squares(&a, &b);
    assert_relative_eq!(x, DVector::from_vec(vec![1., 1.]), epsilon = 1e-12);
}

#[test]
fn numeric_differentiation_produces_correct_results() {
    // function x*sin(x)+x^2*cos(x) evaluated as a one element vector
    let f = |x: f64| -> Result<DVector<f64>, ()> {
        Ok(DVector::from_element(1, x * x.sin() + x.powi(2) * x.cos()))
    };
    let df = |x: f64| -x.powi(2) * x.sin() + x.sin() + 3. * x * x.cos();
    for x in [1., 2., 3., 5., 10.] {
        let derivative = numerical_derivative(f, x).unwrap();
        assert_relative_eq!(derivative[0], df(x), epsilon = 1e-6 * df(x).abs().max(1.));
    }
}

#[test]
fn numeric_differentiation_propagates_errors() {
    let result = numerical_derivative(|_| Err::<DVector<f64>, _>("failed"), 1.);
    assert_eq!(result, Err("failed"));
}

#[test]
fn bounded_differentiation_never_leaves_the_interval() {
    // sqrt is undefined below zero, so any evaluation there gives NaN
    let evaluated = std::cell::RefCell::new(Vec::new());
    let f = |x: f64| -> Result<DVector<f64>, ()> {
        evaluated.borrow_mut().push(x);
        Ok(DVector::from_vec(vec![x.sqrt() + x * x, 3. * x]))
    };
    let at_lower = numerical_derivative_within(f, 0., 0., 1.).unwrap();
    assert!(at_lower.iter().all(|d| d.is_finite()));
    assert_relative_eq!(at_lower[1], 3., epsilon = 1e-6);

    let at_upper = numerical_derivative_within(f, 1., 0., 1.).unwrap();
    assert_relative_eq!(at_upper[0], 2.5, epsilon = 1e-5);
    assert_relative_eq!(at_upper[1], 3., epsilon = 1e-6);

    let interior = numerical_derivative_within(f, 0.5, 0., 1.).unwrap();
    assert_relative_eq!(interior[0], 0.5_f64.sqrt().recip() / 2. + 1., epsilon = 1e-6);

    assert!(evaluated.borrow().iter().all(|&x| (0. ..=1.).contains(&x)));
}

#[test]
fn bounded_differentiation_handles_narrow_and_degenerate_intervals() {
    let f = |x: f64| -> Result<DVector<f64>, ()> { Ok(DVector::from_element(1, x.powi(3))) };
    // narrower than the regular stencil
    let narrow = numerical_derivative_within(f, 2., 2., 2. + 1e-9).unwrap();
    assert_relative_eq!(narrow[0], 12., epsilon = 1e-3);
    let fixed = numerical_derivative_within(f, 2., 2., 2.).unwrap();
    assert_eq!(fixed, DVector::zeros(1));
}

#[test]
fn non_finite_matrix_has_infinite_condition_number() {
    let a = DMatrix::from_row_slice(2, 2, &[1., f64::NAN, 0., 1.]);
    assert!(condition_number(&a).is_infinite());
    assert!(Conditioning::of(&a).is_ill_conditioned());
}

#[test]
fn matrix_concatenation_for_dynamic_matrices() {
    let lhs = DMatrix::from_column_slice(2, 3, &[1., 2., 3., 4., 5., 6.]);
    let rhs = DMatrix::from_column_slice(2, 2, &[7., 8., 9., 10.]);
    let concat = DMatrix::from_column_slice(2, 5, &[1., 2., 3., 4., 5., 6., 7., 8., 9., 10.]);
    assert_eq!(concat, concat_colwise(&lhs, &rhs));
    let stacked = concat_rowwise(&lhs.transpose(), &rhs.transpose());
    assert_eq!(stacked, concat.transpose());
}

#[test]
#[should_panic]
fn matrix_concatenation_panics_for_mismatched_rows() {
    let lhs = DMatrix::<f64>::zeros(2, 3);
    let rhs = DMatrix::<f64>::zeros(3, 3);
    _ = concat_colwise(&lhs, &rhs);
}

#[test]
fn vector_concatenation_keeps_order() {
    let top = DVector::from_vec(vec![1., 2.]);
    let bottom = DVector::from_vec(vec![3.]);
    assert_eq!(
        concat_vectors(&top, &bottom),
        DVector::from_vec(vec![1., 2., 3.])
    );
    assert_eq!(concat_vectors(&top, &DVector::zeros(0)), top);
}

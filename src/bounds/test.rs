use super::*;
use approx::assert_relative_eq;
use assert_matches::assert_matches;
use nalgebra::{dvector, DVector};

const INF: f64 = f64::INFINITY;

#[test]
fn empty_bounds_are_normalized_to_infinity() {
    let bounds = Bounds::try_new(
        ParameterGroup::Nonlinear,
        DVector::zeros(0),
        DVector::zeros(0),
        3,
    )
    .unwrap();
    assert_eq!(bounds, Bounds::unbounded(3));
    assert!(!bounds.is_constrained());
    assert!(!bounds.is_finite());
}

#[test]
fn one_sided_bounds_are_filled_on_the_other_side() {
    let bounds = Bounds::try_new(
        ParameterGroup::Linear,
        dvector![0., 0.],
        DVector::zeros(0),
        2,
    )
    .unwrap();
    assert_eq!(bounds.upper(), &dvector![INF, INF]);
    assert!(bounds.is_constrained());
    assert!(bounds.is_non_negative_only());
}

#[test]
fn inverted_bounds_are_rejected_for_both_groups() {
    assert_matches!(
        Bounds::try_new(ParameterGroup::Nonlinear, dvector![0., 2.], dvector![1., 1.], 2),
        Err(BoundsError::InvertedBounds {
            group: ParameterGroup::Nonlinear,
            index: 1,
            ..
        })
    );
    assert_matches!(
        Bounds::try_new(ParameterGroup::Linear, dvector![5.], dvector![-5.], 1),
        Err(BoundsError::InvertedBounds {
            group: ParameterGroup::Linear,
            index: 0,
            ..
        })
    );
}

#[test]
fn bounds_of_wrong_length_or_nan_are_rejected() {
    assert_eq!(
        Bounds::try_new(ParameterGroup::Linear, dvector![0.], DVector::zeros(0), 2),
        Err(BoundsError::LengthMismatch {
            group: ParameterGroup::Linear,
            expected: 2,
            actual: 1
        })
    );
    assert_eq!(
        Bounds::try_new(
            ParameterGroup::Nonlinear,
            DVector::zeros(0),
            dvector![1., f64::NAN],
            2
        ),
        Err(BoundsError::NotANumber {
            group: ParameterGroup::Nonlinear,
            index: 1
        })
    );
}

#[test]
fn initial_guess_outside_bounds_is_reported() {
    let bounds =
        Bounds::try_new(ParameterGroup::Nonlinear, dvector![0., 0.], dvector![1., 1.], 2).unwrap();
    assert!(bounds.check_initial_guess(&dvector![0., 1.]).is_ok());
    assert_eq!(
        bounds.check_initial_guess(&dvector![0.5, 1.5]),
        Err(BoundsError::InitialGuessOutOfBounds {
            index: 1,
            value: 1.5,
            lower: 0.,
            upper: 1.
        })
    );
    assert!(bounds.check_initial_guess(&dvector![f64::NAN, 0.5]).is_err());
}

#[test]
fn projection_clamps_into_the_box() {
    let bounds = Bounds::try_new(
        ParameterGroup::Linear,
        dvector![0., -INF],
        dvector![1., 2.],
        2,
    )
    .unwrap();
    assert_eq!(bounds.project(&dvector![-1., 3.]), dvector![0., 2.]);
    assert!(bounds.contains(&bounds.project(&dvector![5., -100.])));
}

#[test]
fn classification_distinguishes_linear_constraint_patterns() {
    let free = Bounds::unbounded(2);
    let non_negative =
        Bounds::try_new(ParameterGroup::Linear, dvector![0., 0.], DVector::zeros(0), 2).unwrap();
    let boxed = Bounds::try_new(
        ParameterGroup::Linear,
        dvector![0., 0.],
        dvector![1., INF],
        2,
    )
    .unwrap();
    let shifted =
        Bounds::try_new(ParameterGroup::Linear, dvector![0., 1.], DVector::zeros(0), 2).unwrap();

    let class = ConstraintClass::classify(&free, &free);
    assert_eq!(class.linear(), LinearConstraint::Unconstrained);
    assert!(!class.constrained_linear());
    assert!(!class.constrained_nonlinear());

    let class = ConstraintClass::classify(&free, &non_negative);
    assert_eq!(class.linear(), LinearConstraint::NonNegative);
    assert!(class.constrained_linear());
    assert!(class.non_negative_only());

    let class = ConstraintClass::classify(&boxed, &boxed);
    assert_eq!(class.linear(), LinearConstraint::Box);
    assert!(class.constrained_nonlinear());
    assert!(!class.non_negative_only());

    assert_eq!(
        ConstraintClass::classify(&free, &shifted).linear(),
        LinearConstraint::Box
    );
}

#[test]
fn transform_round_trips_for_every_kind_of_bound() {
    let bounds = Bounds::try_new(
        ParameterGroup::Nonlinear,
        dvector![-INF, 1., -INF, -2., 3.],
        dvector![INF, INF, 4., 2., 3.],
        5,
    )
    .unwrap();
    let transform = BoundTransform::new(&bounds);
    let external = dvector![7.5, 2.5, -1., 0.3, 3.];
    let internal = transform.to_internal(&external);
    assert_relative_eq!(transform.to_external(&internal), external, epsilon = 1e-10);
}

#[test]
fn every_internal_value_maps_into_the_bounds() {
    let bounds = Bounds::try_new(
        ParameterGroup::Nonlinear,
        dvector![0., 1., -INF],
        dvector![1., INF, 5.],
        3,
    )
    .unwrap();
    let transform = BoundTransform::new(&bounds);
    for q in [-1e6, -17.3, -1., 0., 0.4, 2., 1e3, 1e9] {
        let external = transform.to_external(&DVector::from_element(3, q));
        assert!(bounds.contains(&external), "{external} not inside bounds");
    }
}

#[test]
fn starting_points_on_a_bound_are_moved_inside_where_the_transform_is_not_flat() {
    let bounds = Bounds::try_new(
        ParameterGroup::Nonlinear,
        dvector![0., 2., -INF],
        dvector![1., INF, -300.],
        3,
    )
    .unwrap();
    let transform = BoundTransform::new(&bounds);
    let internal = transform.to_internal(&dvector![1., 2., -300.]);
    // derivatives dp/dq of the sine and the square root maps
    assert!(internal[0].cos().abs() > 1e-2);
    for q in [internal[1], internal[2]] {
        assert!(q / (q * q + 1.).sqrt() > 1e-2);
    }
    let external = transform.to_external(&internal);
    assert!(bounds.contains(&external));
    assert_relative_eq!(external, dvector![1., 2., -300.], max_relative = 1e-3);
}

use approx::assert_relative_eq;
use assert_matches::assert_matches;
use nalgebra::{dvector, DVector};
use shared_test_code::models::{ExponentialWithLinearTerm, GaussianBlur};
use shared_test_code::{add_gaussian_noise, evaluate_complete_model, linspace};
use snlls::prelude::*;
use snlls::solvers::levmar::{PenaltyMode, ResidualEvaluator, SolverState};

mod uncertainty;

const INF: f64 = f64::INFINITY;

fn exponential_model() -> ExponentialWithLinearTerm {
    ExponentialWithLinearTerm::new(linspace(0., 2., 50))
}

fn exponential_data(model: &ExponentialWithLinearTerm) -> DVector<f64> {
    evaluate_complete_model(model, &dvector![1.], &dvector![2., 0.5])
}

fn blur_model() -> GaussianBlur {
    GaussianBlur::new(linspace(0., 1., 60), linspace(0., 1., 20))
}

// a smooth bump of intensities, blurred with width 0.1 and slightly noisy
fn blurred_data(model: &GaussianBlur) -> (DVector<f64>, DVector<f64>) {
    let intensities = model.centers().map(|c| (-(c - 0.5).powi(2) / 0.02).exp());
    let clean = evaluate_complete_model(model, &dvector![0.1], &intensities);
    (intensities, add_gaussian_noise(&clean, 1e-3, 11))
}

#[test]
fn noiseless_exponential_data_are_recovered() {
    let model = exponential_model();
    let y = exponential_data(&model);
    let problem = SnllsProblemBuilder::new(model)
        .observations(y)
        .initial_guess(dvector![1.3])
        .build()
        .expect("building a valid problem must succeed");
    let fit = SnllsSolver::default()
        .fit(&problem)
        .expect("fitting must succeed");
    assert!(fit.was_successful());
    assert_relative_eq!(fit.nonlinear_parameters()[0], 1., epsilon = 1e-3);
    assert_relative_eq!(fit.linear_coefficients()[0], 2., epsilon = 1e-3);
    assert_relative_eq!(fit.linear_coefficients()[1], 0.5, epsilon = 1e-3);
    assert_eq!(fit.regularization_parameter(), None);
}

#[test]
fn all_bounds_are_respected_at_the_optimum() {
    let model = exponential_model();
    let y = exponential_data(&model);
    // the true decay rate lies below the admissible range
    let problem = SnllsProblemBuilder::new(model)
        .observations(y)
        .initial_guess(dvector![2.])
        .nonlinear_bounds(dvector![1.5], dvector![3.])
        .linear_bounds(dvector![0., 0.], dvector![1.5, 1.])
        .build()
        .unwrap();
    let fit = SnllsSolver::default().fit(&problem).unwrap();
    assert!(problem.nonlinear_bounds().contains(fit.nonlinear_parameters()));
    assert!(problem.linear_bounds().contains(fit.linear_coefficients()));
    assert!(fit.nonlinear_parameters()[0] < 1.6);
}

#[test]
fn multistart_fits_with_the_same_seed_are_identical() {
    let model = exponential_model();
    let y = add_gaussian_noise(&exponential_data(&model), 0.05, 3);
    let problem = SnllsProblemBuilder::new(model)
        .observations(y)
        .initial_guess(dvector![5.])
        .nonlinear_bounds(dvector![0.01], dvector![10.])
        .build()
        .unwrap();
    let solver = SnllsSolver::new(SnllsOptions::default().multistart(4).seed(3));
    let first = solver.fit(&problem).unwrap();
    let second = solver.fit(&problem).unwrap();
    assert_eq!(first.nonlinear_parameters(), second.nonlinear_parameters());
    assert_eq!(first.linear_coefficients(), second.linear_coefficients());
    assert_eq!(first.objective(), second.objective());
    assert_eq!(first.best_run(), second.best_run());
}

#[test]
fn blurring_operator_is_detected_as_ill_conditioned() {
    let model = blur_model();
    let operator = model.eval(&dvector![0.1]).unwrap();
    assert!(Conditioning::of(&operator).is_ill_conditioned());
    let well_conditioned = exponential_model().eval(&dvector![1.]).unwrap();
    assert_eq!(
        Conditioning::of(&well_conditioned),
        Conditioning::WellConditioned
    );
}

#[test]
fn regularization_parameter_is_reused_while_parameters_barely_change() {
    let model = blur_model();
    let (_, y) = blurred_data(&model);
    let problem = SnllsProblemBuilder::new(model)
        .observations(y)
        .initial_guess(dvector![0.1])
        .build()
        .unwrap();
    let options = SnllsOptions::default()
        .reg_param(SelectionCriterion::Gcv)
        .alpha_opt_threshold(1e-3);
    let evaluator = ResidualEvaluator::new(&problem, &options).unwrap();
    let mut state = SolverState::new(problem.linear_count());

    let first = evaluator
        .evaluate(&dvector![0.1], PenaltyMode::Adaptive(&state))
        .unwrap();
    assert!(first.selected());
    state.record(&first);

    let nearby = evaluator
        .evaluate(&dvector![0.10001], PenaltyMode::Adaptive(&state))
        .unwrap();
    assert!(!nearby.selected());
    assert_eq!(nearby.alpha(), first.alpha());

    let distant = evaluator
        .evaluate(&dvector![0.12], PenaltyMode::Adaptive(&state))
        .unwrap();
    assert!(distant.selected());
}

#[test]
fn ill_conditioned_fit_is_penalized_and_stays_within_bounds() {
    let model = blur_model();
    let (_, y) = blurred_data(&model);
    let problem = SnllsProblemBuilder::new(model)
        .observations(y.clone())
        .initial_guess(dvector![0.12])
        .nonlinear_bounds(dvector![0.05], dvector![0.2])
        .build()
        .unwrap();
    let fit = SnllsSolver::new(SnllsOptions::default().reg_param(SelectionCriterion::Gcv))
        .fit(&problem)
        .unwrap();
    assert!(fit.regularization_parameter().is_some());
    assert!(problem.nonlinear_bounds().contains(fit.nonlinear_parameters()));
    assert!(fit.linear_coefficients().iter().all(|x| x.is_finite()));
    // the penalty part is part of the residual
    assert_eq!(fit.residuals().len(), y.len() + 18);
    assert!(fit.evaluation().data_residuals().norm() < 0.1 * y.norm());
}

#[test]
fn non_negative_coefficients_are_routed_to_a_non_negative_solver() {
    let model = blur_model();
    let (_, y) = blurred_data(&model);
    let linear_count = model.centers().len();
    let problem = SnllsProblemBuilder::new(model)
        .observations(y)
        .initial_guess(dvector![0.1])
        .nonlinear_bounds(dvector![0.05], dvector![0.2])
        .linear_bounds(DVector::zeros(linear_count), DVector::from_element(linear_count, INF))
        .build()
        .unwrap();
    assert_eq!(problem.constraints().linear(), LinearConstraint::NonNegative);
    assert!(problem.constraints().non_negative_only());

    let options = SnllsOptions::default();
    let evaluator = ResidualEvaluator::new(&problem, &options).unwrap();
    assert_eq!(evaluator.strategy(), LinearSolverStrategy::Fnnls);

    for strategy in [LinearSolverStrategy::Fnnls, LinearSolverStrategy::Nnls] {
        let fit = SnllsSolver::new(SnllsOptions::default().lin_solver(strategy))
            .fit(&problem)
            .unwrap();
        assert!(fit.linear_coefficients().iter().all(|&x| x >= 0.));
    }
}

#[test]
fn box_constrained_coefficients_use_bounded_variable_least_squares() {
    let model = exponential_model();
    let y = exponential_data(&model);
    let problem = SnllsProblemBuilder::new(model)
        .observations(y)
        .initial_guess(dvector![1.3])
        .linear_bounds(dvector![-1., -1.], dvector![1., 1.])
        .build()
        .unwrap();
    assert_eq!(problem.constraints().linear(), LinearConstraint::Box);
    let evaluator = ResidualEvaluator::new(&problem, &SnllsOptions::default()).unwrap();
    assert_eq!(evaluator.strategy(), LinearSolverStrategy::Bvls);

    let fit = SnllsSolver::default().fit(&problem).unwrap();
    assert!(problem.linear_bounds().contains(fit.linear_coefficients()));
}

#[test]
fn invalid_problems_and_configurations_are_rejected() {
    let model = exponential_model();
    let y = exponential_data(&model);

    assert_matches!(
        SnllsProblemBuilder::new(model.clone())
            .observations(y.clone())
            .initial_guess(dvector![4.])
            .nonlinear_bounds(dvector![0.], dvector![3.])
            .build(),
        Err(SnllsError::Bounds(BoundsError::InitialGuessOutOfBounds { index: 0, .. }))
    );
    assert_matches!(
        SnllsProblemBuilder::new(model.clone())
            .observations(y.rows(0, 10).into_owned())
            .initial_guess(dvector![1.])
            .build(),
        Err(SnllsError::InvalidInput(InputError::RowCountMismatch {
            rows: 50,
            observations: 10
        }))
    );

    let problem = SnllsProblemBuilder::new(model)
        .observations(y)
        .initial_guess(dvector![1.])
        .build()
        .unwrap();
    assert_matches!(
        SnllsSolver::new(SnllsOptions::default().nonlin_tol_fun(-1.)).fit(&problem),
        Err(SnllsError::Configuration(ConfigurationError::InvalidValue { .. }))
    );
    assert_matches!(
        SnllsSolver::new(SnllsOptions::default().multistart(2)).fit(&problem),
        Err(SnllsError::Configuration(
            ConfigurationError::MultiStartUnbounded { starts: 2 }
        ))
    );
    assert_matches!(
        "lsqlin".parse::<LinearSolverStrategy>(),
        Err(ConfigurationError::Unavailable { .. })
    );
    assert_matches!(
        "ridge".parse::<RegParam>(),
        Err(ConfigurationError::UnknownName { .. })
    );
}

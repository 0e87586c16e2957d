use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::{dvector, DVector};
use pprof::criterion::{Output, PProfProfiler};
use shared_test_code::models::ExponentialWithLinearTerm;
use shared_test_code::{add_gaussian_noise, evaluate_complete_model, linspace};
use snlls::prelude::*;

/// helper struct for the parameters of the exponential with linear term
#[derive(Copy, Clone, PartialEq, Debug)]
struct ExponentialParameters {
    rate: f64,
    c1: f64,
    c2: f64,
}

fn build_problem(
    true_parameters: ExponentialParameters,
    rate_guess: f64,
    noise: Option<f64>,
) -> SnllsProblem<ExponentialWithLinearTerm> {
    let ExponentialParameters { rate, c1, c2 } = true_parameters;
    let model = ExponentialWithLinearTerm::new(linspace(0., 2., 1024));
    let clean = evaluate_complete_model(&model, &dvector![rate], &dvector![c1, c2]);
    let y = match noise {
        Some(sigma) => add_gaussian_noise(&clean, sigma, 0),
        None => clean,
    };
    SnllsProblemBuilder::new(model)
        .observations(y)
        .initial_guess(dvector![rate_guess])
        .nonlinear_bounds(dvector![0.01], dvector![10.])
        .build()
        .expect("Building valid problem should not panic")
}

fn run_minimization(
    solver: &SnllsSolver,
    problem: &SnllsProblem<ExponentialWithLinearTerm>,
) -> DVector<f64> {
    let fit = solver.fit(problem).expect("fitting must not fail");
    assert!(fit.was_successful(), "Termination not successful");
    fit.linear_coefficients().clone()
}

fn bench_exponential_with_linear_term(c: &mut Criterion) {
    let true_parameters = ExponentialParameters {
        rate: 1.,
        c1: 2.,
        c2: 0.5,
    };
    let single_start = SnllsSolver::default();
    let multistart = SnllsSolver::new(SnllsOptions::default().multistart(8).seed(0));

    c.bench_function("exp with linear term w/o noise", |bencher| {
        bencher.iter_batched(
            || build_problem(true_parameters, 1.3, None),
            |problem| run_minimization(&single_start, &problem),
            criterion::BatchSize::SmallInput,
        )
    });

    c.bench_function("exp with linear term with noise and uncertainty", |bencher| {
        bencher.iter_batched(
            || build_problem(true_parameters, 1.3, Some(0.05)),
            |problem| {
                single_start
                    .fit_with_uncertainty(&problem)
                    .expect("fitting must not fail")
            },
            criterion::BatchSize::SmallInput,
        )
    });

    c.bench_function("exp with linear term, 8 starts", |bencher| {
        bencher.iter_batched(
            || build_problem(true_parameters, 5., Some(0.05)),
            |problem| run_minimization(&multistart, &problem),
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = bench_exponential_with_linear_term);
criterion_main!(benches);

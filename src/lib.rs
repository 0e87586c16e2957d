#![warn(missing_docs)]
//!
//! # Introduction
//!
//! Many inverse problems are *separable*: the predicted signal is a linear combination of
//! columns that depend nonlinearly on a few parameters. Given observations
//! `$\vec{y} \in \mathbb{R}^N$` this crate solves
//!
//! ```math
//! \min_{\vec{p},\vec{x}} ||\boldsymbol{A}(\vec{p})\vec{x}-\vec{y}||_2^2
//! \quad\text{s.t.}\quad \vec{l}_p \leq \vec{p} \leq \vec{u}_p,\;
//! \vec{l}_x \leq \vec{x} \leq \vec{u}_x,
//! ```
//!
//! where `$\boldsymbol{A}(\vec{p}) \in \mathbb{R}^{N\times M}$` is the *forward operator*,
//! `$\vec{p}$` are the *nonlinear parameters* and `$\vec{x}$` are the *linear coefficients*.
//!
//! ## Variable Projection
//!
//! For fixed `$\vec{p}$` the optimal `$\vec{x}$` is the solution of a linear least squares
//! problem. The nonlinear optimizer therefore only sees the nonlinear parameters, while
//! every residual evaluation solves the linear subproblem for the current `$\vec{p}$`. This is
//! the variable projection idea of (Golub2003) and (O'Leary2013). The nonlinear parameters
//! are optimized with the [levenberg_marquardt](https://crates.io/crates/levenberg-marquardt/)
//! crate in unbounded internal coordinates, so the bounds are honored at every iterate.
//!
//! ## Regularization
//!
//! If the forward operator is ill-conditioned (its condition number exceeds
//! [ILL_CONDITIONED_THRESHOLD](crate::linalg_helpers::ILL_CONDITIONED_THRESHOLD)), the linear
//! subproblem is penalized with `$\alpha^2||\boldsymbol{W}\boldsymbol{L}\vec{x}||^2$`, where the
//! regularization parameter `$\alpha$` is selected automatically by a criterion such as
//! generalized cross validation or the L-curve. Selected parameters are cached and reused
//! while the nonlinear parameters change little. See the [regularization] module.
//!
//! ## Constraints on the Linear Coefficients
//!
//! Bounds on the linear coefficients are honored by the solvers of the [solvers::linear]
//! module. Pure non-negativity constraints use dedicated non-negative least squares solvers,
//! general boxes use bounded variable least squares.
//!
//! ## Uncertainty
//!
//! The covariance of the fitted parameters can be estimated at the optimum, see
//! [UncertaintyQuantification](crate::statistics::UncertaintyQuantification). For
//! heteroscedastic noise the [hccm](crate::statistics::hccm) module provides sandwich
//! estimators HC0 to HC5 for any least squares fit.
//!
//! # Usage and Workflow
//!
//! 1. Implement the [ForwardOperator](crate::model::ForwardOperator) trait for your model. Every
//!    closure `Fn(&DVector<f64>) -> DMatrix<f64>` already implements it.
//! 2. Cast the fitting problem into a [SnllsProblem](crate::problem::SnllsProblem) using the
//!    [SnllsProblemBuilder](crate::problem::SnllsProblemBuilder), which validates the data
//!    and the bounds.
//! 3. Configure the [SnllsSolver](crate::solvers::levmar::SnllsSolver) with
//!    [SnllsOptions](crate::options::SnllsOptions), e.g. the regularization or the number of
//!    starts.
//! 4. Fit the problem and inspect the [FitResult](crate::fit::FitResult), optionally
//!    together with the uncertainty of the parameters.
//!
//! # Example
//!
//! We fit the model `$y_k = x_1 \exp(-p\,t_k) + x_2\,t_k$` with one nonlinear parameter
//! `$p$` and two linear coefficients to noiseless data.
//!
//! ```rust
//! use nalgebra::{dvector, DMatrix, DVector};
//! use snlls::prelude::*;
//! # fn main() -> Result<(), SnllsError> {
//! let t = DVector::from_fn(50, |i, _| 2. * i as f64 / 49.);
//! let y = t.map(|t| 2. * (-t).exp() + 0.5 * t);
//!
//! let operator = move |p: &DVector<f64>| {
//!     let mut a = DMatrix::zeros(t.len(), 2);
//!     a.set_column(0, &t.map(|t| (-p[0] * t).exp()));
//!     a.set_column(1, &t);
//!     a
//! };
//!
//! let problem = SnllsProblemBuilder::new(operator)
//!     .observations(y)
//!     .initial_guess(dvector![1.3])
//!     .nonlinear_bounds(dvector![0.01], dvector![10.])
//!     .build()?;
//!
//! let solver = SnllsSolver::new(SnllsOptions::default().multistart(4).seed(1));
//! let (fit, uncertainty) = solver.fit_with_uncertainty(&problem)?;
//! assert!((fit.nonlinear_parameters()[0] - 1.).abs() < 1e-3);
//! assert!((fit.linear_coefficients()[0] - 2.).abs() < 1e-3);
//!
//! // nonlinear parameters first, then the linear coefficients
//! let (lower, upper) = uncertainty.confidence_interval(95.)?;
//! assert_eq!(lower.len(), 3);
//! assert!(lower[0] <= upper[0]);
//! # Ok(())
//! # }
//! ```
//!
//! # References and Further Reading
//! (O'Leary2013) O’Leary, D.P., Rust, B.W. Variable projection for nonlinear least squares problems. *Comput Optim Appl* **54**, 579–593 (2013). DOI: [10.1007/s10589-012-9492-9](https://doi.org/10.1007/s10589-012-9492-9)
//!
//! (Golub2003) Golub, G. , Pereyra, V Separable nonlinear least squares: the variable projection method and its applications. Inverse Problems **19** R1 (2003) [https://iopscience.iop.org/article/10.1088/0266-5611/19/2/201](https://iopscience.iop.org/article/10.1088/0266-5611/19/2/201)
//!
//! (Hansen2010) Hansen, P.C. *Discrete Inverse Problems: Insight and Algorithms*. SIAM (2010)
//!
//! (MacKinnon1985) MacKinnon, J.G., White, H. Some heteroskedasticity-consistent covariance matrix estimators with improved finite sample properties. *J Econom* **29**, 305–325 (1985)

/// box constraints on the parameters and their transformation to unbounded coordinates
pub mod bounds;
/// the error types of this crate
pub mod error;
/// the result of a fit
pub mod fit;
/// conditioning and (pseudo) inversion of matrices
pub mod linalg_helpers;
/// the forward operator of a separable model
pub mod model;
/// configuration of the solver
pub mod options;
/// commonly useful imports
pub mod prelude;
/// the separable fitting problem and its builder
pub mod problem;
/// penalty operators and the selection of the regularization parameter
pub mod regularization;
/// solvers for the nonlinear problem and the linear subproblem
pub mod solvers;
/// covariance based uncertainty of the fitted parameters
pub mod statistics;

/// Contains the solver for the nonlinear problem using the [levenberg-marquardt](https://crates.io/crates/levenberg-marquardt)
/// crate.
///
/// The nonlinear parameters are optimized in unbounded internal coordinates and every
/// residual evaluation solves the linear subproblem for the current parameters.
pub mod levmar;

/// solvers for the (penalized and constrained) linear subproblem
pub mod linear;

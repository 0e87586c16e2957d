use thiserror::Error as ThisError;

/// Errors concerning the box constraints of either parameter group.
#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum BoundsError {
    /// a lower bound exceeds its paired upper bound
    #[error(
        "Lower bound {} exceeds upper bound {} for {} parameter at index {}",
        lower,
        upper,
        group,
        index
    )]
    InvertedBounds {
        /// which parameter group the bound belongs to
        group: ParameterGroup,
        /// index of the offending parameter
        index: usize,
        /// the lower bound
        lower: f64,
        /// the upper bound
        upper: f64,
    },

    /// the initial guess for a nonlinear parameter lies outside its bounds
    #[error(
        "Initial value {} of nonlinear parameter {} lies outside its bounds [{}, {}]",
        value,
        index,
        lower,
        upper
    )]
    InitialGuessOutOfBounds {
        /// index of the offending parameter
        index: usize,
        /// the initial value
        value: f64,
        /// the lower bound
        lower: f64,
        /// the upper bound
        upper: f64,
    },

    /// a bound vector does not have as many elements as its parameter group
    #[error(
        "Bounds for {} parameters must have length {}, but length {} was given",
        group,
        expected,
        actual
    )]
    LengthMismatch {
        /// which parameter group the bounds belong to
        group: ParameterGroup,
        /// number of parameters in the group
        expected: usize,
        /// length of the given bound vector
        actual: usize,
    },

    /// a bound is NaN
    #[error("Bound at index {} of the {} parameters is NaN", index, group)]
    NotANumber {
        /// which parameter group the bound belongs to
        group: ParameterGroup,
        /// index of the offending bound
        index: usize,
    },
}

/// The two groups of parameters of a separable problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterGroup {
    /// the parameters `$\vec{p}$` that enter the forward operator
    Nonlinear,
    /// the coefficients `$\vec{x}$` that enter the model linearly
    Linear,
}

impl std::fmt::Display for ParameterGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterGroup::Nonlinear => write!(f, "nonlinear"),
            ParameterGroup::Linear => write!(f, "linear"),
        }
    }
}

/// Incompatible or unknown configuration options.
#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum ConfigurationError {
    /// a name given for a named option is not recognized
    #[error("Unknown {} '{}'", option, name)]
    UnknownName {
        /// the option that was parsed
        option: &'static str,
        /// the name that could not be parsed
        name: String,
    },

    /// the named strategy exists in the literature but is not provided by this crate
    #[error("The {} '{}' is not available", option, name)]
    Unavailable {
        /// the option that was parsed
        option: &'static str,
        /// the name of the unavailable strategy
        name: String,
    },

    /// multi-start requires finite bounds on every nonlinear parameter
    #[error("Multi-start with {} starts requires finite lower and upper bounds on all nonlinear parameters", starts)]
    MultiStartUnbounded {
        /// the requested number of starts
        starts: usize,
    },

    /// the number of starts must be positive
    #[error("The number of multi-start runs must be positive")]
    ZeroStarts,

    /// the requested linear solver cannot handle the constraint pattern of the problem
    #[error("Linear solver '{}' cannot handle a {} linear problem", strategy, class)]
    IncompatibleLinearSolver {
        /// the name of the requested strategy
        strategy: &'static str,
        /// a description of the constraint class
        class: &'static str,
    },

    /// a numeric option has an invalid value
    #[error("Option {} must be {}, but {} was given", option, requirement, value)]
    InvalidValue {
        /// the option name
        option: &'static str,
        /// a description of the valid range
        requirement: &'static str,
        /// the given value
        value: f64,
    },

    /// the regularization operator order is too large for the number of linear parameters
    #[error(
        "Regularization order {} requires more than {} linear parameters",
        order,
        linear_count
    )]
    RegularizationOrderTooLarge {
        /// the requested order
        order: usize,
        /// the number of linear parameters
        linear_count: usize,
    },
}

/// Failure of an iterative solver to produce a usable result.
#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum DivergenceError {
    /// the constrained linear solver exhausted its iteration budget
    #[error("Linear solver '{}' did not converge within {} iterations", strategy, iterations)]
    LinearSolver {
        /// the name of the strategy
        strategy: &'static str,
        /// the iteration budget
        iterations: usize,
    },

    /// no candidate regularization parameter produced a finite score
    #[error("Regularization parameter selection with criterion '{}' produced no finite score", criterion)]
    RegParamSelection {
        /// the name of the selection criterion
        criterion: &'static str,
    },

    /// a linear solve produced non-finite values
    #[error("Linear subproblem produced non-finite coefficients")]
    NonFiniteSolution,

    /// every run of the nonlinear optimizer failed
    #[error("All {} nonlinear optimizer runs diverged", runs)]
    AllRunsDiverged {
        /// number of runs
        runs: usize,
    },
}

/// Errors in the data of a fitting problem, detected before any iteration runs.
#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum InputError {
    /// no observations were given to the builder
    #[error("Observations are missing")]
    MissingObservations,

    /// no initial guess was given to the builder
    #[error("Initial guess for the nonlinear parameters is missing")]
    MissingInitialGuess,

    /// the observations are empty
    #[error("Observations must not be empty")]
    EmptyObservations,

    /// the initial guess is empty
    #[error("Initial guess must contain at least one nonlinear parameter")]
    EmptyInitialGuess,

    /// an element of the observations is NaN or infinite
    #[error("Observation at index {} is not finite", index)]
    NonFiniteObservation {
        /// index of the offending element
        index: usize,
    },

    /// an element of the initial guess is NaN or infinite
    #[error("Initial value of nonlinear parameter {} is not finite", index)]
    NonFiniteInitialGuess {
        /// index of the offending element
        index: usize,
    },

    /// the forward operator has no columns
    #[error("Forward operator must produce at least one column")]
    NoLinearParameters,

    /// the forward operator contains NaN or infinite elements
    #[error("Forward operator contains non-finite elements")]
    NonFiniteOperator,

    /// a jacobian contains NaN or infinite elements
    #[error("Jacobian contains non-finite elements")]
    NonFiniteJacobian,

    /// an element of a residual vector is NaN or infinite
    #[error("Residual at index {} is not finite", index)]
    NonFiniteResidual {
        /// index of the offending element
        index: usize,
    },

    /// the number of rows of the operator does not match the observations
    #[error(
        "Forward operator has {} rows, but {} observations were given",
        rows,
        observations
    )]
    RowCountMismatch {
        /// rows of the forward operator
        rows: usize,
        /// number of observations
        observations: usize,
    },

    /// a parameter vector does not match the number of columns of a jacobian
    #[error(
        "Expected {} parameters, but a vector of length {} was given",
        expected,
        actual
    )]
    ParameterCountMismatch {
        /// the number of parameters
        expected: usize,
        /// the length of the given vector
        actual: usize,
    },

    /// there are not more observations than parameters
    #[error(
        "{} observations are not enough to estimate {} parameters",
        observations,
        parameters
    )]
    Underdetermined {
        /// number of observations
        observations: usize,
        /// number of parameters
        parameters: usize,
    },

    /// the number of columns of the operator changed between evaluations
    #[error(
        "Forward operator changed its shape from {:?} to {:?}",
        expected,
        actual
    )]
    ShapeChanged {
        /// shape at the initial guess
        expected: (usize, usize),
        /// shape at a later evaluation
        actual: (usize, usize),
    },
}

/// The error type of the fitting engine.
#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum SnllsError {
    /// invalid or violated box constraints
    #[error(transparent)]
    Bounds(#[from] BoundsError),

    /// incompatible configuration
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// an inner or outer solver diverged
    #[error(transparent)]
    Divergence(#[from] DivergenceError),

    /// the given data are empty, non-finite or of inconsistent shape
    #[error(transparent)]
    InvalidInput(#[from] InputError),

    /// the forward operator returned an error
    #[error("Forward operator evaluation failed: {0}")]
    Model(String),
}

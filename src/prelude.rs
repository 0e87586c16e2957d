pub use crate::bounds::{Bounds, ConstraintClass, LinearConstraint};
pub use crate::error::{
    BoundsError, ConfigurationError, DivergenceError, InputError, ParameterGroup, SnllsError,
};
pub use crate::fit::FitResult;
pub use crate::linalg_helpers::{Conditioning, Inversion};
pub use crate::model::ForwardOperator;
pub use crate::options::SnllsOptions;
pub use crate::problem::{SnllsProblem, SnllsProblemBuilder};
pub use crate::regularization::selection::{RegParam, SelectionCriterion};
pub use crate::regularization::RegType;
pub use crate::solvers::levmar::{NonlinearSolverStrategy, SnllsSolver};
pub use crate::solvers::linear::LinearSolverStrategy;
pub use crate::statistics::hccm::{hccm, HcEstimator, HccmEstimate};
pub use crate::statistics::UncertaintyQuantification;

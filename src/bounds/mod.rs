use crate::error::{BoundsError, ParameterGroup};
use nalgebra::DVector;

#[cfg(test)]
mod test;

/// Box constraints `$\vec{l} \leq \vec{v} \leq \vec{u}$` on one group of parameters.
/// Missing bounds are represented by `$\pm\infty$`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl Bounds {
    /// bounds that do not constrain any of the `count` parameters
    pub fn unbounded(count: usize) -> Self {
        Self {
            lower: DVector::from_element(count, f64::NEG_INFINITY),
            upper: DVector::from_element(count, f64::INFINITY),
        }
    }

    /// Create bounds for a group of `count` parameters. An empty vector for
    /// either side means the parameters are unbounded on that side.
    ///
    /// # Errors
    ///
    /// A non-empty bound vector must have exactly `count` elements, no element may be NaN
    /// and every lower bound must not exceed its paired upper bound.
    pub fn try_new(
        group: ParameterGroup,
        lower: DVector<f64>,
        upper: DVector<f64>,
        count: usize,
    ) -> Result<Self, BoundsError> {
        let lower = normalize(group, lower, count, f64::NEG_INFINITY)?;
        let upper = normalize(group, upper, count, f64::INFINITY)?;

        for (index, (&lower, &upper)) in lower.iter().zip(upper.iter()).enumerate() {
            if lower > upper {
                return Err(BoundsError::InvertedBounds {
                    group,
                    index,
                    lower,
                    upper,
                });
            }
        }
        Ok(Self { lower, upper })
    }

    /// the lower bounds
    pub fn lower(&self) -> &DVector<f64> {
        &self.lower
    }

    /// the upper bounds
    pub fn upper(&self) -> &DVector<f64> {
        &self.upper
    }

    /// number of parameters these bounds apply to
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    /// whether the bounds apply to no parameters at all
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// true iff any bound is finite
    pub fn is_constrained(&self) -> bool {
        self.lower
            .iter()
            .chain(self.upper.iter())
            .any(|b| b.is_finite())
    }

    /// true iff every lower and every upper bound is finite
    pub fn is_finite(&self) -> bool {
        self.lower
            .iter()
            .chain(self.upper.iter())
            .all(|b| b.is_finite())
    }

    /// true iff the bounds describe exactly `$\vec{v} \geq 0$`
    pub fn is_non_negative_only(&self) -> bool {
        !self.is_empty()
            && self.lower.iter().all(|&l| l == 0.)
            && self.upper.iter().all(|&u| u == f64::INFINITY)
    }

    /// whether every element of the vector lies inside the box
    pub fn contains(&self, values: &DVector<f64>) -> bool {
        values.len() == self.len()
            && values
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(v, (l, u))| l <= v && v <= u)
    }

    /// clamp every element of the vector into the box
    pub fn project(&self, values: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(values.len(), self.len());
        DVector::from_iterator(
            values.len(),
            values
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .map(|(&v, (&l, &u))| v.max(l).min(u)),
        )
    }

    /// Check that the given initial guess lies inside these bounds.
    pub(crate) fn check_initial_guess(&self, initial: &DVector<f64>) -> Result<(), BoundsError> {
        for (index, (&value, (&lower, &upper))) in initial
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .enumerate()
        {
            if !(lower <= value && value <= upper) {
                return Err(BoundsError::InitialGuessOutOfBounds {
                    index,
                    value,
                    lower,
                    upper,
                });
            }
        }
        Ok(())
    }
}

fn normalize(
    group: ParameterGroup,
    bound: DVector<f64>,
    count: usize,
    fill: f64,
) -> Result<DVector<f64>, BoundsError> {
    if bound.is_empty() {
        return Ok(DVector::from_element(count, fill));
    }
    if bound.len() != count {
        return Err(BoundsError::LengthMismatch {
            group,
            expected: count,
            actual: bound.len(),
        });
    }
    if let Some(index) = bound.iter().position(|b| b.is_nan()) {
        return Err(BoundsError::NotANumber { group, index });
    }
    Ok(bound)
}

/// The constraint pattern of the linear coefficients, which decides how
/// the linear subproblem is solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinearConstraint {
    /// all linear bounds are infinite
    Unconstrained,
    /// all lower bounds are zero and all upper bounds are `$+\infty$`
    NonNegative,
    /// any other combination with at least one finite bound
    Box,
}

impl LinearConstraint {
    /// a short human readable name of the constraint pattern
    pub fn name(&self) -> &'static str {
        match self {
            LinearConstraint::Unconstrained => "unconstrained",
            LinearConstraint::NonNegative => "non-negative",
            LinearConstraint::Box => "box constrained",
        }
    }
}

/// The constraint classification of a problem. It is computed once from the
/// bounds of both parameter groups and does not change during a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintClass {
    linear: LinearConstraint,
    constrained_nonlinear: bool,
}

impl ConstraintClass {
    /// classify the given nonlinear and linear bounds
    pub fn classify(nonlinear: &Bounds, linear: &Bounds) -> Self {
        let linear = if !linear.is_constrained() {
            LinearConstraint::Unconstrained
        } else if linear.is_non_negative_only() {
            LinearConstraint::NonNegative
        } else {
            LinearConstraint::Box
        };
        Self {
            linear,
            constrained_nonlinear: nonlinear.is_constrained(),
        }
    }

    /// the constraint pattern of the linear coefficients
    pub fn linear(&self) -> LinearConstraint {
        self.linear
    }

    /// true iff any linear bound is finite
    pub fn constrained_linear(&self) -> bool {
        self.linear != LinearConstraint::Unconstrained
    }

    /// true iff any nonlinear bound is finite
    pub fn constrained_nonlinear(&self) -> bool {
        self.constrained_nonlinear
    }

    /// true iff the linear coefficients are only constrained to be non-negative
    pub fn non_negative_only(&self) -> bool {
        self.linear == LinearConstraint::NonNegative
    }
}

/// Relative distance by which a starting point on a bound is moved inside: a fraction of
/// the interval width for two sided bounds and of `$\max(1, |b|)$` for a single bound `$b$`.
/// The transforms are stationary on the bounds, and the derivative `$dp/dq$` at the moved
/// point is of order `$\sqrt{2 \cdot 10^{-4}} \approx 0.014$`.
const BOUNDARY_OFFSET: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mapping {
    Free,
    Fixed(f64),
    Lower(f64),
    Upper(f64),
    Interval(f64, f64),
}

/// Invertible mapping between the bounded (external) nonlinear parameters
/// and the unbounded (internal) coordinates the optimizer works with.
///
/// This is the transformation used by MINUIT: for two sided bounds
/// `$p = l + (u-l)(\sin q + 1)/2$`, for a lower bound only `$p = l - 1 + \sqrt{q^2+1}$`
/// and for an upper bound only `$p = u + 1 - \sqrt{q^2+1}$`. Every internal value maps
/// into the box, so every iterate of an unconstrained optimizer in internal
/// coordinates respects the bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundTransform {
    mappings: Vec<Mapping>,
}

impl BoundTransform {
    /// create the transform for the given bounds
    pub fn new(bounds: &Bounds) -> Self {
        let mappings = bounds
            .lower()
            .iter()
            .zip(bounds.upper().iter())
            .map(|(&l, &u)| match (l.is_finite(), u.is_finite()) {
                (false, false) => Mapping::Free,
                (true, false) => Mapping::Lower(l),
                (false, true) => Mapping::Upper(u),
                (true, true) if l == u => Mapping::Fixed(l),
                (true, true) => Mapping::Interval(l, u),
            })
            .collect();
        Self { mappings }
    }

    /// Map bounded parameters to internal coordinates. Values are expected inside
    /// the bounds. Values on or very close to a bound are moved inside by a small
    /// relative offset first, so that the optimizer can leave the bound.
    pub fn to_internal(&self, external: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(external.len(), self.mappings.len());
        DVector::from_iterator(
            external.len(),
            external
                .iter()
                .zip(self.mappings.iter())
                .map(|(&p, mapping)| match *mapping {
                    Mapping::Free => p,
                    Mapping::Fixed(_) => 0.,
                    Mapping::Lower(l) => {
                        let distance = (p - l).max(BOUNDARY_OFFSET * l.abs().max(1.));
                        ((distance + 1.).powi(2) - 1.).sqrt()
                    }
                    Mapping::Upper(u) => {
                        let distance = (u - p).max(BOUNDARY_OFFSET * u.abs().max(1.));
                        ((distance + 1.).powi(2) - 1.).sqrt()
                    }
                    Mapping::Interval(l, u) => {
                        let scaled = (2. * (p - l) / (u - l) - 1.)
                            .clamp(-1. + BOUNDARY_OFFSET, 1. - BOUNDARY_OFFSET);
                        scaled.asin()
                    }
                }),
        )
    }

    /// Map internal coordinates back to bounded parameters. The result lies
    /// inside the bounds for every input.
    pub fn to_external(&self, internal: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(internal.len(), self.mappings.len());
        DVector::from_iterator(
            internal.len(),
            internal
                .iter()
                .zip(self.mappings.iter())
                .map(|(&q, mapping)| match *mapping {
                    Mapping::Free => q,
                    Mapping::Fixed(value) => value,
                    Mapping::Lower(l) => l - 1. + (q * q + 1.).sqrt(),
                    Mapping::Upper(u) => u + 1. - (q * q + 1.).sqrt(),
                    // rounding may leave the interval by an ulp
                    Mapping::Interval(l, u) => (l + (u - l) * (q.sin() + 1.) / 2.).clamp(l, u),
                }),
        )
    }
}

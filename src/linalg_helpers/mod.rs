#[cfg(test)]
mod test;

use nalgebra::{DMatrix, DVector};

/// condition number above which the forward operator is considered ill-conditioned
pub const ILL_CONDITIONED_THRESHOLD: f64 = 10.;

/// Classification of a linear operator by its condition number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conditioning {
    /// `$\kappa(\boldsymbol{A}) \leq 10$`: the unpenalized solve is stable
    WellConditioned,
    /// `$\kappa(\boldsymbol{A}) > 10$` or `$\boldsymbol{A}$` is rank deficient:
    /// the linear subproblem is solved with a penalty
    IllConditioned,
}

impl Conditioning {
    /// classify the given operator with the [ILL_CONDITIONED_THRESHOLD]
    pub fn of(operator: &DMatrix<f64>) -> Self {
        if condition_number(operator) > ILL_CONDITIONED_THRESHOLD {
            Conditioning::IllConditioned
        } else {
            Conditioning::WellConditioned
        }
    }

    /// whether this is [Conditioning::IllConditioned]
    pub fn is_ill_conditioned(&self) -> bool {
        matches!(self, Conditioning::IllConditioned)
    }
}

/// The 2-norm condition number `$\sigma_{max}/\sigma_{min}$` of the given matrix.
/// Rank deficient, empty and non-finite matrices have an infinite condition number.
pub fn condition_number(matrix: &DMatrix<f64>) -> f64 {
    if matrix.is_empty() || matrix.iter().any(|v| !v.is_finite()) {
        return f64::INFINITY;
    }
    let singular_values = matrix.singular_values();
    let max = singular_values.max();
    let min = singular_values.min();
    // a wide matrix always has a nontrivial null space
    if min <= 0. || matrix.ncols() > matrix.nrows() {
        f64::INFINITY
    } else {
        max / min
    }
}

/// Tells how an inverse was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Inversion {
    /// the matrix was regular and the inverse is exact up to rounding
    Regular,
    /// the matrix was (nearly) singular and the Moore-Penrose pseudo-inverse was used
    PseudoInverse,
}

/// Invert the given square matrix, falling back to the pseudo-inverse if the matrix
/// is near singular. Near singularity is detected from the reciprocal condition number,
/// which must exceed `$n \cdot \epsilon$`, not from a failed factorization.
pub(crate) fn inverse_or_pseudo_inverse(matrix: &DMatrix<f64>) -> (DMatrix<f64>, Inversion) {
    debug_assert!(matrix.is_square(), "only square matrices can be inverted");
    let n = matrix.nrows();
    let singular_values = matrix.singular_values();
    let max = singular_values.max();
    let min = singular_values.min();
    let threshold = n.max(1) as f64 * f64::EPSILON;
    if max > 0. && min / max > threshold {
        if let Some(inverse) = matrix.clone().try_inverse() {
            return (inverse, Inversion::Regular);
        }
    }
    log::debug!(
        "matrix of size {n}x{n} is near singular (rcond = {:e}), using pseudo-inverse",
        if max > 0. { min / max } else { 0. }
    );
    (pseudo_inverse(matrix), Inversion::PseudoInverse)
}

/// The Moore-Penrose pseudo-inverse computed from the SVD. Singular values below
/// `$\max(m,n)\,\epsilon\,\sigma_{max}$` are treated as zero.
pub(crate) fn pseudo_inverse(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let (nrows, ncols) = matrix.shape();
    let svd = matrix.clone().svd(true, true);
    let tolerance = nrows.max(ncols) as f64 * f64::EPSILON * svd.singular_values.max();
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        // both factors were requested, so they are always present
        return DMatrix::zeros(ncols, nrows);
    };
    let sigma_inv = svd
        .singular_values
        .map(|s| if s > tolerance { s.recip() } else { 0. });
    v_t.transpose() * DMatrix::from_diagonal(&sigma_inv) * u.transpose()
}

/// Solve the linear least squares problem `$\min ||\boldsymbol{A}\vec{x} - \vec{b}||_2$`
/// with a singular value decomposition truncated at machine epsilon. This gives the
/// minimum norm solution for rank deficient matrices.
pub(crate) fn solve_least_squares(matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> DVector<f64> {
    let (nrows, ncols) = matrix.shape();
    let svd = matrix.clone().svd(true, true);
    let epsilon = nrows.max(ncols) as f64 * f64::EPSILON * svd.singular_values.max();
    svd.solve(rhs, epsilon)
        .unwrap_or_else(|_| pseudo_inverse(matrix) * rhs)
}

/// Calculate the derivative `$\partial \vec{f} / \partial p\,(p_0)$` of a vector valued
/// function of one real variable using central finite differences with accuracy `$O(h^6)$`.
/// The step size is the square root of the machine precision, scaled with `$|p_0|$`.
pub(crate) fn numerical_derivative<Func, E>(mut f: Func, p0: f64) -> Result<DVector<f64>, E>
where
    Func: FnMut(f64) -> Result<DVector<f64>, E>,
{
    let h = f64::EPSILON.sqrt() * p0.abs().max(1.);
    let minus_three = f(p0 - 3. * h)?;
    let minus_two = f(p0 - 2. * h)?;
    let minus_one = f(p0 - h)?;
    let plus_one = f(p0 + h)?;
    let plus_two = f(p0 + 2. * h)?;
    let plus_three = f(p0 + 3. * h)?;
    Ok(
        (-minus_three + minus_two * 9. - minus_one * 45. + plus_one * 45. - plus_two * 9.
            + plus_three)
            / (60. * h),
    )
}

/// Like [numerical_derivative], but every evaluation of `f` stays inside `[lower, upper]`.
/// Where the central stencil would leave the interval, a one sided stencil with accuracy
/// `$O(h^3)$` into the interior is used, with the step shortened if the interval is narrow.
/// The derivative with respect to a fixed parameter (`lower == upper`) is zero.
pub(crate) fn numerical_derivative_within<Func, E>(
    mut f: Func,
    p0: f64,
    lower: f64,
    upper: f64,
) -> Result<DVector<f64>, E>
where
    Func: FnMut(f64) -> Result<DVector<f64>, E>,
{
    let h = f64::EPSILON.sqrt() * p0.abs().max(1.);
    let room_below = p0 - lower;
    let room_above = upper - p0;
    if room_below >= 3. * h && room_above >= 3. * h {
        return numerical_derivative(f, p0);
    }
    let at_p0 = f(p0)?;
    if room_below <= 0. && room_above <= 0. {
        return Ok(DVector::zeros(at_p0.len()));
    }
    // step towards the side with more room
    let (h, direction) = if room_above >= room_below {
        (h.min(room_above / 3.), 1.)
    } else {
        (h.min(room_below / 3.), -1.)
    };
    let step = direction * h;
    let one = f(p0 + step)?;
    let two = f(p0 + 2. * step)?;
    let three = f(p0 + 3. * step)?;
    Ok((-at_p0 * 11. + one * 18. - two * 9. + three * 2.) / (6. * step))
}

/// helper function to concatenate two matrices by pasting the
/// columns after each other: [left,right]. The matrices must have
/// the same number of rows.
pub(crate) fn concat_colwise(left: &DMatrix<f64>, right: &DMatrix<f64>) -> DMatrix<f64> {
    assert_eq!(
        left.nrows(),
        right.nrows(),
        "left and right matrix must have the same number of rows"
    );
    let mut result = DMatrix::zeros(left.nrows(), left.ncols() + right.ncols());
    result.columns_mut(0, left.ncols()).copy_from(left);
    result
        .columns_mut(left.ncols(), right.ncols())
        .copy_from(right);
    result
}

/// helper function to stack two matrices on top of each other: [top;bottom].
/// The matrices must have the same number of columns.
pub(crate) fn concat_rowwise(top: &DMatrix<f64>, bottom: &DMatrix<f64>) -> DMatrix<f64> {
    assert_eq!(
        top.ncols(),
        bottom.ncols(),
        "top and bottom matrix must have the same number of columns"
    );
    let mut result = DMatrix::zeros(top.nrows() + bottom.nrows(), top.ncols());
    result.rows_mut(0, top.nrows()).copy_from(top);
    result
        .rows_mut(top.nrows(), bottom.nrows())
        .copy_from(bottom);
    result
}

/// concatenate two vectors: [top;bottom]
pub(crate) fn concat_vectors(top: &DVector<f64>, bottom: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(
        top.len() + bottom.len(),
        top.iter().chain(bottom.iter()).copied(),
    )
}

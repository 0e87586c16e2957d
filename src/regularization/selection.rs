//! Automatic choice of the regularization parameter `$\alpha$`.
//!
//! All criteria are evaluated on the Tikhonov problem
//! `$\min ||\boldsymbol{A}\vec{x}-\vec{y}||^2 + \alpha^2||\boldsymbol{L}\vec{x}||^2$`
//! with influence matrix
//!
//! ```math
//! \boldsymbol{H}(\alpha) = \boldsymbol{A}(\boldsymbol{A}^T\boldsymbol{A}+\alpha^2\boldsymbol{L}^T\boldsymbol{L})^{-1}\boldsymbol{A}^T,
//! ```
//!
//! whose trace is the effective number of parameters of the penalized fit.
//! The candidates form a logarithmic grid over the singular value range of
//! `$\boldsymbol{A}$`. For the score based criteria the best grid point is refined
//! with a Brent search in `$\log_{10}\alpha$` between its neighbours.
use crate::error::{ConfigurationError, DivergenceError};
use crate::linalg_helpers::inverse_or_pseudo_inverse;
use nalgebra::{DMatrix, DVector};
use std::str::FromStr;

/// number of candidates on the logarithmic grid
pub const GRID_SIZE: usize = 60;

/// weight of the plain GCV score in the robust GCV criterion
pub const ROBUST_GCV_GAMMA: f64 = 0.9;

const BRENT_TOLERANCE: f64 = 1e-4;
const BRENT_MAX_ITER: usize = 100;

/// Criterion for the automatic selection of the regularization parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SelectionCriterion {
    /// Akaike information criterion `$N\ln(RSS/N) + 2\,\mathrm{tr}(\boldsymbol{H})$`
    #[default]
    Aic,
    /// corrected Akaike information criterion for small samples
    Aicc,
    /// Bayesian information criterion `$N\ln(RSS/N) + \ln(N)\,\mathrm{tr}(\boldsymbol{H})$`
    Bic,
    /// generalized cross validation `$RSS/(1-\mathrm{tr}(\boldsymbol{H})/N)^2$`
    Gcv,
    /// robust generalized cross validation
    Rgcv,
    /// leave one out cross validation `$\sum_i (r_i/(1-H_{ii}))^2$`
    Cv,
    /// corner of the L-curve, i.e. the point of maximal curvature
    LCurve,
    /// point of the normalized L-curve closest to the origin
    LRadius,
}

impl SelectionCriterion {
    /// all available criteria
    pub const ALL: [SelectionCriterion; 8] = [
        SelectionCriterion::Aic,
        SelectionCriterion::Aicc,
        SelectionCriterion::Bic,
        SelectionCriterion::Gcv,
        SelectionCriterion::Rgcv,
        SelectionCriterion::Cv,
        SelectionCriterion::LCurve,
        SelectionCriterion::LRadius,
    ];

    /// the name by which the criterion is parsed
    pub fn name(&self) -> &'static str {
        match self {
            SelectionCriterion::Aic => "aic",
            SelectionCriterion::Aicc => "aicc",
            SelectionCriterion::Bic => "bic",
            SelectionCriterion::Gcv => "gcv",
            SelectionCriterion::Rgcv => "rgcv",
            SelectionCriterion::Cv => "cv",
            SelectionCriterion::LCurve => "lc",
            SelectionCriterion::LRadius => "lr",
        }
    }

    /// whether the criterion minimizes a score (as opposed to a geometric
    /// property of the whole L-curve)
    fn is_score_based(&self) -> bool {
        !matches!(self, SelectionCriterion::LCurve | SelectionCriterion::LRadius)
    }
}

impl FromStr for SelectionCriterion {
    type Err = ConfigurationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let lowercase = name.trim().to_ascii_lowercase();
        SelectionCriterion::ALL
            .into_iter()
            .find(|criterion| criterion.name() == lowercase)
            .ok_or_else(|| ConfigurationError::UnknownName {
                option: "regularization parameter criterion",
                name: name.to_string(),
            })
    }
}

impl std::fmt::Display for SelectionCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How the regularization parameter is obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegParam {
    /// select `$\alpha$` automatically with the given criterion
    Criterion(SelectionCriterion),
    /// use the given literal `$\alpha \geq 0$`
    Value(f64),
}

impl Default for RegParam {
    fn default() -> Self {
        RegParam::Criterion(SelectionCriterion::default())
    }
}

impl FromStr for RegParam {
    type Err = ConfigurationError;

    /// Parses either a criterion name such as `"gcv"` or a literal value such as `"0.5"`.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if let Ok(criterion) = name.parse::<SelectionCriterion>() {
            return Ok(RegParam::Criterion(criterion));
        }
        match name.trim().parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 0. => Ok(RegParam::Value(value)),
            Ok(value) => Err(ConfigurationError::InvalidValue {
                option: "regularization parameter",
                requirement: "finite and non-negative",
                value,
            }),
            Err(_) => Err(ConfigurationError::UnknownName {
                option: "regularization parameter criterion",
                name: name.to_string(),
            }),
        }
    }
}

impl From<SelectionCriterion> for RegParam {
    fn from(criterion: SelectionCriterion) -> Self {
        RegParam::Criterion(criterion)
    }
}

/// The last selected regularization parameter together with the nonlinear
/// parameters it was selected for.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegParamCache {
    last_p: Option<DVector<f64>>,
    last_alpha: f64,
}

impl RegParamCache {
    /// an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached `$\alpha$`, if the cache holds a value that was selected for
    /// nonlinear parameters `last_p` with
    /// `$\max_i |p_{last,i} - p_i|/|p_i| < \theta$`.
    pub fn reusable(&self, p: &DVector<f64>, threshold: f64) -> Option<f64> {
        let last_p = self.last_p.as_ref()?;
        if last_p.len() != p.len() {
            return None;
        }
        (max_relative_change(last_p, p) < threshold).then_some(self.last_alpha)
    }

    /// store a newly selected `$\alpha$` for the parameters `p`
    pub fn update(&mut self, p: &DVector<f64>, alpha: f64) {
        self.last_p = Some(p.clone());
        self.last_alpha = alpha;
    }

    /// the nonlinear parameters of the last selection
    pub fn last_p(&self) -> Option<&DVector<f64>> {
        self.last_p.as_ref()
    }

    /// the last selected regularization parameter, if any
    pub fn last_alpha(&self) -> Option<f64> {
        self.last_p.as_ref().map(|_| self.last_alpha)
    }
}

/// `$\max_i |a_i - b_i|/|b_i|$`, where a vanishing `$b_i$` counts as an infinite
/// change unless `$a_i = b_i$`.
fn max_relative_change(previous: &DVector<f64>, current: &DVector<f64>) -> f64 {
    previous
        .iter()
        .zip(current.iter())
        .map(|(&a, &b)| {
            let diff = (a - b).abs();
            if diff == 0. {
                0.
            } else if b == 0. {
                f64::INFINITY
            } else {
                diff / b.abs()
            }
        })
        .fold(0., f64::max)
}

/// Quantities of the Tikhonov regularized fit for a fixed `$\alpha$`.
#[derive(Debug, Clone)]
pub(crate) struct TikhonovFit {
    /// the penalized least squares coefficients
    pub coefficients: DVector<f64>,
    /// `$\vec{y}-\boldsymbol{A}\vec{x}$`
    pub residuals: DVector<f64>,
    /// diagonal of the influence matrix
    pub leverages: DVector<f64>,
    /// trace of the influence matrix
    pub trace: f64,
    /// `$\mathrm{tr}(\boldsymbol{H}^2)$`, only calculated for the robust GCV criterion
    pub trace_squared: Option<f64>,
    /// `$||\boldsymbol{L}\vec{x}||$`
    pub penalty_norm: f64,
}

impl TikhonovFit {
    fn rss(&self) -> f64 {
        self.residuals.norm_squared()
    }
}

/// Precomputed products that do not depend on `$\alpha$`.
#[allow(non_snake_case)]
pub(crate) struct TikhonovProblem<'a> {
    A: &'a DMatrix<f64>,
    L: &'a DMatrix<f64>,
    y: &'a DVector<f64>,
    AtA: DMatrix<f64>,
    LtL: DMatrix<f64>,
    Aty: DVector<f64>,
}

#[allow(non_snake_case)]
impl<'a> TikhonovProblem<'a> {
    pub fn new(A: &'a DMatrix<f64>, y: &'a DVector<f64>, L: &'a DMatrix<f64>) -> Self {
        let At = A.transpose();
        Self {
            AtA: &At * A,
            LtL: L.transpose() * L,
            Aty: &At * y,
            A,
            L,
            y,
        }
    }

    /// solve the penalized problem for the given `$\alpha$`
    pub fn fit(&self, alpha: f64, with_trace_squared: bool) -> TikhonovFit {
        let M = &self.AtA + &self.LtL * (alpha * alpha);
        let (M_inv, _) = inverse_or_pseudo_inverse(&M);
        let coefficients = &M_inv * &self.Aty;
        let residuals = self.y - self.A * &coefficients;
        // B = A M^{-1}, so that H = B A^T
        let B = self.A * &M_inv;
        let leverages = DVector::from_iterator(
            self.A.nrows(),
            B.row_iter()
                .zip(self.A.row_iter())
                .map(|(b, a)| b.dot(&a)),
        );
        let trace = leverages.sum();
        // H is symmetric, hence tr(H^2) is its squared Frobenius norm
        let trace_squared = with_trace_squared.then(|| (&B * self.A.transpose()).norm_squared());
        let penalty_norm = (self.L * &coefficients).norm();
        TikhonovFit {
            coefficients,
            residuals,
            leverages,
            trace,
            trace_squared,
            penalty_norm,
        }
    }
}

/// The score of a score based criterion, smaller is better. Returns a non-finite
/// value when the criterion is undefined for the given fit.
pub(crate) fn score(criterion: SelectionCriterion, fit: &TikhonovFit) -> f64 {
    let n = fit.residuals.len() as f64;
    let rss = fit.rss().max(f64::MIN_POSITIVE);
    let trace = fit.trace;
    let log_likelihood_term = n * (rss / n).ln();
    match criterion {
        SelectionCriterion::Aic => log_likelihood_term + 2. * trace,
        SelectionCriterion::Aicc => {
            let denominator = n - trace - 1.;
            if denominator <= 0. {
                f64::INFINITY
            } else {
                log_likelihood_term + 2. * trace + 2. * trace * (trace + 1.) / denominator
            }
        }
        SelectionCriterion::Bic => log_likelihood_term + n.ln() * trace,
        SelectionCriterion::Gcv => gcv(rss, trace, n),
        SelectionCriterion::Rgcv => {
            let trace_squared = fit.trace_squared.unwrap_or(trace * trace / n);
            gcv(rss, trace, n) * (ROBUST_GCV_GAMMA + (1. - ROBUST_GCV_GAMMA) * trace_squared / n)
        }
        SelectionCriterion::Cv => fit
            .residuals
            .iter()
            .zip(fit.leverages.iter())
            .map(|(r, h)| (r / (1. - h)).powi(2))
            .sum(),
        SelectionCriterion::LCurve | SelectionCriterion::LRadius => f64::NAN,
    }
}

fn gcv(rss: f64, trace: f64, n: f64) -> f64 {
    rss / (1. - trace / n).powi(2)
}

/// Select the regularization parameter for the linear operator `a`, the data `y`
/// and the penalty operator `l` with the given criterion.
///
/// The candidates are always scored with the unconstrained Tikhonov solution, even if the
/// linear coefficients are non-negative or boxed. The constraints only enter the
/// subsequent solve with the selected parameter.
///
/// # Errors
///
/// Returns a [DivergenceError::RegParamSelection] if no candidate yields a finite score.
pub fn select_regularization_parameter(
    criterion: SelectionCriterion,
    a: &DMatrix<f64>,
    y: &DVector<f64>,
    l: &DMatrix<f64>,
) -> Result<f64, DivergenceError> {
    let problem = TikhonovProblem::new(a, y, l);
    let log_alphas = candidate_grid(a);
    let with_trace_squared = criterion == SelectionCriterion::Rgcv;
    let fits: Vec<TikhonovFit> = log_alphas
        .iter()
        .map(|log_alpha| problem.fit(10f64.powf(*log_alpha), with_trace_squared))
        .collect();

    let selected = if criterion.is_score_based() {
        let scores: Vec<f64> = fits.iter().map(|fit| score(criterion, fit)).collect();
        let best = argmin_finite(&scores).ok_or(DivergenceError::RegParamSelection {
            criterion: criterion.name(),
        })?;
        let lo = log_alphas[best.saturating_sub(1)];
        let hi = log_alphas[(best + 1).min(log_alphas.len() - 1)];
        let objective = |log_alpha: f64| {
            let s = score(criterion, &problem.fit(10f64.powf(log_alpha), with_trace_squared));
            if s.is_finite() {
                s
            } else {
                f64::INFINITY
            }
        };
        let (refined, refined_score) = brent_minimize(objective, lo, hi);
        if refined_score <= scores[best] {
            refined
        } else {
            log_alphas[best]
        }
    } else {
        let rho: Vec<f64> = fits.iter().map(|fit| fit.rss().sqrt().ln()).collect();
        let eta: Vec<f64> = fits.iter().map(|fit| fit.penalty_norm.ln()).collect();
        let best = match criterion {
            SelectionCriterion::LCurve => l_curve_corner(&log_alphas, &rho, &eta),
            _ => l_curve_min_radius(&rho, &eta),
        }
        .ok_or(DivergenceError::RegParamSelection {
            criterion: criterion.name(),
        })?;
        log_alphas[best]
    };

    let alpha = 10f64.powf(selected);
    log::debug!("selected regularization parameter {alpha:e} with criterion '{criterion}'");
    Ok(alpha)
}

/// `$\log_{10}$` of the candidate parameters, spanning the nonzero singular values of `a`
fn candidate_grid(a: &DMatrix<f64>) -> Vec<f64> {
    let singular_values = a.singular_values();
    let sigma_max = singular_values.max();
    let (lo, hi) = if sigma_max > 0. && sigma_max.is_finite() {
        let sigma_min = singular_values
            .iter()
            .copied()
            .filter(|s| *s > sigma_max * 1e-12)
            .fold(sigma_max, f64::min);
        if sigma_max / sigma_min < 10. {
            (sigma_min * 1e-2, sigma_max)
        } else {
            (sigma_min, sigma_max)
        }
    } else {
        (1e-3, 1.)
    };
    let (lo, hi) = (lo.log10(), hi.log10());
    (0..GRID_SIZE)
        .map(|i| lo + (hi - lo) * i as f64 / (GRID_SIZE - 1) as f64)
        .collect()
}

fn argmin_finite(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best: Option<(usize, f64)>, (idx, &v)| match best {
            Some((_, b)) if b <= v => best,
            _ => Some((idx, v)),
        })
        .map(|(idx, _)| idx)
}

/// index of maximal signed curvature of the curve `(rho, eta)` parametrized by `t`
fn l_curve_corner(t: &[f64], rho: &[f64], eta: &[f64]) -> Option<usize> {
    let n = t.len();
    if n < 3 {
        return argmin_finite(rho);
    }
    let curvature: Vec<f64> = (0..n)
        .map(|i| {
            if i == 0 || i == n - 1 {
                return f64::NAN;
            }
            let h = t[i + 1] - t[i];
            let d_rho = (rho[i + 1] - rho[i - 1]) / (2. * h);
            let d_eta = (eta[i + 1] - eta[i - 1]) / (2. * h);
            let dd_rho = (rho[i + 1] - 2. * rho[i] + rho[i - 1]) / (h * h);
            let dd_eta = (eta[i + 1] - 2. * eta[i] + eta[i - 1]) / (h * h);
            let norm = (d_rho * d_rho + d_eta * d_eta).powf(1.5);
            (d_rho * dd_eta - dd_rho * d_eta) / norm
        })
        .collect();
    let negated: Vec<f64> = curvature.iter().map(|k| -k).collect();
    argmin_finite(&negated)
}

/// index of the point of the L-curve, normalized to the unit square, closest to the origin
fn l_curve_min_radius(rho: &[f64], eta: &[f64]) -> Option<usize> {
    let normalize = |values: &[f64]| -> Vec<f64> {
        let finite = values.iter().copied().filter(|v| v.is_finite());
        let min = finite.clone().fold(f64::INFINITY, f64::min);
        let max = finite.fold(f64::NEG_INFINITY, f64::max);
        let range = if max > min { max - min } else { 1. };
        values.iter().map(|v| (v - min) / range).collect()
    };
    let rho = normalize(rho);
    let eta = normalize(eta);
    let radius: Vec<f64> = rho
        .iter()
        .zip(eta.iter())
        .map(|(r, e)| (r * r + e * e).sqrt())
        .collect();
    argmin_finite(&radius)
}

/// Brent's method for the minimization of a scalar function on `[a, b]`.
/// Returns the minimizer and the minimal value.
fn brent_minimize<F>(f: F, a: f64, b: f64) -> (f64, f64)
where
    F: Fn(f64) -> f64,
{
    const GOLDEN: f64 = 0.381_966_011_250_105;
    let (mut a, mut b) = if a <= b { (a, b) } else { (b, a) };
    let mut x = a + GOLDEN * (b - a);
    let mut w = x;
    let mut v = x;
    let mut fx = f(x);
    let mut fw = fx;
    let mut fv = fx;
    let mut d: f64 = 0.;
    let mut e: f64 = 0.;

    for _ in 0..BRENT_MAX_ITER {
        let mid = 0.5 * (a + b);
        let tol1 = BRENT_TOLERANCE * x.abs() + 1e-10;
        let tol2 = 2. * tol1;
        if (x - mid).abs() <= tol2 - 0.5 * (b - a) {
            break;
        }

        let mut golden_step = true;
        if e.abs() > tol1 {
            // parabola through x, w and v
            let r = (x - w) * (fx - fv);
            let q = (x - v) * (fx - fw);
            let p = (x - v) * q - (x - w) * r;
            let q = 2. * (q - r);
            let (p, q) = if q > 0. { (-p, q) } else { (p, -q) };
            let e_old = e;
            e = d;
            if p.abs() < (0.5 * q * e_old).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = if x < mid { tol1 } else { -tol1 };
                }
                golden_step = false;
            }
        }
        if golden_step {
            e = if x < mid { b - x } else { a - x };
            d = GOLDEN * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else if d > 0. {
            x + tol1
        } else {
            x - tol1
        };
        let fu = f(u);

        if fu <= fx {
            if u < x {
                b = x;
            } else {
                a = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }
    (x, fx)
}

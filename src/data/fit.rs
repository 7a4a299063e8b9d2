use nalgebra::{DMatrix, DVector, Matrix4, Vector4};
use thiserror::Error;

/// Upper bound on model evaluations, one per trial step.
pub const MAX_EVALUATIONS: usize = 10_000;

/// Time constants never go below this, keeping `exp(-t / tau)` finite.
const TAU_FLOOR: f64 = 1e-12;

const COST_TOLERANCE: f64 = 1e-12;
const STEP_TOLERANCE: f64 = 1e-10;
const GRADIENT_TOLERANCE: f64 = 1e-14;
const MAX_DAMPING: f64 = 1e16;

#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    #[error("need more than 4 points to fit 4 parameters, got {0}")]
    TooFewPoints(usize),
    #[error("x and y have different lengths ({0} vs {1})")]
    LengthMismatch(usize, usize),
    #[error("input contains non-finite values")]
    NonFinite,
    #[error("did not converge within {0} evaluations")]
    MaxEvaluations(usize),
}

/// Solver output in model order `(a, tau1, b, tau2)`.
///
/// `covariance` is all `+inf` when the parameters are not identifiable at the
/// solution, e.g. a single-component decay where both taus coincide.
#[derive(Debug, Clone, PartialEq)]
pub struct FitParams {
    pub params: Vector4<f64>,
    pub covariance: Matrix4<f64>,
    pub evaluations: usize,
}

/// `a * exp(-t / tau1) + b * exp(-t / tau2)`
pub fn double_exponential(t: f64, p: &Vector4<f64>) -> f64 {
    p[0] * (-t / p[1]).exp() + p[2] * (-t / p[3]).exp()
}

/// Least-squares fit of [`double_exponential`] to `(x, y)` with every
/// parameter constrained to `[0, ∞)`.
///
/// Levenberg–Marquardt on the analytic Jacobian; after each trial step the
/// parameters are projected back onto the bounds.
pub fn fit_double_exponential(x: &[f64], y: &[f64]) -> Result<FitParams, FitError> {
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch(x.len(), y.len()));
    }
    let n = x.len();
    if n <= 4 {
        return Err(FitError::TooFewPoints(n));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }

    let mut p = initial_guess(x, y);
    let mut current = residuals(x, y, &p);
    let mut cost = current.norm_squared();
    let mut evaluations = 1;
    let mut damping = 1e-3;

    loop {
        let jac = jacobian(x, &p);
        let jtj = jac.transpose() * &jac;
        let gradient = jac.transpose() * &current;
        if gradient.amax() <= GRADIENT_TOLERANCE {
            break;
        }

        let mut improved = false;
        while !improved {
            if evaluations >= MAX_EVALUATIONS {
                return Err(FitError::MaxEvaluations(MAX_EVALUATIONS));
            }
            if damping > MAX_DAMPING {
                // No downhill step left at any scale: we are at a minimum.
                return Ok(finish(x, &p, cost, evaluations));
            }

            let mut lhs = jtj.clone();
            for i in 0..4 {
                lhs[(i, i)] += damping * jtj[(i, i)].max(f64::EPSILON);
            }
            let Some(step) = lhs.lu().solve(&(-gradient.clone())) else {
                damping *= 10.0;
                continue;
            };

            let trial = project(p + Vector4::new(step[0], step[1], step[2], step[3]));
            let trial_residuals = residuals(x, y, &trial);
            let trial_cost = trial_residuals.norm_squared();
            evaluations += 1;

            if trial_cost.is_finite() && trial_cost < cost {
                let moved = (&trial - &p).norm();
                let reduction = (cost - trial_cost) / cost.max(f64::MIN_POSITIVE);
                p = trial;
                current = trial_residuals;
                cost = trial_cost;
                damping = (damping / 10.0).max(1e-12);
                improved = true;

                if reduction <= COST_TOLERANCE || moved <= STEP_TOLERANCE * (p.norm() + STEP_TOLERANCE) {
                    return Ok(finish(x, &p, cost, evaluations));
                }
            } else {
                damping *= 10.0;
            }
        }
    }
    Ok(finish(x, &p, cost, evaluations))
}

fn finish(x: &[f64], p: &Vector4<f64>, cost: f64, evaluations: usize) -> FitParams {
    let jac = jacobian(x, p);
    let jtj = jac.transpose() * &jac;
    let jtj = Matrix4::from_fn(|i, j| jtj[(i, j)]);
    let dof = (x.len() - 4) as f64;
    let covariance = match jtj.try_inverse() {
        Some(inverse) => inverse * (cost / dof),
        None => {
            log::debug!("normal matrix is singular at {p:?}, covariance unavailable");
            Matrix4::from_element(f64::INFINITY)
        }
    };
    log::debug!("double exponential fit converged after {evaluations} evaluations: {p:?}");
    FitParams {
        params: *p,
        covariance,
        evaluations,
    }
}

/// A fast and a slow component sharing the peak, with time constants taken
/// from the span of the window.
fn initial_guess(x: &[f64], y: &[f64]) -> Vector4<f64> {
    let (lo, hi) = x
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = (hi - lo).max(TAU_FLOOR * 10.0);
    let peak = y.iter().cloned().fold(0.0_f64, f64::max).max(f64::EPSILON);
    // Amplitudes are defined at t = 0, which may lie before the window.
    let at_start = |tau: f64| peak * (lo / tau).min(50.0).exp();
    let (tau_fast, tau_slow) = (span / 10.0, span / 2.0);
    Vector4::new(at_start(tau_fast) / 2.0, tau_fast, at_start(tau_slow) / 2.0, tau_slow)
}

fn project(p: Vector4<f64>) -> Vector4<f64> {
    Vector4::new(p[0].max(0.0), p[1].max(TAU_FLOOR), p[2].max(0.0), p[3].max(TAU_FLOOR))
}

fn residuals(x: &[f64], y: &[f64], p: &Vector4<f64>) -> DVector<f64> {
    DVector::from_iterator(
        x.len(),
        x.iter().zip(y).map(|(&t, &v)| double_exponential(t, p) - v),
    )
}

fn jacobian(x: &[f64], p: &Vector4<f64>) -> DMatrix<f64> {
    let (a, tau1, b, tau2) = (p[0], p[1], p[2], p[3]);
    DMatrix::from_fn(x.len(), 4, |row, col| {
        let t = x[row];
        match col {
            0 => (-t / tau1).exp(),
            1 => a * (-t / tau1).exp() * t / (tau1 * tau1),
            2 => (-t / tau2).exp(),
            _ => b * (-t / tau2).exp() * t / (tau2 * tau2),
        }
    })
}

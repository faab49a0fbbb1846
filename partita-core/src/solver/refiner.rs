//! Nonlinear least-squares refinement of the time transform
//!
//! Fits `r ≈ s·p + t` over mapped note pairs with Levenberg-Marquardt.
//! The scale is parametrized as `s = exp(σ)` so it stays positive, which
//! makes the residuals nonlinear in the unknowns `(σ, t)`.

/// Relative variance below which the performed positions are degenerate
const VARIANCE_EPSILON: f64 = 1e-12;

/// Normal-matrix condition number above which a solution is flagged
const SINGULAR_CONDITION: f64 = 1e10;

const INITIAL_DAMPING: f64 = 1e-3;
const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e12;
const STEP_EPSILON: f64 = 1e-12;
const COST_EPSILON: f64 = 1e-24;

pub struct Problem<'a> {
    /// Reference positions
    pub r: &'a [f64],
    /// Performed positions
    pub p: &'a [f64],
    /// Starting scale (usually from the coarse alignment)
    pub initial_s: f64,
    /// Starting offset
    pub initial_t: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Refinement {
    pub s: f64,
    pub t: f64,
    /// The normal matrix at the solution is ill-conditioned
    pub singular: bool,
    pub iterations: usize,
    /// Root mean square residual
    pub rms: f64,
}

/// Refine `(s, t)`; `None` when the system cannot be solved
pub fn refine(problem: &Problem<'_>, max_iterations: usize) -> Option<Refinement> {
    let n = problem.r.len().min(problem.p.len());
    if n < 2 {
        return None;
    }
    let r = &problem.r[..n];
    let p = &problem.p[..n];

    let mean_p = p.iter().sum::<f64>() / n as f64;
    let variance = p.iter().map(|x| (x - mean_p).powi(2)).sum::<f64>() / n as f64;
    let magnitude = p.iter().map(|x| x * x).sum::<f64>() / n as f64;
    if !(variance > VARIANCE_EPSILON * magnitude.max(f64::MIN_POSITIVE)) {
        return None;
    }

    let mut sigma = if problem.initial_s > 0.0 && problem.initial_s.is_finite() {
        problem.initial_s.ln()
    } else {
        0.0
    };
    let mut t = if problem.initial_t.is_finite() {
        problem.initial_t
    } else {
        0.0
    };

    let mut current = cost(r, p, sigma, t);
    let mut damping = INITIAL_DAMPING;
    let mut iterations = 0;

    while iterations < max_iterations && current > COST_EPSILON {
        iterations += 1;

        let normal = NormalEquations::at(r, p, sigma, t);
        let mut step = None;

        while damping < MAX_DAMPING {
            if let Some((d_sigma, d_t)) = normal.damped_step(damping) {
                let candidate = cost(r, p, sigma + d_sigma, t + d_t);
                if candidate < current {
                    sigma += d_sigma;
                    t += d_t;
                    current = candidate;
                    damping = (damping * 0.1).max(MIN_DAMPING);
                    step = Some(d_sigma.abs() + d_t.abs());
                    break;
                }
            }
            damping *= 10.0;
        }

        match step {
            Some(size) if size > STEP_EPSILON => {}
            _ => break,
        }
    }

    let s = sigma.exp();
    if !s.is_finite() || !t.is_finite() {
        return None;
    }

    let normal = NormalEquations::at(r, p, sigma, t);
    Some(Refinement {
        s,
        t,
        singular: normal.condition_number() > SINGULAR_CONDITION,
        iterations,
        rms: (2.0 * current / n as f64).sqrt(),
    })
}

/// Half the sum of squared residuals
fn cost(r: &[f64], p: &[f64], sigma: f64, t: f64) -> f64 {
    let s = sigma.exp();
    0.5 * r
        .iter()
        .zip(p)
        .map(|(&r, &p)| (s * p + t - r).powi(2))
        .sum::<f64>()
}

/// `JᵀJ` and `Jᵀe` with Jacobian rows `[s·p, 1]`
struct NormalEquations {
    a11: f64,
    a12: f64,
    a22: f64,
    g1: f64,
    g2: f64,
}

impl NormalEquations {
    fn at(r: &[f64], p: &[f64], sigma: f64, t: f64) -> Self {
        let s = sigma.exp();
        let mut normal = NormalEquations {
            a11: 0.0,
            a12: 0.0,
            a22: 0.0,
            g1: 0.0,
            g2: 0.0,
        };

        for (&r, &p) in r.iter().zip(p) {
            let ds = s * p;
            let e = ds + t - r;
            normal.a11 += ds * ds;
            normal.a12 += ds;
            normal.a22 += 1.0;
            normal.g1 += ds * e;
            normal.g2 += e;
        }
        normal
    }

    /// Solve `(JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀe`
    fn damped_step(&self, damping: f64) -> Option<(f64, f64)> {
        let b11 = self.a11 * (1.0 + damping);
        let b22 = self.a22 * (1.0 + damping);
        let det = b11 * b22 - self.a12 * self.a12;
        if !(det > 0.0) || !det.is_finite() {
            return None;
        }

        let d_sigma = -(b22 * self.g1 - self.a12 * self.g2) / det;
        let d_t = -(b11 * self.g2 - self.a12 * self.g1) / det;
        Some((d_sigma, d_t))
    }

    fn condition_number(&self) -> f64 {
        let half_trace = 0.5 * (self.a11 + self.a22);
        let spread = (0.25 * (self.a11 - self.a22).powi(2) + self.a12 * self.a12).sqrt();
        let largest = half_trace + spread;
        let smallest = half_trace - spread;
        if smallest <= 0.0 {
            f64::INFINITY
        } else {
            largest / smallest
        }
    }
}

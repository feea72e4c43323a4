//! Sequential minimal optimization for the soft-margin RBF kernel machine.
//!
//! Solves the dual problem
//!
//! ```text
//! min  1/2 αᵀQα − eᵀα    subject to  0 ≤ αᵢ ≤ C,  yᵀα = 0
//! ```
//!
//! where `Qᵢⱼ = yᵢ yⱼ K(xᵢ, xⱼ)`. Working pairs are chosen with second-order
//! information (maximal violating `i`, then the `j` with the largest objective
//! decrease). Kernel rows are computed on demand and held in a bounded cache.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tracing::debug;

use crate::error::ClassifyError;

/// Floor for non-positive curvature along a working pair.
const TAU: f64 = 1e-12;

/// Kernel row cache budget in bytes.
const CACHE_BYTES: usize = 64 << 20;

/// Gaussian radial basis function `exp(-γ ‖a − b‖²)`.
#[inline]
pub(crate) fn rbf(a: &[f64], b: &[f64], gamma: f64) -> f64 {
    let sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (-gamma * sq).exp()
}

/// Solver settings for one fit.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SolverConfig {
    pub cost: f64,
    pub gamma: f64,
    pub tolerance: f64,
    pub max_iter: usize,
}

/// Dual solution: one multiplier per training record plus the bias.
#[derive(Debug)]
pub(crate) struct Solution {
    pub alpha: Vec<f64>,
    pub rho: f64,
    pub iterations: usize,
}

/// FIFO cache of full kernel rows.
struct KernelRows<'a> {
    x: &'a [Vec<f64>],
    gamma: f64,
    capacity: usize,
    rows: HashMap<usize, Rc<[f64]>>,
    order: VecDeque<usize>,
}

impl<'a> KernelRows<'a> {
    fn new(x: &'a [Vec<f64>], gamma: f64) -> Self {
        let row_bytes = x.len().max(1) * std::mem::size_of::<f64>();
        let capacity = (CACHE_BYTES / row_bytes).max(2);
        Self {
            x,
            gamma,
            capacity,
            rows: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn row(&mut self, i: usize) -> Rc<[f64]> {
        if let Some(row) = self.rows.get(&i) {
            return Rc::clone(row);
        }
        let xi = &self.x[i];
        let row: Rc<[f64]> = self.x.iter().map(|xt| rbf(xi, xt, self.gamma)).collect();
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.rows.remove(&evicted);
            }
        }
        self.order.push_back(i);
        self.rows.insert(i, Rc::clone(&row));
        row
    }
}

/// Solve the dual for features `x` and targets `y ∈ {−1, +1}`.
///
/// Both classes must be present in `y`; callers check this beforehand.
///
/// # Errors
///
/// Returns [`ClassifyError::SolverNotConverged`] if the stopping criterion is
/// not met within `config.max_iter` iterations.
pub(crate) fn solve(
    x: &[Vec<f64>],
    y: &[f64],
    config: &SolverConfig,
) -> Result<Solution, ClassifyError> {
    let n = x.len();
    let c = config.cost;
    let mut alpha = vec![0.0_f64; n];
    // Gradient of the dual objective: Qα − e.
    let mut grad = vec![-1.0_f64; n];
    let mut kernel = KernelRows::new(x, config.gamma);

    let at_upper = |a: f64| a >= c;
    let at_lower = |a: f64| a <= 0.0;

    let mut iterations = 0;
    loop {
        // Select i: maximal violation among the indices that can still move up.
        let mut g_max = f64::NEG_INFINITY;
        let mut sel_i = None;
        for t in 0..n {
            let score = if y[t] > 0.0 {
                (!at_upper(alpha[t])).then_some(-grad[t])
            } else {
                (!at_lower(alpha[t])).then_some(grad[t])
            };
            if let Some(score) = score {
                if score >= g_max {
                    g_max = score;
                    sel_i = Some(t);
                }
            }
        }
        let Some(i) = sel_i else {
            break;
        };
        let k_i = kernel.row(i);

        // Select j: largest second-order decrease of the objective.
        let mut g_max2 = f64::NEG_INFINITY;
        let mut sel_j = None;
        let mut obj_min = f64::INFINITY;
        for t in 0..n {
            let violation = if y[t] > 0.0 {
                if at_lower(alpha[t]) {
                    continue;
                }
                g_max2 = g_max2.max(grad[t]);
                g_max + grad[t]
            } else {
                if at_upper(alpha[t]) {
                    continue;
                }
                g_max2 = g_max2.max(-grad[t]);
                g_max - grad[t]
            };
            if violation > 0.0 {
                let quad = 2.0 - 2.0 * k_i[t];
                let quad = if quad > 0.0 { quad } else { TAU };
                let obj = -(violation * violation) / quad;
                if obj <= obj_min {
                    obj_min = obj;
                    sel_j = Some(t);
                }
            }
        }

        if g_max + g_max2 < config.tolerance {
            break;
        }
        let Some(j) = sel_j else {
            break;
        };

        if iterations >= config.max_iter {
            return Err(ClassifyError::SolverNotConverged { iterations });
        }
        iterations += 1;

        let k_j = kernel.row(j);
        let (old_i, old_j) = (alpha[i], alpha[j]);
        let quad = {
            let q = 2.0 - 2.0 * k_i[j];
            if q > 0.0 { q } else { TAU }
        };

        if (y[i] > 0.0) != (y[j] > 0.0) {
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;
            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > 0.0 {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = c - diff;
                }
            } else if alpha[j] > c {
                alpha[j] = c;
                alpha[i] = c + diff;
            }
        } else {
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;
            if sum > c {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = sum - c;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > c {
                if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = sum - c;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let d_i = (alpha[i] - old_i) * y[i];
        let d_j = (alpha[j] - old_j) * y[j];
        for t in 0..n {
            grad[t] += y[t] * (k_i[t] * d_i + k_j[t] * d_j);
        }
    }

    let rho = bias(&alpha, &grad, y, c);
    let n_support = alpha.iter().filter(|&&a| a > 0.0).count();
    debug!(iterations, n_support, rho, "solver converged");

    Ok(Solution {
        alpha,
        rho,
        iterations,
    })
}

/// Bias term: the mean of `yₜ Gₜ` over free multipliers, or the midpoint of
/// the feasible interval when every multiplier sits at a bound.
fn bias(alpha: &[f64], grad: &[f64], y: &[f64], c: f64) -> f64 {
    let mut upper = f64::INFINITY;
    let mut lower = f64::NEG_INFINITY;
    let mut free_sum = 0.0;
    let mut n_free = 0usize;

    for ((&a, &g), &yt) in alpha.iter().zip(grad).zip(y) {
        let yg = yt * g;
        let positive = yt > 0.0;
        if a >= c {
            if positive {
                lower = lower.max(yg);
            } else {
                upper = upper.min(yg);
            }
        } else if a <= 0.0 {
            if positive {
                upper = upper.min(yg);
            } else {
                lower = lower.max(yg);
            }
        } else {
            n_free += 1;
            free_sum += yg;
        }
    }

    if n_free > 0 {
        return free_sum / n_free as f64;
    }
    match (upper.is_finite(), lower.is_finite()) {
        (true, true) => (upper + lower) / 2.0,
        (true, false) => upper,
        (false, true) => lower,
        (false, false) => 0.0,
    }
}

//! Sequential quadratic programming solver
//!
//! Each iteration linearises the constraints about the current point and solves the quadratic
//! subproblem in the step `d`
//!
//! ```text
//! minimise    0.5 d' H d + g' d
//! subject to  J d = -c
//!             lb - z <= d <= ub - z
//! ```
//!
//! with OSQP. The step is then scaled by a backtracking line search on the l1 merit function
//! `J(z) + mu |c(z)|_1`, the penalty `mu` being raised above the largest equality multiplier
//! OSQP reports.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, trace};
use nalgebra::{DMatrix, DVector};
use osqp::{CscMatrix, Problem, Settings, Status};
use std::{borrow::Cow, time::Instant};

use super::{NlpProblem, NlpSolution, NlpSolver, SolveError, SolverParams};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Sufficient decrease coefficient of the line search.
const ARMIJO_COEFF: f64 = 1e-4;

/// Smallest step fraction the line search will try.
const MIN_STEP_FRAC: f64 = 1.0 / 1024.0;

/// Margin by which the merit penalty exceeds the largest multiplier.
const PENALTY_MARGIN: f64 = 1.1;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// SQP solver using OSQP for its subproblems.
#[derive(Debug, Clone, Default)]
pub struct SqpSolver {
    params: SolverParams,
}

/// Solution of one QP subproblem.
struct QpStep {
    /// The step
    d: DVector<f64>,

    /// Largest absolute equality multiplier
    max_eq_mult: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SqpSolver {
    pub fn new(params: SolverParams) -> Self {
        Self { params }
    }

    /// Build and solve the QP subproblem at `z`.
    fn solve_subproblem<P: NlpProblem>(
        &self,
        problem: &P,
        z: &DVector<f64>,
        c: &DVector<f64>,
        bounds: &(DVector<f64>, DVector<f64>),
    ) -> Result<QpStep, SolveError> {
        let n = problem.num_vars();
        let m = problem.num_constraints();

        let mut hess = problem.cost_hessian(z);
        for i in 0..n {
            hess[(i, i)] += self.params.hessian_reg;
        }
        let grad = problem.cost_gradient(z);
        let jac = problem.constraint_jacobian(z);

        if hess.nrows() != n || hess.ncols() != n || grad.len() != n
            || jac.nrows() != m || jac.ncols() != n
        {
            return Err(SolveError::Dimensions(format!(
                "H {}x{}, g {}, J {}x{} for {} vars and {} constraints",
                hess.nrows(), hess.ncols(), grad.len(), jac.nrows(), jac.ncols(), n, m
            )));
        }

        // Only finitely bounded variables get a row in the constraint matrix
        let (lb, ub) = bounds;
        let bounded: Vec<usize> = (0..n)
            .filter(|&i| lb[i].is_finite() || ub[i].is_finite())
            .collect();

        let mut a = DMatrix::zeros(m + bounded.len(), n);
        let mut l = Vec::with_capacity(m + bounded.len());
        let mut u = Vec::with_capacity(m + bounded.len());

        for r in 0..m {
            for col in 0..n {
                a[(r, col)] = jac[(r, col)];
            }
            l.push(-c[r]);
            u.push(-c[r]);
        }
        for (r, &i) in bounded.iter().enumerate() {
            a[(m + r, i)] = 1.0;
            l.push(lb[i] - z[i]);
            u.push(ub[i] - z[i]);
        }

        let settings = Settings::default()
            .verbose(false)
            .polish(true)
            .eps_abs(self.params.qp_eps)
            .eps_rel(self.params.qp_eps)
            .max_iter(self.params.qp_max_iters);

        let mut qp = Problem::new(
            dense_to_csc(&hess, true),
            grad.as_slice(),
            dense_to_csc(&a, false),
            &l,
            &u,
            &settings
        ).map_err(|e| SolveError::QpSetup(format!("{:?}", e)))?;

        match qp.solve() {
            Status::Solved(sol) | Status::SolvedInaccurate(sol) => {
                let d = DVector::from_column_slice(sol.x());
                let max_eq_mult = sol.y()
                    .iter()
                    .take(m)
                    .fold(0.0f64, |acc, y| acc.max(y.abs()));

                Ok(QpStep { d, max_eq_mult })
            },
            Status::MaxIterationsReached(_) => Err(SolveError::QpFailed("max iterations reached")),
            Status::TimeLimitReached(_) => Err(SolveError::QpFailed("time limit reached")),
            Status::PrimalInfeasible(_) | Status::PrimalInfeasibleInaccurate(_) =>
                Err(SolveError::QpFailed("primal infeasible")),
            Status::DualInfeasible(_) | Status::DualInfeasibleInaccurate(_) =>
                Err(SolveError::QpFailed("dual infeasible")),
            _ => Err(SolveError::QpFailed("unknown status")),
        }
    }
}

impl NlpSolver for SqpSolver {
    fn solve<P: NlpProblem>(&self, problem: &P) -> Result<NlpSolution, SolveError> {
        let start = Instant::now();
        let bounds = problem.var_bounds();

        // Start inside the bounds
        let mut z = problem.initial_guess();
        for i in 0..z.len() {
            z[i] = z[i].max(bounds.0[i]).min(bounds.1[i]);
        }

        let mut penalty = 1.0f64;
        let mut c = problem.constraints(&z);
        let mut cost = problem.cost(&z);

        for iter in 1..=self.params.max_iters {
            let elapsed_s = start.elapsed().as_secs_f64();
            if elapsed_s > self.params.max_time_s {
                return Err(SolveError::TimeLimit {
                    limit_s: self.params.max_time_s,
                    iterations: iter - 1,
                });
            }

            if !cost.is_finite() || !c.iter().all(|v| v.is_finite()) {
                return Err(SolveError::NonFinite);
            }

            let step = self.solve_subproblem(problem, &z, &c, &bounds)?;
            if !step.d.iter().all(|v| v.is_finite()) {
                return Err(SolveError::NonFinite);
            }

            penalty = penalty.max(PENALTY_MARGIN * step.max_eq_mult + 1.0);

            // Backtracking line search on the l1 merit function
            let merit = cost + penalty * c.lp_norm(1);
            let slope = problem.cost_gradient(&z).dot(&step.d) - penalty * c.lp_norm(1);

            let mut alpha = 1.0;
            let (z_next, c_next, cost_next) = loop {
                let z_trial = &z + &step.d * alpha;
                let c_trial = problem.constraints(&z_trial);
                let cost_trial = problem.cost(&z_trial);
                let merit_trial = cost_trial + penalty * c_trial.lp_norm(1);

                let decreased = merit_trial <= merit + ARMIJO_COEFF * alpha * slope.min(0.0);
                if decreased || alpha <= MIN_STEP_FRAC || !merit_trial.is_finite() {
                    break (z_trial, c_trial, cost_trial);
                }
                alpha *= 0.5;
            };

            let step_norm = alpha * step.d.amax();
            z = z_next;
            c = c_next;
            cost = cost_next;

            let violation = c.amax();

            trace!(
                "SQP iter {}: cost = {:.6e}, violation = {:.3e}, step = {:.3e}, alpha = {}",
                iter, cost, violation, step_norm, alpha
            );

            if !cost.is_finite() || !z.iter().all(|v| v.is_finite()) {
                return Err(SolveError::NonFinite);
            }

            if step_norm <= self.params.step_tol * (1.0 + z.amax())
                && violation <= self.params.feas_tol
            {
                let solve_time_s = start.elapsed().as_secs_f64();
                debug!(
                    "SQP converged in {} iterations ({:.2} ms), cost = {:.6e}",
                    iter, solve_time_s * 1e3, cost
                );

                return Ok(NlpSolution {
                    z,
                    cost,
                    violation,
                    iterations: iter,
                    solve_time_s,
                });
            }
        }

        Err(SolveError::MaxIterations {
            iterations: self.params.max_iters,
            violation: c.amax(),
        })
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a dense matrix into OSQP's compressed sparse column format, dropping zeros.
///
/// If `upper_tri` is set only the upper triangle (including the diagonal) is kept, as OSQP
/// requires for the cost matrix.
fn dense_to_csc(m: &DMatrix<f64>, upper_tri: bool) -> CscMatrix<'static> {
    let mut indptr = Vec::with_capacity(m.ncols() + 1);
    let mut indices = Vec::new();
    let mut data = Vec::new();

    indptr.push(0);
    for col in 0..m.ncols() {
        let num_rows = match upper_tri {
            true => (col + 1).min(m.nrows()),
            false => m.nrows(),
        };

        for row in 0..num_rows {
            let v = m[(row, col)];
            if v != 0.0 {
                indices.push(row);
                data.push(v);
            }
        }
        indptr.push(indices.len());
    }

    CscMatrix {
        nrows: m.nrows(),
        ncols: m.ncols(),
        indptr: Cow::Owned(indptr),
        indices: Cow::Owned(indices),
        data: Cow::Owned(data),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// minimise (z0 - 1)^2 + (z1 - 2)^2 subject to z0^2 - z1 = 0, z0 in [-10, 0.5]
    struct Parabola {
        start: [f64; 2],
    }

    const PARABOLA: Parabola = Parabola { start: [0.0, 0.0] };

    impl NlpProblem for Parabola {
        fn num_vars(&self) -> usize { 2 }
        fn num_constraints(&self) -> usize { 1 }

        fn var_bounds(&self) -> (DVector<f64>, DVector<f64>) {
            (
                DVector::from_vec(vec![-10.0, std::f64::NEG_INFINITY]),
                DVector::from_vec(vec![0.5, std::f64::INFINITY]),
            )
        }

        fn initial_guess(&self) -> DVector<f64> {
            DVector::from_column_slice(&self.start)
        }

        fn cost(&self, z: &DVector<f64>) -> f64 {
            (z[0] - 1.0).powi(2) + (z[1] - 2.0).powi(2)
        }

        fn cost_gradient(&self, z: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![2.0 * (z[0] - 1.0), 2.0 * (z[1] - 2.0)])
        }

        fn cost_hessian(&self, _z: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_diagonal_element(2, 2, 2.0)
        }

        fn constraints(&self, z: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![z[0] * z[0] - z[1]])
        }

        fn constraint_jacobian(&self, z: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_row_slice(1, 2, &[2.0 * z[0], -1.0])
        }
    }

    fn test_params() -> SolverParams {
        SolverParams {
            max_time_s: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_dense_to_csc() {
        let m = DMatrix::from_row_slice(3, 3, &[
            1.0, 2.0, 0.0,
            2.0, 0.0, 3.0,
            0.0, 3.0, 4.0,
        ]);

        let full = dense_to_csc(&m, false);
        assert_eq!(&full.indptr[..], &[0, 2, 4, 6]);
        assert_eq!(&full.indices[..], &[0, 1, 0, 2, 1, 2]);
        assert_eq!(&full.data[..], &[1.0, 2.0, 2.0, 3.0, 3.0, 4.0]);

        let upper = dense_to_csc(&m, true);
        assert_eq!(&upper.indptr[..], &[0, 1, 2, 4]);
        assert_eq!(&upper.indices[..], &[0, 0, 1, 2]);
        assert_eq!(&upper.data[..], &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_bounded_parabola() {
        let sol = SqpSolver::new(test_params()).solve(&PARABOLA).unwrap();

        // The unconstrained optimum on the parabola has z0 > 0.5, so the bound is active
        assert!((sol.z[0] - 0.5).abs() < 1e-4, "{}", sol.z);
        assert!((sol.z[1] - 0.25).abs() < 1e-3, "{}", sol.z);
        assert!(sol.violation < 1e-4);
        assert!(sol.iterations >= 1);
    }

    #[test]
    fn test_infeasible_start() {
        // Starts off the parabola
        let problem = Parabola { start: [0.5, 1.0] };
        assert!(problem.constraints(&problem.initial_guess()).amax() > 0.5);

        let sol = SqpSolver::new(test_params()).solve(&problem).unwrap();

        assert!((sol.z[0] - 0.5).abs() < 1e-4, "{}", sol.z);
        assert!((sol.z[1] - 0.25).abs() < 1e-3, "{}", sol.z);
        assert!(sol.violation < 1e-4);
        assert!(sol.iterations >= 2);
        assert!(sol.cost.is_finite());
    }

    #[test]
    fn test_iteration_budget() {
        let params = SolverParams {
            max_iters: 1,
            ..test_params()
        };

        match SqpSolver::new(params).solve(&PARABOLA) {
            Err(SolveError::MaxIterations { iterations, .. }) => assert_eq!(iterations, 1),
            r => panic!("Expected the iteration budget to be exceeded, got {:?}", r),
        }
    }
}

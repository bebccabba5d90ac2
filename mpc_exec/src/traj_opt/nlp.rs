//! Nonlinear program interface
//!
//! A problem of the form
//!
//! ```text
//! minimise    J(z)
//! subject to  c(z) = 0
//!             lb <= z <= ub
//! ```
//!
//! where `J` is twice and `c` once differentiable. Problems provide their derivatives
//! analytically, solvers must not need anything else.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A nonlinear program with equality constraints and box bounds.
pub trait NlpProblem {
    /// Number of decision variables.
    fn num_vars(&self) -> usize;

    /// Number of equality constraints.
    fn num_constraints(&self) -> usize;

    /// Lower and upper bounds on the decision variables. Unbounded variables use infinite
    /// bounds.
    fn var_bounds(&self) -> (DVector<f64>, DVector<f64>);

    /// A starting point for the solver.
    fn initial_guess(&self) -> DVector<f64>;

    fn cost(&self, z: &DVector<f64>) -> f64;

    fn cost_gradient(&self, z: &DVector<f64>) -> DVector<f64>;

    /// Hessian of the cost, full and symmetric.
    fn cost_hessian(&self, z: &DVector<f64>) -> DMatrix<f64>;

    /// Value of the equality constraints, `num_constraints` long.
    fn constraints(&self, z: &DVector<f64>) -> DVector<f64>;

    /// Jacobian of the constraints, `num_constraints` by `num_vars`.
    fn constraint_jacobian(&self, z: &DVector<f64>) -> DMatrix<f64>;
}

/// A method of solving an [`NlpProblem`].
pub trait NlpSolver {
    fn solve<P: NlpProblem>(&self, problem: &P) -> Result<NlpSolution, SolveError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A converged solution to a nonlinear program.
#[derive(Debug, Clone)]
pub struct NlpSolution {
    /// The decision variables
    pub z: DVector<f64>,

    /// Cost at `z`
    pub cost: f64,

    /// Infinity norm of the constraint violation at `z`
    pub violation: f64,

    /// Number of solver iterations used
    pub iterations: u32,

    /// Wall clock time spent solving.
    ///
    /// Units: seconds
    pub solve_time_s: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Reasons a solve did not produce a usable solution.
#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    #[error("Did not converge within {iterations} iterations (violation {violation:.3e})")]
    MaxIterations { iterations: u32, violation: f64 },

    #[error("Exceeded the time limit of {limit_s} s after {iterations} iterations")]
    TimeLimit { limit_s: f64, iterations: u32 },

    #[error("Could not set up the QP subproblem: {0}")]
    QpSetup(String),

    #[error("QP subproblem failed: {0}")]
    QpFailed(&'static str),

    #[error("A non-finite value was encountered during the solve")]
    NonFinite,

    #[error("Problem dimensions are inconsistent: {0}")]
    Dimensions(String),
}

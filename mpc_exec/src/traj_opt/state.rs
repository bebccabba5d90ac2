//! Trajectory optimiser state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use nalgebra::Vector2;
use serde::Serialize;

use super::{MpcProblem, NlpProblem, NlpSolver, Params, ParamsError, SolveError, SqpSolver};
use crate::{
    poly_fit::Polynomial,
    vehicle_model::{Actuation, ModelState},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Trajectory optimiser.
///
/// Holds only immutable configuration, so a single instance can be shared between independent
/// control sessions.
#[derive(Debug, Clone)]
pub struct TrajOpt<S = SqpSolver> {
    params: Params,
    solver: S,
}

/// The result of a successful optimisation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrajOptSolution {
    /// The first actuation of the optimal sequence, the one to apply now.
    pub actuation: Actuation,

    /// Predicted positions of the vehicle over the horizon, excluding the initial state.
    ///
    /// Frame: Vehicle
    pub predicted_m: Vec<Vector2<f64>>,

    /// Final cost
    pub cost: f64,

    /// Number of solver iterations
    pub iterations: u32,

    /// Time spent solving.
    ///
    /// Units: seconds
    pub solve_time_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrajOpt<SqpSolver> {
    /// Create a new optimiser using the SQP solver.
    pub fn new(params: Params) -> Result<Self, ParamsError> {
        let solver = SqpSolver::new(params.solver.clone());
        Self::with_solver(params, solver)
    }
}

impl Default for TrajOpt<SqpSolver> {
    fn default() -> Self {
        let params = Params::default();
        Self {
            solver: SqpSolver::new(params.solver.clone()),
            params,
        }
    }
}

impl<S: NlpSolver> TrajOpt<S> {
    /// Create a new optimiser using the given solver.
    pub fn with_solver(params: Params, solver: S) -> Result<Self, ParamsError> {
        params.validate()?;
        Ok(Self { params, solver })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Find the optimal actuation from `init` for following `reference`.
    ///
    /// `init` and `reference` must both be expressed in the Vehicle frame.
    pub fn solve(
        &self,
        init: &ModelState,
        reference: &Polynomial,
    ) -> Result<TrajOptSolution, SolveError> {
        if !init.is_finite() || !reference.coeffs().iter().all(|c| c.is_finite()) {
            return Err(SolveError::NonFinite);
        }

        let problem = MpcProblem::new(&self.params, reference, *init);
        let sol = self.solver.solve(&problem)?;

        if sol.z.len() != problem.num_vars() {
            return Err(SolveError::Dimensions(format!(
                "solver returned {} variables, expected {}",
                sol.z.len(),
                problem.num_vars()
            )));
        }

        let actuation = problem.actuation(&sol.z, 0);
        let predicted_m = (1..problem.num_states())
            .map(|t| {
                let s = problem.state(&sol.z, t);
                Vector2::new(s.x_m, s.y_m)
            })
            .collect();

        trace!(
            "Optimal actuation: delta = {:.4} rad, a = {:.4}",
            actuation.delta_rad, actuation.accel
        );

        Ok(TrajOptSolution {
            actuation,
            predicted_m,
            cost: sol.cost,
            iterations: sol.iterations,
            solve_time_s: sol.solve_time_s,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_params() -> Params {
        let mut params = Params::default();
        params.solver.max_time_s = 10.0;
        params
    }

    #[test]
    fn test_straight_path() {
        let opt = TrajOpt::new(test_params()).unwrap();
        let reference = Polynomial::new(vec![0.0; 4]);
        let init = ModelState::at_origin(10.0, &reference);
        assert_eq!(init.cte_m, 0.0);
        assert_eq!(init.epsi_rad, 0.0);

        let sol = opt.solve(&init, &reference).unwrap();

        assert!(sol.actuation.delta_rad.abs() < 1e-3, "{:?}", sol.actuation);
        assert!(sol.actuation.accel > 0.0, "{:?}", sol.actuation);
        assert!(sol.actuation.accel <= 1.0 + 1e-6);
        assert_eq!(sol.predicted_m.len(), 9);
    }

    #[test]
    fn test_steers_right_towards_path() {
        // Path 2 m to the right of the vehicle
        let opt = TrajOpt::new(test_params()).unwrap();
        let reference = Polynomial::new(vec![-2.0, 0.0, 0.0, 0.0]);
        let init = ModelState::at_origin(10.0, &reference);

        let sol = opt.solve(&init, &reference).unwrap();

        assert!(sol.actuation.delta_rad > 0.0, "{:?}", sol.actuation);
    }

    #[test]
    fn test_steers_left_towards_path() {
        let opt = TrajOpt::new(test_params()).unwrap();
        let reference = Polynomial::new(vec![2.0, 0.0, 0.0, 0.0]);
        let init = ModelState::at_origin(10.0, &reference);

        let sol = opt.solve(&init, &reference).unwrap();

        assert!(sol.actuation.delta_rad < 0.0, "{:?}", sol.actuation);
    }

    #[test]
    fn test_actuation_within_limits() {
        let params = test_params();
        let max_steer = params.max_steer_rad;
        let opt = TrajOpt::new(params).unwrap();

        // Far off the path and angled away from it
        let reference = Polynomial::new(vec![-4.0, -0.4, 0.0, 0.0]);
        let init = ModelState::at_origin(30.0, &reference);

        let sol = opt.solve(&init, &reference).unwrap();

        assert!(sol.actuation.delta_rad.abs() <= max_steer + 1e-4, "{:?}", sol.actuation);
        assert!(sol.actuation.accel >= -1.0 - 1e-4 && sol.actuation.accel <= 1.0 + 1e-4);
    }

    #[test]
    fn test_solver_failure() {
        let mut params = test_params();
        params.solver.max_iters = 1;
        let opt = TrajOpt::new(params).unwrap();
        let reference = Polynomial::new(vec![-2.0, 0.1, 0.0, 0.0]);
        let init = ModelState::at_origin(10.0, &reference);

        assert!(opt.solve(&init, &reference).is_err());
    }

    #[test]
    fn test_non_finite_input() {
        let opt = TrajOpt::new(test_params()).unwrap();
        let reference = Polynomial::new(vec![std::f64::NAN, 0.0, 0.0, 0.0]);
        let init = ModelState::default();

        assert!(matches!(opt.solve(&init, &reference), Err(SolveError::NonFinite)));
    }

    #[test]
    fn test_invalid_params() {
        let mut params = test_params();
        params.horizon_len = 0;
        assert!(TrajOpt::new(params).is_err());
    }
}

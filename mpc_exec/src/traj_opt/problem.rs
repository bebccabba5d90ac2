//! The receding horizon trajectory problem
//!
//! The decision vector stacks the `N` states of the horizon followed by its `N - 1` actuations:
//!
//! ```text
//! z = [s_0, s_1, ..., s_(N-1), u_0, u_1, ..., u_(N-2)]
//! s_t = [x, y, psi, v, cte, epsi]
//! u_t = [delta, a]
//! ```
//!
//! The constraints are `s_0 - init = 0` followed by `s_(t+1) - F(s_t, u_t) = 0` for every
//! actuation, with `F` the kinematic bicycle step. The cost is quadratic in `z`, so its Hessian is
//! constant.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector};

use super::{NlpProblem, Params};
use crate::{
    poly_fit::Polynomial,
    vehicle_model::{Actuation, KinematicBicycle, ModelState, NUM_INPUTS, NUM_STATES},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The trajectory problem for one control tick.
pub struct MpcProblem<'a> {
    params: &'a Params,
    model: KinematicBicycle,
    reference: &'a Polynomial,
    init: ModelState,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<'a> MpcProblem<'a> {
    pub fn new(params: &'a Params, reference: &'a Polynomial, init: ModelState) -> Self {
        Self {
            params,
            model: KinematicBicycle::new(params.lf_m),
            reference,
            init,
        }
    }

    /// Number of states in the horizon.
    pub fn num_states(&self) -> usize {
        self.params.horizon_len
    }

    /// Number of actuations in the horizon.
    pub fn num_actuations(&self) -> usize {
        self.params.horizon_len - 1
    }

    /// Index in `z` of element `k` of state `t`.
    pub fn state_idx(&self, t: usize, k: usize) -> usize {
        t * NUM_STATES + k
    }

    /// Index in `z` of element `j` of actuation `t`.
    pub fn act_idx(&self, t: usize, j: usize) -> usize {
        self.num_states() * NUM_STATES + t * NUM_INPUTS + j
    }

    pub fn state(&self, z: &DVector<f64>, t: usize) -> ModelState {
        let i = self.state_idx(t, 0);
        let mut s = [0.0; NUM_STATES];
        s.copy_from_slice(&z.as_slice()[i..i + NUM_STATES]);
        ModelState::from_array(s)
    }

    pub fn actuation(&self, z: &DVector<f64>, t: usize) -> Actuation {
        let i = self.act_idx(t, 0);
        let mut u = [0.0; NUM_INPUTS];
        u.copy_from_slice(&z.as_slice()[i..i + NUM_INPUTS]);
        Actuation::from_array(u)
    }

    /// Calls `f(i, j, w)` for each actuation rate term `w (z_j - z_i)^2` in the cost.
    fn for_each_rate_term<F: FnMut(usize, usize, f64)>(&self, mut f: F) {
        let w = &self.params.weights;
        for t in 0..self.num_actuations().saturating_sub(1) {
            f(self.act_idx(t, 0), self.act_idx(t + 1, 0), w.steer_rate);
            f(self.act_idx(t, 1), self.act_idx(t + 1, 1), w.accel_rate);
        }
    }
}

impl<'a> NlpProblem for MpcProblem<'a> {
    fn num_vars(&self) -> usize {
        self.num_states() * NUM_STATES + self.num_actuations() * NUM_INPUTS
    }

    fn num_constraints(&self) -> usize {
        self.num_states() * NUM_STATES
    }

    fn var_bounds(&self) -> (DVector<f64>, DVector<f64>) {
        let n = self.num_vars();
        let mut lb = DVector::from_element(n, std::f64::NEG_INFINITY);
        let mut ub = DVector::from_element(n, std::f64::INFINITY);

        for t in 0..self.num_actuations() {
            lb[self.act_idx(t, 0)] = -self.params.max_steer_rad;
            ub[self.act_idx(t, 0)] = self.params.max_steer_rad;
            lb[self.act_idx(t, 1)] = self.params.min_accel;
            ub[self.act_idx(t, 1)] = self.params.max_accel;
        }

        (lb, ub)
    }

    /// Roll the model out from the initial state with zero actuation.
    fn initial_guess(&self) -> DVector<f64> {
        let mut z = DVector::zeros(self.num_vars());
        let mut s = self.init;

        for t in 0..self.num_states() {
            if t > 0 {
                s = self.model.step(&s, &Actuation::default(), self.reference, self.params.time_step_s);
            }
            for (k, v) in s.to_array().iter().enumerate() {
                z[self.state_idx(t, k)] = *v;
            }
        }

        z
    }

    fn cost(&self, z: &DVector<f64>) -> f64 {
        let w = &self.params.weights;
        let mut cost = 0.0;

        for t in 0..self.num_states() {
            let s = self.state(z, t);
            cost += w.cte * s.cte_m.powi(2)
                + w.epsi * s.epsi_rad.powi(2)
                + w.speed * (s.v - self.params.ref_speed).powi(2);
        }

        for t in 0..self.num_actuations() {
            let u = self.actuation(z, t);
            cost += w.steer * u.delta_rad.powi(2) + w.accel * u.accel.powi(2);
        }

        self.for_each_rate_term(|i, j, w| cost += w * (z[j] - z[i]).powi(2));

        cost
    }

    fn cost_gradient(&self, z: &DVector<f64>) -> DVector<f64> {
        let w = &self.params.weights;
        let mut g = DVector::zeros(self.num_vars());

        for t in 0..self.num_states() {
            let s = self.state(z, t);
            g[self.state_idx(t, 3)] = 2.0 * w.speed * (s.v - self.params.ref_speed);
            g[self.state_idx(t, 4)] = 2.0 * w.cte * s.cte_m;
            g[self.state_idx(t, 5)] = 2.0 * w.epsi * s.epsi_rad;
        }

        for t in 0..self.num_actuations() {
            let u = self.actuation(z, t);
            g[self.act_idx(t, 0)] = 2.0 * w.steer * u.delta_rad;
            g[self.act_idx(t, 1)] = 2.0 * w.accel * u.accel;
        }

        self.for_each_rate_term(|i, j, w| {
            let d = 2.0 * w * (z[j] - z[i]);
            g[j] += d;
            g[i] -= d;
        });

        g
    }

    fn cost_hessian(&self, _z: &DVector<f64>) -> DMatrix<f64> {
        let w = &self.params.weights;
        let n = self.num_vars();
        let mut h = DMatrix::zeros(n, n);

        for t in 0..self.num_states() {
            h[(self.state_idx(t, 3), self.state_idx(t, 3))] = 2.0 * w.speed;
            h[(self.state_idx(t, 4), self.state_idx(t, 4))] = 2.0 * w.cte;
            h[(self.state_idx(t, 5), self.state_idx(t, 5))] = 2.0 * w.epsi;
        }

        for t in 0..self.num_actuations() {
            h[(self.act_idx(t, 0), self.act_idx(t, 0))] = 2.0 * w.steer;
            h[(self.act_idx(t, 1), self.act_idx(t, 1))] = 2.0 * w.accel;
        }

        self.for_each_rate_term(|i, j, w| {
            h[(i, i)] += 2.0 * w;
            h[(j, j)] += 2.0 * w;
            h[(i, j)] -= 2.0 * w;
            h[(j, i)] -= 2.0 * w;
        });

        h
    }

    fn constraints(&self, z: &DVector<f64>) -> DVector<f64> {
        let mut c = DVector::zeros(self.num_constraints());

        let s0 = self.state(z, 0).to_array();
        for (k, (s, i)) in s0.iter().zip(self.init.to_array().iter()).enumerate() {
            c[k] = s - i;
        }

        for t in 0..self.num_actuations() {
            let pred = self.model.step(
                &self.state(z, t),
                &self.actuation(z, t),
                self.reference,
                self.params.time_step_s
            ).to_array();
            let next = self.state(z, t + 1).to_array();

            for k in 0..NUM_STATES {
                c[(t + 1) * NUM_STATES + k] = next[k] - pred[k];
            }
        }

        c
    }

    fn constraint_jacobian(&self, z: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.num_constraints(), self.num_vars());

        for k in 0..NUM_STATES {
            jac[(k, self.state_idx(0, k))] = 1.0;
        }

        for t in 0..self.num_actuations() {
            let (a, b) = self.model.jacobians(
                &self.state(z, t),
                &self.actuation(z, t),
                self.reference,
                self.params.time_step_s
            );
            let row = (t + 1) * NUM_STATES;

            for i in 0..NUM_STATES {
                jac[(row + i, self.state_idx(t + 1, i))] = 1.0;
                for k in 0..NUM_STATES {
                    jac[(row + i, self.state_idx(t, k))] = -a[(i, k)];
                }
                for j in 0..NUM_INPUTS {
                    jac[(row + i, self.act_idx(t, j))] = -b[(i, j)];
                }
            }
        }

        jac
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn problem_fixture() -> (Params, Polynomial) {
        let mut params = Params::default();
        params.horizon_len = 5;
        (params, Polynomial::new(vec![-1.0, 0.1, -0.003, 0.0001]))
    }

    fn test_point(p: &MpcProblem) -> DVector<f64> {
        DVector::from_fn(p.num_vars(), |i, _| 0.3 * ((i as f64) * 0.7).sin() + 0.01 * i as f64)
    }

    #[test]
    fn test_dimensions_and_bounds() {
        let (params, reference) = problem_fixture();
        let p = MpcProblem::new(&params, &reference, ModelState::at_origin(5.0, &reference));

        assert_eq!(p.num_vars(), 5 * 6 + 4 * 2);
        assert_eq!(p.num_constraints(), 30);

        let (lb, ub) = p.var_bounds();
        assert_eq!(lb[p.state_idx(2, 3)], std::f64::NEG_INFINITY);
        assert_eq!(ub[p.act_idx(3, 0)], params.max_steer_rad);
        assert_eq!(lb[p.act_idx(0, 1)], params.min_accel);
    }

    #[test]
    fn test_initial_guess_is_feasible() {
        let (params, reference) = problem_fixture();
        let p = MpcProblem::new(&params, &reference, ModelState::at_origin(5.0, &reference));

        let c = p.constraints(&p.initial_guess());
        assert!(c.amax() < 1e-12);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let (params, reference) = problem_fixture();
        let p = MpcProblem::new(&params, &reference, ModelState::at_origin(5.0, &reference));
        let z = test_point(&p);
        let g = p.cost_gradient(&z);
        let h = 1e-6;

        for i in 0..p.num_vars() {
            let mut zp = z.clone();
            let mut zm = z.clone();
            zp[i] += h;
            zm[i] -= h;
            let fd = (p.cost(&zp) - p.cost(&zm)) / (2.0 * h);
            assert!((g[i] - fd).abs() < 1e-3 * (1.0 + fd.abs()), "g[{}] = {} vs {}", i, g[i], fd);
        }
    }

    #[test]
    fn test_hessian_matches_gradient_differences() {
        let (params, reference) = problem_fixture();
        let p = MpcProblem::new(&params, &reference, ModelState::at_origin(5.0, &reference));
        let z = test_point(&p);
        let hess = p.cost_hessian(&z);
        let h = 1e-4;

        for j in 0..p.num_vars() {
            let mut zp = z.clone();
            zp[j] += h;
            let col = (p.cost_gradient(&zp) - p.cost_gradient(&z)) / h;
            for i in 0..p.num_vars() {
                assert!((hess[(i, j)] - col[i]).abs() < 1e-4 * (1.0 + col[i].abs()));
            }
        }
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let (params, reference) = problem_fixture();
        let p = MpcProblem::new(&params, &reference, ModelState::at_origin(5.0, &reference));
        let z = test_point(&p);
        let jac = p.constraint_jacobian(&z);
        let h = 1e-6;

        for j in 0..p.num_vars() {
            let mut zp = z.clone();
            let mut zm = z.clone();
            zp[j] += h;
            zm[j] -= h;
            let col = (p.constraints(&zp) - p.constraints(&zm)) / (2.0 * h);
            for i in 0..p.num_constraints() {
                assert!(
                    (jac[(i, j)] - col[i]).abs() < 1e-5,
                    "J[{}, {}] = {} vs {}", i, j, jac[(i, j)], col[i]
                );
            }
        }
    }
}

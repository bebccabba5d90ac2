//! # Trajectory optimisation module
//!
//! Trajectory optimisation finds the actuator sequence over a short horizon which keeps the
//! vehicle on the reference polynomial at the reference speed. It does this by posing a
//! constrained nonlinear program over the stacked model states and actuations of the horizon:
//!
//! - The cost penalises the cross track error, heading error and speed error of every state, the
//!   magnitude of every actuation, and the change between consecutive actuations.
//! - Equality constraints pin the first state to the measured one and tie every following state
//!   to the kinematic bicycle model applied to the state before it.
//! - Box bounds limit the steering angle and the acceleration.
//!
//! The program is handed to a solver through the [`NlpProblem`] and [`NlpSolver`] traits, the
//! default solver being [`SqpSolver`], a sequential quadratic programming method backed by OSQP.
//! All derivatives are analytic.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod nlp;
pub mod params;
pub mod problem;
pub mod sqp;
pub mod state;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use nlp::*;
pub use params::*;
pub use problem::MpcProblem;
pub use sqp::SqpSolver;
pub use state::*;

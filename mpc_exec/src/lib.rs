//! # MPC library.
//!
//! This library allows other crates in the workspace (and the benchmarks) to access items defined
//! inside the MPC crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Frame transformation - moves reference points between the World and Vehicle frames
pub mod frame;

/// Curve fitting - fits the reference polynomial through the waypoints
pub mod poly_fit;

/// Vehicle model - the kinematic bicycle model and its derivatives
pub mod vehicle_model;

/// Trajectory optimisation - finds the optimal actuation over the horizon
pub mod traj_opt;

/// MPC control module - runs one control update per telemetry tick
pub mod mpc_ctrl;

/// Telemetry server - receives telemetry from and sends commands to the simulator bridge
pub mod telem_server;

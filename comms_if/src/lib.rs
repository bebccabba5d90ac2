//! # Communications interface crate.
//!
//! Provides the records exchanged with the driving simulator and the network
//! plumbing used to carry them.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telemetry and actuator records, and their simulator event framing
pub mod sim;

/// Network module
pub mod net;

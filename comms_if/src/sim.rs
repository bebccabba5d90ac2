//! # Simulator records
//!
//! The driving simulator speaks Socket.IO: every text frame of interest is an event frame of the
//! form `42["<event>",<payload>]`, where `4` marks a message and `2` an event. This module decodes
//! the telemetry event into a [`Telemetry`] record and encodes the controller's reply.
//!
//! The simulator's field names (`ptsx`, `mpc_x`, ...) are part of its interface and are kept as
//! they are on the wire.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Prefix of a Socket.IO event message.
const EVENT_PREFIX: &str = "42";

/// Name of the telemetry event sent by the simulator.
const TELEMETRY_EVENT: &str = "telemetry";

/// Reply sent when the simulator is under manual control.
const MANUAL_FRAME: &str = "42[\"manual\",{}]";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One telemetry tick from the simulator.
///
/// Waypoints are given as parallel sequences in the world frame, the pose as
/// position and heading (radians, anticlockwise from the world X axis).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Waypoint X coordinates in the world frame
    pub ptsx: Vec<f64>,

    /// Waypoint Y coordinates in the world frame
    pub ptsy: Vec<f64>,

    /// Vehicle X position in the world frame
    pub x: f64,

    /// Vehicle Y position in the world frame
    pub y: f64,

    /// Vehicle heading in radians
    pub psi: f64,

    /// Vehicle speed, in the simulator's native units
    pub speed: f64,
}

/// Actuator command sent back to the simulator on every solved (or fallback) tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorCmd {
    /// Steering demand normalised to [-1, 1]
    pub steering_angle: f64,

    /// Throttle demand in the controller's acceleration range
    pub throttle: f64,

    /// Predicted trajectory X coordinates, vehicle frame
    pub mpc_x: Vec<f64>,

    /// Predicted trajectory Y coordinates, vehicle frame
    pub mpc_y: Vec<f64>,

    /// Reference path X coordinates, vehicle frame
    pub next_x: Vec<f64>,

    /// Reference path Y coordinates, vehicle frame
    pub next_y: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A decoded frame from the simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    /// A telemetry event carrying a full record.
    Telemetry(Telemetry),

    /// An event frame without data, sent while the simulator is driven manually.
    Manual,

    /// An event other than telemetry, carrying its name.
    Other(String),

    /// Not a Socket.IO event frame at all (pings, handshakes).
    Ignored,
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum SimParseError {
    #[error("Event frame contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Event frame is not a [name, payload] array")]
    MalformedEvent,

    #[error("Telemetry payload is invalid: {0}")]
    InvalidTelemetry(serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimEvent {
    /// Decode a text frame received from the simulator.
    pub fn parse(frame: &str) -> Result<Self, SimParseError> {
        if frame.len() <= EVENT_PREFIX.len() || !frame.starts_with(EVENT_PREFIX) {
            return Ok(SimEvent::Ignored);
        }

        let json_str = match event_payload(frame) {
            Some(s) => s,
            None => return Ok(SimEvent::Manual),
        };

        let val: Value = serde_json::from_str(json_str)
            .map_err(SimParseError::InvalidJson)?;

        let (name, payload) = match val.as_array().map(|a| a.as_slice()) {
            Some([Value::String(name), payload, ..]) => (name, payload),
            _ => return Err(SimParseError::MalformedEvent),
        };

        if name != TELEMETRY_EVENT {
            return Ok(SimEvent::Other(name.clone()));
        }

        Telemetry::deserialize(payload)
            .map(SimEvent::Telemetry)
            .map_err(SimParseError::InvalidTelemetry)
    }
}

impl ActuatorCmd {
    /// Encode this command as a `steer` event frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        Ok(format!("{}[\"steer\",{}]", EVENT_PREFIX, serde_json::to_string(self)?))
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// The acknowledgment sent instead of a command when no telemetry could be used.
pub fn manual_frame() -> &'static str {
    MANUAL_FRAME
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Extract the JSON array of an event frame.
///
/// Returns `None` if the frame carries no data, which the simulator signals with a `null`
/// payload.
fn event_payload(frame: &str) -> Option<&str> {
    if frame.contains("null") {
        return None;
    }

    let start = frame.find('[')?;
    let end = frame.rfind("}]")?;

    if end < start {
        return None;
    }

    Some(&frame[start..end + 2])
}

#[cfg(test)]
mod test {
    use super::*;

    const TELEM_FRAME: &str = "42[\"telemetry\",{\"ptsx\":[-32.16173,-43.49173,-61.09,-78.29172,\
        -93.05002,-107.7717],\"ptsy\":[113.361,105.941,92.88499,78.73102,65.34102,50.57938],\
        \"psi_unity\":4.12033,\"psi\":3.733651,\"x\":-40.62,\"y\":108.73,\"steering_angle\":0,\
        \"throttle\":0,\"speed\":0.4380091}]";

    #[test]
    fn test_parse_telemetry() {
        let t = match SimEvent::parse(TELEM_FRAME).unwrap() {
            SimEvent::Telemetry(t) => t,
            e => panic!("Expected telemetry, got {:?}", e)
        };

        assert_eq!(t.ptsx.len(), 6);
        assert_eq!(t.ptsy.len(), 6);
        assert_eq!(t.ptsx[0], -32.16173);
        assert_eq!(t.x, -40.62);
        assert_eq!(t.y, 108.73);
        assert_eq!(t.psi, 3.733651);
        assert_eq!(t.speed, 0.4380091);
    }

    #[test]
    fn test_parse_manual() {
        assert_eq!(SimEvent::parse("42[\"telemetry\",null]").unwrap(), SimEvent::Manual);
        assert_eq!(SimEvent::parse("42[\"telemetry\"]").unwrap(), SimEvent::Manual);
    }

    #[test]
    fn test_parse_other_and_ignored() {
        assert_eq!(
            SimEvent::parse("42[\"reset\",{\"a\":1}]").unwrap(),
            SimEvent::Other(String::from("reset"))
        );
        assert_eq!(SimEvent::parse("2").unwrap(), SimEvent::Ignored);
        assert_eq!(SimEvent::parse("0{\"sid\":\"abc\"}").unwrap(), SimEvent::Ignored);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            SimEvent::parse("42[\"telemetry\",{\"x\":}]"),
            Err(SimParseError::InvalidJson(_))
        ));
        assert!(matches!(
            SimEvent::parse("42[1,{\"x\":1}]"),
            Err(SimParseError::MalformedEvent)
        ));
        assert!(matches!(
            SimEvent::parse("42[\"telemetry\",{\"x\":1}]"),
            Err(SimParseError::InvalidTelemetry(_))
        ));
    }

    #[test]
    fn test_steer_frame() {
        let cmd = ActuatorCmd {
            steering_angle: -0.5,
            throttle: 1.0,
            mpc_x: vec![1.0],
            mpc_y: vec![0.0],
            ..Default::default()
        };

        let frame = cmd.to_frame().unwrap();
        assert!(frame.starts_with("42[\"steer\",{"));
        assert!(frame.ends_with("}]"));

        let payload = &frame["42[\"steer\",".len()..frame.len() - 1];
        let decoded: ActuatorCmd = serde_json::from_str(payload).unwrap();
        assert_eq!(decoded, cmd);

        assert_eq!(manual_frame(), "42[\"manual\",{}]");
    }
}

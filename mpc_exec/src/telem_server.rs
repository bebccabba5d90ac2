//! # Telemetry Server Module
//!
//! This module abstracts over the networking side of the MPC executable. The server binds a REP
//! socket which the simulator bridge connects to. Each received frame must be answered with
//! exactly one reply frame before the next one can be received, so ticks are always processed
//! one at a time and in the order they arrive.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions};
use log::warn;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An abstraction over the telemetry socket.
pub struct TelemServer {
    /// REP socket which receives simulator frames and sends the replies
    socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the [`TelemServer`]
#[derive(thiserror::Error, Debug)]
pub enum TelemServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not receive a frame: {0}")]
    RecvError(zmq::Error),

    #[error("Could not send the reply: {0}")]
    SendError(zmq::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TelemServer {
    /// Create a new instance of the telemetry server.
    ///
    /// This function will not wait for a connection from the client before returning.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, TelemServerError> {
        let socket_options = SocketOptions {
            bind: true,
            recv_timeout: params.telemetry_recv_timeout_ms,
            send_timeout: params.telemetry_send_timeout_ms,
            linger: 1,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            zmq::REP,
            socket_options,
            &params.telemetry_endpoint
        )?;

        Ok(Self { socket })
    }

    /// Return if the client is connected or not.
    pub fn connected(&self) -> bool {
        self.socket.connected()
    }

    /// Receive the next frame from the client.
    ///
    /// `None` is returned if nothing arrived before the receive timeout. Otherwise the user MUST
    /// call [`TelemServer::send_frame`] before receiving again.
    pub fn recv_frame(&mut self) -> Result<Option<String>, TelemServerError> {
        match self.socket.recv_bytes(0) {
            Ok(b) => match String::from_utf8(b) {
                Ok(s) => Ok(Some(s)),
                Err(e) => {
                    warn!("Received a frame which is not valid UTF-8");
                    Ok(Some(String::from_utf8_lossy(e.as_bytes()).into_owned()))
                }
            },
            Err(zmq::Error::EAGAIN) => Ok(None),
            Err(e) => Err(TelemServerError::RecvError(e)),
        }
    }

    /// Send the reply to the last received frame.
    pub fn send_frame(&mut self, frame: &str) -> Result<(), TelemServerError> {
        self.socket.send(frame, 0)
            .map_err(TelemServerError::SendError)
    }
}

impl From<MonitoredSocketError> for TelemServerError {
    fn from(e: MonitoredSocketError) -> Self {
        TelemServerError::SocketError(e)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_reply() {
        let ctx = zmq::Context::new();
        let params = NetParams {
            telemetry_endpoint: String::from("inproc://telem_server_test"),
            telemetry_recv_timeout_ms: 1000,
            telemetry_send_timeout_ms: 1000,
        };

        let mut server = TelemServer::new(&ctx, &params).unwrap();

        let client = ctx.socket(zmq::REQ).unwrap();
        client.connect(&params.telemetry_endpoint).unwrap();
        client.send("42[\"telemetry\",null]", 0).unwrap();

        let frame = server.recv_frame().unwrap();
        assert_eq!(frame.as_deref(), Some("42[\"telemetry\",null]"));

        server.send_frame("42[\"manual\",{}]").unwrap();
        assert_eq!(
            client.recv_string(0).unwrap().unwrap(),
            "42[\"manual\",{}]"
        );
    }
}

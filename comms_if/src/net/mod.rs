//! # Network Module
//!
//! This module provides networking abstractions over ZMQ. The controller sits behind a REP socket
//! which a simulator bridge connects to; every telemetry frame it sends is answered with exactly
//! one reply frame.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use serde::Deserialize;
use std::{sync::{Arc, atomic::{AtomicBool, AtomicUsize}, atomic::Ordering}, thread};
use zmq::{Socket, Context, SocketType, SocketEvent};

// Export zmq
pub use zmq;

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

macro_rules! set_sockopts {
    ($socket:expr, $(($opt:ident, $val:expr)),+) => {
        $(
            $socket.$opt($val)
                .map_err(|e| MonitoredSocketError::SocketOptionError(stringify!($opt).into(), e))?;
        )+
    };
}

// ------------------------------------------------------------------------------------------------
// STATICS
// ------------------------------------------------------------------------------------------------

/// Number of monitors that are registered. Used to provide unique IDs for each mointor endpoint.
static NUM_MONITORS: AtomicUsize = AtomicUsize::new(0);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Network parameters, loaded from `net.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct NetParams {
    /// Endpoint the telemetry server binds to, for example `"tcp://*:4567"`.
    pub telemetry_endpoint: String,

    /// Receive timeout on the telemetry socket in milliseconds. The main loop wakes up at least
    /// this often to report connection state.
    pub telemetry_recv_timeout_ms: i32,

    /// Send timeout on the telemetry socket in milliseconds.
    pub telemetry_send_timeout_ms: i32,
}

/// A zmq socket which is monitored providing additional information.
///
/// A background thread is run in order to monitor activity on the socket and update visible
/// information to the user. Currently this is only whether or not a peer is connected.
pub struct MonitoredSocket {
    socket: Socket,

    _monitor_endpoint: String,

    shutdown: Arc<AtomicBool>,

    connected: Arc<AtomicBool>
}

/// Options applied to a monitored socket before it binds or connects.
///
/// The timeouts and linger period map onto the matching
/// [`zmq_setsockopt`](http://api.zeromq.org/4-2:zmq-setsockopt) options, in milliseconds.
pub struct SocketOptions {
    /// Bind to the endpoint (servers) rather than connect to it (clients). Defaults to `false`.
    pub bind: bool,

    /// `ZMQ_LINGER`
    pub linger: i32,

    /// `ZMQ_RCVTIMEO`, a timed out receive returns `EAGAIN`
    pub recv_timeout: i32,

    /// `ZMQ_SNDTIMEO`
    pub send_timeout: i32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum MonitoredSocketError {
    #[error("Error creating the socket: {0}")]
    CreateSocketError(zmq::Error),

    #[error("Error enabling monitoring for the socket: {0}")]
    MonitoringEnableError(zmq::Error),

    #[error("Could not connect the socket: {0}")]
    CouldNotConnect(zmq::Error),

    #[error("Could not set the {0} socket option: {1}")]
    SocketOptionError(String, zmq::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MonitoredSocket {
    /// Create a new monitored socket.
    ///
    /// ## Arguments
    /// - `ctx`: the zmq context which will be used to create the socket
    /// - `socket_type`: the type of zmq socket to create
    /// - `socket_options`: a [`SocketOptions`] struct specifying how to configure the socket
    /// - `endpoint`: a zmq endpoint string, such as `"tcp://*:4567"`
    pub fn new(
        ctx: &Context,
        socket_type: SocketType,
        socket_options: SocketOptions,
        endpoint: &str
    ) -> Result<Self, MonitoredSocketError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(AtomicBool::new(false));

        let socket = ctx.socket(socket_type)
            .map_err(MonitoredSocketError::CreateSocketError)?;

        let monitor_endpoint = format!(
            "inproc://monitor_{}",
            NUM_MONITORS.fetch_add(1, Ordering::Relaxed)
        );

        // Enable, create, and connect monitor
        socket.monitor(&monitor_endpoint, SocketEvent::ALL as i32)
            .map_err(MonitoredSocketError::MonitoringEnableError)?;
        let monitor = ctx.socket(zmq::PAIR)
            .map_err(MonitoredSocketError::CreateSocketError)?;
        monitor.connect(&monitor_endpoint)
            .map_err(MonitoredSocketError::CouldNotConnect)?;

        socket_options.set(&socket)?;

        match socket_options.bind {
            false => socket.connect(endpoint),
            true => socket.bind(endpoint)
        }.map_err(MonitoredSocketError::CouldNotConnect)?;

        // Spawn the monitor thread, it exits once shutdown is raised or the monitor fails
        {
            let shutdown = shutdown.clone();
            let connected = connected.clone();
            let endpoint = monitor_endpoint.clone();
            thread::spawn(move || monitor_socket(monitor, endpoint, shutdown, connected));
        }

        Ok(Self {
            socket,
            _monitor_endpoint: monitor_endpoint,
            shutdown,
            connected
        })
    }

    /// Return if a peer is connected or not.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Drop for MonitoredSocket {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl std::ops::Deref for MonitoredSocket {
    type Target = Socket;

    fn deref(&self) -> &Self::Target {
        &self.socket
    }
}

impl std::ops::DerefMut for MonitoredSocket {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.socket
    }
}

impl SocketOptions {
    /// Set these options on the given socket.
    pub fn set(&self, socket: &Socket) -> Result<(), MonitoredSocketError> {
        set_sockopts!(
            socket,
            (set_linger, self.linger),
            (set_rcvtimeo, self.recv_timeout),
            (set_sndtimeo, self.send_timeout)
        );

        Ok(())
    }
}

impl Default for SocketOptions {
    fn default() -> Self {
        // libzmq defaults
        Self {
            bind: false,
            linger: 30_000,
            recv_timeout: -1,
            send_timeout: -1
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Read an event from a monitor socket.
///
/// Each event is two frames: the event id/value and the peer address, which is ignored.
fn read_event(socket: &Socket) -> Result<SocketEvent, zmq::Error> {
    let msg = socket.recv_msg(0)?;

    if msg.len() < 2 {
        return Err(zmq::Error::EINVAL);
    }
    let event = u16::from_ne_bytes([msg[0], msg[1]]);

    if socket.get_rcvmore()? {
        let _ = socket.recv_msg(0)?;
    }

    Ok(SocketEvent::from_raw(event))
}

fn monitor_socket(
    monitor: Socket,
    monitor_endpoint: String,
    shutdown: Arc<AtomicBool>,
    connected: Arc<AtomicBool>
) {
    // Wake up periodically so a shutdown request is noticed without an event arriving
    if let Err(e) = monitor.set_rcvtimeo(500) {
        warn!("Could not set timeout on monitor {}: {}", monitor_endpoint, e);
    }

    while !shutdown.load(Ordering::Relaxed) {
        let event = match read_event(&monitor) {
            Ok(e) => e,
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                warn!("Error reading event from monitor {}: {}", monitor_endpoint, e);
                break;
            }
        };

        match event {
            SocketEvent::CONNECTED | SocketEvent::ACCEPTED =>
                connected.store(true, Ordering::Relaxed),
            SocketEvent::DISCONNECTED =>
                connected.store(false, Ordering::Relaxed),
            _ => ()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_net_params() {
        let p: NetParams = toml::from_str(
            "telemetry_endpoint = \"tcp://*:4567\"\n\
             telemetry_recv_timeout_ms = 1000\n\
             telemetry_send_timeout_ms = 100\n"
        ).unwrap();

        assert_eq!(p.telemetry_endpoint, "tcp://*:4567");
        assert_eq!(p.telemetry_recv_timeout_ms, 1000);
    }

    #[test]
    fn test_monitored_socket_connects() {
        let ctx = zmq::Context::new();
        let server = MonitoredSocket::new(
            &ctx,
            zmq::REP,
            SocketOptions { bind: true, linger: 0, ..Default::default() },
            "inproc://net_monitor_test"
        ).unwrap();
        assert!(!server.connected());

        let client = ctx.socket(zmq::REQ).unwrap();
        client.connect("inproc://net_monitor_test").unwrap();
        client.send("ping", 0).unwrap();

        assert_eq!(server.recv_string(0).unwrap().unwrap(), "ping");
    }
}

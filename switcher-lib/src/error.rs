use std::io;
use std::net::Ipv4Addr;
use thiserror::Error;

/// The primary error type for the `switcher-lib` library.
#[derive(Error, Debug)]
pub enum SwitcherError {
    #[error("connection to {addr}:{port} failed: {source}")]
    Connection {
        addr: Ipv4Addr,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("listener error: {0}")]
    Listener(String),

    #[error("login failed: {0}")]
    Login(String),

    #[error("command requires a session token; login first")]
    NotLoggedIn,

    #[error("not connected to the device")]
    Disconnected,

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out waiting for device reply: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

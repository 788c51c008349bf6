//! UDP discovery and the long-lived status listener.
//!
//! Devices announce themselves with unsolicited 165-byte broadcasts on
//! port 20002 roughly once a second; there is no probe to send. Discovery
//! is a one-shot filtered wait on that traffic, the status listener is the
//! same socket kept open indefinitely.

use crate::constants::DISCOVERY_PORT;
use crate::error::SwitcherError;
use crate::packet::{BroadcastFrame, is_broadcast};
use crate::status::{DeviceId, DeviceStatus};
use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, timeout_at};
use tracing::{debug, error, info};

const RECV_BUFFER_SIZE: usize = 1024;

/// Coordinates of a discovered device.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    pub id: DeviceId,
    pub addr: Ipv4Addr,
    /// The broadcast that matched, already decoded.
    pub status: DeviceStatus,
}

/// Waits for the first broadcast matching `identifier` on the well-known
/// discovery port.
///
/// `identifier` may be a device id (6 hex digits), a device name or an
/// IPv4 address; `None` matches the first valid broadcast. Returns
/// `Ok(None)` when `wait` elapses first. The socket is dropped exactly
/// once on every path.
pub async fn discover(
    identifier: Option<&str>,
    wait: Duration,
) -> Result<Option<DiscoveredDevice>, SwitcherError> {
    discover_on(DISCOVERY_PORT, identifier, wait).await
}

/// [`discover`] on a non-standard port, for port-forwarded setups.
pub async fn discover_on(
    port: u16,
    identifier: Option<&str>,
    wait: Duration,
) -> Result<Option<DiscoveredDevice>, SwitcherError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .map_err(|e| SwitcherError::Listener(format!("bind udp port {port}: {e}")))?;
    let deadline = Instant::now() + wait;
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Err(_) => {
                debug!("discovery timed out after {:?}", wait);
                return Ok(None);
            }
            Ok(Err(e)) => return Err(SwitcherError::Listener(format!("udp receive: {e}"))),
            Ok(Ok(received)) => received,
        };

        if !is_broadcast(&buf[..len]) {
            debug!("ignoring {} non-broadcast bytes from {}", len, from);
            continue;
        }
        let Ok(frame) = BroadcastFrame::try_from(Bytes::copy_from_slice(&buf[..len])) else {
            continue;
        };
        let status = frame.decode();

        if let Some(wanted) = identifier {
            if !identifier_matches(&status, from, wanted) {
                debug!("broadcast from {} ({}) does not match {:?}", status.name, status.id, wanted);
                continue;
            }
        }

        info!("discovered {} ({}) at {}", status.name, status.id, status.ip);
        return Ok(Some(DiscoveredDevice {
            id: status.id,
            addr: status.ip,
            status,
        }));
    }
}

pub(crate) fn identifier_matches(status: &DeviceStatus, from: SocketAddr, wanted: &str) -> bool {
    wanted == status.id.to_string()
        || wanted == status.name
        || wanted == status.ip.to_string()
        || wanted == from.ip().to_string()
}

/// One item from a [`StatusListener`].
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    Status(DeviceStatus),
    /// A receive error. The listener keeps running; malformed frames are
    /// skipped silently, only socket failures surface here.
    Error(String),
}

/// Persistent listener decoding every valid broadcast on the discovery
/// port until closed or dropped.
pub struct StatusListener {
    local_addr: SocketAddr,
    rx: mpsc::Receiver<StatusEvent>,
    task: JoinHandle<()>,
}

impl StatusListener {
    /// Binds the well-known discovery port on all interfaces.
    pub async fn bind() -> Result<Self, SwitcherError> {
        Self::bind_to(DISCOVERY_PORT).await
    }

    /// Binds a specific port (0 picks an ephemeral one).
    pub async fn bind_to(port: u16) -> Result<Self, SwitcherError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|e| SwitcherError::Listener(format!("bind udp port {port}: {e}")))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| SwitcherError::Listener(format!("local addr: {e}")))?;
        info!("status listener bound to {}", local_addr);

        let (tx, rx) = mpsc::channel(100);
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, from)) => {
                        if !is_broadcast(&buf[..len]) {
                            debug!("ignoring {} non-broadcast bytes from {}", len, from);
                            continue;
                        }
                        let Ok(frame) = BroadcastFrame::try_from(Bytes::copy_from_slice(&buf[..len]))
                        else {
                            continue;
                        };
                        if tx.send(StatusEvent::Status(frame.decode())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("status listener receive error: {}", e);
                        if tx.send(StatusEvent::Error(e.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self { local_addr, rx, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Next event, or `None` once the listener is closed.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.rx.recv().await
    }

    /// Stops the listener and releases the socket. Idempotent.
    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for StatusListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

//! The TCP session client.
//!
//! A [`Switcher`] lazily opens one TCP connection to the device command
//! port, logs in at most once per session (the token is memoized) and
//! issues every command as a single write followed by a single reply read.
//! The protocol carries no request id, so replies are matched to requests
//! purely by ordering; all command methods take `&mut self`, which makes
//! one outstanding exchange per session a compile-time guarantee.
//!
//! Known protocol quirk, kept on purpose: the cached token is not
//! invalidated when the connection drops, it is resent verbatim after a
//! reconnect. Construct a fresh `Switcher` to force a new login.

use crate::constants::COMMAND_PORT;
use crate::discovery::{StatusEvent, StatusListener};
use crate::error::SwitcherError;
use crate::events::SwitcherEvent;
use crate::message::{Command, FrameContext, clamp_shutdown};
use crate::packet::{LoginReply, StatusReply};
use crate::status::{DeviceId, DeviceState, DeviceStatus, SessionToken};
use bytes::Bytes;
use chrono::Utc;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Commands wait at most this long for a reply unless reconfigured.
/// The device answers well under a second on a sane network.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

const REPLY_BUFFER_SIZE: usize = 1024;

/// Represents an authenticated command session with one device.
pub struct Switcher {
    id: DeviceId,
    ip: Ipv4Addr,
    port: u16,
    phone_id: [u8; 2],
    password: [u8; 4],
    token: Option<SessionToken>,
    stream: Option<TcpStream>,
    command_timeout: Option<Duration>,
    events_tx: mpsc::UnboundedSender<SwitcherEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<SwitcherEvent>>,
    watcher: Option<JoinHandle<()>>,
}

impl Switcher {
    /// Creates a session for the device at `ip`. Nothing is sent until the
    /// first command; connect and login happen lazily.
    pub fn new(id: DeviceId, ip: Ipv4Addr) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            id,
            ip,
            port: COMMAND_PORT,
            phone_id: [0; 2],
            password: [0; 4],
            token: None,
            stream: None,
            command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
            events_tx,
            events_rx: Some(events_rx),
            watcher: None,
        }
    }

    /// Overrides the command port (port-forwarded setups, tests).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Overrides the phone id and device password embedded in every
    /// frame. All-zero defaults work on stock devices.
    pub fn with_credentials(mut self, phone_id: [u8; 2], password: [u8; 4]) -> Self {
        self.phone_id = phone_id;
        self.password = password;
        self
    }

    /// Sets the per-command reply deadline. `None` waits forever, which
    /// is what the original mobile app does.
    pub fn with_command_timeout(mut self, limit: Option<Duration>) -> Self {
        self.command_timeout = limit;
        self
    }

    pub fn device_id(&self) -> DeviceId {
        self.id
    }

    pub fn address(&self) -> Ipv4Addr {
        self.ip
    }

    /// The cached token, if a login has succeeded on this session.
    pub fn session_token(&self) -> Option<SessionToken> {
        self.token
    }

    /// Takes the event receiver. Yields `None` after the first call.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<SwitcherEvent>> {
        self.events_rx.take()
    }

    fn emit(&self, event: SwitcherEvent) {
        // Subscribing is optional; a dropped receiver is not an error.
        let _ = self.events_tx.send(event);
    }

    fn fail(&self, err: SwitcherError) -> SwitcherError {
        self.emit(SwitcherEvent::Error(err.to_string()));
        err
    }

    /// Starts forwarding this device's UDP status broadcasts onto the
    /// event channel as [`SwitcherEvent::Status`]. Broadcasts from other
    /// devices are dropped. Torn down by [`Switcher::close`].
    pub async fn watch_status(&mut self) -> Result<(), SwitcherError> {
        if self.watcher.is_some() {
            return Ok(());
        }
        let mut listener = StatusListener::bind().await?;
        let tx = self.events_tx.clone();
        let id = self.id;
        self.watcher = Some(tokio::spawn(async move {
            while let Some(event) = listener.recv().await {
                let forwarded = match event {
                    StatusEvent::Status(status) if status.id == id => SwitcherEvent::Status(status),
                    StatusEvent::Status(_) => continue,
                    StatusEvent::Error(message) => SwitcherEvent::Error(message),
                };
                if tx.send(forwarded).is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), SwitcherError> {
        if self.stream.is_some() {
            return Ok(());
        }
        debug!("connecting to {}:{}", self.ip, self.port);
        let stream = TcpStream::connect((self.ip, self.port))
            .await
            .map_err(|source| SwitcherError::Connection {
                addr: self.ip,
                port: self.port,
                source,
            })?;
        info!("connected to {}:{}", self.ip, self.port);
        self.stream = Some(stream);
        Ok(())
    }

    fn context(&self, token: Option<SessionToken>) -> FrameContext {
        FrameContext {
            device_id: self.id,
            phone_id: self.phone_id,
            password: self.password,
            token,
            timestamp: Utc::now().timestamp() as u32,
        }
    }

    /// Logs in once per session; later calls return the cached token.
    ///
    /// An exchange failure propagates as a connection-level error (the
    /// stream is already cleared). A reply without a parseable token is a
    /// [`SwitcherError::Login`]; the connection stays open and no token
    /// is cached.
    async fn login(&mut self) -> Result<SessionToken, SwitcherError> {
        if let Some(token) = self.token {
            return Ok(token);
        }
        let frame = Command::Login.to_frame(&self.context(None))?;
        let reply = self.exchange(&frame).await?;
        let token = LoginReply::try_from(reply)
            .map_err(|e| SwitcherError::Login(e.to_string()))?
            .token();
        debug!("logged in to {}, session token {}", self.id, token);
        self.token = Some(token);
        self.emit(SwitcherEvent::Ready { id: self.id });
        Ok(token)
    }

    /// One write, one reply read. Any I/O error, timeout or peer close
    /// clears the stream so the next command reconnects; the cached token
    /// survives.
    async fn exchange(&mut self, frame: &[u8]) -> Result<Bytes, SwitcherError> {
        let limit = self.command_timeout;
        let stream = self.stream.as_mut().ok_or(SwitcherError::Disconnected)?;
        let io = async {
            stream.write_all(frame).await?;
            let mut buf = vec![0u8; REPLY_BUFFER_SIZE];
            let n = stream.read(&mut buf).await?;
            Ok::<_, std::io::Error>(Bytes::copy_from_slice(&buf[..n]))
        };
        let outcome: Result<Bytes, SwitcherError> = match limit {
            Some(limit) => match timeout(limit, io).await {
                Ok(result) => result.map_err(SwitcherError::from),
                Err(elapsed) => Err(SwitcherError::from(elapsed)),
            },
            None => io.await.map_err(SwitcherError::from),
        };
        match outcome {
            Ok(reply) if reply.is_empty() => {
                warn!("device {} closed the connection", self.ip);
                self.stream = None;
                Err(SwitcherError::Disconnected)
            }
            Ok(reply) => Ok(reply),
            Err(err) => {
                self.stream = None;
                Err(err)
            }
        }
    }

    /// Connect + login + signed command exchange.
    async fn request(&mut self, command: Command) -> Result<Bytes, SwitcherError> {
        self.connect().await?;
        let token = self.login().await?;
        let frame = command.to_frame(&self.context(Some(token)))?;
        self.exchange(&frame).await
    }

    /// Turns the switch on. `duration_minutes` arms the auto-off timer;
    /// 0 leaves the switch on indefinitely.
    pub async fn turn_on(&mut self, duration_minutes: u32) -> Result<(), SwitcherError> {
        let seconds = duration_minutes.saturating_mul(60);
        self.request(Command::PowerOn { seconds })
            .await
            .map_err(|e| self.fail(e))?;
        info!("{} turned on ({}s auto-off)", self.id, seconds);
        self.emit(SwitcherEvent::StateChanged(DeviceState::On));
        Ok(())
    }

    pub async fn turn_off(&mut self) -> Result<(), SwitcherError> {
        self.request(Command::PowerOff)
            .await
            .map_err(|e| self.fail(e))?;
        info!("{} turned off", self.id);
        self.emit(SwitcherEvent::StateChanged(DeviceState::Off));
        Ok(())
    }

    /// Configures the default shutdown timer. Returns the value actually
    /// sent, after clamping to the device's accepted range.
    pub async fn set_default_shutdown(&mut self, seconds: u32) -> Result<u32, SwitcherError> {
        let clamped = clamp_shutdown(seconds);
        if clamped != seconds {
            warn!("shutdown timer {}s clamped to {}s", seconds, clamped);
        }
        self.request(Command::SetDefaultShutdown { seconds: clamped })
            .await
            .map_err(|e| self.fail(e))?;
        self.emit(SwitcherEvent::DurationChanged(clamped));
        Ok(clamped)
    }

    /// Queries the device for its live status over the TCP session.
    pub async fn query_status(&mut self) -> Result<DeviceStatus, SwitcherError> {
        let reply = self
            .request(Command::QueryStatus)
            .await
            .map_err(|e| self.fail(e))?;
        let status = StatusReply::try_from(reply)
            .map_err(|e| self.fail(e))?
            .decode(self.id, self.ip);
        self.emit(SwitcherEvent::Status(status.clone()));
        Ok(status)
    }

    /// Releases the TCP connection and the status watcher. Idempotent;
    /// the cached token is kept.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("closed connection to {}:{}", self.ip, self.port);
        }
        if let Some(task) = self.watcher.take() {
            task.abort();
        }
    }
}

impl Drop for Switcher {
    fn drop(&mut self) {
        self.close();
    }
}

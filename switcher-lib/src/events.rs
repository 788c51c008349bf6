//! Typed notification events emitted by a [`crate::Switcher`] session.

use crate::status::{DeviceId, DeviceState, DeviceStatus};

/// Tagged outcome variants a session pushes onto its event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SwitcherEvent {
    /// Login succeeded; the session holds a token.
    Ready { id: DeviceId },
    /// A command or listener failed. The originating call also returns
    /// the error; this mirrors it for subscribers.
    Error(String),
    /// A status was decoded, either from a query reply or from a
    /// watched broadcast.
    Status(DeviceStatus),
    /// The switch was commanded into a new state.
    StateChanged(DeviceState),
    /// The default shutdown timer was reconfigured (clamped value).
    DurationChanged(u32),
}
